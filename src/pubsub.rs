//! The publish/subscribe façade.
//!
//! Thin wrappers over a [`PubSubTransport`]: the [`Publisher`] stamps
//! payloads into [`Event`] envelopes, the [`Subscriber`] decodes inbound
//! events and fans them out to its registered handlers. Channels form a
//! dotted hierarchy; [`Subscriber::listen_for_children`] covers a channel
//! and all its descendants.

use std::sync::Arc;

use serde_json::Value;

use crate::codec::Codec;
use crate::common::QpError;
use crate::dispatch::{channel_matches, PubSubDispatcher};
use crate::envelope::{endpoint, Event, Message};
use crate::transport::{handler, PubSubTransport};

/// A user event handler, called with the source channel and the decoded
/// event.
pub type EventHandler = Arc<dyn Fn(&str, Event) + Send + Sync>;

/// Wrap a closure as an [`EventHandler`].
pub fn event_handler<F>(f: F) -> EventHandler
where
    F: Fn(&str, Event) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Publishes fire-and-forget events.
#[allow(missing_debug_implementations)]
pub struct Publisher {
    endpoint: String,
    codec: Arc<dyn Codec>,
    transport: Arc<dyn PubSubTransport>,
}

impl Publisher {
    /// Create a publisher addressed as `name.instance`. An empty
    /// `instance` is replaced with a generated unique identifier.
    pub fn new(
        name: &str,
        instance: &str,
        codec: Arc<dyn Codec>,
        transport: Arc<dyn PubSubTransport>,
    ) -> Self {
        Publisher {
            endpoint: endpoint(name, instance),
            codec,
            transport,
        }
    }

    /// The fully-qualified endpoint stamped into published events.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Publish `data` on the channel. Interested subscribers receive it;
    /// nobody replies.
    pub async fn publish(&self, channel: &str, data: Value) -> Result<(), QpError> {
        let event = Event {
            from: self.endpoint.clone(),
            data,
        };
        let bytes = self.codec.marshal_event(&event)?;
        self.transport.publish(channel, bytes).await
    }
}

/// Subscribes handlers to event channels.
#[allow(missing_debug_implementations)]
pub struct Subscriber {
    codec: Arc<dyn Codec>,
    transport: Arc<dyn PubSubTransport>,
    mapper: Arc<PubSubDispatcher<EventHandler>>,
}

impl Subscriber {
    pub fn new(codec: Arc<dyn Codec>, transport: Arc<dyn PubSubTransport>) -> Self {
        Subscriber {
            codec,
            transport,
            mapper: Arc::new(PubSubDispatcher::new()),
        }
    }

    /// Bind a handler to exactly this channel.
    pub fn subscribe(&self, channel: &str, user_handler: EventHandler) -> Result<(), QpError> {
        self.register(channel.to_string(), user_handler)
    }

    /// Bind a handler to this channel and all its descendants
    /// (`channel`, `channel.x`, `channel.x.y`, …).
    pub fn listen_for_children(
        &self,
        channel: &str,
        user_handler: EventHandler,
    ) -> Result<(), QpError> {
        self.register(format!("{}*", channel), user_handler)
    }

    fn register(&self, key: String, user_handler: EventHandler) -> Result<(), QpError> {
        if !self.mapper.track(&key, user_handler) {
            // the shim for this key is already in place
            return Ok(());
        }

        let shim = {
            let codec = self.codec.clone();
            let mapper = self.mapper.clone();
            let key = key.clone();
            handler(move |msg: Message| {
                let codec = codec.clone();
                let mapper = mapper.clone();
                let key = key.clone();
                async move {
                    // a glob-based broker can over-deliver on patterns
                    // like `a.b*`; re-check against the hierarchy rule
                    if !channel_matches(&key, &msg.source) {
                        return;
                    }
                    let event = match codec.unmarshal_event(&msg.data) {
                        Ok(event) => event,
                        Err(err) => {
                            tracing::warn!(channel = %msg.source, %err, "dropping undecodable event");
                            return;
                        }
                    };
                    for h in mapper.find_key(&key) {
                        h(&msg.source, event.clone());
                    }
                }
            })
        };
        self.transport.subscribe(&key, shim)
    }
}
