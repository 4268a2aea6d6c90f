//! Issuing pipelined transactions and resolving their replies.

use std::sync::Arc;

use serde_json::Value;

use crate::codec::Codec;
use crate::common::QpError;
use crate::envelope::{endpoint, Message, RequestId, Transaction};
use crate::resolver::{Resolver, ResponseFuture};
use crate::transport::{handler, DirectTransport};

/// Issues transactions through a pipeline of endpoints and correlates
/// the replies.
///
/// Construction registers a handler on the requester's own reply channel
/// (`name.instance`); every transaction it issues names that channel as
/// `from[0]`, so the terminal pipeline hop routes the reply straight
/// back here.
#[allow(missing_debug_implementations)]
pub struct Requester {
    codec: Arc<dyn Codec>,
    transport: Arc<dyn DirectTransport>,
    response_channel: String,
    resolver: Arc<Resolver>,
}

impl Requester {
    /// Create a requester and bind its reply channel.
    ///
    /// An empty `instance` is replaced with a generated unique
    /// identifier. Failure to register the reply handler is fatal and
    /// surfaces here.
    pub fn new(
        name: &str,
        instance: &str,
        codec: Arc<dyn Codec>,
        transport: Arc<dyn DirectTransport>,
    ) -> Result<Self, QpError> {
        let response_channel = endpoint(name, instance);
        let resolver = Arc::new(Resolver::new());

        let shim = {
            let codec = codec.clone();
            let resolver = resolver.clone();
            handler(move |msg: Message| {
                let codec = codec.clone();
                let resolver = resolver.clone();
                async move {
                    let reply = match codec.unmarshal_transaction(&msg.data) {
                        Ok(reply) => reply,
                        Err(err) => {
                            tracing::warn!(channel = %msg.source, %err, "dropping undecodable reply");
                            return;
                        }
                    };
                    tokio::spawn(async move {
                        if let Err(err) = resolver.resolve(reply) {
                            tracing::warn!(%err, "discarding reply");
                        }
                    });
                }
            })
        };
        transport.on_message(&response_channel, shim)?;

        Ok(Requester {
            codec,
            transport,
            response_channel,
            resolver,
        })
    }

    /// The channel on which this requester receives replies.
    pub fn response_channel(&self) -> &str {
        &self.response_channel
    }

    /// Issue a transaction through the pipeline.
    ///
    /// Every endpoint in `pipeline` receives the transaction in order and
    /// may mutate it before it moves on; the final hop's reply resolves
    /// the returned future.
    ///
    /// # Panics
    /// Panics when `pipeline` is empty — a programmer error, caught at
    /// the issue boundary.
    pub async fn issue(&self, pipeline: &[&str], data: Value) -> Result<ResponseFuture, QpError> {
        assert!(!pipeline.is_empty(), "pipeline cannot be empty");

        let tx = Transaction {
            to: pipeline[1..].iter().map(|s| s.to_string()).collect(),
            from: vec![self.response_channel.clone()],
            id: RequestId::next(),
            data,
        };
        let bytes = self.codec.marshal_transaction(&tx)?;
        let future = self.resolver.track(tx.id)?;
        self.transport.send(pipeline[0], bytes).await?;
        Ok(future)
    }

    /// The number of issued transactions still awaiting a reply.
    pub fn outstanding(&self) -> usize {
        self.resolver.len()
    }
}
