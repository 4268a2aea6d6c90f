//! Serving channels: run user handlers and route transactions onward.

use std::sync::Arc;

use crate::codec::Codec;
use crate::common::QpError;
use crate::dispatch::DirectDispatcher;
use crate::envelope::{endpoint, Message, Transaction};
use crate::transport::{handler, DirectTransport};

/// A user transaction handler. Handlers may mutate the payload and the
/// remaining pipeline, including [`Transaction::abort`].
pub type TransactionHandler = Arc<dyn Fn(&mut Transaction) + Send + Sync>;

/// Wrap a closure as a [`TransactionHandler`].
pub fn transaction_handler<F>(f: F) -> TransactionHandler
where
    F: Fn(&mut Transaction) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Serves channels on a direct transport.
///
/// For each inbound transaction the responder runs the registered
/// handlers, then forwards the (possibly mutated) transaction to the next
/// pipeline hop — or back to the originator when the pipeline is
/// exhausted or aborted. Its own endpoint is appended to `from` before
/// every forward, so the reply records the exact visitation order.
#[allow(missing_debug_implementations)]
pub struct Responder {
    endpoint: String,
    codec: Arc<dyn Codec>,
    transport: Arc<dyn DirectTransport>,
    handlers: Arc<DirectDispatcher<TransactionHandler>>,
}

impl Responder {
    /// Create a responder addressed as `name.instance`. An empty
    /// `instance` is replaced with a generated unique identifier.
    pub fn new(
        name: &str,
        instance: &str,
        codec: Arc<dyn Codec>,
        transport: Arc<dyn DirectTransport>,
    ) -> Self {
        Responder {
            endpoint: endpoint(name, instance),
            codec,
            transport,
            handlers: Arc::new(DirectDispatcher::new()),
        }
    }

    /// The fully-qualified endpoint of this responder.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Bind a handler to a channel.
    ///
    /// Handlers registered for the same channel run in registration
    /// order on each inbound transaction.
    pub fn handle(&self, channel: &str, user_handler: TransactionHandler) -> Result<(), QpError> {
        if !self.handlers.track(channel, user_handler) {
            // the shim for this channel is already in place
            return Ok(());
        }

        let shim = {
            let codec = self.codec.clone();
            let transport = self.transport.clone();
            let handlers = self.handlers.clone();
            let own_endpoint = self.endpoint.clone();
            handler(move |msg: Message| {
                let codec = codec.clone();
                let transport = transport.clone();
                let handlers = handlers.clone();
                let own_endpoint = own_endpoint.clone();
                async move {
                    let mut tx = match codec.unmarshal_transaction(&msg.data) {
                        Ok(tx) => tx,
                        Err(err) => {
                            tracing::warn!(channel = %msg.source, %err, "dropping undecodable transaction");
                            return;
                        }
                    };

                    for h in handlers.find(&msg.source) {
                        h(&mut tx);
                    }

                    // forward to the next hop, or reply to the originator
                    let next = if !tx.to.is_empty() {
                        tx.to.remove(0)
                    } else if !tx.from.is_empty() {
                        tx.from[0].clone()
                    } else {
                        tracing::warn!(id = %tx.id, "cannot route transaction with empty from");
                        return;
                    };
                    tx.from.push(own_endpoint);

                    let data = match codec.marshal_transaction(&tx) {
                        Ok(data) => data,
                        Err(err) => {
                            tracing::warn!(id = %tx.id, %err, "dropping transaction: encode failed");
                            return;
                        }
                    };
                    if let Err(err) = transport.send(&next, data).await {
                        tracing::warn!(id = %tx.id, channel = %next, %err, "failed to forward transaction");
                    }
                }
            })
        };
        self.transport.on_message(channel, shim)
    }

    /// Bind a plain closure to a channel.
    pub fn handle_fn<F>(&self, channel: &str, f: F) -> Result<(), QpError>
    where
        F: Fn(&mut Transaction) + Send + Sync + 'static,
    {
        self.handle(channel, transaction_handler(f))
    }
}
