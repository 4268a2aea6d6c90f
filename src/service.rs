//! Named services with implicit load balancing.

use std::sync::Arc;

use crate::codec::Codec;
use crate::common::QpError;
use crate::responder::{Responder, TransactionHandler};
use crate::transport::DirectTransport;

/// A responder bound to its own logical name.
///
/// Every instance of a service subscribes to the same channel — the
/// service name — so instances draw from a shared queue and the broker's
/// competing-consumer semantics balance the load between them.
#[allow(missing_debug_implementations)]
pub struct Service {
    name: String,
    responder: Responder,
}

impl Service {
    /// Create a service instance handling requests addressed to `name`.
    /// An empty `instance` is replaced with a generated unique
    /// identifier.
    pub fn new(
        name: &str,
        instance: &str,
        codec: Arc<dyn Codec>,
        transport: Arc<dyn DirectTransport>,
        handler: TransactionHandler,
    ) -> Result<Self, QpError> {
        let responder = Responder::new(name, instance, codec, transport);
        responder.handle(name, handler)?;
        Ok(Service {
            name: name.to_string(),
            responder,
        })
    }

    /// The logical name this service competes on.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The fully-qualified endpoint of this instance.
    pub fn endpoint(&self) -> &str {
        self.responder.endpoint()
    }
}
