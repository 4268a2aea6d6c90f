//! QP — a queue-agnostic messaging runtime.
//!
//! QP sits above an interchangeable transport (in-process queue, Redis
//! lists, Redis pub/sub) and provides two communication patterns to
//! application services:
//!
//! - **Request/response with pipeline chaining** — a [`Requester`] sends a
//!   [`Transaction`] through an ordered list of named endpoints; each hop
//!   may mutate the payload before the transaction moves on, and the final
//!   hop's reply is routed back to the originator and resolves a
//!   [`ResponseFuture`].
//! - **Publish/subscribe with hierarchical channels** — a [`Publisher`]
//!   emits [`Event`]s on dotted channels (`router.request.size`);
//!   subscribers listen to an exact channel or to a whole family of
//!   descendants.
//!
//! The runtime guarantees correlation, pipeline traversal, and lifecycle;
//! broker semantics stay with the broker. Swapping the queue technology
//! means swapping the transport — application code does not change.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use qp::{DirectTransport, InProcDirect, JsonCodec, Requester, Service};
//! use qp::transaction_handler;
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), qp::QpError> {
//! let transport = Arc::new(InProcDirect::new());
//! let codec = Arc::new(JsonCodec);
//!
//! // a service handling requests addressed to "greeter"
//! let _greeter = Service::new(
//!     "greeter",
//!     "0",
//!     codec.clone(),
//!     transport.clone(),
//!     transaction_handler(|tx| {
//!         tx.data = json!("hello");
//!     }),
//! )?;
//!
//! let requester = Requester::new("client", "0", codec, transport.clone())?;
//! transport.start()?;
//!
//! let future = requester.issue(&["greeter"], json!(null)).await?;
//! let reply = future.response(Duration::from_secs(1)).await?;
//! assert_eq!(reply.data, json!("hello"));
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//! - `redis-transport`: (default) the Redis list and pub/sub transports.

#![warn(missing_debug_implementations)]

// =============================================================================
// MODULE DECLARATIONS
// =============================================================================

/// The serialization boundary and the reference JSON codec.
pub mod codec;
/// The shared error type.
pub mod common;
/// Channel-to-handler maps with wildcard matching.
pub mod dispatch;
/// Envelopes, request ids, and endpoint names.
pub mod envelope;
/// The start/stop contract shared by long-running components.
pub mod lifecycle;
/// The publish/subscribe façade.
pub mod pubsub;
/// Issuing pipelined transactions.
pub mod requester;
/// Correlation of outstanding requests with replies.
pub mod resolver;
/// Serving channels and routing transactions onward.
pub mod responder;
/// Named services with implicit load balancing.
pub mod service;
/// Transport contracts and the reference transports.
pub mod transport;

// Re-export the public API
pub use crate::codec::{Codec, JsonCodec};
pub use crate::common::QpError;
pub use crate::envelope::{endpoint, Event, Message, RequestId, Transaction};
pub use crate::lifecycle::{Lifecycle, StopChan};
pub use crate::pubsub::{event_handler, EventHandler, Publisher, Subscriber};
pub use crate::requester::Requester;
pub use crate::resolver::{Resolver, ResponseFuture};
pub use crate::responder::{transaction_handler, Responder, TransactionHandler};
pub use crate::service::Service;
pub use crate::transport::inproc::{DirectHub, InProcDirect, InProcPubSub, PubSubHub};
pub use crate::transport::{handler, DirectTransport, MessageHandler, PubSubTransport};

#[cfg(feature = "redis-transport")]
pub use crate::transport::redis::{RedisConfig, RedisDirect, RedisPubSub};
