//! Transport contracts.
//!
//! Two distinct interfaces, not one hierarchy: [`DirectTransport`] for
//! point-to-point delivery with competing consumers per channel, and
//! [`PubSubTransport`] for broadcast fan-out with wildcard subscriptions.
//! Both share the lifecycle contract of [`crate::lifecycle`].
//!
//! Handlers are registered per channel before `start`; exactly one handler
//! is associated with a channel and re-registration replaces the previous
//! one. Transport receive loops never run a handler inline — every
//! invocation is spawned as its own task so a slow handler cannot block
//! delivery on unrelated channels.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::common::QpError;
use crate::envelope::Message;
use crate::lifecycle::StopChan;

pub mod inproc;

#[cfg(feature = "redis-transport")]
pub mod redis;

/// A channel handler: an async function of the inbound [`Message`].
pub type MessageHandler = Arc<dyn Fn(Message) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure as a [`MessageHandler`].
pub fn handler<F, Fut>(f: F) -> MessageHandler
where
    F: Fn(Message) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    Arc::new(move |msg| f(msg).boxed())
}

/// Point-to-point transport. One consumer receives each message; multiple
/// instances registered on the same channel compete for deliveries.
#[async_trait]
pub trait DirectTransport: Send + Sync {
    /// Deliver `data` on `channel`. Fails with `NotRunning` once the
    /// transport has been stopped.
    async fn send(&self, channel: &str, data: Vec<u8>) -> Result<(), QpError>;

    /// Register the handler for a channel, replacing any previous one.
    /// Fails with `AlreadyRunning` after `start`.
    fn on_message(&self, channel: &str, handler: MessageHandler) -> Result<(), QpError>;

    /// Begin consuming. Fails with `AlreadyRunning` on a running
    /// transport. Must be called within a Tokio runtime.
    fn start(&self) -> Result<(), QpError>;

    /// Stop accepting new sends immediately, allow `grace` for in-flight
    /// handlers, then terminate receivers and close the stop signal.
    async fn stop(&self, grace: Duration);

    /// The broadcast-on-close signal observable by any number of waiters.
    fn stop_chan(&self) -> StopChan;
}

/// Broadcast transport. Every subscriber whose channel matches receives
/// each publish; a subscription key ending in `*` covers the prefix and
/// all its descendants.
#[async_trait]
pub trait PubSubTransport: Send + Sync {
    /// Publish `data` on `channel` to all matching subscribers. Fails
    /// with `NotRunning` once the transport has been stopped.
    async fn publish(&self, channel: &str, data: Vec<u8>) -> Result<(), QpError>;

    /// Register the handler for a channel, replacing any previous one.
    /// Fails with `AlreadyRunning` after `start`.
    fn subscribe(&self, channel: &str, handler: MessageHandler) -> Result<(), QpError>;

    /// Begin consuming. Fails with `AlreadyRunning` on a running
    /// transport. Must be called within a Tokio runtime.
    fn start(&self) -> Result<(), QpError>;

    /// Stop accepting new publishes immediately, allow `grace` for
    /// in-flight handlers, then terminate receivers and close the stop
    /// signal.
    async fn stop(&self, grace: Duration);

    /// The broadcast-on-close signal observable by any number of waiters.
    fn stop_chan(&self) -> StopChan;
}
