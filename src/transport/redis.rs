//! Redis-backed transports.
//!
//! The direct variant queues on Redis lists (`LPUSH` to send, `BRPOP` to
//! receive) so same-channel consumers compete broker-side; the pub/sub
//! variant uses native `PUBLISH`/`PSUBSCRIBE` so wildcard channels are
//! resolved by the broker. Compatible with Redis, Valkey, and
//! DragonflyDB.
//!
//! Transient conditions — empty pops, network timeouts, broker restarts —
//! are absorbed by the receive loops with a tiered backoff and never
//! surface to callers; handler registrations survive reconnection. An
//! outage that outlasts the backoff schedule is fatal for the affected
//! loop: it is logged and the loop exits, without panicking the process.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManagerConfig;
use redis::AsyncCommands;
use tokio::sync::watch;
use url::Url;

use crate::common::QpError;
use crate::envelope::Message;
use crate::lifecycle::{Lifecycle, StopChan};
use crate::transport::{DirectTransport, MessageHandler, PubSubTransport};

/// Seconds a `BRPOP` blocks before returning empty.
const POP_TIMEOUT_SECS: usize = 1;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Connection settings for the Redis transports.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Broker address: `host:port` or a full `redis://` URL.
    pub addr: String,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Per-command response timeout on the send connection.
    pub response_timeout: Duration,
}

impl RedisConfig {
    pub fn new(addr: &str) -> Self {
        RedisConfig {
            addr: addr.to_string(),
            connect_timeout: Duration::from_secs(1),
            response_timeout: Duration::from_secs(1),
        }
    }

    fn url(&self) -> Result<Url, QpError> {
        let raw = if self.addr.contains("://") {
            self.addr.clone()
        } else {
            format!("redis://{}", self.addr)
        };
        Url::parse(&raw).map_err(|e| QpError::Config(format!("invalid redis address: {}", e)))
    }

    async fn open(&self) -> Result<(redis::Client, redis::aio::ConnectionManager), QpError> {
        let url = self.url()?;
        let client = redis::Client::open(url.as_str())
            .map_err(|e| QpError::Redis(format!("failed to create client: {}", e)))?;
        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(self.connect_timeout)
            .set_response_timeout(self.response_timeout);
        let manager = client
            .get_connection_manager_with_config(manager_config)
            .await
            .map_err(|e| QpError::Redis(format!("failed to establish connection: {}", e)))?;
        Ok((client, manager))
    }
}

// =============================================================================
// BACKOFF
// =============================================================================

/// Tiered retry delays for a broker outage: 1s for the first minute,
/// 10s until five minutes, 30s until ten minutes, then give up.
struct Backoff {
    since: Option<Instant>,
}

impl Backoff {
    fn new() -> Self {
        Backoff { since: None }
    }

    /// The next delay, or `None` once the outage is past the abort
    /// threshold.
    fn delay(&mut self) -> Option<Duration> {
        let since = *self.since.get_or_insert_with(Instant::now);
        let elapsed = since.elapsed();
        if elapsed < Duration::from_secs(60) {
            Some(Duration::from_secs(1))
        } else if elapsed < Duration::from_secs(300) {
            Some(Duration::from_secs(10))
        } else if elapsed < Duration::from_secs(600) {
            Some(Duration::from_secs(30))
        } else {
            None
        }
    }

    /// Clear the outage. Returns `true` when one was in progress.
    fn reset(&mut self) -> bool {
        self.since.take().is_some()
    }
}

// =============================================================================
// DIRECT TRANSPORT
// =============================================================================

/// Point-to-point transport over Redis lists.
#[allow(missing_debug_implementations)]
pub struct RedisDirect {
    client: redis::Client,
    manager: redis::aio::ConnectionManager,
    handlers: Mutex<HashMap<String, MessageHandler>>,
    shutdown: watch::Sender<bool>,
    lifecycle: Lifecycle,
}

impl RedisDirect {
    /// Connect with default timeouts (1s connect, 1s response).
    pub async fn connect(addr: &str) -> Result<Self, QpError> {
        Self::connect_with(RedisConfig::new(addr)).await
    }

    /// Connect with explicit settings.
    pub async fn connect_with(config: RedisConfig) -> Result<Self, QpError> {
        let (client, manager) = config.open().await?;
        let (shutdown, _) = watch::channel(false);
        Ok(RedisDirect {
            client,
            manager,
            handlers: Mutex::new(HashMap::new()),
            shutdown,
            lifecycle: Lifecycle::new(),
        })
    }

    /// One `BRPOP` loop per subscribed channel, on a dedicated
    /// connection. Each received message spawns its handler; the loop
    /// keeps popping.
    async fn receive_loop(
        client: redis::Client,
        channel: String,
        handler: MessageHandler,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut backoff = Backoff::new();
        'outer: loop {
            if *shutdown.borrow() {
                break;
            }
            let mut conn = match client.get_multiplexed_async_connection().await {
                Ok(conn) => conn,
                Err(err) => {
                    match backoff.delay() {
                        Some(delay) => {
                            tracing::warn!(%channel, %err, "redis connect failed, retrying");
                            tokio::select! {
                                _ = shutdown.changed() => break 'outer,
                                _ = tokio::time::sleep(delay) => continue 'outer,
                            }
                        }
                        None => {
                            tracing::error!(%channel, %err, "unable to reach redis, abandoning receive loop");
                            break 'outer;
                        }
                    }
                }
            };
            loop {
                let pop = tokio::select! {
                    _ = shutdown.changed() => break 'outer,
                    reply = async {
                        let reply: redis::RedisResult<Option<(String, Vec<u8>)>> = redis::cmd("BRPOP")
                            .arg(&channel)
                            .arg(POP_TIMEOUT_SECS)
                            .query_async(&mut conn)
                            .await;
                        reply
                    } => reply,
                };
                match pop {
                    Ok(Some((source, data))) => {
                        if backoff.reset() {
                            tracing::warn!(%channel, "reconnected to redis after interruption");
                        }
                        tokio::spawn(handler(Message { source, data }));
                    }
                    Ok(None) => {
                        // empty pop, keep waiting
                        if backoff.reset() {
                            tracing::warn!(%channel, "reconnected to redis after interruption");
                        }
                    }
                    Err(err) if err.is_timeout() => {
                        // network timeout is fine too
                    }
                    Err(err) => match backoff.delay() {
                        Some(delay) => {
                            tracing::warn!(%channel, %err, "redis receive failed, retrying");
                            tokio::select! {
                                _ = shutdown.changed() => break 'outer,
                                _ = tokio::time::sleep(delay) => continue 'outer,
                            }
                        }
                        None => {
                            tracing::error!(%channel, %err, "unable to reach redis, abandoning receive loop");
                            break 'outer;
                        }
                    },
                }
            }
        }
    }
}

#[async_trait]
impl DirectTransport for RedisDirect {
    async fn send(&self, channel: &str, data: Vec<u8>) -> Result<(), QpError> {
        if !self.lifecycle.is_running() {
            return Err(QpError::NotRunning);
        }
        let mut conn = self.manager.clone();
        let _: () = conn
            .lpush(channel, data)
            .await
            .map_err(|e| QpError::Redis(format!("LPUSH failed: {}", e)))?;
        Ok(())
    }

    fn on_message(&self, channel: &str, handler: MessageHandler) -> Result<(), QpError> {
        if self.lifecycle.is_running() {
            return Err(QpError::AlreadyRunning);
        }
        self.handlers
            .lock()
            .unwrap()
            .insert(channel.to_string(), handler);
        Ok(())
    }

    fn start(&self) -> Result<(), QpError> {
        self.lifecycle.start()?;
        let handlers: Vec<(String, MessageHandler)> = self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .map(|(channel, handler)| (channel.clone(), handler.clone()))
            .collect();
        for (channel, handler) in handlers {
            tokio::spawn(Self::receive_loop(
                self.client.clone(),
                channel,
                handler,
                self.shutdown.subscribe(),
            ));
        }
        Ok(())
    }

    async fn stop(&self, grace: Duration) {
        self.lifecycle.halt();
        tokio::time::sleep(grace).await;
        self.shutdown.send_replace(true);
        self.lifecycle.mark_stopped();
    }

    fn stop_chan(&self) -> StopChan {
        self.lifecycle.stop_chan()
    }
}

// =============================================================================
// PUBSUB TRANSPORT
// =============================================================================

/// Broadcast transport over native Redis pub/sub.
#[allow(missing_debug_implementations)]
pub struct RedisPubSub {
    client: redis::Client,
    manager: redis::aio::ConnectionManager,
    handlers: Mutex<HashMap<String, MessageHandler>>,
    shutdown: watch::Sender<bool>,
    lifecycle: Lifecycle,
}

impl RedisPubSub {
    /// Connect with default timeouts (1s connect, 1s response).
    pub async fn connect(addr: &str) -> Result<Self, QpError> {
        Self::connect_with(RedisConfig::new(addr)).await
    }

    /// Connect with explicit settings.
    pub async fn connect_with(config: RedisConfig) -> Result<Self, QpError> {
        let (client, manager) = config.open().await?;
        let (shutdown, _) = watch::channel(false);
        Ok(RedisPubSub {
            client,
            manager,
            handlers: Mutex::new(HashMap::new()),
            shutdown,
            lifecycle: Lifecycle::new(),
        })
    }

    /// One `PSUBSCRIBE` loop per subscription key. A key ending in `*`
    /// is already a broker-side pattern; exact keys are patterns without
    /// globs. Shutdown drops the pub/sub connection, which unblocks the
    /// message stream.
    async fn subscribe_loop(
        client: redis::Client,
        pattern: String,
        handler: MessageHandler,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut backoff = Backoff::new();
        'outer: loop {
            if *shutdown.borrow() {
                break;
            }
            let mut pubsub = match client.get_async_pubsub().await {
                Ok(pubsub) => pubsub,
                Err(err) => {
                    match backoff.delay() {
                        Some(delay) => {
                            tracing::warn!(%pattern, %err, "redis connect failed, retrying");
                            tokio::select! {
                                _ = shutdown.changed() => break 'outer,
                                _ = tokio::time::sleep(delay) => continue 'outer,
                            }
                        }
                        None => {
                            tracing::error!(%pattern, %err, "unable to reach redis, abandoning subscription");
                            break 'outer;
                        }
                    }
                }
            };
            if let Err(err) = pubsub.psubscribe(&pattern).await {
                match backoff.delay() {
                    Some(delay) => {
                        tracing::warn!(%pattern, %err, "PSUBSCRIBE failed, retrying");
                        tokio::select! {
                            _ = shutdown.changed() => break 'outer,
                            _ = tokio::time::sleep(delay) => continue 'outer,
                        }
                    }
                    None => {
                        tracing::error!(%pattern, %err, "unable to reach redis, abandoning subscription");
                        break 'outer;
                    }
                }
            }
            if backoff.reset() {
                tracing::warn!(%pattern, "resubscribed to redis after interruption");
            }
            {
                let mut stream = pubsub.on_message();
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => break 'outer,
                        msg = stream.next() => match msg {
                            Some(msg) => {
                                let source = msg.get_channel_name().to_string();
                                match msg.get_payload::<Vec<u8>>() {
                                    Ok(data) => {
                                        tokio::spawn(handler(Message { source, data }));
                                    }
                                    Err(err) => {
                                        tracing::warn!(%pattern, %err, "dropping message with unreadable payload");
                                    }
                                }
                            }
                            // stream closed: the connection was lost
                            None => break,
                        },
                    }
                }
            }
            match backoff.delay() {
                Some(delay) => {
                    tracing::warn!(%pattern, "redis subscription interrupted, retrying");
                    tokio::select! {
                        _ = shutdown.changed() => break 'outer,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                None => {
                    tracing::error!(%pattern, "unable to reach redis, abandoning subscription");
                    break 'outer;
                }
            }
        }
    }
}

#[async_trait]
impl PubSubTransport for RedisPubSub {
    async fn publish(&self, channel: &str, data: Vec<u8>) -> Result<(), QpError> {
        if !self.lifecycle.is_running() {
            return Err(QpError::NotRunning);
        }
        let mut conn = self.manager.clone();
        let _: () = conn
            .publish(channel, data)
            .await
            .map_err(|e| QpError::Redis(format!("PUBLISH failed: {}", e)))?;
        Ok(())
    }

    fn subscribe(&self, channel: &str, handler: MessageHandler) -> Result<(), QpError> {
        if self.lifecycle.is_running() {
            return Err(QpError::AlreadyRunning);
        }
        self.handlers
            .lock()
            .unwrap()
            .insert(channel.to_string(), handler);
        Ok(())
    }

    fn start(&self) -> Result<(), QpError> {
        self.lifecycle.start()?;
        let handlers: Vec<(String, MessageHandler)> = self
            .handlers
            .lock()
            .unwrap()
            .iter()
            .map(|(channel, handler)| (channel.clone(), handler.clone()))
            .collect();
        for (pattern, handler) in handlers {
            tokio::spawn(Self::subscribe_loop(
                self.client.clone(),
                pattern,
                handler,
                self.shutdown.subscribe(),
            ));
        }
        Ok(())
    }

    async fn stop(&self, grace: Duration) {
        self.lifecycle.halt();
        tokio::time::sleep(grace).await;
        self.shutdown.send_replace(true);
        self.lifecycle.mark_stopped();
    }

    fn stop_chan(&self) -> StopChan {
        self.lifecycle.stop_chan()
    }
}
