//! Shared test helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use qp::{DirectTransport, Lifecycle, Message, MessageHandler, QpError, StopChan};

/// A hand-driven direct transport: sends are recorded per channel and
/// inbound messages are injected directly into the registered handlers.
pub struct RecordingDirect {
    lifecycle: Lifecycle,
    handlers: RwLock<HashMap<String, MessageHandler>>,
    sends: Mutex<HashMap<String, Vec<Vec<u8>>>>,
}

impl RecordingDirect {
    pub fn new() -> Self {
        RecordingDirect {
            lifecycle: Lifecycle::new(),
            handlers: RwLock::new(HashMap::new()),
            sends: Mutex::new(HashMap::new()),
        }
    }

    /// The most recent payload sent on a channel.
    pub fn last_sent(&self, channel: &str) -> Option<Vec<u8>> {
        self.sends
            .lock()
            .unwrap()
            .get(channel)
            .and_then(|sent| sent.last().cloned())
    }

    /// Every payload sent on a channel, oldest first.
    pub fn all_sent(&self, channel: &str) -> Vec<Vec<u8>> {
        self.sends
            .lock()
            .unwrap()
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of sends across all channels.
    pub fn send_count(&self) -> usize {
        self.sends.lock().unwrap().values().map(Vec::len).sum()
    }

    pub fn has_handler(&self, channel: &str) -> bool {
        self.handlers.read().unwrap().contains_key(channel)
    }

    /// Deliver a message to the handler registered for `channel`,
    /// driving it to completion.
    ///
    /// # Panics
    /// Panics when no handler is registered for the channel.
    pub async fn inject(&self, channel: &str, data: Vec<u8>) {
        let handler = self
            .handlers
            .read()
            .unwrap()
            .get(channel)
            .cloned()
            .expect("no handler registered for channel");
        handler(Message {
            source: channel.to_string(),
            data,
        })
        .await;
    }
}

#[async_trait]
impl DirectTransport for RecordingDirect {
    async fn send(&self, channel: &str, data: Vec<u8>) -> Result<(), QpError> {
        self.sends
            .lock()
            .unwrap()
            .entry(channel.to_string())
            .or_default()
            .push(data);
        Ok(())
    }

    fn on_message(&self, channel: &str, handler: MessageHandler) -> Result<(), QpError> {
        self.handlers
            .write()
            .unwrap()
            .insert(channel.to_string(), handler);
        Ok(())
    }

    fn start(&self) -> Result<(), QpError> {
        self.lifecycle.start()
    }

    async fn stop(&self, grace: Duration) {
        self.lifecycle.halt();
        tokio::time::sleep(grace).await;
        self.lifecycle.mark_stopped();
    }

    fn stop_chan(&self) -> StopChan {
        self.lifecycle.stop_chan()
    }
}
