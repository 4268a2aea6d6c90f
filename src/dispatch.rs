//! Channel-to-handler maps.
//!
//! Two flavors back the two communication patterns: [`DirectDispatcher`]
//! matches channels by exact equality, [`PubSubDispatcher`] additionally
//! understands wildcard keys (a trailing `*` appended by the framework,
//! never by the user). Both append handlers on `track` and return them in
//! insertion order on `find`; both take the writer lock on `track` and the
//! reader lock on `find`.

use std::collections::HashMap;
use std::sync::RwLock;

/// Whether a subscription key matches a source channel.
///
/// A key ending in `*` matches its own prefix exactly, plus every
/// descendant of it in the dotted hierarchy: `a.b*` matches `a.b` and
/// `a.b.c` but not `a.bx`. A key without `*` matches only exact equality.
pub fn channel_matches(key: &str, source: &str) -> bool {
    match key.strip_suffix('*') {
        Some(prefix) => {
            source == prefix || (source.starts_with(prefix) && source[prefix.len()..].starts_with('.'))
        }
        None => key == source,
    }
}

/// Exact-match dispatcher for point-to-point channels.
#[derive(Debug)]
pub struct DirectDispatcher<H> {
    items: RwLock<HashMap<String, Vec<H>>>,
}

impl<H: Clone> DirectDispatcher<H> {
    pub fn new() -> Self {
        DirectDispatcher {
            items: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler for a channel, appending to any already there.
    /// Returns `true` when this is the first handler for the channel.
    pub fn track(&self, channel: &str, handler: H) -> bool {
        let mut items = self.items.write().unwrap();
        let handlers = items.entry(channel.to_string()).or_default();
        handlers.push(handler);
        handlers.len() == 1
    }

    /// The handlers registered for a channel, in insertion order.
    pub fn find(&self, channel: &str) -> Vec<H> {
        self.items
            .read()
            .unwrap()
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }
}

impl<H: Clone> Default for DirectDispatcher<H> {
    fn default() -> Self {
        Self::new()
    }
}

/// Wildcard-aware dispatcher for pub/sub channels.
///
/// Keys are stored in registration order so `find` concatenates matching
/// handler lists deterministically.
#[derive(Debug)]
pub struct PubSubDispatcher<H> {
    items: RwLock<Vec<(String, Vec<H>)>>,
}

impl<H: Clone> PubSubDispatcher<H> {
    pub fn new() -> Self {
        PubSubDispatcher {
            items: RwLock::new(Vec::new()),
        }
    }

    /// Register a handler under a key, appending to any already there.
    /// Returns `true` when this is the first handler for the key.
    pub fn track(&self, key: &str, handler: H) -> bool {
        let mut items = self.items.write().unwrap();
        if let Some((_, handlers)) = items.iter_mut().find(|(k, _)| k == key) {
            handlers.push(handler);
            false
        } else {
            items.push((key.to_string(), vec![handler]));
            true
        }
    }

    /// Replace the registration for a key with a single handler.
    pub fn set(&self, key: &str, handler: H) {
        let mut items = self.items.write().unwrap();
        if let Some((_, handlers)) = items.iter_mut().find(|(k, _)| k == key) {
            *handlers = vec![handler];
        } else {
            items.push((key.to_string(), vec![handler]));
        }
    }

    /// Every handler whose key matches the source channel, scanning all
    /// entries and concatenating the matches in insertion order.
    pub fn find(&self, source: &str) -> Vec<H> {
        let items = self.items.read().unwrap();
        let mut matched = Vec::new();
        for (key, handlers) in items.iter() {
            if channel_matches(key, source) {
                matched.extend(handlers.iter().cloned());
            }
        }
        matched
    }

    /// The handlers registered under exactly this key, ignoring wildcard
    /// semantics.
    pub fn find_key(&self, key: &str) -> Vec<H> {
        self.items
            .read()
            .unwrap()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, handlers)| handlers.clone())
            .unwrap_or_default()
    }
}

impl<H: Clone> Default for PubSubDispatcher<H> {
    fn default() -> Self {
        Self::new()
    }
}
