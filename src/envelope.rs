//! Message envelopes and request identifiers.
//!
//! Two envelopes travel through the runtime: [`Transaction`] for pipelined
//! request/response traffic and [`Event`] for fire-and-forget pub/sub.
//! Both carry an opaque payload ([`serde_json::Value`]) that the runtime
//! never inspects. [`Message`] is the raw transport-layer unit: a source
//! channel plus the bytes a codec produced.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// REQUEST ID
// =============================================================================

/// Process-wide counter backing [`RequestId::next`].
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(0);

/// A monotonic identifier correlating a request with its reply.
///
/// Ids are allocated from a single process-wide atomic counter, so two
/// successive calls to [`RequestId::next`] always produce strictly
/// increasing values. Uniqueness holds within one process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId {
    /// The raw 64-bit id value.
    pub raw: u64,
}

impl RequestId {
    /// Allocate the next id from the process-wide counter.
    pub fn next() -> Self {
        RequestId {
            raw: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed) + 1,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

// =============================================================================
// ENVELOPES
// =============================================================================

/// The request envelope.
///
/// A transaction visits every endpoint named in `to`, in order; each hop
/// may mutate `data` before the transaction moves on. `from` records the
/// addresses visited so far, originator first — `from[0]` is also the
/// channel on which the originator waits for the reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Destination endpoints still to visit, in order.
    #[serde(default)]
    pub to: Vec<String>,
    /// Endpoints visited so far, originator first.
    #[serde(default)]
    pub from: Vec<String>,
    /// Correlation id, stable end-to-end.
    pub id: RequestId,
    /// Opaque payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Transaction {
    /// Abort the remaining pipeline.
    ///
    /// Clearing `to` makes the next hop route the transaction straight
    /// back to the originator.
    pub fn abort(&mut self) {
        self.to.clear();
    }
}

/// The fire-and-forget pub/sub envelope. No id, no reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Fully-qualified endpoint of the publisher (`name.instance`).
    pub from: String,
    /// Opaque payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "from: {} data: {}", self.from, self.data)
    }
}

/// The transport-layer unit: encoded bytes plus the channel they arrived on.
#[derive(Debug, Clone)]
pub struct Message {
    /// The channel the message came from.
    pub source: String,
    /// The encoded envelope.
    pub data: Vec<u8>,
}

// =============================================================================
// ENDPOINT NAMES
// =============================================================================

/// Build a fully-qualified endpoint name (`name.instance`).
///
/// An empty instance name is replaced with a generated unique identifier,
/// so replicas that do not care about their instance name never collide.
pub fn endpoint(name: &str, instance: &str) -> String {
    if instance.is_empty() {
        format!("{}.{}", name, Uuid::new_v4())
    } else {
        format!("{}.{}", name, instance)
    }
}
