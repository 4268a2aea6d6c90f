//! The serialization boundary.
//!
//! A [`Codec`] turns envelopes into octet buffers and back. The runtime
//! never inspects payload contents; any codec that round-trips the
//! envelope field structure (string lists, integer id, opaque value) is
//! acceptable. [`JsonCodec`] is the reference implementation; binary
//! codecs plug in through the same contract.

use crate::common::QpError;
use crate::envelope::{Event, Transaction};

/// Encoder/decoder for the two envelope types.
///
/// Components hold codecs as `Arc<dyn Codec>`, so implementations must be
/// thread-safe and stateless (or internally synchronized).
pub trait Codec: Send + Sync {
    /// Serialize a transaction to bytes.
    fn marshal_transaction(&self, tx: &Transaction) -> Result<Vec<u8>, QpError>;

    /// Deserialize a transaction from bytes.
    fn unmarshal_transaction(&self, data: &[u8]) -> Result<Transaction, QpError>;

    /// Serialize an event to bytes.
    fn marshal_event(&self, event: &Event) -> Result<Vec<u8>, QpError>;

    /// Deserialize an event from bytes.
    fn unmarshal_event(&self, data: &[u8]) -> Result<Event, QpError>;
}

/// The reference JSON codec.
///
/// Wire format:
///
/// ```text
/// {"to":["b","c"],"from":["a.0"],"id":1,"data":...}   transaction
/// {"from":"publisher.id","data":...}                  event
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn marshal_transaction(&self, tx: &Transaction) -> Result<Vec<u8>, QpError> {
        serde_json::to_vec(tx).map_err(|e| QpError::Encode(e.to_string()))
    }

    fn unmarshal_transaction(&self, data: &[u8]) -> Result<Transaction, QpError> {
        serde_json::from_slice(data).map_err(|e| QpError::Decode(e.to_string()))
    }

    fn marshal_event(&self, event: &Event) -> Result<Vec<u8>, QpError> {
        serde_json::to_vec(event).map_err(|e| QpError::Encode(e.to_string()))
    }

    fn unmarshal_event(&self, data: &[u8]) -> Result<Event, QpError> {
        serde_json::from_slice(data).map_err(|e| QpError::Decode(e.to_string()))
    }
}
