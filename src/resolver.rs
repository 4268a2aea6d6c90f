//! Correlation of outstanding requests with their replies.
//!
//! The [`Resolver`] maps every in-flight [`RequestId`] to a one-shot
//! delivery slot; the matching [`ResponseFuture`] is the consumer end.
//! Tracking and resolving each take one short critical section over the
//! id map; the handoff to the waiter happens outside the lock so a slow
//! consumer cannot block other resolutions.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::common::QpError;
use crate::envelope::{RequestId, Transaction};

/// Tracks outstanding request futures and resolves them when replies
/// arrive.
#[derive(Debug)]
pub struct Resolver {
    items: Mutex<HashMap<RequestId, oneshot::Sender<Transaction>>>,
}

impl Resolver {
    pub fn new() -> Self {
        Resolver {
            items: Mutex::new(HashMap::new()),
        }
    }

    /// Begin tracking an id, returning the future its reply will resolve.
    ///
    /// A duplicate id is rejected: the existing entry wins and
    /// `DuplicateCorrelation` is returned.
    pub fn track(&self, id: RequestId) -> Result<ResponseFuture, QpError> {
        let (tx, rx) = oneshot::channel();
        let mut items = self.items.lock().unwrap();
        if items.contains_key(&id) {
            tracing::warn!(%id, "refusing to track duplicate request id");
            return Err(QpError::DuplicateCorrelation(id));
        }
        items.insert(id, tx);
        Ok(ResponseFuture::new(id, rx))
    }

    /// Resolve the future tracked for `reply.id`, delivering the reply.
    ///
    /// Fails with `UnknownCorrelation` when no future is outstanding for
    /// the id — a duplicate or stray reply. Delivery happens after the
    /// map lock is released; if the waiter has already given up the value
    /// is parked in the slot for a later poll.
    pub fn resolve(&self, reply: Transaction) -> Result<(), QpError> {
        let slot = {
            let mut items = self.items.lock().unwrap();
            items.remove(&reply.id)
        };
        match slot {
            Some(tx) => {
                let id = reply.id;
                if tx.send(reply).is_err() {
                    tracing::debug!(%id, "reply delivered to an abandoned future");
                }
                Ok(())
            }
            None => Err(QpError::UnknownCorrelation(reply.id)),
        }
    }

    /// The number of requests still awaiting a reply.
    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

enum FutureState {
    Pending(oneshot::Receiver<Transaction>),
    Done(Transaction),
}

/// A one-shot holder for an inbound reply, with timeout.
///
/// Single-producer (the resolver), multi-consumer: once a reply has been
/// fetched it is cached, so repeated calls to [`response`](Self::response)
/// return the same transaction without blocking the producer. A call that
/// times out leaves the delivery slot intact; a later call can still pick
/// up a late reply.
pub struct ResponseFuture {
    id: RequestId,
    state: tokio::sync::Mutex<FutureState>,
}

impl ResponseFuture {
    fn new(id: RequestId, rx: oneshot::Receiver<Transaction>) -> Self {
        ResponseFuture {
            id,
            state: tokio::sync::Mutex::new(FutureState::Pending(rx)),
        }
    }

    /// The request id this future resolves.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Wait for the reply, up to `timeout`.
    ///
    /// Returns the cached reply immediately if one was already fetched,
    /// and `QpError::Timeout` when the wait expires or the resolver has
    /// gone away without delivering.
    pub async fn response(&self, timeout: Duration) -> Result<Transaction, QpError> {
        let mut state = self.state.lock().await;
        let waited = match &mut *state {
            FutureState::Done(reply) => return Ok(reply.clone()),
            FutureState::Pending(rx) => tokio::time::timeout(timeout, rx).await,
        };
        match waited {
            Ok(Ok(reply)) => {
                *state = FutureState::Done(reply.clone());
                Ok(reply)
            }
            // the resolver went away without delivering, or the wait
            // expired; either way the caller sees a timeout
            Ok(Err(_)) | Err(_) => Err(QpError::Timeout),
        }
    }
}

impl core::fmt::Debug for ResponseFuture {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ResponseFuture").field("id", &self.id).finish()
    }
}
