//! Destination for identity observations

use crate::types::{Identity, IdentityObservation};
use std::sync::{Arc, Mutex};

/// Receives every identity successfully attributed from a block.
/// Implementations must tolerate concurrent calls from several block
/// handlers; callers treat the sink as append-only.
pub trait IdentityObservationSink: Send + Sync {
    /// Record one identity. `block_number` is present for orderer
    /// observations and absent for endorser observations.
    fn build_up(&self, identity: Identity, block_number: Option<u64>);
}

impl<S: IdentityObservationSink + ?Sized> IdentityObservationSink for Arc<S> {
    fn build_up(&self, identity: Identity, block_number: Option<u64>) {
        (**self).build_up(identity, block_number)
    }
}

impl<S: IdentityObservationSink + ?Sized> IdentityObservationSink for &S {
    fn build_up(&self, identity: Identity, block_number: Option<u64>) {
        (**self).build_up(identity, block_number)
    }
}

/// Sink that keeps observations in arrival order, so they can be published
/// as one message per block
#[derive(Debug, Default)]
pub struct ObservationBatch {
    observations: Mutex<Vec<IdentityObservation>>,
}

impl ObservationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything recorded so far, leaving the batch empty
    pub fn drain(&self) -> Vec<IdentityObservation> {
        match self.observations.lock() {
            Ok(mut observations) => std::mem::take(&mut *observations),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }

    pub fn len(&self) -> usize {
        self.observations.lock().map(|o| o.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IdentityObservationSink for ObservationBatch {
    fn build_up(&self, identity: Identity, block_number: Option<u64>) {
        let observation = IdentityObservation {
            identity,
            block_number,
        };
        match self.observations.lock() {
            Ok(mut observations) => observations.push(observation),
            Err(poisoned) => poisoned.into_inner().push(observation),
        }
    }
}
