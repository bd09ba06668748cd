//! Admission control for inbound requests.
//!
//! Two rules, checked under one lock: a request identical to one currently
//! being handled is a duplicate, and the number of concurrently-handled
//! requests never exceeds the capacity. Rejections leave the set untouched.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Identity of one in-flight request: its topic and raw payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InFlightKey {
    topic: String,
    payload: Vec<u8>,
}

impl InFlightKey {
    pub fn new(topic: &str, payload: &[u8]) -> Self {
        Self {
            topic: topic.to_owned(),
            payload: payload.to_vec(),
        }
    }
}

/// Outcome of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The key was inserted; the caller now owns handling and must call
    /// `finish` when done.
    Admitted,
    /// The same (topic, payload) is already being handled.
    Duplicate,
    /// The capacity bound is reached.
    Saturated,
}

/// The set of requests currently being handled, bounded by a fixed capacity.
///
/// Cheaply cloneable via `Arc`; the set length *is* the admission counter,
/// so the two can never disagree.
#[derive(Clone)]
pub struct InFlightSet {
    capacity: usize,
    items: Arc<Mutex<HashSet<InFlightKey>>>,
}

impl InFlightSet {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Try to admit a request. Duplicate detection runs before the capacity
    /// check; neither rejection path touches the set.
    pub fn try_admit(&self, key: &InFlightKey) -> Admission {
        let Ok(mut items) = self.items.lock() else {
            return Admission::Saturated;
        };
        if items.contains(key) {
            return Admission::Duplicate;
        }
        if items.len() >= self.capacity {
            return Admission::Saturated;
        }
        items.insert(key.clone());
        Admission::Admitted
    }

    /// Mark a request as handled, removing it from the set. Must run on all
    /// completion paths of an admitted request.
    pub fn finish(&self, key: &InFlightKey) {
        if let Ok(mut items) = self.items.lock() {
            items.remove(key);
        }
    }

    /// Number of requests currently being handled.
    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
