//! Subscriber Set - Live Delivery Channels
//!
//! Owned, concurrency-safe membership of connected subscribers. The
//! gateway inserts on accept and removes on close; the broadcast loop
//! takes a membership snapshot per tick and removes members whose send
//! failed. Nothing else can mutate it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use prometheus::IntGauge;

use crate::ports::subscriber::{Subscriber, SubscriberId};

/// Set of currently connected subscribers keyed by identity.
#[derive(Default)]
pub struct SubscriberSet {
    members: Mutex<HashMap<SubscriberId, Arc<dyn Subscriber>>>,
    /// Mirrors the member count, when metrics are wired.
    gauge: Option<IntGauge>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set that keeps `gauge` equal to its size.
    pub fn with_gauge(gauge: IntGauge) -> Self {
        Self {
            members: Mutex::default(),
            gauge: Some(gauge),
        }
    }

    // The map stays consistent even if a holder panicked: every critical
    // section is a single insert/remove/clone.
    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, Arc<dyn Subscriber>>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, len: usize) {
        if let Some(gauge) = &self.gauge {
            gauge.set(i64::try_from(len).unwrap_or(i64::MAX));
        }
    }

    /// Add a subscriber; returns the new member count.
    pub fn add(&self, subscriber: Arc<dyn Subscriber>) -> usize {
        let len = {
            let mut members = self.lock();
            members.insert(subscriber.id(), subscriber);
            members.len()
        };
        self.publish(len);
        len
    }

    /// Remove a subscriber; returns whether it was present.
    pub fn remove(&self, id: &SubscriberId) -> bool {
        let (removed, len) = {
            let mut members = self.lock();
            let removed = members.remove(id).is_some();
            (removed, members.len())
        };
        self.publish(len);
        removed
    }

    /// Current members, detached from the set.
    ///
    /// Members added after this call are not part of the returned list.
    pub fn snapshot(&self) -> Vec<Arc<dyn Subscriber>> {
        self.lock().values().cloned().collect()
    }

    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
