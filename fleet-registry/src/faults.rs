use chrono::{DateTime, Utc};
use fleet_core::FaultType;
use std::collections::{BTreeMap, BTreeSet};

/// Active fault injections for one agent, keyed by fault type so a second
/// injection of the same type refreshes the expiry instead of duplicating.
#[derive(Debug, Default, Clone)]
pub struct FaultSet {
    entries: BTreeMap<FaultType, DateTime<Utc>>,
}

impl FaultSet {
    /// Inserts the fault or refreshes its expiry if already active.
    pub fn inject(&mut self, fault_type: FaultType, expires_at: DateTime<Utc>) {
        self.entries.insert(fault_type, expires_at);
    }

    /// Drops every fault whose expiry has passed. Called by every read and
    /// write path before evaluation, so an expired fault is never observable
    /// even though no background timer runs.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, expires_at| now < *expires_at);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn kinds(&self) -> BTreeSet<FaultType> {
        self.entries.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn expires_at(&self, fault_type: FaultType) -> Option<DateTime<Utc>> {
        self.entries.get(&fault_type).copied()
    }
}
