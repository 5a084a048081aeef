//! # DeadSet: supervisor memory of workers confirmed inactive this run.
//!
//! ## Rules
//! - A worker enters once its consecutive probe misses reach the threshold
//!   (or directly, when its registry status is `DEAD`).
//! - Members are not probed again.
//! - A member leaves only through [`DeadSet::release`]: after a restart was
//!   triggered for it, or once its registry key is gone.
//! - A passing probe resets the miss counter.

use std::collections::{BTreeSet, HashMap};

/// Set of dead workers plus per-worker consecutive miss counters.
#[derive(Debug, Default, Clone)]
pub struct DeadSet {
    members: BTreeSet<String>,
    misses: HashMap<String, u32>,
}

impl DeadSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.contains(name)
    }

    /// Adds `name`; returns `true` if it was not a member yet.
    pub fn insert(&mut self, name: &str) -> bool {
        self.misses.remove(name);
        self.members.insert(name.to_string())
    }

    /// Removes `name` so the next pass probes it again.
    pub fn release(&mut self, name: &str) -> bool {
        self.misses.remove(name);
        self.members.remove(name)
    }

    /// Drops members and counters of workers no longer registered.
    pub fn retain_known(&mut self, registered: &[String]) {
        self.members.retain(|n| registered.contains(n));
        self.misses.retain(|n, _| registered.contains(n));
    }

    /// Counts one failed probe; returns `true` once `threshold` consecutive misses are reached.
    pub fn record_miss(&mut self, name: &str, threshold: u32) -> bool {
        let count = self.misses.entry(name.to_string()).or_insert(0);
        *count += 1;
        *count >= threshold.max(1)
    }

    /// Forgets the misses of a worker whose probe passed.
    pub fn record_pass(&mut self, name: &str) {
        self.misses.remove(name);
    }

    /// Consecutive misses recorded for `name`.
    pub fn misses(&self, name: &str) -> u32 {
        self.misses.get(name).copied().unwrap_or(0)
    }

    /// Members in name order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
