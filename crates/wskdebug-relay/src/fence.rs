// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Activation dedup fence.
//!
//! Transports may hand the same activation out more than once (the polling
//! variant re-reads the activation log). The fence remembers the most recent
//! ids so each one reaches the local runtime at most once.

use std::collections::{HashSet, VecDeque};

/// Default number of remembered activation ids.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Bounded set of already dispatched activation ids, oldest evicted first.
#[derive(Debug)]
pub struct ActivationFence {
    capacity: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl Default for ActivationFence {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ActivationFence {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    /// Record an id. Returns false if it was already recorded.
    pub fn insert(&mut self, activation_id: &str) -> bool {
        if self.seen.contains(activation_id) {
            return false;
        }
        if self.order.len() == self.capacity
            && let Some(oldest) = self.order.pop_front()
        {
            self.seen.remove(&oldest);
        }
        self.order.push_back(activation_id.to_string());
        self.seen.insert(activation_id.to_string());
        true
    }

    pub fn contains(&self, activation_id: &str) -> bool {
        self.seen.contains(activation_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_duplicates() {
        let mut fence = ActivationFence::default();
        assert!(fence.insert("a1"));
        assert!(!fence.insert("a1"));
        assert!(fence.insert("a2"));
        assert_eq!(fence.len(), 2);
    }

    #[test]
    fn test_evicts_oldest() {
        let mut fence = ActivationFence::new(2);
        fence.insert("a1");
        fence.insert("a2");
        fence.insert("a3");
        assert!(!fence.contains("a1"));
        assert!(fence.contains("a2"));
        assert!(fence.contains("a3"));
        assert_eq!(fence.len(), 2);
    }
}
