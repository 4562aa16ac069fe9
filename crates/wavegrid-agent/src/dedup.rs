//! Bounded LRU of processed command ids and their acks.
//!
//! Duplicate deliveries must be applied at-most-once: the agent re-emits
//! the ack it stored for the first delivery instead of re-executing.

use std::collections::{HashMap, VecDeque};

use wave_core::MonitoringEvent;

/// Bounded map command_id → ack, evicting oldest first.
pub struct RecentCommands {
    capacity: usize,
    order: VecDeque<String>,
    acks: HashMap<String, MonitoringEvent>,
}

impl RecentCommands {
    pub fn new(capacity: usize) -> Self {
        RecentCommands {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            acks: HashMap::new(),
        }
    }

    /// The ack previously emitted for this command, if remembered.
    pub fn get(&self, command_id: &str) -> Option<&MonitoringEvent> {
        self.acks.get(command_id)
    }

    /// Remember the ack for a processed command, evicting the oldest
    /// entry beyond capacity.
    pub fn insert(&mut self, command_id: String, ack: MonitoringEvent) {
        if self.acks.insert(command_id.clone(), ack).is_none() {
            self.order.push_back(command_id);
        }
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.acks.remove(&evicted);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.acks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.acks.is_empty()
    }
}
