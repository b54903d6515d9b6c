use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use super::messages::OutboundPayload;

/// Which entry to discard when the buffer is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest buffered payload to make room
    #[default]
    DropOldest,
    /// Reject the incoming payload
    DropNewest,
}

/// Bounded FIFO of payloads awaiting transmission
///
/// Insertion order is send order.
#[derive(Debug)]
pub struct OutboundBuffer {
    queue: VecDeque<OutboundPayload>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl OutboundBuffer {
    /// `capacity` is raised to at least one entry
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            queue: VecDeque::with_capacity(capacity.min(64)),
            capacity,
            policy,
        }
    }

    /// Append a payload; returns the payload discarded by the overflow policy, if any
    pub fn push(&mut self, payload: OutboundPayload) -> Option<OutboundPayload> {
        if self.queue.len() < self.capacity {
            self.queue.push_back(payload);
            return None;
        }

        match self.policy {
            OverflowPolicy::DropOldest => {
                let evicted = self.queue.pop_front();
                self.queue.push_back(payload);
                evicted
            }
            OverflowPolicy::DropNewest => Some(payload),
        }
    }

    /// Put back a payload whose send failed so it goes out first next time
    pub fn requeue(&mut self, payload: OutboundPayload) -> Option<OutboundPayload> {
        self.queue.push_front(payload);
        if self.queue.len() > self.capacity {
            // The requeued payload is the oldest; keep order, shed the newest
            return self.queue.pop_back();
        }
        None
    }

    pub fn pop_front(&mut self) -> Option<OutboundPayload> {
        self.queue.pop_front()
    }

    /// Discard everything; returns how many payloads were discarded
    pub fn clear(&mut self) -> usize {
        let count = self.queue.len();
        self.queue.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }
}
