//! Bounded FIFO of integration events
//!
//! The queue stamps each accepted event with a sequence number. Sequences
//! start at 1 and come from a monotonic counter, so a number handed out
//! once is never handed out again after the event is popped. Once
//! `u32::MAX` has been issued the queue refuses further pushes.

use super::error::{IntegrationError, IntegrationResult};
use super::events::IntegrationEvent;
use std::collections::VecDeque;

/// Default queue capacity when none is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Bounded event queue. Pushing at capacity is rejected.
#[derive(Debug)]
pub struct EventQueue {
    events: VecDeque<IntegrationEvent>,
    capacity: usize,
    /// Wider than the issued type so exhaustion is observable
    next_sequence: u64,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity.min(DEFAULT_QUEUE_CAPACITY)),
            capacity,
            next_sequence: 1,
        }
    }

    /// Append an event, returning the sequence number assigned to it.
    ///
    /// Fails with `QueueFull` when `len() >= capacity()` and with
    /// `SequenceExhausted` after `u32::MAX` pushes; the queue is left
    /// untouched in both cases.
    pub fn push(&mut self, mut event: IntegrationEvent) -> IntegrationResult<u32> {
        if self.events.len() >= self.capacity {
            return Err(IntegrationError::QueueFull {
                capacity: self.capacity,
            });
        }
        let sequence =
            u32::try_from(self.next_sequence).map_err(|_| IntegrationError::SequenceExhausted)?;
        self.events.try_reserve(1)?;

        self.next_sequence += 1;
        event.sequence = sequence;
        self.events.push_back(event);
        Ok(sequence)
    }

    /// Remove and return the head of the queue.
    pub fn pop(&mut self) -> Option<IntegrationEvent> {
        self.events.pop_front()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop every pending event, returning how many were discarded.
    pub fn clear(&mut self) -> usize {
        let dropped = self.events.len();
        self.events.clear();
        dropped
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
