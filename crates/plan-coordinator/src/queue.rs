//! Two-tier plan queue.
//!
//! High-priority entries always sit ahead of low-priority ones and keep
//! FIFO order among themselves; low-priority entries are FIFO behind them.
//! A package is queued at most once.

use std::collections::VecDeque;

use crate::request::{PlanRequest, Priority};

/// Outcome of offering a request to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enqueued {
    /// Added as a new entry.
    Inserted,
    /// An existing low entry for the package was promoted to high.
    Promoted,
    /// The package was already queued at equal or higher priority.
    Duplicate,
}

#[derive(Debug, Default)]
pub struct PlanQueue {
    /// `entries[..high_len]` are high priority, the rest low.
    entries: VecDeque<PlanRequest>,
    high_len: usize,
}

impl PlanQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a request according to its priority.
    pub fn push(&mut self, request: PlanRequest) -> Enqueued {
        match self.position(&request.package) {
            Some(idx) if idx < self.high_len => Enqueued::Duplicate,
            Some(_) if request.priority == Priority::Low => Enqueued::Duplicate,
            Some(idx) => {
                self.entries.remove(idx);
                self.insert_high(request);
                Enqueued::Promoted
            }
            None => {
                match request.priority {
                    Priority::High => self.insert_high(request),
                    Priority::Low => self.entries.push_back(request),
                }
                Enqueued::Inserted
            }
        }
    }

    fn insert_high(&mut self, request: PlanRequest) {
        self.entries.insert(self.high_len, request);
        self.high_len += 1;
    }

    /// Remove and return the head of the queue.
    pub fn pop(&mut self) -> Option<PlanRequest> {
        let head = self.entries.pop_front()?;
        if self.high_len > 0 {
            self.high_len -= 1;
        }
        Some(head)
    }

    pub fn peek(&self) -> Option<&PlanRequest> {
        self.entries.front()
    }

    pub fn contains(&self, package: &str) -> bool {
        self.position(package).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn high_len(&self) -> usize {
        self.high_len
    }

    /// Package names in drain order.
    pub fn packages(&self) -> Vec<&str> {
        self.entries.iter().map(|r| r.package.as_str()).collect()
    }

    fn position(&self, package: &str) -> Option<usize> {
        self.entries.iter().position(|r| r.package == package)
    }
}
