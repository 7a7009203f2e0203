// keysynth -- a minimal keyboard and MIDI synthesizer
// Copyright (C) 2020  Fabian Thorand
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation.
//
// A copy of the license can be found in the LICENSE file in the root of
// this repository.

//! Deferred work that becomes due at some point on the engine clock.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

/// Opaque handle of a scheduled task, needed for cancelling it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

/// A queue of payloads ordered by the time they become due.
/// Tasks due at the same time come out in the order they were scheduled.
///
/// # Examples
///
/// ```
/// use keysynth::schedule::Scheduler;
///
/// let mut scheduler = Scheduler::new();
/// let late = scheduler.schedule(2.0, "late");
/// scheduler.schedule(1.0, "early");
/// assert_eq!(scheduler.cancel(late), Some("late"));
///
/// assert_eq!(scheduler.pop_due(0.5), None);
/// assert_eq!(scheduler.pop_due(1.0).map(|(_, task)| task), Some("early"));
/// assert!(scheduler.is_empty());
/// ```
pub struct Scheduler<T> {
    next_id: u64,
    queue: BinaryHeap<Queued>,
    /// Payloads of tasks which are neither due nor cancelled yet.
    pending: HashMap<TaskId, T>,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            queue: BinaryHeap::new(),
            pending: HashMap::new(),
        }
    }

    pub fn schedule(&mut self, due: f64, task: T) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.queue.push(Queued { due, id });
        self.pending.insert(id, task);
        id
    }

    /// Prevent a task from ever becoming due, handing back its payload.
    /// Returns `None` if the task already ran or was cancelled before.
    pub fn cancel(&mut self, id: TaskId) -> Option<T> {
        // The heap entry stays behind and is skipped once it surfaces.
        self.pending.remove(&id)
    }

    /// Take the earliest task due at or before `now`.
    pub fn pop_due(&mut self, now: f64) -> Option<(TaskId, T)> {
        while let Some(next) = self.queue.peek() {
            if next.due > now {
                return None;
            }
            let id = next.id;
            self.queue.pop();
            if let Some(task) = self.pending.remove(&id) {
                return Some((id, task));
            }
        }
        None
    }

    /// Time at which the next task becomes due.
    pub fn next_due(&mut self) -> Option<f64> {
        while let Some(next) = self.queue.peek() {
            if self.pending.contains_key(&next.id) {
                return Some(next.due);
            }
            self.queue.pop();
        }
        None
    }

    /// Remove all tasks regardless of their time, earliest first.
    pub fn drain(&mut self) -> Vec<T> {
        let mut tasks = Vec::with_capacity(self.pending.len());
        while let Some(next) = self.queue.pop() {
            if let Some(task) = self.pending.remove(&next.id) {
                tasks.push(task);
            }
        }
        tasks
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

struct Queued {
    due: f64,
    id: TaskId,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The earlier the due time, the larger the entry (in order to use them in the standard binary heap).
impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .total_cmp(&self.due)
            .then_with(|| other.id.0.cmp(&self.id.0))
    }
}
