// Copyright 2019 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::{collections::HashMap, time::Duration};

#[derive(PartialEq, Eq, Hash, Debug, Copy, Clone)]
pub struct EventId(pub u64);

/// A host facility able to deliver a wake-up after some delay.
///
/// When a scheduled deadline passes, the host must hand the returned `EventId` back
/// to the station through `MlmeHandle::timer_fired`. It never calls into the state
/// machines directly.
pub trait Scheduler {
    /// Requests a wake-up after `delay`. Returns a unique ID used to cancel it.
    fn schedule(&mut self, delay: Duration) -> EventId;
    /// Cancels a previously scheduled wake-up. Unknown IDs are ignored.
    fn cancel(&mut self, id: EventId);
}

/// A timer to schedule and cancel timeouts and retrieve triggered events.
pub struct Timer<E> {
    events: HashMap<EventId, E>,
    scheduler: Box<dyn Scheduler + Send>,
}

impl<E> Timer<E> {
    pub fn new(scheduler: Box<dyn Scheduler + Send>) -> Self {
        Self { events: HashMap::default(), scheduler }
    }

    /// Returns the event bound to `event_id` exactly once. Canceled events yield `None`.
    pub fn triggered(&mut self, event_id: &EventId) -> Option<E> {
        self.events.remove(event_id)
    }

    pub fn schedule_event(&mut self, delay: Duration, event: E) -> EventId {
        let event_id = self.scheduler.schedule(delay);
        self.events.insert(event_id, event);
        event_id
    }

    pub fn cancel_event(&mut self, event_id: EventId) {
        if self.events.remove(&event_id).is_some() {
            self.scheduler.cancel(event_id);
        }
    }
}

#[cfg(test)]
pub use test_utils::*;
