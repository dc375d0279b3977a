// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! C9: the notification/completion bus. Broadcasts named events
//! (`FSW_PREP_DONE`, `FSW_DONE`, `FSW_FAILED`, …) to whichever sibling
//! tasks have registered interest, and wakes them via `sys_post` the same
//! way every other cross-task signal in this framework works (§5:
//! "publishing a notification happens-before every subscriber's wake").
//!
//! A single coordinator task has no in-process blocked callers to wake —
//! every FSM entry point here is a direct function call, not a queued
//! message — so the bus's only job is routing a named event out to
//! whichever *other* task (typically the host messenger, which owes the
//! host a `WDDR_FREQ_PREP_RESP` once a switch completes) asked to hear
//! about it.

use fixedmap::FixedMap;

#[cfg(target_os = "none")]
use userlib::sys_post;
use userlib::TaskId;

/// Named events the four in-scope subsystems ever publish. Deliberately
/// flat (not per-FSM) so one bus and one subscriber table cover all of
/// them.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NotifyEvent {
    FswPrepDone,
    FswDone,
    FswFailed,
    DfiUpdateDone,
    TrainingDone,
    TrainingFailed,
}

impl NotifyEvent {
    /// Bit posted to a subscriber's notification word. Each event owns a
    /// distinct bit so a subscriber woken for one reason can distinguish
    /// it from another without an extra round-trip.
    pub fn notification_bit(self) -> u32 {
        1 << match self {
            NotifyEvent::FswPrepDone => 0,
            NotifyEvent::FswDone => 1,
            NotifyEvent::FswFailed => 2,
            NotifyEvent::DfiUpdateDone => 3,
            NotifyEvent::TrainingDone => 4,
            NotifyEvent::TrainingFailed => 5,
        }
    }
}

const MAX_SUBSCRIBERS: usize = 8;

/// The completion bus. Owned by the coordinator; every FSM reports its
/// notifications here rather than calling `sys_post` directly, so the
/// subscriber table is the only place that knows about task IDs.
#[derive(Default)]
pub struct NotifyBus {
    subscribers: FixedMap<NotifyEvent, TaskId, MAX_SUBSCRIBERS>,
    /// Running count of every event ever published, for introspection --
    /// mirrors the `counters::Count` treatment the rest of this firmware
    /// gives its `Trace` ring buffers, but keyed by event instead of call
    /// site.
    published: [u32; 6],
}

impl NotifyBus {
    pub fn new() -> Self {
        NotifyBus { subscribers: FixedMap::default(), published: [0; 6] }
    }

    /// Registers `task` to be woken the next time `event` is published.
    /// Registration is one-shot from the bus's point of view: a
    /// subscriber that wants to hear about the same event again must
    /// re-subscribe, the same way a Hubris task re-arms a blocking
    /// `sys_recv` after it wakes.
    pub fn subscribe(&mut self, event: NotifyEvent, task: TaskId) {
        self.subscribers.insert(event, task);
    }

    /// Publishes `event`: bumps its counter and, if a task is currently
    /// subscribed, posts its notification bit and clears the
    /// subscription.
    pub fn publish(&mut self, event: NotifyEvent) {
        self.published[event as usize] = self.published[event as usize].wrapping_add(1);
        if let Some(task) = self.subscribers.get(event) {
            self.post(task, event.notification_bit());
            self.subscribers.remove(event);
        }
    }

    pub fn count(&self, event: NotifyEvent) -> u32 {
        self.published[event as usize]
    }

    #[cfg(target_os = "none")]
    fn post(&self, task: TaskId, bits: u32) {
        sys_post(task, bits);
    }

    #[cfg(not(target_os = "none"))]
    fn post(&self, _task: TaskId, _bits: u32) {}
}

#[cfg(test)]
mod test {
    use super::*;

    fn fake_task(id: usize) -> TaskId {
        TaskId::for_index_and_gen(id, userlib::Generation::from(0u8))
    }

    #[test]
    fn publish_without_subscriber_only_counts() {
        let mut bus = NotifyBus::new();
        bus.publish(NotifyEvent::FswDone);
        assert_eq!(bus.count(NotifyEvent::FswDone), 1);
    }

    #[test]
    fn subscription_is_one_shot() {
        let mut bus = NotifyBus::new();
        bus.subscribe(NotifyEvent::FswPrepDone, fake_task(1));
        bus.publish(NotifyEvent::FswPrepDone);
        assert!(bus.subscribers.get(NotifyEvent::FswPrepDone).is_none());
    }

    #[test]
    fn distinct_events_have_distinct_bits() {
        let mut seen = heapless::Vec::<u32, 8>::new();
        for event in [
            NotifyEvent::FswPrepDone,
            NotifyEvent::FswDone,
            NotifyEvent::FswFailed,
            NotifyEvent::DfiUpdateDone,
            NotifyEvent::TrainingDone,
            NotifyEvent::TrainingFailed,
        ] {
            let bit = event.notification_bit();
            assert!(!seen.contains(&bit));
            seen.push(bit).unwrap();
        }
    }
}
