// Copyright (c) 2023 Graphcore Ltd. All rights reserved.

//! Wakeup queues: which components want to be re-ticked, and when.
//!
//! The master scheduler only ever needs the single soonest wakeup per
//! component (a later request from the same component simply supersedes an
//! earlier one), so [`MasterWakeupQueue`] is a flat map. A slave scheduler's
//! embedded sub-simulation can have several components wanting wakeups at
//! different times simultaneously pending, so [`SlaveWakeupQueue`] keeps a
//! full ordered multiset.

use std::collections::{BTreeMap, HashMap};

use tickit_core::{ComponentId, SimTime};

/// One pending wakeup per component, keyed by the soonest requested time.
#[derive(Default)]
pub struct MasterWakeupQueue {
    pending: HashMap<ComponentId, SimTime>,
}

impl MasterWakeupQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `component` wants a wakeup at `at`. A component may only
    /// have one pending wakeup outstanding; the most recent request wins.
    pub fn add(&mut self, component: ComponentId, at: SimTime) {
        self.pending.insert(component, at);
    }

    pub fn remove(&mut self, component: &ComponentId) {
        self.pending.remove(component);
    }

    /// The earliest pending wakeup across all components, if any.
    #[must_use]
    pub fn first(&self) -> Option<SimTime> {
        self.pending.values().min().copied()
    }

    /// Remove and return every component whose wakeup is due at or before
    /// `time`.
    pub fn pop_due(&mut self, time: SimTime) -> Vec<ComponentId> {
        let due: Vec<ComponentId> = self
            .pending
            .iter()
            .filter(|(_, &at)| at <= time)
            .map(|(c, _)| c.clone())
            .collect();
        for c in &due {
            self.pending.remove(c);
        }
        due
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// A priority queue of pending wakeups for a slave scheduler's embedded
/// sub-simulation, where more than one request can be outstanding for the
/// same component at different times.
///
/// Grounded on a `BTreeMap<SimTime, Vec<ComponentId>>` ordering: nanosecond
/// keys are unique enough in practice that collisions are rare, but are
/// handled by bucketing rather than assumed away.
#[derive(Default)]
pub struct SlaveWakeupQueue {
    by_time: BTreeMap<SimTime, Vec<ComponentId>>,
}

impl SlaveWakeupQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, component: ComponentId, at: SimTime) {
        self.by_time.entry(at).or_default().push(component);
    }

    #[must_use]
    pub fn peek_min(&self) -> Option<SimTime> {
        self.by_time.keys().next().copied()
    }

    /// Remove and return every component scheduled at the soonest pending
    /// time, along with that time. `None` if the queue is empty.
    pub fn pop_min(&mut self) -> Option<(SimTime, Vec<ComponentId>)> {
        let time = *self.by_time.keys().next()?;
        let components = self.by_time.remove(&time).expect("key just observed present");
        Some((time, components))
    }

    /// Remove and return every `(time, component)` pair scheduled strictly
    /// before `time`, in ascending time order. Used when an interrupt
    /// forces the embedded simulation to catch up before the interrupt's
    /// own tick.
    pub fn drain_before(&mut self, time: SimTime) -> Vec<(SimTime, ComponentId)> {
        let mut out = Vec::new();
        let due_times: Vec<SimTime> = self.by_time.range(..time).map(|(t, _)| *t).collect();
        for t in due_times {
            if let Some(components) = self.by_time.remove(&t) {
                out.extend(components.into_iter().map(|c| (t, c)));
            }
        }
        out
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_time.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(s: &str) -> ComponentId {
        ComponentId::new(s).unwrap()
    }

    #[test]
    fn master_queue_reports_earliest_pending() {
        let mut q = MasterWakeupQueue::new();
        q.add(cid("a"), SimTime::from_nanos(200));
        q.add(cid("b"), SimTime::from_nanos(100));
        assert_eq!(q.first(), Some(SimTime::from_nanos(100)));
    }

    #[test]
    fn master_queue_later_request_supersedes_earlier() {
        let mut q = MasterWakeupQueue::new();
        q.add(cid("a"), SimTime::from_nanos(100));
        q.add(cid("a"), SimTime::from_nanos(500));
        assert_eq!(q.first(), Some(SimTime::from_nanos(500)));
    }

    #[test]
    fn master_queue_pop_due_is_monotone() {
        let mut q = MasterWakeupQueue::new();
        q.add(cid("a"), SimTime::from_nanos(100));
        q.add(cid("b"), SimTime::from_nanos(300));

        let due = q.pop_due(SimTime::from_nanos(100));
        assert_eq!(due, vec![cid("a")]);
        assert_eq!(q.first(), Some(SimTime::from_nanos(300)));
    }

    #[test]
    fn slave_queue_supports_multiple_pending_times() {
        let mut q = SlaveWakeupQueue::new();
        q.add(cid("a"), SimTime::from_nanos(50));
        q.add(cid("b"), SimTime::from_nanos(10));
        q.add(cid("c"), SimTime::from_nanos(10));

        let (time, mut components) = q.pop_min().unwrap();
        assert_eq!(time, SimTime::from_nanos(10));
        components.sort();
        assert_eq!(components, vec![cid("b"), cid("c")]);

        let (time, components) = q.pop_min().unwrap();
        assert_eq!(time, SimTime::from_nanos(50));
        assert_eq!(components, vec![cid("a")]);
        assert!(q.is_empty());
    }

    #[test]
    fn slave_queue_drain_before_is_ascending_and_exclusive() {
        let mut q = SlaveWakeupQueue::new();
        q.add(cid("a"), SimTime::from_nanos(10));
        q.add(cid("b"), SimTime::from_nanos(20));
        q.add(cid("c"), SimTime::from_nanos(30));

        let drained = q.drain_before(SimTime::from_nanos(20));
        assert_eq!(
            drained,
            vec![(SimTime::from_nanos(10), cid("a"))]
        );
        assert_eq!(q.peek_min(), Some(SimTime::from_nanos(20)));
    }
}
