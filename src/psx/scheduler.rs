use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::bus::Bus;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum EventKind {
    VBlank,
    AudioSample,
    DmaComplete,
    Timer0Compare,
    Timer1Compare,
    Timer2Compare,
    Timer0Overflow,
    Timer1Overflow,
    Timer2Overflow,
    CdromGeneral,
    CdromReadOrPlay,
    Serial,
}

const EVENT_KINDS: usize = 12;

impl EventKind {
    fn index(self) -> usize {
        use self::EventKind::*;

        match self {
            VBlank => 0,
            AudioSample => 1,
            DmaComplete => 2,
            Timer0Compare => 3,
            Timer1Compare => 4,
            Timer2Compare => 5,
            Timer0Overflow => 6,
            Timer1Overflow => 7,
            Timer2Overflow => 8,
            CdromGeneral => 9,
            CdromReadOrPlay => 10,
            Serial => 11,
        }
    }
}

/// Runs between blocks with the bus and the scheduler itself, so it may
/// touch peripherals, raise interrupts and schedule more events.
pub type EventCallback = fn(&mut Bus, &mut Scheduler);

#[derive(Clone, Copy, Debug)]
pub struct ScheduledEvent {
    pub due: u64,
    pub callback: EventCallback,
    pub kind: EventKind,
}

pub struct Scheduler {
    events: Vec<ScheduledEvent>,
    now: u64,

    handlers: [Option<EventCallback>; EVENT_KINDS],
}

impl Scheduler {
    pub fn new() -> Scheduler {
        Scheduler {
            events: Vec::new(),
            now: 0,

            handlers: [None; EVENT_KINDS],
        }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn add_cycles(&mut self, cycles: u64) {
        self.now += cycles;
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn next_due(&self) -> Option<u64> {
        self.events.first().map(|event| event.due)
    }

    pub fn pending(&self, kind: EventKind) -> bool {
        self.events.iter().any(|event| event.kind == kind)
    }

    /// Records the callback used when a saved queue is restored.
    pub fn register(&mut self, kind: EventKind, callback: EventCallback) {
        self.handlers[kind.index()] = Some(callback);
    }

    pub fn handler(&self, kind: EventKind) -> Option<EventCallback> {
        self.handlers[kind.index()]
    }

    /// Queues `callback` to run `delay` cycles from now. Events due on the
    /// same cycle run in the order they were scheduled.
    pub fn schedule(&mut self, delay: u64, callback: EventCallback, kind: EventKind) {
        let due = self.now + delay;
        let index = self.events.partition_point(|event| event.due <= due);

        self.events.insert(index, ScheduledEvent {
            due: due,
            callback: callback,
            kind: kind,
        });

        self.register(kind, callback);
    }

    pub fn flush(&mut self, kind: EventKind) {
        self.events.retain(|event| event.kind != kind);
    }

    pub fn flush_all(&mut self) {
        self.events.clear();
    }

    pub fn pop_due(&mut self) -> Option<ScheduledEvent> {
        match self.events.first() {
            Some(event) if event.due <= self.now => Some(self.events.remove(0)),
            _ => None,
        }
    }

    /// Runs every event due by now, including ones scheduled by callbacks
    /// that are already due. Returns how many ran.
    pub fn run_due(&mut self, bus: &mut Bus) -> usize {
        let mut count = 0;

        while let Some(event) = self.pop_due() {
            (event.callback)(bus, self);
            count += 1;
        }

        count
    }

    /// Queue as (due cycle, kind) pairs, in dispatch order.
    pub fn queued(&self) -> Vec<(u64, EventKind)> {
        self.events.iter().map(|event| (event.due, event.kind)).collect()
    }

    /// Replaces the clock and the queue, binding each entry to the callback
    /// registered for its kind.
    pub fn restore(&mut self, now: u64, queued: &[(u64, EventKind)]) -> Result<()> {
        let mut events = Vec::with_capacity(queued.len());

        for &(due, kind) in queued {
            let callback = self.handler(kind).ok_or(Error::UnboundEvent(kind))?;

            events.push(ScheduledEvent {
                due: due,
                callback: callback,
                kind: kind,
            });
        }

        events.sort_by_key(|event| event.due);

        self.now = now;
        self.events = events;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::cell::RefCell;

    thread_local! {
        static FIRED: RefCell<Vec<(u64, EventKind)>> = RefCell::new(Vec::new());
    }

    fn fired() -> Vec<(u64, EventKind)> {
        FIRED.with(|f| f.borrow().clone())
    }

    fn record(_: &mut Bus, scheduler: &mut Scheduler) {
        let now = scheduler.now();
        FIRED.with(|f| f.borrow_mut().push((now, EventKind::Timer0Compare)));
    }

    fn record_and_follow_up(_: &mut Bus, scheduler: &mut Scheduler) {
        let now = scheduler.now();
        FIRED.with(|f| f.borrow_mut().push((now, EventKind::Serial)));
        scheduler.schedule(10, record, EventKind::Timer0Compare);
    }

    fn bus() -> Bus {
        Bus::new(vec![0; 0x8_0000].into_boxed_slice())
    }

    fn advance_to(scheduler: &mut Scheduler, bus: &mut Bus, cycle: u64) {
        let delta = cycle - scheduler.now();
        scheduler.add_cycles(delta);
        scheduler.run_due(bus);
    }

    #[test]
    fn events_run_in_due_order() {
        let mut scheduler = Scheduler::new();
        let mut bus = bus();

        scheduler.schedule(100, record, EventKind::Timer0Compare);
        scheduler.schedule(50, record, EventKind::Timer0Compare);
        scheduler.schedule(75, record, EventKind::Timer0Compare);

        assert_eq!(scheduler.queued().iter().map(|e| e.0).collect::<Vec<_>>(), vec![50, 75, 100]);

        for cycle in 0..=100 {
            advance_to(&mut scheduler, &mut bus, cycle);
        }

        let cycles: Vec<u64> = fired().iter().map(|e| e.0).collect();
        assert_eq!(cycles, vec![50, 75, 100]);
    }

    #[test]
    fn rescheduled_event_keeps_relative_order() {
        let mut scheduler = Scheduler::new();
        let mut bus = bus();

        scheduler.schedule(50, record_and_follow_up, EventKind::Serial);
        scheduler.schedule(55, record, EventKind::Timer0Compare);
        scheduler.schedule(75, record, EventKind::Timer0Compare);

        for cycle in 0..=100 {
            advance_to(&mut scheduler, &mut bus, cycle);
        }

        let cycles: Vec<u64> = fired().iter().map(|e| e.0).collect();
        assert_eq!(cycles, vec![50, 55, 60, 75]);
    }

    #[test]
    fn late_dispatch_runs_everything_due() {
        let mut scheduler = Scheduler::new();
        let mut bus = bus();

        scheduler.schedule(50, record_and_follow_up, EventKind::Serial);
        scheduler.schedule(75, record, EventKind::Timer0Compare);

        scheduler.add_cycles(200);
        assert_eq!(scheduler.run_due(&mut bus), 2);

        // the follow-up is relative to the late dispatch
        assert_eq!(scheduler.queued(), vec![(210, EventKind::Timer0Compare)]);
    }

    #[test]
    fn equal_due_cycles_are_fifo() {
        let mut scheduler = Scheduler::new();

        scheduler.schedule(10, record, EventKind::Timer1Compare);
        scheduler.schedule(10, record, EventKind::Timer2Compare);
        scheduler.schedule(10, record, EventKind::Timer0Compare);

        let kinds: Vec<EventKind> = scheduler.queued().iter().map(|e| e.1).collect();
        assert_eq!(kinds, vec![EventKind::Timer1Compare, EventKind::Timer2Compare, EventKind::Timer0Compare]);
    }

    #[test]
    fn flush_drops_only_that_kind() {
        let mut scheduler = Scheduler::new();

        scheduler.schedule(10, record, EventKind::CdromGeneral);
        scheduler.schedule(20, record, EventKind::VBlank);
        scheduler.schedule(30, record, EventKind::CdromGeneral);

        scheduler.flush(EventKind::CdromGeneral);
        assert_eq!(scheduler.queued(), vec![(20, EventKind::VBlank)]);

        scheduler.flush_all();
        assert!(scheduler.is_empty());
        assert_eq!(scheduler.next_due(), None);
    }

    #[test]
    fn restore_needs_a_handler_per_kind() {
        let mut scheduler = Scheduler::new();
        scheduler.register(EventKind::VBlank, record);

        assert!(scheduler.restore(500, &[(600, EventKind::VBlank)]).is_ok());
        assert_eq!(scheduler.now(), 500);
        assert_eq!(scheduler.next_due(), Some(600));

        match scheduler.restore(0, &[(10, EventKind::Serial)]) {
            Err(Error::UnboundEvent(EventKind::Serial)) => (),
            other => panic!("unexpected {:?}", other.is_ok()),
        }
    }
}
