//! Tick-ordered event scheduling for the emulated machine.
//!
//! The emulator uses **guest virtual time** (a monotonic cycle counter since
//! reset) as the single source of truth for all hardware update points: video
//! scanout, audio DMA, serial polling, the decrementer, and so on. Each of
//! those is a registered callback with an absolute fire tick; the CPU loop
//! runs a budget of cycles sized to the next pending fire, then hands control
//! back here to drain everything that came due.
//!
//! Determinism is load-bearing: given the same schedule/remove/advance call
//! sequence, callbacks fire in the same order every run — non-decreasing fire
//! tick, FIFO among equal ticks. Device models must rely only on that
//! relative ordering, never on wall-clock time.

#![forbid(unsafe_code)]

use std::collections::BinaryHeap;

use thiserror::Error;

/// Callback invoked when a scheduled event comes due.
///
/// `cycles_late` is how far past the requested fire tick the drain actually
/// ran. Periodic callbacks compensate by rescheduling themselves for
/// `period - cycles_late`, so jitter never accumulates.
///
/// The scheduler is passed back in so a callback can re-schedule (including
/// itself) while it runs; that is the mechanism by which periodic device
/// updates perpetuate themselves.
pub type EventCallback<S> = fn(&mut S, &mut EventScheduler<S>, u64, i64);

/// Handle for a registered event type. Dense index into the descriptor
/// table; stable for the lifetime of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(u32);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    /// Event names identify callbacks for diagnostics and save-state
    /// matching, so they must be unique. Hitting this is a configuration
    /// bug; registration happens once at machine init.
    #[error("event name already registered: {0:?}")]
    DuplicateName(String),
}

struct EventDescriptor<S> {
    name: String,
    callback: EventCallback<S>,
}

#[derive(Debug, Clone, Copy)]
struct PendingEvent {
    fire_time: i64,
    /// Insertion sequence, tie-breaker for events scheduled at the same tick.
    seq: u64,
    id: EventId,
    user_data: u64,
}

impl PartialEq for PendingEvent {
    fn eq(&self, other: &Self) -> bool {
        self.fire_time == other.fire_time && self.seq == other.seq
    }
}
impl Eq for PendingEvent {}

impl PartialOrd for PendingEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // `BinaryHeap` is a max-heap; reverse for earliest-first.
        (self.fire_time, self.seq)
            .cmp(&(other.fire_time, other.seq))
            .reverse()
    }
}

/// Upper bound on one CPU slice when no event is pending, so the dispatch
/// loop never stalls waiting for a fire time that does not exist.
pub const DEFAULT_MAX_SLICE: i64 = 20_000;

/// The machine's tick-ordered callback queue.
///
/// Owns the monotonic tick counter, the pending-event set, and the
/// descriptor table. Callbacks borrow scheduler state; they never take
/// ownership of it. Generic over the system/context type `S` handed to every
/// callback, so nothing here is a process-wide singleton.
pub struct EventScheduler<S> {
    current_tick: i64,
    next_seq: u64,
    pending: BinaryHeap<PendingEvent>,
    descriptors: Vec<EventDescriptor<S>>,
    max_slice: i64,
}

impl<S> EventScheduler<S> {
    pub fn new() -> Self {
        Self::with_max_slice(DEFAULT_MAX_SLICE)
    }

    pub fn with_max_slice(max_slice: i64) -> Self {
        assert!(max_slice > 0, "max slice must be positive");
        Self {
            current_tick: 0,
            next_seq: 0,
            pending: BinaryHeap::new(),
            descriptors: Vec::new(),
            max_slice,
        }
    }

    /// Current virtual time in ticks. Never decreases.
    #[inline]
    pub fn ticks(&self) -> i64 {
        self.current_tick
    }

    /// Registers a named callback. One-time, at machine init; identity is
    /// fixed thereafter.
    pub fn register_event(
        &mut self,
        name: &str,
        callback: EventCallback<S>,
    ) -> Result<EventId, SchedulerError> {
        if self.descriptors.iter().any(|d| d.name == name) {
            return Err(SchedulerError::DuplicateName(name.to_owned()));
        }
        let id = EventId(self.descriptors.len() as u32);
        self.descriptors.push(EventDescriptor {
            name: name.to_owned(),
            callback,
        });
        Ok(id)
    }

    /// Inserts a pending fire at `current_tick + delta_ticks`.
    ///
    /// A negative delta means "already overdue": the event fires on the very
    /// next drain with the lateness reflected in its `cycles_late`. Periodic
    /// callbacks rely on this when they reschedule with `period -
    /// cycles_late` and the lateness exceeds the period.
    pub fn schedule_event(&mut self, delta_ticks: i64, id: EventId, user_data: u64) {
        let fire_time = self.current_tick + delta_ticks;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.push(PendingEvent {
            fire_time,
            seq,
            id,
            user_data,
        });
    }

    /// Removes every pending instance of `id`. Synchronous and immediate;
    /// this is the only cancellation primitive (used e.g. when a guest write
    /// to the decrementer supersedes the previously scheduled fire).
    pub fn remove_event(&mut self, id: EventId) {
        self.pending.retain(|ev| ev.id != id);
    }

    /// Earliest pending fire tick, or `None` when the queue is empty.
    pub fn next_fire_time(&self) -> Option<i64> {
        self.pending.peek().map(|ev| ev.fire_time)
    }

    /// Cycle budget for the next CPU slice: ticks until the earliest pending
    /// fire, clamped to `[0, max_slice]`. An empty queue yields `max_slice`
    /// rather than stalling the loop.
    pub fn next_slice(&self) -> i64 {
        match self.next_fire_time() {
            Some(t) => (t - self.current_tick).clamp(0, self.max_slice),
            None => self.max_slice,
        }
    }

    /// Advances virtual time by `ticks_elapsed`, then fires every pending
    /// event whose time has come.
    ///
    /// The drain is exhaustive: a firing callback may enqueue another event
    /// that is itself already due (a zero or negative period), and that event
    /// fires in the same drain. On return, nothing pending has
    /// `fire_time <= ticks()`.
    pub fn advance(&mut self, sys: &mut S, ticks_elapsed: i64) {
        debug_assert!(ticks_elapsed >= 0, "virtual time cannot move backwards");
        self.current_tick += ticks_elapsed;

        while let Some(ev) = self.pending.peek() {
            if ev.fire_time > self.current_tick {
                break;
            }
            let ev = self.pending.pop().expect("peeked entry vanished");
            let desc = &self.descriptors[ev.id.0 as usize];
            let cycles_late = self.current_tick - ev.fire_time;
            tracing::trace!(
                event = %desc.name,
                tick = self.current_tick,
                cycles_late,
                "firing scheduled event"
            );
            // Copy the fn pointer out so the callback can borrow the
            // scheduler mutably (to reschedule) while it runs.
            let callback = desc.callback;
            callback(sys, self, ev.user_data, cycles_late);
        }
    }

    /// Discards all pending events. Teardown at emulation stop; nothing is
    /// persisted.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Diagnostic name of a registered event.
    pub fn event_name(&self, id: EventId) -> &str {
        &self.descriptors[id.0 as usize].name
    }
}

impl<S> Default for EventScheduler<S> {
    fn default() -> Self {
        Self::new()
    }
}
