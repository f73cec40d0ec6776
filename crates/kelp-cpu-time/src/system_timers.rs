//! Registration and pacing of the machine's recurring hardware update
//! points, and the guest-facing decrementer/timebase operations.
//!
//! Every callback here follows the same discipline: do the device update,
//! then reschedule itself for `period - cycles_late` so scheduling jitter
//! never accumulates into drift.

use kelp_cpu_core::{Exceptions, Machine};
use kelp_time::{EventId, EventScheduler, SchedulerError};

use crate::tb::TimeBase;

/// Device-model boundary for the recurring update callbacks.
///
/// Implementations must not assume anything about wall-clock time; only the
/// relative tick ordering of calls is guaranteed. The DSP hook receives its
/// cycle slice so an LLE core can split the budget.
pub trait TimerHost: Machine {
    fn timers(&self) -> &SystemTimers;
    fn timers_mut(&mut self) -> &mut SystemTimers;

    fn update_audio_interface(&mut self);
    fn update_dsp(&mut self, cycles: i64);
    fn update_audio_dma(&mut self);
    fn poll_serial(&mut self);
    fn update_video_line(&mut self);
    fn update_ipc(&mut self);
    fn apply_patches(&mut self);
}

/// Periods for the recurring callbacks, in scheduler ticks.
///
/// Several of these were never nailed down by hardware documentation; the
/// defaults are working estimates derived from the core clock, and
/// embeddings are expected to tune them.
#[derive(Debug, Clone, Copy)]
pub struct TimerPeriods {
    /// Audio-interface counter update cadence.
    pub ai: i64,
    /// DSP slice length. For an LLE DSP this is the cycle budget handed to
    /// [`TimerHost::update_dsp`] each fire.
    pub dsp: i64,
    /// Fixed by the 32 kHz, 16-bit stereo sample stream moving 32 bytes per
    /// DMA transfer.
    pub audio_dma: i64,
    /// Serial-interface poll cadence (once per video frame).
    pub serial: i64,
    /// One video scanline.
    pub video_line: i64,
    /// IPC update cadence; pure latency tuning.
    pub ipc: i64,
    /// Low-frequency patch hook, once per frame.
    pub patch: i64,
}

impl TimerPeriods {
    /// Derives the default cadences from the core clock frequency.
    pub fn from_core_clock(hz: i64) -> Self {
        let frame = hz / 60;
        Self {
            ai: hz / 80,
            dsp: 12_000,
            audio_dma: hz / (32_000 * 4 / 32),
            serial: frame,
            video_line: frame / 525,
            ipc: hz / 1500,
            patch: frame,
        }
    }
}

impl Default for TimerPeriods {
    fn default() -> Self {
        // 486 MHz core clock.
        Self::from_core_clock(486_000_000)
    }
}

#[derive(Debug, Clone, Copy)]
struct TimerIds {
    dec: EventId,
    ai: EventId,
    vi: EventId,
    si: EventId,
    dsp: EventId,
    audio_dma: EventId,
    ipc: EventId,
    patch: EventId,
}

/// The machine's timer block: event ids, periods, and the
/// timebase/decrementer shadow state.
#[derive(Debug, Clone)]
pub struct SystemTimers {
    periods: TimerPeriods,
    pub time_base: TimeBase,
    ids: TimerIds,
}

impl SystemTimers {
    /// Registers every timer callback. One-time, at machine init; a
    /// duplicate registration is a configuration bug and surfaces as a hard
    /// failure.
    pub fn register<S: TimerHost>(
        sched: &mut EventScheduler<S>,
        periods: TimerPeriods,
        tick_ratio: i64,
    ) -> Result<Self, SchedulerError> {
        let ids = TimerIds {
            dec: sched.register_event("Decrementer", decrementer_callback::<S>)?,
            ai: sched.register_event("AICallback", ai_callback::<S>)?,
            vi: sched.register_event("VICallback", vi_callback::<S>)?,
            si: sched.register_event("SICallback", si_callback::<S>)?,
            dsp: sched.register_event("DSPCallback", dsp_callback::<S>)?,
            audio_dma: sched.register_event("AudioDMACallback", audio_dma_callback::<S>)?,
            ipc: sched.register_event("IPCCallback", ipc_callback::<S>)?,
            patch: sched.register_event("PatchHook", patch_callback::<S>)?,
        };
        let mut time_base = TimeBase::new(tick_ratio);
        time_base.snapshot_decrementer(sched.ticks(), 0xFFFF_FFFF);
        Ok(Self {
            periods,
            time_base,
            ids,
        })
    }

    /// Gives every recurring callback its initial schedule. The decrementer
    /// is not armed here; it waits for a guest write with the sign bit
    /// clear.
    pub fn start<S: TimerHost>(&self, sched: &mut EventScheduler<S>) {
        sched.schedule_event(self.periods.ai, self.ids.ai, 0);
        sched.schedule_event(self.periods.video_line, self.ids.vi, 0);
        sched.schedule_event(self.periods.dsp, self.ids.dsp, 0);
        sched.schedule_event(self.periods.serial, self.ids.si, 0);
        sched.schedule_event(self.periods.audio_dma, self.ids.audio_dma, 0);
        sched.schedule_event(self.periods.ipc, self.ids.ipc, 0);
        sched.schedule_event(self.periods.patch, self.ids.patch, 0);
    }

    /// Seeds the timebase (e.g. from the host RTC at boot).
    pub fn seed_timebase<S>(&mut self, sched: &EventScheduler<S>, value: u64) {
        self.time_base.set_timebase(sched.ticks(), value);
    }
}

fn ai_callback<S: TimerHost>(sys: &mut S, sched: &mut EventScheduler<S>, _ud: u64, late: i64) {
    sys.update_audio_interface();
    let t = sys.timers();
    let (period, id) = (t.periods.ai, t.ids.ai);
    sched.schedule_event(period - late, id, 0);
}

fn dsp_callback<S: TimerHost>(sys: &mut S, sched: &mut EventScheduler<S>, _ud: u64, late: i64) {
    // The lateness is folded into the slice so the DSP stays cycle-exact
    // relative to the CPU.
    let period = sys.timers().periods.dsp;
    sys.update_dsp(period - late);
    let id = sys.timers().ids.dsp;
    sched.schedule_event(period - late, id, 0);
}

fn audio_dma_callback<S: TimerHost>(sys: &mut S, sched: &mut EventScheduler<S>, _ud: u64, late: i64) {
    sys.update_audio_dma();
    let t = sys.timers();
    let (period, id) = (t.periods.audio_dma, t.ids.audio_dma);
    sched.schedule_event(period - late, id, 0);
}

fn si_callback<S: TimerHost>(sys: &mut S, sched: &mut EventScheduler<S>, _ud: u64, late: i64) {
    sys.poll_serial();
    let t = sys.timers();
    let (period, id) = (t.periods.serial, t.ids.si);
    sched.schedule_event(period - late, id, 0);
}

fn vi_callback<S: TimerHost>(sys: &mut S, sched: &mut EventScheduler<S>, _ud: u64, late: i64) {
    sys.update_video_line();
    let t = sys.timers();
    let (period, id) = (t.periods.video_line, t.ids.vi);
    sched.schedule_event(period - late, id, 0);
}

fn ipc_callback<S: TimerHost>(sys: &mut S, sched: &mut EventScheduler<S>, _ud: u64, late: i64) {
    sys.update_ipc();
    let t = sys.timers();
    let (period, id) = (t.periods.ipc, t.ids.ipc);
    sched.schedule_event(period - late, id, 0);
}

fn patch_callback<S: TimerHost>(sys: &mut S, sched: &mut EventScheduler<S>, _ud: u64, late: i64) {
    sys.apply_patches();
    let t = sys.timers();
    let (period, id) = (t.periods.patch, t.ids.patch);
    sched.schedule_event(period - late, id, 0);
}

fn decrementer_callback<S: TimerHost>(
    sys: &mut S,
    _sched: &mut EventScheduler<S>,
    _ud: u64,
    _late: i64,
) {
    // Underflow: the register reads as all-ones until the guest rearms it.
    let (cpu, _) = sys.cpu_and_bus();
    cpu.dec = 0xFFFF_FFFF;
    cpu.raise(Exceptions::DECREMENTER);
}

/// Guest write to the decrementer: snapshot, cancel any pending fire, and
/// arm a one-shot at `value * tick_ratio` ticks unless the sign bit marks
/// the countdown as disabled.
pub fn set_decrementer<S: TimerHost>(sys: &mut S, sched: &mut EventScheduler<S>, value: u32) {
    let now = sched.ticks();
    {
        let (cpu, _) = sys.cpu_and_bus();
        cpu.dec = value;
    }
    let (dec_id, ratio) = {
        let t = sys.timers();
        (t.ids.dec, t.time_base.tick_ratio())
    };
    sched.remove_event(dec_id);
    sys.timers_mut().time_base.snapshot_decrementer(now, value);
    if value & 0x8000_0000 == 0 {
        sched.schedule_event(i64::from(value) * ratio, dec_id, 0);
    } else {
        tracing::trace!(value, "decrementer written with sign bit set; underflow not armed");
    }
}

/// Guest read of the decrementer. Derivation only; never schedules or
/// cancels anything.
pub fn read_decrementer<S: TimerHost>(sys: &S, sched: &EventScheduler<S>) -> u32 {
    sys.timers().time_base.read_decrementer(sched.ticks())
}

/// Guest write to the timebase.
pub fn set_timebase<S: TimerHost>(sys: &mut S, sched: &EventScheduler<S>, value: u64) {
    let now = sched.ticks();
    sys.timers_mut().time_base.set_timebase(now, value);
}

/// Guest read of the timebase.
pub fn read_timebase<S: TimerHost>(sys: &S, sched: &EventScheduler<S>) -> u64 {
    sys.timers().time_base.read_timebase(sched.ticks())
}
