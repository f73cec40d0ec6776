//! Guest time modelling: the timebase/decrementer registers derived from
//! scheduler ticks, and the registration of every recurring hardware update
//! callback (audio interface, DSP, audio DMA, serial poll, video line, IPC,
//! patch hook, decrementer one-shot).
//!
//! "Time" here is frames-of-work, not wall clock: update frequencies are
//! expressed in CPU cycles, so a slow host slows everything down together
//! instead of desynchronizing devices from the CPU.

#![forbid(unsafe_code)]

mod system_timers;
mod tb;

pub use system_timers::{
    read_decrementer, read_timebase, set_decrementer, set_timebase, SystemTimers, TimerHost,
    TimerPeriods,
};
pub use tb::{TimeBase, DEFAULT_TICK_RATIO};
