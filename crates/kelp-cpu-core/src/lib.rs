//! Architectural CPU state, memory-bus seams, and the tiered dispatch loop
//! for the Gekko-class guest.
//!
//! This crate deliberately knows nothing about how blocks get compiled: the
//! JIT sits behind [`exec::JitBackend`] and the non-IR fallback behind
//! [`exec::SlowPath`], so backends can be swapped without touching the loop
//! that paces them against the event scheduler.

#![forbid(unsafe_code)]

pub mod exec;
pub mod mem;
pub mod state;

pub use exec::{BlockExit, ExecDispatcher, ExecutedTier, JitBackend, Machine, SlowPath, StepOutcome};
pub use mem::{is_gather_pipe, FifoBus, FlatTestBus, GuestBus, GATHER_PIPE_ADDR};
pub use state::{CpuState, Exceptions, Gqr, MSR_EE, MSR_FP};
