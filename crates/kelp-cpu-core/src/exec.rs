//! The tiered dispatch loop: outer loop sized by the event scheduler, inner
//! dispatcher running translated blocks until the cycle budget runs out or
//! an exception condition is raised.
//!
//! Shape of one outer iteration:
//!
//! 1. ask the scheduler for the next slice (ticks until the earliest pending
//!    fire, bounded so an empty queue cannot stall);
//! 2. run blocks — JIT-compiled when available, the slow path otherwise —
//!    with pending exceptions checked at *every* dispatcher re-entry, not
//!    only at slice boundaries;
//! 3. yield the executed cycle count (including any overshoot past the
//!    budget) back to the scheduler, which fires due callbacks and carries
//!    the overshoot into their `cycles_late`.

use kelp_time::EventScheduler;

use crate::mem::{FifoBus, GuestBus};
use crate::state::CpuState;

/// Result of executing one translated (or interpreted) block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockExit {
    pub next_pc: u32,
    /// Guest cycles the block consumed. Must be at least 1 so the inner
    /// dispatcher always makes progress against the budget.
    pub cycles: i64,
}

/// Capability seam for a concrete code generator.
///
/// `prepare_block` returning `None` means the backend has no translation
/// for this address (declined or not yet compiled); the dispatcher then
/// takes the slow path for that one block. Handles are plain tokens so the
/// backend can be borrowed again for execution.
pub trait JitBackend<B: GuestBus + FifoBus> {
    type Handle: Copy;

    fn prepare_block(&mut self, pc: u32, bus: &B) -> Option<Self::Handle>;
    fn execute_block(&mut self, handle: Self::Handle, cpu: &mut CpuState, bus: &mut B)
        -> BlockExit;
}

/// The non-IR "default" execution path used when translation declines an
/// instruction (or a whole block). Always available; never declines.
pub trait SlowPath<B: GuestBus + FifoBus> {
    fn exec_block(&mut self, cpu: &mut CpuState, bus: &mut B) -> BlockExit;
}

/// Splits the machine context into the pieces the dispatcher needs. The
/// same `S` is what scheduler callbacks receive, so device updates and the
/// CPU loop share one explicitly-threaded context.
pub trait Machine {
    type Bus: GuestBus + FifoBus;

    fn cpu_and_bus(&mut self) -> (&mut CpuState, &mut Self::Bus);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutedTier {
    Jit,
    SlowPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A pending exception was delivered instead of running a block.
    ExceptionDelivered,
    Block {
        tier: ExecutedTier,
        entry_pc: u32,
        next_pc: u32,
        cycles: i64,
    },
}

pub struct ExecDispatcher<J, P> {
    jit: J,
    slow: P,
}

impl<J, P> ExecDispatcher<J, P> {
    pub fn new(jit: J, slow: P) -> Self {
        Self { jit, slow }
    }

    pub fn jit_mut(&mut self) -> &mut J {
        &mut self.jit
    }

    /// One dispatcher re-entry: exception check, then one block.
    pub fn step<B>(&mut self, cpu: &mut CpuState, bus: &mut B) -> StepOutcome
    where
        B: GuestBus + FifoBus,
        J: JitBackend<B>,
        P: SlowPath<B>,
    {
        if cpu.deliver_pending_exception() {
            return StepOutcome::ExceptionDelivered;
        }

        let entry_pc = cpu.pc;
        let (tier, exit) = match self.jit.prepare_block(entry_pc, bus) {
            Some(handle) => (
                ExecutedTier::Jit,
                self.jit.execute_block(handle, cpu, bus),
            ),
            None => (ExecutedTier::SlowPath, self.slow.exec_block(cpu, bus)),
        };
        debug_assert!(exit.cycles >= 1, "blocks must consume at least one cycle");

        cpu.pc = exit.next_pc;
        cpu.downcount -= exit.cycles;

        StepOutcome::Block {
            tier,
            entry_pc,
            next_pc: exit.next_pc,
            cycles: exit.cycles,
        }
    }

    /// One outer-loop iteration: size the budget, run it down, hand the
    /// elapsed cycles to the scheduler. Returns the cycles executed.
    pub fn run_slice<S>(&mut self, sys: &mut S, sched: &mut EventScheduler<S>) -> i64
    where
        S: Machine,
        J: JitBackend<S::Bus>,
        P: SlowPath<S::Bus>,
    {
        let slice = sched.next_slice();
        let executed = {
            let (cpu, bus) = sys.cpu_and_bus();
            cpu.downcount = slice;
            while cpu.downcount > 0 {
                self.step(cpu, bus);
            }
            // Overshoot (negative downcount) is expected lateness; advancing
            // by the true executed count is what feeds `cycles_late`.
            slice - cpu.downcount
        };
        sched.advance(sys, executed);
        executed
    }

    pub fn run_slices<S>(&mut self, sys: &mut S, sched: &mut EventScheduler<S>, slices: u64)
    where
        S: Machine,
        J: JitBackend<S::Bus>,
        P: SlowPath<S::Bus>,
    {
        for _ in 0..slices {
            self.run_slice(sys, sched);
        }
    }
}
