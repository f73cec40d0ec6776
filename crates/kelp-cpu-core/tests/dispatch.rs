//! Dispatch-loop pacing: budget sizing from the scheduler, lateness
//! propagation, and exception checks at dispatcher re-entry.

use kelp_cpu_core::{
    BlockExit, CpuState, ExecDispatcher, Exceptions, FlatTestBus, JitBackend, Machine, SlowPath,
    StepOutcome,
};
use kelp_time::{EventId, EventScheduler};

struct TestMachine {
    cpu: CpuState,
    bus: FlatTestBus,
    fires: Vec<(i64, i64)>, // (tick, cycles_late)
}

impl TestMachine {
    fn new() -> Self {
        Self {
            cpu: CpuState::new(),
            bus: FlatTestBus::new(0x1000),
            fires: Vec::new(),
        }
    }
}

impl Machine for TestMachine {
    type Bus = FlatTestBus;

    fn cpu_and_bus(&mut self) -> (&mut CpuState, &mut FlatTestBus) {
        (&mut self.cpu, &mut self.bus)
    }
}

/// Backend with no translations: everything takes the slow path.
struct NoJit;

impl JitBackend<FlatTestBus> for NoJit {
    type Handle = ();

    fn prepare_block(&mut self, _pc: u32, _bus: &FlatTestBus) -> Option<()> {
        None
    }

    fn execute_block(&mut self, _: (), _: &mut CpuState, _: &mut FlatTestBus) -> BlockExit {
        unreachable!("prepare_block never returns a handle")
    }
}

/// Fixed-cost slow path: each block is one 4-byte instruction, 7 cycles.
struct FixedCost;

impl SlowPath<FlatTestBus> for FixedCost {
    fn exec_block(&mut self, cpu: &mut CpuState, _bus: &mut FlatTestBus) -> BlockExit {
        BlockExit {
            next_pc: cpu.pc.wrapping_add(4),
            cycles: 7,
        }
    }
}

fn log_fire(sys: &mut TestMachine, sched: &mut EventScheduler<TestMachine>, _ud: u64, late: i64) {
    sys.fires.push((sched.ticks(), late));
}

#[test]
fn slice_is_sized_by_next_event_and_overshoot_becomes_lateness() {
    let mut sched = EventScheduler::new();
    let id = sched.register_event("probe", log_fire).unwrap();
    let mut sys = TestMachine::new();
    let mut disp = ExecDispatcher::new(NoJit, FixedCost);

    sched.schedule_event(100, id, 0);
    let executed = disp.run_slice(&mut sys, &mut sched);

    // 7-cycle blocks against a 100-cycle budget: 15 blocks, 105 cycles.
    assert_eq!(executed, 105);
    assert_eq!(sched.ticks(), 105);
    assert_eq!(sys.fires, vec![(105, 5)]);
    assert_eq!(sys.cpu.pc, 15 * 4);
}

#[test]
fn exception_raised_by_callback_is_delivered_at_reentry() {
    fn raise_dec(sys: &mut TestMachine, _: &mut EventScheduler<TestMachine>, _ud: u64, _l: i64) {
        sys.cpu.raise(Exceptions::DECREMENTER);
    }

    let mut sched = EventScheduler::new();
    let id = sched.register_event("dec", raise_dec).unwrap();
    let mut sys = TestMachine::new();
    let mut disp = ExecDispatcher::new(NoJit, FixedCost);

    sched.schedule_event(10, id, 0);
    disp.run_slice(&mut sys, &mut sched);
    assert!(sys.cpu.exceptions.contains(Exceptions::DECREMENTER));

    // First step of the next slice is a dispatcher re-entry: the pending
    // condition is delivered before any block runs.
    let (cpu, bus) = sys.cpu_and_bus();
    cpu.downcount = 1;
    let outcome = disp.step(cpu, bus);
    assert_eq!(outcome, StepOutcome::ExceptionDelivered);
    assert_eq!(sys.cpu.pc, 0x0900);
    assert!(sys.cpu.exceptions.is_empty());
}

#[test]
fn empty_queue_uses_bounded_slice() {
    let mut sched: EventScheduler<TestMachine> = EventScheduler::with_max_slice(70);
    let mut sys = TestMachine::new();
    let mut disp = ExecDispatcher::new(NoJit, FixedCost);

    let executed = disp.run_slice(&mut sys, &mut sched);
    assert_eq!(executed, 70);
    assert_eq!(sched.ticks(), 70);
}

#[test]
fn jit_tier_preferred_when_block_is_compiled() {
    /// "Compiles" only pc == 0: a 3-cycle block jumping to 0x40.
    struct OneBlockJit;

    impl JitBackend<FlatTestBus> for OneBlockJit {
        type Handle = u32;

        fn prepare_block(&mut self, pc: u32, _bus: &FlatTestBus) -> Option<u32> {
            (pc == 0).then_some(pc)
        }

        fn execute_block(
            &mut self,
            _h: u32,
            _cpu: &mut CpuState,
            _bus: &mut FlatTestBus,
        ) -> BlockExit {
            BlockExit {
                next_pc: 0x40,
                cycles: 3,
            }
        }
    }

    let mut sys = TestMachine::new();
    let mut disp = ExecDispatcher::new(OneBlockJit, FixedCost);
    let (cpu, bus) = sys.cpu_and_bus();
    cpu.downcount = 100;

    match disp.step(cpu, bus) {
        StepOutcome::Block {
            tier: kelp_cpu_core::ExecutedTier::Jit,
            next_pc: 0x40,
            cycles: 3,
            ..
        } => {}
        other => panic!("expected jit block, got {other:?}"),
    }
    match disp.step(cpu, bus) {
        StepOutcome::Block {
            tier: kelp_cpu_core::ExecutedTier::SlowPath,
            ..
        } => {}
        other => panic!("expected slow-path block, got {other:?}"),
    }
}

// EventId is re-exported so embeddings can hold ids; keep that contract.
#[allow(dead_code)]
fn _event_id_is_copy(id: EventId) -> (EventId, EventId) {
    (id, id)
}
