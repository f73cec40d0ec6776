//! Block formation, lowering, and the compiled-block cache.
//!
//! `JitPpc` is the concrete [`JitBackend`]: it forms a block of
//! consecutive translatable instructions starting at the requested
//! address, lowers the block's IR to a flat step list, and caches the
//! result per entry address. Addresses whose first instruction declines
//! translation are cached as declined, so the dispatcher takes the slow
//! path for them without re-probing the translator every entry.
//!
//! Lowering is a single forward walk: node `i`'s result lands in value
//! slot `i`, which the acyclic-by-construction IR makes sufficient — an
//! operand slot is always written before it is read. Quantization
//! registers are resolved at execution time, never baked in at compile
//! time, so reprogramming a GQR between entries changes behavior without
//! invalidation.

use std::collections::HashMap;

use kelp_cpu_core::{is_gather_pipe, BlockExit, CpuState, FifoBus, GuestBus, JitBackend};

use crate::insn::GekkoInstruction;
use crate::ir::{IrBlock, IrBuilder, Op};
use crate::quantize::PAIRED_STORE;
use crate::routines::{fifo_store_quantized, CommonRoutines};
use crate::translate::{translate, TranslateConfig, TranslationOutcome};

/// Cap on instructions per block; keeps one block's cycle cost well under
/// any sane scheduler slice.
const MAX_BLOCK_INSTS: usize = 32;

/// One lowered operation. Operands are value-slot indices.
#[derive(Debug, Clone, Copy)]
enum Step {
    IntConst { dst: usize, value: u32 },
    Add { dst: usize, a: usize, b: usize },
    LoadGReg { dst: usize, reg: u8 },
    StoreGReg { src: usize, reg: u8 },
    LoadFReg { dst: usize, reg: u8 },
    StoreFReg { src: usize, reg: u8 },
    LoadPaired { dst: usize, addr: usize, gqr: u8 },
    StorePaired { src: usize, addr: usize, gqr: u8 },
    /// Store whose address was a constant inside the write-gather pipe
    /// window; the elements stream through the FIFO interface.
    StorePairedFifo { src: usize, gqr: u8 },
    CompactPair { dst: usize, src: usize },
    ExpandPacked { dst: usize, src: usize },
}

/// Runtime contents of a value slot.
#[derive(Debug, Clone, Copy)]
enum Value {
    Int(u32),
    /// Two f32 bit patterns, lane 0 in the high half.
    Packed(u64),
    Pair([f64; 2]),
}

impl Value {
    fn as_int(self) -> u32 {
        match self {
            Value::Int(v) => v,
            _ => unreachable!("type-checked at emission"),
        }
    }

    fn as_packed(self) -> u64 {
        match self {
            Value::Packed(v) => v,
            _ => unreachable!("type-checked at emission"),
        }
    }

    fn as_pair(self) -> [f64; 2] {
        match self {
            Value::Pair(v) => v,
            _ => unreachable!("type-checked at emission"),
        }
    }
}

struct CompiledBlock {
    steps: Vec<Step>,
    slots: usize,
    cycles: i64,
    next_pc: u32,
}

pub struct JitPpc<B> {
    config: TranslateConfig,
    routines: CommonRoutines<B>,
    cache: HashMap<u32, Option<CompiledBlock>>,
}

impl<B: GuestBus + FifoBus> JitPpc<B> {
    pub fn new(config: TranslateConfig) -> Self {
        Self {
            config,
            routines: CommonRoutines::new(),
            cache: HashMap::new(),
        }
    }

    /// Drops every cached translation (and every cached decline). Required
    /// after guest code changes under a compiled address.
    pub fn invalidate_all(&mut self) {
        self.cache.clear();
    }

    pub fn invalidate(&mut self, pc: u32) {
        self.cache.remove(&pc);
    }

    #[cfg(test)]
    fn cached_block_count(&self) -> usize {
        self.cache.values().filter(|b| b.is_some()).count()
    }

    fn compile_block(&self, entry_pc: u32, bus: &B) -> Option<CompiledBlock> {
        let mut builder = IrBuilder::new();
        let mut insts = 0usize;
        while insts < MAX_BLOCK_INSTS {
            let inst = GekkoInstruction(bus.read_u32(entry_pc.wrapping_add(insts as u32 * 4)));
            match translate(&mut builder, inst, &self.config) {
                TranslationOutcome::Emitted => insts += 1,
                TranslationOutcome::UseSlowPath => break,
            }
        }
        if insts == 0 {
            tracing::trace!(pc = format_args!("{entry_pc:#010x}"), "translation declined");
            return None;
        }

        let ir = builder.finish();
        let slots = ir.len();
        let steps = lower(&ir);
        tracing::debug!(
            pc = format_args!("{entry_pc:#010x}"),
            insts,
            steps = steps.len(),
            "compiled block"
        );
        Some(CompiledBlock {
            steps,
            slots,
            cycles: insts as i64,
            next_pc: entry_pc.wrapping_add(insts as u32 * 4),
        })
    }

    fn run_block(&self, block: &CompiledBlock, cpu: &mut CpuState, bus: &mut B) {
        let mut slots = vec![Value::Int(0); block.slots];
        for step in &block.steps {
            match *step {
                Step::IntConst { dst, value } => slots[dst] = Value::Int(value),
                Step::Add { dst, a, b } => {
                    slots[dst] =
                        Value::Int(slots[a].as_int().wrapping_add(slots[b].as_int()));
                }
                Step::LoadGReg { dst, reg } => {
                    slots[dst] = Value::Int(cpu.gpr[reg as usize]);
                }
                Step::StoreGReg { src, reg } => {
                    cpu.gpr[reg as usize] = slots[src].as_int();
                }
                Step::LoadFReg { dst, reg } => {
                    slots[dst] = Value::Pair(cpu.ps[reg as usize]);
                }
                Step::StoreFReg { src, reg } => {
                    cpu.ps[reg as usize] = slots[src].as_pair();
                }
                Step::LoadPaired { dst, addr, gqr } => {
                    let g = cpu.gqr[gqr as usize];
                    let pair = self.routines.paired_load_quantized[g.ld_type() as usize](
                        bus,
                        slots[addr].as_int(),
                        g.ld_scale(),
                    );
                    slots[dst] = Value::Packed(pack_pair(pair));
                }
                Step::StorePaired { src, addr, gqr } => {
                    let g = cpu.gqr[gqr as usize];
                    let target = slots[addr].as_int();
                    let pair = unpack_pair(slots[src].as_packed());
                    // Register-relative addresses can land in the pipe
                    // window too; only constant addresses get the check
                    // folded away at lowering.
                    if is_gather_pipe(target) {
                        fifo_store_quantized(
                            bus,
                            PAIRED_STORE[g.st_type() as usize],
                            g.st_scale(),
                            pair,
                        );
                    } else {
                        self.routines.paired_store_quantized[g.st_type() as usize](
                            bus,
                            target,
                            g.st_scale(),
                            pair,
                        );
                    }
                }
                Step::StorePairedFifo { src, gqr } => {
                    let g = cpu.gqr[gqr as usize];
                    fifo_store_quantized(
                        bus,
                        PAIRED_STORE[g.st_type() as usize],
                        g.st_scale(),
                        unpack_pair(slots[src].as_packed()),
                    );
                }
                Step::CompactPair { dst, src } => {
                    let pair = slots[src].as_pair();
                    slots[dst] = Value::Packed(pack_pair([pair[0] as f32, pair[1] as f32]));
                }
                Step::ExpandPacked { dst, src } => {
                    let pair = unpack_pair(slots[src].as_packed());
                    slots[dst] = Value::Pair([f64::from(pair[0]), f64::from(pair[1])]);
                }
            }
        }
    }
}

impl<B: GuestBus + FifoBus> JitBackend<B> for JitPpc<B> {
    type Handle = u32;

    fn prepare_block(&mut self, pc: u32, bus: &B) -> Option<Self::Handle> {
        if !self.cache.contains_key(&pc) {
            let compiled = self.compile_block(pc, bus);
            self.cache.insert(pc, compiled);
        }
        match &self.cache[&pc] {
            Some(_) => Some(pc),
            None => None,
        }
    }

    fn execute_block(&mut self, handle: u32, cpu: &mut CpuState, bus: &mut B) -> BlockExit {
        // Handles are only issued by `prepare_block` for addresses it just
        // cached a translation for.
        let block = self
            .cache
            .get(&handle)
            .and_then(|b| b.as_ref())
            .unwrap_or_else(|| unreachable!("handle without a cached block"));
        let exit = BlockExit {
            next_pc: block.next_pc,
            cycles: block.cycles,
        };
        self.run_block(block, cpu, bus);
        exit
    }
}

fn lower(ir: &IrBlock) -> Vec<Step> {
    let mut steps = Vec::with_capacity(ir.len());
    for (loc, node) in ir.iter() {
        let dst = loc.index();
        let step = match node.op {
            Op::IntConst(value) => Step::IntConst { dst, value },
            Op::Add(a, b) => Step::Add {
                dst,
                a: a.index(),
                b: b.index(),
            },
            Op::LoadGReg(reg) => Step::LoadGReg { dst, reg },
            Op::StoreGReg { val, reg } => Step::StoreGReg {
                src: val.index(),
                reg,
            },
            Op::LoadFReg(reg) => Step::LoadFReg { dst, reg },
            Op::StoreFReg { val, reg } => Step::StoreFReg {
                src: val.index(),
                reg,
            },
            Op::LoadPaired { addr, selector } => Step::LoadPaired {
                dst,
                addr: addr.index(),
                gqr: selector & 0x7,
            },
            Op::StorePaired {
                val,
                addr,
                selector,
            } => {
                // A constant address aimed at the write-gather pipe gets
                // the direct FIFO lowering; everything else goes through
                // the general store routine.
                if let Op::IntConst(target) = ir.node(addr).op {
                    if is_gather_pipe(target) {
                        steps.push(Step::StorePairedFifo {
                            src: val.index(),
                            gqr: selector & 0x7,
                        });
                        continue;
                    }
                }
                Step::StorePaired {
                    src: val.index(),
                    addr: addr.index(),
                    gqr: selector & 0x7,
                }
            }
            Op::CompactMRegToPacked(val) => Step::CompactPair {
                dst,
                src: val.index(),
            },
            Op::ExpandPackedToMReg(val) => Step::ExpandPacked {
                dst,
                src: val.index(),
            },
        };
        steps.push(step);
    }
    steps
}

#[inline]
fn pack_pair(pair: [f32; 2]) -> u64 {
    (u64::from(pair[0].to_bits()) << 32) | u64::from(pair[1].to_bits())
}

#[inline]
fn unpack_pair(packed: u64) -> [f32; 2] {
    [
        f32::from_bits((packed >> 32) as u32),
        f32::from_bits(packed as u32),
    ]
}
