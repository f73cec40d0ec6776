//! The always-available non-IR execution path.
//!
//! Everything translation declines lands here one instruction at a
//! time: the W=1 single-dimension quantized forms, instructions under
//! an armed memcheck, and opcodes outside the quantized load/store
//! family. The conversion math goes through the same routine tables the
//! compiled path calls, so the two paths cannot drift apart.
//!
//! Opcodes this crate does not model at all are completed as one-cycle
//! no-ops; the full-machine decoder sits outside this boundary.

use kelp_cpu_core::{is_gather_pipe, BlockExit, CpuState, FifoBus, GuestBus, SlowPath};

use crate::insn::{
    GekkoInstruction, OPCD_PSQ_L, OPCD_PSQ_LU, OPCD_PSQ_ST, OPCD_PSQ_STU,
};
use crate::quantize::{dequantize, ElementKind, PAIRED_LOAD, PAIRED_STORE, SINGLE_STORE};
use crate::routines::{fifo_store_quantized, CommonRoutines};

pub struct PsqSlowPath<B> {
    routines: CommonRoutines<B>,
}

impl<B: GuestBus + FifoBus> PsqSlowPath<B> {
    pub fn new() -> Self {
        Self {
            routines: CommonRoutines::new(),
        }
    }

    fn exec_psq_l(&self, inst: GekkoInstruction, cpu: &mut CpuState, bus: &B) {
        let addr = effective_address(inst, cpu);
        let gqr = cpu.gqr[inst.i() as usize];
        let pair = if inst.w() {
            // Single-dimension load: one element into lane 0, implicit
            // 1.0 in lane 1.
            let kind = PAIRED_LOAD[gqr.ld_type() as usize];
            [read_single(bus, addr, kind, gqr.ld_scale()), 1.0]
        } else {
            self.routines.paired_load_quantized[gqr.ld_type() as usize](
                bus,
                addr,
                gqr.ld_scale(),
            )
        };
        cpu.ps[inst.rd() as usize] = [f64::from(pair[0]), f64::from(pair[1])];
        if inst.is_update_form() {
            cpu.gpr[inst.ra() as usize] = addr;
        }
    }

    fn exec_psq_st(&self, inst: GekkoInstruction, cpu: &mut CpuState, bus: &mut B) {
        let addr = effective_address(inst, cpu);
        let gqr = cpu.gqr[inst.i() as usize];
        let ps = cpu.ps[inst.rd() as usize];
        let pair = [ps[0] as f32, ps[1] as f32];
        if inst.w() {
            let kind = SINGLE_STORE[gqr.st_type() as usize];
            if is_gather_pipe(addr) {
                fifo_store_single(bus, kind, gqr.st_scale(), pair[0]);
            } else {
                self.routines.single_store_quantized[gqr.st_type() as usize](
                    bus,
                    addr,
                    gqr.st_scale(),
                    pair[0],
                );
            }
        } else if is_gather_pipe(addr) {
            let kind = PAIRED_STORE[gqr.st_type() as usize];
            fifo_store_quantized(bus, kind, gqr.st_scale(), pair);
        } else {
            self.routines.paired_store_quantized[gqr.st_type() as usize](
                bus,
                addr,
                gqr.st_scale(),
                pair,
            );
        }
        if inst.is_update_form() {
            cpu.gpr[inst.ra() as usize] = addr;
        }
    }
}

impl<B: GuestBus + FifoBus> Default for PsqSlowPath<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: GuestBus + FifoBus> SlowPath<B> for PsqSlowPath<B> {
    fn exec_block(&mut self, cpu: &mut CpuState, bus: &mut B) -> BlockExit {
        let pc = cpu.pc;
        let inst = GekkoInstruction(bus.read_u32(pc));
        match inst.opcd() {
            OPCD_PSQ_L | OPCD_PSQ_LU => self.exec_psq_l(inst, cpu, bus),
            OPCD_PSQ_ST | OPCD_PSQ_STU => self.exec_psq_st(inst, cpu, bus),
            opcd => {
                tracing::trace!(pc = format_args!("{pc:#010x}"), opcd, "unmodeled opcode");
            }
        }
        BlockExit {
            next_pc: pc.wrapping_add(4),
            cycles: 1,
        }
    }
}

fn effective_address(inst: GekkoInstruction, cpu: &CpuState) -> u32 {
    let base = if inst.ra() != 0 {
        cpu.gpr[inst.ra() as usize]
    } else {
        0
    };
    base.wrapping_add(inst.simm12() as u32)
}

fn read_single<B: GuestBus>(bus: &B, addr: u32, kind: ElementKind, scale: u8) -> f32 {
    let raw = match kind.bytes() {
        1 => u32::from(bus.read_u8(addr)),
        2 => u32::from(bus.read_u16(addr)),
        _ => bus.read_u32(addr),
    };
    dequantize(kind, scale, raw)
}

fn fifo_store_single<B: FifoBus>(bus: &mut B, kind: ElementKind, scale: u8, value: f32) {
    let raw = crate::quantize::quantize(kind, scale, value);
    match kind.bytes() {
        1 => bus.fifo_write_u8(raw as u8),
        2 => bus.fifo_write_u16(raw as u16),
        _ => bus.fifo_write_u32(raw),
    }
}
