//! Guest-visible CPU state: register files, quantization-control registers,
//! exception conditions, and the dispatch loop's cycle budget.

use bitflags::bitflags;

pub const NUM_GPRS: usize = 32;
pub const NUM_FPRS: usize = 32;
pub const NUM_GQRS: usize = 8;

/// External-interrupt enable bit in the machine state register.
pub const MSR_EE: u32 = 0x8000;
/// Floating-point available bit.
pub const MSR_FP: u32 = 0x2000;

bitflags! {
    /// Pending asynchronous exception conditions, checked at every
    /// dispatcher re-entry (not only between slices). Raised by device
    /// callbacks and by generated code signalling a fault.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Exceptions: u32 {
        const DECREMENTER     = 1 << 0;
        const EXTERNAL_INT    = 1 << 1;
        const FPU_UNAVAILABLE = 1 << 2;
        const PROGRAM         = 1 << 3;
    }
}

/// One quantization-control register.
///
/// Field layout (from bit 0): store type 0..3, store scale 8..14,
/// load type 16..19, load scale 24..30. The type fields are the 3-bit
/// format codes indexing the quantized-routine tables; the scale fields
/// are 6-bit two's-complement shifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Gqr(pub u32);

impl Gqr {
    #[inline]
    pub fn st_type(self) -> u8 {
        (self.0 & 0x7) as u8
    }

    #[inline]
    pub fn st_scale(self) -> u8 {
        ((self.0 >> 8) & 0x3F) as u8
    }

    #[inline]
    pub fn ld_type(self) -> u8 {
        ((self.0 >> 16) & 0x7) as u8
    }

    #[inline]
    pub fn ld_scale(self) -> u8 {
        ((self.0 >> 24) & 0x3F) as u8
    }
}

/// Architectural state the translation core reads and writes.
///
/// Floating registers are kept in the wide paired-single form (`[f64; 2]`
/// per register); the quantized load/store machinery converts between this
/// and the narrow in-memory representations on the way through the bus.
#[derive(Debug, Clone)]
pub struct CpuState {
    pub pc: u32,
    pub gpr: [u32; NUM_GPRS],
    pub ps: [[f64; 2]; NUM_FPRS],
    pub gqr: [Gqr; NUM_GQRS],
    /// Guest decrementer register. Live value is derived by the timing
    /// model; this field holds what the guest last saw/wrote, and the fire
    /// callback parks `0xFFFF_FFFF` here.
    pub dec: u32,
    pub msr: u32,
    pub srr0: u32,
    pub srr1: u32,
    pub exceptions: Exceptions,
    /// Cycles remaining in the current slice. Sized by the scheduler before
    /// each outer-loop iteration; generated code decrements it and yields
    /// when it reaches zero. Going negative is expected lateness, not an
    /// error.
    pub downcount: i64,
}

impl CpuState {
    pub fn new() -> Self {
        Self {
            pc: 0,
            gpr: [0; NUM_GPRS],
            ps: [[0.0; 2]; NUM_FPRS],
            gqr: [Gqr(0); NUM_GQRS],
            dec: 0xFFFF_FFFF,
            msr: MSR_EE | MSR_FP,
            srr0: 0,
            srr1: 0,
            exceptions: Exceptions::empty(),
            downcount: 0,
        }
    }

    #[inline]
    pub fn interrupts_enabled(&self) -> bool {
        self.msr & MSR_EE != 0
    }

    pub fn raise(&mut self, cond: Exceptions) {
        self.exceptions |= cond;
    }

    /// Delivers the highest-priority pending exception the current MSR
    /// allows, redirecting `pc` to the architectural vector. Returns whether
    /// anything was delivered.
    pub fn deliver_pending_exception(&mut self) -> bool {
        let (cond, vector) = if self.exceptions.contains(Exceptions::PROGRAM) {
            (Exceptions::PROGRAM, 0x0700)
        } else if self.exceptions.contains(Exceptions::FPU_UNAVAILABLE) {
            (Exceptions::FPU_UNAVAILABLE, 0x0800)
        } else if self.interrupts_enabled() && self.exceptions.contains(Exceptions::EXTERNAL_INT) {
            (Exceptions::EXTERNAL_INT, 0x0500)
        } else if self.interrupts_enabled() && self.exceptions.contains(Exceptions::DECREMENTER) {
            (Exceptions::DECREMENTER, 0x0900)
        } else {
            return false;
        };

        tracing::trace!(?cond, vector, pc = self.pc, "delivering exception");
        self.exceptions.remove(cond);
        self.srr0 = self.pc;
        self.srr1 = self.msr;
        self.msr &= !MSR_EE;
        self.pc = vector;
        true
    }
}

impl Default for CpuState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gqr_field_extraction() {
        // ld_type 7, ld_scale 4, st_type 5, st_scale 32.
        let gqr = Gqr((4 << 24) | (7 << 16) | (32 << 8) | 5);
        assert_eq!(gqr.ld_type(), 7);
        assert_eq!(gqr.ld_scale(), 4);
        assert_eq!(gqr.st_type(), 5);
        assert_eq!(gqr.st_scale(), 32);
    }

    #[test]
    fn masked_interrupts_stay_pending() {
        let mut cpu = CpuState::new();
        cpu.msr &= !MSR_EE;
        cpu.raise(Exceptions::DECREMENTER);
        assert!(!cpu.deliver_pending_exception());
        assert!(cpu.exceptions.contains(Exceptions::DECREMENTER));

        cpu.msr |= MSR_EE;
        assert!(cpu.deliver_pending_exception());
        assert_eq!(cpu.pc, 0x0900);
        assert!(cpu.exceptions.is_empty());
        assert!(!cpu.interrupts_enabled());
    }
}
