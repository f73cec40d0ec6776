//! Per-instruction IR emission for the quantized paired forms.
//!
//! The translator either emits the full node sequence for an
//! instruction or declines and hands it to the slow path whole. There
//! is no partial emission: a declined instruction leaves the builder
//! exactly as it found it because the decision is made before the
//! first node goes in.

use crate::insn::{GekkoInstruction, OPCD_PSQ_L, OPCD_PSQ_LU, OPCD_PSQ_ST, OPCD_PSQ_STU};
use crate::ir::IrBuilder;

#[derive(Debug, Clone, Copy, Default)]
pub struct TranslateConfig {
    /// Memory breakpoints are armed; quantized accesses must take the
    /// fully-observable slow path.
    pub memcheck: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationOutcome {
    Emitted,
    UseSlowPath,
}

/// Translates one quantized load/store into IR, or declines.
///
/// Declines on: non-psq opcodes, an armed memcheck, and the W=1
/// single-dimension forms (those carry the implicit 1.0 second lane,
/// handled out of line).
pub fn translate(
    builder: &mut IrBuilder,
    inst: GekkoInstruction,
    config: &TranslateConfig,
) -> TranslationOutcome {
    match inst.opcd() {
        OPCD_PSQ_L | OPCD_PSQ_LU => translate_psq_l(builder, inst, config),
        OPCD_PSQ_ST | OPCD_PSQ_STU => translate_psq_st(builder, inst, config),
        _ => TranslationOutcome::UseSlowPath,
    }
}

fn translate_psq_l(
    builder: &mut IrBuilder,
    inst: GekkoInstruction,
    config: &TranslateConfig,
) -> TranslationOutcome {
    if config.memcheck || inst.w() {
        return TranslationOutcome::UseSlowPath;
    }
    let addr = effective_address(builder, inst);
    let selector = inst.i() | (inst.w() as u8) << 3;
    let packed = builder.emit_load_paired(addr, selector);
    let pair = builder.emit_expand_packed_to_mreg(packed);
    builder.emit_store_freg(pair, inst.rd());
    TranslationOutcome::Emitted
}

fn translate_psq_st(
    builder: &mut IrBuilder,
    inst: GekkoInstruction,
    config: &TranslateConfig,
) -> TranslationOutcome {
    if config.memcheck || inst.w() {
        return TranslationOutcome::UseSlowPath;
    }
    let addr = effective_address(builder, inst);
    let selector = inst.i() | (inst.w() as u8) << 3;
    let pair = builder.emit_load_freg(inst.rd());
    let packed = builder.emit_compact_mreg_to_packed(pair);
    builder.emit_store_paired(packed, addr, selector);
    TranslationOutcome::Emitted
}

/// Computes displacement + base, writing the base register back first
/// for the update forms. The writeback landing before the access
/// matters: a fault in the access must not observe a stale base, and
/// the access itself reads the already-computed address value, not the
/// register.
fn effective_address(builder: &mut IrBuilder, inst: GekkoInstruction) -> crate::ir::InstLoc {
    let mut addr = builder.emit_int_const(inst.simm12() as u32);
    if inst.ra() != 0 {
        let base = builder.emit_load_greg(inst.ra());
        addr = builder.emit_add(addr, base);
    }
    if inst.is_update_form() {
        builder.emit_store_greg(addr, inst.ra());
    }
    addr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insn::GekkoInstruction;
    use crate::ir::{IrBuilder, Op};

    fn emit(inst: GekkoInstruction) -> Vec<Op> {
        let mut b = IrBuilder::new();
        assert_eq!(
            translate(&mut b, inst, &TranslateConfig::default()),
            TranslationOutcome::Emitted
        );
        b.finish().iter().map(|(_, n)| n.op).collect()
    }

    #[test]
    fn load_with_base_emits_the_full_sequence() {
        let ops = emit(GekkoInstruction::encode(OPCD_PSQ_L, 3, 5, false, 2, -8));
        assert_eq!(ops.len(), 6);
        assert!(matches!(ops[0], Op::IntConst(v) if v == (-8i32) as u32));
        assert!(matches!(ops[1], Op::LoadGReg(5)));
        assert!(matches!(ops[2], Op::Add(a, b) if a.index() == 0 && b.index() == 1));
        assert!(matches!(ops[3], Op::LoadPaired { addr, selector: 2 } if addr.index() == 2));
        assert!(matches!(ops[4], Op::ExpandPackedToMReg(v) if v.index() == 3));
        assert!(matches!(ops[5], Op::StoreFReg { val, reg: 3 } if val.index() == 4));
    }

    #[test]
    fn zero_base_skips_the_add() {
        let ops = emit(GekkoInstruction::encode(OPCD_PSQ_L, 1, 0, false, 0, 16));
        assert!(matches!(ops[0], Op::IntConst(16)));
        assert!(matches!(ops[1], Op::LoadPaired { .. }));
    }

    #[test]
    fn update_form_writes_base_back_before_the_access() {
        let ops = emit(GekkoInstruction::encode(OPCD_PSQ_STU, 2, 4, false, 1, 32));
        let writeback = ops
            .iter()
            .position(|op| matches!(op, Op::StoreGReg { reg: 4, .. }))
            .unwrap();
        let access = ops
            .iter()
            .position(|op| matches!(op, Op::StorePaired { .. }))
            .unwrap();
        assert!(writeback < access);
    }

    #[test]
    fn store_reads_the_register_then_compacts() {
        let ops = emit(GekkoInstruction::encode(OPCD_PSQ_ST, 7, 0, false, 3, 0));
        assert!(ops
            .windows(2)
            .any(|w| matches!(w[0], Op::LoadFReg(7)) && matches!(w[1], Op::CompactMRegToPacked(_))));
    }

    #[test]
    fn declines_without_touching_the_builder() {
        let mut b = IrBuilder::new();
        let cfg = TranslateConfig::default();

        let w1 = GekkoInstruction::encode(OPCD_PSQ_L, 0, 1, true, 0, 0);
        assert_eq!(translate(&mut b, w1, &cfg), TranslationOutcome::UseSlowPath);

        let unknown = GekkoInstruction(31 << 26);
        assert_eq!(
            translate(&mut b, unknown, &cfg),
            TranslationOutcome::UseSlowPath
        );

        let checked = TranslateConfig { memcheck: true };
        let plain = GekkoInstruction::encode(OPCD_PSQ_ST, 0, 1, false, 0, 0);
        assert_eq!(
            translate(&mut b, plain, &checked),
            TranslationOutcome::UseSlowPath
        );

        assert_eq!(b.finish().len(), 0);
    }
}
