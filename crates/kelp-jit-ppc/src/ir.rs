//! The per-block dataflow graph.
//!
//! Nodes live in an arena owned by one [`IrBlock`]; an [`InstLoc`] is an
//! index into that arena, valid only for the block's lifetime. The block is
//! built front to back and consumed once by the compiler, then dropped —
//! when a translation is superseded (e.g. self-modifying code), the whole
//! arena goes with it.
//!
//! Invariants, enforced by construction:
//! - every operand `InstLoc` was returned by an earlier `emit_*` call, so
//!   the graph is acyclic with no forward references;
//! - emission never deduplicates — structurally identical emissions get
//!   fresh nodes, and any value numbering is a later explicit pass;
//! - side-effect order is emission order, and the compiler preserves it.

/// Opaque handle to a node in one block's arena. Never a raw address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstLoc(u32);

impl InstLoc {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Value category a node produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// 32-bit integer (addresses, general registers).
    Int,
    /// Two 32-bit float lanes packed into 64 bits: the memory-bus form of a
    /// pair.
    Packed,
    /// The wide paired-single register form.
    FloatPair,
    /// Side-effect node with no consumable result.
    Void,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    IntConst(u32),
    Add(InstLoc, InstLoc),
    LoadGReg(u8),
    StoreGReg { val: InstLoc, reg: u8 },
    LoadFReg(u8),
    StoreFReg { val: InstLoc, reg: u8 },
    /// `selector` packs the 3-bit quantization-register index with the
    /// single-dimension flag in bit 3.
    LoadPaired { addr: InstLoc, selector: u8 },
    StorePaired { val: InstLoc, addr: InstLoc, selector: u8 },
    /// Wide pair -> packed bus form.
    CompactMRegToPacked(InstLoc),
    /// Packed bus form -> wide pair.
    ExpandPackedToMReg(InstLoc),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrNode {
    pub op: Op,
    pub ty: ValueType,
}

/// A finished block graph, ready for lowering.
#[derive(Debug, Default, Clone)]
pub struct IrBlock {
    nodes: Vec<IrNode>,
}

impl IrBlock {
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn node(&self, loc: InstLoc) -> &IrNode {
        &self.nodes[loc.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (InstLoc, &IrNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (InstLoc(i as u32), n))
    }
}

/// Appends typed nodes to a block arena.
#[derive(Debug, Default)]
pub struct IrBuilder {
    block: IrBlock,
}

impl IrBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, op: Op, ty: ValueType) -> InstLoc {
        let loc = InstLoc(self.block.nodes.len() as u32);
        self.block.nodes.push(IrNode { op, ty });
        loc
    }

    #[inline]
    fn check_operand(&self, loc: InstLoc) {
        debug_assert!(
            loc.index() < self.block.nodes.len(),
            "operand InstLoc must come from an earlier emission"
        );
    }

    pub fn emit_int_const(&mut self, v: u32) -> InstLoc {
        self.push(Op::IntConst(v), ValueType::Int)
    }

    pub fn emit_add(&mut self, a: InstLoc, b: InstLoc) -> InstLoc {
        self.check_operand(a);
        self.check_operand(b);
        debug_assert_eq!(self.block.node(a).ty, ValueType::Int);
        debug_assert_eq!(self.block.node(b).ty, ValueType::Int);
        self.push(Op::Add(a, b), ValueType::Int)
    }

    pub fn emit_load_greg(&mut self, reg: u8) -> InstLoc {
        debug_assert!(reg < 32);
        self.push(Op::LoadGReg(reg), ValueType::Int)
    }

    pub fn emit_store_greg(&mut self, val: InstLoc, reg: u8) -> InstLoc {
        self.check_operand(val);
        debug_assert!(reg < 32);
        self.push(Op::StoreGReg { val, reg }, ValueType::Void)
    }

    pub fn emit_load_freg(&mut self, reg: u8) -> InstLoc {
        debug_assert!(reg < 32);
        self.push(Op::LoadFReg(reg), ValueType::FloatPair)
    }

    pub fn emit_store_freg(&mut self, val: InstLoc, reg: u8) -> InstLoc {
        self.check_operand(val);
        debug_assert!(reg < 32);
        self.push(Op::StoreFReg { val, reg }, ValueType::Void)
    }

    pub fn emit_load_paired(&mut self, addr: InstLoc, selector: u8) -> InstLoc {
        self.check_operand(addr);
        self.push(
            Op::LoadPaired {
                addr,
                selector: selector & 0xF,
            },
            ValueType::Packed,
        )
    }

    pub fn emit_store_paired(&mut self, val: InstLoc, addr: InstLoc, selector: u8) -> InstLoc {
        self.check_operand(val);
        self.check_operand(addr);
        self.push(
            Op::StorePaired {
                val,
                addr,
                selector: selector & 0xF,
            },
            ValueType::Void,
        )
    }

    pub fn emit_compact_mreg_to_packed(&mut self, val: InstLoc) -> InstLoc {
        self.check_operand(val);
        debug_assert_eq!(self.block.node(val).ty, ValueType::FloatPair);
        self.push(Op::CompactMRegToPacked(val), ValueType::Packed)
    }

    pub fn emit_expand_packed_to_mreg(&mut self, val: InstLoc) -> InstLoc {
        self.check_operand(val);
        debug_assert_eq!(self.block.node(val).ty, ValueType::Packed);
        self.push(Op::ExpandPackedToMReg(val), ValueType::FloatPair)
    }

    /// How many nodes have been emitted so far.
    pub fn len(&self) -> usize {
        self.block.len()
    }

    pub fn is_empty(&self) -> bool {
        self.block.is_empty()
    }

    pub fn finish(self) -> IrBlock {
        self.block
    }
}
