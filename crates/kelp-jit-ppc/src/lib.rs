//! Dynamic translation for the Gekko-class guest's paired-single
//! (quantized) memory traffic.
//!
//! The pipeline:
//!
//! - [`ir`] — a per-block dataflow graph of typed operation nodes, built
//!   from decoded guest instructions and discarded once the block is
//!   lowered.
//! - [`translate`] — the front-end that emits IR for the paired load/store
//!   family, or declines with an explicit "use the slow path" result.
//! - [`quantize`] — the format tables and numeric conversions between the
//!   wide paired-single register form and the narrow in-memory forms.
//! - [`routines`] — the shared per-format routine tables (the JIT's common
//!   asm block) plus the write-gather-pipe fast path.
//! - [`compile`] — the block compiler: lowers finished IR into an
//!   executable step list and implements the dispatch loop's
//!   [`JitBackend`](kelp_cpu_core::JitBackend) seam. A host-ISA emitter
//!   would implement the same seam; nothing outside this crate cares which
//!   encoding is behind it.
//! - [`slowpath`] — the non-IR default execution of the same instructions,
//!   taken whenever translation declines (memcheck, single-dimension
//!   accesses).

#![forbid(unsafe_code)]

pub mod compile;
pub mod insn;
pub mod ir;
pub mod quantize;
pub mod routines;
pub mod slowpath;
pub mod translate;

pub use compile::JitPpc;
pub use insn::GekkoInstruction;
pub use ir::{InstLoc, IrBlock, IrBuilder};
pub use routines::CommonRoutines;
pub use slowpath::PsqSlowPath;
pub use translate::{TranslateConfig, TranslationOutcome};
