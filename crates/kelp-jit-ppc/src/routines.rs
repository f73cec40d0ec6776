//! The shared per-format routine tables — the translated code's common
//! support block.
//!
//! One specialized routine exists per quantization format and direction,
//! selected by the 3-bit format code at call time. The tables are built
//! whole at construction; no partially-initialized table is ever
//! observable, and reserved codes resolve to the float routines rather
//! than holes.
//!
//! Calling convention (all routines):
//! - in: data address, 6-bit scale field;
//! - paired loads return the pair converted to floats;
//! - paired stores take the pair already in float form and perform the
//!   (converted) write;
//! - single stores take the one float the single-dimension encodings
//!   touch.

use kelp_cpu_core::{FifoBus, GuestBus};

use crate::quantize::{
    dequantize, quantize, ElementKind, PAIRED_LOAD, PAIRED_STORE, SINGLE_STORE,
};

pub type PairedLoadFn<B> = fn(&B, addr: u32, scale: u8) -> [f32; 2];
pub type PairedStoreFn<B> = fn(&mut B, addr: u32, scale: u8, value: [f32; 2]);
pub type SingleStoreFn<B> = fn(&mut B, addr: u32, scale: u8, value: f32);

pub struct CommonRoutines<B> {
    pub paired_load_quantized: [PairedLoadFn<B>; 8],
    pub paired_store_quantized: [PairedStoreFn<B>; 8],
    pub single_store_quantized: [SingleStoreFn<B>; 8],
}

impl<B: GuestBus> CommonRoutines<B> {
    pub fn new() -> Self {
        fn load_slot<B: GuestBus>(kind: ElementKind) -> PairedLoadFn<B> {
            match kind {
                ElementKind::F32 => load_pair_f32::<B>,
                ElementKind::U8 => load_pair_int::<B, 1, false>,
                ElementKind::U16 => load_pair_int::<B, 2, false>,
                ElementKind::S8 => load_pair_int::<B, 1, true>,
                ElementKind::S16 => load_pair_int::<B, 2, true>,
            }
        }
        fn store_slot<B: GuestBus>(kind: ElementKind) -> PairedStoreFn<B> {
            match kind {
                ElementKind::F32 => store_pair_f32::<B>,
                ElementKind::U8 => store_pair_int::<B, 1, false>,
                ElementKind::U16 => store_pair_int::<B, 2, false>,
                ElementKind::S8 => store_pair_int::<B, 1, true>,
                ElementKind::S16 => store_pair_int::<B, 2, true>,
            }
        }
        fn single_slot<B: GuestBus>(kind: ElementKind) -> SingleStoreFn<B> {
            match kind {
                ElementKind::F32 => store_single_f32::<B>,
                ElementKind::U8 => store_single_int::<B, 1, false>,
                ElementKind::U16 => store_single_int::<B, 2, false>,
                ElementKind::S8 => store_single_int::<B, 1, true>,
                ElementKind::S16 => store_single_int::<B, 2, true>,
            }
        }

        Self {
            paired_load_quantized: PAIRED_LOAD.map(load_slot::<B>),
            paired_store_quantized: PAIRED_STORE.map(store_slot::<B>),
            single_store_quantized: SINGLE_STORE.map(single_slot::<B>),
        }
    }
}

impl<B: GuestBus> Default for CommonRoutines<B> {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn kind_of<const BYTES: u32, const SIGNED: bool>() -> ElementKind {
    match (BYTES, SIGNED) {
        (1, false) => ElementKind::U8,
        (2, false) => ElementKind::U16,
        (1, true) => ElementKind::S8,
        (2, true) => ElementKind::S16,
        _ => unreachable!(),
    }
}

fn load_pair_f32<B: GuestBus>(bus: &B, addr: u32, _scale: u8) -> [f32; 2] {
    [bus.read_f32(addr), bus.read_f32(addr.wrapping_add(4))]
}

fn load_pair_int<B: GuestBus, const BYTES: u32, const SIGNED: bool>(
    bus: &B,
    addr: u32,
    scale: u8,
) -> [f32; 2] {
    let kind = kind_of::<BYTES, SIGNED>();
    let read = |a: u32| -> u32 {
        if BYTES == 1 {
            bus.read_u8(a) as u32
        } else {
            bus.read_u16(a) as u32
        }
    };
    [
        dequantize(kind, scale, read(addr)),
        dequantize(kind, scale, read(addr.wrapping_add(BYTES))),
    ]
}

fn store_pair_f32<B: GuestBus>(bus: &mut B, addr: u32, _scale: u8, value: [f32; 2]) {
    bus.write_f32(addr, value[0]);
    bus.write_f32(addr.wrapping_add(4), value[1]);
}

fn store_pair_int<B: GuestBus, const BYTES: u32, const SIGNED: bool>(
    bus: &mut B,
    addr: u32,
    scale: u8,
    value: [f32; 2],
) {
    let kind = kind_of::<BYTES, SIGNED>();
    let mut write = |a: u32, v: f32| {
        let raw = quantize(kind, scale, v);
        if BYTES == 1 {
            bus.write_u8(a, raw as u8);
        } else {
            bus.write_u16(a, raw as u16);
        }
    };
    write(addr, value[0]);
    write(addr.wrapping_add(BYTES), value[1]);
}

fn store_single_f32<B: GuestBus>(bus: &mut B, addr: u32, _scale: u8, value: f32) {
    bus.write_f32(addr, value);
}

fn store_single_int<B: GuestBus, const BYTES: u32, const SIGNED: bool>(
    bus: &mut B,
    addr: u32,
    scale: u8,
    value: f32,
) {
    let kind = kind_of::<BYTES, SIGNED>();
    let raw = quantize(kind, scale, value);
    if BYTES == 1 {
        bus.write_u8(addr, raw as u8);
    } else {
        bus.write_u16(addr, raw as u16);
    }
}

/// Direct write-gather-pipe path for a paired store whose address is
/// statically known to target the pipe: the converted elements stream
/// through the FIFO interface instead of the general memory map.
pub fn fifo_store_quantized<B: FifoBus>(bus: &mut B, kind: ElementKind, scale: u8, value: [f32; 2]) {
    for v in value {
        let raw = quantize(kind, scale, v);
        match kind.bytes() {
            1 => bus.fifo_write_u8(raw as u8),
            2 => bus.fifo_write_u16(raw as u16),
            _ => bus.fifo_write_u32(raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kelp_cpu_core::FlatTestBus;

    #[test]
    fn every_slot_is_populated_and_consistent() {
        let routines: CommonRoutines<FlatTestBus> = CommonRoutines::new();
        let mut bus = FlatTestBus::new(0x100);
        for fmt in 0..8 {
            routines.paired_store_quantized[fmt](&mut bus, 0x40, 0, [1.0, 2.0]);
            let pair = routines.paired_load_quantized[fmt](&bus, 0x40, 0);
            assert_eq!(pair, [1.0, 2.0], "format {fmt}");
        }
    }

    #[test]
    fn u16_pair_is_big_endian_on_the_bus() {
        let routines: CommonRoutines<FlatTestBus> = CommonRoutines::new();
        let mut bus = FlatTestBus::new(0x100);
        // Format 5 = u16; scale 0.
        routines.paired_store_quantized[5](&mut bus, 0x20, 0, [0x0102 as f32, 0x0304 as f32]);
        assert_eq!(
            (0..4).map(|i| bus.read_u8(0x20 + i)).collect::<Vec<_>>(),
            vec![0x01, 0x02, 0x03, 0x04]
        );
    }

    #[test]
    fn fifo_path_streams_converted_elements() {
        let mut bus = FlatTestBus::new(0x10);
        fifo_store_quantized(&mut bus, ElementKind::U8, 4, [3.0, 1.5]);
        assert_eq!(bus.fifo, vec![48, 24]);
    }
}
