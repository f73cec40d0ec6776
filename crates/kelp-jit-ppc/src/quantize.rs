//! Quantization format tables and the numeric conversions behind the
//! paired load/store machinery.
//!
//! A format code (3 bits, out of the guest's quantization-control
//! register) selects how a float crosses the memory bus: raw 32-bit float,
//! or a fixed-point integer with a power-of-two scale. The scale field is a
//! 6-bit two's-complement shift: stores multiply by `2^shift`, loads by
//! `2^-shift`. Integer formats saturate on store and sign/zero-extend on
//! load; the bus is big-endian throughout.

/// In-memory element shape selected by a format code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    F32,
    U8,
    U16,
    S8,
    S16,
}

impl ElementKind {
    #[inline]
    pub fn bytes(self) -> u32 {
        match self {
            ElementKind::F32 => 4,
            ElementKind::U8 | ElementKind::S8 => 1,
            ElementKind::U16 | ElementKind::S16 => 2,
        }
    }

    #[inline]
    pub fn is_fixed_point(self) -> bool {
        !matches!(self, ElementKind::F32)
    }
}

// Codes 1..=3 are architecturally reserved and behave as float on the real
// part, so all three context tables agree on them. Loads, stores and
// single stores are still separate tables because the guest encodings
// select those contexts independently.
const FORMAT_TABLE: [ElementKind; 8] = [
    ElementKind::F32, // 0
    ElementKind::F32, // 1 (reserved)
    ElementKind::F32, // 2 (reserved)
    ElementKind::F32, // 3 (reserved)
    ElementKind::U8,  // 4
    ElementKind::U16, // 5
    ElementKind::S8,  // 6
    ElementKind::S16, // 7
];

pub const PAIRED_LOAD: [ElementKind; 8] = FORMAT_TABLE;
pub const PAIRED_STORE: [ElementKind; 8] = FORMAT_TABLE;
pub const SINGLE_STORE: [ElementKind; 8] = FORMAT_TABLE;

/// Interprets the 6-bit scale field as a two's-complement shift (-32..=31).
#[inline]
fn shift_from_field(scale: u8) -> i32 {
    ((i32::from(scale) & 0x3F) << 26) >> 26
}

/// Store-direction factor: `2^shift`.
#[inline]
pub fn quantize_factor(scale: u8) -> f32 {
    2f32.powi(shift_from_field(scale))
}

/// Load-direction factor: `2^-shift`.
#[inline]
pub fn dequantize_factor(scale: u8) -> f32 {
    2f32.powi(-shift_from_field(scale))
}

/// Converts one float to its in-memory integer/bit representation.
///
/// Fixed-point formats scale, truncate toward zero, and saturate to the
/// element's representable range — the hardware does not fault on
/// overflow.
pub fn quantize(kind: ElementKind, scale: u8, value: f32) -> u32 {
    match kind {
        ElementKind::F32 => value.to_bits(),
        _ => {
            let scaled = value * quantize_factor(scale);
            match kind {
                ElementKind::U8 => (scaled as i64).clamp(0, u8::MAX as i64) as u32,
                ElementKind::U16 => (scaled as i64).clamp(0, u16::MAX as i64) as u32,
                ElementKind::S8 => {
                    ((scaled as i64).clamp(i8::MIN as i64, i8::MAX as i64) as u32) & 0xFF
                }
                ElementKind::S16 => {
                    ((scaled as i64).clamp(i16::MIN as i64, i16::MAX as i64) as u32) & 0xFFFF
                }
                ElementKind::F32 => unreachable!(),
            }
        }
    }
}

/// Converts one in-memory representation back to a float.
pub fn dequantize(kind: ElementKind, scale: u8, raw: u32) -> f32 {
    match kind {
        ElementKind::F32 => f32::from_bits(raw),
        ElementKind::U8 => (raw as u8) as f32 * dequantize_factor(scale),
        ElementKind::U16 => (raw as u16) as f32 * dequantize_factor(scale),
        ElementKind::S8 => (raw as u8 as i8) as f32 * dequantize_factor(scale),
        ElementKind::S16 => (raw as u16 as i16) as f32 * dequantize_factor(scale),
    }
}
