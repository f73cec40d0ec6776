//! Field access for the fixed 32-bit guest encoding.
//!
//! This is the decoded-instruction record handed across the decoder
//! boundary: opcode fields are extracted here, dispatch happens in
//! [`crate::translate`].

pub const OPCD_PSQ_L: u32 = 56;
pub const OPCD_PSQ_LU: u32 = 57;
pub const OPCD_PSQ_ST: u32 = 60;
pub const OPCD_PSQ_STU: u32 = 61;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GekkoInstruction(pub u32);

impl GekkoInstruction {
    #[inline]
    pub fn opcd(self) -> u32 {
        self.0 >> 26
    }

    /// Destination (loads) / source (stores) floating register.
    #[inline]
    pub fn rd(self) -> u8 {
        ((self.0 >> 21) & 0x1F) as u8
    }

    /// Base address register; 0 means "no base".
    #[inline]
    pub fn ra(self) -> u8 {
        ((self.0 >> 16) & 0x1F) as u8
    }

    /// Single-dimension flag: 1 accesses one element instead of the pair.
    #[inline]
    pub fn w(self) -> bool {
        (self.0 >> 15) & 1 != 0
    }

    /// Quantization-control register index.
    #[inline]
    pub fn i(self) -> u8 {
        ((self.0 >> 12) & 0x7) as u8
    }

    /// Sign-extended 12-bit displacement.
    #[inline]
    pub fn simm12(self) -> i32 {
        ((self.0 & 0xFFF) as i32) << 20 >> 20
    }

    /// Whether this is one of the update-form encodings that write the
    /// computed effective address back to RA.
    #[inline]
    pub fn is_update_form(self) -> bool {
        matches!(self.opcd(), OPCD_PSQ_LU | OPCD_PSQ_STU)
    }

    pub fn encode(opcd: u32, rd: u8, ra: u8, w: bool, i: u8, simm12: i32) -> Self {
        debug_assert!(rd < 32 && ra < 32 && i < 8);
        Self(
            (opcd << 26)
                | (u32::from(rd) << 21)
                | (u32::from(ra) << 16)
                | (u32::from(w) << 15)
                | (u32::from(i) << 12)
                | (simm12 as u32 & 0xFFF),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_round_trips_fields() {
        let inst = GekkoInstruction::encode(OPCD_PSQ_LU, 5, 3, true, 6, -8);
        assert_eq!(inst.opcd(), OPCD_PSQ_LU);
        assert_eq!(inst.rd(), 5);
        assert_eq!(inst.ra(), 3);
        assert!(inst.w());
        assert_eq!(inst.i(), 6);
        assert_eq!(inst.simm12(), -8);
        assert!(inst.is_update_form());
    }

    #[test]
    fn displacement_sign_extends() {
        let inst = GekkoInstruction::encode(OPCD_PSQ_L, 0, 0, false, 0, -2048);
        assert_eq!(inst.simm12(), -2048);
        let inst = GekkoInstruction::encode(OPCD_PSQ_L, 0, 0, false, 0, 2047);
        assert_eq!(inst.simm12(), 2047);
    }
}
