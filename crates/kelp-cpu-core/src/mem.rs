//! Memory-bus seams between the translation core and the machine's memory
//! map.
//!
//! The guest architecture is big-endian; every multi-byte default method
//! here encodes that order regardless of host endianness. Concrete bus
//! implementations live outside this core and only need to supply the byte
//! primitives.

/// Byte-addressable guest memory access.
pub trait GuestBus {
    fn read_u8(&self, addr: u32) -> u8;
    fn write_u8(&mut self, addr: u32, value: u8);

    #[must_use]
    fn read_u16(&self, addr: u32) -> u16 {
        let hi = self.read_u8(addr) as u16;
        let lo = self.read_u8(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    #[must_use]
    fn read_u32(&self, addr: u32) -> u32 {
        let mut out = 0u32;
        for i in 0..4 {
            out = (out << 8) | self.read_u8(addr.wrapping_add(i)) as u32;
        }
        out
    }

    #[must_use]
    fn read_u64(&self, addr: u32) -> u64 {
        let hi = self.read_u32(addr) as u64;
        let lo = self.read_u32(addr.wrapping_add(4)) as u64;
        (hi << 32) | lo
    }

    fn write_u16(&mut self, addr: u32, value: u16) {
        self.write_u8(addr, (value >> 8) as u8);
        self.write_u8(addr.wrapping_add(1), value as u8);
    }

    fn write_u32(&mut self, addr: u32, value: u32) {
        for i in 0..4 {
            self.write_u8(addr.wrapping_add(i), (value >> (24 - i * 8)) as u8);
        }
    }

    fn write_u64(&mut self, addr: u32, value: u64) {
        self.write_u32(addr, (value >> 32) as u32);
        self.write_u32(addr.wrapping_add(4), value as u32);
    }

    #[must_use]
    fn read_f32(&self, addr: u32) -> f32 {
        f32::from_bits(self.read_u32(addr))
    }

    fn write_f32(&mut self, addr: u32, value: f32) {
        self.write_u32(addr, value.to_bits());
    }
}

/// Base of the write-gather pipe region. Stores whose effective address is
/// statically known to land here bypass the general memory map and stream
/// through [`FifoBus::fifo_write`] instead.
pub const GATHER_PIPE_ADDR: u32 = 0x0C00_8000;

/// Whether `addr` targets the write-gather pipe page.
#[inline]
pub fn is_gather_pipe(addr: u32) -> bool {
    addr & 0xFFFF_F000 == GATHER_PIPE_ADDR
}

/// FIFO-style streaming writes into the gather pipe.
pub trait FifoBus {
    fn fifo_write(&mut self, bytes: &[u8]);

    fn fifo_write_u8(&mut self, value: u8) {
        self.fifo_write(&[value]);
    }

    fn fifo_write_u16(&mut self, value: u16) {
        self.fifo_write(&value.to_be_bytes());
    }

    fn fifo_write_u32(&mut self, value: u32) {
        self.fifo_write(&value.to_be_bytes());
    }

    fn fifo_write_f32(&mut self, value: f32) {
        self.fifo_write(&value.to_bits().to_be_bytes());
    }
}

/// Flat in-memory bus for unit tests and bring-up. Addresses wrap at the
/// buffer size so tests can use guest-looking addresses without building a
/// memory map.
#[derive(Debug, Clone)]
pub struct FlatTestBus {
    mem: Vec<u8>,
    pub fifo: Vec<u8>,
}

impl FlatTestBus {
    pub fn new(size: usize) -> Self {
        assert!(size.is_power_of_two(), "test bus size must be a power of two");
        Self {
            mem: vec![0; size],
            fifo: Vec::new(),
        }
    }

    pub fn load(&mut self, addr: u32, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            let idx = (addr as usize + i) & (self.mem.len() - 1);
            self.mem[idx] = b;
        }
    }
}

impl GuestBus for FlatTestBus {
    fn read_u8(&self, addr: u32) -> u8 {
        self.mem[addr as usize & (self.mem.len() - 1)]
    }

    fn write_u8(&mut self, addr: u32, value: u8) {
        let idx = addr as usize & (self.mem.len() - 1);
        self.mem[idx] = value;
    }
}

impl FifoBus for FlatTestBus {
    fn fifo_write(&mut self, bytes: &[u8]) {
        self.fifo.extend_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multibyte_accesses_are_big_endian() {
        let mut bus = FlatTestBus::new(0x100);
        bus.write_u32(0x10, 0x0102_0304);
        assert_eq!(bus.read_u8(0x10), 0x01);
        assert_eq!(bus.read_u8(0x13), 0x04);
        assert_eq!(bus.read_u16(0x12), 0x0304);
        assert_eq!(bus.read_u32(0x10), 0x0102_0304);

        bus.write_u64(0x20, 0x1122_3344_5566_7788);
        assert_eq!(bus.read_u8(0x20), 0x11);
        assert_eq!(bus.read_u8(0x27), 0x88);
    }

    #[test]
    fn fifo_writes_stream_big_endian() {
        let mut bus = FlatTestBus::new(0x10);
        bus.fifo_write_u16(0xBEEF);
        bus.fifo_write_u8(0x7F);
        assert_eq!(bus.fifo, vec![0xBE, 0xEF, 0x7F]);
    }

    #[test]
    fn gather_pipe_region_check() {
        assert!(is_gather_pipe(GATHER_PIPE_ADDR));
        assert!(is_gather_pipe(GATHER_PIPE_ADDR + 0xFFF));
        assert!(!is_gather_pipe(GATHER_PIPE_ADDR + 0x1000));
        assert!(!is_gather_pipe(0x8000_0000));
    }
}
