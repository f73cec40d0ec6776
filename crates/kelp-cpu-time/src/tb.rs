//! Snapshot-and-derive shadow state for the guest's free-running timebase
//! and countdown decrementer.
//!
//! Neither register is ticked live. A guest write snapshots
//! `(current_tick, value)`; every read derives the current value from the
//! scheduler's tick counter and the snapshot. Reads never mutate anything.

/// Default ratio between scheduler ticks (CPU cycles) and one
/// timebase/decrementer tick. The guest's timebase clock runs at a fixed
/// fraction of the core clock (core : bus : timebase = 12 : 4 : 1 on real
/// hardware), but the value is configuration, not gospel.
pub const DEFAULT_TICK_RATIO: i64 = 12;

#[derive(Debug, Clone)]
pub struct TimeBase {
    tick_ratio: i64,
    tb_start_ticks: i64,
    tb_start_value: u64,
    dec_start_ticks: i64,
    dec_start_value: u32,
}

impl TimeBase {
    pub fn new(tick_ratio: i64) -> Self {
        assert!(tick_ratio > 0, "tick ratio must be positive");
        Self {
            tick_ratio,
            tb_start_ticks: 0,
            tb_start_value: 0,
            dec_start_ticks: 0,
            dec_start_value: 0xFFFF_FFFF,
        }
    }

    #[inline]
    pub fn tick_ratio(&self) -> i64 {
        self.tick_ratio
    }

    pub fn set_timebase(&mut self, now_ticks: i64, value: u64) {
        self.tb_start_ticks = now_ticks;
        self.tb_start_value = value;
    }

    pub fn read_timebase(&self, now_ticks: i64) -> u64 {
        let elapsed = (now_ticks - self.tb_start_ticks) / self.tick_ratio;
        self.tb_start_value.wrapping_add(elapsed as u64)
    }

    pub fn snapshot_decrementer(&mut self, now_ticks: i64, value: u32) {
        self.dec_start_ticks = now_ticks;
        self.dec_start_value = value;
    }

    pub fn read_decrementer(&self, now_ticks: i64) -> u32 {
        let elapsed = (now_ticks - self.dec_start_ticks) / self.tick_ratio;
        self.dec_start_value.wrapping_sub(elapsed as u32)
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_RATIO)
    }
}
