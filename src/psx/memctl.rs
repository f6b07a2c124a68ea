use log::trace;
use serde::{Deserialize, Serialize};

use crate::util::Range;

pub const MEMCTL_RANGE: Range = Range(0x1f80_1000, 0x1f80_1024);
pub const RAM_SIZE_RANGE: Range = Range(0x1f80_1060, 0x1f80_1064);
pub const CACHE_CONTROL_RANGE: Range = Range(0xfffe_0130, 0xfffe_0134);

/// Memory control 1 (expansion and device delays) and RAM_SIZE. Values are
/// stored and read back; they have no effect on timing.
#[derive(Clone, Deserialize, Serialize)]
pub struct MemControl {
    registers: [u32; 9],
    ram_size: u32,
}

impl MemControl {
    pub fn new() -> MemControl {
        let mut registers = [0; 9];

        registers[0] = 0x1f00_0000;
        registers[1] = 0x1f80_2000;
        registers[5] = 0x2009_31e1;

        MemControl {
            registers: registers,
            ram_size: 0x0000_0b88,
        }
    }

    pub fn read(&self, address: u32) -> u32 {
        if RAM_SIZE_RANGE.contains(address) {
            return self.ram_size;
        }

        self.registers[MEMCTL_RANGE.offset(address) >> 2]
    }

    pub fn write(&mut self, address: u32, value: u32) {
        trace!("[MEMCTL] 0x{:08x} <- 0x{:08x}", address, value);

        if RAM_SIZE_RANGE.contains(address) {
            self.ram_size = value;
            return;
        }

        self.registers[MEMCTL_RANGE.offset(address) >> 2] = value;
    }
}

#[derive(Clone, Default, Deserialize, Serialize)]
pub struct CacheControl {
    value: u32,
}

impl CacheControl {
    pub fn new() -> CacheControl {
        CacheControl::default()
    }

    pub fn read(&self) -> u32 {
        self.value
    }

    pub fn write(&mut self, value: u32) {
        trace!("[CACHECTL] 0x{:08x}", value);
        self.value = value;
    }
}
