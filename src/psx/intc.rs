use log::trace;
use serde::{Deserialize, Serialize};

use crate::util::Range;

pub const INTC_RANGE: Range = Range(0x1f80_1070, 0x1f80_1078);

const I_STAT: u32 = 0x1f80_1070;
const I_MASK: u32 = 0x1f80_1074;

/// Bits 0-10 are wired; the rest read back as zero.
const SOURCES: u32 = 0x7ff;

/// Interrupt sources, in I_STAT bit order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
    Vblank,
    Gpu,
    Cdrom,
    Dma,
    Tmr0,
    Tmr1,
    Tmr2,
    Controller,
    Sio,
    Spu,
    Pio,
}

impl Interrupt {
    pub fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

#[derive(Clone, Default, Deserialize, Serialize)]
pub struct Intc {
    status: u32,
    mask: u32,
}

impl Intc {
    pub fn new() -> Intc {
        Intc::default()
    }

    /// Drives Cause bit 10.
    pub fn pending(&self) -> bool {
        (self.status & self.mask) != 0
    }

    /// Latches a source. Levels are edge-captured: the bit stays set until
    /// software acknowledges it.
    pub fn assert_irq(&mut self, interrupt: Interrupt) {
        trace!("[INTC] {:?} asserted", interrupt);
        self.status |= interrupt.bit();
    }

    pub fn read_status(&self) -> u32 {
        self.status
    }

    /// Writing 0 to a bit clears it, 1 leaves it alone.
    pub fn acknowledge_irq(&mut self, value: u32) {
        self.status &= value & SOURCES;
    }

    pub fn read_mask(&self) -> u32 {
        self.mask
    }

    pub fn write_mask(&mut self, value: u32) {
        self.mask = value & SOURCES;
    }

    /// Register access, any width. Narrow reads see the addressed lane.
    pub fn read(&self, address: u32) -> u32 {
        let lane = (address & 0x3) * 8;

        match address & !0x3 {
            I_STAT => self.status >> lane,
            I_MASK => self.mask >> lane,
            _ => panic!("[INTC] [ERROR] Read from unknown register 0x{:08x}", address),
        }
    }

    pub fn write(&mut self, address: u32, value: u32) {
        match address & !0x3 {
            I_STAT => self.acknowledge_irq(value),
            I_MASK => self.write_mask(value),
            _ => panic!("[INTC] [ERROR] Write to unknown register 0x{:08x}", address),
        }
    }
}
