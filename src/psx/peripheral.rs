//! Interface for devices living outside this crate (GPU, SPU, timers,
//! CD-ROM, controllers, MDEC).

use std::any::Any;

use log::trace;

use crate::util::Range;

use super::dma::DmaPort;
use super::intc::Intc;
use super::scheduler::Scheduler;

/// What a device may touch while servicing an access.
pub struct DeviceContext<'a> {
    pub scheduler: &'a mut Scheduler,
    pub intc: &'a mut Intc,
}

/// A bus-attached device. Narrow accesses default to the containing word;
/// devices with byte or halfword registers override them.
pub trait Peripheral: Any {
    fn name(&self) -> &'static str;

    fn range(&self) -> Range;

    fn read32(&mut self, address: u32, cx: &mut DeviceContext) -> u32;

    fn write32(&mut self, address: u32, value: u32, cx: &mut DeviceContext);

    fn read16(&mut self, address: u32, cx: &mut DeviceContext) -> u16 {
        (self.read32(address & !0x3, cx) >> ((address & 0x2) * 8)) as u16
    }

    fn read8(&mut self, address: u32, cx: &mut DeviceContext) -> u8 {
        (self.read32(address & !0x3, cx) >> ((address & 0x3) * 8)) as u8
    }

    fn write16(&mut self, address: u32, value: u16, cx: &mut DeviceContext) {
        self.write32(address, value as u32, cx);
    }

    fn write8(&mut self, address: u32, value: u8, cx: &mut DeviceContext) {
        self.write32(address, value as u32, cx);
    }

    /// DMA channel this device answers on.
    fn dma_port(&self) -> Option<DmaPort> {
        None
    }

    /// One word from the device into RAM.
    fn dma_read(&mut self, _cx: &mut DeviceContext) -> u32 {
        0
    }

    /// One word from RAM into the device.
    fn dma_write(&mut self, _value: u32, _cx: &mut DeviceContext) {}

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

const GPUSTAT: u32 = 0x1f80_1814;
const GPUSTAT_READY: u32 = 0x1c00_0000;

/// Stand-in for an unattached standard device: reads 0, ignores writes.
pub struct OpenBus {
    name: &'static str,
    range: Range,
}

impl OpenBus {
    pub fn new(name: &'static str, range: Range) -> OpenBus {
        OpenBus {
            name: name,
            range: range,
        }
    }

    /// Placeholders for every standard device outside this crate, enough
    /// for a BIOS to get through its hardware setup.
    pub fn standard() -> Vec<OpenBus> {
        vec![
            OpenBus::new("SIO", Range(0x1f80_1040, 0x1f80_1060)),
            OpenBus::new("TIMERS", Range(0x1f80_1100, 0x1f80_1130)),
            OpenBus::new("CDROM", Range(0x1f80_1800, 0x1f80_1804)),
            OpenBus::new("GPU", Range(0x1f80_1810, 0x1f80_1818)),
            OpenBus::new("MDEC", Range(0x1f80_1820, 0x1f80_1828)),
            OpenBus::new("SPU", Range(0x1f80_1c00, 0x1f80_2000)),
        ]
    }
}

impl Peripheral for OpenBus {
    fn name(&self) -> &'static str {
        self.name
    }

    fn range(&self) -> Range {
        self.range
    }

    fn read32(&mut self, address: u32, _cx: &mut DeviceContext) -> u32 {
        trace!("[{}] Read from unattached register 0x{:08x}", self.name, address);

        match address {
            GPUSTAT => GPUSTAT_READY,
            _ => 0,
        }
    }

    fn write32(&mut self, address: u32, value: u32, _cx: &mut DeviceContext) {
        trace!("[{}] Write 0x{:08x} to unattached register 0x{:08x}", self.name, value, address);
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_placeholder_reports_ready() {
        let mut scheduler = Scheduler::new();
        let mut intc = Intc::new();
        let mut cx = DeviceContext { scheduler: &mut scheduler, intc: &mut intc };

        let mut gpu = OpenBus::new("GPU", Range(0x1f80_1810, 0x1f80_1818));

        assert_eq!(gpu.read32(GPUSTAT, &mut cx), GPUSTAT_READY);
        assert_eq!(gpu.read16(GPUSTAT + 2, &mut cx), 0x1c00);
        assert_eq!(gpu.read32(0x1f80_1810, &mut cx), 0);
    }

    #[test]
    fn placeholders_do_not_overlap() {
        let devices = OpenBus::standard();

        for (n, a) in devices.iter().enumerate() {
            for b in devices.iter().skip(n + 1) {
                assert!(!a.range().overlaps(&b.range()), "{} overlaps {}", a.name(), b.name());
            }
        }
    }
}
