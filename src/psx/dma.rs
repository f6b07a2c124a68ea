use log::debug;
use serde::{Deserialize, Serialize};

use crate::util::Range;

use super::intc::{Intc, Interrupt};

pub const DMA_RANGE: Range = Range(0x1f80_1080, 0x1f80_1100);

const DPCR: u32 = 0x0;
const DICR: u32 = 0x4;
const DICR_HIGH: u32 = 0x6;

const CHCR_WRITABLE: u32 = 0x1177_0703;
const CHCR_TRIGGER: u32 = 1 << 28;
const CHCR_ENABLE: u32 = 1 << 24;

const DICR_WRITABLE: u32 = 0x00ff_803f;
const DICR_FORCE: u32 = 1 << 15;
const DICR_MASTER_ENABLE: u32 = 1 << 23;
const DICR_MASTER_FLAG: u32 = 1 << 31;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum SyncMode {
    Manual,
    Request,
    LinkedList,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum Step {
    Forward,
    Backward,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum Direction {
    ToRam,
    FromRam,
}

/// Channels in register order, 0x1f801080 + 0x10 * index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum DmaPort {
    MDECIn,
    MDECOut,
    GPU,
    CDROM,
    SPU,
    PIO,
    OTC,
}

const PORTS: [DmaPort; 7] = [
    DmaPort::MDECIn,
    DmaPort::MDECOut,
    DmaPort::GPU,
    DmaPort::CDROM,
    DmaPort::SPU,
    DmaPort::PIO,
    DmaPort::OTC,
];

impl DmaPort {
    pub fn from_index(index: usize) -> DmaPort {
        match PORTS.get(index) {
            Some(&port) => port,
            None => panic!("[DMA] [ERROR] No channel {}", index),
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// One channel's MADR, BCR and CHCR, kept as written and decoded on use.
#[derive(Clone, Copy, Default, Deserialize, Serialize)]
pub struct DmaChannel {
    madr: u32,
    bcr: u32,
    chcr: u32,
}

impl DmaChannel {
    pub fn base_address(&self) -> u32 {
        self.madr & 0x1f_fffc
    }

    pub fn sync(&self) -> SyncMode {
        match (self.chcr >> 9) & 0x3 {
            0 => SyncMode::Manual,
            1 => SyncMode::Request,
            2 => SyncMode::LinkedList,
            _ => panic!("[DMA] [ERROR] Reserved sync mode in CHCR 0x{:08x}", self.chcr),
        }
    }

    pub fn step(&self) -> Step {
        if self.chcr & 0x2 != 0 {
            Step::Backward
        } else {
            Step::Forward
        }
    }

    pub fn direction(&self) -> Direction {
        if self.chcr & 0x1 != 0 {
            Direction::FromRam
        } else {
            Direction::ToRam
        }
    }

    pub fn busy(&self) -> bool {
        self.chcr & CHCR_ENABLE != 0
    }

    /// Manual transfers also wait for the trigger bit.
    pub fn active(&self) -> bool {
        let triggered = self.sync() != SyncMode::Manual || self.chcr & CHCR_TRIGGER != 0;
        self.busy() && triggered
    }

    /// Words moved by a block transfer. A block size of 0 means 0x10000.
    pub fn words(&self) -> u32 {
        let size = match self.bcr & 0xffff {
            0 => 0x1_0000,
            n => n,
        };
        let blocks = self.bcr >> 16;

        match self.sync() {
            SyncMode::Manual => size,
            SyncMode::Request => size * blocks,
            SyncMode::LinkedList => 0,
        }
    }

    pub fn start(&mut self) {
        self.chcr &= !CHCR_TRIGGER;
    }

    pub fn finish(&mut self) {
        self.chcr &= !(CHCR_TRIGGER | CHCR_ENABLE);
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct Dma {
    channels: [DmaChannel; 7],
    control: u32,
    interrupt: u32,

    /// Started transfers waiting for their completion event: (due, port).
    in_flight: Vec<(u64, DmaPort)>,
}

impl Dma {
    pub fn new() -> Dma {
        Dma {
            channels: [DmaChannel::default(); 7],
            control: 0x0765_4321,
            interrupt: 0,

            in_flight: Vec::new(),
        }
    }

    pub fn channel(&self, port: DmaPort) -> DmaChannel {
        self.channels[port.index()]
    }

    pub fn channel_mut(&mut self, port: DmaPort) -> &mut DmaChannel {
        &mut self.channels[port.index()]
    }

    /// DPCR holds one enable bit per channel, at bit 3 of its nibble.
    pub fn dma_enabled(&self, port: DmaPort) -> bool {
        self.control & (0x8 << (port.index() * 4)) != 0
    }

    pub fn begin(&mut self, port: DmaPort, due: u64) {
        self.channel_mut(port).start();

        let index = self.in_flight.partition_point(|&(d, _)| d <= due);
        self.in_flight.insert(index, (due, port));
    }

    /// Next transfer finishing by `now`.
    pub fn take_finished(&mut self, now: u64) -> Option<DmaPort> {
        match self.in_flight.first() {
            Some(&(due, port)) if due <= now => {
                self.in_flight.remove(0);
                Some(port)
            }
            _ => None,
        }
    }

    pub fn finish(&mut self, intc: &mut Intc, port: DmaPort) {
        self.channel_mut(port).finish();

        let n = port.index();

        if self.interrupt & (1 << (16 + n)) != 0 {
            self.interrupt |= 1 << (24 + n);
        }

        debug!("[DMA] {:?} done, DICR 0x{:08x}", port, self.interrupt);

        self.update_master_flag(intc);
    }

    /// Recomputes DICR bit 31. The IRQ fires only on its rising edge.
    fn update_master_flag(&mut self, intc: &mut Intc) {
        let was_set = self.interrupt & DICR_MASTER_FLAG != 0;

        let flags = (self.interrupt >> 24) & 0x7f;
        let enables = (self.interrupt >> 16) & 0x7f;

        let set = self.interrupt & DICR_FORCE != 0
            || (self.interrupt & DICR_MASTER_ENABLE != 0 && flags & enables != 0);

        if set {
            self.interrupt |= DICR_MASTER_FLAG;

            if !was_set {
                intc.assert_irq(Interrupt::Dma);
            }
        } else {
            self.interrupt &= !DICR_MASTER_FLAG;
        }
    }

    /// Flag bits are cleared by writing 1; the master flag is read-only.
    fn write_interrupt(&mut self, intc: &mut Intc, value: u32) {
        let flags = self.interrupt & 0x7f00_0000 & !value;

        self.interrupt = flags | (value & DICR_WRITABLE);
        self.update_master_flag(intc);
    }

    pub fn read(&self, address: u32) -> u32 {
        let index = ((address >> 4) & 0x7) as usize;
        let register = address & 0xf;

        if index == 7 {
            return match register {
                DPCR => self.control,
                DICR => self.interrupt,
                _ => panic!("[DMA] [ERROR] Read from unknown register 0x{:08x}", address),
            };
        }

        let channel = &self.channels[index];

        match register {
            0x0 => channel.madr,
            0x4 => channel.bcr,
            0x8 => channel.chcr,
            _ => panic!("[DMA] [ERROR] Read from unknown register 0x{:08x}", address),
        }
    }

    /// Returns the port whose transfer this write started, if any.
    pub fn write(&mut self, intc: &mut Intc, address: u32, value: u32) -> Option<DmaPort> {
        let index = ((address >> 4) & 0x7) as usize;
        let register = address & 0xf;

        if index == 7 {
            match register {
                DPCR => self.control = value,
                DICR => self.write_interrupt(intc, value),
                DICR_HIGH => {
                    let value = (value << 16) | (self.interrupt & 0xffff);
                    self.write_interrupt(intc, value);
                }
                _ => panic!("[DMA] [ERROR] Write to unknown register 0x{:08x}", address),
            }

            return None;
        }

        let port = DmaPort::from_index(index);
        let was_busy = self.channels[index].busy();
        let channel = &mut self.channels[index];

        match register {
            0x0 => channel.madr = value & 0xff_fffc,
            0x4 => channel.bcr = value,
            // OTC only ever counts down and only honours start and trigger
            0x8 if port == DmaPort::OTC => channel.chcr = (value & 0x1100_0000) | 0x2,
            0x8 => channel.chcr = value & CHCR_WRITABLE,
            _ => panic!("[DMA] [ERROR] Write to unknown register 0x{:08x}", address),
        }

        let channel = self.channels[index];

        if !was_busy && channel.active() && self.dma_enabled(port) {
            Some(port)
        } else {
            None
        }
    }
}
