use byteorder::{ByteOrder, LittleEndian};
use log::{trace, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::Range;

use super::dma::{Direction, Dma, DmaPort, Step, SyncMode, DMA_RANGE};
use super::exp2::{Exp2, EXP2_RANGE};
use super::intc::{Intc, INTC_RANGE};
use super::memctl::{CacheControl, MemControl, CACHE_CONTROL_RANGE, MEMCTL_RANGE, RAM_SIZE_RANGE};
use super::peripheral::{DeviceContext, OpenBus, Peripheral};
use super::scheduler::{EventKind, Scheduler};

pub const BIOS_SIZE: usize = 0x8_0000;
pub const RAM_SIZE: usize = 0x20_0000;
pub const SCRATCHPAD_SIZE: usize = 0x400;

pub const RAM_RANGE: Range = Range(0x0000_0000, 0x0080_0000);
pub const BIOS_RANGE: Range = Range(0x1fc0_0000, 0x1fc8_0000);
pub const SCRATCHPAD_RANGE: Range = Range(0x1f80_0000, 0x1f80_0400);

const EXPANSION_1_RANGE: Range = Range(0x1f00_0000, 0x1f80_0000);
const EXPANSION_3_RANGE: Range = Range(0x1fa0_0000, 0x1fc0_0000);

const PAGE_SHIFT: u32 = 16;
const PAGE_SIZE: usize = 1 << PAGE_SHIFT;
const PAGE_COUNT: usize = 1 << (32 - PAGE_SHIFT);

/// Physical address mask per 512 MiB segment: KUSEG x4, KSEG0, KSEG1, KSEG2 x2.
const REGION_MASK: [u32; 8] = [
    0xffff_ffff, 0xffff_ffff, 0xffff_ffff, 0xffff_ffff,
    0x7fff_ffff,
    0x1fff_ffff,
    0xffff_ffff, 0xffff_ffff,
];

pub fn to_physical(address: u32) -> u32 {
    address & REGION_MASK[(address >> 29) as usize]
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BusWidth {
    Byte,
    Half,
    Word,
}

impl BusWidth {
    pub fn alignment_mask(self) -> u32 {
        match self {
            BusWidth::Byte => 0,
            BusWidth::Half => 1,
            BusWidth::Word => 3,
        }
    }

    fn mask(self) -> u32 {
        match self {
            BusWidth::Byte => 0xff,
            BusWidth::Half => 0xffff,
            BusWidth::Word => 0xffff_ffff,
        }
    }
}

/// Page table entry: which host buffer backs the page, and where.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Page {
    Ram(usize),
    Bios(usize),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Device {
    MemControl,
    Intc,
    Dma,
    Exp2,
    CacheControl,
    /// No owner: reads float high, writes vanish.
    Locked,
    External(usize),
}

fn read_memory(memory: &[u8], offset: usize, width: BusWidth) -> u32 {
    match width {
        BusWidth::Byte => memory[offset] as u32,
        BusWidth::Half => LittleEndian::read_u16(&memory[offset..]) as u32,
        BusWidth::Word => LittleEndian::read_u32(&memory[offset..]),
    }
}

fn write_memory(memory: &mut [u8], offset: usize, width: BusWidth, value: u32) {
    match width {
        BusWidth::Byte => memory[offset] = value as u8,
        BusWidth::Half => LittleEndian::write_u16(&mut memory[offset..], value as u16),
        BusWidth::Word => LittleEndian::write_u32(&mut memory[offset..], value),
    }
}

/// Serializable part of the bus: memory and the built-in devices.
#[derive(Clone, Deserialize, Serialize)]
pub struct BusState {
    pub(super) ram: Box<[u8]>,
    pub(super) scratchpad: Box<[u8]>,

    memctl: MemControl,
    cachectl: CacheControl,
    intc: Intc,
    dma: Dma,
    exp2: Exp2,
}

impl BusState {
    pub fn validate(&self) -> Result<()> {
        if self.ram.len() != RAM_SIZE {
            return Err(Error::InvalidState("RAM has the wrong size"));
        }

        if self.scratchpad.len() != SCRATCHPAD_SIZE {
            return Err(Error::InvalidState("scratchpad has the wrong size"));
        }

        Ok(())
    }
}

pub struct Bus {
    bios: Box<[u8]>,
    ram: Box<[u8]>,
    scratchpad: Box<[u8]>,

    read_pages: Vec<Option<Page>>,
    write_pages: Vec<Option<Page>>,

    /// Sorted by start address, non-overlapping.
    devices: Vec<(Range, Device)>,

    memctl: MemControl,
    cachectl: CacheControl,
    intc: Intc,
    dma: Dma,
    exp2: Exp2,

    peripherals: Vec<Box<dyn Peripheral>>,

    /// Physical RAM ranges written by DMA since the last drain.
    dirty: Vec<Range>,
}

impl Bus {
    pub fn new(bios: Box<[u8]>) -> Bus {
        if bios.len() != BIOS_SIZE {
            panic!("[BUS] [ERROR] BIOS must be {} bytes, got {}", BIOS_SIZE, bios.len());
        }

        let mut read_pages = vec![None; PAGE_COUNT];
        let mut write_pages = vec![None; PAGE_COUNT];

        for page in (RAM_RANGE.0 >> PAGE_SHIFT)..(RAM_RANGE.1 >> PAGE_SHIFT) {
            let base = ((page as usize) << PAGE_SHIFT) & (RAM_SIZE - 1);

            read_pages[page as usize] = Some(Page::Ram(base));
            write_pages[page as usize] = Some(Page::Ram(base));
        }

        for page in (BIOS_RANGE.0 >> PAGE_SHIFT)..(BIOS_RANGE.1 >> PAGE_SHIFT) {
            let base = ((page - (BIOS_RANGE.0 >> PAGE_SHIFT)) as usize) << PAGE_SHIFT;

            read_pages[page as usize] = Some(Page::Bios(base));
        }

        let mut bus = Bus {
            bios: bios,
            ram: vec![0; RAM_SIZE].into_boxed_slice(),
            scratchpad: vec![0; SCRATCHPAD_SIZE].into_boxed_slice(),

            read_pages: read_pages,
            write_pages: write_pages,

            devices: Vec::new(),

            memctl: MemControl::new(),
            cachectl: CacheControl::new(),
            intc: Intc::new(),
            dma: Dma::new(),
            exp2: Exp2::new(),

            peripherals: Vec::new(),

            dirty: Vec::new(),
        };

        bus.map(MEMCTL_RANGE, Device::MemControl);
        bus.map(RAM_SIZE_RANGE, Device::MemControl);
        bus.map(INTC_RANGE, Device::Intc);
        bus.map(DMA_RANGE, Device::Dma);
        bus.map(EXP2_RANGE, Device::Exp2);
        bus.map(CACHE_CONTROL_RANGE, Device::CacheControl);

        bus.map(EXPANSION_1_RANGE, Device::Locked);
        bus.map(EXPANSION_3_RANGE, Device::Locked);
        bus.map(BIOS_RANGE, Device::Locked);

        bus
    }

    fn map(&mut self, range: Range, device: Device) {
        if let Some(&(existing, _)) = self.devices.iter().find(|(r, _)| r.overlaps(&range)) {
            panic!("[BUS] [ERROR] Range 0x{:08x}-0x{:08x} overlaps 0x{:08x}-0x{:08x}",
                   range.0, range.1, existing.0, existing.1);
        }

        let index = self.devices.partition_point(|(r, _)| r.0 < range.0);
        self.devices.insert(index, (range, device));
    }

    fn device(&self, physical: u32) -> Option<Device> {
        let index = self.devices.partition_point(|(r, _)| r.1 <= physical);

        match self.devices.get(index) {
            Some(&(range, device)) if range.contains(physical) => Some(device),
            _ => None,
        }
    }

    pub fn attach(&mut self, peripheral: Box<dyn Peripheral>) {
        let range = peripheral.range();
        let index = self.peripherals.len();

        trace!("[BUS] {} at 0x{:08x}-0x{:08x}", peripheral.name(), range.0, range.1);

        self.map(range, Device::External(index));
        self.peripherals.push(peripheral);
    }

    /// Attaches an open-bus placeholder for every standard device whose
    /// range is still free.
    pub fn attach_open_bus(&mut self) {
        for placeholder in OpenBus::standard() {
            let range = placeholder.range();

            if !self.devices.iter().any(|(r, _)| r.overlaps(&range)) {
                self.attach(Box::new(placeholder));
            }
        }
    }

    pub fn peripheral_mut<T: Peripheral>(&mut self) -> Option<&mut T> {
        for peripheral in self.peripherals.iter_mut() {
            if let Some(device) = peripheral.as_any_mut().downcast_mut::<T>() {
                return Some(device);
            }
        }

        None
    }

    pub fn reset(&mut self) {
        self.memctl = MemControl::new();
        self.cachectl = CacheControl::new();
        self.intc = Intc::new();
        self.dma = Dma::new();
        self.dirty.clear();
    }

    pub fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.ram
    }

    pub fn scratchpad(&self) -> &[u8] {
        &self.scratchpad
    }

    pub fn intc(&self) -> &Intc {
        &self.intc
    }

    pub fn intc_mut(&mut self) -> &mut Intc {
        &mut self.intc
    }

    pub fn exp2(&self) -> &Exp2 {
        &self.exp2
    }

    pub fn exp2_mut(&mut self) -> &mut Exp2 {
        &mut self.exp2
    }

    /// Side-effect free word read from RAM or BIOS; `None` elsewhere.
    pub fn peek32(&self, address: u32) -> Option<u32> {
        let physical = to_physical(address) & !0x3;
        let offset = physical as usize & (PAGE_SIZE - 1);

        self.read_pages[(physical >> PAGE_SHIFT) as usize].map(|page| match page {
            Page::Ram(base) => LittleEndian::read_u32(&self.ram[base + offset..]),
            Page::Bios(base) => LittleEndian::read_u32(&self.bios[base + offset..]),
        })
    }

    /// Direct word write into RAM, bypassing devices.
    pub fn poke32(&mut self, address: u32, value: u32) {
        let physical = to_physical(address) & !0x3;
        let offset = physical as usize & (PAGE_SIZE - 1);

        match self.write_pages[(physical >> PAGE_SHIFT) as usize] {
            Some(Page::Ram(base)) => LittleEndian::write_u32(&mut self.ram[base + offset..], value),
            _ => panic!("[BUS] [ERROR] Poke outside RAM at 0x{:08x}", address),
        }
    }

    pub fn read8(&mut self, address: u32, scheduler: &mut Scheduler) -> u8 {
        self.read(BusWidth::Byte, address, scheduler) as u8
    }

    pub fn read16(&mut self, address: u32, scheduler: &mut Scheduler) -> u16 {
        self.read(BusWidth::Half, address, scheduler) as u16
    }

    pub fn read32(&mut self, address: u32, scheduler: &mut Scheduler) -> u32 {
        self.read(BusWidth::Word, address, scheduler)
    }

    pub fn write8(&mut self, address: u32, value: u8, scheduler: &mut Scheduler) {
        self.write(BusWidth::Byte, address, value as u32, scheduler);
    }

    pub fn write16(&mut self, address: u32, value: u16, scheduler: &mut Scheduler) {
        self.write(BusWidth::Half, address, value as u32, scheduler);
    }

    pub fn write32(&mut self, address: u32, value: u32, scheduler: &mut Scheduler) {
        self.write(BusWidth::Word, address, value, scheduler);
    }

    pub fn read(&mut self, width: BusWidth, address: u32, scheduler: &mut Scheduler) -> u32 {
        let physical = to_physical(address);

        if let Some(page) = self.read_pages[(physical >> PAGE_SHIFT) as usize] {
            let offset = physical as usize & (PAGE_SIZE - 1);

            return match page {
                Page::Ram(base) => read_memory(&self.ram, base + offset, width),
                Page::Bios(base) => read_memory(&self.bios, base + offset, width),
            };
        }

        if SCRATCHPAD_RANGE.contains(physical) {
            return read_memory(&self.scratchpad, SCRATCHPAD_RANGE.offset(physical), width);
        }

        let shift = (physical & 0x3) * 8;

        let value = match self.device(physical) {
            Some(Device::MemControl) => self.memctl.read(physical & !0x3) >> shift,
            Some(Device::Intc) => self.intc.read(physical),
            Some(Device::Dma) => self.dma.read(physical & !0x3) >> shift,
            Some(Device::Exp2) => self.exp2.read8(physical) as u32,
            Some(Device::CacheControl) => self.cachectl.read(),
            Some(Device::Locked) => 0xffff_ffff,
            Some(Device::External(index)) => {
                let peripheral = &mut self.peripherals[index];
                let mut cx = DeviceContext {
                    scheduler: scheduler,
                    intc: &mut self.intc,
                };

                match width {
                    BusWidth::Byte => peripheral.read8(physical, &mut cx) as u32,
                    BusWidth::Half => peripheral.read16(physical, &mut cx) as u32,
                    BusWidth::Word => peripheral.read32(physical, &mut cx),
                }
            }
            None => panic!("[BUS] [ERROR] Read from unmapped address 0x{:08x}", address),
        };

        value & width.mask()
    }

    pub fn write(&mut self, width: BusWidth, address: u32, value: u32, scheduler: &mut Scheduler) {
        let physical = to_physical(address);

        if let Some(Page::Ram(base)) = self.write_pages[(physical >> PAGE_SHIFT) as usize] {
            let offset = physical as usize & (PAGE_SIZE - 1);

            write_memory(&mut self.ram, base + offset, width, value);
            return;
        }

        if SCRATCHPAD_RANGE.contains(physical) {
            write_memory(&mut self.scratchpad, SCRATCHPAD_RANGE.offset(physical), width, value);
            return;
        }

        match self.device(physical) {
            Some(Device::MemControl) => self.memctl.write(physical & !0x3, value),
            Some(Device::Intc) => self.intc.write(physical, value),
            Some(Device::Dma) => {
                if let Some(port) = self.dma.write(&mut self.intc, physical, value) {
                    self.start_dma(port, scheduler);
                }
            }
            Some(Device::Exp2) => self.exp2.write8(physical, value as u8),
            Some(Device::CacheControl) => self.cachectl.write(value),
            Some(Device::Locked) => trace!("[BUS] Write 0x{:08x} to locked address 0x{:08x} ignored", value, address),
            Some(Device::External(index)) => {
                let peripheral = &mut self.peripherals[index];
                let mut cx = DeviceContext {
                    scheduler: scheduler,
                    intc: &mut self.intc,
                };

                match width {
                    BusWidth::Byte => peripheral.write8(physical, value as u8, &mut cx),
                    BusWidth::Half => peripheral.write16(physical, value as u16, &mut cx),
                    BusWidth::Word => peripheral.write32(physical, value, &mut cx),
                }
            }
            None => panic!("[BUS] [ERROR] Write 0x{:08x} to unmapped address 0x{:08x}", value, address),
        }
    }

    /// RAM ranges DMA wrote since the last call.
    pub fn take_dirty(&mut self) -> Vec<Range> {
        std::mem::replace(&mut self.dirty, Vec::new())
    }

    fn mark_dirty(&mut self, first: u32, last: u32) {
        let (low, high) = if first <= last { (first, last) } else { (last, first) };
        self.dirty.push(Range(low, high + 4));
    }

    fn dma_device(&self, port: DmaPort) -> Option<usize> {
        self.peripherals.iter().position(|p| p.dma_port() == Some(port))
    }

    /// Performs the whole transfer now; the channel stays busy until the
    /// completion event, which is one cycle per word away.
    fn start_dma(&mut self, port: DmaPort, scheduler: &mut Scheduler) {
        let words = match self.dma.channel(port).sync() {
            SyncMode::LinkedList => self.dma_linked_list(port, scheduler),
            _ => self.dma_block(port, scheduler),
        };

        let delay = words.max(1) as u64;

        trace!("[DMA] {:?}: {} words", port, words);

        self.dma.begin(port, scheduler.now() + delay);
        scheduler.schedule(delay, Bus::dma_complete, EventKind::DmaComplete);
    }

    fn dma_block(&mut self, port: DmaPort, scheduler: &mut Scheduler) -> u32 {
        let channel = self.dma.channel(port);
        let words = channel.words();

        let step = match channel.step() {
            Step::Forward => 4u32,
            Step::Backward => 4u32.wrapping_neg(),
        };

        let device = self.dma_device(port);

        if device.is_none() && port != DmaPort::OTC {
            warn!("[DMA] No device on {:?}, {} words {:?} dropped", port, words, channel.direction());
        }

        let first = channel.base_address();
        let mut address = first;
        let mut last = first;

        for n in 0..words {
            last = address;

            match (port, channel.direction()) {
                (DmaPort::OTC, _) => {
                    let value = if n == words - 1 {
                        0x00ff_ffff
                    } else {
                        address.wrapping_sub(4) & 0x1f_fffc
                    };

                    LittleEndian::write_u32(&mut self.ram[address as usize..], value);
                }
                (_, Direction::ToRam) => {
                    let value = match device {
                        Some(index) => {
                            let mut cx = DeviceContext {
                                scheduler: &mut *scheduler,
                                intc: &mut self.intc,
                            };

                            self.peripherals[index].dma_read(&mut cx)
                        }
                        None => 0,
                    };

                    LittleEndian::write_u32(&mut self.ram[address as usize..], value);
                }
                (_, Direction::FromRam) => {
                    let value = LittleEndian::read_u32(&self.ram[address as usize..]);

                    if let Some(index) = device {
                        let mut cx = DeviceContext {
                            scheduler: &mut *scheduler,
                            intc: &mut self.intc,
                        };

                        self.peripherals[index].dma_write(value, &mut cx);
                    }
                }
            }

            address = address.wrapping_add(step) & 0x1f_fffc;
        }

        if port == DmaPort::OTC || channel.direction() == Direction::ToRam {
            self.mark_dirty(first, last);
        }

        words
    }

    fn dma_linked_list(&mut self, port: DmaPort, scheduler: &mut Scheduler) -> u32 {
        let device = self.dma_device(port);
        let mut address = self.dma.channel(port).base_address();
        let mut words = 0;

        loop {
            let header = LittleEndian::read_u32(&self.ram[address as usize..]);
            let payload = header >> 24;

            for _ in 0..payload {
                address = (address + 4) & 0x1f_fffc;

                let command = LittleEndian::read_u32(&self.ram[address as usize..]);

                if let Some(index) = device {
                    let mut cx = DeviceContext {
                        scheduler: &mut *scheduler,
                        intc: &mut self.intc,
                    };

                    self.peripherals[index].dma_write(command, &mut cx);
                }
            }

            words += payload + 1;

            if (header & 0x80_0000) != 0 {
                break;
            }

            if words as usize > RAM_SIZE {
                warn!("[DMA] {:?} linked list does not terminate, abandoned", port);
                break;
            }

            address = header & 0x1f_fffc;
        }

        words
    }

    pub fn dma_complete(bus: &mut Bus, scheduler: &mut Scheduler) {
        while let Some(port) = bus.dma.take_finished(scheduler.now()) {
            bus.dma.finish(&mut bus.intc, port);
        }
    }

    pub fn save_state(&self) -> BusState {
        BusState {
            ram: self.ram.clone(),
            scratchpad: self.scratchpad.clone(),

            memctl: self.memctl.clone(),
            cachectl: self.cachectl.clone(),
            intc: self.intc.clone(),
            dma: self.dma.clone(),
            exp2: self.exp2.clone(),
        }
    }

    pub fn load_state(&mut self, state: BusState) -> Result<()> {
        state.validate()?;

        self.ram = state.ram;
        self.scratchpad = state.scratchpad;

        self.memctl = state.memctl;
        self.cachectl = state.cachectl;
        self.intc = state.intc;
        self.dma = state.dma;
        self.exp2 = state.exp2;

        self.dirty.clear();

        Ok(())
    }
}
