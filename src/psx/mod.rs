pub mod bus;
pub mod cpu;
pub mod dma;
pub mod exp2;
pub mod intc;
pub mod jit;
pub mod memctl;
pub mod peripheral;
pub mod scheduler;
pub mod snapshot;

use std::fs::File;
use std::path::Path;

use log::{debug, info};

use crate::error::{Error, Result};
use crate::util;

use self::bus::{to_physical, Bus, BIOS_SIZE, RAM_SIZE};
use self::cpu::cop0::Exception;
use self::cpu::instruction::Instruction;
use self::cpu::R3000A;
use self::intc::Interrupt;
use self::jit::{JitConfig, JitStats, Recompiler};
use self::peripheral::Peripheral;
use self::scheduler::{EventKind, Scheduler};
use self::snapshot::Snapshot;

pub const CPU_CLOCK: u64 = 33_868_800;
pub const CYCLES_PER_FRAME: u64 = CPU_CLOCK / 60;

const PSEXE_MAGIC: &[u8] = b"PS-X EXE";

fn vblank(bus: &mut Bus, scheduler: &mut Scheduler) {
    bus.intc_mut().assert_irq(Interrupt::Vblank);
    scheduler.schedule(CYCLES_PER_FRAME, vblank, EventKind::VBlank);
}

/// One emulated machine. Sessions share nothing.
pub struct System {
    cpu: R3000A,
    bus: Bus,
    recompiler: Recompiler,
    scheduler: Scheduler,

    frames: u64,
}

impl System {
    pub fn new(bios: Box<[u8]>, config: JitConfig) -> Result<System> {
        if bios.len() != BIOS_SIZE {
            return Err(Error::BiosSize {
                expected: BIOS_SIZE,
                found: bios.len(),
            });
        }

        let mut system = System {
            cpu: R3000A::new(),
            bus: Bus::new(bios),
            recompiler: Recompiler::new(config)?,
            scheduler: Scheduler::new(),

            frames: 0,
        };

        system.reset();
        Ok(system)
    }

    pub fn from_bios_file<P: AsRef<Path>>(path: P, config: JitConfig) -> Result<System> {
        let bios = util::read_file_to_box(path)?;
        System::new(bios, config)
    }

    pub fn reset(&mut self) {
        self.cpu.reset();
        self.bus.reset();
        self.recompiler.flush();

        self.scheduler = Scheduler::new();
        self.scheduler.register(EventKind::DmaComplete, Bus::dma_complete);
        self.scheduler.schedule(CYCLES_PER_FRAME, vblank, EventKind::VBlank);

        self.frames = 0;
    }

    /// Dispatches one block and everything it made due. Returns the cycles
    /// the block cost.
    pub fn step_block(&mut self) -> u32 {
        let pending = self.bus.intc().pending();
        self.cpu.cop0.set_hardware_interrupt(pending);

        // TODO: a GTE command should only hold the IRQ off for one instruction.
        if self.cpu.interrupt_pending() && !self.gte_command_at_pc() {
            self.cpu.enter_exception(Exception::Interrupt);
        }

        if (self.cpu.pc() & 0x3) != 0 {
            self.cpu.fetch_error();
        }

        let cycles = self.recompiler.run_block(&mut self.cpu, &mut self.bus, &mut self.scheduler);

        self.scheduler.add_cycles(cycles as u64);
        self.scheduler.run_due(&mut self.bus);

        self.sync_dirty();

        cycles
    }

    fn gte_command_at_pc(&self) -> bool {
        self.bus.peek32(self.cpu.pc())
            .map_or(false, |word| Instruction(word).is_gte_command())
    }

    fn sync_dirty(&mut self) {
        for range in self.bus.take_dirty() {
            self.recompiler.invalidate_range(range);
        }
    }

    pub fn run_until(&mut self, cycle: u64) {
        while self.scheduler.now() < cycle {
            self.step_block();
        }
    }

    pub fn run_for(&mut self, cycles: u64) {
        let target = self.scheduler.now() + cycles;
        self.run_until(target);
    }

    pub fn run_frame(&mut self) {
        self.run_for(CYCLES_PER_FRAME);
        self.frames += 1;
    }

    pub fn load_psexe<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let mut file = File::open(path.as_ref())?;

        if util::read_to_buffer(&mut file, 8)? != PSEXE_MAGIC {
            return Err(Error::InvalidExe("missing PS-X EXE magic"));
        }

        util::discard(&mut file, 0x8)?;

        let pc = util::read_u32(&mut file)?;
        let gp = util::read_u32(&mut file)?;

        let destination = util::read_u32(&mut file)? as usize;
        let size = util::read_u32(&mut file)? as usize;

        util::discard(&mut file, 0x10)?;

        let sp = util::read_u32(&mut file)?.wrapping_add(util::read_u32(&mut file)?);

        util::discard(&mut file, 0x7c8)?;

        if size > RAM_SIZE {
            return Err(Error::InvalidExe("payload larger than RAM"));
        }

        let payload = util::read_to_buffer(&mut file, size)?;
        let ram = self.bus.ram_mut();

        for (i, byte) in payload.iter().enumerate() {
            ram[(destination + i) & (RAM_SIZE - 1)] = *byte;
        }

        self.cpu.set_pc(pc);
        self.cpu.set_reg(28, gp);
        self.cpu.set_reg(29, sp);
        self.cpu.set_reg(30, sp);

        self.recompiler.invalidate_ram();

        info!("[PSEXE] {} bytes at 0x{:08x}, entry 0x{:08x}", size, destination, pc);
        Ok(())
    }

    pub fn write8(&mut self, address: u32, value: u8) {
        self.bus.write8(address, value, &mut self.scheduler);
        self.recompiler.invalidate(to_physical(address));
        self.sync_dirty();
    }

    pub fn write16(&mut self, address: u32, value: u16) {
        self.bus.write16(address, value, &mut self.scheduler);
        self.recompiler.invalidate(to_physical(address));
        self.sync_dirty();
    }

    pub fn write32(&mut self, address: u32, value: u32) {
        self.bus.write32(address, value, &mut self.scheduler);
        self.recompiler.invalidate(to_physical(address));
        self.sync_dirty();
    }

    pub fn read32(&mut self, address: u32) -> u32 {
        self.bus.read32(address, &mut self.scheduler)
    }

    pub fn attach(&mut self, peripheral: Box<dyn Peripheral>) {
        self.bus.attach(peripheral);
    }

    pub fn cpu(&self) -> &R3000A {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut R3000A {
        &mut self.cpu
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut Bus {
        &mut self.bus
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn recompiler(&self) -> &Recompiler {
        &self.recompiler
    }

    pub fn stats(&self) -> JitStats {
        self.recompiler.stats()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn save_state<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        Snapshot::capture(&self.cpu, &self.bus, &self.scheduler).save(path)
    }

    /// Compiled code is dropped; the restored RAM may differ from what it
    /// was translated from.
    pub fn load_state<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let snapshot = Snapshot::load(path)?;
        snapshot.restore(&mut self.cpu, &mut self.bus, &mut self.scheduler)?;

        self.recompiler.flush();

        debug!("[SYSTEM] State restored at cycle {}", self.scheduler.now());
        Ok(())
    }
}
