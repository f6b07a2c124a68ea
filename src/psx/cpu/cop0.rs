use serde::{Deserialize, Serialize};

pub const STATUS_IEC: u32 = 1 << 0;
pub const STATUS_KUC: u32 = 1 << 1;
pub const STATUS_ISC: u32 = 1 << 16;
pub const STATUS_BEV: u32 = 1 << 22;
pub const STATUS_TS: u32 = 1 << 21;
pub const STATUS_CU0: u32 = 1 << 28;
pub const STATUS_CU2: u32 = 1 << 30;

const CAUSE_BD: u32 = 1 << 31;
const CAUSE_HW_IRQ: u32 = 1 << 10;
const CAUSE_SW_IRQ: u32 = 0x300;
const CAUSE_IP: u32 = 0xff00;

const PRID: u32 = 0x0000_0002;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exception {
    Interrupt,
    AddrLoad(u32),
    AddrStore(u32),
    Syscall,
    Breakpoint,
    Reserved,
    CopUnusable(u32),
    Overflow,
}

impl Exception {
    pub fn code(self) -> u32 {
        use self::Exception::*;

        match self {
            Interrupt => 0,
            AddrLoad(_) => 4,
            AddrStore(_) => 5,
            Syscall => 8,
            Breakpoint => 9,
            Reserved => 10,
            CopUnusable(_) => 11,
            Overflow => 12,
        }
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct Cop0 {
    bpc: u32,
    bda: u32,
    jumpdest: u32,
    dcic: u32,
    bad_vaddr: u32,
    bdam: u32,
    bpcm: u32,
    status: u32,
    cause: u32,
    epc: u32,
}

impl Cop0 {
    pub fn new() -> Cop0 {
        Cop0 {
            bpc: 0,
            bda: 0,
            jumpdest: 0,
            dcic: 0,
            bad_vaddr: 0,
            bdam: 0,
            bpcm: 0,
            status: 0,
            cause: 0,
            epc: 0,
        }
    }

    pub fn reset(&mut self, epc: u32) {
        self.status = STATUS_BEV | STATUS_TS;
        self.cause = 0;
        self.epc = epc;
    }

    pub fn read(&self, index: usize) -> u32 {
        match index {
            3 => self.bpc,
            5 => self.bda,
            6 => self.jumpdest,
            7 => self.dcic,
            8 => self.bad_vaddr,
            9 => self.bdam,
            11 => self.bpcm,
            12 => self.status,
            13 => self.cause,
            14 => self.epc,
            15 => PRID,
            _ => panic!("[COP0] [ERROR] Read from unimplemented Cop0 register {}", index),
        }
    }

    pub fn write(&mut self, index: usize, value: u32) {
        match index {
            3 => self.bpc = value,
            5 => self.bda = value,
            6 => self.jumpdest = value,
            7 => self.dcic = value,
            9 => self.bdam = value,
            11 => self.bpcm = value,
            12 => self.status = value,
            13 => self.cause = (self.cause & !CAUSE_SW_IRQ) | (value & CAUSE_SW_IRQ),
            8 | 14 | 15 if value == 0 => (),
            _ => panic!(
                "[COP0] [ERROR] Write 0x{:08x} to read-only or unimplemented Cop0 register {}",
                value, index
            ),
        }
    }

    pub fn enter_exception(&mut self, epc: u32, exception: Exception, bd: bool) {
        self.epc = epc;

        let mode = self.status & 0x3f;
        self.status = (self.status & !0x3f) | ((mode << 2) & 0x3f);

        let coprocessor = match exception {
            Exception::CopUnusable(n) => n & 0x3,
            _ => 0,
        };

        self.cause = (self.cause & CAUSE_IP)
            | ((bd as u32) << 31)
            | (coprocessor << 28)
            | (exception.code() << 2);

        match exception {
            Exception::AddrLoad(address) | Exception::AddrStore(address) => self.bad_vaddr = address,
            _ => (),
        }
    }

    pub fn leave_exception(&mut self) {
        let mode = self.status & 0x3f;
        self.status = (self.status & !0xf) | (mode >> 2);
    }

    pub fn exception_vectors(&self) -> bool {
        (self.status & STATUS_BEV) != 0
    }

    pub fn set_hardware_interrupt(&mut self, pending: bool) {
        if pending {
            self.cause |= CAUSE_HW_IRQ;
        } else {
            self.cause &= !CAUSE_HW_IRQ;
        }
    }

    pub fn interrupt_pending(&self) -> bool {
        let im = self.status & CAUSE_IP;
        let ip = self.cause & CAUSE_IP;

        (self.status & STATUS_IEC) != 0 && (im & ip) != 0
    }

    pub fn isolate_cache(&self) -> bool {
        (self.status & STATUS_ISC) != 0
    }

    pub fn cop0_usable(&self) -> bool {
        (self.status & STATUS_KUC) == 0 || (self.status & STATUS_CU0) != 0
    }

    pub fn cop2_usable(&self) -> bool {
        (self.status & STATUS_CU2) != 0
    }

    pub fn status(&self) -> u32 {
        self.status
    }

    pub fn cause(&self) -> u32 {
        self.cause
    }

    pub fn epc(&self) -> u32 {
        self.epc
    }

    pub fn bad_vaddr(&self) -> u32 {
        self.bad_vaddr
    }

    pub fn branch_delay(&self) -> bool {
        (self.cause & CAUSE_BD) != 0
    }
}
