use log::trace;
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

/// Coprocessor 2 register file as seen by the CPU.
///
/// Command execution belongs to the external geometry engine; here commands
/// only reach the trace log.
#[derive(Clone, Deserialize, Serialize)]
pub struct Gte {
    #[serde(with = "BigArray")]
    registers: [u32; 64],
    commands: u64,
}

impl Gte {
    pub fn new() -> Gte {
        Gte {
            registers: [0; 64],
            commands: 0,
        }
    }

    pub fn read_data(&self, index: usize) -> u32 {
        self.registers[index & 0x1f]
    }

    pub fn write_data(&mut self, index: usize, value: u32) {
        self.registers[index & 0x1f] = value;
    }

    pub fn read_control(&self, index: usize) -> u32 {
        self.registers[32 + (index & 0x1f)]
    }

    pub fn write_control(&mut self, index: usize, value: u32) {
        self.registers[32 + (index & 0x1f)] = value;
    }

    pub fn command(&mut self, command: u32) {
        self.commands += 1;
        trace!("[GTE] command 0x{:07x} (no geometry engine attached)", command & 0x1ff_ffff);
    }

    pub fn commands_issued(&self) -> u64 {
        self.commands
    }
}
