use log::info;
use serde::{Deserialize, Serialize};

use crate::util::Range;

pub const EXP2_RANGE: Range = Range(0x1f80_2000, 0x1f80_2080);

const DUART_SRA: u32 = 0x1f80_2021;
const DUART_THRA: u32 = 0x1f80_2023;

const DUART_SR_TXRDY: u8 = 0x4;

/// TTY lines kept for the host; older ones are dropped.
pub const MAX_LINES: usize = 256;

/// Expansion region 2. Only the DUART transmitter is modelled; it carries
/// the BIOS TTY.
#[derive(Clone, Default, Deserialize, Serialize)]
pub struct Exp2 {
    tx_buf: Vec<u8>,
    lines: Vec<String>,
}

impl Exp2 {
    pub fn new() -> Exp2 {
        Exp2::default()
    }

    /// Complete lines written to the TTY and not yet taken.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn take_lines(&mut self) -> Vec<String> {
        std::mem::replace(&mut self.lines, Vec::new())
    }

    fn tx_byte(&mut self, byte: u8) {
        if byte == 0xd {
            return;
        }

        if byte == 0xa {
            if !self.tx_buf.is_empty() {
                let line = String::from_utf8_lossy(&self.tx_buf).into_owned();
                info!("[TTY] {}", line);

                if self.lines.len() == MAX_LINES {
                    self.lines.remove(0);
                }

                self.lines.push(line);
                self.tx_buf.clear();
            }

            return;
        }

        self.tx_buf.push(byte);
    }

    pub fn read8(&mut self, address: u32) -> u8 {
        if address == DUART_SRA {
            return DUART_SR_TXRDY;
        }

        0
    }

    pub fn write8(&mut self, address: u32, value: u8) {
        if address == DUART_THRA {
            self.tx_byte(value);
        }
    }
}
