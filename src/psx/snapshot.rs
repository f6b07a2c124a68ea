//! Save states: MessagePack, xz-compressed.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

use crate::error::Result;

use super::bus::{Bus, BusState};
use super::cpu::R3000A;
use super::scheduler::{EventKind, Scheduler};

const COMPRESSION_LEVEL: u32 = 6;

#[derive(Deserialize, Serialize)]
pub struct Snapshot {
    cpu: R3000A,
    bus: BusState,

    now: u64,
    events: Vec<(u64, EventKind)>,
}

impl Snapshot {
    pub fn capture(cpu: &R3000A, bus: &Bus, scheduler: &Scheduler) -> Snapshot {
        Snapshot {
            cpu: cpu.clone(),
            bus: bus.save_state(),

            now: scheduler.now(),
            events: scheduler.queued(),
        }
    }

    /// Fails without touching the machine when the memory images are the
    /// wrong size or a queued event has no registered callback.
    pub fn restore(self, cpu: &mut R3000A, bus: &mut Bus, scheduler: &mut Scheduler) -> Result<()> {
        self.bus.validate()?;
        scheduler.restore(self.now, &self.events)?;

        *cpu = self.cpu;
        bus.load_state(self.bus)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let bytes = rmp_serde::to_vec(self)?;

        let mut compressor = XzEncoder::new(Vec::new(), COMPRESSION_LEVEL);
        compressor.write_all(&bytes)?;

        Ok(compressor.finish()?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Snapshot> {
        let mut decompressed = Vec::new();

        let mut decompressor = XzDecoder::new(bytes);
        decompressor.read_to_end(&mut decompressed)?;

        Ok(rmp_serde::from_slice(&decompressed)?)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let bytes = self.to_bytes()?;
        File::create(path)?.write_all(&bytes)?;

        debug!("[SNAPSHOT] Saved {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Snapshot> {
        let mut bytes = Vec::new();
        File::open(path.as_ref())?.read_to_end(&mut bytes)?;

        debug!("[SNAPSHOT] Loaded {} bytes from {}", bytes.len(), path.as_ref().display());
        Snapshot::from_bytes(&bytes)
    }
}
