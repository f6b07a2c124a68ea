//! Dynamic recompiler.
//!
//! Guest code is translated one block at a time into pre-decoded micro-ops
//! held in a bump-allocated arena. Every cache slot resolves to a block;
//! slots with nothing live resolve to the stub at op 0, which hands control
//! back here to translate.

pub mod arena;
pub mod cache;
pub mod emitter;
pub mod op;
pub mod runtime;
pub mod translator;

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::util::Range;

use super::bus::Bus;
use super::cpu::R3000A;
use super::scheduler::Scheduler;

use self::arena::{Arena, STUB};
use self::cache::{checksum, BlockCache};
use self::runtime::{Context, Outcome};
use self::translator::Translation;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JitConfig {
    /// Size of the code arena in bytes.
    pub arena_bytes: usize,
    pub max_block_instructions: u32,
    /// Re-hash block sources on every lookup and retranslate on mismatch.
    pub validate_checksums: bool,
}

impl Default for JitConfig {
    fn default() -> JitConfig {
        JitConfig {
            arena_bytes: 32 * 1024 * 1024,
            max_block_instructions: 128,
            validate_checksums: false,
        }
    }
}

impl JitConfig {
    /// Smallest arena that can hold the stub and one maximal block.
    pub fn min_arena_bytes(max_block_instructions: u32) -> usize {
        Arena::bytes_for(1 + Translation::max_ops(max_block_instructions))
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_block_instructions == 0 {
            return Err(Error::Config("blocks need at least one instruction".to_string()));
        }

        let min = JitConfig::min_arena_bytes(self.max_block_instructions);

        if self.arena_bytes < min {
            return Err(Error::Config(format!(
                "arena of {} bytes cannot hold a {} instruction block (need {})",
                self.arena_bytes, self.max_block_instructions, min
            )));
        }

        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct JitStats {
    pub blocks_compiled: u64,
    pub cache_hits: u64,
    pub stub_entries: u64,
    pub arena_resets: u64,
    pub invalidations: u64,
}

pub struct Recompiler {
    config: JitConfig,

    arena: Arena,
    cache: BlockCache,

    stats: JitStats,
}

impl Recompiler {
    pub fn new(config: JitConfig) -> Result<Recompiler> {
        config.validate()?;

        Ok(Recompiler {
            arena: Arena::new(config.arena_bytes),
            cache: BlockCache::new(),

            config: config,

            stats: JitStats::default(),
        })
    }

    pub fn stats(&self) -> JitStats {
        JitStats {
            invalidations: self.cache.invalidations(),
            ..self.stats
        }
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Block id currently cached for `pc`, if any.
    pub fn cached(&self, pc: u32) -> Option<u32> {
        match self.cache.lookup(pc, &self.arena) {
            STUB => None,
            id => Some(id),
        }
    }

    /// Drops all compiled code.
    pub fn flush(&mut self) {
        self.arena.reset();
        self.cache.clear();
    }

    pub fn invalidate(&mut self, physical: u32) {
        self.cache.invalidate(physical, &self.arena);
    }

    pub fn invalidate_range(&mut self, range: Range) {
        self.cache.invalidate_range(range, &self.arena);
    }

    pub fn invalidate_ram(&mut self) {
        self.cache.invalidate_ram();
    }

    fn lookup(&mut self, pc: u32, bus: &Bus) -> u32 {
        let id = self.cache.lookup(pc, &self.arena);

        if id == STUB {
            return STUB;
        }

        let block = self.arena.block(id);

        if let Some(sum) = block.checksum {
            let words = (0..block.instructions)
                .map(|n| bus.peek32(block.source.wrapping_add(n << 2)).unwrap_or(0));

            if checksum(words) != sum {
                trace!("[JIT] checksum mismatch at 0x{:08x}", pc);
                self.cache.evict(pc);
                return STUB;
            }
        }

        id
    }

    fn compile(&mut self, pc: u32, bus: &Bus) {
        let t = translator::translate(bus, pc, self.config.max_block_instructions, self.config.validate_checksums);
        let (id, recycled) = self.arena.allocate(&t.code, pc, t.cycles, t.instructions, t.checksum);

        if recycled {
            self.stats.arena_resets += 1;
            self.cache.arena_reset();
        }

        self.cache.insert(pc, id, &self.arena);
        self.stats.blocks_compiled += 1;

        debug!("[JIT] compiled 0x{:08x}: {} instructions, {} bytes", pc, t.instructions, self.arena.block(id).size);
    }

    /// Runs the block at the CPU's PC, translating it first when needed.
    /// Returns the cycles it cost.
    pub fn run_block(&mut self, cpu: &mut R3000A, bus: &mut Bus, scheduler: &mut Scheduler) -> u32 {
        let pc = cpu.regs.pc;
        let mut compiled = false;

        loop {
            let id = self.lookup(pc, bus);

            // a block found right after its own translation is not a hit
            if id != STUB && !compiled {
                self.stats.cache_hits += 1;
            }
            let (entry, cost) = {
                let block = self.arena.block(id);
                (block.entry, block.cycles_per_instruction())
            };

            let outcome = Context {
                cpu: &mut *cpu,
                bus: &mut *bus,
                scheduler: &mut *scheduler,
                cache: &mut self.cache,
                arena: &self.arena,
            }.execute(entry);

            match outcome {
                Outcome::Stub => {
                    self.stats.stub_entries += 1;
                    self.compile(pc, bus);
                    compiled = true;
                }
                Outcome::Exited { executed } => return executed * cost,
            }
        }
    }
}
