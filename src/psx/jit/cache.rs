//! Block lookup tables for the two regions code can run from.

use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;

use crate::psx::bus::to_physical;
use crate::util::Range;

use super::arena::{Arena, STUB};

const RAM_SIZE: u32 = 0x20_0000;
const RAM_MIRRORS_END: u32 = 0x80_0000;
const BIOS_START: u32 = 0x1fc0_0000;
const BIOS_SIZE: u32 = 0x8_0000;

const RAM_SLOTS: usize = (RAM_SIZE >> 2) as usize;
const BIOS_SLOTS: usize = (BIOS_SIZE >> 2) as usize;

const PAGE_SHIFT: u32 = 10;
const RAM_PAGES: usize = (RAM_SIZE >> PAGE_SHIFT) as usize;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Slot {
    block: u32,
    generation: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Region {
    Ram,
    Bios,
}

/// Splits a physical address into its code region and slot index.
pub fn region(physical: u32) -> Option<(Region, usize)> {
    match physical {
        0..=0x007f_ffff => Some((Region::Ram, ((physical & (RAM_SIZE - 1)) >> 2) as usize)),
        0x1fc0_0000..=0x1fc7_ffff => Some((Region::Bios, ((physical - BIOS_START) >> 2) as usize)),
        _ => None,
    }
}

pub fn checksum<I: IntoIterator<Item = u32>>(words: I) -> u64 {
    let mut hasher = DefaultHasher::new();

    for word in words {
        hasher.write_u32(word);
    }

    hasher.finish()
}

pub struct BlockCache {
    ram: Vec<Slot>,
    bios: Vec<Slot>,

    /// Blocks whose source overlaps each 1 KiB page of RAM.
    owners: Vec<Vec<u32>>,

    invalidations: u64,
}

impl BlockCache {
    pub fn new() -> BlockCache {
        BlockCache {
            ram: vec![Slot::default(); RAM_SLOTS],
            bios: vec![Slot::default(); BIOS_SLOTS],

            owners: vec![Vec::new(); RAM_PAGES],

            invalidations: 0,
        }
    }

    pub fn invalidations(&self) -> u64 {
        self.invalidations
    }

    fn slot(&self, pc: u32) -> Slot {
        match region(to_physical(pc)) {
            Some((Region::Ram, index)) => self.ram[index],
            Some((Region::Bios, index)) => self.bios[index],
            None => panic!("[JIT] [ERROR] Execution outside RAM and BIOS at 0x{:08x}", pc),
        }
    }

    /// Returns the live block for `pc`, or the stub.
    pub fn lookup(&self, pc: u32, arena: &Arena) -> u32 {
        let slot = self.slot(pc);

        if slot.block == STUB || slot.generation != arena.generation() {
            return STUB;
        }

        if arena.block(slot.block).source != pc {
            return STUB;
        }

        slot.block
    }

    pub fn insert(&mut self, pc: u32, id: u32, arena: &Arena) {
        let slot = Slot {
            block: id,
            generation: arena.generation(),
        };

        match region(to_physical(pc)) {
            Some((Region::Ram, index)) => {
                self.ram[index] = slot;

                let block = arena.block(id);
                let start = (index as u32) << 2;
                let end = start + (block.instructions << 2);

                for page in (start >> PAGE_SHIFT)..=((end - 1) >> PAGE_SHIFT) {
                    self.owners[(page as usize) % RAM_PAGES].push(id);
                }
            }
            Some((Region::Bios, index)) => self.bios[index] = slot,
            None => panic!("[JIT] [ERROR] Execution outside RAM and BIOS at 0x{:08x}", pc),
        }
    }

    /// Forgets the slot of one block, used when a checksum no longer matches.
    pub fn evict(&mut self, pc: u32) {
        let empty = Slot::default();

        match region(to_physical(pc)) {
            Some((Region::Ram, index)) => self.ram[index] = empty,
            Some((Region::Bios, index)) => self.bios[index] = empty,
            None => (),
        }

        self.invalidations += 1;
    }

    /// A RAM word at `physical` changed. Drops its own slot and every block
    /// whose source covers it.
    pub fn invalidate(&mut self, physical: u32, arena: &Arena) {
        if physical >= RAM_MIRRORS_END {
            return;
        }

        let offset = physical & (RAM_SIZE - 1) & !0x3;

        if self.ram[(offset >> 2) as usize].block != STUB {
            self.ram[(offset >> 2) as usize] = Slot::default();
            self.invalidations += 1;
        }

        let page = (offset >> PAGE_SHIFT) as usize;

        if self.owners[page].is_empty() {
            return;
        }

        let ram = &mut self.ram;
        let mut dropped = 0;

        self.owners[page].retain(|&id| {
            let block = arena.block(id);
            let start = block.source & (RAM_SIZE - 1);
            let end = start + (block.instructions << 2);

            if offset < start || offset >= end {
                return true;
            }

            let slot = &mut ram[(start >> 2) as usize];

            if slot.block == id {
                *slot = Slot::default();
                dropped += 1;
            }

            false
        });

        self.invalidations += dropped;
    }

    /// Physical RAM range written behind the CPU's back (DMA).
    pub fn invalidate_range(&mut self, range: Range, arena: &Arena) {
        let mut address = range.0 & !0x3;

        while address < range.1 {
            self.invalidate(address, arena);
            address += 4;
        }
    }

    pub fn invalidate_ram(&mut self) {
        for slot in self.ram.iter_mut() {
            *slot = Slot::default();
        }

        for owners in self.owners.iter_mut() {
            owners.clear();
        }

        self.invalidations += 1;
    }

    /// Called after the arena recycled. Slots go stale through the
    /// generation; only the ownership lists hold raw ids.
    pub fn arena_reset(&mut self) {
        for owners in self.owners.iter_mut() {
            owners.clear();
        }
    }

    pub fn clear(&mut self) {
        self.invalidate_ram();

        for slot in self.bios.iter_mut() {
            *slot = Slot::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psx::jit::op::Op;

    fn compile(arena: &mut Arena, cache: &mut BlockCache, pc: u32, instructions: u32) -> u32 {
        let code = vec![Op::Exit; instructions as usize];
        let (id, _) = arena.allocate(&code, pc, instructions * 2, instructions, None);
        cache.insert(pc, id, arena);
        id
    }

    #[test]
    fn regions() {
        assert_eq!(region(0x0000_1000), Some((Region::Ram, 0x400)));
        assert_eq!(region(0x0060_1000), Some((Region::Ram, 0x400)));
        assert_eq!(region(0x1fc0_0180), Some((Region::Bios, 0x60)));
        assert_eq!(region(0x1f80_0000), None);
    }

    #[test]
    fn lookup_hits_only_the_same_virtual_pc() {
        let mut arena = Arena::new(Arena::bytes_for(64));
        let mut cache = BlockCache::new();

        let id = compile(&mut arena, &mut cache, 0x8000_1000, 4);

        assert_eq!(cache.lookup(0x8000_1000, &arena), id);
        assert_eq!(cache.lookup(0xa000_1000, &arena), STUB);
        assert_eq!(cache.lookup(0x8000_1004, &arena), STUB);
    }

    #[test]
    fn write_inside_a_block_drops_it() {
        let mut arena = Arena::new(Arena::bytes_for(64));
        let mut cache = BlockCache::new();

        let a = compile(&mut arena, &mut cache, 0x8000_1000, 4);
        let b = compile(&mut arena, &mut cache, 0x8000_1010, 4);

        cache.invalidate(0x0000_1008, &arena);

        assert_eq!(cache.lookup(0x8000_1000, &arena), STUB);
        assert_eq!(cache.lookup(0x8000_1010, &arena), b);
        assert_ne!(a, b);
        assert_eq!(cache.invalidations(), 1);
    }

    #[test]
    fn write_through_a_mirror_drops_the_block() {
        let mut arena = Arena::new(Arena::bytes_for(64));
        let mut cache = BlockCache::new();

        compile(&mut arena, &mut cache, 0x8000_1000, 4);
        cache.invalidate(0x0060_100c, &arena);

        assert_eq!(cache.lookup(0x8000_1000, &arena), STUB);
    }

    #[test]
    fn block_spanning_pages_is_found_from_either_page() {
        let mut arena = Arena::new(Arena::bytes_for(64));
        let mut cache = BlockCache::new();

        compile(&mut arena, &mut cache, 0x8000_13f8, 4);
        cache.invalidate(0x0000_1400, &arena);

        assert_eq!(cache.lookup(0x8000_13f8, &arena), STUB);
    }

    #[test]
    fn arena_generation_makes_slots_stale() {
        let mut arena = Arena::new(Arena::bytes_for(64));
        let mut cache = BlockCache::new();

        compile(&mut arena, &mut cache, 0xbfc0_0000, 4);
        arena.reset();
        cache.arena_reset();

        assert_eq!(cache.lookup(0xbfc0_0000, &arena), STUB);
    }

    #[test]
    fn checksum_tracks_contents() {
        assert_eq!(checksum(vec![1, 2, 3]), checksum(vec![1, 2, 3]));
        assert_ne!(checksum(vec![1, 2, 3]), checksum(vec![1, 2, 4]));
    }
}
