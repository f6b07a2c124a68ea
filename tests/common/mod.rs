#![allow(dead_code)]

use rpsx_jit::psx::bus::BIOS_SIZE;
use rpsx_jit::psx::jit::JitConfig;
use rpsx_jit::psx::System;

pub const PROGRAM: u32 = 0x8001_0000;

pub fn system() -> System {
    system_with(JitConfig::default())
}

pub fn system_with(config: JitConfig) -> System {
    System::new(vec![0; BIOS_SIZE].into_boxed_slice(), config).unwrap()
}

/// Writes `words` at `address` and points the CPU there.
pub fn load(system: &mut System, address: u32, words: &[u32]) {
    store(system, address, words);
    system.cpu_mut().set_pc(address);
}

pub fn store(system: &mut System, address: u32, words: &[u32]) {
    for (n, word) in words.iter().enumerate() {
        system.write32(address + (n as u32) * 4, *word);
    }
}

/// Clears BEV so exceptions land in RAM at 0x80000080.
pub fn ram_vectors(system: &mut System) {
    system.cpu_mut().cop0.write(12, 0);
}

fn imm(op: u32, rs: u32, rt: u32, imm: u32) -> u32 {
    (op << 26) | (rs << 21) | (rt << 16) | (imm & 0xffff)
}

fn special(funct: u32, rs: u32, rt: u32, rd: u32, sa: u32) -> u32 {
    (rs << 21) | (rt << 16) | (rd << 11) | (sa << 6) | funct
}

pub fn nop() -> u32 {
    0
}

pub fn addiu(rt: u32, rs: u32, value: i16) -> u32 {
    imm(0x09, rs, rt, value as u16 as u32)
}

pub fn addi(rt: u32, rs: u32, value: i16) -> u32 {
    imm(0x08, rs, rt, value as u16 as u32)
}

pub fn ori(rt: u32, rs: u32, value: u16) -> u32 {
    imm(0x0d, rs, rt, value as u32)
}

pub fn lui(rt: u32, value: u16) -> u32 {
    imm(0x0f, 0, rt, value as u32)
}

pub fn lw(rt: u32, offset: i16, base: u32) -> u32 {
    imm(0x23, base, rt, offset as u16 as u32)
}

pub fn lb(rt: u32, offset: i16, base: u32) -> u32 {
    imm(0x20, base, rt, offset as u16 as u32)
}

pub fn lwl(rt: u32, offset: i16, base: u32) -> u32 {
    imm(0x22, base, rt, offset as u16 as u32)
}

pub fn lwr(rt: u32, offset: i16, base: u32) -> u32 {
    imm(0x26, base, rt, offset as u16 as u32)
}

pub fn sw(rt: u32, offset: i16, base: u32) -> u32 {
    imm(0x2b, base, rt, offset as u16 as u32)
}

pub fn sb(rt: u32, offset: i16, base: u32) -> u32 {
    imm(0x28, base, rt, offset as u16 as u32)
}

pub fn addu(rd: u32, rs: u32, rt: u32) -> u32 {
    special(0x21, rs, rt, rd, 0)
}

pub fn add(rd: u32, rs: u32, rt: u32) -> u32 {
    special(0x20, rs, rt, rd, 0)
}

pub fn jr(rs: u32) -> u32 {
    special(0x08, rs, 0, 0, 0)
}

pub fn syscall() -> u32 {
    special(0x0c, 0, 0, 0, 0)
}

pub fn brk() -> u32 {
    special(0x0d, 0, 0, 0, 0)
}

/// Branch offsets are in instructions, relative to the delay slot.
pub fn beq(rs: u32, rt: u32, offset: i16) -> u32 {
    imm(0x04, rs, rt, offset as u16 as u32)
}

pub fn bne(rs: u32, rt: u32, offset: i16) -> u32 {
    imm(0x05, rs, rt, offset as u16 as u32)
}

pub fn bltzal(rs: u32, offset: i16) -> u32 {
    imm(0x01, rs, 0x10, offset as u16 as u32)
}

pub fn j(target: u32) -> u32 {
    (0x02 << 26) | ((target >> 2) & 0x03ff_ffff)
}

pub fn jal(target: u32) -> u32 {
    (0x03 << 26) | ((target >> 2) & 0x03ff_ffff)
}

pub fn mfc0(rt: u32, rd: u32) -> u32 {
    (0x10 << 26) | (rt << 16) | (rd << 11)
}

pub fn mtc0(rt: u32, rd: u32) -> u32 {
    (0x10 << 26) | (0x04 << 21) | (rt << 16) | (rd << 11)
}

pub fn mfc2(rt: u32, rd: u32) -> u32 {
    (0x12 << 26) | (rt << 16) | (rd << 11)
}

/// RTPS.
pub fn gte_command() -> u32 {
    0x4a18_0001
}
