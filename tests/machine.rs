mod common;

use std::fs;
use std::path::PathBuf;

use common::*;

use rpsx_jit::psx::bus::Bus;
use rpsx_jit::psx::scheduler::{EventKind, Scheduler};
use rpsx_jit::psx::CYCLES_PER_FRAME;
use rpsx_jit::Error;

const LOG: u32 = 0x3000;

fn append(bus: &mut Bus, tag: u32) {
    let n = bus.peek32(LOG).unwrap_or(0);

    bus.poke32(LOG + 4 + n * 4, tag);
    bus.poke32(LOG, n + 1);
}

fn event_a(bus: &mut Bus, _: &mut Scheduler) {
    append(bus, 0xa);
}

fn event_b(bus: &mut Bus, _: &mut Scheduler) {
    append(bus, 0xb);
}

fn event_c(bus: &mut Bus, _: &mut Scheduler) {
    append(bus, 0xc);
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("rpsx-jit-{}-{}", std::process::id(), name))
}

#[test]
fn events_run_between_blocks_in_due_order() {
    let mut system = system();
    system.cpu_mut().set_pc(PROGRAM);

    let scheduler = system.scheduler_mut();
    scheduler.schedule(50, event_a, EventKind::Timer0Compare);
    scheduler.schedule(20, event_b, EventKind::Timer1Compare);
    scheduler.schedule(20, event_c, EventKind::Timer2Compare);

    // 128 RAM instructions
    let cycles = system.step_block();
    assert_eq!(cycles, 256);

    assert_eq!(system.bus().peek32(LOG), Some(3));
    assert_eq!(system.bus().peek32(LOG + 4), Some(0xb));
    assert_eq!(system.bus().peek32(LOG + 8), Some(0xc));
    assert_eq!(system.bus().peek32(LOG + 12), Some(0xa));
}

#[test]
fn run_for_stops_at_the_first_block_boundary_past_the_target() {
    let mut system = system();
    system.cpu_mut().set_pc(PROGRAM);

    system.run_for(1000);

    assert_eq!(system.scheduler().now(), 1024);
}

#[test]
fn vblank_is_raised_every_frame() {
    let mut system = system();

    system.run_frame();
    assert_eq!(system.bus().intc().read_status() & 0x1, 0x1);

    system.write32(0x1f80_1070, 0);
    assert_eq!(system.bus().intc().read_status(), 0);

    system.run_frame();
    assert_eq!(system.bus().intc().read_status() & 0x1, 0x1);
    assert!(system.scheduler().now() >= 2 * CYCLES_PER_FRAME);
}

#[test]
fn ram_is_mirrored_across_segments() {
    let mut system = system();

    system.write32(0x0000_0100, 0x0102_0304);

    assert_eq!(system.read32(0x8000_0100), 0x0102_0304);
    assert_eq!(system.read32(0xa000_0100), 0x0102_0304);
    assert_eq!(system.read32(0x0020_0100), 0x0102_0304);
    assert_eq!(system.read32(0x8060_0100), 0x0102_0304);
}

#[test]
fn bios_is_readable_through_every_segment() {
    let mut bios = vec![0; rpsx_jit::psx::bus::BIOS_SIZE];
    bios[0x10..0x14].copy_from_slice(&[0x78, 0x56, 0x34, 0x12]);

    let mut system = rpsx_jit::psx::System::new(bios.into_boxed_slice(), Default::default()).unwrap();

    assert_eq!(system.read32(0xbfc0_0010), 0x1234_5678);
    assert_eq!(system.read32(0x9fc0_0010), 0x1234_5678);
    assert_eq!(system.read32(0x1fc0_0010), 0x1234_5678);

    system.write32(0xbfc0_0010, 0);
    assert_eq!(system.read32(0xbfc0_0010), 0x1234_5678);
}

#[test]
fn expansion_regions_float_high() {
    let mut system = system();

    assert_eq!(system.read32(0x1f00_0084), 0xffff_ffff);
    assert_eq!(system.read32(0xbfa0_0000), 0xffff_ffff);
}

#[test]
fn tty_output_is_collected_by_line() {
    let mut system = system();

    for byte in b"hello\r\n" {
        system.write8(0x1f80_2023, *byte);
    }

    assert_eq!(system.bus().exp2().lines(), &["hello".to_string()]);
    assert_eq!(system.bus_mut().exp2_mut().take_lines(), vec!["hello".to_string()]);
    assert!(system.bus().exp2().lines().is_empty());
}

#[test]
fn open_bus_lets_standard_devices_answer() {
    let mut system = system();
    system.bus_mut().attach_open_bus();

    assert_eq!(system.read32(0x1f80_1814), 0x1c00_0000);
    assert_eq!(system.read32(0x1f80_1100), 0);
}

#[test]
fn dma_completion_raises_the_dma_irq() {
    let mut system = system();
    system.cpu_mut().set_pc(PROGRAM);

    system.write32(0x1f80_10f0, 0x0800_0000);
    system.write32(0x1f80_10f4, 0x00c0_0000);
    system.write32(0x1f80_10e0, 0x0000_200c);
    system.write32(0x1f80_10e4, 4);
    system.write32(0x1f80_10e8, 0x1100_0002);

    assert_eq!(system.bus().peek32(0x2000), Some(0x00ff_ffff));
    assert_eq!(system.bus().intc().read_status() & 0x8, 0);

    system.step_block();

    let dicr = system.read32(0x1f80_10f4);

    assert_ne!(dicr & (1 << 30), 0);
    assert_ne!(dicr & (1 << 31), 0);
    assert_eq!(system.read32(0x1f80_10e8) & 0x0100_0000, 0);
    assert_eq!(system.bus().intc().read_status() & 0x8, 0x8);
}

fn psexe(pc: u32, destination: u32, payload: &[u32]) -> Vec<u8> {
    let mut file = vec![0u8; 0x800];

    file[0..8].copy_from_slice(b"PS-X EXE");
    file[0x10..0x14].copy_from_slice(&pc.to_le_bytes());
    file[0x14..0x18].copy_from_slice(&0x8001_8000u32.to_le_bytes());
    file[0x18..0x1c].copy_from_slice(&destination.to_le_bytes());
    file[0x1c..0x20].copy_from_slice(&((payload.len() * 4) as u32).to_le_bytes());
    file[0x30..0x34].copy_from_slice(&0x801f_ff00u32.to_le_bytes());
    file[0x34..0x38].copy_from_slice(&0xf0u32.to_le_bytes());

    for word in payload {
        file.extend_from_slice(&word.to_le_bytes());
    }

    file
}

#[test]
fn psexe_is_loaded_and_entered() {
    let path = temp_path("load.exe");
    fs::write(&path, psexe(PROGRAM, PROGRAM, &[addiu(2, 0, 42), nop()])).unwrap();

    let mut system = system();
    system.load_psexe(&path).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(system.cpu().pc(), PROGRAM);
    assert_eq!(system.cpu().reg(28), 0x8001_8000);
    assert_eq!(system.cpu().reg(29), 0x801f_fff0);
    assert_eq!(system.cpu().reg(30), 0x801f_fff0);

    system.step_block();
    assert_eq!(system.cpu().reg(2), 42);
}

#[test]
fn psexe_without_magic_is_rejected() {
    let path = temp_path("bad.exe");

    let mut bytes = psexe(PROGRAM, PROGRAM, &[nop()]);
    bytes[0] = b'X';
    fs::write(&path, bytes).unwrap();

    let mut system = system();
    let result = system.load_psexe(&path);
    fs::remove_file(&path).unwrap();

    assert!(matches!(result, Err(Error::InvalidExe(_))));
}

#[test]
fn save_state_round_trips_the_machine() {
    let path = temp_path("machine.state");

    let mut system = system();
    load(&mut system, PROGRAM, &[
        addiu(2, 0, 7),
        j(PROGRAM),
        nop(),
    ]);

    system.step_block();
    system.save_state(&path).unwrap();

    let now = system.scheduler().now();

    system.write32(PROGRAM, addiu(2, 0, 9));
    system.step_block();
    assert_eq!(system.cpu().reg(2), 9);

    system.load_state(&path).unwrap();
    fs::remove_file(&path).unwrap();

    assert_eq!(system.cpu().reg(2), 7);
    assert_eq!(system.cpu().pc(), PROGRAM);
    assert_eq!(system.scheduler().now(), now);
    assert!(system.scheduler().pending(EventKind::VBlank));
    assert!(system.recompiler().cached(PROGRAM).is_none());

    system.step_block();
    assert_eq!(system.cpu().reg(2), 7);
}

#[test]
fn sessions_are_independent() {
    let mut a = system();
    let mut b = system();

    a.write32(0x100, 1);
    b.write32(0x100, 2);

    assert_eq!(a.read32(0x100), 1);
    assert_eq!(b.read32(0x100), 2);
}
