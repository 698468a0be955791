//! Trace output against a hand-checked synthetic ROM

use nes_core::cartridge::Cartridge;
use nes_core::ppu::DOTS_PER_SCANLINE;
use nes_core::system::NesSystem;

/// 16KB NROM image; `program` at $C000 (mirrored from $8000), reset vector to it
fn rom(program: &[u8]) -> Vec<u8> {
    let mut prg = vec![0xEA; 0x4000];
    prg[..program.len()].copy_from_slice(program);
    prg[0x3FFC] = 0x00;
    prg[0x3FFD] = 0xC0;

    let mut image = vec![b'N', b'E', b'S', 0x1A, 1, 1, 0, 0];
    image.resize(16, 0);
    image.extend(prg);
    image.extend(vec![0; 0x2000]);
    image
}

fn system(program: &[u8]) -> NesSystem {
    NesSystem::new(Cartridge::from_bytes(&rom(program)).unwrap()).unwrap()
}

#[test]
fn test_known_trace() {
    // LDX #$05; STX $10; INX; JMP $C000
    let mut system = system(&[0xA2, 0x05, 0x86, 0x10, 0xE8, 0x4C, 0x00, 0xC0]);
    let expected = [
        "C000  A2 05     LDX #$05                        A:00 X:00 Y:00 P:24 SP:FD PPU:  0, 21 CYC:7",
        "C002  86 10     STX $10                         A:00 X:05 Y:00 P:24 SP:FD PPU:  0, 27 CYC:9",
        "C004  E8        INX                             A:00 X:05 Y:00 P:24 SP:FD PPU:  0, 36 CYC:12",
        "C005  4C 00 C0  JMP $C000                       A:00 X:06 Y:00 P:24 SP:FD PPU:  0, 42 CYC:14",
        "C000  A2 05     LDX #$05                        A:00 X:06 Y:00 P:24 SP:FD PPU:  0, 51 CYC:17",
    ];

    for line in expected {
        assert_eq!(system.trace_line(), line);
        system.step().unwrap();
    }
    assert_eq!(system.read_memory(0x0010).unwrap(), 0x05);
}

#[test]
fn test_ppu_position_tracks_cycles() {
    // DEX; BNE -3; JMP $C000
    let mut system = system(&[0xCA, 0xD0, 0xFD, 0x4C, 0x00, 0xC0]);
    for _ in 0..3000 {
        let line = system.trace_line();
        let scanline: u64 = field(&line, "PPU:", ',').trim().parse().unwrap();
        let dot: u64 = field(&line, ",", ' ').trim().parse().unwrap();
        let cycles: u64 = line[line.find("CYC:").unwrap() + 4..].parse().unwrap();
        assert_eq!(scanline * u64::from(DOTS_PER_SCANLINE) + dot, cycles * 3, "{line}");
        system.step().unwrap();
    }
}

#[test]
fn test_trace_does_not_disturb_ppu() {
    // LDA $2002 would clear vblank if the tracer read it
    let mut system = system(&[0xAD, 0x02, 0x20]);
    let before = system.ppu().status();
    let line = system.trace_line();
    assert!(line.contains("LDA $2002"), "{line}");
    assert_eq!(system.ppu().status(), before);
}

/// Text after the last `start` in the PPU column, up to `end`
fn field<'a>(line: &'a str, start: &str, end: char) -> &'a str {
    let ppu = &line[line.find("PPU:").unwrap()..];
    let from = ppu.find(start).unwrap() + start.len();
    let rest = &ppu[from..];
    let rest = rest.trim_start();
    &rest[..rest.find(end).unwrap()]
}
