//! CPU tests for the NES emulator

use nes_core::cartridge::Cartridge;
use nes_core::cpu::{Bus, Cpu, StatusFlags};
use nes_core::error::{NesError, Result};
use nes_core::system::NesSystem;

/// Flat 64KB address space, no mirroring
struct FlatBus {
    memory: Vec<u8>,
}

impl FlatBus {
    fn new() -> Self {
        Self {
            memory: vec![0; 0x10000],
        }
    }

    fn load(&mut self, address: u16, bytes: &[u8]) {
        let start = address as usize;
        self.memory[start..start + bytes.len()].copy_from_slice(bytes);
    }
}

impl Bus for FlatBus {
    fn read(&mut self, address: u16) -> Result<u8> {
        Ok(self.memory[address as usize])
    }

    fn write(&mut self, address: u16, value: u8) -> Result<()> {
        self.memory[address as usize] = value;
        Ok(())
    }
}

/// CPU with PC at $0200 and `program` loaded there
fn cpu_with(program: &[u8]) -> (Cpu, FlatBus) {
    let mut bus = FlatBus::new();
    bus.load(0x0200, program);
    bus.load(0xFFFC, &[0x00, 0x02]);
    let mut cpu = Cpu::new();
    cpu.reset(&mut bus).unwrap();
    (cpu, bus)
}

/// NROM system with `program` at $8000
fn system_with(program: &[u8]) -> NesSystem {
    let mut prg = vec![0xEA; 0x4000];
    prg[..program.len()].copy_from_slice(program);
    prg[0x3FFC] = 0x00;
    prg[0x3FFD] = 0x80;
    prg[0x3FFE] = 0x10;
    prg[0x3FFF] = 0x80;
    let mut rom = vec![b'N', b'E', b'S', 0x1A, 1, 1, 0, 0];
    rom.resize(16, 0);
    rom.extend(prg);
    rom.extend(vec![0; 0x2000]);
    NesSystem::new(Cartridge::from_bytes(&rom).unwrap()).unwrap()
}

#[test]
fn test_cpu_reset() {
    let (cpu, _) = cpu_with(&[]);

    assert_eq!(cpu.registers().a, 0);
    assert_eq!(cpu.registers().x, 0);
    assert_eq!(cpu.registers().y, 0);
    assert_eq!(cpu.registers().sp, 0xFD);
    assert_eq!(cpu.registers().pc, 0x0200);
    assert_eq!(cpu.p_register(), 0x24);
}

#[test]
fn test_status_flags() {
    let flags = StatusFlags::from_bits(0x00);
    // bit 5 always reads back set
    assert_eq!(flags.bits(), StatusFlags::UNUSED);

    let flags = StatusFlags::from_bits(0xC3);
    assert!(flags.negative);
    assert!(flags.overflow);
    assert!(flags.zero);
    assert!(flags.carry);
    assert!(!flags.interrupt_disable);
    assert_eq!(flags.bits(), 0xE3);
}

#[test]
fn test_adc_signed_overflow() {
    // LDA #$50; CLC; ADC #$50
    let (mut cpu, mut bus) = cpu_with(&[0xA9, 0x50, 0x18, 0x69, 0x50]);
    for _ in 0..3 {
        cpu.step(&mut bus).unwrap();
    }
    assert_eq!(cpu.registers().a, 0xA0);
    assert!(!cpu.status().carry);
    assert!(cpu.status().overflow);
    assert!(cpu.status().negative);
    assert!(!cpu.status().zero);
}

#[test]
fn test_sbc_borrow() {
    // LDA #$00; SEC; SBC #$01
    let (mut cpu, mut bus) = cpu_with(&[0xA9, 0x00, 0x38, 0xE9, 0x01]);
    for _ in 0..3 {
        cpu.step(&mut bus).unwrap();
    }
    assert_eq!(cpu.registers().a, 0xFF);
    assert!(!cpu.status().carry);
    assert!(!cpu.status().zero);
    assert!(cpu.status().negative);
    assert!(!cpu.status().overflow);
}

#[test]
fn test_indirect_jump_page_wrap() {
    // JMP ($30FF)
    let (mut cpu, mut bus) = cpu_with(&[0x6C, 0xFF, 0x30]);
    bus.load(0x30FF, &[0x40]);
    bus.load(0x3000, &[0x80]);
    bus.load(0x3100, &[0x12]);
    assert_eq!(cpu.step(&mut bus).unwrap(), 5);
    assert_eq!(cpu.registers().pc, 0x8040);
}

#[test]
fn test_indirect_x_wraps_in_zero_page() {
    // LDX #$01; LDA ($FE,X) -> pointer at $FF/$00
    let (mut cpu, mut bus) = cpu_with(&[0xA2, 0x01, 0xA1, 0xFE]);
    bus.load(0x00FF, &[0x34]);
    bus.load(0x0000, &[0x12]);
    bus.load(0x1234, &[0x77]);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.step(&mut bus).unwrap(), 6);
    assert_eq!(cpu.registers().a, 0x77);
}

#[test]
fn test_indirect_y_page_cross() {
    // LDY #$10; LDA ($20),Y with base $12F8
    let (mut cpu, mut bus) = cpu_with(&[0xA0, 0x10, 0xB1, 0x20, 0x91, 0x20]);
    bus.load(0x0020, &[0xF8, 0x12]);
    bus.load(0x1308, &[0x5A]);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.step(&mut bus).unwrap(), 6);
    assert_eq!(cpu.registers().a, 0x5A);
    // STA ($20),Y is 6 either way
    assert_eq!(cpu.step(&mut bus).unwrap(), 6);
}

#[test]
fn test_rmw_absolute_x_cycles() {
    // LDX #$00; INC $0300,X
    let (mut cpu, mut bus) = cpu_with(&[0xA2, 0x00, 0xFE, 0x00, 0x03]);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.step(&mut bus).unwrap(), 7);
    assert_eq!(bus.memory[0x0300], 1);
}

#[test]
fn test_rotate_through_carry() {
    // SEC; LDA #$80; ROL A; ROR A
    let (mut cpu, mut bus) = cpu_with(&[0x38, 0xA9, 0x80, 0x2A, 0x6A]);
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.registers().a, 0x01);
    assert!(cpu.status().carry);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.registers().a, 0x80);
    assert!(cpu.status().carry);
}

#[test]
fn test_bit_copies_high_bits() {
    // LDA #$01; BIT $10
    let (mut cpu, mut bus) = cpu_with(&[0xA9, 0x01, 0x24, 0x10]);
    bus.load(0x0010, &[0xC0]);
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    assert!(cpu.status().zero);
    assert!(cpu.status().overflow);
    assert!(cpu.status().negative);
}

#[test]
fn test_rti_restores_state() {
    // BRK at $0200, handler at $0300: RTI
    let (mut cpu, mut bus) = cpu_with(&[0x00, 0xEA, 0xEA]);
    bus.load(0xFFFE, &[0x00, 0x03]);
    bus.load(0x0300, &[0x40]);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.registers().pc, 0x0300);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.registers().pc, 0x0202);
    assert_eq!(cpu.registers().sp, 0xFD);
    assert!(!cpu.status().break_command);
}

#[test]
fn test_unofficial_lax_sax() {
    // LAX $10; LDX #$0F; SAX $11
    let (mut cpu, mut bus) = cpu_with(&[0xA7, 0x10, 0xA2, 0x0F, 0x87, 0x11]);
    bus.load(0x0010, &[0x3C]);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.registers().a, 0x3C);
    assert_eq!(cpu.registers().x, 0x3C);
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    assert_eq!(bus.memory[0x0011], 0x0C);
}

#[test]
fn test_unofficial_isb_and_slo() {
    // LDA #$10; SEC; ISB $10 (mem 0x04 -> 0x05, A = 0x10 - 0x05)
    let (mut cpu, mut bus) = cpu_with(&[0xA9, 0x10, 0x38, 0xE7, 0x10, 0x07, 0x11]);
    bus.load(0x0010, &[0x04, 0x81]);
    for _ in 0..3 {
        cpu.step(&mut bus).unwrap();
    }
    assert_eq!(bus.memory[0x0010], 0x05);
    assert_eq!(cpu.registers().a, 0x0B);
    assert!(cpu.status().carry);

    // SLO $11: mem 0x81 -> 0x02 with carry out, A |= 0x02
    cpu.step(&mut bus).unwrap();
    assert_eq!(bus.memory[0x0011], 0x02);
    assert_eq!(cpu.registers().a, 0x0B);
    assert!(cpu.status().carry);
}

#[test]
fn test_stack_wraps() {
    let (mut cpu, mut bus) = cpu_with(&[]);
    cpu.registers_mut().sp = 0x00;
    cpu.push(&mut bus, 0xAA).unwrap();
    assert_eq!(cpu.registers().sp, 0xFF);
    assert_eq!(bus.memory[0x0100], 0xAA);
    assert_eq!(cpu.pull(&mut bus).unwrap(), 0xAA);
    assert_eq!(cpu.registers().sp, 0x00);
}

#[test]
fn test_unmapped_opcode_halts_system() {
    let mut system = system_with(&[0xEA, 0x12]);
    system.step().unwrap();
    let error = system.step().unwrap_err();
    assert!(matches!(error, NesError::UnmappedOpcode { opcode: 0x12, pc: 0x8001 }));
    assert_eq!(error.to_string(), "unmapped opcode $12 at $8001");
}

#[test]
fn test_irq_line_serviced_when_enabled() {
    // SEI already set by reset; CLI then NOPs
    let mut system = system_with(&[0x58, 0xEA, 0xEA]);
    system.set_irq(true);
    // masked while I is set, so nothing happens until CLI has run
    assert_eq!(system.step().unwrap(), 2 + 7);
    assert_eq!(system.cpu().registers().pc, 0x8010);
    assert!(system.cpu().status().interrupt_disable);

    // the line stays asserted but I is set again inside the handler
    assert_eq!(system.step().unwrap(), 2);
    assert_eq!(system.cpu().registers().pc, 0x8011);
}
