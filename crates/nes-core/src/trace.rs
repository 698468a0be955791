//! Per-instruction trace lines in the nestest.log column layout:
//!
//! ```text
//! C000  4C F5 C5  JMP $C5F5                       A:00 X:00 Y:00 P:24 SP:FD PPU:  0, 21 CYC:7
//! ```
//!
//! Operands are rendered without the memory-value annotations nestest adds.

use crate::cpu::Cpu;
use crate::opcodes::{self, AddressingMode, Instruction};

/// Assembly text for one instruction, e.g. `LDA ($80),Y`
pub fn disassemble(instruction: &Instruction, pc: u16, operands: [u8; 2]) -> String {
    let lo = operands[0];
    let word = u16::from_le_bytes(operands);
    let operand = match instruction.mode {
        AddressingMode::Implied => String::new(),
        AddressingMode::Accumulator => "A".to_string(),
        AddressingMode::Immediate => format!("#${lo:02X}"),
        AddressingMode::ZeroPage => format!("${lo:02X}"),
        AddressingMode::ZeroPageX => format!("${lo:02X},X"),
        AddressingMode::ZeroPageY => format!("${lo:02X},Y"),
        AddressingMode::Absolute => format!("${word:04X}"),
        AddressingMode::AbsoluteX => format!("${word:04X},X"),
        AddressingMode::AbsoluteY => format!("${word:04X},Y"),
        AddressingMode::Indirect => format!("(${word:04X})"),
        AddressingMode::IndirectX => format!("(${lo:02X},X)"),
        AddressingMode::IndirectY => format!("(${lo:02X}),Y"),
        AddressingMode::Relative => {
            let target = pc.wrapping_add(2).wrapping_add(lo as i8 as u16);
            format!("${target:04X}")
        }
    };

    if operand.is_empty() {
        instruction.mnemonic().to_string()
    } else {
        format!("{} {}", instruction.mnemonic(), operand)
    }
}

/// Trace line for the instruction at the CPU's PC, before it executes.
///
/// `peek` must read memory without side effects.
pub fn format_line(cpu: &Cpu, scanline: u16, dot: u16, peek: impl Fn(u16) -> u8) -> String {
    let registers = cpu.registers();
    let pc = registers.pc;
    let opcode = peek(pc);

    let (bytes, marker, text) = match opcodes::lookup(opcode) {
        Some(instruction) => {
            let operands = [peek(pc.wrapping_add(1)), peek(pc.wrapping_add(2))];
            let bytes = [opcode, operands[0], operands[1]][..instruction.len() as usize]
                .iter()
                .map(|b| format!("{b:02X}"))
                .collect::<Vec<_>>()
                .join(" ");
            let marker = if instruction.official { ' ' } else { '*' };
            (bytes, marker, disassemble(instruction, pc, operands))
        }
        None => (format!("{opcode:02X}"), '*', "???".to_string()),
    };

    format!(
        "{:04X}  {:<9}{}{:<32}A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X} PPU:{:>3},{:>3} CYC:{}",
        pc,
        bytes,
        marker,
        text,
        registers.a,
        registers.x,
        registers.y,
        cpu.p_register(),
        registers.sp,
        scanline,
        dot,
        cpu.total_cycles()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(opcode: u8, pc: u16, operands: [u8; 2]) -> String {
        disassemble(opcodes::lookup(opcode).unwrap(), pc, operands)
    }

    #[test]
    fn test_operand_rendering() {
        assert_eq!(text(0xEA, 0, [0, 0]), "NOP");
        assert_eq!(text(0x0A, 0, [0, 0]), "ASL A");
        assert_eq!(text(0xA9, 0, [0x10, 0]), "LDA #$10");
        assert_eq!(text(0xB6, 0, [0x33, 0]), "LDX $33,Y");
        assert_eq!(text(0x9D, 0, [0x00, 0x02]), "STA $0200,X");
        assert_eq!(text(0x6C, 0, [0xFF, 0x30]), "JMP ($30FF)");
        assert_eq!(text(0xA1, 0, [0x80, 0]), "LDA ($80,X)");
        assert_eq!(text(0xB1, 0, [0x80, 0]), "LDA ($80),Y");
    }

    #[test]
    fn test_branch_target() {
        assert_eq!(text(0xD0, 0xC72A, [0x04, 0]), "BNE $C730");
        assert_eq!(text(0x10, 0x8000, [0xFE, 0]), "BPL $8000");
    }

    #[test]
    fn test_line_layout() {
        let cpu = Cpu::new();
        let memory = [0x4C, 0xF5, 0xC5];
        let line = format_line(&cpu, 0, 21, |address| memory[address as usize % 3]);
        assert_eq!(
            line,
            "0000  4C F5 C5  JMP $C5F5                       A:00 X:00 Y:00 P:24 SP:FD PPU:  0, 21 CYC:0"
        );
    }

    #[test]
    fn test_unofficial_marker() {
        let cpu = Cpu::new();
        let memory = [0x04, 0xA9, 0x00];
        let line = format_line(&cpu, 241, 100, |address| memory[address as usize % 3]);
        assert!(line.starts_with("0000  04 A9    *NOP $A9"), "{line}");
        assert!(line.contains("PPU:241,100"), "{line}");
    }
}
