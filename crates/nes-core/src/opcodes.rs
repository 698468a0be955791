//! 6502 opcode table
//!
//! A 256-slot array built at compile time. Each occupied slot records the
//! operation, its addressing mode and the base cycle cost. Slots left `None`
//! are opcodes the core does not execute.
//!
//! Base costs for stores and read-modify-write instructions in the indexed
//! modes are one below the hardware total: the CPU always charges the
//! page-cross cycle for those, so the sum comes out right.

/// Addressing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndirectX,
    IndirectY,
    Relative,
}

impl AddressingMode {
    /// Encoded instruction length in bytes, opcode included
    pub const fn len(self) -> u16 {
        match self {
            AddressingMode::Implied | AddressingMode::Accumulator => 1,
            AddressingMode::Absolute
            | AddressingMode::AbsoluteX
            | AddressingMode::AbsoluteY
            | AddressingMode::Indirect => 3,
            _ => 2,
        }
    }

    /// Modes whose effective address can land on a different page than the base
    pub const fn is_indexed(self) -> bool {
        matches!(
            self,
            AddressingMode::AbsoluteX | AddressingMode::AbsoluteY | AddressingMode::IndirectY
        )
    }
}

/// How an operation touches its operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    Read,
    Write,
    ReadModifyWrite,
}

/// CPU operation, independent of addressing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Bvc, Bvs, Clc,
    Cld, Cli, Clv, Cmp, Cpx, Cpy, Dec, Dex, Dey, Eor, Inc, Inx, Iny, Jmp,
    Jsr, Lda, Ldx, Ldy, Lsr, Nop, Ora, Pha, Php, Pla, Plp, Rol, Ror, Rti,
    Rts, Sbc, Sec, Sed, Sei, Sta, Stx, Sty, Tax, Tay, Tsx, Txa, Txs, Tya,
    // Undocumented
    Lax, Sax, Dcp, Isb, Slo, Rla, Sre, Rra,
}

impl Operation {
    pub const fn mnemonic(self) -> &'static str {
        use Operation::*;
        match self {
            Adc => "ADC", And => "AND", Asl => "ASL", Bcc => "BCC", Bcs => "BCS",
            Beq => "BEQ", Bit => "BIT", Bmi => "BMI", Bne => "BNE", Bpl => "BPL",
            Brk => "BRK", Bvc => "BVC", Bvs => "BVS", Clc => "CLC", Cld => "CLD",
            Cli => "CLI", Clv => "CLV", Cmp => "CMP", Cpx => "CPX", Cpy => "CPY",
            Dec => "DEC", Dex => "DEX", Dey => "DEY", Eor => "EOR", Inc => "INC",
            Inx => "INX", Iny => "INY", Jmp => "JMP", Jsr => "JSR", Lda => "LDA",
            Ldx => "LDX", Ldy => "LDY", Lsr => "LSR", Nop => "NOP", Ora => "ORA",
            Pha => "PHA", Php => "PHP", Pla => "PLA", Plp => "PLP", Rol => "ROL",
            Ror => "ROR", Rti => "RTI", Rts => "RTS", Sbc => "SBC", Sec => "SEC",
            Sed => "SED", Sei => "SEI", Sta => "STA", Stx => "STX", Sty => "STY",
            Tax => "TAX", Tay => "TAY", Tsx => "TSX", Txa => "TXA", Txs => "TXS",
            Tya => "TYA", Lax => "LAX", Sax => "SAX", Dcp => "DCP", Isb => "ISB",
            Slo => "SLO", Rla => "RLA", Sre => "SRE", Rra => "RRA",
        }
    }

    pub const fn access(self) -> AccessKind {
        use Operation::*;
        match self {
            Sta | Stx | Sty | Sax => AccessKind::Write,
            Asl | Lsr | Rol | Ror | Inc | Dec | Dcp | Isb | Slo | Rla | Sre | Rra => {
                AccessKind::ReadModifyWrite
            }
            _ => AccessKind::Read,
        }
    }
}

/// One decoded opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: u8,
    pub operation: Operation,
    pub mode: AddressingMode,
    /// Cycles before page-cross and branch penalties
    pub cycles: u8,
    pub official: bool,
}

impl Instruction {
    pub const fn mnemonic(&self) -> &'static str {
        self.operation.mnemonic()
    }

    pub const fn len(&self) -> u16 {
        self.mode.len()
    }
}

use AddressingMode::*;
use Operation::*;

type Entry = (u8, Operation, AddressingMode, u8);

const OFFICIAL: &[Entry] = &[
    (0x69, Adc, Immediate, 2), (0x65, Adc, ZeroPage, 3), (0x75, Adc, ZeroPageX, 4),
    (0x6D, Adc, Absolute, 4), (0x7D, Adc, AbsoluteX, 4), (0x79, Adc, AbsoluteY, 4),
    (0x61, Adc, IndirectX, 6), (0x71, Adc, IndirectY, 5),
    (0x29, And, Immediate, 2), (0x25, And, ZeroPage, 3), (0x35, And, ZeroPageX, 4),
    (0x2D, And, Absolute, 4), (0x3D, And, AbsoluteX, 4), (0x39, And, AbsoluteY, 4),
    (0x21, And, IndirectX, 6), (0x31, And, IndirectY, 5),
    (0x0A, Asl, Accumulator, 2), (0x06, Asl, ZeroPage, 5), (0x16, Asl, ZeroPageX, 6),
    (0x0E, Asl, Absolute, 6), (0x1E, Asl, AbsoluteX, 6),
    (0x90, Bcc, Relative, 2), (0xB0, Bcs, Relative, 2), (0xF0, Beq, Relative, 2),
    (0x30, Bmi, Relative, 2), (0xD0, Bne, Relative, 2), (0x10, Bpl, Relative, 2),
    (0x50, Bvc, Relative, 2), (0x70, Bvs, Relative, 2),
    (0x24, Bit, ZeroPage, 3), (0x2C, Bit, Absolute, 4),
    (0x00, Brk, Implied, 7),
    (0x18, Clc, Implied, 2), (0xD8, Cld, Implied, 2), (0x58, Cli, Implied, 2),
    (0xB8, Clv, Implied, 2),
    (0xC9, Cmp, Immediate, 2), (0xC5, Cmp, ZeroPage, 3), (0xD5, Cmp, ZeroPageX, 4),
    (0xCD, Cmp, Absolute, 4), (0xDD, Cmp, AbsoluteX, 4), (0xD9, Cmp, AbsoluteY, 4),
    (0xC1, Cmp, IndirectX, 6), (0xD1, Cmp, IndirectY, 5),
    (0xE0, Cpx, Immediate, 2), (0xE4, Cpx, ZeroPage, 3), (0xEC, Cpx, Absolute, 4),
    (0xC0, Cpy, Immediate, 2), (0xC4, Cpy, ZeroPage, 3), (0xCC, Cpy, Absolute, 4),
    (0xC6, Dec, ZeroPage, 5), (0xD6, Dec, ZeroPageX, 6), (0xCE, Dec, Absolute, 6),
    (0xDE, Dec, AbsoluteX, 6),
    (0xCA, Dex, Implied, 2), (0x88, Dey, Implied, 2),
    (0x49, Eor, Immediate, 2), (0x45, Eor, ZeroPage, 3), (0x55, Eor, ZeroPageX, 4),
    (0x4D, Eor, Absolute, 4), (0x5D, Eor, AbsoluteX, 4), (0x59, Eor, AbsoluteY, 4),
    (0x41, Eor, IndirectX, 6), (0x51, Eor, IndirectY, 5),
    (0xE6, Inc, ZeroPage, 5), (0xF6, Inc, ZeroPageX, 6), (0xEE, Inc, Absolute, 6),
    (0xFE, Inc, AbsoluteX, 6),
    (0xE8, Inx, Implied, 2), (0xC8, Iny, Implied, 2),
    (0x4C, Jmp, Absolute, 3), (0x6C, Jmp, Indirect, 5),
    (0x20, Jsr, Absolute, 6),
    (0xA9, Lda, Immediate, 2), (0xA5, Lda, ZeroPage, 3), (0xB5, Lda, ZeroPageX, 4),
    (0xAD, Lda, Absolute, 4), (0xBD, Lda, AbsoluteX, 4), (0xB9, Lda, AbsoluteY, 4),
    (0xA1, Lda, IndirectX, 6), (0xB1, Lda, IndirectY, 5),
    (0xA2, Ldx, Immediate, 2), (0xA6, Ldx, ZeroPage, 3), (0xB6, Ldx, ZeroPageY, 4),
    (0xAE, Ldx, Absolute, 4), (0xBE, Ldx, AbsoluteY, 4),
    (0xA0, Ldy, Immediate, 2), (0xA4, Ldy, ZeroPage, 3), (0xB4, Ldy, ZeroPageX, 4),
    (0xAC, Ldy, Absolute, 4), (0xBC, Ldy, AbsoluteX, 4),
    (0x4A, Lsr, Accumulator, 2), (0x46, Lsr, ZeroPage, 5), (0x56, Lsr, ZeroPageX, 6),
    (0x4E, Lsr, Absolute, 6), (0x5E, Lsr, AbsoluteX, 6),
    (0xEA, Nop, Implied, 2),
    (0x09, Ora, Immediate, 2), (0x05, Ora, ZeroPage, 3), (0x15, Ora, ZeroPageX, 4),
    (0x0D, Ora, Absolute, 4), (0x1D, Ora, AbsoluteX, 4), (0x19, Ora, AbsoluteY, 4),
    (0x01, Ora, IndirectX, 6), (0x11, Ora, IndirectY, 5),
    (0x48, Pha, Implied, 3), (0x08, Php, Implied, 3),
    (0x68, Pla, Implied, 4), (0x28, Plp, Implied, 4),
    (0x2A, Rol, Accumulator, 2), (0x26, Rol, ZeroPage, 5), (0x36, Rol, ZeroPageX, 6),
    (0x2E, Rol, Absolute, 6), (0x3E, Rol, AbsoluteX, 6),
    (0x6A, Ror, Accumulator, 2), (0x66, Ror, ZeroPage, 5), (0x76, Ror, ZeroPageX, 6),
    (0x6E, Ror, Absolute, 6), (0x7E, Ror, AbsoluteX, 6),
    (0x40, Rti, Implied, 6), (0x60, Rts, Implied, 6),
    (0xE9, Sbc, Immediate, 2), (0xE5, Sbc, ZeroPage, 3), (0xF5, Sbc, ZeroPageX, 4),
    (0xED, Sbc, Absolute, 4), (0xFD, Sbc, AbsoluteX, 4), (0xF9, Sbc, AbsoluteY, 4),
    (0xE1, Sbc, IndirectX, 6), (0xF1, Sbc, IndirectY, 5),
    (0x38, Sec, Implied, 2), (0xF8, Sed, Implied, 2), (0x78, Sei, Implied, 2),
    (0x85, Sta, ZeroPage, 3), (0x95, Sta, ZeroPageX, 4), (0x8D, Sta, Absolute, 4),
    (0x9D, Sta, AbsoluteX, 4), (0x99, Sta, AbsoluteY, 4), (0x81, Sta, IndirectX, 6),
    (0x91, Sta, IndirectY, 5),
    (0x86, Stx, ZeroPage, 3), (0x96, Stx, ZeroPageY, 4), (0x8E, Stx, Absolute, 4),
    (0x84, Sty, ZeroPage, 3), (0x94, Sty, ZeroPageX, 4), (0x8C, Sty, Absolute, 4),
    (0xAA, Tax, Implied, 2), (0xA8, Tay, Implied, 2), (0xBA, Tsx, Implied, 2),
    (0x8A, Txa, Implied, 2), (0x9A, Txs, Implied, 2), (0x98, Tya, Implied, 2),
];

const UNOFFICIAL: &[Entry] = &[
    (0x1A, Nop, Implied, 2), (0x3A, Nop, Implied, 2), (0x5A, Nop, Implied, 2),
    (0x7A, Nop, Implied, 2), (0xDA, Nop, Implied, 2), (0xFA, Nop, Implied, 2),
    (0x80, Nop, Immediate, 2), (0x82, Nop, Immediate, 2), (0x89, Nop, Immediate, 2),
    (0xC2, Nop, Immediate, 2), (0xE2, Nop, Immediate, 2),
    (0x04, Nop, ZeroPage, 3), (0x44, Nop, ZeroPage, 3), (0x64, Nop, ZeroPage, 3),
    (0x14, Nop, ZeroPageX, 4), (0x34, Nop, ZeroPageX, 4), (0x54, Nop, ZeroPageX, 4),
    (0x74, Nop, ZeroPageX, 4), (0xD4, Nop, ZeroPageX, 4), (0xF4, Nop, ZeroPageX, 4),
    (0x0C, Nop, Absolute, 4),
    (0x1C, Nop, AbsoluteX, 4), (0x3C, Nop, AbsoluteX, 4), (0x5C, Nop, AbsoluteX, 4),
    (0x7C, Nop, AbsoluteX, 4), (0xDC, Nop, AbsoluteX, 4), (0xFC, Nop, AbsoluteX, 4),
    (0xA7, Lax, ZeroPage, 3), (0xB7, Lax, ZeroPageY, 4), (0xAF, Lax, Absolute, 4),
    (0xBF, Lax, AbsoluteY, 4), (0xA3, Lax, IndirectX, 6), (0xB3, Lax, IndirectY, 5),
    (0x87, Sax, ZeroPage, 3), (0x97, Sax, ZeroPageY, 4), (0x8F, Sax, Absolute, 4),
    (0x83, Sax, IndirectX, 6),
    (0xEB, Sbc, Immediate, 2),
    (0xC7, Dcp, ZeroPage, 5), (0xD7, Dcp, ZeroPageX, 6), (0xCF, Dcp, Absolute, 6),
    (0xDF, Dcp, AbsoluteX, 6), (0xDB, Dcp, AbsoluteY, 6), (0xC3, Dcp, IndirectX, 8),
    (0xD3, Dcp, IndirectY, 7),
    (0xE7, Isb, ZeroPage, 5), (0xF7, Isb, ZeroPageX, 6), (0xEF, Isb, Absolute, 6),
    (0xFF, Isb, AbsoluteX, 6), (0xFB, Isb, AbsoluteY, 6), (0xE3, Isb, IndirectX, 8),
    (0xF3, Isb, IndirectY, 7),
    (0x07, Slo, ZeroPage, 5), (0x17, Slo, ZeroPageX, 6), (0x0F, Slo, Absolute, 6),
    (0x1F, Slo, AbsoluteX, 6), (0x1B, Slo, AbsoluteY, 6), (0x03, Slo, IndirectX, 8),
    (0x13, Slo, IndirectY, 7),
    (0x27, Rla, ZeroPage, 5), (0x37, Rla, ZeroPageX, 6), (0x2F, Rla, Absolute, 6),
    (0x3F, Rla, AbsoluteX, 6), (0x3B, Rla, AbsoluteY, 6), (0x23, Rla, IndirectX, 8),
    (0x33, Rla, IndirectY, 7),
    (0x47, Sre, ZeroPage, 5), (0x57, Sre, ZeroPageX, 6), (0x4F, Sre, Absolute, 6),
    (0x5F, Sre, AbsoluteX, 6), (0x5B, Sre, AbsoluteY, 6), (0x43, Sre, IndirectX, 8),
    (0x53, Sre, IndirectY, 7),
    (0x67, Rra, ZeroPage, 5), (0x77, Rra, ZeroPageX, 6), (0x6F, Rra, Absolute, 6),
    (0x7F, Rra, AbsoluteX, 6), (0x7B, Rra, AbsoluteY, 6), (0x63, Rra, IndirectX, 8),
    (0x73, Rra, IndirectY, 7),
];

const fn build() -> [Option<Instruction>; 256] {
    let mut table: [Option<Instruction>; 256] = [None; 256];
    let mut i = 0;
    while i < OFFICIAL.len() {
        let (opcode, operation, mode, cycles) = OFFICIAL[i];
        table[opcode as usize] = Some(Instruction {
            opcode,
            operation,
            mode,
            cycles,
            official: true,
        });
        i += 1;
    }
    let mut i = 0;
    while i < UNOFFICIAL.len() {
        let (opcode, operation, mode, cycles) = UNOFFICIAL[i];
        table[opcode as usize] = Some(Instruction {
            opcode,
            operation,
            mode,
            cycles,
            official: false,
        });
        i += 1;
    }
    table
}

/// Opcode byte to instruction
pub static INSTRUCTIONS: [Option<Instruction>; 256] = build();

#[inline]
pub fn lookup(opcode: u8) -> Option<&'static Instruction> {
    INSTRUCTIONS[opcode as usize].as_ref()
}
