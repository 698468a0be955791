//! CPU module - 2A03 (6502 variant) implementation
//!
//! The NES uses a modified 6502 CPU without decimal mode. One call to
//! [`Cpu::step`] fetches, decodes and executes a whole instruction and reports
//! how many cycles it took; the driver clocks everything else from that.

use std::fmt;

use log::debug;

use crate::error::{NesError, Result};
use crate::opcodes::{self, AccessKind, AddressingMode, Operation};

pub const NMI_VECTOR: u16 = 0xFFFA;
pub const RESET_VECTOR: u16 = 0xFFFC;
pub const IRQ_VECTOR: u16 = 0xFFFE;

/// Stack page base
const STACK_BASE: u16 = 0x0100;

/// Cycles spent by the reset sequence and by interrupt entry
pub const RESET_CYCLES: u64 = 7;
pub const INTERRUPT_CYCLES: u8 = 7;

/// Bus trait for memory and I/O access
pub trait Bus {
    /// Read a byte from the given address
    fn read(&mut self, address: u16) -> Result<u8>;
    /// Write a byte to the given address
    fn write(&mut self, address: u16, value: u8) -> Result<()>;

    /// Little-endian word
    fn read_word(&mut self, address: u16) -> Result<u16> {
        let lo = self.read(address)?;
        let hi = self.read(address.wrapping_add(1))?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    fn write_word(&mut self, address: u16, value: u16) -> Result<()> {
        let [lo, hi] = value.to_le_bytes();
        self.write(address, lo)?;
        self.write(address.wrapping_add(1), hi)
    }
}

/// 2A03 CPU registers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuRegisters {
    pub a: u8,    // Accumulator
    pub x: u8,    // X index register
    pub y: u8,    // Y index register
    pub sp: u8,   // Stack pointer
    pub pc: u16,  // Program counter
}

impl Default for CpuRegisters {
    fn default() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD, // Stack starts at $01FD
            pc: 0,    // Will be set by reset vector
        }
    }
}

/// CPU status flags, kept unpacked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusFlags {
    pub carry: bool,
    pub zero: bool,
    pub interrupt_disable: bool,
    pub decimal: bool,
    /// Only ever set in pushed copies
    pub break_command: bool,
    pub overflow: bool,
    pub negative: bool,
}

impl StatusFlags {
    pub const CARRY: u8 = 0b00000001;
    pub const ZERO: u8 = 0b00000010;
    pub const INTERRUPT: u8 = 0b00000100;
    pub const DECIMAL: u8 = 0b00001000;
    pub const BREAK: u8 = 0b00010000;
    pub const UNUSED: u8 = 0b00100000;
    pub const OVERFLOW: u8 = 0b01000000;
    pub const NEGATIVE: u8 = 0b10000000;

    /// Hardware layout, bit 5 always set
    pub fn bits(&self) -> u8 {
        let mut bits = Self::UNUSED;
        for (set, flag) in [
            (self.carry, Self::CARRY),
            (self.zero, Self::ZERO),
            (self.interrupt_disable, Self::INTERRUPT),
            (self.decimal, Self::DECIMAL),
            (self.break_command, Self::BREAK),
            (self.overflow, Self::OVERFLOW),
            (self.negative, Self::NEGATIVE),
        ] {
            if set {
                bits |= flag;
            }
        }
        bits
    }

    pub fn from_bits(bits: u8) -> Self {
        Self {
            carry: bits & Self::CARRY != 0,
            zero: bits & Self::ZERO != 0,
            interrupt_disable: bits & Self::INTERRUPT != 0,
            decimal: bits & Self::DECIMAL != 0,
            break_command: bits & Self::BREAK != 0,
            overflow: bits & Self::OVERFLOW != 0,
            negative: bits & Self::NEGATIVE != 0,
        }
    }
}

impl fmt::Display for StatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "C:{} Z:{} I:{} D:{} B:{} U:{} V:{} N:{}",
            self.carry as u8,
            self.zero as u8,
            self.interrupt_disable as u8,
            self.decimal as u8,
            self.break_command as u8,
            1, // U is always 1
            self.overflow as u8,
            self.negative as u8
        )
    }
}

/// What an addressing mode resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operand {
    Implied,
    Accumulator,
    Address(u16),
}

/// CPU emulator state
#[derive(Debug, Clone)]
pub struct Cpu {
    registers: CpuRegisters,
    status: StatusFlags,
    /// Total cycles executed
    total_cycles: u64,
}

impl Cpu {
    /// Create a new CPU instance
    pub fn new() -> Self {
        Self {
            registers: CpuRegisters::default(),
            status: StatusFlags::from_bits(0x24),
            total_cycles: 0,
        }
    }

    /// Power-on register values, then jump through the reset vector
    pub fn reset(&mut self, bus: &mut impl Bus) -> Result<()> {
        self.registers = CpuRegisters::default();
        self.status = StatusFlags::from_bits(0x24);
        self.registers.pc = bus.read_word(RESET_VECTOR)?;
        self.total_cycles = RESET_CYCLES;
        debug!("reset vector ${:04X}", self.registers.pc);
        Ok(())
    }

    /// Get CPU registers
    pub fn registers(&self) -> &CpuRegisters {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut CpuRegisters {
        &mut self.registers
    }

    /// Get CPU status flags
    pub fn status(&self) -> &StatusFlags {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut StatusFlags {
        &mut self.status
    }

    /// Packed status register as PHP would see it, minus the break bit
    pub fn p_register(&self) -> u8 {
        self.status.bits()
    }

    /// Get total cycles executed
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    /// Charge cycles the CPU spent halted, e.g. during OAM DMA
    pub fn stall(&mut self, cycles: u16) {
        self.total_cycles += u64::from(cycles);
    }

    /// Execute one instruction, returning the cycles it took
    pub fn step(&mut self, bus: &mut impl Bus) -> Result<u8> {
        let pc = self.registers.pc;
        let opcode = bus.read(pc)?;
        let instruction = opcodes::lookup(opcode).ok_or(NesError::UnmappedOpcode { opcode, pc })?;

        let (operand, page_crossed) = self.resolve(instruction.mode, bus)?;
        self.registers.pc = pc.wrapping_add(instruction.len());

        let mut cycles = instruction.cycles;
        if instruction.mode.is_indexed()
            && (page_crossed || instruction.operation.access() != AccessKind::Read)
        {
            cycles += 1;
        }
        cycles += self.execute(instruction.operation, operand, bus)?;

        self.total_cycles += u64::from(cycles);
        Ok(cycles)
    }

    /// Non-maskable interrupt entry
    pub fn nmi(&mut self, bus: &mut impl Bus) -> Result<u8> {
        self.interrupt(bus, NMI_VECTOR)
    }

    /// Maskable interrupt entry; does nothing while interrupts are disabled
    pub fn irq(&mut self, bus: &mut impl Bus) -> Result<u8> {
        if self.status.interrupt_disable {
            return Ok(0);
        }
        self.interrupt(bus, IRQ_VECTOR)
    }

    fn interrupt(&mut self, bus: &mut impl Bus, vector: u16) -> Result<u8> {
        self.push_word(bus, self.registers.pc)?;
        self.push(bus, self.status.bits() | StatusFlags::BREAK)?;
        self.status.interrupt_disable = true;
        self.registers.pc = bus.read_word(vector)?;
        self.total_cycles += u64::from(INTERRUPT_CYCLES);
        Ok(INTERRUPT_CYCLES)
    }

    // === Addressing ===

    /// Effective operand for `mode`, with the page-cross flag for indexed modes.
    /// Reads the operand bytes following the opcode at PC.
    fn resolve(&mut self, mode: AddressingMode, bus: &mut impl Bus) -> Result<(Operand, bool)> {
        let arg = self.registers.pc.wrapping_add(1);
        let indexed = |base: u16, index: u8| {
            let address = base.wrapping_add(u16::from(index));
            (Operand::Address(address), (base ^ address) & 0xFF00 != 0)
        };

        let resolved = match mode {
            AddressingMode::Implied => (Operand::Implied, false),
            AddressingMode::Accumulator => (Operand::Accumulator, false),
            AddressingMode::Immediate => (Operand::Address(arg), false),
            AddressingMode::ZeroPage => (Operand::Address(u16::from(bus.read(arg)?)), false),
            AddressingMode::ZeroPageX => {
                let address = bus.read(arg)?.wrapping_add(self.registers.x);
                (Operand::Address(u16::from(address)), false)
            }
            AddressingMode::ZeroPageY => {
                let address = bus.read(arg)?.wrapping_add(self.registers.y);
                (Operand::Address(u16::from(address)), false)
            }
            AddressingMode::Absolute => (Operand::Address(bus.read_word(arg)?), false),
            AddressingMode::AbsoluteX => indexed(bus.read_word(arg)?, self.registers.x),
            AddressingMode::AbsoluteY => indexed(bus.read_word(arg)?, self.registers.y),
            AddressingMode::Indirect => {
                let pointer = bus.read_word(arg)?;
                // The high byte never carries into the next page
                let lo = bus.read(pointer)?;
                let hi = bus.read((pointer & 0xFF00) | (pointer.wrapping_add(1) & 0x00FF))?;
                (Operand::Address(u16::from_le_bytes([lo, hi])), false)
            }
            AddressingMode::IndirectX => {
                let zp = bus.read(arg)?.wrapping_add(self.registers.x);
                (Operand::Address(self.read_zero_page_word(bus, zp)?), false)
            }
            AddressingMode::IndirectY => {
                let zp = bus.read(arg)?;
                let base = self.read_zero_page_word(bus, zp)?;
                indexed(base, self.registers.y)
            }
            AddressingMode::Relative => {
                let offset = bus.read(arg)? as i8;
                let next = self.registers.pc.wrapping_add(2);
                (Operand::Address(next.wrapping_add(offset as u16)), false)
            }
        };
        Ok(resolved)
    }

    fn read_zero_page_word(&self, bus: &mut impl Bus, zp: u8) -> Result<u16> {
        let lo = bus.read(u16::from(zp))?;
        let hi = bus.read(u16::from(zp.wrapping_add(1)))?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    fn load(&self, operand: Operand, bus: &mut impl Bus) -> Result<u8> {
        match operand {
            Operand::Address(address) => bus.read(address),
            Operand::Accumulator | Operand::Implied => Ok(self.registers.a),
        }
    }

    fn store(&mut self, operand: Operand, value: u8, bus: &mut impl Bus) -> Result<()> {
        match operand {
            Operand::Address(address) => bus.write(address, value),
            Operand::Accumulator | Operand::Implied => {
                self.registers.a = value;
                Ok(())
            }
        }
    }

    fn target(operand: Operand) -> u16 {
        match operand {
            Operand::Address(address) => address,
            _ => 0,
        }
    }

    // === Execution ===

    /// Run `operation`, returning cycles beyond the table cost (branches only)
    fn execute(&mut self, operation: Operation, operand: Operand, bus: &mut impl Bus) -> Result<u8> {
        use Operation::*;

        match operation {
            Adc => {
                let value = self.load(operand, bus)?;
                self.adc(value);
            }
            Sbc => {
                let value = self.load(operand, bus)?;
                self.adc(!value);
            }
            And => {
                self.registers.a &= self.load(operand, bus)?;
                self.update_zero_negative(self.registers.a);
            }
            Ora => {
                self.registers.a |= self.load(operand, bus)?;
                self.update_zero_negative(self.registers.a);
            }
            Eor => {
                self.registers.a ^= self.load(operand, bus)?;
                self.update_zero_negative(self.registers.a);
            }
            Bit => {
                let value = self.load(operand, bus)?;
                self.status.zero = self.registers.a & value == 0;
                self.status.overflow = value & 0x40 != 0;
                self.status.negative = value & 0x80 != 0;
            }
            Cmp => {
                let value = self.load(operand, bus)?;
                self.compare(self.registers.a, value);
            }
            Cpx => {
                let value = self.load(operand, bus)?;
                self.compare(self.registers.x, value);
            }
            Cpy => {
                let value = self.load(operand, bus)?;
                self.compare(self.registers.y, value);
            }

            Asl | Lsr | Rol | Ror => {
                let value = self.load(operand, bus)?;
                let result = self.shift(operation, value);
                self.store(operand, result, bus)?;
                self.update_zero_negative(result);
            }
            Inc | Dec => {
                let value = self.load(operand, bus)?;
                let result = if operation == Inc {
                    value.wrapping_add(1)
                } else {
                    value.wrapping_sub(1)
                };
                self.store(operand, result, bus)?;
                self.update_zero_negative(result);
            }

            Bcc => return Ok(self.branch(!self.status.carry, operand)),
            Bcs => return Ok(self.branch(self.status.carry, operand)),
            Beq => return Ok(self.branch(self.status.zero, operand)),
            Bne => return Ok(self.branch(!self.status.zero, operand)),
            Bmi => return Ok(self.branch(self.status.negative, operand)),
            Bpl => return Ok(self.branch(!self.status.negative, operand)),
            Bvs => return Ok(self.branch(self.status.overflow, operand)),
            Bvc => return Ok(self.branch(!self.status.overflow, operand)),

            Brk => {
                // Return address skips the padding byte after BRK
                self.push_word(bus, self.registers.pc.wrapping_add(1))?;
                self.push(bus, self.status.bits() | StatusFlags::BREAK)?;
                self.status.interrupt_disable = true;
                self.registers.pc = bus.read_word(IRQ_VECTOR)?;
            }
            Jmp => self.registers.pc = Self::target(operand),
            Jsr => {
                self.push_word(bus, self.registers.pc.wrapping_sub(1))?;
                self.registers.pc = Self::target(operand);
            }
            Rts => self.registers.pc = self.pull_word(bus)?.wrapping_add(1),
            Rti => {
                self.pull_status(bus)?;
                self.registers.pc = self.pull_word(bus)?;
            }

            Clc => self.status.carry = false,
            Cld => self.status.decimal = false,
            Cli => self.status.interrupt_disable = false,
            Clv => self.status.overflow = false,
            Sec => self.status.carry = true,
            Sed => self.status.decimal = true,
            Sei => self.status.interrupt_disable = true,

            Lda => {
                self.registers.a = self.load(operand, bus)?;
                self.update_zero_negative(self.registers.a);
            }
            Ldx => {
                self.registers.x = self.load(operand, bus)?;
                self.update_zero_negative(self.registers.x);
            }
            Ldy => {
                self.registers.y = self.load(operand, bus)?;
                self.update_zero_negative(self.registers.y);
            }
            Sta => self.store(operand, self.registers.a, bus)?,
            Stx => self.store(operand, self.registers.x, bus)?,
            Sty => self.store(operand, self.registers.y, bus)?,

            Dex => {
                self.registers.x = self.registers.x.wrapping_sub(1);
                self.update_zero_negative(self.registers.x);
            }
            Dey => {
                self.registers.y = self.registers.y.wrapping_sub(1);
                self.update_zero_negative(self.registers.y);
            }
            Inx => {
                self.registers.x = self.registers.x.wrapping_add(1);
                self.update_zero_negative(self.registers.x);
            }
            Iny => {
                self.registers.y = self.registers.y.wrapping_add(1);
                self.update_zero_negative(self.registers.y);
            }
            Tax => {
                self.registers.x = self.registers.a;
                self.update_zero_negative(self.registers.x);
            }
            Tay => {
                self.registers.y = self.registers.a;
                self.update_zero_negative(self.registers.y);
            }
            Tsx => {
                self.registers.x = self.registers.sp;
                self.update_zero_negative(self.registers.x);
            }
            Txa => {
                self.registers.a = self.registers.x;
                self.update_zero_negative(self.registers.a);
            }
            Tya => {
                self.registers.a = self.registers.y;
                self.update_zero_negative(self.registers.a);
            }
            Txs => self.registers.sp = self.registers.x,

            Pha => self.push(bus, self.registers.a)?,
            Php => self.push(bus, self.status.bits() | StatusFlags::BREAK)?,
            Pla => {
                self.registers.a = self.pull(bus)?;
                self.update_zero_negative(self.registers.a);
            }
            Plp => self.pull_status(bus)?,

            Nop => {
                // Multi-byte NOPs still perform their read
                if let Operand::Address(address) = operand {
                    bus.read(address)?;
                }
            }

            Lax => {
                let value = self.load(operand, bus)?;
                self.registers.a = value;
                self.registers.x = value;
                self.update_zero_negative(value);
            }
            Sax => self.store(operand, self.registers.a & self.registers.x, bus)?,
            Dcp => {
                let value = self.load(operand, bus)?.wrapping_sub(1);
                self.store(operand, value, bus)?;
                self.compare(self.registers.a, value);
            }
            Isb => {
                let value = self.load(operand, bus)?.wrapping_add(1);
                self.store(operand, value, bus)?;
                self.adc(!value);
            }
            Slo | Rla | Sre | Rra => {
                let value = self.load(operand, bus)?;
                let (shift, combine) = match operation {
                    Slo => (Asl, Ora),
                    Rla => (Rol, And),
                    Sre => (Lsr, Eor),
                    _ => (Ror, Adc),
                };
                let result = self.shift(shift, value);
                self.store(operand, result, bus)?;
                match combine {
                    Ora => self.registers.a |= result,
                    And => self.registers.a &= result,
                    Eor => self.registers.a ^= result,
                    _ => self.adc(result),
                }
                self.update_zero_negative(self.registers.a);
            }
        }
        Ok(0)
    }

    fn update_zero_negative(&mut self, value: u8) {
        self.status.zero = value == 0;
        self.status.negative = value & 0x80 != 0;
    }

    /// Binary add with carry; SBC feeds the ones' complement through here
    fn adc(&mut self, value: u8) {
        let a = self.registers.a;
        let sum = u16::from(a) + u16::from(value) + u16::from(self.status.carry);
        let result = sum as u8;
        self.status.carry = sum > 0xFF;
        self.status.overflow = (a ^ result) & (value ^ result) & 0x80 != 0;
        self.registers.a = result;
        self.update_zero_negative(result);
    }

    fn compare(&mut self, register: u8, value: u8) {
        self.status.carry = register >= value;
        self.update_zero_negative(register.wrapping_sub(value));
    }

    /// ASL/LSR/ROL/ROR on a value, updating carry
    fn shift(&mut self, operation: Operation, value: u8) -> u8 {
        let carry_in = u8::from(self.status.carry);
        let (result, carry_out) = match operation {
            Operation::Asl => (value << 1, value & 0x80 != 0),
            Operation::Rol => ((value << 1) | carry_in, value & 0x80 != 0),
            Operation::Lsr => (value >> 1, value & 0x01 != 0),
            _ => ((value >> 1) | (carry_in << 7), value & 0x01 != 0),
        };
        self.status.carry = carry_out;
        result
    }

    /// Take the branch if `condition` holds; +1 cycle, +2 across a page
    fn branch(&mut self, condition: bool, operand: Operand) -> u8 {
        if !condition {
            return 0;
        }
        let target = Self::target(operand);
        let extra = if (self.registers.pc ^ target) & 0xFF00 != 0 { 2 } else { 1 };
        self.registers.pc = target;
        extra
    }

    // === Stack ===

    pub fn push(&mut self, bus: &mut impl Bus, value: u8) -> Result<()> {
        bus.write(STACK_BASE | u16::from(self.registers.sp), value)?;
        self.registers.sp = self.registers.sp.wrapping_sub(1);
        Ok(())
    }

    pub fn pull(&mut self, bus: &mut impl Bus) -> Result<u8> {
        self.registers.sp = self.registers.sp.wrapping_add(1);
        bus.read(STACK_BASE | u16::from(self.registers.sp))
    }

    /// High byte first, so the low byte ends up on top
    pub fn push_word(&mut self, bus: &mut impl Bus, value: u16) -> Result<()> {
        let [lo, hi] = value.to_le_bytes();
        self.push(bus, hi)?;
        self.push(bus, lo)
    }

    pub fn pull_word(&mut self, bus: &mut impl Bus) -> Result<u16> {
        let lo = self.pull(bus)?;
        let hi = self.pull(bus)?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    fn pull_status(&mut self, bus: &mut impl Bus) -> Result<()> {
        let mut status = StatusFlags::from_bits(self.pull(bus)?);
        status.break_command = false;
        self.status = status;
        Ok(())
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}
