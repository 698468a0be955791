//! Memory bus and mapping
//!
//! The NES memory map, decoded from the top down:
//! $8000-$FFFF - Cartridge PRG ROM
//! $6000-$7FFF - Cartridge SRAM
//! $4020-$5FFF - Cartridge expansion (not supported)
//! $4000-$401F - APU and I/O registers ($4014 OAM DMA, $4016 controller)
//! $2000-$3FFF - PPU registers (mirrored every $08 bytes)
//! $0000-$1FFF - 2KB Internal RAM (mirrored every $0800 bytes)
//!
//! [`Bus`] owns the CPU-side memory. The PPU registers live in [`Ppu`], so
//! the CPU sees the whole map through a [`CpuView`] that borrows both for the
//! length of one instruction.

use std::rc::Rc;

use log::debug;

use crate::cartridge::{Cartridge, SRAM_BANK_SIZE};
use crate::controller::StandardController;
use crate::cpu::Bus as CpuBus;
use crate::error::{Access, NesError, Result};
use crate::memory::Ram;
use crate::ppu::{Ppu, OAM_SIZE};
use crate::ppu_bus::PpuBus;

/// RAM size in bytes
pub const RAM_SIZE: usize = 2048; // 2KB

/// APU/IO register block size
pub const IO_REGISTER_COUNT: usize = 0x20;

pub const OAM_DMA: u16 = 0x4014;
pub const JOYPAD_1: u16 = 0x4016;

/// CPU cycles an OAM DMA takes when started on an even cycle
pub const DMA_STALL_CYCLES: u16 = 513;

/// Interrupt requests waiting for the CPU.
///
/// Owned by the driver. The PPU raises `nmi`, the driver takes it between
/// instructions. `irq` is level-held until whoever asserted it clears it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterruptLine {
    nmi: bool,
    irq: bool,
}

impl InterruptLine {
    pub fn raise_nmi(&mut self) {
        self.nmi = true;
    }

    /// Consume a pending NMI
    pub fn take_nmi(&mut self) -> bool {
        std::mem::take(&mut self.nmi)
    }

    pub fn nmi_pending(&self) -> bool {
        self.nmi
    }

    pub fn set_irq(&mut self, level: bool) {
        self.irq = level;
    }

    pub fn irq_pending(&self) -> bool {
        self.irq
    }
}

/// CPU-side memory: work RAM, SRAM, the I/O register file, the controller
/// and the cartridge's program ROM.
#[derive(Debug, Clone)]
pub struct Bus {
    ram: Ram,
    sram: Ram,
    io: Ram,
    controller: StandardController,
    cartridge: Rc<Cartridge>,
    /// Set when the last instruction wrote $4014
    dma_pending: bool,
}

impl Bus {
    pub fn new(cartridge: Rc<Cartridge>) -> Self {
        Self {
            ram: Ram::new(RAM_SIZE),
            sram: Ram::new(cartridge.sram_banks() * SRAM_BANK_SIZE),
            io: Ram::new(IO_REGISTER_COUNT),
            controller: StandardController::new(),
            cartridge,
            dma_pending: false,
        }
    }

    pub fn cartridge(&self) -> &Rc<Cartridge> {
        &self.cartridge
    }

    pub fn controller(&self) -> &StandardController {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut StandardController {
        &mut self.controller
    }

    pub fn ram(&self) -> &[u8] {
        self.ram.as_slice()
    }

    pub fn sram(&self) -> &[u8] {
        self.sram.as_slice()
    }

    /// Stall cycles owed for a pending DMA, cleared on read. `write_cycle`
    /// is the CPU cycle count once the triggering instruction has finished.
    pub fn take_dma_stall(&mut self, write_cycle: u64) -> u16 {
        if std::mem::take(&mut self.dma_pending) {
            DMA_STALL_CYCLES + u16::from(write_cycle % 2 == 1)
        } else {
            0
        }
    }

    /// Read without side effects. `None` for PPU registers, the controller
    /// port and expansion space, where a read would change state or fail.
    pub fn peek(&self, address: u16) -> Option<u8> {
        match address {
            0x8000..=0xFFFF => Some(self.cartridge.read_prg(address - 0x8000)),
            0x6000..=0x7FFF => Some(self.sram.read(usize::from(address - 0x6000))),
            0x4020..=0x5FFF | JOYPAD_1 | 0x2000..=0x3FFF => None,
            0x4000..=0x401F => Some(self.io.read(usize::from(address - 0x4000))),
            _ => Some(self.ram.read(usize::from(address & 0x07FF))),
        }
    }
}

/// The full CPU address space for one instruction
pub struct CpuView<'a> {
    bus: &'a mut Bus,
    ppu: &'a mut Ppu,
    vram: &'a mut PpuBus,
    line: &'a mut InterruptLine,
}

impl<'a> CpuView<'a> {
    pub fn new(
        bus: &'a mut Bus,
        ppu: &'a mut Ppu,
        vram: &'a mut PpuBus,
        line: &'a mut InterruptLine,
    ) -> Self {
        Self {
            bus,
            ppu,
            vram,
            line,
        }
    }

    /// Copy one CPU page into OAM
    fn oam_dma(&mut self, page: u8) -> Result<()> {
        let base = u16::from(page) << 8;
        let mut data = [0u8; OAM_SIZE];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = self.read(base + i as u16)?;
        }
        self.ppu.write_oam_dma(&data);

        self.bus.dma_pending = true;
        debug!("OAM DMA from ${:04X}", base);
        Ok(())
    }

    fn unimplemented(region: &'static str, access: Access, address: u16) -> NesError {
        NesError::Unimplemented {
            region,
            access,
            address,
        }
    }
}

impl CpuBus for CpuView<'_> {
    fn read(&mut self, address: u16) -> Result<u8> {
        match address {
            0x8000..=0xFFFF => Ok(self.bus.cartridge.read_prg(address - 0x8000)),
            0x6000..=0x7FFF => Ok(self.bus.sram.read(usize::from(address - 0x6000))),
            0x4020..=0x5FFF => Err(Self::unimplemented("expansion ROM", Access::Read, address)),
            JOYPAD_1 => Ok(self.bus.controller.read()),
            0x4000..=0x401F => Ok(self.bus.io.read(usize::from(address - 0x4000))),
            0x2000..=0x3FFF => self.ppu.read_register(address & 0x2007, self.vram),
            _ => Ok(self.bus.ram.read(usize::from(address & 0x07FF))),
        }
    }

    fn write(&mut self, address: u16, value: u8) -> Result<()> {
        match address {
            0x8000..=0xFFFF => return Err(Self::unimplemented("mapper", Access::Write, address)),
            0x6000..=0x7FFF => self.bus.sram.write(usize::from(address - 0x6000), value),
            0x4020..=0x5FFF => {
                return Err(Self::unimplemented("expansion ROM", Access::Write, address))
            }
            OAM_DMA => {
                self.bus.io.write(usize::from(address - 0x4000), value);
                return self.oam_dma(value);
            }
            JOYPAD_1 => self.bus.controller.write(value),
            0x4000..=0x401F => self.bus.io.write(usize::from(address - 0x4000), value),
            0x2000..=0x3FFF => {
                return self
                    .ppu
                    .write_register(address & 0x2007, value, self.vram, self.line)
            }
            _ => self.bus.ram.write(usize::from(address & 0x07FF), value),
        }
        Ok(())
    }
}
