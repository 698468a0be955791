//! NES System Integration
//!
//! Owns the CPU, the PPU and both buses, and clocks them in lockstep: one CPU
//! instruction, then three PPU dots per CPU cycle, then any interrupt the PPU
//! raised meanwhile.

use std::path::Path;
use std::rc::Rc;

use log::{debug, log_enabled, trace, Level};

use crate::bus::{Bus, CpuView, InterruptLine};
use crate::cartridge::Cartridge;
use crate::controller::Button;
use crate::cpu::{Bus as CpuBus, Cpu, RESET_CYCLES};
use crate::error::{NesError, Result};
use crate::ppu::{Ppu, DOTS_PER_SCANLINE, SCANLINES_PER_FRAME};
use crate::ppu_bus::PpuBus;
use crate::trace;

/// PPU dots per CPU cycle (NTSC)
pub const PPU_TICKS_PER_CPU_CYCLE: u64 = 3;

/// CPU cycles in one frame, rounded up
pub const CPU_CYCLES_PER_FRAME: u64 =
    (DOTS_PER_SCANLINE as u64 * SCANLINES_PER_FRAME as u64 + PPU_TICKS_PER_CPU_CYCLE - 1)
        / PPU_TICKS_PER_CPU_CYCLE;

/// NES System - integrates all components
#[derive(Debug, Clone)]
pub struct NesSystem {
    cpu: Cpu,
    ppu: Ppu,
    bus: Bus,
    vram: PpuBus,
    interrupts: InterruptLine,
}

impl NesSystem {
    /// Insert a cartridge and power on
    pub fn new(cartridge: Cartridge) -> Result<Self> {
        let cartridge = Rc::new(cartridge);
        let mut system = Self {
            cpu: Cpu::new(),
            ppu: Ppu::new(),
            bus: Bus::new(Rc::clone(&cartridge)),
            vram: PpuBus::new(cartridge),
            interrupts: InterruptLine::default(),
        };
        system.reset()?;
        Ok(system)
    }

    /// Load an iNES file and power on
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(Cartridge::open(path)?)
    }

    /// Reset the NES system
    pub fn reset(&mut self) -> Result<()> {
        self.ppu.reset();
        self.interrupts = InterruptLine::default();
        self.bus.take_dma_stall(0);

        let (cpu, mut view) = self.split();
        cpu.reset(&mut view)?;
        // The reset sequence runs the PPU too
        self.tick_ppu(RESET_CYCLES)
    }

    /// Step the system by one instruction, returning the CPU cycles spent
    /// including DMA stalls and interrupt entry
    pub fn step(&mut self) -> Result<u16> {
        if log_enabled!(Level::Trace) {
            trace!("{}", self.trace_line());
        }

        let (cpu, mut view) = self.split();
        let mut cycles = u16::from(cpu.step(&mut view)?);

        // DMA parity follows the cycle the $4014 write lands on
        let stall = self.bus.take_dma_stall(self.cpu.total_cycles());
        if stall > 0 {
            self.cpu.stall(stall);
            cycles += stall;
        }
        self.tick_ppu(u64::from(cycles))?;

        if self.interrupts.take_nmi() {
            debug!("NMI at ${:04X}", self.cpu.registers().pc);
            let (cpu, mut view) = self.split();
            let entry = cpu.nmi(&mut view)?;
            self.tick_ppu(u64::from(entry))?;
            cycles += u16::from(entry);
        } else if self.interrupts.irq_pending() && !self.cpu.status().interrupt_disable {
            let (cpu, mut view) = self.split();
            let entry = cpu.irq(&mut view)?;
            self.tick_ppu(u64::from(entry))?;
            cycles += u16::from(entry);
        }

        Ok(cycles)
    }

    /// Run `count` instructions, returning the cycles spent
    pub fn run_instructions(&mut self, count: u64) -> Result<u64> {
        let mut cycles = 0;
        for _ in 0..count {
            cycles += u64::from(self.step()?);
        }
        Ok(cycles)
    }

    /// Run until the PPU completes a frame
    pub fn run_frame(&mut self) -> Result<()> {
        let start = self.ppu.frame_count();
        let limit = 2 * CPU_CYCLES_PER_FRAME;
        let mut spent = 0u64;
        while self.ppu.frame_count() == start {
            if spent > limit {
                return Err(NesError::Stalled { cycles: spent });
            }
            spent += u64::from(self.step()?);
        }
        Ok(())
    }

    /// Run for N frames
    pub fn run_frames(&mut self, frames: u64) -> Result<()> {
        for _ in 0..frames {
            self.run_frame()?;
        }
        Ok(())
    }

    /// Trace line for the next instruction
    pub fn trace_line(&self) -> String {
        trace::format_line(&self.cpu, self.ppu.scanline(), self.ppu.dot(), |address| {
            self.bus.peek(address).unwrap_or(0)
        })
    }

    /// Drive the IRQ line; it stays at `level` until changed
    pub fn set_irq(&mut self, level: bool) {
        self.interrupts.set_irq(level);
    }

    pub fn press(&mut self, button: Button) {
        self.bus.controller_mut().press(button);
    }

    pub fn release(&mut self, button: Button) {
        self.bus.controller_mut().release(button);
    }

    /// Last completed frame, 256x240 RGB
    pub fn frame(&self) -> &[u8] {
        self.ppu.frame()
    }

    /// True once for each newly completed frame
    pub fn take_frame_ready(&mut self) -> bool {
        self.ppu.take_frame_ready()
    }

    /// Get frame count
    pub fn frame_count(&self) -> u64 {
        self.ppu.frame_count()
    }

    /// Get CPU reference
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// Get mutable CPU reference
    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    /// Get PPU reference
    pub fn ppu(&self) -> &Ppu {
        &self.ppu
    }

    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// PPU address space
    pub fn vram(&self) -> &PpuBus {
        &self.vram
    }

    pub fn interrupts(&self) -> &InterruptLine {
        &self.interrupts
    }

    pub fn cartridge(&self) -> &Cartridge {
        self.bus.cartridge()
    }

    /// Read a byte through the CPU bus, side effects included
    pub fn read_memory(&mut self, address: u16) -> Result<u8> {
        self.split().1.read(address)
    }

    /// Write a byte through the CPU bus
    pub fn write_memory(&mut self, address: u16, value: u8) -> Result<()> {
        self.split().1.write(address, value)
    }

    fn split(&mut self) -> (&mut Cpu, CpuView<'_>) {
        (
            &mut self.cpu,
            CpuView::new(&mut self.bus, &mut self.ppu, &mut self.vram, &mut self.interrupts),
        )
    }

    fn tick_ppu(&mut self, cpu_cycles: u64) -> Result<()> {
        for _ in 0..cpu_cycles * PPU_TICKS_PER_CPU_CYCLE {
            self.ppu.tick(&self.vram, &mut self.interrupts)?;
        }
        Ok(())
    }
}
