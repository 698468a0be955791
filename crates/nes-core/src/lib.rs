//! NES Core - Pure Rust NES emulator library
//!
//! Cycle-stepped emulation of the NTSC console with NROM cartridges: the
//! 2A03 CPU, the 2C02 PPU, both address spaces and the standard controller.
//! Frontends drive it through [`system::NesSystem`].

#![forbid(unsafe_code)]

/// CPU module containing the 2A03 (6502 variant) implementation
pub mod cpu;
/// 256-entry opcode table
pub mod opcodes;
/// Memory bus and mapping
pub mod bus;
/// PPU (Picture Processing Unit) implementation
pub mod ppu;
/// PPU address space: pattern tables, name tables, palette
pub mod ppu_bus;
/// 2C02 colour palette
pub mod palette;
/// RAM-like byte arrays
pub mod memory;
/// Cartridge loading
pub mod cartridge;
/// Standard controller
pub mod controller;
/// Integration module for complete NES system
pub mod system;
/// nestest-style trace lines
pub mod trace;
/// Fatal error taxonomy
pub mod error;

pub use error::{NesError, Result};
