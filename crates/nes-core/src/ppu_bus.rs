//! PPU-side bus
//!
//! The PPU's private 14-bit address space:
//! $0000-$1FFF - Pattern tables (cartridge CHR ROM, read-only)
//! $2000-$2FFF - Name tables, folded by the cartridge's mirroring mode
//! $3000-$3EFF - Mirror of $2000-$2EFF
//! $3F00-$3FFF - Palette RAM (32 entries, repeating)

use std::rc::Rc;

use crate::cartridge::{Cartridge, Mirroring};
use crate::error::{Access, BusKind, NesError, Result};
use crate::memory::Ram;

/// Name table RAM, large enough for four-screen cartridges
pub const NAME_TABLE_RAM_SIZE: usize = 0x1000;

/// One logical name table including its attribute table
pub const NAME_TABLE_SIZE: usize = 0x400;

/// One pattern table
pub const PATTERN_TABLE_SIZE: usize = 0x1000;

pub const PALETTE_SIZE: usize = 32;

/// Fold a $2000-$2FFF address onto the physical name tables
pub fn mirror_name_table(address: u16, mirroring: Mirroring) -> u16 {
    match mirroring {
        Mirroring::Horizontal => {
            (address & 0x23FF) | if address & 0x0800 != 0 { 0x0400 } else { 0 }
        }
        Mirroring::Vertical => address & 0x27FF,
        Mirroring::FourScreen => address,
    }
}

/// Palette RAM slot for a $3F00-$3FFF address.
///
/// Entry 0 of each sprite palette ($3F10/$3F14/$3F18/$3F1C) is shared with
/// the matching background entry.
pub fn palette_index(address: u16) -> usize {
    let index = (address & 0x1F) as usize;
    if index >= 0x10 && index & 0x03 == 0 {
        index - 0x10
    } else {
        index
    }
}

#[derive(Debug, Clone)]
pub struct PpuBus {
    name_tables: Ram,
    palettes: Ram,
    cartridge: Rc<Cartridge>,
}

impl PpuBus {
    pub fn new(cartridge: Rc<Cartridge>) -> Self {
        Self {
            name_tables: Ram::new(NAME_TABLE_RAM_SIZE),
            palettes: Ram::new(PALETTE_SIZE),
            cartridge,
        }
    }

    pub fn mirroring(&self) -> Mirroring {
        self.cartridge.mirroring()
    }

    pub fn read(&self, address: u16) -> Result<u8> {
        let address = address & 0x3FFF;
        match address {
            0x3F00..=0x3FFF => Ok(self.palettes.read(palette_index(address))),
            0x3000..=0x3EFF => self.read(address - 0x1000),
            0x2000..=0x2FFF => Ok(self.name_tables.read(self.name_table_offset(address))),
            _ => self.cartridge.read_chr(address).ok_or(NesError::AddressViolation {
                bus: BusKind::Ppu,
                access: Access::Read,
                address,
            }),
        }
    }

    pub fn write(&mut self, address: u16, value: u8) -> Result<()> {
        let address = address & 0x3FFF;
        match address {
            0x3F00..=0x3FFF => self.palettes.write(palette_index(address), value),
            0x3000..=0x3EFF => return self.write(address - 0x1000, value),
            0x2000..=0x2FFF => {
                let offset = self.name_table_offset(address);
                self.name_tables.write(offset, value);
            }
            _ => {
                return Err(NesError::Unimplemented {
                    region: "pattern ROM",
                    access: Access::Write,
                    address,
                })
            }
        }
        Ok(())
    }

    /// The 1KB name table (attributes included) that `base` selects
    pub fn read_name_table(&self, base: u16) -> &[u8] {
        let base = 0x2000 | (base & 0x0C00);
        self.name_tables
            .slice(self.name_table_offset(base), NAME_TABLE_SIZE)
    }

    /// The 4KB pattern table at `base` ($0000 or $1000)
    pub fn read_pattern_table(&self, base: u16) -> Result<&[u8]> {
        let start = (base & 0x1000) as usize;
        self.cartridge
            .chr_rom()
            .get(start..start + PATTERN_TABLE_SIZE)
            .ok_or(NesError::AddressViolation {
                bus: BusKind::Ppu,
                access: Access::Read,
                address: start as u16,
            })
    }

    /// Palette entry without going through the address decoder
    #[inline]
    pub fn palette(&self, index: usize) -> u8 {
        self.palettes.read(palette_index(index as u16))
    }

    fn name_table_offset(&self, address: u16) -> usize {
        (mirror_name_table(address, self.mirroring()) - 0x2000) as usize
    }
}
