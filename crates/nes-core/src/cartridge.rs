//! Cartridge loading
//!
//! Parses iNES images. Only mapper 0 (NROM) is accepted: program and pattern
//! data are fixed and read-only from the core's point of view.

use std::fs;
use std::path::Path;

use log::info;
use thiserror::Error;

use crate::error::NesError;

/// iNES header size
pub const HEADER_SIZE: usize = 16;

/// Trainer block size (skipped when present)
pub const TRAINER_SIZE: usize = 512;

/// PRG ROM bank size
pub const PRG_BANK_SIZE: usize = 16 * 1024;

/// CHR ROM bank size
pub const CHR_BANK_SIZE: usize = 8 * 1024;

/// SRAM bank size
pub const SRAM_BANK_SIZE: usize = 8 * 1024;

const MAGIC: [u8; 4] = [b'N', b'E', b'S', 0x1A];

/// Name table mirroring wired by the cartridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirroring {
    Horizontal,
    Vertical,
    FourScreen,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartridgeError {
    #[error("missing NES<EOF> magic")]
    BadMagic,
    #[error("image is {actual} bytes, header describes {expected}")]
    Truncated { expected: usize, actual: usize },
    #[error("mapper {0} is not supported (only NROM)")]
    UnsupportedMapper(u8),
    #[error("image has no PRG ROM")]
    MissingProgramRom,
}

/// iNES header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InesHeader {
    /// PRG ROM size in 16KB units
    pub prg_banks: u8,
    /// CHR ROM size in 8KB units
    pub chr_banks: u8,
    pub flags_6: u8,
    pub flags_7: u8,
    /// SRAM size in 8KB units, 0 meaning 1
    pub sram_banks: u8,
}

impl InesHeader {
    /// Parse an iNES header from bytes
    pub fn parse(bytes: &[u8]) -> Result<Self, CartridgeError> {
        if bytes.len() < HEADER_SIZE {
            return Err(CartridgeError::Truncated {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }
        if bytes[0..4] != MAGIC {
            return Err(CartridgeError::BadMagic);
        }

        Ok(Self {
            prg_banks: bytes[4],
            chr_banks: bytes[5],
            flags_6: bytes[6],
            flags_7: bytes[7],
            sram_banks: bytes[8].max(1),
        })
    }

    pub fn mapper_number(&self) -> u8 {
        (self.flags_7 & 0xF0) | (self.flags_6 >> 4)
    }

    pub fn mirroring(&self) -> Mirroring {
        if self.flags_6 & 0x08 != 0 {
            Mirroring::FourScreen
        } else if self.flags_6 & 0x01 != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        }
    }

    pub fn has_battery(&self) -> bool {
        self.flags_6 & 0x02 != 0
    }

    pub fn has_trainer(&self) -> bool {
        self.flags_6 & 0x04 != 0
    }

    /// Total image size this header describes
    pub fn image_len(&self) -> usize {
        let trainer = if self.has_trainer() { TRAINER_SIZE } else { 0 };
        HEADER_SIZE
            + trainer
            + self.prg_banks as usize * PRG_BANK_SIZE
            + self.chr_banks as usize * CHR_BANK_SIZE
    }
}

/// An NROM cartridge
#[derive(Debug, Clone)]
pub struct Cartridge {
    header: InesHeader,
    prg_rom: Vec<u8>,
    chr_rom: Vec<u8>,
    /// 0x3FFF for a single mirrored 16KB bank, 0x7FFF for 32KB
    prg_mask: usize,
}

impl Cartridge {
    /// Build a cartridge from an iNES image
    pub fn from_bytes(rom_data: &[u8]) -> Result<Self, CartridgeError> {
        let header = InesHeader::parse(rom_data)?;

        let mapper = header.mapper_number();
        if mapper != 0 {
            return Err(CartridgeError::UnsupportedMapper(mapper));
        }
        if header.prg_banks == 0 {
            return Err(CartridgeError::MissingProgramRom);
        }
        if rom_data.len() < header.image_len() {
            return Err(CartridgeError::Truncated {
                expected: header.image_len(),
                actual: rom_data.len(),
            });
        }

        let mut offset = HEADER_SIZE;
        if header.has_trainer() {
            offset += TRAINER_SIZE;
        }

        let prg_len = header.prg_banks as usize * PRG_BANK_SIZE;
        let prg_rom = rom_data[offset..offset + prg_len].to_vec();
        offset += prg_len;

        let chr_len = header.chr_banks as usize * CHR_BANK_SIZE;
        let chr_rom = rom_data[offset..offset + chr_len].to_vec();

        let prg_mask = if header.prg_banks == 1 { 0x3FFF } else { 0x7FFF };

        Ok(Self {
            header,
            prg_rom,
            chr_rom,
            prg_mask,
        })
    }

    /// Read an iNES file from disk
    pub fn open(path: impl AsRef<Path>) -> Result<Self, NesError> {
        let path = path.as_ref();
        let data = fs::read(path).map_err(|source| NesError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cartridge = Self::from_bytes(&data)?;
        info!(
            "loaded {}: PRG {} KiB, CHR {} KiB, {:?} mirroring, mapper {}",
            path.display(),
            cartridge.prg_rom.len() / 1024,
            cartridge.chr_rom.len() / 1024,
            cartridge.mirroring(),
            cartridge.mapper_number()
        );
        Ok(cartridge)
    }

    pub fn header(&self) -> &InesHeader {
        &self.header
    }

    pub fn prg_rom(&self) -> &[u8] {
        &self.prg_rom
    }

    pub fn chr_rom(&self) -> &[u8] {
        &self.chr_rom
    }

    pub fn mirroring(&self) -> Mirroring {
        self.header.mirroring()
    }

    pub fn mapper_number(&self) -> u8 {
        self.header.mapper_number()
    }

    pub fn sram_banks(&self) -> usize {
        self.header.sram_banks as usize
    }

    pub fn has_battery(&self) -> bool {
        self.header.has_battery()
    }

    /// Read program ROM. `offset` is relative to $8000.
    #[inline]
    pub fn read_prg(&self, offset: u16) -> u8 {
        // 32KB images fill the window; 16KB images repeat in both halves
        self.prg_rom[offset as usize & self.prg_mask]
    }

    /// Read pattern data, `None` past the end of CHR ROM
    #[inline]
    pub fn read_chr(&self, address: u16) -> Option<u8> {
        self.chr_rom.get(address as usize).copied()
    }
}
