//! Fatal error taxonomy shared by every component.
//!
//! None of these are recoverable: CPU and PPU state only means something as an
//! unbroken cycle sequence, so the driver stops at the first error.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::cartridge::CartridgeError;

/// Which router rejected an access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    Cpu,
    Ppu,
}

/// Direction of a bus access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl fmt::Display for BusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusKind::Cpu => f.write_str("CPU"),
            BusKind::Ppu => f.write_str("PPU"),
        }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Read => f.write_str("read"),
            Access::Write => f.write_str("write"),
        }
    }
}

#[derive(Debug, Error)]
pub enum NesError {
    /// Bad or unsupported ROM image
    #[error("invalid ROM image: {0}")]
    Cartridge(#[from] CartridgeError),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An access no decoder accepts. Always an emulator bug.
    #[error("{bus} bus {access} at ${address:04X} is outside every decoded range")]
    AddressViolation {
        bus: BusKind,
        access: Access,
        address: u16,
    },

    /// A region the emulator knows about but does not implement
    #[error("{region} {access} at ${address:04X} is not supported")]
    Unimplemented {
        region: &'static str,
        access: Access,
        address: u16,
    },

    #[error("unmapped opcode ${opcode:02X} at ${pc:04X}")]
    UnmappedOpcode { opcode: u8, pc: u16 },

    /// The PPU never finished a frame within the CPU cycle budget
    #[error("no frame completed after {cycles} CPU cycles")]
    Stalled { cycles: u64 },
}

pub type Result<T> = std::result::Result<T, NesError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_diagnostics() {
        let err = NesError::UnmappedOpcode { opcode: 0x02, pc: 0xC123 };
        assert_eq!(err.to_string(), "unmapped opcode $02 at $C123");

        let err = NesError::Unimplemented {
            region: "expansion ROM",
            access: Access::Read,
            address: 0x4020,
        };
        assert_eq!(err.to_string(), "expansion ROM read at $4020 is not supported");

        let err = NesError::AddressViolation {
            bus: BusKind::Ppu,
            access: Access::Read,
            address: 0x1FFF,
        };
        assert_eq!(
            err.to_string(),
            "PPU bus read at $1FFF is outside every decoded range"
        );
    }

    #[test]
    fn test_cartridge_error_converts() {
        let err: NesError = CartridgeError::UnsupportedMapper(4).into();
        assert!(matches!(err, NesError::Cartridge(CartridgeError::UnsupportedMapper(4))));
    }
}
