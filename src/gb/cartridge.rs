use crate::gb::error::{GbError, GbResult};

const HEADER_LOGO_BYTE: usize = 0x0104;
const HEADER_LOGO_FIRST_BYTE: u8 = 0xCE;
const HEADER_TITLE_START: usize = 0x0134;
const HEADER_TITLE_END: usize = 0x0143;
const HEADER_TYPE: usize = 0x0147;
const HEADER_ROM_SIZE: usize = 0x0148;
const HEADER_CHECKSUM_START: usize = 0x0134;
const HEADER_CHECKSUM_END: usize = 0x014C;
const HEADER_CHECKSUM_BYTE: usize = 0x014D;

const ROM_SIZE: usize = 0x8000;

/// The cartridge controller types this core recognizes in the header. Only
/// [`ControllerType::NoMbc`] is supported for execution; anything else is
/// rejected at load time (MBC banking is out of scope, spec.md §1).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControllerType {
    NoMbc,
    Other(u8),
}

impl From<u8> for ControllerType {
    fn from(value: u8) -> Self {
        match value {
            0x00 => ControllerType::NoMbc,
            other => ControllerType::Other(other),
        }
    }
}

/// A loaded ROM image: the raw bytes plus the header metadata this core
/// validates and exposes for diagnostics.
pub struct Cartridge {
    rom: [u8; ROM_SIZE],
    title: String,
    controller_type: ControllerType,
}

impl Cartridge {
    /// Validates and loads a ROM image. `bytes` must be no larger than
    /// 32 KiB; shorter images are zero-padded. Rejects any cartridge whose
    /// first Nintendo-logo byte at 0x0104 is not 0xCE, whose type byte is
    /// not 0x00 (no MBC), or whose ROM-size byte is not 0x00 (32 KiB), per
    /// spec.md §6. A header checksum mismatch is logged, not rejected -
    /// real hardware boots cartridges with bad checksums too.
    pub fn load(bytes: &[u8]) -> GbResult<Self> {
        if bytes.len() > ROM_SIZE {
            return Err(GbError::RomLoad(format!(
                "ROM is {} bytes, exceeds the 32 KiB (no-MBC) limit",
                bytes.len()
            )));
        }
        if bytes.len() <= HEADER_CHECKSUM_BYTE {
            return Err(GbError::RomLoad(
                "ROM is too short to contain a cartridge header".to_string(),
            ));
        }
        if bytes[HEADER_LOGO_BYTE] != HEADER_LOGO_FIRST_BYTE {
            return Err(GbError::RomLoad(format!(
                "invalid Nintendo logo byte {:#04x} at {:#06x}, not a valid cartridge",
                bytes[HEADER_LOGO_BYTE], HEADER_LOGO_BYTE
            )));
        }

        let controller_type = ControllerType::from(bytes[HEADER_TYPE]);
        if controller_type != ControllerType::NoMbc {
            return Err(GbError::RomLoad(format!(
                "unsupported cartridge type byte {:#04x}, only MBC-less (0x00) cartridges are supported",
                bytes[HEADER_TYPE]
            )));
        }
        if bytes[HEADER_ROM_SIZE] != 0x00 {
            return Err(GbError::RomLoad(format!(
                "unsupported ROM size byte {:#04x}, only 32 KiB (0x00) is supported",
                bytes[HEADER_ROM_SIZE]
            )));
        }

        let mut rom = [0u8; ROM_SIZE];
        rom[..bytes.len()].copy_from_slice(bytes);

        let title = parse_title(&rom[HEADER_TITLE_START..=HEADER_TITLE_END]);
        if !verify_checksum(&rom) {
            println!(
                "warning: cartridge \"{}\" failed its header checksum, loading anyway",
                title
            );
        }

        Ok(Self { rom, title, controller_type })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn controller_type(&self) -> ControllerType {
        self.controller_type
    }

    #[inline]
    pub fn read(&self, address: u16) -> u8 {
        self.rom[address as usize]
    }
}

/// Filters the 16-byte title field down to its ASCII-alphanumeric prefix.
fn parse_title(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|&&b| b != 0)
        .filter(|&&b| b.is_ascii_alphanumeric() || b == b' ')
        .map(|&b| b as char)
        .collect()
}

/// Header checksum per the Pan Docs formula: `x = 0; for byte in
/// 0x0134..=0x014C { x = x - byte - 1 }`; the low byte of `x` must match
/// the byte stored at 0x014D.
fn verify_checksum(rom: &[u8]) -> bool {
    let mut checksum: u8 = 0;
    for &byte in &rom[HEADER_CHECKSUM_START..=HEADER_CHECKSUM_END] {
        checksum = checksum.wrapping_sub(byte).wrapping_sub(1);
    }
    checksum == rom[HEADER_CHECKSUM_BYTE]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_rom() -> Vec<u8> {
        let mut rom = vec![0u8; ROM_SIZE];
        rom[HEADER_LOGO_BYTE] = HEADER_LOGO_FIRST_BYTE;
        rom[HEADER_TYPE] = 0x00;
        rom[HEADER_ROM_SIZE] = 0x00;
        rom
    }

    #[test]
    fn accepts_a_minimal_no_mbc_rom() {
        let cartridge = Cartridge::load(&minimal_rom()).unwrap();
        assert_eq!(cartridge.controller_type(), ControllerType::NoMbc);
    }

    #[test]
    fn rejects_invalid_nintendo_logo_byte() {
        let mut rom = minimal_rom();
        rom[HEADER_LOGO_BYTE] = 0x00;
        assert!(Cartridge::load(&rom).is_err());
    }

    #[test]
    fn rejects_mbc_type_byte() {
        let mut rom = minimal_rom();
        rom[HEADER_TYPE] = 0x01; // MBC1
        assert!(Cartridge::load(&rom).is_err());
    }

    #[test]
    fn rejects_non_32kib_rom_size_byte() {
        let mut rom = minimal_rom();
        rom[HEADER_ROM_SIZE] = 0x01;
        assert!(Cartridge::load(&rom).is_err());
    }

    #[test]
    fn pads_a_short_rom_with_zeros() {
        let mut rom = minimal_rom();
        rom.truncate(0x200);
        let cartridge = Cartridge::load(&rom).unwrap();
        assert_eq!(cartridge.read(0x7FFF), 0);
    }

    #[test]
    fn title_drops_non_alphanumeric_padding() {
        let mut rom = minimal_rom();
        rom[HEADER_TITLE_START..HEADER_TITLE_START + 6].copy_from_slice(b"TETRIS");
        let cartridge = Cartridge::load(&rom).unwrap();
        assert_eq!(cartridge.title(), "TETRIS");
    }
}
