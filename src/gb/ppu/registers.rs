use bitflags::bitflags;

bitflags! {
    /// LCDC (0xFF40): master LCD/layer enable switches.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct LCDControl: u8 {
        const LCD_ENABLE           = 0b1000_0000;
        const WINDOW_TILE_MAP_AREA = 0b0100_0000;
        const WINDOW_ENABLE        = 0b0010_0000;
        const BG_WINDOW_TILE_DATA_AREA = 0b0001_0000;
        const BG_TILE_MAP_AREA     = 0b0000_1000;
        const OBJ_SIZE             = 0b0000_0100;
        const OBJ_ENABLE           = 0b0000_0010;
        const BG_WINDOW_ENABLE     = 0b0000_0001;
    }
}

impl LCDControl {
    #[inline]
    pub fn bg_tile_map_base(self) -> u16 {
        if self.contains(Self::BG_TILE_MAP_AREA) { 0x9C00 } else { 0x9800 }
    }

    #[inline]
    pub fn window_tile_map_base(self) -> u16 {
        if self.contains(Self::WINDOW_TILE_MAP_AREA) { 0x9C00 } else { 0x9800 }
    }

    #[inline]
    pub fn sprite_height(self) -> u8 {
        if self.contains(Self::OBJ_SIZE) { 16 } else { 8 }
    }
}

bitflags! {
    /// STAT (0xFF41). Bits 0-1 hold the current mode, bit 2 the LYC==LY
    /// coincidence flag; bits 3-6 are the mode/coincidence interrupt
    /// sources. Bit 7 always reads back as 1 on real hardware.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct LCDStatus: u8 {
        const MODE_LOW          = 0b0000_0001;
        const MODE_HIGH         = 0b0000_0010;
        const LYC_EQUALS_LY     = 0b0000_0100;
        const MODE0_INTERRUPT   = 0b0000_1000;
        const MODE1_INTERRUPT   = 0b0001_0000;
        const MODE2_INTERRUPT   = 0b0010_0000;
        const LYC_INTERRUPT     = 0b0100_0000;
    }
}

/// One of the PPU's four operating modes, see spec.md §4.7.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    HBlank = 0,
    VBlank = 1,
    OamSearch = 2,
    PixelTransfer = 3,
}

impl Mode {
    #[inline]
    pub fn as_bits(self) -> u8 {
        self as u8
    }

    /// Bit in STAT that requests a STAT interrupt when this mode begins.
    pub fn interrupt_source(self) -> LCDStatus {
        match self {
            Mode::HBlank => LCDStatus::MODE0_INTERRUPT,
            Mode::VBlank => LCDStatus::MODE1_INTERRUPT,
            Mode::OamSearch => LCDStatus::MODE2_INTERRUPT,
            Mode::PixelTransfer => LCDStatus::empty(),
        }
    }
}

/// Plain byte-addressable PPU registers, stored on the [`crate::gb::bus::Bus`]
/// so the CPU can address them through the normal bus path while the PPU
/// reads and updates them each step.
#[derive(Copy, Clone, Debug, Default)]
pub struct Registers {
    pub lcdc: LCDControl,
    pub stat: LCDStatus,
    pub scy: u8,
    pub scx: u8,
    pub ly: u8,
    pub lyc: u8,
    pub bgp: u8,
    pub obp0: u8,
    pub obp1: u8,
    pub wy: u8,
    pub wx: u8,
}

impl Registers {
    pub fn mode(&self) -> u8 {
        self.stat.bits() & 0b11
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.stat.remove(LCDStatus::MODE_LOW | LCDStatus::MODE_HIGH);
        self.stat.insert(LCDStatus::from_bits_truncate(mode.as_bits()));
    }

    pub fn refresh_lyc_flag(&mut self) {
        self.stat.set(LCDStatus::LYC_EQUALS_LY, self.ly == self.lyc);
    }
}
