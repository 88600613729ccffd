use crate::gb::AddressSpace;
use crate::gb::audio::Apu;
use crate::gb::cartridge::Cartridge;
use crate::gb::constants::*;
use crate::gb::interrupt::InterruptRegister;
use crate::gb::joypad::Joypad;
use crate::gb::ppu::registers::Registers as PpuRegisters;
use crate::gb::timer::Timer;

/// The single address-decoder and data router for the 16-bit address space.
///
/// Owns every byte-addressable piece of state that isn't the CPU's own
/// registers: ROM (through the cartridge), VRAM, external RAM, work RAM
/// (with its echo mirror), OAM, the I/O page, HRAM, IE, and the PPU's
/// byte-addressable registers (see [`crate::gb::ppu::PPU`] for why those
/// live here rather than on the PPU struct).
pub struct Bus {
    cartridge: Option<Cartridge>,
    vram: [u8; VRAM_SIZE],
    eram: [u8; CRAM_SIZE],
    wram: [u8; WRAM_SIZE],
    oam: [u8; OAM_SIZE],
    hram: [u8; HRAM_SIZE],
    joypad: Joypad,
    timer: Timer,
    apu: Apu,
    ppu_registers: PpuRegisters,
    interrupt_flag: InterruptRegister,
    interrupt_enable: InterruptRegister,
    serial_data: u8,
    serial_ctrl: u8,
}

impl Bus {
    pub fn new() -> Self {
        Self {
            cartridge: None,
            vram: [0; VRAM_SIZE],
            eram: [0; CRAM_SIZE],
            wram: [0; WRAM_SIZE],
            oam: [0; OAM_SIZE],
            hram: [0; HRAM_SIZE],
            joypad: Joypad::new(),
            timer: Timer::new(),
            apu: Apu::new(),
            ppu_registers: PpuRegisters::default(),
            interrupt_flag: InterruptRegister::empty(),
            interrupt_enable: InterruptRegister::empty(),
            serial_data: 0,
            serial_ctrl: 0,
        }
    }

    pub fn load_cartridge(&mut self, cartridge: Cartridge) {
        self.cartridge = Some(cartridge);
    }

    /// Restores every bus-owned register to the documented post-boot state
    /// (spec.md §3). VRAM/WRAM/OAM/HRAM are left as-is; the cartridge ROM
    /// is untouched.
    pub fn reset_post_boot(&mut self) {
        self.joypad = Joypad::new();
        self.timer.reset_post_boot();
        self.apu.reset_post_boot();
        self.ppu_registers = PpuRegisters {
            lcdc: crate::gb::ppu::registers::LCDControl::from_bits_truncate(0x91),
            bgp: 0xFC,
            ..PpuRegisters::default()
        };
        self.interrupt_flag = InterruptRegister::empty();
        self.interrupt_enable = InterruptRegister::empty();
        self.serial_data = 0;
        self.serial_ctrl = 0;
    }

    pub fn step_timer(&mut self, cycles: u32) {
        self.timer.step(cycles);
    }

    pub fn take_timer_overflow(&mut self) -> bool {
        self.timer.take_overflow()
    }

    pub fn take_joypad_press(&mut self) -> bool {
        self.joypad.take_interrupt_pending()
    }

    pub fn joypad_mut(&mut self) -> &mut Joypad {
        &mut self.joypad
    }

    pub fn ppu_registers(&self) -> &PpuRegisters {
        &self.ppu_registers
    }

    pub fn ppu_registers_mut(&mut self) -> &mut PpuRegisters {
        &mut self.ppu_registers
    }

    /// Reads a byte at an OAM-relative offset (0..=0x9F), used by the PPU
    /// while scanning sprites for the current line.
    #[inline]
    pub fn read_oam(&self, offset: u16) -> u8 {
        self.oam[offset as usize]
    }

    /// Reads a byte at an absolute VRAM address (0x8000..=0x9FFF), used by
    /// the PPU while fetching tile data and tile maps.
    #[inline]
    pub fn read_vram_abs(&self, address: u16) -> u8 {
        self.vram[(address - VRAM_BEGIN) as usize]
    }

    fn rom_read(&self, address: u16) -> u8 {
        self.cartridge.as_ref().map_or(0xFF, |c| c.read(address))
    }

    /// A write of `value` to 0xFF46 triggers a 160-byte copy from
    /// `(value<<8)..=(value<<8)+0x9F` into OAM. Executed as a single atomic
    /// operation within the triggering instruction, per spec.md §4.3.
    fn dma_transfer(&mut self, value: u8) {
        let source = u16::from(value) << 8;
        for i in 0..OAM_SIZE as u16 {
            let byte = self.read(source + i);
            self.oam[i as usize] = byte;
        }
    }

    fn read_io(&mut self, address: u16) -> u8 {
        match address {
            JOYPAD => self.joypad.read(),
            SERIAL_TRANSFER_DATA => self.serial_data,
            SERIAL_TRANSFER_CTRL => self.serial_ctrl,
            TIMER_DIVIDER => self.timer.div(),
            TIMER_COUNTER => self.timer.tima(),
            TIMER_MODULO => self.timer.tma(),
            TIMER_CTRL => self.timer.tac(),
            INTERRUPT_FLAG => self.interrupt_flag.bits() | 0b1110_0000,
            AUDIO_REGISTERS_START..=AUDIO_REGISTERS_END => self.apu.read(address),
            PPU_LCDC => self.ppu_registers.lcdc.bits(),
            PPU_STAT => self.ppu_registers.stat.bits() | 0b1000_0000,
            PPU_SCY => self.ppu_registers.scy,
            PPU_SCX => self.ppu_registers.scx,
            PPU_LY => self.ppu_registers.ly,
            PPU_LYC => self.ppu_registers.lyc,
            PPU_DMA => 0xFF,
            PPU_BGP => self.ppu_registers.bgp,
            PPU_OBP0 => self.ppu_registers.obp0,
            PPU_OBP1 => self.ppu_registers.obp1,
            PPU_WY => self.ppu_registers.wy,
            PPU_WX => self.ppu_registers.wx,
            _ => 0xFF,
        }
    }

    fn write_io(&mut self, address: u16, value: u8) {
        match address {
            JOYPAD => self.joypad.write(value),
            SERIAL_TRANSFER_DATA => self.serial_data = value,
            SERIAL_TRANSFER_CTRL => self.serial_ctrl = value,
            TIMER_DIVIDER => self.timer.reset_div(),
            TIMER_COUNTER => self.timer.set_tima(value),
            TIMER_MODULO => self.timer.set_tma(value),
            TIMER_CTRL => self.timer.set_tac(value),
            INTERRUPT_FLAG => {
                self.interrupt_flag = InterruptRegister::from_bits_truncate(value)
            }
            AUDIO_REGISTERS_START..=AUDIO_REGISTERS_END => self.apu.write(address, value),
            PPU_LCDC => {
                self.ppu_registers.lcdc = crate::gb::ppu::registers::LCDControl::from_bits_truncate(value)
            }
            PPU_STAT => {
                let preserved = self.ppu_registers.stat.bits() & 0b0000_0111;
                self.ppu_registers.stat =
                    crate::gb::ppu::registers::LCDStatus::from_bits_truncate((value & 0b0111_1000) | preserved);
            }
            PPU_SCY => self.ppu_registers.scy = value,
            PPU_SCX => self.ppu_registers.scx = value,
            PPU_LY => {} // read-only from the CPU side
            PPU_LYC => self.ppu_registers.lyc = value,
            PPU_DMA => self.dma_transfer(value),
            PPU_BGP => self.ppu_registers.bgp = value,
            PPU_OBP0 => self.ppu_registers.obp0 = value,
            PPU_OBP1 => self.ppu_registers.obp1 = value,
            PPU_WY => self.ppu_registers.wy = value,
            PPU_WX => self.ppu_registers.wx = value,
            _ => {}
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace for Bus {
    fn read(&mut self, address: u16) -> u8 {
        match address {
            ROM_BANK_0_BEGIN..=ROM_BANK_N_END => self.rom_read(address),
            VRAM_BEGIN..=VRAM_END => self.vram[(address - VRAM_BEGIN) as usize],
            CRAM_BEGIN..=CRAM_END => self.eram[(address - CRAM_BEGIN) as usize],
            WRAM_BEGIN..=WRAM_END => self.wram[(address - WRAM_BEGIN) as usize],
            ERAM_BEGIN..=ERAM_END => self.wram[(address - ERAM_BEGIN) as usize],
            OAM_BEGIN..=OAM_END => self.oam[(address - OAM_BEGIN) as usize],
            UNUSED_BEGIN..=UNUSED_END => 0xFF,
            HRAM_BEGIN..=HRAM_END => self.hram[(address - HRAM_BEGIN) as usize],
            INTERRUPT_ENABLE => self.interrupt_enable.bits(),
            IO_BEGIN..=IO_END => self.read_io(address),
            _ => 0xFF,
        }
    }

    fn write(&mut self, address: u16, value: u8) {
        match address {
            ROM_BANK_0_BEGIN..=ROM_BANK_N_END => {} // ROM is read-only
            VRAM_BEGIN..=VRAM_END => self.vram[(address - VRAM_BEGIN) as usize] = value,
            CRAM_BEGIN..=CRAM_END => self.eram[(address - CRAM_BEGIN) as usize] = value,
            WRAM_BEGIN..=WRAM_END => self.wram[(address - WRAM_BEGIN) as usize] = value,
            ERAM_BEGIN..=ERAM_END => self.wram[(address - ERAM_BEGIN) as usize] = value,
            OAM_BEGIN..=OAM_END => self.oam[(address - OAM_BEGIN) as usize] = value,
            UNUSED_BEGIN..=UNUSED_END => {} // dropped
            HRAM_BEGIN..=HRAM_END => self.hram[(address - HRAM_BEGIN) as usize] = value,
            INTERRUPT_ENABLE => self.interrupt_enable = InterruptRegister::from_bits_truncate(value),
            IO_BEGIN..=IO_END => self.write_io(address, value),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus_with_rom() -> Bus {
        let mut rom = vec![0u8; 0x8000];
        rom[0x0104] = 0xCE;
        rom[0x0147] = 0x00;
        rom[0x0148] = 0x00;
        let mut bus = Bus::new();
        bus.load_cartridge(Cartridge::load(&rom).unwrap());
        bus
    }

    #[test]
    fn writes_to_rom_are_ignored() {
        let mut bus = bus_with_rom();
        let before = bus.read(0x0150);
        bus.write(0x0150, 0xAB);
        assert_eq!(bus.read(0x0150), before);
    }

    #[test]
    fn vram_round_trips() {
        let mut bus = bus_with_rom();
        bus.write(0x8000, 0x42);
        assert_eq!(bus.read(0x8000), 0x42);
    }

    #[test]
    fn echo_ram_mirrors_wram_both_ways() {
        let mut bus = bus_with_rom();
        bus.write(0xC005, 0x11);
        assert_eq!(bus.read(0xE005), 0x11);
        bus.write(0xE006, 0x22);
        assert_eq!(bus.read(0xC006), 0x22);
    }

    #[test]
    fn unusable_region_always_reads_0xff() {
        let mut bus = bus_with_rom();
        bus.write(0xFEA5, 0x99);
        assert_eq!(bus.read(0xFEA5), 0xFF);
    }

    #[test]
    fn div_write_resets_to_zero() {
        let mut bus = bus_with_rom();
        bus.step_timer(4000);
        assert_ne!(bus.read(TIMER_DIVIDER), 0);
        bus.write(TIMER_DIVIDER, 0x99);
        assert_eq!(bus.read(TIMER_DIVIDER), 0);
    }

    #[test]
    fn oam_dma_copies_160_bytes_atomically() {
        let mut bus = bus_with_rom();
        for i in 0..0xA0u16 {
            bus.write(0xC100 + i, i as u8);
        }
        bus.write(PPU_DMA, 0xC1);
        for i in 0..0xA0u16 {
            assert_eq!(bus.read(OAM_BEGIN + i), i as u8);
        }
    }

    #[test]
    fn hram_round_trips() {
        let mut bus = bus_with_rom();
        bus.write(0xFF85, 0x7A);
        assert_eq!(bus.read(0xFF85), 0x7A);
    }
}
