//! Interrupt dispatch: priority order, vectors, and the bus-side IE/IF pair.

use bitflags::bitflags;

use crate::gb::AddressSpace;
use crate::gb::bus::Bus;
use crate::gb::cpu::CPU;

bitflags! {
    /// Bits of IF (0xFF0F) and IE (0xFFFF), in dispatch-priority order.
    #[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
    pub struct InterruptRegister: u8 {
        const VBLANK = 0b0000_0001;
        const STAT   = 0b0000_0010;
        const TIMER  = 0b0000_0100;
        const SERIAL = 0b0000_1000;
        const JOYPAD = 0b0001_0000;
    }
}

pub const VBLANK: u8 = InterruptRegister::VBLANK.bits();
pub const STAT: u8 = InterruptRegister::STAT.bits();
pub const TIMER: u8 = InterruptRegister::TIMER.bits();
pub const SERIAL: u8 = InterruptRegister::SERIAL.bits();
pub const JOYPAD: u8 = InterruptRegister::JOYPAD.bits();

/// Priority-ordered (mask, vector) pairs. Lower index wins when several
/// bits are pending simultaneously.
const VECTORS: [(InterruptRegister, u16); 5] = [
    (InterruptRegister::VBLANK, 0x0040),
    (InterruptRegister::STAT, 0x0048),
    (InterruptRegister::TIMER, 0x0050),
    (InterruptRegister::SERIAL, 0x0058),
    (InterruptRegister::JOYPAD, 0x0060),
];

/// Number of machine cycles an interrupt dispatch consumes.
pub const DISPATCH_CYCLES: u32 = 20;

/// Examines `IE & IF`. If any bit is set, wakes the CPU from HALT
/// unconditionally. If `cpu.ime` is also set, clears the highest-priority
/// pending bit in IF, disables IME, pushes PC onto the stack, and jumps to
/// the interrupt's vector. Returns the number of cycles the dispatch
/// consumed, or `None` if nothing was serviced.
pub fn handle(cpu: &mut CPU, bus: &mut Bus) -> Option<u32> {
    let pending = bus.interrupt_enable() & bus.interrupt_flag();
    if pending.is_empty() {
        return None;
    }

    cpu.wake_from_halt();

    if !cpu.ime {
        return None;
    }

    let (mask, vector) = VECTORS
        .iter()
        .find(|(mask, _)| pending.contains(*mask))
        .copied()
        .expect("pending interrupt must match one of the five known vectors");

    bus.clear_interrupt_flag(mask);
    cpu.ime = false;
    let pc = cpu.pc;
    cpu.sp = cpu.sp.wrapping_sub(2);
    bus.write16(cpu.sp, pc);
    cpu.pc = vector;

    Some(DISPATCH_CYCLES)
}

impl Bus {
    #[inline]
    pub fn interrupt_flag(&self) -> InterruptRegister {
        self.interrupt_flag
    }

    #[inline]
    pub fn interrupt_enable(&self) -> InterruptRegister {
        self.interrupt_enable
    }

    #[inline]
    pub fn clear_interrupt_flag(&mut self, mask: InterruptRegister) {
        self.interrupt_flag.remove(mask);
    }

    /// Raises a bit in IF. `bit` is one of the constants in this module
    /// (e.g. [`VBLANK`]).
    #[inline]
    pub fn request_interrupt(&mut self, bit: u8) {
        self.interrupt_flag
            .insert(InterruptRegister::from_bits_truncate(bit));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gb::cartridge::Cartridge;

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
    fn dispatch_picks_highest_priority_and_clears_only_that_bit() {
        let mut cpu = CPU::new();
        cpu.reset_post_boot();
        cpu.ime = true;
        cpu.pc = 0xC010;
        cpu.sp = 0xFFFE;

        let mut bus = bus_with_rom();
        bus.request_interrupt(STAT);
        bus.request_interrupt(VBLANK);
        bus.write(0xFFFF, 0xFF); // IE: all enabled

        let cycles = handle(&mut cpu, &mut bus).expect("an interrupt was pending");
        assert_eq!(cycles, DISPATCH_CYCLES);
        assert_eq!(cpu.pc, 0x0040);
        assert!(!cpu.ime);
        assert!(!bus.interrupt_flag().contains(InterruptRegister::VBLANK));
        assert!(bus.interrupt_flag().contains(InterruptRegister::STAT));
        assert_eq!(cpu.sp, 0xFFFC);
    }

    #[test]
    fn no_dispatch_without_ime_but_halt_still_wakes() {
        let mut cpu = CPU::new();
        cpu.reset_post_boot();
        cpu.ime = false;
        cpu.is_halted = true;

        let mut bus = bus_with_rom();
        bus.request_interrupt(VBLANK);
        bus.write(0xFFFF, 0xFF);

        assert!(handle(&mut cpu, &mut bus).is_none());
        assert!(!cpu.is_halted);
    }
}
