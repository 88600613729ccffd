pub mod instruction;
pub mod registers;

use crate::gb::AddressSpace;
use crate::gb::bus::Bus;
use crate::gb::error::{GbError, GbResult};
use crate::gb::interrupt;
use crate::gb::utils::{bit_at, half_carry_add_u8, half_carry_adc_u8, half_carry_sub_u8, set_bit};
use instruction::{Condition, Operand, Pair};
use registers::{FlagsRegister, Registers};

/// The Sharp LR35902 fetch/decode/execute engine.
///
/// Owns the register file, program counter, stack pointer, and interrupt
/// master-enable state. `step` executes exactly one instruction (or
/// services one pending interrupt, or idles four cycles while halted) and
/// returns the number of machine cycles it consumed.
pub struct CPU {
    pub r: Registers,
    pub pc: u16,
    pub sp: u16,
    pub ime: bool,
    ime_pending: bool,
    pub is_halted: bool,
    last_step_cycles: u32,
}

impl CPU {
    pub fn new() -> Self {
        Self {
            r: Registers::default(),
            pc: 0,
            sp: 0,
            ime: false,
            ime_pending: false,
            is_halted: false,
            last_step_cycles: 0,
        }
    }

    /// Installs the documented post-boot register state (spec.md §3). No
    /// boot ROM ever runs; execution starts here.
    pub fn reset_post_boot(&mut self) {
        self.r.set_af(0x01B0);
        self.r.set_bc(0x0013);
        self.r.set_de(0x00D8);
        self.r.set_hl(0x014D);
        self.sp = 0xFFFE;
        self.pc = 0x0100;
        self.ime = false;
        self.ime_pending = false;
        self.is_halted = false;
        self.last_step_cycles = 0;
    }

    pub fn last_step_cycles(&self) -> u32 {
        self.last_step_cycles
    }

    pub fn wake_from_halt(&mut self) {
        self.is_halted = false;
    }

    /// Promotes a pending `EI` latch, services an interrupt if one is ready,
    /// otherwise executes (or idles through, if halted) one instruction.
    pub fn step(&mut self, bus: &mut Bus) -> GbResult<u32> {
        if self.ime_pending {
            self.ime = true;
            self.ime_pending = false;
        }

        if let Some(cycles) = interrupt::handle(self, bus) {
            self.last_step_cycles = cycles;
            return Ok(cycles);
        }

        if self.is_halted {
            self.last_step_cycles = 4;
            return Ok(4);
        }

        let opcode = self.fetch_byte(bus);
        let cycles = self.execute(opcode, bus)?;
        self.last_step_cycles = cycles;
        Ok(cycles)
    }

    fn fetch_byte(&mut self, bus: &mut Bus) -> u8 {
        let value = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        value
    }

    fn fetch_word(&mut self, bus: &mut Bus) -> u16 {
        let value = bus.read16(self.pc);
        self.pc = self.pc.wrapping_add(2);
        value
    }

    fn push(&mut self, bus: &mut Bus, value: u16) {
        self.sp = self.sp.wrapping_sub(2);
        bus.write16(self.sp, value);
    }

    fn pop(&mut self, bus: &mut Bus) -> u16 {
        let value = bus.read16(self.sp);
        self.sp = self.sp.wrapping_add(2);
        value
    }

    fn alu_add(&mut self, value: u8) {
        let a = self.r.a;
        let (result, carry) = a.overflowing_add(value);
        let half = half_carry_add_u8(a, value);
        self.r.a = result;
        self.r.f.update(result == 0, false, half, carry);
    }

    fn alu_adc(&mut self, value: u8) {
        let a = self.r.a;
        let carry_in = u8::from(self.r.f.contains(FlagsRegister::CARRY));
        let (r1, c1) = a.overflowing_add(value);
        let (result, c2) = r1.overflowing_add(carry_in);
        let half = half_carry_adc_u8(a, value, carry_in);
        self.r.a = result;
        self.r.f.update(result == 0, false, half, c1 || c2);
    }

    /// Shared core of SUB/SBC/CP: computes `a - value - carry_in`, updates
    /// flags, and returns the result without writing it back (the caller
    /// decides whether to commit it to `A`).
    fn sub_with_flags(&mut self, value: u8, carry_in: u8) -> u8 {
        let a = self.r.a;
        let (r1, b1) = a.overflowing_sub(value);
        let (result, b2) = r1.overflowing_sub(carry_in);
        let half = half_carry_sub_u8(a, value, carry_in);
        self.r.f.update(result == 0, true, half, b1 || b2);
        result
    }

    fn alu_and(&mut self, value: u8) {
        self.r.a &= value;
        let zero = self.r.a == 0;
        self.r.f.update(zero, false, true, false);
    }

    fn alu_xor(&mut self, value: u8) {
        self.r.a ^= value;
        let zero = self.r.a == 0;
        self.r.f.update(zero, false, false, false);
    }

    fn alu_or(&mut self, value: u8) {
        self.r.a |= value;
        let zero = self.r.a == 0;
        self.r.f.update(zero, false, false, false);
    }

    /// Dispatches the 3-bit ALU-op field shared by the `0x80..=0xBF` grid
    /// and the `0xC6,0xCE,...,0xFE` immediate forms: 0=ADD,1=ADC,2=SUB,
    /// 3=SBC,4=AND,5=XOR,6=OR,7=CP.
    fn alu_dispatch(&mut self, op: u8, value: u8) {
        match op {
            0 => self.alu_add(value),
            1 => self.alu_adc(value),
            2 => self.r.a = self.sub_with_flags(value, 0),
            3 => {
                let carry = u8::from(self.r.f.contains(FlagsRegister::CARRY));
                self.r.a = self.sub_with_flags(value, carry);
            }
            4 => self.alu_and(value),
            5 => self.alu_xor(value),
            6 => self.alu_or(value),
            7 => {
                self.sub_with_flags(value, 0);
            }
            _ => unreachable!(),
        }
    }

    fn inc8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        let half = half_carry_add_u8(value, 1);
        self.r.f.set(FlagsRegister::ZERO, result == 0);
        self.r.f.set(FlagsRegister::SUBTRACT, false);
        self.r.f.set(FlagsRegister::HALF_CARRY, half);
        result
    }

    fn dec8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        let half = half_carry_sub_u8(value, 1, 0);
        self.r.f.set(FlagsRegister::ZERO, result == 0);
        self.r.f.set(FlagsRegister::SUBTRACT, true);
        self.r.f.set(FlagsRegister::HALF_CARRY, half);
        result
    }

    fn add_hl(&mut self, value: u16) {
        let hl = self.r.get_hl();
        let (result, carry) = hl.overflowing_add(value);
        let half = (hl ^ value ^ result) & 0x1000 != 0;
        self.r.set_hl(result);
        self.r.f.set(FlagsRegister::SUBTRACT, false);
        self.r.f.set(FlagsRegister::HALF_CARRY, half);
        self.r.f.set(FlagsRegister::CARRY, carry);
    }

    /// `ADD SP,e` and `LD HL,SP+e` both compute the signed displacement the
    /// same way but write the result to a different place; H/C come from
    /// the *unsigned* 8-bit add of SP's low byte with `e`, per spec.md §4.6.
    fn sp_plus_e(&mut self, e: i8) -> u16 {
        let sp = self.sp;
        let spl = sp as u8;
        let eu = e as u8;
        let half = half_carry_add_u8(spl, eu);
        let carry = u16::from(spl) + u16::from(eu) > 0xFF;
        self.r.f.update(false, false, half, carry);
        sp.wrapping_add_signed(i16::from(e))
    }

    fn daa(&mut self) {
        let mut a = self.r.a;
        let mut carry = self.r.f.contains(FlagsRegister::CARRY);

        if !self.r.f.contains(FlagsRegister::SUBTRACT) {
            if carry || a > 0x99 {
                a = a.wrapping_add(0x60);
                carry = true;
            }
            if self.r.f.contains(FlagsRegister::HALF_CARRY) || (a & 0x0F) > 0x09 {
                a = a.wrapping_add(0x06);
            }
        } else {
            if carry {
                a = a.wrapping_sub(0x60);
            }
            if self.r.f.contains(FlagsRegister::HALF_CARRY) {
                a = a.wrapping_sub(0x06);
            }
        }

        self.r.a = a;
        self.r.f.set(FlagsRegister::ZERO, a == 0);
        self.r.f.set(FlagsRegister::HALF_CARRY, false);
        self.r.f.set(FlagsRegister::CARRY, carry);
    }

    fn execute(&mut self, opcode: u8, bus: &mut Bus) -> GbResult<u32> {
        match opcode {
            0x00 => Ok(4), // NOP
            0x10 => {
                // STOP: treated as HALT, per spec.md §4.6.
                self.fetch_byte(bus);
                self.is_halted = true;
                Ok(4)
            }
            0x76 => {
                self.is_halted = true;
                Ok(4)
            }
            0xF3 => {
                self.ime = false;
                self.ime_pending = false;
                Ok(4)
            }
            0xFB => {
                self.ime_pending = true;
                Ok(4)
            }
            0x27 => {
                self.daa();
                Ok(4)
            }
            0x2F => {
                self.r.a = !self.r.a;
                self.r.f.insert(FlagsRegister::SUBTRACT | FlagsRegister::HALF_CARRY);
                Ok(4)
            }
            0x37 => {
                self.r.f.remove(FlagsRegister::SUBTRACT | FlagsRegister::HALF_CARRY);
                self.r.f.insert(FlagsRegister::CARRY);
                Ok(4)
            }
            0x3F => {
                self.r.f.remove(FlagsRegister::SUBTRACT | FlagsRegister::HALF_CARRY);
                self.r.f.toggle(FlagsRegister::CARRY);
                Ok(4)
            }

            0x07 => {
                let (result, carry) = rlc(self.r.a);
                self.r.a = result;
                self.r.f.update(false, false, false, carry);
                Ok(4)
            }
            0x0F => {
                let (result, carry) = rrc(self.r.a);
                self.r.a = result;
                self.r.f.update(false, false, false, carry);
                Ok(4)
            }
            0x17 => {
                let carry_in = self.r.f.contains(FlagsRegister::CARRY);
                let (result, carry) = rl(self.r.a, carry_in);
                self.r.a = result;
                self.r.f.update(false, false, false, carry);
                Ok(4)
            }
            0x1F => {
                let carry_in = self.r.f.contains(FlagsRegister::CARRY);
                let (result, carry) = rr(self.r.a, carry_in);
                self.r.a = result;
                self.r.f.update(false, false, false, carry);
                Ok(4)
            }

            0xCB => {
                let cb_opcode = self.fetch_byte(bus);
                self.execute_cb(cb_opcode, bus)
            }

            0x01 | 0x11 | 0x21 | 0x31 => {
                let pair = Pair::from_bits_sp(opcode >> 4);
                let value = self.fetch_word(bus);
                pair.set(self, value);
                Ok(12)
            }
            0x08 => {
                let addr = self.fetch_word(bus);
                bus.write16(addr, self.sp);
                Ok(20)
            }
            0xF9 => {
                self.sp = self.r.get_hl();
                Ok(8)
            }
            0xF8 => {
                let e = self.fetch_byte(bus) as i8;
                let result = self.sp_plus_e(e);
                self.r.set_hl(result);
                Ok(12)
            }
            0xE8 => {
                let e = self.fetch_byte(bus) as i8;
                self.sp = self.sp_plus_e(e);
                Ok(16)
            }

            0xC5 | 0xD5 | 0xE5 | 0xF5 => {
                let pair = Pair::from_bits_af(opcode >> 4);
                let value = pair.get(self);
                self.push(bus, value);
                Ok(16)
            }
            0xC1 | 0xD1 | 0xE1 | 0xF1 => {
                let pair = Pair::from_bits_af(opcode >> 4);
                let value = self.pop(bus);
                pair.set(self, value);
                Ok(12)
            }

            0x03 | 0x13 | 0x23 | 0x33 => {
                let pair = Pair::from_bits_sp(opcode >> 4);
                pair.set(self, pair.get(self).wrapping_add(1));
                Ok(8)
            }
            0x0B | 0x1B | 0x2B | 0x3B => {
                let pair = Pair::from_bits_sp(opcode >> 4);
                pair.set(self, pair.get(self).wrapping_sub(1));
                Ok(8)
            }
            0x09 | 0x19 | 0x29 | 0x39 => {
                let pair = Pair::from_bits_sp(opcode >> 4);
                let value = pair.get(self);
                self.add_hl(value);
                Ok(8)
            }

            0x02 => {
                bus.write(self.r.get_bc(), self.r.a);
                Ok(8)
            }
            0x12 => {
                bus.write(self.r.get_de(), self.r.a);
                Ok(8)
            }
            0x0A => {
                self.r.a = bus.read(self.r.get_bc());
                Ok(8)
            }
            0x1A => {
                self.r.a = bus.read(self.r.get_de());
                Ok(8)
            }
            0x22 => {
                let hl = self.r.get_hl();
                bus.write(hl, self.r.a);
                self.r.set_hl(hl.wrapping_add(1));
                Ok(8)
            }
            0x32 => {
                let hl = self.r.get_hl();
                bus.write(hl, self.r.a);
                self.r.set_hl(hl.wrapping_sub(1));
                Ok(8)
            }
            0x2A => {
                let hl = self.r.get_hl();
                self.r.a = bus.read(hl);
                self.r.set_hl(hl.wrapping_add(1));
                Ok(8)
            }
            0x3A => {
                let hl = self.r.get_hl();
                self.r.a = bus.read(hl);
                self.r.set_hl(hl.wrapping_sub(1));
                Ok(8)
            }

            0xE0 => {
                let n = self.fetch_byte(bus);
                bus.write(0xFF00 + u16::from(n), self.r.a);
                Ok(12)
            }
            0xF0 => {
                let n = self.fetch_byte(bus);
                self.r.a = bus.read(0xFF00 + u16::from(n));
                Ok(12)
            }
            0xE2 => {
                bus.write(0xFF00 + u16::from(self.r.c), self.r.a);
                Ok(8)
            }
            0xF2 => {
                self.r.a = bus.read(0xFF00 + u16::from(self.r.c));
                Ok(8)
            }
            0xEA => {
                let addr = self.fetch_word(bus);
                bus.write(addr, self.r.a);
                Ok(16)
            }
            0xFA => {
                let addr = self.fetch_word(bus);
                self.r.a = bus.read(addr);
                Ok(16)
            }

            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
                let dst = Operand::from_bits(opcode >> 3);
                let value = self.fetch_byte(bus);
                dst.write(self, bus, value);
                Ok(if dst.is_memory() { 12 } else { 8 })
            }

            0x40..=0x7F => {
                // 0x76 (HALT) is carved out above.
                let dst = Operand::from_bits(opcode >> 3);
                let src = Operand::from_bits(opcode);
                let value = src.read(self, bus);
                dst.write(self, bus, value);
                Ok(if dst.is_memory() || src.is_memory() { 8 } else { 4 })
            }

            0x80..=0xBF => {
                let src = Operand::from_bits(opcode);
                let value = src.read(self, bus);
                self.alu_dispatch((opcode >> 3) & 0x07, value);
                Ok(if src.is_memory() { 8 } else { 4 })
            }
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let value = self.fetch_byte(bus);
                self.alu_dispatch((opcode >> 3) & 0x07, value);
                Ok(8)
            }

            0xC3 => {
                let addr = self.fetch_word(bus);
                self.pc = addr;
                Ok(16)
            }
            0xE9 => {
                self.pc = self.r.get_hl();
                Ok(4)
            }
            0xC2 | 0xCA | 0xD2 | 0xDA => {
                let cond = Condition::from_bits(opcode >> 3);
                let addr = self.fetch_word(bus);
                if cond.test(self) {
                    self.pc = addr;
                    Ok(16)
                } else {
                    Ok(12)
                }
            }
            0x18 => {
                let e = self.fetch_byte(bus) as i8;
                self.pc = self.pc.wrapping_add_signed(i16::from(e));
                Ok(12)
            }
            0x20 | 0x28 | 0x30 | 0x38 => {
                let cond = Condition::from_bits(opcode >> 3);
                let e = self.fetch_byte(bus) as i8;
                if cond.test(self) {
                    self.pc = self.pc.wrapping_add_signed(i16::from(e));
                    Ok(12)
                } else {
                    Ok(8)
                }
            }

            0xCD => {
                let addr = self.fetch_word(bus);
                self.push(bus, self.pc);
                self.pc = addr;
                Ok(24)
            }
            0xC4 | 0xCC | 0xD4 | 0xDC => {
                let cond = Condition::from_bits(opcode >> 3);
                let addr = self.fetch_word(bus);
                if cond.test(self) {
                    self.push(bus, self.pc);
                    self.pc = addr;
                    Ok(24)
                } else {
                    Ok(12)
                }
            }
            0xC9 => {
                self.pc = self.pop(bus);
                Ok(16)
            }
            0xD9 => {
                self.pc = self.pop(bus);
                self.ime = true;
                self.ime_pending = false;
                Ok(16)
            }
            0xC0 | 0xC8 | 0xD0 | 0xD8 => {
                let cond = Condition::from_bits(opcode >> 3);
                if cond.test(self) {
                    self.pc = self.pop(bus);
                    Ok(20)
                } else {
                    Ok(8)
                }
            }

            0xD3 | 0xDB | 0xDD | 0xE3 | 0xE4 | 0xEB | 0xEC | 0xED | 0xF4 | 0xFC | 0xFD => {
                Err(GbError::IllegalInstruction {
                    opcode,
                    pc: self.pc.wrapping_sub(1),
                })
            }

            _ if (opcode & 0xC7) == 0x04 => {
                let target = Operand::from_bits(opcode >> 3);
                let value = target.read(self, bus);
                let result = self.inc8(value);
                target.write(self, bus, result);
                Ok(if target.is_memory() { 12 } else { 4 })
            }
            _ if (opcode & 0xC7) == 0x05 => {
                let target = Operand::from_bits(opcode >> 3);
                let value = target.read(self, bus);
                let result = self.dec8(value);
                target.write(self, bus, result);
                Ok(if target.is_memory() { 12 } else { 4 })
            }
            _ if (opcode & 0xC7) == 0xC7 => {
                let vector = u16::from(opcode & 0x38);
                self.push(bus, self.pc);
                self.pc = vector;
                Ok(16)
            }

            _ => unreachable!("opcode {opcode:#04x} not covered by any dispatch arm"),
        }
    }

    fn execute_cb(&mut self, opcode: u8, bus: &mut Bus) -> GbResult<u32> {
        let target = Operand::from_bits(opcode);
        let base_cycles = if target.is_memory() { 16 } else { 8 };

        let cycles = match opcode {
            0x00..=0x3F => {
                let value = target.read(self, bus);
                let op = (opcode >> 3) & 0x07;
                let (result, carry) = match op {
                    0 => rlc(value),
                    1 => rrc(value),
                    2 => rl(value, self.r.f.contains(FlagsRegister::CARRY)),
                    3 => rr(value, self.r.f.contains(FlagsRegister::CARRY)),
                    4 => sla(value),
                    5 => sra(value),
                    6 => swap(value),
                    7 => srl(value),
                    _ => unreachable!(),
                };
                self.r.f.update(result == 0, false, false, carry);
                target.write(self, bus, result);
                base_cycles
            }
            0x40..=0x7F => {
                let bit = (opcode >> 3) & 0x07;
                let value = target.read(self, bus);
                let zero = !bit_at(value, bit);
                self.r.f.set(FlagsRegister::ZERO, zero);
                self.r.f.set(FlagsRegister::SUBTRACT, false);
                self.r.f.set(FlagsRegister::HALF_CARRY, true);
                // BIT b,(HL) is 12 cycles, not the 16 every other (HL) form costs.
                if target.is_memory() { 12 } else { 8 }
            }
            0x80..=0xBF => {
                let bit = (opcode >> 3) & 0x07;
                let value = target.read(self, bus);
                target.write(self, bus, set_bit(value, bit, false));
                base_cycles
            }
            0xC0..=0xFF => {
                let bit = (opcode >> 3) & 0x07;
                let value = target.read(self, bus);
                target.write(self, bus, set_bit(value, bit, true));
                base_cycles
            }
        };

        Ok(cycles)
    }
}

impl Default for CPU {
    fn default() -> Self {
        Self::new()
    }
}

fn rlc(value: u8) -> (u8, bool) {
    (value.rotate_left(1), value & 0x80 != 0)
}

fn rrc(value: u8) -> (u8, bool) {
    (value.rotate_right(1), value & 0x01 != 0)
}

fn rl(value: u8, carry_in: bool) -> (u8, bool) {
    let carry = value & 0x80 != 0;
    ((value << 1) | u8::from(carry_in), carry)
}

fn rr(value: u8, carry_in: bool) -> (u8, bool) {
    let carry = value & 0x01 != 0;
    ((value >> 1) | (u8::from(carry_in) << 7), carry)
}

fn sla(value: u8) -> (u8, bool) {
    (value << 1, value & 0x80 != 0)
}

fn sra(value: u8) -> (u8, bool) {
    let carry = value & 0x01 != 0;
    ((value >> 1) | (value & 0x80), carry)
}

fn swap(value: u8) -> (u8, bool) {
    ((value << 4) | (value >> 4), false)
}

fn srl(value: u8) -> (u8, bool) {
    let carry = value & 0x01 != 0;
    (value >> 1, carry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gb::cartridge::Cartridge;

    fn bus_with_program(at: u16, bytes: &[u8]) -> Bus {
        let mut rom = vec![0u8; 0x8000];
        rom[0x0104] = 0xCE;
        rom[0x0147] = 0x00;
        rom[0x0148] = 0x00;
        let mut bus = Bus::new();
        bus.load_cartridge(Cartridge::load(&rom).unwrap());
        bus.reset_post_boot();
        for (i, &b) in bytes.iter().enumerate() {
            bus.write(at + i as u16, b);
        }
        bus
    }

    #[test]
    fn post_boot_registers_match_spec() {
        let mut cpu = CPU::new();
        cpu.reset_post_boot();
        assert_eq!(cpu.r.get_af(), 0x01B0);
        assert_eq!(cpu.r.get_bc(), 0x0013);
        assert_eq!(cpu.r.get_de(), 0x00D8);
        assert_eq!(cpu.r.get_hl(), 0x014D);
        assert_eq!(cpu.sp, 0xFFFE);
        assert_eq!(cpu.pc, 0x0100);
    }

    #[test]
    fn nop_timing() {
        let mut cpu = CPU::new();
        cpu.pc = 0xC000;
        let mut bus = bus_with_program(0xC000, &[0x00]);
        let cycles = cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.pc, 0xC001);
        assert_eq!(cycles, 4);
    }

    #[test]
    fn ld_bc_nn_timing() {
        let mut cpu = CPU::new();
        cpu.pc = 0xC000;
        let mut bus = bus_with_program(0xC000, &[0x01, 0x34, 0x12]);
        let cycles = cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.r.get_bc(), 0x1234);
        assert_eq!(cpu.pc, 0xC003);
        assert_eq!(cycles, 12);
    }

    #[test]
    fn conditional_branch_cycles_taken_and_not_taken() {
        let mut cpu = CPU::new();
        cpu.pc = 0xC000;
        cpu.r.f.insert(FlagsRegister::ZERO);
        let mut bus = bus_with_program(0xC000, &[0x28, 0x05]); // JR Z,+5
        let cycles = cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.pc, 0xC007);
        assert_eq!(cycles, 12);

        let mut cpu = CPU::new();
        cpu.pc = 0xC000;
        cpu.r.f.remove(FlagsRegister::ZERO);
        let mut bus = bus_with_program(0xC000, &[0x28, 0x05]);
        let cycles = cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.pc, 0xC002);
        assert_eq!(cycles, 8);
    }

    #[test]
    fn call_then_ret_round_trip() {
        let mut cpu = CPU::new();
        cpu.pc = 0xC000;
        cpu.sp = 0xFFFE;
        let mut bus = bus_with_program(0xC000, &[0xCD, 0x00, 0x80]); // CALL 0x8000
        bus.write(0x8000, 0xC9); // RET

        let call_cycles = cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.pc, 0x8000);
        assert_eq!(call_cycles, 24);
        assert_eq!(cpu.sp, 0xFFFC);

        let ret_cycles = cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.pc, 0xC003);
        assert_eq!(ret_cycles, 16);
        assert_eq!(cpu.sp, 0xFFFE);
    }

    #[test]
    fn push_pop_round_trips_register_and_sp() {
        let mut cpu = CPU::new();
        cpu.pc = 0xC000;
        cpu.sp = 0xFFFE;
        cpu.r.set_bc(0xBEEF);
        let mut bus = bus_with_program(0xC000, &[0xC5, 0xD1]); // PUSH BC; POP DE

        cpu.step(&mut bus).unwrap();
        let sp_after_push = cpu.sp;
        cpu.step(&mut bus).unwrap();

        assert_eq!(cpu.r.get_de(), 0xBEEF);
        assert_eq!(cpu.sp, sp_after_push + 2);
    }

    #[test]
    fn push_pop_af_preserves_flags() {
        let mut cpu = CPU::new();
        cpu.pc = 0xC000;
        cpu.sp = 0xFFFE;
        cpu.r.a = 0x42;
        cpu.r.f.update(true, false, true, true);
        let mut bus = bus_with_program(0xC000, &[0xF5, 0xC1]); // PUSH AF; POP BC

        cpu.step(&mut bus).unwrap();
        cpu.step(&mut bus).unwrap();

        assert_eq!(cpu.r.b, 0x42);
        assert_eq!(cpu.r.c, cpu.r.f.bits());
    }

    #[test]
    fn cpl_cpl_restores_a() {
        let mut cpu = CPU::new();
        cpu.pc = 0xC000;
        cpu.r.a = 0x3C;
        let mut bus = bus_with_program(0xC000, &[0x2F, 0x2F]);
        cpu.step(&mut bus).unwrap();
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.r.a, 0x3C);
    }

    #[test]
    fn scf_ccf_ccf_restores_carry() {
        let mut cpu = CPU::new();
        cpu.pc = 0xC000;
        let mut bus = bus_with_program(0xC000, &[0x37, 0x3F, 0x3F]); // SCF;CCF;CCF
        cpu.step(&mut bus).unwrap();
        assert!(cpu.r.f.contains(FlagsRegister::CARRY));
        cpu.step(&mut bus).unwrap();
        assert!(!cpu.r.f.contains(FlagsRegister::CARRY));
        cpu.step(&mut bus).unwrap();
        assert!(cpu.r.f.contains(FlagsRegister::CARRY));
    }

    #[test]
    fn f_low_nibble_always_zero_after_execution() {
        let mut cpu = CPU::new();
        cpu.pc = 0xC000;
        cpu.r.a = 0xFF;
        let mut bus = bus_with_program(0xC000, &[0x3C]); // INC A -> 0x00
        cpu.step(&mut bus).unwrap();
        assert_eq!(cpu.r.f.bits() & 0x0F, 0);
    }

    #[test]
    fn illegal_opcode_is_fatal() {
        let mut cpu = CPU::new();
        cpu.pc = 0xC000;
        let mut bus = bus_with_program(0xC000, &[0xD3]);
        let result = cpu.step(&mut bus);
        assert_eq!(
            result,
            Err(GbError::IllegalInstruction { opcode: 0xD3, pc: 0xC000 })
        );
    }

    #[test]
    fn halt_idles_until_an_interrupt_wakes_it() {
        let mut cpu = CPU::new();
        cpu.pc = 0xC000;
        let mut bus = bus_with_program(0xC000, &[0x76]); // HALT
        cpu.step(&mut bus).unwrap();
        assert!(cpu.is_halted);

        let idle_cycles = cpu.step(&mut bus).unwrap();
        assert_eq!(idle_cycles, 4);
        assert!(cpu.is_halted);

        bus.write(0xFFFF, 0x01);
        bus.request_interrupt(interrupt::VBLANK);
        cpu.step(&mut bus).unwrap();
        assert!(!cpu.is_halted);
    }
}
