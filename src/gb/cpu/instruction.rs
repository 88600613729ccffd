//! Operand addressing helpers shared by the opcode dispatcher in
//! [`super::CPU::step`]. These mirror the `ByteSource`/`ByteTarget`
//! distinction real LR35902 disassemblers draw, collapsed into a single
//! read-and-write-capable `Operand` since every register-or-`(HL)` slot in
//! this ISA is addressed identically whether it is being read or
//! read-modify-written.

use crate::gb::AddressSpace;
use crate::gb::bus::Bus;
use crate::gb::cpu::CPU;

/// An 8-bit operand: one of the seven single registers, `(HL)`, or an
/// immediate byte (read-only - nothing in the ISA ever writes to `D8`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    A,
    B,
    C,
    D,
    E,
    H,
    L,
    HLI,
    D8(u8),
}

impl Operand {
    /// Decodes the 3-bit register field used throughout the primary and CB
    /// opcode tables: 0=B,1=C,2=D,3=E,4=H,5=L,6=(HL),7=A.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => Operand::B,
            1 => Operand::C,
            2 => Operand::D,
            3 => Operand::E,
            4 => Operand::H,
            5 => Operand::L,
            6 => Operand::HLI,
            7 => Operand::A,
            _ => unreachable!(),
        }
    }

    pub fn read(self, cpu: &CPU, bus: &mut Bus) -> u8 {
        match self {
            Operand::A => cpu.r.a,
            Operand::B => cpu.r.b,
            Operand::C => cpu.r.c,
            Operand::D => cpu.r.d,
            Operand::E => cpu.r.e,
            Operand::H => cpu.r.h,
            Operand::L => cpu.r.l,
            Operand::HLI => bus.read(cpu.r.get_hl()),
            Operand::D8(v) => v,
        }
    }

    pub fn write(self, cpu: &mut CPU, bus: &mut Bus, value: u8) {
        match self {
            Operand::A => cpu.r.a = value,
            Operand::B => cpu.r.b = value,
            Operand::C => cpu.r.c = value,
            Operand::D => cpu.r.d = value,
            Operand::E => cpu.r.e = value,
            Operand::H => cpu.r.h = value,
            Operand::L => cpu.r.l = value,
            Operand::HLI => bus.write(cpu.r.get_hl(), value),
            Operand::D8(_) => unreachable!("immediates are never write targets"),
        }
    }

    /// True for the `(HL)` operand, which costs an extra memory access and
    /// therefore extra machine cycles relative to a plain register operand.
    pub fn is_memory(self) -> bool {
        matches!(self, Operand::HLI)
    }
}

/// A 16-bit register pair, as selected by the `dd`/`qq` opcode fields.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Pair {
    BC,
    DE,
    HL,
    SP,
    AF,
}

impl Pair {
    /// Decodes the 2-bit pair field used by LD rr,d16 / INC rr / DEC rr /
    /// ADD HL,rr, where 3 always means SP.
    pub fn from_bits_sp(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Pair::BC,
            1 => Pair::DE,
            2 => Pair::HL,
            3 => Pair::SP,
            _ => unreachable!(),
        }
    }

    /// Decodes the same 2-bit field for PUSH/POP, where 3 means AF instead.
    pub fn from_bits_af(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Pair::BC,
            1 => Pair::DE,
            2 => Pair::HL,
            3 => Pair::AF,
            _ => unreachable!(),
        }
    }

    pub fn get(self, cpu: &CPU) -> u16 {
        match self {
            Pair::BC => cpu.r.get_bc(),
            Pair::DE => cpu.r.get_de(),
            Pair::HL => cpu.r.get_hl(),
            Pair::SP => cpu.sp,
            Pair::AF => cpu.r.get_af(),
        }
    }

    pub fn set(self, cpu: &mut CPU, value: u16) {
        match self {
            Pair::BC => cpu.r.set_bc(value),
            Pair::DE => cpu.r.set_de(value),
            Pair::HL => cpu.r.set_hl(value),
            Pair::SP => cpu.sp = value,
            Pair::AF => cpu.r.set_af(value),
        }
    }
}

/// A branch condition, as selected by the `cc` opcode field (bits 4:3 when
/// bit 5 is clear): 0=NZ,1=Z,2=NC,3=C.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Condition {
    NotZero,
    Zero,
    NotCarry,
    Carry,
    Always,
}

impl Condition {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Condition::NotZero,
            1 => Condition::Zero,
            2 => Condition::NotCarry,
            3 => Condition::Carry,
            _ => unreachable!(),
        }
    }

    pub fn test(self, cpu: &CPU) -> bool {
        use crate::gb::cpu::registers::FlagsRegister;
        match self {
            Condition::NotZero => !cpu.r.f.contains(FlagsRegister::ZERO),
            Condition::Zero => cpu.r.f.contains(FlagsRegister::ZERO),
            Condition::NotCarry => !cpu.r.f.contains(FlagsRegister::CARRY),
            Condition::Carry => cpu.r.f.contains(FlagsRegister::CARRY),
            Condition::Always => true,
        }
    }
}
