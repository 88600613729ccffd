use thiserror::Error;

/// Errors that can be raised while loading a ROM or running the core.
///
/// Anything the hardware itself treats as well-defined behaviour (masked
/// writes, echo-RAM mirroring, reads from the unusable region) is never
/// represented here - it simply never fails.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GbError {
    #[error("illegal instruction {opcode:#04x} at pc {pc:#06x}")]
    IllegalInstruction { opcode: u8, pc: u16 },

    #[error("unable to load ROM: {0}")]
    RomLoad(String),

    #[error("frame watchdog triggered: exceeded {0} cycles without completing a frame")]
    FrameTimeout(u32),
}

pub type GbResult<T> = Result<T, GbError>;
