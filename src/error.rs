use thiserror::Error;

use crate::state::Address;

/// Returned by [`crate::chip8::Chip8::load`] when the ROM does not fit in program memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("ROM is too large ({size} bytes), max size is {max_size} bytes")]
pub struct RomTooLarge {
    pub size: usize,
    pub max_size: usize,
}

/// Conditions reported by a single step of the engine.
///
/// None of these halt the machine. Apart from `ProgramCounterOutOfBounds`,
/// the program counter has already moved past the offending instruction when
/// the fault is reported, so the next step continues with the following one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("Unrecognized opcode: {opcode:#06X}")]
    UnrecognizedOpcode { opcode: u16 },

    #[error("Stack overflow: call to {target:#05X} with a full call stack")]
    StackOverflow { target: Address },

    #[error("Stack underflow: no return address available")]
    StackUnderflow,

    #[error("Program counter out of bounds: {pc:#06X}")]
    ProgramCounterOutOfBounds { pc: Address },

    #[error("Memory access out of bounds at address {address:#06X}")]
    MemoryOutOfBounds { address: usize },
}
