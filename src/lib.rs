//! A CHIP-8 execution engine.
//!
//! [`Chip8`] owns the whole machine and exposes one call per instruction
//! ([`Chip8::step`]) and one per 60 Hz timer tick ([`Chip8::tick_timers`]).
//! Loading ROM files, drawing the pixel buffer, playing the tone and reading
//! the host keyboard are left to the caller.

pub mod chip8;
pub mod display;
pub mod error;
pub mod instruction;
pub mod state;
pub mod trace;

pub use chip8::{Chip8, StepOutcome};
pub use display::{DISPLAY_HEIGHT, DISPLAY_WIDTH, PixelBuffer};
pub use error::{Fault, RomTooLarge};
pub use instruction::{Instruction, decode};
pub use state::{Key, Register};
pub use trace::{Observer, TraceEvent};
