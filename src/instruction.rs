use std::fmt;

use rand::Rng;

use crate::display::{DISPLAY_HEIGHT, DISPLAY_WIDTH};
use crate::error::Fault;
use crate::state::{Address, Chip8State, FONT_ADDR, FONT_HEIGHT, Key, Register};

/// Operand fields shared by every opcode shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operands {
    /// First nibble. Selects the instruction family.
    pub opcode: u8,
    /// Second nibble. Used to look up one of the 16 registers.
    pub x: Register,
    /// Third nibble. Used to look up one of the 16 registers.
    pub y: Register,
    /// Fourth nibble. A 4-bit number.
    pub n: u8,
    /// The second byte (third and fourth nibbles). An 8-bit immediate number.
    pub nn: u8,
    /// The second, third, and fourth nibbles. A 12-bit immediate address.
    pub nnn: Address,
}
impl Operands {
    pub fn new(raw: u16) -> Self {
        Operands {
            opcode: (raw >> 12) as u8,
            x: Register::from_nibble((raw >> 8) as u8),
            y: Register::from_nibble((raw >> 4) as u8),
            n: (raw & 0x0F) as u8,
            nn: (raw & 0x00FF) as u8,
            nnn: raw & 0x0FFF,
        }
    }
}

/// One decoded CHIP-8 instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// `00E0`
    ClearScreen,
    /// `00EE`
    SubroutineReturn,
    /// `1NNN`
    Jump { nnn: Address },
    /// `2NNN`
    SubroutineCall { nnn: Address },
    /// `3XNN`
    SkipEqImmediate { x: Register, nn: u8 },
    /// `4XNN`
    SkipNeqImmediate { x: Register, nn: u8 },
    /// `5XY0`
    SkipXEqY { x: Register, y: Register },
    /// `6XNN`
    SetImmediate { x: Register, nn: u8 },
    /// `7XNN`, never touches VF.
    AddImmediate { x: Register, nn: u8 },
    /// `8XY0`
    SetXToY { x: Register, y: Register },
    /// `8XY1`
    BinaryOr { x: Register, y: Register },
    /// `8XY2`
    BinaryAnd { x: Register, y: Register },
    /// `8XY3`
    LogicalXor { x: Register, y: Register },
    /// `8XY4`
    BinaryAdd { x: Register, y: Register },
    /// `8XY5`
    SubtractYFromX { x: Register, y: Register },
    /// `8XY6`
    RightShift { x: Register, y: Register },
    /// `8XY7`
    SubtractXFromY { x: Register, y: Register },
    /// `8XYE`
    LeftShift { x: Register, y: Register },
    /// `9XY0`
    SkipXNeqY { x: Register, y: Register },
    /// `ANNN`
    SetIndex { nnn: Address },
    /// `BNNN`
    JumpWithOffset { nnn: Address },
    /// `CXNN`
    Random { x: Register, nn: u8 },
    /// `DXYN`
    Draw { x: Register, y: Register, n: u8 },
    /// `EX9E`
    SkipIfKeyPressed { x: Register },
    /// `EXA1`
    SkipIfKeyNotPressed { x: Register },
    /// `FX07`
    SetVxFromTimer { x: Register },
    /// `FX0A`
    GetKey { x: Register },
    /// `FX15`
    SetDelayTimer { x: Register },
    /// `FX18`
    SetSoundTimer { x: Register },
    /// `FX1E`
    AddToIndex { x: Register },
    /// `FX29`
    FontChar { x: Register },
    /// `FX33`
    BinaryCodedDecimal { x: Register },
    /// `FX55`
    Store { x: Register },
    /// `FX65`
    Load { x: Register },
}

/// Maps a raw opcode to its instruction, or `None` for opcodes outside the instruction set.
pub fn decode(raw: u16) -> Option<Instruction> {
    use Instruction::*;

    let Operands {
        opcode,
        x,
        y,
        n,
        nn,
        nnn,
    } = Operands::new(raw);

    let instruction = match opcode {
        0x0 => match nnn {
            0x0E0 => ClearScreen,
            0x0EE => SubroutineReturn,
            _ => return None,
        },
        0x1 => Jump { nnn },
        0x2 => SubroutineCall { nnn },
        0x3 => SkipEqImmediate { x, nn },
        0x4 => SkipNeqImmediate { x, nn },
        0x5 if n == 0x0 => SkipXEqY { x, y },
        0x6 => SetImmediate { x, nn },
        0x7 => AddImmediate { x, nn },
        0x8 => match n {
            0x0 => SetXToY { x, y },
            0x1 => BinaryOr { x, y },
            0x2 => BinaryAnd { x, y },
            0x3 => LogicalXor { x, y },
            0x4 => BinaryAdd { x, y },
            0x5 => SubtractYFromX { x, y },
            0x6 => RightShift { x, y },
            0x7 => SubtractXFromY { x, y },
            0xE => LeftShift { x, y },
            _ => return None,
        },
        0x9 if n == 0x0 => SkipXNeqY { x, y },
        0xA => SetIndex { nnn },
        0xB => JumpWithOffset { nnn },
        0xC => Random { x, nn },
        0xD => Draw { x, y, n },
        0xE => match nn {
            0x9E => SkipIfKeyPressed { x },
            0xA1 => SkipIfKeyNotPressed { x },
            _ => return None,
        },
        0xF => match nn {
            0x07 => SetVxFromTimer { x },
            0x0A => GetKey { x },
            0x15 => SetDelayTimer { x },
            0x18 => SetSoundTimer { x },
            0x1E => AddToIndex { x },
            0x29 => FontChar { x },
            0x33 => BinaryCodedDecimal { x },
            0x55 => Store { x },
            0x65 => Load { x },
            _ => return None,
        },
        _ => return None,
    };
    Some(instruction)
}

impl Instruction {
    /// Applies the instruction to `state`.
    ///
    /// `state.pc` must already point past this instruction. On error the
    /// state is left as it was before the call.
    pub fn execute<R: Rng>(self, state: &mut Chip8State, rng: &mut R) -> Result<(), Fault> {
        use Instruction::*;

        match self {
            ClearScreen => state.clear_display(),
            SubroutineReturn => state.pc = state.stack.pop()?,
            Jump { nnn } => state.pc = nnn,
            SubroutineCall { nnn } => {
                state.stack.push(state.pc, nnn)?;
                state.pc = nnn;
            }
            SkipEqImmediate { x, nn } => {
                if state.registers.read(x) == nn {
                    state.skip_next();
                }
            }
            SkipNeqImmediate { x, nn } => {
                if state.registers.read(x) != nn {
                    state.skip_next();
                }
            }
            SkipXEqY { x, y } => {
                if state.registers.read(x) == state.registers.read(y) {
                    state.skip_next();
                }
            }
            SkipXNeqY { x, y } => {
                if state.registers.read(x) != state.registers.read(y) {
                    state.skip_next();
                }
            }
            SetImmediate { x, nn } => state.registers.write(x, nn),
            AddImmediate { x, nn } => {
                let value_x = state.registers.read(x);
                state.registers.write(x, value_x.wrapping_add(nn));
            }
            SetXToY { x, y } => {
                let value_y = state.registers.read(y);
                state.registers.write(x, value_y);
            }
            BinaryOr { x, y } => logic(state, x, y, |a, b| a | b),
            BinaryAnd { x, y } => logic(state, x, y, |a, b| a & b),
            LogicalXor { x, y } => logic(state, x, y, |a, b| a ^ b),
            BinaryAdd { x, y } => {
                let (sum, carry) = state
                    .registers
                    .read(x)
                    .overflowing_add(state.registers.read(y));
                state.registers.write(x, sum);
                state.registers.write(Register::VF, u8::from(carry));
            }
            SubtractYFromX { x, y } => {
                let value_x = state.registers.read(x);
                let value_y = state.registers.read(y);
                state.registers.write(x, value_x.wrapping_sub(value_y));
                state.registers.write(Register::VF, u8::from(value_x >= value_y));
            }
            SubtractXFromY { x, y } => {
                let value_x = state.registers.read(x);
                let value_y = state.registers.read(y);
                state.registers.write(x, value_y.wrapping_sub(value_x));
                state.registers.write(Register::VF, u8::from(value_y >= value_x));
            }
            RightShift { x, y } => {
                let value_y = state.registers.read(y);
                state.registers.write(x, value_y >> 1);
                state.registers.write(Register::VF, value_y & 0x01);
            }
            LeftShift { x, y } => {
                let value_y = state.registers.read(y);
                state.registers.write(x, value_y << 1);
                state.registers.write(Register::VF, (value_y & 0x80) >> 7);
            }
            SetIndex { nnn } => state.index = nnn,
            JumpWithOffset { nnn } => {
                state.pc = Address::from(state.registers.read(Register::V0)) + nnn;
            }
            Random { x, nn } => {
                let random_value = rng.random::<u8>() & nn;
                state.registers.write(x, random_value);
            }
            Draw { x, y, n } => {
                let origin_x = usize::from(state.registers.read(x)) % DISPLAY_WIDTH;
                let origin_y = usize::from(state.registers.read(y)) % DISPLAY_HEIGHT;
                let collision = state.draw_sprite(origin_x, origin_y, n)?;
                state.registers.write(Register::VF, u8::from(collision));
            }
            SkipIfKeyPressed { x } => {
                if state.keypad.is_key_pressed(key_in(state, x)) {
                    state.skip_next();
                }
            }
            SkipIfKeyNotPressed { x } => {
                if !state.keypad.is_key_pressed(key_in(state, x)) {
                    state.skip_next();
                }
            }
            SetVxFromTimer { x } => state.registers.write(x, state.delay_timer),
            GetKey { x } => match state.keypad.first_pressed() {
                Some(key) => state.registers.write(x, key.index()),
                // Rewind so the same instruction runs again next step
                None => state.pc = state.pc.wrapping_sub(2),
            },
            SetDelayTimer { x } => state.delay_timer = state.registers.read(x),
            SetSoundTimer { x } => state.sound_timer = state.registers.read(x),
            AddToIndex { x } => {
                let value_x = state.registers.read(x);
                state.index = state.index.wrapping_add(Address::from(value_x));
            }
            FontChar { x } => {
                let digit = state.registers.read(x) & 0x0F;
                state.index = FONT_ADDR + Address::from(digit) * FONT_HEIGHT as Address;
            }
            BinaryCodedDecimal { x } => {
                let value_x = state.registers.read(x);
                let bcd = [value_x / 100, (value_x / 10) % 10, value_x % 10];
                state
                    .memory
                    .slice_mut(usize::from(state.index), bcd.len())?
                    .copy_from_slice(&bcd);
            }
            Store { x } => {
                let count = x.index() + 1;
                let values = state.registers.values();
                state
                    .memory
                    .slice_mut(usize::from(state.index), count)?
                    .copy_from_slice(&values[..count]);
                state.index = state.index.wrapping_add(count as Address);
            }
            Load { x } => {
                let count = x.index() + 1;
                let mut values = [0; 16];
                values[..count]
                    .copy_from_slice(state.memory.slice(usize::from(state.index), count)?);
                for (&reg, &value) in Register::ALL[..count].iter().zip(&values[..count]) {
                    state.registers.write(reg, value);
                }
                state.index = state.index.wrapping_add(count as Address);
            }
        }
        Ok(())
    }

    /// True for instructions that set the program counter themselves.
    pub fn is_control_flow(self) -> bool {
        matches!(
            self,
            Instruction::Jump { .. }
                | Instruction::SubroutineCall { .. }
                | Instruction::SubroutineReturn
                | Instruction::JumpWithOffset { .. }
        )
    }
}

fn logic(state: &mut Chip8State, x: Register, y: Register, op: impl Fn(u8, u8) -> u8) {
    let value_x = state.registers.read(x);
    let value_y = state.registers.read(y);
    state.registers.write(x, op(value_x, value_y));
    state.registers.write(Register::VF, 0);
}

fn key_in(state: &Chip8State, reg: Register) -> Key {
    Key::ALL[usize::from(state.registers.read(reg) & 0x0F)]
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;

        match *self {
            ClearScreen => write!(f, "CLS"),
            SubroutineReturn => write!(f, "RET"),
            Jump { nnn } => write!(f, "JP {nnn:#05X}"),
            SubroutineCall { nnn } => write!(f, "CALL {nnn:#05X}"),
            SkipEqImmediate { x, nn } => write!(f, "SE {x:?}, {nn:#04X}"),
            SkipNeqImmediate { x, nn } => write!(f, "SNE {x:?}, {nn:#04X}"),
            SkipXEqY { x, y } => write!(f, "SE {x:?}, {y:?}"),
            SetImmediate { x, nn } => write!(f, "LD {x:?}, {nn:#04X}"),
            AddImmediate { x, nn } => write!(f, "ADD {x:?}, {nn:#04X}"),
            SetXToY { x, y } => write!(f, "LD {x:?}, {y:?}"),
            BinaryOr { x, y } => write!(f, "OR {x:?}, {y:?}"),
            BinaryAnd { x, y } => write!(f, "AND {x:?}, {y:?}"),
            LogicalXor { x, y } => write!(f, "XOR {x:?}, {y:?}"),
            BinaryAdd { x, y } => write!(f, "ADD {x:?}, {y:?}"),
            SubtractYFromX { x, y } => write!(f, "SUB {x:?}, {y:?}"),
            RightShift { x, y } => write!(f, "SHR {x:?}, {y:?}"),
            SubtractXFromY { x, y } => write!(f, "SUBN {x:?}, {y:?}"),
            LeftShift { x, y } => write!(f, "SHL {x:?}, {y:?}"),
            SkipXNeqY { x, y } => write!(f, "SNE {x:?}, {y:?}"),
            SetIndex { nnn } => write!(f, "LD I, {nnn:#05X}"),
            JumpWithOffset { nnn } => write!(f, "JP V0, {nnn:#05X}"),
            Random { x, nn } => write!(f, "RND {x:?}, {nn:#04X}"),
            Draw { x, y, n } => write!(f, "DRW {x:?}, {y:?}, {n}"),
            SkipIfKeyPressed { x } => write!(f, "SKP {x:?}"),
            SkipIfKeyNotPressed { x } => write!(f, "SKNP {x:?}"),
            SetVxFromTimer { x } => write!(f, "LD {x:?}, DT"),
            GetKey { x } => write!(f, "LD {x:?}, K"),
            SetDelayTimer { x } => write!(f, "LD DT, {x:?}"),
            SetSoundTimer { x } => write!(f, "LD ST, {x:?}"),
            AddToIndex { x } => write!(f, "ADD I, {x:?}"),
            FontChar { x } => write!(f, "LD F, {x:?}"),
            BinaryCodedDecimal { x } => write!(f, "LD B, {x:?}"),
            Store { x } => write!(f, "LD [I], {x:?}"),
            Load { x } => write!(f, "LD {x:?}, [I]"),
        }
    }
}
