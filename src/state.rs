use crate::display::{FONT_SET, PixelBuffer};
use crate::error::{Fault, RomTooLarge};

pub type Timer = u8;
pub type Address = u16;

pub const MEM_SIZE: usize = 4096;
pub const FONT_ADDR: Address = 0x50;
pub const FONT_HEIGHT: usize = 5;
pub const PC_START_ADDR: Address = 0x200;
pub const MAX_ROM_SIZE: usize = MEM_SIZE - PC_START_ADDR as usize;
pub const NUM_REGISTERS: usize = 16;
pub const NUM_KEYS: usize = 16;
pub const STACK_SIZE: usize = 16;

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Memory {
    data: [u8; MEM_SIZE],
}
impl Memory {
    /// Zeroed memory with the font glyphs in the reserved area.
    pub fn new() -> Self {
        let mut data = [0; MEM_SIZE];
        for (glyph, sprite) in FONT_SET.iter().enumerate() {
            let start = usize::from(FONT_ADDR) + glyph * FONT_HEIGHT;
            data[start..start + FONT_HEIGHT].copy_from_slice(sprite.as_bytes());
        }

        Memory { data }
    }

    pub fn read(&self, addr: usize) -> Result<u8, Fault> {
        self.data
            .get(addr)
            .copied()
            .ok_or(Fault::MemoryOutOfBounds { address: addr })
    }

    pub fn write(&mut self, addr: usize, value: u8) -> Result<(), Fault> {
        let cell = self
            .data
            .get_mut(addr)
            .ok_or(Fault::MemoryOutOfBounds { address: addr })?;
        *cell = value;
        Ok(())
    }

    /// Reads the big-endian opcode stored at `addr` and `addr + 1`.
    pub fn read_opcode(&self, addr: usize) -> Result<u16, Fault> {
        let high_byte = u16::from(self.read(addr)?);
        let low_byte = u16::from(self.read(addr + 1)?);
        Ok((high_byte << 8) | low_byte)
    }

    pub fn load_rom(&mut self, rom: &[u8]) -> Result<(), RomTooLarge> {
        if rom.len() > MAX_ROM_SIZE {
            return Err(RomTooLarge {
                size: rom.len(),
                max_size: MAX_ROM_SIZE,
            });
        }
        let start = usize::from(PC_START_ADDR);
        self.data[start..start + rom.len()].copy_from_slice(rom);
        Ok(())
    }

    /// Borrows `len` bytes starting at `addr`, failing if any of them lies past the end of memory.
    pub fn slice(&self, addr: usize, len: usize) -> Result<&[u8], Fault> {
        self.data
            .get(addr..addr + len)
            .ok_or(Fault::MemoryOutOfBounds {
                address: (addr + len).saturating_sub(1),
            })
    }

    pub fn slice_mut(&mut self, addr: usize, len: usize) -> Result<&mut [u8], Fault> {
        self.data
            .get_mut(addr..addr + len)
            .ok_or(Fault::MemoryOutOfBounds {
                address: (addr + len).saturating_sub(1),
            })
    }

    pub fn as_bytes(&self) -> &[u8; MEM_SIZE] {
        &self.data
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Register {
    V0,
    V1,
    V2,
    V3,
    V4,
    V5,
    V6,
    V7,
    V8,
    V9,
    VA,
    VB,
    VC,
    VD,
    VE,
    VF,
}
impl Register {
    pub const ALL: [Register; NUM_REGISTERS] = [
        Register::V0,
        Register::V1,
        Register::V2,
        Register::V3,
        Register::V4,
        Register::V5,
        Register::V6,
        Register::V7,
        Register::V8,
        Register::V9,
        Register::VA,
        Register::VB,
        Register::VC,
        Register::VD,
        Register::VE,
        Register::VF,
    ];

    /// Only the low four bits of `nibble` are used.
    pub fn from_nibble(nibble: u8) -> Self {
        Self::ALL[usize::from(nibble & 0x0F)]
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RegisterBank {
    registers: [u8; NUM_REGISTERS],
}
impl RegisterBank {
    pub fn new() -> Self {
        RegisterBank {
            registers: [0; NUM_REGISTERS],
        }
    }

    pub fn read(&self, reg: Register) -> u8 {
        self.registers[reg as usize]
    }

    pub fn write(&mut self, reg: Register, value: u8) {
        self.registers[reg as usize] = value;
    }

    pub fn values(&self) -> [u8; NUM_REGISTERS] {
        self.registers
    }
}

impl Default for RegisterBank {
    fn default() -> Self {
        Self::new()
    }
}

/// Return addresses for `CALL`/`RET`, bounded at [`STACK_SIZE`] entries.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct CallStack {
    slots: [Address; STACK_SIZE],
    pointer: usize,
}
impl CallStack {
    pub fn new() -> Self {
        CallStack {
            slots: [0; STACK_SIZE],
            pointer: 0,
        }
    }

    pub fn push(&mut self, return_address: Address, target: Address) -> Result<(), Fault> {
        if self.pointer == STACK_SIZE {
            return Err(Fault::StackOverflow { target });
        }
        self.slots[self.pointer] = return_address;
        self.pointer += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Address, Fault> {
        if self.pointer == 0 {
            return Err(Fault::StackUnderflow);
        }
        self.pointer -= 1;
        Ok(self.slots[self.pointer])
    }

    pub fn pointer(&self) -> usize {
        self.pointer
    }

    pub fn slots(&self) -> &[Address; STACK_SIZE] {
        &self.slots
    }
}

impl Default for CallStack {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Key {
    Key0,
    Key1,
    Key2,
    Key3,
    Key4,
    Key5,
    Key6,
    Key7,
    Key8,
    Key9,
    KeyA,
    KeyB,
    KeyC,
    KeyD,
    KeyE,
    KeyF,
}
impl Key {
    pub const ALL: [Key; NUM_KEYS] = [
        Key::Key0,
        Key::Key1,
        Key::Key2,
        Key::Key3,
        Key::Key4,
        Key::Key5,
        Key::Key6,
        Key::Key7,
        Key::Key8,
        Key::Key9,
        Key::KeyA,
        Key::KeyB,
        Key::KeyC,
        Key::KeyD,
        Key::KeyE,
        Key::KeyF,
    ];

    pub fn from_index(index: u8) -> Option<Key> {
        Self::ALL.get(usize::from(index)).copied()
    }

    pub fn index(self) -> u8 {
        self as u8
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Keypad {
    pressed: [bool; NUM_KEYS],
}
impl Keypad {
    pub fn new() -> Self {
        Keypad {
            pressed: [false; NUM_KEYS],
        }
    }

    pub fn set_key(&mut self, key: Key, pressed: bool) {
        self.pressed[key as usize] = pressed;
    }

    pub fn release_all(&mut self) {
        self.pressed = [false; NUM_KEYS];
    }

    pub fn is_key_pressed(&self, key: Key) -> bool {
        self.pressed[key as usize]
    }

    /// Lowest-numbered key currently held down.
    pub fn first_pressed(&self) -> Option<Key> {
        Key::ALL.into_iter().find(|&key| self.is_key_pressed(key))
    }

    pub fn snapshot(&self) -> [bool; NUM_KEYS] {
        self.pressed
    }
}

impl Default for Keypad {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the engine owns: memory, registers, stack, timers, keypad and pixels.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Chip8State {
    pub memory: Memory,
    pub registers: RegisterBank,
    pub pc: Address,
    pub index: Address,
    pub stack: CallStack,
    pub delay_timer: Timer,
    pub sound_timer: Timer,
    pub display: PixelBuffer,
    pub keypad: Keypad,
}
impl Chip8State {
    pub fn new() -> Self {
        Chip8State {
            memory: Memory::new(),
            registers: RegisterBank::new(),
            pc: PC_START_ADDR,
            index: 0,
            stack: CallStack::new(),
            delay_timer: 0,
            sound_timer: 0,
            display: PixelBuffer::new(),
            keypad: Keypad::new(),
        }
    }

    pub fn reset(&mut self) {
        *self = Chip8State::new();
    }

    /// Skips the instruction following the one being executed.
    pub fn skip_next(&mut self) {
        self.pc = self.pc.wrapping_add(2);
    }

    pub fn clear_display(&mut self) {
        self.display.clear();
    }

    /// Draws `rows` bytes read from `I` at (`x`, `y`) and reports whether any lit pixel was turned off.
    pub fn draw_sprite(&mut self, x: usize, y: usize, rows: u8) -> Result<bool, Fault> {
        let sprite = self
            .memory
            .slice(usize::from(self.index), usize::from(rows))?;
        Ok(self.display.draw_sprite(x, y, sprite))
    }
}

impl Default for Chip8State {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_starts_with_font_glyphs() {
        let memory = Memory::new();
        let font = usize::from(FONT_ADDR);
        assert_eq!(memory.as_bytes()[font..font + 5], [0xF0, 0x90, 0x90, 0x90, 0xF0]);
        assert_eq!(
            memory.as_bytes()[font + 75..font + 80],
            [0xF0, 0x80, 0xF0, 0x80, 0x80]
        );
        assert!(memory.as_bytes()[..font].iter().all(|&b| b == 0));
        assert!(memory.as_bytes()[font + 80..].iter().all(|&b| b == 0));
    }

    #[test]
    fn rom_of_maximum_size_fits() {
        let mut memory = Memory::new();
        let rom = vec![0xAB; MAX_ROM_SIZE];
        assert!(memory.load_rom(&rom).is_ok());
        assert_eq!(memory.read(MEM_SIZE - 1), Ok(0xAB));
    }

    #[test]
    fn oversized_rom_leaves_memory_untouched() {
        let mut memory = Memory::new();
        let rom = vec![0xAB; MAX_ROM_SIZE + 1];
        assert_eq!(
            memory.load_rom(&rom),
            Err(RomTooLarge {
                size: MAX_ROM_SIZE + 1,
                max_size: MAX_ROM_SIZE,
            })
        );
        assert_eq!(memory, Memory::new());
    }

    #[test]
    fn out_of_bounds_access_is_reported() {
        let mut memory = Memory::new();
        assert_eq!(
            memory.read(MEM_SIZE),
            Err(Fault::MemoryOutOfBounds { address: MEM_SIZE })
        );
        assert!(memory.write(MEM_SIZE, 1).is_err());
        assert_eq!(
            memory.slice(MEM_SIZE - 2, 3),
            Err(Fault::MemoryOutOfBounds { address: MEM_SIZE })
        );
    }

    #[test]
    fn opcode_is_big_endian() {
        let mut memory = Memory::new();
        memory.load_rom(&[0xAA, 0xBB]).unwrap();
        assert_eq!(memory.read_opcode(usize::from(PC_START_ADDR)), Ok(0xAABB));
    }

    #[test]
    fn call_stack_is_bounded() {
        let mut stack = CallStack::new();
        for i in 0..STACK_SIZE as u16 {
            assert!(stack.push(0x200 + i * 2, 0x300).is_ok());
        }
        let full = stack.clone();
        assert_eq!(
            stack.push(0x400, 0x300),
            Err(Fault::StackOverflow { target: 0x300 })
        );
        assert_eq!(stack, full);

        for i in (0..STACK_SIZE as u16).rev() {
            assert_eq!(stack.pop(), Ok(0x200 + i * 2));
        }
        assert_eq!(stack.pop(), Err(Fault::StackUnderflow));
        assert_eq!(stack.pointer(), 0);
    }

    #[test]
    fn register_from_nibble_masks_high_bits() {
        assert_eq!(Register::from_nibble(0x0), Register::V0);
        assert_eq!(Register::from_nibble(0xF), Register::VF);
        assert_eq!(Register::from_nibble(0x1A), Register::VA);
    }

    #[test]
    fn keypad_reports_lowest_pressed_key() {
        let mut keypad = Keypad::new();
        assert_eq!(keypad.first_pressed(), None);
        keypad.set_key(Key::KeyC, true);
        keypad.set_key(Key::Key5, true);
        assert_eq!(keypad.first_pressed(), Some(Key::Key5));
        keypad.set_key(Key::Key5, false);
        assert_eq!(keypad.first_pressed(), Some(Key::KeyC));
        keypad.release_all();
        assert_eq!(keypad.snapshot(), [false; NUM_KEYS]);
    }

    #[test]
    fn key_from_index_rejects_values_past_f() {
        assert_eq!(Key::from_index(0xF), Some(Key::KeyF));
        assert_eq!(Key::from_index(0x10), None);
    }
}
