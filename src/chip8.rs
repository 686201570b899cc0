use log::{info, trace, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::display::PixelBuffer;
use crate::error::{Fault, RomTooLarge};
use crate::instruction::{Instruction, decode};
use crate::state::{Address, Chip8State, Key, MEM_SIZE, NUM_KEYS, Timer};
use crate::trace::{Observer, TraceEvent};

/// The instruction that ran, or why nothing (or only part of the cycle) happened.
pub type StepOutcome = Result<Instruction, Fault>;

/// # Chip-8
/// The execution engine. Owns the machine state and advances it one
/// instruction per [`step`](Chip8::step), with timers decremented separately
/// by [`tick_timers`](Chip8::tick_timers) at whatever cadence the host keeps.
pub struct Chip8 {
    state: Chip8State,
    rng: StdRng,
    observer: Option<Box<dyn Observer>>,
}

impl Chip8 {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// An engine whose `CXNN` results are reproducible.
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Chip8 {
            state: Chip8State::new(),
            rng,
            observer: None,
        }
    }

    /// Registers `observer` to receive a [`TraceEvent`] after every step, replacing any previous one.
    pub fn set_observer(&mut self, observer: impl Observer + 'static) {
        self.observer = Some(Box::new(observer));
    }

    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    /// Zeroes memory, registers, stack, timers, keypad and pixels, then reloads the font.
    pub fn reset(&mut self) {
        self.state.reset();
        info!("Machine reset");
    }

    /// Copies `rom` into program memory starting at 0x200.
    pub fn load(&mut self, rom: &[u8]) -> Result<(), RomTooLarge> {
        self.state.memory.load_rom(rom)?;
        info!("Loaded ROM [size: {}]", rom.len());
        Ok(())
    }

    /// Fetches, decodes and executes exactly one instruction.
    pub fn step(&mut self) -> StepOutcome {
        let pc = self.state.pc;
        let registers_before = self.state.registers.values();
        let index_before = self.state.index;

        let mut opcode = None;
        let outcome = match self.fetch() {
            Ok(raw) => {
                opcode = Some(raw);
                self.execute(raw)
            }
            Err(fault) => Err(fault),
        };

        match &outcome {
            Ok(instruction) if instruction.is_control_flow() => {
                trace!("{pc:#05X}: {instruction} -> {:#05X}", self.state.pc)
            }
            Ok(instruction) => trace!("{pc:#05X}: {instruction}"),
            Err(fault) => warn!("{pc:#05X}: {fault}"),
        }

        if let Some(observer) = self.observer.as_mut() {
            observer.observe(&TraceEvent {
                pc,
                opcode,
                outcome,
                registers_before,
                registers_after: self.state.registers.values(),
                index_before,
                index_after: self.state.index,
                pc_after: self.state.pc,
            });
        }
        outcome
    }

    /// Reads the opcode at PC and moves PC past it.
    fn fetch(&mut self) -> Result<u16, Fault> {
        let pc = self.state.pc;
        if usize::from(pc) + 1 >= MEM_SIZE {
            return Err(Fault::ProgramCounterOutOfBounds { pc });
        }
        let raw = self.state.memory.read_opcode(usize::from(pc))?;

        // Move the program counter to next instruction
        self.state.pc = pc + 2;
        Ok(raw)
    }

    fn execute(&mut self, raw: u16) -> StepOutcome {
        let instruction = decode(raw).ok_or(Fault::UnrecognizedOpcode { opcode: raw })?;
        instruction.execute(&mut self.state, &mut self.rng)?;
        Ok(instruction)
    }

    /// Decrements both timers by one, stopping at zero.
    pub fn tick_timers(&mut self) {
        self.state.delay_timer = self.state.delay_timer.saturating_sub(1);
        self.state.sound_timer = self.state.sound_timer.saturating_sub(1);
    }

    pub fn set_key(&mut self, key: Key, pressed: bool) {
        self.state.keypad.set_key(key, pressed);
    }

    pub fn release_keys(&mut self) {
        self.state.keypad.release_all();
    }

    pub fn keys(&self) -> [bool; NUM_KEYS] {
        self.state.keypad.snapshot()
    }

    pub fn pixels(&self) -> &PixelBuffer {
        &self.state.display
    }

    pub fn sound_timer(&self) -> Timer {
        self.state.sound_timer
    }

    pub fn delay_timer(&self) -> Timer {
        self.state.delay_timer
    }

    pub fn pc(&self) -> Address {
        self.state.pc
    }

    pub fn state(&self) -> &Chip8State {
        &self.state
    }
}

impl Default for Chip8 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{PC_START_ADDR, Register};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn chip8_with_rom(rom: &[u8]) -> Chip8 {
        let mut chip8 = Chip8::with_seed(0);
        chip8.load(rom).unwrap();
        chip8
    }

    #[test]
    fn step_fetches_big_endian_and_advances() {
        let mut chip8 = chip8_with_rom(&[0x6A, 0x42]);
        assert_eq!(
            chip8.step(),
            Ok(Instruction::SetImmediate {
                x: Register::VA,
                nn: 0x42
            })
        );
        assert_eq!(chip8.state().registers.read(Register::VA), 0x42);
        assert_eq!(chip8.pc(), PC_START_ADDR + 2);
    }

    #[test]
    fn unrecognized_opcode_still_advances() {
        let mut chip8 = chip8_with_rom(&[0xFF, 0xFF, 0x60, 0x01]);
        let before = chip8.state().clone();
        assert_eq!(
            chip8.step(),
            Err(Fault::UnrecognizedOpcode { opcode: 0xFFFF })
        );
        assert_eq!(chip8.pc(), PC_START_ADDR + 2);
        assert_eq!(chip8.state().registers, before.registers);
        assert_eq!(chip8.state().memory, before.memory);
        assert!(chip8.step().is_ok());
    }

    #[test]
    fn return_with_empty_stack_underflows() {
        let mut chip8 = chip8_with_rom(&[0x00, 0xEE]);
        assert_eq!(chip8.step(), Err(Fault::StackUnderflow));
        assert_eq!(chip8.pc(), PC_START_ADDR + 2);
        assert_eq!(chip8.state().stack.pointer(), 0);
    }

    #[test]
    fn fetch_at_last_byte_is_out_of_bounds() {
        let mut chip8 = chip8_with_rom(&[0x1F, 0xFF]);
        chip8.step().unwrap();
        assert_eq!(chip8.pc(), 0xFFF);
        assert_eq!(
            chip8.step(),
            Err(Fault::ProgramCounterOutOfBounds { pc: 0xFFF })
        );
        assert_eq!(chip8.pc(), 0xFFF);
    }

    #[test]
    fn fetch_at_last_full_word_is_allowed() {
        let mut chip8 = chip8_with_rom(&[0x1F, 0xFE]);
        chip8.step().unwrap();
        assert_eq!(
            chip8.step(),
            Err(Fault::UnrecognizedOpcode { opcode: 0x0000 })
        );
        assert_eq!(usize::from(chip8.pc()), MEM_SIZE);
    }

    #[test]
    fn timers_tick_down_to_zero() {
        // LD V0, 2; LD DT, V0; LD ST, V0
        let mut chip8 = chip8_with_rom(&[0x60, 0x02, 0xF0, 0x15, 0xF0, 0x18]);
        for _ in 0..3 {
            chip8.step().unwrap();
        }
        assert_eq!((chip8.delay_timer(), chip8.sound_timer()), (2, 2));
        chip8.tick_timers();
        assert_eq!((chip8.delay_timer(), chip8.sound_timer()), (1, 1));
        chip8.tick_timers();
        chip8.tick_timers();
        assert_eq!((chip8.delay_timer(), chip8.sound_timer()), (0, 0));
    }

    #[test]
    fn keys_round_trip() {
        let mut chip8 = Chip8::with_seed(0);
        chip8.set_key(Key::KeyB, true);
        let keys = chip8.keys();
        assert!(keys[0xB]);
        assert_eq!(keys.iter().filter(|&&pressed| pressed).count(), 1);
        chip8.release_keys();
        assert_eq!(chip8.keys(), [false; NUM_KEYS]);
    }

    #[test]
    fn same_seed_same_random_values() {
        let rom = [0xC0, 0xFF, 0xC1, 0xFF, 0xC2, 0xFF];
        let mut a = chip8_with_rom(&rom);
        let mut b = chip8_with_rom(&rom);
        for _ in 0..3 {
            a.step().unwrap();
            b.step().unwrap();
        }
        assert_eq!(a.state().registers, b.state().registers);
    }

    #[test]
    fn observer_sees_register_delta() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);

        let mut chip8 = chip8_with_rom(&[0x63, 0x07, 0xA1, 0x23, 0xFF, 0xFF]);
        chip8.set_observer(move |event: &TraceEvent| sink.borrow_mut().push(event.clone()));
        for _ in 0..3 {
            let _ = chip8.step();
        }

        let events = events.borrow();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].opcode, Some(0x6307));
        assert_eq!(events[0].changed_registers().collect::<Vec<_>>(), vec![(3, 0, 7)]);
        assert_eq!(events[0].pc_after, PC_START_ADDR + 2);
        assert_eq!((events[1].index_before, events[1].index_after), (0, 0x123));
        assert_eq!(
            events[2].outcome,
            Err(Fault::UnrecognizedOpcode { opcode: 0xFFFF })
        );
    }
}
