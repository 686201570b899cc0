use crate::error::Fault;
use crate::instruction::Instruction;
use crate::state::{Address, NUM_REGISTERS};

/// What a single step did to the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    /// Address the opcode was fetched from.
    pub pc: Address,
    /// Raw opcode, absent when the fetch itself failed.
    pub opcode: Option<u16>,
    pub outcome: Result<Instruction, Fault>,
    pub registers_before: [u8; NUM_REGISTERS],
    pub registers_after: [u8; NUM_REGISTERS],
    pub index_before: Address,
    pub index_after: Address,
    pub pc_after: Address,
}

impl TraceEvent {
    /// Registers whose value changed, as `(index, before, after)`.
    pub fn changed_registers(&self) -> impl Iterator<Item = (usize, u8, u8)> + '_ {
        self.registers_before
            .iter()
            .zip(&self.registers_after)
            .enumerate()
            .filter(|(_, (before, after))| before != after)
            .map(|(i, (&before, &after))| (i, before, after))
    }
}

/// Receives a [`TraceEvent`] after every step.
pub trait Observer {
    fn observe(&mut self, event: &TraceEvent);
}

impl<F: FnMut(&TraceEvent)> Observer for F {
    fn observe(&mut self, event: &TraceEvent) {
        self(event)
    }
}
