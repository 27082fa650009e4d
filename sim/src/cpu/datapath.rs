//! Register, memory and stack transfer layer.
//!
//! Each signal mutates exactly one part of the datapath state. The control
//! unit picks what a signal does through a selector, the same way a
//! multiplexer input would be wired in hardware, so a signal can only be
//! asked for a transfer it implements.

use std::collections::VecDeque;

use crate::{
    error::{Interrupt, RuntimeFault},
    isa::{AluOp, Word, INPUT_PORT, OUTPUT_PORT},
};

/// Initial content of every stack cell.
pub const STACK_SENTINEL: Word = -1;

/// Source of the effective address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrSel {
    /// `LOAD`: the top of stack holds the address.
    Tos,
    /// `POP`: the cell below the top holds the address.
    Sos,
}

/// Stack pointer adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpSel {
    Inc,
    Dec,
    Dec2,
}

impl SpSel {
    fn delta(self) -> isize {
        match self {
            SpSel::Inc => 1,
            SpSel::Dec => -1,
            SpSel::Dec2 => -2,
        }
    }
}

/// Value written to the top of stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TosSel {
    Literal(Word),
    /// Copy of the cell below the top.
    Sos,
    /// Memory (or the input port) at the latched data address.
    Memory,
    /// Current top plus one.
    Inc,
}

/// Value written to the cell below the top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SosSel {
    /// ALU result with the top as left and the second as right operand.
    Alu(AluOp),
    Literal(Word),
}

#[derive(Debug, Clone)]
pub struct DataPath {
    memory: Vec<Word>,
    stack: Vec<Word>,
    /// Index of the top of stack, `-1` when the stack is empty.
    stack_pointer: isize,
    data_address: Word,
    input: VecDeque<char>,
    output: Vec<Word>,
}

impl DataPath {
    pub fn new(memory: Vec<Word>, stack_size: usize, input: impl IntoIterator<Item = char>) -> Self {
        Self {
            memory,
            stack: vec![STACK_SENTINEL; stack_size],
            stack_pointer: -1,
            data_address: 0,
            input: input.into_iter().collect(),
            output: Vec::new(),
        }
    }

    pub fn memory(&self) -> &[Word] {
        &self.memory
    }
    pub fn stack(&self) -> &[Word] {
        &self.stack
    }
    pub fn stack_pointer(&self) -> isize {
        self.stack_pointer
    }
    pub fn data_address(&self) -> Word {
        self.data_address
    }
    pub fn output(&self) -> &[Word] {
        &self.output
    }
    /// Number of characters left in the input queue.
    pub fn input_remaining(&self) -> usize {
        self.input.len()
    }
    /// Top of stack, `None` if the stack is empty.
    pub fn top_of_stack(&self) -> Option<Word> {
        self.slot(0).ok().map(|i| self.stack[i])
    }

    pub fn into_output(self) -> Vec<Word> {
        self.output
    }

    /// Stack index `depth` cells below the top.
    fn slot(&self, depth: isize) -> Result<usize, RuntimeFault> {
        usize::try_from(self.stack_pointer - depth).map_err(|_| RuntimeFault::StackUnderflow)
    }
    fn tos(&self) -> Result<Word, RuntimeFault> {
        Ok(self.stack[self.slot(0)?])
    }
    fn sos(&self) -> Result<Word, RuntimeFault> {
        Ok(self.stack[self.slot(1)?])
    }
    fn set_tos(&mut self, value: Word) -> Result<(), RuntimeFault> {
        let i = self.slot(0)?;
        self.stack[i] = value;
        Ok(())
    }
    fn set_sos(&mut self, value: Word) -> Result<(), RuntimeFault> {
        let i = self.slot(1)?;
        self.stack[i] = value;
        Ok(())
    }
    fn cell(&self, addr: Word) -> Result<usize, RuntimeFault> {
        usize::try_from(addr)
            .ok()
            .filter(|&i| i < self.memory.len())
            .ok_or(RuntimeFault::BadAddress(addr))
    }

    pub fn latch_data_address(&mut self, sel: AddrSel) -> Result<(), RuntimeFault> {
        self.data_address = match sel {
            AddrSel::Tos => self.tos()?,
            AddrSel::Sos => self.sos()?,
        };
        Ok(())
    }

    /// Move the stack pointer. The new position must stay within
    /// `-1..capacity`.
    pub fn latch_stack_pointer(&mut self, sel: SpSel) -> Result<(), RuntimeFault> {
        let sp = self.stack_pointer + sel.delta();
        if sp < -1 {
            return Err(RuntimeFault::StackUnderflow);
        }
        if sp >= self.stack.len() as isize {
            return Err(RuntimeFault::StackOverflow(self.stack.len()));
        }
        self.stack_pointer = sp;
        Ok(())
    }

    pub fn latch_top_of_stack(&mut self, sel: TosSel) -> Result<(), Interrupt> {
        let value = match sel {
            TosSel::Literal(v) => v,
            TosSel::Sos => self.sos()?,
            TosSel::Memory if self.data_address == INPUT_PORT => return self.signal_input(),
            TosSel::Memory => self.memory[self.cell(self.data_address)?],
            TosSel::Inc => self.tos()?.wrapping_add(1),
        };
        Ok(self.set_tos(value)?)
    }

    pub fn latch_second_of_stack(&mut self, sel: SosSel) -> Result<(), RuntimeFault> {
        let value = match sel {
            SosSel::Alu(op) => Self::alu(op, self.tos()?, self.sos()?),
            SosSel::Literal(v) => v,
        };
        self.set_sos(value)
    }

    /// Store the top of stack at the latched data address.
    pub fn write_memory(&mut self) -> Result<(), RuntimeFault> {
        if self.data_address == OUTPUT_PORT {
            return self.signal_output();
        }
        let cell = self.cell(self.data_address)?;
        self.memory[cell] = self.tos()?;
        Ok(())
    }

    /// `right op left`, with floor semantics for division and `-1` as the
    /// result of a division by zero.
    pub fn alu(op: AluOp, left: Word, right: Word) -> Word {
        let (left, right) = (left as i64, right as i64);
        let res = match op {
            AluOp::Add => right + left,
            AluOp::Div if left == 0 => -1,
            AluOp::Mod if left == 0 => -1,
            AluOp::Div => {
                let q = right / left;
                if right % left != 0 && (right < 0) != (left < 0) {
                    q - 1
                } else {
                    q
                }
            }
            AluOp::Mod => {
                let r = right % left;
                if r != 0 && (r < 0) != (left < 0) {
                    r + left
                } else {
                    r
                }
            }
        };
        crate::isa::wrap_word(res)
    }

    fn signal_input(&mut self) -> Result<(), Interrupt> {
        let symbol = self.input.pop_front().ok_or(Interrupt::InputExhausted)?;
        Ok(self.set_tos(symbol as u32 as Word)?)
    }

    fn signal_output(&mut self) -> Result<(), RuntimeFault> {
        let symbol = self.tos()?;
        self.output.push(symbol);
        Ok(())
    }

    /// Whether the top of stack is zero.
    pub fn zero(&self) -> Result<bool, RuntimeFault> {
        Ok(self.tos()? == 0)
    }
}
