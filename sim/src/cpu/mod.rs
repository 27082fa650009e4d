//! The processor: a control unit sequencing signals over a datapath.
//!
//! One call to [`ControlUnit::decode_and_execute`] runs a full instruction
//! cycle. Fetching and advancing the program counter costs one tick, every
//! signal group that follows costs one more, and a final tick closes the
//! cycle (except for `HALT`, which stops right after the fetch).
//!
//! | Opcode         | Signals                                   | Ticks |
//! |----------------|-------------------------------------------|-------|
//! | HALT           | -                                         | 1     |
//! | JUMP, JZ       | latch PC                                  | 2     |
//! | PUSH, DUP      | latch SP, latch TOS                       | 3     |
//! | PUSH2          | latch SP, latch TOS, latch SOS            | 4     |
//! | POP            | latch DA, write memory + latch SP         | 3     |
//! | LOAD           | latch DA, latch TOS                       | 3     |
//! | DROP, INC      | latch SP / latch TOS                      | 2     |
//! | ADD, DIV, MOD  | latch SOS + latch SP                      | 2     |

pub mod datapath;

use std::fmt::Display;

use crate::{
    error::{Interrupt, RuntimeFault},
    isa::{Op, Opcode, Word},
    object::Instruction,
};
use datapath::{AddrSel, DataPath, SosSel, SpSel, TosSel};

/// Number of stack cells shown in a trace line.
pub const STACK_WINDOW: usize = 5;

pub struct ControlUnit<'a> {
    code: &'a [Instruction],
    program_counter: usize,
    instruction_register: Option<Instruction>,
    datapath: &'a mut DataPath,
    tick: u64,
}

impl<'a> ControlUnit<'a> {
    pub fn new(code: &'a [Instruction], datapath: &'a mut DataPath) -> Self {
        Self {
            code,
            program_counter: 0,
            instruction_register: None,
            datapath,
            tick: 0,
        }
    }

    fn tick(&mut self) {
        self.tick += 1;
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }
    pub fn program_counter(&self) -> usize {
        self.program_counter
    }
    pub fn datapath(&self) -> &DataPath {
        self.datapath
    }

    /// Run one instruction cycle.
    ///
    /// `Err(Interrupt::Halt)` and `Err(Interrupt::InputExhausted)` are the
    /// regular ways for a program to stop.
    pub fn decode_and_execute(&mut self) -> Result<(), Interrupt> {
        let inst = *self
            .code
            .get(self.program_counter)
            .ok_or(RuntimeFault::PcOutOfRange(self.program_counter))?;
        let op = inst.op()?;
        self.instruction_register = Some(inst);
        self.program_counter += 1;
        self.tick();

        match op {
            Op::Halt => return Err(Interrupt::Halt),
            Op::Jump(target) => self.program_counter = target,
            Op::Jz(target) => {
                if self.datapath.zero()? {
                    self.program_counter = target;
                }
            }
            Op::Push(v) => {
                self.datapath.latch_stack_pointer(SpSel::Inc)?;
                self.tick();
                self.datapath.latch_top_of_stack(TosSel::Literal(v))?;
            }
            Op::Dup => {
                self.datapath.latch_stack_pointer(SpSel::Inc)?;
                self.tick();
                self.datapath.latch_top_of_stack(TosSel::Sos)?;
            }
            Op::Push2(v) => {
                self.datapath.latch_stack_pointer(SpSel::Inc)?;
                self.tick();
                self.datapath.latch_top_of_stack(TosSel::Sos)?;
                self.tick();
                self.datapath.latch_second_of_stack(SosSel::Literal(v))?;
            }
            Op::Pop => {
                self.datapath.latch_data_address(AddrSel::Sos)?;
                self.tick();
                self.datapath.write_memory()?;
                self.datapath.latch_stack_pointer(SpSel::Dec2)?;
            }
            Op::Load => {
                self.datapath.latch_data_address(AddrSel::Tos)?;
                self.tick();
                self.datapath.latch_top_of_stack(TosSel::Memory)?;
            }
            Op::Drop => self.datapath.latch_stack_pointer(SpSel::Dec)?,
            Op::Inc => self.datapath.latch_top_of_stack(TosSel::Inc)?,
            Op::Alu(alu) => {
                self.datapath.latch_second_of_stack(SosSel::Alu(alu))?;
                self.datapath.latch_stack_pointer(SpSel::Dec)?;
            }
        }

        self.tick();
        Ok(())
    }

    /// Capture the registers for tracing.
    pub fn snapshot(&self) -> CycleSnapshot {
        let stack = self.datapath.stack();
        CycleSnapshot {
            tick: self.tick,
            opcode: self.instruction_register.map(|inst| inst.opcode),
            program_counter: self.program_counter,
            data_address: self.datapath.data_address(),
            stack_pointer: self.datapath.stack_pointer(),
            top_of_stack: self.datapath.top_of_stack(),
            stack_window: stack[..stack.len().min(STACK_WINDOW)].to_vec(),
        }
    }
}

/// Register state after an instruction cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleSnapshot {
    pub tick: u64,
    /// Opcode in the instruction register, `None` before the first fetch.
    pub opcode: Option<Opcode>,
    pub program_counter: usize,
    pub data_address: Word,
    pub stack_pointer: isize,
    pub top_of_stack: Option<Word>,
    /// Bottom cells of the stack.
    pub stack_window: Vec<Word>,
}

impl Display for CycleSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TICK: {:4} ", self.tick)?;
        match self.opcode {
            Some(opcode) => write!(f, "{opcode:10} ")?,
            None => write!(f, "{:10} ", "-")?,
        }
        write!(
            f,
            "PC: {:3} DA: {:3} SP: {:2} ",
            self.program_counter, self.data_address, self.stack_pointer
        )?;
        // non-negative values get a blank in place of the sign
        let tos = match self.top_of_stack {
            Some(tos) if tos >= 0 => format!(" {tos}"),
            Some(tos) => tos.to_string(),
            None => "-".to_string(),
        };
        write!(f, "TOS: {tos:>3} ")?;
        write!(f, "Stack: {:?}", self.stack_window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::Fault, isa::Opcode::*};

    fn code(insts: &[(Opcode, Option<Word>)]) -> Vec<Instruction> {
        insts
            .iter()
            .enumerate()
            .map(|(i, &(opcode, arg))| Instruction::new(i, opcode, arg))
            .collect()
    }

    /// Execute exactly one cycle of `inst` on a fresh machine whose stack
    /// holds `stack` (bottom first) and return the ticks spent.
    fn cycle_cost(inst: (Opcode, Option<Word>), stack: &[Word]) -> u64 {
        let mut program = code(&stack.iter().map(|&v| (PUSH, Some(v))).collect::<Vec<_>>());
        let n = program.len();
        program.push(Instruction::new(n, inst.0, inst.1));
        let mut dp = DataPath::new(vec![0, 0, 0], 10, "x".chars());
        let mut cu = ControlUnit::new(&program, &mut dp);
        for _ in 0..n {
            cu.decode_and_execute().unwrap();
        }
        let before = cu.current_tick();
        let _ = cu.decode_and_execute();
        cu.current_tick() - before
    }

    #[test]
    fn test_tick_costs() {
        assert_eq!(cycle_cost((HALT, None), &[]), 1);
        assert_eq!(cycle_cost((JUMP, Some(0)), &[]), 2);
        assert_eq!(cycle_cost((JZ, Some(0)), &[0]), 2);
        assert_eq!(cycle_cost((JZ, Some(0)), &[1]), 2);
        assert_eq!(cycle_cost((PUSH, Some(5)), &[]), 3);
        assert_eq!(cycle_cost((DUP, None), &[5]), 3);
        assert_eq!(cycle_cost((PUSH2, Some(1)), &[5]), 4);
        assert_eq!(cycle_cost((POP, None), &[2, 7]), 3);
        assert_eq!(cycle_cost((LOAD, None), &[2]), 3);
        assert_eq!(cycle_cost((DROP, None), &[2]), 2);
        assert_eq!(cycle_cost((INC, None), &[2]), 2);
        assert_eq!(cycle_cost((ADD, None), &[2, 3]), 2);
        assert_eq!(cycle_cost((DIV, None), &[2, 3]), 2);
        assert_eq!(cycle_cost((MOD, None), &[2, 3]), 2);
    }

    #[test]
    fn test_branches() {
        let program = code(&[
            (PUSH, Some(0)),
            (JZ, Some(3)),
            (HALT, None),
            (PUSH, Some(1)),
            (JZ, Some(0)),
            (JUMP, Some(2)),
        ]);
        let mut dp = DataPath::new(vec![0, 0], 10, "".chars());
        let mut cu = ControlUnit::new(&program, &mut dp);
        let mut pcs = Vec::new();
        while cu.decode_and_execute().is_ok() {
            pcs.push(cu.program_counter());
        }
        assert_eq!(pcs, vec![1, 3, 4, 5, 2]);
        assert_eq!(cu.program_counter(), 3);
    }

    #[test]
    fn test_faults() {
        let program = code(&[(PUSH, Some(1))]);
        let mut dp = DataPath::new(vec![0, 0], 10, "".chars());
        let mut cu = ControlUnit::new(&program, &mut dp);
        cu.decode_and_execute().unwrap();
        assert_eq!(
            cu.decode_and_execute(),
            Err(Interrupt::from(RuntimeFault::PcOutOfRange(1)))
        );

        let program = code(&[(NUMBER, Some(1))]);
        let mut dp = DataPath::new(vec![0, 0], 10, "".chars());
        let mut cu = ControlUnit::new(&program, &mut dp);
        assert!(matches!(
            cu.decode_and_execute(),
            Err(Interrupt::Fault(Fault::Decode { index: 0, .. }))
        ));
        assert_eq!(cu.current_tick(), 0);

        let program = code(&[(DROP, None)]);
        let mut dp = DataPath::new(vec![0, 0], 10, "".chars());
        let mut cu = ControlUnit::new(&program, &mut dp);
        assert_eq!(
            cu.decode_and_execute(),
            Err(Interrupt::from(RuntimeFault::StackUnderflow))
        );
    }

    #[test]
    fn test_snapshot() {
        let program = code(&[(PUSH, Some(42))]);
        let mut dp = DataPath::new(vec![0, 0], 3, "".chars());
        let mut cu = ControlUnit::new(&program, &mut dp);
        assert_eq!(
            cu.snapshot().to_string(),
            "TICK:    0 -          PC:   0 DA:   0 SP: -1 TOS:   - Stack: [-1, -1, -1]"
        );
        cu.decode_and_execute().unwrap();
        assert_eq!(
            cu.snapshot().to_string(),
            "TICK:    3 PUSH       PC:   1 DA:   0 SP:  0 TOS:  42 Stack: [42, -1, -1]"
        );
    }

    #[test]
    fn test_snapshot_sign_column() {
        let program = code(&[(PUSH, Some(100)), (PUSH, Some(-5)), (PUSH, Some(-100))]);
        let mut dp = DataPath::new(vec![0, 0], 3, "".chars());
        let mut cu = ControlUnit::new(&program, &mut dp);
        let mut tos = Vec::new();
        for _ in 0..3 {
            cu.decode_and_execute().unwrap();
            let line = cu.snapshot().to_string();
            let start = line.find("TOS:").unwrap();
            tos.push(line[start..line.find(" Stack").unwrap()].to_string());
        }
        assert_eq!(tos, vec!["TOS:  100", "TOS:  -5", "TOS: -100"]);
    }
}
