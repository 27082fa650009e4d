//! Fault taxonomy of the simulator.

use thiserror::Error;

use crate::isa::Word;

/// Errors that invalidate a whole run. No partial result is reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    /// The machine code image is malformed.
    #[error("malformed machine code: {0}")]
    Load(String),
    /// An instruction record cannot be turned into an executable operation.
    #[error("cannot decode instruction {index}: {reason}")]
    Decode { index: usize, reason: String },
    /// A simulation option is out of range.
    #[error("invalid option: {0}")]
    BadOption(String),
    #[error("runtime fault: {0}")]
    Runtime(#[from] RuntimeFault),
}

/// Internal consistency violations raised by the datapath and control unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RuntimeFault {
    #[error("stack overflow (capacity {0})")]
    StackOverflow(usize),
    #[error("stack underflow")]
    StackUnderflow,
    #[error("memory address {0} out of range")]
    BadAddress(Word),
    #[error("program counter {0} is past the end of code")]
    PcOutOfRange(usize),
}

/// Conditions that end an instruction cycle early. Only [`Interrupt::Fault`]
/// is an error; the others are recovered by the simulation driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Interrupt {
    #[error("halted")]
    Halt,
    #[error("input buffer is empty")]
    InputExhausted,
    #[error(transparent)]
    Fault(#[from] Fault),
}

impl From<RuntimeFault> for Interrupt {
    fn from(value: RuntimeFault) -> Self {
        Self::Fault(Fault::Runtime(value))
    }
}
