//! Instruction set definition of the stack machine.

/// Machine word. Memory cells, stack cells and literals are all words.
pub type Word = i32;

pub const BITS: u32 = Word::BITS;
pub const MIN_SIGN: i64 = Word::MIN as i64;
pub const MAX_SIGN: i64 = Word::MAX as i64;

/// Reading this address pops a character from the input queue.
pub const INPUT_PORT: Word = 0;
/// Writing this address appends to the output sequence.
pub const OUTPUT_PORT: Word = 1;
/// First memory offset handed out to data declarations.
pub const DATA_START: Word = 2;

macro_rules! define_opcode {
    {
        $( $(#[$doc:meta])* $name:ident = $mnemonic:literal; )*
    } => {
        /// Instruction mnemonics, as they appear in assembly source and in
        /// machine code files.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[allow(clippy::upper_case_acronyms)]
        pub enum Opcode {
            $( $(#[$doc])* $name, )*
        }

        impl Opcode {
            pub const ALL: &'static [Opcode] = &[$( Opcode::$name, )*];

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $( Opcode::$name => $mnemonic, )*
                }
            }

            pub fn from_mnemonic(s: &str) -> Option<Self> {
                match s {
                    $( $mnemonic => Some(Opcode::$name), )*
                    _ => None,
                }
            }

            fn name(self) -> &'static str {
                match self {
                    $( Opcode::$name => stringify!($name), )*
                }
            }
        }
    };
}

define_opcode! {
    HALT = "hlt";
    /// `jmp addr`, absolute instruction index
    JUMP = "jmp";
    /// `jmz addr`, taken if the top of stack is zero
    JZ = "jmz";
    PUSH = "psh";
    /// `psh2 v`: duplicate the top and place `v` below the copy
    PUSH2 = "psh2";
    /// store the top of stack at the address held one below it, drop both
    POP = "pop";
    /// replace the top of stack with the cell it addresses
    LOAD = "get";
    DROP = "drp";
    DUP = "dup";
    INC = "inc";
    ADD = "add";
    DIV = "div";
    MOD = "mod";
    // declarations, only meaningful to the assembler
    NUMBER = "num";
    STRING = "str";
    BUFFER = "buf";
}

impl Opcode {
    /// Whether a machine code record of this opcode carries an `arg`.
    pub fn takes_operand(self) -> bool {
        use Opcode::*;
        matches!(self, JUMP | JZ | PUSH | PUSH2 | NUMBER | STRING | BUFFER)
    }

    /// Data declarations are consumed by the assembler and never executed.
    pub fn is_declarative(self) -> bool {
        matches!(self, Opcode::NUMBER | Opcode::STRING | Opcode::BUFFER)
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.name())
    }
}

/// Operations of the arithmetic-logic unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AluOp {
    Add,
    Div,
    Mod,
}

impl AluOp {
    pub fn opcode(self) -> Opcode {
        match self {
            AluOp::Add => Opcode::ADD,
            AluOp::Div => Opcode::DIV,
            AluOp::Mod => Opcode::MOD,
        }
    }
}

/// A decoded, executable instruction. Operands are already validated, so
/// the control unit can dispatch on it without further checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Halt,
    Jump(usize),
    Jz(usize),
    Push(Word),
    Push2(Word),
    Pop,
    Load,
    Drop,
    Dup,
    Inc,
    Alu(AluOp),
}

impl Op {
    /// Decode an opcode and its optional argument. On failure the reason is
    /// returned as a message.
    pub fn decode(opcode: Opcode, arg: Option<Word>) -> Result<Self, String> {
        use Opcode::*;
        if opcode.is_declarative() {
            return Err(format!("`{}` is a declaration, not an instruction", opcode.mnemonic()));
        }
        let op = match (opcode, arg) {
            (JUMP | JZ, Some(target)) => {
                let target = usize::try_from(target)
                    .map_err(|_| format!("negative jump target {target}"))?;
                if opcode == JUMP {
                    Op::Jump(target)
                } else {
                    Op::Jz(target)
                }
            }
            (PUSH, Some(v)) => Op::Push(v),
            (PUSH2, Some(v)) => Op::Push2(v),
            (HALT, None) => Op::Halt,
            (POP, None) => Op::Pop,
            (LOAD, None) => Op::Load,
            (DROP, None) => Op::Drop,
            (DUP, None) => Op::Dup,
            (INC, None) => Op::Inc,
            (ADD, None) => Op::Alu(AluOp::Add),
            (DIV, None) => Op::Alu(AluOp::Div),
            (MOD, None) => Op::Alu(AluOp::Mod),
            (_, Some(_)) => return Err(format!("`{}` takes no operand", opcode.mnemonic())),
            (_, None) => return Err(format!("`{}` requires an operand", opcode.mnemonic())),
        };
        Ok(op)
    }

    pub fn opcode(self) -> Opcode {
        match self {
            Op::Halt => Opcode::HALT,
            Op::Jump(_) => Opcode::JUMP,
            Op::Jz(_) => Opcode::JZ,
            Op::Push(_) => Opcode::PUSH,
            Op::Push2(_) => Opcode::PUSH2,
            Op::Pop => Opcode::POP,
            Op::Load => Opcode::LOAD,
            Op::Drop => Opcode::DROP,
            Op::Dup => Opcode::DUP,
            Op::Inc => Opcode::INC,
            Op::Alu(alu) => alu.opcode(),
        }
    }
}

/// Reduce an arithmetic result into the signed word range by adding or
/// subtracting `2^BITS`.
pub fn wrap_word(mut value: i64) -> Word {
    const MODULUS: i64 = 1 << BITS;
    while value < MIN_SIGN {
        value += MODULUS;
    }
    while value > MAX_SIGN {
        value -= MODULUS;
    }
    value as Word
}
