//! Machine code image: the translator's output and the simulator's input.
//!
//! On disk an image is a JSON array. The first element is the length `L` of
//! the data segment, the next `L` elements are the initial memory cells and
//! the remaining elements are instruction records:
//!
//! ```text
//! [4,
//!  0,
//!  0,
//!  72,
//!  0,
//!  {"index": 0, "opcode": "psh", "arg": 2},
//!  {"index": 1, "opcode": "hlt", "arg": null}]
//! ```

use std::{fmt::Display, path::Path, str::FromStr};

use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    error::Fault,
    isa::{Op, Opcode, Word},
};

/// One instruction record of the code segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    /// Position in the code segment, informational only.
    pub index: usize,
    pub opcode: Opcode,
    pub arg: Option<Word>,
}

impl Instruction {
    pub fn new(index: usize, opcode: Opcode, arg: Option<Word>) -> Self {
        Self { index, opcode, arg }
    }

    /// Runtime decode into an executable operation.
    pub fn op(&self) -> Result<Op, Fault> {
        Op::decode(self.opcode, self.arg).map_err(|reason| Fault::Decode {
            index: self.index,
            reason,
        })
    }

    fn from_value(pos: usize, value: &Value) -> Result<Self, Fault> {
        #[derive(Deserialize)]
        #[serde(deny_unknown_fields)]
        struct Record {
            index: usize,
            opcode: String,
            #[serde(default)]
            arg: Option<i64>,
        }

        let record = Record::deserialize(value)
            .map_err(|e| Fault::Load(format!("instruction #{pos}: {e}")))?;
        let opcode = Opcode::from_mnemonic(&record.opcode).ok_or_else(|| Fault::Decode {
            index: record.index,
            reason: format!("unknown opcode `{}`", record.opcode),
        })?;
        let arg = record
            .arg
            .map(|a| {
                Word::try_from(a)
                    .map_err(|_| Fault::Load(format!("instruction #{pos}: arg {a} exceeds word range")))
            })
            .transpose()?;
        if opcode.takes_operand() != arg.is_some() {
            return Err(Fault::Decode {
                index: record.index,
                reason: format!(
                    "`{}` {} an operand",
                    opcode.mnemonic(),
                    if arg.is_some() { "takes no" } else { "requires" }
                ),
            });
        }
        Ok(Self::new(record.index, opcode, arg))
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            r#"{{"index": {}, "opcode": "{}", "arg": "#,
            self.index,
            self.opcode.mnemonic()
        )?;
        match self.arg {
            Some(arg) => write!(f, "{arg}}}"),
            None => write!(f, "null}}"),
        }
    }
}

/// A loadable program: initial memory plus code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Image {
    /// Initial memory. Cells 0 and 1 back the I/O ports.
    pub data: Vec<Word>,
    pub code: Vec<Instruction>,
}

impl Image {
    /// Parse the on-disk representation.
    pub fn decode(text: &str) -> Result<Self, Fault> {
        let words: Vec<Value> = serde_json::from_str(text)
            .map_err(|e| Fault::Load(format!("expect a JSON array: {e}")))?;
        let (head, rest) = words
            .split_first()
            .ok_or_else(|| Fault::Load("empty image".into()))?;
        let data_len = head
            .as_u64()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| Fault::Load(format!("data length must be a natural number, got {head}")))?;
        if rest.len() < data_len {
            return Err(Fault::Load(format!(
                "data length is {data_len} but the image has only {} cells",
                rest.len()
            )));
        }
        let (data, code) = rest.split_at(data_len);

        let data = data
            .iter()
            .enumerate()
            .map(|(addr, v)| {
                v.as_i64()
                    .and_then(|n| Word::try_from(n).ok())
                    .ok_or_else(|| Fault::Load(format!("memory cell {addr} is not a word: {v}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let code = code
            .iter()
            .enumerate()
            .map(|(pos, v)| Instruction::from_value(pos, v))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { data, code })
    }

    /// Read and decode a machine code file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("could not read file `{}`", path.display()))?;
        Self::decode(&text).with_context(|| format!("could not load `{}`", path.display()))
    }
}

impl FromStr for Image {
    type Err = Fault;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

impl Display for Image {
    /// Encode in the on-disk layout, one element per line.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}", self.data.len())?;
        for word in &self.data {
            write!(f, ",\n {word}")?;
        }
        for inst in &self.code {
            write!(f, ",\n {inst}")?;
        }
        write!(f, "]")
    }
}
