//! Two-pass translator from assembly source to a machine code [`Image`].
//!
//! The first pass lays out memory and code and records symbol addresses;
//! operands may still be symbolic at that point. The second pass replaces
//! every symbol with its numeric address.
use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use pest::{iterators::Pair, Parser};
use pest_derive::Parser;

use crate::{
    isa::{Opcode, Word, DATA_START, INPUT_PORT, OUTPUT_PORT},
    object::{Image, Instruction},
};

#[derive(Parser)]
#[grammar = "src/grammar.pest"] // relative to the crate root
pub struct StackAsmParser;

pub fn parse(src: &str) -> Result<pest::iterators::Pairs<'_, Rule>> {
    Ok(StackAsmParser::parse(Rule::main, src)
        .context("fail to parse assembly source")?
        .next()
        .context("empty parse tree")?
        .into_inner())
}

#[derive(Default)]
pub struct AssembleOption {
    verbose: bool,
}

impl AssembleOption {
    /// Trace every emitted record.
    pub fn set_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }
}

/// Operand before symbol resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Num(Word),
    Symbol(String),
}

/// Code record emitted by the first pass.
#[derive(Debug, Clone)]
struct Placeholder {
    opcode: Opcode,
    operand: Option<Operand>,
    /// Source line, for error reporting.
    line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Data,
    Code,
}

/// Symbol tables built by the first pass. Variables and labels live in
/// separate namespaces; on lookup, variables win.
#[derive(Debug, Default)]
pub struct Symbols {
    pub variables: BTreeMap<String, Word>,
    pub labels: BTreeMap<String, Word>,
}

impl Symbols {
    pub fn resolve(&self, name: &str) -> Option<Word> {
        self.variables
            .get(name)
            .or_else(|| self.labels.get(name))
            .copied()
    }
}

/// Result of [`assemble`].
#[derive(Debug)]
pub struct ObjectExt {
    pub image: Image,
    pub symbols: Symbols,
    /// Number of source lines.
    pub lines: usize,
}

fn parse_int(pair: &Pair<'_, Rule>) -> Result<Word> {
    pair.as_str()
        .parse()
        .with_context(|| format!("integer literal `{}` out of range", pair.as_str()))
}

/// Memory cells produced by a data declaration.
fn declare(kind: &str, value: Pair<'_, Rule>) -> Result<Vec<Word>> {
    let Some(opcode) = Opcode::from_mnemonic(kind).filter(|op| op.is_declarative()) else {
        bail!("wrong instruction in data section: `{kind}`")
    };
    let cells = match (opcode, value.as_rule()) {
        (Opcode::NUMBER, Rule::int) => vec![parse_int(&value)?],
        (Opcode::STRING, Rule::string) => {
            let text = value.into_inner().next().map(|p| p.as_str()).unwrap_or_default();
            text.chars()
                .map(|c| c as u32 as Word)
                .chain(std::iter::once(0))
                .collect()
        }
        (Opcode::BUFFER, Rule::int) => {
            let len = usize::try_from(parse_int(&value)?)
                .context("buffer length must not be negative")?;
            vec![0; len]
        }
        (_, _) => bail!("`{kind}` cannot be initialized with `{}`", value.as_str()),
    };
    Ok(cells)
}

/// Code records produced by an instruction, with the `inp` and `out` macros
/// expanded.
fn instruction(mnemonic: &str, operand: Option<Pair<'_, Rule>>, line: usize) -> Result<Vec<Placeholder>> {
    let place = |opcode, operand| Placeholder {
        opcode,
        operand,
        line,
    };
    let macro_operand = |name| -> Result<()> {
        match &operand {
            Some(_) => bail!("`{name}` takes no operand"),
            None => Ok(()),
        }
    };
    match mnemonic {
        "inp" => {
            macro_operand("inp")?;
            return Ok(vec![
                place(Opcode::PUSH, Some(Operand::Num(INPUT_PORT))),
                place(Opcode::LOAD, None),
            ]);
        }
        "out" => {
            macro_operand("out")?;
            return Ok(vec![
                place(Opcode::PUSH2, Some(Operand::Num(OUTPUT_PORT))),
                place(Opcode::POP, None),
            ]);
        }
        _ => {}
    }

    let opcode = Opcode::from_mnemonic(mnemonic)
        .with_context(|| format!("unknown instruction `{mnemonic}`"))?;
    if opcode.is_declarative() {
        bail!("declaration `{mnemonic}` in code section");
    }
    let operand = match (opcode.takes_operand(), operand) {
        (true, Some(pair)) if pair.as_rule() == Rule::int => Some(Operand::Num(parse_int(&pair)?)),
        (true, Some(pair)) => Some(Operand::Symbol(pair.as_str().to_string())),
        (true, None) => bail!("`{mnemonic}` requires an operand"),
        (false, Some(_)) => bail!("instruction shouldn't have an argument: `{mnemonic}`"),
        (false, None) => None,
    };
    Ok(vec![place(opcode, operand)])
}

/// State of the first pass.
struct Layout {
    symbols: Symbols,
    data: Vec<Word>,
    placeholders: Vec<Placeholder>,
    section: Section,
    verbose: bool,
}

impl Layout {
    fn new(verbose: bool) -> Self {
        Self {
            symbols: Symbols::default(),
            // cells 0 and 1 back the I/O ports
            data: vec![0; DATA_START as usize],
            placeholders: Vec::new(),
            section: Section::Data,
            verbose,
        }
    }

    fn statement(&mut self, stmt: Pair<'_, Rule>, line: usize) -> Result<()> {
        let rule = stmt.as_rule();
        let mut it = stmt.into_inner();
        match (rule, self.section) {
            (Rule::data_header, Section::Data) => {}
            (Rule::data_header, Section::Code) => bail!(".data shouldn't be after .code"),
            (Rule::code_header, _) => self.section = Section::Code,
            (Rule::declaration, Section::Data) => {
                let kind = it.next().context("missing declaration kind")?;
                let name = it.next().context("missing variable name")?.as_str().to_string();
                let value = it.next().context("missing initial value")?;
                let cells = declare(kind.as_str(), value)?;
                if self.symbols.variables.contains_key(&name) {
                    bail!("redefinition of variable: `{name}`");
                }
                let addr = Word::try_from(self.data.len()).context("data section too large")?;
                if self.verbose {
                    tracing::trace!("variable {name} at {addr}: {cells:?}");
                }
                self.symbols.variables.insert(name, addr);
                self.data.extend(cells);
            }
            (Rule::label, Section::Code) => {
                let name = it.next().context("missing label name")?.as_str().to_string();
                if self.symbols.labels.contains_key(&name) {
                    bail!("redefinition of label: `{name}`");
                }
                let addr = Word::try_from(self.placeholders.len()).context("code section too large")?;
                if self.verbose {
                    tracing::trace!("label {name} at {addr}");
                }
                self.symbols.labels.insert(name, addr);
            }
            (Rule::instruction, Section::Code) => {
                let mnemonic = it.next().context("missing mnemonic")?;
                let records = instruction(mnemonic.as_str(), it.next(), line)?;
                self.placeholders.extend(records);
            }
            (Rule::declaration, Section::Code) => bail!("declaration in code section"),
            (_, Section::Data) => bail!("expect a data declaration"),
            (_, Section::Code) => bail!("unexpected statement"),
        }
        Ok(())
    }
}

/// transform assembly code to a machine code image
pub fn assemble(src: &str, option: AssembleOption) -> Result<ObjectExt> {
    let lines = parse(src).context("fail to assemble source")?;
    let mut layout = Layout::new(option.verbose);

    // pass 1: layout
    for line in lines.filter(|l| l.as_rule() == Rule::line) {
        let (lineno, _) = line.as_span().start_pos().line_col();
        let text = line.as_str().trim().to_string();
        if let Some(stmt) = line.into_inner().next() {
            layout
                .statement(stmt, lineno)
                .with_context(|| format!("line {lineno}: {text}"))?;
        }
    }

    // pass 2: resolve symbols
    let Layout {
        symbols,
        data,
        placeholders,
        ..
    } = layout;
    let mut code = Vec::with_capacity(placeholders.len());
    for (index, p) in placeholders.into_iter().enumerate() {
        let arg = match p.operand {
            None => None,
            Some(Operand::Num(n)) => Some(n),
            Some(Operand::Symbol(name)) => Some(symbols.resolve(&name).with_context(|| {
                format!("line {}: label or variable is not defined: `{name}`", p.line)
            })?),
        };
        let inst = Instruction::new(index, p.opcode, arg);
        if option.verbose {
            tracing::trace!("{inst}");
        }
        code.push(inst);
    }

    Ok(ObjectExt {
        image: Image { data, code },
        symbols,
        lines: src.split('\n').count(),
    })
}
