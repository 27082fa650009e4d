//! Simulation driver: runs the processor until it halts, runs out of input
//! or hits the tick ceiling.

use std::fmt::Display;

use crate::{
    cpu::{datapath::DataPath, ControlUnit, CycleSnapshot},
    error::{Fault, Interrupt},
    isa::Word,
    object::Image,
};

/// Tunables of a simulation run.
#[derive(Debug, Clone)]
pub struct SimOption {
    stack_size: usize,
    debug_limit: u64,
    tick_limit: u64,
}

impl Default for SimOption {
    fn default() -> Self {
        Self {
            stack_size: 10,
            debug_limit: 200,
            tick_limit: 100_000,
        }
    }
}

impl SimOption {
    /// Stack capacity in cells.
    pub fn set_stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = stack_size;
        self
    }
    /// Cycles are traced while the tick counter is below this value.
    pub fn set_debug_limit(mut self, debug_limit: u64) -> Self {
        self.debug_limit = debug_limit;
        self
    }
    /// No new instruction cycle starts once the tick counter reaches this
    /// value.
    pub fn set_tick_limit(mut self, tick_limit: u64) -> Self {
        self.tick_limit = tick_limit;
        self
    }
    pub fn stack_size(&self) -> usize {
        self.stack_size
    }
}

/// Why a run ended without a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Halted,
    InputExhausted,
    TickLimitExceeded,
}

impl Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StopReason::Halted => "halted",
            StopReason::InputExhausted => "input exhausted",
            StopReason::TickLimitExceeded => "tick limit exceeded",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimReport {
    pub output: Vec<Word>,
    /// Instruction cycles started, including the one that stopped the run.
    pub instructions: u64,
    pub ticks: u64,
    pub stop: StopReason,
}

impl SimReport {
    /// The output sequence as text.
    pub fn text(&self) -> String {
        render_output(&self.output)
    }
}

/// Values in `1..256` are rendered as Latin-1 characters, except control
/// codes other than tab, CR and LF. Every other value is rendered in decimal.
pub fn render_output(output: &[Word]) -> String {
    output
        .iter()
        .map(|&x| {
            u32::try_from(x)
                .ok()
                .filter(|c| (1..256).contains(c))
                .and_then(char::from_u32)
                .filter(|c| !c.is_control() || matches!(*c, '\t' | '\n' | '\r'))
                .map_or_else(|| x.to_string(), String::from)
        })
        .collect()
}

/// Input queue for a run: the characters of `text` followed by a NUL that
/// marks the logical end of input. Without an input source the queue is
/// empty.
pub fn input_queue(text: Option<&str>) -> Vec<char> {
    match text {
        Some(text) => text.chars().chain(std::iter::once('\0')).collect(),
        None => Vec::new(),
    }
}

/// Run `image` to completion and log a trace line for each cycle below the
/// debug limit.
pub fn simulate(
    image: &Image,
    input: impl IntoIterator<Item = char>,
    option: &SimOption,
) -> Result<SimReport, Fault> {
    simulate_traced(image, input, option, |snapshot| {
        tracing::debug!("{snapshot}");
    })
}

/// Same as [`simulate`], but hands the snapshot of every cycle below the
/// debug limit to `on_cycle` instead of logging it.
pub fn simulate_traced(
    image: &Image,
    input: impl IntoIterator<Item = char>,
    option: &SimOption,
    mut on_cycle: impl FnMut(&CycleSnapshot),
) -> Result<SimReport, Fault> {
    if option.stack_size == 0 {
        return Err(Fault::BadOption("stack size must be positive".into()));
    }
    let mut datapath = DataPath::new(image.data.clone(), option.stack_size, input);
    let mut cu = ControlUnit::new(&image.code, &mut datapath);
    let mut instructions = 0;
    let mut debug_warned = false;

    let stop = loop {
        if cu.current_tick() >= option.tick_limit {
            tracing::warn!("Limit exceeded!");
            break StopReason::TickLimitExceeded;
        }
        instructions += 1;

        let input_before = cu.datapath().input_remaining();
        let output_before = cu.datapath().output().len();
        match cu.decode_and_execute() {
            Ok(()) => {}
            Err(Interrupt::Halt) => {
                tracing::warn!("Halted at tick {}", cu.current_tick());
                break StopReason::Halted;
            }
            Err(Interrupt::InputExhausted) => {
                tracing::warn!("Input buffer is empty!");
                break StopReason::InputExhausted;
            }
            Err(Interrupt::Fault(fault)) => {
                tracing::error!("{fault} (pc {}, tick {})", cu.program_counter(), cu.current_tick());
                return Err(fault);
            }
        }

        let dp = cu.datapath();
        if dp.input_remaining() < input_before {
            let symbol = dp.top_of_stack().unwrap_or_default();
            match char::from_u32(symbol as u32) {
                Some(c) if c != '\0' => tracing::debug!("input: {c}"),
                _ => tracing::debug!("input: "),
            }
        }
        if let Some(&symbol) = dp.output().get(output_before) {
            tracing::debug!("output: {} << {symbol}", render_output(dp.output()));
        }

        if cu.current_tick() < option.debug_limit {
            on_cycle(&cu.snapshot());
        } else if !debug_warned {
            tracing::warn!("Debug limit exceeded!");
            debug_warned = true;
        }
    };

    let ticks = cu.current_tick();
    let output = datapath.into_output();
    tracing::info!("output_buffer: {}", render_output(&output));

    Ok(SimReport {
        output,
        instructions,
        ticks,
        stop,
    })
}
