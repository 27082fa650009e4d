use anyhow::{Context, Result};
use binutils::{clap, verbose};
use clap::Parser;
use stack_sim::{assemble, input_queue, simulate, AssembleOption, Image, SimOption};

// Stack machine simulator written in rust
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None,
    styles = binutils::get_styles(),
    arg_required_else_help = true,
)]
struct Args {
    /// Path to the machine code file
    code_file: String,

    /// Characters fed to the input port, followed by a NUL
    input_file: Option<String>,

    /// Stack capacity in cells
    #[arg(long, default_value_t = 10)]
    stack_size: usize,

    /// Trace instruction cycles while the tick counter is below this value
    #[arg(long, default_value_t = 200)]
    debug_limit: u64,

    /// Stop once the tick counter reaches this value
    #[arg(long, default_value_t = 100_000)]
    limit: u64,

    /// Treat `code_file` as assembly source and assemble it first
    #[arg(long)]
    asm: bool,

    /// Also write logs to this file as JSON lines
    #[arg(long)]
    log_file: Option<String>,

    #[command(flatten)]
    verbose: verbose::Verbosity,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = binutils::verbose_level_to_trace(args.verbose.log_level());
    let log_file = match &args.log_file {
        Some(path) => Some(
            std::fs::File::create(path)
                .with_context(|| format!("could not create log file `{path}`"))?,
        ),
        None => None,
    };
    binutils::logging_setup(log_level, log_file);

    let image = if args.asm {
        let source = std::fs::read_to_string(&args.code_file)
            .with_context(|| format!("could not read file `{}`", &args.code_file))?;
        let verbose_asm = args
            .verbose
            .log_level()
            .is_some_and(|lv| lv >= verbose::Level::Trace);
        assemble(&source, AssembleOption::default().set_verbose(verbose_asm))?.image
    } else {
        Image::load(&args.code_file)?
    };

    let input = match &args.input_file {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("could not read file `{path}`"))?,
        ),
        None => None,
    };

    let option = SimOption::default()
        .set_stack_size(args.stack_size)
        .set_debug_limit(args.debug_limit)
        .set_tick_limit(args.limit);

    tracing::info!("Start simulation");
    let report = simulate(&image, input_queue(input.as_deref()), &option)
        .with_context(|| format!("simulation of `{}` aborted", &args.code_file))?;
    tracing::info!("End simulation ({})", report.stop);

    println!("{}", report.text());
    println!("Instructions: {} Ticks: {}", report.instructions, report.ticks);
    Ok(())
}
