use anyhow::{Context, Result};
use binutils::{clap, verbose};
use clap::Parser;
use stack_sim::{assemble, AssembleOption};

/// Stack machine assembler written in Rust.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    long_about = None,
    styles = binutils::get_styles(),
    arg_required_else_help = true,
)]
struct Args {
    /// Path to the assembly source
    source: String,

    /// Output filename (default is source%.o)
    #[arg(short = 'o', long)]
    output: Option<String>,

    /// Print logs during assembling
    #[command(flatten)]
    verbose: verbose::Verbosity,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let verbose_asm = args
        .verbose
        .log_level()
        .is_some_and(|lv| lv >= verbose::Level::Trace);
    let log_level = binutils::verbose_level_to_trace(args.verbose.log_level());
    binutils::logging_setup(log_level, None::<std::fs::File>);

    let content = std::fs::read_to_string(&args.source)
        .with_context(|| format!("could not read file `{}`", &args.source))?;
    let obj = assemble(&content, AssembleOption::default().set_verbose(verbose_asm))?;

    let output_path = match args.output {
        Some(path) => path,
        None => {
            let mut path = std::path::PathBuf::from(&args.source);
            path.set_extension("o");
            path.to_string_lossy().to_string()
        }
    };
    std::fs::write(&output_path, format!("{}", obj.image))
        .with_context(|| format!("could not write file `{}`", &output_path))?;
    tracing::info!("writing to file `{}`", &output_path);
    println!("LoC: {} Code instr: {}", obj.lines, obj.image.code.len());
    Ok(())
}
