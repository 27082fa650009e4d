//! Command line plumbing shared by the `ssim` and `sas` binaries.

use std::sync::Mutex;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use tracing_subscriber::{filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub use clap;
pub use clap_verbosity_flag as verbose;

/// Help message styles.
pub fn get_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Cyan.on_default())
        .error(AnsiColor::Red.on_default() | Effects::BOLD)
}

/// Map the `-v` count of the command line to a tracing level.
///
/// No flag keeps warnings visible, since the simulator reports its stop
/// conditions (halt, empty input, tick limit) as warnings.
pub fn verbose_level_to_trace(level: Option<verbose::Level>) -> &'static tracing::Level {
    match level {
        None => &tracing::Level::ERROR,
        Some(verbose::Level::Error) => &tracing::Level::WARN,
        Some(verbose::Level::Warn) => &tracing::Level::INFO,
        Some(verbose::Level::Info) => &tracing::Level::DEBUG,
        Some(verbose::Level::Debug) | Some(verbose::Level::Trace) => &tracing::Level::TRACE,
    }
}

/// Install the global subscriber. Human readable logs go to stderr; if
/// `log_file` is given, the same events are also written to it as JSON
/// lines.
///
/// Calling this more than once is harmless: later calls are ignored.
pub fn logging_setup<W>(level: &tracing::Level, log_file: Option<W>)
where
    W: std::io::Write + Send + 'static,
{
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();
    let json_layer = log_file.map(|w| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(Mutex::new(w))
    });

    let _ = tracing_subscriber::registry()
        .with(LevelFilter::from_level(*level))
        .with(stderr_layer)
        .with(json_layer)
        .try_init();
}
