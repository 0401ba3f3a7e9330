use colored::Colorize;
use env_logger::Builder;
use log::{Level, LevelFilter};
use std::io::Write;

/// Parse `--log-level` (debug|info|warn|error). Unknown values fall back to info.
pub fn parse_level(level: &str) -> LevelFilter {
    match level.to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "warn" | "warning" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

/// Install the logger. `verbose` forces debug for this crate regardless of `level`.
/// Dependencies stay at warn; `RUST_LOG` still applies on top.
pub fn setup_logging(level: &str, verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        parse_level(level)
    };

    let _ = Builder::from_default_env()
        .filter_level(LevelFilter::Warn)
        .filter_module(env!("CARGO_PKG_NAME"), level)
        .format(|buf, record| {
            let name = env!("CARGO_PKG_NAME");
            let thread = std::thread::current();
            let thread_name = thread.name().unwrap_or("-");
            let line = match record.level() {
                Level::Error | Level::Warn => {
                    let level_str = match record.level() {
                        Level::Warn => "WARN".yellow(),
                        _ => "ERROR".red(),
                    };
                    format!(
                        "[{} {} {}] {}",
                        name.cyan(),
                        level_str,
                        thread_name.white(),
                        record.args()
                    )
                }
                _ => format!("[{} {}] {}", name.cyan(), thread_name.dimmed(), record.args()),
            };
            writeln!(buf, "{}", line)
        })
        .try_init();
}
