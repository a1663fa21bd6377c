//! Console output: the diagnostic tracing subscriber and the coloured status
//! lines shown to the user.

use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

/// Initializes the diagnostic subscriber on stderr.
///
/// `RUST_LOG` wins when set; otherwise verbosity 0 shows warnings, 1 debug and
/// 2+ trace for this crate.
pub fn init_logging(verbosity: u8) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}

fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "auto_messenger=warn",
        1 => "auto_messenger=debug",
        _ => "auto_messenger=trace",
    }
}

/// Colour palette for user-facing lines.
pub mod palette {
    use colored::{ColoredString, Colorize};

    pub fn error(text: &str) -> ColoredString {
        text.red()
    }

    pub fn caution(text: &str) -> ColoredString {
        text.yellow()
    }

    pub fn info(text: &str) -> ColoredString {
        text.cyan()
    }

    pub fn success(text: &str) -> ColoredString {
        text.green()
    }

    pub fn property(text: &str) -> ColoredString {
        text.magenta()
    }

    pub fn name(text: &str) -> ColoredString {
        text.bright_blue().bold()
    }

    pub fn time(text: &str) -> ColoredString {
        text.bright_green()
    }

    pub fn data(text: &str) -> ColoredString {
        text.bright_yellow()
    }

    pub fn bold(text: &str) -> ColoredString {
        text.bold()
    }
}

/// User-facing status lines on stdout.
pub mod console {
    use super::palette;
    use std::fmt::Display;

    pub fn line(text: impl Display) {
        println!("{}", text);
    }

    pub fn blank() {
        println!();
    }

    pub fn info(text: &str) {
        line(palette::info(text));
    }

    pub fn caution(text: &str) {
        line(palette::caution(text));
    }

    pub fn error(text: &str) {
        eprintln!("{}", palette::error(text));
    }
}

#[cfg(test)]
#[path = "tests/logging_tests.rs"]
mod tests;
