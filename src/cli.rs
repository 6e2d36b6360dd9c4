// src/cli.rs

use crate::core::config_loader::ConfigOverrides;
use clap::Parser;
use std::path::PathBuf;

/// tandem: a minimal interactive command shell.
///
/// Reads one command per line from standard input and runs it. Supported
/// syntax:
///
///    - `program [args...]`
///    - `program [args...] > out.txt < in.txt` (redirects, last one wins)
///    - `program [args...] &` (run in the background)
///    - `exit`
///
/// Settings come from `~/.config/tandem/config.toml` (or `--config`), and the
/// flags below override them.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Read settings from this TOML file instead of the default location.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Prompt printed before each command.
    #[arg(long)]
    pub prompt: Option<String>,

    /// Size of the command buffer in bytes. Longer lines are rejected.
    #[arg(long, value_name = "BYTES")]
    pub capacity: Option<usize>,

    /// How often, in milliseconds, idle workers check for shutdown.
    #[arg(long, value_name = "MS")]
    pub poll_interval: Option<u64>,

    /// Log more (-v info, -vv debug, -vvv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            prompt: self.prompt.clone(),
            slot_capacity: self.capacity,
            poll_interval_ms: self.poll_interval,
        }
    }

    /// Default log filter for the chosen verbosity.
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_become_overrides() {
        let cli = Cli::parse_from([
            "tandem",
            "--prompt",
            "% ",
            "--capacity",
            "64",
            "--poll-interval",
            "50",
            "-vv",
        ]);

        let overrides = cli.overrides();

        assert_eq!(overrides.prompt.as_deref(), Some("% "));
        assert_eq!(overrides.slot_capacity, Some(64));
        assert_eq!(overrides.poll_interval_ms, Some(50));
        assert_eq!(cli.log_level(), log::LevelFilter::Debug);
    }

    #[test]
    fn test_no_flags_override_nothing() {
        let cli = Cli::parse_from(["tandem"]);
        assert_eq!(cli.overrides(), ConfigOverrides::default());
        assert_eq!(cli.log_level(), log::LevelFilter::Warn);
    }
}
