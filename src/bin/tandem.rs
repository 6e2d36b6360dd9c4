// src/bin/tandem.rs

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use signal_hook::consts::{SIGQUIT, SIGTERM};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tandem::{
    ExitCode,
    cli::Cli,
    core::config_loader,
    system::{
        shell::ShellService,
        sys::{self, SigintDisposition},
    },
};

fn main() {
    let cli = Cli::parse();
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .init();

    // The entire session is wrapped in a Result to enable centralized error handling.
    match run(&cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{}: {:#}", tandem::t!("main.error.label").red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<ExitCode> {
    // 1. Resolve settings: defaults < config file < flags.
    let config = config_loader::load(cli.config.as_deref(), &cli.overrides())?;

    // 2. Ctrl+C belongs to foreground children; SIGTERM/SIGQUIT end the session.
    sys::set_sigint_disposition(SigintDisposition::Ignore)
        .context("Could not ignore SIGINT")?;
    let stop = Arc::new(AtomicBool::new(false));
    for signal in [SIGTERM, SIGQUIT] {
        signal_hook::flag::register(signal, Arc::clone(&stop))
            .with_context(|| format!("Could not install handler for signal {}", signal))?;
    }

    // 3. Run the session until a worker finishes.
    let shell = ShellService::new(&config).context(tandem::t!("shell.error.startup"))?;
    let code = shell.run(&stop);
    log::debug!("Session ended with code {}", code);
    Ok(code)
}
