//! Stemmix CLI - Stem Mixing and Analysis
//!
//! Command-line interface for the Stemmix engine and analysis pipeline.

use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use log::{debug, info};

use stemmix::cli::{commands, Cli, Commands};
use stemmix::config::Config;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    debug!("Stemmix v{}", env!("CARGO_PKG_VERSION"));

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    match cli.command {
        Some(cmd) => handle_command(cmd, &config),
        None => {
            println!("Stemmix v{}", env!("CARGO_PKG_VERSION"));
            println!("Use --help for available commands");
            Ok(())
        }
    }
}

fn handle_command(cmd: Commands, config: &Config) -> anyhow::Result<()> {
    match cmd {
        Commands::Analyze { sources, json } => commands::analyze(&sources, json, config),
        Commands::AnalyzeDir { dir, json } => commands::analyze_dir(&dir, json, config),
        Commands::Compat { first, second, json } => {
            commands::compat(&first, &second, json, config)
        }
        Commands::Waveform { source, bars } => commands::waveform(&source, bars, config),
        Commands::Mix {
            tracks,
            solo,
            mute,
            out,
        } => {
            info!("Mixing {} tracks", tracks.len());
            commands::mix(&tracks, &solo, &mute, &out, config)
        }
        Commands::Clip {
            source,
            start,
            duration,
            name,
            out_dir,
        } => commands::clip(&source, start, duration, name.as_deref(), &out_dir),
        Commands::Play { sources } => commands::play(&sources, config),
    }
}
