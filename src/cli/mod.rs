//! CLI Module
//!
//! Command-line interface for the Stemmix engine and analysis pipeline.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Stemmix - multi-stem mixing, playback and analysis
#[derive(Parser, Debug)]
#[command(name = "stemmix")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// JSON configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Estimate tempo, key and loudness
    #[command(name = "analyze")]
    Analyze {
        /// Paths or URLs of the tracks
        #[arg(required = true)]
        sources: Vec<String>,

        /// Print JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Analyse every audio file under a directory
    #[command(name = "analyze-dir")]
    AnalyzeDir {
        dir: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Score how well two tracks blend
    #[command(name = "compat")]
    Compat {
        first: String,
        second: String,

        #[arg(long)]
        json: bool,
    },

    /// Print waveform peaks as JSON
    #[command(name = "waveform")]
    Waveform {
        source: String,

        /// Number of bars (defaults to the configured value)
        #[arg(short, long)]
        bars: Option<usize>,
    },

    /// Mix stems offline and write a WAV file
    #[command(name = "mix")]
    Mix {
        /// Stem as NAME=SOURCE[:VOLUME[:PAN]]
        #[arg(short, long = "track", required = true, value_parser = commands::parse_track_spec)]
        tracks: Vec<commands::TrackSpec>,

        /// Solo the named stem
        #[arg(long)]
        solo: Vec<String>,

        /// Mute the named stem
        #[arg(long)]
        mute: Vec<String>,

        /// Output WAV path
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Cut a short hook clip from a track
    #[command(name = "clip")]
    Clip {
        source: String,

        /// Start time in seconds
        #[arg(short, long)]
        start: f64,

        /// Length in seconds
        #[arg(short, long)]
        duration: f64,

        /// Base of the output file name
        #[arg(short, long)]
        name: Option<String>,

        /// Directory the clip is written to
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Play stems in sync on the default output device
    #[command(name = "play")]
    Play {
        #[arg(required = true)]
        sources: Vec<String>,
    },
}
