//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check that a mission document decodes
    Validate {
        /// Mission JSON file
        path: PathBuf,
        /// Treat the file as a mission database (JSON array of missions)
        #[arg(short, long)]
        database: bool,
    },
    /// Show the groups of a mission with their transport plan and selection
    Inspect {
        /// Mission JSON file
        path: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate a fresh mission with a presence group and two audio groups
    Template {
        /// Mission name
        #[arg(short, long, default_value = "New Mission")]
        name: String,
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Drive a session from a script of commands and engine reports
    Replay {
        /// Mission JSON file to apply before the script runs
        mission: PathBuf,
        /// Script file, one JSON step per line
        script: PathBuf,
    },
    /// Print an example configuration file
    ExampleConfig,
}
