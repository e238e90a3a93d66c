//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod check;
mod transcribe;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "bangla-pdf-ocr")]
#[command(about = "Extract Bengali text from scanned PDFs with Tesseract")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Extract text from a PDF
    Transcribe(transcribe::TranscribeArgs),

    /// Check that tesseract, Poppler and language data are installed
    Check {
        /// Language to check traineddata for (default: configured language)
        #[arg(short, long)]
        language: Option<String>,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Transcribe(args) => transcribe::cmd_transcribe(config, args).await,
        Commands::Check { language } => check::cmd_check(&config, language.as_deref()),
    }
}
