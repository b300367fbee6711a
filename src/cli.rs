//! Command-line interface for strictly_chess.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Strictly Chess - sensor board game orchestration
#[derive(Parser, Debug)]
#[command(name = "strictly_chess")]
#[command(about = "Turn orchestration between a sensor board, engines and a rules engine", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a configured game on the in-memory board
    ///
    /// Engine moves and take-back positions are placed on the board
    /// automatically. Human players type moves (`e2e4`), `takeback` or
    /// `reset` on stdin.
    Play {
        /// Path to the game configuration
        #[arg(short, long, default_value = "chess.toml")]
        config: PathBuf,

        /// Start position (overrides the configuration)
        #[arg(long)]
        fen: Option<String>,

        /// Seed moves, e.g. "e4 e5 Nf3 undo_1" (overrides the configuration)
        #[arg(long)]
        moves: Option<String>,
    },

    /// Replay seed moves and print the resulting position
    Replay {
        /// Start position
        #[arg(long)]
        fen: Option<String>,

        /// Moves in SAN or UCI and undo_N directives
        moves: String,
    },
}
