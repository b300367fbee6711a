//! Error types.

use crate::rules::RulesError;
use derive_more::{Display, Error, From};
use tracing::instrument;

/// Configuration error with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
    #[track_caller]
    #[instrument(skip(message))]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

/// Move-generation agent failure with location tracking.
#[derive(Debug, Clone, Display, Error)]
#[display("Agent error ({}): {} at {}:{}", agent, message, file, line)]
pub struct AgentError {
    /// Agent name.
    pub agent: String,
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl AgentError {
    /// Creates a new agent error.
    #[track_caller]
    #[instrument(skip(agent, message))]
    pub fn new(agent: impl Into<String>, message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            agent: agent.into(),
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

/// Errors surfaced by the game orchestrator.
///
/// An interrupted wait is not an error; it is reported through the
/// `Interrupted` variants of the outcome types.
#[derive(Debug, Display, Error, From)]
pub enum GameError {
    /// Invalid setup or configuration.
    #[display("{_0}")]
    #[from]
    Config(ConfigError),
    /// A move-generation agent failed.
    #[display("{_0}")]
    #[from]
    Agent(AgentError),
    /// The rules engine rejected setup input.
    #[display("{_0}")]
    #[from]
    Rules(RulesError),
    /// A seed move could not be played.
    #[display("seed move '{token}' is not playable")]
    SeedMove {
        /// Offending token.
        token: String,
    },
    /// Another interrupt is still outstanding.
    #[display("an interrupt is already pending")]
    InterruptPending,
    /// Players were requested before a game was set up.
    #[display("no game in progress")]
    PlayersMissing,
    /// The physical board stopped publishing notifications.
    #[display("physical board notifications closed")]
    BoardClosed,
    /// A player outlived the game it belonged to.
    #[display("game no longer exists")]
    GameDropped,
}
