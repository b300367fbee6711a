//! Move-generation agents.

mod random;
mod registry;
mod uci;

pub use random::RandomAgent;
pub use registry::EngineRegistry;
pub use uci::{UciEngine, parse_bestmove, parse_info_pv};

use crate::error::AgentError;
use async_trait::async_trait;
use std::collections::HashMap;

/// Search budget for one move request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Search depth in plies.
    pub depth: u32,
    /// Number of ranked lines to report.
    pub multi_pv: u32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            depth: 1,
            multi_pv: 10,
        }
    }
}

/// An agent's answer, moves in UCI notation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentMove {
    /// The agent's best move.
    pub bestmove: String,
    /// An explicitly chosen move that overrides `bestmove`.
    pub pickmove: Option<String>,
    /// First move of every reported line, best first.
    pub ranked: Vec<String>,
}

impl AgentMove {
    /// The move to play: `pickmove` when present.
    pub fn chosen(&self) -> &str {
        self.pickmove.as_deref().unwrap_or(&self.bestmove)
    }
}

/// Something that chooses moves for a position.
#[async_trait]
pub trait MoveAgent: Send + Sync {
    /// Display name.
    fn name(&self) -> &str;

    /// Sets the position to search from.
    async fn position(&self, fen: &str) -> Result<(), AgentError>;

    /// Searches the position last given to [`position`](Self::position).
    ///
    /// `fen` is the same position, for agents that need it directly.
    async fn go(&self, options: &SearchOptions, fen: &str) -> Result<AgentMove, AgentError>;

    /// Prepares for a new game with engine specific options.
    async fn new_game(&self, options: &HashMap<String, String>) -> Result<(), AgentError> {
        let _ = options;
        Ok(())
    }
}
