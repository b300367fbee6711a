//! Human player moving pieces on the sensor board.

use super::{Player, PlayerCore, PlayerInfo, TurnOutcome};
use crate::error::GameError;
use crate::orchestrator::GameHandle;
use crate::types::Color;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Player whose only move source is the physical board.
#[derive(Debug)]
pub struct HumanPlayer {
    core: Arc<PlayerCore>,
}

impl HumanPlayer {
    /// Creates a human player for `color`.
    pub fn new(color: Color, info: PlayerInfo, game: GameHandle) -> Result<Self, GameError> {
        Ok(Self {
            core: PlayerCore::spawn(color, info, game, false)?,
        })
    }
}

#[async_trait]
impl Player for HumanPlayer {
    fn core(&self) -> &PlayerCore {
        &self.core
    }

    #[instrument(skip(self), fields(player = %self.name()))]
    async fn your_turn(&self, _try_again: bool) -> Result<TurnOutcome, GameError> {
        let outcome = self.core.await_physical_move().await;
        debug!(?outcome, "human turn finished");
        Ok(outcome)
    }
}
