//! Weak handle on a game, held by its players.

use super::{ChessGame, GameShared};
use crate::board::BoardEvent;
use crate::error::GameError;
use crate::layout::Layout;
use crate::types::{Color, PieceMove};
use std::sync::Weak;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// What a player may see of the game it plays in.
///
/// The handle does not keep the game alive; once the game is dropped every
/// accessor fails with [`GameError::GameDropped`].
#[derive(Debug, Clone)]
pub struct GameHandle {
    shared: Weak<GameShared>,
}

impl GameHandle {
    pub(super) fn new(shared: Weak<GameShared>) -> Self {
        Self { shared }
    }

    fn game(&self) -> Result<ChessGame, GameError> {
        self.shared
            .upgrade()
            .map(|shared| ChessGame { shared })
            .ok_or(GameError::GameDropped)
    }

    /// FEN of the logical position.
    pub fn fen(&self) -> Result<String, GameError> {
        Ok(self.game()?.fen())
    }

    /// Piece placement of the logical position.
    pub fn layout(&self) -> Result<Layout, GameError> {
        Ok(self.game()?.game_layout())
    }

    /// Subscribes to the physical board's notifications.
    pub fn subscribe_board(&self) -> Result<broadcast::Receiver<BoardEvent>, GameError> {
        Ok(self.game()?.board().subscribe())
    }

    /// Asks the board to report movement since its last commit.
    pub fn detect_moves(&self) {
        if let Ok(game) = self.game() {
            game.board().detect_moves();
        }
    }

    /// Starts a take-back if `piece_move` puts `color`'s last move back.
    ///
    /// Returns `true` when the gesture was recognized.
    pub fn check_take_back(&self, color: Color, piece_move: &PieceMove) -> bool {
        let Ok(game) = self.game() else {
            return false;
        };
        let Some(last) = game.shared.rules.lock().last_move().cloned() else {
            return false;
        };
        debug!(?piece_move, last = %last.uci(), "check take back move");

        if last.color() != color || !last.is_reversed_by(piece_move.from, piece_move.to) {
            return false;
        }

        info!(last = %last.uci(), "trying to take back move");
        tokio::spawn(async move {
            if let Err(e) = game.take_back().await {
                warn!(error = %e, "take-back failed");
            }
        });
        true
    }
}
