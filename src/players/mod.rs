//! Player trait and implementations.

mod automated;
mod turn;
mod human;
mod lineup;

pub use automated::AutomatedPlayer;
pub use turn::{PlayerCore, TurnGuard};
pub use human::HumanPlayer;
pub use lineup::LineupFactory;

use crate::config::PlayerSpec;
use crate::error::GameError;
use crate::orchestrator::GameHandle;
use crate::types::{Color, InterruptKind, MoveInput};
use async_trait::async_trait;
use derive_getters::Getters;
use derive_new::new;
use std::sync::Arc;
use std::time::Duration;

/// How a turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The player produced a move.
    Move(MoveInput),
    /// The wait was cut short by an interrupt.
    Interrupted(InterruptKind),
    /// The player was reset while waiting.
    Reset,
}

/// Who is sitting at the board.
#[derive(Debug, Clone, PartialEq, Eq, Getters, new)]
pub struct PlayerInfo {
    /// First name.
    first_name: String,
    /// Last name.
    last_name: String,
    /// Rating.
    rating: u32,
    /// Clock time for the whole game.
    total_time: Duration,
}

impl PlayerInfo {
    /// Builds the info of a configured player.
    pub fn from_spec(spec: &PlayerSpec) -> Self {
        Self::new(
            spec.first_name().clone(),
            spec.last_name().clone(),
            *spec.rating(),
            spec.total_time(),
        )
    }

    /// `"first last"`, or `"player"` when both are blank.
    pub fn name(&self) -> String {
        let full = [self.first_name.as_str(), self.last_name.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if full.is_empty() {
            "player".to_string()
        } else {
            full
        }
    }
}

impl Default for PlayerInfo {
    fn default() -> Self {
        Self::new(String::new(), String::new(), 0, Duration::from_secs(15 * 60))
    }
}

/// One side of the game.
///
/// Players never touch the rules engine or the board directly: they emit
/// move input and read snapshots through their [`GameHandle`].
#[async_trait]
pub trait Player: Send + Sync {
    /// Shared turn protocol state.
    fn core(&self) -> &PlayerCore;

    /// Produces a move for the side to move.
    ///
    /// `try_again` is set after the previous answer was illegal.
    async fn your_turn(&self, try_again: bool) -> Result<TurnOutcome, GameError>;

    /// Display name.
    fn name(&self) -> String {
        self.core().info().name()
    }

    /// Side this player moves.
    fn color(&self) -> Color {
        self.core().color()
    }

    /// Whether reversing this player's last move on the board asks for a
    /// take-back.
    fn allow_takeback(&self) -> bool {
        false
    }

    /// Called when this player's move was rolled back.
    fn take_back(&self) {}

    /// Cuts the current wait short, or latches `kind` for the next one.
    fn interrupt(&self, kind: InterruptKind) {
        self.core().interrupt(kind);
    }

    /// Ignores board input until [`resume`](Self::resume).
    fn pause(&self) {
        self.core().pause();
    }

    /// Accepts board input again and drops a latched interrupt.
    fn resume(&self) {
        self.core().resume();
    }

    /// Pauses, forgets queued input and releases any wait.
    fn reset(&self) {
        self.core().reset();
    }

    /// Stops listening to the board.
    fn shutdown(&self) {
        self.core().shutdown();
    }

    /// Clock time left.
    fn remaining_time(&self) -> Duration {
        self.core().remaining_time()
    }
}

/// Creates the players of a new game.
#[async_trait]
pub trait PlayerFactory: Send + Sync {
    /// Creates the player for `color`.
    ///
    /// An unknown engine in the player's configuration is a fatal
    /// [`GameError::Config`].
    async fn create(&self, color: Color, game: GameHandle) -> Result<Arc<dyn Player>, GameError>;
}
