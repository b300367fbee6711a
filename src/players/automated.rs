//! Player backed by an ensemble of move-generation agents.

use super::{Player, PlayerCore, PlayerInfo, TurnOutcome};
use crate::agent::{MoveAgent, SearchOptions};
use crate::error::{ConfigError, GameError};
use crate::orchestrator::GameHandle;
use crate::types::{Color, MoveInput};
use async_trait::async_trait;
use futures::future::try_join_all;
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

#[derive(Debug, Default, Clone, Copy)]
struct Rotation {
    current: usize,
    last: usize,
}

/// Asks one agent of its ensemble per turn, rotating after every accepted
/// answer.
///
/// The ensemble order is shuffled once so equal agents take turns opening.
pub struct AutomatedPlayer {
    core: Arc<PlayerCore>,
    engines: Vec<Arc<dyn MoveAgent>>,
    rotation: Mutex<Rotation>,
    search: SearchOptions,
    min_think: Duration,
}

impl std::fmt::Debug for AutomatedPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutomatedPlayer")
            .field("color", &self.core.color())
            .field("engines", &self.engine_names())
            .field("rotation", &*self.rotation.lock())
            .finish()
    }
}

impl AutomatedPlayer {
    /// Creates an automated player for `color`.
    ///
    /// An empty ensemble is a configuration error.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        color: Color,
        info: PlayerInfo,
        mut engines: Vec<Arc<dyn MoveAgent>>,
        search: SearchOptions,
        min_think: Duration,
        shuffle: bool,
        game: GameHandle,
    ) -> Result<Self, GameError> {
        if engines.is_empty() {
            return Err(ConfigError::new(format!("{} engine player has no engines", color)).into());
        }
        if shuffle {
            engines.shuffle(&mut rand::thread_rng());
        }
        Ok(Self {
            core: PlayerCore::spawn(color, info, game, true)?,
            engines,
            rotation: Mutex::new(Rotation::default()),
            search,
            min_think,
        })
    }

    /// Ensemble names in rotation order.
    pub fn engine_names(&self) -> Vec<String> {
        self.engines.iter().map(|e| e.name().to_string()).collect()
    }

    /// Index of the agent asked next.
    pub fn active_engine(&self) -> usize {
        self.rotation.lock().current
    }

    async fn consult(&self, try_again: bool) -> Result<MoveInput, GameError> {
        let fen = self.core.game().fen()?;
        try_join_all(self.engines.iter().map(|engine| engine.position(&fen))).await?;

        // A retry goes back to the agent whose answer was rejected.
        let index = {
            let rotation = self.rotation.lock();
            if try_again { rotation.last } else { rotation.current }
        };
        let engine = self
            .engines
            .get(index)
            .ok_or_else(|| ConfigError::new(format!("no engine at rotation slot {}", index)))?;
        let answer = engine.go(&self.search, &fen).await?;

        {
            let mut rotation = self.rotation.lock();
            rotation.last = index;
            rotation.current = (index + 1) % self.engines.len();
        }

        info!(
            engine = engine.name(),
            bestmove = %answer.bestmove,
            pickmove = ?answer.pickmove,
            "engine answered"
        );
        Ok(MoveInput::Uci(answer.chosen().to_string()))
    }
}

#[async_trait]
impl Player for AutomatedPlayer {
    fn core(&self) -> &PlayerCore {
        &self.core
    }

    #[instrument(skip(self), fields(player = %self.name()))]
    async fn your_turn(&self, try_again: bool) -> Result<TurnOutcome, GameError> {
        let turn = self.core.start_turn();
        // Board input is never reconciled for an engine's own turn.
        self.core.clear_pending_moves();

        let outcome = tokio::select! {
            biased;
            kind = self.core.interrupted() => Ok(TurnOutcome::Interrupted(kind)),
            answer = self.consult(try_again) => answer.map(TurnOutcome::Move),
        };

        tokio::time::sleep_until(turn.started() + self.min_think).await;
        debug!(?outcome, "engine turn finished");
        outcome
    }

    fn name(&self) -> String {
        format!("{} ({})", self.core.info().name(), self.engine_names().join(","))
    }

    fn allow_takeback(&self) -> bool {
        true
    }

    fn take_back(&self) {
        let mut rotation = self.rotation.lock();
        rotation.current = rotation.last;
        debug!(slot = rotation.current, "rotation rewound");
    }
}
