//! Game orchestration between two players, the rules engine and the
//! sensor board.
//!
//! The orchestrator owns the rules engine and the board handle. Each turn it
//! asks the player in turn for a move, validates it, waits for the physical
//! board to follow and checks for the end of the game. Take-back and reset
//! requests arrive through a single interrupt slot that every wait polls.

mod handle;
mod sync;

pub use handle::GameHandle;
pub use sync::in_agreement;

use crate::board::PhysicalBoard;
use crate::config::GameSettings;
use crate::error::GameError;
use crate::events::{EventBus, GameEvent, ReadyPhase};
use crate::interrupt::{InterruptSlot, Observed};
use crate::layout::Layout;
use crate::players::{Player, PlayerFactory, TurnOutcome};
use crate::rules::{RulesEngine, RulesError, replay_moves};
use crate::types::{Color, GameResult, InterruptKind, MoveRecord, PendingState};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

/// How a full-board wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyOutcome {
    /// The board matches.
    Ready,
    /// An interrupt ended the wait first.
    Interrupted(InterruptKind),
}

/// How a move synchronization ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The mover's pieces match and the layout was committed.
    Synced,
    /// An interrupt ended the wait; nothing was committed.
    Interrupted,
}

/// How the turn loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// The game reached a final position.
    GameOver(GameResult),
    /// The game was reset.
    Abandoned,
}

enum PlayerTurn {
    Moved(MoveRecord),
    Interrupted,
    Abandoned,
}

#[derive(Clone)]
struct Lineup {
    white: Arc<dyn Player>,
    black: Arc<dyn Player>,
}

impl Lineup {
    fn get(&self, color: Color) -> &Arc<dyn Player> {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    fn each(&self) -> [&Arc<dyn Player>; 2] {
        [&self.white, &self.black]
    }
}

struct GameShared {
    rules: Mutex<Box<dyn RulesEngine>>,
    board: Arc<dyn PhysicalBoard>,
    events: EventBus<GameEvent>,
    interrupt: InterruptSlot,
    pending: Mutex<PendingState>,
    lineup: Mutex<Option<Lineup>>,
    game_id: AtomicU64,
    settings: GameSettings,
}

/// Cheaply cloneable handle on a chess game.
#[derive(Clone)]
pub struct ChessGame {
    shared: Arc<GameShared>,
}

impl std::fmt::Debug for ChessGame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChessGame")
            .field("game_id", &self.game_id())
            .field("pending", &self.pending_state())
            .field("fen", &self.fen())
            .finish()
    }
}

impl ChessGame {
    /// Creates a game over `rules` and `board`.
    pub fn new(
        rules: impl RulesEngine + 'static,
        board: Arc<dyn PhysicalBoard>,
        settings: GameSettings,
    ) -> Self {
        Self {
            shared: Arc::new(GameShared {
                rules: Mutex::new(Box::new(rules)),
                board,
                events: EventBus::new(*settings.event_capacity()),
                interrupt: InterruptSlot::new(),
                pending: Mutex::new(PendingState::Idle),
                lineup: Mutex::new(None),
                game_id: AtomicU64::new(0),
                settings,
            }),
        }
    }

    /// Handle given to players.
    pub fn handle(&self) -> GameHandle {
        GameHandle::new(Arc::downgrade(&self.shared))
    }

    /// Subscribes to game events.
    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.shared.events.subscribe()
    }

    /// The physical board.
    pub fn board(&self) -> &Arc<dyn PhysicalBoard> {
        &self.shared.board
    }

    /// Orchestrator settings.
    pub fn settings(&self) -> &GameSettings {
        &self.shared.settings
    }

    /// Id of the current game; increments with every [`new_game`](Self::new_game).
    pub fn game_id(&self) -> u64 {
        self.shared.game_id.load(Ordering::SeqCst)
    }

    /// What the orchestrator is blocked on.
    pub fn pending_state(&self) -> PendingState {
        *self.shared.pending.lock()
    }

    fn set_pending(&self, state: PendingState) {
        *self.shared.pending.lock() = state;
    }

    /// FEN of the logical position.
    pub fn fen(&self) -> String {
        self.shared.rules.lock().fen()
    }

    /// Side to move.
    pub fn turn(&self) -> Color {
        self.shared.rules.lock().turn()
    }

    /// Piece placement of the logical position.
    pub fn game_layout(&self) -> Layout {
        self.shared.rules.lock().layout()
    }

    /// Sensed layout of the physical board.
    pub fn board_layout(&self) -> Layout {
        self.shared.board.layout()
    }

    /// Number of half-moves that can be taken back.
    pub fn history_len(&self) -> usize {
        self.shared.rules.lock().history_len()
    }

    /// The player of `color` in the current game.
    pub fn player(&self, color: Color) -> Result<Arc<dyn Player>, GameError> {
        self.shared
            .lineup
            .lock()
            .as_ref()
            .map(|lineup| Arc::clone(lineup.get(color)))
            .ok_or(GameError::PlayersMissing)
    }

    fn lineup(&self) -> Option<Lineup> {
        self.shared.lineup.lock().clone()
    }

    /// Sets up a new game and waits until the board shows its start layout.
    ///
    /// `moves` holds seed moves in SAN or UCI and `undo_N` directives,
    /// replayed on top of `start_fen`. Players of a previous game are reset
    /// before `factory` creates the new ones, black first.
    #[instrument(skip(self, factory))]
    pub async fn new_game(
        &self,
        factory: &dyn PlayerFactory,
        start_fen: Option<&str>,
        moves: Option<&str>,
    ) -> Result<ReadyOutcome, GameError> {
        let game_id = self.shared.game_id.fetch_add(1, Ordering::SeqCst) + 1;

        let previous = self.shared.lineup.lock().take();
        if let Some(previous) = previous {
            for player in previous.each() {
                player.reset();
                player.shutdown();
            }
        }

        self.shared.board.reset();
        let start = {
            let mut rules = self.shared.rules.lock();
            rules.reset();
            if let Some(fen) = start_fen {
                rules.load(fen)?;
            }
            if let Some(moves) = moves {
                replay_moves(&mut **rules, moves).map_err(|e| match e {
                    RulesError::InvalidMove { token } => GameError::SeedMove { token },
                    other => GameError::Rules(other),
                })?;
            }
            rules.layout()
        };
        info!(game_id, fen = %self.fen(), "new game");
        self.clear_interrupt();

        if let ReadyOutcome::Interrupted(kind) =
            self.wait_for_board_ready(&start, ReadyPhase::Start).await?
        {
            info!(%kind, "new game interrupted");
            self.clear_interrupt();
            return Ok(ReadyOutcome::Interrupted(kind));
        }

        self.shared.board.reset();
        let black = factory.create(Color::Black, self.handle()).await?;
        let white = factory.create(Color::White, self.handle()).await?;
        *self.shared.lineup.lock() = Some(Lineup { white, black });

        self.shared.events.publish(GameEvent::NewGameReady { game_id });
        Ok(ReadyOutcome::Ready)
    }

    /// Sets up a new game and plays it to the end.
    pub async fn start(
        &self,
        factory: &dyn PlayerFactory,
        start_fen: Option<&str>,
        moves: Option<&str>,
    ) -> Result<PlayOutcome, GameError> {
        match self.new_game(factory, start_fen, moves).await? {
            ReadyOutcome::Ready => self.play().await,
            ReadyOutcome::Interrupted(_) => Ok(PlayOutcome::Abandoned),
        }
    }

    /// Runs the turn loop until the game ends or is reset.
    #[instrument(skip(self), fields(game_id = self.game_id()))]
    pub async fn play(&self) -> Result<PlayOutcome, GameError> {
        loop {
            match self.check_interrupt() {
                Some(InterruptKind::TakeBack) => {
                    self.clear_interrupt();
                    if let ReadyOutcome::Interrupted(kind) = self.roll_back().await? {
                        debug!(%kind, "take-back wait interrupted");
                    }
                    continue;
                }
                Some(InterruptKind::Reset) => {
                    self.clear_interrupt();
                    info!("reset");
                    return Ok(PlayOutcome::Abandoned);
                }
                None => {}
            }

            let color = self.turn();
            let player = self.player(color)?;
            let before = self.game_layout();

            self.set_pending(PendingState::WaitPlayer(color));
            let turn = self.wait_player_turn(color, player.as_ref()).await;
            self.set_pending(PendingState::Idle);

            let record = match turn? {
                PlayerTurn::Moved(record) => record,
                PlayerTurn::Interrupted => continue,
                PlayerTurn::Abandoned => return Ok(PlayOutcome::Abandoned),
            };
            if self.check_interrupt().is_some() {
                continue;
            }

            let synced = self.sync_board(&record, &before).await?;
            let interrupted = synced == SyncOutcome::Interrupted;
            if interrupted {
                info!("sync board interrupted");
            }
            self.shared.events.publish(GameEvent::PlayerMoved {
                color,
                player: player.name(),
                record,
                interrupted,
            });
            if interrupted {
                continue;
            }

            if let Some(result) = self.check_end_game() {
                info!(%result, "game over");
                self.shared.events.publish(GameEvent::GameOver { result });
                return Ok(PlayOutcome::GameOver(result));
            }
        }
    }

    /// Asks `player` for moves until one is legal.
    async fn wait_player_turn(
        &self,
        color: Color,
        player: &dyn Player,
    ) -> Result<PlayerTurn, GameError> {
        let mut try_again = false;
        loop {
            info!(%color, try_again, "{}'s turn", color);
            let outcome = player.your_turn(try_again).await?;

            if self.check_interrupt().is_some() {
                return Ok(PlayerTurn::Interrupted);
            }

            let input = match outcome {
                TurnOutcome::Move(input) => input,
                TurnOutcome::Interrupted(kind) => {
                    debug!(%kind, "player released without a game interrupt");
                    return Ok(PlayerTurn::Interrupted);
                }
                TurnOutcome::Reset => return Ok(PlayerTurn::Abandoned),
            };

            let accepted = input
                .resolve()
                .and_then(|request| self.shared.rules.lock().apply(&request));

            match accepted {
                Some(record) => {
                    info!(
                        san = record.san().unwrap_or_default(),
                        "\n{}",
                        self.shared.rules.lock().ascii()
                    );
                    return Ok(PlayerTurn::Moved(mark_en_passant(record)));
                }
                None => {
                    warn!(player = %player.name(), ?input, "made an illegal move, try again please");
                    self.shared.events.publish(GameEvent::IllegalMove {
                        color,
                        player: player.name(),
                        input,
                    });
                    try_again = true;
                }
            }
        }
    }

    /// Final result of the logical position, if it is final.
    pub fn check_end_game(&self) -> Option<GameResult> {
        let rules = self.shared.rules.lock();
        if rules.is_draw() {
            Some(GameResult::Draw)
        } else if rules.is_stalemate() {
            Some(GameResult::Stalemate)
        } else if rules.is_threefold_repetition() {
            Some(GameResult::ThreefoldRepetition)
        } else if rules.is_checkmate() {
            Some(GameResult::Checkmate {
                winner: rules.turn().opponent(),
            })
        } else {
            None
        }
    }

    /// Rolls back one half-move per player and waits for the board to
    /// show the earlier position.
    #[instrument(skip(self))]
    async fn roll_back(&self) -> Result<ReadyOutcome, GameError> {
        info!("waiting for takeback");
        let undone: Vec<MoveRecord> = {
            let mut rules = self.shared.rules.lock();
            (0..2).map_while(|_| rules.undo()).collect()
        };

        if undone.is_empty() {
            self.continue_play();
            return Ok(ReadyOutcome::Ready);
        }

        if let Some(lineup) = self.lineup() {
            for record in &undone {
                lineup.get(record.color()).take_back();
            }
        }
        self.shared.events.publish(GameEvent::TakeBack {
            moves: undone,
        });

        let want = self.game_layout();
        match self.wait_for_board_ready(&want, ReadyPhase::TakeBack).await? {
            ReadyOutcome::Ready => {
                self.continue_play();
                Ok(ReadyOutcome::Ready)
            }
            interrupted => Ok(interrupted),
        }
    }

    fn continue_play(&self) {
        self.shared.board.reset_to(&self.game_layout());
        if let Some(lineup) = self.lineup() {
            for player in lineup.each() {
                player.resume();
            }
        }
    }

    /// Asks for the last move of each player to be taken back.
    ///
    /// Ignored while the board is being set up for a new game or for an
    /// earlier take-back.
    pub async fn take_back(&self) -> Result<(), GameError> {
        if self.pending_state() == PendingState::WaitBoardReady {
            warn!("take-back ignored while waiting for the board");
            return Ok(());
        }
        self.interrupt(InterruptKind::TakeBack, true).await
    }

    /// Abandons the running game.
    pub async fn reset(&self) -> Result<(), GameError> {
        self.interrupt(InterruptKind::Reset, false).await
    }

    /// Raises `kind` and waits until the pending wait has unwound.
    ///
    /// With `pause`, players ignore board input until play continues.
    #[instrument(skip(self))]
    pub async fn interrupt(&self, kind: InterruptKind, pause: bool) -> Result<(), GameError> {
        let done = self
            .shared
            .interrupt
            .arm(kind)
            .ok_or(GameError::InterruptPending)?;
        let idle = self.pending_state() == PendingState::Idle;

        if let Some(lineup) = self.lineup() {
            for player in lineup.each() {
                if pause {
                    player.pause();
                }
                player.interrupt(kind);
            }
        }
        self.shared.board.emit_changed();

        if idle {
            tokio::task::yield_now().await;
            self.check_interrupt();
        }

        // Clearing the slot drops the sender, which also releases us.
        let _ = done.await;
        debug!("interrupt serviced");
        Ok(())
    }

    /// Reports the outstanding interrupt.
    ///
    /// The first report after [`interrupt`](Self::interrupt) releases its
    /// caller and drops the pending state.
    pub fn check_interrupt(&self) -> Option<InterruptKind> {
        let observed = self.shared.interrupt.check()?;
        if let Observed::Fresh(kind) = observed {
            debug!(%kind, "interrupt delivered");
            self.set_pending(PendingState::Idle);
        }
        Some(observed.kind())
    }

    /// Empties the interrupt slot.
    pub fn clear_interrupt(&self) {
        debug!("clear interrupt");
        self.shared.interrupt.clear();
    }
}

/// Attaches the square of the pawn captured en passant.
fn mark_en_passant(record: MoveRecord) -> MoveRecord {
    if !record.flags().en_passant {
        return record;
    }
    // The captured pawn sits one rank behind the destination.
    let delta = match record.color() {
        Color::White => 8,
        Color::Black => -8,
    };
    match record.to().offset(delta) {
        Some(captured) => record.with_en_passant_capture(captured),
        None => record,
    }
}
