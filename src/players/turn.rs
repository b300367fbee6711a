//! Turn protocol shared by every player.

use super::{PlayerInfo, TurnOutcome};
use crate::board::BoardEvent;
use crate::error::GameError;
use crate::orchestrator::GameHandle;
use crate::types::{Color, InterruptKind, PieceMove};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Notify, broadcast, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

#[derive(Debug)]
struct TurnState {
    in_turn: bool,
    paused: bool,
    interrupt: Option<InterruptKind>,
    pending_moves: VecDeque<PieceMove>,
    await_move: Option<oneshot::Sender<TurnOutcome>>,
    remaining: Duration,
    turn_started: Option<Instant>,
}

/// Turn state of one player plus the task feeding it board input.
///
/// Board moves of this player's color arriving out of turn are queued;
/// when the next wait begins the queue is dropped and the board is asked
/// to detect moves again, so the wait sees the net movement.
#[derive(Debug)]
pub struct PlayerCore {
    color: Color,
    info: PlayerInfo,
    game: GameHandle,
    state: Mutex<TurnState>,
    interrupted: Notify,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl PlayerCore {
    /// Creates the core and starts listening to board moves of `color`.
    ///
    /// With `allow_takeback`, an out-of-turn move reversing this color's
    /// last move asks the game for a take-back.
    #[instrument(skip(info, game), fields(player = %info.name()))]
    pub fn spawn(
        color: Color,
        info: PlayerInfo,
        game: GameHandle,
        allow_takeback: bool,
    ) -> Result<Arc<Self>, GameError> {
        let events = game.subscribe_board()?;
        let core = Arc::new(Self {
            color,
            state: Mutex::new(TurnState {
                in_turn: false,
                paused: false,
                interrupt: None,
                pending_moves: VecDeque::new(),
                await_move: None,
                remaining: *info.total_time(),
                turn_started: None,
            }),
            info,
            game,
            interrupted: Notify::new(),
            listener: Mutex::new(None),
        });
        let task = tokio::spawn(listen(Arc::downgrade(&core), events, allow_takeback));
        *core.listener.lock() = Some(task);
        debug!("player listening for board moves");
        Ok(core)
    }

    /// Side this player moves.
    pub fn color(&self) -> Color {
        self.color
    }

    /// Who the player is.
    pub fn info(&self) -> &PlayerInfo {
        &self.info
    }

    /// Handle on the running game.
    pub fn game(&self) -> &GameHandle {
        &self.game
    }

    /// Returns `true` between turn start and turn end.
    pub fn in_turn(&self) -> bool {
        self.state.lock().in_turn
    }

    /// Returns `true` while board input is ignored.
    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    /// Number of board moves queued while out of turn.
    pub fn pending_moves(&self) -> usize {
        self.state.lock().pending_moves.len()
    }

    /// Drops queued board moves.
    pub fn clear_pending_moves(&self) {
        self.state.lock().pending_moves.clear();
    }

    /// Marks the turn started; the returned guard ends it when dropped.
    pub fn start_turn(&self) -> TurnGuard<'_> {
        let started = Instant::now();
        let mut state = self.state.lock();
        state.in_turn = true;
        state.turn_started = Some(started);
        TurnGuard {
            core: self,
            started,
        }
    }

    fn end_turn(&self) {
        let mut state = self.state.lock();
        state.in_turn = false;
        if let Some(started) = state.turn_started {
            state.remaining = state.remaining.saturating_sub(started.elapsed());
        }
        trace!(color = %self.color, remaining = ?state.remaining, "turn ended");
    }

    /// Clock time left.
    pub fn remaining_time(&self) -> Duration {
        self.state.lock().remaining
    }

    /// Time spent in the running (or last) turn.
    pub fn turn_running_time(&self) -> Duration {
        self.state
            .lock()
            .turn_started
            .map(|started| started.elapsed())
            .unwrap_or_default()
    }

    /// Waits for this player's next board move.
    ///
    /// Resolves at once with a latched interrupt.
    pub async fn wait_move(&self) -> TurnOutcome {
        let (waiting, detect) = {
            let mut state = self.state.lock();
            if let Some(kind) = state.interrupt {
                return TurnOutcome::Interrupted(kind);
            }
            let detect = !state.pending_moves.is_empty();
            state.pending_moves.clear();
            let (waiter, waiting) = oneshot::channel();
            state.await_move = Some(waiter);
            (waiting, detect)
        };

        if detect {
            debug!(color = %self.color, "moves made while waiting, detecting again");
            self.game.detect_moves();
        }

        // A replaced waiter means a newer wait took over.
        waiting.await.unwrap_or(TurnOutcome::Reset)
    }

    /// The plain turn: start, wait for board input, end.
    pub async fn await_physical_move(&self) -> TurnOutcome {
        let _turn = self.start_turn();
        let outcome = self.wait_move().await;
        self.state.lock().interrupt = None;
        outcome
    }

    /// Resolves once an interrupt is latched, consuming it.
    pub async fn interrupted(&self) -> InterruptKind {
        loop {
            let notified = self.interrupted.notified();
            if let Some(kind) = self.state.lock().interrupt.take() {
                return kind;
            }
            notified.await;
        }
    }

    /// Releases the outstanding wait with `kind`, or latches it.
    pub fn interrupt(&self, kind: InterruptKind) {
        {
            let mut state = self.state.lock();
            match state.await_move.take() {
                Some(waiter) => {
                    // The waiting turn may already be gone.
                    let _ = waiter.send(TurnOutcome::Interrupted(kind));
                }
                None => state.interrupt = Some(kind),
            }
        }
        debug!(color = %self.color, %kind, "player interrupted");
        self.interrupted.notify_one();
    }

    /// Ignores board input.
    pub fn pause(&self) {
        self.state.lock().paused = true;
    }

    /// Accepts board input again and drops a latched interrupt.
    pub fn resume(&self) {
        let mut state = self.state.lock();
        state.paused = false;
        state.interrupt = None;
    }

    /// Pauses, forgets queued input and releases any wait.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.paused = true;
        state.interrupt = None;
        state.pending_moves.clear();
        if let Some(waiter) = state.await_move.take() {
            let _ = waiter.send(TurnOutcome::Reset);
        }
    }

    /// Stops the board listener.
    pub fn shutdown(&self) {
        if let Some(task) = self.listener.lock().take() {
            task.abort();
        }
    }

    fn on_piece_moved(&self, piece_move: PieceMove, allow_takeback: bool) {
        let mut state = self.state.lock();
        if state.paused {
            trace!(color = %self.color, ?piece_move, "paused, ignoring move");
            return;
        }

        if state.in_turn {
            match state.await_move.take() {
                Some(waiter) => {
                    if waiter.send(TurnOutcome::Move(piece_move.into())).is_err() {
                        state.pending_moves.push_back(piece_move);
                    }
                }
                None => state.pending_moves.push_back(piece_move),
            }
            return;
        }

        state.pending_moves.push_back(piece_move);
        drop(state);

        if allow_takeback && self.game.check_take_back(self.color, &piece_move) {
            info!(color = %self.color, from = %piece_move.from, to = %piece_move.to, "take-back gesture");
        }
    }
}

impl Drop for PlayerCore {
    fn drop(&mut self) {
        if let Some(task) = self.listener.get_mut().take() {
            task.abort();
        }
    }
}

async fn listen(core: Weak<PlayerCore>, mut events: broadcast::Receiver<BoardEvent>, allow_takeback: bool) {
    loop {
        match events.recv().await {
            Ok(BoardEvent::PieceMoved(piece_move)) => {
                let Some(core) = core.upgrade() else { break };
                if piece_move.color == core.color {
                    core.on_piece_moved(piece_move, allow_takeback);
                }
            }
            Ok(BoardEvent::Changed) => {}
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "board input lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Ends the turn when dropped, whichever way the turn finishes.
#[derive(Debug)]
pub struct TurnGuard<'a> {
    core: &'a PlayerCore,
    started: Instant,
}

impl TurnGuard<'_> {
    /// When the turn started.
    pub fn started(&self) -> Instant {
        self.started
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.core.end_turn();
    }
}
