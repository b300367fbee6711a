//! Typed publish/subscribe notifications.

use crate::layout::Layout;
use crate::types::{Color, GameResult, MoveInput, MoveRecord};
use std::fmt::Debug;
use tokio::sync::broadcast;
use tracing::trace;

/// Broadcast bus owned by a stateful component.
///
/// Subscribers hold a [`broadcast::Receiver`]; dropping it releases the
/// subscription on every exit path.
#[derive(Debug, Clone)]
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone + Debug> EventBus<E> {
    /// Creates a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes `event` to every current subscriber.
    pub fn publish(&self, event: E) {
        trace!(?event, "publish");
        // No subscribers is normal.
        let _ = self.sender.send(event);
    }

    /// Subscribes to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

/// Which full-board wait a [`GameEvent::WaitingForBoardReady`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyPhase {
    /// Waiting for the start position before a new game.
    Start,
    /// Waiting for the rolled-back position after a take-back.
    TakeBack,
}

/// Observable orchestrator events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameEvent {
    /// Players are created and the turn loop may start.
    NewGameReady {
        /// Monotonic game id.
        game_id: u64,
    },
    /// The physical board matches the wanted full layout.
    BoardReady {
        /// Sensed layout.
        layout: Layout,
    },
    /// The physical board does not match the wanted full layout yet.
    WaitingForBoardReady {
        /// Which wait this is.
        phase: ReadyPhase,
        /// Sensed layout.
        board: Layout,
        /// Wanted layout.
        want: Layout,
    },
    /// A move was accepted and the physical board has to follow.
    WaitingBoardSync {
        /// The accepted move.
        record: MoveRecord,
        /// Logical layout before the move.
        before: Layout,
        /// Logical layout after the move.
        want: Layout,
    },
    /// The physical board caught up with the accepted move.
    BoardSynced {
        /// The synchronized move.
        record: MoveRecord,
    },
    /// The board changed but has been out of sync for a debounce period.
    BoardNotSyncChange {
        /// Sensed layout.
        board: Layout,
        /// Logical layout before the move.
        before: Layout,
    },
    /// A player produced a move the rules engine rejected.
    IllegalMove {
        /// Side that moved.
        color: Color,
        /// Player name.
        player: String,
        /// Rejected input.
        input: MoveInput,
    },
    /// A move finished, or was interrupted while the board synchronized.
    PlayerMoved {
        /// Side that moved.
        color: Color,
        /// Player name.
        player: String,
        /// The move.
        record: MoveRecord,
        /// Board sync was cut short by an interrupt.
        interrupted: bool,
    },
    /// Half-moves rolled back, most recent first.
    TakeBack {
        /// Undone moves.
        moves: Vec<MoveRecord>,
    },
    /// The game is over.
    GameOver {
        /// Final result.
        result: GameResult,
    },
}
