//! Waiting for the physical board to agree with the logical position.

use super::{ChessGame, ReadyOutcome, SyncOutcome};
use crate::board::{BoardEvent, PhysicalBoard};
use crate::error::GameError;
use crate::events::{GameEvent, ReadyPhase};
use crate::layout::{Layout, visual_diff};
use crate::types::{Color, MoveRecord, PendingState, Square};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Agreement test for a synchronized move.
///
/// The board's `color` pieces must match `want` exactly, and the square of a
/// pawn captured en passant must be empty. The opponent's pieces are not
/// compared.
pub fn in_agreement(
    board: &dyn PhysicalBoard,
    color: Color,
    want: &Layout,
    captured: Option<Square>,
) -> bool {
    board.layout_by_color(color) == *want
        && captured.is_none_or(|square| board.piece_at(square).is_none())
}

/// Waits for the next layout change, skipping per-move notifications.
async fn next_change(changes: &mut broadcast::Receiver<BoardEvent>) -> Result<(), GameError> {
    loop {
        match changes.recv().await {
            Ok(BoardEvent::Changed) => return Ok(()),
            Ok(BoardEvent::PieceMoved(_)) => {}
            // Missed notifications only mean the predicate is re-checked late.
            Err(RecvError::Lagged(_)) => return Ok(()),
            Err(RecvError::Closed) => return Err(GameError::BoardClosed),
        }
    }
}

impl ChessGame {
    /// Waits until the whole sensed layout equals `want`.
    ///
    /// Every change that still differs publishes
    /// [`GameEvent::WaitingForBoardReady`] and logs a guide of the pieces to
    /// move. Take-back requests are not serviced while this wait is
    /// pending; a reset is.
    #[instrument(skip(self, want))]
    pub async fn wait_for_board_ready(
        &self,
        want: &Layout,
        phase: ReadyPhase,
    ) -> Result<ReadyOutcome, GameError> {
        let board = self.board();
        let mut changes = board.subscribe();

        loop {
            if let Some(kind) = self.check_interrupt() {
                debug!(%kind, "board ready wait interrupted");
                return Ok(ReadyOutcome::Interrupted(kind));
            }

            let sensed = board.layout();
            if sensed == *want {
                info!("board ready");
                self.set_pending(PendingState::Idle);
                self.shared
                    .events
                    .publish(GameEvent::BoardReady { layout: sensed });
                return Ok(ReadyOutcome::Ready);
            }

            info!(?phase, "waiting for board ready\n{}", visual_diff(&sensed, want));
            self.set_pending(PendingState::WaitBoardReady);
            self.shared.events.publish(GameEvent::WaitingForBoardReady {
                phase,
                board: sensed,
                want: want.clone(),
            });

            next_change(&mut changes).await?;
        }
    }

    /// Waits until the physical board reflects `record`, then commits the
    /// mover's layout.
    ///
    /// `before` is the logical layout before the move. While the board
    /// changes without agreeing, a [`GameEvent::BoardNotSyncChange`] is
    /// published once it has been still for the debounce period; the wait
    /// itself only ends on agreement or interrupt.
    #[instrument(skip(self, record, before), fields(color = %record.color(), mv = %record.uci()))]
    pub async fn sync_board(
        &self,
        record: &MoveRecord,
        before: &Layout,
    ) -> Result<SyncOutcome, GameError> {
        let color = record.color();
        let board = self.board();
        let logical = self.game_layout();
        let want = logical.for_color(color);
        let captured = record.en_passant_square();
        let cleared: Vec<Square> = captured.into_iter().collect();
        debug!(fen = %self.fen(), "syncing board");

        let mut changes = board.subscribe();
        let commit = || {
            board.commit(color, &want, &cleared);
            self.shared.events.publish(GameEvent::BoardSynced {
                record: record.clone(),
            });
        };

        if in_agreement(board.as_ref(), color, &want, captured) {
            commit();
            return Ok(SyncOutcome::Synced);
        }

        let debounce = self.settings().sync_debounce()
            + if record.flags().is_castle() {
                self.settings().castle_grace()
            } else {
                Duration::ZERO
            };

        let guide = visual_diff(before, &logical);
        self.set_pending(PendingState::WaitBoardSync);
        self.shared.events.publish(GameEvent::WaitingBoardSync {
            record: record.clone(),
            before: before.clone(),
            want: logical.clone(),
        });
        info!(
            san = record.san().unwrap_or_default(),
            from = %record.from(),
            to = %record.to(),
            "waiting for correct board update\n{}",
            guide
        );

        if self.check_interrupt().is_some() {
            return Ok(SyncOutcome::Interrupted);
        }

        let stall = tokio::time::sleep(debounce);
        tokio::pin!(stall);
        let mut stall_armed = false;
        let mut reminders = 0u32;

        loop {
            tokio::select! {
                changed = next_change(&mut changes) => changed?,
                () = &mut stall, if stall_armed => {
                    stall_armed = false;
                    let sensed = board.layout();
                    if sensed != *before {
                        reminders += 1;
                        warn!(reminders, ?debounce, "board change not sync\n{}", guide);
                        self.shared.events.publish(GameEvent::BoardNotSyncChange {
                            board: sensed,
                            before: before.clone(),
                        });
                    }
                    continue;
                }
            }

            if self.check_interrupt().is_some() {
                info!("wait board sync interrupted");
                return Ok(SyncOutcome::Interrupted);
            }

            if in_agreement(board.as_ref(), color, &want, captured) {
                self.set_pending(PendingState::Idle);
                commit();
                info!("board synced");
                return Ok(SyncOutcome::Synced);
            }

            stall.as_mut().reset(Instant::now() + debounce);
            stall_armed = true;
        }
    }
}
