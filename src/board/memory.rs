//! In-memory sensor board for simulation and tests.

use super::{BoardEvent, PhysicalBoard};
use crate::events::EventBus;
use crate::layout::Layout;
use crate::types::{Color, PieceMove, Promotion, Square};
use parking_lot::Mutex;
use strum::IntoEnumIterator;
use tokio::sync::broadcast;
use tracing::{debug, instrument};

const BOARD_EVENT_CAPACITY: usize = 256;

/// A layout committed by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// Side whose move was synchronized.
    pub color: Color,
    /// Expected layout of that side.
    pub layout: Layout,
    /// Squares confirmed vacated.
    pub cleared: Vec<Square>,
}

#[derive(Debug)]
struct BoardState {
    current: Layout,
    baseline: Layout,
    commits: Vec<Commit>,
}

/// Sensor board held in memory.
///
/// `place_layout`, `move_piece` and `remove_piece` stand in for pieces being
/// handled on a real board.
#[derive(Debug)]
pub struct MemoryBoard {
    state: Mutex<BoardState>,
    events: EventBus<BoardEvent>,
}

impl MemoryBoard {
    /// Creates a board currently sensing `layout`.
    pub fn new(layout: Layout) -> Self {
        Self {
            state: Mutex::new(BoardState {
                baseline: layout.clone(),
                current: layout,
                commits: Vec::new(),
            }),
            events: EventBus::new(BOARD_EVENT_CAPACITY),
        }
    }

    /// Creates a board with the standard starting layout on it.
    pub fn start() -> Self {
        Self::new(Layout::start())
    }

    /// Replaces the whole sensed layout.
    #[instrument(skip(self))]
    pub fn place_layout(&self, layout: Layout) {
        self.state.lock().current = layout;
        self.events.publish(BoardEvent::Changed);
    }

    /// Moves the piece on `from` to `to`, capturing whatever stood there.
    ///
    /// Returns `None` when `from` is empty.
    #[instrument(skip(self), fields(from = %from, to = %to))]
    pub fn move_piece(&self, from: Square, to: Square) -> Option<PieceMove> {
        let piece_move = {
            let mut state = self.state.lock();
            let piece = state.current.piece_at(from)?;
            state.current.set(from, None);
            state.current.set(to, Some(piece));
            PieceMove {
                color: piece_color(piece),
                from,
                to,
                promotion: None,
            }
        };
        self.events.publish(BoardEvent::Changed);
        self.events.publish(BoardEvent::PieceMoved(piece_move));
        Some(piece_move)
    }

    /// Lifts the piece off `square`.
    pub fn remove_piece(&self, square: Square) {
        self.state.lock().current.set(square, None);
        self.events.publish(BoardEvent::Changed);
    }

    /// Every layout committed so far.
    pub fn commits(&self) -> Vec<Commit> {
        self.state.lock().commits.clone()
    }

    /// Layout move detection compares against.
    pub fn baseline(&self) -> Layout {
        self.state.lock().baseline.clone()
    }
}

impl Default for MemoryBoard {
    fn default() -> Self {
        Self::start()
    }
}

impl PhysicalBoard for MemoryBoard {
    fn reset(&self) {
        let mut state = self.state.lock();
        state.baseline = state.current.clone();
    }

    fn reset_to(&self, layout: &Layout) {
        self.state.lock().baseline = layout.clone();
    }

    /// Only `color`'s cells of the baseline move, so an opponent's early
    /// move stays detectable.
    fn commit(&self, color: Color, layout: &Layout, cleared: &[Square]) {
        let mut state = self.state.lock();
        for square in Square::all() {
            let owned = state
                .baseline
                .piece_at(square)
                .is_some_and(|piece| color.owns(piece));
            let want = layout.piece_at(square);
            if owned || want.is_some() {
                state.baseline.set(square, want);
            }
        }
        for &square in cleared {
            state.baseline.set(square, None);
        }
        state.commits.push(Commit {
            color,
            layout: layout.clone(),
            cleared: cleared.to_vec(),
        });
        debug!(%color, commits = state.commits.len(), "layout committed");
    }

    fn layout(&self) -> Layout {
        self.state.lock().current.clone()
    }

    fn emit_changed(&self) {
        self.events.publish(BoardEvent::Changed);
    }

    fn subscribe(&self) -> broadcast::Receiver<BoardEvent> {
        self.events.subscribe()
    }

    #[instrument(skip(self))]
    fn detect_moves(&self) {
        let detected: Vec<PieceMove> = {
            let state = self.state.lock();
            Color::iter()
                .filter_map(|color| net_move(&state.baseline, &state.current, color))
                .collect()
        };
        debug!(count = detected.len(), "detected moves");
        for piece_move in detected {
            self.events.publish(BoardEvent::PieceMoved(piece_move));
        }
    }
}

fn piece_color(piece: char) -> Color {
    if Color::White.owns(piece) {
        Color::White
    } else {
        Color::Black
    }
}

/// Net movement of `color`'s pieces between two layouts.
///
/// For castling the king is reported.
fn net_move(before: &Layout, after: &Layout, color: Color) -> Option<PieceMove> {
    let before = before.for_color(color);
    let after = after.for_color(color);

    let lifted: Vec<Square> = Square::all()
        .filter(|&sq| before.piece_at(sq).is_some() && before.piece_at(sq) != after.piece_at(sq))
        .collect();
    let placed: Vec<Square> = Square::all()
        .filter(|&sq| after.piece_at(sq).is_some() && before.piece_at(sq) != after.piece_at(sq))
        .collect();

    let is_king = |layout: &Layout, sq: Square| {
        layout.piece_at(sq).is_some_and(|p| p.eq_ignore_ascii_case(&'k'))
    };

    let from = lifted
        .iter()
        .find(|sq| is_king(&before, **sq))
        .or_else(|| lifted.first())
        .copied()?;
    let piece = before.piece_at(from)?;

    let to = placed
        .iter()
        .find(|sq| after.piece_at(**sq) == Some(piece))
        .or_else(|| placed.first())
        .copied()?;

    let promotion = after
        .piece_at(to)
        .filter(|&landed| landed != piece && piece.eq_ignore_ascii_case(&'p'))
        .and_then(Promotion::from_letter);

    Some(PieceMove {
        color,
        from,
        to,
        promotion,
    })
}
