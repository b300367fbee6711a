//! Physical sensor board interface.

mod memory;

pub use memory::{Commit, MemoryBoard};

use crate::layout::Layout;
use crate::types::{Color, PieceMove, Square};
use tokio::sync::broadcast;

/// Notification raised by a physical board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardEvent {
    /// The sensed layout changed, or a re-evaluation was forced.
    Changed,
    /// A piece of `color` was moved on the board.
    PieceMoved(PieceMove),
}

/// A sensor board whose layout changes out of band.
///
/// The orchestrator only reads the layout, commits expected layouts and
/// subscribes to notifications; it never places pieces itself. Dropping the
/// receiver returned by [`subscribe`](Self::subscribe) unsubscribes.
pub trait PhysicalBoard: Send + Sync {
    /// Forgets pending piece movement; the current layout becomes the baseline.
    fn reset(&self);

    /// Makes `layout` the baseline for move detection.
    fn reset_to(&self, layout: &Layout);

    /// Records the layout expected for `color` after a synchronized move.
    ///
    /// `cleared` lists squares confirmed vacated (the en passant capture).
    fn commit(&self, color: Color, layout: &Layout, cleared: &[Square]);

    /// Current sensed layout.
    fn layout(&self) -> Layout;

    /// Sensed layout restricted to `color`'s pieces.
    fn layout_by_color(&self, color: Color) -> Layout {
        self.layout().for_color(color)
    }

    /// Sensed piece on `square`.
    fn piece_at(&self, square: Square) -> Option<char> {
        self.layout().piece_at(square)
    }

    /// Re-emits [`BoardEvent::Changed`] without a layout change.
    fn emit_changed(&self);

    /// Subscribes to board notifications.
    fn subscribe(&self) -> broadcast::Receiver<BoardEvent>;

    /// Publishes [`BoardEvent::PieceMoved`] for movement since the baseline.
    fn detect_moves(&self);
}
