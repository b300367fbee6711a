//! Single-slot cooperative cancellation.

use crate::types::InterruptKind;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::debug;

#[derive(Debug, Default)]
enum SlotState {
    #[default]
    Idle,
    Armed {
        kind: InterruptKind,
        completion: oneshot::Sender<()>,
    },
    Delivered(InterruptKind),
}

/// Result of polling the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observed {
    /// First observation; the raiser's completion has just been signalled.
    Fresh(InterruptKind),
    /// Already delivered earlier, still set until cleared.
    Seen(InterruptKind),
}

impl Observed {
    /// The interrupt kind.
    pub fn kind(self) -> InterruptKind {
        match self {
            Observed::Fresh(kind) | Observed::Seen(kind) => kind,
        }
    }
}

/// Holds at most one outstanding interrupt and its completion handle.
#[derive(Debug, Default)]
pub struct InterruptSlot {
    state: Mutex<SlotState>,
}

impl InterruptSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `kind` and returns the completion the raiser awaits.
    ///
    /// Returns `None` while another interrupt occupies the slot.
    pub fn arm(&self, kind: InterruptKind) -> Option<oneshot::Receiver<()>> {
        let mut state = self.state.lock();
        if !matches!(*state, SlotState::Idle) {
            debug!(%kind, "interrupt slot occupied");
            return None;
        }
        let (completion, done) = oneshot::channel();
        *state = SlotState::Armed { kind, completion };
        Some(done)
    }

    /// Reports the current interrupt; the first call after [`arm`](Self::arm)
    /// signals the completion.
    ///
    /// The raiser wakes on its own next poll, not inside this call.
    pub fn check(&self) -> Option<Observed> {
        let mut state = self.state.lock();
        match std::mem::take(&mut *state) {
            SlotState::Idle => None,
            SlotState::Delivered(kind) => {
                *state = SlotState::Delivered(kind);
                Some(Observed::Seen(kind))
            }
            SlotState::Armed { kind, completion } => {
                *state = SlotState::Delivered(kind);
                // Raiser may have given up waiting.
                let _ = completion.send(());
                Some(Observed::Fresh(kind))
            }
        }
    }

    /// Kind currently held, without delivering it.
    pub fn peek(&self) -> Option<InterruptKind> {
        match &*self.state.lock() {
            SlotState::Idle => None,
            SlotState::Armed { kind, .. } | SlotState::Delivered(kind) => Some(*kind),
        }
    }

    /// Empties the slot. An undelivered completion is dropped, which also
    /// releases its raiser.
    pub fn clear(&self) {
        *self.state.lock() = SlotState::Idle;
    }
}
