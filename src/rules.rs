//! Rules engine contract and its shakmaty-backed implementation.

use crate::layout::Layout;
use crate::types::{Color, MoveFlags, MoveRecord, MoveRequest, Promotion, Square};
use derive_more::{Display, Error};
use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::uci::Uci;
use shakmaty::{CastlingMode, CastlingSide, Chess, EnPassantMode, Move, Position, Role};
use tracing::{debug, instrument, warn};

/// Errors reported by the rules engine.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum RulesError {
    /// Position text could not be loaded.
    #[display("invalid FEN '{fen}': {reason}")]
    InvalidFen {
        /// Offending FEN.
        fen: String,
        /// Parser message.
        reason: String,
    },
    /// A scripted move could not be played.
    #[display("cannot play '{token}' in the current position")]
    InvalidMove {
        /// Offending token.
        token: String,
    },
}

/// Logical game state: legality, position updates, serialization and
/// end-of-game detection.
///
/// Only the orchestrator mutates a rules engine, once per accepted move or
/// undo.
pub trait RulesEngine: Send {
    /// Returns to the standard starting position and clears the history.
    fn reset(&mut self);

    /// Loads a FEN position and clears the history.
    fn load(&mut self, fen: &str) -> Result<(), RulesError>;

    /// Plays `request` if legal for the side to move.
    fn apply(&mut self, request: &MoveRequest) -> Option<MoveRecord>;

    /// Plays a move given in UCI or SAN notation.
    fn apply_notation(&mut self, notation: &str) -> Option<MoveRecord>;

    /// Undoes the last move, returning it.
    fn undo(&mut self) -> Option<MoveRecord>;

    /// Most recent move, if any.
    fn last_move(&self) -> Option<&MoveRecord>;

    /// Number of moves that can be undone.
    fn history_len(&self) -> usize;

    /// Side to move.
    fn turn(&self) -> Color;

    /// FEN serialization of the position.
    fn fen(&self) -> String;

    /// Piece placement in scan order.
    fn layout(&self) -> Layout;

    /// Text diagram of the position.
    fn ascii(&self) -> String {
        self.layout().ascii().join("\n")
    }

    /// Fifty-move rule or insufficient material.
    fn is_draw(&self) -> bool;

    /// Side to move has no legal move and is not in check.
    fn is_stalemate(&self) -> bool;

    /// Current position occurred at least three times.
    fn is_threefold_repetition(&self) -> bool;

    /// Side to move is checkmated.
    fn is_checkmate(&self) -> bool;
}

/// Replays a whitespace separated list of moves (SAN or UCI) and
/// `undo_N` directives.
///
/// Returns the number of tokens applied.
#[instrument(skip(engine))]
pub fn replay_moves(engine: &mut dyn RulesEngine, moves: &str) -> Result<usize, RulesError> {
    let mut applied = 0;
    for token in moves.split_whitespace() {
        if let Some(count) = token.strip_prefix("undo_") {
            let count: usize = count.parse().map_err(|_| RulesError::InvalidMove {
                token: token.to_string(),
            })?;
            for _ in 0..count {
                if engine.undo().is_none() {
                    warn!(token, "undo past the start of the game");
                    break;
                }
            }
        } else if engine.apply_notation(token).is_none() {
            return Err(RulesError::InvalidMove {
                token: token.to_string(),
            });
        }
        applied += 1;
    }
    debug!(applied, "replayed moves");
    Ok(applied)
}

#[derive(Debug, Clone)]
struct Played {
    before: Chess,
    record: MoveRecord,
}

/// [`RulesEngine`] on top of shakmaty.
///
/// Undo is a stack of prior positions; repetition is counted over that stack.
#[derive(Debug, Clone, Default)]
pub struct ShakmatyRules {
    position: Chess,
    history: Vec<Played>,
}

impl ShakmatyRules {
    /// Creates an engine at the standard starting position.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine from a FEN position.
    pub fn from_fen(fen: &str) -> Result<Self, RulesError> {
        let mut rules = Self::new();
        rules.load(fen)?;
        Ok(rules)
    }

    /// Current shakmaty position.
    pub fn position(&self) -> &Chess {
        &self.position
    }

    fn play(&mut self, m: &Move) -> Option<MoveRecord> {
        if !self.position.is_legal(m) {
            return None;
        }
        let (from, to, promotion) = match Uci::from_move(m, CastlingMode::Standard) {
            Uci::Normal {
                from,
                to,
                promotion,
            } => (from_shakmaty(from), from_shakmaty(to), promotion),
            _ => return None,
        };
        let from = from?;
        let to = to?;

        let flags = MoveFlags {
            capture: m.is_capture(),
            en_passant: m.is_en_passant(),
            kingside_castle: m.castling_side() == Some(CastlingSide::KingSide),
            queenside_castle: m.castling_side() == Some(CastlingSide::QueenSide),
            promotion: promotion.is_some(),
            big_pawn: m.role() == Role::Pawn && from.rank().abs_diff(to.rank()) == 2,
        };
        let san = shakmaty::san::San::from_move(&self.position, m).to_string();
        let record = MoveRecord::new(
            self.position.turn().into(),
            from,
            to,
            promotion.and_then(promotion_from_role),
            flags,
            Some(san),
        );

        let before = self.position.clone();
        self.position.play_unchecked(m);
        self.history.push(Played {
            before,
            record: record.clone(),
        });
        Some(record)
    }

    fn to_legal_move(&self, request: &MoveRequest, promotion: Option<Role>) -> Option<Move> {
        let uci = Uci::Normal {
            from: to_shakmaty(request.from),
            to: to_shakmaty(request.to),
            promotion,
        };
        uci.to_move(&self.position).ok()
    }
}

impl RulesEngine for ShakmatyRules {
    fn reset(&mut self) {
        self.position = Chess::default();
        self.history.clear();
    }

    fn load(&mut self, fen: &str) -> Result<(), RulesError> {
        let invalid = |reason: String| RulesError::InvalidFen {
            fen: fen.to_string(),
            reason,
        };
        let parsed: Fen = fen.parse().map_err(|e| invalid(format!("{e}")))?;
        self.position = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|e| invalid(format!("{e}")))?;
        self.history.clear();
        Ok(())
    }

    #[instrument(skip(self))]
    fn apply(&mut self, request: &MoveRequest) -> Option<MoveRecord> {
        let requested = request.promotion.map(role_from_promotion);
        let m = self.to_legal_move(request, requested).or_else(|| {
            // A sensed pawn arriving on the last rank carries no piece choice.
            match requested {
                None => self.to_legal_move(request, Some(Role::Queen)),
                Some(_) => None,
            }
        })?;
        self.play(&m)
    }

    fn apply_notation(&mut self, notation: &str) -> Option<MoveRecord> {
        if let Ok(request) = notation.parse::<MoveRequest>()
            && let Some(record) = self.apply(&request)
        {
            return Some(record);
        }
        let san: SanPlus = notation.parse().ok()?;
        let m = san.san.to_move(&self.position).ok()?;
        self.play(&m)
    }

    fn undo(&mut self) -> Option<MoveRecord> {
        let played = self.history.pop()?;
        self.position = played.before;
        Some(played.record)
    }

    fn last_move(&self) -> Option<&MoveRecord> {
        self.history.last().map(|played| &played.record)
    }

    fn history_len(&self) -> usize {
        self.history.len()
    }

    fn turn(&self) -> Color {
        self.position.turn().into()
    }

    fn fen(&self) -> String {
        Fen::from_position(self.position.clone(), EnPassantMode::Legal).to_string()
    }

    fn layout(&self) -> Layout {
        let board = self.position.board();
        let mut layout = Layout::empty();
        for square in Square::all() {
            let piece = board.piece_at(to_shakmaty(square)).map(|p| p.char());
            layout.set(square, piece);
        }
        layout
    }

    fn is_draw(&self) -> bool {
        self.position.halfmoves() >= 100 || self.position.is_insufficient_material()
    }

    fn is_stalemate(&self) -> bool {
        self.position.is_stalemate()
    }

    fn is_threefold_repetition(&self) -> bool {
        let current = repetition_key(&self.position);
        let earlier = self
            .history
            .iter()
            .filter(|played| repetition_key(&played.before) == current)
            .count();
        earlier + 1 >= 3
    }

    fn is_checkmate(&self) -> bool {
        self.position.is_checkmate()
    }
}

/// FEN without the move counters.
fn repetition_key(position: &Chess) -> String {
    let fen = Fen::from_position(position.clone(), EnPassantMode::Legal).to_string();
    fen.split_whitespace().take(4).collect::<Vec<_>>().join(" ")
}

fn to_shakmaty(square: Square) -> shakmaty::Square {
    let index = u32::from(square.rank()) * 8 + u32::from(square.file());
    shakmaty::Square::new(index)
}

fn from_shakmaty(square: shakmaty::Square) -> Option<Square> {
    let index = square as u8;
    Square::from_coords(index % 8, index / 8)
}

fn role_from_promotion(promotion: Promotion) -> Role {
    match promotion {
        Promotion::Queen => Role::Queen,
        Promotion::Rook => Role::Rook,
        Promotion::Bishop => Role::Bishop,
        Promotion::Knight => Role::Knight,
    }
}

fn promotion_from_role(role: Role) -> Option<Promotion> {
    match role {
        Role::Queen => Some(Promotion::Queen),
        Role::Rook => Some(Promotion::Rook),
        Role::Bishop => Some(Promotion::Bishop),
        Role::Knight => Some(Promotion::Knight),
        _ => None,
    }
}

impl From<shakmaty::Color> for Color {
    fn from(c: shakmaty::Color) -> Self {
        match c {
            shakmaty::Color::White => Self::White,
            shakmaty::Color::Black => Self::Black,
        }
    }
}

impl From<Color> for shakmaty::Color {
    fn from(c: Color) -> Self {
        match c {
            Color::White => Self::White,
            Color::Black => Self::Black,
        }
    }
}
