//! Core domain types shared by the orchestrator, the players and the board.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use strum::{Display, EnumIter};

/// Side of the board.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Color {
    /// White (moves first).
    White,
    /// Black.
    Black,
}

impl Color {
    /// Returns the other side.
    pub fn opponent(self) -> Self {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// Returns `true` if `piece` is a FEN letter belonging to this side.
    pub fn owns(self, piece: char) -> bool {
        match self {
            Color::White => piece.is_ascii_uppercase(),
            Color::Black => piece.is_ascii_lowercase(),
        }
    }
}

/// A square indexed in board scan order: 0 = a8, 7 = h8, 56 = a1, 63 = h1.
///
/// This is the order the physical board reports cells in and the order of
/// every [`Layout`](crate::Layout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Square(u8);

impl Square {
    /// Creates a square from a scan-order index (0-63).
    pub const fn new(index: u8) -> Option<Self> {
        if index < 64 { Some(Self(index)) } else { None }
    }

    /// Creates a square from a file (0 = a) and a rank (0 = rank 1).
    pub const fn from_coords(file: u8, rank: u8) -> Option<Self> {
        if file < 8 && rank < 8 {
            Some(Self((7 - rank) * 8 + file))
        } else {
            None
        }
    }

    /// Scan-order index.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// File, 0 = a.
    pub const fn file(self) -> u8 {
        self.0 % 8
    }

    /// Rank, 0 = rank 1.
    pub const fn rank(self) -> u8 {
        7 - self.0 / 8
    }

    /// Returns the square `delta` cells away in scan order, if on the board.
    pub fn offset(self, delta: i8) -> Option<Self> {
        let index = i16::from(self.0) + i16::from(delta);
        u8::try_from(index).ok().and_then(Self::new)
    }

    /// Iterates all 64 squares in scan order.
    pub fn all() -> impl Iterator<Item = Square> {
        (0..64u8).map(Square)
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = (b'a' + self.file()) as char;
        let rank = (b'1' + self.rank()) as char;
        write!(f, "{file}{rank}")
    }
}

impl FromStr for Square {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return Err("square must be 2 characters");
        }
        if !(b'a'..=b'h').contains(&bytes[0]) {
            return Err("file must be a-h");
        }
        if !(b'1'..=b'8').contains(&bytes[1]) {
            return Err("rank must be 1-8");
        }
        Self::from_coords(bytes[0] - b'a', bytes[1] - b'1').ok_or("invalid square")
    }
}

/// Piece a pawn promotes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Promotion {
    /// Queen.
    Queen,
    /// Rook.
    Rook,
    /// Bishop.
    Bishop,
    /// Knight.
    Knight,
}

impl Promotion {
    /// Lowercase UCI letter.
    pub fn letter(self) -> char {
        match self {
            Promotion::Queen => 'q',
            Promotion::Rook => 'r',
            Promotion::Bishop => 'b',
            Promotion::Knight => 'n',
        }
    }

    /// Parses a UCI/FEN promotion letter (either case).
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_lowercase() {
            'q' => Some(Promotion::Queen),
            'r' => Some(Promotion::Rook),
            'b' => Some(Promotion::Bishop),
            'n' => Some(Promotion::Knight),
            _ => None,
        }
    }
}

/// Special-move markers reported by the rules engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoveFlags {
    /// A piece was captured (including en passant).
    pub capture: bool,
    /// En passant capture.
    pub en_passant: bool,
    /// King side castling.
    pub kingside_castle: bool,
    /// Queen side castling.
    pub queenside_castle: bool,
    /// Pawn promotion.
    pub promotion: bool,
    /// Pawn advanced two squares.
    pub big_pawn: bool,
}

impl MoveFlags {
    /// Returns `true` for either castling move.
    pub fn is_castle(&self) -> bool {
        self.kingside_castle || self.queenside_castle
    }
}

/// A move accepted by the rules engine.
///
/// Records are immutable once produced; the orchestrator only attaches the
/// en passant capture square before handing the record to the sync protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    color: Color,
    from: Square,
    to: Square,
    promotion: Option<Promotion>,
    flags: MoveFlags,
    san: Option<String>,
    en_passant_square: Option<Square>,
}

impl MoveRecord {
    /// Creates a record for a move of `color` from `from` to `to`.
    pub fn new(
        color: Color,
        from: Square,
        to: Square,
        promotion: Option<Promotion>,
        flags: MoveFlags,
        san: Option<String>,
    ) -> Self {
        Self {
            color,
            from,
            to,
            promotion,
            flags,
            san,
            en_passant_square: None,
        }
    }

    /// Returns the record with the square of the pawn captured en passant.
    pub fn with_en_passant_capture(mut self, captured: Square) -> Self {
        self.en_passant_square = Some(captured);
        self
    }

    /// Side that moved.
    pub fn color(&self) -> Color {
        self.color
    }

    /// Origin square (the king's square for castling).
    pub fn from(&self) -> Square {
        self.from
    }

    /// Destination square (the king's destination for castling).
    pub fn to(&self) -> Square {
        self.to
    }

    /// Promotion piece, if any.
    pub fn promotion(&self) -> Option<Promotion> {
        self.promotion
    }

    /// Special-move flags.
    pub fn flags(&self) -> MoveFlags {
        self.flags
    }

    /// Standard algebraic notation, when the rules engine provides it.
    pub fn san(&self) -> Option<&str> {
        self.san.as_deref()
    }

    /// Square of the pawn captured en passant.
    pub fn en_passant_square(&self) -> Option<Square> {
        self.en_passant_square
    }

    /// UCI long algebraic form, e.g. `e7e8q`.
    pub fn uci(&self) -> String {
        let mut uci = format!("{}{}", self.from, self.to);
        if let Some(promotion) = self.promotion {
            uci.push(promotion.letter());
        }
        uci
    }

    /// Returns `true` if `from -> to` moves the same piece straight back.
    pub fn is_reversed_by(&self, from: Square, to: Square) -> bool {
        self.from == to && self.to == from
    }
}

/// A move request in coordinates, before legality checking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoveRequest {
    /// Origin square.
    pub from: Square,
    /// Destination square.
    pub to: Square,
    /// Requested promotion piece.
    pub promotion: Option<Promotion>,
}

impl FromStr for MoveRequest {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.is_ascii() || s.len() < 4 || s.len() > 5 {
            return Err("UCI move must be 4-5 characters");
        }
        let from = s[0..2].parse()?;
        let to = s[2..4].parse()?;
        let promotion = match s[4..].chars().next() {
            Some(letter) => {
                Some(Promotion::from_letter(letter).ok_or("promotion must be q, r, b, or n")?)
            }
            None => None,
        };
        Ok(Self {
            from,
            to,
            promotion,
        })
    }
}

/// Move input produced by a player, resolved once at the orchestrator boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveInput {
    /// Long algebraic text from a move-generation agent (`e2e4`, `a7a8q`).
    Uci(String),
    /// Squares sensed on the physical board.
    Squares {
        /// Origin square.
        from: Square,
        /// Destination square.
        to: Square,
        /// Promotion piece, when the board reports one.
        promotion: Option<Promotion>,
    },
}

impl MoveInput {
    /// Resolves the input into a coordinate request.
    ///
    /// Returns `None` for malformed agent text; the orchestrator treats that
    /// the same as an illegal move.
    pub fn resolve(&self) -> Option<MoveRequest> {
        match self {
            MoveInput::Uci(text) => text.trim().parse().ok(),
            MoveInput::Squares {
                from,
                to,
                promotion,
            } => Some(MoveRequest {
                from: *from,
                to: *to,
                promotion: *promotion,
            }),
        }
    }
}

impl From<PieceMove> for MoveInput {
    fn from(piece_move: PieceMove) -> Self {
        MoveInput::Squares {
            from: piece_move.from,
            to: piece_move.to,
            promotion: piece_move.promotion,
        }
    }
}

/// A piece movement sensed on the physical board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PieceMove {
    /// Color of the moved piece.
    pub color: Color,
    /// Square the piece was lifted from.
    pub from: Square,
    /// Square the piece was placed on.
    pub to: Square,
    /// Promotion piece, if the board can tell.
    pub promotion: Option<Promotion>,
}

/// How a finished game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
pub enum GameResult {
    /// Fifty-move rule or insufficient material.
    #[display("draw")]
    Draw,
    /// Side to move has no legal move and is not in check.
    #[display("stalemate")]
    Stalemate,
    /// Same position occurred three times.
    #[display("threefold repetition")]
    ThreefoldRepetition,
    /// Side to move is mated.
    #[display("checkmate ({winner} wins)")]
    Checkmate {
        /// The side that delivered mate.
        winner: Color,
    },
}

/// Kind of interrupt raised against a running game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum InterruptKind {
    /// Roll back the most recent half-moves.
    TakeBack,
    /// Abandon the game.
    Reset,
}

/// What the orchestrator is currently blocked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PendingState {
    /// Nothing pending.
    Idle,
    /// Waiting for the whole physical layout to match (new game, take-back).
    WaitBoardReady,
    /// Waiting for the mover's pieces to match after a move.
    WaitBoardSync,
    /// Waiting for the player of this color to produce a move.
    WaitPlayer(Color),
}
