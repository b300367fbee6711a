//! 64-cell piece layouts shared by the rules engine and the physical board.

use crate::types::{Color, Square};
use derive_more::{Display, Error};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Marker for an empty cell.
pub const EMPTY: char = '.';

const PIECES: &str = "pnbrqkPNBRQK";

/// Layout of the standard starting position.
pub const START_LAYOUT: &str =
    "rnbqkbnrpppppppp................................PPPPPPPPRNBQKBNR";

/// FEN of the standard starting position.
pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Returns `true` for a white piece letter.
pub fn is_white(cell: char) -> bool {
    Color::White.owns(cell) && PIECES.contains(cell)
}

/// Returns `true` for a black piece letter.
pub fn is_black(cell: char) -> bool {
    Color::Black.owns(cell) && PIECES.contains(cell)
}

/// Returns `true` for the empty marker.
pub fn is_empty(cell: char) -> bool {
    cell == EMPTY
}

/// Error building a layout from text.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum LayoutError {
    /// Layout text is not 64 cells long.
    #[display("layout must have 64 cells, got {found}")]
    Length {
        /// Cells found.
        found: usize,
    },
    /// Unknown cell character.
    #[display("invalid cell '{cell}' at index {index}")]
    Cell {
        /// Offending character.
        cell: char,
        /// Scan-order index.
        index: usize,
    },
}

/// Piece placement in scan order (a8 first, h1 last).
///
/// Each cell is either [`EMPTY`] or a FEN piece letter (upper case white,
/// lower case black). The textual form is the 64 cells concatenated.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Layout {
    cells: [char; 64],
}

impl Layout {
    /// A board with no pieces.
    pub fn empty() -> Self {
        Self {
            cells: [EMPTY; 64],
        }
    }

    /// The standard starting layout.
    pub fn start() -> Self {
        let mut cells = [EMPTY; 64];
        for (cell, piece) in cells.iter_mut().zip(START_LAYOUT.chars()) {
            *cell = piece;
        }
        Self { cells }
    }

    /// Builds a layout from a FEN string (only the placement field is read).
    pub fn from_fen(fen: &str) -> Result<Self, LayoutError> {
        let placement = fen.split_whitespace().next().unwrap_or_default();
        let mut cells = [EMPTY; 64];
        let mut index = 0usize;

        for c in placement.chars() {
            if index >= 64 {
                break;
            }
            match c {
                '/' => {}
                '1'..='8' => {
                    let run = c as usize - '0' as usize;
                    index = (index + run).min(64);
                }
                piece if PIECES.contains(piece) => {
                    cells[index] = piece;
                    index += 1;
                }
                other => return Err(LayoutError::Cell { cell: other, index }),
            }
        }

        if index != 64 {
            return Err(LayoutError::Length { found: index });
        }
        Ok(Self { cells })
    }

    /// FEN placement field for this layout.
    pub fn to_fen_placement(&self) -> String {
        let mut fen = String::new();
        for (row_index, row) in self.cells.chunks(8).enumerate() {
            let mut run = 0;
            for &cell in row {
                if cell == EMPTY {
                    run += 1;
                } else {
                    if run > 0 {
                        fen.push_str(&run.to_string());
                        run = 0;
                    }
                    fen.push(cell);
                }
            }
            if run > 0 {
                fen.push_str(&run.to_string());
            }
            if row_index < 7 {
                fen.push('/');
            }
        }
        fen
    }

    /// Piece letter on `square`, `None` when empty.
    pub fn piece_at(&self, square: Square) -> Option<char> {
        let cell = self.cells[square.index()];
        (cell != EMPTY).then_some(cell)
    }

    /// Returns `true` if `square` holds no piece.
    pub fn is_empty_at(&self, square: Square) -> bool {
        self.cells[square.index()] == EMPTY
    }

    /// Places `piece` on `square`, or clears it with `None`.
    pub fn set(&mut self, square: Square, piece: Option<char>) {
        self.cells[square.index()] = piece.unwrap_or(EMPTY);
    }

    /// Projection keeping only `color`'s pieces; every other cell is empty.
    pub fn for_color(&self, color: Color) -> Layout {
        let mut cells = [EMPTY; 64];
        for (out, &cell) in cells.iter_mut().zip(self.cells.iter()) {
            if color.owns(cell) {
                *out = cell;
            }
        }
        Layout { cells }
    }

    /// Squares whose contents differ between `self` and `other`.
    pub fn diff(&self, other: &Layout) -> Vec<Square> {
        Square::all()
            .filter(|sq| self.cells[sq.index()] != other.cells[sq.index()])
            .collect()
    }

    /// Text diagram, one entry per line, rank 8 at the top.
    pub fn ascii(&self) -> Vec<String> {
        render(self, |_, cell| format!(" {cell} "))
    }
}

/// Diagram guiding the operator from `before` to `after`.
///
/// Cells that must receive a piece show it as `[p]`, cells that must be
/// cleared show the piece to lift as `(p)`.
pub fn visual_diff(before: &Layout, after: &Layout) -> String {
    render(after, |square, cell| {
        let was = before.cells[square.index()];
        if was == cell {
            format!(" {cell} ")
        } else if cell != EMPTY {
            format!("[{cell}]")
        } else {
            format!("({was})")
        }
    })
    .join("\n")
}

fn render(layout: &Layout, mut cell: impl FnMut(Square, char) -> String) -> Vec<String> {
    let border = format!("   +{}+", "-".repeat(24));
    let mut out = vec![border.clone()];
    for row in 0..8u8 {
        let mut line = format!(" {} |", 8 - row);
        for file in 0..8u8 {
            let index = row * 8 + file;
            if let Some(square) = Square::new(index) {
                line.push_str(&cell(square, layout.cells[index as usize]));
            }
        }
        line.push('|');
        out.push(line);
    }
    out.push(border);
    out.push("     a  b  c  d  e  f  g  h".to_string());
    out
}

impl Default for Layout {
    fn default() -> Self {
        Self::empty()
    }
}

impl FromStr for Layout {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let count = s.chars().count();
        if count != 64 {
            return Err(LayoutError::Length { found: count });
        }
        let mut cells = [EMPTY; 64];
        for (index, (out, c)) in cells.iter_mut().zip(s.chars()).enumerate() {
            if c != EMPTY && !PIECES.contains(c) {
                return Err(LayoutError::Cell { cell: c, index });
            }
            *out = c;
        }
        Ok(Self { cells })
    }
}

impl TryFrom<String> for Layout {
    type Error = LayoutError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Layout> for String {
    fn from(layout: Layout) -> Self {
        layout.to_string()
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for cell in self.cells {
            write!(f, "{cell}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Layout({self})")
    }
}
