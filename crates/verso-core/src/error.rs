//! Error types for position parsing and move application.

use crate::color::Color;
use crate::square::Square;

/// Errors from parsing a position dump or move notation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PositionError {
    /// The dump does not contain 64 board characters plus a side to move.
    #[error("expected 64 board characters, found {length}")]
    BadLength {
        /// Number of board characters found.
        length: usize,
    },
    /// An unrecognized character appeared in the board section.
    #[error("bad character '{character}' at board index {index}")]
    BadCharacter {
        /// The offending character.
        character: char,
        /// Zero-based index into the 64-character board section.
        index: usize,
    },
    /// The side-to-move character is not a black or white spelling.
    #[error("bad side-to-move character '{character}'")]
    BadSideToMove {
        /// The offending character.
        character: char,
    },
    /// A move string is not two characters `a..h` `1..8`.
    #[error("bad move string \"{found}\"")]
    BadMoveString {
        /// The string that failed to parse.
        found: String,
    },
}

/// Errors from applying moves to a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MoveError {
    /// The move flips no discs for the given side.
    #[error("illegal move {square} for {side}")]
    IllegalMove {
        /// The square that was requested.
        square: Square,
        /// The side that tried to move.
        side: Color,
    },
}

#[cfg(test)]
mod tests {
    use super::{MoveError, PositionError};
    use crate::color::Color;
    use crate::square::Square;

    #[test]
    fn position_error_display() {
        let err = PositionError::BadCharacter { character: '?', index: 3 };
        assert_eq!(format!("{err}"), "bad character '?' at board index 3");
    }

    #[test]
    fn move_error_display() {
        let err = MoveError::IllegalMove {
            square: Square::from_row_col(4, 4),
            side: Color::Black,
        };
        assert_eq!(format!("{err}"), "illegal move d4 for *");
    }
}
