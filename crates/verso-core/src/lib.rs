//! Core Othello types: the bordered board, move generation, line patterns
//! and the incremental position key.

mod board;
mod color;
mod error;
mod hash;
mod movegen;
mod patterns;
mod square;

pub use board::{MAX_PLIES, Position, PrettyPosition};
pub use color::{Cell, Color};
pub use error::{MoveError, PositionError};
pub use hash::{HashMasks, HashPair};
pub use movegen::{
    MOVE_ORDER_SIZE, MoveList, MoveOrder, SQUARE_PRIORITY, count_all, game_in_progress,
    generate_all, generate_all_with,
};
pub use patterns::{FLIP8, LinePatterns, POW3, line_patterns};
pub use square::{BOARD_CELLS, DIR_MASK, MOVE_OFFSETS, Square};
