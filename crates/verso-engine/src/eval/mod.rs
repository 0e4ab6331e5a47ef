//! Pattern-based static evaluation.

mod coeffs;
mod evaluate;

pub use coeffs::{Coeffs, EVAL_MAGIC1, EVAL_MAGIC2};
pub use evaluate::{MIDGAME_WIN, pattern_evaluation, terminal_evaluation};
