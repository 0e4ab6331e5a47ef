//! Search, evaluation and the opening book for verso.

pub mod book;
mod error;
pub mod eval;
mod game;
mod learn;
pub mod search;

pub use book::{Book, CandidateMove, DrawMode, GameMode};
pub use error::{BookError, CoeffError};
pub use eval::{Coeffs, pattern_evaluation, terminal_evaluation};
pub use game::{Engine, EvaluatedMove, OpeningOracle};
pub use learn::Learner;
pub use search::{EvalResult, EvalType, Evaluation, PvStep, SEARCH_ABORT};
