//! Game learning: fold finished games into the opening book.

use tracing::info;

use verso_core::{Color, Square, generate_all};

use crate::error::BookError;
use crate::game::Engine;

/// Records the moves of the game in progress and feeds them to the book
/// when the game is over.
pub struct Learner {
    game_move: [Option<Square>; 61],
    learn_depth: i32,
    cutoff_empty: usize,
}

impl Learner {
    pub fn new() -> Learner {
        Learner { game_move: [None; 61], learn_depth: 0, cutoff_empty: 0 }
    }

    /// Forget all stored moves.
    pub fn clear_stored_game(&mut self) {
        self.game_move = [None; 61];
    }

    /// Record that `mv` was played after `disks_played` placements.
    pub fn store_move(&mut self, disks_played: usize, mv: Square) {
        self.game_move[disks_played] = Some(mv);
    }

    /// Deviations are searched to `depth`; the game is treated as over at
    /// `cutoff` empties.
    pub fn set_learning_parameters(&mut self, depth: i32, cutoff: usize) {
        self.learn_depth = depth;
        self.cutoff_empty = cutoff;
    }

    /// Can the current game be learned? All moves up to the cutoff must
    /// be on record, and the game must be finished or long enough.
    pub fn game_learnable(&self, finished: bool, move_count: usize) -> bool {
        let needed = move_count.min(60 - self.cutoff_empty.min(60));
        let moves_available = self.game_move[..needed].iter().all(Option::is_some);
        moves_available && (finished || move_count >= 60 - self.cutoff_empty.min(60))
    }

    /// Replay the stored game on the engine, derive the side-to-move
    /// signs, and add it to the book, saving the database afterwards when
    /// a path is given.
    pub fn learn_game(
        &mut self,
        engine: &mut Engine,
        game_length: usize,
        private_game: bool,
        full_solve_cutoff: usize,
        wld_solve_cutoff: usize,
        save_path: Option<(&str, bool)>,
    ) -> Result<(), BookError> {
        engine.core.control.toggle_abort_check(false);
        engine.core.control.clear_panic_abort();

        // Determine the side to move for every stored position.
        let mut signed_moves: Vec<i16> = Vec::with_capacity(game_length);
        engine.core.pos.reset();
        let mut side = Color::Black;
        for i in 0..game_length {
            let Some(sq) = self.game_move[i] else {
                return Err(BookError::InvalidMove { move_string: format!("move {i} missing") });
            };
            if generate_all(&engine.core.pos, side).is_empty() {
                side = side.opponent();
            }
            engine.core.pos.refresh_piece_counts();
            engine.core.pos.apply(side, sq, true)?;
            let raw = sq.pos() as i16;
            signed_moves.push(if side == Color::Black { raw } else { -raw });
            side = side.opponent();
        }

        engine.book.set_search_depth(self.learn_depth);
        engine.book.add_new_game(
            &mut engine.core,
            &signed_moves,
            self.cutoff_empty,
            full_solve_cutoff,
            wld_solve_cutoff,
            true,
            private_game,
        )?;
        info!(moves = game_length, private = private_game, "learned game");

        if let Some((path, binary)) = save_path {
            if binary {
                engine.book.write_binary_database(path)?;
            } else {
                engine.book.write_text_database(path)?;
            }
        }

        engine.core.control.toggle_abort_check(true);
        Ok(())
    }
}

impl Default for Learner {
    fn default() -> Learner {
        Learner::new()
    }
}

#[cfg(test)]
mod tests {
    use super::Learner;
    use verso_core::Square;

    #[test]
    fn learnable_requires_all_moves() {
        let mut learner = Learner::new();
        learner.set_learning_parameters(2, 58);
        // 60 - 58 = 2 moves needed.
        assert!(!learner.game_learnable(true, 2));
        learner.store_move(0, "d3".parse::<Square>().unwrap());
        learner.store_move(1, "c5".parse::<Square>().unwrap());
        assert!(learner.game_learnable(true, 2));
        // Unfinished games qualify once long enough.
        assert!(learner.game_learnable(false, 2));
        learner.clear_stored_game();
        assert!(!learner.game_learnable(true, 2));
    }
}
