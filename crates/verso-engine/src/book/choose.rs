//! Choosing book moves, forced openings, and exporting book knowledge to
//! the endgame hash table.

use rand::RngCore;

use tracing::debug;

use verso_core::{Cell, Color, Square, generate_all};

use super::node::{DEVIATION, FULL_SOLVED, WLD_SOLVED};
use super::{Book, CandidateMove, CONFIRMED_WIN, DrawMode, GameMode, UNWANTED_DRAW};
use crate::search::tt::{ENDGAME_MODE, ENDGAME_SCORE, EXACT_VALUE, LOWER_BOUND, UPPER_BOUND};
use crate::search::{
    EvalResult, EvalType, Evaluation, INFINITE_EVAL, SearchCore,
};

/// Depth limit of the book-to-hash transfer.
const MAX_FILL_LEVEL: usize = 5;

impl Book {
    /// Collect the book alternatives from the current position into the
    /// candidate list, sorted by decreasing mover-relative score.
    ///
    /// `flags` restricts which solve statuses qualify; 0 accepts any.
    /// Draws that the current draw and game modes label unwanted are
    /// filtered out.
    pub fn fill_move_alternatives(&mut self, core: &mut SearchCore, side: Color, flags: u16) {
        let (val1, val2, orientation) = self.canonical(&core.pos);
        let Some(index) = self.probe_hash(val1, val2) else {
            self.set_candidates(Vec::new());
            return;
        };

        let root_flags = self.node(index).flags;
        if flags != 0 && root_flags & flags == 0 {
            self.set_candidates(Vec::new());
            return;
        }

        let sign = side.sign();
        let disks_played = core.pos.disks_played() as i32;

        let raw_alternative = self.node(index).best_alternative_move;
        let (alternative_move, alternative_score) = if raw_alternative > 0 {
            let mapped = self.symmetry().inverse(orientation, raw_alternative as usize);
            let adjusted =
                self.adjust_score(self.node(index).alternative_score as i32, side, disks_played);
            (Some(mapped), adjusted)
        } else {
            (None, -INFINITE_EVAL)
        };

        let moves = generate_all(&core.pos, side);
        let mut candidates: Vec<CandidateMove> = Vec::new();
        for sq in moves.iter() {
            core.pos.make_move(side, sq, true);
            let child = self.probe_position(&core.pos);
            core.pos.unmake_move(side, sq);

            let (mut child_feasible, mut score, mut deviation) = (false, 0i32, false);
            match child {
                None => {
                    if alternative_move == Some(sq.pos()) && flags == 0 {
                        score = alternative_score;
                        child_feasible = true;
                        deviation = true;
                    }
                }
                Some(child) => {
                    let child_node = self.node(child);
                    if flags == 0 || child_node.flags & flags != 0 {
                        score = if side == Color::Black {
                            child_node.black_minimax_score as i32
                        } else {
                            child_node.white_minimax_score as i32
                        };
                        child_feasible = true;
                    }
                }
            }

            // An unwanted book draw: the current node is unsolved but the
            // child is solved as a draw the modes tell us to avoid.
            if child_feasible && score == 0 && root_flags & WLD_SOLVED == 0 {
                if let Some(child) = child {
                    let child_node = self.node(child);
                    if child_node.is_wld_solved()
                        && (self.game_mode() == GameMode::Private || !child_node.is_private())
                    {
                        let avoided = match side {
                            Color::Black => matches!(
                                self.draw_mode(),
                                DrawMode::WhiteWins | DrawMode::OpponentWins
                            ),
                            Color::White => matches!(
                                self.draw_mode(),
                                DrawMode::BlackWins | DrawMode::OpponentWins
                            ),
                        };
                        if avoided {
                            debug!(square = %sq, "leads to an unwanted book draw");
                            child_feasible = false;
                        }
                    }
                }
            }

            if child_feasible {
                candidates.push(CandidateMove {
                    mv: sq,
                    score: sign * score,
                    flags: if deviation {
                        DEVIATION
                    } else {
                        self.node(child.expect("feasible non-deviation has a child")).flags
                    },
                    parent_flags: root_flags,
                });
            }
        }

        candidates.sort_by(|a, b| b.score.cmp(&a.score));
        self.set_candidates(candidates);
    }

    /// Choose a move among the candidates whose score is within the
    /// remaining slack of the best, weighted toward the better ones, and
    /// fill the PV with the optimal book continuation. Returns `None`
    /// when the book declines to move.
    pub fn get_book_move(
        &mut self,
        core: &mut SearchCore,
        side: Color,
        update_slack: bool,
    ) -> (Option<Square>, Evaluation) {
        // Randomness only applies to moves actually played on the board.
        let mut remaining_slack = if update_slack {
            (self.max_slack() - self.used_slack(side)).max(0)
        } else {
            0
        };

        if self.candidates().is_empty() {
            return (None, Evaluation::undefined());
        }

        let Some(index) = self.probe_position(&core.pos) else {
            return (None, Evaluation::undefined());
        };
        let base_flags = self.node(index).flags;

        // With an endgame score on record, only consult the book if some
        // move realizes that score.
        if self.node(index).is_full_solved() {
            if self.candidates()[0].score < self.node(index).black_minimax_score as i32 {
                return (None, Evaluation::undefined());
            }
        } else if self.node(index).is_wld_solved()
            && self.node(index).black_minimax_score > 0
            && self.candidates()[0].score <= 0
        {
            return (None, Evaluation::undefined());
        }

        // Don't randomize among solved moves.
        let best_score = self.candidates()[0].score;
        if best_score >= CONFIRMED_WIN {
            remaining_slack = 0;
        }

        let mut weights: Vec<i32> = Vec::new();
        let mut total_weight = 0i64;
        for candidate in self.candidates() {
            if candidate.score < best_score - remaining_slack {
                break;
            }
            let weight = 2 * remaining_slack + 1 - (best_score - candidate.score);
            weights.push(weight);
            total_weight += weight as i64;
        }

        let chosen_index = if weights.len() == 1 {
            0
        } else {
            let random_point = ((core.rng.next_u32() >> 10) as i64) % total_weight;
            let mut acc_weight = weights[0] as i64;
            let mut chosen = 0;
            while random_point > acc_weight {
                chosen += 1;
                acc_weight += weights[chosen] as i64;
            }
            chosen
        };

        let chosen = self.candidates()[chosen_index];
        let mut chosen_score = chosen.score;
        if update_slack {
            self.add_used_slack(side, best_score - chosen_score);
        }

        // Convert the book score to the engine's normal form.
        if chosen_score >= CONFIRMED_WIN {
            chosen_score -= CONFIRMED_WIN;
            if chosen_score <= 64 {
                chosen_score *= 128;
            }
        }
        if chosen_score <= -CONFIRMED_WIN {
            chosen_score += CONFIRMED_WIN;
            if chosen_score >= -64 {
                chosen_score *= 128;
            }
        }

        let mut eval = Evaluation::new(
            EvalType::Undefined,
            EvalResult::Unsolved,
            chosen_score,
            0.0,
            0,
            true,
        );
        let flags = chosen.flags;
        if base_flags & (FULL_SOLVED | WLD_SOLVED) != 0 && flags & (FULL_SOLVED | WLD_SOLVED) != 0
        {
            // Both the position and the chosen child are solved.
            eval.kind = if base_flags & FULL_SOLVED != 0 && flags & FULL_SOLVED != 0 {
                EvalType::Exact
            } else {
                EvalType::Wld
            };
            eval.res = if chosen_score > 0 {
                EvalResult::Won
            } else if chosen_score == 0 {
                EvalResult::Drawn
            } else {
                EvalResult::Lost
            };
        } else if flags & WLD_SOLVED != 0 && chosen_score > 0 {
            // The position is unknown but the move leads to a win.
            eval.kind = EvalType::Wld;
            eval.res = EvalResult::Won;
        } else {
            eval.kind = EvalType::Midgame;
        }

        // Fill the PV with the optimal book line from the chosen move.
        let original_side = side;
        let mut line: Vec<(Color, Square)> = Vec::new();
        let mut current_side = side;
        let mut current_move = chosen.mv;
        loop {
            core.pos.make_move(current_side, current_move, true);
            line.push((current_side, current_move));

            let (val1, val2, orientation) = self.canonical(&core.pos);
            let Some(next_index) = self.probe_hash(val1, val2) else {
                break;
            };

            let node = self.node(next_index);
            let raw_alternative = node.best_alternative_move;
            let (alternative_move, alternative_score) = if raw_alternative > 0 {
                let mapped = self.symmetry().inverse(orientation, raw_alternative as usize);
                let adjusted = self.adjust_score(
                    node.alternative_score as i32,
                    current_side,
                    core.pos.disks_played() as i32,
                );
                (Some(mapped), adjusted)
            } else {
                (None, -INFINITE_EVAL)
            };

            let node_side = node.side_to_move();
            let node_sign = node_side.sign();
            current_side = node_side;

            let moves = generate_all(&core.pos, current_side);
            let mut best_score = -INFINITE_EVAL;
            let mut best_move: Option<Square> = None;
            for sq in moves.iter() {
                core.pos.make_move(current_side, sq, true);
                let child = self.probe_position(&core.pos);
                core.pos.unmake_move(current_side, sq);

                let (score, feasible) = match child {
                    None => {
                        if alternative_move == Some(sq.pos()) {
                            (alternative_score, true)
                        } else {
                            (0, false)
                        }
                    }
                    Some(child) => {
                        let child_node = self.node(child);
                        let score = if original_side == Color::Black {
                            child_node.black_minimax_score as i32
                        } else {
                            child_node.white_minimax_score as i32
                        };
                        (score, true)
                    }
                };
                if feasible {
                    let signed = score * node_sign;
                    if signed > best_score {
                        best_score = signed;
                        best_move = Some(sq);
                    }
                }
            }
            match best_move {
                Some(sq) => current_move = sq,
                None => break,
            }
        }

        core.state.pv_depth[0] = line.len();
        for (i, &(_, sq)) in line.iter().enumerate() {
            core.state.pv[0][i] = sq;
        }
        for &(stm, sq) in line.iter().rev() {
            core.pos.unmake_move(stm, sq);
        }

        (Some(chosen.mv), eval)
    }

    /// If the board is a prefix of `opening` under some symmetry, return
    /// the opening's next move mapped onto the actual board.
    pub fn check_forced_opening(
        &self,
        core: &mut SearchCore,
        side: Color,
        opening: &str,
    ) -> Option<Square> {
        let disks_played = core.pos.disks_played();
        let move_count = opening.len() / 2;
        if move_count <= disks_played {
            return None;
        }

        let mut line: Vec<usize> = Vec::with_capacity(move_count);
        for i in 0..move_count {
            let sq: Square = opening[2 * i..2 * i + 2].parse().ok()?;
            line.push(sq.pos());
        }

        // Play through the opening line until the number of discs matches
        // the actual board.
        let mut local: [Cell; 100] = [Cell::Empty; 100];
        local[45] = Cell::Black;
        local[54] = Cell::Black;
        local[44] = Cell::White;
        local[55] = Cell::White;

        let offsets = verso_core::MOVE_OFFSETS;
        let mut local_side = Color::Black;
        for &mv in line.iter().take(disks_played) {
            let own = local_side.cell();
            let opp = local_side.opponent().cell();
            for &offset in &offsets {
                let mut pos = (mv as i32 + offset) as usize;
                while (11..=88).contains(&pos) && local[pos] == opp {
                    pos = (pos as i32 + offset) as usize;
                }
                if (11..=88).contains(&pos) && local[pos] == own {
                    let mut back = (pos as i32 - offset) as usize;
                    while back != mv {
                        local[back] = own;
                        back = (back as i32 - offset) as usize;
                    }
                }
            }
            local[mv] = own;
            local_side = local_side.opponent();
        }

        if local_side != side {
            return None;
        }

        // Check the eight symmetries, starting from a random one so the
        // same symmetry is not preferred every game.
        let mut symmetry = ((core.rng.next_u32() >> 1) % 8) as usize;
        for _ in 0..8 {
            let mut same_position = true;
            'rows: for row in 1..=8usize {
                for col in 1..=8usize {
                    let pos = 10 * row + col;
                    if core.pos.cell(pos) != local[self.symmetry().map(symmetry, pos)] {
                        same_position = false;
                        break 'rows;
                    }
                }
            }
            if same_position {
                let next = self.symmetry().inverse(symmetry, line[disks_played]);
                return Square::from_pos(next);
            }
            symmetry = (symmetry + 1) % 8;
        }

        None
    }

    fn do_fill_endgame_hash(&self, core: &mut SearchCore, cutoff: usize, level: usize) {
        if level >= MAX_FILL_LEVEL {
            return;
        }

        let Some(this_index) = self.probe_position(&core.pos) else {
            return;
        };
        let node = *self.node(this_index);
        let is_full = node.is_full_solved();
        let is_wld = node.is_wld_solved();
        let side = node.side_to_move();

        // Recurse over the children first, then look for a child move
        // consistent with this node's solve status.
        let mut matching_move: Option<Square> = None;
        let moves = generate_all(&core.pos, side);
        for sq in moves.iter() {
            core.pos.refresh_piece_counts();
            core.pos.make_move(side, sq, true);
            if let Some(child_index) = self.probe_position(&core.pos) {
                if core.pos.disks_played() < 60 - cutoff {
                    self.do_fill_endgame_hash(core, cutoff, level + 1);
                }
                let child = self.node(child_index);
                if is_full {
                    if child.is_full_solved()
                        && child.black_minimax_score == node.black_minimax_score
                    {
                        matching_move = Some(sq);
                    }
                } else if is_wld && child.is_solved() {
                    let matches = if side == Color::Black {
                        child.black_minimax_score >= node.black_minimax_score
                    } else {
                        child.black_minimax_score <= node.black_minimax_score
                    };
                    if matches {
                        matching_move = Some(sq);
                    }
                }
            }
            core.pos.unmake_move(side, sq);
        }

        if let Some(mv) = matching_move {
            let mut signed_score = node.black_minimax_score as i32;
            if side == Color::White {
                signed_score = -signed_score;
            }
            if signed_score > CONFIRMED_WIN {
                signed_score -= CONFIRMED_WIN;
            } else if signed_score < -CONFIRMED_WIN {
                signed_score += CONFIRMED_WIN;
            } else if signed_score.abs() == UNWANTED_DRAW {
                signed_score = 0;
            }
            let bound = if is_full {
                EXACT_VALUE
            } else if signed_score >= 0 {
                LOWER_BOUND
            } else {
                UPPER_BOUND
            };
            core.pos.rehash(side);
            core.tt.store(
                core.pos.hash(),
                ENDGAME_MODE,
                signed_score,
                mv.pos() as u8,
                ENDGAME_SCORE | bound,
                (60 - core.pos.disks_played()) as u8,
                0,
            );
        }
    }

    /// Transfer solved book results near the current position into the
    /// transposition table before an endgame search.
    pub fn fill_endgame_hash(&self, core: &mut SearchCore, cutoff: usize) {
        if self.is_empty() {
            return;
        }
        self.do_fill_endgame_hash(core, cutoff, 0);
    }

    /// Follow the line along which both players' book scores equal the
    /// root score, until a solved node or the end of the book.
    pub fn doubly_optimal_line(
        &mut self,
        core: &mut SearchCore,
        original_side: Color,
    ) -> Vec<Square> {
        let mut result = Vec::new();
        if self.is_empty() {
            return result;
        }
        Book::prepare_traversal(core);
        let Some(mut current) = self.probe_position(&core.pos) else {
            return result;
        };
        let root_score = if original_side == Color::Black {
            self.node(current).black_minimax_score
        } else {
            self.node(current).white_minimax_score
        };

        let mut made: Vec<(Color, Square)> = Vec::new();
        while !self.node(current).is_solved() {
            let side = self.node(current).side_to_move();
            let children = self.children(core, side);
            let mut next = None;
            for (sq, child) in children {
                let child_score = if original_side == Color::Black {
                    self.node(child).black_minimax_score
                } else {
                    self.node(child).white_minimax_score
                };
                if child_score == root_score {
                    next = Some((sq, child));
                    break;
                }
            }
            let Some((sq, child)) = next else {
                break;
            };
            core.pos.refresh_piece_counts();
            core.pos.make_move(side, sq, true);
            made.push((side, sq));
            result.push(sq);
            current = child;
        }
        for (stm, sq) in made.into_iter().rev() {
            core.pos.unmake_move(stm, sq);
        }
        result
    }
}
