//! Finding deviation moves, correcting leaves and sweeping the tree.

use std::fs::OpenOptions;
use std::io::Write;

use tracing::{debug, info, warn};

use verso_core::{Color, Square, generate_all};

use super::node::{
    FULL_SOLVED, NO_SCORE, NOT_TRAVERSED, POSITION_EXHAUSTED, WLD_SOLVED,
};
use super::{Book, CONFIRMED_WIN, ROOT, STAGE_WINDOW};
use crate::search::midgame::tree_search;
use crate::search::probcut::MIN_MPC_DEPTH;
use crate::search::{INFINITE_EVAL, SEARCH_ABORT, SearchCore};

/// Flag bits accepted by [`Book::clear_tree`].
pub const CLEAR_MIDGAME: u16 = 1;
pub const CLEAR_WLD: u16 = 2;
pub const CLEAR_EXACT: u16 = 4;

/// Statistics gathered by [`Book::examine_tree`].
#[derive(Debug, Clone)]
pub struct TreeStatistics {
    pub exact_count: [usize; 61],
    pub wld_count: [usize; 61],
    pub exhausted_count: [usize; 61],
    pub common_count: [usize; 61],
    pub leaf_count: usize,
    pub bad_leaf_count: usize,
    pub really_bad_leaf_count: usize,
    pub unreachable_count: usize,
}

impl Book {
    /// Iterative-deepening negascout over the allowed deviation moves.
    /// The best move is floated to the front of `moves`; the returned
    /// score averages the final even and odd ply results to dampen the
    /// odd/even oscillation.
    fn nega_scout(
        &mut self,
        core: &mut SearchCore,
        depth: i32,
        allow_mpc: bool,
        side: Color,
        moves: &mut Vec<Square>,
    ) -> Option<i32> {
        // Changing the drafts before every node keeps stale entries from
        // biasing the averaged result.
        core.tt.clear_drafts();
        core.pos.rehash(side);

        let mut low_score = -INFINITE_EVAL;
        let start_depth = 2 - depth % 2;
        let mut curr_depth = start_depth;
        while curr_depth <= depth {
            low_score = -INFINITE_EVAL;
            let mut curr_alpha = -INFINITE_EVAL;
            let mut best_index = 0;
            for i in 0..moves.len() {
                let sq = moves[i];
                core.pos.make_move(side, sq, true);
                core.pos.refresh_piece_counts();
                let current_score;
                if i == 0 {
                    current_score = -tree_search(
                        core,
                        1,
                        curr_depth,
                        side.opponent(),
                        -INFINITE_EVAL,
                        INFINITE_EVAL,
                        true,
                        allow_mpc,
                        true,
                    );
                    low_score = current_score;
                } else {
                    curr_alpha = curr_alpha.max(low_score);
                    let mut score = -tree_search(
                        core,
                        1,
                        curr_depth,
                        side.opponent(),
                        -(curr_alpha + 1),
                        -curr_alpha,
                        true,
                        allow_mpc,
                        true,
                    );
                    if score.abs() != SEARCH_ABORT.abs() && score > curr_alpha {
                        score = -tree_search(
                            core,
                            1,
                            curr_depth,
                            side.opponent(),
                            -INFINITE_EVAL,
                            INFINITE_EVAL,
                            true,
                            allow_mpc,
                            true,
                        );
                    }
                    current_score = score;
                }
                core.pos.unmake_move(side, sq);
                if current_score.abs() == SEARCH_ABORT.abs() {
                    return None;
                }
                if current_score > low_score || i == 0 {
                    low_score = current_score;
                    best_index = i;
                }
            }

            // Float the best move so far to the top of the list.
            let best_move = moves.remove(best_index);
            moves.insert(0, best_move);
            curr_depth += 2;
        }

        // The score for the best move searched one ply deeper; averaging
        // the two removes most of the odd/even oscillation.
        let best = moves[0];
        core.pos.make_move(side, best, true);
        core.pos.refresh_piece_counts();
        let high_score = -tree_search(
            core,
            1,
            depth + 1,
            side.opponent(),
            -INFINITE_EVAL,
            INFINITE_EVAL,
            true,
            allow_mpc,
            true,
        );
        core.pos.unmake_move(side, best);
        if high_score.abs() == SEARCH_ABORT.abs() {
            return None;
        }

        Some((low_score + high_score) / 2)
    }

    /// Search the moves that leave the book from the node's position and
    /// record the best of them as the node's deviation. Assumes the board
    /// holds the node's position.
    pub(crate) fn evaluate_node(&mut self, core: &mut SearchCore, index: usize) {
        // Don't evaluate nodes that already have been searched deep
        // enough.
        let depth = self.node(index).depth();
        if depth >= self.search_depth && self.node(index).alternative_score != NO_SCORE {
            return;
        }

        if self.node(index).alternative_score != NO_SCORE {
            let alternative = (self.node(index).alternative_score as i32).abs();
            if alternative < self.min_eval_span || alternative > self.max_eval_span {
                return;
            }
            let negamax = (self.node(index).black_minimax_score as i32).abs();
            if negamax < self.min_negamax_span || negamax > self.max_negamax_span {
                return;
            }
        }

        let side = self.node(index).side_to_move();

        core.coeffs.remove(core.pos.disks_played() as i32 - STAGE_WINDOW);
        core.control.clear_panic_abort();
        core.pos.refresh_piece_counts();

        // The moves which haven't been tried from this position.
        let moves = generate_all(&core.pos, side);
        let mut feasible: Vec<Square> = Vec::new();
        for sq in moves.iter() {
            core.pos.make_move(side, sq, true);
            if self.probe_position(&core.pos).is_none() {
                feasible.push(sq);
            }
            core.pos.unmake_move(side, sq);
        }

        if feasible.is_empty() {
            self.exhausted_count += 1;
            let node = self.node_mut(index);
            node.best_alternative_move = POSITION_EXHAUSTED;
            node.alternative_score = NO_SCORE;
        } else {
            let allow_mpc = self.search_depth >= MIN_MPC_DEPTH;
            let search_depth = self.search_depth;
            let Some(best_score) =
                self.nega_scout(core, search_depth, allow_mpc, side, &mut feasible)
            else {
                return;
            };
            let best_move = feasible[0];

            self.evaluated_count += 1;
            let signed_score = if side == Color::Black { best_score } else { -best_score };
            let (_, _, orientation) = self.canonical(&core.pos);
            let canonical_move = self.symmetry().map(orientation, best_move.pos());
            let node = self.node_mut(index);
            node.alternative_score = signed_score as i16;
            node.best_alternative_move = canonical_move as i16;
        }
        let search_depth = self.search_depth;
        let node = self.node_mut(index);
        node.clear_depth();
        node.set_depth(search_depth);
    }

    fn do_evaluate(&mut self, core: &mut SearchCore, index: usize) {
        if self.evaluated_count >= self.max_eval_count {
            return;
        }
        if self.node(index).flags & NOT_TRAVERSED == 0 {
            return;
        }
        let side = self.node(index).side_to_move();

        if !self.node(index).is_solved() {
            self.evaluate_node(core, index);
        }

        let moves = generate_all(&core.pos, side);
        for sq in moves.iter() {
            core.pos.refresh_piece_counts();
            core.pos.make_move(side, sq, true);
            if let Some(child) = self.probe_position(&core.pos) {
                self.do_evaluate(core, child);
            }
            core.pos.unmake_move(side, sq);
        }
        self.node_mut(index).flags ^= NOT_TRAVERSED;
    }

    /// Re-evaluate deviations throughout the tree: nodes with no deviation
    /// yet, nodes searched shallower than the current search depth, and
    /// nodes inside the configured evaluation windows, up to the batch
    /// limit.
    pub fn evaluate_tree(&mut self, core: &mut SearchCore) {
        if self.is_empty() {
            return;
        }
        Book::prepare_traversal(core);
        self.exhausted_count = 0;
        self.evaluated_count = 0;

        let mut feasible_count = 0;
        for node in &mut self.nodes {
            node.flags |= NOT_TRAVERSED;
        }
        for index in 0..self.nodes.len() {
            let node = self.node(index);
            let eligible = node.alternative_score == NO_SCORE
                || (node.depth() < self.search_depth
                    && (node.alternative_score as i32).abs() >= self.min_eval_span
                    && (node.alternative_score as i32).abs() <= self.max_eval_span
                    && (node.black_minimax_score as i32).abs() >= self.min_negamax_span
                    && (node.black_minimax_score as i32).abs() <= self.max_negamax_span);
            if eligible && !node.is_solved() {
                feasible_count += 1;
            }
        }
        self.max_eval_count = feasible_count.min(self.max_batch_size);
        info!(
            depth = self.search_depth,
            feasible = feasible_count,
            batch = self.max_eval_count,
            "evaluating book deviations"
        );
        if feasible_count > 0 {
            self.do_evaluate(core, ROOT);
        }
    }

    fn do_validate(&mut self, core: &mut SearchCore, index: usize) {
        if self.evaluated_count >= self.max_eval_count {
            return;
        }
        if self.node(index).flags & NOT_TRAVERSED == 0 {
            return;
        }
        let side = self.node(index).side_to_move();

        let node = self.node(index);
        if !node.is_solved()
            && node.alternative_score == NO_SCORE
            && node.best_alternative_move != POSITION_EXHAUSTED
        {
            self.evaluate_node(core, index);
        }

        let moves = generate_all(&core.pos, side);
        for sq in moves.iter() {
            core.pos.refresh_piece_counts();
            core.pos.make_move(side, sq, true);
            if let Some(child) = self.probe_position(&core.pos) {
                self.do_validate(core, child);
            }
            core.pos.unmake_move(side, sq);
        }
        self.node_mut(index).flags ^= NOT_TRAVERSED;
    }

    /// Make sure every node is solved, exhausted or carries a deviation.
    /// Returns the number of nodes evaluated.
    pub fn validate_tree(&mut self, core: &mut SearchCore) -> usize {
        if self.is_empty() {
            return 0;
        }
        Book::prepare_traversal(core);
        self.exhausted_count = 0;
        self.evaluated_count = 0;

        let feasible_count = self
            .nodes
            .iter()
            .filter(|node| {
                !node.is_solved()
                    && node.alternative_score == NO_SCORE
                    && node.best_alternative_move != POSITION_EXHAUSTED
            })
            .count();
        self.max_eval_count = feasible_count.min(self.max_batch_size);
        if feasible_count > 0 {
            self.mark_all_not_traversed();
            self.do_validate(core, ROOT);
        }
        self.evaluated_count
    }

    fn do_clear(&mut self, core: &mut SearchCore, index: usize, low: usize, high: usize, flags: u16) {
        if self.node(index).flags & NOT_TRAVERSED == 0 {
            return;
        }
        let disks_played = core.pos.disks_played();
        if disks_played >= low && disks_played <= high {
            let node = self.node_mut(index);
            if flags & CLEAR_MIDGAME != 0 {
                node.clear_depth();
            }
            if node.is_wld_solved() && flags & CLEAR_WLD != 0 {
                node.flags ^= WLD_SOLVED;
            }
            if node.is_full_solved() && flags & CLEAR_EXACT != 0 {
                node.flags ^= FULL_SOLVED;
            }
        }

        if disks_played <= high {
            let side = self.node(index).side_to_move();
            let moves = generate_all(&core.pos, side);
            for sq in moves.iter() {
                core.pos.refresh_piece_counts();
                core.pos.make_move(side, sq, true);
                if let Some(child) = self.probe_position(&core.pos) {
                    self.do_clear(core, child, low, high, flags);
                }
                core.pos.unmake_move(side, sq);
            }
        }
        self.node_mut(index).flags ^= NOT_TRAVERSED;
    }

    /// Clear chosen status labels from all nodes within a disc-count
    /// window.
    pub fn clear_tree(&mut self, core: &mut SearchCore, low: usize, high: usize, flags: u16) {
        if self.is_empty() {
            return;
        }
        Book::prepare_traversal(core);
        self.mark_all_not_traversed();
        self.do_clear(core, ROOT, low, high, flags);
    }

    fn do_correct(
        &mut self,
        core: &mut SearchCore,
        index: usize,
        max_empty: usize,
        full_solve: bool,
        move_hist: &mut String,
    ) {
        if self.evaluated_count >= self.max_eval_count {
            return;
        }
        if self.node(index).flags & NOT_TRAVERSED == 0 {
            return;
        }
        let side = self.node(index).side_to_move();

        // Children first, honouring the force restrictions: for a forced
        // color only optimal-line children are entered.
        let children = self.children(core, side);
        for (sq, child) in children {
            match side {
                Color::Black if self.force_black => {
                    if self.node(child).black_minimax_score
                        != self.node(index).black_minimax_score
                    {
                        continue;
                    }
                }
                Color::White if self.force_white => {
                    if self.node(child).white_minimax_score
                        != self.node(index).white_minimax_score
                    {
                        continue;
                    }
                }
                _ => {}
            }
            move_hist.push_str(&sq.to_string());
            core.pos.refresh_piece_counts();
            core.pos.make_move(side, sq, true);
            self.do_correct(core, child, max_empty, full_solve, move_hist);
            core.pos.unmake_move(side, sq);
            move_hist.truncate(move_hist.len() - 2);
        }

        // Then the node itself.
        if 60 - core.pos.empties() >= 60usize.saturating_sub(max_empty) {
            let node = self.node(index);
            let mut really_evaluate = (full_solve && !node.is_full_solved())
                || (!full_solve && !node.is_solved());
            let alternative = (node.alternative_score as i32).abs();
            if alternative < self.min_eval_span || alternative > self.max_eval_span {
                really_evaluate = false;
            }
            let negamax = (node.black_minimax_score as i32).abs();
            if negamax < self.min_negamax_span || negamax > self.max_negamax_span {
                really_evaluate = false;
            }

            if really_evaluate {
                if let Some(script) = self.correction_script.clone() {
                    // Defer solving to a standalone scripted solver.
                    self.export_script_position(core, side, &script, move_hist);
                } else {
                    core.pos.refresh_piece_counts();
                    let outcome = super::solved_outcome(core, side, !full_solve);
                    let node = self.node_mut(index);
                    let mut stored = outcome;
                    if outcome > 0 {
                        stored += CONFIRMED_WIN;
                    } else if outcome < 0 {
                        stored -= CONFIRMED_WIN;
                    }
                    node.black_minimax_score = stored as i16;
                    node.white_minimax_score = stored as i16;
                    if full_solve {
                        node.flags |= FULL_SOLVED;
                    } else {
                        node.flags |= WLD_SOLVED;
                    }
                }
                self.evaluated_count += 1;
            }
        }

        self.node_mut(index).flags ^= NOT_TRAVERSED;
    }

    fn export_script_position(
        &self,
        core: &SearchCore,
        side: Color,
        script: &str,
        move_hist: &str,
    ) {
        let Ok(mut file) = OpenOptions::new().create(true).append(true).open(script) else {
            warn!(script, "cannot append to correction script");
            return;
        };
        let (val1, val2, _) = self.canonical(&core.pos);
        let _ = writeln!(file, "% {move_hist}");
        let _ = writeln!(file, "% {val1} {val2}");
        let _ = writeln!(file, "{}", core.pos.to_dump(side).replace('*', "X"));
        let _ = writeln!(file, "%");
    }

    /// Endgame-correct all leaves within `max_empty` empties, children
    /// before parents. With a correction script configured the positions
    /// are written out for an external solver instead.
    pub fn correct_tree(&mut self, core: &mut SearchCore, max_empty: usize, full_solve: bool) {
        if self.is_empty() {
            return;
        }
        Book::prepare_traversal(core);
        self.exhausted_count = 0;
        self.evaluated_count = 0;
        self.mark_all_not_traversed();

        let feasible_count = self
            .nodes
            .iter()
            .filter(|node| {
                (node.depth() as usize) < max_empty
                    && (node.alternative_score as i32).abs() >= self.min_eval_span
                    && (node.alternative_score as i32).abs() <= self.max_eval_span
                    && (node.black_minimax_score as i32).abs() >= self.min_negamax_span
                    && (node.black_minimax_score as i32).abs() <= self.max_negamax_span
            })
            .count();
        self.max_eval_count = feasible_count.min(self.max_batch_size);
        info!(
            max_empty,
            full_solve,
            batch = self.max_eval_count,
            "endgame-correcting book leaves"
        );

        let mut move_hist = String::new();
        self.do_correct(core, ROOT, max_empty, full_solve, &mut move_hist);
        debug!(corrected = self.evaluated_count, "correction pass finished");
    }

    fn do_export(
        &mut self,
        core: &mut SearchCore,
        index: usize,
        stream: &mut dyn Write,
        move_vec: &mut Vec<Square>,
    ) -> std::io::Result<()> {
        let allow_branch = self.node(index).flags & NOT_TRAVERSED != 0;
        let side = self.node(index).side_to_move();

        let moves = generate_all(&core.pos, side);
        let mut child_count = 0;
        for sq in moves.iter() {
            move_vec.push(sq);
            core.pos.refresh_piece_counts();
            core.pos.make_move(side, sq, true);
            if let Some(child) = self.probe_position(&core.pos) {
                self.do_export(core, child, stream, move_vec)?;
                child_count += 1;
            }
            core.pos.unmake_move(side, sq);
            move_vec.pop();

            if child_count == 1 && !allow_branch {
                break;
            }
        }

        if child_count == 0 {
            // A leaf in the opening tree: emit the path from the root.
            let mut line = String::new();
            for sq in move_vec.iter() {
                line.push_str(&sq.to_string());
            }
            writeln!(stream, "{line}")?;
        }

        self.node_mut(index).flags &= !NOT_TRAVERSED;
        Ok(())
    }

    /// Write a set of move lines covering the tree: one line per leaf,
    /// branching only at nodes not yet covered by an earlier line.
    pub fn export_tree(&mut self, core: &mut SearchCore, stream: &mut dyn Write) -> std::io::Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        Book::prepare_traversal(core);
        self.mark_all_not_traversed();
        let mut move_vec = Vec::new();
        self.do_export(core, ROOT, stream, &mut move_vec)
    }

    fn do_examine(&mut self, core: &mut SearchCore, index: usize, stats: &mut TreeStatistics) {
        if self.node(index).flags & NOT_TRAVERSED == 0 {
            return;
        }
        let disks_played = core.pos.disks_played();
        {
            let node = self.node(index);
            if node.is_full_solved() {
                stats.exact_count[disks_played] += 1;
            } else if node.is_wld_solved() {
                stats.wld_count[disks_played] += 1;
            } else if node.best_alternative_move == POSITION_EXHAUSTED {
                stats.exhausted_count[disks_played] += 1;
            } else {
                stats.common_count[disks_played] += 1;
            }
        }

        let side = self.node(index).side_to_move();
        let children = self.children(core, side);

        if children.is_empty() {
            stats.leaf_count += 1;
            if !self.node(index).is_full_solved() {
                stats.bad_leaf_count += 1;
            }
            if !self.node(index).is_wld_solved() {
                stats.really_bad_leaf_count += 1;
            }
        } else {
            for (sq, child) in children {
                match side {
                    Color::Black if self.force_black => {
                        if self.node(child).black_minimax_score
                            != self.node(index).black_minimax_score
                        {
                            continue;
                        }
                    }
                    Color::White if self.force_white => {
                        if self.node(child).white_minimax_score
                            != self.node(index).white_minimax_score
                        {
                            continue;
                        }
                    }
                    _ => {}
                }
                core.pos.refresh_piece_counts();
                core.pos.make_move(side, sq, true);
                self.do_examine(core, child, stats);
                core.pos.unmake_move(side, sq);
            }
        }
        self.node_mut(index).flags ^= NOT_TRAVERSED;
    }

    /// Gather per-stage solve statistics and leaf quality counts.
    pub fn examine_tree(&mut self, core: &mut SearchCore) -> TreeStatistics {
        let mut stats = TreeStatistics {
            exact_count: [0; 61],
            wld_count: [0; 61],
            exhausted_count: [0; 61],
            common_count: [0; 61],
            leaf_count: 0,
            bad_leaf_count: 0,
            really_bad_leaf_count: 0,
            unreachable_count: 0,
        };
        if self.is_empty() {
            return stats;
        }
        Book::prepare_traversal(core);
        self.mark_all_not_traversed();
        self.do_examine(core, ROOT, &mut stats);

        for node in &mut self.nodes {
            if node.flags & NOT_TRAVERSED != 0 {
                stats.unreachable_count += 1;
                node.flags ^= NOT_TRAVERSED;
            }
        }
        stats
    }
}
