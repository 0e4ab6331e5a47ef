//! Adding games and externally solved positions to the book.

use std::fs::File;
use std::io::{BufRead, BufReader};

use tracing::{debug, info, warn};

use verso_core::{Color, Square, generate_all};

use super::node::{
    BLACK_TO_MOVE, FULL_SOLVED, NO_MOVE, NO_SCORE, NOT_TRAVERSED, PRIVATE_NODE, WHITE_TO_MOVE,
    WLD_SOLVED,
};
use super::{Book, CONFIRMED_WIN, solved_outcome};
use crate::error::BookError;
use crate::search::SearchCore;

impl Book {
    /// Add one game to the tree.
    ///
    /// `game` holds the moves as raw board positions, positive for Black
    /// and negative for White. The game is replayed from the start,
    /// creating a node per new canonical position down to `min_empties`;
    /// the final position's true outcome is recorded (solving it if the
    /// game was cut off). With `update_path` the path is then walked back
    /// to the root: each node is endgame-corrected if within the solve
    /// cutoffs, or re-evaluated for its deviation move, and minimaxed.
    #[allow(clippy::too_many_arguments)]
    pub fn add_new_game(
        &mut self,
        core: &mut SearchCore,
        game: &[i16],
        min_empties: usize,
        max_full_solve: usize,
        max_wld_solve: usize,
        update_path: bool,
        private_game: bool,
    ) -> Result<(), BookError> {
        let move_count = game.len();
        let mut flags = vec![0u16; move_count + 1];
        for (i, &mv) in game.iter().enumerate() {
            flags[i] = if mv > 0 { BLACK_TO_MOVE } else { WHITE_TO_MOVE };
        }

        // First create new nodes for new positions.
        Book::prepare_traversal(core);
        let last_move_number = move_count.min(60 - min_empties.min(60));
        let mut first_new_node = 61usize;
        let mut visited: Vec<usize> = Vec::with_capacity(last_move_number + 1);
        let mut side = Color::Black;

        for i in 0..=last_move_number {
            let (val1, val2, _) = self.canonical(&core.pos);
            let this_node = match self.probe_hash(val1, val2) {
                None => {
                    let index = self.create_node(val1, val2, flags[i]);
                    if private_game {
                        self.node_mut(index).flags |= PRIVATE_NODE;
                    }
                    if i < first_new_node {
                        first_new_node = i;
                    }
                    index
                }
                Some(index) => index,
            };
            visited.push(this_node);

            if i < last_move_number {
                side = if game[i] > 0 { Color::Black } else { Color::White };
                let raw = game[i].unsigned_abs() as usize;
                let sq = Square::from_pos(raw).ok_or(BookError::InvalidMove {
                    move_string: raw.to_string(),
                })?;
                core.pos.refresh_piece_counts();
                core.pos.apply(side, sq, true)?;
            } else {
                // No more moves to make, only update the player to move.
                side = side.opponent();
            }
        }

        // Determine the outcome of the final position.
        let outcome = if last_move_number == move_count {
            let black_count = core.pos.disc_count(Color::Black);
            let white_count = core.pos.disc_count(Color::White);
            if black_count > white_count {
                64 - 2 * white_count
            } else if white_count > black_count {
                2 * black_count - 64
            } else {
                0
            }
        } else {
            debug!(empties = core.pos.empties(), "full solving the cutoff position");
            core.pos.rehash(side);
            solved_outcome(core, side, false)
        };
        {
            let last = *visited.last().expect("at least the root was visited");
            let node = self.node_mut(last);
            let mut stored = outcome;
            if outcome > 0 {
                stored += CONFIRMED_WIN;
            } else if outcome < 0 {
                stored -= CONFIRMED_WIN;
            }
            node.black_minimax_score = stored as i16;
            node.white_minimax_score = stored as i16;
            node.flags |= FULL_SOLVED;
        }

        // Take another pass through the midgame to update move
        // alternatives and minimax information if requested.
        if update_path {
            Book::prepare_traversal(core);
            for &mv in game.iter().take(last_move_number) {
                let side = if mv > 0 { Color::Black } else { Color::White };
                let sq = Square::from_pos(mv.unsigned_abs() as usize)
                    .ok_or(BookError::InvalidMove { move_string: mv.to_string() })?;
                core.pos.refresh_piece_counts();
                core.pos.apply(side, sq, true)?;
            }

            for i in (0..last_move_number).rev() {
                let mover = if game[i] > 0 { Color::Black } else { Color::White };
                let sq = Square::from_pos(game[i].unsigned_abs() as usize)
                    .expect("validated on the way down");
                core.pos.unmake_move(mover, sq);

                let this_node = visited[i];

                // A public game washes the private flag off every node it
                // passes through.
                if !private_game && self.node(this_node).is_private() {
                    self.node_mut(this_node).flags ^= PRIVATE_NODE;
                }

                let node_side = self.node(this_node).side_to_move();
                core.pos.rehash(node_side);
                core.pos.refresh_piece_counts();
                let disks_played = core.pos.disks_played();

                if disks_played >= 60 - max_full_solve.min(60) {
                    if !self.node(this_node).is_full_solved() {
                        let outcome = solved_outcome(core, node_side, false);
                        self.store_solved(this_node, outcome, FULL_SOLVED);
                    }
                } else if disks_played >= 60 - max_wld_solve.min(60) {
                    if !self.node(this_node).is_wld_solved() {
                        let outcome = solved_outcome(core, node_side, true);
                        self.store_solved(this_node, outcome, WLD_SOLVED);
                    }
                } else {
                    let force_eval = i + 1 >= first_new_node
                        || self.node(this_node).best_alternative_move
                            == game[i].unsigned_abs() as i16;
                    if force_eval {
                        self.node_mut(this_node).clear_depth();
                    }
                    self.evaluate_node(core, this_node);
                }

                self.node_mut(this_node).flags |= NOT_TRAVERSED;
                let _ = self.do_minimax(core, this_node);

                let node = self.node(this_node);
                if !node.is_wld_solved()
                    && node.best_alternative_move == NO_MOVE
                    && node.alternative_score == NO_SCORE
                {
                    // Minimax discovered that the node's deviation has
                    // been played into the book; find a new one.
                    self.evaluate_node(core, this_node);
                    let _ = self.do_minimax(core, this_node);
                }
            }
        }

        self.bump_game_count();
        Ok(())
    }

    fn store_solved(&mut self, index: usize, outcome: i32, solve_flag: u16) {
        let node = self.node_mut(index);
        let mut stored = outcome;
        if outcome > 0 {
            stored += CONFIRMED_WIN;
        } else if outcome < 0 {
            stored -= CONFIRMED_WIN;
        }
        node.black_minimax_score = stored as i16;
        node.white_minimax_score = stored as i16;
        node.flags |= solve_flag;
    }

    /// Import a game collection. Each line holds a move string of signed
    /// moves (`+c4-e3...`) followed by the recorded disc differential;
    /// games with a differential beyond `max_diff` are skipped.
    pub fn build_tree(
        &mut self,
        core: &mut SearchCore,
        path: &str,
        max_game_count: usize,
        max_diff: i32,
        min_empties: usize,
    ) -> Result<usize, BookError> {
        let file = File::open(path).map_err(|source| BookError::InvalidFile {
            path: path.to_string(),
            source,
        })?;
        let reader = BufReader::new(file);

        let mut games_parsed = 0;
        let mut games_imported = 0;
        for line in reader.lines() {
            if games_parsed >= max_game_count {
                break;
            }
            let line = line.map_err(|source| BookError::InvalidFile {
                path: path.to_string(),
                source,
            })?;
            let mut tokens = line.split_whitespace();
            let Some(move_string) = tokens.next() else {
                continue;
            };
            let diff: i32 = tokens
                .next()
                .and_then(|token| token.parse().ok())
                .ok_or_else(|| BookError::FormatError {
                    path: path.to_string(),
                    reason: format!("missing disc differential on line {}", games_parsed + 1),
                })?;
            games_parsed += 1;

            let bytes = move_string.as_bytes();
            let move_count = move_string.len() / 3;
            let mut game = Vec::with_capacity(move_count);
            for i in 0..move_count {
                let sign = bytes[3 * i] as char;
                let col = (bytes[3 * i + 1].to_ascii_lowercase() - b'a' + 1) as i16;
                let row = (bytes[3 * i + 2] - b'0') as i16;
                let mut mv = 10 * row + col;
                if sign == '-' {
                    mv = -mv;
                }
                game.push(mv);
            }

            if diff.abs() <= max_diff {
                self.add_new_game(core, &game, min_empties, 0, 0, false, false)?;
                games_imported += 1;
            }
        }

        info!(path, games_parsed, games_imported, "imported game list");
        Ok(games_imported)
    }

    /// Fold the results produced by an external endgame solver back into
    /// the book. `script_path` is the position dump written by
    /// [`correct_tree`](Book::correct_tree) in script mode and
    /// `result_path` the solver's output; the files must agree line for
    /// line outside the position records.
    pub fn merge_position_list(
        &mut self,
        core: &mut SearchCore,
        script_path: &str,
        result_path: &str,
    ) -> Result<usize, BookError> {
        let read_lines = |path: &str| -> Result<Vec<String>, BookError> {
            let file = File::open(path).map_err(|source| BookError::InvalidFile {
                path: path.to_string(),
                source,
            })?;
            BufReader::new(file)
                .lines()
                .map(|line| {
                    line.map(|l| l.trim_end().to_string()).map_err(|source| {
                        BookError::InvalidFile { path: path.to_string(), source }
                    })
                })
                .collect()
        };

        let script_lines = read_lines(script_path)?;
        let result_lines = read_lines(result_path)?;
        if script_lines.len() != result_lines.len() {
            warn!(script_path, result_path, "files differ in length");
        }

        Book::prepare_traversal(core);

        let mut position_count = 0;
        let mut already_wld_count = 0;
        let mut already_exact_count = 0;
        let mut new_nodes_created = 0;

        for (line_index, (script, result)) in
            script_lines.iter().zip(result_lines.iter()).enumerate()
        {
            let line = line_index + 1;
            if line % 4 != 3 {
                if script != result {
                    return Err(BookError::FormatError {
                        path: result_path.to_string(),
                        reason: format!("files differ unexpectedly on line {line}"),
                    });
                }
                continue;
            }

            // A position record paired with its solver result.
            position_count += 1;
            let side = core.pos.set_from_dump(script).map_err(|err| {
                BookError::FormatError {
                    path: script_path.to_string(),
                    reason: format!("line {line}: {err}"),
                }
            })?;

            // Parse the result: "Black win", "White win", "Draw" for WLD
            // solves, or "B - W" for exact scores, each optionally
            // followed by the principal move.
            let tokens: Vec<&str> = result.split_whitespace().collect();
            let (score, wld_only, move_token): (i32, bool, Option<&str>) =
                if result.starts_with("Black win") {
                    (CONFIRMED_WIN + 2, true, tokens.get(2).copied())
                } else if result.starts_with("White win") {
                    (-(CONFIRMED_WIN + 2), true, tokens.get(2).copied())
                } else if result.starts_with("Draw") {
                    (0, true, tokens.get(1).copied())
                } else {
                    let parse = |token: Option<&&str>| -> Option<i32> {
                        token.and_then(|t| t.parse().ok())
                    };
                    let black = parse(tokens.first()).ok_or_else(|| BookError::FormatError {
                        path: result_path.to_string(),
                        reason: format!("unparsable result on line {line}"),
                    })?;
                    let white = parse(tokens.get(2)).ok_or_else(|| BookError::FormatError {
                        path: result_path.to_string(),
                        reason: format!("unparsable result on line {line}"),
                    })?;
                    let mut score = black - white;
                    if score > 0 {
                        score += CONFIRMED_WIN;
                    } else if score < 0 {
                        score -= CONFIRMED_WIN;
                    }
                    (score, false, tokens.get(3).copied())
                };

            let index = self
                .probe_position(&core.pos)
                .ok_or(BookError::PositionNotFound { line })?;

            let mut probable_error = false;
            if self.node(index).is_wld_solved() {
                already_wld_count += 1;
                let old = self.node(index).black_minimax_score as i32;
                if (score > 0 && old <= 0) || (score == 0 && old != 0) || (score < 0 && old > 0)
                {
                    probable_error = true;
                    warn!(line, score, old, "new WLD score conflicts with old score");
                }
            }
            if self.node(index).is_full_solved() {
                already_exact_count += 1;
                let old = self.node(index).black_minimax_score as i32;
                if !wld_only && score != old {
                    probable_error = true;
                    warn!(line, score, old, "new exact score conflicts with old score");
                }
            }

            if probable_error || !wld_only || !self.node(index).is_full_solved() {
                let node = self.node_mut(index);
                node.black_minimax_score = score as i16;
                node.white_minimax_score = score as i16;
            }
            {
                let node = self.node_mut(index);
                if probable_error {
                    node.flags &= !(WLD_SOLVED | FULL_SOLVED);
                }
                if wld_only {
                    node.flags |= WLD_SOLVED;
                } else {
                    node.flags |= WLD_SOLVED | FULL_SOLVED;
                }
            }

            // Examine the position arising from the principal move: it is
            // sanity-checked when present, created otherwise.
            if let Some(move_str) = move_token {
                let sq: Square = move_str.parse().map_err(|_| BookError::InvalidMove {
                    move_string: move_str.to_string(),
                })?;
                if core.pos.make_move_no_hash(side, sq) == 0 {
                    return Err(BookError::InvalidMove { move_string: move_str.to_string() });
                }

                let mut new_side = side.opponent();
                if generate_all(&core.pos, new_side).is_empty() {
                    new_side = side;
                }

                let (val1, val2, _) = self.canonical(&core.pos);
                match self.probe_hash(val1, val2) {
                    None => {
                        let child = self.create_node(val1, val2, PRIVATE_NODE);
                        let stm_flag = if new_side == Color::Black {
                            BLACK_TO_MOVE
                        } else {
                            WHITE_TO_MOVE
                        };
                        let node = self.node_mut(child);
                        node.black_minimax_score = score as i16;
                        node.white_minimax_score = score as i16;
                        node.flags |= stm_flag;
                        node.flags |=
                            if wld_only { WLD_SOLVED } else { WLD_SOLVED | FULL_SOLVED };
                        new_nodes_created += 1;
                    }
                    Some(child) => {
                        let mut child_error = false;
                        let old = self.node(child).black_minimax_score as i32;
                        if self.node(child).is_wld_solved()
                            && ((score > 0 && old <= 0)
                                || (score == 0 && old != 0)
                                || (score < 0 && old > 0))
                        {
                            child_error = true;
                            warn!(line, score, old, "child WLD score conflict");
                        }
                        if self.node(child).is_full_solved() && !wld_only && score != old {
                            child_error = true;
                            warn!(line, score, old, "child exact score conflict");
                        }
                        if child_error {
                            let node = self.node_mut(child);
                            node.black_minimax_score = score as i16;
                            node.white_minimax_score = score as i16;
                            node.flags &= !(WLD_SOLVED | FULL_SOLVED);
                            node.flags |=
                                if wld_only { WLD_SOLVED } else { WLD_SOLVED | FULL_SOLVED };
                        }
                    }
                }
                core.pos.unmake_move_no_hash(side, sq);
            }
        }

        info!(
            positions = position_count,
            already_exact = already_exact_count,
            already_wld = already_wld_count,
            new_nodes = new_nodes_created,
            "merged position list"
        );
        Ok(position_count)
    }
}
