//! The move-decision driver: book lookup, iterative-deepening midgame and
//! the endgame transition, bundled behind the [`Engine`] value.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use tracing::debug;

use verso_core::{Color, HashPair, Position, PositionError, Square, generate_all};

use crate::book::{Book, FULL_SOLVED, WLD_SOLVED};
use crate::eval::{Coeffs, pattern_evaluation};
use crate::search::control::Control;
use crate::search::tt::TranspositionTable;
use crate::search::{
    EvalResult, EvalType, Evaluation, INFINITE_EVAL, PvStep, SearchCore, SearchState, complete_pv,
    endgame, midgame,
};

/// Consult the endgame solver instead of the book from this many empties
/// on in clocked games.
const FORCE_BOOK_SOLVE: usize = 30;

/// Where the endgame typically commences on current hardware.
const TYPICAL_SOLVE: i32 = 27;

/// Extra plies gained by switching from a midgame search of depth n to
/// solving n + offset empties.
const ENDGAME_OFFSET: i32 = 7;

/// With this many empties or fewer, searching a forced move can still pay
/// off because it yields a score; above it the move is played instantly.
const FORCED_MOVE_EMPTIES: usize = 10;

/// Pre-ordering depth used when guessing the opponent's move.
const PONDER_DEPTH: i32 = 8;

/// External opening knowledge (a game-database oracle); consulted before
/// the book when present.
pub trait OpeningOracle {
    /// Suggest an opening move for `side`, if the oracle knows one.
    fn opening_move(&mut self, pos: &Position, side: Color) -> Option<Square>;
}

/// One annotated move from [`Engine::extended_compute_move`].
#[derive(Debug, Clone)]
pub struct EvaluatedMove {
    pub side: Color,
    pub mv: Square,
    pub eval: Evaluation,
    pub pv: Vec<Square>,
}

enum MoveType {
    Interrupted(i32),
    Book,
    Midgame,
    Endgame,
}

/// The complete engine: position, searcher state, weights, book and
/// configuration. All operations thread through this value; there is no
/// global state.
pub struct Engine {
    pub core: SearchCore,
    pub book: Book,
    oracle: Option<Box<dyn OpeningOracle>>,
    forced_opening: Option<String>,
    komi: i32,
    use_oracle_openings: bool,
    endgame_performed: [bool; 2],
    prefix_move: Option<Square>,
    max_depth_reached: i32,
    evaluated_list: Vec<EvaluatedMove>,
}

impl Engine {
    /// Create an engine with a transposition table of `2^hash_bits` slots
    /// and all randomness seeded from `seed`.
    pub fn new(seed: u64, hash_bits: u32) -> Engine {
        let mut rng = StdRng::seed_from_u64(seed);
        let pos = Position::new(&mut rng);
        Engine {
            core: SearchCore {
                pos,
                tt: TranspositionTable::new(hash_bits),
                coeffs: Coeffs::new(),
                state: SearchState::new(),
                control: Control::new(),
                rng,
            },
            book: Book::new(),
            oracle: None,
            forced_opening: None,
            komi: 0,
            use_oracle_openings: true,
            endgame_performed: [false; 2],
            prefix_move: None,
            max_depth_reached: 0,
            evaluated_list: Vec::new(),
        }
    }

    /// Swap in weights loaded from a file.
    pub fn set_coeffs(&mut self, coeffs: Coeffs) {
        self.core.coeffs = coeffs;
    }

    /// Install an opening oracle.
    pub fn set_oracle(&mut self, oracle: Box<dyn OpeningOracle>) {
        self.oracle = Some(oracle);
    }

    pub fn toggle_oracle_openings(&mut self, enable: bool) {
        self.use_oracle_openings = enable;
    }

    /// Force the engine to follow an opening line while it matches.
    pub fn set_forced_opening(&mut self, opening: Option<String>) {
        self.forced_opening = opening;
    }

    /// Set the endgame komi, in discs.
    pub fn set_komi(&mut self, komi: i32) {
        self.komi = komi;
    }

    /// Prepare a fresh game, optionally from a position dump. Returns the
    /// side to move.
    pub fn game_init(&mut self, dump: Option<&str>) -> Result<Color, PositionError> {
        let side = match dump {
            None => {
                self.core.pos.reset();
                Color::Black
            }
            Some(text) => self.core.pos.set_from_dump(text)?,
        };
        self.core.state.setup();
        self.core.state.total_nodes = 0;
        self.core.state.total_evaluations = 0;
        self.core.state.root_eval = 0;
        self.endgame_performed = [false; 2];
        self.max_depth_reached = 0;
        self.prefix_move = None;
        Ok(side)
    }

    pub fn clear_endgame_performed(&mut self) {
        self.endgame_performed = [false; 2];
    }

    /// Statistics about the last search: maximum depth and node count.
    pub fn search_statistics(&self) -> (i32, u64) {
        let mut depth = self.max_depth_reached;
        if self.prefix_move.is_some() {
            depth += 1;
        }
        (depth, self.core.state.nodes)
    }

    /// The last principal variation, including the ponder prefix move.
    pub fn pv(&self) -> Vec<Square> {
        let mut line = Vec::new();
        if let Some(prefix) = self.prefix_move {
            line.push(prefix);
        }
        line.extend_from_slice(self.core.state.root_pv());
        line
    }

    /// The last PV completed with explicit passes.
    pub fn full_pv(&self) -> &[PvStep] {
        &self.core.state.full_pv
    }

    /// All move annotations from the last extended computation.
    pub fn evaluated_moves(&self) -> &[EvaluatedMove] {
        &self.evaluated_list
    }

    /// Draw from the engine's deterministic PRNG. The driver uses this
    /// for random-move injection so that games stay reproducible under a
    /// fixed seed.
    pub fn random_u32(&mut self) -> u32 {
        self.core.rng.next_u32()
    }

    /// Choose a move in the current position.
    ///
    /// The decision cascade: forced-opening line, opening oracle, book,
    /// iterative-deepening midgame, endgame solve. `timed_depth` selects
    /// clock-driven depth; otherwise `mid`, `exact` and `wld` bound the
    /// searches. With `search_forced` even only moves are searched so a
    /// score is produced.
    #[allow(clippy::too_many_arguments)]
    pub fn compute_move(
        &mut self,
        side: Color,
        update_all: bool,
        my_time: f64,
        my_incr: f64,
        timed_depth: bool,
        use_book: bool,
        mut mid: i32,
        mut exact: i32,
        mut wld: i32,
        search_forced: bool,
    ) -> (Option<Square>, Evaluation) {
        let empties = self.core.pos.empties();
        self.core.pos.refresh_piece_counts();
        self.core.pos.rehash(side);
        self.core.state.evals[self.core.pos.disks_played()] = [0; 100];
        self.max_depth_reached = 1;
        self.core.control.start_move(
            my_time,
            my_incr,
            self.core.pos.piece_count(Color::Black) + self.core.pos.piece_count(Color::White),
        );
        self.core.coeffs.remove(self.core.pos.disks_played() as i32);
        if update_all {
            self.core.state.nodes = 0;
            self.core.state.evaluations = 0;
        }
        mid = mid.max(1);
        exact = exact.clamp(0, empties as i32);
        wld = wld.clamp(0, empties as i32);

        let moves = generate_all(&self.core.pos, side);

        // No feasible moves?
        if moves.is_empty() {
            let opponent_moves = generate_all(&self.core.pos, side.opponent());
            let eval = if opponent_moves.is_empty() {
                // Game over: report the exact outcome.
                let diff = self.corrected_diff(side);
                let res = match diff.cmp(&0) {
                    std::cmp::Ordering::Greater => EvalResult::Won,
                    std::cmp::Ordering::Equal => EvalResult::Drawn,
                    std::cmp::Ordering::Less => EvalResult::Lost,
                };
                Evaluation::new(EvalType::Exact, res, 128 * diff, 1.0, 0, false)
            } else {
                Evaluation::pass()
            };
            self.core.state.set_current_eval(eval);
            self.core.state.clear_pv();
            return (None, eval);
        }

        // A forced move is played without search unless the endgame is
        // close enough for the score to matter.
        if empties > FORCED_MOVE_EMPTIES && moves.len() == 1 && !search_forced {
            let eval = Evaluation::forced();
            self.core.state.set_current_eval(eval);
            self.core.state.pv[0][0] = moves[0];
            self.core.state.pv_depth[0] = 1;
            return (Some(moves[0]), eval);
        }

        let mut move_type = MoveType::Interrupted(0);
        let mut curr_move: Option<Square> = None;
        let mut chosen_eval: Option<Evaluation> = None;
        let mut book_move_found = false;

        // Forced opening line.
        if let Some(opening) = self.forced_opening.clone() {
            if let Some(mv) = self.book.check_forced_opening(&mut self.core, side, &opening) {
                debug!(square = %mv, "following the forced opening");
                curr_move = Some(mv);
                chosen_eval = Some(Evaluation::new(
                    EvalType::Undefined,
                    EvalResult::Unsolved,
                    0,
                    0.0,
                    0,
                    true,
                ));
                book_move_found = true;
                move_type = MoveType::Book;
                self.core.state.pv[0][0] = mv;
                self.core.state.pv_depth[0] = 1;
            }
        }

        // The opening oracle (an external game database).
        if !book_move_found && self.use_oracle_openings && use_book {
            if let Some(oracle) = self.oracle.as_mut() {
                if let Some(mv) = oracle.opening_move(&self.core.pos, side) {
                    if self.core.pos.is_legal(mv, side) {
                        debug!(square = %mv, "oracle opening move");
                        curr_move = Some(mv);
                        chosen_eval = Some(Evaluation::new(
                            EvalType::Undefined,
                            EvalResult::Unsolved,
                            0,
                            0.0,
                            0,
                            true,
                        ));
                        book_move_found = true;
                        move_type = MoveType::Book;
                        self.core.state.pv[0][0] = mv;
                        self.core.state.pv_depth[0] = 1;
                    }
                }
            }
        }

        // The ordinary opening book.
        if !book_move_found && use_book {
            let mut flags = 0u16;
            if empties <= FORCE_BOOK_SOLVE {
                if empties as i32 <= wld {
                    flags = WLD_SOLVED;
                }
                if empties as i32 <= exact {
                    flags = FULL_SOLVED;
                }
            }
            self.book.fill_move_alternatives(&mut self.core, side, flags);
            let (mv, eval) = self.book.get_book_move(&mut self.core, side, update_all);
            if let Some(mv) = mv {
                self.core.state.set_current_eval(eval);
                curr_move = Some(mv);
                chosen_eval = Some(eval);
                book_move_found = true;
                move_type = MoveType::Book;
            }
        }

        // Iterative deepening in the midgame until the endgame is
        // reached. After an endgame search has been performed, or with no
        // clock at all, keep the midgame pass much shallower.
        if !timed_depth && empties as i32 <= exact.max(wld) {
            mid = mid.min(empties as i32 - 7).min(28).max(2);
        }
        let mut endgame_reached = !timed_depth && self.endgame_performed[side.index()];

        if !book_move_found && !endgame_reached {
            self.core.control.clear_panic_abort();
            self.core.control.toggle_midgame_abort_check(update_all);

            let max_depth = if timed_depth {
                64
            } else if empties as i32 <= exact.max(wld) {
                mid.min(empties as i32 - 12).min(18).max(2)
            } else {
                mid
            };
            let mut midgame_depth = 2.min(max_depth);

            loop {
                self.max_depth_reached = midgame_depth;
                let (mv, eval) = midgame::middle_game(&mut self.core, side, midgame_depth);
                if eval.is_aborted() {
                    move_type = MoveType::Interrupted(midgame_depth);
                    break;
                }
                self.core.state.set_current_eval(eval);
                curr_move = Some(mv);
                chosen_eval = Some(eval);
                move_type = MoveType::Midgame;

                if timed_depth {
                    // Will the midgame tree cross into the endgame soon
                    // enough that solving now is cheaper?
                    let mut offset = ENDGAME_OFFSET;
                    if self.core.control.is_panic_abort() {
                        offset -= 1;
                    }
                    if self.endgame_performed[side.index()] {
                        offset += 2;
                    }
                    if midgame_depth + offset + TYPICAL_SOLVE >= 2 * empties as i32
                        || midgame_depth + ENDGAME_OFFSET >= empties as i32
                    {
                        endgame_reached = true;
                    }
                }

                midgame_depth += 1;
                if self.core.control.is_panic_abort()
                    || self.core.control.is_midgame_abort()
                    || self.core.control.is_force_return()
                    || midgame_depth > max_depth
                    || midgame_depth + self.core.pos.disks_played() as i32 > 61
                    || endgame_reached
                {
                    break;
                }
            }
        }

        // If the endgame has been reached, solve the position.
        if !self.core.control.is_force_return() {
            let solve_now = (timed_depth && endgame_reached)
                || (timed_depth
                    && book_move_found
                    && self.core.pos.disks_played() >= 60 - FORCE_BOOK_SOLVE)
                || (!timed_depth && empties as i32 <= exact.max(wld));
            if solve_now {
                self.max_depth_reached = empties as i32;
                self.core.control.clear_panic_abort();
                if use_book {
                    self.book.fill_endgame_hash(&mut self.core, 0);
                }
                let wld_mode = if timed_depth {
                    (self.core.pos.disks_played() as i32) < 60 - exact
                } else {
                    empties as i32 > exact
                };
                let (mv, eval) = endgame::end_game(&mut self.core, side, wld_mode, self.komi);
                self.core.state.set_current_eval(eval);
                if eval.is_aborted() {
                    move_type = MoveType::Interrupted(0);
                } else {
                    curr_move = mv.or(curr_move);
                    chosen_eval = Some(eval);
                    move_type = MoveType::Endgame;
                }
                if update_all {
                    self.endgame_performed[side.index()] = true;
                }
            }
        }

        let eval = match move_type {
            MoveType::Interrupted(depth) => {
                // Fall back to the previous iteration's move; with none
                // available, a one-ply lookup decides.
                if curr_move.is_none() {
                    let fallback = self.one_ply_fallback(side, &moves);
                    curr_move = Some(fallback);
                    self.core.state.pv[0][0] = fallback;
                    self.core.state.pv_depth[0] = 1;
                }
                let mut eval = Evaluation::interrupted();
                eval.search_depth = depth;
                eval
            }
            _ => chosen_eval.unwrap_or_else(Evaluation::undefined),
        };
        self.core.state.set_current_eval(eval);

        if update_all {
            self.core.state.total_nodes += self.core.state.nodes;
            self.core.state.total_evaluations += self.core.state.evaluations;
        }
        self.core.control.clear_panic_abort();

        // Complete the PV with passes unless we are pondering.
        if self.core.state.ponder_move().is_none() {
            complete_pv(&mut self.core, side);
        }

        (curr_move, eval)
    }

    /// Disc differential from `side`'s perspective, empties awarded to
    /// the winner.
    fn corrected_diff(&self, side: Color) -> i32 {
        let mine = self.core.pos.piece_count(side);
        let theirs = self.core.pos.piece_count(side.opponent());
        if mine > theirs {
            64 - 2 * theirs
        } else if mine < theirs {
            2 * mine - 64
        } else {
            0
        }
    }

    /// Static one-ply choice used when a search was interrupted before
    /// any iteration completed.
    fn one_ply_fallback(&mut self, side: Color, moves: &verso_core::MoveList) -> Square {
        let mut best = moves[0];
        let mut best_score = -INFINITE_EVAL;
        for sq in moves.iter() {
            self.core.pos.make_move(side, sq, true);
            self.core.pos.refresh_piece_counts();
            let score =
                -pattern_evaluation(&self.core.pos, side.opponent(), &mut self.core.coeffs);
            self.core.pos.unmake_move(side, sq);
            if score > best_score {
                best_score = score;
                best = sq;
            }
        }
        best
    }

    /// Evaluate every legal move: book moves from the book, the rest with
    /// iterative deepening that raises the depth limits two plies at a
    /// time, keeping the move list sorted between iterations.
    ///
    /// With `book_only` no searching happens at all. Returns the best
    /// move.
    pub fn extended_compute_move(
        &mut self,
        side: Color,
        book_only: bool,
        mut use_book: bool,
        mid: i32,
        mut exact: i32,
        mut wld: i32,
    ) -> Option<Square> {
        // No time pressure during analysis.
        self.core.control.toggle_abort_check(false);
        self.core.control.toggle_midgame_abort_check(false);
        self.core.control.start_move(0.0, 0.0, 0);
        self.core.pos.refresh_piece_counts();
        self.core.pos.rehash(side);
        self.core.state.nodes = 0;

        let empties = 60 - self.core.pos.disks_played() as i32;
        let mut best_move: Option<Square> = None;
        self.evaluated_list.clear();

        let moves = generate_all(&self.core.pos, side);

        if book_only || use_book {
            // Evaluations for database moves.
            let mut flags = 0u16;
            if empties <= exact {
                flags = FULL_SOLVED;
            } else if empties <= wld {
                flags = WLD_SOLVED;
            }
            self.book.fill_move_alternatives(&mut self.core, side, flags);

            for i in 0..self.book.candidate_count() {
                let candidate = self.book.candidate(i);
                let mut eval = Evaluation::new(
                    EvalType::Undefined,
                    EvalResult::Unsolved,
                    candidate.score,
                    0.0,
                    0,
                    true,
                );
                let child_flags = candidate.flags & candidate.parent_flags;
                if child_flags & (FULL_SOLVED | WLD_SOLVED) != 0 {
                    eval.kind = if child_flags & FULL_SOLVED != 0 {
                        EvalType::Exact
                    } else {
                        EvalType::Wld
                    };
                    if candidate.score > 0 {
                        eval.res = EvalResult::Won;
                        eval.score -= crate::book::CONFIRMED_WIN;
                        eval.score *= 128;
                    } else if candidate.score == 0 {
                        eval.res = EvalResult::Drawn;
                    } else {
                        eval.res = EvalResult::Lost;
                        eval.score += crate::book::CONFIRMED_WIN;
                        eval.score *= 128;
                    }
                } else {
                    eval.kind = EvalType::Midgame;
                }
                self.evaluated_list.push(EvaluatedMove {
                    side,
                    mv: candidate.mv,
                    eval,
                    pv: vec![candidate.mv],
                });
            }
        }

        if book_only {
            // Only book moves are to be considered.
            if !self.evaluated_list.is_empty() {
                let (mv, eval) = self.book.get_book_move(&mut self.core, side, false);
                self.core.state.set_current_eval(eval);
                best_move = mv;
            } else {
                self.core.state.clear_pv();
                self.core.state.set_current_eval(Evaluation::undefined());
            }
            self.core.control.toggle_abort_check(true);
            self.core.control.toggle_midgame_abort_check(true);
            return best_move;
        }

        // Searches for the moves not in the database.
        use_book = false;
        let mut best_score = -INFINITE_EVAL;
        if let Some(first) = self.evaluated_list.first() {
            best_score = first.eval.score;
            best_move = Some(first.mv);
        }
        self.core.state.negate_current_eval(true);

        let book_count = self.evaluated_list.len();
        let mut unsearched: Vec<Square> = moves
            .iter()
            .filter(|&mv| !self.evaluated_list.iter().any(|entry| entry.mv == mv))
            .collect();

        // Seed the ordering with a shallow evaluation.
        let stage = self.core.pos.disks_played();
        let shallow_depth = if empties < 12 {
            1
        } else if mid.max(exact).max(wld) >= 16 {
            6
        } else {
            4
        };
        for &mv in &unsearched {
            self.core.pos.make_move(side, mv, true);
            self.core.pos.refresh_piece_counts();
            let shallow_eval = if shallow_depth == 1 {
                -pattern_evaluation(&self.core.pos, side.opponent(), &mut self.core.coeffs)
            } else {
                let (_, info) = self.compute_move_inner(
                    side.opponent(),
                    shallow_depth - 1,
                    0,
                    0,
                    use_book,
                );
                match info.kind {
                    EvalType::Pass => self.game_over_or_own_eval(side, shallow_depth - 1),
                    _ => -info.score,
                }
            };
            self.core.pos.unmake_move(side, mv);
            self.core.state.evals[stage][mv.pos()] = shallow_eval;
        }
        unsearched
            .sort_by_key(|mv| std::cmp::Reverse(self.core.state.evals[stage][mv.pos()]));

        // Fresh hash masks per move keep analysis results stable when
        // browsing back and forth through a game.
        let transforms: Vec<HashPair> = unsearched
            .iter()
            .map(|_| {
                if empties > wld.max(exact) {
                    HashPair::new(self.core.rng.next_u32(), self.core.rng.next_u32())
                } else {
                    HashPair::ZERO
                }
            })
            .collect();

        for &mv in &unsearched {
            self.evaluated_list.push(EvaluatedMove {
                side,
                mv,
                eval: Evaluation::undefined(),
                pv: vec![mv],
            });
        }

        // Iterative deepening raising the bounds two plies at a time.
        const ID_STEP: i32 = 2;
        exact = exact.min(empties);
        wld = wld.min(empties);
        let mut current_exact =
            if exact < 12 || empties > exact { exact } else { (8 + exact % 2) - ID_STEP };
        let mut current_wld =
            if wld < 14 || empties > wld { wld } else { (10 + wld % 2) - ID_STEP };
        let mut mid = mid;
        if (empties == exact || empties == wld) && empties > 16 && mid < empties - 12 {
            mid = empties - 12;
        }
        let mut current_mid = if mid < 10 { mid } else { (6 + mid % 2) - ID_STEP };

        let mut first_iteration = true;
        let mut evaluated_count = book_count;
        let mut best_pv: Vec<Square> = Vec::new();

        loop {
            if current_mid < mid {
                current_mid += ID_STEP;
                // Avoid deep midgame searches if the endgame is reached
                // anyway.
                if empties <= wld && current_mid + 7 >= empties {
                    current_wld = wld;
                    current_mid = mid;
                }
                if empties <= exact && current_mid + 7 >= empties {
                    current_exact = exact;
                    current_mid = mid;
                }
            } else if current_wld < wld {
                current_wld = wld;
            } else {
                current_exact = exact;
            }

            for i in 0..unsearched.len() {
                let this_move = unsearched[i];
                let index = self
                    .evaluated_list
                    .iter()
                    .position(|entry| entry.mv == this_move)
                    .expect("every unsearched move is listed");

                self.core.tt.set_transformation(transforms[i]);

                self.core.pos.make_move(side, this_move, true);
                self.core.pos.refresh_piece_counts();
                let mut this_eval = if current_mid == 1 {
                    let score = pattern_evaluation(
                        &self.core.pos,
                        side.opponent(),
                        &mut self.core.coeffs,
                    );
                    Evaluation::new(EvalType::Midgame, EvalResult::Unsolved, score, 0.0, 0, false)
                } else {
                    let (_, info) = self.compute_move_inner(
                        side.opponent(),
                        current_mid - 1,
                        current_exact - 1,
                        current_wld - 1,
                        use_book,
                    );
                    info
                };

                if this_eval.kind == EvalType::Pass {
                    // Don't allow a pass: search from the same side, or
                    // score the finished game.
                    let (_, info) = self.compute_move_inner(
                        side,
                        current_mid - 1,
                        current_exact - 1,
                        current_wld - 1,
                        use_book,
                    );
                    this_eval = info;
                    if this_eval.kind == EvalType::Pass {
                        let diff = self.corrected_diff(side);
                        let res = match diff.cmp(&0) {
                            std::cmp::Ordering::Greater => EvalResult::Won,
                            std::cmp::Ordering::Equal => EvalResult::Drawn,
                            std::cmp::Ordering::Less => EvalResult::Lost,
                        };
                        this_eval = Evaluation::new(
                            EvalType::Exact,
                            res,
                            128 * diff,
                            0.0,
                            empties,
                            false,
                        );
                    }
                } else {
                    // Sign-correct the score produced by the opponent's
                    // search.
                    this_eval.score = -this_eval.score;
                    this_eval.res = match this_eval.res {
                        EvalResult::Won => EvalResult::Lost,
                        EvalResult::Lost => EvalResult::Won,
                        other => other,
                    };
                }

                // Store the move's PV and evaluation.
                let mut pv = vec![this_move];
                pv.extend_from_slice(self.core.state.root_pv());
                self.core.pos.unmake_move(side, this_move);

                self.evaluated_list[index].eval = this_eval;
                self.evaluated_list[index].pv = pv.clone();

                if this_eval.score > best_score {
                    best_score = this_eval.score;
                    best_move = Some(this_move);
                    best_pv = pv;
                }

                if first_iteration {
                    evaluated_count += 1;
                }
                self.sort_evaluated(evaluated_count);
            }

            first_iteration = false;

            // Bring the evaluated order back onto the unsearched list so
            // the next iteration searches best-first.
            for entry in self.evaluated_list.iter().rev() {
                if let Some(found) = unsearched.iter().position(|&mv| mv == entry.mv) {
                    let mv = unsearched.remove(found);
                    unsearched.insert(0, mv);
                }
            }

            if current_mid == mid && current_exact == exact && current_wld == wld {
                break;
            }
        }

        // Make sure the PV and the reported score correspond to the best
        // move.
        if let Some(best) = best_move {
            self.core.state.pv[0][0] = best;
            for (i, &sq) in best_pv.iter().enumerate().skip(1) {
                self.core.state.pv[0][i] = sq;
            }
            self.core.state.pv_depth[0] = best_pv.len().max(1);
        }

        self.core.state.negate_current_eval(false);
        if let Some(first) = self.evaluated_list.first() {
            let eval = first.eval;
            self.core.state.set_current_eval(eval);
        }

        self.core.tt.set_transformation(HashPair::ZERO);
        self.core.control.toggle_abort_check(true);
        self.core.control.toggle_midgame_abort_check(true);
        self.max_depth_reached += 1;
        best_move
    }

    /// Exact or WLD annotation for `actual_move` and for the best move if
    /// it differs, stored in the evaluated-move list (best first).
    pub fn perform_extended_solve(
        &mut self,
        side: Color,
        actual_move: Square,
        use_book: bool,
        exact_solve: bool,
    ) {
        self.core.control.toggle_abort_check(false);
        self.core.control.toggle_midgame_abort_check(false);
        self.core.control.start_move(0.0, 0.0, 0);
        self.core.pos.refresh_piece_counts();
        self.core.pos.rehash(side);
        self.core.state.nodes = 0;

        let mid = 60;
        let wld = 60;
        let exact = if exact_solve { 60 } else { 0 };

        self.evaluated_list.clear();
        self.prefix_move = Some(actual_move);
        self.core.state.negate_current_eval(true);

        // Solve the actual move.
        self.core.pos.make_move(side, actual_move, true);
        self.core.pos.refresh_piece_counts();
        let (_, mut actual_eval) =
            self.compute_move_inner(side.opponent(), mid - 1, exact - 1, wld - 1, use_book);
        if actual_eval.kind == EvalType::Pass {
            let (_, info) =
                self.compute_move_inner(side, mid - 1, exact - 1, wld - 1, use_book);
            actual_eval = info;
            if actual_eval.kind == EvalType::Pass {
                let diff = self.corrected_diff(side);
                let res = match diff.cmp(&0) {
                    std::cmp::Ordering::Greater => EvalResult::Won,
                    std::cmp::Ordering::Equal => EvalResult::Drawn,
                    std::cmp::Ordering::Less => EvalResult::Lost,
                };
                actual_eval = Evaluation::new(
                    EvalType::Exact,
                    res,
                    128 * diff,
                    0.0,
                    60 - self.core.pos.disks_played() as i32,
                    false,
                );
            }
        } else {
            actual_eval.score = -actual_eval.score;
            actual_eval.res = match actual_eval.res {
                EvalResult::Won => EvalResult::Lost,
                EvalResult::Lost => EvalResult::Won,
                other => other,
            };
        }
        let mut actual_pv = vec![actual_move];
        actual_pv.extend_from_slice(self.core.state.root_pv());
        self.core.pos.unmake_move(side, actual_move);

        self.evaluated_list.push(EvaluatedMove {
            side,
            mv: actual_move,
            eval: actual_eval,
            pv: actual_pv,
        });

        self.prefix_move = None;
        self.core.state.negate_current_eval(false);
        self.max_depth_reached += 1;

        // Solve the position itself; a different best move is prepended.
        let (best_move, best_eval) =
            self.compute_move(side, false, 0.0, 0.0, false, use_book, mid, exact, wld, true);
        if let Some(best) = best_move {
            if best != actual_move {
                let mut pv = Vec::new();
                pv.extend_from_slice(self.core.state.root_pv());
                self.evaluated_list.insert(
                    0,
                    EvaluatedMove { side, mv: best, eval: best_eval, pv },
                );
            }
        }

        // Leave the PV describing the best entry.
        let best = self.evaluated_list[0].clone();
        self.core.state.pv_depth[0] = best.pv.len();
        for (i, &sq) in best.pv.iter().enumerate() {
            self.core.state.pv[0][i] = sq;
        }
        self.core.state.set_current_eval(best.eval);

        self.core.control.toggle_abort_check(true);
        self.core.control.toggle_midgame_abort_check(true);
    }

    /// Search the opponent's likely replies, filling the transposition
    /// table with scores and moves so the real search starts warm. No
    /// result is returned; time control is suspended throughout.
    pub fn ponder_move(&mut self, side: Color, use_book: bool, mid: i32, exact: i32, wld: i32) {
        self.core.control.toggle_abort_check(false);
        self.core.control.toggle_midgame_abort_check(false);
        self.core.control.start_move(0.0, 0.0, 0);
        self.core.pos.refresh_piece_counts();
        self.core.pos.rehash(side);
        self.core.state.nodes = 0;

        // Shallow search to rank the opponent's moves.
        let (_, _eval) = self.compute_move(
            side,
            false,
            0.0,
            0.0,
            false,
            false,
            PONDER_DEPTH.min(mid),
            0,
            0,
            false,
        );

        let stage = self.core.pos.disks_played();
        let mut expect_list = generate_all(&self.core.pos, side);
        self.core.state.sort_moves(&mut expect_list, stage);

        let mut best_pv: Vec<Square> = Vec::new();
        for (i, this_move) in expect_list.iter().enumerate() {
            if self.core.control.is_force_return() {
                break;
            }
            self.core.state.set_ponder_move(this_move);
            self.prefix_move = Some(this_move);
            self.core.pos.make_move(side, this_move, true);
            self.core.pos.refresh_piece_counts();
            let _ = self.compute_move(
                side.opponent(),
                false,
                0.0,
                0.0,
                false,
                use_book,
                mid,
                exact,
                wld,
                false,
            );
            self.core.pos.unmake_move(side, this_move);
            self.core.state.clear_ponder_move();

            if i == 0 && !self.core.control.is_force_return() {
                best_pv = vec![this_move];
                best_pv.extend_from_slice(self.core.state.root_pv());
            }
        }

        // Leave a plausible PV: the best reply plus its continuation.
        self.max_depth_reached += 1;
        self.prefix_move = None;
        if best_pv.is_empty() {
            self.core.state.clear_pv();
        } else {
            self.core.state.pv_depth[0] = best_pv.len();
            for (i, &sq) in best_pv.iter().enumerate() {
                self.core.state.pv[0][i] = sq;
            }
        }

        self.core.control.toggle_abort_check(true);
        self.core.control.toggle_midgame_abort_check(true);
    }

    /// `compute_move` without statistics updates, used by the extended
    /// analyses.
    fn compute_move_inner(
        &mut self,
        side: Color,
        mid: i32,
        exact: i32,
        wld: i32,
        use_book: bool,
    ) -> (Option<Square>, Evaluation) {
        self.compute_move(
            side,
            false,
            0.0,
            0.0,
            false,
            use_book,
            mid.max(1),
            exact.max(0),
            wld.max(0),
            true,
        )
    }

    /// One-ply replacement evaluation when a move leads to a pass-ended
    /// game during the shallow ordering phase.
    fn game_over_or_own_eval(&mut self, side: Color, depth: i32) -> i32 {
        let moves = generate_all(&self.core.pos, side);
        if moves.is_empty() {
            let diff = self.corrected_diff(side);
            128 * diff
        } else {
            let (_, info) = self.compute_move_inner(side, depth, 0, 0, false);
            info.score
        }
    }

    /// Sort the first `count` evaluated moves, best first. Solved wins
    /// outrank any heuristic score.
    fn sort_evaluated(&mut self, count: usize) {
        let weight = |eval: &Evaluation| -> i64 {
            let mut score = eval.score as i64;
            if matches!(eval.kind, EvalType::Wld | EvalType::Exact) && eval.score > 0 {
                score += 100_000;
            }
            score
        };
        let count = count.min(self.evaluated_list.len());
        self.evaluated_list[..count].sort_by_key(|entry| std::cmp::Reverse(weight(&entry.eval)));
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("position", &self.core.pos)
            .field("book_nodes", &self.book.node_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use verso_core::{Color, Square};

    use super::Engine;
    use crate::search::{EvalResult, EvalType};

    fn engine() -> Engine {
        Engine::new(1, 14)
    }

    #[test]
    fn initial_position_minimal_search() {
        let mut engine = engine();
        engine.game_init(None).unwrap();
        let (mv, eval) =
            engine.compute_move(Color::Black, true, 0.0, 0.0, false, false, 1, 0, 0, false);
        let mv = mv.expect("black has four moves");
        let legal = ["c4", "d3", "e6", "f5"];
        assert!(legal.contains(&format!("{mv}").as_str()), "got {mv}");
        assert_eq!(eval.kind, EvalType::Midgame);
    }

    #[test]
    fn forced_move_detected() {
        let mut engine = engine();
        // Black's only legal move is h8.
        let mut rows: Vec<String> = Vec::new();
        rows.push("O*******".into());
        for _ in 0..6 {
            rows.push("********".into());
        }
        rows.push("*******-".into());
        // White wedge at g8 so h8 flips it; nothing else is playable.
        let dump = format!("{} *", rows.join("")).replacen("*******-", "******O-", 1);
        let side = engine.game_init(Some(&dump)).unwrap();
        assert_eq!(side, Color::Black);
        let moves = verso_core::generate_all(&engine.core.pos, Color::Black);
        assert_eq!(moves.len(), 1);

        // Near the end the forced move is searched (for its score), so
        // check the short-circuit through a midgame-like position
        // instead: here it solves and returns an exact score.
        let (mv, eval) =
            engine.compute_move(Color::Black, true, 0.0, 0.0, false, false, 4, 2, 2, false);
        assert_eq!(format!("{}", mv.unwrap()), "h8");
        assert_eq!(eval.kind, EvalType::Exact);
    }

    #[test]
    fn forced_move_shortcut_in_midgame() {
        let mut engine = engine();
        // A sparse board where Black's only move is c1 (flipping b1).
        // With this many empties the move is played without any search.
        let mut dump = String::new();
        dump.push('*');
        dump.push('O');
        for _ in 2..64 {
            dump.push('-');
        }
        dump.push_str(" *");
        let side = engine.game_init(Some(&dump)).unwrap();
        assert_eq!(side, Color::Black);
        let moves = verso_core::generate_all(&engine.core.pos, Color::Black);
        assert_eq!(moves.len(), 1);

        let (mv, eval) =
            engine.compute_move(Color::Black, true, 0.0, 0.0, false, false, 8, 0, 0, false);
        assert_eq!(format!("{}", mv.unwrap()), "c1");
        assert_eq!(eval.kind, EvalType::Forced);
    }

    #[test]
    fn pass_position_detected() {
        let mut engine = engine();
        // White has no move, Black does: Black wall with one empty
        // square that only Black can take.
        let mut rows: Vec<String> = Vec::new();
        rows.push("-O******".into());
        for _ in 0..7 {
            rows.push("********".into());
        }
        let dump = format!("{} O", rows.join(""));
        let side = engine.game_init(Some(&dump)).unwrap();
        assert_eq!(side, Color::White);
        let (mv, eval) =
            engine.compute_move(Color::White, true, 0.0, 0.0, false, false, 4, 0, 0, false);
        assert!(mv.is_none());
        assert_eq!(eval.kind, EvalType::Pass);
        // The board is untouched.
        assert_eq!(engine.core.pos.disks_played(), 59);
    }

    #[test]
    fn terminal_position_scored_exactly() {
        let mut engine = engine();
        // Full board, 40 black vs 24 white.
        let mut dump = String::new();
        for i in 0..64 {
            dump.push(if i < 40 { '*' } else { 'O' });
        }
        dump.push_str(" *");
        engine.game_init(Some(&dump)).unwrap();
        let (mv, eval) =
            engine.compute_move(Color::Black, true, 0.0, 0.0, false, false, 4, 0, 0, false);
        assert!(mv.is_none());
        assert_eq!(eval.kind, EvalType::Exact);
        assert_eq!(eval.res, EvalResult::Won);
        assert_eq!(eval.score, (40 - 24) * 128);
        assert!(engine.pv().is_empty());
    }

    #[test]
    fn compute_move_is_deterministic() {
        let run = || {
            let mut engine = engine();
            engine.game_init(None).unwrap();
            let mut side = Color::Black;
            let mut transcript = Vec::new();
            for _ in 0..6 {
                let (mv, _) = engine
                    .compute_move(side, true, 0.0, 0.0, false, false, 4, 0, 0, false);
                let mv = mv.expect("moves available in the opening");
                engine.core.pos.make_move(side, mv, true);
                transcript.push(format!("{mv}"));
                side = side.opponent();
            }
            transcript
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn extended_compute_move_annotates_everything() {
        let mut engine = engine();
        engine.game_init(None).unwrap();
        let best = engine.extended_compute_move(Color::Black, false, false, 4, 0, 0);
        assert!(best.is_some());
        let annotated = engine.evaluated_moves();
        assert_eq!(annotated.len(), 4);
        // Sorted best-first and all scores equal by symmetry at depth 4.
        for entry in annotated {
            assert_eq!(entry.eval.kind, EvalType::Midgame);
            assert_eq!(entry.pv[0], entry.mv);
        }
        let first = annotated[0].eval.score;
        let last = annotated[3].eval.score;
        assert!(first >= last);
    }

    #[test]
    fn extended_solve_ranks_actual_and_best() {
        let mut engine = engine();
        // Two empties left; h8 wins more than a8... craft: row 8 has two
        // empties at g8/h8 with white discs to capture.
        let mut rows: Vec<String> = Vec::new();
        for _ in 0..7 {
            rows.push("********".into());
        }
        rows.push("*****O--".into());
        let dump = format!("{} *", rows.join(""));
        engine.game_init(Some(&dump)).unwrap();
        let actual: Square = "g8".parse().unwrap();
        engine.perform_extended_solve(Color::Black, actual, false, true);
        let list = engine.evaluated_moves();
        assert!(!list.is_empty());
        assert!(list.iter().any(|entry| entry.mv == actual));
        assert_eq!(list[0].eval.kind, EvalType::Exact);
    }

    #[test]
    fn ponder_fills_the_table() {
        let mut engine = engine();
        engine.game_init(None).unwrap();
        engine.ponder_move(Color::Black, false, 4, 0, 0);
        // Pondering must leave the position untouched.
        assert_eq!(engine.core.pos.disks_played(), 0);
        // And leave a plausible PV starting with a legal move.
        let pv = engine.pv();
        assert!(!pv.is_empty());
        assert!(engine.core.pos.is_legal(pv[0], Color::Black));
    }
}
