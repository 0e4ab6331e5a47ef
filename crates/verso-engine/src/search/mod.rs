//! Search infrastructure shared by the midgame and endgame searchers.

pub mod control;
pub mod endgame;
pub mod midgame;
pub mod probcut;
pub mod tt;

use rand::rngs::StdRng;

use tracing::warn;
use verso_core::{Color, MoveList, MoveOrder, Position, Square};

use crate::eval::Coeffs;
use control::Control;
use tt::{MIDGAME_MODE, TranspositionTable};

/// Upper bound on search depth, used to size the per-ply arrays.
pub const MAX_SEARCH_DEPTH: usize = 64;

/// Sentinel score propagated out of an interrupted search. Callers compare
/// against its absolute value since negamax may flip the sign once.
pub const SEARCH_ABORT: i32 = -27000;

/// A bound strictly outside every reachable score.
pub const INFINITE_EVAL: i32 = 12_345_678;

/// How a position's value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalType {
    /// Heuristic midgame score in 1/128ths of a disc.
    Midgame,
    /// Exact disc-differential score (scaled by 128).
    Exact,
    /// Win/loss/draw resolution without the exact margin.
    Wld,
    /// Midgame score obtained with selective (ProbCut) pruning.
    Selective,
    /// The only legal move; no search was performed.
    Forced,
    /// No legal move exists.
    Pass,
    /// Placeholder while a value is being filled in.
    Undefined,
    /// The search was aborted before completing.
    Interrupted,
    /// No search has happened yet.
    Uninitialized,
}

/// Game-theoretic status attached to solved scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalResult {
    Won,
    Drawn,
    Lost,
    Unsolved,
}

/// Full description of a move decision.
#[derive(Debug, Clone, Copy)]
pub struct Evaluation {
    pub kind: EvalType,
    pub res: EvalResult,
    pub score: i32,
    /// Confidence level for selective results, 1.0 = fully resolved.
    pub confidence: f64,
    pub search_depth: i32,
    pub is_book: bool,
}

impl Evaluation {
    pub fn new(
        kind: EvalType,
        res: EvalResult,
        score: i32,
        confidence: f64,
        search_depth: i32,
        is_book: bool,
    ) -> Evaluation {
        Evaluation { kind, res, score, confidence, search_depth, is_book }
    }

    pub fn uninitialized() -> Evaluation {
        Evaluation::new(EvalType::Uninitialized, EvalResult::Unsolved, 0, 0.0, 0, false)
    }

    pub fn undefined() -> Evaluation {
        Evaluation::new(EvalType::Undefined, EvalResult::Unsolved, 0, 0.0, 0, false)
    }

    pub fn pass() -> Evaluation {
        Evaluation::new(EvalType::Pass, EvalResult::Unsolved, 0, 0.0, 0, false)
    }

    pub fn forced() -> Evaluation {
        Evaluation::new(EvalType::Forced, EvalResult::Unsolved, 0, 0.0, 0, false)
    }

    pub fn interrupted() -> Evaluation {
        Evaluation::new(EvalType::Interrupted, EvalResult::Unsolved, 0, 0.0, 0, false)
    }

    /// Was this value cut short by an abort?
    pub fn is_aborted(&self) -> bool {
        self.kind == EvalType::Interrupted || self.score.abs() == SEARCH_ABORT.abs()
    }
}

/// A principal-variation step: a move, or a pass inserted to keep the side
/// to move consistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PvStep {
    Move(Square),
    Pass,
}

/// Mutable scratch state threaded through every search.
pub struct SearchState {
    /// Principal-variation matrix: row `ply` holds the line from that ply.
    pub pv: [[Square; MAX_SEARCH_DEPTH]; MAX_SEARCH_DEPTH],
    /// One past the last valid column of each PV row.
    pub pv_depth: [usize; MAX_SEARCH_DEPTH],
    /// The root PV completed with explicit passes.
    pub full_pv: Vec<PvStep>,
    /// Root score of the last midgame or endgame search.
    pub root_eval: i32,
    pub nodes: u64,
    pub evaluations: u64,
    pub total_nodes: u64,
    pub total_evaluations: u64,
    /// Self-organizing per-stage move ordering.
    pub order: MoveOrder,
    /// Last known evaluation for each (stage, square), used for sorting.
    pub evals: Box<[[i32; 100]; 61]>,
    pondered_move: Option<Square>,
    negate_eval: bool,
    last_eval: Evaluation,
}

impl SearchState {
    pub fn new() -> SearchState {
        SearchState {
            pv: [[Square::from_row_col(1, 1); MAX_SEARCH_DEPTH]; MAX_SEARCH_DEPTH],
            pv_depth: [0; MAX_SEARCH_DEPTH],
            full_pv: Vec::new(),
            root_eval: 0,
            nodes: 0,
            evaluations: 0,
            total_nodes: 0,
            total_evaluations: 0,
            order: MoveOrder::new(),
            evals: Box::new([[0; 100]; 61]),
            pondered_move: None,
            negate_eval: false,
            last_eval: Evaluation::uninitialized(),
        }
    }

    /// Reset per-game search state.
    pub fn setup(&mut self) {
        self.order.reset();
        self.last_eval = Evaluation::uninitialized();
        self.negate_eval = false;
        self.pv_depth[0] = 0;
        self.full_pv.clear();
    }

    /// The root principal variation.
    pub fn root_pv(&self) -> &[Square] {
        &self.pv[0][..self.pv_depth[0]]
    }

    pub fn clear_pv(&mut self) {
        self.pv_depth[0] = 0;
    }

    /// Save the root PV so a deeper, possibly failing search can be rolled
    /// back to it.
    pub fn store_pv(&self) -> (Vec<Square>, usize) {
        (self.pv[0][..self.pv_depth[0]].to_vec(), self.pv_depth[0])
    }

    /// Restore a PV saved with [`store_pv`](Self::store_pv).
    pub fn restore_pv(&mut self, saved: &(Vec<Square>, usize)) {
        self.pv[0][..saved.1].copy_from_slice(&saved.0);
        self.pv_depth[0] = saved.1;
    }

    /// Bubble-sort `list` in decreasing order of the recorded evaluations
    /// at `stage`.
    pub fn sort_moves(&self, list: &mut MoveList, stage: usize) {
        let slice = list.as_mut_slice();
        loop {
            let mut modified = false;
            for i in 0..slice.len().saturating_sub(1) {
                if self.evals[stage][slice[i].pos()] < self.evals[stage][slice[i + 1].pos()] {
                    slice.swap(i, i + 1);
                    modified = true;
                }
            }
            if !modified {
                break;
            }
        }
    }

    pub fn set_ponder_move(&mut self, mv: Square) {
        self.pondered_move = Some(mv);
    }

    pub fn clear_ponder_move(&mut self) {
        self.pondered_move = None;
    }

    pub fn ponder_move(&self) -> Option<Square> {
        self.pondered_move
    }

    /// Store the externally visible evaluation, negating it when the search
    /// runs from the opponent's perspective.
    pub fn set_current_eval(&mut self, eval: Evaluation) {
        self.last_eval = eval;
        if self.negate_eval {
            self.last_eval.score = -self.last_eval.score;
            self.last_eval.res = match self.last_eval.res {
                EvalResult::Won => EvalResult::Lost,
                EvalResult::Lost => EvalResult::Won,
                other => other,
            };
        }
    }

    pub fn current_eval(&self) -> Evaluation {
        self.last_eval
    }

    pub fn negate_current_eval(&mut self, negate: bool) {
        self.negate_eval = negate;
    }
}

impl Default for SearchState {
    fn default() -> SearchState {
        SearchState::new()
    }
}

/// Everything a search needs: position, transposition table, weights,
/// scratch state, cooperative control and the PRNG.
pub struct SearchCore {
    pub pos: Position,
    pub tt: TranspositionTable,
    pub coeffs: Coeffs,
    pub state: SearchState,
    pub control: Control,
    pub rng: StdRng,
}

/// Copy the child PV at `ply + 1` under `sq` into row `ply`.
pub(crate) fn update_pv(state: &mut SearchState, ply: usize, sq: Square) {
    state.pv[ply][ply] = sq;
    let child_depth = state.pv_depth[ply + 1].max(ply + 1);
    for i in (ply + 1)..child_depth {
        state.pv[ply][i] = state.pv[ply + 1][i];
    }
    state.pv_depth[ply] = child_depth;
}

/// Complete the root PV with passes so that it can be replayed move by
/// move. An unplayable tail (stale hash information) is truncated.
pub fn complete_pv(core: &mut SearchCore, mut side: Color) {
    let depth = core.state.pv_depth[0];
    let line: Vec<Square> = core.state.pv[0][..depth].to_vec();

    core.state.full_pv.clear();
    let mut made: Vec<(Color, Square)> = Vec::new();
    for &sq in &line {
        if core.pos.make_move(side, sq, true) > 0 {
            made.push((side, sq));
            core.state.full_pv.push(PvStep::Move(sq));
        } else {
            // Try the same move for the opponent with a pass in between.
            side = side.opponent();
            if core.pos.make_move(side, sq, true) > 0 {
                core.state.full_pv.push(PvStep::Pass);
                made.push((side, sq));
                core.state.full_pv.push(PvStep::Move(sq));
            } else {
                warn!(square = %sq, "unplayable PV tail truncated");
                break;
            }
        }
        side = side.opponent();
    }
    for &(stm, sq) in made.iter().rev() {
        core.pos.unmake_move(stm, sq);
    }
}

/// Pad the root PV with the move sequence suggested by the transposition
/// table, stopping at the first miss, illegal suggestion or double pass.
pub fn hash_expand_pv(core: &mut SearchCore, mut side: Color, mode: bool, flags: u16, max_selectivity: u8) {
    core.pos.rehash(side);
    let mut new_pv: Vec<Square> = Vec::new();
    let mut made: Vec<(Color, Square)> = Vec::new();
    let mut pass_count = 0;

    while pass_count < 2 {
        // Keep the first searched move if the table disagrees with it.
        let suggested = if new_pv.is_empty() && core.state.pv_depth[0] > 0 {
            Some(core.state.pv[0][0])
        } else {
            core.tt
                .probe(core.pos.hash(), mode)
                .filter(|entry| {
                    entry.flags & flags != 0 && entry.selectivity <= max_selectivity
                })
                .and_then(|entry| Square::from_pos(entry.moves[0] as usize))
        };

        let played = suggested.is_some_and(|sq| {
            core.pos.cell(sq.pos()) == verso_core::Cell::Empty
                && core.pos.make_move(side, sq, true) > 0
        });
        if played {
            let sq = suggested.unwrap();
            new_pv.push(sq);
            made.push((side, sq));
            pass_count = 0;
        } else {
            core.pos.toggle_hash_side();
            pass_count += 1;
        }
        side = side.opponent();
    }

    for _ in 0..pass_count {
        core.pos.toggle_hash_side();
    }
    for &(stm, sq) in made.iter().rev() {
        core.pos.unmake_move(stm, sq);
    }

    core.state.pv_depth[0] = new_pv.len();
    core.state.pv[0][..new_pv.len()].copy_from_slice(&new_pv);
}

/// Probe for a hash move usable for ordering at the current position.
pub(crate) fn hash_move_hint(core: &SearchCore) -> Option<Square> {
    core.tt
        .probe(core.pos.hash(), MIDGAME_MODE)
        .and_then(|entry| Square::from_pos(entry.moves[0] as usize))
}
