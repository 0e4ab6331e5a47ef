//! Midgame search: negascout with transposition-table ordering, a shallow
//! ordering pass at deep nodes, and ProbCut-style selective cutoffs.
//!
//! Scores are in 1/128ths of a disc from the mover's perspective. A pass
//! costs no depth; two consecutive passes end the game and fall through to
//! the terminal evaluation.

use tracing::debug;

use verso_core::{Color, MoveList, Square, generate_all_with};

use super::probcut::{MIN_MPC_DEPTH, cut_params};
use super::tt::{
    EXACT_VALUE, LOWER_BOUND, MIDGAME_MODE, MIDGAME_SCORE, SELECTIVE, UPPER_BOUND,
};
use super::{
    EvalResult, EvalType, Evaluation, INFINITE_EVAL, SEARCH_ABORT, SearchCore, hash_move_hint,
    update_pv,
};
use crate::eval::{MIDGAME_WIN, pattern_evaluation, terminal_evaluation};

/// Aspiration half-window around the previous iteration's score.
const ASPIRATION_DELTA: i32 = 3 * 128;

/// Internal nodes searched at least this deep pre-sort their moves with a
/// shallow search instead of relying on the static priority order alone.
const DEPTH_FOR_ORDERING: i32 = 8;

/// Depth of the ordering pre-search.
const ORDERING_DEPTH: i32 = 2;

/// Selectivity level attached to results obtained under ProbCut.
pub const DEFAULT_SELECTIVITY: u8 = 1;

/// Recursive negascout. Returns the score for `side`, or the abort
/// sentinel (possibly sign-flipped by a negation level) if the search was
/// interrupted.
pub fn tree_search(
    core: &mut SearchCore,
    ply: usize,
    depth: i32,
    side: Color,
    alpha: i32,
    beta: i32,
    allow_hash: bool,
    allow_mpc: bool,
    void_legal: bool,
) -> i32 {
    core.state.pv_depth[ply] = ply;

    if depth == 0 {
        core.state.evaluations += 1;
        return pattern_evaluation(&core.pos, side, &mut core.coeffs);
    }

    core.state.nodes += 1;
    if core.control.should_abort(core.state.nodes) {
        return SEARCH_ABORT;
    }

    let original_alpha = alpha;
    let stage = core.pos.disks_played();

    // Transposition-table cutoff and move hint.
    let mut hash_move: Option<Square> = None;
    if allow_hash {
        if let Some(entry) = core.tt.probe(core.pos.hash(), MIDGAME_MODE) {
            if entry.flags & MIDGAME_SCORE != 0 {
                hash_move = Square::from_pos(entry.moves[0] as usize);
                let selectivity_ok = entry.selectivity == 0 || allow_mpc;
                if entry.draft as i32 >= depth && selectivity_ok {
                    if entry.flags & EXACT_VALUE != 0 {
                        if let Some(sq) = hash_move {
                            core.state.pv[ply][ply] = sq;
                            core.state.pv_depth[ply] = ply + 1;
                        }
                        return entry.eval;
                    }
                    if entry.flags & LOWER_BOUND != 0 && entry.eval >= beta {
                        return entry.eval;
                    }
                    if entry.flags & UPPER_BOUND != 0 && entry.eval <= alpha {
                        return entry.eval;
                    }
                }
            }
        }
    }

    // Selective cutoffs: verify the window with a shallow search and trust
    // it when the margin is cleared.
    if allow_mpc && depth >= MIN_MPC_DEPTH {
        let cut = cut_params(depth, stage);
        let hint = hash_move.map_or(0, |sq| sq.pos() as u8);
        if beta < MIDGAME_WIN {
            let bound = beta + cut.margin;
            let shallow = tree_search(
                core, ply, cut.shallow_depth, side, bound - 1, bound, allow_hash, false,
                void_legal,
            );
            if shallow.abs() == SEARCH_ABORT.abs() {
                return SEARCH_ABORT;
            }
            if shallow >= bound {
                if allow_hash {
                    core.tt.store(
                        core.pos.hash(),
                        MIDGAME_MODE,
                        beta,
                        hint,
                        MIDGAME_SCORE | LOWER_BOUND | SELECTIVE,
                        depth as u8,
                        DEFAULT_SELECTIVITY,
                    );
                }
                return beta;
            }
        }
        if alpha > -MIDGAME_WIN {
            let bound = alpha - cut.margin;
            let shallow = tree_search(
                core, ply, cut.shallow_depth, side, bound, bound + 1, allow_hash, false,
                void_legal,
            );
            if shallow.abs() == SEARCH_ABORT.abs() {
                return SEARCH_ABORT;
            }
            if shallow <= bound {
                if allow_hash {
                    core.tt.store(
                        core.pos.hash(),
                        MIDGAME_MODE,
                        alpha,
                        hint,
                        MIDGAME_SCORE | UPPER_BOUND | SELECTIVE,
                        depth as u8,
                        DEFAULT_SELECTIVITY,
                    );
                }
                return alpha;
            }
        }
    }

    let order = *core.state.order.stage(stage);
    let mut moves = generate_all_with(&core.pos, side, &order);

    if moves.is_empty() {
        if void_legal {
            core.pos.toggle_hash_side();
            let score = -tree_search(
                core,
                ply,
                depth,
                side.opponent(),
                -beta,
                -alpha,
                allow_hash,
                allow_mpc,
                false,
            );
            core.pos.toggle_hash_side();
            return score;
        }
        core.state.evaluations += 1;
        return terminal_evaluation(&core.pos, side);
    }

    if let Some(sq) = hash_move {
        moves.float_to_front(sq);
    }

    if depth >= DEPTH_FOR_ORDERING && moves.len() > 1 {
        for i in 0..moves.len() {
            let sq = moves[i];
            core.pos.make_move(side, sq, true);
            let shallow = -tree_search(
                core,
                ply + 1,
                ORDERING_DEPTH,
                side.opponent(),
                -INFINITE_EVAL,
                INFINITE_EVAL,
                allow_hash,
                false,
                true,
            );
            core.pos.unmake_move(side, sq);
            if shallow.abs() == SEARCH_ABORT.abs() {
                return SEARCH_ABORT;
            }
            core.state.evals[stage][sq.pos()] = shallow;
        }
        core.state.sort_moves(&mut moves, stage);
        if let Some(sq) = hash_move {
            moves.float_to_front(sq);
        }
    }

    let mut best_score = -INFINITE_EVAL;
    let mut best_move = moves[0];
    let mut curr_alpha = alpha;

    for i in 0..moves.len() {
        let sq = moves[i];
        core.pos.make_move(side, sq, true);
        let mut score;
        if i == 0 {
            score = -tree_search(
                core,
                ply + 1,
                depth - 1,
                side.opponent(),
                -beta,
                -curr_alpha,
                allow_hash,
                allow_mpc,
                true,
            );
        } else {
            score = -tree_search(
                core,
                ply + 1,
                depth - 1,
                side.opponent(),
                -(curr_alpha + 1),
                -curr_alpha,
                allow_hash,
                allow_mpc,
                true,
            );
            if score.abs() != SEARCH_ABORT.abs() && score > curr_alpha && score < beta {
                score = -tree_search(
                    core,
                    ply + 1,
                    depth - 1,
                    side.opponent(),
                    -beta,
                    -curr_alpha,
                    allow_hash,
                    allow_mpc,
                    true,
                );
            }
        }
        core.pos.unmake_move(side, sq);
        if score.abs() == SEARCH_ABORT.abs() {
            return SEARCH_ABORT;
        }

        if score > best_score {
            best_score = score;
            best_move = sq;
            if score > curr_alpha {
                curr_alpha = score;
                update_pv(&mut core.state, ply, sq);
            }
        }
        if best_score >= beta {
            break;
        }
    }

    if allow_hash {
        let bound = if best_score <= original_alpha {
            UPPER_BOUND
        } else if best_score >= beta {
            LOWER_BOUND
        } else {
            EXACT_VALUE
        };
        let selective = allow_mpc && depth >= MIN_MPC_DEPTH;
        let flags = MIDGAME_SCORE | bound | if selective { SELECTIVE } else { 0 };
        let selectivity = if selective { DEFAULT_SELECTIVITY } else { 0 };
        core.tt.store(
            core.pos.hash(),
            MIDGAME_MODE,
            best_score,
            best_move.pos() as u8,
            flags,
            depth as u8,
            selectivity,
        );
    }

    best_score
}

/// Principal-variation search over the root move list, recording every
/// move's score for inter-iteration sorting.
fn root_search(
    core: &mut SearchCore,
    depth: i32,
    side: Color,
    alpha: i32,
    beta: i32,
    allow_mpc: bool,
    moves: &MoveList,
) -> Result<(i32, Square), ()> {
    let stage = core.pos.disks_played();
    let mut best_score = -INFINITE_EVAL;
    let mut best_move = moves[0];
    let mut curr_alpha = alpha;

    for i in 0..moves.len() {
        let sq = moves[i];
        core.pos.make_move(side, sq, true);
        let mut score;
        if i == 0 {
            score = -tree_search(
                core, 1, depth - 1, side.opponent(), -beta, -curr_alpha, true, allow_mpc, true,
            );
        } else {
            score = -tree_search(
                core,
                1,
                depth - 1,
                side.opponent(),
                -(curr_alpha + 1),
                -curr_alpha,
                true,
                allow_mpc,
                true,
            );
            if score.abs() != SEARCH_ABORT.abs() && score > curr_alpha && score < beta {
                score = -tree_search(
                    core, 1, depth - 1, side.opponent(), -beta, -curr_alpha, true, allow_mpc,
                    true,
                );
            }
        }
        core.pos.unmake_move(side, sq);
        if score.abs() == SEARCH_ABORT.abs() {
            return Err(());
        }

        core.state.evals[stage][sq.pos()] = score;
        if score > best_score {
            best_score = score;
            best_move = sq;
            if score > curr_alpha {
                curr_alpha = score;
                update_pv(&mut core.state, 0, sq);
            }
        }
        if best_score >= beta {
            break;
        }
    }

    if core.state.pv_depth[0] == 0 {
        core.state.pv[0][0] = best_move;
        core.state.pv_depth[0] = 1;
    }
    Ok((best_score, best_move))
}

/// One fixed-depth midgame search of the current position, with an
/// aspiration window around the previous root score. The caller drives
/// iterative deepening by calling this with increasing depths.
///
/// Returns the chosen move and its evaluation; an interrupted search is
/// reported with the abort sentinel score and the PV left untouched.
pub fn middle_game(core: &mut SearchCore, side: Color, depth: i32) -> (Square, Evaluation) {
    let stage = core.pos.disks_played();
    core.state.order.inherit(stage);
    let pos_ref = &core.pos;
    core.state.order.reorder(stage, pos_ref);

    let order = *core.state.order.stage(stage);
    let mut moves = generate_all_with(&core.pos, side, &order);
    debug_assert!(!moves.is_empty(), "middle_game requires a legal move");

    core.state.sort_moves(&mut moves, stage);
    if let Some(sq) = hash_move_hint(core) {
        moves.float_to_front(sq);
    }

    let allow_mpc = depth >= MIN_MPC_DEPTH;
    let saved_pv = core.state.store_pv();
    let prev_score = core.state.root_eval;

    let use_aspiration = depth > 2 && prev_score.abs() < MIDGAME_WIN;
    let (mut alpha, mut beta) = if use_aspiration {
        (prev_score - ASPIRATION_DELTA, prev_score + ASPIRATION_DELTA)
    } else {
        (-INFINITE_EVAL, INFINITE_EVAL)
    };

    loop {
        core.state.clear_pv();
        match root_search(core, depth, side, alpha, beta, allow_mpc, &moves) {
            Err(()) => {
                core.state.restore_pv(&saved_pv);
                let eval = Evaluation::new(
                    EvalType::Midgame,
                    EvalResult::Unsolved,
                    SEARCH_ABORT,
                    0.0,
                    depth,
                    false,
                );
                return (moves[0], eval);
            }
            Ok((score, best)) => {
                if score <= alpha && alpha > -INFINITE_EVAL {
                    debug!(depth, score, "aspiration fail low");
                    alpha = -INFINITE_EVAL;
                    continue;
                }
                if score >= beta && beta < INFINITE_EVAL {
                    debug!(depth, score, "aspiration fail high");
                    beta = INFINITE_EVAL;
                    moves.float_to_front(best);
                    continue;
                }
                core.state.root_eval = score;
                let eval = Evaluation::new(
                    EvalType::Midgame,
                    EvalResult::Unsolved,
                    score,
                    if allow_mpc { 0.9 } else { 1.0 },
                    depth,
                    false,
                );
                return (best, eval);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use verso_core::{Color, Position};

    use super::{middle_game, tree_search};
    use crate::eval::Coeffs;
    use crate::search::control::Control;
    use crate::search::tt::TranspositionTable;
    use crate::search::{INFINITE_EVAL, SEARCH_ABORT, SearchCore, SearchState};

    fn core() -> SearchCore {
        let mut rng = StdRng::seed_from_u64(1);
        let pos = Position::new(&mut rng);
        SearchCore {
            pos,
            tt: TranspositionTable::new(14),
            coeffs: Coeffs::new(),
            state: SearchState::new(),
            control: Control::new(),
            rng,
        }
    }

    #[test]
    fn depth_one_picks_greediest_move() {
        let mut core = core();
        let (best, eval) = middle_game(&mut core, Color::Black, 1);
        // All four opening moves flip exactly one disc; the priority
        // order breaks the tie in favour of d3.
        assert_eq!(format!("{best}"), "d3");
        assert_eq!(eval.search_depth, 1);
        assert!(core.pos.is_legal(best, Color::Black));
    }

    #[test]
    fn deeper_search_is_deterministic() {
        let mut core1 = core();
        let mut core2 = core();
        let (best1, eval1) = middle_game(&mut core1, Color::Black, 4);
        let (best2, eval2) = middle_game(&mut core2, Color::Black, 4);
        assert_eq!(best1, best2);
        assert_eq!(eval1.score, eval2.score);
    }

    #[test]
    fn search_leaves_position_unchanged() {
        let mut core = core();
        let dump = core.pos.to_dump(Color::Black);
        let hash = core.pos.hash();
        let _ = middle_game(&mut core, Color::Black, 5);
        assert_eq!(core.pos.to_dump(Color::Black), dump);
        assert_eq!(core.pos.hash(), hash);
    }

    #[test]
    fn pv_is_playable() {
        let mut core = core();
        let _ = middle_game(&mut core, Color::Black, 5);
        let pv: Vec<_> = core.state.root_pv().to_vec();
        assert!(!pv.is_empty());
        let mut side = Color::Black;
        let mut made = Vec::new();
        for sq in &pv {
            assert!(core.pos.make_move(side, *sq, true) > 0, "unplayable pv move {sq}");
            made.push((side, *sq));
            side = side.opponent();
        }
        for (stm, sq) in made.into_iter().rev() {
            core.pos.unmake_move(stm, sq);
        }
    }

    #[test]
    fn force_return_aborts() {
        let mut core = core();
        core.control.set_force_return();
        let score = tree_search(
            &mut core,
            1,
            6,
            Color::Black,
            -INFINITE_EVAL,
            INFINITE_EVAL,
            true,
            false,
            true,
        );
        assert_eq!(score.abs(), SEARCH_ABORT.abs());
        let (_, eval) = middle_game(&mut core, Color::Black, 6);
        assert!(eval.is_aborted());
    }

    #[test]
    fn tt_accelerates_repeated_search() {
        let mut core = core();
        let _ = middle_game(&mut core, Color::Black, 5);
        let first_nodes = core.state.nodes;
        core.state.nodes = 0;
        let _ = middle_game(&mut core, Color::Black, 5);
        assert!(core.state.nodes <= first_nodes);
    }
}
