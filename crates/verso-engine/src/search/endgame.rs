//! Endgame solver: exact and win/loss/draw alpha-beta over the remaining
//! empties.
//!
//! Scores inside the solver are plain disc differentials from the mover's
//! perspective. Transposition entries are stored through the reversed key
//! order (`ENDGAME_MODE`), keeping them apart from midgame scores in the
//! same array. Move ordering prefers the table move, then moves that
//! minimize the opponent's mobility; in the last few empties the static
//! priority sweep is used as is.

use verso_core::{Color, Square, count_all, generate_all_with};

use super::tt::{
    ENDGAME_MODE, ENDGAME_SCORE, EXACT_VALUE, LOWER_BOUND, UPPER_BOUND,
};
use super::{
    EvalResult, EvalType, Evaluation, SEARCH_ABORT, SearchCore, hash_expand_pv, update_pv,
};

/// Below this many empties the mobility ordering is skipped.
const FAST_EMPTIES: usize = 8;

/// Positions with fewer empties than this are not hashed.
const HASH_EMPTIES: usize = 5;

/// Disc differential of a finished game, with the remaining empties
/// awarded to the winner.
fn final_disc_diff(core: &SearchCore, side: Color) -> i32 {
    let my_discs = core.pos.piece_count(side);
    let opp_discs = core.pos.piece_count(side.opponent());
    if my_discs > opp_discs {
        64 - 2 * opp_discs
    } else if opp_discs > my_discs {
        2 * my_discs - 64
    } else {
        0
    }
}

/// Alpha-beta to the end of the game. Returns the exact disc differential
/// within the window, or a bound outside it.
pub fn solve(
    core: &mut SearchCore,
    ply: usize,
    side: Color,
    alpha: i32,
    beta: i32,
    void_legal: bool,
) -> i32 {
    core.state.pv_depth[ply] = ply;

    let empties = core.pos.empties();
    if empties == 0 {
        core.state.evaluations += 1;
        let black = core.pos.piece_count(Color::Black);
        let white = core.pos.piece_count(Color::White);
        return if side == Color::Black { black - white } else { white - black };
    }

    core.state.nodes += 1;
    if core.control.should_abort(core.state.nodes) {
        return SEARCH_ABORT;
    }

    let use_hash = empties >= HASH_EMPTIES;
    let mut hash_move: Option<Square> = None;
    if use_hash {
        if let Some(entry) = core.tt.probe(core.pos.hash(), ENDGAME_MODE) {
            if entry.flags & ENDGAME_SCORE != 0 {
                hash_move = Square::from_pos(entry.moves[0] as usize);
                if entry.draft as usize >= empties {
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

    let stage = core.pos.disks_played();
    let order = *core.state.order.stage(stage);
    let mut moves = generate_all_with(&core.pos, side, &order);

    if moves.is_empty() {
        if void_legal {
            core.pos.toggle_hash_side();
            let score = -solve(core, ply, side.opponent(), -beta, -alpha, false);
            core.pos.toggle_hash_side();
            return score;
        }
        core.state.evaluations += 1;
        return final_disc_diff(core, side);
    }

    // Order by opponent mobility: fewer replies first.
    if empties > FAST_EMPTIES && moves.len() > 1 {
        let slice = moves.as_mut_slice();
        let mut keys = [0i32; 60];
        for (i, &sq) in slice.iter().enumerate() {
            core.pos.make_move(side, sq, true);
            keys[i] = count_all(&core.pos, side.opponent(), core.pos.empties()) as i32;
            core.pos.unmake_move(side, sq);
        }
        // Insertion sort on the mobility keys keeps the priority order as
        // the tie-breaker.
        for i in 1..slice.len() {
            let (sq, key) = (slice[i], keys[i]);
            let mut j = i;
            while j > 0 && keys[j - 1] > key {
                slice[j] = slice[j - 1];
                keys[j] = keys[j - 1];
                j -= 1;
            }
            slice[j] = sq;
            keys[j] = key;
        }
    }
    if let Some(sq) = hash_move {
        moves.float_to_front(sq);
    }

    let original_alpha = alpha;
    let mut best_score = -64;
    let mut best_move = moves[0];
    let mut curr_alpha = alpha;

    for i in 0..moves.len() {
        let sq = moves[i];
        core.pos.make_move(side, sq, true);
        let score = -solve(core, ply + 1, side.opponent(), -beta, -curr_alpha, true);
        core.pos.unmake_move(side, sq);
        if score.abs() == SEARCH_ABORT.abs() {
            return SEARCH_ABORT;
        }

        if score > best_score || i == 0 {
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

    if use_hash {
        let bound = if best_score <= original_alpha {
            UPPER_BOUND
        } else if best_score >= beta {
            LOWER_BOUND
        } else {
            EXACT_VALUE
        };
        core.tt.store(
            core.pos.hash(),
            ENDGAME_MODE,
            best_score,
            best_move.pos() as u8,
            ENDGAME_SCORE | bound,
            empties as u8,
            0,
        );
    }

    best_score
}

/// Solve the current position. `wld` limits the result to win/loss/draw;
/// otherwise the exact differential is produced. `komi` shifts the
/// win threshold in WLD mode. The reported score is the disc differential
/// scaled by 128.
///
/// Returns the best move (`None` when `side` must pass) and the solved
/// evaluation; an interrupted solve reports the abort sentinel.
pub fn end_game(
    core: &mut SearchCore,
    side: Color,
    wld: bool,
    komi: i32,
) -> (Option<Square>, Evaluation) {
    let empties = core.pos.empties() as i32;
    core.pos.refresh_piece_counts();
    core.pos.rehash(side);

    let stage = core.pos.disks_played();
    core.state.order.inherit(stage);
    let pos_ref = &core.pos;
    core.state.order.reorder(stage, pos_ref);

    let order = *core.state.order.stage(stage);
    let moves = generate_all_with(&core.pos, side, &order);
    if moves.is_empty() {
        return (None, Evaluation::pass());
    }

    let shift = side.sign() * komi;
    let (alpha, beta) = if wld { (shift - 1, shift + 1) } else { (-64, 64) };

    core.state.clear_pv();
    let score = solve(core, 0, side, alpha, beta, true);
    if score.abs() == SEARCH_ABORT.abs() {
        core.state.root_eval = SEARCH_ABORT;
        return (Some(moves[0]), Evaluation::interrupted());
    }

    core.state.root_eval = score;
    let best = if core.state.pv_depth[0] > 0 { core.state.pv[0][0] } else { moves[0] };

    // Extend the PV from the endgame entries in the table.
    let flag_mask = ENDGAME_SCORE;
    hash_expand_pv(core, side, ENDGAME_MODE, flag_mask, 0);
    if core.state.pv_depth[0] == 0 {
        core.state.pv[0][0] = best;
        core.state.pv_depth[0] = 1;
    }

    let res = if score > shift {
        EvalResult::Won
    } else if score < shift {
        EvalResult::Lost
    } else {
        EvalResult::Drawn
    };
    let kind = if wld { EvalType::Wld } else { EvalType::Exact };
    let eval = Evaluation::new(kind, res, 128 * score, 1.0, empties, false);
    (Some(best), eval)
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use verso_core::{Color, Position};

    use super::end_game;
    use crate::eval::Coeffs;
    use crate::search::control::Control;
    use crate::search::tt::TranspositionTable;
    use crate::search::{EvalResult, EvalType, SearchCore, SearchState};

    fn core_with(dump: &str) -> (SearchCore, Color) {
        let mut rng = StdRng::seed_from_u64(1);
        let mut pos = Position::new(&mut rng);
        let side = pos.set_from_dump(dump).unwrap();
        (
            SearchCore {
                pos,
                tt: TranspositionTable::new(14),
                coeffs: Coeffs::new(),
                state: SearchState::new(),
                control: Control::new(),
                rng,
            },
            side,
        )
    }

    /// One empty square at h8; Black plays g8 capturing the h-file tail.
    /// Board: row 8 is "*******-", everything above solidly Black except
    /// a White wedge that makes g8 legal.
    fn one_empty_dump() -> String {
        let mut rows: Vec<String> = Vec::new();
        for _ in 0..7 {
            rows.push("********".into());
        }
        rows.push("******O-".into());
        format!("{} *", rows.join(""))
    }

    #[test]
    fn exact_solve_one_empty() {
        let (mut core, side) = core_with(&one_empty_dump());
        assert_eq!(side, Color::Black);
        let (best, eval) = end_game(&mut core, side, false, 0);
        let best = best.expect("black has a move");
        assert_eq!(format!("{best}"), "h8");
        assert_eq!(eval.kind, EvalType::Exact);
        assert_eq!(eval.res, EvalResult::Won);
        // 64 - 0: the lone white disc is flipped.
        assert_eq!(eval.score, 128 * 64);
    }

    #[test]
    fn wld_solve_one_empty() {
        let (mut core, side) = core_with(&one_empty_dump());
        let (_, eval) = end_game(&mut core, side, true, 0);
        assert_eq!(eval.kind, EvalType::Wld);
        assert_eq!(eval.res, EvalResult::Won);
        assert!(eval.score > 0);
    }

    #[test]
    fn pass_position_reported() {
        // White cannot move anywhere: board almost full of Black with one
        // empty corner not adjacent to anything flippable by White.
        let mut rows: Vec<String> = Vec::new();
        rows.push("-*******".into());
        for _ in 0..7 {
            rows.push("********".into());
        }
        let dump = format!("{} O", rows.join(""));
        let (mut core, side) = core_with(&dump);
        assert_eq!(side, Color::White);
        let (best, eval) = end_game(&mut core, side, false, 0);
        assert!(best.is_none());
        assert_eq!(eval.kind, EvalType::Pass);
    }

    #[test]
    fn solver_is_deterministic_and_restores_position() {
        let (mut core, side) = core_with(&one_empty_dump());
        let dump = core.pos.to_dump(side);
        let (best1, eval1) = end_game(&mut core, side, false, 0);
        assert_eq!(core.pos.to_dump(side), dump);
        let (best2, eval2) = end_game(&mut core, side, false, 0);
        assert_eq!(best1, best2);
        assert_eq!(eval1.score, eval2.score);
    }

    #[test]
    fn komi_shifts_the_draw_window() {
        // An exactly drawn two-empty position: top half Black, bottom
        // half White, empties in opposite corners... use a simple known
        // drawn endgame instead: 32-32 full board minus two mutual
        // captures is hard to craft; settle for checking that komi moves
        // the reported result on a solved winning position.
        let (mut core, side) = core_with(&one_empty_dump());
        let (_, eval) = end_game(&mut core, side, true, 66);
        // With a komi larger than any achievable margin the win becomes
        // a reported loss for Black.
        assert_eq!(eval.res, EvalResult::Lost);
    }
}
