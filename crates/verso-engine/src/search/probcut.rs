//! ProbCut parameters for selective midgame cutoffs.
//!
//! A deep search result correlates strongly with a shallow search of the
//! same subtree. When the shallow result clears the window by more than
//! the model's error margin, the deep search is declared resolved at the
//! current selectivity level and skipped.

/// Minimum depth at which selective cuts are attempted.
pub const MIN_MPC_DEPTH: i32 = 9;

/// Depth reduction of the verification search.
const DEPTH_REDUCTION: i32 = 4;

/// Cut percentile: how many standard deviations the shallow result must
/// clear the window by.
const CUT_THRESHOLD: f64 = 1.3;

/// One selective cut attempt: the shallow depth to search and the margin
/// (in 1/128ths of a disc) the result must clear.
#[derive(Debug, Clone, Copy)]
pub struct CutPair {
    pub shallow_depth: i32,
    pub margin: i32,
}

/// The cut parameters for a deep search of `depth` plies with `stage`
/// discs played. The error model is linear in the game stage: shallow and
/// deep searches drift apart as the board fills and scores grow.
pub fn cut_params(depth: i32, stage: usize) -> CutPair {
    debug_assert!(depth >= MIN_MPC_DEPTH);
    let sigma = 128.0 * (2.5 + 0.035 * stage as f64);
    CutPair {
        shallow_depth: (depth - DEPTH_REDUCTION).max(1),
        margin: (CUT_THRESHOLD * sigma) as i32,
    }
}

#[cfg(test)]
mod tests {
    use super::{MIN_MPC_DEPTH, cut_params};

    #[test]
    fn shallow_depth_keeps_parity() {
        for depth in MIN_MPC_DEPTH..20 {
            let cut = cut_params(depth, 20);
            assert_eq!((depth - cut.shallow_depth) % 2, 0, "depth {depth}");
            assert!(cut.shallow_depth >= 1);
        }
    }

    #[test]
    fn margin_grows_with_stage() {
        let early = cut_params(10, 10).margin;
        let late = cut_params(10, 50).margin;
        assert!(late > early);
        // Always at least a couple of discs wide.
        assert!(early >= 2 * 128);
    }
}
