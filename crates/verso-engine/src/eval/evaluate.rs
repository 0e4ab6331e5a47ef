//! Static evaluation from the pattern tables.
//!
//! Scores are in 1/128ths of a disc, from the side to move's perspective.
//! The tables are stored Black-oriented; with White to move each table is
//! indexed by `last - v`, which reads the value of the color-swapped
//! configuration. That works because the cell encoding Black = 0,
//! Empty = 1, White = 2 makes color swapping exactly `v -> last - v`.

use verso_core::{BOARD_CELLS, Cell, Color, Position};

use super::coeffs::Coeffs;

/// Score magnitude marking a position decided in the midgame score range;
/// terminal positions score `+-(MIDGAME_WIN + disc differential)`.
pub const MIDGAME_WIN: i32 = 29000;

const AFILE2X: [[usize; 10]; 4] = [
    [72, 22, 81, 71, 61, 51, 41, 31, 21, 11],
    [77, 27, 88, 78, 68, 58, 48, 38, 28, 18],
    [27, 22, 18, 17, 16, 15, 14, 13, 12, 11],
    [77, 72, 88, 87, 86, 85, 84, 83, 82, 81],
];

const BFILE: [[usize; 8]; 4] = [
    [82, 72, 62, 52, 42, 32, 22, 12],
    [87, 77, 67, 57, 47, 37, 27, 17],
    [28, 27, 26, 25, 24, 23, 22, 21],
    [78, 77, 76, 75, 74, 73, 72, 71],
];

const CFILE: [[usize; 8]; 4] = [
    [83, 73, 63, 53, 43, 33, 23, 13],
    [86, 76, 66, 56, 46, 36, 26, 16],
    [38, 37, 36, 35, 34, 33, 32, 31],
    [68, 67, 66, 65, 64, 63, 62, 61],
];

const DFILE: [[usize; 8]; 4] = [
    [84, 74, 64, 54, 44, 34, 24, 14],
    [85, 75, 65, 55, 45, 35, 25, 15],
    [48, 47, 46, 45, 44, 43, 42, 41],
    [58, 57, 56, 55, 54, 53, 52, 51],
];

const DIAG8: [[usize; 8]; 2] = [
    [88, 77, 66, 55, 44, 33, 22, 11],
    [81, 72, 63, 54, 45, 36, 27, 18],
];

const DIAG7: [[usize; 7]; 4] = [
    [78, 67, 56, 45, 34, 23, 12],
    [87, 76, 65, 54, 43, 32, 21],
    [71, 62, 53, 44, 35, 26, 17],
    [82, 73, 64, 55, 46, 37, 28],
];

const DIAG6: [[usize; 6]; 4] = [
    [68, 57, 46, 35, 24, 13],
    [86, 75, 64, 53, 42, 31],
    [61, 52, 43, 34, 25, 16],
    [83, 74, 65, 56, 47, 38],
];

const DIAG5: [[usize; 5]; 4] = [
    [58, 47, 36, 25, 14],
    [85, 74, 63, 52, 41],
    [51, 42, 33, 24, 15],
    [84, 75, 66, 57, 48],
];

const DIAG4: [[usize; 4]; 4] = [
    [48, 37, 26, 15],
    [84, 73, 62, 51],
    [41, 32, 23, 14],
    [85, 76, 67, 58],
];

const CORNER33: [[usize; 9]; 4] = [
    [33, 32, 31, 23, 22, 21, 13, 12, 11],
    [63, 62, 61, 73, 72, 71, 83, 82, 81],
    [36, 37, 38, 26, 27, 28, 16, 17, 18],
    [66, 67, 68, 76, 77, 78, 86, 87, 88],
];

const CORNER52: [[usize; 10]; 8] = [
    [25, 24, 23, 22, 21, 15, 14, 13, 12, 11],
    [75, 74, 73, 72, 71, 85, 84, 83, 82, 81],
    [24, 25, 26, 27, 28, 14, 15, 16, 17, 18],
    [74, 75, 76, 77, 78, 84, 85, 86, 87, 88],
    [52, 42, 32, 22, 12, 51, 41, 31, 21, 11],
    [57, 47, 37, 27, 17, 58, 48, 38, 28, 18],
    [42, 52, 62, 72, 82, 41, 51, 61, 71, 81],
    [47, 57, 67, 77, 87, 48, 58, 68, 78, 88],
];

/// Pack the listed cells into a base-3 index, most significant first.
#[inline]
fn packed(cells: &[Cell; BOARD_CELLS], squares: &[usize]) -> usize {
    squares.iter().fold(0, |acc, &pos| 3 * acc + cells[pos].digit())
}

/// Table lookup with the White-to-move mirror trick.
#[inline]
fn lookup(table: &[i16], v: usize, mirrored: bool) -> i32 {
    if mirrored {
        table[table.len() - 1 - v] as i32
    } else {
        table[v] as i32
    }
}

/// Static evaluation of `pos` with `side_to_move` to play, in 1/128ths of
/// a disc from the mover's perspective.
pub fn pattern_evaluation(pos: &Position, side_to_move: Color, coeffs: &mut Coeffs) -> i32 {
    // A wiped-out player has lost by the maximum margin.
    if pos.piece_count(Color::Black) == 0 {
        return if side_to_move == Color::Black {
            -(MIDGAME_WIN + 64)
        } else {
            MIDGAME_WIN + 64
        };
    }
    if pos.piece_count(Color::White) == 0 {
        return if side_to_move == Color::Black {
            MIDGAME_WIN + 64
        } else {
            -(MIDGAME_WIN + 64)
        };
    }

    let disks_played = pos.disks_played();
    let phase = coeffs.phase(disks_played);
    let mirrored = side_to_move == Color::White;

    let mut score = {
        let _ = coeffs.tables(phase);
        coeffs.parity_constant(phase, disks_played) as i32
    };
    let tables = coeffs.tables(phase);
    let cells = pos.cells();

    for squares in &AFILE2X {
        score += lookup(&tables.afile2x, packed(cells, squares), mirrored);
    }
    for squares in &BFILE {
        score += lookup(&tables.bfile, packed(cells, squares), mirrored);
    }
    for squares in &CFILE {
        score += lookup(&tables.cfile, packed(cells, squares), mirrored);
    }
    for squares in &DFILE {
        score += lookup(&tables.dfile, packed(cells, squares), mirrored);
    }
    for squares in &DIAG8 {
        score += lookup(&tables.diag8, packed(cells, squares), mirrored);
    }
    for squares in &DIAG7 {
        score += lookup(&tables.diag7, packed(cells, squares), mirrored);
    }
    for squares in &DIAG6 {
        score += lookup(&tables.diag6, packed(cells, squares), mirrored);
    }
    for squares in &DIAG5 {
        score += lookup(&tables.diag5, packed(cells, squares), mirrored);
    }
    for squares in &DIAG4 {
        score += lookup(&tables.diag4, packed(cells, squares), mirrored);
    }
    for squares in &CORNER33 {
        score += lookup(&tables.corner33, packed(cells, squares), mirrored);
    }
    for squares in &CORNER52 {
        score += lookup(&tables.corner52, packed(cells, squares), mirrored);
    }

    score
}

/// Evaluation of a finished game (neither side can move): the disc
/// differential with all remaining empties awarded to the winner, pushed
/// past [`MIDGAME_WIN`] so finished games dominate any heuristic score.
pub fn terminal_evaluation(pos: &Position, side_to_move: Color) -> i32 {
    let my_discs = pos.piece_count(side_to_move);
    let opp_discs = pos.piece_count(side_to_move.opponent());

    let disc_diff = if my_discs > opp_discs {
        64 - 2 * opp_discs
    } else if opp_discs > my_discs {
        2 * my_discs - 64
    } else {
        0
    };

    if disc_diff > 0 {
        MIDGAME_WIN + disc_diff
    } else if disc_diff == 0 {
        0
    } else {
        -MIDGAME_WIN + disc_diff
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use verso_core::{Cell, Color, Position};

    use super::{MIDGAME_WIN, pattern_evaluation, terminal_evaluation};
    use crate::eval::Coeffs;

    fn position() -> Position {
        let mut rng = StdRng::seed_from_u64(1);
        Position::new(&mut rng)
    }

    /// Swap the colors of every disc on the board.
    fn color_swapped_dump(pos: &Position, side: Color) -> String {
        pos.to_dump(side)
            .chars()
            .map(|c| match c {
                '*' => 'O',
                'O' => '*',
                other => other,
            })
            .collect()
    }

    #[test]
    fn color_symmetry() {
        let mut coeffs = Coeffs::new();
        let mut pos = position();
        let mut side = Color::Black;
        for mv in ["d3", "c5", "f6", "f5", "e6"] {
            pos.make_move(side, mv.parse().unwrap(), true);
            side = side.opponent();
        }

        // Side-to-move perspective: the mover's score is unchanged when
        // both the colors and the side to move are swapped, so the
        // Black-normalized reports of the two positions cancel.
        let original = pattern_evaluation(&pos, side, &mut coeffs);
        let swapped_dump = color_swapped_dump(&pos, side.opponent());
        let mut swapped = position();
        let swapped_side = swapped.set_from_dump(&swapped_dump).unwrap();
        assert_eq!(swapped_side, side.opponent());
        let mirrored = pattern_evaluation(&swapped, swapped_side, &mut coeffs);
        assert_eq!(original, mirrored);
        // Black-normalized reports of the two positions cancel.
        assert_eq!(side.sign() * original + swapped_side.sign() * mirrored, 0);
    }

    #[test]
    fn material_eval_counts_discs() {
        let mut coeffs = Coeffs::new();
        // A full board of Black except the White corner region scores
        // close to the disc differential in 1/128 units.
        let mut dump = String::new();
        for i in 0..64 {
            dump.push(if i < 8 { 'O' } else { '*' });
        }
        dump.push_str(" *");
        let mut pos = position();
        let side = pos.set_from_dump(&dump).unwrap();
        let score = pattern_evaluation(&pos, side, &mut coeffs);
        // 56 black vs 8 white: differential +48 discs = +6144.
        assert!((score - 48 * 128).abs() <= 46, "score {score}");
    }

    #[test]
    fn wipeout_scores() {
        let mut coeffs = Coeffs::new();
        let mut dump = String::new();
        for _ in 0..10 {
            dump.push('*');
        }
        for _ in 10..64 {
            dump.push('-');
        }
        dump.push_str(" *");
        let mut pos = position();
        let side = pos.set_from_dump(&dump).unwrap();
        assert_eq!(pattern_evaluation(&pos, side, &mut coeffs), MIDGAME_WIN + 64);
        pos.rehash(Color::White);
        assert_eq!(
            pattern_evaluation(&pos, Color::White, &mut coeffs),
            -(MIDGAME_WIN + 64)
        );
    }

    #[test]
    fn terminal_evaluation_corrects_for_empties() {
        let mut pos = position();
        // 40 black, 24 white, no empties is a +16 win; with empties left
        // the winner collects them: 10 black, 6 white, 48 empty is +52.
        let mut dump = String::new();
        for i in 0..64 {
            dump.push(if i < 10 {
                '*'
            } else if i < 16 {
                'O'
            } else {
                '-'
            });
        }
        dump.push_str(" *");
        pos.set_from_dump(&dump).unwrap();
        assert_eq!(terminal_evaluation(&pos, Color::Black), MIDGAME_WIN + (64 - 2 * 6));
        assert_eq!(terminal_evaluation(&pos, Color::White), -MIDGAME_WIN + (2 * 6 - 64));
    }

    #[test]
    fn empty_cells_do_not_count() {
        let mut coeffs = Coeffs::new();
        let pos = position();
        assert_eq!(pos.cell(11), Cell::Empty);
        // The starting position is symmetric: material eval is zero.
        assert_eq!(pattern_evaluation(&pos, Color::Black, &mut coeffs), 0);
    }
}
