//! Board symmetries and the orientation-canonical position hash.
//!
//! A book node is addressed by the minimum, over the eight dihedral
//! rotations of the board, of a 64-bit hash built from per-line tables.
//! The index of the minimizing rotation is returned alongside so that
//! moves can be mapped between the actual board and the stored node.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use verso_core::{FLIP8, Position, line_patterns};

/// Number of board symmetries.
pub const SYMMETRIES: usize = 8;

/// The eight symmetry maps and their inverses over raw board positions.
///
/// The map order must match the rotation order used by
/// [`LineHash::canonical_hash`]; maps 5 and 7 are inverses of each other,
/// not of themselves, and their `inverse` entries are deliberately crossed.
pub struct SymmetryMaps {
    map: [[usize; 100]; SYMMETRIES],
    inverse: [[usize; 100]; SYMMETRIES],
}

impl SymmetryMaps {
    pub fn new() -> SymmetryMaps {
        let mut identity = [0usize; 100];
        let mut flip_col = [0usize; 100];
        let mut rot180 = [0usize; 100];
        let mut flip_row = [0usize; 100];
        let mut transpose = [0usize; 100];
        let mut rot90 = [0usize; 100];
        let mut anti_transpose = [0usize; 100];
        let mut rot270 = [0usize; 100];

        for row in 1..=8usize {
            for col in 1..=8usize {
                let pos = 10 * row + col;
                identity[pos] = pos;
                flip_col[pos] = 10 * row + (9 - col);
                rot180[pos] = 10 * (9 - row) + (9 - col);
                flip_row[pos] = 10 * (9 - row) + col;
                transpose[pos] = 10 * col + row;
                rot90[pos] = 10 * col + (9 - row);
                anti_transpose[pos] = 10 * (9 - col) + (9 - row);
                rot270[pos] = 10 * (9 - col) + row;
            }
        }

        let map = [
            identity, flip_col, rot180, flip_row, transpose, rot90, anti_transpose, rot270,
        ];
        let inverse = [
            identity,
            flip_col,
            rot180,
            flip_row,
            transpose,
            rot270,
            anti_transpose,
            rot90,
        ];

        let maps = SymmetryMaps { map, inverse };

        #[cfg(debug_assertions)]
        for i in 0..SYMMETRIES {
            for row in 1..=8usize {
                for col in 1..=8usize {
                    let pos = 10 * row + col;
                    debug_assert_eq!(
                        maps.inverse[i][maps.map[i][pos]],
                        pos,
                        "map {i} is not inverted by its inverse at {pos}"
                    );
                }
            }
        }

        maps
    }

    /// Map a raw position into the canonical orientation.
    #[inline]
    pub fn map(&self, orientation: usize, pos: usize) -> usize {
        self.map[orientation][pos]
    }

    /// Map a canonical-orientation position back onto the actual board.
    #[inline]
    pub fn inverse(&self, orientation: usize, pos: usize) -> usize {
        self.inverse[orientation][pos]
    }
}

impl Default for SymmetryMaps {
    fn default() -> SymmetryMaps {
        SymmetryMaps::new()
    }
}

/// Per-(word, line, configuration) hash contributions. The tables are
/// seeded with a fixed value so book files remain portable across runs.
pub struct LineHash {
    table: Box<[[[i32; 6561]; 8]; 2]>,
}

impl LineHash {
    pub fn new() -> LineHash {
        let mut rng = StdRng::seed_from_u64(0);
        let mut table: Box<[[[i32; 6561]; 8]; 2]> =
            vec![[[0i32; 6561]; 8]; 2].try_into().expect("exact length");
        for word in table.iter_mut() {
            for line in word.iter_mut() {
                for slot in line.iter_mut() {
                    let coin = (rng.next_u32() >> 1) % 2;
                    let value = (rng.next_u32() >> 1) as i32;
                    *slot = if coin == 1 { value } else { -value };
                }
            }
        }
        LineHash { table }
    }

    /// The canonical hash of a position: the lexicographically smallest
    /// `(h1, h2)` over all eight rotations, plus the index of the rotation
    /// that produced it.
    pub fn canonical_hash(&self, pos: &Position) -> (i32, i32, usize) {
        let patterns = line_patterns(pos.cells());
        let rows = patterns.rows;
        let cols = patterns.cols;

        let mut out = [[0i32; 2]; SYMMETRIES];
        for i in 0..8 {
            let row = rows[i];
            let row_rev = rows[7 - i];
            let col = cols[i];
            let col_rev = cols[7 - i];
            for word in 0..2 {
                let t = &self.table[word][i];
                out[0][word] ^= t[row];
                out[1][word] ^= t[FLIP8[row] as usize];
                out[2][word] ^= t[FLIP8[row_rev] as usize];
                out[3][word] ^= t[row_rev];
                out[4][word] ^= t[col];
                out[5][word] ^= t[FLIP8[col] as usize];
                out[6][word] ^= t[FLIP8[col_rev] as usize];
                out[7][word] ^= t[col_rev];
            }
        }

        let mut min_map = 0;
        let mut min_hash = out[0];
        for (i, candidate) in out.iter().enumerate().skip(1) {
            if candidate[0] < min_hash[0]
                || (candidate[0] == min_hash[0] && candidate[1] < min_hash[1])
            {
                min_map = i;
                min_hash = *candidate;
            }
        }

        (min_hash[0].wrapping_abs(), min_hash[1].wrapping_abs(), min_map)
    }
}

impl Default for LineHash {
    fn default() -> LineHash {
        LineHash::new()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use verso_core::{Color, Position, Square};

    use super::{LineHash, SymmetryMaps};

    fn position() -> Position {
        let mut rng = StdRng::seed_from_u64(1);
        Position::new(&mut rng)
    }

    #[test]
    fn maps_invert() {
        let maps = SymmetryMaps::new();
        for orientation in 0..8 {
            for row in 1..=8usize {
                for col in 1..=8usize {
                    let pos = 10 * row + col;
                    assert_eq!(maps.inverse(orientation, maps.map(orientation, pos)), pos);
                }
            }
        }
    }

    #[test]
    fn crossed_maps_five_and_seven() {
        let maps = SymmetryMaps::new();
        // Maps 5 and 7 are the two quarter turns: each one's inverse is
        // the other's forward direction, unlike the six self-inverse maps.
        for row in 1..=8usize {
            for col in 1..=8usize {
                let pos = 10 * row + col;
                assert_eq!(maps.inverse(5, pos), maps.map(7, pos));
                assert_eq!(maps.inverse(7, pos), maps.map(5, pos));
                for self_inverse in [0, 1, 2, 3, 4, 6] {
                    assert_eq!(
                        maps.inverse(self_inverse, pos),
                        maps.map(self_inverse, pos)
                    );
                }
            }
        }
    }

    #[test]
    fn canonical_hash_is_rotation_invariant() {
        let hash = LineHash::new();
        let mut pos = position();
        pos.make_move(Color::Black, "d3".parse().unwrap(), true);
        let (h1, h2, _) = hash.canonical_hash(&pos);

        // The same opening through the transposed rotation: c4.
        let mut other = position();
        other.make_move(Color::Black, "c4".parse().unwrap(), true);
        let (o1, o2, _) = hash.canonical_hash(&other);
        assert_eq!((h1, h2), (o1, o2));

        // All four first moves are symmetric.
        for mv in ["f5", "e6"] {
            let mut rotated = position();
            rotated.make_move(Color::Black, mv.parse::<Square>().unwrap(), true);
            let (r1, r2, _) = hash.canonical_hash(&rotated);
            assert_eq!((h1, h2), (r1, r2), "rotation via {mv}");
        }
    }

    #[test]
    fn orientations_differ_between_reflections() {
        let hash = LineHash::new();
        let maps = SymmetryMaps::new();
        let mut pos = position();
        pos.make_move(Color::Black, "d3".parse().unwrap(), true);
        let (_, _, orientation) = hash.canonical_hash(&pos);

        let mut mirrored = position();
        mirrored.make_move(Color::Black, "c4".parse().unwrap(), true);
        let (_, _, mirror_orientation) = hash.canonical_hash(&mirrored);
        assert_ne!(orientation, mirror_orientation);

        // Mapping d3 through its orientation and back is the identity.
        let d3: Square = "d3".parse().unwrap();
        let mapped = maps.map(orientation, d3.pos());
        assert_eq!(maps.inverse(orientation, mapped), d3.pos());
    }

    #[test]
    fn line_hash_is_reproducible() {
        let a = LineHash::new();
        let b = LineHash::new();
        let pos = position();
        assert_eq!(a.canonical_hash(&pos), b.canonical_hash(&pos));
    }
}
