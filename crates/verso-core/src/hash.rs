//! Randomized two-word hash masks for position keys.
//!
//! The position key is a pair of 32-bit values XORed together from
//! per-(color, square) masks plus a side-to-move mask. The masks are drawn
//! from the seeded PRNG under a "closeness" constraint that keeps every
//! pair of masks (and every mask against zero) at least a third of the
//! bits apart, which empirically reduces key collisions.

use std::ops::{BitXor, BitXorAssign};

use rand::RngCore;
use rand::rngs::StdRng;

use crate::color::{Cell, Color};
use crate::square::BOARD_CELLS;

/// A 64-bit position key held as two 32-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct HashPair {
    pub h1: u32,
    pub h2: u32,
}

impl HashPair {
    pub const ZERO: HashPair = HashPair { h1: 0, h2: 0 };

    pub const fn new(h1: u32, h2: u32) -> HashPair {
        HashPair { h1, h2 }
    }
}

impl BitXor for HashPair {
    type Output = HashPair;

    #[inline]
    fn bitxor(self, rhs: HashPair) -> HashPair {
        HashPair { h1: self.h1 ^ rhs.h1, h2: self.h2 ^ rhs.h2 }
    }
}

impl BitXorAssign for HashPair {
    #[inline]
    fn bitxor_assign(&mut self, rhs: HashPair) {
        self.h1 ^= rhs.h1;
        self.h2 ^= rhs.h2;
    }
}

/// Closeness of two keys: how far the number of differing bits is from 32.
/// 0 means exactly half the 64 bits differ.
fn closeness(a: HashPair, b: HashPair) -> u32 {
    let differing = (a.h1 ^ b.h1).count_ones() + (a.h2 ^ b.h2).count_ones();
    differing.abs_diff(32)
}

/// The full mask set used for incremental key maintenance.
pub struct HashMasks {
    /// Mask for a disc of each color on each square.
    value: [[HashPair; BOARD_CELLS]; Color::COUNT],
    /// `value[color][pos] ^ flip_color` -- the mask XORed in when a disc is
    /// placed, accounting for the side-to-move change in the same step.
    put: [[HashPair; BOARD_CELLS]; Color::COUNT],
    /// `value[Black][pos] ^ value[White][pos]` -- applied when a disc flips.
    flip: [HashPair; BOARD_CELLS],
    /// Side-to-move masks.
    color: [HashPair; Color::COUNT],
    /// `color[Black] ^ color[White]` -- applied on a pass.
    flip_color: HashPair,
}

impl HashMasks {
    /// Draw a fresh mask set from the PRNG.
    pub fn generate(rng: &mut StdRng) -> HashMasks {
        const MAX_PAIR_CLOSENESS: u32 = 10;
        const MAX_ZERO_CLOSENESS: u32 = 9;
        // 64 squares x 2 colors + 2 side-to-move masks.
        const PAIRS: usize = 130;

        let word = |rng: &mut StdRng| {
            let a = rng.next_u32() >> 1;
            let b = rng.next_u32() >> 1;
            (a << 3).wrapping_add(b >> 2)
        };

        let mut pairs = [HashPair::ZERO; PAIRS];
        let mut drawn = 0;
        while drawn < PAIRS {
            let candidate = HashPair::new(word(rng), word(rng));
            if closeness(candidate, HashPair::ZERO) > MAX_ZERO_CLOSENESS {
                continue;
            }
            let swapped = HashPair::new(candidate.h2, candidate.h1);
            let ok = pairs[..drawn].iter().all(|&prev| {
                closeness(candidate, prev) <= MAX_PAIR_CLOSENESS
                    && closeness(swapped, prev) <= MAX_PAIR_CLOSENESS
            });
            if !ok {
                continue;
            }
            pairs[drawn] = candidate;
            drawn += 1;
        }

        let mut value = [[HashPair::ZERO; BOARD_CELLS]; Color::COUNT];
        let mut index = 0;
        for row in 1..=8 {
            for col in 1..=8 {
                let pos = 10 * row + col;
                value[Color::Black.index()][pos] = pairs[index];
                value[Color::White.index()][pos] = pairs[index + 1];
                index += 2;
            }
        }
        let color = [pairs[index], pairs[index + 1]];
        let flip_color = color[0] ^ color[1];

        let mut flip = [HashPair::ZERO; BOARD_CELLS];
        let mut put = [[HashPair::ZERO; BOARD_CELLS]; Color::COUNT];
        for pos in 0..BOARD_CELLS {
            flip[pos] = value[0][pos] ^ value[1][pos];
            put[0][pos] = value[0][pos] ^ flip_color;
            put[1][pos] = value[1][pos] ^ flip_color;
        }

        HashMasks { value, put, flip, color, flip_color }
    }

    /// Mask for a disc of `color` on `pos`.
    #[inline]
    pub fn value(&self, color: Color, pos: usize) -> HashPair {
        self.value[color.index()][pos]
    }

    /// Placement mask: disc mask combined with the side-to-move change.
    #[inline]
    pub fn put(&self, color: Color, pos: usize) -> HashPair {
        self.put[color.index()][pos]
    }

    /// Flip mask for `pos`.
    #[inline]
    pub fn flip(&self, pos: usize) -> HashPair {
        self.flip[pos]
    }

    /// Side-to-move change mask.
    #[inline]
    pub fn flip_color(&self) -> HashPair {
        self.flip_color
    }

    /// Compute the key of a board from scratch.
    pub fn determine(&self, side_to_move: Color, cells: &[Cell; BOARD_CELLS]) -> HashPair {
        let mut key = HashPair::ZERO;
        for row in 1..=8 {
            for col in 1..=8 {
                let pos = 10 * row + col;
                if let Some(color) = cells[pos].color() {
                    key ^= self.value[color.index()][pos];
                }
            }
        }
        key ^ self.color[side_to_move.index()]
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::{HashMasks, HashPair, closeness};
    use crate::color::{Cell, Color};
    use crate::square::BOARD_CELLS;

    #[test]
    fn xor_is_self_inverse() {
        let a = HashPair::new(0xdead_beef, 0x0123_4567);
        let b = HashPair::new(0x89ab_cdef, 0xfeed_f00d);
        assert_eq!(a ^ b ^ b, a);
    }

    #[test]
    fn generation_is_deterministic() {
        let mut rng1 = StdRng::seed_from_u64(1);
        let mut rng2 = StdRng::seed_from_u64(1);
        let masks1 = HashMasks::generate(&mut rng1);
        let masks2 = HashMasks::generate(&mut rng2);
        assert_eq!(masks1.value(Color::Black, 11), masks2.value(Color::Black, 11));
        assert_eq!(masks1.flip_color(), masks2.flip_color());
    }

    #[test]
    fn masks_respect_closeness_bounds() {
        let mut rng = StdRng::seed_from_u64(7);
        let masks = HashMasks::generate(&mut rng);
        for row in 1..=8 {
            for col in 1..=8 {
                let pos = 10 * row + col;
                for color in Color::ALL {
                    let mask = masks.value(color, pos);
                    assert!(closeness(mask, HashPair::ZERO) <= 9, "pos {pos}");
                }
            }
        }
    }

    #[test]
    fn derived_masks_are_consistent() {
        let mut rng = StdRng::seed_from_u64(3);
        let masks = HashMasks::generate(&mut rng);
        for pos in [11usize, 45, 88] {
            assert_eq!(
                masks.flip(pos),
                masks.value(Color::Black, pos) ^ masks.value(Color::White, pos)
            );
            assert_eq!(
                masks.put(Color::Black, pos),
                masks.value(Color::Black, pos) ^ masks.flip_color()
            );
        }
    }

    #[test]
    fn determine_depends_on_side_to_move() {
        let mut rng = StdRng::seed_from_u64(5);
        let masks = HashMasks::generate(&mut rng);
        let cells = [Cell::Empty; BOARD_CELLS];
        let black = masks.determine(Color::Black, &cells);
        let white = masks.determine(Color::White, &cells);
        assert_ne!(black, white);
        assert_eq!(black ^ masks.flip_color(), white);
    }
}
