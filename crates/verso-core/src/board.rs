//! The board position: cells, disc counts, flip stack and incremental key.

use std::fmt;

use rand::rngs::StdRng;

use crate::color::{Cell, Color};
use crate::error::{MoveError, PositionError};
use crate::hash::{HashMasks, HashPair};
use crate::square::{BOARD_CELLS, DIR_MASK, MOVE_OFFSETS, Square};

/// Upper bound on plies tracked by the per-stage arrays. A game has at
/// most 60 placements; searches never exceed the number of empties.
pub const MAX_PLIES: usize = 64;

/// Complete game position with incrementally maintained hash key.
///
/// All state that changes when a move is made or unmade lives here: the
/// bordered cell array, the per-stage disc counts, the flip stack, and the
/// two-word hash key together with its per-ply history. The randomized
/// hash masks are drawn once per position from the engine's PRNG.
pub struct Position {
    cells: [Cell; BOARD_CELLS],
    disks_played: usize,
    piece_count: [[i32; MAX_PLIES]; Color::COUNT],
    flip_stack: Vec<u8>,
    flip_count: [u8; MAX_PLIES],
    hash: HashPair,
    hash_stored: [HashPair; MAX_PLIES],
    masks: HashMasks,
}

impl Position {
    /// Create a position at the initial setup, with masks drawn from `rng`.
    pub fn new(rng: &mut StdRng) -> Position {
        let mut pos = Position {
            cells: [Cell::Outside; BOARD_CELLS],
            disks_played: 0,
            piece_count: [[0; MAX_PLIES]; Color::COUNT],
            flip_stack: Vec::with_capacity(MAX_PLIES * 20),
            flip_count: [0; MAX_PLIES],
            hash: HashPair::ZERO,
            hash_stored: [HashPair::ZERO; MAX_PLIES],
            masks: HashMasks::generate(rng),
        };
        pos.reset();
        pos
    }

    /// Restore the initial position (masks are kept).
    pub fn reset(&mut self) {
        for row in 0..10 {
            for col in 0..10 {
                let pos = 10 * row + col;
                self.cells[pos] = if (1..=8).contains(&row) && (1..=8).contains(&col) {
                    Cell::Empty
                } else {
                    Cell::Outside
                };
            }
        }
        self.cells[45] = Cell::Black;
        self.cells[54] = Cell::Black;
        self.cells[44] = Cell::White;
        self.cells[55] = Cell::White;
        self.disks_played = 0;
        self.flip_stack.clear();
        self.refresh_piece_counts();
        self.rehash(Color::Black);
    }

    /// Load a position from its 64-character dump plus side to move.
    ///
    /// Accepts `*`/`X` for Black, `O`/`0` for White and `-`/`.` for empty
    /// (lowercase variants included); the side-to-move character follows
    /// the board, separated by optional whitespace.
    pub fn set_from_dump(&mut self, dump: &str) -> Result<Color, PositionError> {
        let chars: Vec<char> = dump.chars().filter(|c| !c.is_whitespace()).collect();
        if chars.len() < 65 {
            return Err(PositionError::BadLength { length: chars.len().min(64) });
        }
        let mut cells = [Cell::Outside; BOARD_CELLS];
        for row in 1..=8usize {
            for col in 1..=8usize {
                let index = 8 * (row - 1) + (col - 1);
                cells[10 * row + col] = match chars[index] {
                    '*' | 'X' | 'x' => Cell::Black,
                    'O' | '0' | 'o' => Cell::White,
                    '-' | '.' => Cell::Empty,
                    character => {
                        return Err(PositionError::BadCharacter { character, index });
                    }
                };
            }
        }
        let side_to_move = match chars[64] {
            '*' | 'X' | 'x' | 'B' => Color::Black,
            'O' | '0' | 'o' | 'W' => Color::White,
            character => return Err(PositionError::BadSideToMove { character }),
        };

        self.cells = cells;
        self.flip_stack.clear();
        self.refresh_piece_counts();
        let played = self.disc_count(Color::Black) + self.disc_count(Color::White) - 4;
        self.disks_played = played.max(0) as usize;
        self.refresh_piece_counts();
        self.rehash(side_to_move);
        Ok(side_to_move)
    }

    /// Serialize to the 64-character dump format followed by side to move.
    pub fn to_dump(&self, side_to_move: Color) -> String {
        let mut out = String::with_capacity(66);
        for row in 1..=8 {
            for col in 1..=8 {
                out.push(match self.cells[10 * row + col] {
                    Cell::Black => '*',
                    Cell::White => 'O',
                    _ => '-',
                });
            }
        }
        out.push(' ');
        out.push(if side_to_move == Color::Black { '*' } else { 'O' });
        out
    }

    /// The cell at a raw board index.
    #[inline]
    pub fn cell(&self, pos: usize) -> Cell {
        self.cells[pos]
    }

    /// The full bordered cell array.
    #[inline]
    pub fn cells(&self) -> &[Cell; BOARD_CELLS] {
        &self.cells
    }

    /// Number of discs placed beyond the initial four.
    #[inline]
    pub fn disks_played(&self) -> usize {
        self.disks_played
    }

    /// Number of empty squares left.
    #[inline]
    pub fn empties(&self) -> usize {
        60 - self.disks_played
    }

    /// Incrementally maintained disc count for `color`.
    #[inline]
    pub fn piece_count(&self, color: Color) -> i32 {
        self.piece_count[color.index()][self.disks_played]
    }

    /// Count `color` discs by scanning the board.
    pub fn disc_count(&self, color: Color) -> i32 {
        let target = color.cell();
        let mut sum = 0;
        for row in 1..=8 {
            for col in 1..=8 {
                if self.cells[10 * row + col] == target {
                    sum += 1;
                }
            }
        }
        sum
    }

    /// Re-derive the incremental disc counts for the current stage from the
    /// board. Needed after the board has been restored from a deeper stage
    /// without replaying the per-stage updates.
    pub fn refresh_piece_counts(&mut self) {
        self.piece_count[Color::Black.index()][self.disks_played] =
            self.disc_count(Color::Black);
        self.piece_count[Color::White.index()][self.disks_played] =
            self.disc_count(Color::White);
    }

    /// The current two-word hash key.
    #[inline]
    pub fn hash(&self) -> HashPair {
        self.hash
    }

    /// The hash masks backing this position.
    #[inline]
    pub fn masks(&self) -> &HashMasks {
        &self.masks
    }

    /// Recompute the hash key from the board.
    pub fn rehash(&mut self, side_to_move: Color) {
        self.hash = self.masks.determine(side_to_move, &self.cells);
    }

    /// XOR the side-to-move change into the key (used for passes).
    #[inline]
    pub fn toggle_hash_side(&mut self) {
        self.hash ^= self.masks.flip_color();
    }

    /// Does playing `pos` flip at least one disc for `side`?
    pub fn flips_discs(&self, pos: usize, side: Color) -> bool {
        let own = side.cell();
        let opp = side.opponent().cell();
        let mask = DIR_MASK[pos];
        for (dir, &offset) in MOVE_OFFSETS.iter().enumerate() {
            if mask & (1 << dir) == 0 {
                continue;
            }
            let mut walk = (pos as i32 + offset) as usize;
            if self.cells[walk] != opp {
                continue;
            }
            walk = (walk as i32 + offset) as usize;
            while self.cells[walk] == opp {
                walk = (walk as i32 + offset) as usize;
            }
            if self.cells[walk] == own {
                return true;
            }
        }
        false
    }

    /// Is `sq` a legal move for `side`?
    pub fn is_legal(&self, sq: Square, side: Color) -> bool {
        self.cells[sq.pos()] == Cell::Empty && self.flips_discs(sq.pos(), side)
    }

    /// Apply a move, rejecting one that flips no discs. The checked
    /// counterpart of [`make_move`](Self::make_move), used when an illegal
    /// move is an error to report rather than a probe result.
    pub fn apply(
        &mut self,
        side: Color,
        sq: Square,
        update_hash: bool,
    ) -> Result<usize, MoveError> {
        match self.make_move(side, sq, update_hash) {
            0 => Err(MoveError::IllegalMove { square: sq, side }),
            flipped => Ok(flipped),
        }
    }

    /// Apply a move, returning the number of flipped discs; 0 means the
    /// move was illegal and nothing changed. With `update_hash` the key is
    /// maintained incrementally, otherwise only the per-ply key history is
    /// recorded so [`unmake_move`](Self::unmake_move) still restores it.
    pub fn make_move(&mut self, side: Color, sq: Square, update_hash: bool) -> usize {
        let pos = sq.pos();
        let (flipped, mut diff) = self.flip_discs(side, pos);
        if flipped == 0 {
            return 0;
        }

        self.hash_stored[self.disks_played] = self.hash;
        if update_hash {
            diff ^= self.masks.put(side, pos);
            self.hash ^= diff;
        }

        self.finish_move(side, pos, flipped);
        flipped
    }

    /// Apply a move without touching the hash key at all. Must be undone
    /// with [`unmake_move_no_hash`](Self::unmake_move_no_hash).
    pub fn make_move_no_hash(&mut self, side: Color, sq: Square) -> usize {
        let pos = sq.pos();
        let (flipped, _) = self.flip_discs(side, pos);
        if flipped == 0 {
            return 0;
        }
        self.finish_move(side, pos, flipped);
        flipped
    }

    /// Retract a move made with [`make_move`](Self::make_move).
    pub fn unmake_move(&mut self, side: Color, sq: Square) {
        self.cells[sq.pos()] = Cell::Empty;
        self.disks_played -= 1;
        self.hash = self.hash_stored[self.disks_played];
        self.undo_flips(side);
    }

    /// Retract a move made with [`make_move_no_hash`](Self::make_move_no_hash).
    pub fn unmake_move_no_hash(&mut self, side: Color, sq: Square) {
        self.cells[sq.pos()] = Cell::Empty;
        self.disks_played -= 1;
        self.undo_flips(side);
    }

    /// Flip all bracketed discs for a move at `pos`, pushing them on the
    /// flip stack and accumulating the hash difference of the flips.
    fn flip_discs(&mut self, side: Color, pos: usize) -> (usize, HashPair) {
        let own = side.cell();
        let opp = side.opponent().cell();
        let mask = DIR_MASK[pos];
        let mut flipped = 0;
        let mut diff = HashPair::ZERO;
        for (dir, &offset) in MOVE_OFFSETS.iter().enumerate() {
            if mask & (1 << dir) == 0 {
                continue;
            }
            let mut walk = (pos as i32 + offset) as usize;
            while self.cells[walk] == opp {
                walk = (walk as i32 + offset) as usize;
            }
            if self.cells[walk] != own {
                continue;
            }
            let mut back = (walk as i32 - offset) as usize;
            while back != pos {
                self.cells[back] = own;
                self.flip_stack.push(back as u8);
                diff ^= self.masks.flip(back);
                flipped += 1;
                back = (back as i32 - offset) as usize;
            }
        }
        (flipped, diff)
    }

    fn finish_move(&mut self, side: Color, pos: usize, flipped: usize) {
        self.flip_count[self.disks_played] = flipped as u8;
        self.cells[pos] = side.cell();

        let own = side.index();
        let opp = side.opponent().index();
        let stage = self.disks_played;
        self.piece_count[own][stage + 1] = self.piece_count[own][stage] + flipped as i32 + 1;
        self.piece_count[opp][stage + 1] = self.piece_count[opp][stage] - flipped as i32;

        self.disks_played += 1;
    }

    fn undo_flips(&mut self, side: Color) {
        let restore = side.opponent().cell();
        let count = self.flip_count[self.disks_played] as usize;
        for _ in 0..count {
            let pos = self.flip_stack.pop().expect("flip stack underflow") as usize;
            self.cells[pos] = restore;
        }
    }

    /// Return a pretty-printable wrapper for this position.
    pub fn pretty(&self) -> PrettyPosition<'_> {
        PrettyPosition(self)
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Position(\"{}\")", self.to_dump(Color::Black))
    }
}

/// Wrapper for pretty-printing a position as an 8x8 grid.
pub struct PrettyPosition<'a>(&'a Position);

impl fmt::Display for PrettyPosition<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "   a b c d e f g h")?;
        for row in 1..=8 {
            write!(f, "{row}  ")?;
            for col in 1..=8 {
                let c = match self.0.cells[10 * row + col] {
                    Cell::Black => '*',
                    Cell::White => 'O',
                    _ => '.',
                };
                if col < 8 {
                    write!(f, "{c} ")?;
                } else {
                    write!(f, "{c}")?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::Position;
    use crate::color::{Cell, Color};
    use crate::square::Square;

    fn position() -> Position {
        let mut rng = StdRng::seed_from_u64(1);
        Position::new(&mut rng)
    }

    #[test]
    fn initial_setup() {
        let pos = position();
        assert_eq!(pos.disks_played(), 0);
        assert_eq!(pos.piece_count(Color::Black), 2);
        assert_eq!(pos.piece_count(Color::White), 2);
        assert_eq!(pos.cell(44), Cell::White);
        assert_eq!(pos.cell(45), Cell::Black);
        assert_eq!(pos.empties(), 60);
    }

    #[test]
    fn disc_conservation() {
        let pos = position();
        let empties = (1..=8)
            .flat_map(|r| (1..=8).map(move |c| 10 * r + c))
            .filter(|&p| pos.cell(p) == Cell::Empty)
            .count() as i32;
        assert_eq!(
            pos.piece_count(Color::Black) + pos.piece_count(Color::White) + empties,
            64
        );
    }

    #[test]
    fn make_unmake_is_identity() {
        let mut pos = position();
        let sq: Square = "d3".parse().unwrap();
        let cells_before = *pos.cells();
        let hash_before = pos.hash();
        let black_before = pos.piece_count(Color::Black);

        let flipped = pos.make_move(Color::Black, sq, true);
        assert_eq!(flipped, 1);
        assert_eq!(pos.disks_played(), 1);
        assert_eq!(pos.piece_count(Color::Black), black_before + 2);
        assert_ne!(pos.hash(), hash_before);

        pos.unmake_move(Color::Black, sq);
        assert_eq!(pos.disks_played(), 0);
        assert_eq!(*pos.cells(), cells_before);
        assert_eq!(pos.hash(), hash_before);
        assert_eq!(pos.piece_count(Color::Black), black_before);
    }

    #[test]
    fn incremental_hash_matches_rehash() {
        let mut pos = position();
        let moves = ["d3", "c5", "f6", "f5"];
        let mut side = Color::Black;
        for mv in moves {
            let sq: Square = mv.parse().unwrap();
            assert!(pos.make_move(side, sq, true) > 0, "move {mv}");
            side = side.opponent();
        }
        let incremental = pos.hash();
        pos.rehash(side);
        assert_eq!(pos.hash(), incremental);
    }

    #[test]
    fn illegal_move_changes_nothing() {
        let mut pos = position();
        let hash = pos.hash();
        // a1 flips nothing at the start.
        let sq: Square = "a1".parse().unwrap();
        assert_eq!(pos.make_move(Color::Black, sq, true), 0);
        assert_eq!(pos.disks_played(), 0);
        assert_eq!(pos.hash(), hash);
        assert_eq!(pos.cell(11), Cell::Empty);
    }

    #[test]
    fn apply_reports_illegal_moves() {
        let mut pos = position();
        let hash = pos.hash();
        let sq: Square = "a1".parse().unwrap();
        let err = pos.apply(Color::Black, sq, true).unwrap_err();
        assert_eq!(
            err,
            crate::error::MoveError::IllegalMove { square: sq, side: Color::Black }
        );
        assert_eq!(pos.hash(), hash);
        assert_eq!(pos.apply(Color::Black, "d3".parse().unwrap(), true), Ok(1));
        pos.unmake_move(Color::Black, "d3".parse().unwrap());
    }

    #[test]
    fn legality_at_start() {
        let pos = position();
        for (mv, legal) in [("d3", true), ("c4", true), ("f5", true), ("e6", true),
                            ("a1", false), ("d4", false), ("c3", false)] {
            let sq: Square = mv.parse().unwrap();
            assert_eq!(pos.is_legal(sq, Color::Black), legal, "move {mv}");
        }
    }

    #[test]
    fn dump_roundtrip() {
        let mut pos = position();
        pos.make_move(Color::Black, "d3".parse().unwrap(), true);
        let dump = pos.to_dump(Color::White);
        let mut other = position();
        let side = other.set_from_dump(&dump).unwrap();
        assert_eq!(side, Color::White);
        assert_eq!(*other.cells(), *pos.cells());
        assert_eq!(other.disks_played(), 1);
    }

    #[test]
    fn dump_accepts_alternate_spellings() {
        let mut pos = position();
        let dump = "---------------------------OX------XO--------------------------- X";
        let side = pos.set_from_dump(dump).unwrap();
        assert_eq!(side, Color::Black);
        assert_eq!(pos.cell(44), Cell::White);
        assert_eq!(pos.cell(45), Cell::Black);
        assert_eq!(pos.disks_played(), 0);
    }

    #[test]
    fn dump_rejects_bad_input() {
        let mut pos = position();
        assert!(pos.set_from_dump("too short").is_err());
        let bad = "?--------------------------O*------*O--------------------------- *";
        assert!(pos.set_from_dump(bad).is_err());
    }

    #[test]
    fn pass_hash_toggle() {
        let mut pos = position();
        let before = pos.hash();
        pos.toggle_hash_side();
        pos.toggle_hash_side();
        assert_eq!(pos.hash(), before);
    }
}
