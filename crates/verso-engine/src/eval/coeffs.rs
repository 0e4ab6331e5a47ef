//! Weight-table management: loading, interpolation and the block pool.
//!
//! The weight file is a gzip stream of big-endian 16-bit words: two magic
//! words, the number of calibrated stages, the stage list, then per stage a
//! constant, a parity term and the eleven pattern tables in a fixed order,
//! each stored symmetry-folded. Raw weights are scaled so that 512 units
//! equal one disc; they are divided by 4 on load so the engine works in
//! 128ths of a disc throughout.
//!
//! Stages that were not calibrated are generated lazily by linear
//! interpolation between the two bracketing calibrated stages. Interpolated
//! stages borrow storage from a bounded pool of reusable blocks so that a
//! long game does not keep sixty full table sets alive.

use std::fs::File;
use std::io::{BufReader, Read};

use flate2::read::GzDecoder;
use tracing::{debug, info};

use verso_core::FLIP8;

use crate::error::CoeffError;

/// First magic word of the weight file.
pub const EVAL_MAGIC1: i16 = 5358;
/// Second magic word of the weight file.
pub const EVAL_MAGIC2: i16 = 9793;

/// Upper limit on simultaneously allocated weight blocks.
const MAX_BLOCKS: usize = 200;

const AFILE2X_LEN: usize = 59049;
const FILE_LEN: usize = 6561;
const DIAG7_LEN: usize = 2187;
const DIAG6_LEN: usize = 729;
const DIAG5_LEN: usize = 243;
const DIAG4_LEN: usize = 81;
const CORNER33_LEN: usize = 19683;
const CORNER52_LEN: usize = 59049;

const NO_BLOCK: usize = usize::MAX;

/// One stage's worth of pattern tables.
pub(crate) struct CoeffBlock {
    pub afile2x: Box<[i16]>,
    pub bfile: Box<[i16]>,
    pub cfile: Box<[i16]>,
    pub dfile: Box<[i16]>,
    pub diag8: Box<[i16]>,
    pub diag7: Box<[i16]>,
    pub diag6: Box<[i16]>,
    pub diag5: Box<[i16]>,
    pub diag4: Box<[i16]>,
    pub corner33: Box<[i16]>,
    pub corner52: Box<[i16]>,
}

impl CoeffBlock {
    fn zeroed() -> CoeffBlock {
        CoeffBlock {
            afile2x: vec![0; AFILE2X_LEN].into_boxed_slice(),
            bfile: vec![0; FILE_LEN].into_boxed_slice(),
            cfile: vec![0; FILE_LEN].into_boxed_slice(),
            dfile: vec![0; FILE_LEN].into_boxed_slice(),
            diag8: vec![0; FILE_LEN].into_boxed_slice(),
            diag7: vec![0; DIAG7_LEN].into_boxed_slice(),
            diag6: vec![0; DIAG6_LEN].into_boxed_slice(),
            diag5: vec![0; DIAG5_LEN].into_boxed_slice(),
            diag4: vec![0; DIAG4_LEN].into_boxed_slice(),
            corner33: vec![0; CORNER33_LEN].into_boxed_slice(),
            corner52: vec![0; CORNER52_LEN].into_boxed_slice(),
        }
    }
}

/// Per-stage bookkeeping.
#[derive(Clone, Copy)]
struct CoeffSet {
    permanent: bool,
    loaded: bool,
    prev: usize,
    next: usize,
    block: usize,
    constant: i16,
    parity: i16,
    parity_constant: [i16; 2],
}

impl CoeffSet {
    const fn empty() -> CoeffSet {
        CoeffSet {
            permanent: false,
            loaded: false,
            prev: 60,
            next: 60,
            block: NO_BLOCK,
            constant: 0,
            parity: 0,
            parity_constant: [0; 2],
        }
    }
}

/// All weight state: the calibrated stages, the interpolation pool and the
/// phase-to-stage evaluation map.
pub struct Coeffs {
    stages: Vec<usize>,
    eval_map: [usize; 61],
    sets: [CoeffSet; 61],
    blocks: Vec<CoeffBlock>,
    allocated: Vec<bool>,
}

impl Coeffs {
    /// A weight state with only the terminal (disc-count) stage. Every
    /// phase maps to it, so evaluation degenerates to a disc-differential
    /// count. Used when no weight file is supplied and by tests.
    pub fn new() -> Coeffs {
        let mut coeffs = Coeffs {
            stages: vec![60],
            eval_map: [60; 61],
            sets: [CoeffSet::empty(); 61],
            blocks: Vec::new(),
            allocated: Vec::new(),
        };
        coeffs.init_terminal_stage();
        coeffs
    }

    /// Load a weight file.
    pub fn from_file(path: &str) -> Result<Coeffs, CoeffError> {
        let file = File::open(path).map_err(|source| CoeffError::InvalidFile {
            path: path.to_string(),
            source,
        })?;
        let mut stream = GzDecoder::new(BufReader::new(file));

        let word = |stream: &mut GzDecoder<BufReader<File>>| -> Result<i16, CoeffError> {
            let mut bytes = [0u8; 2];
            stream
                .read_exact(&mut bytes)
                .map_err(|_| CoeffError::TruncatedStream { path: path.to_string() })?;
            Ok((((bytes[0] as u16) << 8) | bytes[1] as u16) as i16)
        };

        if word(&mut stream)? != EVAL_MAGIC1 || word(&mut stream)? != EVAL_MAGIC2 {
            return Err(CoeffError::BadMagic { path: path.to_string() });
        }

        let stage_count = word(&mut stream)? as usize;
        if !(2..=61).contains(&stage_count) {
            return Err(CoeffError::BadMagic { path: path.to_string() });
        }
        let mut coeffs = Coeffs {
            stages: Vec::with_capacity(stage_count),
            eval_map: [0; 61],
            sets: [CoeffSet::empty(); 61],
            blocks: Vec::new(),
            allocated: Vec::new(),
        };

        // Read the calibrated stages and mark the in-between stages with
        // pointers to their bracketing neighbours.
        for i in 0..stage_count - 1 {
            let stage = word(&mut stream)? as usize;
            coeffs.stages.push(stage);
            if i == 0 {
                for j in 0..stage {
                    coeffs.sets[j].prev = stage;
                    coeffs.sets[j].next = stage;
                }
            } else {
                let prev_stage = coeffs.stages[i - 1];
                for j in prev_stage..stage {
                    coeffs.sets[j].prev = prev_stage;
                    coeffs.sets[j].next = stage;
                }
            }
            coeffs.sets[stage].permanent = true;
            coeffs.allocate_set(stage);
        }
        coeffs.stages.push(60);
        let last_real = coeffs.stages[stage_count - 2];
        for j in last_real..60 {
            coeffs.sets[j].prev = last_real;
            coeffs.sets[j].next = 60;
        }

        coeffs.unpack(&mut stream, path)?;
        coeffs.init_terminal_stage();
        coeffs.build_eval_map();

        info!(path, stages = stage_count, "loaded evaluation weights");
        Ok(coeffs)
    }

    /// Which evaluation stage serves a given number of disks played.
    #[inline]
    pub fn phase(&self, disks_played: usize) -> usize {
        self.eval_map[disks_played.min(60)]
    }

    /// Parity-dependent constant term for a phase.
    pub(crate) fn parity_constant(&self, phase: usize, disks_played: usize) -> i16 {
        self.sets[phase].parity_constant[disks_played & 1]
    }

    /// The tables for a phase, interpolating them first if needed.
    pub(crate) fn tables(&mut self, phase: usize) -> &CoeffBlock {
        if !self.sets[phase].loaded {
            self.load_set(phase);
        }
        &self.blocks[self.sets[phase].block]
    }

    /// Release the blocks of all non-permanent stages strictly below
    /// `phase`; they can no longer be reached in the current game.
    pub fn remove(&mut self, phase: i32) {
        let limit = phase.clamp(0, 61) as usize;
        for stage in 0..limit {
            if self.sets[stage].loaded && !self.sets[stage].permanent {
                debug!(stage, "releasing interpolated weight block");
                self.allocated[self.sets[stage].block] = false;
                self.sets[stage].block = NO_BLOCK;
                self.sets[stage].loaded = false;
            }
        }
    }

    /// Fold disc, edge, corner and X-square encouragements into every
    /// non-terminal calibrated stage.
    pub fn apply_adjustments(
        &mut self,
        disc_adjust: f64,
        edge_adjust: f64,
        corner_adjust: f64,
        x_adjust: f64,
    ) {
        let terminal = self.sets[60].block;
        let stages: Vec<usize> =
            self.stages[..self.stages.len() - 1].to_vec();

        for &stage in &stages {
            let target = self.sets[stage].block;
            if target == NO_BLOCK {
                continue;
            }
            // Disc bonus: blend in the terminal (disc-count) tables.
            macro_rules! blend {
                ($field:ident) => {{
                    let len = self.blocks[target].$field.len();
                    for j in 0..len {
                        let bonus =
                            (self.blocks[terminal].$field[j] as f64 * disc_adjust) as i16;
                        self.blocks[target].$field[j] += bonus;
                    }
                }};
            }
            blend!(afile2x);
            blend!(bfile);
            blend!(cfile);
            blend!(dfile);
            blend!(diag8);
            blend!(diag7);
            blend!(diag6);
            blend!(diag5);
            blend!(diag4);
            blend!(corner33);
            blend!(corner52);

            // Edge, corner and X-square bonuses on the A-file+2X tables.
            // Corners and X-squares are halved because each corner is part
            // of two A-file+2X instances.
            let mut row = [0usize; 10];
            for j in 0..AFILE2X_LEN {
                let mut adjust = 0.0;
                for &k in row[1..=6].iter() {
                    if k == 0 {
                        adjust += 128.0 * edge_adjust;
                    } else if k == 2 {
                        adjust -= 128.0 * edge_adjust;
                    }
                }
                for corner in [0usize, 7] {
                    if row[corner] == 0 {
                        adjust += 0.5 * 128.0 * corner_adjust;
                    } else if row[corner] == 2 {
                        adjust -= 0.5 * 128.0 * corner_adjust;
                    }
                }
                for (x_sq, corner) in [(8usize, 0usize), (9, 7)] {
                    if row[x_sq] == 0 && row[corner] == 1 {
                        adjust += 0.5 * 128.0 * x_adjust;
                    } else if row[x_sq] == 2 && row[corner] == 1 {
                        adjust -= 0.5 * 128.0 * x_adjust;
                    }
                }
                self.blocks[target].afile2x[j] += adjust as i16;

                let mut k = 0;
                loop {
                    row[k] += 1;
                    if row[k] == 3 {
                        row[k] = 0;
                    }
                    k += 1;
                    if row[k - 1] != 0 || k >= 10 {
                        break;
                    }
                }
            }
        }
    }

    fn allocate_set(&mut self, stage: usize) {
        self.sets[stage].block = self.find_block(stage);
    }

    fn find_block(&mut self, _stage: usize) -> usize {
        if let Some(free) = self.allocated.iter().position(|&used| !used) {
            self.allocated[free] = true;
            return free;
        }
        if self.blocks.len() >= MAX_BLOCKS {
            panic!("weight block pool exhausted at {MAX_BLOCKS} blocks");
        }
        self.blocks.push(CoeffBlock::zeroed());
        self.allocated.push(true);
        self.blocks.len() - 1
    }

    /// Linear interpolation between the bracketing calibrated stages.
    fn load_set(&mut self, stage: usize) {
        if !self.sets[stage].permanent {
            let prev = self.sets[stage].prev;
            let next = self.sets[stage].next;
            let (weight1, weight2) = if prev == next {
                (1i32, 1i32)
            } else {
                ((next - stage) as i32, (stage - prev) as i32)
            };
            let total = weight1 + weight2;
            self.sets[stage].constant = ((weight1 * self.sets[prev].constant as i32
                + weight2 * self.sets[next].constant as i32)
                / total) as i16;
            self.sets[stage].parity = ((weight1 * self.sets[prev].parity as i32
                + weight2 * self.sets[next].parity as i32)
                / total) as i16;
            self.allocate_set(stage);

            let prev_block = self.sets[prev].block;
            let next_block = self.sets[next].block;
            let target = self.sets[stage].block;
            macro_rules! interpolate {
                ($field:ident) => {{
                    for i in 0..self.blocks[target].$field.len() {
                        let blended = (weight1 * self.blocks[prev_block].$field[i] as i32
                            + weight2 * self.blocks[next_block].$field[i] as i32)
                            / total;
                        self.blocks[target].$field[i] = blended as i16;
                    }
                }};
            }
            interpolate!(afile2x);
            interpolate!(bfile);
            interpolate!(cfile);
            interpolate!(dfile);
            interpolate!(diag8);
            interpolate!(diag7);
            interpolate!(diag6);
            interpolate!(diag5);
            interpolate!(diag4);
            interpolate!(corner33);
            interpolate!(corner52);
        }

        self.sets[stage].parity_constant =
            [self.sets[stage].constant, self.sets[stage].constant + self.sets[stage].parity];
        self.sets[stage].loaded = true;
    }

    fn unpack(
        &mut self,
        stream: &mut GzDecoder<BufReader<File>>,
        path: &str,
    ) -> Result<(), CoeffError> {
        let word = |stream: &mut GzDecoder<BufReader<File>>| -> Result<i16, CoeffError> {
            let mut bytes = [0u8; 2];
            stream
                .read_exact(&mut bytes)
                .map_err(|_| CoeffError::TruncatedStream { path: path.to_string() })?;
            Ok((((bytes[0] as u16) << 8) | bytes[1] as u16) as i16)
        };

        let mirror8 = digit_reversal_map(8, FILE_LEN);
        let mirror7 = digit_reversal_map(7, DIAG7_LEN);
        let mirror6 = digit_reversal_map(6, DIAG6_LEN);
        let mirror5 = digit_reversal_map(5, DIAG5_LEN);
        let mirror4 = digit_reversal_map(4, DIAG4_LEN);
        let mirror33 = corner33_mirror_map();
        let mirror8x2 = afile2x_mirror_map();

        let mut unpack_batch = |item: &mut [i16],
                                mirror: Option<&[u32]>,
                                stream: &mut GzDecoder<BufReader<File>>|
         -> Result<(), CoeffError> {
            for i in 0..item.len() {
                match mirror {
                    Some(map) if map[i] as usize != i => item[i] = item[map[i] as usize],
                    _ => item[i] = word(stream)? / 4,
                }
            }
            Ok(())
        };

        let stage_list: Vec<usize> = self.stages[..self.stages.len() - 1].to_vec();
        for &stage in &stage_list {
            self.sets[stage].constant = word(stream)? / 4;
            self.sets[stage].parity = word(stream)? / 4;
            self.sets[stage].parity_constant =
                [self.sets[stage].constant, self.sets[stage].constant + self.sets[stage].parity];

            let block = self.sets[stage].block;
            let tables = &mut self.blocks[block];
            unpack_batch(&mut tables.afile2x, Some(&mirror8x2), stream)?;
            unpack_batch(&mut tables.bfile, Some(&mirror8), stream)?;
            unpack_batch(&mut tables.cfile, Some(&mirror8), stream)?;
            unpack_batch(&mut tables.dfile, Some(&mirror8), stream)?;
            unpack_batch(&mut tables.diag8, Some(&mirror8), stream)?;
            unpack_batch(&mut tables.diag7, Some(&mirror7), stream)?;
            unpack_batch(&mut tables.diag6, Some(&mirror6), stream)?;
            unpack_batch(&mut tables.diag5, Some(&mirror5), stream)?;
            unpack_batch(&mut tables.diag4, Some(&mirror4), stream)?;
            unpack_batch(&mut tables.corner33, Some(&mirror33), stream)?;
            unpack_batch(&mut tables.corner52, None, stream)?;
            self.sets[stage].loaded = true;
        }
        Ok(())
    }

    fn build_eval_map(&mut self) {
        // Calibrated stages are evaluation stages; an intermediate stage is
        // introduced two stages before each of them; everything else maps
        // forward to the next evaluation stage.
        let first = self.stages[0];
        for i in 0..first {
            self.eval_map[i] = first;
        }
        for &stage in &self.stages {
            self.eval_map[stage] = stage;
        }
        let mut subsequent = 60;
        let mut i = 60i32;
        while i >= first as i32 {
            let stage = i as usize;
            if self.eval_map[stage] == stage {
                subsequent = stage;
            } else if stage == subsequent - 2 {
                self.eval_map[stage] = stage;
                subsequent = stage;
            } else {
                self.eval_map[stage] = subsequent;
            }
            i -= 1;
        }
    }

    /// Build the disc-count tables for the all-full stage 60. Each cell's
    /// weight is one over the number of patterns it belongs to, so summing
    /// every pattern of a full board telescopes to the disc differential.
    fn init_terminal_stage(&mut self) {
        self.sets[60].permanent = true;
        self.allocate_set(60);

        let mut hit = [[0i32; 8]; 8];
        for i in 0..8 {
            hit[0][i] += 1;
            hit[i][0] += 1;
            hit[7][i] += 1;
            hit[i][7] += 1;
            hit[1][i] += 1;
            hit[i][1] += 1;
            hit[6][i] += 1;
            hit[i][6] += 1;
            hit[2][i] += 1;
            hit[i][2] += 1;
            hit[5][i] += 1;
            hit[i][5] += 1;
            hit[3][i] += 1;
            hit[i][3] += 1;
            hit[4][i] += 1;
            hit[i][4] += 1;
        }
        for i in 0..3 {
            for j in 0..3 {
                hit[i][j] += 1;
                hit[i][7 - j] += 1;
                hit[7 - i][j] += 1;
                hit[7 - i][7 - j] += 1;
            }
        }
        for i in 0..2 {
            for j in 0..5 {
                hit[i][j] += 1;
                hit[j][i] += 1;
                hit[i][7 - j] += 1;
                hit[j][7 - i] += 1;
                hit[7 - i][j] += 1;
                hit[7 - j][i] += 1;
                hit[7 - i][7 - j] += 1;
                hit[7 - j][7 - i] += 1;
            }
        }
        for i in 0..8 {
            hit[i][i] += 1;
            hit[i][7 - i] += 1;
        }
        for i in 0..7 {
            hit[i][i + 1] += 1;
            hit[i + 1][i] += 1;
            hit[i][6 - i] += 1;
            hit[i + 1][7 - i] += 1;
        }
        for i in 0..6 {
            hit[i][i + 2] += 1;
            hit[i + 2][i] += 1;
            hit[i][5 - i] += 1;
            hit[i + 2][7 - i] += 1;
        }
        for i in 0..5 {
            hit[i][i + 3] += 1;
            hit[i + 3][i] += 1;
            hit[i][4 - i] += 1;
            hit[i + 3][7 - i] += 1;
        }
        for i in 0..4 {
            hit[i][i + 4] += 1;
            hit[i + 4][i] += 1;
            hit[i][3 - i] += 1;
            hit[i + 4][7 - i] += 1;
        }
        hit[1][1] += 2;
        hit[1][6] += 2;
        hit[6][1] += 2;
        hit[6][6] += 2;

        let mut value = [[0.0f64; 8]; 8];
        for i in 0..8 {
            for j in 0..8 {
                value[i][j] = 1.0 / hit[i][j] as f64;
            }
        }

        let signed = |digit: usize, weight: f64| -> f64 {
            match digit {
                0 => weight,
                2 => -weight,
                _ => 0.0,
            }
        };
        let scale = |result: f64| -> i16 { (result * 128.0 + 0.5).floor() as i16 };

        let block = self.sets[60].block;
        let mut row = [0usize; 10];
        for i in 0..AFILE2X_LEN {
            let mut result = 0.0;
            for j in 0..8 {
                result += signed(row[j], value[0][j]);
            }
            result += signed(row[8], value[1][1]);
            result += signed(row[9], value[1][6]);
            self.blocks[block].afile2x[i] = scale(result);

            result = 0.0;
            for j in 0..5 {
                for k in 0..2 {
                    result += signed(row[5 * k + j], value[j][k]);
                }
            }
            self.blocks[block].corner52[i] = scale(result);

            if i < CORNER33_LEN {
                result = 0.0;
                for j in 0..3 {
                    for k in 0..3 {
                        result += signed(row[3 * j + k], value[j][k]);
                    }
                }
                self.blocks[block].corner33[i] = scale(result);
            }
            if i < FILE_LEN {
                for (field, row_index) in [(0usize, 1usize), (1, 2), (2, 3)] {
                    let mut line = 0.0;
                    for j in 0..8 {
                        line += signed(row[j], value[row_index][j]);
                    }
                    match field {
                        0 => self.blocks[block].bfile[i] = scale(line),
                        1 => self.blocks[block].cfile[i] = scale(line),
                        _ => self.blocks[block].dfile[i] = scale(line),
                    }
                }
                result = 0.0;
                for j in 0..8 {
                    result += signed(row[j], value[j][j]);
                }
                self.blocks[block].diag8[i] = scale(result);
            }
            if i < DIAG7_LEN {
                result = 0.0;
                for j in 0..7 {
                    result += signed(row[j], value[j][j + 1]);
                }
                self.blocks[block].diag7[i] = scale(result);
            }
            if i < DIAG6_LEN {
                result = 0.0;
                for j in 0..6 {
                    result += signed(row[j], value[j][j + 2]);
                }
                self.blocks[block].diag6[i] = scale(result);
            }
            if i < DIAG5_LEN {
                result = 0.0;
                for j in 0..5 {
                    result += signed(row[j], value[j][j + 3]);
                }
                self.blocks[block].diag5[i] = scale(result);
            }
            if i < DIAG4_LEN {
                result = 0.0;
                for j in 0..4 {
                    result += signed(row[j], value[j][j + 4]);
                }
                self.blocks[block].diag4[i] = scale(result);
            }

            let mut j = 0;
            loop {
                row[j] += 1;
                if row[j] == 3 {
                    row[j] = 0;
                }
                j += 1;
                if row[j - 1] != 0 || j >= 10 {
                    break;
                }
            }
        }

        self.sets[60].constant = 0;
        self.sets[60].parity = 0;
        self.sets[60].parity_constant = [0, 0];
        self.sets[60].loaded = true;
    }
}

impl Default for Coeffs {
    fn default() -> Coeffs {
        Coeffs::new()
    }
}

/// Mirror map for an `digits`-cell linear pattern: min of a value and its
/// digit reversal.
fn digit_reversal_map(digits: usize, len: usize) -> Vec<u32> {
    let mut map = vec![0u32; len];
    for (i, slot) in map.iter_mut().enumerate() {
        let mut v = i;
        let mut mirrored = 0usize;
        for _ in 0..digits {
            mirrored = 3 * mirrored + v % 3;
            v /= 3;
        }
        *slot = i.min(mirrored) as u32;
    }
    map
}

/// Mirror map for the 3x3 corner: reflection in the diagonal.
fn corner33_mirror_map() -> Vec<u32> {
    let mut map = vec![0u32; CORNER33_LEN];
    for (i, slot) in map.iter_mut().enumerate() {
        let mut digits = [0usize; 9];
        let mut v = i;
        for digit in digits.iter_mut() {
            *digit = v % 3;
            v /= 3;
        }
        let mirrored = digits[0]
            + 3 * digits[3]
            + 9 * digits[6]
            + 27 * digits[1]
            + 81 * digits[4]
            + 243 * digits[7]
            + 729 * digits[2]
            + 2187 * digits[5]
            + 6561 * digits[8];
        *slot = i.min(mirrored) as u32;
    }
    map
}

/// Mirror map for the A-file+2X pattern: reverse the file, swap the two
/// X-squares.
fn afile2x_mirror_map() -> Vec<u32> {
    let mut map = vec![0u32; AFILE2X_LEN];
    for i in 0..FILE_LEN {
        for j in 0..3 {
            for k in 0..3 {
                let index = i + FILE_LEN * j + CORNER33_LEN * k;
                let mirrored = FLIP8[i] as usize + FILE_LEN * k + CORNER33_LEN * j;
                map[index] = index.min(mirrored) as u32;
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::{Coeffs, afile2x_mirror_map, corner33_mirror_map, digit_reversal_map};

    #[test]
    fn material_coeffs_map_everything_to_terminal() {
        let coeffs = Coeffs::new();
        for phase in 0..=60 {
            assert_eq!(coeffs.phase(phase), 60);
        }
        assert_eq!(coeffs.parity_constant(60, 12), 0);
    }

    #[test]
    fn terminal_tables_are_antisymmetric() {
        let mut coeffs = Coeffs::new();
        let tables = coeffs.tables(60);
        // Reversing the roles of Black and White (v -> last - v) negates
        // every disc-count weight, up to the half-unit rounding of the
        // 1/128-disc scaling.
        for v in [0usize, 1, 100, 3280, 6560] {
            assert!((tables.bfile[v] + tables.bfile[6560 - v]).abs() <= 1);
            assert!((tables.diag8[v] + tables.diag8[6560 - v]).abs() <= 1);
        }
        for v in [0usize, 40, 80] {
            assert!((tables.diag4[v] + tables.diag4[80 - v]).abs() <= 1);
        }
    }

    #[test]
    fn terminal_full_board_rows_count_discs() {
        let mut coeffs = Coeffs::new();
        let tables = coeffs.tables(60);
        // An all-Black 8-cell line in the B-file pattern is configuration 0
        // and must be positive; all-White (6560) its negation.
        assert!(tables.bfile[0] > 0);
        assert_eq!(tables.bfile[0], -tables.bfile[6560]);
    }

    #[test]
    fn reversal_map_is_folded() {
        let map = digit_reversal_map(8, 6561);
        for (i, &m) in map.iter().enumerate() {
            assert!(m as usize <= i);
            assert_eq!(map[m as usize], m);
        }
    }

    #[test]
    fn corner_maps_are_folded() {
        for map in [corner33_mirror_map(), afile2x_mirror_map()] {
            for (i, &m) in map.iter().enumerate() {
                assert!(m as usize <= i);
            }
        }
    }

    #[test]
    fn remove_frees_interpolated_blocks_only() {
        let mut coeffs = Coeffs::new();
        let _ = coeffs.tables(60);
        coeffs.remove(61);
        // The terminal stage is permanent and must survive.
        assert_eq!(coeffs.phase(30), 60);
        let tables = coeffs.tables(60);
        assert!(tables.bfile[0] > 0);
    }
}
