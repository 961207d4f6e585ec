//! Match counting with fixed neighbor stencils.
//!
//! A stencil is a tiny correlation kernel: a window of `height x width` tiles
//! and two weighted taps reading one side label each. Sliding it over every
//! valid window of a board and counting where the weighted sum is zero gives:
//!
//! - with a `+1/-1` kernel, the touching pairs whose labels are equal,
//!   including blank `0-0` pairs;
//! - with a `+1/+1` kernel, only the `0-0` pairs, because labels are
//!   non-negative.
//!
//! The difference of the two counts is the number of real matches, without
//! any per-pair branching on the blank label.

use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array4, ArrayView3};

use crate::board::{EAST, NORTH, SOUTH, WEST};

/// One weighted read of a side label at an offset inside the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tap {
    pub side: usize,
    pub dy: usize,
    pub dx: usize,
    pub weight: i64,
}

/// A fixed two-tap kernel over a `height x width` window of tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stencil {
    pub height: usize,
    pub width: usize,
    pub taps: [Tap; 2],
}

/// South side of the upper tile minus North side of the lower tile.
pub const HORIZONTAL_DIFF: Stencil = Stencil {
    height: 2,
    width: 1,
    taps: [
        Tap { side: SOUTH, dy: 1, dx: 0, weight: 1 },
        Tap { side: NORTH, dy: 0, dx: 0, weight: -1 },
    ],
};

/// East side of the left tile minus West side of the right tile.
pub const VERTICAL_DIFF: Stencil = Stencil {
    height: 1,
    width: 2,
    taps: [
        Tap { side: EAST, dy: 0, dx: 0, weight: 1 },
        Tap { side: WEST, dy: 0, dx: 1, weight: -1 },
    ],
};

/// Same pairing as [`HORIZONTAL_DIFF`], summed.
pub const HORIZONTAL_SUM: Stencil = Stencil {
    height: 2,
    width: 1,
    taps: [
        Tap { side: SOUTH, dy: 1, dx: 0, weight: 1 },
        Tap { side: NORTH, dy: 0, dx: 0, weight: 1 },
    ],
};

/// Same pairing as [`VERTICAL_DIFF`], summed.
pub const VERTICAL_SUM: Stencil = Stencil {
    height: 1,
    width: 2,
    taps: [
        Tap { side: EAST, dy: 0, dx: 0, weight: 1 },
        Tap { side: WEST, dy: 0, dx: 1, weight: 1 },
    ],
};

impl Stencil {
    /// Number of valid windows of a `[4, size, size]` board where the
    /// weighted tap sum is exactly zero, in wrapping `i64` arithmetic.
    pub fn count_zeros(&self, board: ArrayView3<'_, i64>) -> u32 {
        let (_, height, width) = board.dim();
        if height < self.height || width < self.width {
            return 0;
        }
        let mut zeros = 0;
        for y in 0..=height - self.height {
            for x in 0..=width - self.width {
                // Two non-negative labels cannot wrap to a false zero.
                let acc = self.taps.iter().fold(0i64, |acc, tap| {
                    let label = board[[tap.side, y + tap.dy, x + tap.dx]];
                    acc.wrapping_add(tap.weight.wrapping_mul(label))
                });
                if acc == 0 {
                    zeros += 1;
                }
            }
        }
        zeros
    }
}

/// Matching side pairs of a single `[4, size, size]` board.
pub fn instance_matches(board: ArrayView3<'_, i64>) -> u32 {
    let equal: u32 = [HORIZONTAL_DIFF, VERTICAL_DIFF]
        .iter()
        .map(|stencil| stencil.count_zeros(board))
        .sum();
    let blank: u32 = [HORIZONTAL_SUM, VERTICAL_SUM]
        .iter()
        .map(|stencil| stencil.count_zeros(board))
        .sum();
    equal - blank
}

/// Matching side pairs of every instance of a `[batch, 4, size, size]` array.
pub fn matches(instances: &Array4<i64>) -> Array1<u32> {
    let counts: Vec<u32> = instances
        .outer_iter()
        .into_par_iter()
        .map(instance_matches)
        .collect();
    Array1::from(counts)
}
