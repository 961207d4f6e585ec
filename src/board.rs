//! Board layout, validation and generated instances.
//!
//! A batch of boards is a dense `[batch, 4, size, size]` array of side labels.
//! The side channel comes first, in the order North, East, South, West. Row
//! indices grow northwards, so the South side of a tile in row `r + 1` touches
//! the North side of the tile in row `r`. Tiles are addressed by their
//! row-major index `row * size + col`.
//!
//! Label 0 is the blank border edge and never counts as a match.

use std::fmt;

use ndarray::{Array4, ArrayD, ArrayView3, Ix4};
use rand::Rng;

use crate::error::EnvError;

pub const NORTH: usize = 0;
pub const EAST: usize = 1;
pub const SOUTH: usize = 2;
pub const WEST: usize = 3;

/// Number of sides per tile.
pub const N_SIDES: usize = 4;

/// Check the shape and labels of a batch of boards and fix its rank to 4.
///
/// Rejects tensors that are not `[batch, 4, size, size]`, boards smaller than
/// 2x2, empty batches and negative labels.
pub fn validate_instances(instances: ArrayD<i64>) -> Result<Array4<i64>, EnvError> {
    if instances.ndim() != 4 {
        return Err(EnvError::Validation(format!(
            "tensor must have 4 dimensions, got {}",
            instances.ndim()
        )));
    }
    let shape = instances.shape();
    if shape[1] != N_SIDES {
        return Err(EnvError::Validation(format!(
            "the pieces must have {N_SIDES} sides, got {}",
            shape[1]
        )));
    }
    if shape[2] != shape[3] {
        return Err(EnvError::Validation(format!(
            "instances are not squares ({}x{})",
            shape[2], shape[3]
        )));
    }
    if shape[2] < 2 {
        return Err(EnvError::Validation(format!(
            "boards must be at least 2x2, got {}x{}",
            shape[2], shape[3]
        )));
    }
    if shape[0] == 0 {
        return Err(EnvError::Validation("empty batch".to_string()));
    }
    if let Some(label) = instances.iter().find(|&&label| label < 0) {
        return Err(EnvError::Validation(format!(
            "classes must be non-negative, found {label}"
        )));
    }
    instances
        .into_dimensionality::<Ix4>()
        .map_err(|e| EnvError::Validation(e.to_string()))
}

/// Maximum number of matching side pairs on a `size x size` board.
#[inline]
pub fn best_matches(size: usize) -> u32 {
    (2 * size * (size - 1)) as u32
}

/// Split a row-major tile index into `(row, col)`.
#[inline]
pub fn tile_coords(tile: usize, size: usize) -> (usize, usize) {
    (tile / size, tile % size)
}

/// Build a solved `[1, 4, size, size]` board.
///
/// Border sides are blank and every interior edge gets a label drawn
/// uniformly from `1..=n_inner_classes`, so the result scores
/// `best_matches(size)`.
pub fn solved_instance<R: Rng + ?Sized>(
    size: usize,
    n_inner_classes: i64,
    rng: &mut R,
) -> Result<Array4<i64>, EnvError> {
    if size < 2 {
        return Err(EnvError::Config(format!("board size must be at least 2, got {size}")));
    }
    if n_inner_classes < 1 {
        return Err(EnvError::Config(format!(
            "need at least one inner class, got {n_inner_classes}"
        )));
    }

    let mut board = Array4::<i64>::zeros((1, N_SIDES, size, size));
    for row in 0..size {
        for col in 0..size {
            if row + 1 < size {
                let label = rng.gen_range(1..=n_inner_classes);
                board[[0, SOUTH, row + 1, col]] = label;
                board[[0, NORTH, row, col]] = label;
            }
            if col + 1 < size {
                let label = rng.gen_range(1..=n_inner_classes);
                board[[0, EAST, row, col]] = label;
                board[[0, WEST, row, col + 1]] = label;
            }
        }
    }
    Ok(board)
}

/// Text view of a single `[4, size, size]` board, northmost row first.
///
/// Each tile is printed as `N.E.S.W`.
pub struct InstanceDisplay<'a>(pub ArrayView3<'a, i64>);

impl fmt::Display for InstanceDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (_, size, _) = self.0.dim();
        for row in (0..size).rev() {
            let cells: Vec<String> = (0..size)
                .map(|col| {
                    format!(
                        "{:>2}.{:>2}.{:>2}.{:>2}",
                        self.0[[NORTH, row, col]],
                        self.0[[EAST, row, col]],
                        self.0[[SOUTH, row, col]],
                        self.0[[WEST, row, col]],
                    )
                })
                .collect();
            writeln!(f, "{}", cells.join(" | "))?;
        }
        Ok(())
    }
}
