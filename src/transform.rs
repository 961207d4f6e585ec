//! Batched in-place tile transformations.
//!
//! Every operation works on the whole `[batch, 4, size, size]` array at once.
//! Per-instance arguments are turned into indices on a flattened
//! `(batch * size * size)` tile axis, where instance `i`, tile `t` lives at
//! `i * size * size + t`. Each entry of that axis is the 4-label lane of one
//! tile.

use ndarray::{Array4, ArrayView3, Axis, Zip};

use crate::board::{tile_coords, N_SIDES};

/// Flattened batch offset of `tile` in `instance`.
///
/// Panics when `tile` is outside the board, the same way an out-of-range
/// index would.
#[inline]
pub fn flat_index(instance: usize, tile: usize, n_pieces: usize) -> usize {
    assert!(tile < n_pieces, "tile id {tile} out of range for {n_pieces} tiles");
    instance * n_pieces + tile
}

/// Circularly shift the side labels of every tile by its own amount.
///
/// `shifts` has one entry per tile of the flattened tile axis. Shifts follow
/// `torch.roll`: after a shift of `s`, side `c` holds the label that was on
/// side `(c - s) mod 4`. A shift of one moves the North label to the East
/// side, i.e. one clockwise quarter-turn.
///
/// Panics if `shifts.len()` is not `B * S * S`.
pub fn batched_roll(instances: &mut Array4<i64>, shifts: &[usize]) {
    let (batch, _, height, width) = instances.dim();
    let shifts = ArrayView3::from_shape((batch, height, width), shifts)
        .expect("one shift per tile of the batch");

    Zip::from(instances.lanes_mut(Axis(1)))
        .and(&shifts)
        .for_each(|mut lane, &shift| {
            let shift = shift % N_SIDES;
            if shift == 0 {
                return;
            }
            let mut sides = [0i64; N_SIDES];
            for (side, label) in sides.iter_mut().zip(lane.iter()) {
                *side = *label;
            }
            for (c, label) in lane.iter_mut().enumerate() {
                *label = sides[(c + N_SIDES - shift) % N_SIDES];
            }
        });
}

/// Rotate tile `tile_ids[i]` of instance `i` by `shifts[i]`.
///
/// Every other tile gets a zero shift, so a single batched roll touches only
/// the addressed tiles.
pub fn roll_tiles(instances: &mut Array4<i64>, tile_ids: &[usize], shifts: &[usize]) {
    let (batch, _, size, _) = instances.dim();
    let n_pieces = size * size;
    assert_eq!(tile_ids.len(), batch, "one tile id per instance");
    assert_eq!(shifts.len(), batch, "one shift per instance");

    let mut total_shifts = vec![0usize; batch * n_pieces];
    for (instance, (&tile, &shift)) in tile_ids.iter().zip(shifts).enumerate() {
        total_shifts[flat_index(instance, tile, n_pieces)] = shift;
    }
    batched_roll(instances, &total_shifts);
}

/// Exchange tiles `tile_ids_1[i]` and `tile_ids_2[i]` in every instance `i`.
///
/// The four labels move together; swapping a tile with itself is a no-op.
pub fn swap_tiles(instances: &mut Array4<i64>, tile_ids_1: &[usize], tile_ids_2: &[usize]) {
    let (batch, _, size, _) = instances.dim();
    let n_pieces = size * size;
    assert_eq!(tile_ids_1.len(), batch, "one tile id per instance");
    assert_eq!(tile_ids_2.len(), batch, "one tile id per instance");

    for (instance, (&t1, &t2)) in tile_ids_1.iter().zip(tile_ids_2).enumerate() {
        assert!(
            t1 < n_pieces && t2 < n_pieces,
            "tile ids ({t1}, {t2}) out of range for {n_pieces} tiles"
        );
        if t1 == t2 {
            continue;
        }
        let (ya, xa) = tile_coords(t1, size);
        let (yb, xb) = tile_coords(t2, size);
        for side in 0..N_SIDES {
            instances.swap([instance, side, ya, xa], [instance, side, yb, xb]);
        }
    }
}

/// Reorder the tiles of one instance so that tile `t` becomes the old tile
/// `permutation[t]`. Orientations are kept.
pub fn permute_tiles(instances: &mut Array4<i64>, instance: usize, permutation: &[usize]) {
    let (_, _, size, _) = instances.dim();
    assert_eq!(permutation.len(), size * size, "permutation must cover every tile");

    let previous = instances.index_axis(Axis(0), instance).to_owned();
    let mut board = instances.index_axis_mut(Axis(0), instance);
    for (tile, &source) in permutation.iter().enumerate() {
        let (y, x) = tile_coords(tile, size);
        let (sy, sx) = tile_coords(source, size);
        for side in 0..N_SIDES {
            board[[side, y, x]] = previous[[side, sy, sx]];
        }
    }
}
