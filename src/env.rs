//! The batched episode controller.
//!
//! [`BatchedEternityEnv`] owns a `[batch, 4, size, size]` label array and
//! evolves every instance in lockstep. `reset` scrambles boards with the
//! batch's own seeded RNG; `step` applies one compound action per instance
//! and scores the result.

use std::collections::BTreeMap;

use log::{debug, trace};
use ndarray::{Array1, Array2, Array3, Array4, ArrayD, ArrayView1, ArrayView2, ArrayView3, ArrayView4, Axis, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::board::{self, N_SIDES};
use crate::config::{EnvConfig, RenderMode, RewardMode};
use crate::error::EnvError;
use crate::{scorer, transform};

/// Auxiliary step/reset information. Always empty for now.
pub type Info = BTreeMap<String, f64>;

/// Result of a batched [`BatchedEternityEnv::step`].
#[derive(Debug)]
pub struct Step<'a> {
    /// Boards after the action, `[batch, 4, size, size]`.
    pub observation: ArrayView4<'a, i64>,
    /// Per-instance reward, `[batch]`.
    pub rewards: Array1<f32>,
    /// Per-instance solved flag. Sticky across steps until reset.
    pub terminated: Array1<bool>,
    /// Batch-wide flag: the step budget is exhausted.
    pub truncated: bool,
    pub info: Info,
}

/// Weight kept by [`EpisodeStats::rolling_matches`] on every step.
pub const ROLLING_DECAY: f64 = 0.9;

/// Lifetime statistics of a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EpisodeStats {
    /// Highest live match count seen on any instance after a step or reset.
    pub best_matches_ever: u32,
    /// Number of times an instance went from unsolved to solved.
    pub total_won: u64,
    /// Exponential moving average of the batch-mean match count, updated
    /// after every step. Seeded by the first step.
    pub rolling_matches: f64,
}

/// B edge-matching puzzles stepped together.
pub struct BatchedEternityEnv {
    instances: Array4<i64>,
    rng: StdRng,
    reward_mode: RewardMode,

    size: usize,
    n_pieces: usize,
    n_classes: usize,
    batch_size: usize,
    max_steps: usize,
    best_matches: u32,

    step_count: usize,
    truncated: bool,
    terminated: Array1<bool>,
    n_steps: Array1<usize>,

    stats: EpisodeStats,
    rolling_seeded: bool,
    best_board: Option<Array3<i64>>,
}

impl BatchedEternityEnv {
    /// Build a batch from a `[batch, 4, size, size]` tensor.
    ///
    /// The boards are used as given; call [`reset`](Self::reset) to scramble
    /// them. The step budget is `size * size`.
    pub fn new(instances: ArrayD<i64>, seed: u64) -> Result<Self, EnvError> {
        let instances = board::validate_instances(instances)?;
        Ok(Self::build(instances, seed, None, RewardMode::Delta))
    }

    /// Build a batch of `config.batch_size` instances.
    ///
    /// `instances` is either a single board `[1, 4, size, size]`, repeated
    /// across the batch, or a full `[batch_size, 4, size, size]` tensor.
    pub fn from_config(instances: ArrayD<i64>, config: &EnvConfig) -> Result<Self, EnvError> {
        config.validate()?;
        let instances = board::validate_instances(instances)?;
        let leading = instances.len_of(Axis(0));
        let instances = if leading == config.batch_size {
            instances
        } else if leading == 1 {
            let (_, sides, height, width) = instances.dim();
            instances
                .broadcast((config.batch_size, sides, height, width))
                .ok_or_else(|| EnvError::Config("cannot broadcast instances".to_string()))?
                .to_owned()
        } else {
            return Err(EnvError::Config(format!(
                "got {leading} instances for a batch of {}",
                config.batch_size
            )));
        };
        Ok(Self::build(instances, config.seed, config.max_steps, config.reward))
    }

    fn build(instances: Array4<i64>, seed: u64, max_steps: Option<usize>, reward_mode: RewardMode) -> Self {
        let (batch_size, _, size, _) = instances.dim();
        let n_pieces = size * size;
        let n_classes = instances.iter().copied().max().unwrap_or(0) as usize + 1;
        let max_steps = max_steps.unwrap_or(n_pieces);
        debug!(
            "batch of {batch_size} {size}x{size} instances, {n_classes} classes, {max_steps} max steps, seed {seed}"
        );

        Self {
            instances,
            rng: StdRng::seed_from_u64(seed),
            reward_mode,
            size,
            n_pieces,
            n_classes,
            batch_size,
            max_steps,
            best_matches: board::best_matches(size),
            step_count: 0,
            truncated: false,
            terminated: Array1::from_elem(batch_size, false),
            n_steps: Array1::zeros(batch_size),
            stats: EpisodeStats::default(),
            rolling_seeded: false,
            best_board: None,
        }
    }

    /// Scramble instances and clear their episode state.
    ///
    /// With `None` every instance is scrambled and the batch-wide step counter
    /// and truncation flag are cleared. With `Some(ids)` only the listed
    /// instances are scrambled and get their terminated flag and own step
    /// counter cleared; the batch-wide counter keeps running. Duplicate ids
    /// are scrambled once. Out-of-range ids panic.
    pub fn reset(&mut self, instance_ids: Option<&[usize]>) -> (ArrayView4<'_, i64>, Info) {
        let selected: Vec<usize> = match instance_ids {
            Some(ids) => {
                let mut ids = ids.to_vec();
                ids.sort_unstable();
                ids.dedup();
                ids
            }
            None => (0..self.batch_size).collect(),
        };

        self.scramble_instances(&selected);
        for &instance in &selected {
            self.terminated[instance] = false;
            self.n_steps[instance] = 0;
        }
        if instance_ids.is_none() {
            self.step_count = 0;
            self.truncated = false;
            debug!("reset all {} instances", self.batch_size);
        } else {
            debug!("reset {} of {} instances", selected.len(), self.batch_size);
        }

        let matches = self.matches();
        self.record_best(&matches);
        (self.instances.view(), Info::new())
    }

    /// Apply one compound action per instance.
    ///
    /// `actions` is `[batch, 4]` with rows `(tile_1, shift_1, tile_2, shift_2)`.
    /// Tile 1 is rotated, then tile 2, then the two are swapped. Tile ids
    /// outside the board panic.
    pub fn step(&mut self, actions: ArrayView2<'_, usize>) -> Step<'_> {
        assert_eq!(
            actions.dim(),
            (self.batch_size, 4),
            "actions must be [batch_size, 4]"
        );
        self.step_count += 1;
        self.n_steps.mapv_inplace(|n| n + 1);

        let tiles_1 = actions.column(0).to_vec();
        let shifts_1 = actions.column(1).to_vec();
        let tiles_2 = actions.column(2).to_vec();
        let shifts_2 = actions.column(3).to_vec();

        let before = self.matches();
        transform::roll_tiles(&mut self.instances, &tiles_1, &shifts_1);
        transform::roll_tiles(&mut self.instances, &tiles_2, &shifts_2);
        transform::swap_tiles(&mut self.instances, &tiles_1, &tiles_2);
        let after = self.matches();

        let best = self.best_matches;
        let mut newly_won = 0u64;
        Zip::from(&mut self.terminated).and(&after).for_each(|terminated, &m| {
            if m == best && !*terminated {
                *terminated = true;
                newly_won += 1;
            }
        });
        if newly_won > 0 {
            debug!("{newly_won} instance(s) solved at step {}", self.step_count);
        }
        self.stats.total_won += newly_won;
        self.truncated = self.step_count >= self.max_steps;

        let rewards = self.reward_mode.rewards(&before, &after, self.best_matches);
        self.record_best(&after);
        let mean = after.iter().map(|&m| m as f64).sum::<f64>() / self.batch_size as f64;
        self.stats.rolling_matches = if self.rolling_seeded {
            ROLLING_DECAY * self.stats.rolling_matches + (1.0 - ROLLING_DECAY) * mean
        } else {
            self.rolling_seeded = true;
            mean
        };
        trace!("step {}: mean matches {mean:.2}", self.step_count);

        Step {
            observation: self.instances.view(),
            rewards,
            terminated: self.terminated.clone(),
            truncated: self.truncated,
            info: Info::new(),
        }
    }

    /// Current boards in the requested mode.
    pub fn render(&self, mode: &str) -> Result<ArrayView4<'_, i64>, EnvError> {
        match mode.parse::<RenderMode>()? {
            RenderMode::Computer => Ok(self.instances.view()),
        }
    }

    /// Current boards, `[batch, 4, size, size]`.
    pub fn observation(&self) -> ArrayView4<'_, i64> {
        self.instances.view()
    }

    /// Live match count of every instance.
    pub fn matches(&self) -> Array1<u32> {
        scorer::matches(&self.instances)
    }

    /// Draw one uniformly random legal action per instance.
    ///
    /// Uses the caller's RNG; the batch's own generator is reserved for
    /// scrambling.
    pub fn sample_actions<R: Rng + ?Sized>(&self, rng: &mut R) -> Array2<usize> {
        let bounds = self.action_space();
        Array2::from_shape_fn((self.batch_size, bounds.len()), |(_, column)| {
            rng.gen_range(0..bounds[column])
        })
    }

    /// Exclusive upper bound of each action column:
    /// `[tiles, 4, tiles, 4]` for `(tile_1, shift_1, tile_2, shift_2)`.
    pub fn action_space(&self) -> [usize; 4] {
        [self.n_pieces, N_SIDES, self.n_pieces, N_SIDES]
    }

    pub fn best_possible_matches(&self) -> u32 { self.best_matches }

    pub fn board_size(&self) -> usize { self.size }

    pub fn n_pieces(&self) -> usize { self.n_pieces }

    pub fn n_classes(&self) -> usize { self.n_classes }

    pub fn batch_size(&self) -> usize { self.batch_size }

    pub fn max_steps(&self) -> usize { self.max_steps }

    pub fn step_count(&self) -> usize { self.step_count }

    pub fn truncated(&self) -> bool { self.truncated }

    pub fn terminated(&self) -> ArrayView1<'_, bool> { self.terminated.view() }

    /// Steps taken by each instance since its own last reset.
    pub fn n_steps(&self) -> ArrayView1<'_, usize> { self.n_steps.view() }

    pub fn stats(&self) -> EpisodeStats { self.stats }

    /// Snapshot of the board that reached [`EpisodeStats::best_matches_ever`].
    pub fn best_board_ever(&self) -> Option<ArrayView3<'_, i64>> {
        self.best_board.as_ref().map(|b| b.view())
    }

    /// Apply a random permutation, then a random rotation to every tile, of
    /// each selected instance.
    fn scramble_instances(&mut self, selected: &[usize]) {
        let mut permutation: Vec<usize> = (0..self.n_pieces).collect();
        for &instance in selected {
            permutation.sort_unstable();
            permutation.shuffle(&mut self.rng);
            transform::permute_tiles(&mut self.instances, instance, &permutation);
        }

        let mut shifts = vec![0usize; self.batch_size * self.n_pieces];
        for &instance in selected {
            for tile in 0..self.n_pieces {
                shifts[transform::flat_index(instance, tile, self.n_pieces)] =
                    self.rng.gen_range(0..N_SIDES);
            }
        }
        transform::batched_roll(&mut self.instances, &shifts);
    }

    fn record_best(&mut self, matches: &Array1<u32>) {
        let best = matches
            .iter()
            .enumerate()
            .max_by_key(|&(instance, &m)| (m, std::cmp::Reverse(instance)));
        if let Some((instance, &m)) = best {
            if self.best_board.is_none() || m > self.stats.best_matches_ever {
                self.stats.best_matches_ever = m;
                self.best_board = Some(self.instances.index_axis(Axis(0), instance).to_owned());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, IxDyn};

    /// `[1, 4, size, size]` board from per-tile `[N, E, S, W]` labels.
    fn from_tiles(size: usize, tiles: &[[i64; 4]]) -> ArrayD<i64> {
        let mut b = ArrayD::<i64>::zeros(IxDyn(&[1, 4, size, size]));
        for (t, sides) in tiles.iter().enumerate() {
            let (y, x) = board::tile_coords(t, size);
            for (side, &label) in sides.iter().enumerate() {
                b[[0, side, y, x]] = label;
            }
        }
        b
    }

    /// A 2x2 board with zero matches: the solved board with tiles 0 and 3
    /// each turned by half a revolution.
    fn scrambled_2x2() -> ArrayD<i64> {
        from_tiles(2, &[[0, 0, 3, 1], [4, 0, 0, 1], [0, 2, 3, 0], [4, 2, 0, 0]])
    }

    /// Undo the half turns of `scrambled_2x2` in two steps.
    fn solve_2x2(env: &mut BatchedEternityEnv) {
        env.step(array![[0, 2, 0, 0]].view());
        env.step(array![[3, 2, 3, 0]].view());
    }

    fn solved_batch(size: usize, batch_size: usize, seed: u64) -> BatchedEternityEnv {
        let mut rng = StdRng::seed_from_u64(seed);
        let solved = board::solved_instance(size, 5, &mut rng).unwrap();
        let config = EnvConfig { batch_size, seed, ..EnvConfig::default() };
        BatchedEternityEnv::from_config(solved.into_dyn(), &config).unwrap()
    }

    /// Tiles of one instance with each tile put in its smallest rotation, sorted.
    fn canonical_tiles(env: &BatchedEternityEnv, instance: usize) -> Vec<[i64; 4]> {
        let b = env.observation();
        let size = env.board_size();
        let mut tiles: Vec<[i64; 4]> = (0..size * size)
            .map(|t| {
                let (y, x) = board::tile_coords(t, size);
                let sides = [0, 1, 2, 3].map(|s| b[[instance, s, y, x]]);
                (0..4)
                    .map(|r| [0, 1, 2, 3].map(|c| sides[(c + r) % 4]))
                    .min()
                    .unwrap()
            })
            .collect();
        tiles.sort();
        tiles
    }

    #[test]
    fn exposes_dimensions() {
        let env = BatchedEternityEnv::new(scrambled_2x2(), 0).unwrap();
        assert_eq!(env.board_size(), 2);
        assert_eq!(env.batch_size(), 1);
        assert_eq!(env.n_classes(), 5);
        assert_eq!(env.max_steps(), 4);
        assert_eq!(env.best_possible_matches(), 4);
        assert_eq!(env.action_space(), [4, 4, 4, 4]);
        assert_eq!(env.matches()[0], 0);
    }

    #[test]
    fn scripted_rewards_and_termination() {
        let mut env = BatchedEternityEnv::new(scrambled_2x2(), 0).unwrap();

        let step = env.step(array![[0, 2, 0, 0]].view());
        assert_eq!(step.rewards[0], 0.5);
        assert!(!step.terminated[0]);
        assert!(!step.truncated);
        assert!(step.info.is_empty());
        assert_eq!(env.matches()[0], 2);

        let step = env.step(array![[3, 2, 3, 0]].view());
        assert_eq!(step.rewards[0], 0.5);
        assert!(step.terminated[0]);
        assert_eq!(env.stats().total_won, 1);
        assert_eq!(env.stats().best_matches_ever, 4);
    }

    #[test]
    fn termination_is_sticky() {
        let mut env = BatchedEternityEnv::new(scrambled_2x2(), 0).unwrap();
        solve_2x2(&mut env);
        assert!(env.terminated()[0]);

        let step = env.step(array![[0, 1, 0, 0]].view());
        assert_eq!(step.rewards[0], -0.5);
        assert!(step.terminated[0]);
        assert_eq!(env.matches()[0], 2);

        // Solving again does not count as a new win.
        env.step(array![[0, 3, 0, 0]].view());
        assert_eq!(env.stats().total_won, 1);
    }

    #[test]
    fn compound_action_rotates_then_swaps() {
        let mut env = BatchedEternityEnv::new(scrambled_2x2(), 0).unwrap();
        let tile = |env: &BatchedEternityEnv, t: usize| {
            let (y, x) = board::tile_coords(t, 2);
            [0, 1, 2, 3].map(|s| env.observation()[[0, s, y, x]])
        };

        // Tile 0 [0, 0, 3, 1] turned once, tile 3 [4, 2, 0, 0] turned twice,
        // then the two trade places.
        env.step(array![[0, 1, 3, 2]].view());
        assert_eq!(tile(&env, 0), [0, 0, 4, 2]);
        assert_eq!(tile(&env, 3), [1, 0, 0, 3]);
        assert_eq!(tile(&env, 1), [4, 0, 0, 1]);
        assert_eq!(tile(&env, 2), [0, 2, 3, 0]);
    }

    #[test]
    fn rolling_matches_averages_steps() {
        let mut env = BatchedEternityEnv::new(scrambled_2x2(), 0).unwrap();
        assert_eq!(env.stats().rolling_matches, 0.0);
        env.step(array![[0, 2, 0, 0]].view());
        assert_eq!(env.stats().rolling_matches, 2.0);
        env.step(array![[3, 2, 3, 0]].view());
        let expected = ROLLING_DECAY * 2.0 + (1.0 - ROLLING_DECAY) * 4.0;
        assert!((env.stats().rolling_matches - expected).abs() < 1e-12);
    }

    #[test]
    fn truncates_at_step_budget() {
        let mut env = BatchedEternityEnv::new(scrambled_2x2(), 0).unwrap();
        for expected in [false, false, false, true, true] {
            let step = env.step(array![[1, 0, 1, 0]].view());
            assert_eq!(step.truncated, expected);
        }
        assert_eq!(env.step_count(), 5);
    }

    #[test]
    fn max_steps_override() {
        let config = EnvConfig { batch_size: 1, max_steps: Some(2), ..EnvConfig::default() };
        let mut env = BatchedEternityEnv::from_config(scrambled_2x2(), &config).unwrap();
        assert!(!env.step(array![[1, 0, 1, 0]].view()).truncated);
        assert!(env.step(array![[1, 0, 1, 0]].view()).truncated);
    }

    #[test]
    fn full_reset_clears_episode_state() {
        let mut env = solved_batch(3, 4, 11);
        assert!(env.matches().iter().all(|&m| m == 12));
        let actions = Array2::from_elem((4, 4), 0usize);
        assert!(env.step(actions.view()).terminated.iter().all(|&t| t));

        let (obs, info) = env.reset(None);
        assert_eq!(obs.dim(), (4, 4, 3, 3));
        assert!(info.is_empty());
        assert_eq!(env.step_count(), 0);
        assert!(!env.truncated());
        assert!(env.terminated().iter().all(|&t| !t));
        assert!(env.n_steps().iter().all(|&n| n == 0));
    }

    #[test]
    fn reset_keeps_the_tile_set() {
        let mut env = solved_batch(4, 2, 3);
        let before: Vec<_> = (0..2).map(|i| canonical_tiles(&env, i)).collect();
        env.reset(None);
        for (i, tiles) in before.iter().enumerate() {
            assert_eq!(&canonical_tiles(&env, i), tiles);
        }
        assert!(env.matches().iter().all(|&m| m <= env.best_possible_matches()));
    }

    #[test]
    fn partial_reset_only_touches_selected() {
        let mut env = solved_batch(4, 3, 5);
        let actions = Array2::from_elem((3, 4), 0usize);
        env.step(actions.view());
        let before = env.observation().to_owned();

        env.reset(Some(&[1usize, 1][..]));
        let after = env.observation();
        assert_eq!(after.index_axis(Axis(0), 0), before.index_axis(Axis(0), 0));
        assert_eq!(after.index_axis(Axis(0), 2), before.index_axis(Axis(0), 2));
        assert_ne!(after.index_axis(Axis(0), 1), before.index_axis(Axis(0), 1));

        assert_eq!(env.terminated().to_vec(), vec![true, false, true]);
        assert_eq!(env.n_steps().to_vec(), vec![1, 0, 1]);
        assert_eq!(env.step_count(), 1);
    }

    #[test]
    fn same_seed_same_scramble() {
        let mut a = solved_batch(4, 3, 42);
        let mut b = solved_batch(4, 3, 42);
        a.reset(None);
        b.reset(None);
        assert_eq!(a.observation(), b.observation());
        a.reset(Some(&[2usize][..]));
        b.reset(Some(&[2usize][..]));
        assert_eq!(a.observation(), b.observation());
    }

    #[test]
    fn broadcasts_a_single_board() {
        let env = solved_batch(3, 5, 1);
        let obs = env.observation();
        assert_eq!(obs.dim(), (5, 4, 3, 3));
        for i in 1..5 {
            assert_eq!(obs.index_axis(Axis(0), i), obs.index_axis(Axis(0), 0));
        }
    }

    #[test]
    fn rejects_mismatched_batch() {
        let t = ArrayD::<i64>::zeros(IxDyn(&[3, 4, 2, 2]));
        let config = EnvConfig { batch_size: 2, ..EnvConfig::default() };
        assert!(matches!(BatchedEternityEnv::from_config(t, &config), Err(EnvError::Config(_))));
    }

    #[test]
    fn render_modes() {
        let env = BatchedEternityEnv::new(scrambled_2x2(), 0).unwrap();
        assert_eq!(env.render("computer").unwrap(), env.observation());
        assert!(matches!(env.render("rgb_array"), Err(EnvError::InvalidMode(_))));
    }

    #[test]
    fn sampled_actions_stay_in_bounds() {
        let env = solved_batch(4, 8, 0);
        let mut rng = StdRng::seed_from_u64(9);
        let actions = env.sample_actions(&mut rng);
        assert_eq!(actions.dim(), (8, 4));
        let bounds = env.action_space();
        for row in actions.rows() {
            for (value, bound) in row.iter().zip(bounds) {
                assert!(*value < bound);
            }
        }
    }

    #[test]
    fn best_matches_ever_ignores_construction_boards() {
        let mut env = solved_batch(4, 4, 8);
        assert_eq!(env.stats().best_matches_ever, 0);
        assert!(env.best_board_ever().is_none());

        env.reset(None);
        let live = env.matches();
        let live_max = live.iter().copied().max().unwrap();
        assert!(live_max < env.best_possible_matches());
        assert_eq!(env.stats().best_matches_ever, live_max);
        let leader = live.iter().position(|&m| m == live_max).unwrap();
        assert_eq!(env.best_board_ever().unwrap(), env.observation().index_axis(Axis(0), leader));
    }

    #[test]
    fn best_board_tracks_the_record() {
        let mut env = BatchedEternityEnv::new(scrambled_2x2(), 0).unwrap();
        assert_eq!(env.stats().best_matches_ever, 0);
        solve_2x2(&mut env);
        let best = env.best_board_ever().unwrap().to_owned();
        assert_eq!(env.stats().best_matches_ever, 4);
        assert_eq!(best, env.observation().index_axis(Axis(0), 0));
    }

    #[test]
    #[should_panic]
    fn out_of_range_action_panics() {
        let mut env = BatchedEternityEnv::new(scrambled_2x2(), 0).unwrap();
        env.step(array![[4, 0, 0, 0]].view());
    }
}
