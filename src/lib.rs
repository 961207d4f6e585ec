//! eternity-batch: a batched edge-matching puzzle environment
//!
//! This crate provides:
//! - Board layout helpers, validation and generated solved instances (`board`)
//! - Batched in-place tile rotation, swap and permutation (`transform`)
//! - Stencil-based match counting over a whole batch (`scorer`)
//! - The episode controller `BatchedEternityEnv` with seeded scrambling,
//!   delta rewards and sticky termination (`env`)
//!
//! Boards are dense `ndarray` arrays of shape `[batch, 4, size, size]`, side
//! channels ordered North, East, South, West. Label 0 is the blank border.
//!
//! Quick start:
//! ```
//! use eternity_batch::{board, BatchedEternityEnv, EnvConfig};
//! use rand::{rngs::StdRng, SeedableRng};
//!
//! // A solved 4x4 board, repeated over a batch of 8.
//! let mut rng = StdRng::seed_from_u64(42);
//! let solved = board::solved_instance(4, 3, &mut rng)?;
//! let config = EnvConfig { batch_size: 8, seed: 7, ..EnvConfig::default() };
//! let mut env = BatchedEternityEnv::from_config(solved.into_dyn(), &config)?;
//! assert!(env.matches().iter().all(|&m| m == env.best_possible_matches()));
//!
//! // Scramble, then take one random step.
//! env.reset(None);
//! let actions = env.sample_actions(&mut rng);
//! let step = env.step(actions.view());
//! assert_eq!(step.rewards.len(), 8);
//! assert!(!step.truncated);
//! # Ok::<(), eternity_batch::EnvError>(())
//! ```
//!
pub mod board;
pub mod config;
pub mod env;
pub mod error;
pub mod scorer;
pub mod transform;

pub use config::{EnvConfig, RenderMode, RewardMode};
pub use env::{BatchedEternityEnv, EpisodeStats, Info, Step};
pub use error::EnvError;
