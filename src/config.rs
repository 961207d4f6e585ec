use std::fmt;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::EnvError;

/// How step rewards are derived from match counts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RewardMode {
    /// `(matches_after - matches_before) / best_matches` every step.
    #[default]
    Delta,
}

impl RewardMode {
    pub fn rewards(self, before: &Array1<u32>, after: &Array1<u32>, best_matches: u32) -> Array1<f32> {
        match self {
            RewardMode::Delta => {
                let best = best_matches as f32;
                ndarray::Zip::from(after)
                    .and(before)
                    .map_collect(|&a, &b| (a as f32 - b as f32) / best)
            }
        }
    }
}

impl FromStr for RewardMode {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delta" => Ok(RewardMode::Delta),
            other => Err(EnvError::InvalidMode(format!("unknown reward mode: {other}"))),
        }
    }
}

impl TryFrom<String> for RewardMode {
    type Error = EnvError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RewardMode> for String {
    fn from(mode: RewardMode) -> Self {
        mode.to_string()
    }
}

impl fmt::Display for RewardMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RewardMode::Delta => f.write_str("delta"),
        }
    }
}

/// Observation rendering modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderMode {
    /// The raw `[batch, 4, size, size]` label array.
    Computer,
}

impl FromStr for RenderMode {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "computer" => Ok(RenderMode::Computer),
            other => Err(EnvError::InvalidMode(format!("unknown rendering type: {other}"))),
        }
    }
}

/// Batch construction settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvConfig {
    /// Number of instances; a single initial board is repeated to this size.
    #[serde(default = "defaults::batch_size")]
    pub batch_size: usize,
    /// Step budget override. Defaults to the number of tiles on the board.
    #[serde(default)]
    pub max_steps: Option<usize>,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub reward: RewardMode,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::batch_size(),
            max_steps: None,
            seed: 0,
            reward: RewardMode::default(),
        }
    }
}

impl EnvConfig {
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self, EnvError> {
        let mut file = std::fs::File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let cfg: Self = toml::from_str(&contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), EnvError> {
        if self.batch_size == 0 {
            return Err(EnvError::Config("batch_size must be positive".to_string()));
        }
        if self.max_steps == Some(0) {
            return Err(EnvError::Config("max_steps must be positive".to_string()));
        }
        Ok(())
    }
}

mod defaults {
    pub fn batch_size() -> usize { 64 }
}
