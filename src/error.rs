use std::io;

/// Errors raised while building or configuring a batch.
///
/// Out-of-range action indices are not represented here: they are a caller
/// contract and fail through ordinary indexing panics.
#[derive(thiserror::Error, Debug)]
pub enum EnvError {
    #[error("invalid instances: {0}")]
    Validation(String),
    #[error("unknown mode: {0}")]
    InvalidMode(String),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
