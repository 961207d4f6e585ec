//! PyO3 Python bindings for eternity-batch
//!
//! Exposes the batched environment to a Python training loop. Boards,
//! rewards and flags are returned as numpy arrays.

use pyo3::prelude::*;

mod env;

pub use env::PyBatchedEnv;

/// Initialize the eternity_env Python module
#[pymodule]
fn eternity_env(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyBatchedEnv>()?;
    Ok(())
}
