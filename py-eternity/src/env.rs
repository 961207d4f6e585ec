//! PyO3 bindings for the batched environment

use eternity_batch::{BatchedEternityEnv, EnvConfig, EnvError};
use ndarray::Array2;
use numpy::{IntoPyArray, PyArray1, PyArray3, PyArray4, PyReadonlyArray2, PyReadonlyArrayDyn};
use pyo3::exceptions::{PyIOError, PyIndexError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

fn to_py_err(err: EnvError) -> PyErr {
    match err {
        EnvError::Io(e) => PyIOError::new_err(e.to_string()),
        other => PyValueError::new_err(other.to_string()),
    }
}

type StepResult<'py> = (
    Bound<'py, PyArray4<i64>>,
    Bound<'py, PyArray1<f32>>,
    Bound<'py, PyArray1<bool>>,
    bool,
    Bound<'py, PyDict>,
);

/// B edge-matching puzzles stepped in lockstep
#[pyclass(name = "BatchedEternityEnv")]
pub struct PyBatchedEnv {
    inner: BatchedEternityEnv,
}

#[pymethods]
impl PyBatchedEnv {
    /// Build from an int64 array of shape [B or 1, 4, size, size]
    #[new]
    #[pyo3(signature = (instances, batch_size = None, max_steps = None, seed = 0, reward = "delta"))]
    fn new(
        instances: PyReadonlyArrayDyn<'_, i64>,
        batch_size: Option<usize>,
        max_steps: Option<usize>,
        seed: u64,
        reward: &str,
    ) -> PyResult<Self> {
        let instances = instances.as_array().to_owned();
        let batch_size = batch_size.unwrap_or_else(|| instances.shape().first().copied().unwrap_or(0));
        let config = EnvConfig {
            batch_size,
            max_steps,
            seed,
            reward: reward.parse().map_err(to_py_err)?,
        };
        let inner = BatchedEternityEnv::from_config(instances, &config).map_err(to_py_err)?;
        Ok(PyBatchedEnv { inner })
    }

    /// Scramble all instances, or only `ids`
    #[pyo3(signature = (ids = None))]
    fn reset<'py>(
        &mut self,
        py: Python<'py>,
        ids: Option<Vec<usize>>,
    ) -> PyResult<(Bound<'py, PyArray4<i64>>, Bound<'py, PyDict>)> {
        if let Some(bad) = ids.iter().flatten().find(|&&id| id >= self.inner.batch_size()) {
            return Err(PyIndexError::new_err(format!(
                "instance id {bad} out of range (0..{})",
                self.inner.batch_size()
            )));
        }
        let (obs, _info) = self.inner.reset(ids.as_deref());
        Ok((obs.to_owned().into_pyarray_bound(py), PyDict::new_bound(py)))
    }

    /// Apply int64 actions of shape [B, 4] = (tile_1, shift_1, tile_2, shift_2)
    fn step<'py>(&mut self, py: Python<'py>, actions: PyReadonlyArray2<'_, i64>) -> PyResult<StepResult<'py>> {
        let actions = actions.as_array();
        let expected = (self.inner.batch_size(), 4);
        if actions.dim() != expected {
            return Err(PyValueError::new_err(format!(
                "actions must have shape {expected:?}, got {:?}",
                actions.dim()
            )));
        }
        let bounds = self.inner.action_space();
        for row in actions.rows() {
            for (&value, &bound) in row.iter().zip(bounds.iter()) {
                if value < 0 || value as usize >= bound {
                    return Err(PyIndexError::new_err(format!(
                        "action value {value} out of range (0..{bound})"
                    )));
                }
            }
        }
        let actions: Array2<usize> = actions.mapv(|v| v as usize);

        let inner = &mut self.inner;
        let (obs, rewards, terminated, truncated) = py.allow_threads(|| {
            let step = inner.step(actions.view());
            (step.observation.to_owned(), step.rewards, step.terminated, step.truncated)
        });
        Ok((
            obs.into_pyarray_bound(py),
            rewards.into_pyarray_bound(py),
            terminated.into_pyarray_bound(py),
            truncated,
            PyDict::new_bound(py),
        ))
    }

    #[pyo3(signature = (mode = "computer"))]
    fn render<'py>(&self, py: Python<'py>, mode: &str) -> PyResult<Bound<'py, PyArray4<i64>>> {
        let obs = self.inner.render(mode).map_err(to_py_err)?;
        Ok(obs.to_owned().into_pyarray_bound(py))
    }

    #[getter]
    fn matches<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<u32>> {
        self.inner.matches().into_pyarray_bound(py)
    }

    #[getter]
    fn best_possible_matches(&self) -> u32 { self.inner.best_possible_matches() }

    #[getter]
    fn board_size(&self) -> usize { self.inner.board_size() }

    #[getter]
    fn n_classes(&self) -> usize { self.inner.n_classes() }

    #[getter]
    fn batch_size(&self) -> usize { self.inner.batch_size() }

    #[getter]
    fn max_steps(&self) -> usize { self.inner.max_steps() }

    #[getter]
    fn step_count(&self) -> usize { self.inner.step_count() }

    #[getter]
    fn truncated(&self) -> bool { self.inner.truncated() }

    #[getter]
    fn terminated<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<bool>> {
        self.inner.terminated().to_owned().into_pyarray_bound(py)
    }

    #[getter]
    fn n_steps<'py>(&self, py: Python<'py>) -> Bound<'py, PyArray1<usize>> {
        self.inner.n_steps().to_owned().into_pyarray_bound(py)
    }

    /// Exclusive bounds of (tile_1, shift_1, tile_2, shift_2)
    #[getter]
    fn action_space(&self) -> Vec<usize> { self.inner.action_space().to_vec() }

    #[getter]
    fn best_matches_ever(&self) -> u32 { self.inner.stats().best_matches_ever }

    #[getter]
    fn total_won(&self) -> u64 { self.inner.stats().total_won }

    #[getter]
    fn rolling_matches(&self) -> f64 { self.inner.stats().rolling_matches }

    fn best_board_ever<'py>(&self, py: Python<'py>) -> Option<Bound<'py, PyArray3<i64>>> {
        self.inner.best_board_ever().map(|b| b.to_owned().into_pyarray_bound(py))
    }

    fn __repr__(&self) -> String {
        format!(
            "BatchedEternityEnv(batch_size={}, board_size={}, n_classes={}, step_count={})",
            self.inner.batch_size(),
            self.inner.board_size(),
            self.inner.n_classes(),
            self.inner.step_count()
        )
    }
}
