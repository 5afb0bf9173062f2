//! Bounded worker pool for the `(epoch × model)` job grid.
//!
//! Jobs are independent. Each one ends in a terminal state (fitted, cached,
//! sentinel or failed); a failure, including a panic inside the backend, is
//! confined to its own cell. `run_grid` returns only after every job has
//! finished, which is the join barrier the aggregation step relies on.

use std::panic::{AssertUnwindSafe, catch_unwind};

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::domain::{Epoch, FitKey, PosteriorSummary};
use crate::error::FitError;
use crate::fit::FitRunner;
use crate::io::FluxProvider;

/// One cell of the grid. Keys are fixed before dispatch, so no two jobs share a cache slot.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub key: FitKey,
    pub epoch: Epoch,
}

#[derive(Debug)]
pub struct JobOutcome {
    pub key: FitKey,
    pub result: Result<PosteriorSummary, FitError>,
}

/// Build the jobs for one target: every active epoch × every model.
pub fn grid_jobs(target: &str, epochs: &[Epoch], models: &[String], run_id: u32) -> Vec<Job> {
    epochs
        .iter()
        .flat_map(|epoch| {
            models.iter().map(move |model_id| Job {
                key: FitKey::new(target, epoch.label.as_str(), model_id.as_str(), run_id),
                epoch: epoch.clone(),
            })
        })
        .collect()
}

pub struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self, FitError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("sedfit-worker-{i}"))
            .build()
            .map_err(|e| FitError::Config(format!("Failed to start worker pool: {e}")))?;
        Ok(Self { pool })
    }

    pub fn size(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run every job; outcomes come back in job order.
    pub fn run_grid(&self, runner: &FitRunner<'_>, provider: &dyn FluxProvider, jobs: &[Job]) -> Vec<JobOutcome> {
        self.pool.install(|| {
            jobs.par_iter()
                .map(|job| JobOutcome {
                    key: job.key.clone(),
                    result: run_isolated(runner, provider, job),
                })
                .collect()
        })
    }
}

fn run_isolated(runner: &FitRunner<'_>, provider: &dyn FluxProvider, job: &Job) -> Result<PosteriorSummary, FitError> {
    match catch_unwind(AssertUnwindSafe(|| runner.run_from(&job.key, &job.epoch, provider))) {
        Ok(result) => result,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(FitError::Inference {
                target: job.key.target.clone(),
                epoch: job.key.epoch.clone(),
                model: job.key.model_id.clone(),
                reason: format!("panicked: {reason}"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FluxObservation, observations_from_arrays};
    use crate::fit::{FitCache, InferenceBackend, InferenceProblem, RawResult};
    use crate::models::ModelCatalog;
    use std::path::Path;

    struct Flat;

    impl FluxProvider for Flat {
        fn get(&self, _: &str, _: &Epoch) -> Result<Vec<FluxObservation>, FitError> {
            Ok(observations_from_arrays(&[0.2, 1.0, 5.0], &[1.0, 1.0, 1.0], &[0.1, 0.1, 0.1]).unwrap())
        }
    }

    /// Panics for one model, succeeds for the rest.
    struct Flaky;

    impl InferenceBackend for Flaky {
        fn run(&self, problem: &InferenceProblem<'_>, _: &Path, _: usize) -> Result<RawResult, String> {
            if problem.param_names.iter().any(|n| n == "peakfreq") {
                panic!("walker diverged");
            }
            let n = problem.n_params();
            Ok(RawResult {
                samples: vec![(problem.prior_transform)(&vec![0.5; n]); 4],
                logz: -3.0,
                paramnames: problem.param_names.to_vec(),
            })
        }
    }

    #[test]
    fn grid_covers_epochs_times_models() {
        let jobs = grid_jobs("X", &Epoch::sequence(&["a", "b"]), &["m1".into(), "m2".into(), "m3".into()], 2);
        assert_eq!(jobs.len(), 6);
        assert_eq!(jobs[4].key, FitKey::new("X", "b", "m2", 2));
    }

    #[test]
    fn panicking_job_does_not_take_down_siblings() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = ModelCatalog::standard();
        let cache = FitCache::new(dir.path());
        let runner = FitRunner::new(&catalog, &cache, &Flaky, 100);
        let models = vec!["powlaw".to_string(), "singSSA".to_string(), "singhomobremss".to_string()];
        let jobs = grid_jobs("X", &Epoch::sequence(&["e1", "e2"]), &models, 1);

        let pool = WorkerPool::new(2).unwrap();
        assert_eq!(pool.size(), 2);
        let outcomes = pool.run_grid(&runner, &Flat, &jobs);

        assert_eq!(outcomes.len(), 6);
        for o in &outcomes {
            if o.key.model_id == "singSSA" {
                assert!(matches!(&o.result, Err(FitError::Inference { reason, .. }) if reason.contains("walker diverged")));
            } else {
                assert_eq!(o.result.as_ref().unwrap().logz, -3.0);
            }
        }
    }
}
