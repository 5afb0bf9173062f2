//! Built-in nested sampler.
//!
//! A compact, deterministic (seeded) implementation of Skilling's nested
//! sampling:
//!
//! - draw `n_live` points uniformly in the unit cube
//! - repeatedly retire the lowest-likelihood point, crediting its likelihood
//!   times the prior-volume shell `X_{i-1} - X_i` (`X_i = e^{-i/n_live}`)
//! - replace it by a constrained random walk started from a surviving point
//! - stop at the iteration budget, or once the live points can add less than
//!   `dlogz` to `ln Z`
//!
//! Posterior samples are obtained by systematic resampling of the weighted
//! dead + live points. The sampler writes `sampler.json` diagnostics into the
//! working directory.

use std::fs;
use std::path::Path;

use log::debug;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use serde::Serialize;

use crate::domain::SamplerConfig;
use crate::fit::backend::{InferenceBackend, InferenceProblem, RawResult};
use crate::math::log_add_exp;

/// Bounds on the random-walk step (unit-cube units).
const MIN_STEP: f64 = 1e-6;
const MAX_STEP: f64 = 0.5;
/// Acceptance rate the step scale is steered towards.
const TARGET_ACCEPTANCE: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct NestedSampler {
    n_live: usize,
    walk_steps: usize,
    dlogz: f64,
    seed: u64,
}

#[derive(Debug, Clone)]
struct Point {
    cube: Vec<f64>,
    theta: Vec<f64>,
    logl: f64,
}

#[derive(Debug, Serialize)]
struct Diagnostics {
    iterations: usize,
    likelihood_calls: usize,
    n_live: usize,
    logz: f64,
    logz_err: f64,
    information: f64,
    converged: bool,
    seed: u64,
}

impl NestedSampler {
    pub fn new(config: &SamplerConfig) -> Self {
        Self {
            n_live: config.n_live.max(2),
            walk_steps: config.walk_steps.max(1),
            dlogz: config.dlogz,
            seed: config.seed,
        }
    }

    /// Seed mixed with the last four components of the working directory
    /// (`target/epoch/model/runN`), so sibling runs differ but re-running one
    /// cell is reproducible wherever the cache lives.
    fn run_seed(&self, working_dir: &Path) -> u64 {
        let mut h: u64 = 0xcbf2_9ce4_8422_2325;
        for part in working_dir.components().rev().take(4) {
            for b in part.as_os_str().to_string_lossy().bytes().chain([b'/']) {
                h ^= b as u64;
                h = h.wrapping_mul(0x0100_0000_01b3);
            }
        }
        h ^ self.seed
    }
}

impl InferenceBackend for NestedSampler {
    fn run(
        &self,
        problem: &InferenceProblem<'_>,
        working_dir: &Path,
        max_iters: usize,
    ) -> Result<RawResult, String> {
        let ndim = problem.n_params();
        if ndim == 0 {
            return Err("model has no free parameters".into());
        }
        let mut rng = StdRng::seed_from_u64(self.run_seed(working_dir));
        let normal = Normal::new(0.0, 1.0).map_err(|e| format!("noise distribution error: {e}"))?;

        let mut calls = 0usize;
        let mut eval = |cube: Vec<f64>, calls: &mut usize| -> Point {
            *calls += 1;
            let theta = (problem.prior_transform)(&cube);
            let logl = (problem.log_likelihood)(&theta);
            let logl = if logl.is_nan() { f64::NEG_INFINITY } else { logl };
            Point { cube, theta, logl }
        };

        let mut live: Vec<Point> = (0..self.n_live)
            .map(|_| {
                let cube: Vec<f64> = (0..ndim).map(|_| rng.r#gen::<f64>()).collect();
                eval(cube, &mut calls)
            })
            .collect();

        let n = self.n_live as f64;
        let log_shrink = (-(1.0 / n)).exp_m1().abs().ln(); // ln(1 - e^{-1/n})
        let mut log_z = f64::NEG_INFINITY;
        let mut information = 0.0;
        let mut dead: Vec<(Vec<f64>, f64)> = Vec::new(); // (theta, log weight)
        let mut step = 0.1;
        let mut converged = false;
        let mut iterations = 0;

        for i in 0..max_iters {
            iterations = i + 1;
            let worst = argmin_logl(&live);
            let log_x_prev = -(i as f64) / n;
            let log_width = log_x_prev + log_shrink;
            let l_min = live[worst].logl;
            let log_wt = l_min + log_width;

            let log_z_new = log_add_exp(log_z, log_wt);
            if log_z_new.is_finite() && log_wt.is_finite() {
                let carried = if log_z.is_finite() {
                    (log_z - log_z_new).exp() * (information + log_z)
                } else {
                    0.0
                };
                information = (log_wt - log_z_new).exp() * l_min + carried - log_z_new;
            }
            log_z = log_z_new;
            dead.push((live[worst].theta.clone(), log_wt));

            replace_worst(
                &mut live,
                worst,
                l_min,
                &mut rng,
                &normal,
                &mut step,
                self.walk_steps,
                &mut eval,
                &mut calls,
            );

            // Stop once the remaining prior volume can raise ln Z by less than dlogz.
            let max_live = live.iter().map(|p| p.logl).fold(f64::NEG_INFINITY, f64::max);
            if max_live == f64::NEG_INFINITY {
                break;
            }
            let log_x = -((i + 1) as f64) / n;
            if log_z.is_finite() && log_add_exp(log_z, max_live + log_x) - log_z < self.dlogz {
                converged = true;
                break;
            }
        }

        // Remaining live points share the final volume equally.
        let log_x_final = -(iterations as f64) / n;
        for p in &live {
            let log_wt = p.logl + log_x_final - n.ln();
            log_z = log_add_exp(log_z, log_wt);
            dead.push((p.theta.clone(), log_wt));
        }

        if !log_z.is_finite() {
            return Err("log-likelihood was -inf over the whole prior".into());
        }

        let samples = resample(&dead, log_z, &mut rng);
        let logz_err = (information.max(0.0) / n).sqrt();
        debug!(
            "nested sampling: {iterations} iterations, {calls} calls, lnZ = {log_z:.3} +/- {logz_err:.3}"
        );

        write_diagnostics(
            working_dir,
            &Diagnostics {
                iterations,
                likelihood_calls: calls,
                n_live: self.n_live,
                logz: log_z,
                logz_err,
                information,
                converged,
                seed: self.seed,
            },
        )?;

        Ok(RawResult {
            samples,
            logz: log_z,
            paramnames: problem.param_names.to_vec(),
        })
    }
}

fn argmin_logl(live: &[Point]) -> usize {
    let mut idx = 0;
    for (i, p) in live.iter().enumerate() {
        if p.logl < live[idx].logl {
            idx = i;
        }
    }
    idx
}

/// Replace `live[worst]` with a point satisfying `logl > l_min`.
///
/// Starts from a random other live point and takes `walk_steps` Gaussian steps
/// in the unit cube, accepting only moves that stay above the threshold.
#[allow(clippy::too_many_arguments)]
fn replace_worst<R: Rng, F: FnMut(Vec<f64>, &mut usize) -> Point>(
    live: &mut [Point],
    worst: usize,
    l_min: f64,
    rng: &mut R,
    normal: &Normal<f64>,
    step: &mut f64,
    walk_steps: usize,
    eval: &mut F,
    calls: &mut usize,
) {
    let n_live = live.len();
    let start = if n_live > 1 {
        let mut j = rng.gen_range(0..n_live - 1);
        if j >= worst {
            j += 1;
        }
        j
    } else {
        worst
    };

    let mut current = live[start].clone();
    let mut accepted = 0usize;
    for _ in 0..walk_steps {
        let proposal: Vec<f64> = current
            .cube
            .iter()
            .map(|&u| reflect(u + *step * normal.sample(rng)))
            .collect();
        let candidate = eval(proposal, calls);
        if candidate.logl > l_min {
            current = candidate;
            accepted += 1;
        }
    }

    let rate = accepted as f64 / walk_steps as f64;
    *step = (*step * (rate - TARGET_ACCEPTANCE).exp()).clamp(MIN_STEP, MAX_STEP);

    live[worst] = current;
}

/// Fold a coordinate back into `[0, 1]`.
fn reflect(u: f64) -> f64 {
    let mut v = u.rem_euclid(2.0);
    if v > 1.0 {
        v = 2.0 - v;
    }
    v
}

/// Systematic resampling of weighted points into equally weighted samples.
fn resample<R: Rng>(points: &[(Vec<f64>, f64)], log_z: f64, rng: &mut R) -> Vec<Vec<f64>> {
    let n = points.len();
    let weights: Vec<f64> = points.iter().map(|(_, lw)| (lw - log_z).exp()).collect();
    let total: f64 = weights.iter().sum();
    if !(total.is_finite() && total > 0.0) {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(n);
    let offset: f64 = rng.r#gen::<f64>();
    let mut cum = 0.0;
    let mut j = 0;
    for k in 0..n {
        let target = (k as f64 + offset) / n as f64 * total;
        while j < n - 1 && cum + weights[j] < target {
            cum += weights[j];
            j += 1;
        }
        out.push(points[j].0.clone());
    }
    out
}

fn write_diagnostics(working_dir: &Path, diag: &Diagnostics) -> Result<(), String> {
    fs::create_dir_all(working_dir)
        .map_err(|e| format!("Failed to create '{}': {e}", working_dir.display()))?;
    let path = working_dir.join("sampler.json");
    let text = serde_json::to_string_pretty(diag).map_err(|e| format!("Failed to encode diagnostics: {e}"))?;
    fs::write(&path, text).map_err(|e| format!("Failed to write '{}': {e}", path.display()))
}
