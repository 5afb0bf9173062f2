//! Prior transforms: unit hypercube → parameter space.
//!
//! All priors are independent per parameter, so each transform is built from
//! the per-parameter maps below.

/// Flux normalisation, log-uniform over `[0.1, 100]` Jy.
fn norm(u: f64) -> f64 {
    10f64.powf(u * 3.0 - 1.0)
}

/// Spectral index, uniform over `[-10, 10]`.
fn index(u: f64) -> f64 {
    u * 20.0 - 10.0
}

/// Turnover frequency, uniform over `[0, 0.5]` GHz.
fn peak(u: f64) -> f64 {
    u * 0.5
}

/// Turnover frequency of the inhomogeneous exponential-break model, uniform over `[0, 0.3]` GHz.
fn narrow_peak(u: f64) -> f64 {
    u * 0.3
}

/// Inhomogeneity index `p`, uniform over `[-1, 1]`.
fn inhomogeneity(u: f64) -> f64 {
    u * 2.0 - 1.0
}

/// Curvature `q`, uniform over `[-2, 2]`.
fn curvature(u: f64) -> f64 {
    u * 4.0 - 2.0
}

/// Break frequency, log-uniform over `[2, 200]` GHz.
fn break_freq(u: f64) -> f64 {
    10f64.powf(u * 2.0) * 2.0
}

/// Continuous-injection break frequency, log-uniform over `[0.1, 100]` GHz.
fn injection_break_freq(u: f64) -> f64 {
    10f64.powf(u * 3.0 - 1.0)
}

fn apply(cube: &[f64], maps: &[fn(f64) -> f64]) -> Vec<f64> {
    cube.iter().zip(maps).map(|(&u, f)| f(u)).collect()
}

pub fn power_law(cube: &[f64]) -> Vec<f64> {
    apply(cube, &[norm, index])
}

pub fn curved_power_law(cube: &[f64]) -> Vec<f64> {
    apply(cube, &[norm, index, curvature])
}

/// Shared by SSA, homogeneous and internal FFA (`Snorm, index, peak`).
pub fn absorbed(cube: &[f64]) -> Vec<f64> {
    apply(cube, &[norm, index, peak])
}

pub fn inhomogeneous(cube: &[f64]) -> Vec<f64> {
    apply(cube, &[norm, index, inhomogeneity, peak])
}

/// Absorbed component with an exponential break (`Snorm, index, peak, breakfreq`).
pub fn absorbed_break(cube: &[f64]) -> Vec<f64> {
    apply(cube, &[norm, index, peak, break_freq])
}

pub fn absorbed_curve(cube: &[f64]) -> Vec<f64> {
    apply(cube, &[norm, index, peak, curvature])
}

pub fn inhomogeneous_break_exp(cube: &[f64]) -> Vec<f64> {
    apply(cube, &[norm, index, inhomogeneity, narrow_peak, break_freq])
}

pub fn inhomogeneous_curve(cube: &[f64]) -> Vec<f64> {
    apply(cube, &[norm, index, inhomogeneity, peak, curvature])
}

pub fn absorbed_injection_break(cube: &[f64]) -> Vec<f64> {
    apply(cube, &[norm, index, peak, injection_break_freq])
}

pub fn inhomogeneous_injection_break(cube: &[f64]) -> Vec<f64> {
    apply(cube, &[norm, index, inhomogeneity, peak, injection_break_freq])
}
