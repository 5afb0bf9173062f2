//! Radio-continuum spectral forms.
//!
//! Each function evaluates `S(ν)` (Jy) at one frequency `ν` (GHz) from a
//! parameter slice in the order the catalog declares. A slice of the wrong
//! length yields NaN, which the likelihood maps to `-inf`.

use crate::math::lower_incomplete_gamma;

/// Optical-depth exponent of thermal free-free absorption.
const FFA_EXPONENT: f64 = -2.1;

/// `a ν^α`
pub fn power_law(nu: f64, p: &[f64]) -> f64 {
    let [a, alpha] = p else { return f64::NAN };
    a * nu.powf(*alpha)
}

/// Power law with spectral curvature: `Sn ν^α exp(q ln²ν)`.
pub fn curved_power_law(nu: f64, p: &[f64]) -> f64 {
    let [s_norm, alpha, q] = p else { return f64::NAN };
    s_norm * nu.powf(*alpha) * curvature(nu, *q)
}

/// Single synchrotron self-absorbed component.
pub fn ssa(nu: f64, p: &[f64]) -> f64 {
    let [s_norm, beta, peak] = p else { return f64::NAN };
    ssa_core(nu, *s_norm, *beta, *peak)
}

/// Homogeneous free-free absorption: `Sn ν^α exp(-(ν/νp)^-2.1)`.
pub fn homogeneous_ffa(nu: f64, p: &[f64]) -> f64 {
    let [s_norm, alpha, peak] = p else { return f64::NAN };
    homogeneous_core(nu, *s_norm, *alpha, *peak)
}

/// Internal (mixed emitting/absorbing) free-free absorption.
pub fn internal_ffa(nu: f64, p: &[f64]) -> f64 {
    let [s_norm, alpha, peak] = p else { return f64::NAN };
    let tau = (nu / peak).powf(FFA_EXPONENT);
    s_norm * nu.powf(*alpha) * opacity_factor(tau)
}

/// Inhomogeneous free-free absorption with covering-factor index `p`.
pub fn inhomogeneous_ffa(nu: f64, p: &[f64]) -> f64 {
    let [s_norm, alpha, p_index, peak] = p else { return f64::NAN };
    inhomogeneous_core(nu, *s_norm, *alpha, *p_index, *peak)
}

/// SSA with an exponential high-frequency break.
pub fn ssa_break_exp(nu: f64, p: &[f64]) -> f64 {
    let [s_norm, beta, peak, break_freq] = p else { return f64::NAN };
    ssa_core(nu, *s_norm, *beta, *peak) * exp_break(nu, *break_freq)
}

/// Homogeneous FFA with an exponential high-frequency break.
pub fn homogeneous_ffa_break_exp(nu: f64, p: &[f64]) -> f64 {
    let [s_norm, alpha, peak, break_freq] = p else { return f64::NAN };
    homogeneous_core(nu, *s_norm, *alpha, *peak) * exp_break(nu, *break_freq)
}

/// Homogeneous FFA with spectral curvature in the optically thin part.
pub fn homogeneous_ffa_curve(nu: f64, p: &[f64]) -> f64 {
    let [s_norm, alpha, peak, q] = p else { return f64::NAN };
    homogeneous_core(nu, *s_norm, *alpha, *peak) * curvature(nu, *q)
}

/// Inhomogeneous FFA with an exponential high-frequency break.
pub fn inhomogeneous_ffa_break_exp(nu: f64, p: &[f64]) -> f64 {
    let [s_norm, alpha, p_index, peak, break_freq] = p else {
        return f64::NAN;
    };
    inhomogeneous_core(nu, *s_norm, *alpha, *p_index, *peak) * exp_break(nu, *break_freq)
}

/// Homogeneous FFA with a continuous-injection break above `νbr`.
pub fn homogeneous_ffa_break(nu: f64, p: &[f64]) -> f64 {
    let [s_norm, alpha, peak, break_freq] = p else { return f64::NAN };
    homogeneous_core(nu, *s_norm, *alpha, *peak) * injection_break(nu, *break_freq)
}

/// Inhomogeneous FFA with a continuous-injection break above `νbr`.
pub fn inhomogeneous_ffa_break(nu: f64, p: &[f64]) -> f64 {
    let [s_norm, alpha, p_index, peak, break_freq] = p else {
        return f64::NAN;
    };
    inhomogeneous_core(nu, *s_norm, *alpha, *p_index, *peak) * injection_break(nu, *break_freq)
}

/// Inhomogeneous FFA with spectral curvature.
pub fn inhomogeneous_ffa_curve(nu: f64, p: &[f64]) -> f64 {
    let [s_norm, alpha, p_index, peak, q] = p else {
        return f64::NAN;
    };
    inhomogeneous_core(nu, *s_norm, *alpha, *p_index, *peak) * curvature(nu, *q)
}

fn ssa_core(nu: f64, s_norm: f64, beta: f64, peak: f64) -> f64 {
    let x = nu / peak;
    let tau = x.powf(-(beta + 4.0) / 2.0);
    s_norm * x.powf(-(beta - 1.0) / 2.0) * opacity_factor(tau)
}

fn homogeneous_core(nu: f64, s_norm: f64, alpha: f64, peak: f64) -> f64 {
    s_norm * nu.powf(alpha) * (-(nu / peak).powf(FFA_EXPONENT)).exp()
}

fn inhomogeneous_core(nu: f64, s_norm: f64, alpha: f64, p_index: f64, peak: f64) -> f64 {
    let x = nu / peak;
    let shape = p_index + 1.0;
    s_norm
        * shape
        * lower_incomplete_gamma(shape, x.powf(FFA_EXPONENT))
        * x.powf(2.1 * shape + alpha)
}

/// `(1 - e^{-τ}) / τ`, tending to 1 as `τ → 0`.
fn opacity_factor(tau: f64) -> f64 {
    if tau.abs() < 1e-10 {
        1.0 - tau / 2.0
    } else {
        -(-tau).exp_m1() / tau
    }
}

fn exp_break(nu: f64, break_freq: f64) -> f64 {
    (-nu / break_freq).exp()
}

/// `(1 + ν/νbr)^-0.5`: the thin index steepens by 0.5 above the break.
fn injection_break(nu: f64, break_freq: f64) -> f64 {
    (1.0 + nu / break_freq).powf(-0.5)
}

fn curvature(nu: f64, q: f64) -> f64 {
    let l = nu.ln();
    (q * l * l).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn power_law_scales() {
        assert_relative_eq!(power_law(1.0, &[2.0, -0.7]), 2.0);
        assert_relative_eq!(power_law(2.0, &[1.0, -1.0]), 0.5);
    }

    #[test]
    fn wrong_arity_is_nan() {
        assert!(ssa(1.0, &[1.0, 2.0]).is_nan());
        assert!(inhomogeneous_ffa_break_exp(1.0, &[1.0; 4]).is_nan());
    }

    #[test]
    fn ssa_turns_over_near_the_peak() {
        let p = [1.0, 2.5, 0.2];
        let low = ssa(0.02, &p);
        let near = ssa(0.2, &p);
        let high = ssa(5.0, &p);
        assert!(near > low);
        assert!(near > high);
        // Optically thick slope approaches ν^{5/2}.
        let slope = (ssa(0.002, &p) / ssa(0.001, &p)).log2();
        assert_relative_eq!(slope, 2.5, epsilon = 1e-3);
    }

    #[test]
    fn homogeneous_ffa_is_thin_power_law_well_above_peak() {
        let p = [1.0, -0.8, 0.1];
        let ratio = homogeneous_ffa(20.0, &p) / (20.0_f64).powf(-0.8);
        assert_relative_eq!(ratio, 1.0, epsilon = 1e-4);
        assert!(homogeneous_ffa(0.02, &p) < 1e-10);
    }

    #[test]
    fn breaks_only_suppress_flux() {
        let base = homogeneous_ffa(5.0, &[1.0, -0.5, 0.2]);
        let broken = homogeneous_ffa_break_exp(5.0, &[1.0, -0.5, 0.2, 10.0]);
        assert!(broken < base);
        assert_relative_eq!(broken / base, (-0.5_f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn injection_break_steepens_thin_index_by_half() {
        let p = [1.0, -0.7, 0.1, 2.0];
        assert_relative_eq!(
            homogeneous_ffa_break(2.0, &p) / homogeneous_ffa(2.0, &p[..3]),
            0.5_f64.sqrt(),
            epsilon = 1e-12
        );
        let slope = (homogeneous_ffa_break(8000.0, &p) / homogeneous_ffa_break(4000.0, &p)).log2();
        assert_relative_eq!(slope, -1.2, epsilon = 1e-3);
    }

    #[test]
    fn inhomogeneous_variants_reduce_to_base_model() {
        let base = inhomogeneous_ffa(1.4, &[1.0, -0.7, 0.0, 0.3]);
        assert_relative_eq!(inhomogeneous_ffa_curve(1.4, &[1.0, -0.7, 0.0, 0.3, 0.0]), base, epsilon = 1e-12);
        assert!(inhomogeneous_ffa_break(1.4, &[1.0, -0.7, 0.0, 0.3, 5.0]) < base);
    }

    #[test]
    fn inhomogeneous_model_is_finite_across_band() {
        for &nu in &[0.07, 0.2, 1.4, 5.5, 9.5] {
            let s = inhomogeneous_ffa(nu, &[1.0, -0.7, 0.0, 0.3]);
            assert!(s.is_finite() && s > 0.0, "nu={nu} s={s}");
        }
    }

    #[test]
    fn opacity_factor_limits() {
        assert_relative_eq!(opacity_factor(0.0), 1.0);
        assert_relative_eq!(opacity_factor(50.0), 1.0 / 50.0, epsilon = 1e-12);
    }
}
