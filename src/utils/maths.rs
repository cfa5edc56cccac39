//! # Numerical helpers
//!
//! Log-gamma and the log-space combinatorics built on it. The scoring
//! models work entirely in log space; nothing here ever exponentiates.

use std::f64::consts::PI;

/// Natural log of the gamma function via the Lanczos approximation (g=7).
pub fn ln_gamma(x: f64) -> f64 {
    const COEFFS: [f64; 8] = [
        676.5203681218851,
        -1259.1392167224028,
        771.32342877765313,
        -176.61502916214059,
        12.507343278686905,
        -0.13857109526572012,
        9.9843695780195716e-6,
        1.5056327351493116e-7,
    ];

    if x < 0.5 {
        // Reflection formula: Γ(x) = π / (sin(pi x) * Γ(1-x))
        let log_pi_over_sin = (PI / (PI * x).sin()).ln();
        log_pi_over_sin - ln_gamma(1.0 - x)
    } else {
        let x = x - 1.0;
        let mut ag = 0.99999999999980993_f64;
        for (i, &c) in COEFFS.iter().enumerate() {
            ag += c / (x + i as f64 + 1.0);
        }
        let t = x + 7.5; // g + 0.5
        0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + ag.ln()
    }
}

/// Log of the trinomial coefficient `n! / (a! b! (n-a-b)!)`.
///
/// The caller guarantees `a + b <= n`.
pub fn log_trinomial(n: u32, a: u32, b: u32) -> f64 {
    debug_assert!(a + b <= n);
    ln_gamma(n as f64 + 1.0)
        - ln_gamma(a as f64 + 1.0)
        - ln_gamma(b as f64 + 1.0)
        - ln_gamma((n - a - b) as f64 + 1.0)
}

/// Log pmf of the negative binomial with `r` successes and success
/// fraction `p`, evaluated at `k` failures:
/// `C(k+r-1, k) * p^r * (1-p)^k`.
pub fn negative_binomial_log_pmf(r: f64, p: f64, k: u32) -> f64 {
    let k = k as f64;
    ln_gamma(k + r) - ln_gamma(r) - ln_gamma(k + 1.0) + r * p.ln() + k * (1.0 - p).ln()
}
