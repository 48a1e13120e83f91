//! Filter and data-association configuration.
//!
//! Both structs follow the same builder pattern: start from `Default` and adjust
//! with `with_*` methods.

/// Frame in which the invariant error is expressed.
///
/// With `X` the true state and `X̂` the estimate:
/// - `Right`: η = X X̂⁻¹, corrections compose on the left (`exp(δ) X̂`)
/// - `Left`: η = X̂⁻¹ X, corrections compose on the right (`X̂ exp(δ)`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorFrame {
    Left,
    #[default]
    Right,
}

/// Configuration for [`InEKF`](crate::filter::InEKF).
#[derive(Debug, Clone, PartialEq)]
pub struct FilterConfig {
    /// Invariant error frame, fixed for the filter's lifetime
    pub error_frame: ErrorFrame,
    /// Slack allowed below zero on covariance diagonals after an update
    pub positive_tolerance: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            error_frame: ErrorFrame::Right,
            positive_tolerance: 1e-9,
        }
    }
}

impl FilterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error_frame(mut self, error_frame: ErrorFrame) -> Self {
        self.error_frame = error_frame;
        self
    }

    pub fn with_positive_tolerance(mut self, tolerance: f64) -> Self {
        self.positive_tolerance = tolerance;
        self
    }
}

/// Configuration for [`associate`](crate::association::associate).
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationConfig {
    /// Quantile below which an observation is accepted as a known landmark
    pub accept_probability: f64,
    /// Quantile below which an unmatched observation is considered ambiguous
    pub reject_probability: f64,
    /// Degrees of freedom of the measurement
    pub dof: usize,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self {
            accept_probability: 0.95,
            reject_probability: 0.99,
            dof: 2,
        }
    }
}

impl AssociationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accept_probability(mut self, p: f64) -> Self {
        self.accept_probability = p;
        self
    }

    pub fn with_reject_probability(mut self, p: f64) -> Self {
        self.reject_probability = p;
        self
    }

    pub fn with_dof(mut self, dof: usize) -> Self {
        self.dof = dof;
        self
    }

    /// Squared Mahalanobis distance below which a match is accepted.
    pub fn accept_gate(&self) -> f64 {
        chi_square_quantile(self.accept_probability, self.dof)
    }

    /// Squared Mahalanobis distance below which a new landmark is ambiguous.
    pub fn reject_gate(&self) -> f64 {
        chi_square_quantile(self.reject_probability, self.dof)
    }
}

/// Chi-square quantile function.
///
/// Exact for two degrees of freedom, where the distribution is exponential, and
/// for one, where it is a squared normal; Wilson-Hilferty approximation otherwise.
pub fn chi_square_quantile(p: f64, dof: usize) -> f64 {
    match dof {
        0 | 1 => return standard_normal_quantile(0.5 + p / 2.0).powi(2),
        2 => return -2.0 * (1.0 - p).ln(),
        _ => {}
    }
    let k = dof as f64;
    let z = standard_normal_quantile(p);
    let h = 2.0 / (9.0 * k);
    k * (1.0 - h + z * h.sqrt()).powi(3).max(0.0)
}

/// Inverse of the standard normal CDF (Acklam's rational approximation).
fn standard_normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969_683_028_665_376e1,
        2.209_460_984_245_205e2,
        -2.759_285_104_469_687e2,
        1.383_577_518_672_69e2,
        -3.066_479_806_614_716e1,
        2.506_628_277_459_239,
    ];
    const B: [f64; 5] = [
        -5.447_609_879_822_406e1,
        1.615_858_368_580_409e2,
        -1.556_989_798_598_866e2,
        6.680_131_188_771_972e1,
        -1.328_068_155_288_572e1,
    ];
    const C: [f64; 6] = [
        -7.784_894_002_430_293e-3,
        -3.223_964_580_411_365e-1,
        -2.400_758_277_161_838,
        -2.549_732_539_343_734,
        4.374_664_141_464_968,
        2.938_163_982_698_783,
    ];
    const D: [f64; 4] = [
        7.784_695_709_041_462e-3,
        3.224_671_290_700_398e-1,
        2.445_134_137_142_996,
        3.754_408_661_907_416,
    ];
    const LOW: f64 = 0.02425;

    let p = p.clamp(f64::MIN_POSITIVE, 1.0 - f64::EPSILON);
    if p < LOW {
        let q = (-2.0 * p.ln()).sqrt();
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    } else if p <= 1.0 - LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -(((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    }
}
