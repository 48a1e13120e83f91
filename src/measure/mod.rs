//! Measurement models and their invariant linearization.
//!
//! Most sensors fit one of two invariant observation forms, with `b` a fixed
//! homogeneous vector:
//!
//! - left invariant:  `Y = X b + w`, innovation `V = X̂⁻¹ Y - b`
//! - right invariant: `Y = X⁻¹ b + w`, innovation `V = X̂ Y - b`
//!
//! Only the first `DIM` rows of `V` carry information. For these forms the
//! Jacobian depends on `b` alone ([`jacobian_from_b`]) and the noise is the sensor
//! noise rotated into the error frame. Models that do not fit (e.g. a scalar depth
//! gauge) override [`MeasureModel::innovation`], [`MeasureModel::jacobian`] and
//! [`MeasureModel::noise`] directly.

use crate::config::ErrorFrame;
use crate::error::{InekfError, InekfResult};
use crate::manifold::Rotation;
use crate::state::AugmentedState;
use nalgebra::{DMatrix, DVector};

pub mod depth;
pub mod dvl;
pub mod invariant;
pub mod landmark;

pub use depth::DepthSensor;
pub use dvl::DvlSensor;
pub use invariant::InvariantMeasure;
pub use landmark::LandmarkSensor;

/// Observation model used by the filter's update step.
pub trait MeasureModel<R: Rotation> {
    /// Frame the Jacobian and noise are derived in.
    fn error(&self) -> ErrorFrame;

    /// Sensor noise in the sensor's own frame.
    fn raw_noise(&self) -> &DMatrix<f64>;

    /// Convert a raw measurement into the model's internal form, typically the
    /// homogeneous vector `Y` sized to the current state matrix.
    fn process_z(&self, z: &DVector<f64>, state: &AugmentedState<R>) -> InekfResult<DVector<f64>>;

    /// Homogeneous vector `b` of the invariant observation form for the current state.
    fn b(&self, _state: &AugmentedState<R>) -> InekfResult<DVector<f64>> {
        Err(InekfError::Configuration(
            "measurement model does not define a b vector".to_string(),
        ))
    }

    /// Innovation from a processed measurement.
    fn innovation(&self, y: &DVector<f64>, state: &AugmentedState<R>) -> InekfResult<DVector<f64>> {
        let b = self.b(state)?;
        let mean = state.mean();
        let transformed = match self.error() {
            ErrorFrame::Left => mean.inverse().act(y)?,
            ErrorFrame::Right => mean.act(y)?,
        };
        Ok((transformed - b).rows(0, R::DIM).into_owned())
    }

    /// Jacobian of the innovation with respect to the error in [`MeasureModel::error`]'s frame.
    fn jacobian(&self, state: &AugmentedState<R>) -> InekfResult<DMatrix<f64>> {
        let b = self.b(state)?;
        jacobian_from_b::<R>(&b, self.error(), state.dim())
    }

    /// Innovation noise; `z` is the raw measurement for sensors whose noise depends on it.
    fn noise(&self, _z: &DVector<f64>, state: &AugmentedState<R>) -> InekfResult<DMatrix<f64>> {
        rotate_noise::<R>(self.raw_noise(), state, self.error())
    }

    /// Point the model at state column `index` before an update.
    fn saw_landmark(&mut self, _index: usize, _state: &AugmentedState<R>) -> InekfResult<()> {
        Err(InekfError::Configuration(
            "measurement model does not observe landmarks".to_string(),
        ))
    }

    /// Squared Mahalanobis distance `Vᵀ S⁻¹ V` of a raw measurement, with the
    /// covariance interpreted in the filter's `frame`.
    fn calc_mahalanobis(
        &self,
        z: &DVector<f64>,
        state: &AugmentedState<R>,
        frame: ErrorFrame,
    ) -> InekfResult<f64> {
        let lin = linearize(self, z, state, frame)?;
        let s = lin.innovation_covariance(state.covariance());
        let s_inv = invert_spd(&s)?;
        Ok((lin.innovation.transpose() * s_inv * &lin.innovation)[(0, 0)])
    }
}

/// Innovation, Jacobian and noise of one measurement, ready for an update.
#[derive(Debug, Clone, PartialEq)]
pub struct Linearization {
    pub innovation: DVector<f64>,
    pub jacobian: DMatrix<f64>,
    pub noise: DMatrix<f64>,
}

impl Linearization {
    /// `S = H P Hᵀ + M`
    pub fn innovation_covariance(&self, covariance: &DMatrix<f64>) -> DMatrix<f64> {
        &self.jacobian * covariance * self.jacobian.transpose() + &self.noise
    }
}

/// Linearize a measurement for a filter running in `frame`.
///
/// When the model's frame differs from the filter's, the Jacobian is carried over
/// with the Adjoint of the estimate: `H Ad(X̂⁻¹)` for a right-invariant filter and
/// `H Ad(X̂)` for a left-invariant one. The innovation is frame independent.
pub fn linearize<R, M>(
    model: &M,
    z: &DVector<f64>,
    state: &AugmentedState<R>,
    frame: ErrorFrame,
) -> InekfResult<Linearization>
where
    R: Rotation,
    M: MeasureModel<R> + ?Sized,
{
    let y = model.process_z(z, state)?;
    let innovation = model.innovation(&y, state)?;
    let jacobian = to_filter_frame(model.jacobian(state)?, model.error(), frame, state);
    let noise = model.noise(z, state)?;

    let rows = innovation.len();
    if jacobian.shape() != (rows, state.dim()) {
        return Err(InekfError::Dimension(format!(
            "Jacobian must be {rows}x{}, got {}x{}",
            state.dim(),
            jacobian.nrows(),
            jacobian.ncols()
        )));
    }
    if noise.shape() != (rows, rows) {
        return Err(InekfError::Dimension(format!(
            "measurement noise must be {rows}x{rows}, got {}x{}",
            noise.nrows(),
            noise.ncols()
        )));
    }
    Ok(Linearization {
        innovation,
        jacobian,
        noise,
    })
}

/// Express a Jacobian derived in `model_frame` with respect to the `filter_frame` error.
pub fn to_filter_frame<R: Rotation>(
    jacobian: DMatrix<f64>,
    model_frame: ErrorFrame,
    filter_frame: ErrorFrame,
    state: &AugmentedState<R>,
) -> DMatrix<f64> {
    match (filter_frame, model_frame) {
        (ErrorFrame::Right, ErrorFrame::Left) => jacobian * state.mean().inverse().adjoint(),
        (ErrorFrame::Left, ErrorFrame::Right) => jacobian * state.mean().adjoint(),
        _ => jacobian,
    }
}

/// Jacobian of the invariant innovation for homogeneous vector `b`.
///
/// # Notes
/// Left: H = [ ∂([ω]ₓ b_rot)/∂ω | b_{DIM} I | … | b_{DIM+K-1} I | 0 ]
/// Right: the negation of the same matrix.
pub fn jacobian_from_b<R: Rotation>(
    b: &DVector<f64>,
    frame: ErrorFrame,
    dim: usize,
) -> InekfResult<DMatrix<f64>> {
    let (n, d) = (R::DIM, R::DOF);
    if b.len() < n {
        return Err(InekfError::Dimension(format!(
            "b must have at least {n} entries, got {}",
            b.len()
        )));
    }
    let columns = b.len() - n;
    if d + n * columns > dim {
        return Err(InekfError::Dimension(format!(
            "b references {columns} columns, state dimension is {dim}"
        )));
    }

    let mut h = DMatrix::zeros(n, dim);
    h.view_mut((0, 0), (n, d))
        .copy_from(&R::action_jacobian(&b.as_slice()[0..n]));
    for k in 0..columns {
        h.view_mut((0, d + n * k), (n, n))
            .fill_diagonal(b[n + k]);
    }
    if frame == ErrorFrame::Right {
        h.neg_mut();
    }
    Ok(h)
}

/// Rotate body-frame sensor noise into the working frame of the innovation:
/// `Rᵀ M R` for left-invariant models and `R M Rᵀ` for right-invariant ones.
pub fn rotate_noise<R: Rotation>(
    noise: &DMatrix<f64>,
    state: &AugmentedState<R>,
    frame: ErrorFrame,
) -> InekfResult<DMatrix<f64>> {
    let n = R::DIM;
    if noise.shape() != (n, n) {
        return Err(InekfError::Dimension(format!(
            "sensor noise must be {n}x{n}, got {}x{}",
            noise.nrows(),
            noise.ncols()
        )));
    }
    let r = state.rotation();
    Ok(match frame {
        ErrorFrame::Left => r.transpose() * noise * &r,
        ErrorFrame::Right => &r * noise * r.transpose(),
    })
}

/// Invert a symmetric positive-definite matrix through its Cholesky factor.
///
/// Matrices whose condition number estimate from the factor diagonal exceeds
/// `1 / f64::EPSILON` are rejected as numerically singular.
pub fn invert_spd(s: &DMatrix<f64>) -> InekfResult<DMatrix<f64>> {
    let Some(cholesky) = s.clone().cholesky() else {
        return Err(InekfError::Numerical(
            "innovation covariance is not positive definite".to_string(),
        ));
    };
    let diagonal = cholesky.l_dirty().diagonal();
    let (min, max) = (diagonal.min(), diagonal.max());
    if min <= 0.0 || (min / max).powi(2) < f64::EPSILON {
        return Err(InekfError::Numerical(format!(
            "innovation covariance is ill-conditioned (L diagonal range {min:e}..{max:e})"
        )));
    }
    let inverse = cholesky.inverse();
    if inverse.iter().any(|v| !v.is_finite()) {
        return Err(InekfError::Numerical(
            "innovation covariance is ill-conditioned".to_string(),
        ));
    }
    Ok(inverse)
}
