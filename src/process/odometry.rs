//! Odometry process models.
//!
//! [`OdometryProcess`] consumes a relative motion `U` measured in the body frame
//! and propagates `X⁺ = X U`. It is group affine: the right-invariant error
//! does not change at all (`Φ = I`) and the left-invariant error is conjugated by
//! the motion (`Φ = Ad(U⁻¹)`), in both cases independent of the state estimate.
//!
//! [`CarProcess`] wraps it for a car-like vehicle that reports wheel speed and
//! steering angle instead of a motion increment.

use crate::config::ErrorFrame;
use crate::error::{InekfError, InekfResult};
use crate::manifold::{Layout, MatrixGroup, Rotation, SO2};
use crate::process::ProcessModel;
use crate::state::AugmentedState;
use nalgebra::{DMatrix, DVector, Vector2};
use std::f64::consts::PI;

/// Relative-motion process model `X⁺ = X U`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OdometryProcess<R: Rotation> {
    q: Option<DMatrix<f64>>,
    _rotation: std::marker::PhantomData<R>,
}

impl<R: Rotation> OdometryProcess<R> {
    /// Create a model without process noise; [`OdometryProcess::set_q`] must be
    /// called before the first prediction.
    pub fn new() -> Self {
        Self {
            q: None,
            _rotation: std::marker::PhantomData,
        }
    }

    /// Create a model with a full noise matrix over the core pose tangent.
    pub fn with_noise(q: DMatrix<f64>) -> InekfResult<Self> {
        let mut model = Self::new();
        model.set_q(q)?;
        Ok(model)
    }

    /// Create a model whose noise is diagonal with the given standard deviations.
    pub fn with_noise_std(std: &DVector<f64>) -> Self {
        Self {
            q: Some(DMatrix::from_diagonal(&std.map(|s| s * s))),
            _rotation: std::marker::PhantomData,
        }
    }

    /// Set the noise matrix; it must be square.
    pub fn set_q(&mut self, q: DMatrix<f64>) -> InekfResult<()> {
        if !q.is_square() {
            return Err(InekfError::Dimension(format!(
                "process noise must be square, got {}x{}",
                q.nrows(),
                q.ncols()
            )));
        }
        self.q = Some(q);
        Ok(())
    }

    /// Set a diagonal noise matrix from variances.
    pub fn set_q_diagonal(&mut self, variances: &DVector<f64>) {
        self.q = Some(DMatrix::from_diagonal(variances));
    }

    /// Place a core motion `u` into a group element shaped like `state`, with
    /// zero landmark columns and a zero (or given) auxiliary vector.
    pub fn embed(u: &MatrixGroup<R>, state: &MatrixGroup<R>) -> InekfResult<MatrixGroup<R>> {
        let core = state.layout().core_columns;
        if u.columns() != core {
            return Err(InekfError::Dimension(format!(
                "motion has {} columns, state core has {core}",
                u.columns()
            )));
        }
        let aug_len = state.augment().len();
        let aug = match u.augment().len() {
            0 => DVector::zeros(aug_len),
            n if n == aug_len => u.augment().clone(),
            n => {
                return Err(InekfError::Dimension(format!(
                    "motion carries {n} auxiliary values, state has {aug_len}"
                )));
            }
        };
        let size = state.matrix().nrows();
        let core_size = R::DIM + core;
        let mut mat = DMatrix::identity(size, size);
        mat.view_mut((0, 0), (core_size, core_size))
            .copy_from(u.matrix());
        Ok(MatrixGroup::from_matrix(mat, aug, state.layout())?)
    }
}

impl<R: Rotation> ProcessModel for OdometryProcess<R> {
    type Rot = R;
    type Control = MatrixGroup<R>;

    fn f(
        &self,
        u: &MatrixGroup<R>,
        _dt: f64,
        state: &MatrixGroup<R>,
    ) -> InekfResult<MatrixGroup<R>> {
        let motion = Self::embed(u, state)?;
        Ok(state.compose(&motion)?)
    }

    fn make_phi(
        &self,
        u: &MatrixGroup<R>,
        _dt: f64,
        state: &AugmentedState<R>,
        frame: ErrorFrame,
    ) -> InekfResult<DMatrix<f64>> {
        match frame {
            ErrorFrame::Right => Ok(DMatrix::identity(state.dim(), state.dim())),
            ErrorFrame::Left => Ok(Self::embed(u, state.mean())?.inverse().adjoint()),
        }
    }

    fn q(&self) -> Option<&DMatrix<f64>> {
        self.q.as_ref()
    }
}

/// Car-like vehicle reporting rear wheel speed and steering angle.
///
/// The motion increment is that of a point offset `(a, b)` from the rear axle,
/// where the exteroceptive sensor is mounted. The speed encoder sits
/// `encoder_offset` to the side of the axle centre.
#[derive(Debug, Clone, PartialEq)]
pub struct CarProcess {
    pub a: f64,
    pub b: f64,
    pub wheelbase: f64,
    pub encoder_offset: f64,
    odometry: OdometryProcess<SO2>,
}

impl Default for CarProcess {
    /// Geometry of the Victoria Park utility vehicle.
    fn default() -> Self {
        Self {
            a: 3.78,
            b: 0.50,
            wheelbase: 2.83,
            encoder_offset: 0.76,
            odometry: OdometryProcess::new(),
        }
    }
}

impl CarProcess {
    pub fn new(a: f64, b: f64, wheelbase: f64, encoder_offset: f64) -> Self {
        Self {
            a,
            b,
            wheelbase,
            encoder_offset,
            odometry: OdometryProcess::new(),
        }
    }

    /// Set diagonal noise from standard deviations of `[θ, x, y]`.
    pub fn with_noise_std(mut self, std: &DVector<f64>) -> Self {
        self.odometry = OdometryProcess::with_noise_std(std);
        self
    }

    /// Body-frame motion increment for `u = [wheel speed, steering angle]` over `dt`.
    pub fn increment(&self, u: &Vector2<f64>, dt: f64) -> InekfResult<MatrixGroup<SO2>> {
        let steering = wrap_angle(u[1]);
        let tan = steering.tan();
        let slip = 1.0 - tan * self.encoder_offset / self.wheelbase;
        if slip.abs() < 1e-9 || !tan.is_finite() {
            return Err(InekfError::Numerical(format!(
                "steering angle {steering:.4} is singular for this vehicle geometry"
            )));
        }
        let speed = u[0] / slip;
        let yaw_rate = speed / self.wheelbase * tan;
        let xi = DVector::from_vec(vec![
            yaw_rate * dt,
            (speed - yaw_rate * self.b) * dt,
            yaw_rate * self.a * dt,
        ]);
        Ok(MatrixGroup::exp(&xi, Layout::rigid())?)
    }
}

impl ProcessModel for CarProcess {
    type Rot = SO2;
    type Control = Vector2<f64>;

    fn f(
        &self,
        u: &Vector2<f64>,
        dt: f64,
        state: &MatrixGroup<SO2>,
    ) -> InekfResult<MatrixGroup<SO2>> {
        self.odometry.f(&self.increment(u, dt)?, dt, state)
    }

    fn make_phi(
        &self,
        u: &Vector2<f64>,
        dt: f64,
        state: &AugmentedState<SO2>,
        frame: ErrorFrame,
    ) -> InekfResult<DMatrix<f64>> {
        self.odometry.make_phi(&self.increment(u, dt)?, dt, state, frame)
    }

    fn q(&self) -> Option<&DMatrix<f64>> {
        self.odometry.q()
    }
}

/// Wrap an angle into (−π, π].
pub fn wrap_angle(theta: f64) -> f64 {
    let wrapped = (theta + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped == -PI { PI } else { wrapped }
}
