//! Inertial (IMU) process model on the extended pose with biases.
//!
//! The state is SE_2(3), holding rotation `R`, world-frame velocity `v` and
//! position `p`, augmented with gyro and accelerometer biases `[b_ω, b_a]`, a 15-dim
//! error state ordered `[ζ, ν, ρ, δb_ω, δb_a]`. The control is the raw IMU sample
//! `u = [ω, a]` (body angular rate and specific force).
//!
//! Without biases the dynamics are group affine, so the core block of `Φ` is
//! independent of the state under either error frame; the bias coupling terms
//! reintroduce a dependence on the estimate (right frame) or the input (left frame).

use crate::config::ErrorFrame;
use crate::error::{InekfError, InekfResult};
use crate::manifold::{MatrixGroup, SO3, Shape, so3};
use crate::process::ProcessModel;
use crate::state::AugmentedState;
use nalgebra::{DMatrix, Matrix3, Vector3, Vector6};

/// Error-state dimension of the biased extended pose.
pub const INERTIAL_DIM: usize = 15;

const GRAVITY: f64 = 9.81;

/// Strapdown IMU integration with constant biases.
#[derive(Debug, Clone, PartialEq)]
pub struct InertialProcess {
    gravity: Vector3<f64>,
    q: Option<DMatrix<f64>>,
}

impl Default for InertialProcess {
    fn default() -> Self {
        Self {
            gravity: Vector3::new(0.0, 0.0, -GRAVITY),
            q: None,
        }
    }
}

impl InertialProcess {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the world-frame gravity vector.
    pub fn with_gravity(mut self, gravity: Vector3<f64>) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn gravity(&self) -> &Vector3<f64> {
        &self.gravity
    }

    /// Gyroscope white noise standard deviation.
    pub fn set_gyro_noise(&mut self, std: f64) {
        self.set_block(0, std);
    }

    /// Accelerometer white noise standard deviation.
    pub fn set_accel_noise(&mut self, std: f64) {
        self.set_block(3, std);
    }

    /// Gyro bias random walk standard deviation.
    pub fn set_gyro_bias_noise(&mut self, std: f64) {
        self.set_block(9, std);
    }

    /// Accelerometer bias random walk standard deviation.
    pub fn set_accel_bias_noise(&mut self, std: f64) {
        self.set_block(12, std);
    }

    fn set_block(&mut self, at: usize, std: f64) {
        let q = self
            .q
            .get_or_insert_with(|| DMatrix::zeros(INERTIAL_DIM, INERTIAL_DIM));
        q.view_mut((at, at), (3, 3))
            .copy_from(&(Matrix3::identity() * std * std));
    }

    /// Continuous-time error dynamics `A` such that `Φ = exp(A dt)`.
    pub fn error_dynamics(
        &self,
        u: &Vector6<f64>,
        state: &MatrixGroup<SO3>,
        frame: ErrorFrame,
    ) -> InekfResult<DMatrix<f64>> {
        check_shape(state)?;
        let mut a = DMatrix::zeros(INERTIAL_DIM, INERTIAL_DIM);
        let identity = Matrix3::identity();
        match frame {
            ErrorFrame::Right => {
                let r = state.rotation_matrix();
                let v_cross = so3::hat(&state.translation(0)?);
                let p_cross = so3::hat(&state.translation(1)?);
                set(&mut a, 3, 0, &so3::hat(&self.gravity));
                set(&mut a, 6, 3, &identity);
                set(&mut a, 0, 9, &(-r));
                set(&mut a, 3, 9, &(-v_cross * r));
                set(&mut a, 6, 9, &(-p_cross * r));
                set(&mut a, 3, 12, &(-r));
            }
            ErrorFrame::Left => {
                let (omega, accel) = unbiased(u, state);
                let w_cross = so3::hat(&omega);
                set(&mut a, 0, 0, &(-w_cross));
                set(&mut a, 3, 3, &(-w_cross));
                set(&mut a, 6, 6, &(-w_cross));
                set(&mut a, 3, 0, &(-so3::hat(&accel)));
                set(&mut a, 6, 3, &identity);
                set(&mut a, 0, 9, &(-identity));
                set(&mut a, 3, 12, &(-identity));
            }
        }
        Ok(a)
    }
}

impl ProcessModel for InertialProcess {
    type Rot = SO3;
    type Control = Vector6<f64>;

    /// # Notes
    /// R⁺ = R exp(ω̄ dt), v⁺ = v + (R ā + g) dt, p⁺ = p + v dt + ½ (R ā + g) dt²
    /// with ω̄, ā the bias-corrected IMU readings.
    fn f(
        &self,
        u: &Vector6<f64>,
        dt: f64,
        state: &MatrixGroup<SO3>,
    ) -> InekfResult<MatrixGroup<SO3>> {
        check_shape(state)?;
        let (omega, accel) = unbiased(u, state);
        let r = state.rotation_matrix();
        let v = state.translation(0)?;
        let p = state.translation(1)?;
        let world_accel = r * accel + self.gravity;

        let mut mat = state.matrix().clone();
        mat.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(&(r * so3::exp(&(omega * dt))));
        mat.fixed_view_mut::<3, 1>(0, 3)
            .copy_from(&(v + world_accel * dt));
        mat.fixed_view_mut::<3, 1>(0, 4)
            .copy_from(&(p + v * dt + world_accel * (0.5 * dt * dt)));
        Ok(MatrixGroup::from_raw(mat, state.augment().clone(), state.layout()))
    }

    fn make_phi(
        &self,
        u: &Vector6<f64>,
        dt: f64,
        state: &AugmentedState<SO3>,
        frame: ErrorFrame,
    ) -> InekfResult<DMatrix<f64>> {
        let a = self.error_dynamics(u, state.mean(), frame)?;
        Ok((a * dt).exp())
    }

    fn q(&self) -> Option<&DMatrix<f64>> {
        self.q.as_ref()
    }
}

fn check_shape(state: &MatrixGroup<SO3>) -> InekfResult<()> {
    if state.shape() != Shape::new(2, 6) {
        return Err(InekfError::Dimension(format!(
            "inertial process needs 2 columns and 6 biases, state has {:?}",
            state.shape()
        )));
    }
    Ok(())
}

fn unbiased(u: &Vector6<f64>, state: &MatrixGroup<SO3>) -> (Vector3<f64>, Vector3<f64>) {
    let bias = state.augment();
    let omega = Vector3::new(u[0] - bias[0], u[1] - bias[1], u[2] - bias[2]);
    let accel = Vector3::new(u[3] - bias[3], u[4] - bias[4], u[5] - bias[5]);
    (omega, accel)
}

fn set(a: &mut DMatrix<f64>, row: usize, col: usize, block: &Matrix3<f64>) {
    a.fixed_view_mut::<3, 3>(row, col).copy_from(block);
}
