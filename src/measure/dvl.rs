//! Doppler velocity log on the biased extended pose.

use crate::config::ErrorFrame;
use crate::error::{InekfError, InekfResult};
use crate::manifold::{SO3, so3};
use crate::measure::MeasureModel;
use crate::state::AugmentedState;
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

/// Body-frame velocity measured by a DVL mounted at `(dvl_r, dvl_t)` relative to the IMU.
///
/// The raw measurement is `[v_dvl (3), ω_imu (3)]`. The lever arm is removed with
/// the gyro sample: `v_imu = R_dvl v_dvl + [t_dvl]ₓ ω`. The velocity is then a
/// right-invariant observation with `b = [0, 0, 0, -1, 0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DvlSensor {
    dvl_r: Matrix3<f64>,
    dvl_t: Vector3<f64>,
    noise: DMatrix<f64>,
}

impl Default for DvlSensor {
    fn default() -> Self {
        Self::new(Matrix3::identity(), Vector3::zeros())
    }
}

impl DvlSensor {
    /// DVL extrinsics relative to the IMU, with zero noise until [`DvlSensor::set_noise`].
    pub fn new(dvl_r: Matrix3<f64>, dvl_t: Vector3<f64>) -> Self {
        Self {
            dvl_r,
            dvl_t,
            noise: DMatrix::zeros(3, 3),
        }
    }

    /// Set noise from the DVL velocity and gyro standard deviations.
    ///
    /// # Notes
    /// M = R_dvl σ_dvl² Rᵀ_dvl + [t]ₓ σ_ω² [t]ₓᵀ
    pub fn set_noise(&mut self, std_dvl: f64, std_imu: f64) {
        let t = so3::hat(&self.dvl_t);
        let m = self.dvl_r * self.dvl_r.transpose() * (std_dvl * std_dvl)
            + t * t.transpose() * (std_imu * std_imu);
        self.noise = DMatrix::from_iterator(3, 3, m.iter().copied());
    }

    /// IMU-frame velocity from a raw `[v_dvl, ω]` sample.
    pub fn imu_velocity(&self, z: &DVector<f64>) -> InekfResult<Vector3<f64>> {
        if z.len() != 6 {
            return Err(InekfError::Dimension(format!(
                "DVL measurement must be [velocity, angular rate] with 6 entries, got {}",
                z.len()
            )));
        }
        let v = Vector3::new(z[0], z[1], z[2]);
        let omega = Vector3::new(z[3], z[4], z[5]);
        Ok(self.dvl_r * v + so3::hat(&self.dvl_t) * omega)
    }
}

impl MeasureModel<SO3> for DvlSensor {
    fn error(&self) -> ErrorFrame {
        ErrorFrame::Right
    }

    fn raw_noise(&self) -> &DMatrix<f64> {
        &self.noise
    }

    fn process_z(
        &self,
        z: &DVector<f64>,
        state: &AugmentedState<SO3>,
    ) -> InekfResult<DVector<f64>> {
        let velocity = self.imu_velocity(z)?;
        let mut y = self.b(state)?;
        y.rows_mut(0, 3).copy_from(&velocity);
        Ok(y)
    }

    fn b(&self, state: &AugmentedState<SO3>) -> InekfResult<DVector<f64>> {
        let size = state.mean().matrix().nrows();
        if size < 5 {
            return Err(InekfError::Dimension(format!(
                "DVL needs velocity and position columns, state matrix has side {size}"
            )));
        }
        let mut b = DVector::zeros(size);
        b[3] = -1.0;
        Ok(b)
    }
}
