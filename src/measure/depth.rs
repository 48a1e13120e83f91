//! Pressure depth gauge on the biased extended pose.

use crate::config::ErrorFrame;
use crate::error::{InekfError, InekfResult};
use crate::manifold::SO3;
use crate::measure::MeasureModel;
use crate::state::AugmentedState;
use nalgebra::{DMatrix, DVector};

/// Index of the position block in the extended-pose error state.
const POSITION: usize = 6;

/// Scalar observation of the world z coordinate of the position column.
///
/// Depth alone does not fit the invariant form, so the model linearizes the
/// single informative row: with a left-invariant error `p = p̂ + R̂ ρ`,
/// `V = z - p̂_z` and `H = e_zᵀ R̂` on the position block.
#[derive(Debug, Clone, PartialEq)]
pub struct DepthSensor {
    noise: DMatrix<f64>,
}

impl DepthSensor {
    pub fn new(std: f64) -> Self {
        Self {
            noise: DMatrix::from_element(1, 1, std * std),
        }
    }

    pub fn set_noise(&mut self, std: f64) {
        self.noise[(0, 0)] = std * std;
    }

    fn position_z(state: &AugmentedState<SO3>) -> InekfResult<f64> {
        let mean = state.mean();
        if mean.columns() < 2 {
            return Err(InekfError::Dimension(format!(
                "depth needs a position column, state has {} columns",
                mean.columns()
            )));
        }
        Ok(mean.translation(1)?.z)
    }
}

impl MeasureModel<SO3> for DepthSensor {
    fn error(&self) -> ErrorFrame {
        ErrorFrame::Left
    }

    fn raw_noise(&self) -> &DMatrix<f64> {
        &self.noise
    }

    fn process_z(
        &self,
        z: &DVector<f64>,
        _state: &AugmentedState<SO3>,
    ) -> InekfResult<DVector<f64>> {
        if z.len() != 1 {
            return Err(InekfError::Dimension(format!(
                "depth measurement must have 1 entry, got {}",
                z.len()
            )));
        }
        Ok(z.clone())
    }

    fn innovation(
        &self,
        y: &DVector<f64>,
        state: &AugmentedState<SO3>,
    ) -> InekfResult<DVector<f64>> {
        Ok(DVector::from_element(1, y[0] - Self::position_z(state)?))
    }

    fn jacobian(&self, state: &AugmentedState<SO3>) -> InekfResult<DMatrix<f64>> {
        Self::position_z(state)?;
        let rotation = state.rotation();
        let mut h = DMatrix::zeros(1, state.dim());
        h.view_mut((0, POSITION), (1, 3))
            .copy_from(&rotation.view((2, 0), (1, 3)));
        Ok(h)
    }

    fn noise(&self, _z: &DVector<f64>, _state: &AugmentedState<SO3>) -> InekfResult<DMatrix<f64>> {
        Ok(self.noise.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::{MatrixGroup, so3};
    use crate::measure::linearize;
    use nalgebra::{Matrix3, Vector3};

    fn state(rotation: &Matrix3<f64>, depth: f64) -> AugmentedState<SO3> {
        let mean = MatrixGroup::<SO3>::se2_3_with_bias(
            rotation,
            &Vector3::zeros(),
            &Vector3::new(1.0, 2.0, depth),
            &Vector3::zeros(),
            &Vector3::zeros(),
        )
        .unwrap();
        AugmentedState::new(mean, DMatrix::identity(15, 15)).unwrap()
    }

    #[test]
    fn test_innovation_and_noise() {
        let depth = DepthSensor::new(0.2);
        let s = state(&Matrix3::identity(), -4.0);
        let lin = linearize(&depth, &DVector::from_element(1, -3.5), &s, ErrorFrame::Left).unwrap();
        assert!((lin.innovation[0] - 0.5).abs() < 1e-12);
        assert!((lin.noise[(0, 0)] - 0.04).abs() < 1e-12);
        assert_eq!(lin.jacobian[(0, 8)], 1.0);
        assert_eq!(lin.jacobian.iter().filter(|v| **v != 0.0).count(), 1);
    }

    #[test]
    fn test_jacobian_finite_difference() {
        let rotation = so3::exp(&Vector3::new(0.4, -0.3, 1.2));
        let s = state(&rotation, -7.0);
        let depth = DepthSensor::new(0.1);
        let h = depth.jacobian(&s).unwrap();

        let eps = 1e-7;
        for i in 0..15 {
            let mut xi = DVector::zeros(15);
            xi[i] = eps;
            let eta = MatrixGroup::<SO3>::exp(&xi, s.mean().layout()).unwrap();
            let truth = s.mean().compose(&eta).unwrap();
            let predicted = truth.translation(1).unwrap().z;
            let numeric = (predicted - s.mean().translation(1).unwrap().z) / eps;
            assert!((numeric - h[(0, i)]).abs() < 1e-6, "column {i}");
        }
    }

    #[test]
    fn test_right_filter_uses_adjoint() {
        let rotation = so3::exp(&Vector3::new(0.0, 0.2, 0.0));
        let s = state(&rotation, -1.0);
        let depth = DepthSensor::new(0.1);
        let z = DVector::from_element(1, -1.0);
        let left = linearize(&depth, &z, &s, ErrorFrame::Left).unwrap();
        let right = linearize(&depth, &z, &s, ErrorFrame::Right).unwrap();
        let expected = &left.jacobian * s.mean().inverse().adjoint();
        assert!((right.jacobian - expected).norm() < 1e-12);
    }

    #[test]
    fn test_rejects_vector_measurement() {
        let depth = DepthSensor::new(0.1);
        let s = state(&Matrix3::identity(), 0.0);
        assert!(depth.process_z(&DVector::zeros(3), &s).is_err());
    }
}
