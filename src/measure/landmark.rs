//! Range-bearing observations of mapped landmarks in planar SLAM.

use crate::config::ErrorFrame;
use crate::error::{InekfError, InekfResult};
use crate::manifold::SO2;
use crate::measure::{MeasureModel, rotate_noise};
use crate::state::AugmentedState;
use nalgebra::{DMatrix, DVector, Matrix2};

/// Right-invariant observation of one landmark column.
///
/// With the pose in column 0 and the landmark in column `j`, the body-frame
/// landmark position is `X⁻¹ b` for `b = [0, 0, 1, 0, …, -1, …]`, the `-1` at `j`.
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSensor {
    noise: DMatrix<f64>,
    landmark: Option<usize>,
}

impl LandmarkSensor {
    /// Sensor with independent range and bearing noise.
    pub fn new(range_std: f64, bearing_std: f64) -> Self {
        let noise = DMatrix::from_diagonal(&DVector::from_vec(vec![
            range_std * range_std,
            bearing_std * bearing_std,
        ]));
        Self {
            noise,
            landmark: None,
        }
    }

    /// Column currently pointed at by [`MeasureModel::saw_landmark`].
    pub fn landmark(&self) -> Option<usize> {
        self.landmark
    }

    fn target(&self, state: &AugmentedState<SO2>) -> InekfResult<usize> {
        let Some(index) = self.landmark else {
            return Err(InekfError::Configuration(
                "no landmark selected; call saw_landmark first".to_string(),
            ));
        };
        check_landmark(index, state)?;
        Ok(index)
    }
}

/// Body-frame position of a `[range, bearing]` observation.
pub fn range_bearing_to_position(z: &DVector<f64>) -> InekfResult<DVector<f64>> {
    if z.len() != 2 {
        return Err(InekfError::Dimension(format!(
            "range-bearing measurement must have 2 entries, got {}",
            z.len()
        )));
    }
    let (range, bearing) = (z[0], z[1]);
    Ok(DVector::from_vec(vec![
        range * bearing.cos(),
        range * bearing.sin(),
    ]))
}

fn check_landmark(index: usize, state: &AugmentedState<SO2>) -> InekfResult<()> {
    let mean = state.mean();
    let first = mean.layout().core_columns;
    if index < first || index >= mean.columns() {
        return Err(InekfError::Dimension(format!(
            "column {index} is not a landmark, landmarks span {first}..{}",
            mean.columns()
        )));
    }
    Ok(())
}

impl MeasureModel<SO2> for LandmarkSensor {
    fn error(&self) -> ErrorFrame {
        ErrorFrame::Right
    }

    fn raw_noise(&self) -> &DMatrix<f64> {
        &self.noise
    }

    fn process_z(
        &self,
        z: &DVector<f64>,
        state: &AugmentedState<SO2>,
    ) -> InekfResult<DVector<f64>> {
        let position = range_bearing_to_position(z)?;
        let mut y = self.b(state)?;
        y.rows_mut(0, 2).copy_from(&position);
        Ok(y)
    }

    fn b(&self, state: &AugmentedState<SO2>) -> InekfResult<DVector<f64>> {
        let index = self.target(state)?;
        let mut b = DVector::zeros(state.mean().matrix().nrows());
        b[2] = 1.0;
        b[2 + index] = -1.0;
        Ok(b)
    }

    /// Range-bearing noise pushed through the polar-to-Cartesian Jacobian at `z`,
    /// then rotated into the world frame.
    fn noise(&self, z: &DVector<f64>, state: &AugmentedState<SO2>) -> InekfResult<DMatrix<f64>> {
        if z.len() != 2 {
            return Err(InekfError::Dimension(format!(
                "range-bearing measurement must have 2 entries, got {}",
                z.len()
            )));
        }
        let (range, bearing) = (z[0], z[1]);
        let (s, c) = bearing.sin_cos();
        let g = Matrix2::new(c, -range * s, s, range * c);
        let g = DMatrix::from_iterator(2, 2, g.iter().copied());
        let cartesian = &g * &self.noise * g.transpose();
        rotate_noise::<SO2>(&cartesian, state, ErrorFrame::Right)
    }

    fn saw_landmark(&mut self, index: usize, state: &AugmentedState<SO2>) -> InekfResult<()> {
        check_landmark(index, state)?;
        self.landmark = Some(index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::MatrixGroup;
    use crate::measure::linearize;
    use std::f64::consts::FRAC_PI_2;

    const TOLERANCE: f64 = 1e-12;

    fn slam_state(theta: f64, x: f64, y: f64, landmarks: &[[f64; 2]]) -> AugmentedState<SO2> {
        let mut state = AugmentedState::new(
            MatrixGroup::<SO2>::se2_slam(theta, x, y),
            DMatrix::identity(3, 3) * 0.01,
        )
        .unwrap();
        for l in landmarks {
            state
                .add_column(&DVector::from_row_slice(l), &DMatrix::identity(2, 2))
                .unwrap();
        }
        state
    }

    #[test]
    fn test_range_bearing_to_position() {
        let p = range_bearing_to_position(&DVector::from_vec(vec![2.0, FRAC_PI_2])).unwrap();
        assert!(p[0].abs() < TOLERANCE);
        assert!((p[1] - 2.0).abs() < TOLERANCE);
        assert!(range_bearing_to_position(&DVector::zeros(3)).is_err());
    }

    #[test]
    fn test_requires_selected_landmark() {
        let sensor = LandmarkSensor::new(0.1, 0.01);
        let state = slam_state(0.0, 0.0, 0.0, &[[1.0, 0.0]]);
        assert!(matches!(
            sensor.b(&state),
            Err(InekfError::Configuration(_))
        ));
    }

    #[test]
    fn test_saw_landmark_rejects_pose_column() {
        let mut sensor = LandmarkSensor::new(0.1, 0.01);
        let state = slam_state(0.0, 0.0, 0.0, &[[1.0, 0.0]]);
        assert!(sensor.saw_landmark(0, &state).is_err());
        assert!(sensor.saw_landmark(2, &state).is_err());
        sensor.saw_landmark(1, &state).unwrap();
        assert_eq!(sensor.landmark(), Some(1));
    }

    #[test]
    fn test_perfect_observation_has_zero_innovation() {
        let mut sensor = LandmarkSensor::new(0.1, 0.01);
        let state = slam_state(FRAC_PI_2, 1.0, 1.0, &[[5.0, 5.0], [1.0, 3.0]]);
        sensor.saw_landmark(2, &state).unwrap();

        // Landmark (1, 3) is 2 m ahead of a robot at (1, 1) facing +y
        let z = DVector::from_vec(vec![2.0, 0.0]);
        let lin = linearize(&sensor, &z, &state, ErrorFrame::Right).unwrap();
        assert!(lin.innovation.norm() < TOLERANCE);

        let mut expected = DMatrix::zeros(2, 7);
        expected.view_mut((0, 1), (2, 2)).fill_diagonal(-1.0);
        expected.view_mut((0, 5), (2, 2)).fill_diagonal(1.0);
        assert_eq!(lin.jacobian, expected);
    }

    #[test]
    fn test_noise_is_rotated_polar_covariance() {
        let mut sensor = LandmarkSensor::new(0.5, 0.1);
        let state = slam_state(FRAC_PI_2, 0.0, 0.0, &[[0.0, 2.0]]);
        sensor.saw_landmark(1, &state).unwrap();
        let noise = sensor
            .noise(&DVector::from_vec(vec![2.0, 0.0]), &state)
            .unwrap();
        // Range noise along the body x axis (world y), bearing noise scaled by range
        assert!((noise[(1, 1)] - 0.25).abs() < TOLERANCE);
        assert!((noise[(0, 0)] - 0.04).abs() < TOLERANCE);
        assert!(noise[(0, 1)].abs() < TOLERANCE);
    }

    #[test]
    fn test_mahalanobis_grows_with_distance() {
        let mut sensor = LandmarkSensor::new(0.1, 0.01);
        let state = slam_state(0.0, 0.0, 0.0, &[[3.0, 0.0]]);
        sensor.saw_landmark(1, &state).unwrap();
        let near = sensor
            .calc_mahalanobis(&DVector::from_vec(vec![3.0, 0.0]), &state, ErrorFrame::Right)
            .unwrap();
        let far = sensor
            .calc_mahalanobis(&DVector::from_vec(vec![30.0, 1.0]), &state, ErrorFrame::Right)
            .unwrap();
        assert!(near < 1e-12);
        assert!(far > near);
    }
}
