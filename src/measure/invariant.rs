//! Generic invariant measurement defined by its homogeneous vector `b`.

use crate::config::ErrorFrame;
use crate::error::{InekfError, InekfResult};
use crate::manifold::Rotation;
use crate::measure::MeasureModel;
use crate::state::AugmentedState;
use nalgebra::{DMatrix, DVector};
use std::marker::PhantomData;

/// Measurement of the form `Y = X b + w` (left) or `Y = X⁻¹ b + w` (right).
///
/// `b` covers the rotation rows and the core columns; it is zero-padded when the
/// state carries landmarks.
#[derive(Debug, Clone, PartialEq)]
pub struct InvariantMeasure<R: Rotation> {
    b: DVector<f64>,
    frame: ErrorFrame,
    noise: DMatrix<f64>,
    _rotation: PhantomData<R>,
}

impl<R: Rotation> InvariantMeasure<R> {
    pub fn new(b: DVector<f64>, frame: ErrorFrame, noise: DMatrix<f64>) -> InekfResult<Self> {
        let n = R::DIM;
        if b.len() < n {
            return Err(InekfError::Dimension(format!(
                "b must have at least {n} entries, got {}",
                b.len()
            )));
        }
        check_noise::<R>(&noise)?;
        Ok(Self {
            b,
            frame,
            noise,
            _rotation: PhantomData,
        })
    }

    /// Left-invariant position fix of the first column (GPS-like), with isotropic noise.
    pub fn position_fix(std: f64) -> Self {
        let n = R::DIM;
        let mut b = DVector::zeros(n + 1);
        b[n] = 1.0;
        Self {
            b,
            frame: ErrorFrame::Left,
            noise: DMatrix::identity(n, n) * (std * std),
            _rotation: PhantomData,
        }
    }

    pub fn set_noise(&mut self, noise: DMatrix<f64>) -> InekfResult<()> {
        check_noise::<R>(&noise)?;
        self.noise = noise;
        Ok(())
    }

    /// Isotropic noise with standard deviation `std`.
    pub fn set_noise_std(&mut self, std: f64) {
        self.noise = DMatrix::identity(R::DIM, R::DIM) * (std * std);
    }

    fn padded_b(&self, size: usize) -> InekfResult<DVector<f64>> {
        if self.b.len() > size {
            return Err(InekfError::Dimension(format!(
                "b has {} entries, state matrix has side {size}",
                self.b.len()
            )));
        }
        let mut b = DVector::zeros(size);
        b.rows_mut(0, self.b.len()).copy_from(&self.b);
        Ok(b)
    }
}

impl<R: Rotation> MeasureModel<R> for InvariantMeasure<R> {
    fn error(&self) -> ErrorFrame {
        self.frame
    }

    fn raw_noise(&self) -> &DMatrix<f64> {
        &self.noise
    }

    /// Accepts either the `DIM` informative rows, completed with the tail of `b`,
    /// or a full homogeneous vector.
    fn process_z(&self, z: &DVector<f64>, state: &AugmentedState<R>) -> InekfResult<DVector<f64>> {
        let size = state.mean().matrix().nrows();
        if z.len() == size {
            return Ok(z.clone());
        }
        if z.len() != R::DIM {
            return Err(InekfError::Dimension(format!(
                "measurement must have {} or {size} entries, got {}",
                R::DIM,
                z.len()
            )));
        }
        let mut y = self.padded_b(size)?;
        y.rows_mut(0, R::DIM).copy_from(z);
        Ok(y)
    }

    fn b(&self, state: &AugmentedState<R>) -> InekfResult<DVector<f64>> {
        self.padded_b(state.mean().matrix().nrows())
    }
}

fn check_noise<R: Rotation>(noise: &DMatrix<f64>) -> InekfResult<()> {
    let n = R::DIM;
    if noise.shape() != (n, n) {
        return Err(InekfError::Dimension(format!(
            "measurement noise must be {n}x{n}, got {}x{}",
            noise.nrows(),
            noise.ncols()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::{MatrixGroup, SO2, SO3};
    use crate::measure::linearize;
    use nalgebra::{Matrix3, Vector3};

    const TOLERANCE: f64 = 1e-12;

    fn planar_state(theta: f64, x: f64, y: f64) -> AugmentedState<SO2> {
        AugmentedState::new(MatrixGroup::<SO2>::se2(theta, x, y), DMatrix::identity(3, 3)).unwrap()
    }

    #[test]
    fn test_position_fix_innovation_is_body_frame_offset() {
        let gps = InvariantMeasure::<SO2>::position_fix(0.1);
        let state = planar_state(std::f64::consts::FRAC_PI_2, 1.0, 2.0);
        let z = DVector::from_vec(vec![1.0, 3.0]);

        let y = gps.process_z(&z, &state).unwrap();
        assert_eq!(y.as_slice(), &[1.0, 3.0, 1.0]);

        // Offset (0, 1) in the world is +x in a body rotated by 90°
        let v = gps.innovation(&y, &state).unwrap();
        assert!((v[0] - 1.0).abs() < TOLERANCE);
        assert!(v[1].abs() < TOLERANCE);
    }

    #[test]
    fn test_position_fix_linearization() {
        let gps = InvariantMeasure::<SO2>::position_fix(0.5);
        let state = planar_state(0.3, 0.0, 0.0);
        let z = DVector::from_vec(vec![0.0, 0.0]);
        let lin = linearize(&gps, &z, &state, ErrorFrame::Left).unwrap();
        assert_eq!(
            lin.jacobian,
            DMatrix::from_row_slice(2, 3, &[0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
        );
        // Isotropic noise is invariant under rotation
        assert!((lin.noise - DMatrix::identity(2, 2) * 0.25).norm() < TOLERANCE);
    }

    #[test]
    fn test_cross_frame_jacobian_uses_adjoint() {
        let gps = InvariantMeasure::<SO2>::position_fix(0.5);
        let state = planar_state(0.3, 1.0, -2.0);
        let z = DVector::from_vec(vec![1.0, -2.0]);
        let left = linearize(&gps, &z, &state, ErrorFrame::Left).unwrap();
        let right = linearize(&gps, &z, &state, ErrorFrame::Right).unwrap();
        let expected = &left.jacobian * state.mean().inverse().adjoint();
        assert!((right.jacobian - expected).norm() < TOLERANCE);
        assert_eq!(left.innovation, right.innovation);
    }

    #[test]
    fn test_position_fix_pads_landmarks() {
        let gps = InvariantMeasure::<SO2>::position_fix(1.0);
        let mut state = AugmentedState::new(
            MatrixGroup::<SO2>::se2_slam(0.0, 0.0, 0.0),
            DMatrix::identity(3, 3),
        )
        .unwrap();
        state
            .add_column(&DVector::from_vec(vec![4.0, 4.0]), &DMatrix::identity(2, 2))
            .unwrap();
        let y = gps
            .process_z(&DVector::from_vec(vec![0.5, 0.5]), &state)
            .unwrap();
        assert_eq!(y.as_slice(), &[0.5, 0.5, 1.0, 0.0]);
        let h = gps.jacobian(&state).unwrap();
        assert_eq!(h.shape(), (2, 5));
        assert_eq!(h.view((0, 3), (2, 2)).norm(), 0.0);
    }

    #[test]
    fn test_spatial_right_invariant_measure() {
        // Known landmark at the origin observed from the body: Y = X⁻¹ b
        let b = DVector::from_vec(vec![0.0, 0.0, 0.0, 1.0]);
        let model = InvariantMeasure::<SO3>::new(b, ErrorFrame::Right, DMatrix::identity(3, 3))
            .unwrap();
        let mean = MatrixGroup::<SO3>::se3(&Matrix3::identity(), &Vector3::new(1.0, 2.0, 3.0))
            .unwrap();
        let state = AugmentedState::new(mean.clone(), DMatrix::identity(6, 6)).unwrap();
        let z = mean
            .inverse()
            .act(&DVector::from_vec(vec![0.0, 0.0, 0.0, 1.0]))
            .unwrap();
        let y = model.process_z(&z, &state).unwrap();
        let v = model.innovation(&y, &state).unwrap();
        assert!(v.norm() < TOLERANCE);
    }

    #[test]
    fn test_dimension_errors() {
        let left = ErrorFrame::Left;
        let short_b = InvariantMeasure::<SO2>::new(DVector::zeros(1), left, DMatrix::identity(2, 2));
        assert!(short_b.is_err());
        let wide_noise =
            InvariantMeasure::<SO2>::new(DVector::zeros(3), left, DMatrix::identity(3, 3));
        assert!(wide_noise.is_err());
        let gps = InvariantMeasure::<SO2>::position_fix(1.0);
        let state = planar_state(0.0, 0.0, 0.0);
        assert!(matches!(
            gps.process_z(&DVector::zeros(5), &state),
            Err(InekfError::Dimension(_))
        ));
    }
}
