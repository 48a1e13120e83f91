//! SE(3) - Special Euclidean Group in 3D
//!
//! Spatial rigid transformations and the extended pose SE_2(3), whose two
//! columns hold velocity and position in the world frame. Tangent vectors are
//! ordered `[ω, ρ₁, ρ₂, …, aux]`.

use crate::manifold::{Extent, Layout, ManifoldError, ManifoldResult, MatrixGroup, SO3};
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

impl MatrixGroup<SO3> {
    /// Rigid transform from a rotation matrix and a translation.
    pub fn se3(rotation: &Matrix3<f64>, translation: &Vector3<f64>) -> ManifoldResult<Self> {
        Self::from_columns(rotation, &[*translation], DVector::zeros(0), Layout::rigid())
    }

    /// Extended pose with world-frame velocity and position.
    pub fn se2_3(
        rotation: &Matrix3<f64>,
        velocity: &Vector3<f64>,
        position: &Vector3<f64>,
    ) -> ManifoldResult<Self> {
        Self::from_columns(rotation, &[*velocity, *position], DVector::zeros(0), Layout::extended())
    }

    /// Extended pose augmented with gyro and accelerometer biases (`[b_ω, b_a]`).
    pub fn se2_3_with_bias(
        rotation: &Matrix3<f64>,
        velocity: &Vector3<f64>,
        position: &Vector3<f64>,
        gyro_bias: &Vector3<f64>,
        accel_bias: &Vector3<f64>,
    ) -> ManifoldResult<Self> {
        let aug = DVector::from_iterator(6, gyro_bias.iter().chain(accel_bias.iter()).copied());
        Self::from_columns(
            rotation,
            &[*velocity, *position],
            aug,
            Layout::extended().with_augment(Extent::Fixed(6)),
        )
    }

    fn from_columns(
        rotation: &Matrix3<f64>,
        columns: &[Vector3<f64>],
        aug: DVector<f64>,
        layout: Layout,
    ) -> ManifoldResult<Self> {
        let rotation = DMatrix::from_iterator(3, 3, rotation.iter().copied());
        let mut cols = DMatrix::zeros(3, columns.len());
        for (k, c) in columns.iter().enumerate() {
            cols.set_column(k, c);
        }
        Self::from_parts(&rotation, &cols, aug, layout)
    }

    /// Translation column `i` as a fixed-size vector.
    pub fn translation(&self, i: usize) -> ManifoldResult<Vector3<f64>> {
        if i >= self.columns() {
            return Err(ManifoldError::Dimension(format!(
                "translation column {i} out of range, element has {}",
                self.columns()
            )));
        }
        Ok(self.matrix().fixed_view::<3, 1>(0, 3 + i).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::so3;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn test_se3_constructor() {
        let r = so3::exp(&Vector3::new(0.1, 0.2, 0.3));
        let t = Vector3::new(1.0, 2.0, 3.0);
        let pose = MatrixGroup::<SO3>::se3(&r, &t).unwrap();
        assert_eq!(pose.translation(0).unwrap(), t);
        assert!((pose.rotation_matrix() - r).norm() < TOLERANCE);
        assert_eq!(pose.dof(), 6);
    }

    #[test]
    fn test_se3_rejects_non_rotation() {
        let scaled = Matrix3::identity() * 2.0;
        assert!(MatrixGroup::<SO3>::se3(&scaled, &Vector3::zeros()).is_err());
    }

    #[test]
    fn test_se2_3_layout() {
        let r = Matrix3::identity();
        let velocity = Vector3::new(1.0, 0.0, 0.0);
        let state =
            MatrixGroup::<SO3>::se2_3(&r, &velocity, &Vector3::new(0.0, 0.0, -2.0)).unwrap();
        assert_eq!(state.dof(), 9);
        assert_eq!(state.translation(0).unwrap(), Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(state.translation(1).unwrap(), Vector3::new(0.0, 0.0, -2.0));
        assert!(state.translation(2).is_err());
    }

    #[test]
    fn test_se2_3_with_bias() {
        let state = MatrixGroup::<SO3>::se2_3_with_bias(
            &Matrix3::identity(),
            &Vector3::zeros(),
            &Vector3::zeros(),
            &Vector3::new(0.1, 0.2, 0.3),
            &Vector3::new(-0.1, -0.2, -0.3),
        )
        .unwrap();
        assert_eq!(state.dof(), 15);
        assert_eq!(state.augment().as_slice(), &[0.1, 0.2, 0.3, -0.1, -0.2, -0.3]);
        let xi = state.log();
        assert_eq!(&xi.rows(9, 6).into_owned(), state.augment());
    }

    #[test]
    fn test_se3_exp_translation_along_axis() {
        // Pure translation tangent maps to the same translation
        let xi = DVector::from_vec(vec![0.0, 0.0, 0.0, 1.0, -2.0, 0.5]);
        let pose = MatrixGroup::<SO3>::exp(&xi, Layout::rigid()).unwrap();
        assert_eq!(pose.translation(0).unwrap(), Vector3::new(1.0, -2.0, 0.5));
    }

    #[test]
    fn test_se3_adjoint_coupling_block() {
        let r = so3::exp(&Vector3::new(0.3, -0.2, 0.1));
        let t = Vector3::new(1.0, 2.0, 3.0);
        let pose = MatrixGroup::<SO3>::se3(&r, &t).unwrap();
        let adj = pose.adjoint();
        let coupling: Matrix3<f64> = adj.fixed_view::<3, 3>(3, 0).into_owned();
        assert!((coupling - so3::hat(&t) * r).norm() < TOLERANCE);
        let upper: Matrix3<f64> = adj.fixed_view::<3, 3>(0, 3).into_owned();
        assert_eq!(upper, Matrix3::zeros());
    }
}
