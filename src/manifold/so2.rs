//! SO(2) - Special Orthogonal Group in 2D
//!
//! Closed-form rotation math for planar groups. The rotation tangent is a single
//! angle θ; the algebra element is `θ [[0, -1], [1, 0]]`.
//!
//! [`SO2`] is the rotation kind of every planar [`MatrixGroup`]: SO(2) itself, SE(2)
//! and SE(2) with extra landmark columns.

use crate::manifold::{Layout, MatrixGroup, Rotation};
use nalgebra::{DMatrix, DVector, Matrix2, Vector2};

/// Below this angle the Jacobians switch to their Taylor expansions.
const SMALL_ANGLE: f64 = 1e-6;

/// Rotation kind for planar groups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SO2;

/// Rotation matrix of angle θ.
///
/// # Notes
/// # Equation: SO(2) exponential map
/// R(θ) = [[cos θ, -sin θ], [sin θ, cos θ]]
pub fn exp(theta: f64) -> Matrix2<f64> {
    let (s, c) = theta.sin_cos();
    Matrix2::new(c, -s, s, c)
}

/// Angle of a rotation matrix in (−π, π].
///
/// # Notes
/// # Equation: SO(2) logarithmic map
/// θ = atan2(R(1,0), R(0,0))
pub fn log(rotation: &Matrix2<f64>) -> f64 {
    rotation[(1, 0)].atan2(rotation[(0, 0)])
}

/// Left Jacobian of SO(2) acting on planar translations.
///
/// # Notes
/// J_l(θ) = [[sin θ / θ, -(1 - cos θ) / θ], [(1 - cos θ) / θ, sin θ / θ]]
pub fn left_jacobian(theta: f64) -> Matrix2<f64> {
    let (a, b) = jacobian_coefficients(theta);
    Matrix2::new(a, -b, b, a)
}

/// Inverse of [`left_jacobian`].
pub fn left_jacobian_inv(theta: f64) -> Matrix2<f64> {
    let (a, b) = jacobian_coefficients(theta);
    let det = a * a + b * b;
    Matrix2::new(a, b, -b, a) / det
}

fn jacobian_coefficients(theta: f64) -> (f64, f64) {
    if theta.abs() < SMALL_ANGLE {
        let theta2 = theta * theta;
        (1.0 - theta2 / 6.0, theta / 2.0 - theta * theta2 / 24.0)
    } else {
        (theta.sin() / theta, (1.0 - theta.cos()) / theta)
    }
}

impl Rotation for SO2 {
    const DIM: usize = 2;
    const DOF: usize = 1;
    const NAME: &'static str = "SO2";

    fn hat(omega: &[f64]) -> DMatrix<f64> {
        DMatrix::from_row_slice(2, 2, &[0.0, -omega[0], omega[0], 0.0])
    }

    fn vee(algebra: &DMatrix<f64>) -> DVector<f64> {
        DVector::from_element(1, algebra[(1, 0)])
    }

    fn exp(omega: &[f64]) -> DMatrix<f64> {
        let r = exp(omega[0]);
        DMatrix::from_iterator(2, 2, r.iter().copied())
    }

    fn log(rotation: &DMatrix<f64>) -> DVector<f64> {
        let r: Matrix2<f64> = rotation.fixed_view::<2, 2>(0, 0).into_owned();
        DVector::from_element(1, log(&r))
    }

    fn left_jacobian(omega: &[f64]) -> DMatrix<f64> {
        let j = left_jacobian(omega[0]);
        DMatrix::from_iterator(2, 2, j.iter().copied())
    }

    fn left_jacobian_inv(omega: &[f64]) -> DMatrix<f64> {
        let j = left_jacobian_inv(omega[0]);
        DMatrix::from_iterator(2, 2, j.iter().copied())
    }

    fn rotation_adjoint(_rotation: &DMatrix<f64>) -> DMatrix<f64> {
        DMatrix::identity(1, 1)
    }

    /// Rotating by δθ about the origin moves the column `t` by `δθ (-t_y, t_x)`;
    /// conjugation by the group element leaves `(t_y, -t_x)` in the adjoint.
    fn translation_coupling(translation: &[f64], _rotation: &DMatrix<f64>) -> DMatrix<f64> {
        DMatrix::from_column_slice(2, 1, &[translation[1], -translation[0]])
    }

    fn action_jacobian(point: &[f64]) -> DMatrix<f64> {
        DMatrix::from_column_slice(2, 1, &[-point[1], point[0]])
    }
}

impl MatrixGroup<SO2> {
    /// Planar rotation of angle θ.
    pub fn so2(theta: f64) -> Self {
        let mut mat = DMatrix::identity(2, 2);
        mat.fixed_view_mut::<2, 2>(0, 0).copy_from(&exp(theta));
        Self::from_raw(mat, DVector::zeros(0), Layout::rotation())
    }

    /// Rotation angle of the element, in (−π, π].
    pub fn angle(&self) -> f64 {
        let r: Matrix2<f64> = self.matrix().fixed_view::<2, 2>(0, 0).into_owned();
        log(&r)
    }

    /// Rotate a planar vector by the rotation block.
    pub fn rotate(&self, v: &Vector2<f64>) -> Vector2<f64> {
        self.matrix().fixed_view::<2, 2>(0, 0) * v
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn test_so2_exp_log() {
        for &theta in &[0.0, 1e-9, 0.3, -1.2, 3.0, PI] {
            let r = exp(theta);
            assert!((log(&r) - theta).abs() < TOLERANCE);
        }
    }

    #[test]
    fn test_so2_log_range() {
        let half_turn = Matrix2::new(-1.0, 0.0, 0.0, -1.0);
        assert_eq!(log(&half_turn), PI);
        assert!((log(&exp(2.0 * PI + 0.5)) - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_so2_left_jacobian_inverse() {
        for &theta in &[0.0, 1e-8, 0.7, -2.5, PI] {
            let product = left_jacobian(theta) * left_jacobian_inv(theta);
            assert!((product - Matrix2::identity()).norm() < 1e-10);
        }
    }

    #[test]
    fn test_so2_left_jacobian_small_angle_continuity() {
        let below = left_jacobian(0.9 * SMALL_ANGLE);
        let above = left_jacobian(1.1 * SMALL_ANGLE);
        assert!((below - above).norm() < 1e-6);
    }

    #[test]
    fn test_so2_hat_vee() {
        let w = SO2::hat(&[0.4]);
        assert_eq!(w[(0, 1)], -0.4);
        assert_eq!(w[(1, 0)], 0.4);
        assert_eq!(SO2::vee(&w)[0], 0.4);
    }

    #[test]
    fn test_so2_action_jacobian() {
        // [ω]x p for ω = 1 equals action_jacobian(p)
        let p = [2.0, -3.0];
        let expected = SO2::hat(&[1.0]) * DVector::from_column_slice(&p);
        let jac = SO2::action_jacobian(&p);
        assert!((jac.column(0) - expected).norm() < TOLERANCE);
    }

    #[test]
    fn test_so2_group_element() {
        let rot = MatrixGroup::<SO2>::so2(0.5);
        assert!((rot.angle() - 0.5).abs() < TOLERANCE);
        assert_eq!(rot.dof(), 1);
        let v = rot.rotate(&Vector2::new(1.0, 0.0));
        assert!((v - Vector2::new(0.5f64.cos(), 0.5f64.sin())).norm() < TOLERANCE);
    }
}
