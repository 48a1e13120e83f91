//! SO(3) - Special Orthogonal Group in 3D
//!
//! Closed-form rotation math for spatial groups: Rodrigues' formula for the
//! exponential map, a trace-based logarithm with dedicated branches near zero and
//! near π, and the left Jacobian used to map translation tangents.
//!
//! [`SO3`] is the rotation kind of every spatial [`MatrixGroup`]: SO(3), SE(3),
//! the extended pose SE_2(3) and their augmented variants.

use crate::manifold::{Layout, MatrixGroup, Rotation};
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};
use std::f64::consts::PI;

/// Below this angle the closed forms switch to their Taylor expansions.
const SMALL_ANGLE: f64 = 1e-6;

/// Within this distance of π the logarithm recovers the axis from the symmetric part.
const NEAR_PI: f64 = 1e-3;

/// Rotation kind for spatial groups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SO3;

/// Hat map for SO(3)
///
/// # Notes
/// [ω]ₓ = [0 -ωz ωy; ωz 0 -ωx; -ωy ωx 0]
pub fn hat(omega: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -omega.z, omega.y, //
        omega.z, 0.0, -omega.x, //
        -omega.y, omega.x, 0.0,
    )
}

/// Vee map for SO(3), inverse of [`hat`].
pub fn vee(algebra: &Matrix3<f64>) -> Vector3<f64> {
    Vector3::new(algebra[(2, 1)], algebra[(0, 2)], algebra[(1, 0)])
}

/// Exponential map for SO(3)
///
/// # Notes
/// # Equation: Rodrigues' formula
/// R = I + sin θ / θ [ω]ₓ + (1 - cos θ) / θ² [ω]ₓ²
pub fn exp(omega: &Vector3<f64>) -> Matrix3<f64> {
    let theta = omega.norm();
    let w = hat(omega);
    let w2 = w * w;
    if theta < SMALL_ANGLE {
        Matrix3::identity() + w + 0.5 * w2
    } else {
        let theta2 = theta * theta;
        Matrix3::identity() + (theta.sin() / theta) * w + ((1.0 - theta.cos()) / theta2) * w2
    }
}

/// Logarithmic map for SO(3), rotation angle in [0, π].
///
/// # Notes
/// θ = atan2(‖vee(R - Rᵀ)‖ / 2, (tr(R) - 1) / 2), ω = θ a
///
/// The angle comes from both the sine and cosine parts so it keeps full
/// precision near 0 and near π, where acos of the trace alone does not.
pub fn log(rotation: &Matrix3<f64>) -> Vector3<f64> {
    let cos_theta = ((rotation.trace() - 1.0) / 2.0).clamp(-1.0, 1.0);
    let skew = vee(&(rotation - rotation.transpose()));
    let sin_theta = 0.5 * skew.norm();
    let theta = sin_theta.atan2(cos_theta);

    if theta < SMALL_ANGLE {
        return skew * 0.5 * (1.0 + theta * theta / 6.0);
    }

    if PI - theta < NEAR_PI {
        // (R + Rᵀ)/2 = cos θ I + (1 - cos θ) a aᵀ
        let outer = ((rotation + rotation.transpose()) * 0.5 - Matrix3::identity() * cos_theta)
            / (1.0 - cos_theta);
        let diagonal = outer.diagonal();
        let k = diagonal.imax();
        let mut axis: Vector3<f64> = outer.column(k) / diagonal[k].max(0.0).sqrt();
        axis.normalize_mut();
        if axis.dot(&skew) < 0.0 {
            axis = -axis;
        }
        return axis * theta;
    }

    skew * (theta / (2.0 * sin_theta))
}

/// Left Jacobian for SO(3)
///
/// # Notes
/// J_l(ω) = I + (1 - cos θ)/θ² [ω]ₓ + (θ - sin θ)/θ³ [ω]ₓ²
pub fn left_jacobian(omega: &Vector3<f64>) -> Matrix3<f64> {
    let theta = omega.norm();
    let w = hat(omega);
    let w2 = w * w;
    if theta < SMALL_ANGLE {
        Matrix3::identity() + 0.5 * w + w2 / 6.0
    } else {
        let theta2 = theta * theta;
        Matrix3::identity()
            + ((1.0 - theta.cos()) / theta2) * w
            + ((theta - theta.sin()) / (theta2 * theta)) * w2
    }
}

/// Left Jacobian inverse for SO(3)
///
/// # Notes
/// J_l⁻¹(ω) = I - ½[ω]ₓ + (1/θ² - (1 + cos θ)/(2θ sin θ)) [ω]ₓ²
pub fn left_jacobian_inv(omega: &Vector3<f64>) -> Matrix3<f64> {
    let theta = omega.norm();
    let w = hat(omega);
    let w2 = w * w;
    if theta < SMALL_ANGLE {
        Matrix3::identity() - 0.5 * w + w2 / 12.0
    } else {
        let theta2 = theta * theta;
        let half_cot = 1.0 / (theta / 2.0).tan();
        Matrix3::identity() - 0.5 * w + (1.0 / theta2 - half_cot / (2.0 * theta)) * w2
    }
}

fn to_fixed(m: &DMatrix<f64>) -> Matrix3<f64> {
    m.fixed_view::<3, 3>(0, 0).into_owned()
}

fn to_dynamic(m: &Matrix3<f64>) -> DMatrix<f64> {
    DMatrix::from_iterator(3, 3, m.iter().copied())
}

impl Rotation for SO3 {
    const DIM: usize = 3;
    const DOF: usize = 3;
    const NAME: &'static str = "SO3";

    fn hat(omega: &[f64]) -> DMatrix<f64> {
        to_dynamic(&hat(&Vector3::from_column_slice(omega)))
    }

    fn vee(algebra: &DMatrix<f64>) -> DVector<f64> {
        DVector::from_column_slice(vee(&to_fixed(algebra)).as_slice())
    }

    fn exp(omega: &[f64]) -> DMatrix<f64> {
        to_dynamic(&exp(&Vector3::from_column_slice(omega)))
    }

    fn log(rotation: &DMatrix<f64>) -> DVector<f64> {
        DVector::from_column_slice(log(&to_fixed(rotation)).as_slice())
    }

    fn left_jacobian(omega: &[f64]) -> DMatrix<f64> {
        to_dynamic(&left_jacobian(&Vector3::from_column_slice(omega)))
    }

    fn left_jacobian_inv(omega: &[f64]) -> DMatrix<f64> {
        to_dynamic(&left_jacobian_inv(&Vector3::from_column_slice(omega)))
    }

    fn rotation_adjoint(rotation: &DMatrix<f64>) -> DMatrix<f64> {
        rotation.clone()
    }

    fn translation_coupling(translation: &[f64], rotation: &DMatrix<f64>) -> DMatrix<f64> {
        to_dynamic(&(hat(&Vector3::from_column_slice(translation)) * to_fixed(rotation)))
    }

    /// ω × p = -[p]ₓ ω
    fn action_jacobian(point: &[f64]) -> DMatrix<f64> {
        to_dynamic(&(-hat(&Vector3::from_column_slice(point))))
    }
}

impl MatrixGroup<SO3> {
    /// Spatial rotation with rotation vector ω.
    pub fn so3(omega: &Vector3<f64>) -> Self {
        Self::from_raw(to_dynamic(&exp(omega)), DVector::zeros(0), Layout::rotation())
    }

    /// The rotation block as a fixed-size matrix.
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        to_fixed(self.matrix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    fn is_rotation(r: &Matrix3<f64>) -> bool {
        (r.transpose() * r - Matrix3::identity()).norm() < 1e-10
            && (r.determinant() - 1.0).abs() < 1e-10
    }

    #[test]
    fn test_so3_hat_vee() {
        let omega = Vector3::new(0.1, -0.2, 0.3);
        let w = hat(&omega);
        assert!((w + w.transpose()).norm() < TOLERANCE);
        assert!((vee(&w) - omega).norm() < TOLERANCE);
        let p = Vector3::new(1.0, 2.0, 3.0);
        assert!((w * p - omega.cross(&p)).norm() < TOLERANCE);
    }

    #[test]
    fn test_so3_exp_log() {
        let samples = [
            Vector3::new(0.1, 0.2, 0.3),
            Vector3::new(-1.0, 0.5, 2.0),
            Vector3::new(1e-9, -2e-9, 3e-9),
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 3.0),
        ];
        for omega in samples.iter() {
            let r = exp(omega);
            assert!(is_rotation(&r));
            assert!((log(&r) - omega).norm() < 1e-10);
        }
    }

    #[test]
    fn test_so3_log_near_pi() {
        let axis = Vector3::new(1.0, 2.0, -2.0).normalize();
        for &angle in &[PI - 1.5e-3, PI - 1e-4, PI - 1e-6, PI - 1e-7, PI] {
            let omega = axis * angle;
            let recovered = log(&exp(&omega));
            // At exactly π both signs of the axis describe the same rotation
            let ok = (recovered - omega).norm() < 1e-6 || (recovered + omega).norm() < 1e-6;
            assert!(ok, "angle {angle}: recovered {recovered}");
            assert!((exp(&recovered) - exp(&omega)).norm() < 1e-10);
        }
    }

    #[test]
    fn test_so3_left_jacobian_inverse() {
        for omega in [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1e-8, 0.0, 0.0),
            Vector3::new(0.3, -0.4, 0.5),
            Vector3::new(2.0, 1.0, -1.0),
        ] {
            let product = left_jacobian(&omega) * left_jacobian_inv(&omega);
            assert!((product - Matrix3::identity()).norm() < 1e-10);
        }
    }

    #[test]
    fn test_so3_left_jacobian_finite_difference() {
        // d/dε exp(ω + ε δ) ≈ [J_l(ω) δ]ₓ exp(ω)
        let omega = Vector3::new(0.4, -0.1, 0.7);
        let delta = Vector3::new(0.0, 1.0, 0.0);
        let eps = 1e-7;
        let numeric =
            (exp(&(omega + delta * eps)) * exp(&omega).transpose() - Matrix3::identity()) / eps;
        let analytic = hat(&(left_jacobian(&omega) * delta));
        assert!((numeric - analytic).norm() < 1e-6);
    }

    #[test]
    fn test_so3_action_jacobian() {
        let p = [1.0, -2.0, 0.5];
        let omega = Vector3::new(0.3, 0.2, 0.1);
        let jac = SO3::action_jacobian(&p);
        let expected = omega.cross(&Vector3::from_column_slice(&p));
        let got = jac * DVector::from_column_slice(omega.as_slice());
        assert!((got - DVector::from_column_slice(expected.as_slice())).norm() < TOLERANCE);
    }

    #[test]
    fn test_so3_group_element() {
        let rot = MatrixGroup::<SO3>::so3(&Vector3::new(0.0, 0.0, PI / 2.0));
        let r = rot.rotation_matrix();
        assert!((r * Vector3::x() - Vector3::y()).norm() < TOLERANCE);
        assert_eq!(rot.dof(), 3);
    }
}
