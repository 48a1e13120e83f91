//! Process models: deterministic propagation of the mean and the linearized
//! transition of the invariant error.
//!
//! A process model never touches the covariance itself; the filter combines
//! [`ProcessModel::make_phi`] and [`ProcessModel::q`] as
//!
//! ```text
//! P⁺ = Φ P Φᵀ + Q̄ dt
//! ```
//!
//! where `Q̄` is `Q` lifted to the full state by [`lift_noise`] (and transported
//! into the world frame when the filter runs right-invariant).

use crate::config::ErrorFrame;
use crate::error::{InekfError, InekfResult};
use crate::manifold::{MatrixGroup, Rotation};
use crate::state::AugmentedState;
use nalgebra::DMatrix;

pub mod inertial;
pub mod odometry;

pub use inertial::InertialProcess;
pub use odometry::{CarProcess, OdometryProcess};

/// Dynamics and linearization of a system evolving on a matrix Lie group.
pub trait ProcessModel {
    /// Rotation kind of the state group.
    type Rot: Rotation;

    /// Control input consumed by one prediction step.
    type Control;

    /// Propagate the mean over `dt`.
    fn f(
        &self,
        u: &Self::Control,
        dt: f64,
        state: &MatrixGroup<Self::Rot>,
    ) -> InekfResult<MatrixGroup<Self::Rot>>;

    /// Error transition matrix over `dt`, sized to the state's current dimension.
    fn make_phi(
        &self,
        u: &Self::Control,
        dt: f64,
        state: &AugmentedState<Self::Rot>,
        frame: ErrorFrame,
    ) -> InekfResult<DMatrix<f64>>;

    /// Continuous-time process noise, `None` until configured.
    fn q(&self) -> Option<&DMatrix<f64>>;
}

/// Lift a process-noise matrix to the full error state and scale it by `dt`.
///
/// `q` covers either the core pose (rotation plus core columns) or the core pose
/// followed by the whole auxiliary vector. Landmark rows stay zero; auxiliary rows
/// stay zero in the first case.
pub fn lift_noise<R: Rotation>(
    q: &DMatrix<f64>,
    state: &AugmentedState<R>,
    dt: f64,
) -> InekfResult<DMatrix<f64>> {
    let dim = state.dim();
    let core = R::DOF + R::DIM * state.mean().layout().core_columns;
    let aug = state.augment().len();

    if !q.is_square() || (q.nrows() != core && q.nrows() != core + aug) {
        return Err(InekfError::Dimension(format!(
            "process noise must be {core}x{core} or {0}x{0}, got {1}x{2}",
            core + aug,
            q.nrows(),
            q.ncols()
        )));
    }

    let mut lifted = DMatrix::zeros(dim, dim);
    lifted
        .view_mut((0, 0), (core, core))
        .copy_from(&q.view((0, 0), (core, core)));
    if q.nrows() == core + aug && aug > 0 {
        let tail = dim - aug;
        lifted
            .view_mut((tail, tail), (aug, aug))
            .copy_from(&q.view((core, core), (aug, aug)));
        lifted
            .view_mut((0, tail), (core, aug))
            .copy_from(&q.view((0, core), (core, aug)));
        lifted
            .view_mut((tail, 0), (aug, core))
            .copy_from(&q.view((core, 0), (aug, core)));
    }
    Ok(lifted * dt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::{Extent, Layout, SO2, SO3};
    use nalgebra::{DVector, Matrix3, Vector3};

    #[test]
    fn test_lift_noise_pads_landmarks() {
        let mean = MatrixGroup::<SO2>::se2_slam(0.0, 0.0, 0.0);
        let mut state = AugmentedState::new(mean, DMatrix::identity(3, 3)).unwrap();
        state
            .add_column(&DVector::from_vec(vec![1.0, 2.0]), &DMatrix::identity(2, 2))
            .unwrap();

        let q = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 2.0, 3.0]));
        let lifted = lift_noise(&q, &state, 0.5).unwrap();
        assert_eq!(lifted.shape(), (5, 5));
        assert_eq!(lifted[(2, 2)], 1.5);
        assert_eq!(lifted.view((3, 3), (2, 2)).norm(), 0.0);
    }

    #[test]
    fn test_lift_noise_places_augment_at_tail() {
        let mean = MatrixGroup::<SO3>::se2_3_with_bias(
            &Matrix3::identity(),
            &Vector3::zeros(),
            &Vector3::zeros(),
            &Vector3::zeros(),
            &Vector3::zeros(),
        )
        .unwrap();
        let state = AugmentedState::new(mean, DMatrix::identity(15, 15)).unwrap();
        let q = DMatrix::from_fn(15, 15, |i, j| if i == j { i as f64 } else { 0.0 });
        let lifted = lift_noise(&q, &state, 1.0).unwrap();
        assert_eq!(lifted, q);

        // Core-only noise leaves the bias block empty
        let core_q = DMatrix::identity(9, 9);
        let lifted = lift_noise(&core_q, &state, 2.0).unwrap();
        assert_eq!(lifted[(8, 8)], 2.0);
        assert_eq!(lifted.view((9, 9), (6, 6)).norm(), 0.0);
    }

    #[test]
    fn test_lift_noise_rejects_other_sizes() {
        let layout = Layout::rigid().with_augment(Extent::Fixed(2));
        let mean = MatrixGroup::<SO2>::exp(&DVector::zeros(5), layout).unwrap();
        let state = AugmentedState::new(mean, DMatrix::identity(5, 5)).unwrap();
        assert!(lift_noise(&DMatrix::identity(4, 4), &state, 1.0).is_err());
        assert!(lift_noise(&DMatrix::identity(3, 3), &state, 1.0).is_ok());
        assert!(lift_noise(&DMatrix::identity(5, 5), &state, 1.0).is_ok());
    }
}
