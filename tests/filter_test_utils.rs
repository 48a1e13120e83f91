//! Shared utilities for filter integration tests

#![allow(dead_code)]

use inekf::manifold::{Planar, SO2};
use inekf::process::OdometryProcess;
use inekf::{AugmentedState, ErrorFrame, InEKF};
use nalgebra::{DMatrix, DVector, Vector2};

/// Planar pose filter with isotropic prior covariance and diagonal process noise.
///
/// # Arguments
/// * `frame` - error frame of the filter
/// * `prior` - prior variance on every pose dimension
/// * `q` - process noise variance on every pose dimension
pub fn planar_filter(frame: ErrorFrame, prior: f64, q: f64) -> InEKF<OdometryProcess<SO2>> {
    let process = OdometryProcess::<SO2>::with_noise(DMatrix::identity(3, 3) * q)
        .expect("square process noise");
    let state = AugmentedState::new(
        Planar::se2_slam(0.0, 0.0, 0.0),
        DMatrix::identity(3, 3) * prior,
    )
    .expect("consistent prior");
    InEKF::new(process, state, frame)
}

/// Range and bearing of `landmark` seen from the pose `(theta, position)`.
pub fn range_bearing(theta: f64, position: Vector2<f64>, landmark: Vector2<f64>) -> DVector<f64> {
    let offset = landmark - position;
    let bearing = offset.y.atan2(offset.x) - theta;
    DVector::from_vec(vec![offset.norm(), bearing.sin().atan2(bearing.cos())])
}

/// Whether every diagonal entry of `p` is non-negative and `p` is symmetric.
pub fn is_valid_covariance(p: &DMatrix<f64>) -> bool {
    (p - p.transpose()).norm() < 1e-9 && (0..p.nrows()).all(|i| p[(i, i)] >= 0.0)
}
