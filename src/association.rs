//! Gated nearest-neighbour data association for landmark observations.
//!
//! Each observation is scored against every mapped landmark with the model's
//! squared Mahalanobis distance. The cost matrix is extended with a diagonal
//! "new landmark" block,
//!
//! ```text
//! C = [ D | α I ]      D[i, j] = d²(zᵢ, landmark j),  α = χ²(p_accept, dof)
//! ```
//!
//! and resolved greedily: observations are visited in order of their best cost,
//! each takes its cheapest free column, and taken landmark columns become
//! unavailable. An observation that falls on its "new" column but lies within the
//! stricter gate `β = χ²(p_reject, dof)` of some landmark is ambiguous and rejected.

use crate::config::{AssociationConfig, ErrorFrame};
use crate::error::InekfResult;
use crate::manifold::Rotation;
use crate::measure::MeasureModel;
use crate::state::AugmentedState;
use nalgebra::{DMatrix, DVector};
use tracing::debug;

/// Cost assigned to unavailable cells.
const UNAVAILABLE: f64 = 1e8;

/// Outcome of associating one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Association {
    /// Matches the landmark stored in this state column.
    Existing(usize),
    /// Far from every landmark; should initialize a new column.
    New,
    /// Too close to a landmark to be new, but not claimed by it.
    Reject,
}

/// Associate `observations` with the landmark columns of `state`.
///
/// `model` is cloned and pointed at each landmark in turn through
/// [`MeasureModel::saw_landmark`]; `frame` is the filter's error frame.
///
/// # Returns
/// One [`Association`] per observation, in input order.
pub fn associate<R, M>(
    state: &AugmentedState<R>,
    model: &M,
    observations: &[DVector<f64>],
    frame: ErrorFrame,
    config: &AssociationConfig,
) -> InekfResult<Vec<Association>>
where
    R: Rotation,
    M: MeasureModel<R> + Clone,
{
    let first = state.mean().layout().core_columns;
    let landmarks = state.landmarks();
    let count = observations.len();
    if landmarks == 0 {
        return Ok(vec![Association::New; count]);
    }

    let mut distances = DMatrix::zeros(count, landmarks);
    for j in 0..landmarks {
        let mut probe = model.clone();
        probe.saw_landmark(first + j, state)?;
        for (i, z) in observations.iter().enumerate() {
            distances[(i, j)] = probe.calc_mahalanobis(z, state, frame)?;
        }
    }

    let (alpha, beta) = (config.accept_gate(), config.reject_gate());
    let mut cost = DMatrix::from_element(count, landmarks + count, UNAVAILABLE);
    cost.view_mut((0, 0), (count, landmarks)).copy_from(&distances);
    cost.view_mut((0, landmarks), (count, count))
        .fill_diagonal(alpha);

    let mut order: Vec<usize> = (0..count).collect();
    let row_min: Vec<f64> = cost
        .row_iter()
        .map(|row| row.iter().copied().fold(f64::INFINITY, f64::min))
        .collect();
    order.sort_by(|&a, &b| row_min[a].total_cmp(&row_min[b]));

    let mut result = vec![Association::New; count];
    for i in order {
        let column = argmin(cost.row(i).iter().copied());
        if column < landmarks {
            result[i] = Association::Existing(first + column);
            cost.column_mut(column).fill(UNAVAILABLE);
        } else if distances.row(i).iter().any(|&d| d < beta) {
            result[i] = Association::Reject;
        }
        debug!(
            "observation {} -> {:?} (best cost {:.3})",
            i, result[i], row_min[i]
        );
    }
    Ok(result)
}

fn argmin(values: impl Iterator<Item = f64>) -> usize {
    let mut best = (0, f64::INFINITY);
    for (j, v) in values.enumerate() {
        if v < best.1 {
            best = (j, v);
        }
    }
    best.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifold::{MatrixGroup, SO2};
    use crate::measure::LandmarkSensor;

    fn mapped_state(landmarks: &[[f64; 2]]) -> AugmentedState<SO2> {
        let mut state = AugmentedState::new(
            MatrixGroup::<SO2>::se2_slam(0.0, 0.0, 0.0),
            DMatrix::identity(3, 3) * 1e-4,
        )
        .unwrap();
        for l in landmarks {
            state
                .add_column(&DVector::from_row_slice(l), &(DMatrix::identity(2, 2) * 0.01))
                .unwrap();
        }
        state
    }

    fn range_bearing(x: f64, y: f64) -> DVector<f64> {
        DVector::from_vec(vec![x.hypot(y), y.atan2(x)])
    }

    #[test]
    fn test_empty_map_is_all_new() {
        let state = mapped_state(&[]);
        let sensor = LandmarkSensor::new(0.1, 0.01);
        let obs = vec![range_bearing(1.0, 1.0), range_bearing(2.0, 0.0)];
        let config = AssociationConfig::default();
        let result = associate(&state, &sensor, &obs, ErrorFrame::Right, &config).unwrap();
        assert_eq!(result, vec![Association::New, Association::New]);
    }

    #[test]
    fn test_matches_existing_and_new() {
        let state = mapped_state(&[[5.0, 0.0], [0.0, 5.0]]);
        let sensor = LandmarkSensor::new(0.1, 0.01);
        let obs = vec![
            range_bearing(0.0, 5.02),
            range_bearing(-20.0, -20.0),
            range_bearing(5.01, 0.0),
        ];
        let config = AssociationConfig::default();
        let result = associate(&state, &sensor, &obs, ErrorFrame::Right, &config).unwrap();
        assert_eq!(
            result,
            vec![
                Association::Existing(2),
                Association::New,
                Association::Existing(1)
            ]
        );
    }

    #[test]
    fn test_landmark_claimed_once() {
        let state = mapped_state(&[[5.0, 0.0]]);
        let sensor = LandmarkSensor::new(0.1, 0.01);
        // Both close to the same landmark; the closer one wins, the other is ambiguous
        let obs = vec![range_bearing(5.15, 0.0), range_bearing(5.0, 0.0)];
        let config = AssociationConfig::default();
        let result = associate(&state, &sensor, &obs, ErrorFrame::Right, &config).unwrap();
        assert_eq!(result[1], Association::Existing(1));
        assert_eq!(result[0], Association::Reject);
    }

    #[test]
    fn test_between_gates_is_rejected() {
        let state = mapped_state(&[[5.0, 0.0]]);
        let sensor = LandmarkSensor::new(0.1, 0.01);
        let config = AssociationConfig::default();
        let z = range_bearing(5.0, 0.0);

        // Find a range offset whose distance sits between α and β
        let mut probe = sensor.clone();
        probe.saw_landmark(1, &state).unwrap();
        let mut offset = 0.0;
        let mut d = 0.0;
        while d < (config.accept_gate() + config.reject_gate()) / 2.0 {
            offset += 1e-3;
            let mut shifted = z.clone();
            shifted[0] += offset;
            d = probe.calc_mahalanobis(&shifted, &state, ErrorFrame::Right).unwrap();
        }
        assert!(d < config.reject_gate());

        let mut shifted = z;
        shifted[0] += offset;
        let result = associate(&state, &sensor, &[shifted], ErrorFrame::Right, &config).unwrap();
        assert_eq!(result, vec![Association::Reject]);
    }
}
