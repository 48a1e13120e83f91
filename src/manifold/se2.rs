//! SE(2) - Special Euclidean Group in 2D
//!
//! Planar rigid transformations and their landmark-augmented variant SE_K(2),
//! where the pose column is followed by K - 1 landmark positions sharing the
//! pose's rotation. Tangent vectors are ordered `[θ, x, y, l₁x, l₁y, …]`.

use crate::manifold::{Layout, ManifoldError, ManifoldResult, MatrixGroup, SO2, so2};
use nalgebra::{DMatrix, DVector, Vector2};

impl MatrixGroup<SO2> {
    /// Planar pose with heading θ and position (x, y).
    pub fn se2(theta: f64, x: f64, y: f64) -> Self {
        Self::se2_with_layout(theta, x, y, Layout::rigid())
    }

    /// Planar pose that may later grow landmark columns.
    pub fn se2_slam(theta: f64, x: f64, y: f64) -> Self {
        Self::se2_with_layout(theta, x, y, Layout::slam())
    }

    fn se2_with_layout(theta: f64, x: f64, y: f64, layout: Layout) -> Self {
        let mut mat = DMatrix::identity(3, 3);
        mat.fixed_view_mut::<2, 2>(0, 0).copy_from(&so2::exp(theta));
        mat[(0, 2)] = x;
        mat[(1, 2)] = y;
        Self::from_raw(mat, DVector::zeros(0), layout)
    }

    /// Planar pose from a heading and a list of positions: the first position is
    /// the pose translation, the rest are landmarks.
    pub fn se2_with_landmarks(
        theta: f64,
        positions: &[Vector2<f64>],
        layout: Layout,
    ) -> ManifoldResult<Self> {
        let rotation = DMatrix::from_iterator(2, 2, so2::exp(theta).iter().copied());
        let mut columns = DMatrix::zeros(2, positions.len());
        for (k, p) in positions.iter().enumerate() {
            columns.set_column(k, p);
        }
        Self::from_parts(&rotation, &columns, DVector::zeros(0), layout)
    }

    /// Heading of the pose.
    pub fn theta(&self) -> f64 {
        self.angle()
    }

    /// Position of the pose (first translation column).
    pub fn position(&self) -> ManifoldResult<Vector2<f64>> {
        if self.columns() == 0 {
            return Err(ManifoldError::Dimension(
                "pure rotation has no position column".to_string(),
            ));
        }
        Ok(Vector2::new(self.matrix()[(0, 2)], self.matrix()[(1, 2)]))
    }
}
