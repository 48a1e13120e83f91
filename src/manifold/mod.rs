//! Matrix Lie groups used as filter state spaces.
//!
//! Every state in this crate is an element of a group of homogeneous matrices:
//! - **SO(2)** / **SO(3)**: rotations
//! - **SE(2)** / **SE(3)**: rigid transformations
//! - **SE_K(n)**: a rotation sharing its frame with K translation columns
//!   (extended poses, landmark-augmented poses)
//!
//! Any of them may additionally carry an auxiliary Euclidean vector (sensor biases)
//! that composes by addition.
//!
//! Lie group      | matrix                     | dof            | Exp
//! -------------- | -------------------------- | -------------- | ---------------------------
//! SO(2)          | R                          | 1              | R = exp([θ]x)
//! SO(3)          | R                          | 3              | Rodrigues
//! SE_K(2)        | [R t₁..t_K; 0 I]           | 1 + 2K         | tₖ = J_l(θ) ρₖ
//! SE_K(3)        | [R t₁..t_K; 0 I]           | 3 + 3K         | tₖ = J_l(ω) ρₖ
//! + aux (len a)  | (vector, added)            | + a            | identity
//!
//! Tangent vectors are ordered `[rotation, column₁, …, column_K, aux]`.
//!
//! The group itself is runtime sized ([`MatrixGroup`]); the rotation kind ([`SO2`] or
//! [`SO3`]) is a type parameter carrying the closed-form rotation math, and a [`Layout`]
//! states which of the column and auxiliary counts are fixed and which may grow.
//!
//! # Example
//!
//! ```rust,ignore
//! use inekf::manifold::{MatrixGroup, SO2};
//!
//! let pose = MatrixGroup::<SO2>::se2(0.3, 1.0, 2.0);
//! let xi = pose.log();
//! let back = MatrixGroup::<SO2>::exp(&xi, pose.layout())?;
//! ```

use nalgebra::{DMatrix, DVector};
use std::fmt::Debug;
use thiserror::Error;

pub mod group;
pub mod se2;
pub mod se3;
pub mod so2;
pub mod so3;

pub use group::MatrixGroup;
pub use so2::SO2;
pub use so3::SO3;

/// Planar groups: SO(2), SE(2) and SE_K(2).
pub type Planar = MatrixGroup<SO2>;

/// Spatial groups: SO(3), SE(3) and SE_K(3).
pub type Spatial = MatrixGroup<SO3>;

/// Errors that can occur during manifold operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ManifoldError {
    /// Invalid tangent vector dimension
    #[error("Invalid tangent dimension: expected {expected}, got {actual}")]
    InvalidTangentDimension { expected: usize, actual: usize },
    /// Column or auxiliary counts that contradict the layout
    #[error("Dimension mismatch: {0}")]
    Dimension(String),
    /// Invalid manifold element
    #[error("Invalid manifold element: {0}")]
    InvalidElement(String),
}

/// Result type for manifold operations.
pub type ManifoldResult<T> = Result<T, ManifoldError>;

/// Closed-form rotation math for one ambient dimension.
///
/// Implemented by the zero-sized markers [`SO2`] and [`SO3`]. All matrices are
/// returned dynamically sized so that [`MatrixGroup`] can splice them into its
/// blocks; implementations compute with fixed-size nalgebra types internally.
pub trait Rotation: Clone + Copy + Debug + PartialEq + Send + Sync + 'static {
    /// Dimension of the space the rotation acts on.
    const DIM: usize;

    /// Degrees of freedom of the rotation.
    const DOF: usize;

    /// Group name used in `Display` output.
    const NAME: &'static str;

    /// Skew-symmetric algebra matrix of a rotation tangent (`DOF` values).
    fn hat(omega: &[f64]) -> DMatrix<f64>;

    /// Inverse of [`Rotation::hat`].
    fn vee(algebra: &DMatrix<f64>) -> DVector<f64>;

    /// Closed-form exponential map.
    fn exp(omega: &[f64]) -> DMatrix<f64>;

    /// Closed-form logarithmic map, angle in (−π, π].
    fn log(rotation: &DMatrix<f64>) -> DVector<f64>;

    /// Left Jacobian `J_l(ω)`, mapping translation tangents to translations.
    fn left_jacobian(omega: &[f64]) -> DMatrix<f64>;

    /// Inverse of the left Jacobian.
    fn left_jacobian_inv(omega: &[f64]) -> DMatrix<f64>;

    /// Adjoint of the rotation on its own tangent (`DOF × DOF`).
    fn rotation_adjoint(rotation: &DMatrix<f64>) -> DMatrix<f64>;

    /// Coupling of a translation column `t` to the rotation tangent in the adjoint
    /// (`DIM × DOF`).
    fn translation_coupling(translation: &[f64], rotation: &DMatrix<f64>) -> DMatrix<f64>;

    /// Jacobian of `[ω]x p` with respect to `ω` (`DIM × DOF`).
    fn action_jacobian(point: &[f64]) -> DMatrix<f64>;
}

/// Whether a count is frozen or may change at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extent {
    Fixed(usize),
    Dynamic,
}

impl Extent {
    /// Smallest count admitted by this extent.
    pub fn minimum(&self, floor: usize) -> usize {
        match self {
            Extent::Fixed(n) => *n,
            Extent::Dynamic => floor,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Extent::Dynamic)
    }
}

/// Concrete column and auxiliary counts of a group element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape {
    pub columns: usize,
    pub augment: usize,
}

impl Shape {
    pub fn new(columns: usize, augment: usize) -> Self {
        Self { columns, augment }
    }

    /// Tangent dimension of an element with this shape.
    pub fn dof<R: Rotation>(&self) -> usize {
        R::DOF + R::DIM * self.columns + self.augment
    }

    /// Side length of the homogeneous matrix.
    pub fn matrix_size<R: Rotation>(&self) -> usize {
        R::DIM + self.columns
    }
}

/// Static description of a group family.
///
/// `core_columns` translation columns belong to the pose itself (1 for SE(n), 2 for
/// the extended pose); any further columns are landmarks. Process noise is sized
/// against the core part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub core_columns: usize,
    pub columns: Extent,
    pub augment: Extent,
}

impl Layout {
    pub fn new(core_columns: usize, columns: Extent, augment: Extent) -> Self {
        Self {
            core_columns,
            columns,
            augment,
        }
    }

    /// Pure rotation.
    pub fn rotation() -> Self {
        Self::new(0, Extent::Fixed(0), Extent::Fixed(0))
    }

    /// Rigid transform with one translation column.
    pub fn rigid() -> Self {
        Self::new(1, Extent::Fixed(1), Extent::Fixed(0))
    }

    /// Extended pose with velocity and position columns.
    pub fn extended() -> Self {
        Self::new(2, Extent::Fixed(2), Extent::Fixed(0))
    }

    /// Rigid transform followed by a growing set of landmark columns.
    pub fn slam() -> Self {
        Self::new(1, Extent::Dynamic, Extent::Fixed(0))
    }

    pub fn with_columns(mut self, columns: Extent) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_augment(mut self, augment: Extent) -> Self {
        self.augment = augment;
        self
    }

    /// Shape of a freshly created element: fixed counts as given, dynamic columns
    /// reduced to the core, dynamic auxiliary vector empty.
    pub fn initial_shape(&self) -> Shape {
        Shape::new(self.columns.minimum(self.core_columns), self.augment.minimum(0))
    }

    /// Check that a concrete shape is admitted by this layout.
    pub fn check(&self, shape: Shape) -> ManifoldResult<()> {
        if let Extent::Fixed(n) = self.columns
            && n != shape.columns
        {
            return Err(ManifoldError::Dimension(format!(
                "layout fixes {n} columns, element has {}",
                shape.columns
            )));
        }
        if shape.columns < self.core_columns {
            return Err(ManifoldError::Dimension(format!(
                "layout needs at least {} core columns, element has {}",
                self.core_columns, shape.columns
            )));
        }
        if let Extent::Fixed(n) = self.augment
            && n != shape.augment
        {
            return Err(ManifoldError::Dimension(format!(
                "layout fixes {n} auxiliary values, element has {}",
                shape.augment
            )));
        }
        Ok(())
    }

    /// Recover the shape of a tangent vector of length `len`.
    ///
    /// Fails when both axes are dynamic (the split is ambiguous) or when the
    /// length cannot be divided between rotation, columns and auxiliary values.
    pub fn resolve<R: Rotation>(&self, len: usize) -> ManifoldResult<Shape> {
        let shape = match (self.columns, self.augment) {
            (Extent::Fixed(c), Extent::Fixed(a)) => Shape::new(c, a),
            (Extent::Fixed(c), Extent::Dynamic) => {
                let used = R::DOF + R::DIM * c;
                if len < used {
                    return Err(ManifoldError::InvalidTangentDimension {
                        expected: used,
                        actual: len,
                    });
                }
                Shape::new(c, len - used)
            }
            (Extent::Dynamic, Extent::Fixed(a)) => {
                let used = R::DOF + a;
                if len < used || (len - used) % R::DIM != 0 {
                    return Err(ManifoldError::Dimension(format!(
                        "tangent of length {len} does not split into {}-dim columns",
                        R::DIM
                    )));
                }
                Shape::new((len - used) / R::DIM, a)
            }
            (Extent::Dynamic, Extent::Dynamic) => {
                return Err(ManifoldError::Dimension(
                    "cannot infer column and auxiliary counts when both are dynamic".to_string(),
                ));
            }
        };
        self.check(shape)?;
        let expected = shape.dof::<R>();
        if expected != len {
            return Err(ManifoldError::InvalidTangentDimension {
                expected,
                actual: len,
            });
        }
        Ok(shape)
    }
}
