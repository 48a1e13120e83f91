//! Runtime-sized matrix Lie group.
//!
//! A [`MatrixGroup`] stores the homogeneous matrix
//!
//! ```text
//! X = [ R  t₁ … t_K ]
//!     [ 0  I_K      ]
//! ```
//!
//! together with an auxiliary vector that composes additively. The rotation kind
//! `R` fixes the ambient dimension; the [`Layout`] fixes which counts may change.

use crate::manifold::{Layout, ManifoldError, ManifoldResult, Rotation, Shape};
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use std::fmt;
use std::marker::PhantomData;

/// Tolerance on orthonormality and determinant when validating rotation blocks.
const ROTATION_TOLERANCE: f64 = 1e-6;

/// Element of SO(n), SE(n) or SE_K(n), optionally augmented with a Euclidean vector.
#[derive(Clone, Debug, PartialEq)]
pub struct MatrixGroup<R: Rotation> {
    mat: DMatrix<f64>,
    aug: DVector<f64>,
    layout: Layout,
    _rotation: PhantomData<R>,
}

impl<R: Rotation> fmt::Display for MatrixGroup<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = self.shape();
        write!(f, "{}(columns: {}, aug: {})", R::NAME, shape.columns, shape.augment)?;
        let xi = self.log();
        write!(f, " log: [")?;
        for (i, v) in xi.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v:.4}")?;
        }
        write!(f, "]")
    }
}

impl<R: Rotation> MatrixGroup<R> {
    /// Assemble an element from parts that are already known to be consistent.
    pub(crate) fn from_raw(mat: DMatrix<f64>, aug: DVector<f64>, layout: Layout) -> Self {
        Self {
            mat,
            aug,
            layout,
            _rotation: PhantomData,
        }
    }

    /// Identity element with the layout's initial shape.
    pub fn identity(layout: Layout) -> Self {
        let shape = layout.initial_shape();
        Self::from_raw(
            DMatrix::identity(shape.matrix_size::<R>(), shape.matrix_size::<R>()),
            DVector::zeros(shape.augment),
            layout,
        )
    }

    /// Identity element with an explicit shape.
    pub fn identity_with(layout: Layout, shape: Shape) -> ManifoldResult<Self> {
        layout.check(shape)?;
        let n = shape.matrix_size::<R>();
        Ok(Self::from_raw(
            DMatrix::identity(n, n),
            DVector::zeros(shape.augment),
            layout,
        ))
    }

    /// Build an element from a rotation block, translation columns (one per matrix
    /// column) and an auxiliary vector.
    ///
    /// # Arguments
    /// * `rotation` - `DIM × DIM` rotation matrix, must be orthonormal with det = +1
    /// * `columns` - `DIM × K` matrix whose columns are the translation columns
    /// * `aug` - auxiliary vector
    /// * `layout` - counts the element must satisfy
    pub fn from_parts(
        rotation: &DMatrix<f64>,
        columns: &DMatrix<f64>,
        aug: DVector<f64>,
        layout: Layout,
    ) -> ManifoldResult<Self> {
        let n = R::DIM;
        if rotation.shape() != (n, n) {
            return Err(ManifoldError::Dimension(format!(
                "rotation block must be {n}x{n}, got {}x{}",
                rotation.nrows(),
                rotation.ncols()
            )));
        }
        if columns.nrows() != n {
            return Err(ManifoldError::Dimension(format!(
                "translation columns must have {n} rows, got {}",
                columns.nrows()
            )));
        }
        check_rotation(rotation)?;
        let shape = Shape::new(columns.ncols(), aug.len());
        layout.check(shape)?;

        let size = shape.matrix_size::<R>();
        let mut mat = DMatrix::identity(size, size);
        mat.view_mut((0, 0), (n, n)).copy_from(rotation);
        mat.view_mut((0, n), (n, shape.columns)).copy_from(columns);
        Ok(Self::from_raw(mat, aug, layout))
    }

    /// Build an element from a full homogeneous matrix.
    pub fn from_matrix(
        mat: DMatrix<f64>,
        aug: DVector<f64>,
        layout: Layout,
    ) -> ManifoldResult<Self> {
        let n = R::DIM;
        if !mat.is_square() || mat.nrows() < n {
            return Err(ManifoldError::Dimension(format!(
                "group matrix must be square with side >= {n}, got {}x{}",
                mat.nrows(),
                mat.ncols()
            )));
        }
        let k = mat.nrows() - n;
        let lower = mat.view((n, 0), (k, n + k));
        for i in 0..k {
            for j in 0..n + k {
                let expected = if j == n + i { 1.0 } else { 0.0 };
                if (lower[(i, j)] - expected).abs() > ROTATION_TOLERANCE {
                    return Err(ManifoldError::InvalidElement(
                        "lower block must be [0 I]".to_string(),
                    ));
                }
            }
        }
        let rotation = mat.view((0, 0), (n, n)).into_owned();
        let columns = mat.view((0, n), (n, k)).into_owned();
        Self::from_parts(&rotation, &columns, aug, layout)
    }

    /// Sample an element with tangent entries drawn uniformly from `[-scale, scale]`.
    pub fn random<G: Rng>(
        layout: Layout,
        shape: Shape,
        scale: f64,
        rng: &mut G,
    ) -> ManifoldResult<Self> {
        layout.check(shape)?;
        let xi = DVector::from_fn(shape.dof::<R>(), |_, _| rng.gen_range(-scale..=scale));
        Self::exp_with(&xi, layout, shape)
    }

    /// Exponential map, inferring the shape from the tangent length.
    ///
    /// # Notes
    /// R = exp(ω), tₖ = J_l(ω) ρₖ, aux = a
    pub fn exp(xi: &DVector<f64>, layout: Layout) -> ManifoldResult<Self> {
        let shape = layout.resolve::<R>(xi.len())?;
        Self::exp_with(xi, layout, shape)
    }

    /// Exponential map for a known shape.
    pub fn exp_with(xi: &DVector<f64>, layout: Layout, shape: Shape) -> ManifoldResult<Self> {
        layout.check(shape)?;
        let expected = shape.dof::<R>();
        if xi.len() != expected {
            return Err(ManifoldError::InvalidTangentDimension {
                expected,
                actual: xi.len(),
            });
        }
        let (n, d) = (R::DIM, R::DOF);
        let omega = &xi.as_slice()[0..d];
        let jacobian = R::left_jacobian(omega);

        let size = shape.matrix_size::<R>();
        let mut mat = DMatrix::identity(size, size);
        mat.view_mut((0, 0), (n, n)).copy_from(&R::exp(omega));
        for k in 0..shape.columns {
            let rho = xi.rows(d + n * k, n);
            mat.view_mut((0, n + k), (n, 1)).copy_from(&(&jacobian * rho));
        }
        let aug = xi.rows(d + n * shape.columns, shape.augment).into_owned();
        Ok(Self::from_raw(mat, aug, layout))
    }

    /// Logarithmic map, the inverse of [`MatrixGroup::exp`].
    ///
    /// Rotation angles are recovered in (−π, π]; the translation tangents are
    /// `ρₖ = J_l⁻¹(ω) tₖ`.
    pub fn log(&self) -> DVector<f64> {
        let shape = self.shape();
        let (n, d) = (R::DIM, R::DOF);
        let omega = R::log(&self.rotation());
        let jacobian_inv = R::left_jacobian_inv(omega.as_slice());

        let mut xi = DVector::zeros(shape.dof::<R>());
        xi.rows_mut(0, d).copy_from(&omega);
        for k in 0..shape.columns {
            let t = self.mat.view((0, n + k), (n, 1));
            xi.rows_mut(d + n * k, n).copy_from(&(&jacobian_inv * t));
        }
        xi.rows_mut(d + n * shape.columns, shape.augment)
            .copy_from(&self.aug);
        xi
    }

    /// Logarithm of the core pose: rotation and core columns only.
    pub fn core_log(&self) -> DVector<f64> {
        let len = R::DOF + R::DIM * self.layout.core_columns;
        self.log().rows(0, len).into_owned()
    }

    /// Lie algebra matrix of a tangent vector. The auxiliary part has no matrix
    /// representation and is dropped.
    pub fn wedge(xi: &DVector<f64>, layout: Layout) -> ManifoldResult<DMatrix<f64>> {
        let shape = layout.resolve::<R>(xi.len())?;
        let (n, d) = (R::DIM, R::DOF);
        let size = shape.matrix_size::<R>();
        let mut algebra = DMatrix::zeros(size, size);
        algebra
            .view_mut((0, 0), (n, n))
            .copy_from(&R::hat(&xi.as_slice()[0..d]));
        for k in 0..shape.columns {
            algebra
                .view_mut((0, n + k), (n, 1))
                .copy_from(&xi.rows(d + n * k, n));
        }
        Ok(algebra)
    }

    /// Inverse of [`MatrixGroup::wedge`]; returns rotation and column coordinates.
    pub fn vee(algebra: &DMatrix<f64>) -> ManifoldResult<DVector<f64>> {
        let n = R::DIM;
        if !algebra.is_square() || algebra.nrows() < n {
            return Err(ManifoldError::Dimension(format!(
                "algebra matrix must be square with side >= {n}"
            )));
        }
        let k = algebra.nrows() - n;
        let d = R::DOF;
        let mut xi = DVector::zeros(d + n * k);
        let skew = algebra.view((0, 0), (n, n)).into_owned();
        xi.rows_mut(0, d).copy_from(&R::vee(&skew));
        for c in 0..k {
            xi.rows_mut(d + n * c, n)
                .copy_from(&algebra.view((0, n + c), (n, 1)));
        }
        Ok(xi)
    }

    /// Analytic inverse: Rᵀ, -Rᵀtₖ, -aux.
    pub fn inverse(&self) -> Self {
        let n = R::DIM;
        let k = self.columns();
        let rt = self.rotation().transpose();
        let mut mat = DMatrix::identity(n + k, n + k);
        for c in 0..k {
            let t = self.mat.view((0, n + c), (n, 1));
            mat.view_mut((0, n + c), (n, 1)).copy_from(&(-(&rt * t)));
        }
        mat.view_mut((0, 0), (n, n)).copy_from(&rt);
        Self::from_raw(mat, -&self.aug, self.layout)
    }

    /// Group composition `self · other`; auxiliary vectors add.
    pub fn compose(&self, other: &Self) -> ManifoldResult<Self> {
        if self.shape() != other.shape() {
            return Err(ManifoldError::Dimension(format!(
                "cannot compose shapes {:?} and {:?}",
                self.shape(),
                other.shape()
            )));
        }
        Ok(Self::from_raw(
            &self.mat * &other.mat,
            &self.aug + &other.aug,
            self.layout,
        ))
    }

    /// Adjoint matrix on the full tangent space.
    ///
    /// # Notes
    /// Ad(X) = [ Ad_R        0   …  0 ]
    ///         [ [t₁]ₓR      R   …  0 ]
    ///         [ …               ⋱    ]
    ///         [ [t_K]ₓR     0   …  R ]   ⊕ I_aux
    pub fn adjoint(&self) -> DMatrix<f64> {
        let shape = self.shape();
        let (n, d) = (R::DIM, R::DOF);
        let dim = shape.dof::<R>();
        let rotation = self.rotation();

        let mut adj = DMatrix::zeros(dim, dim);
        adj.view_mut((0, 0), (d, d))
            .copy_from(&R::rotation_adjoint(&rotation));
        for k in 0..shape.columns {
            let off = d + n * k;
            let t: Vec<f64> = self.mat.view((0, n + k), (n, 1)).iter().copied().collect();
            adj.view_mut((off, off), (n, n)).copy_from(&rotation);
            adj.view_mut((off, 0), (n, d))
                .copy_from(&R::translation_coupling(&t, &rotation));
        }
        let tail = d + n * shape.columns;
        adj.view_mut((tail, tail), (shape.augment, shape.augment))
            .fill_with_identity();
        adj
    }

    /// Action on a homogeneous vector of length `DIM + columns`.
    pub fn act(&self, b: &DVector<f64>) -> ManifoldResult<DVector<f64>> {
        if b.len() != self.mat.nrows() {
            return Err(ManifoldError::InvalidTangentDimension {
                expected: self.mat.nrows(),
                actual: b.len(),
            });
        }
        Ok(&self.mat * b)
    }

    /// Append a translation column; returns its column index.
    ///
    /// Fails on layouts with a fixed column count.
    pub fn add_column(&mut self, position: &DVector<f64>) -> ManifoldResult<usize> {
        if !self.layout.columns.is_dynamic() {
            return Err(ManifoldError::Dimension(
                "layout has a fixed number of columns".to_string(),
            ));
        }
        if position.len() != R::DIM {
            return Err(ManifoldError::InvalidTangentDimension {
                expected: R::DIM,
                actual: position.len(),
            });
        }
        let size = self.mat.nrows();
        let index = self.columns();
        let mut mat = self.mat.clone().insert_row(size, 0.0).insert_column(size, 0.0);
        mat[(size, size)] = 1.0;
        mat.view_mut((0, size), (R::DIM, 1)).copy_from(position);
        self.mat = mat;
        Ok(index)
    }

    /// Append an auxiliary value; returns its index within the auxiliary vector.
    pub fn add_augment(&mut self, value: f64) -> ManifoldResult<usize> {
        if !self.layout.augment.is_dynamic() {
            return Err(ManifoldError::Dimension(
                "layout has a fixed auxiliary length".to_string(),
            ));
        }
        let index = self.aug.len();
        self.aug = self.aug.clone().push(value);
        Ok(index)
    }

    /// Whether the rotation block is orthonormal with det = +1 and the lower block is `[0 I]`.
    pub fn is_valid(&self, tolerance: f64) -> bool {
        let rotation = self.rotation();
        let n = R::DIM;
        let k = self.columns();
        let orthonormal =
            (rotation.transpose() * &rotation - DMatrix::identity(n, n)).norm() < tolerance;
        let proper = (rotation.determinant() - 1.0).abs() < tolerance;
        let lower = self.mat.view((n, 0), (k, n + k));
        let mut expected = DMatrix::zeros(k, n + k);
        expected.view_mut((0, n), (k, k)).fill_with_identity();
        orthonormal && proper && (lower - expected).norm() < tolerance
    }

    /// Homogeneous matrix.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.mat
    }

    /// Rotation block.
    pub fn rotation(&self) -> DMatrix<f64> {
        self.mat.view((0, 0), (R::DIM, R::DIM)).into_owned()
    }

    /// Translation column `i`.
    pub fn column(&self, i: usize) -> ManifoldResult<DVector<f64>> {
        if i >= self.columns() {
            return Err(ManifoldError::Dimension(format!(
                "column {i} out of range, element has {}",
                self.columns()
            )));
        }
        Ok(self.mat.view((0, R::DIM + i), (R::DIM, 1)).column(0).into_owned())
    }

    /// Auxiliary vector.
    pub fn augment(&self) -> &DVector<f64> {
        &self.aug
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Number of translation columns.
    pub fn columns(&self) -> usize {
        self.mat.nrows() - R::DIM
    }

    pub fn shape(&self) -> Shape {
        Shape::new(self.columns(), self.aug.len())
    }

    /// Tangent dimension.
    pub fn dof(&self) -> usize {
        self.shape().dof::<R>()
    }
}

fn check_rotation(rotation: &DMatrix<f64>) -> ManifoldResult<()> {
    let n = rotation.nrows();
    let orthonormality = (rotation.transpose() * rotation - DMatrix::identity(n, n)).norm();
    if orthonormality > ROTATION_TOLERANCE {
        return Err(ManifoldError::InvalidElement(format!(
            "rotation block is not orthonormal (|RᵀR - I| = {orthonormality:.3e})"
        )));
    }
    let det = rotation.determinant();
    if (det - 1.0).abs() > ROTATION_TOLERANCE {
        return Err(ManifoldError::InvalidElement(format!(
            "rotation block has determinant {det:.6}"
        )));
    }
    Ok(())
}
