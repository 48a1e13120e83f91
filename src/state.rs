//! Augmented filter state: a group-valued mean and its error covariance.
//!
//! The covariance is indexed like the tangent space of the mean,
//! `[rotation, column₁, …, column_K, aux]`, so structural growth inserts new
//! rows and columns in the middle (columns) or at the end (auxiliary values).

use crate::error::{InekfError, InekfResult};
use crate::manifold::{MatrixGroup, Rotation};
use nalgebra::{DMatrix, DVector};
use std::fmt;
use tracing::debug;

/// Mean on a matrix Lie group plus a dense error covariance.
#[derive(Clone, Debug, PartialEq)]
pub struct AugmentedState<R: Rotation> {
    mean: MatrixGroup<R>,
    covariance: DMatrix<f64>,
}

impl<R: Rotation> fmt::Display for AugmentedState<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} cov trace: {:.4e}", self.mean, self.covariance.trace())
    }
}

impl<R: Rotation> AugmentedState<R> {
    /// Create a state, checking that the covariance matches the mean's tangent dimension.
    ///
    /// # Arguments
    /// * `mean` - group element, including any landmark columns and auxiliary values
    /// * `covariance` - square matrix of side `mean.dof()`
    pub fn new(mean: MatrixGroup<R>, covariance: DMatrix<f64>) -> InekfResult<Self> {
        check_covariance(&covariance, mean.dof())?;
        let mut state = Self { mean, covariance };
        state.symmetrize();
        Ok(state)
    }

    /// Create a state with a diagonal covariance.
    pub fn with_diagonal(mean: MatrixGroup<R>, diagonal: &DVector<f64>) -> InekfResult<Self> {
        Self::new(mean, DMatrix::from_diagonal(diagonal))
    }

    /// Append a translation column (landmark) and grow the covariance.
    ///
    /// The new diagonal block is `init_cov`; its cross-covariance with the rest of
    /// the state starts at zero. A joint update right after insertion is what
    /// builds up the correlation.
    ///
    /// # Returns
    /// The index of the new column, as accepted by [`AugmentedState::column`].
    pub fn add_column(
        &mut self,
        position: &DVector<f64>,
        init_cov: &DMatrix<f64>,
    ) -> InekfResult<usize> {
        let n = R::DIM;
        if init_cov.shape() != (n, n) {
            return Err(InekfError::Dimension(format!(
                "initial column covariance must be {n}x{n}, got {}x{}",
                init_cov.nrows(),
                init_cov.ncols()
            )));
        }
        let at = R::DOF + n * self.mean.columns();
        let mut mean = self.mean.clone();
        let index = mean.add_column(position)?;

        let covariance = self
            .covariance
            .clone()
            .insert_rows(at, n, 0.0)
            .insert_columns(at, n, 0.0);
        self.mean = mean;
        self.covariance = covariance;
        self.covariance.view_mut((at, at), (n, n)).copy_from(init_cov);
        self.symmetrize();

        debug!(index, dim = self.dim(), "added state column");
        Ok(index)
    }

    /// Append an auxiliary value (e.g. a bias) with initial variance `init_var`.
    ///
    /// # Returns
    /// The index of the new value within the auxiliary vector.
    pub fn add_augmented(&mut self, value: f64, init_var: f64) -> InekfResult<usize> {
        let mut mean = self.mean.clone();
        let index = mean.add_augment(value)?;
        let at = self.dim();
        self.covariance = self
            .covariance
            .clone()
            .insert_row(at, 0.0)
            .insert_column(at, 0.0);
        self.covariance[(at, at)] = init_var;
        self.mean = mean;
        self.symmetrize();

        debug!(index, dim = self.dim(), "added auxiliary state");
        Ok(index)
    }

    pub fn mean(&self) -> &MatrixGroup<R> {
        &self.mean
    }

    pub fn covariance(&self) -> &DMatrix<f64> {
        &self.covariance
    }

    /// Replace the mean; its tangent dimension must match the covariance.
    pub fn set_mean(&mut self, mean: MatrixGroup<R>) -> InekfResult<()> {
        check_covariance(&self.covariance, mean.dof())?;
        self.mean = mean;
        Ok(())
    }

    /// Replace the covariance; it is symmetrized on the way in.
    pub fn set_covariance(&mut self, covariance: DMatrix<f64>) -> InekfResult<()> {
        check_covariance(&covariance, self.dim())?;
        self.covariance = covariance;
        self.symmetrize();
        Ok(())
    }

    /// Error-state dimension.
    pub fn dim(&self) -> usize {
        self.mean.dof()
    }

    /// Translation column `i` of the mean.
    pub fn column(&self, i: usize) -> InekfResult<DVector<f64>> {
        Ok(self.mean.column(i)?)
    }

    /// Number of columns beyond the core pose.
    pub fn landmarks(&self) -> usize {
        self.mean.columns().saturating_sub(self.mean.layout().core_columns)
    }

    pub fn augment(&self) -> &DVector<f64> {
        self.mean.augment()
    }

    pub fn rotation(&self) -> DMatrix<f64> {
        self.mean.rotation()
    }

    /// Logarithm of the core pose.
    pub fn core_log(&self) -> DVector<f64> {
        self.mean.core_log()
    }

    /// Covariance block of the translation column `i`.
    pub fn column_covariance(&self, i: usize) -> InekfResult<DMatrix<f64>> {
        if i >= self.mean.columns() {
            return Err(InekfError::Dimension(format!("column {i} out of range")));
        }
        let at = R::DOF + R::DIM * i;
        Ok(self.covariance.view((at, at), (R::DIM, R::DIM)).into_owned())
    }

    /// Commit a mean and covariance computed from this state.
    pub(crate) fn replace(&mut self, mean: MatrixGroup<R>, covariance: DMatrix<f64>) {
        self.mean = mean;
        self.covariance = covariance;
        self.symmetrize();
    }

    fn symmetrize(&mut self) {
        self.covariance = (&self.covariance + self.covariance.transpose()) * 0.5;
    }
}

fn check_covariance(covariance: &DMatrix<f64>, dim: usize) -> InekfResult<()> {
    if covariance.shape() != (dim, dim) {
        return Err(InekfError::Dimension(format!(
            "covariance must be {dim}x{dim}, got {}x{}",
            covariance.nrows(),
            covariance.ncols()
        )));
    }
    if covariance.iter().any(|v| !v.is_finite()) {
        return Err(InekfError::Numerical(
            "covariance contains non-finite entries".to_string(),
        ));
    }
    Ok(())
}
