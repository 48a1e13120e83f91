//! Invariant extended Kalman filter.
//!
//! The filter couples one [`ProcessModel`] with any number of named
//! [`MeasureModel`]s and runs the usual predict/update cycle on an
//! [`AugmentedState`]. The mean is corrected on the group,
//!
//! ```text
//! right:  X̂⁺ = exp(K V) X̂
//! left:   X̂⁺ = X̂ exp(K V)
//! ```
//!
//! and the covariance with the Joseph form
//! `P⁺ = (I - K H) P (I - K H)ᵀ + K M Kᵀ`.
//!
//! Every step is computed on copies and committed only when the result is
//! finite and positive on the diagonal, so a failed step leaves the state untouched.

use crate::config::{ErrorFrame, FilterConfig};
use crate::error::{InekfError, InekfResult};
use crate::manifold::MatrixGroup;
use crate::measure::{Linearization, MeasureModel, invert_spd, linearize};
use crate::process::{ProcessModel, lift_noise};
use crate::state::AugmentedState;
use nalgebra::{DMatrix, DVector};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Boxed measurement model registered with a filter.
pub type BoxedMeasure<R> = Box<dyn MeasureModel<R> + Send>;

/// Invariant EKF over the state group of `P`.
pub struct InEKF<P: ProcessModel> {
    process: P,
    state: AugmentedState<P::Rot>,
    config: FilterConfig,
    measures: HashMap<String, BoxedMeasure<P::Rot>>,
}

impl<P: ProcessModel> InEKF<P> {
    pub fn new(process: P, state: AugmentedState<P::Rot>, frame: ErrorFrame) -> Self {
        Self::with_config(process, state, FilterConfig::new().with_error_frame(frame))
    }

    pub fn with_config(process: P, state: AugmentedState<P::Rot>, config: FilterConfig) -> Self {
        Self {
            process,
            state,
            config,
            measures: HashMap::new(),
        }
    }

    /// Register a measurement model under `name`, replacing any previous one.
    pub fn add_measure_model<M>(&mut self, name: impl Into<String>, model: M)
    where
        M: MeasureModel<P::Rot> + Send + 'static,
    {
        let name = name.into();
        debug!("registered measurement model '{}'", name);
        self.measures.insert(name, Box::new(model));
    }

    /// Register several boxed measurement models at once.
    pub fn add_measure_models<I>(&mut self, models: I)
    where
        I: IntoIterator<Item = (String, BoxedMeasure<P::Rot>)>,
    {
        for (name, model) in models {
            debug!("registered measurement model '{}'", name);
            self.measures.insert(name, model);
        }
    }

    pub fn measure_model(&self, name: &str) -> Option<&(dyn MeasureModel<P::Rot> + Send)> {
        self.measures.get(name).map(|m| m.as_ref())
    }

    /// Propagate the state with control `u` over `dt`.
    ///
    /// # Notes
    /// X⁺ = f(u, dt, X),  P⁺ = Φ P Φᵀ + Q̄
    ///
    /// where `Q̄` is the process noise lifted to the state and scaled by `dt`;
    /// a right-invariant filter transports it with `Ad(X⁺)`.
    pub fn predict(&mut self, u: &P::Control, dt: f64) -> InekfResult<&AugmentedState<P::Rot>> {
        let Some(q) = self.process.q() else {
            return Err(InekfError::Configuration(
                "process noise Q has not been set".to_string(),
            ));
        };
        let frame = self.config.error_frame;
        let dim = self.state.dim();

        let mean = self.process.f(u, dt, self.state.mean())?;
        if mean.dof() != dim {
            return Err(InekfError::Dimension(format!(
                "process model changed the state dimension from {dim} to {}",
                mean.dof()
            )));
        }
        let phi = self.process.make_phi(u, dt, &self.state, frame)?;
        if phi.shape() != (dim, dim) {
            return Err(InekfError::Dimension(format!(
                "Phi must be {dim}x{dim}, got {}x{}",
                phi.nrows(),
                phi.ncols()
            )));
        }

        let mut q_bar = lift_noise(q, &self.state, dt)?;
        if frame == ErrorFrame::Right {
            let adj = mean.adjoint();
            q_bar = &adj * q_bar * adj.transpose();
        }
        let covariance = &phi * self.state.covariance() * phi.transpose() + q_bar;
        self.validate(&covariance)?;

        self.state.replace(mean, covariance);
        debug!("predict dt={:.4}: {}", dt, self.state);
        Ok(&self.state)
    }

    /// Correct the state with measurement `z` from the model registered as `name`.
    pub fn update(&mut self, z: &DVector<f64>, name: &str) -> InekfResult<&AugmentedState<P::Rot>> {
        let model = self.model(name)?;
        let lin = linearize(model.as_ref(), z, &self.state, self.config.error_frame)?;
        self.correct(lin, name)
    }

    /// Like [`InEKF::update`], but with an explicit Jacobian already expressed in
    /// the filter's error frame.
    pub fn update_with_jacobian(
        &mut self,
        z: &DVector<f64>,
        name: &str,
        jacobian: &DMatrix<f64>,
    ) -> InekfResult<&AugmentedState<P::Rot>> {
        let model = self.model(name)?;
        let mut lin = linearize(model.as_ref(), z, &self.state, self.config.error_frame)?;
        if jacobian.shape() != lin.jacobian.shape() {
            return Err(InekfError::Dimension(format!(
                "Jacobian must be {}x{}, got {}x{}",
                lin.jacobian.nrows(),
                lin.jacobian.ncols(),
                jacobian.nrows(),
                jacobian.ncols()
            )));
        }
        lin.jacobian = jacobian.clone();
        self.correct(lin, name)
    }

    /// Point the model `name` at landmark column `index`, then update with `z`.
    pub fn update_landmark(
        &mut self,
        name: &str,
        index: usize,
        z: &DVector<f64>,
    ) -> InekfResult<&AugmentedState<P::Rot>> {
        let Some(model) = self.measures.get_mut(name) else {
            return Err(InekfError::UnknownModel(name.to_string()));
        };
        model.saw_landmark(index, &self.state)?;
        self.update(z, name)
    }

    /// Squared Mahalanobis distance of `z` under the model `name`.
    pub fn mahalanobis(&self, z: &DVector<f64>, name: &str) -> InekfResult<f64> {
        self.model(name)?
            .calc_mahalanobis(z, &self.state, self.config.error_frame)
    }

    pub fn state(&self) -> &AugmentedState<P::Rot> {
        &self.state
    }

    /// Mutable access for structural changes such as adding landmark columns.
    pub fn state_mut(&mut self) -> &mut AugmentedState<P::Rot> {
        &mut self.state
    }

    pub fn set_state(&mut self, state: AugmentedState<P::Rot>) {
        self.state = state;
    }

    pub fn process(&self) -> &P {
        &self.process
    }

    pub fn process_mut(&mut self) -> &mut P {
        &mut self.process
    }

    pub fn error_frame(&self) -> ErrorFrame {
        self.config.error_frame
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    fn model(&self, name: &str) -> InekfResult<&BoxedMeasure<P::Rot>> {
        self.measures
            .get(name)
            .ok_or_else(|| InekfError::UnknownModel(name.to_string()))
    }

    fn correct(&mut self, lin: Linearization, name: &str) -> InekfResult<&AugmentedState<P::Rot>> {
        let dim = self.state.dim();
        let p = self.state.covariance();
        let s = lin.innovation_covariance(p);
        let s_inv = invert_spd(&s).inspect_err(|e| warn!("update '{}' rejected: {}", name, e))?;
        let k = p * lin.jacobian.transpose() * s_inv;
        let delta = &k * &lin.innovation;

        let mean = self.state.mean();
        let step = MatrixGroup::exp_with(&delta, mean.layout(), mean.shape())?;
        let mean = match self.config.error_frame {
            ErrorFrame::Right => step.compose(mean)?,
            ErrorFrame::Left => mean.compose(&step)?,
        };

        let i_kh = DMatrix::identity(dim, dim) - &k * &lin.jacobian;
        let covariance = &i_kh * p * i_kh.transpose() + &k * &lin.noise * k.transpose();
        self.validate(&covariance)
            .inspect_err(|e| warn!("update '{}' rejected: {}", name, e))?;

        self.state.replace(mean, covariance);
        debug!(
            "update '{}' |V|={:.4e}: {}",
            name,
            lin.innovation.norm(),
            self.state
        );
        Ok(&self.state)
    }

    fn validate(&self, covariance: &DMatrix<f64>) -> InekfResult<()> {
        if covariance.iter().any(|v| !v.is_finite()) {
            return Err(InekfError::Numerical(
                "covariance has non-finite entries".to_string(),
            ));
        }
        let tolerance = self.config.positive_tolerance;
        if let Some(i) = (0..covariance.nrows()).find(|&i| covariance[(i, i)] < -tolerance) {
            return Err(InekfError::Numerical(format!(
                "covariance diagonal {i} is negative: {:.3e}",
                covariance[(i, i)]
            )));
        }
        Ok(())
    }
}
