//! Ridge regression on {-1, +1} targets with the penalty picked by exact
//! leave-one-out error. Exposes only a decision function.

use super::model::{
    Classifier, FeatureMatrix, LinearScore, ModelError, ScoreKind, validate_training,
};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use ndarray_linalg::{Eigh, UPLO};

pub const DEFAULT_ALPHAS: [f64; 3] = [0.1, 1.0, 10.0];

/// Leverage is clamped below this distance from 1 to keep the LOO residual finite.
const LEVERAGE_GUARD: f64 = 1e-12;

#[derive(Debug, Clone)]
pub struct RidgeClassifierCv {
    name: String,
    alphas: Vec<f64>,
    fitted: Option<(LinearScore, f64)>,
}

impl RidgeClassifierCv {
    pub fn new(name: impl Into<String>, alphas: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            alphas,
            fitted: None,
        }
    }

    /// The penalty chosen by the last fit.
    pub fn selected_alpha(&self) -> Option<f64> {
        self.fitted.as_ref().map(|(_, alpha)| *alpha)
    }
}

impl Classifier for RidgeClassifierCv {
    fn name(&self) -> &str {
        &self.name
    }

    fn score_kind(&self) -> ScoreKind {
        ScoreKind::Decision
    }

    fn fit(&mut self, x: &FeatureMatrix, y: ArrayView1<f64>) -> Result<(), ModelError> {
        if self.alphas.is_empty() || self.alphas.iter().any(|a| !(*a > 0.0)) {
            return Err(ModelError::InvalidParameter {
                model: self.name.clone(),
                reason: format!(
                    "alphas must be a non-empty list of positive values, got {:?}",
                    self.alphas
                ),
            });
        }
        validate_training(&self.name, x, y)?;

        let path = alpha_path(x.values(), y, &self.alphas)?;
        let mut best: Option<AlphaFit> = None;
        for candidate in path {
            log::debug!(
                "{}: alpha={} leave-one-out SSE={:.6e}",
                self.name,
                candidate.alpha,
                candidate.loo_error
            );
            if best.as_ref().is_none_or(|b| candidate.loo_error < b.loo_error) {
                best = Some(candidate);
            }
        }
        let AlphaFit {
            alpha,
            coef,
            intercept,
            ..
        } = best.ok_or_else(|| ModelError::EmptyInput(self.name.clone()))?;
        if coef.iter().any(|c| !c.is_finite()) || !intercept.is_finite() {
            return Err(ModelError::NonFinite(self.name.clone()));
        }
        log::debug!("{}: selected alpha={alpha}", self.name);

        self.fitted = Some((
            LinearScore {
                features: x.names().to_vec(),
                coef,
                intercept,
            },
            alpha,
        ));
        Ok(())
    }

    fn raw_scores(&self, x: &FeatureMatrix) -> Result<Array1<f64>, ModelError> {
        let (linear, _) = self
            .fitted
            .as_ref()
            .ok_or_else(|| ModelError::NotFitted(self.name.clone()))?;
        linear.decision(x)
    }
}

struct AlphaFit {
    alpha: f64,
    loo_error: f64,
    coef: Array1<f64>,
    intercept: f64,
}

/// Fits every alpha and scores it by leave-one-out squared error on the
/// {-1, +1} targets, using the hat-matrix shortcut `e_i / (1 - h_ii)`.
fn alpha_path(
    values: ArrayView2<f64>,
    y: ArrayView1<f64>,
    alphas: &[f64],
) -> Result<Vec<AlphaFit>, ModelError> {
    let n = values.nrows();
    let x_mean = values
        .mean_axis(Axis(0))
        .ok_or_else(|| ModelError::EmptyInput("ridge".to_string()))?;
    let centered = &values - &x_mean.view().insert_axis(Axis(0));
    let targets = y.mapv(|label| 2.0 * label - 1.0);
    let t_mean = targets.sum() / n as f64;
    let t_centered = &targets - t_mean;

    // One eigendecomposition serves every alpha: (X'X + aI)^-1 = V diag(1/(l + a)) V'.
    let gram = centered.t().dot(&centered);
    let (eigenvalues, eigenvectors) = gram.eigh(UPLO::Lower)?;
    let eigenvalues = eigenvalues.mapv(|l| l.max(0.0));
    let projected = centered.dot(&eigenvectors);
    let projected_targets = projected.t().dot(&t_centered);

    let mut path = Vec::with_capacity(alphas.len());
    for &alpha in alphas {
        let shrink = eigenvalues.mapv(|l| 1.0 / (l + alpha));
        let coef = eigenvectors.dot(&(&shrink * &projected_targets));
        let residuals = &t_centered - &centered.dot(&coef);
        let mut loo_error = 0.0;
        for (i, row) in projected.outer_iter().enumerate() {
            let leverage = 1.0 / n as f64
                + row
                    .iter()
                    .zip(shrink.iter())
                    .map(|(z, s)| z * z * s)
                    .sum::<f64>();
            let denom = (1.0 - leverage).max(LEVERAGE_GUARD);
            loo_error += (residuals[i] / denom).powi(2);
        }
        let intercept = t_mean - x_mean.dot(&coef);
        path.push(AlphaFit {
            alpha,
            loo_error,
            coef,
            intercept,
        });
    }
    Ok(path)
}
