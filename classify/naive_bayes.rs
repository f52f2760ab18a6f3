//! Gaussian naive Bayes with per-class, per-feature variances.

use super::model::{
    Classifier, FeatureMatrix, ModelError, ScoreKind, ensure_features, sigmoid, validate_training,
};
use ndarray::{Array1, ArrayView1, Axis};
use std::f64::consts::PI;

pub const DEFAULT_VAR_SMOOTHING: f64 = 1e-9;

#[derive(Debug, Clone)]
pub struct GaussianNaiveBayes {
    name: String,
    /// Fraction of the largest feature variance added to every class variance.
    var_smoothing: f64,
    fitted: Option<NbState>,
}

#[derive(Debug, Clone)]
struct NbState {
    features: Vec<String>,
    /// Indexed by class (0 = control, 1 = case).
    means: [Array1<f64>; 2],
    variances: [Array1<f64>; 2],
    log_priors: [f64; 2],
}

impl GaussianNaiveBayes {
    pub fn new(name: impl Into<String>, var_smoothing: f64) -> Self {
        Self {
            name: name.into(),
            var_smoothing,
            fitted: None,
        }
    }

    fn joint_log_likelihood(state: &NbState, class: usize, row: ArrayView1<f64>) -> f64 {
        let mut total = state.log_priors[class];
        for ((&x, &mu), &var) in row
            .iter()
            .zip(state.means[class].iter())
            .zip(state.variances[class].iter())
        {
            total -= 0.5 * (2.0 * PI * var).ln();
            total -= 0.5 * (x - mu).powi(2) / var;
        }
        total
    }
}

impl Classifier for GaussianNaiveBayes {
    fn name(&self) -> &str {
        &self.name
    }

    fn score_kind(&self) -> ScoreKind {
        ScoreKind::Probability
    }

    fn fit(&mut self, x: &FeatureMatrix, y: ArrayView1<f64>) -> Result<(), ModelError> {
        if !(self.var_smoothing >= 0.0) {
            return Err(ModelError::InvalidParameter {
                model: self.name.clone(),
                reason: format!("var_smoothing must be non-negative, got {}", self.var_smoothing),
            });
        }
        let counts = validate_training(&self.name, x, y)?;
        let values = x.values();
        let n = values.nrows() as f64;

        // Smoothing is relative to the widest feature over all samples.
        let epsilon = self.var_smoothing
            * values
                .var_axis(Axis(0), 0.0)
                .iter()
                .fold(0.0_f64, |acc, &v| acc.max(v));

        let class_stats = |class: f64| {
            let rows: Vec<usize> = y
                .iter()
                .enumerate()
                .filter(|&(_, &label)| label == class)
                .map(|(i, _)| i)
                .collect();
            let subset = values.select(Axis(0), &rows);
            let mean = subset.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(values.ncols()));
            let var = subset.var_axis(Axis(0), 0.0) + epsilon;
            (mean, var)
        };
        let (mean0, var0) = class_stats(0.0);
        let (mean1, var1) = class_stats(1.0);

        // A zero class variance turns every likelihood into an infinity.
        let degenerate = var0
            .iter()
            .zip(var1.iter())
            .position(|(&v0, &v1)| !(v0 > 0.0 && v1 > 0.0));
        if let Some(j) = degenerate {
            return Err(ModelError::ZeroVariance {
                model: self.name.clone(),
                feature: x.names()[j].clone(),
            });
        }

        self.fitted = Some(NbState {
            features: x.names().to_vec(),
            means: [mean0, mean1],
            variances: [var0, var1],
            log_priors: [
                (counts.0 as f64 / n).ln(),
                (counts.1 as f64 / n).ln(),
            ],
        });
        Ok(())
    }

    fn raw_scores(&self, x: &FeatureMatrix) -> Result<Array1<f64>, ModelError> {
        let state = self
            .fitted
            .as_ref()
            .ok_or_else(|| ModelError::NotFitted(self.name.clone()))?;
        ensure_features(&state.features, x)?;
        Ok(x.values()
            .outer_iter()
            .map(|row| {
                let jll0 = Self::joint_log_likelihood(state, 0, row);
                let jll1 = Self::joint_log_likelihood(state, 1, row);
                sigmoid(jll1 - jll0)
            })
            .collect())
    }
}
