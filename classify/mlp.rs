//! # Multi-Layer Perceptron
//!
//! One hidden ReLU layer feeding a single logistic output unit, trained on
//! mean log-loss plus an L2 weight penalty with Adam over shuffled
//! mini-batches. Every random draw (initial weights, batch order) comes from a
//! `StdRng` seeded with the configured seed, so two fits on the same data are
//! identical.

use super::model::{
    Classifier, FeatureMatrix, ModelError, ScoreKind, ensure_features, sigmoid, softplus,
    validate_training,
};
use ndarray::{Array, Array1, Array2, ArrayView1, ArrayView2, Axis, Dimension, Ix1, Ix2, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const BETA1: f64 = 0.9;
const BETA2: f64 = 0.999;
const ADAM_EPSILON: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq)]
pub struct MlpConfig {
    pub hidden_units: usize,
    /// L2 penalty strength.
    pub alpha: f64,
    pub learning_rate: f64,
    /// Maximum number of epochs.
    pub max_iter: usize,
    pub batch_size: usize,
    pub tolerance: f64,
    /// Epochs without a `tolerance` improvement before stopping.
    pub patience: usize,
    pub seed: u64,
}

impl Default for MlpConfig {
    fn default() -> Self {
        Self {
            hidden_units: 100,
            alpha: 1e-4,
            learning_rate: 1e-3,
            max_iter: 1000,
            batch_size: 200,
            tolerance: 1e-4,
            patience: 10,
            seed: 2024,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MlpClassifier {
    name: String,
    config: MlpConfig,
    fitted: Option<Network>,
}

#[derive(Debug, Clone)]
struct Network {
    features: Vec<String>,
    /// Shape: [n_features, hidden_units].
    hidden_weights: Array2<f64>,
    hidden_bias: Array1<f64>,
    output_weights: Array1<f64>,
    output_bias: f64,
}

struct Gradients {
    hidden_weights: Array2<f64>,
    hidden_bias: Array1<f64>,
    output_weights: Array1<f64>,
    output_bias: f64,
}

impl Network {
    /// Glorot-uniform initialisation; the bound uses a gain of 6 for the ReLU
    /// layer and 2 for the logistic output.
    fn initialise(features: Vec<String>, hidden: usize, rng: &mut StdRng) -> Self {
        let inputs = features.len();
        let hidden_bound = (6.0 / (inputs + hidden) as f64).sqrt();
        let output_bound = (2.0 / (hidden + 1) as f64).sqrt();
        let mut uniform = |bound: f64| rng.gen_range(-bound..bound);
        let hidden_weights =
            Array2::from_shape_simple_fn((inputs, hidden), || uniform(hidden_bound));
        let hidden_bias = Array1::from_shape_simple_fn(hidden, || uniform(hidden_bound));
        let output_weights = Array1::from_shape_simple_fn(hidden, || uniform(output_bound));
        let output_bias = uniform(output_bound);
        Self {
            features,
            hidden_weights,
            hidden_bias,
            output_weights,
            output_bias,
        }
    }

    fn hidden_activations(&self, x: ArrayView2<f64>) -> Array2<f64> {
        let mut activations = x.dot(&self.hidden_weights);
        activations += &self.hidden_bias.view().insert_axis(Axis(0));
        activations.mapv_inplace(|v| v.max(0.0));
        activations
    }

    fn output_logits(&self, hidden: &Array2<f64>) -> Array1<f64> {
        hidden.dot(&self.output_weights) + self.output_bias
    }

    fn squared_weight_norm(&self) -> f64 {
        self.hidden_weights.iter().map(|w| w * w).sum::<f64>()
            + self.output_weights.dot(&self.output_weights)
    }

    /// Loss and gradients for one mini-batch.
    fn backward(&self, x: ArrayView2<f64>, y: ArrayView1<f64>, alpha: f64) -> (f64, Gradients) {
        let batch = x.nrows() as f64;
        let hidden = self.hidden_activations(x);
        let logits = self.output_logits(&hidden);

        let data_loss = logits
            .iter()
            .zip(y.iter())
            .map(|(&z, &t)| softplus(z) - t * z)
            .sum::<f64>()
            / batch;
        let loss = data_loss + 0.5 * alpha * self.squared_weight_norm() / batch;

        let output_delta = (logits.mapv(sigmoid) - y) / batch;
        let output_weights = hidden.t().dot(&output_delta) + &self.output_weights * (alpha / batch);
        let output_bias = output_delta.sum();

        let mut hidden_delta = output_delta
            .view()
            .insert_axis(Axis(1))
            .dot(&self.output_weights.view().insert_axis(Axis(0)));
        Zip::from(&mut hidden_delta)
            .and(&hidden)
            .for_each(|d, &h| {
                if h <= 0.0 {
                    *d = 0.0;
                }
            });
        let hidden_weights = x.t().dot(&hidden_delta) + &self.hidden_weights * (alpha / batch);
        let hidden_bias = hidden_delta.sum_axis(Axis(0));

        (
            loss,
            Gradients {
                hidden_weights,
                hidden_bias,
                output_weights,
                output_bias,
            },
        )
    }
}

/// First and second moment estimates for one parameter block.
struct Moments<D: Dimension> {
    first: Array<f64, D>,
    second: Array<f64, D>,
}

impl<D: Dimension> Moments<D> {
    fn zeros_like(param: &Array<f64, D>) -> Self {
        Self {
            first: Array::zeros(param.raw_dim()),
            second: Array::zeros(param.raw_dim()),
        }
    }

    fn step(&mut self, param: &mut Array<f64, D>, grad: &Array<f64, D>, rate: f64) {
        Zip::from(param)
            .and(&mut self.first)
            .and(&mut self.second)
            .and(grad)
            .for_each(|p, m, v, &g| {
                *m = BETA1 * *m + (1.0 - BETA1) * g;
                *v = BETA2 * *v + (1.0 - BETA2) * g * g;
                *p -= rate * *m / (v.sqrt() + ADAM_EPSILON);
            });
    }
}

struct Adam {
    hidden_weights: Moments<Ix2>,
    hidden_bias: Moments<Ix1>,
    output_weights: Moments<Ix1>,
    output_bias: (f64, f64),
    learning_rate: f64,
    steps: i32,
}

impl Adam {
    fn new(network: &Network, learning_rate: f64) -> Self {
        Self {
            hidden_weights: Moments::zeros_like(&network.hidden_weights),
            hidden_bias: Moments::zeros_like(&network.hidden_bias),
            output_weights: Moments::zeros_like(&network.output_weights),
            output_bias: (0.0, 0.0),
            learning_rate,
            steps: 0,
        }
    }

    fn apply(&mut self, network: &mut Network, grads: &Gradients) {
        self.steps += 1;
        let rate = self.learning_rate * (1.0 - BETA2.powi(self.steps)).sqrt()
            / (1.0 - BETA1.powi(self.steps));
        self.hidden_weights
            .step(&mut network.hidden_weights, &grads.hidden_weights, rate);
        self.hidden_bias
            .step(&mut network.hidden_bias, &grads.hidden_bias, rate);
        self.output_weights
            .step(&mut network.output_weights, &grads.output_weights, rate);

        let (m, v) = &mut self.output_bias;
        let g = grads.output_bias;
        *m = BETA1 * *m + (1.0 - BETA1) * g;
        *v = BETA2 * *v + (1.0 - BETA2) * g * g;
        network.output_bias -= rate * *m / (v.sqrt() + ADAM_EPSILON);
    }
}

impl MlpClassifier {
    pub fn new(name: impl Into<String>, config: MlpConfig) -> Self {
        Self {
            name: name.into(),
            config,
            fitted: None,
        }
    }

    fn check_config(&self) -> Result<(), ModelError> {
        let reason = if self.config.hidden_units == 0 {
            Some("hidden_units must be at least 1".to_string())
        } else if self.config.batch_size == 0 {
            Some("batch_size must be at least 1".to_string())
        } else if !(self.config.learning_rate > 0.0) {
            Some(format!("learning_rate must be positive, got {}", self.config.learning_rate))
        } else if !(self.config.alpha >= 0.0) {
            Some(format!("alpha must be non-negative, got {}", self.config.alpha))
        } else if self.config.max_iter == 0 {
            Some("max_iter must be at least 1".to_string())
        } else {
            None
        };
        match reason {
            Some(reason) => Err(ModelError::InvalidParameter {
                model: self.name.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

impl Classifier for MlpClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn score_kind(&self) -> ScoreKind {
        ScoreKind::Probability
    }

    fn fit(&mut self, x: &FeatureMatrix, y: ArrayView1<f64>) -> Result<(), ModelError> {
        self.check_config()?;
        validate_training(&self.name, x, y)?;
        let values = x.values();
        let n = values.nrows();
        let batch_size = self.config.batch_size.min(n);

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut network =
            Network::initialise(x.names().to_vec(), self.config.hidden_units, &mut rng);
        let mut optimiser = Adam::new(&network, self.config.learning_rate);
        let mut order: Vec<usize> = (0..n).collect();

        let mut best_loss = f64::INFINITY;
        let mut stale_epochs = 0usize;
        let mut epochs_run = 0usize;

        for epoch in 1..=self.config.max_iter {
            epochs_run = epoch;
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;
            for chunk in order.chunks(batch_size) {
                let xb = values.select(Axis(0), chunk);
                let yb = y.select(Axis(0), chunk);
                let (loss, grads) = network.backward(xb.view(), yb.view(), self.config.alpha);
                if !loss.is_finite() {
                    return Err(ModelError::NonFinite(self.name.clone()));
                }
                epoch_loss += loss * chunk.len() as f64;
                optimiser.apply(&mut network, &grads);
            }
            epoch_loss /= n as f64;

            if epoch_loss > best_loss - self.config.tolerance {
                stale_epochs += 1;
            } else {
                stale_epochs = 0;
            }
            best_loss = best_loss.min(epoch_loss);

            if stale_epochs > self.config.patience {
                log::debug!(
                    "{}: loss stalled at {epoch_loss:.6} after {epoch} epochs",
                    self.name
                );
                break;
            }
        }
        if epochs_run == self.config.max_iter && stale_epochs <= self.config.patience {
            log::warn!(
                "{}: reached max_iter={} epochs without the loss settling",
                self.name,
                self.config.max_iter
            );
        }

        self.fitted = Some(network);
        Ok(())
    }

    fn raw_scores(&self, x: &FeatureMatrix) -> Result<Array1<f64>, ModelError> {
        let network = self
            .fitted
            .as_ref()
            .ok_or_else(|| ModelError::NotFitted(self.name.clone()))?;
        ensure_features(&network.features, x)?;
        let hidden = network.hidden_activations(x.values());
        Ok(network.output_logits(&hidden).mapv(sigmoid))
    }
}
