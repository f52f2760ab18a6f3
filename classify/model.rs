use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A sample-by-feature matrix that remembers the name of every column.
///
/// Every classifier records the column names it was fitted with and refuses to
/// score a matrix whose names differ in content or order.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    names: Vec<String>,
    values: Array2<f64>,
}

impl FeatureMatrix {
    pub fn new(names: Vec<String>, values: Array2<f64>) -> Result<Self, ModelError> {
        if names.len() != values.ncols() {
            return Err(ModelError::ShapeMismatch {
                columns: values.ncols(),
                names: names.len(),
            });
        }
        Ok(Self { names, values })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    /// Copies the given rows, in the given order, into a new matrix.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        Self {
            names: self.names.clone(),
            values: self.values.select(Axis(0), rows),
        }
    }
}

/// Which kind of number a classifier hands back for ranking samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreKind {
    /// Calibrated class-1 probability in `[0, 1]`.
    Probability,
    /// Signed, uncalibrated decision value; positive favours class 1.
    Decision,
}

impl ScoreKind {
    pub fn label(self) -> &'static str {
        match self {
            ScoreKind::Probability => "probability",
            ScoreKind::Decision => "decision",
        }
    }

    /// Scores strictly above this value are called class 1.
    pub fn threshold(self) -> f64 {
        match self {
            ScoreKind::Probability => 0.5,
            ScoreKind::Decision => 0.0,
        }
    }
}

/// Scores used for ROC analysis, tagged with their kind.
#[derive(Debug, Clone)]
pub struct RankingScores {
    pub kind: ScoreKind,
    pub values: Array1<f64>,
}

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model '{0}' was asked to predict before it was fitted.")]
    NotFitted(String),
    #[error(
        "Feature mismatch: the model was fitted on [{expected}] but the input provides [{found}]."
    )]
    FeatureMismatch { expected: String, found: String },
    #[error("Training labels contain a single class; both 0 and 1 are required to fit '{0}'.")]
    SingleClass(String),
    #[error("Labels must be 0 or 1, but {0} was found.")]
    InvalidLabel(f64),
    #[error("The feature matrix has {rows} rows but {labels} labels were supplied.")]
    LengthMismatch { rows: usize, labels: usize },
    #[error("The feature matrix has {columns} columns but {names} column names.")]
    ShapeMismatch { columns: usize, names: usize },
    #[error("Cannot fit '{0}' on a matrix with no rows or no columns.")]
    EmptyInput(String),
    #[error("Non-finite values appeared while fitting '{0}'.")]
    NonFinite(String),
    #[error(
        "Feature '{feature}' has zero variance within a class while fitting '{model}'; raise var_smoothing or drop the feature."
    )]
    ZeroVariance { model: String, feature: String },
    #[error("Invalid hyper-parameter for '{model}': {reason}")]
    InvalidParameter { model: String, reason: String },
    #[error("Linear algebra failure: {0}")]
    Linalg(#[from] ndarray_linalg::error::LinalgError),
}

/// The capability set shared by every model in the roster.
pub trait Classifier {
    /// Display name used in reports and plot legends.
    fn name(&self) -> &str;

    /// Whether [`Classifier::raw_scores`] yields probabilities or decision values.
    fn score_kind(&self) -> ScoreKind;

    fn fit(&mut self, x: &FeatureMatrix, y: ArrayView1<f64>) -> Result<(), ModelError>;

    /// Class-1 probabilities for probabilistic models, decision values otherwise.
    fn raw_scores(&self, x: &FeatureMatrix) -> Result<Array1<f64>, ModelError>;

    /// Hard 0/1 labels.
    fn predict(&self, x: &FeatureMatrix) -> Result<Array1<u8>, ModelError> {
        let cut = self.score_kind().threshold();
        Ok(self.raw_scores(x)?.mapv(|s| u8::from(s > cut)))
    }
}

/// Scores for ROC/AUC: a probability when the model has one, its decision value otherwise.
///
/// Cross-validation and validation scoring both go through here.
pub fn ranking_scores(
    model: &dyn Classifier,
    x: &FeatureMatrix,
) -> Result<RankingScores, ModelError> {
    Ok(RankingScores {
        kind: model.score_kind(),
        values: model.raw_scores(x)?,
    })
}

/// A fitted linear score `x . coef + intercept` bound to the features it was fitted on.
#[derive(Debug, Clone)]
pub(crate) struct LinearScore {
    pub features: Vec<String>,
    pub coef: Array1<f64>,
    pub intercept: f64,
}

impl LinearScore {
    pub fn decision(&self, x: &FeatureMatrix) -> Result<Array1<f64>, ModelError> {
        ensure_features(&self.features, x)?;
        Ok(x.values().dot(&self.coef) + self.intercept)
    }
}

/// Checks shapes and labels before a fit, returning the per-class row counts.
pub(crate) fn validate_training(
    model: &str,
    x: &FeatureMatrix,
    y: ArrayView1<f64>,
) -> Result<(usize, usize), ModelError> {
    if x.nrows() != y.len() {
        return Err(ModelError::LengthMismatch {
            rows: x.nrows(),
            labels: y.len(),
        });
    }
    if x.nrows() == 0 || x.ncols() == 0 {
        return Err(ModelError::EmptyInput(model.to_string()));
    }
    let mut counts = (0usize, 0usize);
    for &label in y {
        if label == 0.0 {
            counts.0 += 1;
        } else if label == 1.0 {
            counts.1 += 1;
        } else {
            return Err(ModelError::InvalidLabel(label));
        }
    }
    if counts.0 == 0 || counts.1 == 0 {
        return Err(ModelError::SingleClass(model.to_string()));
    }
    if x.values().iter().any(|v| !v.is_finite()) {
        return Err(ModelError::NonFinite(model.to_string()));
    }
    Ok(counts)
}

pub(crate) fn ensure_features(expected: &[String], x: &FeatureMatrix) -> Result<(), ModelError> {
    if expected == x.names() {
        return Ok(());
    }
    Err(ModelError::FeatureMismatch {
        expected: expected.join(", "),
        found: x.names().join(", "),
    })
}

/// Logistic function that does not overflow for large |z|.
pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// `log(1 + exp(z))` without overflow.
pub(crate) fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

/// Summed binomial negative log-likelihood for labels `y` and linear predictor `eta`.
pub(crate) fn log_loss_sum(y: ArrayView1<f64>, eta: ArrayView1<f64>) -> f64 {
    y.iter()
        .zip(eta.iter())
        .map(|(&yi, &ei)| softplus(ei) - yi * ei)
        .sum()
}
