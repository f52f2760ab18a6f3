use super::discriminant::LinearDiscriminant;
use super::logistic::{LogisticConfig, LogisticRegression, Penalty};
use super::mlp::{MlpClassifier, MlpConfig};
use super::model::{Classifier, ModelError};
use super::naive_bayes::{DEFAULT_VAR_SMOOTHING, GaussianNaiveBayes};
use super::ridge::{DEFAULT_ALPHAS, RidgeClassifierCv};
use serde::{Deserialize, Serialize};

/// The model families the roster can build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    GaussianNb,
    Logistic,
    RidgeCv,
    Lda,
    Mlp,
}

/// One entry of the model roster, as written in the study file.
///
/// Hyper-parameters are optional and flat; each kind reads the ones that apply
/// to it and falls back to its defaults for the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub name: String,
    pub kind: ModelKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub var_smoothing: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub penalty: Option<Penalty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l1_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iter: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alphas: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden_units: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alpha: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f64>,
}

impl ModelSpec {
    pub fn new(name: impl Into<String>, kind: ModelKind) -> Self {
        Self {
            name: name.into(),
            kind,
            var_smoothing: None,
            penalty: None,
            c: None,
            l1_ratio: None,
            max_iter: None,
            alphas: None,
            hidden_units: None,
            alpha: None,
            learning_rate: None,
        }
    }

    /// Names of the hyper-parameters set on this entry that its kind ignores.
    pub fn unused_parameters(&self) -> Vec<&'static str> {
        let set = [
            ("var_smoothing", self.var_smoothing.is_some()),
            ("penalty", self.penalty.is_some()),
            ("c", self.c.is_some()),
            ("l1_ratio", self.l1_ratio.is_some()),
            ("max_iter", self.max_iter.is_some()),
            ("alphas", self.alphas.is_some()),
            ("hidden_units", self.hidden_units.is_some()),
            ("alpha", self.alpha.is_some()),
            ("learning_rate", self.learning_rate.is_some()),
        ];
        let accepted: &[&str] = match self.kind {
            ModelKind::GaussianNb => &["var_smoothing"],
            ModelKind::Logistic => &["penalty", "c", "l1_ratio", "max_iter"],
            ModelKind::RidgeCv => &["alphas"],
            ModelKind::Lda => &[],
            ModelKind::Mlp => &["hidden_units", "alpha", "learning_rate", "max_iter"],
        };
        set.iter()
            .filter(|(name, present)| *present && !accepted.contains(name))
            .map(|(name, _)| *name)
            .collect()
    }

    /// Builds a fresh, unfitted model. `seed` drives any randomness inside the model.
    pub fn build(&self, seed: u64) -> Result<Box<dyn Classifier>, ModelError> {
        if self.name.trim().is_empty() {
            return Err(ModelError::InvalidParameter {
                model: format!("{:?}", self.kind),
                reason: "model name must not be empty".to_string(),
            });
        }
        let model: Box<dyn Classifier> = match self.kind {
            ModelKind::GaussianNb => Box::new(GaussianNaiveBayes::new(
                self.name.clone(),
                self.var_smoothing.unwrap_or(DEFAULT_VAR_SMOOTHING),
            )),
            ModelKind::Logistic => {
                let defaults = LogisticConfig::default();
                Box::new(LogisticRegression::new(
                    self.name.clone(),
                    LogisticConfig {
                        penalty: self.penalty.unwrap_or(defaults.penalty),
                        c: self.c.unwrap_or(defaults.c),
                        l1_ratio: self.l1_ratio.unwrap_or(defaults.l1_ratio),
                        max_iter: self.max_iter.unwrap_or(defaults.max_iter),
                        tolerance: defaults.tolerance,
                    },
                ))
            }
            ModelKind::RidgeCv => Box::new(RidgeClassifierCv::new(
                self.name.clone(),
                self.alphas.clone().unwrap_or_else(|| DEFAULT_ALPHAS.to_vec()),
            )),
            ModelKind::Lda => Box::new(LinearDiscriminant::new(self.name.clone())),
            ModelKind::Mlp => {
                let defaults = MlpConfig::default();
                Box::new(MlpClassifier::new(
                    self.name.clone(),
                    MlpConfig {
                        hidden_units: self.hidden_units.unwrap_or(defaults.hidden_units),
                        alpha: self.alpha.unwrap_or(defaults.alpha),
                        learning_rate: self.learning_rate.unwrap_or(defaults.learning_rate),
                        max_iter: self.max_iter.unwrap_or(defaults.max_iter),
                        seed,
                        ..defaults
                    },
                ))
            }
        };
        Ok(model)
    }
}

/// The seven-model comparison run when the study file names no models.
pub fn default_roster() -> Vec<ModelSpec> {
    let logistic = |name: &str, penalty: Penalty| ModelSpec {
        penalty: Some(penalty),
        ..ModelSpec::new(name, ModelKind::Logistic)
    };
    vec![
        ModelSpec::new("Naive Bayes", ModelKind::GaussianNb),
        logistic("Logistic Regression", Penalty::L2),
        logistic("Lasso", Penalty::L1),
        ModelSpec::new("RidgeCV", ModelKind::RidgeCv),
        ModelSpec {
            l1_ratio: Some(0.5),
            ..logistic("ElasticNet", Penalty::ElasticNet)
        },
        ModelSpec::new("LDA", ModelKind::Lda),
        ModelSpec::new("MLP", ModelKind::Mlp),
    ]
}
