//! # The Evaluation Protocol
//!
//! For every model in the roster:
//!
//! 1. Shuffled k-fold cross-validation on the training cohort. Held-out scores
//!    and calls from every fold are concatenated and scored once.
//! 2. A fresh model is refit on the whole training cohort.
//! 3. The refit model scores each validation cohort as-is.
//!
//! Every fit starts from a freshly built model, so no state leaks between
//! folds or between the cross-validation and the refit.

use crate::classify::{
    Classifier, ModelError, ModelSpec, RankingScores, ScoreKind, ranking_scores,
};
use crate::cohort::Cohort;
use crate::crossval::{CrossValidationError, KFold};
use crate::metrics::{MetricSet, MetricsError, RocCurve, roc_curve};
use ndarray::Array1;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("Model '{model}': {source}")]
    Model {
        model: String,
        #[source]
        source: ModelError,
    },
    #[error(transparent)]
    CrossValidation(#[from] CrossValidationError),
    #[error("Model '{model}' on {dataset}: {source}")]
    Metrics {
        model: String,
        dataset: String,
        #[source]
        source: MetricsError,
    },
    #[error("Model '{model}' produced {first} scores in one fold and {second} scores in another.")]
    InconsistentScoreKind {
        model: String,
        first: &'static str,
        second: &'static str,
    },
    #[error("The study has no models to evaluate.")]
    EmptyRoster,
}

/// Per-sample scores and calls for one dataset, in a fixed row order.
#[derive(Debug, Clone)]
pub struct ScoredSamples {
    pub sample_ids: Vec<String>,
    pub labels: Array1<f64>,
    pub scores: RankingScores,
    pub predicted: Array1<u8>,
}

/// Held-out predictions gathered across all folds.
///
/// Rows appear fold by fold; `rows[i]` is the training-cohort row of the
/// `i`-th prediction and `fold_of[i]` the fold that held it out.
#[derive(Debug, Clone)]
pub struct CrossValidatedPredictions {
    pub rows: Vec<usize>,
    pub fold_of: Vec<usize>,
    pub scored: ScoredSamples,
}

/// Metrics, ROC curve and scores for one model on one dataset.
#[derive(Debug, Clone)]
pub struct DatasetEvaluation {
    pub title: String,
    pub tag: String,
    pub metrics: MetricSet,
    pub roc: RocCurve,
    pub scored: ScoredSamples,
}

#[derive(Debug, Clone)]
pub struct ModelReport {
    pub name: String,
    pub score_kind: ScoreKind,
    pub cross_validation: CrossValidatedPredictions,
    /// Training-cohort results, computed from the cross-validated predictions.
    pub train: DatasetEvaluation,
    /// One entry per validation cohort, in study order.
    pub validation: Vec<DatasetEvaluation>,
}

/// Title and tag of one dataset, as shown in tables and plots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetLabel {
    pub title: String,
    pub tag: String,
}

#[derive(Debug, Clone)]
pub struct StudyResults {
    pub train: DatasetLabel,
    pub validation: Vec<DatasetLabel>,
    /// Reports in roster order.
    pub reports: Vec<ModelReport>,
}

/// Everything the protocol needs, already loaded and imputed.
#[derive(Debug, Clone)]
pub struct Study {
    pub training: Cohort,
    pub validation: Vec<Cohort>,
    pub models: Vec<ModelSpec>,
    pub kfold: KFold,
    /// Seed handed to every model build.
    pub seed: u64,
}

fn model_error(spec: &ModelSpec) -> impl Fn(ModelError) -> EvaluationError + '_ {
    move |source| EvaluationError::Model {
        model: spec.name.clone(),
        source,
    }
}

fn fitted_model(
    spec: &ModelSpec,
    cohort: &Cohort,
    seed: u64,
) -> Result<Box<dyn Classifier>, EvaluationError> {
    let mut model = spec.build(seed).map_err(model_error(spec))?;
    model
        .fit(&cohort.matrix, cohort.labels.view())
        .map_err(model_error(spec))?;
    Ok(model)
}

fn score_cohort(
    spec: &ModelSpec,
    model: &dyn Classifier,
    cohort: &Cohort,
) -> Result<ScoredSamples, EvaluationError> {
    let scores = ranking_scores(model, &cohort.matrix).map_err(model_error(spec))?;
    let predicted = model.predict(&cohort.matrix).map_err(model_error(spec))?;
    Ok(ScoredSamples {
        sample_ids: cohort.sample_ids.clone(),
        labels: cohort.labels.clone(),
        scores,
        predicted,
    })
}

impl DatasetEvaluation {
    pub fn from_scored(
        model: &str,
        title: &str,
        tag: &str,
        scored: ScoredSamples,
    ) -> Result<Self, EvaluationError> {
        let metrics_error = |source| EvaluationError::Metrics {
            model: model.to_string(),
            dataset: title.to_string(),
            source,
        };
        let truth = scored.labels.view();
        let scores = scored.scores.values.view();
        let metrics =
            MetricSet::compute(truth, scores, scored.predicted.view()).map_err(metrics_error)?;
        let roc = roc_curve(truth, scores).map_err(metrics_error)?;
        Ok(Self {
            title: title.to_string(),
            tag: tag.to_string(),
            metrics,
            roc,
            scored,
        })
    }
}

/// Runs k-fold cross-validation for one model on the training cohort.
pub fn cross_validate(
    spec: &ModelSpec,
    cohort: &Cohort,
    kfold: &KFold,
    seed: u64,
) -> Result<CrossValidatedPredictions, EvaluationError> {
    let folds = kfold.split(cohort.len())?;
    let n = cohort.len();
    let mut rows = Vec::with_capacity(n);
    let mut fold_of = Vec::with_capacity(n);
    let mut sample_ids = Vec::with_capacity(n);
    let mut labels = Vec::with_capacity(n);
    let mut scores = Vec::with_capacity(n);
    let mut predicted = Vec::with_capacity(n);
    let kind = spec.build(seed).map_err(model_error(spec))?.score_kind();

    for (index, fold) in folds.iter().enumerate() {
        let model = fitted_model(spec, &cohort.subset(&fold.train), seed)?;
        let held_out = score_cohort(spec, model.as_ref(), &cohort.subset(&fold.test))?;
        if held_out.scores.kind != kind {
            return Err(EvaluationError::InconsistentScoreKind {
                model: spec.name.clone(),
                first: kind.label(),
                second: held_out.scores.kind.label(),
            });
        }
        log::debug!(
            "{} fold {}/{}: {} held out",
            spec.name,
            index + 1,
            folds.len(),
            fold.test.len()
        );
        rows.extend_from_slice(&fold.test);
        fold_of.extend(std::iter::repeat_n(index, fold.test.len()));
        sample_ids.extend(held_out.sample_ids);
        labels.extend(held_out.labels);
        scores.extend(held_out.scores.values);
        predicted.extend(held_out.predicted);
    }

    Ok(CrossValidatedPredictions {
        rows,
        fold_of,
        scored: ScoredSamples {
            sample_ids,
            labels: Array1::from(labels),
            scores: RankingScores {
                kind,
                values: Array1::from(scores),
            },
            predicted: Array1::from(predicted),
        },
    })
}

/// Cross-validates one model, refits it on the full training cohort and scores
/// every validation cohort.
pub fn evaluate_model(spec: &ModelSpec, study: &Study) -> Result<ModelReport, EvaluationError> {
    log::info!("Training {}...", spec.name);
    let unused = spec.unused_parameters();
    if !unused.is_empty() {
        log::warn!(
            "Model '{}' ignores these settings: {}",
            spec.name,
            unused.join(", ")
        );
    }

    let training = &study.training;
    let cross_validation = cross_validate(spec, training, &study.kfold, study.seed)?;
    let score_kind = cross_validation.scored.scores.kind;
    let train = DatasetEvaluation::from_scored(
        &spec.name,
        &training.title,
        &training.tag,
        cross_validation.scored.clone(),
    )?;

    let model = fitted_model(spec, training, study.seed)?;
    let mut validation = Vec::with_capacity(study.validation.len());
    for cohort in &study.validation {
        let scored = score_cohort(spec, model.as_ref(), cohort)?;
        if scored.scores.kind != score_kind {
            return Err(EvaluationError::InconsistentScoreKind {
                model: spec.name.clone(),
                first: score_kind.label(),
                second: scored.scores.kind.label(),
            });
        }
        validation.push(DatasetEvaluation::from_scored(
            &spec.name,
            &cohort.title,
            &cohort.tag,
            scored,
        )?);
    }

    log::info!(
        "{}: {} AUC {:.3}{}",
        spec.name,
        training.tag,
        train.metrics.auc,
        validation
            .iter()
            .map(|v| format!(", {} AUC {:.3}", v.tag, v.metrics.auc))
            .collect::<String>()
    );

    Ok(ModelReport {
        name: spec.name.clone(),
        score_kind,
        cross_validation,
        train,
        validation,
    })
}

/// Evaluates every model of the study, in roster order.
pub fn run_study(study: &Study) -> Result<StudyResults, EvaluationError> {
    if study.models.is_empty() {
        return Err(EvaluationError::EmptyRoster);
    }
    log::info!(
        "Evaluating {} models with {}-fold cross-validation on {} training samples",
        study.models.len(),
        study.kfold.n_splits,
        study.training.len()
    );
    let reports = study
        .models
        .iter()
        .map(|spec| evaluate_model(spec, study))
        .collect::<Result<Vec<_>, _>>()?;
    let label = |c: &Cohort| DatasetLabel {
        title: c.title.clone(),
        tag: c.tag.clone(),
    };
    Ok(StudyResults {
        train: label(&study.training),
        validation: study.validation.iter().map(label).collect(),
        reports,
    })
}
