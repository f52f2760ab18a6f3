//! From a study file on disk to tables and figures in the output directory.

use crate::config::{CohortSource, ConfigError, StudyConfig};
use crate::cohort::{Cohort, DataError, FeatureList, FeatureMeans, LabelScheme, load_raw_cohort};
use crate::crossval::KFold;
use crate::evaluate::{EvaluationError, Study, StudyResults, run_study};
use crate::plot::{PlotError, write_roc_plots};
use crate::report::{
    PERFORMANCE_FILE, PREDICTIONS_FILE, ReportError, write_performance_table, write_predictions,
};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Plot(#[from] PlotError),
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Command-line overrides applied on top of the study file.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub output_dir: Option<PathBuf>,
    pub seed: Option<u64>,
    pub folds: Option<usize>,
    pub skip_plots: bool,
}

impl RunOptions {
    pub fn apply(&self, config: &mut StudyConfig) -> Result<(), ConfigError> {
        if let Some(dir) = &self.output_dir {
            config.output_dir = dir.clone();
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(folds) = self.folds {
            config.folds = folds;
        }
        config.validate()
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub results: StudyResults,
    /// Every file written, tables first.
    pub files: Vec<PathBuf>,
}

fn load_cohort(
    source: &CohortSource,
    features: &FeatureList,
    labels: &LabelScheme,
    means: &FeatureMeans,
) -> Result<Cohort, DataError> {
    load_raw_cohort(&source.expression, &source.groups, features, labels)?.impute(
        means,
        source.title.as_str(),
        source.tag.as_str(),
    )
}

/// Loads every cohort, imputing all of them with the training cohort's feature means.
pub fn load_study(config: &StudyConfig) -> Result<Study, DataError> {
    let features = FeatureList::load(&config.features)?;
    log::info!("Loading {}", config.training.title);
    let raw = load_raw_cohort(
        &config.training.expression,
        &config.training.groups,
        &features,
        &config.labels,
    )?;
    let means = FeatureMeans::from_training(&raw)?;
    let training = raw.impute(
        &means,
        config.training.title.as_str(),
        config.training.tag.as_str(),
    )?;

    let mut validation = Vec::with_capacity(config.validation.len());
    for source in &config.validation {
        log::info!("Loading {}", source.title);
        let cohort = load_cohort(source, &features, &config.labels, &means)?;
        if cohort.matrix.names() != training.matrix.names() {
            log::warn!(
                "{} does not provide the same features as {}; models will refuse to score it",
                source.title,
                config.training.title
            );
        }
        validation.push(cohort);
    }

    Ok(Study {
        training,
        validation,
        models: config.models.clone(),
        kfold: KFold::new(config.folds, config.seed),
        seed: config.seed,
    })
}

/// Runs the study and writes its outputs.
pub fn run(config: &StudyConfig, skip_plots: bool) -> Result<RunSummary, HarnessError> {
    let study = load_study(config)?;
    let results = run_study(&study)?;

    let dir = config.output_dir.as_path();
    fs::create_dir_all(dir).map_err(|source| HarnessError::OutputDir {
        path: dir.to_path_buf(),
        source,
    })?;
    let performance = dir.join(PERFORMANCE_FILE);
    write_performance_table(&performance, &results)?;
    let predictions = dir.join(PREDICTIONS_FILE);
    write_predictions(&predictions, &results)?;

    let mut files = vec![performance, predictions];
    if skip_plots {
        log::info!("Skipping ROC figures");
    } else {
        files.extend(write_roc_plots(dir, &results)?);
    }
    Ok(RunSummary { results, files })
}

/// Loads the study file, applies the overrides and runs it.
pub fn run_from_path(path: &Path, options: &RunOptions) -> Result<RunSummary, HarnessError> {
    let mut config = StudyConfig::load(path)?;
    options.apply(&mut config)?;
    run(&config, options.skip_plots)
}
