//! The study file: which cohorts to load, which models to compare and how.

use crate::classify::{ModelSpec, default_roster};
use crate::cohort::LabelScheme;
use crate::crossval::DEFAULT_SPLITS;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_SEED: u64 = 2024;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read study file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse study file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Failed to serialize study file: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Cross-validation needs at least 2 folds, but 'folds = {0}' was given.")]
    TooFewFolds(usize),
    #[error("Dataset tag '{0}' is used more than once; tags label the table columns and must be unique.")]
    DuplicateTag(String),
    #[error("Model name '{0}' is used more than once.")]
    DuplicateModel(String),
    #[error("A model entry has an empty name.")]
    EmptyModelName,
    #[error("The study lists no models.")]
    NoModels,
    #[error("Dataset '{0}' needs a non-empty title and tag.")]
    UnlabelledDataset(String),
}

/// Where one cohort's files live and how it is labelled in outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortSource {
    /// Shown in plot titles and the predictions table.
    pub title: String,
    /// Prefix of this cohort's columns in the performance table.
    pub tag: String,
    pub expression: PathBuf,
    pub groups: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_folds")]
    pub folds: usize,
    /// One feature identifier per line.
    pub features: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub labels: LabelScheme,
    pub training: CohortSource,
    #[serde(default)]
    pub validation: Vec<CohortSource>,
    #[serde(default = "default_roster")]
    pub models: Vec<ModelSpec>,
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_folds() -> usize {
    DEFAULT_SPLITS
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("results")
}

impl StudyConfig {
    /// Reads, resolves and validates a study file.
    ///
    /// Relative paths inside the file are taken relative to the file's own directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        config.resolve_paths(base);
        config.validate()?;
        Ok(config)
    }

    /// Joins every relative path onto `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.features);
        resolve(&mut self.output_dir);
        for source in std::iter::once(&mut self.training).chain(self.validation.iter_mut()) {
            resolve(&mut source.expression);
            resolve(&mut source.groups);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.folds < 2 {
            return Err(ConfigError::TooFewFolds(self.folds));
        }
        let mut tags = HashSet::new();
        for source in std::iter::once(&self.training).chain(&self.validation) {
            if source.title.trim().is_empty() || source.tag.trim().is_empty() {
                return Err(ConfigError::UnlabelledDataset(
                    source.expression.display().to_string(),
                ));
            }
            if !tags.insert(source.tag.as_str()) {
                return Err(ConfigError::DuplicateTag(source.tag.clone()));
            }
        }
        if self.models.is_empty() {
            return Err(ConfigError::NoModels);
        }
        let mut names = HashSet::new();
        for model in &self.models {
            if model.name.trim().is_empty() {
                return Err(ConfigError::EmptyModelName);
            }
            if !names.insert(model.name.as_str()) {
                return Err(ConfigError::DuplicateModel(model.name.clone()));
            }
        }
        Ok(())
    }

    /// A study over one training and two validation cohorts with the full default roster.
    pub fn example() -> Self {
        let cohort = |title: &str, tag: &str, expression: &str, groups: &str| CohortSource {
            title: title.to_string(),
            tag: tag.to_string(),
            expression: PathBuf::from(expression),
            groups: PathBuf::from(groups),
        };
        Self {
            seed: DEFAULT_SEED,
            folds: DEFAULT_SPLITS,
            features: PathBuf::from("feature_genes.txt"),
            output_dir: default_output_dir(),
            labels: LabelScheme::default(),
            training: cohort(
                "Training Set",
                "Train",
                "trainingsample_z_score_normalized_data.txt",
                "group_info.tsv",
            ),
            validation: vec![
                cohort(
                    "Validation Set A",
                    "ValA",
                    "GSE55235.txt",
                    "GSE55235_group_info.tsv",
                ),
                cohort(
                    "Validation Set B",
                    "ValB",
                    "GSE114007.txt",
                    "GSE114007_group_info.tsv",
                ),
            ],
            models: default_roster(),
        }
    }

    /// The example study rendered as TOML, for `genedx init`.
    pub fn template() -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(&Self::example())?)
    }
}
