//! # Cohort Assembly
//!
//! Turns an expression file and a group file into a labelled, fully observed
//! `Cohort` ready for the classifiers.
//!
//! - Alignment: matrix rows and labels are matched on the sample identifier
//!   (inner join). Samples present in only one source are dropped.
//! - Schema tolerance: declared features missing from an expression file are
//!   excluded from that cohort. Whether the result still fits a model is the
//!   model's decision at inference time.
//! - Imputation: missing values are filled with the per-feature mean of the
//!   training cohort, never with statistics from the cohort being filled.

pub mod io;

use crate::classify::{FeatureMatrix, ModelError};
use ndarray::{Array1, Array2, Axis};
use polars::prelude::PolarsError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use io::{ExpressionTable, read_expression, read_groups};

#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("The file '{0}' contains no columns.")]
    EmptyFile(PathBuf),
    #[error("The expression file '{0}' has no sample columns.")]
    NoSamples(PathBuf),
    #[error("None of the declared features were found in '{0}'.")]
    NoFeaturesFound(PathBuf),
    #[error("The feature list '{0}' contains no identifiers.")]
    EmptyFeatureList(PathBuf),
    #[error("The required column '{column}' was not found in '{path}'. Please check spelling and case.")]
    ColumnNotFound { column: String, path: PathBuf },
    #[error("Row {row} of '{path}' has no sample name.")]
    MissingSampleName { row: usize, path: PathBuf },
    #[error("Sample '{sample}' appears more than once in '{path}'.")]
    DuplicateSample { sample: String, path: PathBuf },
    #[error(
        "Unknown group label '{label}' for sample '{sample}' in '{path}'. Expected the control or case label from the study file."
    )]
    UnknownLabel {
        label: String,
        sample: String,
        path: PathBuf,
    },
    #[error(
        "Sample '{sample}' has the value '{value}' for feature '{feature}' in '{path}', which is not a number."
    )]
    InvalidValue {
        sample: String,
        feature: String,
        value: String,
        path: PathBuf,
    },
    #[error("No sample in '{expression}' has a label in '{groups}'.")]
    EmptyJoin { expression: PathBuf, groups: PathBuf },
    #[error("Feature '{0}' has no observed value in the training cohort, so it cannot be imputed.")]
    NoObservedValues(String),
    #[error("No training mean is available for feature '{0}'.")]
    MissingMean(String),
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Ordered, de-duplicated feature identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureList {
    ids: Vec<String>,
}

impl FeatureList {
    /// Builds a list, dropping blanks and repeated identifiers. Returns `None` if nothing remains.
    pub fn new(ids: Vec<String>) -> Option<Self> {
        let mut seen = HashSet::new();
        let ids: Vec<String> = ids
            .into_iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty() && seen.insert(id.clone()))
            .collect();
        (!ids.is_empty()).then_some(Self { ids })
    }

    /// Reads one identifier per line.
    pub fn load(path: &Path) -> Result<Self, DataError> {
        let text = fs::read_to_string(path)?;
        let list = Self::new(text.lines().map(str::to_string).collect())
            .ok_or_else(|| DataError::EmptyFeatureList(path.to_path_buf()))?;
        log::info!("Declared {} features from '{}'", list.len(), path.display());
        Ok(list)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

/// Group-file label strings for the two classes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelScheme {
    pub control: String,
    pub case: String,
}

impl Default for LabelScheme {
    fn default() -> Self {
        Self {
            control: "control".to_string(),
            case: "OA".to_string(),
        }
    }
}

impl LabelScheme {
    pub fn encode(&self, label: &str) -> Option<u8> {
        let label = label.trim();
        if label == self.control {
            Some(0)
        } else if label == self.case {
            Some(1)
        } else {
            None
        }
    }
}

/// A joined cohort that may still contain missing (`NaN`) values.
#[derive(Debug, Clone)]
pub struct RawCohort {
    pub sample_ids: Vec<String>,
    pub features: Vec<String>,
    pub values: Array2<f64>,
    pub labels: Array1<f64>,
}

/// Inner-joins expression rows with group labels on the sample identifier.
///
/// Row order follows the expression file.
pub fn join_labels(table: ExpressionTable, groups: &[(String, u8)]) -> RawCohort {
    let labels_by_id: HashMap<&str, u8> = groups.iter().map(|(id, l)| (id.as_str(), *l)).collect();
    let mut rows = Vec::new();
    let mut labels = Vec::new();
    for (row, id) in table.sample_ids.iter().enumerate() {
        if let Some(&label) = labels_by_id.get(id.as_str()) {
            rows.push(row);
            labels.push(f64::from(label));
        }
    }
    let dropped_expression = table.sample_ids.len() - rows.len();
    let dropped_groups = groups.len() - rows.len();
    if dropped_expression > 0 || dropped_groups > 0 {
        log::info!(
            "Join kept {} samples; dropped {} without a label and {} labels without expression",
            rows.len(),
            dropped_expression,
            dropped_groups
        );
    }
    RawCohort {
        sample_ids: rows.iter().map(|&r| table.sample_ids[r].clone()).collect(),
        features: table.features,
        values: table.values.select(Axis(0), &rows),
        labels: Array1::from(labels),
    }
}

/// Reads and joins one cohort's expression and group files.
pub fn load_raw_cohort(
    expression: &Path,
    groups: &Path,
    features: &FeatureList,
    scheme: &LabelScheme,
) -> Result<RawCohort, DataError> {
    let table = read_expression(expression, features)?;
    let group_rows = read_groups(groups, scheme)?;
    let raw = join_labels(table, &group_rows);
    if raw.sample_ids.is_empty() {
        return Err(DataError::EmptyJoin {
            expression: expression.to_path_buf(),
            groups: groups.to_path_buf(),
        });
    }
    let cases = raw.labels.iter().filter(|&&l| l == 1.0).count();
    log::info!(
        "Cohort has {} samples ({} case, {} control)",
        raw.sample_ids.len(),
        cases,
        raw.sample_ids.len() - cases
    );
    Ok(raw)
}

/// Per-feature means of the training cohort, used to fill every cohort's gaps.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMeans {
    means: HashMap<String, f64>,
}

impl FeatureMeans {
    /// Column means over observed values only.
    pub fn from_training(raw: &RawCohort) -> Result<Self, DataError> {
        let mut means = HashMap::with_capacity(raw.features.len());
        for (feature, column) in raw.features.iter().zip(raw.values.axis_iter(Axis(1))) {
            let observed: Vec<f64> = column.iter().copied().filter(|v| !v.is_nan()).collect();
            if observed.is_empty() {
                return Err(DataError::NoObservedValues(feature.clone()));
            }
            means.insert(
                feature.clone(),
                observed.iter().sum::<f64>() / observed.len() as f64,
            );
        }
        Ok(Self { means })
    }

    pub fn get(&self, feature: &str) -> Option<f64> {
        self.means.get(feature).copied()
    }
}

/// A labelled cohort with every value observed.
#[derive(Debug, Clone)]
pub struct Cohort {
    /// Display title, e.g. "Training Set".
    pub title: String,
    /// Short tag used in table headers, e.g. "Train".
    pub tag: String,
    pub sample_ids: Vec<String>,
    pub matrix: FeatureMatrix,
    pub labels: Array1<f64>,
}

impl RawCohort {
    /// Fills missing values from the training means, producing a model-ready cohort.
    pub fn impute(
        self,
        means: &FeatureMeans,
        title: impl Into<String>,
        tag: impl Into<String>,
    ) -> Result<Cohort, DataError> {
        let mut values = self.values;
        let mut filled = 0usize;
        for (feature, mut column) in self.features.iter().zip(values.axis_iter_mut(Axis(1))) {
            let mean = means
                .get(feature)
                .ok_or_else(|| DataError::MissingMean(feature.clone()))?;
            for v in column.iter_mut() {
                if v.is_nan() {
                    *v = mean;
                    filled += 1;
                }
            }
        }
        let tag = tag.into();
        if filled > 0 {
            log::info!("{tag}: imputed {filled} missing values with training means");
        }
        Ok(Cohort {
            title: title.into(),
            tag,
            sample_ids: self.sample_ids,
            matrix: FeatureMatrix::new(self.features, values)?,
            labels: self.labels,
        })
    }
}

impl Cohort {
    pub fn len(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_ids.is_empty()
    }

    /// Restricts the cohort to the given rows, in the given order.
    pub fn subset(&self, rows: &[usize]) -> Cohort {
        Cohort {
            title: self.title.clone(),
            tag: self.tag.clone(),
            sample_ids: rows.iter().map(|&r| self.sample_ids[r].clone()).collect(),
            matrix: self.matrix.select_rows(rows),
            labels: self.labels.select(Axis(0), rows),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn raw() -> RawCohort {
        RawCohort {
            sample_ids: vec!["a".into(), "b".into(), "c".into()],
            features: vec!["G1".into(), "G2".into()],
            values: array![[1.0, f64::NAN], [3.0, 4.0], [f64::NAN, 8.0]],
            labels: array![0.0, 1.0, 1.0],
        }
    }

    #[test]
    fn feature_list_drops_blanks_and_repeats() {
        let list = FeatureList::new(vec![" A ".into(), "".into(), "B".into(), "A".into()]).unwrap();
        assert_eq!(list.iter().collect::<Vec<_>>(), vec!["A", "B"]);
        assert!(FeatureList::new(vec!["  ".into()]).is_none());
    }

    #[test]
    fn means_ignore_missing_values() {
        let means = FeatureMeans::from_training(&raw()).unwrap();
        assert_abs_diff_eq!(means.get("G1").unwrap(), 2.0);
        assert_abs_diff_eq!(means.get("G2").unwrap(), 6.0);
    }

    #[test]
    fn imputation_uses_supplied_means_not_own_statistics() {
        let training_means = FeatureMeans::from_training(&raw()).unwrap();
        let other = RawCohort {
            sample_ids: vec!["x".into(), "y".into()],
            features: vec!["G1".into(), "G2".into()],
            values: array![[f64::NAN, 100.0], [50.0, f64::NAN]],
            labels: array![1.0, 0.0],
        };
        let cohort = other.impute(&training_means, "Validation", "Val").unwrap();
        assert_eq!(cohort.matrix.values(), array![[2.0, 100.0], [50.0, 6.0]]);
    }

    #[test]
    fn all_missing_training_feature_is_an_error() {
        let mut cohort = raw();
        cohort.values.column_mut(1).fill(f64::NAN);
        assert!(matches!(
            FeatureMeans::from_training(&cohort),
            Err(DataError::NoObservedValues(ref f)) if f == "G2"
        ));
    }

    #[test]
    fn join_keeps_expression_order_and_drops_unmatched() {
        let table = ExpressionTable {
            sample_ids: vec!["s3".into(), "s1".into(), "s2".into()],
            features: vec!["G".into()],
            values: array![[3.0], [1.0], [2.0]],
        };
        let groups = vec![("s1".to_string(), 1), ("s2".to_string(), 0), ("s9".to_string(), 1)];
        let joined = join_labels(table, &groups);
        assert_eq!(joined.sample_ids, vec!["s1", "s2"]);
        assert_eq!(joined.values, array![[1.0], [2.0]]);
        assert_eq!(joined.labels, array![1.0, 0.0]);
    }

    #[test]
    fn subset_follows_row_order() {
        let means = FeatureMeans::from_training(&raw()).unwrap();
        let cohort = raw().impute(&means, "Training Set", "Train").unwrap();
        let sub = cohort.subset(&[2, 0]);
        assert_eq!(sub.sample_ids, vec!["c", "a"]);
        assert_eq!(sub.labels, array![1.0, 0.0]);
        assert_eq!(sub.matrix.nrows(), 2);
    }
}
