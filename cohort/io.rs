//! # Expression and Group File Readers
//!
//! Reads the two tab-separated inputs that make up a cohort:
//!
//! - Expression files are laid out genes x samples: the first column holds the
//!   feature identifier and every other column header is a sample identifier.
//!   Only the declared features are kept, transposed to samples x features.
//! - Group files carry a `name` column (sample identifier) and a `type` column
//!   (label string).
//!
//! Both are read with the `polars` CSV reader with every column typed as a
//! string, so identifiers keep leading zeros. Expression cells are trimmed and
//! parsed one by one; a cell that is neither missing nor a finite number is an
//! error rather than a silent gap.

use super::{DataError, FeatureList, LabelScheme};
use ndarray::Array2;
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::Path;

/// Cell contents treated as missing, in addition to empty cells.
const MISSING_MARKERS: [&str; 4] = ["NA", "NaN", "nan", "null"];

/// The declared features found in one expression file, transposed to samples x features.
#[derive(Debug, Clone)]
pub struct ExpressionTable {
    pub sample_ids: Vec<String>,
    /// Declared features present in the file, in declaration order.
    pub features: Vec<String>,
    /// Missing cells are `NaN`.
    pub values: Array2<f64>,
}

fn read_string_table(path: &Path) -> Result<DataFrame, DataError> {
    let null_values = NullValues::AllColumns(MISSING_MARKERS.iter().map(|m| (*m).into()).collect());
    let df = CsvReader::new(File::open(path)?)
        .with_options(
            CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(Some(0))
                .with_parse_options(
                    CsvParseOptions::default()
                        .with_separator(b'\t')
                        .with_null_values(Some(null_values)),
                ),
        )
        .finish()?;
    Ok(df)
}

fn string_cells(column: &Column) -> Result<Vec<Option<String>>, DataError> {
    let as_text = column.cast(&DataType::String)?;
    Ok(as_text
        .str()?
        .into_iter()
        .map(|cell| cell.map(|s| s.trim().to_string()))
        .collect())
}

fn parse_value(cell: &str) -> Option<f64> {
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Reads the declared features from an expression file.
///
/// Declared features missing from the file are skipped with a warning. When a
/// feature identifier appears on several rows, the first row is used.
pub fn read_expression(path: &Path, features: &FeatureList) -> Result<ExpressionTable, DataError> {
    log::info!("Loading expression data from '{}'", path.display());
    let df = read_string_table(path)?;
    let columns = df.get_columns();
    let Some((id_column, sample_columns)) = columns.split_first() else {
        return Err(DataError::EmptyFile(path.to_path_buf()));
    };
    if sample_columns.is_empty() {
        return Err(DataError::NoSamples(path.to_path_buf()));
    }

    let mut first_row: HashMap<String, usize> = HashMap::new();
    for (row, id) in string_cells(id_column)?.into_iter().enumerate() {
        if let Some(id) = id {
            first_row.entry(id).or_insert(row);
        }
    }

    let mut kept: Vec<(String, usize)> = Vec::with_capacity(features.len());
    let mut absent: Vec<&str> = Vec::new();
    for feature in features.iter() {
        match first_row.get(feature) {
            Some(&row) => kept.push((feature.to_string(), row)),
            None => absent.push(feature),
        }
    }
    if !absent.is_empty() {
        log::warn!(
            "{} of {} declared features are absent from '{}' and will be excluded: {}",
            absent.len(),
            features.len(),
            path.display(),
            absent.join(", ")
        );
    }
    if kept.is_empty() {
        return Err(DataError::NoFeaturesFound(path.to_path_buf()));
    }

    let mut values = Array2::from_elem((sample_columns.len(), kept.len()), f64::NAN);
    let mut sample_ids = Vec::with_capacity(sample_columns.len());
    for (sample, column) in sample_columns.iter().enumerate() {
        let sample_id = column.name().trim().to_string();
        let cells = string_cells(column)?;
        for (j, (feature, row)) in kept.iter().enumerate() {
            let Some(cell) = cells.get(*row).and_then(Option::as_deref) else {
                continue;
            };
            if cell.is_empty() || MISSING_MARKERS.contains(&cell) {
                continue;
            }
            values[[sample, j]] = parse_value(cell).ok_or_else(|| DataError::InvalidValue {
                sample: sample_id.clone(),
                feature: feature.clone(),
                value: cell.to_string(),
                path: path.to_path_buf(),
            })?;
        }
        sample_ids.push(sample_id);
    }

    let mut seen = HashSet::new();
    if let Some(duplicate) = sample_ids.iter().find(|id| !seen.insert(id.as_str())) {
        return Err(DataError::DuplicateSample {
            sample: duplicate.clone(),
            path: path.to_path_buf(),
        });
    }

    let missing = values.iter().filter(|v| v.is_nan()).count();
    log::info!(
        "Read {} samples x {} features from '{}' ({} missing values)",
        sample_ids.len(),
        kept.len(),
        path.display(),
        missing
    );

    Ok(ExpressionTable {
        sample_ids,
        features: kept.into_iter().map(|(name, _)| name).collect(),
        values,
    })
}

/// Reads a group file into `(sample id, label)` pairs, in file order.
pub fn read_groups(path: &Path, scheme: &LabelScheme) -> Result<Vec<(String, u8)>, DataError> {
    log::info!("Loading group labels from '{}'", path.display());
    let df = read_string_table(path)?;
    let column = |name: &str| {
        df.column(name)
            .map_err(|_| DataError::ColumnNotFound {
                column: name.to_string(),
                path: path.to_path_buf(),
            })
    };
    let names = string_cells(column("name")?)?;
    let types = string_cells(column("type")?)?;

    let mut seen = HashSet::new();
    let mut groups = Vec::with_capacity(names.len());
    for (row, (name, label)) in names.into_iter().zip(types).enumerate() {
        let Some(name) = name.filter(|n| !n.is_empty()) else {
            return Err(DataError::MissingSampleName {
                row: row + 2,
                path: path.to_path_buf(),
            });
        };
        let label = label.unwrap_or_default();
        let encoded = scheme.encode(&label).ok_or_else(|| DataError::UnknownLabel {
            label: label.clone(),
            sample: name.clone(),
            path: path.to_path_buf(),
        })?;
        if !seen.insert(name.clone()) {
            return Err(DataError::DuplicateSample {
                sample: name,
                path: path.to_path_buf(),
            });
        }
        groups.push((name, encoded));
    }
    Ok(groups)
}
