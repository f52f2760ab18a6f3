//! Tab-separated result tables and the console summary.

use crate::evaluate::{DatasetEvaluation, ModelReport, ScoredSamples, StudyResults};
use crate::metrics::MetricSet;
use itertools::Itertools;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

pub const PERFORMANCE_FILE: &str = "model_performance.tsv";
pub const PREDICTIONS_FILE: &str = "predictions.tsv";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to create '{path}': {source}")]
    Create {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to write table: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

const METRIC_NAMES: [&str; 4] = ["AUC", "Recall", "Precision", "F1"];

fn metric_values(m: &MetricSet) -> [f64; 4] {
    [m.auc, m.recall, m.precision, m.f1]
}

fn tsv_writer(path: &Path) -> Result<csv::Writer<File>, ReportError> {
    let file = File::create(path).map_err(|source| ReportError::Create {
        path: path.display().to_string(),
        source,
    })?;
    Ok(csv::WriterBuilder::new().delimiter(b'\t').from_writer(file))
}

/// Dataset evaluations of one report, training first.
fn datasets(report: &ModelReport) -> impl Iterator<Item = &DatasetEvaluation> {
    std::iter::once(&report.train).chain(&report.validation)
}

/// `Model`, then `<Tag> AUC`, `<Tag> Recall`, `<Tag> Precision`, `<Tag> F1` per dataset.
pub fn performance_header(results: &StudyResults) -> Vec<String> {
    let tags = std::iter::once(&results.train).chain(&results.validation);
    std::iter::once("Model".to_string())
        .chain(tags.flat_map(|d| METRIC_NAMES.iter().map(move |m| format!("{} {m}", d.tag))))
        .collect()
}

/// One row per model, six decimals per value.
pub fn performance_rows(results: &StudyResults) -> Vec<Vec<String>> {
    results
        .reports
        .iter()
        .map(|report| {
            std::iter::once(report.name.clone())
                .chain(datasets(report).flat_map(|d| {
                    metric_values(&d.metrics).map(|v| format!("{v:.6}"))
                }))
                .collect()
        })
        .collect()
}

pub fn write_performance_table(path: &Path, results: &StudyResults) -> Result<(), ReportError> {
    let mut writer = tsv_writer(path)?;
    writer.write_record(performance_header(results))?;
    for row in performance_rows(results) {
        writer.write_record(row)?;
    }
    writer.flush()?;
    log::info!("Performance table written to {}", path.display());
    Ok(())
}

/// `folds[i]` is the zero-based fold that held out row `i`; validation rows have none.
fn write_scored(
    writer: &mut csv::Writer<File>,
    dataset: &str,
    model: &str,
    scored: &ScoredSamples,
    folds: Option<&[usize]>,
) -> Result<(), ReportError> {
    let kind = scored.scores.kind.label();
    for (i, id) in scored.sample_ids.iter().enumerate() {
        let label = (scored.labels[i] as u8).to_string();
        let score = format!("{:.6}", scored.scores.values[i]);
        let predicted = scored.predicted[i].to_string();
        let fold = folds
            .and_then(|f| f.get(i))
            .map(|f| (f + 1).to_string())
            .unwrap_or_default();
        writer.write_record([
            dataset,
            model,
            id.as_str(),
            label.as_str(),
            score.as_str(),
            kind,
            predicted.as_str(),
            fold.as_str(),
        ])?;
    }
    Ok(())
}

/// Per-sample scores in long format. Training rows are the cross-validated, held-out
/// predictions and carry the one-based fold that held them out.
pub fn write_predictions(path: &Path, results: &StudyResults) -> Result<(), ReportError> {
    let mut writer = tsv_writer(path)?;
    writer.write_record([
        "dataset",
        "model",
        "sample_id",
        "label",
        "score",
        "score_kind",
        "predicted",
        "fold",
    ])?;
    for report in &results.reports {
        let folds = report.cross_validation.fold_of.as_slice();
        let train = &report.train;
        write_scored(&mut writer, &train.title, &report.name, &train.scored, Some(folds))?;
        for dataset in &report.validation {
            write_scored(&mut writer, &dataset.title, &report.name, &dataset.scored, None)?;
        }
    }
    writer.flush()?;
    log::info!("Per-sample predictions written to {}", path.display());
    Ok(())
}

/// The performance table laid out in aligned columns for the terminal.
pub fn format_summary(results: &StudyResults) -> String {
    let header = performance_header(results);
    let rows: Vec<Vec<String>> = performance_rows(results)
        .into_iter()
        .map(|row| {
            row.into_iter()
                .enumerate()
                .map(|(i, cell)| match (i, cell.parse::<f64>()) {
                    (0, _) | (_, Err(_)) => cell,
                    (_, Ok(v)) => format!("{v:.3}"),
                })
                .collect()
        })
        .collect();
    let widths: Vec<usize> = (0..header.len())
        .map(|c| {
            std::iter::once(&header)
                .chain(&rows)
                .map(|r| r[c].len())
                .max()
                .unwrap_or(0)
        })
        .collect();
    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{cell:<w$}"))
            .join("  ")
            .trim_end()
            .to_string()
    };
    let mut out = line(&header);
    out.push('\n');
    out.push_str(&"-".repeat(out.trim_end().len()));
    for row in &rows {
        out.push('\n');
        out.push_str(&line(row));
    }
    out.push('\n');
    out
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::classify::{RankingScores, ScoreKind};
    use crate::evaluate::{
        CrossValidatedPredictions, DatasetEvaluation, DatasetLabel, ModelReport, ScoredSamples,
        StudyResults,
    };
    use ndarray::array;

    fn scored(kind: ScoreKind, prefix: &str) -> ScoredSamples {
        ScoredSamples {
            sample_ids: (1..=4).map(|i| format!("{prefix}{i}")).collect(),
            labels: array![1.0, 0.0, 1.0, 0.0],
            scores: RankingScores {
                kind,
                values: array![0.9, 0.2, 0.4, 0.6],
            },
            predicted: array![1, 0, 0, 1],
        }
    }

    fn evaluation(title: &str, tag: &str, kind: ScoreKind) -> DatasetEvaluation {
        DatasetEvaluation::from_scored("fixture", title, tag, scored(kind, tag)).unwrap()
    }

    /// Two models scored on a training cohort and one validation cohort.
    pub fn results() -> StudyResults {
        let report = |name: &str, kind: ScoreKind| ModelReport {
            name: name.to_string(),
            score_kind: kind,
            cross_validation: CrossValidatedPredictions {
                rows: vec![0, 1, 2, 3],
                fold_of: vec![0, 0, 1, 1],
                scored: scored(kind, "Train"),
            },
            train: evaluation("Training Set", "Train", kind),
            validation: vec![evaluation("Validation Set A", "ValA", kind)],
        };
        StudyResults {
            train: DatasetLabel {
                title: "Training Set".into(),
                tag: "Train".into(),
            },
            validation: vec![DatasetLabel {
                title: "Validation Set A".into(),
                tag: "ValA".into(),
            }],
            reports: vec![
                report("Naive Bayes", ScoreKind::Probability),
                report("RidgeCV", ScoreKind::Decision),
            ],
        }
    }
}
