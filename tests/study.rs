use std::fs;
use std::path::Path;
use std::process::Command;

use genedx::config::StudyConfig;
use genedx::pipeline::{RunOptions, run_from_path};
use genedx::plot::{legend_label, roc_file_name};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use tempfile::tempdir;

const GENES: [&str; 5] = ["MMP13", "COL2A1", "IL6", "GAPDH", "ACTB"];

/// Writes a genes x samples expression file and its group file.
///
/// The first three genes shift with the label; the rest are noise.
fn write_cohort(dir: &Path, prefix: &str, samples: usize, seed: u64, missing_every: usize) {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 1.0).expect("normal");
    let labels: Vec<u8> = (0..samples).map(|i| (i % 2) as u8).collect();
    let ids: Vec<String> = (0..samples).map(|i| format!("{prefix}_{i:03}")).collect();

    let mut expression = format!("gene\t{}\n", ids.join("\t"));
    for (g, gene) in GENES.iter().enumerate() {
        let cells: Vec<String> = labels
            .iter()
            .enumerate()
            .map(|(i, &label)| {
                if missing_every > 0 && (i + g) % missing_every == 0 {
                    return "NA".to_string();
                }
                let shift = if g < 3 { 1.2 * f64::from(label) } else { 0.0 };
                format!("{:.5}", shift + noise.sample(&mut rng))
            })
            .collect();
        expression.push_str(&format!("{gene}\t{}\n", cells.join("\t")));
    }
    expression.push_str(&format!("UNUSED\t{}\n", vec!["1"; samples].join("\t")));
    fs::write(dir.join(format!("{prefix}.txt")), expression).expect("write expression");

    let mut groups = String::from("name\ttype\n");
    for (id, &label) in ids.iter().zip(&labels) {
        groups.push_str(&format!("{id}\t{}\n", if label == 1 { "OA" } else { "control" }));
    }
    groups.push_str(&format!("{prefix}_orphan\tOA\n"));
    fs::write(dir.join(format!("{prefix}_groups.tsv")), groups).expect("write groups");
}

fn write_study(dir: &Path) -> std::path::PathBuf {
    write_cohort(dir, "train", 60, 11, 17);
    write_cohort(dir, "val_a", 30, 12, 0);
    write_cohort(dir, "val_b", 30, 13, 9);
    fs::write(dir.join("genes.txt"), GENES.join("\n")).expect("write features");

    let study = r#"
seed = 2024
folds = 5
features = "genes.txt"
output_dir = "results"

[training]
title = "Training Set"
tag = "Train"
expression = "train.txt"
groups = "train_groups.tsv"

[[validation]]
title = "Validation Set A"
tag = "ValA"
expression = "val_a.txt"
groups = "val_a_groups.tsv"

[[validation]]
title = "Validation Set B"
tag = "ValB"
expression = "val_b.txt"
groups = "val_b_groups.tsv"
"#;
    let path = dir.join("study.toml");
    fs::write(&path, study).expect("write study");
    path
}

fn no_plots() -> RunOptions {
    RunOptions {
        skip_plots: true,
        ..RunOptions::default()
    }
}

#[test]
fn full_roster_runs_end_to_end() {
    let tmp = tempdir().expect("temporary directory");
    let study = write_study(tmp.path());
    let summary = run_from_path(&study, &no_plots()).expect("study runs");

    let names: Vec<&str> = summary.results.reports.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["Naive Bayes", "Logistic Regression", "Lasso", "RidgeCV", "ElasticNet", "LDA", "MLP"]
    );

    for report in &summary.results.reports {
        let cv = &report.cross_validation;
        let mut rows = cv.rows.clone();
        rows.sort_unstable();
        assert_eq!(rows, (0..60).collect::<Vec<_>>(), "{}", report.name);
        assert_eq!(report.validation.len(), 2);
        assert_eq!(report.validation[0].scored.sample_ids.len(), 30);
        for dataset in std::iter::once(&report.train).chain(&report.validation) {
            let m = dataset.metrics;
            for value in [m.auc, m.recall, m.precision, m.f1] {
                assert!((0.0..=1.0).contains(&value), "{} {}", report.name, dataset.tag);
            }
            assert_eq!(dataset.scored.scores.kind, report.score_kind);
        }
        assert!(report.train.metrics.auc > 0.6, "{} barely beats chance", report.name);
    }

    let table =
        fs::read_to_string(tmp.path().join("results/model_performance.tsv")).expect("table");
    let lines: Vec<&str> = table.lines().collect();
    assert_eq!(lines.len(), 8);
    assert_eq!(lines[0].split('\t').count(), 13);
    assert!(
        lines[0].starts_with("Model\tTrain AUC\tTrain Recall\tTrain Precision\tTrain F1\tValA AUC")
    );

    let predictions =
        fs::read_to_string(tmp.path().join("results/predictions.tsv")).expect("predictions");
    assert_eq!(predictions.lines().count(), 1 + 7 * (60 + 30 + 30));
    assert!(!predictions.contains("_orphan"));
    let training_folds: Vec<&str> = predictions
        .lines()
        .filter(|line| line.starts_with("Training Set\tLasso\t"))
        .filter_map(|line| line.rsplit('\t').next())
        .collect();
    assert_eq!(training_folds.len(), 60);
    for fold in ["1", "2", "3", "4", "5"] {
        assert_eq!(training_folds.iter().filter(|f| **f == fold).count(), 12);
    }
}

#[test]
fn roc_figures_cover_every_dataset_and_model() {
    let tmp = tempdir().expect("temporary directory");
    let study = write_study(tmp.path());
    let summary = run_from_path(&study, &RunOptions::default()).expect("study runs");
    let results = &summary.results;

    let datasets: Vec<&str> = std::iter::once(results.train.title.as_str())
        .chain(results.validation.iter().map(|v| v.title.as_str()))
        .collect();
    assert_eq!(datasets, vec!["Training Set", "Validation Set A", "Validation Set B"]);

    for (index, title) in datasets.iter().enumerate() {
        let path = tmp.path().join("results").join(roc_file_name(title));
        assert!(summary.files.contains(&path), "{} not reported", path.display());
        let svg = fs::read_to_string(&path).expect("roc figure");
        assert!(svg.contains(&format!("ROC Curves ({title})")), "{title}");
        for report in &results.reports {
            let dataset = if index == 0 {
                &report.train
            } else {
                &report.validation[index - 1]
            };
            let label = legend_label(&report.name, dataset.metrics.auc);
            assert!(svg.contains(&label), "{title} lacks '{label}'");
        }
    }
    assert!(tmp.path().join("results/Training_Set_ROC.svg").exists());
    assert!(tmp.path().join("results/Validation_Set_A_ROC.svg").exists());
    assert!(tmp.path().join("results/Validation_Set_B_ROC.svg").exists());
}

#[test]
fn same_seed_reproduces_the_table() {
    let tmp = tempdir().expect("temporary directory");
    let study = write_study(tmp.path());
    let run = |dir: &str| {
        let options = RunOptions {
            output_dir: Some(tmp.path().join(dir)),
            ..no_plots()
        };
        run_from_path(&study, &options).expect("study runs");
        fs::read_to_string(tmp.path().join(dir).join("model_performance.tsv")).expect("table")
    };
    assert_eq!(run("first"), run("second"));
}

#[test]
fn validation_cohort_missing_a_feature_is_rejected() {
    let tmp = tempdir().expect("temporary directory");
    let study = write_study(tmp.path());
    let path = tmp.path().join("val_b.txt");
    let trimmed: String = fs::read_to_string(&path)
        .expect("expression")
        .lines()
        .filter(|line| !line.starts_with("IL6\t"))
        .map(|line| format!("{line}\n"))
        .collect();
    fs::write(&path, trimmed).expect("rewrite expression");

    let err = run_from_path(&study, &no_plots()).expect_err("mismatch must fail");
    assert!(err.to_string().contains("Feature mismatch"), "{err}");
}

#[test]
fn template_is_a_loadable_study() {
    let tmp = tempdir().expect("temporary directory");
    let path = tmp.path().join("study.toml");
    fs::write(&path, StudyConfig::template().expect("template")).expect("write template");
    let config = StudyConfig::load(&path).expect("template loads");
    assert_eq!(config.validation.len(), 2);
    assert_eq!(config.models.len(), 7);
    assert_eq!(config.features, tmp.path().join("feature_genes.txt"));
}

#[test]
fn cli_init_refuses_to_overwrite() {
    let tmp = tempdir().expect("temporary directory");
    let exe = env!("CARGO_BIN_EXE_genedx");
    let first = Command::new(exe)
        .current_dir(tmp.path())
        .args(["init", "study.toml"])
        .status()
        .expect("run genedx init");
    assert!(first.success());
    assert!(tmp.path().join("study.toml").exists());

    let second = Command::new(exe)
        .current_dir(tmp.path())
        .args(["init", "study.toml"])
        .output()
        .expect("run genedx init again");
    assert!(!second.status.success());
    assert!(String::from_utf8_lossy(&second.stderr).contains("already exists"));
}

#[test]
fn cli_evaluate_prints_the_summary() {
    let tmp = tempdir().expect("temporary directory");
    let study = write_study(tmp.path());
    let output = Command::new(env!("CARGO_BIN_EXE_genedx"))
        .args(["evaluate", study.to_str().expect("path str"), "--no-plots", "--folds", "3"])
        .output()
        .expect("run genedx evaluate");
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Model"));
    assert!(stdout.contains("RidgeCV"));
    assert!(stdout.contains("model_performance.tsv"));
    assert!(!tmp.path().join("results/Training_Set_ROC.svg").exists());
}
