//! ROC curve figures, one SVG per dataset with every model overlaid.

use crate::evaluate::StudyResults;
use crate::metrics::RocCurve;
use plotters::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlotError {
    #[error("Failed to draw '{path}': {message}")]
    Render { path: PathBuf, message: String },
}

/// The curves drawn on one figure.
#[derive(Debug, Clone)]
pub struct RocPanel {
    pub title: String,
    /// `(legend label, curve)` per model, in roster order.
    pub curves: Vec<(String, RocCurve)>,
}

/// `"Validation Set A"` becomes `"Validation_Set_A_ROC.svg"`.
pub fn roc_file_name(title: &str) -> String {
    format!("{}_ROC.svg", title.replace(' ', "_"))
}

pub fn legend_label(name: &str, auc: f64) -> String {
    format!("{name} (AUC={auc:.2})")
}

/// One panel for the training set (cross-validated scores) and one per validation cohort.
pub fn roc_panels(results: &StudyResults) -> Vec<RocPanel> {
    let mut panels = vec![RocPanel {
        title: results.train.title.clone(),
        curves: results
            .reports
            .iter()
            .map(|r| (legend_label(&r.name, r.train.metrics.auc), r.train.roc.clone()))
            .collect(),
    }];
    for (index, dataset) in results.validation.iter().enumerate() {
        panels.push(RocPanel {
            title: dataset.title.clone(),
            curves: results
                .reports
                .iter()
                .filter_map(|r| {
                    let v = r.validation.get(index)?;
                    Some((legend_label(&r.name, v.metrics.auc), v.roc.clone()))
                })
                .collect(),
        });
    }
    panels
}

/// Draws one panel to an SVG file.
pub fn plot_roc(path: &Path, panel: &RocPanel) -> Result<(), PlotError> {
    let render = |e: &dyn std::fmt::Display| PlotError::Render {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let root = SVGBackend::new(path, (800, 800)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| render(&e))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("ROC Curves ({})", panel.title), ("sans-serif", 26))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(0.0f64..1.0f64, 0.0f64..1.05f64)
        .map_err(|e| render(&e))?;

    chart
        .configure_mesh()
        .x_desc("1-Specificity")
        .y_desc("Sensitivity")
        .draw()
        .map_err(|e| render(&e))?;

    chart
        .draw_series(DashedLineSeries::new(
            vec![(0.0, 0.0), (1.0, 1.0)],
            6,
            4,
            BLACK.stroke_width(1),
        ))
        .map_err(|e| render(&e))?;

    for (index, (label, curve)) in panel.curves.iter().enumerate() {
        let color = Palette99::pick(index).to_rgba();
        chart
            .draw_series(LineSeries::new(curve.points(), color.stroke_width(2)))
            .map_err(|e| render(&e))?
            .label(label.as_str())
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
            });
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerRight)
        .background_style(WHITE.mix(0.85))
        .border_style(BLACK)
        .draw()
        .map_err(|e| render(&e))?;

    root.present().map_err(|e| render(&e))?;
    log::info!("ROC curves for {} saved to {}", panel.title, path.display());
    Ok(())
}

/// Writes every panel into `dir`, returning the files written.
pub fn write_roc_plots(dir: &Path, results: &StudyResults) -> Result<Vec<PathBuf>, PlotError> {
    roc_panels(results)
        .iter()
        .map(|panel| {
            let path = dir.join(roc_file_name(&panel.title));
            plot_roc(&path, panel)?;
            Ok(path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::fixtures;

    #[test]
    fn file_names_replace_spaces() {
        assert_eq!(roc_file_name("Training Set"), "Training_Set_ROC.svg");
        assert_eq!(roc_file_name("Validation Set B"), "Validation_Set_B_ROC.svg");
    }

    #[test]
    fn legend_rounds_auc_to_two_decimals() {
        assert_eq!(legend_label("Lasso", 0.8749), "Lasso (AUC=0.87)");
    }

    #[test]
    fn one_panel_per_dataset_with_every_model() {
        let panels = roc_panels(&fixtures::results());
        let titles: Vec<&str> = panels.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Training Set", "Validation Set A"]);
        for panel in &panels {
            assert_eq!(panel.curves.len(), 2);
            assert_eq!(panel.curves[0].0, "Naive Bayes (AUC=0.75)");
            assert_eq!(panel.curves[1].0, "RidgeCV (AUC=0.75)");
            let first = panel.curves[0].1.points().next();
            assert_eq!(first, Some((0.0, 0.0)));
        }
    }

    #[test]
    fn figures_carry_caption_and_legend() {
        let dir = tempfile::tempdir().unwrap();
        let files = write_roc_plots(dir.path(), &fixtures::results()).unwrap();
        assert_eq!(
            files,
            vec![
                dir.path().join("Training_Set_ROC.svg"),
                dir.path().join("Validation_Set_A_ROC.svg"),
            ]
        );
        let svg = std::fs::read_to_string(&files[1]).unwrap();
        assert!(svg.contains("ROC Curves (Validation Set A)"));
        assert!(svg.contains("Naive Bayes (AUC=0.75)"));
        assert!(svg.contains("RidgeCV (AUC=0.75)"));
    }
}
