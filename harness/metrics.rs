//! Binary classification metrics.
//!
//! Labels are `0.0`/`1.0`, hard predictions are `0`/`1`, and class 1 is the
//! positive class throughout.

use ndarray::ArrayView1;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum MetricsError {
    #[error("{truth} labels were given with {other} predictions or scores.")]
    LengthMismatch { truth: usize, other: usize },
    #[error("ROC analysis needs both classes, but every label is {0}.")]
    SingleClass(u8),
    #[error("No samples to evaluate.")]
    Empty,
    #[error("Score {value} at position {index} is not a finite number.")]
    NonFiniteScore { index: usize, value: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfusionMatrix {
    pub true_positives: usize,
    pub false_positives: usize,
    pub true_negatives: usize,
    pub false_negatives: usize,
}

fn check_lengths(truth: usize, other: usize) -> Result<(), MetricsError> {
    if truth != other {
        return Err(MetricsError::LengthMismatch { truth, other });
    }
    if truth == 0 {
        return Err(MetricsError::Empty);
    }
    Ok(())
}

/// `numerator / denominator`, or zero when nothing was counted.
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl ConfusionMatrix {
    pub fn from_labels(
        truth: ArrayView1<f64>,
        predicted: ArrayView1<u8>,
    ) -> Result<Self, MetricsError> {
        check_lengths(truth.len(), predicted.len())?;
        let mut cm = Self::default();
        for (&t, &p) in truth.iter().zip(predicted.iter()) {
            match (t == 1.0, p == 1) {
                (true, true) => cm.true_positives += 1,
                (false, true) => cm.false_positives += 1,
                (false, false) => cm.true_negatives += 1,
                (true, false) => cm.false_negatives += 1,
            }
        }
        Ok(cm)
    }

    pub fn recall(&self) -> f64 {
        ratio(
            self.true_positives,
            self.true_positives + self.false_negatives,
        )
    }

    pub fn precision(&self) -> f64 {
        ratio(
            self.true_positives,
            self.true_positives + self.false_positives,
        )
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

/// Points of a ROC curve, ordered from `(0, 0)` to `(1, 1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
}

impl RocCurve {
    /// Trapezoidal area under the curve.
    pub fn area(&self) -> f64 {
        self.fpr
            .windows(2)
            .zip(self.tpr.windows(2))
            .map(|(x, y)| (x[1] - x[0]) * (y[1] + y[0]) / 2.0)
            .sum()
    }

    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.fpr.iter().copied().zip(self.tpr.iter().copied())
    }
}

/// Builds the ROC curve by sweeping a threshold down through the distinct scores.
///
/// Samples with tied scores move together, so a tie contributes a single
/// diagonal step rather than an order-dependent staircase.
pub fn roc_curve(
    truth: ArrayView1<f64>,
    scores: ArrayView1<f64>,
) -> Result<RocCurve, MetricsError> {
    check_lengths(truth.len(), scores.len())?;
    if let Some((index, &value)) = scores.iter().enumerate().find(|(_, s)| !s.is_finite()) {
        return Err(MetricsError::NonFiniteScore { index, value });
    }
    let positives = truth.iter().filter(|&&t| t == 1.0).count();
    let negatives = truth.len() - positives;
    if positives == 0 {
        return Err(MetricsError::SingleClass(0));
    }
    if negatives == 0 {
        return Err(MetricsError::SingleClass(1));
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut fpr = vec![0.0];
    let mut tpr = vec![0.0];
    let (mut tp, mut fp) = (0usize, 0usize);
    for (position, &i) in order.iter().enumerate() {
        if truth[i] == 1.0 {
            tp += 1;
        } else {
            fp += 1;
        }
        let last_of_tie = order
            .get(position + 1)
            .is_none_or(|&next| scores[next] != scores[i]);
        if last_of_tie {
            fpr.push(fp as f64 / negatives as f64);
            tpr.push(tp as f64 / positives as f64);
        }
    }
    Ok(RocCurve { fpr, tpr })
}

pub fn roc_auc(truth: ArrayView1<f64>, scores: ArrayView1<f64>) -> Result<f64, MetricsError> {
    Ok(roc_curve(truth, scores)?.area())
}

/// The four numbers reported for every model and dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSet {
    pub auc: f64,
    pub recall: f64,
    pub precision: f64,
    pub f1: f64,
}

impl MetricSet {
    /// AUC from ranking scores; recall, precision and F1 from hard predictions.
    pub fn compute(
        truth: ArrayView1<f64>,
        scores: ArrayView1<f64>,
        predicted: ArrayView1<u8>,
    ) -> Result<Self, MetricsError> {
        let auc = roc_auc(truth, scores)?;
        let cm = ConfusionMatrix::from_labels(truth, predicted)?;
        Ok(Self {
            auc,
            recall: cm.recall(),
            precision: cm.precision(),
            f1: cm.f1(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn perfect_ranking_has_unit_auc() {
        let truth = array![0.0, 0.0, 1.0, 1.0];
        let scores = array![0.1, 0.2, 0.8, 0.9];
        assert_abs_diff_eq!(roc_auc(truth.view(), scores.view()).unwrap(), 1.0);
        let reversed = scores.mapv(|s| -s);
        assert_abs_diff_eq!(roc_auc(truth.view(), reversed.view()).unwrap(), 0.0);
    }

    #[test]
    fn auc_matches_pairwise_concordance() {
        let truth = array![1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        let scores = array![0.9, 0.7, 0.6, 0.6, 0.3, 0.1];
        let mut concordant = 0.0;
        let mut pairs = 0.0;
        for i in 0..6 {
            for j in 0..6 {
                if truth[i] == 1.0 && truth[j] == 0.0 {
                    pairs += 1.0;
                    concordant += if scores[i] > scores[j] {
                        1.0
                    } else if scores[i] == scores[j] {
                        0.5
                    } else {
                        0.0
                    };
                }
            }
        }
        assert_abs_diff_eq!(
            roc_auc(truth.view(), scores.view()).unwrap(),
            concordant / pairs,
            epsilon = 1e-12
        );
    }

    #[test]
    fn constant_scores_give_the_diagonal() {
        let truth = array![0.0, 1.0, 0.0, 1.0];
        let scores = array![3.0, 3.0, 3.0, 3.0];
        let curve = roc_curve(truth.view(), scores.view()).unwrap();
        assert_eq!(curve.fpr, vec![0.0, 1.0]);
        assert_eq!(curve.tpr, vec![0.0, 1.0]);
        assert_abs_diff_eq!(curve.area(), 0.5);
    }

    #[test]
    fn single_class_is_rejected() {
        let truth = array![1.0, 1.0];
        let scores = array![0.2, 0.4];
        assert_eq!(
            roc_auc(truth.view(), scores.view()),
            Err(MetricsError::SingleClass(1))
        );
    }

    #[test]
    fn rates_are_zero_without_positive_calls() {
        let truth = array![1.0, 0.0, 1.0];
        let predicted = array![0u8, 0, 0];
        let cm = ConfusionMatrix::from_labels(truth.view(), predicted.view()).unwrap();
        assert_eq!(cm.precision(), 0.0);
        assert_eq!(cm.recall(), 0.0);
        assert_eq!(cm.f1(), 0.0);
    }

    #[test]
    fn metric_set_combines_scores_and_calls() {
        let truth = array![1.0, 1.0, 0.0, 0.0];
        let scores = array![0.9, 0.4, 0.6, 0.1];
        let predicted = array![1u8, 0, 1, 0];
        let m = MetricSet::compute(truth.view(), scores.view(), predicted.view()).unwrap();
        assert_abs_diff_eq!(m.auc, 0.75);
        assert_abs_diff_eq!(m.recall, 0.5);
        assert_abs_diff_eq!(m.precision, 0.5);
        assert_abs_diff_eq!(m.f1, 0.5);
    }

    #[test]
    fn length_mismatch_is_reported() {
        let truth = array![1.0, 0.0];
        let predicted = array![1u8];
        assert_eq!(
            ConfusionMatrix::from_labels(truth.view(), predicted.view()),
            Err(MetricsError::LengthMismatch { truth: 2, other: 1 })
        );
    }
}
