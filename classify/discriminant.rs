//! Two-class linear discriminant analysis with a shared covariance.

use super::model::{
    Classifier, FeatureMatrix, LinearScore, ModelError, ScoreKind, sigmoid, validate_training,
};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_linalg::{Eigh, UPLO};

/// Eigenvalues below this fraction of the largest are treated as null directions.
const RANK_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone)]
pub struct LinearDiscriminant {
    name: String,
    fitted: Option<LinearScore>,
}

impl LinearDiscriminant {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fitted: None,
        }
    }
}

/// Moore-Penrose inverse of a symmetric positive semi-definite matrix.
pub(crate) fn symmetric_pseudo_inverse(matrix: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
    let (eigenvalues, eigenvectors) = matrix.eigh(UPLO::Lower)?;
    let largest = eigenvalues.iter().fold(0.0_f64, |acc, &l| acc.max(l));
    let cutoff = largest * RANK_TOLERANCE;
    let inverted = eigenvalues.mapv(|l| if l > cutoff { 1.0 / l } else { 0.0 });
    let dropped = inverted.iter().filter(|&&v| v == 0.0).count();
    if dropped > 0 {
        log::debug!("pseudo-inverse dropped {dropped} near-null directions");
    }
    let scaled = &eigenvectors * &inverted.view().insert_axis(Axis(0));
    Ok(scaled.dot(&eigenvectors.t()))
}

impl Classifier for LinearDiscriminant {
    fn name(&self) -> &str {
        &self.name
    }

    fn score_kind(&self) -> ScoreKind {
        ScoreKind::Probability
    }

    fn fit(&mut self, x: &FeatureMatrix, y: ArrayView1<f64>) -> Result<(), ModelError> {
        let (n0, n1) = validate_training(&self.name, x, y)?;
        let values = x.values();
        let p = values.ncols();

        let rows_of = |class: f64| -> Vec<usize> {
            y.iter()
                .enumerate()
                .filter(|&(_, &label)| label == class)
                .map(|(i, _)| i)
                .collect()
        };
        let group0 = values.select(Axis(0), &rows_of(0.0));
        let group1 = values.select(Axis(0), &rows_of(1.0));
        let mean0 = group0
            .mean_axis(Axis(0))
            .ok_or_else(|| ModelError::SingleClass(self.name.clone()))?;
        let mean1 = group1
            .mean_axis(Axis(0))
            .ok_or_else(|| ModelError::SingleClass(self.name.clone()))?;

        let centered0 = &group0 - &mean0.view().insert_axis(Axis(0));
        let centered1 = &group1 - &mean1.view().insert_axis(Axis(0));
        let scatter = centered0.t().dot(&centered0) + centered1.t().dot(&centered1);
        let dof = ((n0 + n1) as f64 - 2.0).max(1.0);
        let covariance = scatter / dof;

        let precision = if covariance.iter().all(|&v| v == 0.0) {
            log::warn!("{}: pooled covariance is zero; using the identity", self.name);
            Array2::eye(p)
        } else {
            symmetric_pseudo_inverse(&covariance)?
        };

        let difference = &mean1 - &mean0;
        let coef = precision.dot(&difference);
        let midpoint = (&mean1 + &mean0) * 0.5;
        let intercept = -midpoint.dot(&coef) + (n1 as f64 / n0 as f64).ln();
        if coef.iter().any(|c| !c.is_finite()) || !intercept.is_finite() {
            return Err(ModelError::NonFinite(self.name.clone()));
        }

        self.fitted = Some(LinearScore {
            features: x.names().to_vec(),
            coef,
            intercept,
        });
        Ok(())
    }

    fn raw_scores(&self, x: &FeatureMatrix) -> Result<Array1<f64>, ModelError> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or_else(|| ModelError::NotFitted(self.name.clone()))?;
        Ok(fitted.decision(x)?.mapv(sigmoid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn pseudo_inverse_of_full_rank_matrix_is_the_inverse() {
        let m = array![[4.0, 1.0], [1.0, 3.0]];
        let inv = symmetric_pseudo_inverse(&m).unwrap();
        let product = m.dot(&inv);
        assert_abs_diff_eq!(product[[0, 0]], 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(product[[0, 1]], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(product[[1, 1]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn pseudo_inverse_handles_rank_deficiency() {
        // Rank one: every column proportional to (1, 1).
        let m = array![[1.0, 1.0], [1.0, 1.0]];
        let inv = symmetric_pseudo_inverse(&m).unwrap();
        assert_abs_diff_eq!(inv[[0, 0]], 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(inv[[0, 1]], 0.25, epsilon = 1e-12);
    }

    #[test]
    fn balanced_one_dimensional_problem_splits_at_the_midpoint() {
        let x = FeatureMatrix::new(
            vec!["G".into()],
            array![[-3.0], [-1.0], [1.0], [3.0]],
        )
        .unwrap();
        let y = array![0.0, 0.0, 1.0, 1.0];
        let mut lda = LinearDiscriminant::new("lda");
        lda.fit(&x, y.view()).unwrap();
        let fitted = lda.fitted.clone().unwrap();
        // Pooled variance: ((1 + 1) + (1 + 1)) / 2 = 2; coef = (2 - -2) / 2 = 2.
        assert_abs_diff_eq!(fitted.coef[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(fitted.intercept, 0.0, epsilon = 1e-12);
        let mid = FeatureMatrix::new(vec!["G".into()], array![[0.0]]).unwrap();
        assert_abs_diff_eq!(lda.raw_scores(&mid).unwrap()[0], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn collinear_features_still_fit() {
        let x = FeatureMatrix::new(
            vec!["A".into(), "A_COPY".into()],
            array![[-2.0, -2.0], [-1.0, -1.0], [1.0, 1.0], [2.0, 2.0], [0.5, 0.5]],
        )
        .unwrap();
        let y = array![0.0, 0.0, 1.0, 1.0, 1.0];
        let mut lda = LinearDiscriminant::new("lda");
        lda.fit(&x, y.view()).unwrap();
        let p = lda.raw_scores(&x).unwrap();
        assert!(p[0] < 0.5 && p[3] > 0.5);
    }
}
