use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use thiserror::Error;

pub const DEFAULT_SPLITS: usize = 5;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CrossValidationError {
    #[error("Cross-validation needs at least 2 folds, but {0} were requested.")]
    TooFewFolds(usize),
    #[error("Cannot split {samples} samples into {folds} folds.")]
    TooFewSamples { samples: usize, folds: usize },
}

/// One train/test partition of the row indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffled k-fold partitioning with a fixed seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KFold {
    pub n_splits: usize,
    pub seed: u64,
}

impl KFold {
    pub fn new(n_splits: usize, seed: u64) -> Self {
        Self { n_splits, seed }
    }

    /// Partitions `0..n` into `n_splits` folds.
    ///
    /// The first `n % n_splits` folds hold one extra test row. Test sets are
    /// disjoint and together cover every row exactly once.
    pub fn split(&self, n: usize) -> Result<Vec<Fold>, CrossValidationError> {
        let k = self.n_splits;
        if k < 2 {
            return Err(CrossValidationError::TooFewFolds(k));
        }
        if n < k {
            return Err(CrossValidationError::TooFewSamples {
                samples: n,
                folds: k,
            });
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut StdRng::seed_from_u64(self.seed));

        let base = n / k;
        let extra = n % k;
        let mut folds = Vec::with_capacity(k);
        let mut start = 0;
        for fold in 0..k {
            let size = base + usize::from(fold < extra);
            let stop = start + size;
            let test = order[start..stop].to_vec();
            let train = order[..start]
                .iter()
                .chain(&order[stop..])
                .copied()
                .collect();
            folds.push(Fold { train, test });
            start = stop;
        }
        Ok(folds)
    }
}
