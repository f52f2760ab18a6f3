#![deny(dead_code)]
#![deny(unused_imports)]

pub mod discriminant;
pub mod logistic;
pub mod mlp;
pub mod model;
pub mod naive_bayes;
pub mod ridge;
pub mod roster;

pub use model::{Classifier, FeatureMatrix, ModelError, RankingScores, ScoreKind, ranking_scores};
pub use roster::{ModelKind, ModelSpec, default_roster};
