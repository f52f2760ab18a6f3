#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

//! Cross-validated comparison of binary classifiers on gene-expression
//! cohorts, with external validation on independent cohorts.

pub mod config;
pub mod crossval;
pub mod evaluate;
pub mod metrics;
pub mod pipeline;
pub mod plot;
pub mod report;

#[path = "../classify/lib.rs"]
pub mod classify;

#[path = "../cohort/mod.rs"]
pub mod cohort;
