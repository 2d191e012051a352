//! Domain logic for per-series forecast retraining and scoring.
//!
//! Everything here is free of network access: configuration, dataset
//! slicing, deterministic naming, the reference and score stores, the
//! scoring payload builder, the prediction parser and backtest accuracy
//! checks. Remote calls live in `autocast-platform`.

pub mod accuracy;
pub mod config;
pub mod dataset;
pub mod error;
pub mod hashing;
pub mod naming;
pub mod parser;
pub mod payload;
pub mod reference;
pub mod scores;
pub mod types;
