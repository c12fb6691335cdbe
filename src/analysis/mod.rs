//! Statistics primitives and baseline modeling over cost time series.

pub mod baseline;
pub mod stats;

pub use baseline::{
    establish_baseline, BaselineAnalysis, BaselineConfig, BaselineModel, BaselineModeler, ModelType,
};
