pub mod comparison;
pub mod config;
pub mod data_source;
pub mod error;
pub mod features;
pub mod market_data;
pub mod metrics;
pub mod model_bank;
pub mod models;
pub mod persistence;
pub mod pipeline;
pub mod preprocess;
pub mod report;
