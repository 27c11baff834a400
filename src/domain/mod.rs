//! Core domain types and the performance pipeline.

pub mod config_validation;
pub mod engine;
pub mod error;
pub mod instant;
pub mod order;
pub mod performance;
pub mod price_matrix;
pub mod quality;
pub mod returns;
pub mod series;
pub mod timeline;
pub mod window;
