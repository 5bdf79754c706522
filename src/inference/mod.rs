//! Inference module for model prediction
//!
//! This module provides:
//! - Single image prediction on either classifier
//! - Ranked class probabilities for charts and reports

pub mod predictor;

// Re-export main types for convenience
pub use predictor::{PredictionResult, Predictor};
