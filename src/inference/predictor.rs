//! Inference Predictor Module
//!
//! Runs a loaded tumor classifier on a prepared upload and turns the
//! softmax output into a `PredictionResult`.

use std::path::Path;
use std::time::{Duration, Instant};

use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::AnalysisBackend;
use crate::labels::{TumorClass, NUM_CLASSES};
use crate::model::{load_classifier_with, ModelKind, TumorClassifier};
use crate::preprocess::{prepare_upload, PreparedImage};
use crate::utils::error::{Result, ResultExt, TumorScanError};

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Model that produced the prediction
    pub model: ModelKind,

    /// Predicted class (argmax of the probabilities)
    pub predicted_class: TumorClass,

    /// Confidence score (probability) for the predicted class
    pub confidence: f32,

    /// Full probability distribution, in class index order
    pub probabilities: Vec<f32>,

    /// Inference time in milliseconds
    pub inference_time_ms: f64,
}

impl PredictionResult {
    /// Create a prediction result from a probability vector
    pub fn new(model: ModelKind, probabilities: Vec<f32>, inference_time: Duration) -> Result<Self> {
        if probabilities.len() != NUM_CLASSES {
            return Err(TumorScanError::Inference(format!(
                "expected {} probabilities, got {}",
                NUM_CLASSES,
                probabilities.len()
            )));
        }

        // First maximum wins on ties
        let mut best = 0;
        for (i, &p) in probabilities.iter().enumerate() {
            if p > probabilities[best] {
                best = i;
            }
        }

        let predicted_class = TumorClass::from_index(best).context("argmax out of range")?;

        Ok(Self {
            model,
            predicted_class,
            confidence: probabilities[best],
            probabilities,
            inference_time_ms: inference_time.as_secs_f64() * 1000.0,
        })
    }

    /// Index of the predicted class in the output layer
    pub fn class_index(&self) -> usize {
        self.predicted_class.index()
    }

    /// Probability of a class
    pub fn probability(&self, class: TumorClass) -> f32 {
        self.probabilities[class.index()]
    }

    /// Classes with their probabilities, most probable first
    ///
    /// Equal probabilities keep class order.
    pub fn ranked(&self) -> Vec<(TumorClass, f32)> {
        let mut ranked: Vec<(TumorClass, f32)> = TumorClass::ALL
            .iter()
            .map(|&class| (class, self.probability(class)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    /// Pretty print the prediction result
    pub fn display(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("Model: {}\n", self.model));
        output.push_str(&format!("Predicted Class: {}\n", self.predicted_class));
        output.push_str(&format!("Confidence: {:.4}%\n", self.confidence * 100.0));
        output.push_str(&format!("Inference time: {:.2} ms\n", self.inference_time_ms));

        output.push_str("\nPredictions:\n");
        for class in TumorClass::ALL {
            output.push_str(&format!("  {}: {:.4}\n", class, self.probability(class)));
        }

        output
    }
}

/// Predictor for running inference with a loaded classifier
///
/// The classifier lives on an autodiff backend so the same weights serve
/// both prediction (through `valid()`) and input-gradient saliency.
pub struct Predictor<B: AutodiffBackend = AnalysisBackend> {
    model: TumorClassifier<B>,
    device: B::Device,
}

impl<B: AutodiffBackend> Predictor<B> {
    /// Wrap a classifier; parameter gradients are disabled
    pub fn new(model: TumorClassifier<B>, device: B::Device) -> Self {
        Self {
            model: model.no_grad(),
            device,
        }
    }

    /// Load pretrained weights for a model kind
    ///
    /// `width_divisor` must match the one the record was created with.
    pub fn load(
        kind: ModelKind,
        width_divisor: usize,
        weights: impl AsRef<Path>,
        device: B::Device,
    ) -> Result<Self> {
        let model = load_classifier_with::<B>(kind, width_divisor, weights, &device)?;
        Ok(Self::new(model, device))
    }

    /// Which model this predictor runs
    pub fn kind(&self) -> ModelKind {
        self.model.kind()
    }

    /// Input size of the model
    pub fn input_size(&self) -> usize {
        self.model.input_size()
    }

    /// The wrapped classifier
    pub fn model(&self) -> &TumorClassifier<B> {
        &self.model
    }

    /// Device the classifier lives on
    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Validate and preprocess an upload for this model
    pub fn prepare(&self, bytes: &[u8], file_name: Option<&str>) -> Result<PreparedImage> {
        prepare_upload(bytes, file_name, self.input_size())
    }

    /// Predict the tumor class of a prepared image
    pub fn predict(&self, image: &PreparedImage) -> Result<PredictionResult> {
        if image.size != self.input_size() {
            return Err(TumorScanError::Inference(format!(
                "image prepared at {}x{} but {} expects {}x{}",
                image.size,
                image.size,
                self.kind(),
                self.input_size(),
                self.input_size()
            )));
        }

        let start = Instant::now();
        let model = self.model.valid();
        let input = image.to_tensor::<B::InnerBackend>(&self.device);
        let output = model.forward_softmax(input);

        let probabilities: Vec<f32> = output
            .into_data()
            .convert::<f32>()
            .to_vec()
            .context("Failed to extract probabilities")?;
        let inference_time = start.elapsed();

        let result = PredictionResult::new(self.kind(), probabilities, inference_time)?;
        debug!(
            "{} predicted {} ({:.2}%) in {:.1} ms",
            self.kind(),
            result.predicted_class,
            result.confidence * 100.0,
            result.inference_time_ms
        );

        Ok(result)
    }
}
