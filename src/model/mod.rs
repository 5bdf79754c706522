//! Model module for the tumor classifiers
//!
//! This module provides:
//! - The Xception transfer-learning classifier
//! - The custom CNN classifier
//! - `TumorClassifier`, which dispatches over both
//! - Loading and saving weight records
//!
//! Weight records use Burn's compact (half precision MessagePack) format.

pub mod cnn;
pub mod config;
pub mod norm;
pub mod xception;

use std::path::{Path, PathBuf};

use burn::{
    config::{Config, ConfigError},
    module::{AutodiffModule, Module},
    record::CompactRecorder,
    tensor::{
        activation::softmax,
        backend::{AutodiffBackend, Backend},
        Tensor,
    },
};
use tracing::{debug, info};

pub use cnn::CustomCnn;
pub use config::{ClassifierConfig, CustomCnnConfig, ModelKind, XceptionConfig};
pub use xception::XceptionClassifier;

use crate::utils::error::{Result, TumorScanError};

/// File extension written by the compact recorder
pub const WEIGHTS_EXTENSION: &str = "mpk";

/// File extension of the architecture saved next to a record
pub const CONFIG_EXTENSION: &str = "json";

/// One of the two tumor classifiers
#[derive(Debug, Clone)]
pub enum TumorClassifier<B: Backend> {
    Xception(XceptionClassifier<B>),
    CustomCnn(CustomCnn<B>),
}

impl<B: Backend> TumorClassifier<B> {
    /// Build a freshly initialized classifier of the given kind
    ///
    /// `width_divisor` shrinks every channel count; use 1 for the real
    /// architecture.
    pub fn init(kind: ModelKind, width_divisor: usize, device: &B::Device) -> Result<Self> {
        Self::from_config(&ClassifierConfig::for_kind(kind, width_divisor), device)
    }

    /// Build a freshly initialized classifier from a validated configuration
    pub fn from_config(config: &ClassifierConfig, device: &B::Device) -> Result<Self> {
        config.validate()?;
        Ok(match config {
            ClassifierConfig::Xception(c) => {
                TumorClassifier::Xception(XceptionClassifier::new(c, device))
            }
            ClassifierConfig::CustomCnn(c) => TumorClassifier::CustomCnn(CustomCnn::new(c, device)),
        })
    }

    /// Configuration this classifier was built from
    pub fn config(&self) -> ClassifierConfig {
        match self {
            TumorClassifier::Xception(m) => ClassifierConfig::Xception(m.config().clone()),
            TumorClassifier::CustomCnn(m) => ClassifierConfig::CustomCnn(m.config().clone()),
        }
    }

    /// Which architecture this is
    pub fn kind(&self) -> ModelKind {
        match self {
            TumorClassifier::Xception(_) => ModelKind::Xception,
            TumorClassifier::CustomCnn(_) => ModelKind::CustomCnn,
        }
    }

    /// Expected input size (square)
    pub fn input_size(&self) -> usize {
        match self {
            TumorClassifier::Xception(m) => m.input_size(),
            TumorClassifier::CustomCnn(m) => m.input_size(),
        }
    }

    /// Number of output classes
    pub fn num_classes(&self) -> usize {
        match self {
            TumorClassifier::Xception(m) => m.num_classes(),
            TumorClassifier::CustomCnn(m) => m.num_classes(),
        }
    }

    /// Logits of shape [batch_size, num_classes]
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        match self {
            TumorClassifier::Xception(m) => m.forward(x),
            TumorClassifier::CustomCnn(m) => m.forward(x),
        }
    }

    /// Class probabilities of shape [batch_size, num_classes]
    pub fn forward_softmax(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(x), 1)
    }

    /// Stop tracking gradients for the parameters
    pub fn no_grad(self) -> Self {
        match self {
            TumorClassifier::Xception(m) => TumorClassifier::Xception(m.no_grad()),
            TumorClassifier::CustomCnn(m) => TumorClassifier::CustomCnn(m.no_grad()),
        }
    }

    /// Number of parameters
    pub fn num_params(&self) -> usize {
        match self {
            TumorClassifier::Xception(m) => m.num_params(),
            TumorClassifier::CustomCnn(m) => m.num_params(),
        }
    }

    /// Load a weight record into this classifier
    pub fn load_file(self, path: &Path, device: &B::Device) -> Result<Self> {
        let recorder = CompactRecorder::new();
        let model = match self {
            TumorClassifier::Xception(m) => TumorClassifier::Xception(
                m.load_file(path.to_path_buf(), &recorder, device)
                    .map_err(|e| TumorScanError::ModelLoad(format!("{:?}", e)))?,
            ),
            TumorClassifier::CustomCnn(m) => TumorClassifier::CustomCnn(
                m.load_file(path.to_path_buf(), &recorder, device)
                    .map_err(|e| TumorScanError::ModelLoad(format!("{:?}", e)))?,
            ),
        };
        Ok(model)
    }

    /// Save this classifier's weights as a record
    pub fn save_file(self, path: &Path) -> Result<()> {
        let recorder = CompactRecorder::new();
        match self {
            TumorClassifier::Xception(m) => m.save_file(path.to_path_buf(), &recorder),
            TumorClassifier::CustomCnn(m) => m.save_file(path.to_path_buf(), &recorder),
        }
        .map_err(|e| TumorScanError::ModelLoad(format!("{:?}", e)))
    }
}

impl<B: AutodiffBackend> TumorClassifier<B> {
    /// The same classifier on the inner (non-autodiff) backend
    pub fn valid(&self) -> TumorClassifier<B::InnerBackend> {
        match self {
            TumorClassifier::Xception(m) => TumorClassifier::Xception(m.valid()),
            TumorClassifier::CustomCnn(m) => TumorClassifier::CustomCnn(m.valid()),
        }
    }
}

/// Path the recorder actually reads for `path`
pub fn record_path(path: &Path) -> PathBuf {
    path.with_extension(WEIGHTS_EXTENSION)
}

/// Path of the architecture JSON saved next to the record for `path`
pub fn config_path(path: &Path) -> PathBuf {
    path.with_extension(CONFIG_EXTENSION)
}

/// Build a full-width classifier with freshly initialized weights
pub fn init_classifier<B: Backend>(kind: ModelKind, device: &B::Device) -> Result<TumorClassifier<B>> {
    TumorClassifier::init(kind, 1, device)
}

/// Load a pretrained classifier from a weight record
///
/// # Errors
/// * `WeightsNotFound` if no record exists at `path`
/// * `Config` if the saved architecture does not match `kind`
/// * `ModelLoad` if the record does not match the architecture
pub fn load_classifier<B: Backend>(
    kind: ModelKind,
    path: impl AsRef<Path>,
    device: &B::Device,
) -> Result<TumorClassifier<B>> {
    load_classifier_with(kind, 1, path, device)
}

/// Load a classifier whose channel counts were shrunk by `width_divisor`
///
/// When an architecture JSON sits next to the record it is used to build
/// the classifier, after checking it against `kind` and `width_divisor`.
pub fn load_classifier_with<B: Backend>(
    kind: ModelKind,
    width_divisor: usize,
    path: impl AsRef<Path>,
    device: &B::Device,
) -> Result<TumorClassifier<B>> {
    let path = path.as_ref();
    let record = record_path(path);
    if !record.exists() {
        return Err(TumorScanError::WeightsNotFound(record));
    }

    let config = match read_classifier_config(path)? {
        Some(saved) => {
            check_saved_config(&saved, kind, width_divisor)?;
            saved
        }
        None => ClassifierConfig::for_kind(kind, width_divisor),
    };

    info!("Loading {} weights from {:?}", kind, record);
    let model = TumorClassifier::from_config(&config, device)?.load_file(path, device)?;
    debug!("{} loaded with {} parameters", kind, model.num_params());

    Ok(model)
}

fn read_classifier_config(path: &Path) -> Result<Option<ClassifierConfig>> {
    let file = config_path(path);
    if !file.exists() {
        return Ok(None);
    }

    debug!("Reading architecture from {:?}", file);
    ClassifierConfig::load(&file).map(Some).map_err(|e| match e {
        ConfigError::InvalidFormat(message) => TumorScanError::Serialization(format!(
            "{}: {}",
            file.display(),
            message
        )),
        other => TumorScanError::Config(other.to_string()),
    })
}

fn check_saved_config(saved: &ClassifierConfig, kind: ModelKind, width_divisor: usize) -> Result<()> {
    if saved.kind() != kind {
        return Err(TumorScanError::Config(format!(
            "record holds a {} but {} was requested",
            saved.kind(),
            kind
        )));
    }
    if saved.width_divisor() != width_divisor {
        return Err(TumorScanError::Config(format!(
            "record was built with width divisor {} but {} was requested",
            saved.width_divisor(),
            width_divisor
        )));
    }
    Ok(())
}

/// Save a classifier and its architecture, creating the parent directory if needed
pub fn save_classifier<B: Backend>(model: TumorClassifier<B>, path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let kind = model.kind();
    model.config().save(config_path(path))?;
    model.save_file(path)?;
    let record = record_path(path);
    info!("Saved {} weights to {:?}", kind, record);

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;
    use tempfile::TempDir;

    type TestBackend = NdArray;

    #[test]
    fn test_missing_weights_is_typed_error() {
        let device = Default::default();
        let result = load_classifier::<TestBackend>(
            ModelKind::CustomCnn,
            "/nonexistent/cnn_model.mpk",
            &device,
        );

        assert!(matches!(result, Err(TumorScanError::WeightsNotFound(_))));
    }

    #[test]
    fn test_save_and_load_record() {
        let device = Default::default();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("weights").join("cnn_model.mpk");

        let model = TumorClassifier::<TestBackend>::init(ModelKind::CustomCnn, 64, &device).unwrap();
        let params = model.num_params();
        let record = save_classifier(model, &path).unwrap();
        assert!(record.exists());

        let loaded =
            load_classifier_with::<TestBackend>(ModelKind::CustomCnn, 64, &path, &device).unwrap();
        assert_eq!(loaded.kind(), ModelKind::CustomCnn);
        assert_eq!(loaded.num_params(), params);
        assert_eq!(loaded.input_size(), 224);
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let device = Default::default();
        let model = TumorClassifier::<TestBackend>::init(ModelKind::CustomCnn, 64, &device).unwrap();

        let input = Tensor::<TestBackend, 4>::ones([1, 3, 224, 224], &device);
        let probs: Vec<f32> = model.forward_softmax(input).into_data().to_vec().unwrap();

        assert_eq!(probs.len(), 4);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_full_width_cnn_parameter_count() {
        let device = Default::default();
        let model = init_classifier::<TestBackend>(ModelKind::CustomCnn, &device).unwrap();

        // convs: 14_336 + 1_179_904 + 295_040 + 73_792, dense: 3_211_520 + 1_028
        assert_eq!(model.num_params(), 4_775_620);
    }

    #[test]
    fn test_valid_keeps_kind() {
        let device = Default::default();
        let model = TumorClassifier::<Autodiff<TestBackend>>::init(ModelKind::CustomCnn, 64, &device).unwrap();
        assert_eq!(model.valid().kind(), ModelKind::CustomCnn);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let device = Default::default();
        assert!(matches!(
            TumorClassifier::<TestBackend>::init(ModelKind::CustomCnn, 0, &device),
            Err(TumorScanError::Config(_))
        ));

        let config = ClassifierConfig::Xception(XceptionConfig::new().with_input_size(32));
        assert!(matches!(
            TumorClassifier::<TestBackend>::from_config(&config, &device),
            Err(TumorScanError::Config(_))
        ));
    }

    #[test]
    fn test_saved_config_is_checked_on_load() {
        let device = Default::default();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cnn_model.mpk");

        let model = TumorClassifier::<TestBackend>::init(ModelKind::CustomCnn, 64, &device).unwrap();
        save_classifier(model, &path).unwrap();
        assert!(config_path(&path).exists());

        // Wrong divisor is reported before the record is read
        let result = load_classifier_with::<TestBackend>(ModelKind::CustomCnn, 32, &path, &device);
        assert!(matches!(result, Err(TumorScanError::Config(_))));

        // The record file name does not decide the kind
        let result = load_classifier_with::<TestBackend>(ModelKind::Xception, 64, &path, &device);
        assert!(matches!(result, Err(TumorScanError::Config(_))));
    }

    #[test]
    fn test_corrupt_config_is_serialization_error() {
        let device = Default::default();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cnn_model.mpk");

        let model = TumorClassifier::<TestBackend>::init(ModelKind::CustomCnn, 64, &device).unwrap();
        save_classifier(model, &path).unwrap();
        std::fs::write(config_path(&path), "{ not json").unwrap();

        let result = load_classifier_with::<TestBackend>(ModelKind::CustomCnn, 64, &path, &device);
        assert!(matches!(result, Err(TumorScanError::Serialization(_))));
    }

    #[test]
    fn test_record_without_config_uses_requested_architecture() {
        let device = Default::default();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cnn_model.mpk");

        let model = TumorClassifier::<TestBackend>::init(ModelKind::CustomCnn, 64, &device).unwrap();
        save_classifier(model, &path).unwrap();
        std::fs::remove_file(config_path(&path)).unwrap();

        let loaded =
            load_classifier_with::<TestBackend>(ModelKind::CustomCnn, 64, &path, &device).unwrap();
        assert_eq!(loaded.config(), ClassifierConfig::for_kind(ModelKind::CustomCnn, 64));
    }

    #[test]
    fn test_batch_norm_frozen_under_autodiff() {
        let device = Default::default();
        let config = ClassifierConfig::Xception(
            XceptionConfig::new()
                .with_input_size(71)
                .with_middle_blocks(1)
                .with_width_divisor(16),
        );
        let model = TumorClassifier::<Autodiff<TestBackend>>::from_config(&config, &device).unwrap();

        let input = Tensor::<Autodiff<TestBackend>, 4>::random(
            [2, 3, 71, 71],
            Distribution::Uniform(0.0, 1.0),
            &device,
        );
        let tracked: Vec<f32> = model.forward_softmax(input.clone()).into_data().to_vec().unwrap();
        let valid: Vec<f32> = model
            .valid()
            .forward_softmax(input.clone().inner())
            .into_data()
            .to_vec()
            .unwrap();
        for (a, b) in tracked.iter().zip(valid.iter()) {
            assert!((a - b).abs() < 1e-6);
        }

        // Each row only depends on its own image
        let single: Vec<f32> = model
            .valid()
            .forward_softmax(input.inner().slice([0..1, 0..3, 0..71, 0..71]))
            .into_data()
            .to_vec()
            .unwrap();
        for (a, b) in single.iter().zip(valid.iter().take(4)) {
            assert!((a - b).abs() < 1e-6);
        }
    }
}
