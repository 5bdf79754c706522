//! Model Configuration Module
//!
//! Architecture hyperparameters for both classifiers and the `ModelKind`
//! selector the UI and CLI switch on.

use burn::config::Config;
use serde::{Deserialize, Serialize};

use crate::labels::NUM_CLASSES;
use crate::utils::error::TumorScanError;

/// Which pretrained classifier to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    /// Xception backbone with a dense classification head
    #[value(name = "xception")]
    Xception,
    /// Plain four-block CNN
    #[value(name = "cnn")]
    CustomCnn,
}

impl ModelKind {
    /// Both kinds, in the order they are offered to the user
    pub const ALL: [ModelKind; 2] = [ModelKind::Xception, ModelKind::CustomCnn];

    /// Label shown in the model selector
    pub fn label(self) -> &'static str {
        match self {
            ModelKind::Xception => "Transfer Learning - Xception",
            ModelKind::CustomCnn => "Custom CNN",
        }
    }

    /// Form/query value identifying this kind
    pub fn key(self) -> &'static str {
        match self {
            ModelKind::Xception => "xception",
            ModelKind::CustomCnn => "cnn",
        }
    }

    /// Parse a form/query value
    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_lowercase().as_str() {
            "xception" | "transfer" | "transfer-learning" => Some(ModelKind::Xception),
            "cnn" | "custom" | "custom_cnn" | "custom-cnn" => Some(ModelKind::CustomCnn),
            _ => None,
        }
    }

    /// Square input size the network expects
    pub fn input_size(self) -> usize {
        match self {
            ModelKind::Xception => 299,
            ModelKind::CustomCnn => 224,
        }
    }

    /// Default weight record file name
    pub fn default_weights_file(self) -> &'static str {
        match self {
            ModelKind::Xception => "xception_model.mpk",
            ModelKind::CustomCnn => "cnn_model.mpk",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Scale a channel count down by a divisor, never below one channel
pub fn scaled(channels: usize, divisor: usize) -> usize {
    (channels / divisor.max(1)).max(1)
}

/// Configuration for the Xception transfer-learning classifier
#[derive(Config, Debug, PartialEq)]
pub struct XceptionConfig {
    /// Number of output classes
    #[config(default = "4")]
    pub num_classes: usize,

    /// Input image size (square)
    #[config(default = "299")]
    pub input_size: usize,

    /// Number of residual blocks in the middle flow
    #[config(default = "8")]
    pub middle_blocks: usize,

    /// Units in the hidden dense layer of the head
    #[config(default = "128")]
    pub dense_units: usize,

    /// Divides every backbone channel count (1 = full size)
    #[config(default = "1")]
    pub width_divisor: usize,

    /// Epsilon of the frozen batch norm layers
    #[config(default = "1e-3")]
    pub bn_epsilon: f64,
}

impl XceptionConfig {
    /// Validate the configuration
    pub fn validate(&self) -> crate::utils::error::Result<()> {
        if self.num_classes == 0 {
            return Err(invalid("num_classes must be greater than 0"));
        }
        if self.input_size < 71 {
            return Err(invalid("Xception needs an input of at least 71x71"));
        }
        if self.middle_blocks == 0 || self.dense_units == 0 {
            return Err(invalid("middle_blocks and dense_units must be greater than 0"));
        }
        if self.width_divisor == 0 {
            return Err(invalid("width_divisor must be greater than 0"));
        }
        Ok(())
    }

    /// Channel count of the backbone output
    pub fn feature_channels(&self) -> usize {
        scaled(2048, self.width_divisor)
    }
}

/// Configuration for the custom CNN classifier
#[derive(Config, Debug, PartialEq)]
pub struct CustomCnnConfig {
    /// Number of output classes
    #[config(default = "4")]
    pub num_classes: usize,

    /// Input image size (square)
    #[config(default = "224")]
    pub input_size: usize,

    /// Units in the hidden dense layer
    #[config(default = "256")]
    pub dense_units: usize,

    /// Divides every convolution's filter count (1 = full size)
    #[config(default = "1")]
    pub width_divisor: usize,
}

impl CustomCnnConfig {
    /// Filters of the four convolution blocks
    pub fn filters(&self) -> [usize; 4] {
        [512, 256, 128, 64].map(|f| scaled(f, self.width_divisor))
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::utils::error::Result<()> {
        if self.num_classes == 0 {
            return Err(invalid("num_classes must be greater than 0"));
        }
        if self.input_size < 16 {
            return Err(invalid("input_size must be at least 16 for four pooling stages"));
        }
        if self.dense_units == 0 {
            return Err(invalid("dense_units must be greater than 0"));
        }
        if self.width_divisor == 0 {
            return Err(invalid("width_divisor must be greater than 0"));
        }
        Ok(())
    }

    /// Number of features after flattening the last block
    pub fn flatten_features(&self) -> usize {
        let mut size = self.input_size;
        for _ in 0..4 {
            size /= 2; // MaxPool2d with kernel 2, stride 2
        }
        size * size * self.filters()[3]
    }
}

fn invalid(message: &str) -> TumorScanError {
    TumorScanError::Config(message.to_string())
}

/// Architecture of either classifier
///
/// Saved as JSON next to each weight record so a record can be checked
/// against the architecture it is loaded into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierConfig {
    Xception(XceptionConfig),
    CustomCnn(CustomCnnConfig),
}

impl Config for ClassifierConfig {}

impl ClassifierConfig {
    /// Default architecture of `kind`, shrunk by `width_divisor`
    pub fn for_kind(kind: ModelKind, width_divisor: usize) -> Self {
        match kind {
            ModelKind::Xception => ClassifierConfig::Xception(default_xception(width_divisor)),
            ModelKind::CustomCnn => ClassifierConfig::CustomCnn(default_cnn(width_divisor)),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            ClassifierConfig::Xception(_) => ModelKind::Xception,
            ClassifierConfig::CustomCnn(_) => ModelKind::CustomCnn,
        }
    }

    pub fn width_divisor(&self) -> usize {
        match self {
            ClassifierConfig::Xception(c) => c.width_divisor,
            ClassifierConfig::CustomCnn(c) => c.width_divisor,
        }
    }

    pub fn validate(&self) -> crate::utils::error::Result<()> {
        match self {
            ClassifierConfig::Xception(c) => c.validate(),
            ClassifierConfig::CustomCnn(c) => c.validate(),
        }
    }
}

/// Default Xception config, shrunk by `width_divisor`
pub fn default_xception(width_divisor: usize) -> XceptionConfig {
    XceptionConfig::new()
        .with_num_classes(NUM_CLASSES)
        .with_width_divisor(width_divisor)
}

/// Default custom CNN config, shrunk by `width_divisor`
pub fn default_cnn(width_divisor: usize) -> CustomCnnConfig {
    CustomCnnConfig::new()
        .with_num_classes(NUM_CLASSES)
        .with_width_divisor(width_divisor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_kind_keys() {
        for kind in ModelKind::ALL {
            assert_eq!(ModelKind::from_key(kind.key()), Some(kind));
        }
        assert_eq!(ModelKind::from_key(" CNN "), Some(ModelKind::CustomCnn));
        assert_eq!(ModelKind::from_key("resnet"), None);
    }

    #[test]
    fn test_input_sizes() {
        assert_eq!(ModelKind::Xception.input_size(), 299);
        assert_eq!(ModelKind::CustomCnn.input_size(), 224);
    }

    #[test]
    fn test_xception_config_default() {
        let config = XceptionConfig::new();
        assert_eq!(config.num_classes, 4);
        assert_eq!(config.middle_blocks, 8);
        assert_eq!(config.feature_channels(), 2048);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_xception_config_validation() {
        assert!(XceptionConfig::new().with_input_size(64).validate().is_err());
        assert!(XceptionConfig::new().with_num_classes(0).validate().is_err());
        assert!(XceptionConfig::new().with_width_divisor(0).validate().is_err());
    }

    #[test]
    fn test_cnn_config_validation() {
        assert!(CustomCnnConfig::new().validate().is_ok());
        assert!(matches!(
            CustomCnnConfig::new().with_input_size(8).validate(),
            Err(TumorScanError::Config(_))
        ));
        assert!(CustomCnnConfig::new().with_dense_units(0).validate().is_err());
    }

    #[test]
    fn test_classifier_config_json_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("cnn_model.json");

        let config = ClassifierConfig::for_kind(ModelKind::CustomCnn, 16);
        config.save(&path).unwrap();
        let loaded = ClassifierConfig::load(&path).unwrap();

        assert_eq!(loaded, config);
        assert_eq!(loaded.kind(), ModelKind::CustomCnn);
        assert_eq!(loaded.width_divisor(), 16);

        let json = std::fs::read_to_string(&path).unwrap();
        assert!(json.contains("\"kind\": \"custom_cnn\"") || json.contains("\"kind\":\"custom_cnn\""));
    }

    #[test]
    fn test_cnn_flatten_features() {
        // 224 -> 112 -> 56 -> 28 -> 14, final: 14 * 14 * 64
        let config = CustomCnnConfig::new();
        assert_eq!(config.flatten_features(), 14 * 14 * 64);

        let small = CustomCnnConfig::new().with_input_size(32).with_width_divisor(32);
        assert_eq!(small.filters(), [16, 8, 4, 2]);
        assert_eq!(small.flatten_features(), 2 * 2 * 2);
    }

    #[test]
    fn test_scaled_never_zero() {
        assert_eq!(scaled(64, 128), 1);
        assert_eq!(scaled(728, 8), 91);
        assert_eq!(scaled(32, 0), 32);
    }
}
