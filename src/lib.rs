//! # TumorScan
//!
//! Brain MRI tumor classification using the Burn framework.
//!
//! An uploaded MRI scan is classified by one of two pretrained networks
//! (an Xception transfer-learning model or a plain CNN), a gradient-based
//! saliency overlay is rendered on top of the scan, and a hosted
//! generative model is asked to explain the overlay in plain language.
//!
//! ## Modules
//!
//! - `labels`: The four tumor categories
//! - `model`: Xception and custom CNN architectures built with Burn
//! - `preprocess`: Upload validation, decoding and tensor layout
//! - `inference`: Prediction on a loaded classifier
//! - `saliency`: Input-gradient saliency maps and heatmap overlays
//! - `explain`: Prompting the Gemini API for an explanation
//! - `report`: SVG probability chart and HTML pages
//! - `pipeline`: End-to-end analysis and the saliency cache
//! - `utils`: Logging and error handling
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tumorscan::model::{load_classifier, ModelKind};
//! use tumorscan::inference::Predictor;
//! use tumorscan::pipeline::analyze;
//!
//! let device = tumorscan::backend::default_device();
//! let model = load_classifier(ModelKind::Xception, "weights/xception_model.mpk", &device)?;
//! let predictor = Predictor::new(model, device);
//! let analysis = analyze(&predictor, &bytes, Some("scan.jpg"), None, None).await?;
//! ```

pub mod backend;
pub mod explain;
pub mod inference;
pub mod labels;
pub mod model;
pub mod pipeline;
pub mod preprocess;
pub mod report;
pub mod saliency;
pub mod utils;

// Re-export commonly used items for convenience
pub use explain::{Explainer, GeminiClient, GeminiConfig};
pub use inference::{PredictionResult, Predictor};
pub use labels::{TumorClass, NUM_CLASSES};
pub use model::{ModelKind, TumorClassifier};
pub use pipeline::{analyze, Analysis, SaliencyCache};
pub use preprocess::PreparedImage;
pub use saliency::SaliencyMap;
pub use utils::error::{Result, TumorScanError};

/// File types accepted for upload
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
