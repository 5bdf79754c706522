//! Application state for the TumorScan server
//!
//! Holds the lazily loaded classifiers, the explainer and the saliency cache.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::OnceCell;
use tracing::info;

use tumorscan::backend::{default_device, AnalysisBackend};
use tumorscan::model::load_classifier_with;
use tumorscan::pipeline::DEFAULT_CACHE_CAPACITY;
use tumorscan::{Explainer, ModelKind, Predictor, SaliencyCache, TumorClassifier, TumorScanError};

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Weight record of the Xception classifier
    pub xception_weights: PathBuf,
    /// Weight record of the custom CNN
    pub cnn_weights: PathBuf,
    /// Channel divisor the weight records were created with
    pub width_divisor: usize,
    /// Maximum accepted request body in bytes
    pub max_upload_bytes: usize,
    /// Number of saliency maps kept in memory
    pub cache_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let weights_dir = PathBuf::from("weights");
        Self {
            xception_weights: weights_dir.join(ModelKind::Xception.default_weights_file()),
            cnn_weights: weights_dir.join(ModelKind::CustomCnn.default_weights_file()),
            width_divisor: 1,
            max_upload_bytes: 10 * 1024 * 1024,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Weight record path for a model kind
    pub fn weights_for(&self, kind: ModelKind) -> &PathBuf {
        match kind {
            ModelKind::Xception => &self.xception_weights,
            ModelKind::CustomCnn => &self.cnn_weights,
        }
    }
}

/// Shared application state
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// One lazily loaded classifier per kind
    ///
    /// Classifiers are `Send` but not `Sync`; the mutex is only held to clone one out.
    pub models: HashMap<ModelKind, OnceCell<Mutex<TumorClassifier<AnalysisBackend>>>>,
    /// Explanation service, if an API key was configured
    pub explainer: Option<Arc<dyn Explainer>>,
    /// Saliency maps of recent uploads
    pub saliency_cache: Arc<SaliencyCache>,
    /// Server start time
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig, explainer: Option<Arc<dyn Explainer>>) -> Self {
        let saliency_cache = Arc::new(SaliencyCache::new(config.cache_capacity));
        Self {
            config,
            models: ModelKind::ALL
                .into_iter()
                .map(|kind| (kind, OnceCell::new()))
                .collect(),
            explainer,
            saliency_cache,
            started_at: Instant::now(),
        }
    }

    /// Predictor for a model kind, loading its weights on first use
    ///
    /// Only requests for the same kind wait on a load in progress. A failed
    /// load is retried by the next request. Each call gets its own copy of
    /// the classifier.
    pub async fn predictor(&self, kind: ModelKind) -> Result<Predictor<AnalysisBackend>, TumorScanError> {
        let cell = self
            .models
            .get(&kind)
            .ok_or_else(|| TumorScanError::ModelLoad(format!("{} is not served", kind)))?;

        let model = cell
            .get_or_try_init(|| async move {
                let path = self.config.weights_for(kind).clone();
                let width_divisor = self.config.width_divisor;
                let start = Instant::now();

                let model = tokio::task::spawn_blocking(move || {
                    load_classifier_with::<AnalysisBackend>(kind, width_divisor, path, &default_device())
                })
                .await
                .map_err(|e| TumorScanError::ModelLoad(format!("loader task failed: {}", e)))??;

                info!("{} ready in {:.1} s", kind, start.elapsed().as_secs_f64());
                Ok::<_, TumorScanError>(Mutex::new(model))
            })
            .await?;

        let model = model.lock().unwrap_or_else(|e| e.into_inner()).clone();
        Ok(Predictor::new(model, default_device()))
    }

    /// Kinds whose weights are currently loaded
    pub fn loaded_models(&self) -> Vec<ModelKind> {
        ModelKind::ALL
            .into_iter()
            .filter(|kind| self.models.get(kind).is_some_and(OnceCell::initialized))
            .collect()
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use tumorscan::model::save_classifier;

    fn state_with_tiny_cnn(dir: &TempDir) -> AppState {
        let path = dir.path().join("cnn_model.mpk");
        let model =
            TumorClassifier::<AnalysisBackend>::init(ModelKind::CustomCnn, 64, &default_device())
                .unwrap();
        save_classifier(model, &path).unwrap();

        let config = ServerConfig {
            xception_weights: dir.path().join("missing.mpk"),
            cnn_weights: path,
            width_divisor: 64,
            ..ServerConfig::default()
        };
        AppState::new(config, None)
    }

    #[tokio::test]
    async fn test_models_load_lazily_per_kind() {
        let dir = TempDir::new().unwrap();
        let state = state_with_tiny_cnn(&dir);
        assert!(state.loaded_models().is_empty());

        let predictor = state.predictor(ModelKind::CustomCnn).await.unwrap();
        assert_eq!(predictor.kind(), ModelKind::CustomCnn);
        assert_eq!(state.loaded_models(), vec![ModelKind::CustomCnn]);

        // Second request reuses the loaded classifier
        state.predictor(ModelKind::CustomCnn).await.unwrap();
        assert_eq!(state.loaded_models(), vec![ModelKind::CustomCnn]);
    }

    #[tokio::test]
    async fn test_failed_load_leaves_kind_unloaded() {
        let dir = TempDir::new().unwrap();
        let state = state_with_tiny_cnn(&dir);

        let err = state.predictor(ModelKind::Xception).await.err().unwrap();
        assert!(matches!(err, TumorScanError::WeightsNotFound(_)));
        assert!(state.loaded_models().is_empty());
    }

    #[tokio::test]
    async fn test_loaded_models_does_not_wait_for_a_load() {
        let dir = TempDir::new().unwrap();
        let state = Arc::new(state_with_tiny_cnn(&dir));

        let loader = {
            let state = state.clone();
            tokio::spawn(async move { state.predictor(ModelKind::CustomCnn).await.map(|_| ()) })
        };
        // Synchronous read while the load may still be running
        let during = state.loaded_models();
        assert!(during.len() <= 1);

        loader.await.unwrap().unwrap();
        assert_eq!(state.loaded_models(), vec![ModelKind::CustomCnn]);
    }
}
