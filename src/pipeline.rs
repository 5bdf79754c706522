//! Analysis Pipeline
//!
//! preprocess -> predict -> saliency -> explain, shared by the CLI and the
//! server. The model half is synchronous so callers can move it onto a
//! blocking thread; the explanation half is async.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use burn::tensor::backend::AutodiffBackend;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::explain::Explainer;
use crate::inference::{PredictionResult, Predictor};
use crate::model::ModelKind;
use crate::saliency::{generate_saliency, SaliencyMap};
use crate::utils::error::Result;
use crate::utils::logging::StageTimer;

/// Default number of saliency maps kept in memory
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Everything produced for one uploaded scan
#[derive(Debug, Clone)]
pub struct Analysis {
    pub prediction: PredictionResult,
    pub saliency: SaliencyMap,
    /// Generated explanation, if one was requested and succeeded
    pub explanation: Option<String>,
    /// Why the explanation is missing, if it was requested and failed
    pub explanation_error: Option<String>,
    /// Whether the saliency map came from the cache
    pub saliency_cached: bool,
}

/// Key of a cached saliency map
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CacheKey {
    pub model: ModelKind,
    /// Hex SHA-256 of the uploaded bytes
    pub digest: String,
    pub class_index: usize,
}

impl CacheKey {
    pub fn new(model: ModelKind, bytes: &[u8], class_index: usize) -> Self {
        Self {
            model,
            digest: hex::encode(Sha256::digest(bytes)),
            class_index,
        }
    }
}

#[derive(Default)]
struct CacheEntries {
    maps: HashMap<CacheKey, SaliencyMap>,
    order: VecDeque<CacheKey>,
}

/// Bounded saliency map cache, oldest entry evicted first
///
/// A capacity of zero disables caching.
pub struct SaliencyCache {
    capacity: usize,
    entries: Mutex<CacheEntries>,
}

impl SaliencyCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(CacheEntries::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, CacheEntries> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, key: &CacheKey) -> Option<SaliencyMap> {
        self.entries().maps.get(key).cloned()
    }

    pub fn insert(&self, key: CacheKey, map: SaliencyMap) {
        if self.capacity == 0 {
            return;
        }

        let mut entries = self.entries();
        if entries.maps.insert(key.clone(), map).is_some() {
            return;
        }
        entries.order.push_back(key);

        while entries.order.len() > self.capacity {
            if let Some(oldest) = entries.order.pop_front() {
                entries.maps.remove(&oldest);
                debug!("Evicted saliency map {}", &oldest.digest[..12]);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries().maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SaliencyCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

/// Preprocess, predict and compute the saliency map of an upload
///
/// Runs entirely on the calling thread. The explanation fields of the
/// returned analysis are empty.
pub fn analyze_image<B: AutodiffBackend>(
    predictor: &Predictor<B>,
    bytes: &[u8],
    file_name: Option<&str>,
    cache: Option<&SaliencyCache>,
) -> Result<Analysis> {
    let mut timer = StageTimer::new(&format!("Analysis ({})", predictor.kind().key()));

    let image = predictor.prepare(bytes, file_name)?;
    timer.stage("preprocess");
    let prediction = predictor.predict(&image)?;
    timer.stage("predict");
    let class_index = prediction.class_index();

    let key = CacheKey::new(predictor.kind(), bytes, class_index);
    let cached = cache.and_then(|c| c.get(&key));
    let saliency_cached = cached.is_some();

    let saliency = match cached {
        Some(map) => {
            debug!("Saliency cache hit for {}", &key.digest[..12]);
            map
        }
        None => {
            let map = generate_saliency(predictor, &image, class_index)?;
            timer.stage("saliency");
            if let Some(cache) = cache {
                cache.insert(key, map.clone());
            }
            map
        }
    };

    info!(
        "{}: {} ({:.2}%)",
        predictor.kind(),
        prediction.predicted_class,
        prediction.confidence * 100.0
    );
    timer.finish();

    Ok(Analysis {
        prediction,
        saliency,
        explanation: None,
        explanation_error: None,
        saliency_cached,
    })
}

/// Ask an explainer about an analysis, recording failures instead of returning them
pub async fn explain_analysis(analysis: &mut Analysis, explainer: &dyn Explainer) {
    let png = match analysis.saliency.to_png() {
        Ok(png) => png,
        Err(e) => {
            warn!("Could not encode saliency map for explanation: {}", e);
            analysis.explanation_error = Some(e.to_string());
            return;
        }
    };

    let prediction = &analysis.prediction;
    match explainer
        .explain(&png, prediction.predicted_class.label(), prediction.confidence)
        .await
    {
        Ok(text) => analysis.explanation = Some(text),
        Err(e) => {
            warn!("Explanation failed: {}", e);
            analysis.explanation_error = Some(e.to_string());
        }
    }
}

/// Run the full analysis of an upload
///
/// A failed explanation does not fail the analysis; the reason is kept in
/// `Analysis::explanation_error`.
pub async fn analyze<B: AutodiffBackend>(
    predictor: &Predictor<B>,
    bytes: &[u8],
    file_name: Option<&str>,
    explainer: Option<&dyn Explainer>,
    cache: Option<&SaliencyCache>,
) -> Result<Analysis> {
    let mut analysis = analyze_image(predictor, bytes, file_name, cache)?;
    if let Some(explainer) = explainer {
        explain_analysis(&mut analysis, explainer).await;
    }
    Ok(analysis)
}
