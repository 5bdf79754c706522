//! Classification endpoints - HTML results page and JSON API

use axum::{
    extract::{Multipart, State},
    response::{Html, IntoResponse, Response},
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use tumorscan::pipeline::{analyze_image, explain_analysis, Analysis};
use tumorscan::report::render_results_page;
use tumorscan::{ModelKind, TumorClass, TumorScanError};

use crate::error::AppError;
use crate::state::SharedState;

/// A parsed upload form
#[derive(Debug)]
pub struct Upload {
    pub file_name: Option<String>,
    pub bytes: Vec<u8>,
    pub model: ModelKind,
}

/// One row of the ranked probabilities
#[derive(Debug, Serialize)]
pub struct ClassProbability {
    pub class: TumorClass,
    pub label: String,
    pub probability: f32,
}

/// Response of POST /api/classify
#[derive(Debug, Serialize)]
pub struct ClassifyResponse {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub model: ModelKind,
    pub model_label: String,
    pub predicted_class: TumorClass,
    pub predicted_label: String,
    pub confidence: f32,
    /// Most probable first
    pub probabilities: Vec<ClassProbability>,
    pub inference_time_ms: f64,
    /// Saliency overlay, base64 PNG
    pub saliency_png: String,
    pub saliency_cached: bool,
    pub explanation: Option<String>,
    pub explanation_error: Option<String>,
}

impl ClassifyResponse {
    fn from_analysis(analysis: Analysis) -> Result<Self, AppError> {
        let png = analysis.saliency.to_png()?;
        let prediction = analysis.prediction;

        Ok(Self {
            request_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            model: prediction.model,
            model_label: prediction.model.label().to_string(),
            predicted_class: prediction.predicted_class,
            predicted_label: prediction.predicted_class.label().to_string(),
            confidence: prediction.confidence,
            probabilities: prediction
                .ranked()
                .into_iter()
                .map(|(class, probability)| ClassProbability {
                    class,
                    label: class.label().to_string(),
                    probability,
                })
                .collect(),
            inference_time_ms: prediction.inference_time_ms,
            saliency_png: STANDARD.encode(png),
            saliency_cached: analysis.saliency_cached,
            explanation: analysis.explanation,
            explanation_error: analysis.explanation_error,
        })
    }
}

/// Read the `file` and `model` fields of an upload form
///
/// The model defaults to Xception when the field is missing.
pub async fn read_upload(mut multipart: Multipart) -> Result<Upload, AppError> {
    let mut file = None;
    let mut model = ModelKind::Xception;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::new(e.status(), e.body_text()))?
    {
        match field.name() {
            Some("file") => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::new(e.status(), e.body_text()))?;
                file = Some((file_name, bytes.to_vec()));
            }
            Some("model") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::new(e.status(), e.body_text()))?;
                model = ModelKind::from_key(&value)
                    .ok_or_else(|| AppError::bad_request(format!("Unknown model '{}'", value.trim())))?;
            }
            other => debug!("Ignoring form field {:?}", other),
        }
    }

    let (file_name, bytes) = file.ok_or_else(|| AppError::bad_request("No file uploaded"))?;
    Ok(Upload {
        file_name,
        bytes,
        model,
    })
}

/// Run the full analysis of an upload
///
/// Model work runs on a blocking thread. A missing or failing explainer
/// leaves a reason in `explanation_error` instead of failing the request.
pub async fn run_analysis(state: &SharedState, upload: &Upload) -> Result<Analysis, AppError> {
    let predictor = state.predictor(upload.model).await?;
    let cache = state.saliency_cache.clone();
    let bytes = upload.bytes.clone();
    let file_name = upload.file_name.clone();

    let mut analysis = tokio::task::spawn_blocking(move || {
        analyze_image(&predictor, &bytes, file_name.as_deref(), Some(cache.as_ref()))
    })
    .await
    .map_err(|e| AppError::internal(format!("analysis task failed: {}", e)))??;

    match &state.explainer {
        Some(explainer) => explain_analysis(&mut analysis, explainer.as_ref()).await,
        None => {
            analysis.explanation_error = Some(TumorScanError::ExplainerNotConfigured.to_string())
        }
    }

    info!(
        "Classified {} as {} with {}",
        upload.file_name.as_deref().unwrap_or("upload"),
        analysis.prediction.predicted_class,
        upload.model
    );

    Ok(analysis)
}

/// POST /classify - Classify an upload and render the results page
pub async fn classify_page(State(state): State<SharedState>, multipart: Multipart) -> Response {
    let result = async {
        let upload = read_upload(multipart).await?;
        let analysis = run_analysis(&state, &upload).await?;
        Ok::<_, AppError>(render_results_page(&analysis, &upload.bytes)?)
    }
    .await;

    match result {
        Ok(page) => Html(page).into_response(),
        Err(e) => e.into_html_response(),
    }
}

/// POST /api/classify - Classify an upload and return JSON
pub async fn classify_api(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<Json<ClassifyResponse>, AppError> {
    let upload = read_upload(multipart).await?;
    let analysis = run_analysis(&state, &upload).await?;
    Ok(Json(ClassifyResponse::from_analysis(analysis)?))
}
