//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

use tumorscan::report::render_upload_page;
use tumorscan::TumorScanError;

/// An error ready to be sent to the client
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    status: u16,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Render as the upload page with the message shown above the form
    pub fn into_html_response(self) -> Response {
        self.log();
        let page = render_upload_page(Some(&self.message));
        (self.status, Html(page)).into_response()
    }

    fn log(&self) {
        if self.status.is_server_error() {
            error!("{}: {}", self.status, self.message);
        } else {
            warn!("{}: {}", self.status, self.message);
        }
    }
}

impl From<TumorScanError> for AppError {
    fn from(err: TumorScanError) -> Self {
        let status = if err.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            match err {
                TumorScanError::WeightsNotFound(_)
                | TumorScanError::ModelLoad(_)
                | TumorScanError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();
        let body = ErrorBody {
            error: self.message,
            status: self.status.as_u16(),
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::from(TumorScanError::EmptyUpload).status, StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::from(TumorScanError::UnsupportedImageType("gif".into())).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::from(TumorScanError::WeightsNotFound(PathBuf::from("x.mpk"))).status,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::from(TumorScanError::Config("width divisor".into())).status,
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::from(TumorScanError::Saliency("nan".into())).status,
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
