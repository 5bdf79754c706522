//! TumorScan Server
//!
//! Web UI and HTTP API for brain MRI tumor classification. Serves an upload
//! page, renders results with a saliency overlay and a probability chart, and
//! exposes the same analysis as JSON.

mod error;
mod routes;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use tumorscan::explain::{GeminiClient, GeminiConfig};
use tumorscan::pipeline::DEFAULT_CACHE_CAPACITY;
use tumorscan::utils::logging::{init_logging, LogConfig, LogLevel};
use tumorscan::{Explainer, ModelKind};

use crate::state::{AppState, ServerConfig};

/// TumorScan Server
#[derive(Parser, Debug)]
#[command(name = "tumorscan-server")]
#[command(author = "Warre Snaet")]
#[command(version)]
#[command(about = "Web UI and HTTP API for brain MRI tumor classification")]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "TUMORSCAN_PORT", default_value = "8080")]
    port: u16,

    /// Host to bind to
    #[arg(long, env = "TUMORSCAN_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Xception weight record
    #[arg(long, env = "TUMORSCAN_XCEPTION_WEIGHTS")]
    xception_weights: Option<PathBuf>,

    /// Custom CNN weight record
    #[arg(long, env = "TUMORSCAN_CNN_WEIGHTS")]
    cnn_weights: Option<PathBuf>,

    /// Channel divisor the weight records were created with
    #[arg(long, env = "TUMORSCAN_WIDTH_DIVISOR", default_value = "1")]
    width_divisor: usize,

    /// Maximum upload size in bytes
    #[arg(long, env = "TUMORSCAN_MAX_UPLOAD_BYTES", default_value = "10485760")]
    max_upload_bytes: usize,

    /// Number of saliency maps kept in memory (0 disables the cache)
    #[arg(long, env = "TUMORSCAN_CACHE_CAPACITY", default_value_t = DEFAULT_CACHE_CAPACITY)]
    cache_capacity: usize,

    /// Gemini API key; explanations are disabled without it
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    google_api_key: Option<String>,

    /// Gemini model name
    #[arg(long, env = "TUMORSCAN_GEMINI_MODEL")]
    gemini_model: Option<String>,

    /// Gemini API base URL
    #[arg(long, env = "TUMORSCAN_GEMINI_URL")]
    gemini_url: Option<String>,

    /// Gemini request timeout in seconds
    #[arg(long, env = "TUMORSCAN_GEMINI_TIMEOUT", default_value = "60")]
    gemini_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TUMORSCAN_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        let mut config = ServerConfig::default();

        if let Some(path) = &self.xception_weights {
            config.xception_weights = path.clone();
        }
        if let Some(path) = &self.cnn_weights {
            config.cnn_weights = path.clone();
        }
        config.width_divisor = self.width_divisor;
        config.max_upload_bytes = self.max_upload_bytes;
        config.cache_capacity = self.cache_capacity;

        config
    }

    fn gemini_config(&self) -> Option<GeminiConfig> {
        let api_key = self.google_api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())?;

        let mut config =
            GeminiConfig::new(api_key).with_timeout(Duration::from_secs(self.gemini_timeout));
        if let Some(model) = &self.gemini_model {
            config = config.with_model(model.clone());
        }
        if let Some(url) = &self.gemini_url {
            config = config.with_base_url(url.clone());
        }
        Some(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize logging
    let log_config = LogConfig {
        level: LogLevel::from_str(&cli.log_level),
        ..LogConfig::production()
    };
    let _ = init_logging(&log_config);

    // Build configuration
    let config = cli.server_config();

    info!("TumorScan Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Xception weights: {:?}", config.xception_weights);
    info!("  CNN weights:      {:?}", config.cnn_weights);
    info!("  Width divisor:    {}", config.width_divisor);
    info!("  Max upload:       {} bytes", config.max_upload_bytes);
    info!("  Saliency cache:   {} entries", config.cache_capacity);

    for kind in ModelKind::ALL {
        let path = tumorscan::model::record_path(config.weights_for(kind));
        if !path.exists() {
            warn!(
                "{} weights not found at {:?}. Requests for this model will fail with 503.",
                kind, path
            );
        }
    }

    let explainer: Option<Arc<dyn Explainer>> = match cli.gemini_config() {
        Some(gemini) => {
            info!("  Explanations:     {} at {}", gemini.model, gemini.base_url);
            Some(Arc::new(GeminiClient::new(gemini)?) as Arc<dyn Explainer>)
        }
        None => {
            warn!("GOOGLE_API_KEY not set. Explanations are disabled.");
            None
        }
    };

    // Create shared state
    let state = Arc::new(AppState::new(config, explainer));

    // Build router
    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Start server
    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port).parse()?;
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
