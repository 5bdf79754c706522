//! TumorScan CLI
//!
//! Classifies a single brain MRI scan from the command line and writes
//! initial weight records for smoke tests and demos.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use tumorscan::backend::{backend_name, default_device, AnalysisBackend};
use tumorscan::explain::GeminiClient;
use tumorscan::model::{init_classifier, save_classifier, ModelKind, TumorClassifier};
use tumorscan::pipeline::{analyze, Analysis};
use tumorscan::report::probability_chart_svg;
use tumorscan::utils::{format_millis, format_percent};
use tumorscan::utils::logging::{init_logging, LogConfig};
use tumorscan::{Explainer, Predictor, TumorClass};

/// Brain MRI Tumor Classification
///
/// Classifies an MRI scan as glioma, meningioma, pituitary tumor or no
/// tumor, and shows which regions drove the prediction.
#[derive(Parser, Debug)]
#[command(name = "tumorscan")]
#[command(author = "Warre Snaet")]
#[command(version)]
#[command(about = "Brain MRI tumor classification with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Only log warnings and errors
    #[arg(short, long, default_value = "false", conflicts_with = "verbose")]
    quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a single MRI scan
    Classify {
        /// Path to the scan (jpg, jpeg or png)
        #[arg(short, long)]
        image: PathBuf,

        /// Classifier to run
        #[arg(short, long, value_enum, default_value = "xception")]
        model: ModelKind,

        /// Path to the weight record
        #[arg(short, long)]
        weights: PathBuf,

        /// Channel divisor the weights were created with
        #[arg(long, default_value = "1")]
        width_divisor: usize,

        /// Write the saliency overlay to this PNG file
        #[arg(long)]
        saliency_out: Option<PathBuf>,

        /// Write the probability chart to this SVG file
        #[arg(long)]
        chart_out: Option<PathBuf>,

        /// Ask Gemini to explain the saliency map (needs GOOGLE_API_KEY)
        #[arg(long, default_value = "false")]
        explain: bool,
    },

    /// Write a freshly initialized weight record
    InitWeights {
        /// Classifier to initialize
        #[arg(short, long, value_enum)]
        model: ModelKind,

        /// Output path of the record
        #[arg(short, long)]
        output: PathBuf,

        /// Divide every channel count by this factor (full width when omitted)
        #[arg(long)]
        width_divisor: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    match cli.command {
        Commands::Classify {
            image,
            model,
            weights,
            width_divisor,
            saliency_out,
            chart_out,
            explain,
        } => {
            cmd_classify(
                &image,
                model,
                &weights,
                width_divisor,
                saliency_out.as_deref(),
                chart_out.as_deref(),
                explain,
            )
            .await?;
        }

        Commands::InitWeights {
            model,
            output,
            width_divisor,
        } => {
            cmd_init_weights(model, &output, width_divisor)?;
        }
    }

    Ok(())
}

async fn cmd_classify(
    image: &Path,
    kind: ModelKind,
    weights: &Path,
    width_divisor: usize,
    saliency_out: Option<&Path>,
    chart_out: Option<&Path>,
    explain: bool,
) -> Result<()> {
    info!("Classifying {:?} with {}", image, kind);

    println!("{}", "Classification Configuration:".cyan().bold());
    println!("  Image:   {}", image.display());
    println!("  Model:   {}", kind);
    println!("  Weights: {}", weights.display());
    println!("  Backend: {}", backend_name());
    println!();

    let bytes = std::fs::read(image).with_context(|| format!("Failed to read {:?}", image))?;
    let file_name = image.file_name().map(|n| n.to_string_lossy().into_owned());

    // Build the explainer first so a missing key fails before the model runs
    let explainer = if explain {
        Some(GeminiClient::from_env()?)
    } else {
        None
    };

    println!("{}", "Loading model...".cyan());
    let predictor =
        Predictor::<AnalysisBackend>::load(kind, width_divisor, weights, default_device())?;

    println!("{}", "Running analysis...".cyan());
    let analysis = analyze(
        &predictor,
        &bytes,
        file_name.as_deref(),
        explainer.as_ref().map(|e| e as &dyn Explainer),
        None,
    )
    .await?;

    print_analysis(&analysis);

    if let Some(path) = saliency_out {
        std::fs::write(path, analysis.saliency.to_png()?)
            .with_context(|| format!("Failed to write {:?}", path))?;
        println!("{} Saliency map written to {}", "✓".green(), path.display());
    }

    if let Some(path) = chart_out {
        std::fs::write(path, probability_chart_svg(&analysis.prediction))
            .with_context(|| format!("Failed to write {:?}", path))?;
        println!("{} Chart written to {}", "✓".green(), path.display());
    }

    Ok(())
}

fn print_analysis(analysis: &Analysis) {
    let prediction = &analysis.prediction;

    println!();
    println!("{}", "Classification Results".green().bold());
    println!(
        "  Predicted Class: {}",
        prediction.predicted_class.label().red().bold()
    );
    println!(
        "  Confidence:      {}",
        format_percent(prediction.confidence).blue().bold()
    );
    println!("  Time:            {}", format_millis(prediction.inference_time_ms));
    println!(
        "  Saliency:        {:.1}% of the scan highlighted{}",
        analysis.saliency.coverage() * 100.0,
        if analysis.saliency_cached { " (cached)" } else { "" }
    );
    println!("  Predictions:");
    for class in TumorClass::ALL {
        println!("    {}: {:.4}", class, prediction.probability(class));
    }
    println!();

    if let Some(text) = &analysis.explanation {
        println!("{}", "Explanation".green().bold());
        println!("{}", text.trim());
        println!();
    } else if let Some(reason) = &analysis.explanation_error {
        println!("{} Explanation unavailable: {}", "Warning:".yellow(), reason);
    }
}

fn cmd_init_weights(kind: ModelKind, output: &Path, width_divisor: Option<usize>) -> Result<()> {
    info!(
        "Initializing {} weights (width divisor {})",
        kind,
        width_divisor.unwrap_or(1)
    );

    let device = default_device();
    let model = match width_divisor {
        Some(divisor) => TumorClassifier::<AnalysisBackend>::init(kind, divisor, &device)?,
        None => init_classifier::<AnalysisBackend>(kind, &device)?,
    };
    let params = model.num_params();
    let record = save_classifier(model, output)?;

    println!(
        "{} Wrote {} ({} parameters) to {}",
        "✓".green(),
        kind,
        params,
        record.display()
    );
    println!(
        "  {}",
        "Weights are untrained; predictions are only useful for smoke tests.".yellow()
    );

    Ok(())
}
