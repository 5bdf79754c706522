//! Explanation module
//!
//! Asks a hosted generative model to describe a saliency overlay in plain
//! language. The `Explainer` trait is the seam; `GeminiClient` is the only
//! production implementation.

pub mod gemini;

use async_trait::async_trait;

use crate::labels::TumorClass;
use crate::utils::error::Result;
use crate::utils::format_percent;

pub use gemini::{GeminiClient, GeminiConfig};

/// Something that can explain a saliency overlay
#[async_trait]
pub trait Explainer: Send + Sync {
    /// Explain why `overlay_png` supports predicting `class_label` at `confidence`
    async fn explain(&self, overlay_png: &[u8], class_label: &str, confidence: f32)
        -> Result<String>;
}

/// Build the neurologist prompt sent along with the overlay
pub fn build_prompt(class_label: &str, confidence: f32) -> String {
    let classes: Vec<String> = TumorClass::ALL
        .iter()
        .map(|class| class.label().to_lowercase())
        .collect();

    format!(
        "You are an expert neurologist. You are tasked with explaining a saliency map of a brain tumor MRI scan. \
The saliency map was generated by a deep learning model that was trained to classify brain tumors as either {}.

The saliency map highlights the regions of the image that the machine learning model is focusing on to make the prediction.

The deep learning model predicted the image to be of class '{}' with a confidence of {}.

In your response:
 - Explain what regions of the brain the model is focusing on, based on the saliency map. Refer to the regions highlighted in light cyan, those are the regions where the model is focusing on.
 - Explain possible reasons why the model made the prediction it did.
 - Don't mention anything like 'The saliency map highlights the regions the model is focusing on, which are in light cyan' in your explanation.
 - Keep your explanation to 4 sentences max.

Let's think step by step about this. Verify step by step.
",
        classes.join(", "),
        class_label,
        format_percent(confidence)
    )
}
