//! HTML Pages
//!
//! Upload form and results page served by the web UI. Images are embedded
//! as data URIs so each response is self-contained.

use crate::inference::PredictionResult;
use crate::labels::TumorClass;
use crate::model::ModelKind;
use crate::pipeline::Analysis;
use crate::utils::error::Result;
use crate::utils::format_percent;
use crate::ACCEPTED_EXTENSIONS;

use super::chart::{escape_xml, probability_chart_svg};
use super::{data_uri, image_mime};

/// Page title shown on every page
pub const PAGE_TITLE: &str = "Brain Tumor Classification";

const STYLE: &str = "body { font-family: Arial, sans-serif; max-width: 960px; margin: 0 auto; padding: 24px; color: #2c3e50; }
.columns { display: flex; gap: 24px; }
.columns figure { flex: 1; margin: 0; text-align: center; }
.columns img { width: 100%; }
.notice { color: #e67e22; }
.error { color: #e74c3c; }";

fn page(body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n<style>\n{style}\n</style>\n</head>\n<body>\n<h1>{title}</h1>\n{body}\n</body>\n</html>\n",
        title = PAGE_TITLE,
        style = STYLE,
        body = body
    )
}

/// Dark card with the predicted label in red and the confidence in blue
pub fn result_card_html(prediction: &PredictionResult) -> String {
    format!(
        r#"<div class="result-card" style="background-color: #000000; color: #ffffff; padding: 30px; border-radius: 15px;">
  <div style="display: flex; justify-content: space-between; align-items: center;">
    <div style="flex: 1; text-align: center;">
      <h3 style="color: #ffffff; margin-bottom: 10px; font-size: 20px;">Predictions</h3>
      <p style="font-size: 36px; font-weight: 800; color: #FF0000; margin: 0;">{}</p>
    </div>
    <div style="width: 2px; height: 80px; background-color: #ffffff; margin: 0 20px;"></div>
    <div style="flex: 1; text-align: center;">
      <h3 style="color: #ffffff; margin-bottom: 10px; font-size: 20px;">Confidence</h3>
      <p style="font-size: 36px; font-weight: 800; color: #2196F3; margin: 0;">{}</p>
    </div>
  </div>
</div>"#,
        escape_xml(prediction.predicted_class.label()),
        format_percent(prediction.confidence)
    )
}

fn explanation_html(analysis: &Analysis) -> String {
    match (&analysis.explanation, &analysis.explanation_error) {
        (Some(text), _) => text
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| format!("<p>{}</p>", escape_xml(p)))
            .collect::<Vec<_>>()
            .join("\n"),
        (None, Some(reason)) => format!(
            r#"<p class="notice">Explanation unavailable: {}</p>"#,
            escape_xml(reason)
        ),
        (None, None) => r#"<p class="notice">Explanation unavailable.</p>"#.to_string(),
    }
}

/// Full results page for one analysis
///
/// `upload` is the original file, shown next to the saliency overlay.
pub fn render_results_page(analysis: &Analysis, upload: &[u8]) -> Result<String> {
    let prediction = &analysis.prediction;

    let mut body = String::new();
    body.push_str(&format!(
        "<p>Model: {}</p>\n<p>Predicted Class: {}</p>\n<p>Predictions:</p>\n<ul class=\"probabilities\">\n",
        escape_xml(prediction.model.label()),
        escape_xml(prediction.predicted_class.label())
    ));
    for class in TumorClass::ALL {
        body.push_str(&format!(
            "<li>{}: {:.4}</li>\n",
            escape_xml(class.label()),
            prediction.probability(class)
        ));
    }
    body.push_str("</ul>\n");

    let overlay = data_uri("image/png", &analysis.saliency.to_png()?);
    body.push_str(&format!(
        "<div class=\"columns\">\n<figure><img src=\"{}\" alt=\"Uploaded MRI\"><figcaption>Uploaded MRI</figcaption></figure>\n<figure><img src=\"{}\" alt=\"Saliency Map\"><figcaption>Saliency Map</figcaption></figure>\n</div>\n",
        data_uri(image_mime(upload), upload),
        overlay
    ));

    body.push_str("<h2>Classification Results</h2>\n");
    body.push_str(&result_card_html(prediction));
    body.push('\n');
    body.push_str(&probability_chart_svg(prediction));
    body.push('\n');

    body.push_str("<h2>Explanation</h2>\n");
    body.push_str(&explanation_html(analysis));
    body.push_str("\n<p><a href=\"/\">Classify another scan</a></p>");

    Ok(page(&body))
}

/// Upload form with the model selector
///
/// `error` is shown above the form when a previous upload was rejected.
pub fn render_upload_page(error: Option<&str>) -> String {
    let accept = ACCEPTED_EXTENSIONS
        .iter()
        .map(|ext| format!(".{}", ext))
        .collect::<Vec<_>>()
        .join(",");

    let mut body = String::from("<p>Upload an image of a brain MRI scan to classify.</p>\n");
    if let Some(message) = error {
        body.push_str(&format!("<p class=\"error\">{}</p>\n", escape_xml(message)));
    }

    body.push_str("<form action=\"/classify\" method=\"post\" enctype=\"multipart/form-data\">\n");
    body.push_str(&format!(
        "<p><label>Choose an image... <input type=\"file\" name=\"file\" accept=\"{}\" required></label></p>\n",
        accept
    ));
    body.push_str("<fieldset>\n<legend>Select Model</legend>\n");
    for (i, kind) in ModelKind::ALL.iter().enumerate() {
        body.push_str(&format!(
            "<label><input type=\"radio\" name=\"model\" value=\"{}\"{}> {}</label><br>\n",
            kind.key(),
            if i == 0 { " checked" } else { "" },
            escape_xml(kind.label())
        ));
    }
    body.push_str("</fieldset>\n<p><button type=\"submit\">Classify</button></p>\n</form>");

    page(&body)
}
