//! SVG Probability Chart
//!
//! Horizontal bar chart of the class probabilities, most probable class at
//! the top. The predicted class is drawn in red, the rest in blue.

use crate::inference::PredictionResult;

/// Chart styling constants
const CHART_WIDTH: f64 = 700.0;
const CHART_HEIGHT: f64 = 400.0;
const MARGIN_TOP: f64 = 60.0;
const MARGIN_RIGHT: f64 = 80.0;
const MARGIN_BOTTOM: f64 = 60.0;
const MARGIN_LEFT: f64 = 120.0;

const COLOR_PREDICTED: &str = "red";
const COLOR_OTHER: &str = "blue";
const COLOR_GRID: &str = "#ecf0f1";
const COLOR_AXIS: &str = "#2c3e50";
const COLOR_TEXT: &str = "#2c3e50";

/// Chart title
pub const CHART_TITLE: &str = "Prediction Probabilities";

/// Render the probability chart of a prediction as an SVG document
pub fn probability_chart_svg(prediction: &PredictionResult) -> String {
    let plot_width = CHART_WIDTH - MARGIN_LEFT - MARGIN_RIGHT;
    let plot_height = CHART_HEIGHT - MARGIN_TOP - MARGIN_BOTTOM;

    let ranked = prediction.ranked();
    let row_height = plot_height / ranked.len().max(1) as f64;
    let bar_height = row_height * 0.7;

    let mut svg = String::new();

    // SVG header
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {} {}" width="{}" height="{}">"#,
        CHART_WIDTH, CHART_HEIGHT, CHART_WIDTH, CHART_HEIGHT
    ));

    // Background
    svg.push_str(&format!(
        r#"<rect width="{}" height="{}" fill="white"/>"#,
        CHART_WIDTH, CHART_HEIGHT
    ));

    // Title
    svg.push_str(&format!(
        r#"<text x="{}" y="35" text-anchor="middle" font-family="Arial, sans-serif" font-size="18" font-weight="bold" fill="{}">{}</text>"#,
        CHART_WIDTH / 2.0, COLOR_TEXT, CHART_TITLE
    ));

    // Vertical grid lines at 0.0, 0.2, ... 1.0
    for i in 0..=5 {
        let value = i as f64 / 5.0;
        let x = MARGIN_LEFT + value * plot_width;

        svg.push_str(&format!(
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="1"/>"#,
            x, MARGIN_TOP, x, MARGIN_TOP + plot_height, COLOR_GRID
        ));
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="12" fill="{}">{:.1}</text>"#,
            x, MARGIN_TOP + plot_height + 18.0, COLOR_TEXT, value
        ));
    }

    // Axes
    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        MARGIN_LEFT, MARGIN_TOP + plot_height, MARGIN_LEFT + plot_width, MARGIN_TOP + plot_height, COLOR_AXIS
    ));
    svg.push_str(&format!(
        r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="2"/>"#,
        MARGIN_LEFT, MARGIN_TOP, MARGIN_LEFT, MARGIN_TOP + plot_height, COLOR_AXIS
    ));

    // Axis titles
    svg.push_str(&format!(
        r#"<text x="{}" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}">Probability</text>"#,
        MARGIN_LEFT + plot_width / 2.0, CHART_HEIGHT - 15.0, COLOR_TEXT
    ));
    svg.push_str(&format!(
        r#"<text x="20" y="{}" text-anchor="middle" font-family="Arial, sans-serif" font-size="14" fill="{}" transform="rotate(-90 20 {})">Class</text>"#,
        CHART_HEIGHT / 2.0, COLOR_TEXT, CHART_HEIGHT / 2.0
    ));

    // Bars, most probable first
    for (i, (class, probability)) in ranked.iter().enumerate() {
        let value = probability.clamp(0.0, 1.0) as f64;
        let y = MARGIN_TOP + i as f64 * row_height + (row_height - bar_height) / 2.0;
        let width = value * plot_width;
        let color = if *class == prediction.predicted_class {
            COLOR_PREDICTED
        } else {
            COLOR_OTHER
        };

        svg.push_str(&format!(
            r#"<rect x="{}" y="{}" width="{}" height="{}" fill="{}" data-class="{}"/>"#,
            MARGIN_LEFT, y, width, bar_height, color, escape_xml(class.label())
        ));

        // Class label
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="end" font-family="Arial, sans-serif" font-size="12" fill="{}">{}</text>"#,
            MARGIN_LEFT - 10.0, y + bar_height / 2.0 + 4.0, COLOR_TEXT, escape_xml(class.label())
        ));

        // Value label
        svg.push_str(&format!(
            r#"<text x="{}" y="{}" text-anchor="start" font-family="Arial, sans-serif" font-size="12" fill="{}">{:.4}</text>"#,
            MARGIN_LEFT + width + 5.0, y + bar_height / 2.0 + 4.0, COLOR_TEXT, probability
        ));
    }

    svg.push_str("</svg>");
    svg
}

/// Escape text for XML and HTML content and attributes
pub fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelKind;
    use std::time::Duration;

    fn prediction(probabilities: Vec<f32>) -> PredictionResult {
        PredictionResult::new(ModelKind::Xception, probabilities, Duration::ZERO).unwrap()
    }

    #[test]
    fn test_chart_titles() {
        let svg = probability_chart_svg(&prediction(vec![0.1, 0.2, 0.3, 0.4]));

        assert!(svg.starts_with("<svg"));
        assert!(svg.ends_with("</svg>"));
        assert!(svg.contains("Prediction Probabilities"));
        assert!(svg.contains(">Probability</text>"));
        assert!(svg.contains(">Class</text>"));
    }

    #[test]
    fn test_bars_sorted_and_colored() {
        let svg = probability_chart_svg(&prediction(vec![0.05, 0.7, 0.15, 0.1]));

        // Most probable class drawn first, i.e. at the top
        let meningioma = svg.find(r#"data-class="Meningioma""#).unwrap();
        let no_tumor = svg.find(r#"data-class="No tumor""#).unwrap();
        let pituitary = svg.find(r#"data-class="Pituitary""#).unwrap();
        let glioma = svg.find(r#"data-class="Glioma""#).unwrap();
        assert!(meningioma < no_tumor && no_tumor < pituitary && pituitary < glioma);

        assert_eq!(svg.matches(r#"fill="red""#).count(), 1);
        assert_eq!(svg.matches(r#"fill="blue""#).count(), 3);
        assert!(svg.contains(r#"fill="red" data-class="Meningioma""#));
    }

    #[test]
    fn test_value_labels_four_decimals() {
        let svg = probability_chart_svg(&prediction(vec![0.125, 0.5, 0.25, 0.125]));
        assert!(svg.contains(">0.5000</text>"));
        assert!(svg.contains(">0.2500</text>"));
        assert_eq!(svg.matches(">0.1250</text>").count(), 2);
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("a<b>&\"'"), "a&lt;b&gt;&amp;&quot;&apos;");
    }
}
