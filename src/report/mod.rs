//! Report module for presenting an analysis
//!
//! This module provides:
//! - The SVG probability chart
//! - The result card, results page and upload page
//! - PNG encoding and data URI helpers

pub mod chart;
pub mod html;

use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageFormat, RgbImage};

use crate::utils::error::Result;

pub use chart::probability_chart_svg;
pub use html::{render_results_page, render_upload_page, result_card_html};

/// Encode an RGB image as PNG
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image.write_to(&mut buffer, ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

/// Base64 `data:` URI for embedding bytes in a page
pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

/// MIME type of an uploaded image, sniffed from its bytes
pub fn image_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        _ => "application/octet-stream",
    }
}
