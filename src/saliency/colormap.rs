//! Jet color map and heatmap overlay.

use image::{imageops::FilterType, Rgb, RgbImage};
use ndarray::Array2;

/// Weight of the heatmap in the overlay
pub const HEATMAP_OPACITY: f32 = 0.7;

/// Weight of the scan in the overlay
pub const BASE_OPACITY: f32 = 0.3;

fn jet_channel(x: f32, offset: f32) -> u8 {
    let v = (1.5 - (4.0 * x - offset).abs()).clamp(0.0, 1.0);
    (v * 255.0).round() as u8
}

/// Jet color for an 8-bit intensity: dark blue at 0 through cyan, yellow, to dark red at 255
pub fn jet(value: u8) -> Rgb<u8> {
    let x = value as f32 / 255.0;
    Rgb([jet_channel(x, 3.0), jet_channel(x, 2.0), jet_channel(x, 1.0)])
}

/// Quantize a heat value in [0, 1] to 8 bits by truncation
pub fn quantize(value: f32) -> u8 {
    (255.0 * value).clamp(0.0, 255.0) as u8
}

/// Color a heat grid with the jet color map
pub fn heatmap(heat: &Array2<f32>) -> RgbImage {
    let (height, width) = heat.dim();
    RgbImage::from_fn(width as u32, height as u32, |x, y| {
        jet(quantize(heat[[y as usize, x as usize]]))
    })
}

/// Blend a heatmap over the scan, resizing the heatmap to the scan if needed
pub fn overlay(heatmap: &RgbImage, base: &RgbImage) -> RgbImage {
    let (width, height) = base.dimensions();
    let heatmap = if heatmap.dimensions() == (width, height) {
        heatmap.clone()
    } else {
        image::imageops::resize(heatmap, width, height, FilterType::Triangle)
    };

    RgbImage::from_fn(width, height, |x, y| {
        let h = heatmap.get_pixel(x, y);
        let b = base.get_pixel(x, y);
        Rgb([0, 1, 2].map(|c| {
            (h[c] as f32 * HEATMAP_OPACITY + b[c] as f32 * BASE_OPACITY).min(255.0) as u8
        }))
    })
}

/// Jet heatmap of `heat` blended over the scan
pub fn colorize(heat: &Array2<f32>, original: &RgbImage) -> RgbImage {
    overlay(&heatmap(heat), original)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jet_endpoints() {
        assert_eq!(jet(0), Rgb([0, 0, 128]));
        assert_eq!(jet(255), Rgb([128, 0, 0]));

        let mid = jet(128);
        assert!(mid[1] > 200);
    }

    #[test]
    fn test_jet_low_values_are_blue() {
        let low = jet(64);
        assert!(low[2] > low[0]);
    }

    #[test]
    fn test_quantize_truncates() {
        assert_eq!(quantize(0.0), 0);
        assert_eq!(quantize(0.999), 254);
        assert_eq!(quantize(1.0), 255);
        assert_eq!(quantize(-0.5), 0);
        assert_eq!(quantize(2.0), 255);
    }

    #[test]
    fn test_heatmap_dimensions() {
        let heat = Array2::zeros((10, 20));
        let img = heatmap(&heat);
        assert_eq!(img.dimensions(), (20, 10));
        assert_eq!(*img.get_pixel(0, 0), jet(0));
    }

    #[test]
    fn test_overlay_blend() {
        let heat = RgbImage::from_pixel(4, 4, Rgb([105, 203, 0]));
        let base = RgbImage::from_pixel(4, 4, Rgb([13, 22, 255]));

        let out = overlay(&heat, &base);
        assert_eq!(out.dimensions(), (4, 4));
        // 0.7*105 + 0.3*13 = 77.4, 0.7*203 + 0.3*22 = 148.7, 0.3*255 = 76.5
        assert_eq!(*out.get_pixel(2, 2), Rgb([77, 148, 76]));
    }

    #[test]
    fn test_overlay_resizes_heatmap() {
        let heat = RgbImage::new(8, 8);
        let base = RgbImage::new(5, 3);
        assert_eq!(overlay(&heat, &base).dimensions(), (5, 3));
    }

    #[test]
    fn test_colorize_cold_grid() {
        let heat = Array2::zeros((2, 3));
        let base = RgbImage::from_pixel(3, 2, Rgb([100, 100, 100]));
        let out = colorize(&heat, &base);

        assert_eq!(out.dimensions(), (3, 2));
        // 0.7 * (0, 0, 128) + 0.3 * 100
        assert_eq!(*out.get_pixel(0, 0), Rgb([30, 30, 119]));
    }
}
