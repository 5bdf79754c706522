//! Saliency module for explaining predictions
//!
//! This module provides:
//! - Input gradients of a class probability
//! - Post-processing into a masked, thresholded and smoothed heat grid
//! - Jet colouring and blending over the scan

pub mod colormap;
pub mod gradient;
pub mod postprocess;

use burn::tensor::backend::AutodiffBackend;
use image::RgbImage;
use ndarray::Array2;
use tracing::debug;

use crate::inference::Predictor;
use crate::preprocess::PreparedImage;
use crate::report::encode_png;
use crate::utils::error::Result;

pub use colormap::{colorize, heatmap, jet, overlay};
pub use gradient::input_gradients;
pub use postprocess::postprocess;

/// A saliency overlay for one prediction
#[derive(Debug, Clone)]
pub struct SaliencyMap {
    /// Heatmap blended over the resized scan, model input size
    pub overlay: RgbImage,
    /// Post-processed heat values in [0, 1], indexed `[row, col]`
    pub heat: Array2<f32>,
    /// Class the gradients were taken for
    pub class_index: usize,
}

impl SaliencyMap {
    /// Encode the overlay as PNG
    pub fn to_png(&self) -> Result<Vec<u8>> {
        encode_png(&self.overlay)
    }

    /// Fraction of pixels with any heat left after thresholding and blur
    pub fn coverage(&self) -> f32 {
        let total = self.heat.len();
        if total == 0 {
            return 0.0;
        }
        self.heat.iter().filter(|&&v| v > 0.0).count() as f32 / total as f32
    }
}

/// Compute the saliency overlay of `class_index` for a prepared image
pub fn generate_saliency<B: AutodiffBackend>(
    predictor: &Predictor<B>,
    image: &PreparedImage,
    class_index: usize,
) -> Result<SaliencyMap> {
    let grid = input_gradients(predictor.model(), image, class_index, predictor.device())?;
    let heat = postprocess(&grid, image.size, image.size);
    let overlay = colorize(&heat, &image.rgb);

    debug!(
        "Saliency for class {} on {}x{} input",
        class_index, image.size, image.size
    );

    Ok(SaliencyMap {
        overlay,
        heat,
        class_index,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use image::Rgb;

    use crate::model::{ModelKind, TumorClassifier};
    use crate::preprocess::prepare_rgb;

    type TestBackend = Autodiff<NdArray>;

    #[test]
    fn test_overlay_matches_input_size() {
        let device = Default::default();
        // Divisor 16 keeps enough filters alive for a non-zero input gradient
        let model = TumorClassifier::<TestBackend>::init(ModelKind::CustomCnn, 16, &device).unwrap();
        let predictor = Predictor::new(model, device);

        let mut scan = RgbImage::new(100, 80);
        for (x, y, pixel) in scan.enumerate_pixels_mut() {
            *pixel = Rgb([(x * 2) as u8, (y * 3) as u8, 90]);
        }
        let image = prepare_rgb(&scan, predictor.input_size());

        let map = generate_saliency(&predictor, &image, 0).unwrap();
        assert_eq!(map.overlay.dimensions(), (224, 224));
        assert_eq!(map.heat.dim(), (224, 224));
        assert_eq!(map.class_index, 0);
        assert!(map.heat.iter().all(|&v| (0.0..=1.0 + 1e-5).contains(&v)));
        assert!(map.coverage() > 0.0);
        assert!(map.coverage() < 1.0);

        let png = map.to_png().unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn test_coverage_bounds() {
        let map = SaliencyMap {
            overlay: RgbImage::new(2, 2),
            heat: Array2::from_shape_vec((2, 2), vec![0.0, 0.5, 0.0, 1.0]).unwrap(),
            class_index: 1,
        };
        assert_eq!(map.coverage(), 0.5);
    }
}
