//! Input gradients of a class probability.

use burn::tensor::{backend::AutodiffBackend, Tensor};
use ndarray::Array2;

use crate::model::TumorClassifier;
use crate::preprocess::PreparedImage;
use crate::utils::error::{Result, TumorScanError};

/// Gradient of `softmax(model(x))[class_index]` with respect to `x`
///
/// Returned on the inner backend, same shape as `input`.
pub fn class_gradient<B: AutodiffBackend>(
    model: &TumorClassifier<B>,
    input: Tensor<B, 4>,
    class_index: usize,
) -> Result<Tensor<B::InnerBackend, 4>> {
    let input = input.require_grad();

    let probabilities = model.forward_softmax(input.clone());
    let [_, num_classes] = probabilities.dims();
    if class_index >= num_classes {
        return Err(TumorScanError::Saliency(format!(
            "class index {} out of range for {} classes",
            class_index, num_classes
        )));
    }

    let target = probabilities
        .slice([0..1, class_index..class_index + 1])
        .sum();
    let grads = target.backward();

    input
        .grad(&grads)
        .ok_or_else(|| TumorScanError::Saliency("input has no gradient".to_string()))
}

/// Gradient magnitude of `softmax(model(x))[class_index]` with respect to `x`
///
/// Absolute gradients are reduced by max over the colour channels, giving
/// one value per pixel of the model input.
pub fn input_gradients<B: AutodiffBackend>(
    model: &TumorClassifier<B>,
    image: &PreparedImage,
    class_index: usize,
    device: &B::Device,
) -> Result<Array2<f32>> {
    let size = image.size;
    let gradient = class_gradient(model, image.to_tensor::<B>(device), class_index)?;

    // [1, 3, H, W] -> [1, 1, H, W]
    let magnitude = gradient.abs().max_dim(1);
    let values: Vec<f32> = magnitude
        .into_data()
        .convert::<f32>()
        .to_vec()
        .map_err(|e| TumorScanError::Saliency(format!("Failed to read gradients: {:?}", e)))?;

    Array2::from_shape_vec((size, size), values)
        .map_err(|e| TumorScanError::Saliency(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use image::{Rgb, RgbImage};

    use crate::model::ModelKind;
    use crate::preprocess::prepare_rgb;

    type InnerBackend = NdArray;
    type TestBackend = Autodiff<InnerBackend>;

    // Divisor 16 keeps enough filters alive for a non-zero input gradient
    const WIDTH_DIVISOR: usize = 16;

    fn gradient_image() -> PreparedImage {
        let mut img = RgbImage::new(64, 64);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = Rgb([(x * 4) as u8, (y * 4) as u8, ((x + y) * 2) as u8]);
        }
        prepare_rgb(&img, 224)
    }

    fn model() -> TumorClassifier<TestBackend> {
        TumorClassifier::init(ModelKind::CustomCnn, WIDTH_DIVISOR, &Default::default()).unwrap()
    }

    #[test]
    fn test_gradient_shape_and_sign() {
        let device = Default::default();
        let model = model();

        let grid = input_gradients(&model, &gradient_image(), 2, &device).unwrap();
        assert_eq!(grid.dim(), (224, 224));
        assert!(grid.iter().all(|&v| v >= 0.0 && v.is_finite()));
        assert!(grid.iter().any(|&v| v > 0.0));
    }

    #[test]
    fn test_grid_is_channel_max_of_abs_gradient() {
        let device = Default::default();
        let model = model();
        let image = gradient_image();

        let raw: Vec<f32> = class_gradient(&model, image.to_tensor::<TestBackend>(&device), 1)
            .unwrap()
            .into_data()
            .to_vec()
            .unwrap();
        let grid = input_gradients(&model, &image, 1, &device).unwrap();

        let plane = 224 * 224;
        let (y, x) = (112, 100);
        let expected = (0..3)
            .map(|c| raw[c * plane + y * 224 + x].abs())
            .fold(0.0f32, f32::max);
        assert_eq!(grid[[y, x]], expected);
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let device = Default::default();
        let model = model();
        let image = gradient_image();
        let class_index = 0;

        let gradient = class_gradient(&model, image.to_tensor::<TestBackend>(&device), class_index)
            .unwrap();
        let norm: f32 = gradient.clone().powf_scalar(2.0).sum().sqrt().into_scalar();
        assert!(norm > 0.0);

        // Central difference along the unit gradient direction equals the gradient norm
        let inner = model.valid();
        let x = image.to_tensor::<InnerBackend>(&device);
        let direction = gradient / norm;
        let eps = 0.05;
        let probability = |input: Tensor<InnerBackend, 4>| -> f32 {
            inner
                .forward_softmax(input)
                .slice([0..1, class_index..class_index + 1])
                .into_scalar()
        };
        let plus = probability(x.clone() + direction.clone() * eps);
        let minus = probability(x - direction * eps);
        let finite_difference = (plus - minus) / (2.0 * eps);

        assert!(
            (finite_difference - norm).abs() < 0.1 * norm,
            "finite difference {} vs gradient norm {}",
            finite_difference,
            norm
        );
    }

    #[test]
    fn test_class_index_out_of_range() {
        let device = Default::default();
        let model = TumorClassifier::<TestBackend>::init(ModelKind::CustomCnn, 64, &device).unwrap();
        let image = prepare_rgb(&RgbImage::new(8, 8), 224);

        assert!(matches!(
            input_gradients(&model, &image, 4, &device),
            Err(TumorScanError::Saliency(_))
        ));
    }
}
