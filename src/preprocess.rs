//! Upload Preprocessing
//!
//! Validates an uploaded file, decodes it and lays it out as the NCHW
//! tensor the classifiers expect. Pixels are only scaled to [0, 1]; the
//! pretrained weights were fit without mean/std normalization.

use std::path::Path;

use burn::tensor::{backend::Backend, Tensor, TensorData};
use image::{imageops::FilterType, ImageFormat, RgbImage};
use tracing::debug;

use crate::utils::error::{Result, TumorScanError};
use crate::ACCEPTED_EXTENSIONS;

/// An upload resized and scaled for one model input size
#[derive(Debug, Clone)]
pub struct PreparedImage {
    /// Resized RGB image, used as the base of the saliency overlay
    pub rgb: RgbImage,
    /// Pixel values in [0, 1], CHW layout: [C, H, W] flattened
    pub pixels: Vec<f32>,
    /// Side length of the square input
    pub size: usize,
}

impl PreparedImage {
    /// Input tensor of shape [1, 3, size, size]
    pub fn to_tensor<B: Backend>(&self, device: &B::Device) -> Tensor<B, 4> {
        Tensor::from_data(
            TensorData::new(self.pixels.clone(), [1, 3, self.size, self.size]),
            device,
        )
    }
}

/// Check the file name extension of an upload, if it has one
pub fn check_extension(file_name: &str) -> Result<()> {
    let Some(ext) = Path::new(file_name).extension() else {
        return Ok(());
    };
    let ext = ext.to_string_lossy().to_lowercase();
    if ACCEPTED_EXTENSIONS.contains(&ext.as_str()) {
        Ok(())
    } else {
        Err(TumorScanError::UnsupportedImageType(ext))
    }
}

/// Check that the bytes are a JPEG or PNG image
pub fn check_format(bytes: &[u8]) -> Result<ImageFormat> {
    let format = image::guess_format(bytes)
        .map_err(|_| TumorScanError::UnsupportedImageType("unknown".to_string()))?;

    match format {
        ImageFormat::Jpeg | ImageFormat::Png => Ok(format),
        other => Err(TumorScanError::UnsupportedImageType(
            other.extensions_str().first().copied().unwrap_or("unknown").to_string(),
        )),
    }
}

/// Decode an upload into an RGB image
pub fn decode_upload(bytes: &[u8], file_name: Option<&str>) -> Result<RgbImage> {
    if bytes.is_empty() {
        return Err(TumorScanError::EmptyUpload);
    }
    if let Some(name) = file_name {
        check_extension(name)?;
    }
    let format = check_format(bytes)?;

    let image = image::load_from_memory_with_format(bytes, format)?;
    debug!(
        "Decoded {:?} upload: {}x{}",
        format,
        image.width(),
        image.height()
    );

    Ok(image.to_rgb8())
}

/// Resize an RGB image to `size` x `size` and scale it to [0, 1] in CHW layout
///
/// Resizing uses nearest-neighbour sampling.
pub fn prepare_rgb(rgb: &RgbImage, size: usize) -> PreparedImage {
    let resized = image::imageops::resize(rgb, size as u32, size as u32, FilterType::Nearest);
    let num_pixels = size * size;

    // Pre-allocate for CHW layout
    let mut pixels = vec![0.0f32; 3 * num_pixels];
    for (i, pixel) in resized.pixels().enumerate() {
        pixels[i] = pixel[0] as f32 / 255.0;
        pixels[num_pixels + i] = pixel[1] as f32 / 255.0;
        pixels[2 * num_pixels + i] = pixel[2] as f32 / 255.0;
    }

    PreparedImage {
        rgb: resized,
        pixels,
        size,
    }
}

/// Validate, decode and prepare an upload for a model input size
pub fn prepare_upload(bytes: &[u8], file_name: Option<&str>, size: usize) -> Result<PreparedImage> {
    let rgb = decode_upload(bytes, file_name)?;
    Ok(prepare_rgb(&rgb, size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use image::Rgb;
    use std::io::Cursor;

    fn png_bytes(image: &RgbImage) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_prepare_layout_and_range() {
        let mut img = RgbImage::new(4, 4);
        for pixel in img.pixels_mut() {
            *pixel = Rgb([255, 0, 51]);
        }

        let prepared = prepare_rgb(&img, 8);
        assert_eq!(prepared.size, 8);
        assert_eq!(prepared.rgb.dimensions(), (8, 8));
        assert_eq!(prepared.pixels.len(), 3 * 8 * 8);

        // CHW: all R values, then all G values, then all B values
        assert_eq!(prepared.pixels[0], 1.0);
        assert_eq!(prepared.pixels[64], 0.0);
        assert!((prepared.pixels[128] - 0.2).abs() < 1e-6);
        assert!(prepared.pixels.iter().all(|&v| (0.0..=1.0).contains(&v)));
    }

    #[test]
    fn test_tensor_shape() {
        let prepared = prepare_rgb(&RgbImage::new(10, 20), 16);
        let tensor = prepared.to_tensor::<NdArray>(&Default::default());
        assert_eq!(tensor.dims(), [1, 3, 16, 16]);
    }

    #[test]
    fn test_prepare_upload_png() {
        let bytes = png_bytes(&RgbImage::new(30, 30));
        let prepared = prepare_upload(&bytes, Some("scan.PNG"), 12).unwrap();
        assert_eq!(prepared.rgb.dimensions(), (12, 12));
    }

    #[test]
    fn test_rejects_empty_upload() {
        assert!(matches!(
            prepare_upload(&[], Some("scan.png"), 12),
            Err(TumorScanError::EmptyUpload)
        ));
    }

    #[test]
    fn test_rejects_unsupported_extension() {
        let bytes = png_bytes(&RgbImage::new(4, 4));
        let err = prepare_upload(&bytes, Some("scan.gif"), 12).unwrap_err();
        assert!(matches!(err, TumorScanError::UnsupportedImageType(ext) if ext == "gif"));
    }

    #[test]
    fn test_rejects_non_image_bytes() {
        let err = prepare_upload(b"definitely not an image", None, 12).unwrap_err();
        assert!(matches!(err, TumorScanError::UnsupportedImageType(_)));
    }

    #[test]
    fn test_extension_is_optional() {
        assert!(check_extension("upload").is_ok());
        assert!(check_extension("scan.jpeg").is_ok());
        assert!(check_extension("scan.bmp").is_err());
    }
}
