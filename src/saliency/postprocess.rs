//! Post-processing of raw gradient grids.
//!
//! Resize, circular brain mask, masked min-max normalization, percentile
//! threshold and Gaussian smoothing. Grids are indexed `[row, col]`.

use ndarray::Array2;

/// Pixels trimmed from the largest inscribed circle when building the mask
pub const MASK_MARGIN: i64 = 10;

/// Percentile below which normalized gradients are dropped
pub const THRESHOLD_PERCENTILE: f64 = 80.0;

/// Side length of the smoothing kernel
pub const BLUR_KERNEL_SIZE: usize = 11;

/// Bilinear resize to `(height, width)` with half-pixel centers
pub fn resize_bilinear(grid: &Array2<f32>, height: usize, width: usize) -> Array2<f32> {
    let (src_h, src_w) = grid.dim();
    if (src_h, src_w) == (height, width) {
        return grid.clone();
    }
    if src_h == 0 || src_w == 0 {
        return Array2::zeros((height, width));
    }

    let scale_y = src_h as f32 / height as f32;
    let scale_x = src_w as f32 / width as f32;

    Array2::from_shape_fn((height, width), |(y, x)| {
        let sy = ((y as f32 + 0.5) * scale_y - 0.5).clamp(0.0, (src_h - 1) as f32);
        let sx = ((x as f32 + 0.5) * scale_x - 0.5).clamp(0.0, (src_w - 1) as f32);

        let y0 = sy.floor() as usize;
        let x0 = sx.floor() as usize;
        let y1 = (y0 + 1).min(src_h - 1);
        let x1 = (x0 + 1).min(src_w - 1);
        let fy = sy - y0 as f32;
        let fx = sx - x0 as f32;

        let top = grid[[y0, x0]] * (1.0 - fx) + grid[[y0, x1]] * fx;
        let bottom = grid[[y1, x0]] * (1.0 - fx) + grid[[y1, x1]] * fx;
        top * (1.0 - fy) + bottom * fy
    })
}

/// Circular mask centered on the grid, `MASK_MARGIN` pixels inside the
/// largest inscribed circle
///
/// Grids too small for the margin get an empty mask.
pub fn circular_mask(height: usize, width: usize) -> Array2<bool> {
    let cx = (width / 2) as i64;
    let cy = (height / 2) as i64;
    let radius = cx.min(cy) - MASK_MARGIN;

    Array2::from_shape_fn((height, width), |(y, x)| {
        if radius < 0 {
            return false;
        }
        let dx = x as i64 - cx;
        let dy = y as i64 - cy;
        dx * dx + dy * dy <= radius * radius
    })
}

/// Zero every value outside the mask
pub fn apply_mask(grid: &mut Array2<f32>, mask: &Array2<bool>) {
    grid.zip_mut_with(mask, |v, &inside| {
        if !inside {
            *v = 0.0;
        }
    });
}

/// Min-max normalize the values inside the mask to [0, 1]
///
/// Left untouched when the masked values are constant or the mask is empty.
pub fn normalize_masked(grid: &mut Array2<f32>, mask: &Array2<bool>) {
    let (min, max) = grid
        .iter()
        .zip(mask.iter())
        .filter(|(_, inside)| **inside)
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), (&v, _)| {
            (lo.min(v), hi.max(v))
        });

    if max > min {
        let range = max - min;
        grid.zip_mut_with(mask, |v, &inside| {
            if inside {
                *v = (*v - min) / range;
            }
        });
    }
}

/// Percentile with linear interpolation between order statistics
pub fn percentile(values: &[f32], q: f64) -> Option<f32> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (q / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = (rank - lower as f64) as f32;

    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}

/// Zero every value strictly below `threshold`
pub fn threshold_below(grid: &mut Array2<f32>, threshold: f32) {
    grid.mapv_inplace(|v| if v < threshold { 0.0 } else { v });
}

/// Sigma used for a kernel size when none is given
pub fn sigma_for_kernel(ksize: usize) -> f64 {
    0.3 * ((ksize as f64 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Normalized 1-D Gaussian kernel
pub fn gaussian_kernel(ksize: usize, sigma: f64) -> Vec<f32> {
    let center = (ksize / 2) as f64;
    let weights: Vec<f64> = (0..ksize)
        .map(|i| {
            let d = i as f64 - center;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.iter().map(|w| (w / sum) as f32).collect()
}

/// Mirror an out-of-range index without repeating the edge pixel
fn reflect_101(index: i64, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let len = len as i64;
    let mut i = index;
    while i < 0 || i >= len {
        i = if i < 0 { -i } else { 2 * len - 2 - i };
    }
    i as usize
}

/// Separable Gaussian blur with reflect-101 borders
pub fn gaussian_blur(grid: &Array2<f32>, ksize: usize) -> Array2<f32> {
    let (height, width) = grid.dim();
    if height == 0 || width == 0 {
        return grid.clone();
    }

    let kernel = gaussian_kernel(ksize, sigma_for_kernel(ksize));
    let half = (ksize / 2) as i64;

    let horizontal = Array2::from_shape_fn((height, width), |(y, x)| {
        kernel
            .iter()
            .enumerate()
            .map(|(k, w)| w * grid[[y, reflect_101(x as i64 + k as i64 - half, width)]])
            .sum::<f32>()
    });

    Array2::from_shape_fn((height, width), |(y, x)| {
        kernel
            .iter()
            .enumerate()
            .map(|(k, w)| w * horizontal[[reflect_101(y as i64 + k as i64 - half, height), x]])
            .sum::<f32>()
    })
}

/// Full post-processing of a raw gradient grid into a heat grid in [0, 1]
pub fn postprocess(grid: &Array2<f32>, height: usize, width: usize) -> Array2<f32> {
    let mut heat = resize_bilinear(grid, height, width);

    let mask = circular_mask(height, width);
    apply_mask(&mut heat, &mask);
    normalize_masked(&mut heat, &mask);

    let masked: Vec<f32> = heat
        .iter()
        .zip(mask.iter())
        .filter(|(_, inside)| **inside)
        .map(|(&v, _)| v)
        .collect();
    if let Some(threshold) = percentile(&masked, THRESHOLD_PERCENTILE) {
        threshold_below(&mut heat, threshold);
    }

    gaussian_blur(&heat, BLUR_KERNEL_SIZE)
}
