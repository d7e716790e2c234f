use image::{GrayImage, Luma, Rgb, RgbImage};
use ndarray::{Array2, Array3};

use crate::error::{CompositeError, Result};

pub fn ensure_non_empty(width: u32, height: u32, what: &str) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(CompositeError::InvalidInput(format!(
            "{what} has degenerate dimensions {width}x{height}"
        )));
    }
    Ok(())
}

/// `(H, W, 3)` array of channel intensities in `0.0..=255.0`.
pub fn rgb_to_array(image: &RgbImage) -> Array3<f32> {
    let (width, height) = image.dimensions();
    let mut arr = Array3::zeros((height as usize, width as usize, 3));

    for (x, y, pixel) in image.enumerate_pixels() {
        for c in 0..3 {
            arr[[y as usize, x as usize, c]] = pixel[c] as f32;
        }
    }

    arr
}

/// Values are clamped to `0..=255` and truncated toward zero.
pub fn array_to_rgb(arr: &Array3<f32>) -> RgbImage {
    let (height, width, _) = arr.dim();
    let mut image = RgbImage::new(width as u32, height as u32);

    for y in 0..height {
        for x in 0..width {
            let channel = |c: usize| arr[[y, x, c]].clamp(0.0, 255.0) as u8;
            image.put_pixel(x as u32, y as u32, Rgb([channel(0), channel(1), channel(2)]));
        }
    }

    image
}

/// Grayscale image to unit opacities (`value / 255`).
pub fn gray_to_unit(image: &GrayImage) -> Array2<f32> {
    let (width, height) = image.dimensions();
    let mut arr = Array2::zeros((height as usize, width as usize));

    for (x, y, pixel) in image.enumerate_pixels() {
        arr[[y as usize, x as usize]] = pixel[0] as f32 / 255.0;
    }

    arr
}

/// Unit opacities to grayscale (`value * 255`, truncated).
pub fn unit_to_gray(arr: &Array2<f32>) -> GrayImage {
    let (height, width) = arr.dim();
    let mut image = GrayImage::new(width as u32, height as u32);

    for y in 0..height {
        for x in 0..width {
            let value = (arr[[y, x]] * 255.0).clamp(0.0, 255.0) as u8;
            image.put_pixel(x as u32, y as u32, Luma([value]));
        }
    }

    image
}

/// 0/255 image of the pixels matching `predicate`, the input format for the
/// binary operators in `imageproc`.
pub fn binary_gray<F>(arr: &Array2<f32>, predicate: F) -> GrayImage
where
    F: Fn(f32) -> bool,
{
    let (height, width) = arr.dim();
    let mut image = GrayImage::new(width as u32, height as u32);

    for ((y, x), &value) in arr.indexed_iter() {
        if predicate(value) {
            image.put_pixel(x as u32, y as u32, Luma([255]));
        }
    }

    image
}

/// Mirror an out-of-range index back into `0..n` without repeating the edge
/// sample (`gfedcb|abcdefgh|gfedcba`).
pub fn reflect_101(index: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }

    let last = n as isize - 1;
    let mut i = index;
    while i < 0 || i > last {
        if i < 0 {
            i = -i;
        }
        if i > last {
            i = 2 * last - i;
        }
    }

    i as usize
}

#[derive(Debug, Clone, Copy)]
struct LinearTap {
    lo: usize,
    hi: usize,
    frac: f32,
}

/// Source taps for a pixel-center aligned linear resample of one axis.
fn linear_taps(src_len: usize, dst_len: usize) -> Vec<LinearTap> {
    let scale = src_len as f64 / dst_len as f64;

    (0..dst_len)
        .map(|d| {
            let s = (d as f64 + 0.5) * scale - 0.5;
            let mut lo = s.floor();
            let mut frac = s - lo;

            if lo < 0.0 {
                lo = 0.0;
                frac = 0.0;
            }
            if lo >= (src_len - 1) as f64 {
                lo = (src_len - 1) as f64;
                frac = 0.0;
            }

            let lo = lo as usize;
            LinearTap {
                lo,
                hi: (lo + 1).min(src_len - 1),
                frac: frac as f32,
            }
        })
        .collect()
}

/// Bilinear resize of a single-channel field to `(height, width)`.
pub fn resize_bilinear(field: &Array2<f32>, height: usize, width: usize) -> Array2<f32> {
    let (src_h, src_w) = field.dim();
    if (src_h, src_w) == (height, width) {
        return field.clone();
    }

    let rows = linear_taps(src_h, height);
    let cols = linear_taps(src_w, width);

    Array2::from_shape_fn((height, width), |(y, x)| {
        let r = rows[y];
        let c = cols[x];
        let top = field[[r.lo, c.lo]] * (1.0 - c.frac) + field[[r.lo, c.hi]] * c.frac;
        let bottom = field[[r.hi, c.lo]] * (1.0 - c.frac) + field[[r.hi, c.hi]] * c.frac;
        top * (1.0 - r.frac) + bottom * r.frac
    })
}

/// Bilinear resize of an `(H, W, 3)` image array, sampling every channel at
/// the same positions as [`resize_bilinear`].
pub fn resize_bilinear_rgb(image: &Array3<f32>, height: usize, width: usize) -> Array3<f32> {
    let (src_h, src_w, channels) = image.dim();
    if (src_h, src_w) == (height, width) {
        return image.clone();
    }

    let rows = linear_taps(src_h, height);
    let cols = linear_taps(src_w, width);

    Array3::from_shape_fn((height, width, channels), |(y, x, ch)| {
        let r = rows[y];
        let c = cols[x];
        let top = image[[r.lo, c.lo, ch]] * (1.0 - c.frac) + image[[r.lo, c.hi, ch]] * c.frac;
        let bottom = image[[r.hi, c.lo, ch]] * (1.0 - c.frac) + image[[r.hi, c.hi, ch]] * c.frac;
        top * (1.0 - r.frac) + bottom * r.frac
    })
}

/// Shift a field by whole pixels: `out[y, x] = field[y - dy, x - dx]`, zero
/// where the source falls outside. With integer offsets a bilinear resample
/// reduces to this exact copy.
pub fn translate(field: &Array2<f32>, dx: i64, dy: i64) -> Array2<f32> {
    let (height, width) = field.dim();
    let mut out = Array2::zeros((height, width));

    for y in 0..height {
        let sy = y as i64 - dy;
        if sy < 0 || sy >= height as i64 {
            continue;
        }
        for x in 0..width {
            let sx = x as i64 - dx;
            if sx < 0 || sx >= width as i64 {
                continue;
            }
            out[[y, x]] = field[[sy as usize, sx as usize]];
        }
    }

    out
}

/// Kernel size used for a float Gaussian of the given sigma: `round(8σ + 1)`
/// forced odd.
pub fn gaussian_kernel_size(sigma: f64) -> usize {
    ((sigma * 8.0 + 1.0).round() as usize) | 1
}

/// Normalized 1-D Gaussian kernel. `sigma <= 0` derives sigma from the size
/// and small sizes use the fixed binomial taps.
pub fn gaussian_kernel(size: usize, sigma: f64) -> Vec<f32> {
    if sigma <= 0.0 {
        match size {
            1 => return vec![1.0],
            3 => return vec![0.25, 0.5, 0.25],
            5 => return vec![0.0625, 0.25, 0.375, 0.25, 0.0625],
            7 => return vec![0.03125, 0.109375, 0.21875, 0.28125, 0.21875, 0.109375, 0.03125],
            _ => {}
        }
    }

    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((size as f64 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let center = (size as f64 - 1.0) / 2.0;
    let scale = -0.5 / (sigma * sigma);

    let weights = (0..size)
        .map(|i| {
            let x = i as f64 - center;
            (scale * x * x).exp()
        })
        .collect::<Vec<_>>();
    let sum = weights.iter().sum::<f64>();

    weights.iter().map(|w| (w / sum) as f32).collect()
}

fn convolve_line(line: &[f32], kernel: &[f32], padded: &mut Vec<f32>, out: &mut [f32]) {
    let n = line.len();
    let radius = kernel.len() / 2;

    padded.clear();
    padded.extend((0..n + 2 * radius).map(|i| line[reflect_101(i as isize - radius as isize, n)]));

    for (x, value) in out.iter_mut().enumerate() {
        *value = padded[x..x + kernel.len()]
            .iter()
            .zip(kernel)
            .map(|(p, k)| p * k)
            .sum();
    }
}

/// Separable convolution with the same odd-length kernel along both axes,
/// reflect-101 borders.
pub fn convolve_separable(field: &Array2<f32>, kernel: &[f32]) -> Array2<f32> {
    let (height, width) = field.dim();
    let mut padded = Vec::new();

    let mut horizontal = Array2::zeros((height, width));
    let mut line = vec![0.0f32; width];
    let mut out = vec![0.0f32; width];
    for y in 0..height {
        for x in 0..width {
            line[x] = field[[y, x]];
        }
        convolve_line(&line, kernel, &mut padded, &mut out);
        for x in 0..width {
            horizontal[[y, x]] = out[x];
        }
    }

    let mut result = Array2::zeros((height, width));
    let mut line = vec![0.0f32; height];
    let mut out = vec![0.0f32; height];
    for x in 0..width {
        for y in 0..height {
            line[y] = horizontal[[y, x]];
        }
        convolve_line(&line, kernel, &mut padded, &mut out);
        for y in 0..height {
            result[[y, x]] = out[y];
        }
    }

    result
}

pub fn gaussian_blur(field: &Array2<f32>, sigma: f64) -> Array2<f32> {
    let kernel = gaussian_kernel(gaussian_kernel_size(sigma), sigma);
    convolve_separable(field, &kernel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reflect_101_mirrors_without_edge_repeat() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(-2, 5), 2);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(6, 5), 2);
        assert_eq!(reflect_101(3, 5), 3);
        assert_eq!(reflect_101(-7, 1), 0);
        // Radius larger than the line folds back more than once.
        assert!(reflect_101(-40, 4) < 4);
        assert!(reflect_101(40, 4) < 4);
    }

    #[test]
    fn test_gaussian_kernel_normalized_and_symmetric() {
        for sigma in [3.0, 7.0, 15.0, 30.0] {
            let size = gaussian_kernel_size(sigma);
            assert_eq!(size % 2, 1);
            let kernel = gaussian_kernel(size, sigma);
            let sum: f32 = kernel.iter().sum();
            assert!((sum - 1.0).abs() < 1e-4);
            assert!((kernel[0] - kernel[size - 1]).abs() < 1e-9);
        }
        assert_eq!(gaussian_kernel_size(3.0), 25);
        assert_eq!(gaussian_kernel_size(30.0), 241);
    }

    #[test]
    fn test_blur_preserves_constant_field() {
        let field = Array2::from_elem((12, 9), 0.7f32);
        let blurred = gaussian_blur(&field, 7.0);
        assert!(blurred.iter().all(|v| (v - 0.7).abs() < 1e-4));
    }

    #[test]
    fn test_translate_shifts_and_pads_with_zero() {
        let mut field = Array2::zeros((4, 4));
        field[[1, 1]] = 1.0;
        let moved = translate(&field, 2, -1);
        assert_eq!(moved[[0, 3]], 1.0);
        assert_eq!(moved.sum(), 1.0);

        let gone = translate(&field, 10, 0);
        assert_eq!(gone.sum(), 0.0);
    }

    #[test]
    fn test_resize_bilinear_keeps_range_and_shape() {
        let field = Array2::from_shape_fn((10, 20), |(y, x)| ((x + y) % 2) as f32);
        let resized = resize_bilinear(&field, 33, 7);
        assert_eq!(resized.dim(), (33, 7));
        assert!(resized.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_unit_gray_conversion_truncates() {
        let field = Array2::from_elem((2, 2), 0.5f32);
        let gray = unit_to_gray(&field);
        assert_eq!(gray.get_pixel(0, 0)[0], 127);
        let back = gray_to_unit(&gray);
        assert!((back[[1, 1]] - 127.0 / 255.0).abs() < 1e-6);
    }
}
