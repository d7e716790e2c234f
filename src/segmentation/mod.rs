pub mod gmm;
pub mod grabcut;
pub mod graph;

use image::{DynamicImage, RgbImage};
use imageproc::{distance_transform::Norm, morphology::close};
use log::{debug, info};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{
    error::{CompositeError, Result},
    image_utils::{binary_gray, convolve_separable, ensure_non_empty, gaussian_kernel, gray_to_unit},
    segmentation::grabcut::{GrabCutParams, grabcut},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Seed rectangle as fractions of the image size.
    pub rect_left: f64,
    pub rect_top: f64,
    pub rect_width: f64,
    pub rect_height: f64,
    pub iterations: usize,
    /// Mixture components per color model.
    pub gmm_components: usize,
    /// Smoothness weight between neighbouring pixels.
    pub gamma: f64,
    /// Side of the square closing element.
    pub closing_kernel: u32,
    /// Side of the Gaussian kernel that softens the mask edge.
    pub blur_kernel: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            rect_left: 0.15,
            rect_top: 0.05,
            rect_width: 0.7,
            rect_height: 0.9,
            iterations: 5,
            gmm_components: 5,
            gamma: 50.0,
            closing_kernel: 5,
            blur_kernel: 5,
        }
    }
}

impl SegmenterConfig {
    pub fn validate(&self) -> Result<()> {
        let fractions = [
            ("rect_left", self.rect_left),
            ("rect_top", self.rect_top),
            ("rect_width", self.rect_width),
            ("rect_height", self.rect_height),
        ];
        for (name, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(CompositeError::InvalidParameter(format!(
                    "{name} must be a fraction in [0, 1], got {value}"
                )));
            }
        }

        if self.iterations == 0 {
            return Err(CompositeError::InvalidParameter("iterations must be at least 1".into()));
        }
        if self.gmm_components == 0 {
            return Err(CompositeError::InvalidParameter("gmm_components must be at least 1".into()));
        }
        if !self.gamma.is_finite() || self.gamma < 0.0 {
            return Err(CompositeError::InvalidParameter(format!(
                "gamma must be finite and non-negative, got {}",
                self.gamma
            )));
        }
        if self.closing_kernel % 2 == 0 || self.closing_kernel > 511 {
            return Err(CompositeError::InvalidParameter(format!(
                "closing_kernel must be odd and at most 511, got {}",
                self.closing_kernel
            )));
        }
        if self.blur_kernel % 2 == 0 {
            return Err(CompositeError::InvalidParameter(format!(
                "blur_kernel must be odd, got {}",
                self.blur_kernel
            )));
        }

        Ok(())
    }
}

/// Probable-foreground seed in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl SeedRect {
    /// Scale the configured fractions to an image, truncating each value and
    /// clipping the rectangle to the image bounds.
    pub fn from_config(width: u32, height: u32, config: &SegmenterConfig) -> Self {
        let x = ((width as f64 * config.rect_left) as u32).min(width);
        let y = ((height as f64 * config.rect_top) as u32).min(height);
        let w = (width as f64 * config.rect_width) as u32;
        let h = (height as f64 * config.rect_height) as u32;

        Self {
            x,
            y,
            width: w.min(width - x),
            height: h.min(height - y),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

pub struct ForegroundSegmenter {
    config: SegmenterConfig,
}

impl ForegroundSegmenter {
    pub fn new() -> Self {
        Self::with_config(SegmenterConfig::default())
    }

    pub fn with_config(config: SegmenterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Soft subject mask of shape `(H, W)` with values in `[0, 1]`.
    pub fn extract_mask(&self, image: &RgbImage) -> Result<Array2<f32>> {
        self.config.validate()?;

        let (width, height) = image.dimensions();
        ensure_non_empty(width, height, "foreground image")?;

        let rect = SeedRect::from_config(width, height, &self.config);
        info!(
            "Segmenting {}x{} image, seed rectangle {}x{} at ({}, {})",
            width, height, rect.width, rect.height, rect.x, rect.y
        );

        let params = GrabCutParams {
            iterations: self.config.iterations,
            components: self.config.gmm_components,
            gamma: self.config.gamma,
        };
        let labels = grabcut(image, rect, params)?;

        let binary = labels.mapv(|label| if label.is_foreground() { 1.0f32 } else { 0.0 });
        debug!("Segmentation selected {} foreground pixels", binary.sum() as usize);

        Ok(self.refine(&binary))
    }

    pub fn extract_mask_from(&self, image: &DynamicImage) -> Result<Array2<f32>> {
        self.extract_mask(&image.to_rgb8())
    }

    /// Close small holes, then blur the hard edge into an opacity ramp.
    fn refine(&self, binary: &Array2<f32>) -> Array2<f32> {
        let radius = (self.config.closing_kernel / 2) as u8;
        let closed = if radius > 0 {
            close(&binary_gray(binary, |v| v > 0.5), Norm::LInf, radius)
        } else {
            binary_gray(binary, |v| v > 0.5)
        };

        let kernel = gaussian_kernel(self.config.blur_kernel, 0.0);
        convolve_separable(&gray_to_unit(&closed), &kernel).mapv(|v| v.clamp(0.0, 1.0))
    }
}

impl Default for ForegroundSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

/// Segment `image` with the default [`SegmenterConfig`].
pub fn extract_foreground_mask(image: &RgbImage) -> Result<Array2<f32>> {
    ForegroundSegmenter::new().extract_mask(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn subject_on_plain(size: u32) -> RgbImage {
        let lo = size / 4;
        let hi = size - size / 4;
        RgbImage::from_fn(size, size, |x, y| {
            if (lo..hi).contains(&x) && (lo..hi).contains(&y) {
                Rgb([240, 220, 90])
            } else {
                Rgb([40, 70, 120])
            }
        })
    }

    #[test]
    fn test_default_seed_rect_matches_fractions() {
        let rect = SeedRect::from_config(400, 200, &SegmenterConfig::default());
        assert_eq!(rect, SeedRect { x: 60, y: 10, width: 280, height: 180 });
    }

    #[test]
    fn test_seed_rect_degenerates_on_thin_images() {
        let rect = SeedRect::from_config(1, 300, &SegmenterConfig::default());
        assert!(rect.is_empty());
    }

    #[test]
    fn test_mask_shape_and_range() {
        let image = subject_on_plain(48);
        let mask = extract_foreground_mask(&image).unwrap();

        assert_eq!(mask.dim(), (48, 48));
        assert!(mask.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!(mask[[24, 24]] > 0.99);
        assert!(mask[[1, 1]] < 0.01);
    }

    #[test]
    fn test_mask_edge_is_soft() {
        let image = subject_on_plain(48);
        let mask = extract_foreground_mask(&image).unwrap();
        let ramp = mask.iter().filter(|&&v| v > 0.05 && v < 0.95).count();
        assert!(ramp > 0);
    }

    #[test]
    fn test_zero_sized_image_is_invalid_input() {
        let image = RgbImage::new(0, 10);
        let err = extract_foreground_mask(&image).unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_extreme_aspect_ratio_is_invalid_input() {
        let image = RgbImage::from_pixel(1, 64, Rgb([10, 10, 10]));
        let err = extract_foreground_mask(&image).unwrap_err();
        assert!(matches!(err, CompositeError::InvalidInput(_)));
    }

    #[test]
    fn test_config_rejects_even_kernels() {
        let config = SegmenterConfig {
            blur_kernel: 4,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SegmenterConfig {
            rect_width: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CompositeError::InvalidParameter(_))));
    }
}
