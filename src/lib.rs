use std::{fs, path::Path};

use image::RgbImage;
use log::info;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{
    error::{CompositeError, Result},
    image_utils::{ensure_non_empty, gray_to_unit},
    report::RunReport,
    segmentation::{ForegroundSegmenter, SegmenterConfig},
    shadow::{CompositeResult, ShadowCompositor, ShadowConfig, light::LightSource},
};

pub mod error;
pub mod image_utils;
pub mod output;
pub mod report;
pub mod segmentation;
pub mod shadow;

pub use segmentation::extract_foreground_mask;
pub use shadow::generate_shadow;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub segmenter: SegmenterConfig,
    pub shadow: ShadowConfig,
}

impl PipelineConfig {
    /// Load overrides from a JSON file; missing fields keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.segmenter.validate()?;
        self.shadow.validate()
    }
}

/// Load an image file as 8-bit RGB, rejecting empty images.
pub fn load_rgb<P: AsRef<Path>>(path: P) -> Result<RgbImage> {
    let image = image::open(&path)?.to_rgb8();
    let (width, height) = image.dimensions();
    ensure_non_empty(width, height, &path.as_ref().display().to_string())?;
    Ok(image)
}

/// Load a grayscale mask file as opacities in `[0, 1]`.
pub fn load_mask<P: AsRef<Path>>(path: P) -> Result<Array2<f32>> {
    let image = image::open(&path)?.to_luma8();
    let (width, height) = image.dimensions();
    ensure_non_empty(width, height, &path.as_ref().display().to_string())?;
    Ok(gray_to_unit(&image))
}

/// One foreground/background pair taken from loading through compositing.
pub struct CompositePipeline {
    foreground: RgbImage,
    background: RgbImage,
    mask: Option<Array2<f32>>,
    light: LightSource,
    config: PipelineConfig,
}

impl CompositePipeline {
    pub fn from_paths<P: AsRef<Path>, Q: AsRef<Path>>(foreground: P, background: Q) -> Result<Self> {
        let fg = load_rgb(foreground)?;
        let bg = load_rgb(background)?;
        Ok(Self::from_images(fg, bg))
    }

    pub fn from_images(foreground: RgbImage, background: RgbImage) -> Self {
        Self {
            foreground,
            background,
            mask: None,
            light: LightSource::default(),
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_light(mut self, light: LightSource) -> Self {
        self.light = light;
        self
    }

    /// Use a precomputed mask (foreground `(H, W)`) instead of segmenting.
    pub fn with_mask(mut self, mask: Array2<f32>) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn light(&self) -> &LightSource {
        &self.light
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self) -> Result<CompositeResult> {
        self.config.validate()?;
        self.light.validate()?;

        let (fg_w, fg_h) = self.foreground.dimensions();
        ensure_non_empty(fg_w, fg_h, "foreground image")?;

        let segmented;
        let mask = match &self.mask {
            Some(mask) => {
                if mask.dim() != (fg_h as usize, fg_w as usize) {
                    return Err(CompositeError::InvalidInput(format!(
                        "supplied mask is {}x{}, foreground is {}x{}",
                        mask.ncols(),
                        mask.nrows(),
                        fg_w,
                        fg_h
                    )));
                }
                info!("Using supplied mask");
                mask
            }
            None => {
                info!("Extracting foreground mask...");
                segmented = ForegroundSegmenter::with_config(self.config.segmenter.clone())
                    .extract_mask(&self.foreground)?;
                &segmented
            }
        };

        ShadowCompositor::with_config(self.config.shadow.clone()).render(
            &self.foreground,
            mask,
            &self.background,
            &self.light,
        )
    }

    pub fn report(&self, result: &CompositeResult) -> RunReport {
        RunReport::new(result, &self.light, self.config.shadow.foot_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_config_json_overrides_keep_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(
            &path,
            r#"{ "shadow": { "falloff_distance": 80.0, "blur_sigmas": [2.0, 4.0] }, "segmenter": { "iterations": 3 } }"#,
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.shadow.falloff_distance, 80.0);
        assert_eq!(config.shadow.blur_sigmas, vec![2.0, 4.0]);
        assert_eq!(config.shadow.contact_strength, 0.85);
        assert_eq!(config.segmenter.iterations, 3);
        assert_eq!(config.segmenter.gmm_components, 5);
    }

    #[test]
    fn test_invalid_config_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "shadow": { "contact_decay": -1.0 } }"#).unwrap();
        assert!(matches!(
            PipelineConfig::from_json_file(&path),
            Err(CompositeError::InvalidParameter(_))
        ));

        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            PipelineConfig::from_json_file(&path),
            Err(CompositeError::Config(_))
        ));
    }

    #[test]
    fn test_missing_file_is_invalid_input() {
        let err = load_rgb("/nonexistent/foreground.png").unwrap_err();
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_supplied_mask_shape_is_checked() {
        let fg = RgbImage::from_pixel(10, 10, Rgb([1, 2, 3]));
        let bg = RgbImage::from_pixel(10, 10, Rgb([4, 5, 6]));
        let pipeline = CompositePipeline::from_images(fg, bg).with_mask(Array2::ones((5, 10)));
        assert!(matches!(pipeline.run(), Err(CompositeError::InvalidInput(_))));
    }

    #[test]
    fn test_non_finite_light_is_invalid_parameter() {
        let fg = RgbImage::from_pixel(10, 10, Rgb([1, 2, 3]));
        let bg = RgbImage::from_pixel(10, 10, Rgb([4, 5, 6]));
        let pipeline = CompositePipeline::from_images(fg, bg)
            .with_mask(Array2::ones((10, 10)))
            .with_light(LightSource::new(f64::NAN, 35.0));
        assert!(matches!(pipeline.run(), Err(CompositeError::InvalidParameter(_))));
    }
}
