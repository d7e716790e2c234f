pub mod field;
pub mod light;

use image::{GrayImage, RgbImage};
use log::{debug, info};
use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::{
    error::{CompositeError, Result},
    image_utils::{
        array_to_rgb, ensure_non_empty, resize_bilinear, resize_bilinear_rgb, rgb_to_array, translate,
        unit_to_gray,
    },
    shadow::{
        field::{ContactParams, FootPoint, contact_shadow, directional_distance, foot_point, merge_shadow, soft_shadow},
        light::LightSource,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    /// Shadow length in pixels at 45° elevation.
    pub base_length: f64,
    /// Lower bound on `tan(elevation)`, caps the shadow at
    /// `base_length / min_elevation_tangent`.
    pub min_elevation_tangent: f64,
    /// Mask opacity a pixel must exceed to count toward the foot point.
    pub foot_threshold: f32,
    /// Decay distance of the cast shadow, in pixels.
    pub falloff_distance: f32,
    /// Gaussian sigmas averaged into the penumbra.
    pub blur_sigmas: Vec<f64>,
    /// Decay distance of the contact shadow, in pixels.
    pub contact_decay: f32,
    /// Peak opacity of the contact shadow.
    pub contact_strength: f32,
    /// Rows above the foot point that still get contact shadow.
    pub contact_band: usize,
    /// Mask opacity at which a pixel is solid subject for the contact
    /// distance transform.
    pub contact_subject_threshold: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            base_length: 220.0,
            min_elevation_tangent: 0.2,
            foot_threshold: 0.2,
            falloff_distance: 160.0,
            blur_sigmas: vec![3.0, 7.0, 15.0, 30.0],
            contact_decay: 4.0,
            contact_strength: 0.85,
            contact_band: 5,
            contact_subject_threshold: 0.5,
        }
    }
}

impl ShadowConfig {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("base_length", self.base_length),
            ("min_elevation_tangent", self.min_elevation_tangent),
            ("falloff_distance", self.falloff_distance as f64),
            ("contact_decay", self.contact_decay as f64),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(CompositeError::InvalidParameter(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }

        if self.blur_sigmas.is_empty() {
            return Err(CompositeError::InvalidParameter("blur_sigmas must not be empty".into()));
        }
        if let Some(sigma) = self.blur_sigmas.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
            return Err(CompositeError::InvalidParameter(format!(
                "blur sigmas must be positive, got {sigma}"
            )));
        }

        let unit = [
            ("foot_threshold", self.foot_threshold),
            ("contact_strength", self.contact_strength),
            ("contact_subject_threshold", self.contact_subject_threshold),
        ];
        for (name, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(CompositeError::InvalidParameter(format!(
                    "{name} must be in [0, 1], got {value}"
                )));
            }
        }

        Ok(())
    }
}

/// Where the shadow was cast from and how far it was thrown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ShadowGeometry {
    pub direction: (f64, f64),
    pub length: f64,
    pub displacement: (i64, i64),
    pub foot: FootPoint,
}

#[derive(Debug, Clone)]
pub struct CompositeResult {
    pub composite: RgbImage,
    pub shadow_only: GrayImage,
    pub mask_debug: GrayImage,
    /// Shadow opacity, shape `(H, W)` of the background.
    pub shadow_field: Array2<f32>,
    /// Subject mask resized to the background, shape `(H, W)`.
    pub mask_field: Array2<f32>,
    pub geometry: ShadowGeometry,
}

impl CompositeResult {
    pub fn dimensions(&self) -> (u32, u32) {
        self.composite.dimensions()
    }
}

pub struct ShadowCompositor {
    config: ShadowConfig,
}

impl ShadowCompositor {
    pub fn new() -> Self {
        Self::with_config(ShadowConfig::default())
    }

    pub fn with_config(config: ShadowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    /// Cast the subject's shadow onto `background` and composite the subject
    /// over it. `mask` must have the foreground's `(H, W)` shape; the
    /// foreground and mask are resized to the background first.
    pub fn render(
        &self,
        foreground: &RgbImage,
        mask: &Array2<f32>,
        background: &RgbImage,
        light: &LightSource,
    ) -> Result<CompositeResult> {
        self.config.validate()?;
        light.validate()?;

        let (fg_w, fg_h) = foreground.dimensions();
        let (bg_w, bg_h) = background.dimensions();
        ensure_non_empty(fg_w, fg_h, "foreground image")?;
        ensure_non_empty(bg_w, bg_h, "background image")?;
        if mask.dim() != (fg_h as usize, fg_w as usize) {
            return Err(CompositeError::InvalidInput(format!(
                "mask shape {:?} does not match the {}x{} foreground",
                mask.dim(),
                fg_w,
                fg_h
            )));
        }

        let (height, width) = (bg_h as usize, bg_w as usize);
        let fg = resize_bilinear_rgb(&rgb_to_array(foreground), height, width);
        let mask = resize_bilinear(mask, height, width);
        let bg = rgb_to_array(background);

        let direction = light.direction();
        let length = light.shadow_length(self.config.base_length, self.config.min_elevation_tangent);
        let displacement = light.displacement(self.config.base_length, self.config.min_elevation_tangent);
        let foot = foot_point(&mask, self.config.foot_threshold)?;

        info!(
            "Casting shadow at {:.1}° / {:.1}°: length {:.1}px, offset ({}, {}), foot ({}, {})",
            light.angle_degrees,
            light.elevation_degrees,
            length,
            displacement.0,
            displacement.1,
            foot.x,
            foot.y
        );

        let silhouette = translate(&mask, displacement.0, displacement.1);
        let distance = directional_distance(height, width, foot, direction);
        let soft = soft_shadow(
            &silhouette,
            &distance,
            &self.config.blur_sigmas,
            self.config.falloff_distance,
        );

        let contact = contact_shadow(
            &mask,
            foot.y,
            ContactParams {
                subject_threshold: self.config.contact_subject_threshold,
                decay: self.config.contact_decay,
                band: self.config.contact_band,
            },
        );
        let shadow = merge_shadow(&soft, &contact, self.config.contact_strength);
        debug!(
            "Shadow field: mean {:.4}, max {:.4}",
            shadow.mean().unwrap_or(0.0),
            shadow.iter().cloned().fold(0.0f32, f32::max)
        );

        let blended = composite(&fg, &mask, &bg, &shadow);

        Ok(CompositeResult {
            composite: array_to_rgb(&blended),
            shadow_only: unit_to_gray(&shadow),
            mask_debug: unit_to_gray(&mask),
            shadow_field: shadow,
            mask_field: mask,
            geometry: ShadowGeometry {
                direction,
                length,
                displacement,
                foot,
            },
        })
    }
}

impl Default for ShadowCompositor {
    fn default() -> Self {
        Self::new()
    }
}

/// `(bg * (1 - shadow)) * (1 - mask) + fg * mask`, with `shadow` and `mask`
/// broadcast over the channel axis. All inputs share the `(H, W)` shape.
pub fn composite(fg: &Array3<f32>, mask: &Array2<f32>, bg: &Array3<f32>, shadow: &Array2<f32>) -> Array3<f32> {
    Array3::from_shape_fn(bg.dim(), |(y, x, c)| {
        let alpha = mask[[y, x]];
        let darkened = bg[[y, x, c]] * (1.0 - shadow[[y, x]]);
        darkened * (1.0 - alpha) + fg[[y, x, c]] * alpha
    })
}

/// Composite with the default [`ShadowConfig`], returning the composite,
/// the shadow-only layer and the mask debug layer.
pub fn generate_shadow(
    foreground: &RgbImage,
    mask: &Array2<f32>,
    background: &RgbImage,
    angle_degrees: f64,
    elevation_degrees: f64,
) -> Result<(RgbImage, GrayImage, GrayImage)> {
    let light = LightSource::new(angle_degrees, elevation_degrees);
    let result = ShadowCompositor::new().render(foreground, mask, background, &light)?;
    Ok((result.composite, result.shadow_only, result.mask_debug))
}
