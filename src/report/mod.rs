use serde::Serialize;

use crate::shadow::{CompositeResult, field::FootPoint, light::LightSource};

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub width: u32,
    pub height: u32,
    pub light: LightSection,
    pub shadow: ShadowSection,
    pub mask: MaskSection,
}

#[derive(Debug, Clone, Serialize)]
pub struct LightSection {
    pub angle_degrees: f64,
    pub elevation_degrees: f64,
    pub direction: [f64; 2],
}

#[derive(Debug, Clone, Serialize)]
pub struct ShadowSection {
    pub length: f64,
    pub displacement: [i64; 2],
    pub foot_point: FootPoint,
    pub mean_opacity: f32,
    pub max_opacity: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct MaskSection {
    /// Fraction of pixels counted toward the foot point.
    pub coverage: f64,
    pub threshold: f32,
}

impl RunReport {
    pub fn new(result: &CompositeResult, light: &LightSource, foot_threshold: f32) -> Self {
        let (width, height) = result.dimensions();
        let geometry = &result.geometry;

        let pixels = result.mask_field.len().max(1) as f64;
        let covered = result.mask_field.iter().filter(|&&v| v > foot_threshold).count();

        Self {
            width,
            height,
            light: LightSection {
                angle_degrees: light.angle_degrees,
                elevation_degrees: light.elevation_degrees,
                direction: [geometry.direction.0, geometry.direction.1],
            },
            shadow: ShadowSection {
                length: geometry.length,
                displacement: [geometry.displacement.0, geometry.displacement.1],
                foot_point: geometry.foot,
                mean_opacity: result.shadow_field.mean().unwrap_or(0.0),
                max_opacity: result.shadow_field.iter().cloned().fold(0.0f32, f32::max),
            },
            mask: MaskSection {
                coverage: covered as f64 / pixels,
                threshold: foot_threshold,
            },
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shadow::ShadowCompositor;
    use image::{Rgb, RgbImage};
    use ndarray::Array2;

    #[test]
    fn test_report_summarises_run() {
        let fg = RgbImage::from_pixel(40, 40, Rgb([255, 0, 0]));
        let mask = Array2::from_shape_fn((40, 40), |(y, x)| {
            if (10..30).contains(&y) && (10..30).contains(&x) { 1.0 } else { 0.0 }
        });
        let bg = RgbImage::from_pixel(40, 40, Rgb([0, 0, 255]));
        let light = LightSource::default();
        let result = ShadowCompositor::new().render(&fg, &mask, &bg, &light).unwrap();

        let report = RunReport::new(&result, &light, 0.2);
        assert_eq!((report.width, report.height), (40, 40));
        assert!((report.mask.coverage - 0.25).abs() < 1e-9);
        assert_eq!(report.shadow.foot_point, FootPoint { x: 19, y: 29 });
        assert!(report.shadow.max_opacity <= 1.0);

        let json = report.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["shadow"]["displacement"][0], -222);
        assert_eq!(value["light"]["angle_degrees"], 135.0);
    }
}
