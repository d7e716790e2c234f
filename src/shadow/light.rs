use serde::{Deserialize, Serialize};

use crate::error::{CompositeError, Result};

/// A single directional light. The azimuth is a screen-plane angle (image
/// coordinates, y grows downwards); the elevation only controls how long the
/// cast shadow is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightSource {
    pub angle_degrees: f64,
    pub elevation_degrees: f64,
}

impl Default for LightSource {
    fn default() -> Self {
        Self {
            angle_degrees: 135.0,
            elevation_degrees: 35.0,
        }
    }
}

impl LightSource {
    pub fn new(angle_degrees: f64, elevation_degrees: f64) -> Self {
        Self {
            angle_degrees,
            elevation_degrees,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.angle_degrees.is_finite() || !self.elevation_degrees.is_finite() {
            return Err(CompositeError::InvalidParameter(format!(
                "light angle and elevation must be finite, got {} / {}",
                self.angle_degrees, self.elevation_degrees
            )));
        }
        Ok(())
    }

    /// Unit vector `(cos θ, sin θ)`.
    pub fn direction(&self) -> (f64, f64) {
        let theta = self.angle_degrees.to_radians();
        (theta.cos(), theta.sin())
    }

    /// `base_length / max(min_tangent, tan φ)`. The floor keeps low and
    /// past-vertical elevations from blowing up or flipping the shadow.
    pub fn shadow_length(&self, base_length: f64, min_tangent: f64) -> f64 {
        let phi = self.elevation_degrees.to_radians();
        base_length / phi.tan().max(min_tangent)
    }

    /// Whole-pixel silhouette offset, truncated toward zero.
    pub fn displacement(&self, base_length: f64, min_tangent: f64) -> (i64, i64) {
        let (lx, ly) = self.direction();
        let length = self.shadow_length(base_length, min_tangent);
        ((lx * length) as i64, (ly * length) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: f64 = 220.0;
    const FLOOR: f64 = 0.2;

    #[test]
    fn test_default_light() {
        let light = LightSource::default();
        assert_eq!(light.angle_degrees, 135.0);
        assert_eq!(light.elevation_degrees, 35.0);

        let (lx, ly) = light.direction();
        assert!((lx + std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
        assert!((ly - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);

        // 220 / tan(35°) ≈ 314.19
        let length = light.shadow_length(BASE, FLOOR);
        assert!((length - 314.19).abs() < 0.01);
        assert_eq!(light.displacement(BASE, FLOOR), (-222, 222));
    }

    #[test]
    fn test_direction_is_unit_length() {
        for angle in [-720.0, -33.0, 0.0, 90.0, 135.0, 271.5, 1000.0] {
            let (lx, ly) = LightSource::new(angle, 35.0).direction();
            assert!(((lx * lx + ly * ly) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_full_rotation_leaves_direction_unchanged() {
        for angle in [0.0, 45.0, 135.0, 200.0, -90.0] {
            let a = LightSource::new(angle, 35.0).direction();
            let b = LightSource::new(angle + 360.0, 35.0).direction();
            assert!((a.0 - b.0).abs() < 1e-9);
            assert!((a.1 - b.1).abs() < 1e-9);
        }
    }

    #[test]
    fn test_length_bounds_follow_elevation() {
        let overhead = LightSource::new(0.0, 90.0).shadow_length(BASE, FLOOR);
        let grazing = LightSource::new(0.0, 0.0).shadow_length(BASE, FLOOR);
        let low = LightSource::new(0.0, 5.0).shadow_length(BASE, FLOOR);
        let mid = LightSource::new(0.0, 45.0).shadow_length(BASE, FLOOR);

        assert!(overhead < 1e-6);
        assert!((grazing - BASE / FLOOR).abs() < 1e-9);
        assert!((low - BASE / FLOOR).abs() < 1e-9);
        assert!(overhead < mid && mid < grazing);

        for elevation in [-30.0, 0.0, 10.0, 60.0, 89.9, 120.0] {
            let length = LightSource::new(0.0, elevation).shadow_length(BASE, FLOOR);
            assert!(length <= BASE / FLOOR + 1e-9);
            assert!(length >= 0.0);
        }
    }

    #[test]
    fn test_overhead_light_has_no_displacement() {
        let light = LightSource::new(0.0, 90.0);
        assert_eq!(light.displacement(BASE, FLOOR), (0, 0));
    }

    #[test]
    fn test_non_finite_light_is_rejected() {
        assert!(LightSource::new(f64::NAN, 35.0).validate().is_err());
        assert!(LightSource::new(10.0, f64::INFINITY).validate().is_err());
        assert!(LightSource::default().validate().is_ok());
    }
}
