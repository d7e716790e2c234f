use imageproc::distance_transform::euclidean_squared_distance_transform;
use ndarray::Array2;
use rayon::prelude::*;
use serde::Serialize;

use crate::{
    error::{CompositeError, Result},
    image_utils::{binary_gray, gaussian_blur},
};

/// Approximate ground contact of the subject: the lowest row covered by the
/// mask and the mean column of every covered pixel. A coarse estimate that
/// drifts for subjects with several contact points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FootPoint {
    pub x: usize,
    pub y: usize,
}

pub fn foot_point(mask: &Array2<f32>, threshold: f32) -> Result<FootPoint> {
    let mut max_y = 0usize;
    let mut sum_x = 0u64;
    let mut count = 0u64;

    for ((y, x), &value) in mask.indexed_iter() {
        if value > threshold {
            max_y = max_y.max(y);
            sum_x += x as u64;
            count += 1;
        }
    }

    if count == 0 {
        return Err(CompositeError::DegenerateMask { threshold });
    }

    Ok(FootPoint {
        x: (sum_x as f64 / count as f64) as usize,
        y: max_y,
    })
}

/// Distance of every pixel past the foot point along the light direction,
/// `max(0, (x - fx) * lx + (y - fy) * ly)`, shape `(height, width)`.
pub fn directional_distance(height: usize, width: usize, foot: FootPoint, direction: (f64, f64)) -> Array2<f32> {
    let (lx, ly) = direction;
    Array2::from_shape_fn((height, width), |(y, x)| {
        let d = (x as f64 - foot.x as f64) * lx + (y as f64 - foot.y as f64) * ly;
        d.max(0.0) as f32
    })
}

/// Opacity multiplier for a distance along the shadow.
pub fn falloff(distance: f32, decay: f32) -> f32 {
    (-distance / decay).exp()
}

/// Mean of Gaussian blurs of `field` at each sigma. Passes run in parallel
/// and are summed in the order given.
pub fn multi_scale_blur(field: &Array2<f32>, sigmas: &[f64]) -> Array2<f32> {
    let passes = sigmas
        .par_iter()
        .map(|&sigma| gaussian_blur(field, sigma))
        .collect::<Vec<_>>();

    let mut sum = Array2::<f32>::zeros(field.dim());
    for pass in &passes {
        sum += pass;
    }

    let n = sigmas.len().max(1) as f32;
    sum.mapv_inplace(|v| v / n);
    sum
}

/// Blurred silhouette attenuated by distance from the foot point.
pub fn soft_shadow(silhouette: &Array2<f32>, distance: &Array2<f32>, sigmas: &[f64], decay: f32) -> Array2<f32> {
    let mut blurred = multi_scale_blur(silhouette, sigmas);
    blurred.zip_mut_with(distance, |s, &d| *s *= falloff(d, decay));
    blurred
}

#[derive(Debug, Clone, Copy)]
pub struct ContactParams {
    /// Mask value at or above which a pixel counts as subject.
    pub subject_threshold: f32,
    pub decay: f32,
    /// Rows this far above the foot row still receive contact shadow.
    pub band: usize,
}

/// Sharp shadow `exp(-d / decay)` from the Euclidean distance `d` to the
/// nearest subject pixel, limited to rows at or below `foot_y - band`.
pub fn contact_shadow(mask: &Array2<f32>, foot_y: usize, params: ContactParams) -> Array2<f32> {
    let (height, width) = mask.dim();
    let subject = binary_gray(mask, |v| v >= params.subject_threshold);
    if subject.pixels().all(|p| p[0] == 0) {
        return Array2::zeros((height, width));
    }

    let squared = euclidean_squared_distance_transform(&subject);
    let first_row = foot_y.saturating_sub(params.band);

    Array2::from_shape_fn((height, width), |(y, x)| {
        if y < first_row {
            return 0.0;
        }
        let d = squared.get_pixel(x as u32, y as u32)[0].sqrt() as f32;
        (-d / params.decay).exp()
    })
}

/// `clip(max(soft, strength * contact), 0, 1)`.
pub fn merge_shadow(soft: &Array2<f32>, contact: &Array2<f32>, strength: f32) -> Array2<f32> {
    let mut merged = soft.clone();
    merged.zip_mut_with(contact, |s, &c| *s = s.max(c * strength).clamp(0.0, 1.0));
    merged
}
