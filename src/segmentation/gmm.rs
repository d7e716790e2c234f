pub type Color = [f64; 3];

/// Added to the covariance diagonal of components whose samples are
/// (near-)collinear, so flat color regions still have an invertible model.
const VARIANCE_FLOOR: f64 = 0.01;

const KMEANS_ITERATIONS: usize = 10;

#[derive(Debug, Clone, Copy, Default)]
struct Component {
    weight: f64,
    mean: Color,
    inverse: [[f64; 3]; 3],
    log_det: f64,
}

impl Component {
    fn log_density(&self, color: &Color) -> f64 {
        let d = [
            color[0] - self.mean[0],
            color[1] - self.mean[1],
            color[2] - self.mean[2],
        ];

        let mut mahalanobis = 0.0;
        for i in 0..3 {
            for j in 0..3 {
                mahalanobis += d[i] * self.inverse[i][j] * d[j];
            }
        }

        -0.5 * self.log_det - 0.5 * mahalanobis
    }
}

/// Full-covariance Gaussian mixture over RGB colors.
#[derive(Debug, Clone)]
pub struct ColorModel {
    components: Vec<Component>,
}

impl ColorModel {
    /// Fit one component per cluster id in `assignments`. Clusters without
    /// samples get zero weight and never contribute to the likelihood.
    pub fn fit(samples: &[Color], assignments: &[usize], component_count: usize) -> Self {
        let mut counts = vec![0usize; component_count];
        let mut sums = vec![[0.0f64; 3]; component_count];
        let mut products = vec![[[0.0f64; 3]; 3]; component_count];

        for (color, &k) in samples.iter().zip(assignments) {
            counts[k] += 1;
            for i in 0..3 {
                sums[k][i] += color[i];
                for j in 0..3 {
                    products[k][i][j] += color[i] * color[j];
                }
            }
        }

        let total = samples.len().max(1) as f64;
        let components = (0..component_count)
            .map(|k| {
                if counts[k] == 0 {
                    return Component::default();
                }

                let n = counts[k] as f64;
                let mean = [sums[k][0] / n, sums[k][1] / n, sums[k][2] / n];
                let mut cov = [[0.0f64; 3]; 3];
                for i in 0..3 {
                    for j in 0..3 {
                        cov[i][j] = products[k][i][j] / n - mean[i] * mean[j];
                    }
                }

                let mut det = determinant(&cov);
                if det <= f64::EPSILON {
                    for (i, row) in cov.iter_mut().enumerate() {
                        row[i] += VARIANCE_FLOOR;
                    }
                    det = determinant(&cov);
                }
                if det <= 0.0 {
                    cov = [[0.0; 3]; 3];
                    for (i, row) in cov.iter_mut().enumerate() {
                        row[i] = VARIANCE_FLOOR;
                    }
                    det = VARIANCE_FLOOR.powi(3);
                }

                Component {
                    weight: n / total,
                    mean,
                    inverse: inverse(&cov, det),
                    log_det: det.ln(),
                }
            })
            .collect();

        Self { components }
    }

    /// Cluster the samples with k-means and fit the mixture to the clusters.
    pub fn from_samples(samples: &[Color], component_count: usize) -> Self {
        let assignments = kmeans(samples, component_count);
        Self::fit(samples, &assignments, component_count)
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    /// `ln p(color)`, up to a constant shared by every model.
    pub fn log_likelihood(&self, color: &Color) -> f64 {
        let terms = self
            .components
            .iter()
            .filter(|c| c.weight > 0.0)
            .map(|c| c.weight.ln() + c.log_density(color))
            .collect::<Vec<_>>();

        let max = terms.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        if !max.is_finite() {
            return max;
        }

        max + terms.iter().map(|t| (t - max).exp()).sum::<f64>().ln()
    }

    /// Index of the populated component with the highest density at `color`.
    pub fn most_likely_component(&self, color: &Color) -> usize {
        let mut best = 0;
        let mut best_density = f64::NEG_INFINITY;

        for (k, component) in self.components.iter().enumerate() {
            if component.weight <= 0.0 {
                continue;
            }
            let density = component.log_density(color);
            if density > best_density {
                best_density = density;
                best = k;
            }
        }

        best
    }
}

fn determinant(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn inverse(m: &[[f64; 3]; 3], det: f64) -> [[f64; 3]; 3] {
    let inv_det = 1.0 / det;
    [
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
        ],
    ]
}

fn squared_distance(a: &Color, b: &Color) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
}

fn nearest_center(color: &Color, centers: &[Color]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (k, center) in centers.iter().enumerate() {
        let distance = squared_distance(color, center);
        if distance < best_distance {
            best_distance = distance;
            best = k;
        }
    }
    best
}

/// Deterministic k-means: the first center is the sample mean, the rest are
/// chosen farthest-point first, then Lloyd iterations until stable.
pub fn kmeans(samples: &[Color], k: usize) -> Vec<usize> {
    if samples.is_empty() || k == 0 {
        return vec![0; samples.len()];
    }

    let n = samples.len() as f64;
    let mut mean = [0.0f64; 3];
    for color in samples {
        for i in 0..3 {
            mean[i] += color[i] / n;
        }
    }

    let mut centers = vec![mean];
    let mut nearest = samples
        .iter()
        .map(|c| squared_distance(c, &mean))
        .collect::<Vec<_>>();

    while centers.len() < k {
        let (far_index, far_distance) = nearest
            .iter()
            .cloned()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, d)| if d > best.1 { (i, d) } else { best });

        // Every sample already coincides with a center.
        if far_distance <= 0.0 {
            break;
        }

        let center = samples[far_index];
        for (d, color) in nearest.iter_mut().zip(samples) {
            *d = d.min(squared_distance(color, &center));
        }
        centers.push(center);
    }

    let mut assignments = samples
        .iter()
        .map(|c| nearest_center(c, &centers))
        .collect::<Vec<_>>();

    for _ in 0..KMEANS_ITERATIONS {
        let mut sums = vec![[0.0f64; 3]; centers.len()];
        let mut counts = vec![0usize; centers.len()];
        for (color, &a) in samples.iter().zip(&assignments) {
            counts[a] += 1;
            for i in 0..3 {
                sums[a][i] += color[i];
            }
        }
        for (k, center) in centers.iter_mut().enumerate() {
            if counts[k] > 0 {
                let c = counts[k] as f64;
                *center = [sums[k][0] / c, sums[k][1] / c, sums[k][2] / c];
            }
        }

        let next = samples
            .iter()
            .map(|c| nearest_center(c, &centers))
            .collect::<Vec<_>>();
        if next == assignments {
            break;
        }
        assignments = next;
    }

    assignments
}
