use image::RgbImage;
use log::{debug, warn};
use ndarray::Array2;

use crate::{
    error::{CompositeError, Result},
    segmentation::{
        SeedRect,
        gmm::{Color, ColorModel},
        graph::FlowGraph,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLabel {
    Background,
    Foreground,
    ProbableBackground,
    ProbableForeground,
}

impl PixelLabel {
    pub fn is_foreground(self) -> bool {
        matches!(self, PixelLabel::Foreground | PixelLabel::ProbableForeground)
    }

    fn is_probable(self) -> bool {
        matches!(self, PixelLabel::ProbableBackground | PixelLabel::ProbableForeground)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GrabCutParams {
    pub iterations: usize,
    pub components: usize,
    pub gamma: f64,
}

/// Smoothness weights towards the four already-visited 8-neighbours of each
/// pixel, stored row-major. Zero where the neighbour is outside the image.
struct NeighbourWeights {
    left: Vec<f64>,
    up_left: Vec<f64>,
    up: Vec<f64>,
    up_right: Vec<f64>,
}

struct GrabCut {
    width: usize,
    height: usize,
    colors: Vec<Color>,
    labels: Vec<PixelLabel>,
    params: GrabCutParams,
}

/// Label every pixel of `image` as (probable) foreground or background,
/// starting from `rect` as the probable-foreground seed.
pub fn grabcut(image: &RgbImage, rect: SeedRect, params: GrabCutParams) -> Result<Array2<PixelLabel>> {
    let mut state = GrabCut::new(image, rect, params)?;
    state.run()?;

    let (width, height) = (state.width, state.height);
    Array2::from_shape_vec((height, width), state.labels)
        .map_err(|e| CompositeError::InvalidInput(format!("label buffer shape mismatch: {e}")))
}

impl GrabCut {
    fn new(image: &RgbImage, rect: SeedRect, params: GrabCutParams) -> Result<Self> {
        let (width, height) = image.dimensions();
        if rect.is_empty() {
            return Err(CompositeError::InvalidInput(format!(
                "seed rectangle has zero area for a {width}x{height} image"
            )));
        }

        let colors = image
            .pixels()
            .map(|p| [p[0] as f64, p[1] as f64, p[2] as f64])
            .collect::<Vec<_>>();

        let mut labels = vec![PixelLabel::Background; colors.len()];
        for y in rect.y..rect.y + rect.height {
            for x in rect.x..rect.x + rect.width {
                labels[(y * width + x) as usize] = PixelLabel::ProbableForeground;
            }
        }

        Ok(Self {
            width: width as usize,
            height: height as usize,
            colors,
            labels,
            params,
        })
    }

    fn samples(&self, foreground: bool) -> Vec<Color> {
        self.labels
            .iter()
            .zip(&self.colors)
            .filter(|(label, _)| label.is_foreground() == foreground)
            .map(|(_, color)| *color)
            .collect()
    }

    fn run(&mut self) -> Result<()> {
        let bg_colors = self.samples(false);
        let fg_colors = self.samples(true);
        if bg_colors.is_empty() {
            return Err(CompositeError::InvalidInput(
                "seed rectangle covers the whole image, no background samples".into(),
            ));
        }

        let mut bg_model = ColorModel::from_samples(&bg_colors, self.params.components);
        let mut fg_model = ColorModel::from_samples(&fg_colors, self.params.components);

        let weights = self.neighbour_weights();
        let lambda = 9.0 * self.params.gamma;

        for iteration in 0..self.params.iterations {
            match self.relearn_models(&bg_model, &fg_model) {
                Some((bg, fg)) => {
                    bg_model = bg;
                    fg_model = fg;
                }
                None => {
                    warn!("GrabCut iteration {iteration}: one label class is empty, stopping early");
                    break;
                }
            }

            let mut graph = self.build_graph(&bg_model, &fg_model, &weights, lambda);
            let pixel_count = self.colors.len();
            let (flow, source_side) = graph.max_flow(pixel_count, pixel_count + 1);

            let mut foreground = 0usize;
            for (label, &in_source) in self.labels.iter_mut().zip(&source_side) {
                if label.is_probable() {
                    *label = if in_source {
                        PixelLabel::ProbableForeground
                    } else {
                        PixelLabel::ProbableBackground
                    };
                }
                if label.is_foreground() {
                    foreground += 1;
                }
            }

            debug!("GrabCut iteration {iteration}: flow {flow:.2}, {foreground}/{pixel_count} foreground pixels");
        }

        Ok(())
    }

    /// Assign each pixel to its most likely component under its current
    /// label's model, then refit both models. `None` when either class has
    /// no pixels left.
    fn relearn_models(&self, bg_model: &ColorModel, fg_model: &ColorModel) -> Option<(ColorModel, ColorModel)> {
        let bg_colors = self.samples(false);
        let fg_colors = self.samples(true);
        if bg_colors.is_empty() || fg_colors.is_empty() {
            return None;
        }

        let components = self.params.components;
        let bg_assign = bg_colors
            .iter()
            .map(|c| bg_model.most_likely_component(c))
            .collect::<Vec<_>>();
        let fg_assign = fg_colors
            .iter()
            .map(|c| fg_model.most_likely_component(c))
            .collect::<Vec<_>>();

        Some((
            ColorModel::fit(&bg_colors, &bg_assign, components),
            ColorModel::fit(&fg_colors, &fg_assign, components),
        ))
    }

    fn neighbour_weights(&self) -> NeighbourWeights {
        let (w, h) = (self.width, self.height);
        let color_at = |x: usize, y: usize| &self.colors[y * w + x];
        let diff = |a: &Color, b: &Color| {
            (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
        };

        let mut sum = 0.0;
        let mut count = 0usize;
        for y in 0..h {
            for x in 0..w {
                let c = color_at(x, y);
                if x > 0 {
                    sum += diff(c, color_at(x - 1, y));
                    count += 1;
                }
                if y > 0 {
                    if x > 0 {
                        sum += diff(c, color_at(x - 1, y - 1));
                        count += 1;
                    }
                    sum += diff(c, color_at(x, y - 1));
                    count += 1;
                    if x + 1 < w {
                        sum += diff(c, color_at(x + 1, y - 1));
                        count += 1;
                    }
                }
            }
        }

        let beta = if sum <= f64::EPSILON || count == 0 {
            0.0
        } else {
            1.0 / (2.0 * sum / count as f64)
        };
        debug!("GrabCut smoothness beta = {beta:.6}");

        let gamma = self.params.gamma;
        let gamma_diag = gamma / std::f64::consts::SQRT_2;
        let n = w * h;
        let mut weights = NeighbourWeights {
            left: vec![0.0; n],
            up_left: vec![0.0; n],
            up: vec![0.0; n],
            up_right: vec![0.0; n],
        };

        for y in 0..h {
            for x in 0..w {
                let i = y * w + x;
                let c = color_at(x, y);
                if x > 0 {
                    weights.left[i] = gamma * (-beta * diff(c, color_at(x - 1, y))).exp();
                }
                if y > 0 {
                    if x > 0 {
                        weights.up_left[i] = gamma_diag * (-beta * diff(c, color_at(x - 1, y - 1))).exp();
                    }
                    weights.up[i] = gamma * (-beta * diff(c, color_at(x, y - 1))).exp();
                    if x + 1 < w {
                        weights.up_right[i] = gamma_diag * (-beta * diff(c, color_at(x + 1, y - 1))).exp();
                    }
                }
            }
        }

        weights
    }

    /// Source is the foreground terminal: a pixel left connected to it after
    /// the cut is labelled foreground.
    fn build_graph(
        &self,
        bg_model: &ColorModel,
        fg_model: &ColorModel,
        weights: &NeighbourWeights,
        lambda: f64,
    ) -> FlowGraph {
        let (w, h) = (self.width, self.height);
        let n = w * h;
        let (source, sink) = (n, n + 1);
        let mut graph = FlowGraph::with_capacity(n + 2, n * 5);

        for y in 0..h {
            for x in 0..w {
                let i = y * w + x;
                let color = &self.colors[i];

                let (from_source, to_sink) = match self.labels[i] {
                    PixelLabel::ProbableBackground | PixelLabel::ProbableForeground => (
                        -bg_model.log_likelihood(color),
                        -fg_model.log_likelihood(color),
                    ),
                    PixelLabel::Background => (0.0, lambda),
                    PixelLabel::Foreground => (lambda, 0.0),
                };

                // Only the difference of the terminal weights affects the cut.
                let delta = from_source - to_sink;
                if delta > 0.0 {
                    graph.add_edge(source, i, delta, 0.0);
                } else if delta < 0.0 {
                    graph.add_edge(i, sink, -delta, 0.0);
                }

                if x > 0 {
                    let wgt = weights.left[i];
                    graph.add_edge(i, i - 1, wgt, wgt);
                }
                if y > 0 {
                    if x > 0 {
                        let wgt = weights.up_left[i];
                        graph.add_edge(i, i - w - 1, wgt, wgt);
                    }
                    let wgt = weights.up[i];
                    graph.add_edge(i, i - w, wgt, wgt);
                    if x + 1 < w {
                        let wgt = weights.up_right[i];
                        graph.add_edge(i, i - w + 1, wgt, wgt);
                    }
                }
            }
        }

        graph
    }
}
