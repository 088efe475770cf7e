//! K-means over box shapes with `1 - IoU` as the distance.
//!
//! Euclidean distance on (w, h) penalises large boxes more than small ones,
//! so boxes are grouped by how well their shapes overlap instead.

use rand::Rng;
use tracing::{debug, info, warn};

use crate::bbox::{box_iou, BBox};
use crate::error::{ensure_arg, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KMeansConfig {
    /// Stop once the loss changes by less than this between two steps.
    pub loss_convergence: f64,
    /// Upper bound on steps after the seeding step.
    pub max_iterations: usize,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self { loss_convergence: 1e-5, max_iterations: 1000 }
    }
}

/// Result of a single assignment + update pass.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub anchors: Vec<BBox>,
    pub avg_iou: f64,
    /// Sum of the chosen distances, measured against the incoming centroids.
    pub loss: f64,
    pub group_sizes: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct Clustering {
    pub anchors: Vec<BBox>,
    pub avg_iou: f64,
    pub loss: f64,
    /// Steps run, seeding step included.
    pub iterations: usize,
    /// False when `max_iterations` ran out first.
    pub converged: bool,
    pub loss_history: Vec<f64>,
}

/// Nearest centroid for one box.
///
/// The search starts at distance 1 in group 0 and only a strictly smaller
/// distance moves the box, so ties go to the lowest index and a box with
/// zero overlap against every centroid lands in group 0.
fn nearest_centroid(b: &BBox, centroids: &[BBox]) -> (usize, f64) {
    let mut group = 0;
    let mut min_distance = 1.0;
    for (i, c) in centroids.iter().enumerate() {
        let distance = 1.0 - box_iou(b, c);
        if distance < min_distance {
            min_distance = distance;
            group = i;
        }
    }
    (group, min_distance)
}

#[cfg(feature = "parallel")]
fn assign(boxes: &[BBox], centroids: &[BBox]) -> Vec<(usize, f64)> {
    use rayon::prelude::*;
    boxes.par_iter().map(|b| nearest_centroid(b, centroids)).collect()
}

#[cfg(not(feature = "parallel"))]
fn assign(boxes: &[BBox], centroids: &[BBox]) -> Vec<(usize, f64)> {
    boxes.iter().map(|b| nearest_centroid(b, centroids)).collect()
}

/// One k-means pass: partition `boxes` around `centroids`, then move every
/// anchor to the mean shape of its group.
///
/// A group that received no boxes keeps its incoming centroid instead of
/// collapsing to a zero-sized anchor, which could never win a box back.
/// Sums are taken in box order, so the result does not depend on how
/// assignment was scheduled.
pub fn run_k_mean(k: usize, boxes: &[BBox], centroids: &[BBox]) -> StepOutcome {
    debug_assert_eq!(centroids.len(), k);
    debug_assert!(!boxes.is_empty());

    let assignment = assign(boxes, centroids);

    let mut loss = 0.0;
    let mut sums = vec![(0.0, 0.0); k];
    let mut group_sizes = vec![0usize; k];
    for (b, &(group, distance)) in boxes.iter().zip(&assignment) {
        loss += distance;
        sums[group].0 += b.w;
        sums[group].1 += b.h;
        group_sizes[group] += 1;
    }

    let anchors: Vec<BBox> = sums
        .iter()
        .zip(&group_sizes)
        .zip(centroids)
        .map(|((&(sum_w, sum_h), &n), centroid)| {
            if n == 0 {
                centroid.at_origin()
            } else {
                BBox::anchor(sum_w / n as f64, sum_h / n as f64)
            }
        })
        .collect();

    let iou_sum: f64 = boxes
        .iter()
        .zip(&assignment)
        .map(|(b, &(group, _))| box_iou(b, &anchors[group]))
        .sum();

    StepOutcome {
        anchors,
        avg_iou: iou_sum / boxes.len() as f64,
        loss,
        group_sizes,
    }
}

/// Cluster `boxes` into `k` anchors.
///
/// Centroids are seeded from `k` boxes drawn uniformly with replacement. The
/// first step only establishes a loss baseline; after that the loop stops as
/// soon as the loss moves by less than `cfg.loss_convergence`. If
/// `cfg.max_iterations` steps pass without that happening, the last anchors
/// are returned with `converged = false`.
pub fn k_mean_cluster<R: Rng + ?Sized>(
    k: usize,
    boxes: &[BBox],
    cfg: &KMeansConfig,
    rng: &mut R,
) -> Result<Clustering> {
    ensure_arg!(k >= 1, "number of anchors must be at least 1");
    ensure_arg!(!boxes.is_empty(), "no ground-truth boxes to cluster");
    ensure_arg!(
        k <= boxes.len(),
        "number of anchors ({}) exceeds number of boxes ({})",
        k,
        boxes.len()
    );
    ensure_arg!(
        cfg.loss_convergence.is_finite() && cfg.loss_convergence > 0.0,
        "loss convergence must be a positive number, got {}",
        cfg.loss_convergence
    );
    ensure_arg!(cfg.max_iterations >= 1, "max_iterations must be at least 1");
    if let Some(i) = boxes.iter().position(|b| !(b.w.is_finite() && b.h.is_finite() && b.area() > 0.0)) {
        return Err(crate::AnchorError::invalid(format!(
            "box {} has no positive area (w={}, h={})",
            i, boxes[i].w, boxes[i].h
        )));
    }

    let centroids: Vec<BBox> = (0..k)
        .map(|_| boxes[rng.gen_range(0..boxes.len())].at_origin())
        .collect();

    let mut step = run_k_mean(k, boxes, &centroids);
    let mut loss_history = vec![step.loss];
    let mut prev_loss = step.loss;
    debug!("kmeans: seed loss={:.6} avg_iou={:.4}", step.loss, step.avg_iou);

    for iteration in 1..=cfg.max_iterations {
        step = run_k_mean(k, boxes, &step.anchors);
        loss_history.push(step.loss);
        debug!("kmeans: iter={} loss={:.6} avg_iou={:.4}", iteration, step.loss, step.avg_iou);

        if (prev_loss - step.loss).abs() < cfg.loss_convergence {
            info!("kmeans: converged after {} steps (avg_iou={:.4})", loss_history.len(), step.avg_iou);
            return Ok(Clustering::finish(step, loss_history, true));
        }
        prev_loss = step.loss;
    }

    warn!(
        "kmeans: no convergence within {} iterations (last delta above {}); returning best effort",
        cfg.max_iterations, cfg.loss_convergence
    );
    Ok(Clustering::finish(step, loss_history, false))
}

impl Clustering {
    fn finish(step: StepOutcome, loss_history: Vec<f64>, converged: bool) -> Self {
        Self {
            anchors: step.anchors,
            avg_iou: step.avg_iou,
            loss: step.loss,
            iterations: loss_history.len(),
            converged,
            loss_history,
        }
    }
}
