use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::bbox::ImageSize;
use crate::error::{AnchorError, Result};
use crate::kmeans::Clustering;

/// Darknet-style backbones max-pool five times: 2^5 = 32.
pub const FEATURE_MAP_STRIDE: f64 = 32.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureAnchor {
    pub w: f64,
    pub h: f64,
}

/// Clustering result in feature-map units, ready to print or export.
#[derive(Debug, Clone, Serialize)]
pub struct AnchorReport {
    pub k: usize,
    pub avg_iou: f64,
    pub iterations: usize,
    pub converged: bool,
    pub image: ImageSize,
    pub anchors: Vec<FeatureAnchor>,
}

impl AnchorReport {
    pub fn new(k: usize, clustering: &Clustering, image: ImageSize) -> Self {
        let sx = image.width as f64 / FEATURE_MAP_STRIDE;
        let sy = image.height as f64 / FEATURE_MAP_STRIDE;
        let anchors = clustering
            .anchors
            .iter()
            .map(|a| FeatureAnchor { w: a.w * sx, h: a.h * sy })
            .collect();
        Self {
            k,
            avg_iou: clustering.avg_iou,
            iterations: clustering.iterations,
            converged: clustering.converged,
            image,
            anchors,
        }
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let body = serde_json::to_string_pretty(self).map_err(|e| AnchorError::Config(format!("encode report: {}", e)))?;
        std::fs::write(path, body).map_err(|source| AnchorError::Io { path: path.to_path_buf(), source })
    }
}

impl fmt::Display for AnchorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "K = : {:2} | AVG_IOU:{:.6} ", self.k, self.avg_iou)?;
        if !self.converged {
            writeln!(f, "WARNING: not converged after {} iterations; anchors are best effort", self.iterations)?;
        }
        writeln!(f, "Anchors box result [relative to feature map]:")?;
        writeln!(f)?;
        for a in &self.anchors {
            writeln!(f, "({}, {})", a.w, a.h)?;
        }
        Ok(())
    }
}
