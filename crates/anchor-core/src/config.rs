use std::path::Path;

use serde::Deserialize;

use crate::bbox::ImageSize;
use crate::error::{ensure_arg, AnchorError, Result};
use crate::kmeans::KMeansConfig;

/// File-level configuration. Every key is optional; missing keys take the
/// defaults below.
///
/// ```toml
/// [kmeans]
/// num_anchors = 5
/// loss = 1e-5
/// max_iterations = 1000
/// seed = 42
///
/// [labels]
/// label_path = "training.txt"
/// img_width = 1280
/// img_height = 960
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnchorConfig {
    pub kmeans: KMeansCfg,
    pub labels: LabelsCfg,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KMeansCfg {
    pub num_anchors: usize,
    pub loss: f64,
    pub max_iterations: usize,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LabelsCfg {
    pub label_path: String,
    pub img_width: u32,
    pub img_height: u32,
}

impl Default for KMeansCfg {
    fn default() -> Self {
        let km = KMeansConfig::default();
        Self {
            num_anchors: 5,
            loss: km.loss_convergence,
            max_iterations: km.max_iterations,
            seed: None,
        }
    }
}

impl Default for LabelsCfg {
    fn default() -> Self {
        Self {
            label_path: "training.txt".into(),
            img_width: 1280,
            img_height: 960,
        }
    }
}

impl AnchorConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path).map_err(|source| AnchorError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml(&s)
    }

    pub fn from_toml(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| AnchorError::Config(format!("parse config toml: {}", e)))
    }

    /// Sanity checks that do not need the label file.
    pub fn validate(&self) -> Result<()> {
        ensure_arg!(self.kmeans.num_anchors >= 1, "kmeans.num_anchors must be at least 1");
        ensure_arg!(
            self.kmeans.loss.is_finite() && self.kmeans.loss > 0.0,
            "kmeans.loss must be a positive number, got {}",
            self.kmeans.loss
        );
        ensure_arg!(self.kmeans.max_iterations >= 1, "kmeans.max_iterations must be at least 1");
        ensure_arg!(!self.labels.label_path.is_empty(), "labels.label_path missing");
        self.image_size()?;
        Ok(())
    }

    pub fn image_size(&self) -> Result<ImageSize> {
        ImageSize::new(self.labels.img_width, self.labels.img_height)
    }

    pub fn kmeans(&self) -> KMeansConfig {
        KMeansConfig {
            loss_convergence: self.kmeans.loss,
            max_iterations: self.kmeans.max_iterations,
        }
    }
}
