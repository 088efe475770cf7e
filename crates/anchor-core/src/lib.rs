pub mod bbox;
pub mod config;
mod error;
pub mod kmeans;
pub mod labels;
pub mod report;

pub use bbox::{box_iou, BBox, ImageSize};
pub use error::{AnchorError, Result};
pub use kmeans::{k_mean_cluster, run_k_mean, Clustering, KMeansConfig, StepOutcome};
