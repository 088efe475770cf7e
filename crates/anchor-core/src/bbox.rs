use serde::Serialize;

use crate::error::{ensure_arg, Result};

/// Box described by its center and size.
///
/// Ground-truth boxes carry their real center until they are handed to the
/// clustering engine; anchors and clustered boxes always sit at the origin.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BBox {
    pub cx: f64,
    pub cy: f64,
    pub w: f64,
    pub h: f64,
}

impl BBox {
    pub fn new(cx: f64, cy: f64, w: f64, h: f64) -> Self {
        Self { cx, cy, w, h }
    }

    /// Origin-centered box, the shape used for anchors and centroids.
    pub fn anchor(w: f64, h: f64) -> Self {
        Self { cx: 0.0, cy: 0.0, w, h }
    }

    /// Corner coordinates (x1, y1)-(x2, y2) to center/size.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        let w = x2 - x1;
        let h = y2 - y1;
        Self { cx: x1 + w / 2.0, cy: y1 + h / 2.0, w, h }
    }

    /// Pixel units to image-relative units.
    pub fn scale_rel(self, image: ImageSize) -> Self {
        let iw = image.width as f64;
        let ih = image.height as f64;
        Self {
            cx: self.cx / iw,
            cy: self.cy / ih,
            w: self.w / iw,
            h: self.h / ih,
        }
    }

    /// Same shape, center moved to the origin.
    pub fn at_origin(self) -> Self {
        Self::anchor(self.w, self.h)
    }

    pub fn area(&self) -> f64 {
        self.w * self.h
    }
}

/// Image dimensions in pixels, used for relative scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        ensure_arg!(width > 0, "image width must be positive");
        ensure_arg!(height > 0, "image height must be positive");
        Ok(Self { width, height })
    }
}

/// IoU of two boxes sharing the same center.
///
/// Only width and height take part: with a common center the overlap is
/// `min(w) x min(h)`. At least one of the two boxes must have a positive area.
pub fn box_iou(a: &BBox, b: &BBox) -> f64 {
    let inter = a.w.min(b.w) * a.h.min(b.h);
    let union = a.area() + b.area() - inter;
    debug_assert!(union > 0.0, "box_iou on two zero-area boxes");
    if union <= 0.0 { 0.0 } else { inter / union }
}
