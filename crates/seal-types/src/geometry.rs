//! Coordinate conventions for placements.
//!
//! PDF pages are bottom-left origin (points); decoded rasters and OCR boxes
//! are top-left origin (pixels). Everything past the keyword locator speaks
//! bottom-left, and [`TextLocation::to_bottom_left`] is the only place the
//! vertical axis is inverted on the way in.

use crate::error::{Result, SealError};
use serde::{Deserialize, Serialize};

/// Which corner a coordinate is measured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    TopLeft,
    BottomLeft,
}

/// A keyword hit on one target (page or image), as reported by a locator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextLocation {
    /// Zero-based page or image index
    pub target: usize,
    pub x: f64,
    pub y: f64,
    pub origin: Origin,
}

impl TextLocation {
    pub fn bottom_left(target: usize, x: f64, y: f64) -> Self {
        Self {
            target,
            x,
            y,
            origin: Origin::BottomLeft,
        }
    }

    pub fn top_left(target: usize, x: f64, y: f64) -> Self {
        Self {
            target,
            x,
            y,
            origin: Origin::TopLeft,
        }
    }

    /// Normalize to bottom-left given the height of the target it sits on.
    pub fn to_bottom_left(self, target_height: f64) -> Self {
        match self.origin {
            Origin::BottomLeft => self,
            Origin::TopLeft => Self {
                y: (target_height - self.y).abs(),
                origin: Origin::BottomLeft,
                ..self
            },
        }
    }
}

/// Validated seal anchor in the target's bottom-left coordinate system.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacementPoint {
    /// Zero-based page or image index
    pub target: usize,
    pub x: f64,
    pub y: f64,
}

impl PlacementPoint {
    /// Build a placement, rejecting points outside `[0,width]x[0,height]`.
    pub fn checked(target: usize, x: f64, y: f64, width: f64, height: f64) -> Result<Self> {
        if !(0.0..=width).contains(&x) || !(0.0..=height).contains(&y) {
            return Err(SealError::Geometry(format!(
                "({x}, {y}) lies outside target {} of size {width}x{height}",
                target + 1
            )));
        }
        Ok(Self { target, x, y })
    }

    /// Distance of the anchor from the top edge, for drawing into pixel rows.
    pub fn pixel_row(&self, target_height: f64) -> f64 {
        target_height - self.y
    }
}
