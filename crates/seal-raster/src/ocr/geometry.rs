//! Rotated text boxes and their upright crops

use image::imageops;
use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};

/// Crops taller than this ratio are treated as vertical text.
const VERTICAL_RATIO: f32 = 1.5;

/// Detected text region, corners in pixel coordinates (top-left origin),
/// clockwise from the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub points: [(f32, f32); 4],
}

impl Quad {
    pub fn new(points: [(f32, f32); 4]) -> Self {
        Self { points }
    }

    /// From the flat `[x0, y0, x1, y1, x2, y2, x3, y3]` layout detectors emit.
    pub fn from_flat(coords: [f32; 8]) -> Self {
        let [x0, y0, x1, y1, x2, y2, x3, y3] = coords;
        Self::new([(x0, y0), (x1, y1), (x2, y2), (x3, y3)])
    }

    pub fn axis_aligned(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self::new([(x, y), (x + width, y), (x + width, y + height), (x, y + height)])
    }

    pub fn top_left(&self) -> (f32, f32) {
        self.points[0]
    }

    /// Point a keyword match is anchored at: the third corner.
    pub fn anchor(&self) -> (f32, f32) {
        self.points[2]
    }

    /// Upright size: the longer of each pair of opposite edges.
    pub fn crop_size(&self) -> (u32, u32) {
        let [p0, p1, p2, p3] = self.points;
        let width = distance(p0, p1).max(distance(p2, p3));
        let height = distance(p0, p3).max(distance(p1, p2));
        (width.round() as u32, height.round() as u32)
    }
}

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// Perspective-warp the region under `quad` to an upright rectangle.
///
/// Tall results are turned a quarter counter-clockwise so vertical text
/// reads left to right. Degenerate boxes give `None`.
pub fn crop_upright(image: &GrayImage, quad: &Quad) -> Option<GrayImage> {
    let (width, height) = quad.crop_size();
    if width == 0 || height == 0 {
        return None;
    }
    let (w, h) = (width as f32, height as f32);
    let projection = Projection::from_control_points(quad.points, [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)])?;

    let mut crop = GrayImage::new(width, height);
    warp_into(image, &projection, Interpolation::Bilinear, Luma([255]), &mut crop);

    if h / w > VERTICAL_RATIO {
        Some(imageops::rotate270(&crop))
    } else {
        Some(crop)
    }
}
