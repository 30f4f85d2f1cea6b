//! Polygon selections and the scoped clip built from them
//!
//! A selection is recorded in document space. At paint time the compositor
//! maps it into the draw target's space and opens a [`ClipScope`] around a
//! single paint operation. Fill uses the same polygon as its fill geometry.

use crate::surface::DrawContext;
use image::{GrayImage, Luma};
use kurbo::{Affine, Point, Vec2};
use std::ops::{Deref, DerefMut};

/// Polygons with less area than this (in square pixels) cover nothing
const MIN_POLYGON_AREA: f64 = 0.5;

/// An ordered polygon, usable for clipping only once closed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    points: Vec<Point>,
    closed: bool,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// A closed selection from a finished point list
    pub fn closed(points: Vec<Point>) -> Self {
        Self {
            points,
            closed: true,
        }
    }

    pub fn push(&mut self, point: Point) {
        if !self.closed {
            self.points.push(point);
        }
    }

    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Non-empty and closed
    pub fn is_usable(&self) -> bool {
        self.closed && !self.points.is_empty()
    }
}

/// Shoelace area; positive for clockwise polygons in y-down space
pub fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let n = points.len();
    let twice: f64 = (0..n)
        .map(|i| {
            let a = points[i];
            let b = points[(i + 1) % n];
            a.x * b.y - b.x * a.y
        })
        .sum();
    twice / 2.0
}

pub fn is_degenerate_polygon(points: &[Point]) -> bool {
    points.len() < 3 || polygon_area(points).abs() < MIN_POLYGON_AREA
}

/// Rasterize a device-space polygon into a coverage mask (nonzero winding)
///
/// A pixel is inside when its center is inside the polygon.
pub fn rasterize_polygon(points: &[Point], width: u32, height: u32) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    let n = points.len();
    if n < 3 || width == 0 || height == 0 {
        return mask;
    }

    let (min_y, max_y) = points
        .iter()
        .fold((f64::MAX, f64::MIN), |(lo, hi), p| (lo.min(p.y), hi.max(p.y)));
    let first_row = (min_y.floor().max(0.0)) as u32;
    let last_row = (max_y.ceil().max(0.0) as u32).min(height);

    // (x intercept, winding direction), reused per scanline
    let mut crossings: Vec<(f64, i32)> = Vec::with_capacity(n);
    for y in first_row..last_row {
        crossings.clear();
        let yf = y as f64 + 0.5;

        for i in 0..n {
            let a = points[i];
            let b = points[(i + 1) % n];
            let direction = if a.y <= yf && b.y > yf {
                1
            } else if b.y <= yf && a.y > yf {
                -1
            } else {
                continue;
            };
            let t = (yf - a.y) / (b.y - a.y);
            crossings.push((a.x + t * (b.x - a.x), direction));
        }
        crossings.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut winding = 0;
        for pair in crossings.windows(2) {
            winding += pair[0].1;
            if winding == 0 {
                continue;
            }
            // Pixels whose centers fall in [start, end)
            let start = (pair[0].0 - 0.5).ceil().max(0.0) as u32;
            let end = ((pair[1].0 - 0.5).ceil().max(0.0) as u32).min(width);
            for x in start..end {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
    }

    mask
}

/// Scope guard that restores clip, transform and composite mode on drop
///
/// Deref gives access to the guarded context for exactly one paint call.
#[derive(Debug)]
pub struct ClipScope<'c, 'a> {
    ctx: &'c mut DrawContext<'a>,
    saved_clip: Option<Option<GrayImage>>,
    saved_transform: Affine,
    saved_composite: crate::brush::CompositeOp,
}

impl<'c, 'a> ClipScope<'c, 'a> {
    /// Open a scope, clipping to `polygon` when one is given
    ///
    /// `polygon` is in the context's current user space after subtracting
    /// `offset` (the target surface's origin when it differs from the
    /// space the polygon was built in). An existing clip is intersected.
    pub fn open(ctx: &'c mut DrawContext<'a>, polygon: Option<&[Point]>, offset: Option<Vec2>) -> Self {
        let saved_transform = ctx.current_transform();
        let saved_composite = ctx.composite();
        let saved_clip = polygon.map(|points| {
            let shift = offset.unwrap_or(Vec2::ZERO);
            let device: Vec<Point> = points
                .iter()
                .map(|&p| saved_transform * (p - shift))
                .collect();
            let mut mask = rasterize_polygon(&device, ctx.width(), ctx.height());
            if let Some(existing) = ctx.clip() {
                for (x, y, value) in mask.enumerate_pixels_mut() {
                    let outer = existing.get_pixel(x, y).0[0];
                    value.0[0] = value.0[0].min(outer);
                }
            }
            ctx.set_clip(Some(mask))
        });

        Self {
            ctx,
            saved_clip,
            saved_transform,
            saved_composite,
        }
    }

    pub fn is_clipped(&self) -> bool {
        self.saved_clip.is_some()
    }
}

impl<'a> Deref for ClipScope<'_, 'a> {
    type Target = DrawContext<'a>;

    fn deref(&self) -> &Self::Target {
        &*self.ctx
    }
}

impl<'a> DerefMut for ClipScope<'_, 'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.ctx
    }
}

impl Drop for ClipScope<'_, '_> {
    fn drop(&mut self) {
        if let Some(previous) = self.saved_clip.take() {
            self.ctx.set_clip(previous);
        }
        self.ctx.set_transform(self.saved_transform);
        self.ctx.set_composite(self.saved_composite);
    }
}
