//! Low-Resolution Preview Pipeline
//!
//! While a brush or eraser stroke is active, newly drained points are
//! stamped onto a reduced-size scratch surface covering only the visible
//! part of the target. The scratch is composited over the layer on screen
//! with the tool's blend mode and discarded on release; it never reaches
//! the layer's persistent pixels.
//!
//! The placement is re-derived every frame. When the view pans or zooms
//! past the current scratch, the scratch is rebuilt and the whole stroke
//! so far is stamped again.

use crate::brush::{Brush, BrushStamper, CompositeOp, Stamp};
use crate::selection::ClipScope;
use crate::surface::{DrawContext, Surface};
use kurbo::{Affine, Point, Rect, Vec2};

/// Placement of the scratch surface inside the target surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewConfig {
    /// Top-left of the covered region, in target pixels
    pub origin: Point,
    /// Target pixels to scratch pixels
    pub scale: f64,
    pub width: u32,
    pub height: u32,
}

impl PreviewConfig {
    /// Cover the visible part of the target plus the pending points
    ///
    /// All inputs are in target pixels. `reach` pads both the viewport and
    /// the points so dabs on the border are not cut off. Returns `None`
    /// when nothing of the target would be covered.
    pub fn derive(
        target_size: (u32, u32),
        visible: Option<Rect>,
        points: &[Point],
        reach: f64,
        scale: f64,
    ) -> Option<Self> {
        let bounds = Rect::new(0.0, 0.0, target_size.0 as f64, target_size.1 as f64);
        let strokes = points
            .split_first()
            .map(|(first, rest)| {
                rest.iter()
                    .fold(Rect::from_points(*first, *first), |acc, &p| acc.union_pt(p))
                    .inflate(reach, reach)
            });

        let region = match (visible.map(|v| v.inflate(reach, reach)), strokes) {
            (Some(view), Some(strokes)) => view.union(strokes),
            (Some(view), None) => view,
            (None, _) => bounds,
        }
        .intersect(bounds);
        if region.width() <= 0.0 || region.height() <= 0.0 {
            return None;
        }

        let origin = Point::new(region.x0.floor(), region.y0.floor());
        Some(Self {
            origin,
            scale,
            width: (((region.x1 - origin.x) * scale).ceil() as u32).max(1),
            height: (((region.y1 - origin.y) * scale).ceil() as u32).max(1),
        })
    }

    /// Covered region, in target pixels
    pub fn region(&self) -> Rect {
        Rect::new(
            self.origin.x,
            self.origin.y,
            self.origin.x + self.width as f64 / self.scale,
            self.origin.y + self.height as f64 / self.scale,
        )
    }

    /// Same resolution, and `other`'s region lies inside this one
    pub fn covers(&self, other: &PreviewConfig) -> bool {
        let (outer, inner) = (self.region(), other.region());
        (self.scale - other.scale).abs() < f64::EPSILON
            && outer.x0 <= inner.x0
            && outer.y0 <= inner.y0
            && outer.x1 >= inner.x1
            && outer.y1 >= inner.y1
    }

    /// Target pixels -> scratch pixels
    pub fn affine(&self) -> Affine {
        Affine::scale(self.scale) * Affine::translate(-self.origin.to_vec2())
    }

    /// Scratch pixels -> target pixels
    pub fn placement(&self) -> Affine {
        Affine::translate(self.origin.to_vec2()) * Affine::scale(1.0 / self.scale)
    }
}

/// Everything one preview frame needs
#[derive(Debug, Clone, Copy)]
pub struct PreviewFrame<'a> {
    /// Newly drained points, in layer-local space
    pub points: &'a [Point],
    pub brush: &'a Brush,
    pub stamp: &'a Stamp,
    pub target_size: (u32, u32),
    /// Origin of the target surface in source-surface pixels
    pub target_origin: Vec2,
    /// Local space -> source-surface pixels
    pub mirror: Affine,
    /// Visible region in target pixels
    pub visible: Option<Rect>,
    /// Selection polygon in source-surface pixels
    pub clip: Option<&'a [Point]>,
}

#[derive(Debug)]
struct Scratch {
    config: PreviewConfig,
    surface: Surface,
    stamper: BrushStamper,
}

/// Owns the scratch surface for the lifetime of one stroke
#[derive(Debug)]
pub struct PreviewPipeline {
    scale: f64,
    padding: f64,
    scratch: Option<Scratch>,
    /// Every point of the current stroke, in layer-local space
    stroke: Vec<Point>,
}

impl PreviewPipeline {
    pub fn new(scale: f64, padding: f64) -> Self {
        Self {
            scale: scale.clamp(f64::EPSILON, 1.0),
            padding: padding.max(0.0),
            scratch: None,
            stroke: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.scratch.is_some()
    }

    pub fn config(&self) -> Option<PreviewConfig> {
        self.scratch.as_ref().map(|s| s.config)
    }

    pub fn image(&self) -> Option<&image::RgbaImage> {
        self.scratch.as_ref().and_then(|s| s.surface.image())
    }

    /// Stamp the frame's points onto the scratch surface
    ///
    /// The scratch is created on first use and rebuilt whenever the frame's
    /// view is no longer covered by it. Returns the number of dabs drawn.
    pub fn render(&mut self, frame: &PreviewFrame<'_>) -> usize {
        let to_target = Affine::translate(-frame.target_origin) * frame.mirror;
        self.stroke.extend_from_slice(frame.points);

        let target_points: Vec<Point> = frame.points.iter().map(|&p| to_target * p).collect();
        let reach = frame.stamp.radius + self.padding;
        let wanted =
            PreviewConfig::derive(frame.target_size, frame.visible, &target_points, reach, self.scale);
        let rebuild = match (&self.scratch, wanted) {
            (_, None) => None,
            (None, Some(config)) => Some(config),
            (Some(scratch), Some(config)) => (!scratch.config.covers(&config)).then_some(config),
        };

        if let Some(config) = rebuild {
            tracing::debug!(
                "[Preview] Scratch {}x{} at {:?}",
                config.width,
                config.height,
                config.origin
            );
            let mut stamper = frame.brush.stamper();
            stamper.begin_stroke();
            self.scratch = Some(Scratch {
                config,
                surface: Surface::new(config.width, config.height),
                stamper,
            });
        }
        let Some(scratch) = self.scratch.as_mut() else {
            return 0;
        };

        let points = if rebuild.is_some() {
            &self.stroke[..]
        } else {
            frame.points
        };
        let dabs = scratch.stamper.process_points(points);
        let Some(mut ctx) = scratch.surface.context() else {
            return 0;
        };
        ctx.set_transform(scratch.config.affine());
        let mut scope = ClipScope::open(&mut ctx, frame.clip, Some(frame.target_origin));
        scope.transform(to_target);
        for dab in &dabs {
            scope.stamp(frame.stamp, dab.center);
        }
        dabs.len()
    }

    /// Draw the scratch surface with the tool's blend mode
    ///
    /// `display` maps target pixels into the context's user space.
    pub fn composite_onto(&self, ctx: &mut DrawContext<'_>, display: Affine, op: CompositeOp) {
        let Some(scratch) = &self.scratch else {
            return;
        };
        let Some(image) = scratch.surface.image() else {
            return;
        };
        let previous = ctx.composite();
        ctx.set_composite(op);
        ctx.draw_image(image, display * scratch.config.placement());
        ctx.set_composite(previous);
    }

    pub fn dispose(&mut self) {
        self.stroke.clear();
        if self.scratch.take().is_some() {
            tracing::debug!("[Preview] Scratch disposed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush::{BrushSynth, RoundBrush};
    use crate::tool::ToolOptions;
    use image::{Rgba, RgbaImage};

    fn brush() -> Brush {
        Brush::from_options(
            &ToolOptions {
                radius: 2.0,
                ..ToolOptions::default()
            },
            Rgba([255, 0, 0, 255]),
        )
    }

    fn frame<'a>(points: &'a [Point], brush: &'a Brush, stamp: &'a Stamp) -> PreviewFrame<'a> {
        PreviewFrame {
            points,
            brush,
            stamp,
            target_size: (100, 80),
            target_origin: Vec2::ZERO,
            mirror: Affine::IDENTITY,
            visible: None,
            clip: None,
        }
    }

    #[test]
    fn test_config_tracks_visible_region() -> Result<(), String> {
        let visible = Rect::new(20.5, 10.0, 60.0, 50.0);
        let config = PreviewConfig::derive((100, 80), Some(visible), &[], 0.0, 0.5)
            .ok_or("no region")?;
        assert_eq!(config.origin, Point::new(20.0, 10.0));
        assert_eq!((config.width, config.height), (20, 20));

        // Points outside the view still get covered
        let config = PreviewConfig::derive((100, 80), Some(visible), &[Point::new(90.0, 5.0)], 1.0, 1.0)
            .ok_or("no region")?;
        assert!(config.origin.y <= 4.0);
        assert!(config.origin.x as u32 + config.width >= 91);
        Ok(())
    }

    #[test]
    fn test_config_outside_target_is_none() {
        let visible = Rect::new(200.0, 200.0, 300.0, 300.0);
        assert!(PreviewConfig::derive((100, 80), Some(visible), &[], 0.0, 0.5).is_none());
    }

    #[test]
    fn test_affine_and_placement_are_inverse() -> Result<(), String> {
        let config = PreviewConfig::derive((100, 80), Some(Rect::new(10.0, 10.0, 50.0, 50.0)), &[], 0.0, 0.25)
            .ok_or("no region")?;
        let p = Point::new(33.0, 21.0);
        let back = config.placement() * (config.affine() * p);
        assert!((back - p).hypot() < 1e-9);
        Ok(())
    }

    #[test]
    fn test_scratch_created_lazily_and_disposed() {
        let brush = brush();
        let stamp = RoundBrush.synthesize(brush.color, brush.radius, 1.0);
        let mut preview = PreviewPipeline::new(0.5, 2.0);
        assert!(!preview.is_active());

        let drawn = preview.render(&frame(&[Point::new(10.0, 10.0)], &brush, &stamp));
        assert_eq!(drawn, 1);
        assert!(preview.is_active());
        assert_eq!(preview.config().map(|c| (c.width, c.height)), Some((50, 40)));

        preview.dispose();
        assert!(!preview.is_active());
        assert!(preview.image().is_none());
    }

    #[test]
    fn test_incremental_frames_continue_spacing() {
        let brush = brush();
        let stamp = RoundBrush.synthesize(brush.color, brush.radius, 1.0);
        let mut preview = PreviewPipeline::new(0.5, 0.0);

        let first = preview.render(&frame(&[Point::new(10.0, 10.0)], &brush, &stamp));
        // 4 px diameter at 25% spacing: one dab per pixel travelled
        let second = preview.render(&frame(&[Point::new(14.0, 10.0)], &brush, &stamp));
        assert_eq!(first, 1);
        assert_eq!(second, 4);
    }

    #[test]
    fn test_covers_requires_same_scale_and_region() -> Result<(), String> {
        let wide = PreviewConfig::derive((100, 80), Some(Rect::new(0.0, 0.0, 60.0, 60.0)), &[], 0.0, 0.5)
            .ok_or("no region")?;
        let inner = PreviewConfig::derive((100, 80), Some(Rect::new(10.0, 10.0, 40.0, 40.0)), &[], 0.0, 0.5)
            .ok_or("no region")?;
        assert!(wide.covers(&inner));
        assert!(wide.covers(&wide));
        assert!(!inner.covers(&wide));
        let finer = PreviewConfig { scale: 1.0, ..inner };
        assert!(!wide.covers(&finer));
        Ok(())
    }

    #[test]
    fn test_scratch_follows_moved_view() {
        let brush = brush();
        let stamp = RoundBrush.synthesize(brush.color, 4.0, 1.0);
        let mut preview = PreviewPipeline::new(0.5, 0.0);
        let first = [Point::new(20.0, 25.0)];
        let second = [Point::new(150.0, 25.0)];

        let mut start = frame(&first, &brush, &stamp);
        start.target_size = (200, 50);
        start.visible = Some(Rect::new(0.0, 0.0, 50.0, 50.0));
        assert_eq!(preview.render(&start), 1);
        let before = preview.config();

        let mut panned = frame(&second, &brush, &stamp);
        panned.target_size = (200, 50);
        panned.visible = Some(Rect::new(120.0, 0.0, 170.0, 50.0));
        // Rebuilt scratch restamps the whole stroke, not just the new point
        assert!(preview.render(&panned) > 1);
        assert_ne!(preview.config(), before);

        let mut screen = RgbaImage::new(200, 50);
        let mut ctx = DrawContext::new(&mut screen);
        preview.composite_onto(&mut ctx, Affine::IDENTITY, CompositeOp::SourceOver);
        drop(ctx);
        assert!(screen.get_pixel(150, 25).0[3] > 0);
        assert!(screen.get_pixel(140, 25).0[3] > 0);
        // Left behind with the old view
        assert_eq!(screen.get_pixel(20, 25).0[3], 0);
    }

    #[test]
    fn test_eraser_composite_cuts_display() {
        let brush = brush();
        let stamp = RoundBrush.synthesize(Rgba([0, 0, 0, 255]), 3.0, 1.0);
        let mut preview = PreviewPipeline::new(1.0, 0.0);
        preview.render(&frame(&[Point::new(20.0, 20.0)], &brush, &stamp));

        let mut screen = RgbaImage::from_pixel(100, 80, Rgba([0, 0, 255, 255]));
        let mut ctx = DrawContext::new(&mut screen);
        preview.composite_onto(&mut ctx, Affine::IDENTITY, CompositeOp::DestinationOut);
        assert_eq!(ctx.composite(), CompositeOp::SourceOver);
        drop(ctx);

        assert_eq!(screen.get_pixel(20, 20).0[3], 0);
        assert_eq!(screen.get_pixel(50, 50).0[3], 255);
    }
}
