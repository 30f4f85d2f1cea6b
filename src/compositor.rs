//! Paint Compositor
//!
//! Orchestrates one paint call: picks the target surface, sets the blend
//! mode, scopes the selection clip, applies the mirror scale and dispatches
//! to fill, clone or brush rendering. Brush and eraser strokes render into
//! the preview pipeline while active and once at full resolution on release.

use crate::brush::{Brush, BrushStamper, Stamp};
use crate::layer::{Layer, SurfaceTarget};
use crate::preview::{PreviewFrame, PreviewPipeline};
use crate::selection::{is_degenerate_polygon, ClipScope};
use crate::surface::PixelRect;
use crate::tool::PaintKind;
use crate::transform::LayerTransform;
use image::{Rgba, RgbaImage};
use kurbo::{Affine, Point, Rect, Vec2};

/// Source pixels and offset for one clone-stamp stroke
#[derive(Debug, Clone)]
pub struct CloneStroke {
    /// Copy of the source layer's pixels, in its own surface space
    pub source: RgbaImage,
    /// Target minus source, in document space
    pub offset: Vec2,
}

/// Inputs of a single paint call
#[derive(Debug, Clone, Copy)]
pub struct PaintRequest<'a> {
    pub kind: PaintKind,
    pub color: Rgba<u8>,
    pub stamp: &'a Stamp,
    /// Closed selection polygon in document space
    pub selection: Option<&'a [Point]>,
    pub clone: Option<&'a CloneStroke>,
    pub edit_mask: bool,
    /// Visible document region
    pub visible: Option<Rect>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Preview,
    Full,
}

/// What a paint call did
#[derive(Debug, Clone, PartialEq)]
pub struct PaintReport {
    pub applied: bool,
    pub target: SurfaceTarget,
    pub resolution: Option<Resolution>,
    /// Stroke points consumed by this call, in document space
    pub rendered: Vec<Point>,
    /// Pixels changed on the target surface
    pub dirty: PixelRect,
}

impl PaintReport {
    fn skipped(target: SurfaceTarget) -> Self {
        Self {
            applied: false,
            target,
            resolution: None,
            rendered: Vec::new(),
            dirty: PixelRect::empty(),
        }
    }
}

#[derive(Debug)]
pub struct PaintCompositor {
    preview: PreviewPipeline,
    /// Clone strokes render every frame, so their spacing state lives here
    clone_stamper: Option<BrushStamper>,
    effects_dirty: bool,
}

impl PaintCompositor {
    pub fn new(preview_scale: f64, preview_padding: f64) -> Self {
        Self {
            preview: PreviewPipeline::new(preview_scale, preview_padding),
            clone_stamper: None,
            effects_dirty: false,
        }
    }

    pub fn preview(&self) -> &PreviewPipeline {
        &self.preview
    }

    /// Finish any stroke-scoped state without rendering
    pub fn reset(&mut self) {
        self.preview.dispose();
        self.clone_stamper = None;
    }

    pub fn mark_effects_dirty(&mut self) {
        self.effects_dirty = true;
    }

    /// Read and clear the effects recache flag
    pub fn take_effects_dirty(&mut self) -> bool {
        std::mem::take(&mut self.effects_dirty)
    }

    pub fn paint(&mut self, layer: &mut Layer, brush: &mut Brush, request: &PaintRequest<'_>) -> PaintReport {
        let target = layer.resolve_target(request.edit_mask);
        let transform = LayerTransform::of(layer);
        let origin = layer.surface_origin(target);
        let active = brush.stroke.is_active();

        let Some((width, height)) = layer
            .surface(target)
            .filter(|s| s.is_live())
            .map(|s| s.dimensions())
        else {
            tracing::debug!("[Compositor] {} has no live {:?} surface", layer.id, target);
            return PaintReport::skipped(target);
        };

        let clip: Option<Vec<Point>> = request
            .selection
            .map(|points| points.iter().map(|&p| transform.to_surface(p)).collect());

        let report = match request.kind {
            kind if active && kind.uses_preview() => {
                let drained = brush.stroke.drain_unrendered().to_vec();
                let local = transform.to_local_all(&drained);
                let visible = request
                    .visible
                    .map(|rect| transform.surface_rect(rect) - origin);
                let frame = PreviewFrame {
                    points: &local,
                    brush,
                    stamp: request.stamp,
                    target_size: (width, height),
                    target_origin: origin,
                    mirror: transform.mirror_scale(),
                    visible,
                    clip: clip.as_deref(),
                };
                let dabs = self.preview.render(&frame);
                PaintReport {
                    applied: dabs > 0,
                    target,
                    resolution: Some(Resolution::Preview),
                    rendered: drained,
                    dirty: PixelRect::empty(),
                }
            }
            kind => self.paint_full(layer, brush, request, kind, target, &transform, clip.as_deref()),
        };

        if report.applied && !brush.stroke.is_active() {
            self.effects_dirty = true;
        }
        report
    }

    /// Render straight onto the target surface
    #[allow(clippy::too_many_arguments)]
    fn paint_full(
        &mut self,
        layer: &mut Layer,
        brush: &mut Brush,
        request: &PaintRequest<'_>,
        kind: PaintKind,
        target: SurfaceTarget,
        transform: &LayerTransform,
        clip: Option<&[Point]>,
    ) -> PaintReport {
        if kind == PaintKind::Fill && clip.is_some_and(is_degenerate_polygon) {
            tracing::debug!("[Compositor] Degenerate selection, fill skipped");
            return PaintReport::skipped(target);
        }
        let origin = layer.surface_origin(target);
        let Some(mut ctx) = layer.surface_mut(target).and_then(|s| s.context()) else {
            return PaintReport::skipped(target);
        };
        ctx.set_composite(kind.composite_op());
        let mut scope = ClipScope::open(&mut ctx, clip, Some(origin));
        scope.transform(Affine::translate(-origin));

        let mut rendered = Vec::new();
        match kind {
            PaintKind::Fill => match clip {
                Some(polygon) => scope.fill_polygon(polygon, request.color),
                None => scope.fill_all(request.color),
            },
            PaintKind::Clone => {
                let Some(clone) = request.clone else {
                    return PaintReport::skipped(target);
                };
                if !brush.stroke.is_active() && !brush.stroke.has_unrendered() {
                    self.clone_stamper = None;
                    return PaintReport::skipped(target);
                }
                rendered = brush.stroke.drain_unrendered().to_vec();
                let stamper = self.clone_stamper.get_or_insert_with(|| {
                    let mut stamper = brush.stamper();
                    stamper.begin_stroke();
                    stamper
                });
                // Clone sampling works in surface pixels, so no mirror scale here
                let surface_points: Vec<Point> =
                    rendered.iter().map(|&p| transform.to_surface(p)).collect();
                let display = transform.display_affine();
                for dab in stamper.process_points(&surface_points) {
                    let source_point = transform.to_surface(display * dab.center - clone.offset);
                    scope.clone_dab(&clone.source, dab.center, source_point - dab.center, brush.radius);
                }
                if !brush.stroke.is_active() {
                    self.clone_stamper = None;
                }
            }
            PaintKind::Brush | PaintKind::Eraser => {
                rendered = brush.stroke.take_points();
                let local = transform.to_local_all(&rendered);
                scope.transform(transform.mirror_scale());
                let mut stamper = brush.stamper();
                stamper.begin_stroke();
                for dab in stamper.process_points(&local) {
                    scope.stamp(request.stamp, dab.center);
                }
                self.preview.dispose();
            }
        }

        let dirty = scope.dirty();
        PaintReport {
            applied: !dirty.is_empty() || !rendered.is_empty(),
            target,
            resolution: Some(Resolution::Full),
            rendered,
            dirty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush::{BrushSynth, RoundBrush};
    use crate::layer::{LayerEffects, LayerId};
    use crate::tool::ToolOptions;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);

    fn brush(radius: f64) -> Brush {
        Brush::from_options(
            &ToolOptions {
                radius,
                ..ToolOptions::default()
            },
            RED,
        )
    }

    fn request<'a>(kind: PaintKind, stamp: &'a Stamp) -> PaintRequest<'a> {
        PaintRequest {
            kind,
            color: RED,
            stamp,
            selection: None,
            clone: None,
            edit_mask: false,
            visible: None,
        }
    }

    fn alpha(layer: &Layer, x: u32, y: u32) -> u8 {
        layer.source.pixel(x, y).map_or(0, |p| p.0[3])
    }

    #[test]
    fn test_active_stroke_only_touches_preview() {
        let mut layer = Layer::new(LayerId(1), 40, 40);
        let mut brush = brush(2.0);
        let stamp = RoundBrush.synthesize(RED, 2.0, 1.0);
        let mut compositor = PaintCompositor::new(0.5, 2.0);

        brush.stroke.press(Point::new(10.0, 10.0));
        let report = compositor.paint(&mut layer, &mut brush, &request(PaintKind::Brush, &stamp));
        assert_eq!(report.resolution, Some(Resolution::Preview));
        assert_eq!(report.rendered, vec![Point::new(10.0, 10.0)]);
        assert!(compositor.preview().is_active());
        assert_eq!(alpha(&layer, 10, 10), 0);
        assert!(!compositor.take_effects_dirty());

        // Nothing new drained on the next frame
        let report = compositor.paint(&mut layer, &mut brush, &request(PaintKind::Brush, &stamp));
        assert!(report.rendered.is_empty());
    }

    #[test]
    fn test_release_renders_full_stroke() {
        let mut layer = Layer::new(LayerId(1), 40, 40);
        let mut brush = brush(2.0);
        let stamp = RoundBrush.synthesize(RED, 2.0, 1.0);
        let mut compositor = PaintCompositor::new(0.5, 2.0);
        let points = [Point::new(10.0, 10.0), Point::new(12.0, 10.0), Point::new(14.0, 11.0)];

        brush.stroke.press(points[0]);
        compositor.paint(&mut layer, &mut brush, &request(PaintKind::Brush, &stamp));
        brush.stroke.push(points[1]);
        brush.stroke.push(points[2]);
        compositor.paint(&mut layer, &mut brush, &request(PaintKind::Brush, &stamp));
        brush.stroke.release();

        let report = compositor.paint(&mut layer, &mut brush, &request(PaintKind::Brush, &stamp));
        assert_eq!(report.resolution, Some(Resolution::Full));
        assert_eq!(report.rendered, points.to_vec());
        assert!(brush.stroke.is_empty());
        assert!(!compositor.preview().is_active());
        assert_eq!(alpha(&layer, 10, 10), 255);
        assert_eq!(alpha(&layer, 14, 11), 255);
        assert!(compositor.take_effects_dirty());
        assert!(!compositor.take_effects_dirty());
    }

    #[test]
    fn test_mirrored_layer_paints_reflected_column() {
        let mut layer = Layer::new(LayerId(1), 100, 20).with_effects(LayerEffects {
            mirror_x: true,
            ..LayerEffects::default()
        });
        let mut brush = brush(1.0);
        let stamp = RoundBrush.synthesize(RED, 1.0, 1.0);
        let mut compositor = PaintCompositor::new(0.5, 2.0);

        brush.stroke.press(Point::new(5.5, 10.5));
        brush.stroke.release();
        compositor.paint(&mut layer, &mut brush, &request(PaintKind::Brush, &stamp));

        assert_eq!(alpha(&layer, 94, 10), 255);
        assert_eq!(alpha(&layer, 5, 10), 0);
    }

    #[test]
    fn test_fill_with_selection_stays_inside() {
        let mut layer = Layer::new(LayerId(1), 30, 30);
        let mut brush = brush(2.0);
        let stamp = RoundBrush.synthesize(RED, 2.0, 1.0);
        let mut compositor = PaintCompositor::new(0.5, 2.0);
        let polygon = [
            Point::new(5.0, 5.0),
            Point::new(20.0, 5.0),
            Point::new(5.0, 20.0),
        ];

        let mut req = request(PaintKind::Fill, &stamp);
        req.selection = Some(&polygon);
        let report = compositor.paint(&mut layer, &mut brush, &req);
        assert!(report.applied);

        assert_eq!(alpha(&layer, 6, 6), 255);
        assert_eq!(alpha(&layer, 18, 18), 0);
        assert_eq!(alpha(&layer, 2, 2), 0);
    }

    #[test]
    fn test_selection_clips_preview_and_final_stroke() {
        let mut layer = Layer::new(LayerId(1), 20, 20);
        let mut brush = brush(2.0);
        let stamp = RoundBrush.synthesize(RED, 2.0, 1.0);
        let mut compositor = PaintCompositor::new(1.0, 0.0);
        let left_half = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 20.0),
            Point::new(0.0, 20.0),
        ];
        let mut req = request(PaintKind::Brush, &stamp);
        req.selection = Some(&left_half);

        brush.stroke.press(Point::new(4.0, 10.0));
        brush.stroke.push(Point::new(16.0, 10.0));
        compositor.paint(&mut layer, &mut brush, &req);

        let mut screen = RgbaImage::new(20, 20);
        let mut ctx = crate::surface::DrawContext::new(&mut screen);
        compositor
            .preview()
            .composite_onto(&mut ctx, Affine::IDENTITY, PaintKind::Brush.composite_op());
        drop(ctx);
        assert!(screen.get_pixel(7, 10).0[3] > 0);
        assert_eq!(screen.get_pixel(13, 10).0[3], 0);

        brush.stroke.release();
        compositor.paint(&mut layer, &mut brush, &req);
        assert_eq!(alpha(&layer, 7, 10), 255);
        assert_eq!(alpha(&layer, 13, 10), 0);
        assert_eq!(alpha(&layer, 16, 10), 0);
    }

    #[test]
    fn test_fill_selection_on_rotated_mirrored_layer() {
        let mut layer = Layer::new(LayerId(1), 20, 20).with_effects(LayerEffects {
            rotation: 90.0,
            mirror_x: true,
            ..LayerEffects::default()
        });
        let mut brush = brush(2.0);
        let stamp = RoundBrush.synthesize(RED, 2.0, 1.0);
        let mut compositor = PaintCompositor::new(0.5, 2.0);
        let square = [
            Point::new(2.0, 2.0),
            Point::new(8.0, 2.0),
            Point::new(8.0, 8.0),
            Point::new(2.0, 8.0),
        ];

        let mut req = request(PaintKind::Fill, &stamp);
        req.selection = Some(&square);
        assert!(compositor.paint(&mut layer, &mut brush, &req).applied);

        // The document square lands on surface pixels 12..18 in both axes
        let center = LayerTransform::of(&layer).to_surface(Point::new(5.0, 5.0));
        assert!((center - Point::new(15.0, 15.0)).hypot() < 1e-9);
        let filled = (0..20)
            .flat_map(|y| (0..20).map(move |x| (x, y)))
            .filter(|&(x, y)| alpha(&layer, x, y) == 255)
            .collect::<Vec<_>>();
        assert_eq!(filled.len(), 36);
        assert!(filled.iter().all(|&(x, y)| (12..18).contains(&x) && (12..18).contains(&y)));
        assert_eq!(alpha(&layer, 5, 5), 0);
    }

    #[test]
    fn test_degenerate_selection_fill_is_noop() {
        let mut layer = Layer::new(LayerId(1), 10, 10);
        let mut brush = brush(2.0);
        let stamp = RoundBrush.synthesize(RED, 2.0, 1.0);
        let mut compositor = PaintCompositor::new(0.5, 2.0);
        let line = [Point::new(1.0, 1.0), Point::new(8.0, 8.0)];

        let mut req = request(PaintKind::Fill, &stamp);
        req.selection = Some(&line);
        let report = compositor.paint(&mut layer, &mut brush, &req);
        assert!(!report.applied);
        assert!((0..10).all(|x| alpha(&layer, x, x) == 0));
    }

    #[test]
    fn test_eraser_full_render_removes_pixels() {
        let mut layer = Layer::from_image(LayerId(1), RgbaImage::from_pixel(20, 20, RED));
        let mut brush = brush(2.0);
        let stamp = RoundBrush.synthesize(RED, 2.0, 1.0);
        let mut compositor = PaintCompositor::new(0.5, 2.0);

        brush.stroke.press(Point::new(10.0, 10.0));
        brush.stroke.release();
        compositor.paint(&mut layer, &mut brush, &request(PaintKind::Eraser, &stamp));
        assert_eq!(alpha(&layer, 10, 10), 0);
        assert_eq!(alpha(&layer, 1, 1), 255);
    }

    #[test]
    fn test_mask_target_leaves_source_alone() {
        let mut layer =
            Layer::new(LayerId(1), 20, 20).with_mask(RgbaImage::new(10, 10), Vec2::new(5.0, 5.0));
        let mut brush = brush(1.0);
        let stamp = RoundBrush.synthesize(RED, 1.0, 1.0);
        let mut compositor = PaintCompositor::new(0.5, 2.0);

        brush.stroke.press(Point::new(8.5, 8.5));
        brush.stroke.release();
        let mut req = request(PaintKind::Brush, &stamp);
        req.edit_mask = true;
        let report = compositor.paint(&mut layer, &mut brush, &req);

        assert_eq!(report.target, SurfaceTarget::Mask);
        assert_eq!(alpha(&layer, 8, 8), 0);
        let mask_alpha = layer
            .surface(SurfaceTarget::Mask)
            .and_then(|s| s.pixel(3, 3))
            .map_or(0, |p| p.0[3]);
        assert_eq!(mask_alpha, 255);
    }

    #[test]
    fn test_clone_copies_from_offset() {
        let mut source = RgbaImage::new(30, 30);
        source.put_pixel(5, 5, RED);
        let mut layer = Layer::from_image(LayerId(1), source.clone());
        let mut brush = brush(2.0);
        let stamp = RoundBrush.synthesize(RED, 2.0, 1.0);
        let mut compositor = PaintCompositor::new(0.5, 2.0);
        let clone = CloneStroke {
            source,
            offset: Vec2::new(15.0, 15.0),
        };

        brush.stroke.press(Point::new(20.0, 20.0));
        let mut req = request(PaintKind::Clone, &stamp);
        req.clone = Some(&clone);
        let report = compositor.paint(&mut layer, &mut brush, &req);

        // Clone strokes never use the preview
        assert_eq!(report.resolution, Some(Resolution::Full));
        assert!(!compositor.preview().is_active());
        assert_eq!(layer.source.pixel(20, 20), Some(RED));
    }

    #[test]
    fn test_disposed_target_is_noop() {
        let mut layer = Layer::new(LayerId(1), 10, 10);
        layer.source.dispose();
        let mut brush = brush(2.0);
        let stamp = RoundBrush.synthesize(RED, 2.0, 1.0);
        let mut compositor = PaintCompositor::new(0.5, 2.0);

        let report = compositor.paint(&mut layer, &mut brush, &request(PaintKind::Fill, &stamp));
        assert!(!report.applied);
        assert!(!compositor.take_effects_dirty());
    }
}
