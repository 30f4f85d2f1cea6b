//! Layer Sprite - the host-facing paint engine for one layer
//!
//! Owns a working copy of the layer and everything stroke-scoped: brush,
//! selection, clone state, preview and the history cycle. The host drives
//! it through pointer handlers, a per-frame `update` and a `draw` hook, and
//! learns about mutations by polling `SpriteEvent`s.

use crate::brush::{Brush, BrushSynth, RoundBrush, Stamp};
use crate::codec::{PngCodec, SnapshotCodec};
use crate::compositor::{CloneStroke, PaintCompositor, PaintReport, PaintRequest, Resolution};
use crate::config::EngineConfig;
use crate::context::{EngineContext, PREF_REDUCED_MEMORY};
use crate::history::{
    Capture, HistoryId, HistoryLog, Restorable, RestoredState, SnapshotManager, SnapshotTarget,
    SpriteLookup,
};
use crate::input::{PointerEvent, PointerKind, PointerPhase};
use crate::layer::{Layer, LayerId};
use crate::selection::Selection;
use crate::surface::{sample_nearest, DrawContext};
use crate::tool::{InteractionFlags, PaintKind, SpriteMode, ToolConfig, ToolState, Transition};
use crate::transform::LayerTransform;
use image::Rgba;
use kurbo::{Affine, Point, Rect, Vec2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::TAU;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

/// Segments used to approximate the brush outline circle
const OUTLINE_SEGMENTS: usize = 48;

/// Collaborators injected at construction
#[derive(Clone)]
pub struct Services {
    pub context: Arc<dyn EngineContext>,
    pub history: Arc<Mutex<dyn HistoryLog>>,
    pub codec: Arc<dyn SnapshotCodec>,
    pub brushes: Arc<dyn BrushSynth>,
}

impl Services {
    /// PNG snapshots and round brushes by default
    pub fn new(context: Arc<dyn EngineContext>, history: Arc<Mutex<dyn HistoryLog>>) -> Self {
        Self {
            context,
            history,
            codec: Arc::new(PngCodec),
            brushes: Arc::new(RoundBrush),
        }
    }

    pub fn with_codec(mut self, codec: Arc<dyn SnapshotCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_brushes(mut self, brushes: Arc<dyn BrushSynth>) -> Self {
        self.brushes = brushes;
        self
    }
}

/// Explicit change notifications for the host
#[derive(Debug, Clone, PartialEq)]
pub enum SpriteEvent {
    /// Layer pixels or position changed
    LayerChanged(LayerId),
    /// Layer effects (filters) need recomputing
    EffectsRecache(LayerId),
    ColorPicked(Rgba<u8>),
    /// Clone-stamp source set, in document space
    CloneSourceSet(Point),
    HistoryCommitted(HistoryId),
}

/// Maps document space onto the host's screen
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Document point shown at the top-left corner
    pub origin: Point,
    pub zoom: f64,
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(origin: Point, zoom: f64, width: f64, height: f64) -> Self {
        Self {
            origin,
            zoom,
            width,
            height,
        }
    }

    fn effective_zoom(&self) -> f64 {
        if self.zoom > 0.0 {
            self.zoom
        } else {
            1.0
        }
    }

    /// Document space -> screen space
    pub fn affine(&self) -> Affine {
        Affine::scale(self.effective_zoom()) * Affine::translate(-self.origin.to_vec2())
    }

    /// Visible document region
    pub fn document_rect(&self) -> Rect {
        let zoom = self.effective_zoom();
        Rect::new(
            self.origin.x,
            self.origin.y,
            self.origin.x + self.width / zoom,
            self.origin.y + self.height / zoom,
        )
    }
}

/// What the host's drawable layer needs from any renderer
pub trait Drawable {
    /// Document-space bounds
    fn bounds(&self) -> Rect;
    /// Move so the bounds start at `bounds.origin()`; size follows the layer
    fn set_bounds(&mut self, bounds: Rect);
    fn flags(&self) -> InteractionFlags;
    fn invalidate(&mut self);
    fn needs_redraw(&self) -> bool;
    fn draw(&mut self, ctx: &mut DrawContext<'_>, viewport: &Viewport);
}

#[derive(Debug, Clone, Copy)]
struct DragState {
    anchor: Point,
    origin: Point,
}

pub struct LayerSprite {
    layer: Layer,
    config: EngineConfig,
    services: Services,
    tools: ToolState,
    brush: Brush,
    stamp: Option<Stamp>,
    selection: Option<Selection>,
    compositor: PaintCompositor,
    history: SnapshotManager,
    clone: Option<CloneStroke>,
    drag: Option<DragState>,
    cursor: Option<Point>,
    viewport: Option<Viewport>,
    active: bool,
    invalidated: bool,
    events: Vec<SpriteEvent>,
}

impl fmt::Debug for LayerSprite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayerSprite")
            .field("layer", &self.layer.id)
            .field("mode", &self.tools.mode())
            .field("stroke_active", &self.brush.stroke.is_active())
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

/// Raw state of `target` for the history manager
fn capture(layer: &Layer, target: SnapshotTarget) -> Option<Capture> {
    match target {
        SnapshotTarget::Position => Some(Capture::Position(layer.position())),
        SnapshotTarget::Surface(surface) => layer.surface(surface)?.image().map(|image| Capture::Bitmap {
            target: surface,
            image: image.clone(),
        }),
    }
}

impl LayerSprite {
    pub fn new(layer: Layer, services: Services, config: EngineConfig) -> Self {
        let tools = ToolState::new();
        let brush = Brush::from_options(tools.options(), services.context.active_color());
        let history = SnapshotManager::new(
            Arc::clone(&services.codec),
            config.snapshot_debounce(),
            config.snapshot_debounce_active(),
        );
        let compositor = PaintCompositor::new(config.preview_scale, config.preview_padding);
        tracing::info!("[Sprite] Created for {}", layer.id);

        Self {
            layer,
            config,
            services,
            tools,
            brush,
            stamp: None,
            selection: None,
            compositor,
            history,
            clone: None,
            drag: None,
            cursor: None,
            viewport: None,
            active: false,
            invalidated: true,
            events: Vec::new(),
        }
    }

    pub fn id(&self) -> LayerId {
        self.layer.id
    }

    pub fn layer(&self) -> &Layer {
        &self.layer
    }

    pub fn tool_state(&self) -> &ToolState {
        &self.tools
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// Offset between the clone target and its source while a clone stroke is set up
    pub fn clone_offset(&self) -> Option<Vec2> {
        self.clone.as_ref().map(|clone| clone.offset)
    }

    pub fn preview_active(&self) -> bool {
        self.compositor.preview().is_active()
    }

    pub fn history_pending(&self) -> bool {
        self.history.is_pending()
    }

    /// Mark this as the document's active layer (draws the border overlay)
    pub fn set_active(&mut self, active: bool) {
        if self.active != active {
            self.active = active;
            self.invalidated = true;
        }
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
    }

    /// Move queued events into `events`; returns how many were added
    pub fn poll_events(&mut self, events: &mut Vec<SpriteEvent>) -> usize {
        let count = self.events.len();
        events.append(&mut self.events);
        count
    }

    fn emit(&mut self, event: SpriteEvent) {
        self.events.push(event);
    }

    /// Switch tools
    ///
    /// Finishes any active stroke, commits the pending history cycle and
    /// resets selection, clone source and brush for the new tool.
    pub async fn set_tool(&mut self, config: ToolConfig) -> Transition {
        self.finish_gesture();
        self.flush_history().await;

        let transition = self.tools.configure(config.tool, config.options);
        self.selection = None;
        self.clone = None;
        self.stamp = None;
        self.brush = Brush::from_options(self.tools.options(), self.services.context.active_color());
        tracing::info!(
            "[Sprite] {} tool {:?}: {:?} -> {:?}",
            self.layer.id,
            config.tool,
            transition.from,
            transition.to
        );
        self.invalidated = true;
        transition
    }

    /// Constrain painting to `selection`; ignored when the tool forbids it
    pub fn set_selection(&mut self, selection: Selection) -> bool {
        if !self.tools.supports_selection() {
            tracing::debug!("[Sprite] Selection ignored for {:?}", self.tools.tool());
            return false;
        }
        self.selection = Some(selection);
        self.invalidated = true;
        true
    }

    pub fn clear_selection(&mut self) {
        if self.selection.take().is_some() {
            self.invalidated = true;
        }
    }

    pub async fn handle_event(&mut self, event: PointerEvent) -> Option<PaintReport> {
        match event.phase {
            PointerPhase::Press => {
                self.press(event.position(), event.kind);
                None
            }
            PointerPhase::Move => {
                self.pointer_move(event.position(), event.kind);
                None
            }
            PointerPhase::Release => self.release(event.position(), event.kind).await,
        }
    }

    pub fn press(&mut self, position: Point, _kind: PointerKind) {
        self.cursor = Some(position);
        match self.tools.mode() {
            SpriteMode::Idle => {}
            SpriteMode::Drag => self.begin_drag(position),
            SpriteMode::ColorPick => self.pick_color(position),
            SpriteMode::Paint(paint) => self.begin_paint(paint, position),
        }
        self.invalidated = true;
    }

    pub fn pointer_move(&mut self, position: Point, kind: PointerKind) {
        let engaged = self.drag.is_some() || self.brush.stroke.is_active();
        if kind.has_hover() || engaged {
            self.cursor = Some(position);
        }

        if let Some(drag) = self.drag {
            self.drag_to(drag, position);
            self.history.touch(true);
        } else if self.brush.stroke.push(position) {
            self.history.touch(true);
        }
        if kind.has_hover() || engaged {
            self.invalidated = true;
        }
    }

    /// End the gesture; returns the final full-resolution render, if any
    pub async fn release(&mut self, position: Point, kind: PointerKind) -> Option<PaintReport> {
        let mut report = None;
        if let Some(drag) = self.drag.take() {
            self.drag_to(drag, position);
            self.history.touch(false);
        } else if self.brush.stroke.release() {
            report = self.render_frame();
            self.clone = None;
            self.compositor.reset();
            self.history.touch(false);
        }
        if !kind.has_hover() {
            self.cursor = None;
        }

        if self.history.is_pending() && self.services.context.preference(PREF_REDUCED_MEMORY) {
            self.flush_history().await;
        }
        self.invalidated = true;
        report
    }

    /// Per-frame tick
    ///
    /// Renders points that arrived since the last frame, raises the effects
    /// recache once a stroke is finished, and commits history when the
    /// debounce window has passed (re-arming it while a gesture continues).
    pub async fn update(&mut self) {
        if self.brush.stroke.is_active() && self.brush.stroke.has_unrendered() {
            self.render_frame();
        }
        if self.compositor.take_effects_dirty() {
            self.emit(SpriteEvent::EffectsRecache(self.layer.id));
        }
        if self.history.is_due(Instant::now()) {
            if self.brush.stroke.is_active() || self.drag.is_some() {
                self.history.touch(true);
            } else {
                self.flush_history().await;
            }
        }
    }

    /// Commit the pending history cycle now
    pub async fn flush_history(&mut self) -> Option<HistoryId> {
        let target = self.history.pending_target()?;
        let after = capture(&self.layer, target);
        let log = Arc::clone(&self.services.history);
        match self.history.commit(self.layer.id, after, log.as_ref()).await {
            Ok(Some(id)) => {
                self.emit(SpriteEvent::HistoryCommitted(id));
                Some(id)
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!("[History] {} snapshot cycle aborted: {}", self.layer.id, err);
                None
            }
        }
    }

    /// Release all stroke-scoped resources, committing pending history
    pub async fn dispose(&mut self) {
        self.finish_gesture();
        self.flush_history().await;
        self.selection = None;
        self.stamp = None;
        self.cursor = None;
        tracing::info!("[Sprite] Disposed {}", self.layer.id);
    }

    /// Complete an unfinished stroke or drag without waiting for release
    fn finish_gesture(&mut self) {
        if self.brush.stroke.release() {
            self.render_frame();
        }
        if self.drag.take().is_some() {
            self.history.touch(false);
        }
        self.clone = None;
        self.compositor.reset();
    }

    fn begin_drag(&mut self, position: Point) {
        let origin = self.layer.position();
        self.drag = Some(DragState {
            anchor: position,
            origin,
        });
        self.history.begin_edit(true, || Some(Capture::Position(origin)));
    }

    fn drag_to(&mut self, drag: DragState, position: Point) {
        let moved = drag.origin + (position - drag.anchor);
        if moved != self.layer.position() {
            self.layer.x = moved.x;
            self.layer.y = moved.y;
            self.emit(SpriteEvent::LayerChanged(self.layer.id));
            self.invalidated = true;
        }
    }

    fn pick_color(&mut self, position: Point) {
        let surface_point = LayerTransform::of(&self.layer).to_surface(position);
        match self
            .layer
            .source
            .image()
            .and_then(|image| sample_nearest(image, surface_point))
        {
            Some(color) => self.emit(SpriteEvent::ColorPicked(color)),
            None => tracing::debug!("[Sprite] Color pick outside {}", self.layer.id),
        }
    }

    fn begin_paint(&mut self, paint: PaintKind, position: Point) {
        if paint == PaintKind::Clone {
            // The first press only chooses the source
            let Some(source) = self.tools.options().clone_source else {
                self.tools.set_clone_source(position);
                self.emit(SpriteEvent::CloneSourceSet(position));
                tracing::debug!("[Sprite] Clone source set at {:?}", position);
                return;
            };
            let pixels = self
                .services
                .context
                .clone_source_pixels(self.layer.id)
                .or_else(|| self.layer.source.image().cloned());
            let Some(pixels) = pixels else {
                return;
            };
            self.clone = Some(CloneStroke {
                source: pixels,
                offset: position - source,
            });
        }

        self.brush.color = self.services.context.active_color();
        self.stamp = Some(self.services.brushes.synthesize(
            self.brush.color,
            self.brush.radius,
            self.brush.hardness,
        ));

        let target = self.layer.resolve_target(self.tools.options().edit_mask);
        let layer = &self.layer;
        let started = self.history.begin_edit(!paint.is_atomic(), || {
            capture(layer, SnapshotTarget::Surface(target))
        });

        if paint.is_atomic() {
            let applied = self.render_frame().is_some_and(|report| report.applied);
            if applied {
                self.history.touch(false);
            } else if started {
                self.history.cancel();
            }
        } else {
            self.brush.stroke.press(position);
        }
    }

    /// Run one compositor pass for the current paint mode
    fn render_frame(&mut self) -> Option<PaintReport> {
        let kind = self.tools.mode().paint_kind()?;
        let stamp = self.stamp.as_ref()?;
        let request = PaintRequest {
            kind,
            color: self.brush.color,
            stamp,
            selection: self
                .selection
                .as_ref()
                .filter(|s| s.is_usable())
                .map(Selection::points),
            clone: self.clone.as_ref(),
            edit_mask: self.tools.options().edit_mask,
            visible: self.viewport.map(|v| v.document_rect()),
        };
        let report = self.compositor.paint(&mut self.layer, &mut self.brush, &request);

        if report.applied {
            self.invalidated = true;
            if report.resolution == Some(Resolution::Full) {
                self.emit(SpriteEvent::LayerChanged(self.layer.id));
            }
        }
        Some(report)
    }

    fn draw_overlays(&self, ctx: &mut DrawContext<'_>, transform: &LayerTransform) {
        if self.active {
            let (w, h) = (self.layer.width as f64, self.layer.height as f64);
            let display = transform.display_affine();
            let corners = [
                Point::new(0.0, 0.0),
                Point::new(w, 0.0),
                Point::new(w, h),
                Point::new(0.0, h),
            ]
            .map(|p| display * p);
            ctx.stroke_polyline(&corners, true, Rgba(self.config.active_border));
        }

        if let Some(selection) = &self.selection {
            ctx.stroke_polyline(
                selection.points(),
                selection.is_closed(),
                Rgba(self.config.selection_outline),
            );
        }

        if let (Some(cursor), Some(_)) = (self.cursor, self.tools.mode().paint_kind()) {
            let radius = self.brush.radius * transform.effective_scale().abs();
            let outline: Vec<Point> = (0..OUTLINE_SEGMENTS)
                .map(|i| {
                    let angle = i as f64 / OUTLINE_SEGMENTS as f64 * TAU;
                    cursor + Vec2::from_angle(angle) * radius
                })
                .collect();
            ctx.stroke_polyline(&outline, true, Rgba(self.config.brush_outline));
        }
    }
}

impl Drawable for LayerSprite {
    fn bounds(&self) -> Rect {
        LayerTransform::of(&self.layer).bounds()
    }

    fn set_bounds(&mut self, bounds: Rect) {
        let delta = bounds.origin() - self.bounds().origin();
        if delta.hypot() > f64::EPSILON {
            self.layer.x += delta.x;
            self.layer.y += delta.y;
            self.emit(SpriteEvent::LayerChanged(self.layer.id));
            self.invalidated = true;
        }
    }

    fn flags(&self) -> InteractionFlags {
        self.tools.mode().flags()
    }

    fn invalidate(&mut self) {
        self.invalidated = true;
    }

    fn needs_redraw(&self) -> bool {
        self.invalidated
    }

    /// Layer (mask applied), live preview, then overlays
    fn draw(&mut self, ctx: &mut DrawContext<'_>, viewport: &Viewport) {
        self.viewport = Some(*viewport);
        let saved = ctx.current_transform();
        ctx.set_transform(saved * viewport.affine());

        let transform = LayerTransform::of(&self.layer);
        let display = transform.display_affine();
        if let Some(pixels) = self.layer.visible_pixels() {
            ctx.draw_image(&pixels, display);
        }
        if let Some(paint) = self.tools.mode().paint_kind() {
            let target = self.layer.resolve_target(self.tools.options().edit_mask);
            let origin = self.layer.surface_origin(target);
            self.compositor.preview().composite_onto(
                ctx,
                display * Affine::translate(origin),
                paint.composite_op(),
            );
        }
        self.draw_overlays(ctx, &transform);

        ctx.set_transform(saved);
        self.invalidated = false;
    }
}

impl Restorable for LayerSprite {
    /// Apply restored state, dropping any uncommitted edit
    ///
    /// The pending history cycle is cancelled rather than committed: its
    /// "before" snapshot no longer describes the layer once the restore
    /// lands, so committing it would record a redo of the wrong pixels.
    fn restore_snapshot(&mut self, state: RestoredState) -> bool {
        self.finish_gesture();
        if self.history.is_pending() {
            tracing::debug!("[History] {} pending cycle dropped by restore", self.layer.id);
            self.history.cancel();
        }
        match state {
            RestoredState::Bitmap { target, image } => {
                let id = self.layer.id;
                let Some(surface) = self.layer.surface_mut(target) else {
                    tracing::warn!("[Sprite] {} has no {:?} surface to restore", id, target);
                    return false;
                };
                surface.replace(image);
                self.compositor.mark_effects_dirty();
            }
            RestoredState::Position(position) => {
                self.layer.x = position.x;
                self.layer.y = position.y;
            }
        }
        self.emit(SpriteEvent::LayerChanged(self.layer.id));
        self.invalidated = true;
        true
    }
}

impl SpriteLookup for HashMap<LayerId, LayerSprite> {
    fn sprite_for_layer(&mut self, layer: LayerId) -> Option<&mut dyn Restorable> {
        self.get_mut(&layer).map(|sprite| sprite as &mut dyn Restorable)
    }
}
