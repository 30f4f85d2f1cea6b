//! Tool mode state machine
//!
//! Maps the host's tool identifier onto the sprite's interaction mode. The
//! sprite performs the side effects of a transition (history flush,
//! selection and clone-source reset, brush rebuild); this module only
//! decides the mode and which drawable flags it needs.

use crate::brush::CompositeOp;
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Tool identifiers as selected in the host UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolId {
    Pointer,
    Move,
    Brush,
    Eraser,
    Fill,
    CloneStamp,
    ColorPicker,
}

impl ToolId {
    pub fn mode(self) -> SpriteMode {
        match self {
            ToolId::Pointer => SpriteMode::Idle,
            ToolId::Move => SpriteMode::Drag,
            ToolId::Brush => SpriteMode::Paint(PaintKind::Brush),
            ToolId::Eraser => SpriteMode::Paint(PaintKind::Eraser),
            ToolId::Fill => SpriteMode::Paint(PaintKind::Fill),
            ToolId::CloneStamp => SpriteMode::Paint(PaintKind::Clone),
            ToolId::ColorPicker => SpriteMode::ColorPick,
        }
    }

    /// Whether drawing with this tool may be constrained to a selection
    pub fn supports_selection(self) -> bool {
        matches!(self.mode(), SpriteMode::Paint(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaintKind {
    Brush,
    Eraser,
    Fill,
    Clone,
}

impl PaintKind {
    pub fn composite_op(self) -> CompositeOp {
        match self {
            PaintKind::Eraser => CompositeOp::DestinationOut,
            _ => CompositeOp::SourceOver,
        }
    }

    /// Strokes of this kind are previewed at low resolution while active
    pub fn uses_preview(self) -> bool {
        matches!(self, PaintKind::Brush | PaintKind::Eraser)
    }

    /// A press applies the whole edit at once instead of starting a stroke
    pub fn is_atomic(self) -> bool {
        matches!(self, PaintKind::Fill)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpriteMode {
    #[default]
    Idle,
    Drag,
    Paint(PaintKind),
    ColorPick,
}

impl SpriteMode {
    pub fn paint_kind(self) -> Option<PaintKind> {
        match self {
            SpriteMode::Paint(kind) => Some(kind),
            _ => None,
        }
    }

    /// Drawable flags this mode needs from the host
    pub fn flags(self) -> InteractionFlags {
        match self {
            SpriteMode::Idle => InteractionFlags::default(),
            SpriteMode::Drag => InteractionFlags {
                interactive: true,
                draggable: true,
                drag_follow: false,
            },
            // Paint modes ride on drag delivery to receive continuous moves
            SpriteMode::Paint(_) => InteractionFlags {
                interactive: true,
                draggable: false,
                drag_follow: true,
            },
            SpriteMode::ColorPick => InteractionFlags {
                interactive: true,
                draggable: false,
                drag_follow: false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InteractionFlags {
    pub interactive: bool,
    pub draggable: bool,
    /// Deliver pointer moves between press and release even when not dragging
    pub drag_follow: bool,
}

/// Tool-specific options; read-only while the tool is active
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolOptions {
    pub radius: f64,
    /// Edge hardness (0 = soft, 1 = hard)
    pub hardness: f32,
    /// Dab spacing as a fraction of the brush diameter
    pub spacing: f64,
    /// Clone-stamp source in document coordinates; set by the first press
    pub clone_source: Option<Point>,
    /// Paint onto the layer mask when the layer has one
    pub edit_mask: bool,
}

impl Default for ToolOptions {
    fn default() -> Self {
        Self {
            radius: 10.0,
            hardness: 1.0,
            spacing: 0.25,
            clone_source: None,
            edit_mask: false,
        }
    }
}

/// Tool identifier plus options, as sent by the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfig {
    pub tool: ToolId,
    #[serde(default)]
    pub options: ToolOptions,
}

/// Result of a tool change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SpriteMode,
    pub to: SpriteMode,
}

/// Current tool, its options and the derived mode
#[derive(Debug, Clone, Default)]
pub struct ToolState {
    tool: Option<ToolId>,
    options: ToolOptions,
    mode: SpriteMode,
}

impl ToolState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Switch tools. Clone source coordinates never carry over.
    pub fn configure(&mut self, tool: ToolId, mut options: ToolOptions) -> Transition {
        options.clone_source = None;
        let from = self.mode;
        self.tool = Some(tool);
        self.options = options;
        self.mode = tool.mode();
        Transition {
            from,
            to: self.mode,
        }
    }

    pub fn tool(&self) -> Option<ToolId> {
        self.tool
    }

    pub fn mode(&self) -> SpriteMode {
        self.mode
    }

    pub fn options(&self) -> &ToolOptions {
        &self.options
    }

    pub fn set_clone_source(&mut self, source: Point) {
        self.options.clone_source = Some(source);
    }

    pub fn supports_selection(&self) -> bool {
        self.tool.is_some_and(ToolId::supports_selection)
    }
}
