//! Layer Paint - interactive paint and compositing engine for one raster layer
//!
//! A [`LayerSprite`] turns pointer input into brush, eraser, fill,
//! clone-stamp, color-pick and move edits on a [`Layer`], previews live
//! strokes at reduced resolution, and records each finished gesture as one
//! undoable history entry.

pub mod brush;
pub mod codec;
pub mod compositor;
pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod input;
pub mod layer;
pub mod preview;
pub mod selection;
pub mod sprite;
pub mod surface;
pub mod tool;
pub mod transform;

pub use brush::{Brush, BrushSynth, CompositeOp, RoundBrush, Stamp};
pub use codec::{EncodedBitmap, PngCodec, RawCodec, SnapshotCodec};
pub use compositor::{PaintCompositor, PaintReport, PaintRequest};
pub use config::EngineConfig;
pub use context::{EngineContext, StaticContext, PREF_REDUCED_MEMORY};
pub use error::{ConfigError, SnapshotError};
pub use history::{restore, HistoryEntry, HistoryId, HistoryLog, SnapshotManager, SpriteLookup};
pub use input::{PointerEvent, PointerKind, PointerPhase};
pub use layer::{Layer, LayerEffects, LayerId, LayerKind, SurfaceTarget};
pub use selection::{ClipScope, Selection};
pub use sprite::{Drawable, LayerSprite, Services, SpriteEvent, Viewport};
pub use surface::{DrawContext, Surface};
pub use tool::{SpriteMode, ToolConfig, ToolId, ToolOptions};
pub use transform::LayerTransform;

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`)
///
/// Safe to call more than once; later calls leave the first subscriber in place.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
    {
        tracing::info!("[LayerPaint] Logging initialized");
    }
}
