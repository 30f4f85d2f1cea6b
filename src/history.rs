//! History Snapshot Manager
//!
//! Coalesces a burst of edits to one layer into a single history entry:
//! - The first edit captures the pre-edit contents and starts encoding them
//! - Later edits only push the commit deadline out
//! - Once the deadline passes with no stroke active, the post-edit contents
//!   are encoded and one entry (undo = original, redo = result) is appended
//!
//! The state machine is explicit: `Idle` or `Pending(cycle)`, with at most
//! one cycle per manager. Deadlines are plain `Instant`s checked by the
//! sprite's frame tick, so no callback ever captures the sprite.

use crate::codec::{EncodedBitmap, SnapshotCodec};
use crate::error::SnapshotError;
use crate::layer::{LayerId, SurfaceTarget};
use image::RgbaImage;
use kurbo::Point;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// What kind of edit a history entry undoes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditKind {
    Paint,
    Mask,
    Move,
}

impl fmt::Display for EditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EditKind::Paint => "paint",
            EditKind::Mask => "mask",
            EditKind::Move => "move",
        };
        f.write_str(name)
    }
}

/// History entry identity, scoped to a layer and edit kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HistoryId {
    pub layer: LayerId,
    pub kind: EditKind,
}

impl fmt::Display for HistoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.layer, self.kind)
    }
}

/// The part of a layer a snapshot covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotTarget {
    Surface(SurfaceTarget),
    Position,
}

impl SnapshotTarget {
    pub fn edit_kind(self) -> EditKind {
        match self {
            SnapshotTarget::Surface(SurfaceTarget::Source) => EditKind::Paint,
            SnapshotTarget::Surface(SurfaceTarget::Mask) => EditKind::Mask,
            SnapshotTarget::Position => EditKind::Move,
        }
    }
}

/// Raw layer state handed to the manager before encoding
#[derive(Debug, Clone)]
pub enum Capture {
    Bitmap { target: SurfaceTarget, image: RgbaImage },
    Position(Point),
}

impl Capture {
    pub fn target(&self) -> SnapshotTarget {
        match self {
            Capture::Bitmap { target, .. } => SnapshotTarget::Surface(*target),
            Capture::Position(_) => SnapshotTarget::Position,
        }
    }
}

/// Encoded layer state owned by a history entry
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Bitmap {
        target: SurfaceTarget,
        bitmap: EncodedBitmap,
    },
    Position(Point),
}

impl Snapshot {
    pub fn target(&self) -> SnapshotTarget {
        match self {
            Snapshot::Bitmap { target, .. } => SnapshotTarget::Surface(*target),
            Snapshot::Position(_) => SnapshotTarget::Position,
        }
    }
}

/// Restore one snapshot onto whichever sprite renders `layer` at the time
#[derive(Debug, Clone)]
pub struct RestoreAction {
    pub layer: LayerId,
    pub snapshot: Arc<Snapshot>,
}

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub undo: RestoreAction,
    pub redo: RestoreAction,
    /// Snapshots the log takes ownership of
    pub resources: Vec<Arc<Snapshot>>,
}

/// The host's undo/redo log
pub trait HistoryLog: Send {
    fn append(&mut self, id: HistoryId, entry: HistoryEntry);
}

/// Decoded state applied by a restore
#[derive(Debug, Clone)]
pub enum RestoredState {
    Bitmap { target: SurfaceTarget, image: RgbaImage },
    Position(Point),
}

/// Something that can take restored layer state and refresh its caches
pub trait Restorable {
    /// Returns false when the state could not be applied
    fn restore_snapshot(&mut self, state: RestoredState) -> bool;
}

/// Finds the live renderer for a layer by identity
pub trait SpriteLookup {
    fn sprite_for_layer(&mut self, layer: LayerId) -> Option<&mut dyn Restorable>;
}

/// An encode that may still be running on the blocking pool
#[derive(Debug)]
enum PendingSnapshot {
    Ready(Result<Snapshot, SnapshotError>),
    Running(JoinHandle<Result<Snapshot, SnapshotError>>),
}

impl PendingSnapshot {
    fn start(codec: &Arc<dyn SnapshotCodec>, capture: Capture) -> Self {
        let (target, image) = match capture {
            Capture::Position(point) => return Self::Ready(Ok(Snapshot::Position(point))),
            Capture::Bitmap { target, image } => (target, image),
        };
        match Handle::try_current() {
            Ok(handle) => {
                let codec = Arc::clone(codec);
                Self::Running(handle.spawn_blocking(move || encode(codec.as_ref(), target, &image)))
            }
            // No runtime: encode inline
            Err(_) => Self::Ready(encode(codec.as_ref(), target, &image)),
        }
    }

    async fn resolve(self) -> Result<Snapshot, SnapshotError> {
        match self {
            Self::Ready(result) => result,
            Self::Running(handle) => handle.await?,
        }
    }
}

fn encode(
    codec: &dyn SnapshotCodec,
    target: SurfaceTarget,
    image: &RgbaImage,
) -> Result<Snapshot, SnapshotError> {
    codec
        .encode(image)
        .map(|bitmap| Snapshot::Bitmap { target, bitmap })
}

#[derive(Debug)]
struct PendingCycle {
    target: SnapshotTarget,
    original: PendingSnapshot,
    deadline: Instant,
}

#[derive(Debug, Default)]
enum SnapshotState {
    #[default]
    Idle,
    Pending(PendingCycle),
}

/// Debounced before/after snapshotting for one layer
pub struct SnapshotManager {
    codec: Arc<dyn SnapshotCodec>,
    idle_delay: Duration,
    active_delay: Duration,
    state: SnapshotState,
}

impl fmt::Debug for SnapshotManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotManager")
            .field("idle_delay", &self.idle_delay)
            .field("active_delay", &self.active_delay)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl SnapshotManager {
    pub fn new(codec: Arc<dyn SnapshotCodec>, idle_delay: Duration, active_delay: Duration) -> Self {
        Self {
            codec,
            idle_delay,
            active_delay,
            state: SnapshotState::Idle,
        }
    }

    fn delay(&self, stroke_active: bool) -> Duration {
        if stroke_active {
            self.active_delay
        } else {
            self.idle_delay
        }
    }

    /// Record that an edit is about to happen
    ///
    /// Starts a cycle (capturing the pre-edit state) if none is pending,
    /// otherwise only resets the timer. Returns true if a cycle started.
    pub fn begin_edit(
        &mut self,
        stroke_active: bool,
        capture: impl FnOnce() -> Option<Capture>,
    ) -> bool {
        if self.is_pending() {
            self.touch(stroke_active);
            return false;
        }
        let Some(capture) = capture() else {
            tracing::debug!("[History] Nothing to capture, edit is not recorded");
            return false;
        };
        let target = capture.target();
        self.state = SnapshotState::Pending(PendingCycle {
            target,
            original: PendingSnapshot::start(&self.codec, capture),
            deadline: Instant::now() + self.delay(stroke_active),
        });
        tracing::debug!("[History] Snapshot cycle started for {:?}", target);
        true
    }

    /// Restart the debounce timer of the pending cycle, if any
    pub fn touch(&mut self, stroke_active: bool) {
        let deadline = Instant::now() + self.delay(stroke_active);
        if let SnapshotState::Pending(cycle) = &mut self.state {
            cycle.deadline = deadline;
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, SnapshotState::Pending(_))
    }

    pub fn pending_target(&self) -> Option<SnapshotTarget> {
        match &self.state {
            SnapshotState::Pending(cycle) => Some(cycle.target),
            SnapshotState::Idle => None,
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            SnapshotState::Pending(cycle) => Some(cycle.deadline),
            SnapshotState::Idle => None,
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|deadline| now >= deadline)
    }

    /// Drop the pending cycle without appending anything
    pub fn cancel(&mut self) {
        if let SnapshotState::Pending(cycle) = std::mem::take(&mut self.state) {
            if let PendingSnapshot::Running(handle) = cycle.original {
                handle.abort();
            }
        }
    }

    /// Close the pending cycle and append its entry
    ///
    /// `after` is the post-edit state. Pending state is cleared before
    /// anything can fail, so a failed encode aborts the cycle rather than
    /// leaving a half-built entry behind.
    pub async fn commit(
        &mut self,
        layer: LayerId,
        after: Option<Capture>,
        log: &Mutex<dyn HistoryLog>,
    ) -> Result<Option<HistoryId>, SnapshotError> {
        let SnapshotState::Pending(cycle) = std::mem::take(&mut self.state) else {
            return Ok(None);
        };
        let after = after.ok_or(SnapshotError::DisposedSurface)?;
        if after.target() != cycle.target {
            return Err(SnapshotError::KindMismatch);
        }

        let original = Arc::new(cycle.original.resolve().await?);
        let result = Arc::new(PendingSnapshot::start(&self.codec, after).resolve().await?);

        let id = HistoryId {
            layer,
            kind: cycle.target.edit_kind(),
        };
        let entry = HistoryEntry {
            undo: RestoreAction {
                layer,
                snapshot: Arc::clone(&original),
            },
            redo: RestoreAction {
                layer,
                snapshot: Arc::clone(&result),
            },
            resources: vec![original, result],
        };
        log.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .append(id, entry);
        tracing::info!("[History] Committed {}", id);
        Ok(Some(id))
    }
}

/// Apply a stored snapshot to the sprite currently rendering its layer
///
/// Returns `Ok(false)` when no live sprite renders the layer.
pub async fn restore(
    action: &RestoreAction,
    lookup: &mut dyn SpriteLookup,
    codec: Arc<dyn SnapshotCodec>,
) -> Result<bool, SnapshotError> {
    let state = match action.snapshot.as_ref() {
        Snapshot::Position(point) => RestoredState::Position(*point),
        Snapshot::Bitmap { target, .. } => {
            let target = *target;
            let snapshot = Arc::clone(&action.snapshot);
            let decode = move || match snapshot.as_ref() {
                Snapshot::Bitmap { bitmap, .. } => codec.decode(bitmap),
                Snapshot::Position(_) => Err(SnapshotError::KindMismatch),
            };
            let image = match Handle::try_current() {
                Ok(handle) => handle.spawn_blocking(decode).await??,
                Err(_) => decode()?,
            };
            RestoredState::Bitmap { target, image }
        }
    };

    let Some(sprite) = lookup.sprite_for_layer(action.layer) else {
        tracing::warn!("[History] No live sprite for {}, restore skipped", action.layer);
        return Ok(false);
    };
    Ok(sprite.restore_snapshot(state))
}
