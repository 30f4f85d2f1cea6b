//! Pointer input types shared by the sprite's handlers

use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Which device produced a pointer event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerKind {
    #[default]
    Mouse,
    Touch,
    Pen,
}

impl PointerKind {
    /// Touch has no hover state, so moves without a press carry no cursor
    pub fn has_hover(&self) -> bool {
        !matches!(self, PointerKind::Touch)
    }
}

/// Phase of a pointer event as delivered by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerPhase {
    Press,
    Move,
    Release,
}

/// A pointer event in document coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    pub x: f64,
    pub y: f64,
    pub kind: PointerKind,
    pub phase: PointerPhase,
}

impl PointerEvent {
    pub fn new(position: Point, kind: PointerKind, phase: PointerPhase) -> Self {
        Self {
            x: position.x,
            y: position.y,
            kind,
            phase,
        }
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_has_no_hover() {
        assert!(PointerKind::Mouse.has_hover());
        assert!(PointerKind::Pen.has_hover());
        assert!(!PointerKind::Touch.has_hover());
    }

    #[test]
    fn test_event_from_json() -> Result<(), serde_json::Error> {
        let event: PointerEvent =
            serde_json::from_str(r#"{ "x": 3.5, "y": 4.0, "kind": "pen", "phase": "press" }"#)?;
        assert_eq!(event.position(), Point::new(3.5, 4.0));
        assert_eq!(event.kind, PointerKind::Pen);
        assert_eq!(event.phase, PointerPhase::Press);
        Ok(())
    }
}
