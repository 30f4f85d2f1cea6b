//! Stroke Buffer - Records pointer samples for one press-drag-release gesture
//!
//! The buffer is the hand-off between pointer handlers and the frame tick:
//! - Pointer moves append samples as they arrive, duplicates included
//! - The frame tick drains only the tail that has not been rendered yet
//! - The full list survives until the final full-resolution render consumes it

use kurbo::Point;

/// Ordered pointer samples plus the "last rendered" cursor
#[derive(Debug, Clone, Default)]
pub struct StrokeBuffer {
    points: Vec<Point>,
    /// Number of points already handed to a renderer
    last: usize,
    /// Whether the pointer is currently down
    active: bool,
}

impl StrokeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin a new stroke at `point`, discarding any previous samples
    pub fn press(&mut self, point: Point) {
        self.points.clear();
        self.points.push(point);
        self.last = 0;
        self.active = true;
    }

    /// Append a sample; ignored unless a stroke is active
    pub fn push(&mut self, point: Point) -> bool {
        if !self.active {
            return false;
        }
        self.points.push(point);
        true
    }

    /// End the stroke. Returns false if no stroke was active.
    pub fn release(&mut self) -> bool {
        let was_active = self.active;
        self.active = false;
        was_active
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Points appended since the previous drain; advances the cursor
    pub fn drain_unrendered(&mut self) -> &[Point] {
        let start = self.last.min(self.points.len());
        self.last = self.points.len();
        &self.points[start..]
    }

    pub fn has_unrendered(&self) -> bool {
        self.last < self.points.len()
    }

    /// Every sample of the current (or just released) stroke, in arrival order
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Hand the full sample list to the final render and reset the buffer
    pub fn take_points(&mut self) -> Vec<Point> {
        self.last = 0;
        std::mem::take(&mut self.points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_creation() {
        let buffer = StrokeBuffer::new();
        assert!(!buffer.is_active());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_push_requires_active_stroke() {
        let mut buffer = StrokeBuffer::new();
        assert!(!buffer.push(Point::new(1.0, 1.0)));
        assert!(buffer.is_empty());

        buffer.press(Point::new(0.0, 0.0));
        assert!(buffer.push(Point::new(1.0, 1.0)));
        assert!(buffer.release());
        assert!(!buffer.push(Point::new(2.0, 2.0)));
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_drain_returns_only_new_points() {
        let mut buffer = StrokeBuffer::new();
        buffer.press(Point::new(0.0, 0.0));
        buffer.push(Point::new(1.0, 0.0));

        assert_eq!(buffer.drain_unrendered().len(), 2);
        assert!(buffer.drain_unrendered().is_empty());

        buffer.push(Point::new(2.0, 0.0));
        buffer.push(Point::new(2.0, 0.0));
        let tail = buffer.drain_unrendered().to_vec();
        assert_eq!(tail, vec![Point::new(2.0, 0.0), Point::new(2.0, 0.0)]);

        // Draining never removes history
        assert_eq!(buffer.points().len(), 4);
    }

    #[test]
    fn test_duplicates_kept_in_order() {
        let mut buffer = StrokeBuffer::new();
        buffer.press(Point::new(5.0, 5.0));
        buffer.push(Point::new(5.0, 5.0));
        buffer.push(Point::new(4.0, 5.0));
        assert_eq!(
            buffer.points(),
            &[Point::new(5.0, 5.0), Point::new(5.0, 5.0), Point::new(4.0, 5.0)]
        );
    }

    #[test]
    fn test_take_points_resets() {
        let mut buffer = StrokeBuffer::new();
        buffer.press(Point::new(0.0, 0.0));
        buffer.push(Point::new(3.0, 4.0));
        buffer.drain_unrendered();
        buffer.release();

        let points = buffer.take_points();
        assert_eq!(points.len(), 2);
        assert!(buffer.is_empty());
        assert!(!buffer.has_unrendered());
    }

    #[test]
    fn test_press_starts_fresh_stroke() {
        let mut buffer = StrokeBuffer::new();
        buffer.press(Point::new(0.0, 0.0));
        buffer.push(Point::new(1.0, 0.0));
        buffer.release();

        buffer.press(Point::new(9.0, 9.0));
        assert_eq!(buffer.points(), &[Point::new(9.0, 9.0)]);
        assert!(buffer.has_unrendered());
    }
}
