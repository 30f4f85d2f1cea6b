//! Brush Stamper - Distance-based dab emission along a point list
//!
//! This module handles the conversion of stroke points to brush dabs,
//! using distance accumulation to ensure consistent spacing regardless
//! of how fast pointer events arrived. Feeding the same points in one
//! batch or across several frames yields the same dabs.

use kurbo::Point;

/// A single brush dab to be rendered
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dab {
    /// Center position
    pub center: Point,
    /// Dab size (diameter)
    pub size: f64,
}

/// Brush stamper configuration
#[derive(Debug, Clone)]
pub struct StamperConfig {
    /// Brush size (diameter in pixels)
    pub size: f64,
    /// Spacing as fraction of size (e.g., 0.25 = 25%)
    pub spacing: f64,
}

impl Default for StamperConfig {
    fn default() -> Self {
        Self {
            size: 20.0,
            spacing: 0.25,
        }
    }
}

/// Brush stamper that converts stroke points to dabs
#[derive(Debug, Clone)]
pub struct BrushStamper {
    config: StamperConfig,
    /// Distance travelled since the last dab
    accumulated_distance: f64,
    /// Last input point processed
    last_point: Option<Point>,
}

impl BrushStamper {
    /// Create a new stamper with given configuration
    pub fn new(config: StamperConfig) -> Self {
        Self {
            config,
            accumulated_distance: 0.0,
            last_point: None,
        }
    }

    pub fn config(&self) -> &StamperConfig {
        &self.config
    }

    /// Reset for a new stroke
    pub fn begin_stroke(&mut self) {
        self.accumulated_distance = 0.0;
        self.last_point = None;
    }

    /// Distance between dabs, never below one pixel
    fn threshold(&self) -> f64 {
        (self.config.size * self.config.spacing).max(1.0)
    }

    /// Process a new point and return dabs to render
    pub fn process_point(&mut self, point: Point) -> Vec<Dab> {
        let mut dabs = Vec::new();

        // First point of stroke: emit initial dab
        let Some(last) = self.last_point else {
            self.last_point = Some(point);
            dabs.push(self.create_dab(point));
            return dabs;
        };

        let distance = last.distance(point);
        if distance < f64::EPSILON {
            return dabs;
        }

        let threshold = self.threshold();
        // Distance along this segment where the next dab is due
        let mut travelled = threshold - self.accumulated_distance;
        while travelled <= distance {
            let t = travelled / distance;
            dabs.push(self.create_dab(last.lerp(point, t)));
            travelled += threshold;
        }
        self.accumulated_distance = distance - (travelled - threshold);
        self.last_point = Some(point);

        dabs
    }

    /// Process a batch of points in order
    pub fn process_points(&mut self, points: &[Point]) -> Vec<Dab> {
        points
            .iter()
            .flat_map(|&p| self.process_point(p))
            .collect()
    }

    fn create_dab(&self, center: Point) -> Dab {
        Dab {
            center,
            size: self.config.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamper_creation() {
        let stamper = BrushStamper::new(StamperConfig::default());
        assert_eq!(stamper.config().size, 20.0);
        assert_eq!(stamper.config().spacing, 0.25);
    }

    #[test]
    fn test_first_point_emits_dab() {
        let mut stamper = BrushStamper::new(StamperConfig::default());
        stamper.begin_stroke();

        let dabs = stamper.process_point(Point::new(100.0, 100.0));

        assert_eq!(dabs.len(), 1);
        assert_eq!(dabs[0].center, Point::new(100.0, 100.0));
    }

    #[test]
    fn test_close_points_no_extra_dabs() {
        let mut stamper = BrushStamper::new(StamperConfig {
            size: 20.0,
            spacing: 0.25, // 5 pixel spacing
        });
        stamper.begin_stroke();

        stamper.process_point(Point::new(100.0, 100.0));
        let dabs = stamper.process_point(Point::new(101.0, 100.0));

        assert!(dabs.is_empty());
    }

    #[test]
    fn test_far_points_emit_evenly_spaced_dabs() {
        let mut stamper = BrushStamper::new(StamperConfig {
            size: 20.0,
            spacing: 0.25,
        });
        stamper.begin_stroke();

        stamper.process_point(Point::new(0.0, 0.0));
        let dabs = stamper.process_point(Point::new(50.0, 0.0));

        assert_eq!(dabs.len(), 10);
        assert!((dabs[0].center.x - 5.0).abs() < 1e-9);
        assert!((dabs[9].center.x - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_incremental_matches_batch() {
        let points = [
            Point::new(0.0, 0.0),
            Point::new(3.0, 1.0),
            Point::new(9.0, 4.0),
            Point::new(9.0, 4.0),
            Point::new(20.0, 2.0),
        ];
        let config = StamperConfig {
            size: 8.0,
            spacing: 0.5,
        };

        let mut batch = BrushStamper::new(config.clone());
        let all = batch.process_points(&points);

        let mut incremental = BrushStamper::new(config);
        let mut pieces = incremental.process_points(&points[..2]);
        pieces.extend(incremental.process_points(&points[2..]));

        assert_eq!(all, pieces);
    }

    #[test]
    fn test_begin_stroke_resets_state() {
        let mut stamper = BrushStamper::new(StamperConfig::default());

        stamper.process_point(Point::new(0.0, 0.0));
        stamper.process_point(Point::new(100.0, 0.0));

        stamper.begin_stroke();
        let dabs = stamper.process_point(Point::new(0.0, 0.0));

        assert_eq!(dabs.len(), 1);
    }
}
