//! Coordinate transform between pointer space and a layer's local space
//!
//! Three spaces are involved:
//! - pointer (document) space, where events arrive
//! - local space: unrotated and unscaled, with the mirror *offset* applied.
//!   A mirrored axis is shifted by the full surface dimension, so x = 5 on a
//!   100 px wide mirrored layer becomes -95
//! - surface space: local space after the mirror *scale* (x -> -x), i.e. the
//!   actual pixel coordinates of the layer bitmap
//!
//! Rotation and scale pivot on the layer center (half dimensions) while the
//! mirror offset uses the full dimension. Drawing code relies on that.

use crate::layer::Layer;
use kurbo::{Affine, Point, Rect, Vec2};

/// Scales closer to zero than this are treated as 1
const MIN_SCALE: f64 = 1e-6;

/// Pure geometric description of how a layer sits in the document
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayerTransform {
    pub position: Point,
    pub width: f64,
    pub height: f64,
    /// Clockwise rotation in radians
    pub rotation: f64,
    pub scale: f64,
    pub mirror_x: bool,
    pub mirror_y: bool,
}

impl LayerTransform {
    pub fn of(layer: &Layer) -> Self {
        Self {
            position: layer.position(),
            width: layer.width as f64,
            height: layer.height as f64,
            rotation: layer.effects.rotation.to_radians(),
            scale: layer.effects.scale,
            mirror_x: layer.effects.mirror_x,
            mirror_y: layer.effects.mirror_y,
        }
    }

    fn center(&self) -> Vec2 {
        Vec2::new(self.width / 2.0, self.height / 2.0)
    }

    /// Scale with near-zero values replaced by 1
    pub fn effective_scale(&self) -> f64 {
        if self.scale.abs() < MIN_SCALE {
            1.0
        } else {
            self.scale
        }
    }

    fn mirror_offset(&self) -> Vec2 {
        Vec2::new(
            if self.mirror_x { self.width } else { 0.0 },
            if self.mirror_y { self.height } else { 0.0 },
        )
    }

    /// Pointer space -> local space
    pub fn to_local(&self, point: Point) -> Point {
        let c = self.center();
        let v = point - self.position - c;
        let v = rotate(v, -self.rotation) / self.effective_scale();
        (v + c - self.mirror_offset()).to_point()
    }

    /// Local space -> pointer space
    pub fn to_pointer(&self, local: Point) -> Point {
        let c = self.center();
        let v = local.to_vec2() + self.mirror_offset() - c;
        let v = rotate(v * self.effective_scale(), self.rotation);
        self.position + c + v
    }

    /// Bulk `to_local` over a whole point list
    pub fn to_local_all(&self, points: &[Point]) -> Vec<Point> {
        points.iter().map(|&p| self.to_local(p)).collect()
    }

    /// Scale applied to a drawing context so local points land on surface pixels
    pub fn mirror_scale(&self) -> Affine {
        Affine::scale_non_uniform(
            if self.mirror_x { -1.0 } else { 1.0 },
            if self.mirror_y { -1.0 } else { 1.0 },
        )
    }

    /// Pointer space -> surface pixel space
    pub fn to_surface(&self, point: Point) -> Point {
        self.mirror_scale() * self.to_local(point)
    }

    /// Surface pixel space -> pointer (document) space, for drawing the layer
    pub fn display_affine(&self) -> Affine {
        let c = self.center();
        Affine::translate(self.position.to_vec2() + c)
            * Affine::rotate(self.rotation)
            * Affine::scale(self.effective_scale())
            * Affine::translate(-c)
            * Affine::translate(self.mirror_offset())
            * self.mirror_scale()
    }

    /// Axis-aligned document-space bounds of the transformed layer
    pub fn bounds(&self) -> Rect {
        self.display_affine()
            .transform_rect_bbox(Rect::new(0.0, 0.0, self.width, self.height))
    }

    /// Surface-space bounding box of a document-space rectangle
    pub fn surface_rect(&self, rect: Rect) -> Rect {
        let corners = [
            Point::new(rect.x0, rect.y0),
            Point::new(rect.x1, rect.y0),
            Point::new(rect.x1, rect.y1),
            Point::new(rect.x0, rect.y1),
        ];
        let mapped = corners.map(|p| self.to_surface(p));
        mapped[1..]
            .iter()
            .fold(Rect::from_points(mapped[0], mapped[0]), |acc, &p| acc.union_pt(p))
    }
}

fn rotate(v: Vec2, angle: f64) -> Vec2 {
    let (sin, cos) = angle.sin_cos();
    Vec2::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{LayerEffects, LayerId};

    fn close(a: Point, b: Point) -> bool {
        (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
    }

    fn transform(rotation_deg: f64, mirror_x: bool, mirror_y: bool, scale: f64) -> LayerTransform {
        let layer = Layer::new(LayerId(1), 100, 60)
            .with_position(30.0, -12.0)
            .with_effects(LayerEffects {
                rotation: rotation_deg,
                mirror_x,
                mirror_y,
                scale,
                ..LayerEffects::default()
            });
        LayerTransform::of(&layer)
    }

    #[test]
    fn test_round_trip_over_angles() {
        let points = [
            Point::new(0.0, 0.0),
            Point::new(57.25, 13.5),
            Point::new(-40.0, 300.0),
        ];
        for step in 0..24 {
            let angle = step as f64 * 15.0 - 90.0;
            for &(mx, my) in &[(false, false), (true, false), (false, true), (true, true)] {
                let t = transform(angle, mx, my, 1.5);
                for &p in &points {
                    assert!(close(t.to_pointer(t.to_local(p)), p), "angle {angle} point {p:?}");
                }
            }
        }
    }

    #[test]
    fn test_mirror_offsets_by_full_width() {
        let layer = Layer::new(LayerId(1), 100, 100).with_effects(LayerEffects {
            mirror_x: true,
            ..LayerEffects::default()
        });
        let t = LayerTransform::of(&layer);

        let local = t.to_local(Point::new(5.0, 7.0));
        assert!(close(local, Point::new(-95.0, 7.0)));
        // Mirror scale then lands it on the reflected pixel column
        assert!(close(t.to_surface(Point::new(5.0, 7.0)), Point::new(95.0, 7.0)));
    }

    #[test]
    fn test_rotation_about_center() {
        // 90 degrees clockwise on a 100x60 layer at the origin
        let layer = Layer::new(LayerId(1), 100, 60).with_effects(LayerEffects {
            rotation: 90.0,
            ..LayerEffects::default()
        });
        let t = LayerTransform::of(&layer);

        // The center is fixed
        assert!(close(t.to_local(Point::new(50.0, 30.0)), Point::new(50.0, 30.0)));
        // A point below the center on screen is to its right in local space
        assert!(close(t.to_local(Point::new(50.0, 40.0)), Point::new(60.0, 30.0)));
    }

    #[test]
    fn test_display_affine_inverts_to_surface() {
        for &(mx, my) in &[(false, false), (true, false), (false, true), (true, true)] {
            let t = transform(33.0, mx, my, 0.75);
            let surface_point = Point::new(12.0, 41.0);
            let doc = t.display_affine() * surface_point;
            assert!(close(t.to_surface(doc), surface_point));
        }
    }

    #[test]
    fn test_zero_scale_is_ignored() {
        let t = transform(0.0, false, false, 0.0);
        assert!(close(t.to_local(Point::new(40.0, -2.0)), Point::new(10.0, 10.0)));
    }

    #[test]
    fn test_bulk_matches_pointwise() {
        let t = transform(12.0, true, false, 1.0);
        let points = [Point::new(1.0, 2.0), Point::new(3.0, 4.0)];
        let bulk = t.to_local_all(&points);
        assert_eq!(bulk, vec![t.to_local(points[0]), t.to_local(points[1])]);
    }
}
