//! Raster surfaces and their 2D drawing context
//!
//! A `Surface` owns straight-alpha RGBA8 pixels. Drawing goes through a
//! `DrawContext`, which carries the current transform, composite operator
//! and clip mask, much like a canvas 2D context. A disposed surface hands
//! out no context at all, which callers treat as a silent no-op.

use crate::brush::{CompositeOp, Pixel, Stamp};
use image::{GrayImage, Rgba, RgbaImage};
use kurbo::{Affine, Point, Rect, Vec2};

/// Integer pixel rectangle, right/bottom exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Default for PixelRect {
    fn default() -> Self {
        Self::empty()
    }
}

impl PixelRect {
    pub fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn empty() -> Self {
        Self {
            left: i32::MAX,
            top: i32::MAX,
            right: i32::MIN,
            bottom: i32::MIN,
        }
    }

    /// Smallest pixel rectangle covering a float rectangle
    pub fn covering(rect: Rect) -> Self {
        Self {
            left: rect.x0.floor() as i32,
            top: rect.y0.floor() as i32,
            right: rect.x1.ceil() as i32,
            bottom: rect.y1.ceil() as i32,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    pub fn expand(&mut self, x: i32, y: i32, radius: i32) {
        self.left = self.left.min(x - radius);
        self.top = self.top.min(y - radius);
        self.right = self.right.max(x + radius + 1);
        self.bottom = self.bottom.max(y + radius + 1);
    }

    pub fn clamp_to(&mut self, width: i32, height: i32) {
        self.left = self.left.max(0);
        self.top = self.top.max(0);
        self.right = self.right.min(width);
        self.bottom = self.bottom.min(height);
    }
}

/// Clip the segment `a`-`b` to `bounds` (Liang-Barsky)
///
/// `None` when nothing of the segment is inside or an end is not finite.
fn clip_segment(a: Point, b: Point, bounds: Rect) -> Option<(Point, Point)> {
    if !(a.is_finite() && b.is_finite()) {
        return None;
    }
    let d = b - a;
    let (mut t0, mut t1) = (0.0_f64, 1.0_f64);
    let edges = [
        (-d.x, a.x - bounds.x0),
        (d.x, bounds.x1 - a.x),
        (-d.y, a.y - bounds.y0),
        (d.y, bounds.y1 - a.y),
    ];
    for (p, q) in edges {
        if p == 0.0 {
            // Parallel to this edge
            if q < 0.0 {
                return None;
            }
        } else if p < 0.0 {
            t0 = t0.max(q / p);
        } else {
            t1 = t1.min(q / p);
        }
        if t0 > t1 {
            return None;
        }
    }
    Some((a.lerp(b, t0), a.lerp(b, t1)))
}

/// Nearest-neighbor lookup; `None` outside the image
pub fn sample_nearest(image: &RgbaImage, point: Point) -> Option<Rgba<u8>> {
    let x = point.x.floor();
    let y = point.y.floor();
    if x < 0.0 || y < 0.0 || x >= image.width() as f64 || y >= image.height() as f64 {
        return None;
    }
    Some(*image.get_pixel(x as u32, y as u32))
}

/// A raster surface that may be disposed while references to it remain
#[derive(Debug, Clone)]
pub struct Surface {
    image: Option<RgbaImage>,
}

impl Surface {
    /// Fully transparent surface
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: Some(RgbaImage::new(width, height)),
        }
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self { image: Some(image) }
    }

    pub fn is_live(&self) -> bool {
        self.image.is_some()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.as_ref().map_or((0, 0), |img| img.dimensions())
    }

    pub fn image(&self) -> Option<&RgbaImage> {
        self.image.as_ref()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        let image = self.image.as_ref()?;
        (x < image.width() && y < image.height()).then(|| *image.get_pixel(x, y))
    }

    /// Swap in new pixel contents, reviving a disposed surface
    pub fn replace(&mut self, image: RgbaImage) {
        self.image = Some(image);
    }

    pub fn dispose(&mut self) {
        self.image = None;
    }

    /// Drawing context with identity transform, source-over and no clip
    pub fn context(&mut self) -> Option<DrawContext<'_>> {
        self.image.as_mut().map(DrawContext::new)
    }
}

/// Stateful 2D drawing context over a borrowed pixel buffer
#[derive(Debug)]
pub struct DrawContext<'a> {
    target: &'a mut RgbaImage,
    composite: CompositeOp,
    /// User space to device (pixel) space
    transform: Affine,
    /// Per-pixel coverage in device space
    clip: Option<GrayImage>,
    dirty: PixelRect,
}

impl<'a> DrawContext<'a> {
    pub fn new(target: &'a mut RgbaImage) -> Self {
        Self {
            target,
            composite: CompositeOp::SourceOver,
            transform: Affine::IDENTITY,
            clip: None,
            dirty: PixelRect::empty(),
        }
    }

    pub fn width(&self) -> u32 {
        self.target.width()
    }

    pub fn height(&self) -> u32 {
        self.target.height()
    }

    pub fn composite(&self) -> CompositeOp {
        self.composite
    }

    pub fn set_composite(&mut self, op: CompositeOp) {
        self.composite = op;
    }

    pub fn current_transform(&self) -> Affine {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Affine) {
        self.transform = transform;
    }

    /// Post-multiply: `affine` is applied to user coordinates first
    pub fn transform(&mut self, affine: Affine) {
        self.transform = self.transform * affine;
    }

    pub fn clip(&self) -> Option<&GrayImage> {
        self.clip.as_ref()
    }

    /// Install a device-space clip mask, returning the previous one
    pub fn set_clip(&mut self, clip: Option<GrayImage>) -> Option<GrayImage> {
        std::mem::replace(&mut self.clip, clip)
    }

    /// Pixels touched since the context was created
    pub fn dirty(&self) -> PixelRect {
        self.dirty
    }

    /// Device-space pixel area covered by `rect` under `affine`, clamped to the target
    fn area_of(&self, affine: Affine, rect: Rect) -> Option<PixelRect> {
        let mut area = PixelRect::covering(affine.transform_rect_bbox(rect));
        area.clamp_to(self.target.width() as i32, self.target.height() as i32);
        (!area.is_empty()).then_some(area)
    }

    /// Composite one premultiplied pixel at device coordinates
    pub fn blend_pixel(&mut self, x: i32, y: i32, src: Pixel) {
        if x < 0 || y < 0 || x >= self.target.width() as i32 || y >= self.target.height() as i32 {
            return;
        }
        let (ux, uy) = (x as u32, y as u32);
        let coverage = match &self.clip {
            Some(mask) => match mask.get_pixel_checked(ux, uy) {
                Some(value) => value.0[0] as f32 / 255.0,
                None => 0.0,
            },
            None => 1.0,
        };
        if coverage <= 0.0 {
            return;
        }

        let dst = Pixel::from_rgba(*self.target.get_pixel(ux, uy));
        let out = self.composite.apply(src.scaled(coverage), dst);
        self.target.put_pixel(ux, uy, out.to_rgba());
        self.dirty.expand(x, y, 0);
    }

    /// Paint `color` over every pixel (subject to the clip)
    pub fn fill_all(&mut self, color: Rgba<u8>) {
        let src = Pixel::from_rgba(color);
        for y in 0..self.target.height() as i32 {
            for x in 0..self.target.width() as i32 {
                self.blend_pixel(x, y, src);
            }
        }
    }

    /// Fill a polygon given in user space with the nonzero winding rule
    pub fn fill_polygon(&mut self, points: &[Point], color: Rgba<u8>) {
        let device: Vec<Point> = points.iter().map(|&p| self.transform * p).collect();
        let coverage =
            crate::selection::rasterize_polygon(&device, self.target.width(), self.target.height());
        let src = Pixel::from_rgba(color);
        for (x, y, value) in coverage.enumerate_pixels() {
            if value.0[0] > 0 {
                self.blend_pixel(x as i32, y as i32, src.scaled(value.0[0] as f32 / 255.0));
            }
        }
    }

    /// Draw a brush stamp centered on a user-space point
    pub fn stamp(&mut self, stamp: &Stamp, center: Point) {
        if self.transform.determinant().abs() < 1e-12 {
            return;
        }
        let inv = self.transform.inverse();
        let r = stamp.radius;
        let user = Rect::new(center.x - r, center.y - r, center.x + r, center.y + r);
        let Some(area) = self.area_of(self.transform, user) else {
            return;
        };
        let (sw, sh) = stamp.image.dimensions();
        let half = Vec2::new(sw as f64 / 2.0, sh as f64 / 2.0);

        for y in area.top..area.bottom {
            for x in area.left..area.right {
                let u = inv * Point::new(x as f64 + 0.5, y as f64 + 0.5);
                let local = (u - center) + half;
                let Some(texel) = sample_nearest(&stamp.image, local.to_point()) else {
                    continue;
                };
                if texel.0[3] == 0 {
                    continue;
                }
                self.blend_pixel(x, y, Pixel::from_rgba(texel));
            }
        }
    }

    /// Draw an image; `placement` maps image pixels into user space
    pub fn draw_image(&mut self, image: &RgbaImage, placement: Affine) {
        let full = self.transform * placement;
        if full.determinant().abs() < 1e-12 {
            return;
        }
        let inv = full.inverse();
        let bounds = Rect::new(0.0, 0.0, image.width() as f64, image.height() as f64);
        let Some(area) = self.area_of(full, bounds) else {
            return;
        };

        for y in area.top..area.bottom {
            for x in area.left..area.right {
                let p = inv * Point::new(x as f64 + 0.5, y as f64 + 0.5);
                let Some(texel) = sample_nearest(image, p) else {
                    continue;
                };
                if texel.0[3] == 0 {
                    continue;
                }
                self.blend_pixel(x, y, Pixel::from_rgba(texel));
            }
        }
    }

    /// Copy a circular patch of `source` onto the target
    ///
    /// `center` is in user space; source pixels are read at
    /// `user_point + source_delta`, in the source image's own pixel space.
    pub fn clone_dab(&mut self, source: &RgbaImage, center: Point, source_delta: Vec2, radius: f64) {
        if self.transform.determinant().abs() < 1e-12 {
            return;
        }
        let inv = self.transform.inverse();
        let user = Rect::new(
            center.x - radius,
            center.y - radius,
            center.x + radius,
            center.y + radius,
        );
        let Some(area) = self.area_of(self.transform, user) else {
            return;
        };

        for y in area.top..area.bottom {
            for x in area.left..area.right {
                let u = inv * Point::new(x as f64 + 0.5, y as f64 + 0.5);
                if u.distance(center) > radius {
                    continue;
                }
                let Some(texel) = sample_nearest(source, u + source_delta) else {
                    continue;
                };
                if texel.0[3] == 0 {
                    continue;
                }
                self.blend_pixel(x, y, Pixel::from_rgba(texel));
            }
        }
    }

    /// One-pixel outline through user-space points
    pub fn stroke_polyline(&mut self, points: &[Point], closed: bool, color: Rgba<u8>) {
        if points.is_empty() {
            return;
        }
        let src = Pixel::from_rgba(color);
        let device: Vec<Point> = points.iter().map(|&p| self.transform * p).collect();
        let bounds = Rect::new(
            -1.0,
            -1.0,
            self.target.width() as f64 + 1.0,
            self.target.height() as f64 + 1.0,
        );
        let segments = if closed { device.len() } else { device.len() - 1 };
        for i in 0..segments {
            let Some((a, b)) = clip_segment(device[i], device[(i + 1) % device.len()], bounds) else {
                continue;
            };
            let steps = (b.x - a.x).abs().max((b.y - a.y).abs()).ceil().max(1.0) as usize;
            for step in 0..=steps {
                let p = a.lerp(b, step as f64 / steps as f64);
                self.blend_pixel(p.x.floor() as i32, p.y.floor() as i32, src);
            }
        }
    }
}
