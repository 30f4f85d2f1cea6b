//! Layer data model
//!
//! The sprite owns its working copy of a layer and reports every mutation
//! through `SpriteEvent::LayerChanged`; the document syncs from that.

use crate::surface::Surface;
use image::RgbaImage;
use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Stable identity of a layer across sprite lifetimes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerId(pub u64);

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "layer-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    Graphic,
    Text,
    MaskOnly,
}

/// Display effects; only the geometric ones matter to painting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerEffects {
    /// Clockwise rotation in degrees about the layer center
    pub rotation: f64,
    pub mirror_x: bool,
    pub mirror_y: bool,
    pub scale: f64,
    pub opacity: f32,
    pub brightness: f32,
    pub contrast: f32,
    pub blur: f32,
}

impl Default for LayerEffects {
    fn default() -> Self {
        Self {
            rotation: 0.0,
            mirror_x: false,
            mirror_y: false,
            scale: 1.0,
            opacity: 1.0,
            brightness: 0.0,
            contrast: 0.0,
            blur: 0.0,
        }
    }
}

/// Secondary surface whose alpha gates the source's visibility
#[derive(Debug, Clone)]
pub struct LayerMask {
    pub surface: Surface,
    /// Position of the mask relative to the layer's own surface
    pub offset: Vec2,
}

/// Which surface of a layer an edit lands on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceTarget {
    Source,
    Mask,
}

#[derive(Debug, Clone)]
pub struct Layer {
    pub id: LayerId,
    pub x: f64,
    pub y: f64,
    pub width: u32,
    pub height: u32,
    pub source: Surface,
    pub mask: Option<LayerMask>,
    pub effects: LayerEffects,
    pub kind: Option<LayerKind>,
}

impl Layer {
    /// Transparent graphic layer at the document origin
    pub fn new(id: LayerId, width: u32, height: u32) -> Self {
        Self {
            id,
            x: 0.0,
            y: 0.0,
            width,
            height,
            source: Surface::new(width, height),
            mask: None,
            effects: LayerEffects::default(),
            kind: Some(LayerKind::Graphic),
        }
    }

    pub fn from_image(id: LayerId, image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            source: Surface::from_image(image),
            ..Self::new(id, width, height)
        }
    }

    pub fn with_position(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn with_effects(mut self, effects: LayerEffects) -> Self {
        self.effects = effects;
        self
    }

    pub fn with_mask(mut self, mask: RgbaImage, offset: Vec2) -> Self {
        self.mask = Some(LayerMask {
            surface: Surface::from_image(mask),
            offset,
        });
        self
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// A mask exists and the layer kind allows editing it
    pub fn is_maskable(&self) -> bool {
        self.mask.is_some() && self.kind != Some(LayerKind::Text)
    }

    /// Surface an edit should land on, falling back to the source
    pub fn resolve_target(&self, want_mask: bool) -> SurfaceTarget {
        if want_mask && self.is_maskable() {
            SurfaceTarget::Mask
        } else {
            SurfaceTarget::Source
        }
    }

    pub fn surface(&self, target: SurfaceTarget) -> Option<&Surface> {
        match target {
            SurfaceTarget::Source => Some(&self.source),
            SurfaceTarget::Mask => self.mask.as_ref().map(|m| &m.surface),
        }
    }

    pub fn surface_mut(&mut self, target: SurfaceTarget) -> Option<&mut Surface> {
        match target {
            SurfaceTarget::Source => Some(&mut self.source),
            SurfaceTarget::Mask => self.mask.as_mut().map(|m| &mut m.surface),
        }
    }

    /// Origin of `target` in the source surface's pixel space
    pub fn surface_origin(&self, target: SurfaceTarget) -> Vec2 {
        match (target, &self.mask) {
            (SurfaceTarget::Mask, Some(mask)) => mask.offset,
            _ => Vec2::ZERO,
        }
    }

    /// Source pixels with the mask's alpha applied
    pub fn visible_pixels(&self) -> Option<Cow<'_, RgbaImage>> {
        let source = self.source.image()?;
        let Some((mask_image, offset)) = self
            .mask
            .as_ref()
            .and_then(|m| m.surface.image().map(|image| (image, m.offset)))
        else {
            return Some(Cow::Borrowed(source));
        };

        let mut gated = source.clone();
        for (x, y, pixel) in gated.enumerate_pixels_mut() {
            let mx = x as f64 - offset.x;
            let my = y as f64 - offset.y;
            let gate = if mx >= 0.0
                && my >= 0.0
                && mx < mask_image.width() as f64
                && my < mask_image.height() as f64
            {
                mask_image.get_pixel(mx as u32, my as u32).0[3] as u32
            } else {
                0
            };
            pixel.0[3] = ((pixel.0[3] as u32 * gate + 127) / 255) as u8;
        }
        Some(Cow::Owned(gated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_text_layer_is_not_maskable() {
        let mut layer = Layer::new(LayerId(1), 4, 4).with_mask(RgbaImage::new(4, 4), Vec2::ZERO);
        assert!(layer.is_maskable());
        assert_eq!(layer.resolve_target(true), SurfaceTarget::Mask);

        layer.kind = Some(LayerKind::Text);
        assert!(!layer.is_maskable());
        assert_eq!(layer.resolve_target(true), SurfaceTarget::Source);
    }

    #[test]
    fn test_without_mask_targets_source() {
        let layer = Layer::new(LayerId(2), 4, 4);
        assert_eq!(layer.resolve_target(true), SurfaceTarget::Source);
        assert!(layer.surface(SurfaceTarget::Mask).is_none());
    }

    #[test]
    fn test_mask_gates_visibility() -> Result<(), String> {
        let source = RgbaImage::from_pixel(4, 1, Rgba([255, 0, 0, 255]));
        let mut mask = RgbaImage::new(2, 1);
        mask.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        let layer = Layer::from_image(LayerId(3), source).with_mask(mask, Vec2::new(1.0, 0.0));

        let visible = layer.visible_pixels().ok_or("source disposed")?;
        assert_eq!(visible.get_pixel(0, 0).0[3], 0); // outside the mask
        assert_eq!(visible.get_pixel(1, 0).0[3], 255);
        assert_eq!(visible.get_pixel(2, 0).0[3], 0);
        Ok(())
    }

    #[test]
    fn test_layer_id_display() {
        assert_eq!(LayerId(7).to_string(), "layer-7");
    }
}
