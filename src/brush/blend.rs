//! Compositing operators used when paint lands on a surface
//!
//! All functions work with premultiplied alpha format for correct compositing.
//! Surfaces store straight-alpha RGBA8; conversion happens per pixel.

use image::Rgba;
use serde::{Deserialize, Serialize};

/// RGBA pixel in premultiplied alpha format
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pixel {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Pixel {
    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_rgba(color: Rgba<u8>) -> Self {
        let [r, g, b, a] = color.0;
        let a_f = a as f32 / 255.0;
        // Convert to premultiplied alpha
        Self {
            r: (r as f32 / 255.0) * a_f,
            g: (g as f32 / 255.0) * a_f,
            b: (b as f32 / 255.0) * a_f,
            a: a_f,
        }
    }

    pub fn to_rgba(&self) -> Rgba<u8> {
        if self.a < 0.001 {
            return Rgba([0, 0, 0, 0]);
        }
        // Convert from premultiplied to straight alpha
        let inv_a = 1.0 / self.a;
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgba([
            channel(self.r * inv_a),
            channel(self.g * inv_a),
            channel(self.b * inv_a),
            channel(self.a),
        ])
    }

    /// Scale all premultiplied components by `coverage` (0-1)
    pub fn scaled(&self, coverage: f32) -> Self {
        Self {
            r: self.r * coverage,
            g: self.g * coverage,
            b: self.b * coverage,
            a: self.a * coverage,
        }
    }
}

/// Standard alpha blending (Porter-Duff "over" operator) for premultiplied alpha
///
/// Formula: result = src + dst * (1 - src.a)
#[inline]
pub fn blend_source_over_premul(src: Pixel, dst: Pixel) -> Pixel {
    let inv_src_a = 1.0 - src.a;
    Pixel {
        r: src.r + dst.r * inv_src_a,
        g: src.g + dst.g * inv_src_a,
        b: src.b + dst.b * inv_src_a,
        a: src.a + dst.a * inv_src_a,
    }
}

/// Subtractive blending (Porter-Duff "destination-out") used by the eraser
///
/// Formula: result = dst * (1 - src.a); source color is ignored
#[inline]
pub fn blend_destination_out_premul(src: Pixel, dst: Pixel) -> Pixel {
    dst.scaled(1.0 - src.a.clamp(0.0, 1.0))
}

/// How paint combines with what is already on the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeOp {
    #[default]
    SourceOver,
    DestinationOut,
}

impl CompositeOp {
    /// Apply the operator to source and destination pixels
    pub fn apply(&self, src: Pixel, dst: Pixel) -> Pixel {
        match self {
            CompositeOp::SourceOver => blend_source_over_premul(src, dst),
            CompositeOp::DestinationOut => blend_destination_out_premul(src, dst),
        }
    }
}
