//! Brush state and stamp synthesis

pub mod blend;
pub mod stamper;
pub mod stroke_buffer;

pub use blend::{CompositeOp, Pixel};
pub use stamper::{BrushStamper, Dab, StamperConfig};
pub use stroke_buffer::StrokeBuffer;

use crate::tool::ToolOptions;
use image::{Rgba, RgbaImage};

/// Brush parameters for the active tool plus the sample buffer of its stroke
///
/// Rebuilt whenever tool options change; the color is refreshed from the
/// host on every press since the active color can change between strokes.
#[derive(Debug, Clone)]
pub struct Brush {
    pub color: Rgba<u8>,
    pub radius: f64,
    pub hardness: f32,
    pub spacing: f64,
    pub stroke: StrokeBuffer,
}

impl Brush {
    pub fn from_options(options: &ToolOptions, color: Rgba<u8>) -> Self {
        Self {
            color,
            radius: options.radius.max(0.5),
            hardness: options.hardness.clamp(0.0, 1.0),
            spacing: options.spacing.max(0.01),
            stroke: StrokeBuffer::new(),
        }
    }

    pub fn stamper(&self) -> BrushStamper {
        BrushStamper::new(StamperConfig {
            size: self.radius * 2.0,
            spacing: self.spacing,
        })
    }
}

/// A synthesized brush bitmap, centered on its middle pixel
#[derive(Debug, Clone)]
pub struct Stamp {
    pub image: RgbaImage,
    pub radius: f64,
}

/// Turns a color and radius into a stamp image
pub trait BrushSynth: Send + Sync {
    fn synthesize(&self, color: Rgba<u8>, radius: f64, hardness: f32) -> Stamp;
}

/// Circular brush with a linear falloff controlled by hardness
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundBrush;

impl BrushSynth for RoundBrush {
    fn synthesize(&self, color: Rgba<u8>, radius: f64, hardness: f32) -> Stamp {
        let r = radius.max(0.5);
        let size = (r * 2.0).ceil().max(1.0) as u32;
        let center = size as f64 / 2.0;

        // Calculate inner radius for hardness falloff
        let inner_radius = r * hardness as f64;
        let fade_width = r - inner_radius;

        let image = RgbaImage::from_fn(size, size, |px, py| {
            let dx = px as f64 + 0.5 - center;
            let dy = py as f64 + 0.5 - center;
            let dist = (dx * dx + dy * dy).sqrt();

            let coverage = if dist > r {
                0.0
            } else if dist <= inner_radius || fade_width <= 0.001 {
                1.0
            } else {
                1.0 - (dist - inner_radius) / fade_width
            };

            let alpha = (color.0[3] as f64 * coverage).round() as u8;
            Rgba([color.0[0], color.0[1], color.0[2], alpha])
        });

        Stamp { image, radius: r }
    }
}
