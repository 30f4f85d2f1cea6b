//! Surface-to-resource encoders used for history snapshots
//!
//! Codecs are synchronous and `Send + Sync`; the history manager moves
//! them onto tokio's blocking pool so encoding never stalls a frame.

use crate::error::SnapshotError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use image::{ImageFormat, RgbaImage};
use std::io::Cursor;

/// Encoded pixel contents of one surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBitmap {
    pub width: u32,
    pub height: u32,
    pub mime: &'static str,
    pub data: Vec<u8>,
}

impl EncodedBitmap {
    /// `data:` URL form for hosts that hand resources to a web view
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.data))
    }

    /// Parse a `data:<mime>;base64,<payload>` URL produced by [`Self::data_url`]
    pub fn from_data_url(url: &str, width: u32, height: u32) -> Result<Self, SnapshotError> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| SnapshotError::Decode("not a data url".to_string()))?;
        let (mime, payload) = rest
            .split_once(";base64,")
            .ok_or_else(|| SnapshotError::Decode("data url is not base64".to_string()))?;
        let mime = match mime {
            PngCodec::MIME => PngCodec::MIME,
            RawCodec::MIME => RawCodec::MIME,
            other => return Err(SnapshotError::Decode(format!("unsupported mime {other}"))),
        };
        Ok(Self {
            width,
            height,
            mime,
            data: STANDARD.decode(payload)?,
        })
    }
}

pub trait SnapshotCodec: Send + Sync {
    fn encode(&self, image: &RgbaImage) -> Result<EncodedBitmap, SnapshotError>;
    fn decode(&self, bitmap: &EncodedBitmap) -> Result<RgbaImage, SnapshotError>;
}

/// Lossless PNG; compact, slower
#[derive(Debug, Clone, Copy, Default)]
pub struct PngCodec;

impl PngCodec {
    pub const MIME: &'static str = "image/png";
}

impl SnapshotCodec for PngCodec {
    fn encode(&self, image: &RgbaImage) -> Result<EncodedBitmap, SnapshotError> {
        let mut data = Vec::new();
        image.write_to(&mut Cursor::new(&mut data), ImageFormat::Png)?;
        Ok(EncodedBitmap {
            width: image.width(),
            height: image.height(),
            mime: Self::MIME,
            data,
        })
    }

    fn decode(&self, bitmap: &EncodedBitmap) -> Result<RgbaImage, SnapshotError> {
        let image = image::load_from_memory_with_format(&bitmap.data, ImageFormat::Png)?;
        Ok(image.to_rgba8())
    }
}

/// Raw RGBA behind a little-endian width/height header; fast, large
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl RawCodec {
    pub const MIME: &'static str = "application/x-rgba";
}

impl SnapshotCodec for RawCodec {
    fn encode(&self, image: &RgbaImage) -> Result<EncodedBitmap, SnapshotError> {
        let mut data = Vec::with_capacity(8 + image.as_raw().len());
        data.write_u32::<LittleEndian>(image.width())?;
        data.write_u32::<LittleEndian>(image.height())?;
        data.extend_from_slice(image.as_raw());
        Ok(EncodedBitmap {
            width: image.width(),
            height: image.height(),
            mime: Self::MIME,
            data,
        })
    }

    fn decode(&self, bitmap: &EncodedBitmap) -> Result<RgbaImage, SnapshotError> {
        let mut cursor = Cursor::new(&bitmap.data);
        let width = cursor.read_u32::<LittleEndian>()?;
        let height = cursor.read_u32::<LittleEndian>()?;
        let pixels = bitmap.data.get(8..).unwrap_or_default().to_vec();
        RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
            SnapshotError::Decode(format!("raw payload too short for {width}x{height}"))
        })
    }
}
