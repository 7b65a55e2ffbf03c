//! Placed image records.

use crate::error::{EngineError, EngineResult};
use crate::geometry::rotated_local_offset;
use kurbo::{Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned image identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(pub u64);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "image#{}", self.0)
    }
}

/// Image format for inserted image data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    WebP,
}

impl ImageFormat {
    /// Detect format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 4 {
            return None;
        }

        // PNG: 89 50 4E 47
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
            return Some(ImageFormat::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(ImageFormat::Jpeg);
        }

        if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            return Some(ImageFormat::Gif);
        }

        // WebP: RIFF....WEBP
        if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            return Some(ImageFormat::WebP);
        }

        None
    }
}

/// Position, size and rotation of a placed image in canonical space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageTransform {
    /// Top-left corner of the unrotated box.
    pub position: Point,
    pub size: Size,
    /// Clockwise rotation about the center, in `[0, 360)`.
    pub rotation: f64,
}

impl ImageTransform {
    pub fn new(position: Point, size: Size, rotation: f64) -> Self {
        Self {
            position,
            size,
            rotation,
        }
    }

    /// Unrotated bounding box.
    pub fn rect(&self) -> Rect {
        Rect::from_origin_size(self.position, self.size)
    }

    pub fn center(&self) -> Point {
        self.rect().center()
    }

    /// Whether a canonical point lies inside the rotated box.
    pub fn contains(&self, point: Point) -> bool {
        let local = rotated_local_offset(point - self.center(), self.rotation);
        local.x.abs() <= self.size.width / 2.0 && local.y.abs() <= self.size.height / 2.0
    }
}

/// An image placed on a page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedImage {
    pub id: ImageId,
    /// 1-based page number.
    pub page: u32,
    #[serde(flatten)]
    pub transform: ImageTransform,
}

impl PlacedImage {
    pub fn new(id: ImageId, page: u32, transform: ImageTransform) -> Self {
        Self {
            id,
            page,
            transform,
        }
    }
}

/// Image to be created on the remote store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewImage {
    pub page: u32,
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
    pub transform: ImageTransform,
}

/// Default placement for an image of `natural` size on a page of `page` size.
///
/// The image is centered and scaled down, aspect preserved, so that it covers
/// at most `fraction` of the page on each axis. Images that already fit keep
/// their natural size.
pub fn default_placement(natural: Size, page: Size, fraction: f64) -> EngineResult<ImageTransform> {
    if !(natural.width.is_finite() && natural.height.is_finite())
        || natural.width <= 0.0
        || natural.height <= 0.0
    {
        return Err(EngineError::InvalidImageSize);
    }
    if page.width <= 0.0 || page.height <= 0.0 {
        return Ok(ImageTransform::new(Point::ZERO, natural, 0.0));
    }

    let max_width = page.width * fraction;
    let max_height = page.height * fraction;
    let scale = (max_width / natural.width)
        .min(max_height / natural.height)
        .min(1.0);
    let size = Size::new(natural.width * scale, natural.height * scale);
    let offset = Vec2::new((page.width - size.width) / 2.0, (page.height - size.height) / 2.0);
    Ok(ImageTransform::new(offset.to_point(), size, 0.0))
}
