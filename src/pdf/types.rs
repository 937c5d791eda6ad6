//! Core types shared by the renderer, the compositor and the tools

use serde::{Deserialize, Serialize};

/// Surface-relative point in pixels (origin top-left)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Clamp the point into `[0, width] x [0, height]`
    #[must_use]
    pub fn clamped_to(self, size: SurfaceSize) -> Self {
        Self {
            x: self.x.clamp(0.0, size.width as f32),
            y: self.y.clamp(0.0, size.height as f32),
        }
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self::new(x, y)
    }
}

/// Pixel dimensions of the drawing surface
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
}

impl SurfaceSize {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Page dimensions in document units (points) before scaling
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
}

impl PageGeometry {
    /// Pixel size of the page rasterized at `scale`
    #[must_use]
    pub fn viewport(self, scale: f32) -> SurfaceSize {
        SurfaceSize::new(
            (self.width * scale).ceil().max(0.0) as u32,
            (self.height * scale).ceil().max(0.0) as u32,
        )
    }
}

/// Rasterized page, RGBA8 with opaque alpha.
///
/// The same buffer layout is used by the compositor, so a page image can be
/// handed to tiny-skia without conversion.
#[derive(Clone, PartialEq, Eq)]
pub struct PageImage {
    /// Page number (1-based)
    pub page: usize,
    /// RGBA pixel data, `width * height * 4` bytes
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl PageImage {
    #[must_use]
    pub fn size(&self) -> SurfaceSize {
        SurfaceSize::new(self.width, self.height)
    }
}

impl std::fmt::Debug for PageImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageImage")
            .field("page", &self.page)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}
