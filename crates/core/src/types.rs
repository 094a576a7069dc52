use anyhow::{bail, Result};

/// Interleaved channel count. The whole pipeline operates on 8-bit RGB.
pub const CHANNELS: usize = 3;

/// Axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// The rectangle with every component multiplied by `scale`.
    pub fn scaled(&self, scale: u32) -> Rect {
        Rect::new(
            self.x * scale,
            self.y * scale,
            self.width * scale,
            self.height * scale,
        )
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// Decoded raster image: interleaved 8-bit RGB, row-major, contiguous.
///
/// The buffer length always equals `width * height * 3`; constructors enforce
/// it and the image is not mutable through the public API afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RgbImage {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            bail!(
                "image data length mismatch: expected {} ({}x{}x{}), got {}",
                expected,
                width,
                height,
                CHANNELS,
                data.len()
            );
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// An all-black image of the given dimensions.
    pub fn zeroed(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0u8; width as usize * height as usize * CHANNELS],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Copy of the sub-region `rect`, which must lie within the image bounds.
    pub fn crop(&self, rect: Rect) -> RgbImage {
        assert!(
            rect.right() <= self.width && rect.bottom() <= self.height,
            "crop rect {}x{}+{}+{} exceeds image bounds {}x{}",
            rect.width,
            rect.height,
            rect.x,
            rect.y,
            self.width,
            self.height
        );

        let src_w = self.width as usize;
        let row_bytes = rect.width as usize * CHANNELS;
        let mut data = Vec::with_capacity(rect.height as usize * row_bytes);
        for row in 0..rect.height as usize {
            let src_y = rect.y as usize + row;
            let offset = (src_y * src_w + rect.x as usize) * CHANNELS;
            data.extend_from_slice(&self.data[offset..offset + row_bytes]);
        }

        RgbImage {
            width: rect.width,
            height: rect.height,
            data,
        }
    }
}
