//! Still image extraction from the video surface
//!
//! A snapshot draws the current frame into an off-screen canvas the size of
//! the surface's client area and exports it as a PNG `data:` URI.

use base64::{engine::general_purpose::STANDARD, Engine};
use image::{imageops, ImageFormat, RgbaImage};
use rayon::prelude::*;
use std::io::Cursor;

use crate::error::SnapshotError;
use crate::media::CapturedFrame;
use crate::video::VideoSurface;

pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// What a zero-area canvas exports as.
pub const EMPTY_DATA_URI: &str = "data:,";

/// Largest canvas area a 2D context is handed out for (16384 x 16384).
pub const MAX_CANVAS_AREA: u64 = 16_384 * 16_384;

pub struct OffscreenCanvas {
    width: u32,
    height: u32,
}

impl OffscreenCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `None` when the canvas is too large to back with a pixel buffer.
    pub fn context_2d(&self) -> Option<Context2d> {
        let area = u64::from(self.width) * u64::from(self.height);
        if area > MAX_CANVAS_AREA {
            return None;
        }
        Some(Context2d {
            pixels: RgbaImage::new(self.width, self.height),
        })
    }
}

pub struct Context2d {
    pixels: RgbaImage,
}

impl Context2d {
    /// Draw `frame` at (dx, dy), scaled to `dw` x `dh`, clipped to the canvas.
    pub fn draw_frame(&mut self, frame: &CapturedFrame, dx: i64, dy: i64, dw: u32, dh: u32) {
        if dw == 0 || dh == 0 {
            return;
        }
        let Some(source) = frame_to_rgba(frame) else {
            return;
        };
        let scaled = if (source.width(), source.height()) == (dw, dh) {
            source
        } else {
            imageops::resize(&source, dw, dh, imageops::FilterType::Triangle)
        };
        imageops::replace(&mut self.pixels, &scaled, dx, dy);
    }

    /// Export the canvas as a PNG data URI.
    pub fn to_data_url(&self) -> Result<String, SnapshotError> {
        if self.pixels.width() == 0 || self.pixels.height() == 0 {
            return Ok(EMPTY_DATA_URI.to_string());
        }
        let mut png_bytes: Vec<u8> = Vec::new();
        self.pixels
            .write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)?;
        Ok(format!("{PNG_DATA_URI_PREFIX}{}", STANDARD.encode(&png_bytes)))
    }
}

/// Convert a BGRA frame into an RGBA image. `None` if the buffer is short.
pub fn frame_to_rgba(frame: &CapturedFrame) -> Option<RgbaImage> {
    let expected = frame.width as usize * frame.height as usize * 4;
    if frame.width == 0 || frame.height == 0 || frame.data.len() < expected {
        return None;
    }
    let mut rgba = frame.data[..expected].to_vec();
    rgba.par_chunks_exact_mut(4).for_each(|px| px.swap(0, 2));
    RgbaImage::from_raw(frame.width, frame.height, rgba)
}

/// Snapshot the surface's current frame as a PNG data URI.
pub fn frame_to_data_uri(video: &VideoSurface) -> Result<String, SnapshotError> {
    let canvas = OffscreenCanvas::new(video.client_width(), video.client_height());
    let mut context = canvas
        .context_2d()
        .ok_or(SnapshotError::UnsupportedContext {
            width: canvas.width(),
            height: canvas.height(),
        })?;

    if let Some(frame) = video.current_frame() {
        context.draw_frame(frame, 0, 0, canvas.width(), canvas.height());
    }

    context.to_data_url()
}

/// Decode a PNG data URI produced by `frame_to_data_uri` back into bytes.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, SnapshotError> {
    let payload = uri
        .strip_prefix(PNG_DATA_URI_PREFIX)
        .ok_or_else(|| SnapshotError::InvalidDataUri {
            message: "expected a base64 PNG data uri".to_string(),
        })?;
    STANDARD
        .decode(payload)
        .map_err(|err| SnapshotError::InvalidDataUri {
            message: err.to_string(),
        })
}
