//! macOS display enumeration via Core Graphics, mapped to AVFoundation devices

use anyhow::{Context, Result};
use core_graphics::display::CGDisplay;
use std::process::{Command, Stdio};

use crate::capture::FfmpegInput;
use crate::events::CaptureArea;

// FFI declarations for display mode pixel dimensions
#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGDisplayCopyDisplayMode(display: u32) -> *mut std::ffi::c_void;
    fn CGDisplayModeGetPixelWidth(mode: *mut std::ffi::c_void) -> usize;
    fn CGDisplayModeGetPixelHeight(mode: *mut std::ffi::c_void) -> usize;
    fn CGDisplayModeRelease(mode: *mut std::ffi::c_void);
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayInfo {
    pub index: usize,
    /// AVFoundation device index for ffmpeg
    pub avf_index: usize,
    /// Width in points
    pub width: u32,
    /// Height in points
    pub height: u32,
    pub x: i32,
    pub y: i32,
    pub is_main: bool,
    /// Retina scale factor (2.0 on Retina, 1.0 otherwise)
    pub scale_factor: f64,
}

impl DisplayInfo {
    /// Pointer events arrive in points, same as the display bounds.
    pub fn area(&self) -> CaptureArea {
        CaptureArea {
            x: f64::from(self.x),
            y: f64::from(self.y),
            width: f64::from(self.width),
            height: f64::from(self.height),
        }
    }

    pub fn pixel_size(&self) -> (u32, u32) {
        (
            (f64::from(self.width) * self.scale_factor).round() as u32,
            (f64::from(self.height) * self.scale_factor).round() as u32,
        )
    }

    /// avfoundation input for this screen, video only
    pub fn ffmpeg_input(&self, framerate: u32, show_cursor: bool) -> FfmpegInput {
        let (width, height) = self.pixel_size();
        let args = vec![
            "-f".to_string(),
            "avfoundation".to_string(),
            "-framerate".to_string(),
            framerate.to_string(),
            "-capture_cursor".to_string(),
            if show_cursor { "1" } else { "0" }.to_string(),
            "-i".to_string(),
            format!("{}:none", self.avf_index),
            // Pin the output size so stdout frames have a known length.
            "-vf".to_string(),
            format!("scale={width}:{height}"),
        ];
        FfmpegInput {
            args,
            width,
            height,
        }
    }
}

/// Native pixel dimensions of a display (accounts for Retina scaling)
fn native_pixel_dimensions(display_id: u32) -> Option<(usize, usize)> {
    unsafe {
        let mode = CGDisplayCopyDisplayMode(display_id);
        if mode.is_null() {
            return None;
        }
        let width = CGDisplayModeGetPixelWidth(mode);
        let height = CGDisplayModeGetPixelHeight(mode);
        CGDisplayModeRelease(mode);
        Some((width, height))
    }
}

pub fn list_displays() -> Result<Vec<DisplayInfo>> {
    let cg_displays = CGDisplay::active_displays()
        .map_err(|e| anyhow::anyhow!("Failed to get displays: {:?}", e))?;
    let avf_screen_indices = avfoundation_screen_indices()?;

    let displays = cg_displays
        .iter()
        .enumerate()
        .map(|(index, cg_id)| {
            let display = CGDisplay::new(*cg_id);
            let bounds = display.bounds();
            let scale_factor = native_pixel_dimensions(*cg_id)
                .filter(|_| bounds.size.width > 0.0)
                .map_or(1.0, |(native_width, _)| native_width as f64 / bounds.size.width);

            DisplayInfo {
                index,
                avf_index: avf_screen_indices.get(index).copied().unwrap_or(index),
                width: bounds.size.width as u32,
                height: bounds.size.height as u32,
                x: bounds.origin.x as i32,
                y: bounds.origin.y as i32,
                is_main: display.is_main(),
                scale_factor,
            }
        })
        .collect();

    Ok(displays)
}

/// ffmpeg's AVFoundation device indices for "Capture screen N" entries
fn avfoundation_screen_indices() -> Result<Vec<usize>> {
    let output = Command::new("ffmpeg")
        .args(["-f", "avfoundation", "-list_devices", "true", "-i", ""])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .context("Failed to run ffmpeg")?;

    // The device list goes to stderr
    let stderr = String::from_utf8_lossy(&output.stderr);
    Ok(parse_screen_indices(&stderr))
}

fn parse_screen_indices(listing: &str) -> Vec<usize> {
    listing
        .lines()
        .filter(|line| line.contains("Capture screen"))
        .filter_map(device_index)
        .collect()
}

/// Index from a line like "[AVFoundation indev @ 0x...] [3] Capture screen 0"
fn device_index(line: &str) -> Option<usize> {
    line.split('[')
        .filter_map(|part| part.split_once(']').map(|(inside, _)| inside))
        .find_map(|inside| inside.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_screen_device_indices() {
        let listing = "\
[AVFoundation indev @ 0x7f] AVFoundation video devices:
[AVFoundation indev @ 0x7f] [0] FaceTime HD Camera
[AVFoundation indev @ 0x7f] [1] Capture screen 0
[AVFoundation indev @ 0x7f] [2] Capture screen 1
[AVFoundation indev @ 0x7f] AVFoundation audio devices:
[AVFoundation indev @ 0x7f] [0] MacBook Pro Microphone";
        assert_eq!(parse_screen_indices(listing), vec![1, 2]);
    }

    #[test]
    fn retina_input_is_sized_in_pixels() {
        let display = DisplayInfo {
            index: 0,
            avf_index: 3,
            width: 1440,
            height: 900,
            x: 0,
            y: 0,
            is_main: true,
            scale_factor: 2.0,
        };
        let input = display.ffmpeg_input(30, false);
        assert_eq!((input.width, input.height), (2880, 1800));
        assert!(input.args.contains(&"3:none".to_string()));
        assert!(input.args.contains(&"scale=2880:1800".to_string()));
    }
}
