//! Linux X11 display enumeration using RandR

use anyhow::{Context, Result};
use x11rb::connection::Connection;
use x11rb::protocol::randr::{self, ConnectionExt as RandrExt};
use x11rb::rust_connection::RustConnection;

use crate::capture::FfmpegInput;
use crate::events::CaptureArea;

#[derive(Debug, Clone, PartialEq)]
pub struct DisplayInfo {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub x: i32,
    pub y: i32,
    pub is_main: bool,
    /// X11 display string (e.g., ":0")
    pub display_string: String,
}

impl DisplayInfo {
    pub fn area(&self) -> CaptureArea {
        CaptureArea {
            x: f64::from(self.x),
            y: f64::from(self.y),
            width: f64::from(self.width),
            height: f64::from(self.height),
        }
    }

    /// x11grab input for this monitor's region of the X screen
    pub fn ffmpeg_input(&self, framerate: u32, show_cursor: bool) -> FfmpegInput {
        let args = [
            "-f".to_string(),
            "x11grab".to_string(),
            "-framerate".to_string(),
            framerate.to_string(),
            "-video_size".to_string(),
            format!("{}x{}", self.width, self.height),
            "-draw_mouse".to_string(),
            if show_cursor { "1" } else { "0" }.to_string(),
            "-i".to_string(),
            format!("{}+{},{}", self.display_string, self.x, self.y),
        ];
        FfmpegInput {
            args: args.to_vec(),
            width: self.width,
            height: self.height,
        }
    }
}

fn display_string() -> String {
    std::env::var("DISPLAY").unwrap_or_else(|_| ":0".to_string())
}

pub fn list_displays() -> Result<Vec<DisplayInfo>> {
    let (conn, screen_num) =
        RustConnection::connect(None).context("Failed to connect to X11 display")?;

    let screen = &conn.setup().roots[screen_num];
    let root = screen.root;
    let display_string = display_string();

    let resources = conn
        .randr_get_screen_resources(root)
        .context("Failed to query RandR screen resources")?
        .reply()
        .context("Failed to get RandR screen resources reply")?;

    let primary_output = conn
        .randr_get_output_primary(root)
        .ok()
        .and_then(|cookie| cookie.reply().ok())
        .map(|reply| reply.output);

    let mut displays = Vec::new();

    for crtc in &resources.crtcs {
        let crtc_info = conn
            .randr_get_crtc_info(*crtc, resources.config_timestamp)
            .context("Failed to query CRTC info")?
            .reply()
            .context("Failed to get CRTC info reply")?;

        if crtc_info.outputs.is_empty() || crtc_info.width == 0 || crtc_info.height == 0 {
            continue;
        }

        let connected = crtc_info.outputs.iter().any(|output| {
            conn.randr_get_output_info(*output, resources.config_timestamp)
                .ok()
                .and_then(|cookie| cookie.reply().ok())
                .is_some_and(|info| info.connection == randr::Connection::CONNECTED)
        });
        if !connected {
            continue;
        }

        displays.push(DisplayInfo {
            index: displays.len(),
            width: u32::from(crtc_info.width),
            height: u32::from(crtc_info.height),
            x: i32::from(crtc_info.x),
            y: i32::from(crtc_info.y),
            is_main: primary_output.is_some_and(|primary| crtc_info.outputs.contains(&primary)),
            display_string: display_string.clone(),
        });
    }

    if displays.is_empty() {
        tracing::debug!("no active RandR outputs; using the whole X screen");
        displays.push(DisplayInfo {
            index: 0,
            width: u32::from(screen.width_in_pixels),
            height: u32::from(screen.height_in_pixels),
            x: 0,
            y: 0,
            is_main: true,
            display_string,
        });
    } else if !displays.iter().any(|d| d.is_main) {
        displays[0].is_main = true;
    }

    Ok(displays)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display() -> DisplayInfo {
        DisplayInfo {
            index: 1,
            width: 1280,
            height: 720,
            x: 1920,
            y: 0,
            is_main: false,
            display_string: ":1".to_string(),
        }
    }

    #[test]
    fn x11grab_input_targets_monitor_region() {
        let input = display().ffmpeg_input(24, true);
        assert_eq!(
            input.args,
            [
                "-f", "x11grab", "-framerate", "24", "-video_size", "1280x720",
                "-draw_mouse", "1", "-i", ":1+1920,0",
            ]
        );
        assert_eq!((input.width, input.height), (1280, 720));
    }

    #[test]
    fn area_covers_monitor_in_root_coordinates() {
        let area = display().area();
        assert!(area.contains(1920.0, 0.0));
        assert!(!area.contains(1919.0, 10.0));
        assert!(!area.contains(3200.0, 10.0));
    }
}
