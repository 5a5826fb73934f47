//! Linux X11 support module
//!
//! Display enumeration and click tracking for X11; frames come from ffmpeg's
//! x11grab device.

pub mod display;
pub mod pointer;

pub use display::{list_displays, DisplayInfo};
pub use pointer::PointerTracker;
