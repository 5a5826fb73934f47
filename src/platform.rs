//! Per-OS display enumeration and click tracking

#[cfg(target_os = "linux")]
pub use crate::linux::{list_displays, DisplayInfo, PointerTracker};

#[cfg(target_os = "macos")]
pub use crate::macos::{list_displays, DisplayInfo, PointerTracker};

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
compile_error!("diffview supports Linux (X11) and macOS only");
