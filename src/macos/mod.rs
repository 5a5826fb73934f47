pub mod display;
pub mod pointer;

pub use display::{list_displays, DisplayInfo};
pub use pointer::PointerTracker;
