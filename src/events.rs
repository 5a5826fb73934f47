//! Viewer events and the queue that carries them back onto the viewer loop
//!
//! Everything that happens outside the loop (ffmpeg reader thread, pointer
//! tracker, stdin, Ctrl+C) is turned into a `ViewerEvent` and posted through
//! an `EventSender`. Only the loop mutates controller state.

use serde::Deserialize;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use crate::media::StreamId;

/// Pointer button, named like the DOM `MouseEvent.button` values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Primary,
    Auxiliary,
    Secondary,
}

/// Keyboard modifiers held during a click
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub shift: bool,
    pub control: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Self = Self {
        shift: false,
        control: false,
        alt: false,
    };

    #[cfg(test)]
    pub fn shift() -> Self {
        Self {
            shift: true,
            ..Self::NONE
        }
    }
}

/// Which modifier turns a primary click into "clear"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ClearModifier {
    #[default]
    Shift,
    Control,
    Alt,
}

impl ClearModifier {
    pub fn is_held(self, modifiers: Modifiers) -> bool {
        match self {
            Self::Shift => modifiers.shift,
            Self::Control => modifiers.control,
            Self::Alt => modifiers.alt,
        }
    }

    /// Modifier state with just this key held
    pub fn held(self) -> Modifiers {
        Modifiers {
            shift: self == Self::Shift,
            control: self == Self::Control,
            alt: self == Self::Alt,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClickEvent {
    pub button: MouseButton,
    pub modifiers: Modifiers,
    pub x: f64,
    pub y: f64,
}

impl ClickEvent {
    pub fn new(button: MouseButton, modifiers: Modifiers) -> Self {
        Self {
            button,
            modifiers,
            x: 0.0,
            y: 0.0,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }
}

/// Screen rectangle clicks are dispatched for, in global pointer coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureArea {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CaptureArea {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoEventKind {
    /// First frame of a newly bound stream
    LoadedMetadata,
    /// Any later frame
    TimeUpdate,
}

/// Intrinsic size reported by the video surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoMetadata {
    pub kind: VideoEventKind,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    StartCapture,
    StopCapture,
    Click(ClickEvent),
    StreamEnded(StreamId),
    Shutdown,
}

/// Cloneable handle for posting events from any thread
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: Sender<ViewerEvent>,
}

impl EventSender {
    /// Returns false once the loop has gone away.
    pub fn post(&self, event: ViewerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

pub struct EventQueue {
    rx: Receiver<ViewerEvent>,
    tx: Sender<ViewerEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { rx, tx }
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    /// Wait up to `timeout` for the next event.
    pub fn next_timeout(&self, timeout: Duration) -> Option<ViewerEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) => None,
            // The queue owns a sender, so this only happens if it is torn down.
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn try_next(&self) -> Option<ViewerEvent> {
        self.rx.try_recv().ok()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn clear_modifier_checks_only_its_key() {
        let ctrl = Modifiers {
            control: true,
            ..Modifiers::NONE
        };
        assert!(ClearModifier::Shift.is_held(Modifiers::shift()));
        assert!(!ClearModifier::Shift.is_held(ctrl));
        assert!(ClearModifier::Control.is_held(ctrl));
        assert!(!ClearModifier::Alt.is_held(ctrl));
    }

    #[test]
    fn capture_area_is_half_open() {
        let area = CaptureArea {
            x: 100.0,
            y: 50.0,
            width: 200.0,
            height: 100.0,
        };
        assert!(area.contains(100.0, 50.0));
        assert!(area.contains(299.5, 149.5));
        assert!(!area.contains(300.0, 60.0));
        assert!(!area.contains(150.0, 49.0));
    }

    #[test]
    fn events_posted_from_other_threads_arrive_in_order() {
        let queue = EventQueue::new();
        let sender = queue.sender();

        let handle = thread::spawn(move || {
            sender.post(ViewerEvent::StartCapture);
            sender.post(ViewerEvent::StreamEnded(7));
        });
        handle.join().unwrap();

        assert_eq!(queue.try_next(), Some(ViewerEvent::StartCapture));
        assert_eq!(queue.try_next(), Some(ViewerEvent::StreamEnded(7)));
        assert_eq!(queue.next_timeout(Duration::from_millis(1)), None);
    }
}
