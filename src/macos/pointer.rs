//! macOS click tracking with a listen-only CGEventTap

use anyhow::Result;
use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
    CGEventType,
};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;

use crate::events::{CaptureArea, ClickEvent, EventSender, Modifiers, MouseButton, ViewerEvent};

pub fn modifiers_from_flags(flags: CGEventFlags) -> Modifiers {
    Modifiers {
        shift: flags.contains(CGEventFlags::CGEventFlagShift),
        control: flags.contains(CGEventFlags::CGEventFlagControl),
        alt: flags.contains(CGEventFlags::CGEventFlagAlternate),
    }
}

fn button_for(event_type: CGEventType) -> Option<MouseButton> {
    match event_type {
        CGEventType::LeftMouseDown => Some(MouseButton::Primary),
        CGEventType::OtherMouseDown => Some(MouseButton::Auxiliary),
        CGEventType::RightMouseDown => Some(MouseButton::Secondary),
        _ => None,
    }
}

/// Posts clicks inside the capture area to the viewer loop
pub struct PointerTracker {
    stop_tx: Option<Sender<()>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl PointerTracker {
    pub fn start(area: CaptureArea, events: EventSender) -> Result<Self> {
        let (stop_tx, stop_rx) = mpsc::channel();
        let handle = thread::spawn(move || run_event_tap(area, events, stop_rx));

        Ok(Self {
            stop_tx: Some(stop_tx),
            thread_handle: Some(handle),
        })
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PointerTracker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_event_tap(area: CaptureArea, events: EventSender, stop_rx: Receiver<()>) {
    let event_types = vec![
        CGEventType::LeftMouseDown,
        CGEventType::RightMouseDown,
        CGEventType::OtherMouseDown,
    ];

    let tap = CGEventTap::new(
        CGEventTapLocation::HID,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        event_types,
        move |_proxy, event_type, event: &CGEvent| {
            let button = button_for(event_type)?;
            let location = event.location();
            if area.contains(location.x, location.y) {
                let click = ClickEvent::new(button, modifiers_from_flags(event.get_flags()))
                    .at(location.x, location.y);
                events.post(ViewerEvent::Click(click));
            }
            None
        },
    );

    let tap = match tap {
        Ok(t) => t,
        Err(()) => {
            tracing::error!(
                "failed to create event tap; grant Accessibility permission to track clicks"
            );
            return;
        }
    };

    let source = match tap.mach_port.create_runloop_source(0) {
        Ok(source) => source,
        Err(()) => {
            tracing::error!("failed to create run loop source for event tap");
            return;
        }
    };

    let run_loop = CFRunLoop::get_current();
    run_loop.add_source(&source, unsafe { kCFRunLoopCommonModes });
    tap.enable();

    while stop_rx.try_recv().is_err() {
        CFRunLoop::run_in_mode(
            unsafe { kCFRunLoopDefaultMode },
            Duration::from_millis(100),
            false,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_mouse_down_events_to_buttons() {
        assert_eq!(button_for(CGEventType::LeftMouseDown), Some(MouseButton::Primary));
        assert_eq!(button_for(CGEventType::RightMouseDown), Some(MouseButton::Secondary));
        assert_eq!(button_for(CGEventType::LeftMouseUp), None);
    }

    #[test]
    fn reads_modifier_flags() {
        let flags = CGEventFlags::CGEventFlagShift | CGEventFlags::CGEventFlagAlternate;
        let modifiers = modifiers_from_flags(flags);
        assert!(modifiers.shift && modifiers.alt && !modifiers.control);
    }
}
