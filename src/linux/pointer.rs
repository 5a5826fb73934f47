//! Linux X11 click tracking by polling XQueryPointer

use anyhow::{Context, Result};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::ConnectionExt;
use x11rb::rust_connection::RustConnection;

use crate::events::{CaptureArea, ClickEvent, EventSender, Modifiers, MouseButton, ViewerEvent};

// KeyButMask bits
const SHIFT_MASK: u16 = 0x0001;
const CONTROL_MASK: u16 = 0x0004;
const MOD1_MASK: u16 = 0x0008;
const BUTTON_MASKS: [(u16, MouseButton); 3] = [
    (0x0100, MouseButton::Primary),
    (0x0200, MouseButton::Auxiliary),
    (0x0400, MouseButton::Secondary),
];

// ~120Hz
const POLL_INTERVAL: Duration = Duration::from_micros(8333);

pub fn modifiers_from_mask(mask: u16) -> Modifiers {
    Modifiers {
        shift: mask & SHIFT_MASK != 0,
        control: mask & CONTROL_MASK != 0,
        alt: mask & MOD1_MASK != 0,
    }
}

/// Buttons that went down between two mask samples
pub fn pressed_buttons(previous: u16, current: u16) -> impl Iterator<Item = MouseButton> {
    BUTTON_MASKS
        .into_iter()
        .filter(move |(bit, _)| current & bit != 0 && previous & bit == 0)
        .map(|(_, button)| button)
}

/// Posts clicks inside the capture area to the viewer loop
pub struct PointerTracker {
    stop_tx: Option<Sender<()>>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl PointerTracker {
    pub fn start(area: CaptureArea, events: EventSender) -> Result<Self> {
        let (conn, screen_num) = RustConnection::connect(None)
            .context("Failed to connect to X11 display for pointer tracking")?;
        let root = conn.setup().roots[screen_num].root;
        let (stop_tx, stop_rx) = mpsc::channel();

        let handle = thread::spawn(move || {
            run_polling(&conn, root, area, &events, &stop_rx);
        });

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

fn run_polling(
    conn: &RustConnection,
    root: u32,
    area: CaptureArea,
    events: &EventSender,
    stop_rx: &Receiver<()>,
) {
    let mut last_mask: u16 = 0;

    while stop_rx.try_recv().is_err() {
        let reply = match conn.query_pointer(root) {
            Ok(cookie) => cookie.reply(),
            Err(err) => {
                tracing::warn!(?err, "lost X11 connection; pointer tracking stopped");
                return;
            }
        };
        let Ok(reply) = reply else {
            thread::sleep(POLL_INTERVAL);
            continue;
        };

        let mask = u16::from(reply.mask);
        let (x, y) = (f64::from(reply.root_x), f64::from(reply.root_y));

        if area.contains(x, y) {
            let modifiers = modifiers_from_mask(mask);
            for button in pressed_buttons(last_mask, mask) {
                let click = ClickEvent::new(button, modifiers).at(x, y);
                if !events.post(ViewerEvent::Click(click)) {
                    return;
                }
            }
        }

        last_mask = mask;
        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_modifier_bits() {
        assert_eq!(modifiers_from_mask(0), Modifiers::NONE);
        assert_eq!(modifiers_from_mask(SHIFT_MASK | 0x0100), Modifiers::shift());
        let all = modifiers_from_mask(SHIFT_MASK | CONTROL_MASK | MOD1_MASK);
        assert!(all.shift && all.control && all.alt);
    }

    #[test]
    fn only_new_presses_count() {
        let pressed: Vec<_> = pressed_buttons(0, 0x0100).collect();
        assert_eq!(pressed, [MouseButton::Primary]);

        // Held button is not a new click.
        assert_eq!(pressed_buttons(0x0100, 0x0100).count(), 0);
        // Release is not a click either.
        assert_eq!(pressed_buttons(0x0400, 0).count(), 0);

        let pressed: Vec<_> = pressed_buttons(0x0100, 0x0100 | 0x0400).collect();
        assert_eq!(pressed, [MouseButton::Secondary]);
    }
}
