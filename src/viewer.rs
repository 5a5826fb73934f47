//! Interactive viewer loop and one-shot snapshots
//!
//! The loop owns the controller. Clicks, terminal commands, Ctrl+C and stream
//! end notifications all arrive through the event queue.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::capture::FfmpegDisplayMedia;
use crate::config::ViewerConfig;
use crate::controller::{CaptureController, ClickOutcome};
use crate::events::{ClearModifier, ClickEvent, EventQueue, EventSender, Modifiers, MouseButton, ViewerEvent};
use crate::media::DisplayMedia;
use crate::platform::{DisplayInfo, PointerTracker};
use crate::snapshot;

/// Writes snapshot PNGs into a directory, if one is configured
pub struct SnapshotSink {
    dir: Option<PathBuf>,
}

impl SnapshotSink {
    pub fn new(dir: Option<PathBuf>) -> Result<Self> {
        if let Some(dir) = &dir {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create output directory {:?}", dir))?;
        }
        Ok(Self { dir })
    }

    pub fn save(&self, data_uri: &str) -> Result<Option<PathBuf>> {
        let Some(dir) = &self.dir else {
            return Ok(None);
        };
        let png = snapshot::decode_data_uri(data_uri)?;
        let path = unique_snapshot_path(dir);
        fs::write(&path, png).with_context(|| format!("Failed to write snapshot to {:?}", path))?;
        Ok(Some(path))
    }
}

fn unique_snapshot_path(dir: &Path) -> PathBuf {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let mut path = dir.join(format!("snapshot-{millis}.png"));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("snapshot-{millis}-{n}.png"));
        n += 1;
    }
    path
}

/// Map a terminal command to the event it stands for.
pub fn parse_command(line: &str, clear_modifier: ClearModifier) -> Option<ViewerEvent> {
    let event = match line.trim().to_ascii_lowercase().as_str() {
        "start" => ViewerEvent::StartCapture,
        "stop" => ViewerEvent::StopCapture,
        "snap" | "s" => ViewerEvent::Click(ClickEvent::new(MouseButton::Primary, Modifiers::NONE)),
        "clear" | "c" => {
            ViewerEvent::Click(ClickEvent::new(MouseButton::Primary, clear_modifier.held()))
        }
        "quit" | "q" | "exit" => ViewerEvent::Shutdown,
        _ => return None,
    };
    Some(event)
}

fn spawn_command_reader(events: EventSender, clear_modifier: ClearModifier) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match parse_command(&line, clear_modifier) {
                Some(event) => {
                    if !events.post(event) {
                        break;
                    }
                }
                None => eprintln!("Unknown command: {} (start, stop, snap, clear, quit)", line.trim()),
            }
        }
    });
}

/// Event handling on the loop side, independent of where events come from
pub struct Viewer<M> {
    controller: CaptureController<M>,
    sink: SnapshotSink,
}

impl<M: DisplayMedia> Viewer<M> {
    pub fn new(controller: CaptureController<M>, sink: SnapshotSink) -> Self {
        Self { controller, sink }
    }

    #[cfg(test)]
    pub fn controller(&self) -> &CaptureController<M> {
        &self.controller
    }

    /// Apply one event. Returns false when the loop should exit.
    pub fn handle(&mut self, event: ViewerEvent) -> bool {
        match event {
            ViewerEvent::StartCapture => {
                // Start failures are reported, not fatal to the viewer.
                if let Err(err) = self.controller.start_capture() {
                    tracing::error!(error = %err, "capture request failed");
                }
            }
            ViewerEvent::StopCapture => self.controller.stop_capture(),
            ViewerEvent::StreamEnded(stream_id) => self.controller.on_stream_ended(stream_id),
            ViewerEvent::Click(click) => self.click(click),
            ViewerEvent::Shutdown => {
                self.controller.stop_capture();
                return false;
            }
        }
        true
    }

    fn click(&mut self, click: ClickEvent) {
        match self.controller.on_click(click) {
            Ok(ClickOutcome::Captured) => {
                let Some(uri) = self.controller.snapshot() else {
                    return;
                };
                tracing::info!(bytes = uri.len(), "snapshot taken");
                match self.sink.save(uri) {
                    Ok(Some(path)) => tracing::info!(path = %path.display(), "snapshot saved"),
                    Ok(None) => {}
                    Err(err) => tracing::warn!(error = %err, "failed to save snapshot"),
                }
            }
            Ok(ClickOutcome::Cleared) => tracing::info!("snapshot cleared"),
            Ok(ClickOutcome::Inactive) => tracing::debug!("click ignored: no active capture"),
            Ok(ClickOutcome::Ignored) => {}
            Err(err) => tracing::warn!(error = %err, "snapshot failed"),
        }
    }

    pub fn tick(&mut self) {
        self.controller.tick();
    }

    fn status(&self) -> String {
        let capture = if self.controller.is_capturing() {
            let video = self.controller.video();
            format!(
                "Capturing {}x{} -> {}x{}",
                video.video_width(),
                video.video_height(),
                video.client_width(),
                video.client_height()
            )
        } else {
            "Idle (type 'start')".to_string()
        };
        let snapshot = if self.controller.snapshot().is_some() {
            "snapshot held"
        } else {
            "no snapshot"
        };
        format!("{capture} | {snapshot}")
    }
}

pub fn run_viewer(display: DisplayInfo, config: &ViewerConfig) -> Result<()> {
    let queue = EventQueue::new();

    let shutdown = queue.sender();
    ctrlc::set_handler(move || {
        shutdown.post(ViewerEvent::Shutdown);
    })
    .context("Failed to set Ctrl+C handler")?;

    let media = FfmpegDisplayMedia::new(display.clone(), config.capture());
    let controller = CaptureController::new(media, queue.sender())
        .with_scale(config.scale)
        .with_clear_modifier(config.clear_modifier);
    let mut viewer = Viewer::new(controller, SnapshotSink::new(config.output_dir.clone())?);

    let _pointer = match PointerTracker::start(display.area(), queue.sender()) {
        Ok(tracker) => Some(tracker),
        Err(err) => {
            tracing::warn!(error = %err, "click tracking unavailable; use terminal commands");
            None
        }
    };
    spawn_command_reader(queue.sender(), config.clear_modifier);

    println!(
        "Viewing display {} ({}x{}). Click inside it to snapshot, {:?}-click to clear.",
        display.index, display.width, display.height, config.clear_modifier
    );
    println!("Commands: start, stop, snap, clear, quit. Press Ctrl+C to exit.\n");

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} {elapsed_precise}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );

    let frame_interval = Duration::from_secs(1) / config.capture().framerate;
    queue.sender().post(ViewerEvent::StartCapture);

    loop {
        if let Some(event) = queue.next_timeout(frame_interval) {
            if !viewer.handle(event) {
                break;
            }
        }
        viewer.tick();
        pb.set_message(viewer.status());
        pb.tick();
    }

    pb.finish_and_clear();
    println!("Viewer closed.");
    Ok(())
}

/// Start a capture, wait for its first frame, and write one snapshot.
pub fn snapshot_once(
    display: DisplayInfo,
    config: &ViewerConfig,
    output: &Path,
    timeout: Duration,
) -> Result<()> {
    let queue = EventQueue::new();
    let media = FfmpegDisplayMedia::new(display, config.capture());
    let mut controller = CaptureController::new(media, queue.sender()).with_scale(config.scale);

    let png = capture_first_frame(&mut controller, &queue, timeout)?;
    controller.stop_capture();

    fs::write(output, png).with_context(|| format!("Failed to write snapshot to {:?}", output))?;
    println!(
        "Saved {}x{} snapshot to {}",
        controller.video().client_width(),
        controller.video().client_height(),
        output.display()
    );
    Ok(())
}

fn capture_first_frame<M: DisplayMedia>(
    controller: &mut CaptureController<M>,
    queue: &EventQueue,
    timeout: Duration,
) -> Result<Vec<u8>> {
    controller.start_capture()?;

    let deadline = Instant::now() + timeout;
    while controller.video().current_frame().is_none() {
        if let Some(ViewerEvent::StreamEnded(id)) = queue.try_next() {
            controller.on_stream_ended(id);
        }
        if !controller.is_capturing() {
            anyhow::bail!("Capture ended before the first frame arrived");
        }
        if Instant::now() >= deadline {
            controller.stop_capture();
            anyhow::bail!("No frame received within {:.1}s", timeout.as_secs_f64());
        }
        thread::sleep(Duration::from_millis(10));
        controller.tick();
    }

    controller.update_snapshot()?;
    let uri = controller
        .snapshot()
        .context("Snapshot was not produced")?;
    Ok(snapshot::decode_data_uri(uri)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptureError;
    use crate::media::{next_stream_id, CapturedFrame, MediaConstraints, MediaStream, MediaStreamTrack};
    use std::sync::mpsc::{self, SyncSender};

    /// Grants one stream whose frame sender is handed to the test.
    struct OneShotMedia {
        pending: Option<MediaStream>,
    }

    impl OneShotMedia {
        fn new() -> (Self, SyncSender<CapturedFrame>, MediaStreamTrack) {
            let (tx, rx) = mpsc::sync_channel(4);
            let track = MediaStreamTrack::new(None);
            let stream = MediaStream::new(next_stream_id(), vec![track.clone()], rx);
            (Self { pending: Some(stream) }, tx, track)
        }
    }

    impl DisplayMedia for OneShotMedia {
        fn get_display_media(
            &mut self,
            _constraints: MediaConstraints,
        ) -> Result<MediaStream, CaptureError> {
            self.pending.take().ok_or_else(|| CaptureError::Denied {
                message: "already granted".to_string(),
            })
        }
    }

    fn frame() -> CapturedFrame {
        CapturedFrame {
            data: vec![200; 3 * 2 * 4],
            width: 3,
            height: 2,
            timestamp: 0.0,
        }
    }

    #[test]
    fn parses_terminal_commands() {
        assert_eq!(
            parse_command("start", ClearModifier::Shift),
            Some(ViewerEvent::StartCapture)
        );
        assert_eq!(parse_command(" QUIT ", ClearModifier::Shift), Some(ViewerEvent::Shutdown));
        assert_eq!(
            parse_command("snap", ClearModifier::Shift),
            Some(ViewerEvent::Click(ClickEvent::new(MouseButton::Primary, Modifiers::NONE)))
        );
        assert_eq!(
            parse_command("clear", ClearModifier::Alt),
            Some(ViewerEvent::Click(ClickEvent::new(
                MouseButton::Primary,
                ClearModifier::Alt.held()
            )))
        );
        assert_eq!(parse_command("dance", ClearModifier::Shift), None);
    }

    #[test]
    fn sink_without_directory_saves_nothing() {
        let sink = SnapshotSink::new(None).unwrap();
        assert_eq!(sink.save("data:,").unwrap(), None);
    }

    #[test]
    fn viewer_saves_snapshots_and_survives_denied_start() {
        let dir = tempfile::tempdir().unwrap();
        let queue = EventQueue::new();
        let (media, frames, track) = OneShotMedia::new();
        let controller = CaptureController::new(media, queue.sender());
        let mut viewer =
            Viewer::new(controller, SnapshotSink::new(Some(dir.path().join("snaps"))).unwrap());

        assert!(viewer.handle(ViewerEvent::StartCapture));
        frames.send(frame()).unwrap();
        viewer.tick();
        assert!(viewer.status().starts_with("Capturing 3x2 -> 3x2"));

        let snap = ViewerEvent::Click(ClickEvent::new(MouseButton::Primary, Modifiers::NONE));
        assert!(viewer.handle(snap));
        let saved: Vec<_> = fs::read_dir(dir.path().join("snaps")).unwrap().collect();
        assert_eq!(saved.len(), 1);

        // Source goes away, then a second start is denied: still running.
        track.end();
        let ended = queue.try_next().unwrap();
        assert!(viewer.handle(ended));
        assert!(!viewer.controller().is_capturing());
        assert!(viewer.handle(ViewerEvent::StartCapture));
        assert!(!viewer.controller().is_capturing());

        assert!(!viewer.handle(ViewerEvent::Shutdown));
    }

    #[test]
    fn first_frame_snapshot_is_png() {
        let queue = EventQueue::new();
        let (media, frames, _track) = OneShotMedia::new();
        let mut controller = CaptureController::new(media, queue.sender());
        frames.send(frame()).unwrap();

        let png = capture_first_frame(&mut controller, &queue, Duration::from_secs(2)).unwrap();
        let image = image::load_from_memory(&png).unwrap();
        assert_eq!((image.width(), image.height()), (3, 2));
    }

    #[test]
    fn first_frame_wait_fails_when_stream_ends() {
        let queue = EventQueue::new();
        let (media, _frames, track) = OneShotMedia::new();
        let mut controller = CaptureController::new(media, queue.sender());

        let ender = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            track.end();
        });
        let err = capture_first_frame(&mut controller, &queue, Duration::from_secs(5)).unwrap_err();
        ender.join().unwrap();
        assert!(err.to_string().contains("ended"));
    }
}
