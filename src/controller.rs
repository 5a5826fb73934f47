//! Capture session state and click dispatch

use crate::error::{CaptureError, SnapshotError};
use crate::events::{ClearModifier, ClickEvent, EventSender, MouseButton, VideoMetadata, ViewerEvent};
use crate::media::{DisplayMedia, MediaConstraints, StreamId};
use crate::snapshot;
use crate::video::VideoSurface;

/// What a click on the capture area did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// Not the primary button
    Ignored,
    Cleared,
    Captured,
    /// Snapshot requested with no active capture
    Inactive,
}

pub struct CaptureController<M> {
    media: M,
    events: EventSender,
    video: VideoSurface,
    capturing: bool,
    width: u32,
    height: u32,
    scale: f64,
    clear_modifier: ClearModifier,
    image_url: Option<String>,
}

impl<M: DisplayMedia> CaptureController<M> {
    pub fn new(media: M, events: EventSender) -> Self {
        Self {
            media,
            events,
            video: VideoSurface::new(),
            capturing: false,
            width: 0,
            height: 0,
            scale: 1.0,
            clear_modifier: ClearModifier::default(),
            image_url: None,
        }
    }

    /// Client area = video size times `scale`.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_clear_modifier(mut self, modifier: ClearModifier) -> Self {
        self.clear_modifier = modifier;
        self
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    pub fn snapshot(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    #[cfg(test)]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[cfg(test)]
    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn video(&self) -> &VideoSurface {
        &self.video
    }

    pub fn start_capture(&mut self) -> Result<(), CaptureError> {
        if self.capturing {
            return Ok(());
        }

        self.clear_snapshot();

        let stream = self.media.get_display_media(MediaConstraints::video_only())?;
        let stream_id = stream.id();

        // The ended hook fires on the backend's thread; hand it back to the loop.
        if let Some(track) = stream.first_track() {
            let events = self.events.clone();
            track.set_on_ended(move || {
                events.post(ViewerEvent::StreamEnded(stream_id));
            });
        }

        self.video.set_src_object(Some(stream));
        self.video.play();
        self.capturing = true;

        tracing::info!(stream_id, "capture started");
        Ok(())
    }

    /// User-initiated stop. The ended hook does not fire for this.
    pub fn stop_capture(&mut self) {
        if !self.capturing {
            return;
        }
        if let Some(stream) = self.video.src_object() {
            stream.stop();
        }
        self.reset_session();
        tracing::info!("capture stopped");
    }

    /// Stream end reported through the event queue. Stale ids are ignored.
    pub fn on_stream_ended(&mut self, stream_id: StreamId) {
        if self.video.stream_id() != Some(stream_id) {
            tracing::debug!(stream_id, "ignoring end of unbound stream");
            return;
        }
        self.reset_session();
        tracing::info!(stream_id, "capture ended by source");
    }

    fn reset_session(&mut self) {
        self.video.set_src_object(None);
        self.capturing = false;
    }

    pub fn on_video_update(&mut self, metadata: VideoMetadata) {
        if metadata.width == 0 || metadata.height == 0 {
            return;
        }
        // Pausing across the resize keeps the surface from flickering.
        self.video.pause();
        if (self.width, self.height) != (metadata.width, metadata.height) {
            tracing::debug!(
                width = metadata.width,
                height = metadata.height,
                kind = ?metadata.kind,
                "video size changed"
            );
        }
        self.width = metadata.width;
        self.height = metadata.height;
        self.video
            .set_client_size(scaled(self.width, self.scale), scaled(self.height, self.scale));
        self.video.play();
    }

    /// Pull new frames into the surface and apply their metadata.
    pub fn tick(&mut self) {
        if let Some(metadata) = self.video.poll_frames() {
            self.on_video_update(metadata);
        }
    }

    pub fn on_click(&mut self, click: ClickEvent) -> Result<ClickOutcome, SnapshotError> {
        if click.button != MouseButton::Primary {
            return Ok(ClickOutcome::Ignored);
        }
        if self.clear_modifier.is_held(click.modifiers) {
            self.clear_snapshot();
            return Ok(ClickOutcome::Cleared);
        }
        self.update_snapshot()
    }

    pub fn update_snapshot(&mut self) -> Result<ClickOutcome, SnapshotError> {
        if !self.capturing {
            return Ok(ClickOutcome::Inactive);
        }
        let data_uri = snapshot::frame_to_data_uri(&self.video)?;
        self.image_url = Some(data_uri);
        Ok(ClickOutcome::Captured)
    }

    pub fn clear_snapshot(&mut self) {
        self.image_url = None;
    }
}

fn scaled(value: u32, scale: f64) -> u32 {
    (f64::from(value) * scale).round().max(0.0) as u32
}
