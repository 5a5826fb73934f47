use crate::events::{VideoEventKind, VideoMetadata};
use crate::media::{CapturedFrame, MediaStream, StreamId};

/// Playback surface a stream is bound to
///
/// Holds the latest frame of the bound stream. The intrinsic size comes from
/// the frames, the client size is whatever the owner lays the surface out at.
#[derive(Debug, Default)]
pub struct VideoSurface {
    src_object: Option<MediaStream>,
    current_frame: Option<CapturedFrame>,
    paused: bool,
    loaded: bool,
    video_width: u32,
    video_height: u32,
    client_width: u32,
    client_height: u32,
}

impl VideoSurface {
    pub fn new() -> Self {
        Self {
            paused: true,
            ..Self::default()
        }
    }

    /// Bind a stream, or clear the binding with `None`. Resets playback state.
    pub fn set_src_object(&mut self, stream: Option<MediaStream>) {
        self.src_object = stream;
        self.current_frame = None;
        self.paused = true;
        self.loaded = false;
        self.video_width = 0;
        self.video_height = 0;
    }

    pub fn src_object(&self) -> Option<&MediaStream> {
        self.src_object.as_ref()
    }

    pub fn stream_id(&self) -> Option<StreamId> {
        self.src_object.as_ref().map(MediaStream::id)
    }

    pub fn play(&mut self) {
        self.paused = false;
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    #[cfg(test)]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn video_width(&self) -> u32 {
        self.video_width
    }

    pub fn video_height(&self) -> u32 {
        self.video_height
    }

    pub fn client_width(&self) -> u32 {
        self.client_width
    }

    pub fn client_height(&self) -> u32 {
        self.client_height
    }

    pub fn set_client_size(&mut self, width: u32, height: u32) {
        self.client_width = width;
        self.client_height = height;
    }

    pub fn current_frame(&self) -> Option<&CapturedFrame> {
        self.current_frame.as_ref()
    }

    /// Drain frames that arrived since the last poll.
    ///
    /// While paused, frames are discarded and the shown frame stays. Returns
    /// the metadata event for the newest frame taken, if any.
    pub fn poll_frames(&mut self) -> Option<VideoMetadata> {
        let stream = self.src_object.as_ref()?;

        let mut latest = None;
        while let Some(frame) = stream.try_recv_frame() {
            latest = Some(frame);
        }
        if self.paused {
            return None;
        }
        let frame = latest?;

        let kind = if self.loaded {
            VideoEventKind::TimeUpdate
        } else {
            self.loaded = true;
            VideoEventKind::LoadedMetadata
        };
        self.video_width = frame.width;
        self.video_height = frame.height;
        let metadata = VideoMetadata {
            kind,
            width: frame.width,
            height: frame.height,
        };
        self.current_frame = Some(frame);
        Some(metadata)
    }
}
