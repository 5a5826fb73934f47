//! Display media streams and tracks
//!
//! A `MediaStream` bundles the frame channel fed by a capture backend with its
//! tracks. Tracks carry the `on_ended` hook, which the backend fires from its
//! own thread when the source goes away.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use crate::error::CaptureError;

pub type StreamId = u64;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_stream_id() -> StreamId {
    NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed)
}

/// A captured video frame with raw BGRA pixel data
#[derive(Clone)]
pub struct CapturedFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: f64,
}

impl fmt::Debug for CapturedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("timestamp", &self.timestamp)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// What the caller asks the platform for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub video: bool,
    pub audio: bool,
}

impl MediaConstraints {
    pub fn video_only() -> Self {
        Self {
            video: true,
            audio: false,
        }
    }
}

/// Platform capability that turns a user's share request into a live stream
pub trait DisplayMedia {
    fn get_display_media(
        &mut self,
        constraints: MediaConstraints,
    ) -> Result<MediaStream, CaptureError>;
}

/// Backend side of a track, stopped when the consumer stops the track
pub trait TrackSource: Send {
    fn stop(&mut self);
}

type EndedCallback = Box<dyn FnOnce() + Send>;

struct TrackState {
    ended: AtomicBool,
    on_ended: Mutex<Option<EndedCallback>>,
    source: Mutex<Option<Box<dyn TrackSource>>>,
}

#[derive(Clone)]
pub struct MediaStreamTrack {
    state: Arc<TrackState>,
}

impl MediaStreamTrack {
    pub fn new(source: Option<Box<dyn TrackSource>>) -> Self {
        Self {
            state: Arc::new(TrackState {
                ended: AtomicBool::new(false),
                on_ended: Mutex::new(None),
                source: Mutex::new(source),
            }),
        }
    }

    /// Attach the backend after the track has been handed to its producer.
    pub fn with_source(self, source: Box<dyn TrackSource>) -> Self {
        *lock(&self.state.source) = Some(source);
        self
    }

    pub fn is_ended(&self) -> bool {
        self.state.ended.load(Ordering::SeqCst)
    }

    /// Register the termination callback.
    ///
    /// If the track already ended before registration the callback runs
    /// immediately, so a session can never get stuck as "active".
    pub fn set_on_ended<F>(&self, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slot = lock(&self.state.on_ended);
        if self.is_ended() {
            drop(slot);
            callback();
            return;
        }
        *slot = Some(Box::new(callback));
    }

    /// Called by the backend when the source goes away on its own.
    pub fn end(&self) {
        if self.state.ended.swap(true, Ordering::SeqCst) {
            return;
        }
        let callback = lock(&self.state.on_ended).take();
        if let Some(callback) = callback {
            callback();
        }
    }

    /// Consumer-initiated stop. Does not fire `on_ended`.
    pub fn stop(&self) {
        self.state.ended.store(true, Ordering::SeqCst);
        lock(&self.state.on_ended).take();
        let source = lock(&self.state.source).take();
        if let Some(mut source) = source {
            source.stop();
        }
    }
}

impl fmt::Debug for MediaStreamTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStreamTrack")
            .field("ended", &self.is_ended())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct MediaStream {
    id: StreamId,
    tracks: Vec<MediaStreamTrack>,
    frames: Receiver<CapturedFrame>,
}

impl MediaStream {
    pub fn new(id: StreamId, tracks: Vec<MediaStreamTrack>, frames: Receiver<CapturedFrame>) -> Self {
        Self { id, tracks, frames }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn first_track(&self) -> Option<&MediaStreamTrack> {
        self.tracks.first()
    }

    pub fn try_recv_frame(&self) -> Option<CapturedFrame> {
        self.frames.try_recv().ok()
    }

    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

impl fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("tracks", &self.tracks)
            .finish()
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        // Dropping the last handle must not leave a grabber process behind.
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    struct FlagSource(Arc<AtomicBool>);

    impl TrackSource for FlagSource {
        fn stop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn end_fires_callback_once() {
        let track = MediaStreamTrack::new(None);
        let (tx, rx) = mpsc::channel();
        track.set_on_ended(move || tx.send(()).unwrap());

        track.end();
        track.end();

        assert!(track.is_ended());
        assert_eq!(rx.try_iter().count(), 1);
    }

    #[test]
    fn callback_registered_after_end_runs_immediately() {
        let track = MediaStreamTrack::new(None);
        track.end();

        let (tx, rx) = mpsc::channel();
        track.set_on_ended(move || tx.send(()).unwrap());
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn stop_releases_source_without_firing_ended() {
        let stopped = Arc::new(AtomicBool::new(false));
        let source = FlagSource(Arc::clone(&stopped));
        let track = MediaStreamTrack::new(Some(Box::new(source)));
        let (tx, rx) = mpsc::channel();
        track.set_on_ended(move || tx.send(()).unwrap());

        track.stop();
        track.end();

        assert!(stopped.load(Ordering::SeqCst));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropping_stream_stops_tracks() {
        let stopped = Arc::new(AtomicBool::new(false));
        let source = FlagSource(Arc::clone(&stopped));
        let track = MediaStreamTrack::new(Some(Box::new(source)));
        let (_tx, rx) = mpsc::sync_channel(1);
        let stream = MediaStream::new(next_stream_id(), vec![track.clone()], rx);

        drop(stream);
        assert!(stopped.load(Ordering::SeqCst));
        assert!(track.is_ended());
    }
}
