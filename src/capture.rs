//! Display media backed by an ffmpeg screen grabber
//!
//! ffmpeg writes raw BGRA frames to stdout; a reader thread slices them into
//! `CapturedFrame`s and ends the track when the pipe closes.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::thread;
use std::time::Duration;

use crate::error::CaptureError;
use crate::media::{
    next_stream_id, CapturedFrame, DisplayMedia, MediaConstraints, MediaStream, MediaStreamTrack,
    TrackSource,
};
use crate::platform::DisplayInfo;

/// Frames buffered between the reader thread and the viewer loop
const FRAME_QUEUE_DEPTH: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureConfig {
    pub framerate: u32,
    pub show_cursor: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            framerate: 30,
            show_cursor: false,
        }
    }
}

/// Platform-specific ffmpeg input and the pixel size it produces
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegInput {
    pub args: Vec<String>,
    pub width: u32,
    pub height: u32,
}

/// Full ffmpeg argument list: platform input, then raw BGRA on stdout
pub fn ffmpeg_args(input: &FfmpegInput) -> Vec<String> {
    let mut args: Vec<String> = vec!["-loglevel".into(), "error".into()];
    args.extend(input.args.iter().cloned());
    args.extend(
        ["-pix_fmt", "bgra", "-f", "rawvideo", "-"]
            .into_iter()
            .map(String::from),
    );
    args
}

pub struct FfmpegDisplayMedia {
    display: DisplayInfo,
    config: CaptureConfig,
}

impl FfmpegDisplayMedia {
    pub fn new(display: DisplayInfo, config: CaptureConfig) -> Self {
        Self { display, config }
    }
}

impl DisplayMedia for FfmpegDisplayMedia {
    fn get_display_media(
        &mut self,
        constraints: MediaConstraints,
    ) -> Result<MediaStream, CaptureError> {
        if !constraints.video {
            return Err(CaptureError::Denied {
                message: "display capture requires video".to_string(),
            });
        }
        if constraints.audio {
            tracing::warn!("audio capture is not supported; capturing video only");
        }

        check_ffmpeg()?;

        let input = self
            .display
            .ffmpeg_input(self.config.framerate, self.config.show_cursor);
        let mut cmd = Command::new("ffmpeg");
        cmd.args(ffmpeg_args(&input))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        tracing::debug!(
            display = self.display.index,
            width = input.width,
            height = input.height,
            framerate = self.config.framerate,
            "spawning ffmpeg grabber"
        );
        start_capture_process(cmd, &input, self.config.framerate)
    }
}

fn check_ffmpeg() -> Result<(), CaptureError> {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|source| CaptureError::FfmpegUnavailable { source })?;
    Ok(())
}

/// Running grabber process, owned by the video track
struct FfmpegProcess {
    child: Child,
    reader_thread: Option<thread::JoinHandle<()>>,
}

impl TrackSource for FfmpegProcess {
    fn stop(&mut self) {
        // SIGINT first so ffmpeg can shut the device down cleanly
        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            let pid = Pid::from_raw(self.child.id() as i32);
            let _ = kill(pid, Signal::SIGINT);
        }

        thread::sleep(Duration::from_millis(100));

        let _ = self.child.kill();
        match self.child.wait() {
            Ok(status) => tracing::debug!(%status, "ffmpeg grabber exited"),
            Err(err) => tracing::warn!(?err, "failed to reap ffmpeg grabber"),
        }

        if let Some(handle) = self.reader_thread.take() {
            let _ = handle.join();
        }
    }
}

fn start_capture_process(
    mut cmd: Command,
    input: &FfmpegInput,
    framerate: u32,
) -> Result<MediaStream, CaptureError> {
    let mut child = cmd.spawn().map_err(|source| CaptureError::Spawn { source })?;
    let Some(stdout) = child.stdout.take() else {
        let _ = child.kill();
        let _ = child.wait();
        return Err(CaptureError::MissingStdout);
    };

    let stderr_thread = child
        .stderr
        .take()
        .map(|stderr| thread::spawn(move || last_line(BufReader::new(stderr))));

    let (sender, receiver) = mpsc::sync_channel(FRAME_QUEUE_DEPTH);
    let track = MediaStreamTrack::new(None);

    let reader_track = track.clone();
    let (width, height) = (input.width, input.height);
    let reader_thread = thread::spawn(move || {
        let frames = read_frames(BufReader::new(stdout), width, height, framerate, &sender);
        tracing::debug!(frames, "ffmpeg output closed");
        let last_error = stderr_thread.and_then(|handle| handle.join().ok().flatten());
        // Consumer stops end quietly.
        if !reader_track.is_ended() {
            if let Some(line) = last_error {
                tracing::warn!(reason = %line, "ffmpeg grabber stopped");
            }
        }
        reader_track.end();
    });

    let track = track.with_source(Box::new(FfmpegProcess {
        child,
        reader_thread: Some(reader_thread),
    }));

    Ok(MediaStream::new(next_stream_id(), vec![track], receiver))
}

/// Last non-empty line of `reader`, read until EOF.
fn last_line<R: BufRead>(reader: R) -> Option<String> {
    reader
        .lines()
        .map_while(Result::ok)
        .map(|line| line.trim().to_string())
        .filter(|line| !line.is_empty())
        .last()
}

/// Slice raw BGRA frames from `reader` until EOF or the consumer goes away.
///
/// Frames are dropped while the queue is full. Returns the number read.
fn read_frames<R: Read>(
    mut reader: R,
    width: u32,
    height: u32,
    framerate: u32,
    sender: &SyncSender<CapturedFrame>,
) -> u64 {
    let frame_size = width as usize * height as usize * 4;
    let mut frame_count: u64 = 0;
    if frame_size == 0 {
        return 0;
    }

    loop {
        let mut data = vec![0u8; frame_size];
        if reader.read_exact(&mut data).is_err() {
            break;
        }
        let timestamp = frame_count as f64 / f64::from(framerate.max(1));
        frame_count += 1;

        let frame = CapturedFrame {
            data,
            width,
            height,
            timestamp,
        };
        match sender.try_send(frame) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Disconnected(_)) => break,
        }
    }

    frame_count
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn default_config_is_video_at_30fps_without_cursor() {
        let config = CaptureConfig::default();
        assert_eq!(config.framerate, 30);
        assert!(!config.show_cursor);
    }

    #[test]
    fn args_end_with_raw_bgra_on_stdout() {
        let input = FfmpegInput {
            args: vec!["-f".into(), "x11grab".into(), "-i".into(), ":0+0,0".into()],
            width: 640,
            height: 480,
        };
        let args = ffmpeg_args(&input);
        assert_eq!(&args[..2], ["-loglevel", "error"]);
        assert_eq!(&args[2..6], input.args.as_slice());
        assert_eq!(&args[6..], ["-pix_fmt", "bgra", "-f", "rawvideo", "-"]);
    }

    #[test]
    fn keeps_last_stderr_line() {
        let stderr = "[x11grab @ 0x1] Cannot open display :9, error 1.\n\
                      :9+0,0: Input/output error\n\n";
        assert_eq!(
            last_line(Cursor::new(stderr)),
            Some(":9+0,0: Input/output error".to_string())
        );
        assert_eq!(last_line(Cursor::new("")), None);
    }

    #[test]
    fn reads_whole_frames_and_drops_partial_tail() {
        let mut bytes = vec![1u8; 2 * 2 * 4];
        bytes.extend(vec![2u8; 2 * 2 * 4]);
        bytes.extend([9u8; 5]);

        let (tx, rx) = mpsc::sync_channel(4);
        let count = read_frames(Cursor::new(bytes), 2, 2, 10, &tx);
        assert_eq!(count, 2);

        let frames: Vec<_> = rx.try_iter().collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].data[0], 1);
        assert_eq!(frames[1].data[0], 2);
        assert!((frames[1].timestamp - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn full_queue_drops_frames_without_blocking() {
        let bytes = vec![0u8; 4 * 5];
        let (tx, rx) = mpsc::sync_channel(2);
        let count = read_frames(Cursor::new(bytes), 1, 1, 30, &tx);
        assert_eq!(count, 5);
        assert_eq!(rx.try_iter().count(), 2);
    }

    #[test]
    fn stops_when_consumer_is_gone() {
        let bytes = vec![0u8; 4 * 5];
        let (tx, rx) = mpsc::sync_channel(2);
        drop(rx);
        assert_eq!(read_frames(Cursor::new(bytes), 1, 1, 30, &tx), 1);
    }
}
