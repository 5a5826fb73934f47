use thiserror::Error;

/// Failure to obtain a display stream.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("display {index} not found")]
    DisplayNotFound { index: usize },
    #[error("ffmpeg is not available: {source}")]
    FfmpegUnavailable {
        #[source]
        source: std::io::Error,
    },
    #[error("failed to start ffmpeg for display capture")]
    Spawn {
        #[source]
        source: std::io::Error,
    },
    #[error("ffmpeg did not expose a stdout pipe")]
    MissingStdout,
    #[error("platform refused the capture request: {message}")]
    Denied { message: String },
}

/// Failure of a single snapshot attempt. Never affects controller state.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("unsupported drawing context for a {width}x{height} canvas")]
    UnsupportedContext { width: u32, height: u32 },
    #[error("failed to encode snapshot")]
    Encode(#[from] image::ImageError),
    #[error("invalid image data uri: {message}")]
    InvalidDataUri { message: String },
}
