//! Host media capabilities backed by the FFmpeg CLI tools.
//!
//! Every call spawns `ffprobe`/`ffmpeg` through `tokio::process` with
//! kill-on-drop, so dropping a pending future (for example on timeout) also
//! terminates the child process.

mod capture;
mod error;
mod probe;

pub use capture::{DEFAULT_JPEG_QUALITY, capture_jpeg_frame};
pub use error::{MediaFfmpegError, Result};
pub use probe::{MediaInfo, StreamInfo, StreamKind, probe_media};
