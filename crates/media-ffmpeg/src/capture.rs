use std::path::Path;

use tokio::process::Command;
use tracing::debug;

use crate::error::{MediaFfmpegError, Result};

/// `-q:v` value passed to the MJPEG encoder (2..=31, lower is better).
pub const DEFAULT_JPEG_QUALITY: u8 = 5;

/// Captures one video frame at `at_seconds`, downscaled to `width` pixels
/// wide, and returns it as JPEG bytes.
///
/// The seek is placed before `-i` so ffmpeg jumps to the nearest keyframe
/// instead of decoding from the start.
///
/// # Example
/// ```no_run
/// # async fn demo() {
/// use media_ffmpeg::capture_jpeg_frame;
///
/// let jpeg = capture_jpeg_frame("sample.mp4", 0.5, 150)
///     .await
///     .expect("capture should succeed");
/// assert!(!jpeg.is_empty());
/// # }
/// ```
pub async fn capture_jpeg_frame(
    path: impl AsRef<Path>,
    at_seconds: f64,
    width: u32,
) -> Result<Vec<u8>> {
    if !at_seconds.is_finite() || at_seconds < 0.0 {
        return Err(MediaFfmpegError::InvalidTimestampSeconds(at_seconds));
    }
    if width == 0 {
        return Err(MediaFfmpegError::InvalidThumbnailWidth(width));
    }

    let path = path.as_ref();
    let scale = format!("scale={width}:-2");
    let quality = DEFAULT_JPEG_QUALITY.to_string();
    let output = Command::new("ffmpeg")
        .arg("-hide_banner")
        .arg("-v")
        .arg("error")
        .arg("-ss")
        .arg(format!("{at_seconds:.3}"))
        .arg("-i")
        .arg(path)
        .arg("-frames:v")
        .arg("1")
        .arg("-vf")
        .arg(&scale)
        .arg("-f")
        .arg("image2pipe")
        .arg("-c:v")
        .arg("mjpeg")
        .arg("-q:v")
        .arg(&quality)
        .arg("-")
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| MediaFfmpegError::Io {
            context: "run ffmpeg capture frame",
            source,
        })?;

    if !output.status.success() {
        return Err(MediaFfmpegError::CommandFailed {
            command: format!("ffmpeg capture frame {}", path.display()),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    if output.stdout.is_empty() {
        return Err(MediaFfmpegError::EmptyCapture {
            path: path.to_path_buf(),
            at_seconds,
        });
    }

    debug!(
        path = %path.display(),
        at_seconds,
        width,
        bytes = output.stdout.len(),
        "frame captured"
    );
    Ok(output.stdout)
}
