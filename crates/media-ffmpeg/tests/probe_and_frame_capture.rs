use std::path::PathBuf;
use std::process::Command;

use media_ffmpeg::{MediaFfmpegError, capture_jpeg_frame, probe_media};

fn make_sample_video() -> PathBuf {
    let output = std::env::temp_dir().join(format!(
        "cutline-probe-{}-{}.mp4",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock must be after unix epoch")
            .as_nanos()
    ));

    let status = Command::new("ffmpeg")
        .args([
            "-y",
            "-v",
            "error",
            "-f",
            "lavfi",
            "-i",
            "testsrc=size=160x90:rate=30",
            "-f",
            "lavfi",
            "-i",
            "sine=frequency=440:sample_rate=48000",
            "-t",
            "1.2",
            "-pix_fmt",
            "yuv420p",
        ])
        .arg(&output)
        .output()
        .expect("ffmpeg must be installed to run tests");

    assert!(
        status.status.success(),
        "ffmpeg command must succeed: {}",
        String::from_utf8_lossy(&status.stderr)
    );
    output
}

#[tokio::test]
#[ignore = "requires ffmpeg and ffprobe on PATH"]
async fn probe_media_finds_video_audio_and_duration() {
    let sample = make_sample_video();

    let info = probe_media(&sample).await.expect("probe should succeed");

    assert_eq!(info.streams.len(), 2);
    let video = info.first_video().expect("video stream should exist");
    assert_eq!(video.width, Some(160));
    assert_eq!(video.height, Some(90));
    assert!(info.first_audio().is_some());

    let duration = info.finite_duration().expect("duration should be known");
    assert!((duration - 1.2).abs() < 0.1, "unexpected duration {duration}");
}

#[tokio::test]
#[ignore = "requires ffmpeg and ffprobe on PATH"]
async fn capture_jpeg_frame_returns_jpeg_bytes() {
    let sample = make_sample_video();

    let jpeg = capture_jpeg_frame(&sample, 0.5, 80)
        .await
        .expect("capture should succeed");

    assert!(jpeg.len() > 2);
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "output must start with a JPEG SOI marker");
}

#[tokio::test]
async fn capture_jpeg_frame_rejects_negative_timestamp_without_spawning() {
    let result = capture_jpeg_frame("missing.mp4", -1.0, 150).await;

    assert!(matches!(
        result,
        Err(MediaFfmpegError::InvalidTimestampSeconds(_))
    ));
}

#[tokio::test]
async fn capture_jpeg_frame_rejects_zero_width() {
    let result = capture_jpeg_frame("missing.mp4", 1.0, 0).await;

    assert!(matches!(
        result,
        Err(MediaFfmpegError::InvalidThumbnailWidth(0))
    ));
}
