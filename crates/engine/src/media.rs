use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use media_ffmpeg::MediaInfo;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::blob::MediaBlob;
use crate::clip::{ClipKind, SourceMeta, is_quicktime, usable_duration};
use crate::error::{EngineError, Result};

/// Duration reported for still images.
pub const IMAGE_DURATION: f64 = 3.0;
/// Duration assumed when reading metadata timed out.
pub const METADATA_TIMEOUT_DURATION: f64 = 30.0;
/// Duration assumed when the decoder failed to read metadata.
pub const METADATA_ERROR_DURATION: f64 = 5.0;

/// A positioned decoder over one media source.
///
/// One cursor serves one extraction; concurrent extractions open their own.
pub trait FrameCursor {
    /// Source duration in seconds as reported by the decoder.
    fn duration(&self) -> Option<f64>;

    /// Positions the cursor and resolves once the frame is available.
    fn seek(&mut self, at_seconds: f64) -> impl Future<Output = Result<()>>;

    /// Captures the current frame as a downscaled still image.
    fn capture(&mut self) -> impl Future<Output = Result<MediaBlob>>;
}

/// Host media capabilities required by the engine.
pub trait MediaBackend {
    type Cursor: FrameCursor;

    /// Reads the source duration in seconds.
    fn read_duration(&self, media: &MediaBlob) -> impl Future<Output = Result<Option<f64>>>;

    /// Opens a frame cursor producing stills `thumb_width` pixels wide.
    fn open_cursor(
        &self,
        media: &MediaBlob,
        thumb_width: u32,
    ) -> impl Future<Output = Result<Self::Cursor>>;
}

/// Resolves the duration of an ingested source.
///
/// Images report [`IMAGE_DURATION`]. Otherwise the backend is asked under
/// `timeout`. QuickTime sources that time out or fail are rejected as
/// unsupported; other sources fall back to a fixed duration.
pub async fn probe_duration<M>(
    backend: &M,
    meta: &SourceMeta,
    media: Option<&MediaBlob>,
    timeout: Duration,
) -> Result<Option<f64>>
where
    M: MediaBackend,
{
    let kind = ClipKind::from_media(&meta.mime, &meta.name).ok_or_else(|| {
        EngineError::UnsupportedMedia {
            name: meta.name.clone(),
            mime: meta.mime.clone(),
        }
    })?;
    if kind == ClipKind::Image {
        return Ok(Some(IMAGE_DURATION));
    }
    if let Some(duration) = usable_duration(meta.duration) {
        return Ok(Some(duration));
    }
    let Some(media) = media else {
        return Ok(None);
    };

    let unsupported = || EngineError::UnsupportedMedia {
        name: meta.name.clone(),
        mime: meta.mime.clone(),
    };
    match tokio::time::timeout(timeout, backend.read_duration(media)).await {
        Ok(Ok(duration)) => {
            debug!(name = %meta.name, duration = ?duration, "media duration read");
            Ok(usable_duration(duration))
        }
        Err(_) if is_quicktime(&meta.mime, &meta.name) => Err(unsupported()),
        Err(_) => {
            warn!(
                name = %meta.name,
                fallback = METADATA_TIMEOUT_DURATION,
                "metadata read timed out"
            );
            Ok(Some(METADATA_TIMEOUT_DURATION))
        }
        Ok(Err(_)) if is_quicktime(&meta.mime, &meta.name) => Err(unsupported()),
        Ok(Err(error)) => {
            warn!(
                name = %meta.name,
                %error,
                fallback = METADATA_ERROR_DURATION,
                "metadata read failed"
            );
            Ok(Some(METADATA_ERROR_DURATION))
        }
    }
}

/// FFmpeg CLI-backed backend used by production wiring.
///
/// Payloads are spooled to a temporary file because the CLI tools need a
/// seekable input. The most recent spool and its probe result are kept, so
/// reading the duration and then opening a cursor over the same payload
/// writes and probes it once.
#[derive(Debug, Default)]
pub struct FfmpegMediaBackend {
    spool: Mutex<Option<Spool>>,
}

#[derive(Debug)]
struct Spool {
    payload: MediaBlob,
    file: Arc<NamedTempFile>,
    info: Option<MediaInfo>,
}

impl FfmpegMediaBackend {
    pub fn new() -> Self {
        Self::default()
    }

    async fn spooled(&self, media: &MediaBlob) -> Result<Arc<NamedTempFile>> {
        if let Some((file, _)) = self.cached(media) {
            return Ok(file);
        }
        let file = Arc::new(spool(media).await?);
        if let Some(mut slot) = self.slot() {
            *slot = Some(Spool {
                payload: media.clone(),
                file: Arc::clone(&file),
                info: None,
            });
        }
        Ok(file)
    }

    async fn probed(&self, media: &MediaBlob) -> Result<(Arc<NamedTempFile>, MediaInfo)> {
        if let Some((file, Some(info))) = self.cached(media) {
            return Ok((file, info));
        }
        let file = self.spooled(media).await?;
        let info = media_ffmpeg::probe_media(file.path()).await?;
        if let Some(mut slot) = self.slot() {
            if let Some(spool) = slot.as_mut().filter(|spool| spool.holds(media)) {
                spool.info = Some(info.clone());
            }
        }
        Ok((file, info))
    }

    fn cached(&self, media: &MediaBlob) -> Option<(Arc<NamedTempFile>, Option<MediaInfo>)> {
        let slot = self.slot()?;
        let spool = slot.as_ref().filter(|spool| spool.holds(media))?;
        Some((Arc::clone(&spool.file), spool.info.clone()))
    }

    // A poisoned slot only loses the cache.
    fn slot(&self) -> Option<MutexGuard<'_, Option<Spool>>> {
        self.spool.lock().ok()
    }
}

impl Spool {
    fn holds(&self, media: &MediaBlob) -> bool {
        self.payload.shares_payload_with(media)
    }
}

impl MediaBackend for FfmpegMediaBackend {
    type Cursor = FfmpegCursor;

    async fn read_duration(&self, media: &MediaBlob) -> Result<Option<f64>> {
        let (_, info) = self.probed(media).await?;
        Ok(info.finite_duration())
    }

    async fn open_cursor(&self, media: &MediaBlob, thumb_width: u32) -> Result<FfmpegCursor> {
        let (file, info) = self.probed(media).await?;
        if info.first_video().is_none() {
            return Err(media_ffmpeg::MediaFfmpegError::MissingVideoStream(
                file.path().to_path_buf(),
            )
            .into());
        }

        Ok(FfmpegCursor {
            duration: info.finite_duration(),
            file,
            thumb_width,
            pending: None,
        })
    }
}

/// Cursor over a spooled payload. Each seek runs one ffmpeg capture.
#[derive(Debug)]
pub struct FfmpegCursor {
    file: Arc<NamedTempFile>,
    duration: Option<f64>,
    thumb_width: u32,
    pending: Option<Vec<u8>>,
}

impl FrameCursor for FfmpegCursor {
    fn duration(&self) -> Option<f64> {
        self.duration
    }

    async fn seek(&mut self, at_seconds: f64) -> Result<()> {
        // Cleared first so a cancelled seek leaves nothing to capture.
        self.pending = None;
        let jpeg =
            media_ffmpeg::capture_jpeg_frame(self.file.path(), at_seconds, self.thumb_width)
                .await?;
        self.pending = Some(jpeg);
        Ok(())
    }

    async fn capture(&mut self) -> Result<MediaBlob> {
        self.pending
            .take()
            .map(|jpeg| MediaBlob::new("image/jpeg", jpeg))
            .ok_or(EngineError::FrameUnavailable)
    }
}

async fn spool(media: &MediaBlob) -> Result<NamedTempFile> {
    let file = tempfile::Builder::new()
        .prefix("cutline-media-")
        .tempfile()
        .map_err(|source| EngineError::MediaIo {
            context: "create media spool file",
            source,
        })?;
    tokio::fs::write(file.path(), media.bytes())
        .await
        .map_err(|source| EngineError::MediaIo {
            context: "write media spool file",
            source,
        })?;
    Ok(file)
}
