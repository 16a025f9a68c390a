use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::capture::{CaptureMode, CaptureSession, FeedMap, MediaFrame, PcmFormat, RawCapture};
use crate::call::CallId;

/// Ghost-recorder capture that drains a media feed into raw PCM chunk files
///
/// A chunk is opened lazily on the first frame after a cut, so a cut with no
/// media in between yields nothing. Closing stops the drain and hands the
/// feed back to its transport, so the call can be recorded again.
pub struct PcmCaptureSession {
    call_id: CallId,
    chunks: Arc<Mutex<PcmChunks>>,
    drain: Option<JoinHandle<Option<mpsc::Receiver<MediaFrame>>>>,
    stop: Option<oneshot::Sender<()>>,
    feeds: Option<FeedMap>,
}

impl PcmCaptureSession {
    pub fn start(
        call_id: CallId,
        output_dir: PathBuf,
        mut feed: mpsc::Receiver<MediaFrame>,
    ) -> Result<Self> {
        fs::create_dir_all(&output_dir).context("Failed to create capture directory")?;

        let chunks = Arc::new(Mutex::new(PcmChunks {
            output_dir,
            call_id,
            file_tag: Utc::now().timestamp_millis(),
            next_file: 0,
            current: None,
        }));

        let (stop, mut stopped) = oneshot::channel::<()>();
        let drain_chunks = Arc::clone(&chunks);
        let drain = tokio::spawn(async move {
            debug!("Capture drain started for call {}", call_id);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stopped => break,
                    frame = feed.recv() => {
                        let Some(frame) = frame else {
                            debug!("Media feed closed for call {}", call_id);
                            return None;
                        };
                        let mut chunks = drain_chunks.lock().await;
                        if let Err(e) = chunks.write_frame(&frame) {
                            warn!("Dropping frame for call {}: {:#}", call_id, e);
                        }
                    }
                }
            }

            Some(feed)
        });

        info!("PCM capture started for call {}", call_id);

        Ok(Self {
            call_id,
            chunks,
            drain: Some(drain),
            stop: Some(stop),
            feeds: None,
        })
    }

    /// Put the feed back into `feeds` when the session closes
    pub(crate) fn return_feed_to(mut self, feeds: FeedMap) -> Self {
        self.feeds = Some(feeds);
        self
    }

    /// Stop draining and return the feed with any queued frames discarded
    async fn stop_drain(&mut self) -> Option<mpsc::Receiver<MediaFrame>> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let drain = self.drain.take()?;

        match drain.await {
            Ok(Some(mut feed)) => {
                while feed.try_recv().is_ok() {}
                Some(feed)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Capture drain for call {} failed: {}", self.call_id, e);
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl CaptureSession for PcmCaptureSession {
    async fn cut(&mut self) -> Result<Option<RawCapture>> {
        let mut chunks = self.chunks.lock().await;
        let Some(chunk) = chunks.current.take() else {
            return Ok(None);
        };

        let raw = chunk.finish()?;
        info!(
            "Cut segment for call {}: {} ms at {:?}",
            self.call_id, raw.duration_ms, raw.path
        );
        Ok(Some(raw))
    }

    async fn close(&mut self) -> Result<()> {
        let feed = self.stop_drain().await;
        if let (Some(feed), Some(feeds)) = (feed, &self.feeds) {
            feeds.lock().await.entry(self.call_id).or_insert(feed);
            debug!("Media feed returned for call {}", self.call_id);
        }

        let leftover = self.chunks.lock().await.current.take();
        if let Some(chunk) = leftover {
            let path = chunk.path.clone();
            drop(chunk);
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove uncut capture {:?}: {}", path, e);
            }
        }

        info!("PCM capture closed for call {}", self.call_id);
        Ok(())
    }

    fn mode(&self) -> CaptureMode {
        CaptureMode::AudioOnly
    }
}

impl Drop for PcmCaptureSession {
    fn drop(&mut self) {
        if let Some(drain) = self.drain.take() {
            drain.abort();
        }
    }
}

struct PcmChunks {
    output_dir: PathBuf,
    call_id: CallId,
    file_tag: i64,
    next_file: usize,
    current: Option<ChunkWriter>,
}

impl PcmChunks {
    fn write_frame(&mut self, frame: &MediaFrame) -> Result<()> {
        if self.current.is_none() {
            let path = self.output_dir.join(format!(
                "{}-{}-raw-{:03}.pcm",
                self.call_id, self.file_tag, self.next_file
            ));
            self.next_file += 1;
            self.current = Some(ChunkWriter::new(
                path,
                PcmFormat {
                    sample_rate: frame.sample_rate,
                    channels: frame.channels,
                },
            )?);
        }

        if let Some(chunk) = &mut self.current {
            chunk.write_frame(frame)?;
        }
        Ok(())
    }
}

/// Writes one raw chunk to disk
struct ChunkWriter {
    writer: Option<BufWriter<File>>,
    path: PathBuf,
    format: PcmFormat,
    started_at: DateTime<Utc>,
    sample_count: u64,
}

impl ChunkWriter {
    fn new(path: PathBuf, format: PcmFormat) -> Result<Self> {
        let file = File::create(&path)
            .with_context(|| format!("Failed to create capture file: {:?}", path))?;

        Ok(Self {
            writer: Some(BufWriter::new(file)),
            path,
            format,
            started_at: Utc::now(),
            sample_count: 0,
        })
    }

    fn write_frame(&mut self, frame: &MediaFrame) -> Result<()> {
        if frame.sample_rate != self.format.sample_rate || frame.channels != self.format.channels {
            anyhow::bail!(
                "format changed mid-segment ({} Hz/{} ch, expected {} Hz/{} ch)",
                frame.sample_rate,
                frame.channels,
                self.format.sample_rate,
                self.format.channels
            );
        }

        if let Some(writer) = &mut self.writer {
            for &sample in &frame.samples {
                writer
                    .write_all(&sample.to_le_bytes())
                    .context("Failed to write sample")?;
            }
            self.sample_count += frame.samples.len() as u64;
        }

        Ok(())
    }

    fn finish(mut self) -> Result<RawCapture> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush().context("Failed to flush capture file")?;
        }

        let samples_per_sec = self.format.sample_rate as u64 * self.format.channels.max(1) as u64;
        let duration_ms = if samples_per_sec == 0 {
            0
        } else {
            self.sample_count * 1000 / samples_per_sec
        };

        Ok(RawCapture {
            path: self.path.clone(),
            started_at: self.started_at,
            duration_ms,
            mode: CaptureMode::AudioOnly,
            pcm: Some(self.format),
        })
    }
}

impl Drop for ChunkWriter {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                warn!("Failed to flush capture writer on drop: {}", e);
            }
        }
    }
}
