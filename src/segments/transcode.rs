use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::recording::{PcmFormat, RawCapture};

/// Output of normalisation, ready to be persisted
#[derive(Debug, Clone)]
pub struct NormalizedFile {
    pub path: PathBuf,
    /// File extension used when persisting
    pub extension: String,
}

/// Normalises raw captures to a standard container
#[async_trait::async_trait]
pub trait Transcoder: Send + Sync {
    async fn convert(&self, raw: &RawCapture) -> Result<NormalizedFile>;
}

/// Containers that are stored as-is
const PASSTHROUGH_EXTENSIONS: &[&str] = &["wav", "webm", "mp4", "m4a", "ogg"];

/// Wraps headerless PCM captures in a WAV container; known containers
/// pass through unchanged
#[derive(Debug, Default, Clone)]
pub struct WavTranscoder;

impl WavTranscoder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Transcoder for WavTranscoder {
    async fn convert(&self, raw: &RawCapture) -> Result<NormalizedFile> {
        if let Some(format) = raw.pcm {
            let input = raw.path.clone();
            let output = raw.path.with_extension("wav");
            let written = tokio::task::spawn_blocking(move || pcm_to_wav(&input, &output, format))
                .await
                .context("WAV conversion task panicked")??;

            return Ok(NormalizedFile {
                path: written,
                extension: "wav".to_string(),
            });
        }

        let extension = raw
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        if !PASSTHROUGH_EXTENSIONS.contains(&extension.as_str()) {
            anyhow::bail!("unsupported capture container: {:?}", raw.path);
        }

        if extension == "wav" {
            let path = raw.path.clone();
            tokio::task::spawn_blocking(move || {
                hound::WavReader::open(&path).map(|_| ()).context("Invalid WAV capture")
            })
            .await
            .context("WAV validation task panicked")??;
        }

        Ok(NormalizedFile {
            path: raw.path.clone(),
            extension,
        })
    }
}

fn pcm_to_wav(input: &Path, output: &Path, format: PcmFormat) -> Result<PathBuf> {
    if format.sample_rate == 0 || format.channels == 0 {
        anyhow::bail!(
            "invalid PCM format: {} Hz, {} channels",
            format.sample_rate,
            format.channels
        );
    }
    let len = std::fs::metadata(input)
        .with_context(|| format!("Failed to stat capture: {:?}", input))?
        .len();
    let frame_bytes = 2 * u64::from(format.channels);
    if len % frame_bytes != 0 {
        anyhow::bail!(
            "truncated PCM capture {:?}: {} bytes is not a whole number of {}-byte frames",
            input,
            len,
            frame_bytes
        );
    }

    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut reader = BufReader::new(
        File::open(input).with_context(|| format!("Failed to open capture: {:?}", input))?,
    );
    let mut writer = hound::WavWriter::create(output, spec)
        .with_context(|| format!("Failed to create WAV file: {:?}", output))?;

    let mut buf = [0u8; 2];
    loop {
        match reader.read_exact(&mut buf) {
            Ok(()) => writer
                .write_sample(i16::from_le_bytes(buf))
                .context("Failed to write sample to WAV")?,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e).context("Failed to read capture"),
        }
    }

    writer.finalize().context("Failed to finalize WAV file")?;
    Ok(output.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::CaptureMode;
    use chrono::Utc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_pcm_becomes_wav() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chunk.pcm");
        let samples: Vec<u8> = [1i16, -2, 3, -4]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        std::fs::write(&path, samples).unwrap();

        let raw = RawCapture {
            path,
            started_at: Utc::now(),
            duration_ms: 0,
            mode: CaptureMode::AudioOnly,
            pcm: Some(PcmFormat {
                sample_rate: 8000,
                channels: 1,
            }),
        };

        let normalized = WavTranscoder::new().convert(&raw).await.unwrap();
        assert_eq!(normalized.extension, "wav");

        let reader = hound::WavReader::open(&normalized.path).unwrap();
        assert_eq!(reader.spec().sample_rate, 8000);
        let decoded: Vec<i16> = reader.into_samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, vec![1, -2, 3, -4]);
    }

    #[tokio::test]
    async fn test_truncated_pcm_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chunk.pcm");
        std::fs::write(&path, [1u8, 0, 2, 0, 3]).unwrap();

        let raw = RawCapture {
            path: path.clone(),
            started_at: Utc::now(),
            duration_ms: 0,
            mode: CaptureMode::AudioOnly,
            pcm: Some(PcmFormat {
                sample_rate: 8000,
                channels: 1,
            }),
        };

        let err = WavTranscoder::new().convert(&raw).await.unwrap_err();
        assert!(format!("{:#}", err).contains("truncated"));
        assert!(!path.with_extension("wav").exists());
    }

    #[tokio::test]
    async fn test_unknown_container_is_rejected() {
        let raw = RawCapture {
            path: PathBuf::from("/tmp/capture.bin"),
            started_at: Utc::now(),
            duration_ms: 0,
            mode: CaptureMode::AudioVideo,
            pcm: None,
        };
        assert!(WavTranscoder::new().convert(&raw).await.is_err());
    }
}
