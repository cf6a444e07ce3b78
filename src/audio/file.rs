use anyhow::{Context, Result};
use bytes::{BufMut, Bytes, BytesMut};
use hound::{SampleFormat, WavReader};
use std::path::Path;
use tracing::info;

/// A 16-bit PCM WAV file loaded into memory, for replay through a session
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved samples
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .with_context(|| format!("Failed to open WAV file {}", path.display()))?;

        let spec = reader.spec();
        anyhow::ensure!(
            spec.sample_format == SampleFormat::Int && spec.bits_per_sample == 16,
            "Expected 16-bit PCM, got {}-bit {:?}",
            spec.bits_per_sample,
            spec.sample_format
        );

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    pub fn matches_format(&self, sample_rate: u32, channels: u16) -> bool {
        self.sample_rate == sample_rate && self.channels == channels
    }

    /// Average interleaved channels down to a mono copy
    pub fn to_mono(&self) -> AudioFile {
        let samples = if self.channels <= 1 {
            self.samples.clone()
        } else {
            self.samples
                .chunks(self.channels as usize)
                .map(|frame| {
                    let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                    (sum / frame.len() as i32) as i16
                })
                .collect()
        };

        AudioFile {
            path: self.path.clone(),
            duration_seconds: self.duration_seconds,
            sample_rate: self.sample_rate,
            channels: 1,
            samples,
        }
    }

    /// Split the audio into little-endian PCM chunks of `chunk_ms` each
    ///
    /// Chunk boundaries fall on whole frames; the last chunk may be shorter.
    pub fn pcm_chunks(&self, chunk_ms: u64) -> Vec<Bytes> {
        let frames_per_chunk =
            ((self.sample_rate as u64 * chunk_ms.max(1)) / 1000).max(1) as usize;
        let samples_per_chunk = frames_per_chunk * self.channels.max(1) as usize;

        self.samples
            .chunks(samples_per_chunk)
            .map(|chunk| {
                let mut buf = BytesMut::with_capacity(chunk.len() * 2);
                for &sample in chunk {
                    buf.put_i16_le(sample);
                }
                buf.freeze()
            })
            .collect()
    }
}
