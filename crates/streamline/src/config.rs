use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunables for one streaming session.
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Period of the manifest retry timer once a fetch has failed.
    pub manifest_retry_interval_ms: u64,
    /// Size of one buffer allocation.
    pub buffer_segment_size: usize,
    pub video_buffer_segments: usize,
    pub audio_buffer_segments: usize,
    /// How far behind the live edge dynamic playback aims to stay.
    pub live_edge_latency_ms: i64,
    /// Fraction of the measured throughput the video evaluator may spend.
    pub bandwidth_fraction: f64,
    /// Throughput assumed before any transfer has been measured, in bits/s.
    pub initial_bitrate_estimate: u64,
}

impl SessionConfig {
    pub fn manifest_retry_interval(&self) -> Duration {
        Duration::from_millis(self.manifest_retry_interval_ms)
    }

    pub fn video_buffer_bytes(&self) -> usize {
        self.video_buffer_segments
            .saturating_mul(self.buffer_segment_size)
    }

    pub fn audio_buffer_bytes(&self) -> usize {
        self.audio_buffer_segments
            .saturating_mul(self.buffer_segment_size)
    }

    pub fn total_buffer_bytes(&self) -> usize {
        self.video_buffer_bytes()
            .saturating_add(self.audio_buffer_bytes())
    }

    /// Rejects values a session cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.manifest_retry_interval_ms == 0 {
            return Err(ConfigError::ZeroRetryInterval);
        }
        if self.buffer_segment_size == 0 {
            return Err(ConfigError::ZeroSegmentSize);
        }

        let overflow = |segments: usize| ConfigError::BufferOverflow {
            segments,
            segment_size: self.buffer_segment_size,
        };
        let video = self
            .video_buffer_segments
            .checked_mul(self.buffer_segment_size)
            .ok_or_else(|| overflow(self.video_buffer_segments))?;
        let audio = self
            .audio_buffer_segments
            .checked_mul(self.buffer_segment_size)
            .ok_or_else(|| overflow(self.audio_buffer_segments))?;
        video
            .checked_add(audio)
            .ok_or_else(|| overflow(
                self.video_buffer_segments
                    .saturating_add(self.audio_buffer_segments),
            ))?;
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            manifest_retry_interval_ms: 5000,
            buffer_segment_size: 64 * 1024,
            video_buffer_segments: 200,
            audio_buffer_segments: 54,
            live_edge_latency_ms: 30000,
            bandwidth_fraction: 0.75,
            initial_bitrate_estimate: 800_000,
        }
    }
}
