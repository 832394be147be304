//! Per-media-type track sources.
//!
//! Every source of a session draws from one [`pool::BufferPool`] and, for
//! adaptive tracks, one [`bandwidth::BandwidthMeter`]. Both are owned by the
//! session's [`TrackSourceFactory`], never by the process.

pub mod bandwidth;
pub mod pool;
pub mod selector;

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    config::SessionConfig,
    error::BuildError,
    manifest::{client::ManifestClient, AdaptationSet, Manifest, MediaType, Representation},
    protection::ProtectionSession,
};
use bandwidth::{AdaptiveEvaluator, BandwidthMeter, FormatEvaluator};
use pool::{BufferPool, TrackBuffer};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackSelectionPolicy {
    /// Switch representations with the measured throughput.
    Adaptive,
    /// Stay on the best representation of the first matching set.
    Default,
}

/// Produces the media segments of one track.
#[derive(Debug)]
pub struct ChunkSource {
    manifest_client: ManifestClient,
    manifest: Arc<Manifest>,
    media_type: MediaType,
    /// Lowest quality first.
    representations: Vec<Representation>,
    evaluator: FormatEvaluator,
    live_edge_latency_ms: i64,
    elapsed_realtime_offset_ms: i64,
}

impl ChunkSource {
    pub fn manifest_client(&self) -> &ManifestClient {
        &self.manifest_client
    }

    pub fn manifest(&self) -> &Arc<Manifest> {
        &self.manifest
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn representations(&self) -> &[Representation] {
        &self.representations
    }

    pub fn is_adaptive(&self) -> bool {
        self.evaluator.is_adaptive()
    }

    pub fn live_edge_latency_ms(&self) -> i64 {
        self.live_edge_latency_ms
    }

    pub fn elapsed_realtime_offset_ms(&self) -> i64 {
        self.elapsed_realtime_offset_ms
    }

    /// Representation the next chunk should be requested in.
    pub fn select_representation(&self) -> Option<&Representation> {
        self.evaluator.evaluate(&self.representations)
    }

    /// Local time corrected by the resolved clock offset.
    pub fn server_now(&self, local_now: DateTime<Utc>) -> DateTime<Utc> {
        local_now + TimeDelta::milliseconds(self.elapsed_realtime_offset_ms)
    }

    /// Position a live track aims to play at, `None` for on-demand content.
    pub fn live_edge_target(&self, local_now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.manifest.dynamic {
            return None;
        }
        let suggested_delay = self
            .manifest
            .suggested_presentation_delay
            .and_then(|delay| TimeDelta::from_std(delay).ok())
            .unwrap_or_else(TimeDelta::zero);
        Some(
            self.server_now(local_now)
                - suggested_delay
                - TimeDelta::milliseconds(self.live_edge_latency_ms),
        )
    }
}

#[derive(Debug)]
pub struct TrackSource {
    chunk_source: ChunkSource,
    buffer: TrackBuffer,
    protection: Option<ProtectionSession>,
}

impl TrackSource {
    pub fn media_type(&self) -> MediaType {
        self.chunk_source.media_type()
    }

    pub fn chunk_source(&self) -> &ChunkSource {
        &self.chunk_source
    }

    pub fn buffer(&self) -> &TrackBuffer {
        &self.buffer
    }

    pub fn protection(&self) -> Option<&ProtectionSession> {
        self.protection.as_ref()
    }
}

/// The complete set published to the host. Never partial.
#[derive(Debug)]
pub struct TrackSources {
    pub video: TrackSource,
    pub audio: TrackSource,
}

pub struct TrackSourceFactory {
    pool: Arc<BufferPool>,
    meter: Arc<BandwidthMeter>,
    bandwidth_fraction: f64,
    initial_bitrate_estimate: u64,
}

impl TrackSourceFactory {
    /// Sizes the shared pool by the sum of the per-type budgets in `config`.
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_parts(
            Arc::new(BufferPool::new(
                config.buffer_segment_size,
                config.total_buffer_bytes(),
            )),
            Arc::new(BandwidthMeter::new()),
            config,
        )
    }

    pub fn with_parts(pool: Arc<BufferPool>, meter: Arc<BandwidthMeter>, config: &SessionConfig) -> Self {
        Self {
            pool,
            meter,
            bandwidth_fraction: config.bandwidth_fraction,
            initial_bitrate_estimate: config.initial_bitrate_estimate,
        }
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn bandwidth_meter(&self) -> &Arc<BandwidthMeter> {
        &self.meter
    }

    /// Builds the source for `media_type` from the first period of `manifest`.
    ///
    /// Adaptive sources switch across the representations of every matching
    /// adaptation set, other sources stay within the first one. The protection
    /// session is only attached when a chosen adaptation set is itself
    /// protected.
    #[allow(clippy::too_many_arguments)]
    pub fn build_source(
        &self,
        media_type: MediaType,
        manifest_client: &ManifestClient,
        manifest: Arc<Manifest>,
        policy: TrackSelectionPolicy,
        buffer_budget_bytes: usize,
        live_edge_latency_ms: i64,
        elapsed_realtime_offset_ms: i64,
        protection: Option<&ProtectionSession>,
    ) -> Result<TrackSource, BuildError> {
        let period = manifest.period(0).ok_or(BuildError::NoPeriodFound)?;
        let adaptation_sets: Vec<&AdaptationSet> = match policy {
            TrackSelectionPolicy::Adaptive => period.adaptation_sets_of(media_type).collect(),
            TrackSelectionPolicy::Default => period.adaptation_set(media_type).into_iter().collect(),
        };
        if adaptation_sets.is_empty() {
            return Err(BuildError::NoTrackFound(media_type));
        }

        let evaluator = match policy {
            TrackSelectionPolicy::Adaptive => FormatEvaluator::Adaptive(AdaptiveEvaluator::new(
                self.meter.clone(),
                self.bandwidth_fraction,
                self.initial_bitrate_estimate,
            )),
            TrackSelectionPolicy::Default => FormatEvaluator::Fixed,
        };
        let protection = protection
            .filter(|_| adaptation_sets.iter().any(|set| set.has_content_protection()))
            .cloned();
        let candidates: Vec<Representation> = adaptation_sets
            .iter()
            .flat_map(|set| set.representations.iter().cloned())
            .collect();
        let representations = selector::quality_ladder(&candidates);

        tracing::debug!(
            %media_type,
            adaptation_sets = ?adaptation_sets.iter().map(|set| set.id.as_deref()).collect::<Vec<_>>(),
            representations = representations.len(),
            buffer_budget_bytes,
            elapsed_realtime_offset_ms,
            protected = protection.is_some(),
            "Building track source"
        );

        Ok(TrackSource {
            chunk_source: ChunkSource {
                manifest_client: manifest_client.clone(),
                manifest,
                media_type,
                representations,
                evaluator,
                live_edge_latency_ms,
                elapsed_realtime_offset_ms,
            },
            buffer: TrackBuffer::new(self.pool.clone(), buffer_budget_bytes),
            protection,
        })
    }
}
