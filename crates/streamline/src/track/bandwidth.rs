use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::manifest::Representation;

/// Weight of the newest sample in the moving average.
const SAMPLE_WEIGHT: f64 = 0.3;

/// Session-wide throughput estimate, fed by every chunk transfer.
#[derive(Debug, Default)]
pub struct BandwidthMeter {
    /// Bits per second, 0 until the first sample.
    estimate: AtomicU64,
}

impl BandwidthMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_transfer(&self, bytes: u64, elapsed: Duration) {
        let micros = elapsed.as_micros();
        if micros == 0 {
            return;
        }
        let sample = ((bytes as u128 * 8 * 1_000_000) / micros).clamp(1, u64::MAX as u128) as u64;

        _ = self
            .estimate
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(if current == 0 {
                    sample
                } else {
                    (current as f64 * (1.0 - SAMPLE_WEIGHT) + sample as f64 * SAMPLE_WEIGHT) as u64
                })
            });
        tracing::trace!(bytes, ?elapsed, estimate = self.bitrate_estimate(), "Transfer recorded");
    }

    pub fn bitrate_estimate(&self) -> Option<u64> {
        match self.estimate.load(Ordering::Acquire) {
            0 => None,
            estimate => Some(estimate),
        }
    }
}

/// Decides which representation a chunk source requests next.
#[derive(Debug, Clone)]
pub enum FormatEvaluator {
    Adaptive(AdaptiveEvaluator),
    /// Always the best representation.
    Fixed,
}

impl FormatEvaluator {
    /// `representations` must be sorted from lowest to highest quality.
    pub fn evaluate<'a>(&self, representations: &'a [Representation]) -> Option<&'a Representation> {
        match self {
            Self::Adaptive(evaluator) => evaluator.evaluate(representations),
            Self::Fixed => representations.last(),
        }
    }

    pub fn is_adaptive(&self) -> bool {
        matches!(self, Self::Adaptive(_))
    }
}

#[derive(Debug, Clone)]
pub struct AdaptiveEvaluator {
    meter: Arc<BandwidthMeter>,
    bandwidth_fraction: f64,
    initial_bitrate_estimate: u64,
}

impl AdaptiveEvaluator {
    pub fn new(meter: Arc<BandwidthMeter>, bandwidth_fraction: f64, initial_bitrate_estimate: u64) -> Self {
        Self {
            meter,
            bandwidth_fraction,
            initial_bitrate_estimate,
        }
    }

    /// Highest representation that fits the usable bandwidth, else the lowest one.
    pub fn evaluate<'a>(&self, representations: &'a [Representation]) -> Option<&'a Representation> {
        let estimate = self
            .meter
            .bitrate_estimate()
            .unwrap_or(self.initial_bitrate_estimate);
        let usable = (estimate as f64 * self.bandwidth_fraction) as u64;

        representations
            .iter()
            .rev()
            .find(|r| r.bandwidth.unwrap_or(0) <= usable)
            .or_else(|| representations.first())
    }
}
