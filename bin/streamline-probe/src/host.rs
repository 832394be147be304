use chrono::Utc;
use streamline::{
    error::{BuildError, ProtectionError},
    protection::{KeySession, ProtectionProvider},
    track::{TrackSource, TrackSources},
    Host,
};

/// Reports what playback would start with instead of playing it.
pub struct LoggingHost;

impl LoggingHost {
    fn describe(source: &TrackSource) {
        let chunks = source.chunk_source();
        let selected = chunks.select_representation();
        tracing::info!(
            media_type = %source.media_type(),
            representations = chunks.representations().len(),
            selected = ?selected.and_then(|r| r.id.as_deref()),
            bandwidth = ?selected.and_then(|r| r.bandwidth),
            adaptive = chunks.is_adaptive(),
            buffer_budget = source.buffer().budget(),
            protection = ?source.protection().map(|p| p.scheme()),
            "Track ready"
        );
        if let Some(target) = chunks.live_edge_target(Utc::now()) {
            tracing::info!(
                media_type = %source.media_type(),
                elapsed_realtime_offset_ms = chunks.elapsed_realtime_offset_ms(),
                live_edge_target = %target,
                "Live edge"
            );
        }
    }
}

impl Host for LoggingHost {
    fn on_sources_ready(&self, sources: TrackSources) {
        Self::describe(&sources.video);
        Self::describe(&sources.audio);
    }

    fn on_build_error(&self, error: &BuildError) {
        tracing::error!(error = %error, "Unable to start playback");
    }
}

/// Accepts every scheme it is told about. Keys are never requested.
pub struct DeferredLicenseProvider {
    schemes: Vec<String>,
}

impl DeferredLicenseProvider {
    pub fn new(schemes: Vec<String>) -> Self {
        Self { schemes }
    }
}

impl ProtectionProvider for DeferredLicenseProvider {
    fn create_session(&self, scheme: &str) -> Result<Box<dyn KeySession>, ProtectionError> {
        if !self.schemes.iter().any(|s| s.eq_ignore_ascii_case(scheme)) {
            return Err(ProtectionError::UnsupportedScheme(scheme.to_string()));
        }
        tracing::info!(scheme, "License acquisition deferred until playback");
        Ok(Box::new(DeferredSession {
            scheme: scheme.to_string(),
        }))
    }
}

struct DeferredSession {
    scheme: String,
}

impl KeySession for DeferredSession {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    fn release(&self) {
        tracing::debug!(scheme = %self.scheme, "Key session released");
    }
}
