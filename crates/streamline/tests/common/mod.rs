#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use streamline::{
    clock::ClockSource,
    error::{BuildError, ClockError, ParseError, ProtectionError, TransportError},
    manifest::{
        client::ManifestTransport, parser::ManifestParser, AdaptationSet, ContentProtection,
        Manifest, MediaType, Period, Representation, UtcTiming,
    },
    protection::{
        KeySession, PlatformCapability, ProtectionProvider, StaticCapability,
        UnsupportedProvider, WIDEVINE_SCHEME_ID_URI,
    },
    track::TrackSources,
    Collaborators, Host, SessionConfig,
};
use tokio::{sync::Notify, time::Instant};
use url::Url;

pub const MANIFEST_URI: &str = "https://cdn.example.com/live/manifest.mpd";

pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("streamline=trace")
        .with_test_writer()
        .try_init();
}

pub fn manifest_uri() -> Url {
    Url::parse(MANIFEST_URI).unwrap()
}

fn representation(id: &str, bandwidth: u64, height: Option<u64>) -> Representation {
    Representation {
        id: Some(id.to_string()),
        bandwidth: Some(bandwidth),
        width: height.map(|h| h * 16 / 9),
        height,
        codecs: None,
    }
}

pub fn video_set(protected: bool) -> AdaptationSet {
    if protected {
        protected_video_set(&[WIDEVINE_SCHEME_ID_URI])
    } else {
        protected_video_set(&[])
    }
}

/// Video set declaring `schemes`, in order.
pub fn protected_video_set(schemes: &[&str]) -> AdaptationSet {
    AdaptationSet {
        id: Some("video".to_string()),
        media_type: MediaType::Video,
        content_protection: schemes
            .iter()
            .map(|scheme| ContentProtection {
                scheme_id_uri: scheme.to_string(),
                value: None,
                default_kid: None,
            })
            .collect(),
        representations: vec![
            representation("v720", 2_400_000, Some(720)),
            representation("v360", 600_000, Some(360)),
        ],
    }
}

pub fn audio_set() -> AdaptationSet {
    AdaptationSet {
        id: Some("audio".to_string()),
        media_type: MediaType::Audio,
        content_protection: vec![],
        representations: vec![representation("a128", 128_000, None)],
    }
}

pub fn manifest(dynamic: bool, utc_timing: Option<UtcTiming>, sets: Vec<AdaptationSet>) -> Manifest {
    Manifest {
        location: manifest_uri(),
        dynamic,
        utc_timing,
        minimum_update_period: dynamic.then(|| Duration::from_secs(2)),
        suggested_presentation_delay: dynamic.then(|| Duration::from_secs(10)),
        periods: vec![Period {
            id: Some("p0".to_string()),
            start: Some(Duration::ZERO),
            adaptation_sets: sets,
        }],
    }
}

pub fn static_manifest() -> Manifest {
    manifest(false, None, vec![video_set(false), audio_set()])
}

pub fn xsdate_timing() -> UtcTiming {
    UtcTiming {
        scheme_id_uri: streamline::clock::SCHEME_HTTP_XSDATE.to_string(),
        value: Some("https://time.example.com/now".to_string()),
    }
}

/// Fails a fixed number of times, then serves bytes. Can be held back by a gate.
pub struct ScriptedTransport {
    failures: AtomicUsize,
    gate: Option<Arc<Notify>>,
    calls: Mutex<Vec<Instant>>,
}

impl ScriptedTransport {
    pub fn failing(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            failures: AtomicUsize::new(failures),
            gate: None,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn ok() -> Arc<Self> {
        Self::failing(0)
    }

    pub fn gated(gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            failures: AtomicUsize::new(0),
            gate: Some(gate),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// When each fetch started.
    pub fn calls(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ManifestTransport for ScriptedTransport {
    async fn fetch(&self, _uri: &Url) -> Result<Bytes, TransportError> {
        self.calls.lock().unwrap().push(Instant::now());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok();
        if failed {
            return Err(TransportError::Other("connection refused".to_string()));
        }
        Ok(Bytes::from_static(b"<MPD/>"))
    }
}

/// Ignores the bytes and hands out the same manifest every time.
pub struct StaticParser(pub Manifest);

impl ManifestParser for StaticParser {
    fn parse(&self, _data: &[u8], _location: &Url) -> Result<Manifest, ParseError> {
        Ok(self.0.clone())
    }
}

pub struct FakeClock {
    offset: Option<i64>,
    gate: Option<Arc<Notify>>,
    calls: AtomicUsize,
}

impl FakeClock {
    pub fn offset(offset: i64) -> Arc<Self> {
        Arc::new(Self {
            offset: Some(offset),
            gate: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            offset: None,
            gate: None,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn gated(offset: i64, gate: Arc<Notify>) -> Arc<Self> {
        Arc::new(Self {
            offset: Some(offset),
            gate: Some(gate),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClockSource for FakeClock {
    async fn resolve(&self, timing: &UtcTiming, _reference: DateTime<Utc>) -> Result<i64, ClockError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.offset
            .ok_or_else(|| ClockError::UnsupportedScheme(timing.scheme_id_uri.clone()))
    }
}

#[derive(Default)]
pub struct RecordingHost {
    sources: Mutex<Vec<TrackSources>>,
    errors: Mutex<Vec<BuildError>>,
}

impl RecordingHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn ready_count(&self) -> usize {
        self.sources.lock().unwrap().len()
    }

    pub fn take_sources(&self) -> Option<TrackSources> {
        self.sources.lock().unwrap().pop()
    }

    pub fn errors(&self) -> Vec<BuildError> {
        self.errors.lock().unwrap().clone()
    }
}

impl Host for RecordingHost {
    fn on_sources_ready(&self, sources: TrackSources) {
        self.sources.lock().unwrap().push(sources);
    }

    fn on_build_error(&self, error: &BuildError) {
        self.errors.lock().unwrap().push(error.clone());
    }
}

struct FakeKeySession {
    scheme: String,
    releases: Arc<AtomicUsize>,
}

impl KeySession for FakeKeySession {
    fn scheme(&self) -> &str {
        &self.scheme
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeProvider {
    pub fail: bool,
    pub created: AtomicUsize,
    pub releases: Arc<AtomicUsize>,
}

impl ProtectionProvider for FakeProvider {
    fn create_session(&self, scheme: &str) -> Result<Box<dyn KeySession>, ProtectionError> {
        if self.fail {
            return Err(ProtectionError::SessionCreation("license server unreachable".to_string()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeKeySession {
            scheme: scheme.to_string(),
            releases: self.releases.clone(),
        }))
    }
}

pub fn collaborators(
    transport: Arc<dyn ManifestTransport>,
    manifest: Manifest,
    clock: Arc<dyn ClockSource>,
) -> Collaborators {
    Collaborators {
        transport,
        parser: Arc::new(StaticParser(manifest)),
        clock,
        capability: Arc::new(StaticCapability::none()),
        protection: Arc::new(UnsupportedProvider),
    }
}

pub fn widevine_platform() -> Arc<dyn PlatformCapability> {
    Arc::new(StaticCapability::new([WIDEVINE_SCHEME_ID_URI]))
}

pub fn config() -> SessionConfig {
    SessionConfig::default()
}
