//! Session orchestration.
//!
//! ```text
//!            start()
//!               │
//!               ▼        fetch failed (retry timer, 5s)
//!      ┌─► AwaitingManifest ◄──────┐
//!      │        │   └──────────────┘
//!      │        │ fetched
//!      │        ├──── dynamic + UtcTiming ───► AwaitingTiming
//!      │        │                                   │ resolved / failed (offset 0)
//!      │        ▼                                   │
//!      │   BuildingSources ◄────────────────────────┘
//!      │        │
//!      │        ├── protection / track error ──► Failed
//!      │        ▼
//!      │      Ready
//!      │
//!  destroy() from anywhere ──► Destroyed
//! ```
//!
//! Every completion (manifest load, clock resolution, retry tick) is posted
//! to one queue and handled on the session task, one at a time. Once the
//! session is destroyed nothing left in the queue is looked at.

pub mod retry;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    clock::{ClockResolver, ClockSource, HttpClockSource},
    config::SessionConfig,
    error::{BuildError, ClockError, FetchError, StreamlineResult},
    http::HttpClient,
    manifest::{
        client::{HttpManifestTransport, ManifestClient, ManifestLoad, ManifestTransport},
        parser::{ManifestParser, MpdParser},
        Manifest, MediaType,
    },
    protection::{
        ContentProtectionGate, PlatformCapability, ProtectionProvider, ProtectionSession,
        StaticCapability, UnsupportedProvider,
    },
    track::{TrackSelectionPolicy, TrackSourceFactory, TrackSources},
};
use retry::RetryTimer;

/// The player the session publishes to.
pub trait Host: Send + Sync {
    /// Called at most once per build pass, with both tracks.
    fn on_sources_ready(&self, sources: TrackSources);

    fn on_build_error(&self, error: &BuildError);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    AwaitingManifest,
    AwaitingTiming,
    BuildingSources,
    Ready,
    Failed,
    Destroyed,
}

impl SessionPhase {
    /// No further progress happens without outside help.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed | Self::Destroyed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub manifest: Option<Arc<Manifest>>,
    /// Set while no manifest has been received since the last failure.
    pub require_manifest: bool,
    pub elapsed_realtime_offset_ms: i64,
    /// Only ever `true` while `require_manifest` is.
    pub retry_timer_active: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            manifest: None,
            require_manifest: true,
            elapsed_realtime_offset_ms: 0,
            retry_timer_active: false,
        }
    }
}

/// Capabilities the session calls into.
#[derive(Clone)]
pub struct Collaborators {
    pub transport: Arc<dyn ManifestTransport>,
    pub parser: Arc<dyn ManifestParser>,
    pub clock: Arc<dyn ClockSource>,
    pub capability: Arc<dyn PlatformCapability>,
    pub protection: Arc<dyn ProtectionProvider>,
}

impl Collaborators {
    /// HTTP manifest transport, MPD parser and HTTP clock over one client.
    /// Protected content is refused until [`Collaborators::with_protection`].
    pub fn http(client: HttpClient) -> Self {
        Self {
            transport: Arc::new(HttpManifestTransport::new(client.clone())),
            parser: Arc::new(MpdParser),
            clock: Arc::new(HttpClockSource::new(client)),
            capability: Arc::new(StaticCapability::none()),
            protection: Arc::new(UnsupportedProvider),
        }
    }

    pub fn with_protection(
        mut self,
        capability: Arc<dyn PlatformCapability>,
        protection: Arc<dyn ProtectionProvider>,
    ) -> Self {
        self.capability = capability;
        self.protection = protection;
        self
    }
}

#[derive(Debug)]
enum SessionEvent {
    ManifestLoaded(ManifestLoad),
    RetryTick,
    TimingResolved(Result<i64, ClockError>),
}

pub struct SessionOrchestrator {
    manifest_client: ManifestClient,
    clock_resolver: ClockResolver,
    gate: ContentProtectionGate,
    factory: TrackSourceFactory,
    host: Arc<dyn Host>,
    config: SessionConfig,

    state: SessionState,
    fetch_in_flight: bool,
    retry_timer: Option<RetryTimer>,
    protection: Option<ProtectionSession>,

    events: mpsc::UnboundedSender<SessionEvent>,
    receiver: mpsc::UnboundedReceiver<SessionEvent>,
    shutdown: CancellationToken,
    state_sender: watch::Sender<SessionState>,
}

impl SessionOrchestrator {
    pub fn new(
        uri: Url,
        collaborators: Collaborators,
        host: Arc<dyn Host>,
        config: SessionConfig,
    ) -> Self {
        let (events, receiver) = mpsc::unbounded_channel();
        let (state_sender, _) = watch::channel(SessionState::default());

        Self {
            manifest_client: ManifestClient::new(
                uri,
                collaborators.transport,
                collaborators.parser,
            ),
            clock_resolver: ClockResolver::new(collaborators.clock),
            gate: ContentProtectionGate::new(collaborators.capability, collaborators.protection),
            factory: TrackSourceFactory::new(&config),
            host,
            config,

            state: SessionState::default(),
            fetch_in_flight: false,
            retry_timer: None,
            protection: None,

            events,
            receiver,
            shutdown: CancellationToken::new(),
            state_sender,
        }
    }

    /// Fails on an unparsable `uri` or a `config` no session can run with.
    pub fn from_uri(
        uri: &str,
        collaborators: Collaborators,
        host: Arc<dyn Host>,
        config: SessionConfig,
    ) -> StreamlineResult<Self> {
        config.validate()?;
        Ok(Self::new(Url::parse(uri)?, collaborators, host, config))
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_sender.subscribe()
    }

    /// Runs the session on its own task. Dropping the returned handle
    /// destroys the session.
    pub fn spawn(self) -> SessionHandle {
        let handle = SessionHandle {
            shutdown: self.shutdown.clone(),
            state: self.state_sender.subscribe(),
        };
        tokio::spawn(self.run());
        handle
    }

    /// Drives the session until it is destroyed.
    pub async fn run(mut self) {
        let shutdown = self.shutdown.clone();
        self.start();

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = self.receiver.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    if shutdown.is_cancelled() {
                        break;
                    }
                    self.handle_event(event);
                }
            }
        }

        self.destroy();
    }

    fn start(&mut self) {
        tracing::info!(uri = %self.manifest_client.uri(), "Starting session");
        self.state.require_manifest = true;
        self.set_phase(SessionPhase::AwaitingManifest);
        self.fetch_manifest();
    }

    fn destroy(&mut self) {
        tracing::info!(uri = %self.manifest_client.uri(), "Destroying session");
        self.state.require_manifest = false;
        self.cancel_retry_timer();
        self.release_protection();
        self.set_phase(SessionPhase::Destroyed);
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::ManifestLoaded(load) => {
                self.fetch_in_flight = false;
                match load.result {
                    Ok(manifest) => self.on_manifest(manifest, load.completed_at),
                    Err(e) => self.on_manifest_error(e),
                }
            }
            SessionEvent::RetryTick => self.on_retry_tick(),
            SessionEvent::TimingResolved(result) => self.on_timing_resolved(result),
        }
        self.publish();
    }

    fn fetch_manifest(&mut self) {
        self.fetch_in_flight = true;
        let events = self.events.clone();
        self.manifest_client.fetch_once(move |load| {
            _ = events.send(SessionEvent::ManifestLoaded(load));
        });
    }

    fn on_manifest(&mut self, manifest: Manifest, completed_at: DateTime<Utc>) {
        tracing::info!(
            dynamic = manifest.dynamic,
            periods = manifest.periods.len(),
            "Received manifest"
        );
        self.state.require_manifest = false;
        self.cancel_retry_timer();

        if self.state.phase != SessionPhase::AwaitingManifest {
            tracing::debug!(phase = ?self.state.phase, "Manifest arrived after the session moved on, ignored");
            return;
        }

        let manifest = Arc::new(manifest);
        self.state.manifest = Some(manifest.clone());
        match manifest.utc_timing.clone().filter(|_| manifest.dynamic) {
            Some(timing) => {
                self.set_phase(SessionPhase::AwaitingTiming);
                let events = self.events.clone();
                self.clock_resolver.resolve(timing, completed_at, move |result| {
                    _ = events.send(SessionEvent::TimingResolved(result));
                });
            }
            None => self.build_sources(),
        }
    }

    fn on_manifest_error(&mut self, error: FetchError) {
        tracing::warn!(error = %error, "Failed to fetch manifest");

        if !self.state.require_manifest {
            // a manifest already arrived
            tracing::debug!("Cancelling manifest retry timer");
            self.cancel_retry_timer();
        } else if self.retry_timer.is_none() {
            let interval = self.config.manifest_retry_interval();
            tracing::info!(interval_ms = interval.as_millis() as u64, "Retrying manifest fetch periodically");
            let events = self.events.clone();
            self.retry_timer = Some(RetryTimer::start(
                interval,
                self.shutdown.child_token(),
                move || events.send(SessionEvent::RetryTick).is_ok(),
            ));
            self.state.retry_timer_active = true;
        }
        self.state.require_manifest = true;
    }

    fn on_retry_tick(&mut self) {
        if !self.state.require_manifest {
            tracing::debug!("Stale retry tick ignored");
            return;
        }
        if self.fetch_in_flight {
            tracing::debug!("Previous manifest fetch still in flight, skipping retry");
            return;
        }
        tracing::debug!("Getting manifest");
        self.fetch_manifest();
    }

    fn on_timing_resolved(&mut self, result: Result<i64, ClockError>) {
        if self.state.phase != SessionPhase::AwaitingTiming {
            tracing::debug!(phase = ?self.state.phase, "Unexpected timing result ignored");
            return;
        }

        self.state.elapsed_realtime_offset_ms = match result {
            Ok(offset) => offset,
            Err(e) => {
                tracing::error!(error = %e, "Failed to resolve UtcTiming element, trusting the device clock");
                0
            }
        };
        self.build_sources();
    }

    fn build_sources(&mut self) {
        tracing::debug!("Building track sources");
        self.set_phase(SessionPhase::BuildingSources);
        self.release_protection();

        match self.assemble_sources() {
            Ok(sources) => {
                tracing::info!(
                    elapsed_realtime_offset_ms = self.state.elapsed_realtime_offset_ms,
                    protected = self.protection.is_some(),
                    "Track sources ready"
                );
                self.host.on_sources_ready(sources);
                self.set_phase(SessionPhase::Ready);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to build track sources");
                self.release_protection();
                self.host.on_build_error(&e);
                self.set_phase(SessionPhase::Failed);
            }
        }
    }

    fn assemble_sources(&mut self) -> Result<TrackSources, BuildError> {
        let manifest = self
            .state
            .manifest
            .clone()
            .ok_or(BuildError::NoPeriodFound)?;
        let period = manifest.period(0).ok_or(BuildError::NoPeriodFound)?;

        let requirement = ContentProtectionGate::evaluate(period);
        self.protection = self.gate.build_session(&requirement)?;

        let offset = self.state.elapsed_realtime_offset_ms;
        let video = self.factory.build_source(
            MediaType::Video,
            &self.manifest_client,
            manifest.clone(),
            TrackSelectionPolicy::Adaptive,
            self.config.video_buffer_bytes(),
            self.config.live_edge_latency_ms,
            offset,
            self.protection.as_ref(),
        )?;
        let audio = self.factory.build_source(
            MediaType::Audio,
            &self.manifest_client,
            manifest,
            TrackSelectionPolicy::Default,
            self.config.audio_buffer_bytes(),
            self.config.live_edge_latency_ms,
            offset,
            self.protection.as_ref(),
        )?;

        Ok(TrackSources { video, audio })
    }

    fn cancel_retry_timer(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            timer.cancel();
        }
        self.state.retry_timer_active = false;
    }

    fn release_protection(&mut self) {
        if let Some(session) = self.protection.take() {
            session.release();
        }
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        if self.state.phase != phase {
            tracing::debug!(from = ?self.state.phase, to = ?phase, "Session phase changed");
        }
        self.state.phase = phase;
        self.publish();
    }

    fn publish(&self) {
        self.state_sender.send_replace(self.state.clone());
    }
}

/// Control over a spawned session. Dropping the handle destroys the session.
#[derive(Debug)]
pub struct SessionHandle {
    shutdown: CancellationToken,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// Stops the session. In-flight fetches finish but are never looked at.
    pub fn destroy(&self) {
        self.shutdown.cancel();
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.borrow().phase
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Waits until the session is ready, failed or destroyed.
    pub async fn settled(&mut self) -> SessionPhase {
        self.wait_for_phase(SessionPhase::is_settled).await
    }

    /// Waits until the session task has torn everything down.
    pub async fn destroyed(&mut self) {
        self.wait_for_phase(|phase| *phase == SessionPhase::Destroyed)
            .await;
    }

    async fn wait_for_phase(&mut self, predicate: impl Fn(&SessionPhase) -> bool) -> SessionPhase {
        match self.state.wait_for(|state| predicate(&state.phase)).await {
            Ok(state) => state.phase,
            // the session task is gone
            Err(_) => SessionPhase::Destroyed,
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
