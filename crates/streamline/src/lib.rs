//! Streaming session core.
//!
//! ```text
//! ┌──────────────────┐  fetch / retry every 5s   ┌──────────────────┐
//! │                  ├──────────────────────────►│                  │
//! │                  │                           │  ManifestClient  │
//! │                  │◄──────────────────────────┤                  │
//! │                  │     ManifestLoaded        └──────────────────┘
//! │                  │
//! │                  │  dynamic + UtcTiming      ┌──────────────────┐
//! │                  ├──────────────────────────►│                  │
//! │     Session      │                           │  ClockResolver   │
//! │  [MPSC events]   │◄──────────────────────────┤                  │
//! │                  │     TimingResolved        └──────────────────┘
//! │                  │
//! │                  │  period 0                 ┌──────────────────┐
//! │                  ├──────────────────────────►│ ProtectionGate + │
//! │                  │                           │ TrackSource-     │
//! │                  │◄──────────────────────────┤ Factory          │
//! └────────┬─────────┘   TrackSources / error    └──────────────────┘
//!          │
//!          ▼
//!        Host
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod http;
pub mod manifest;
pub mod protection;
pub mod rest;
pub mod session;
pub mod track;

pub use config::SessionConfig;
pub use error::{StreamlineError, StreamlineResult};
pub use http::HttpClient;
pub use session::{Collaborators, Host, SessionHandle, SessionOrchestrator, SessionPhase};
