//! Content protection gating.
//!
//! A build pass may only continue when the first period either declares no
//! protection at all, or the platform supports one of the declared schemes
//! and a key session could be created for it.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::{
    error::{BuildError, ProtectionError},
    manifest::{MediaType, Period},
};

pub const WIDEVINE_SCHEME_ID_URI: &str = "urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed";
pub const PLAYREADY_SCHEME_ID_URI: &str = "urn:uuid:9a04f079-9840-4286-ab92-e65be0885f95";
pub const MP4_PROTECTION_SCHEME_ID_URI: &str = "urn:mpeg:dash:mp4protection:2011";

pub trait PlatformCapability: Send + Sync {
    fn supports_protection_scheme(&self, scheme: &str) -> bool;
}

/// A platform that supports a fixed list of schemes.
#[derive(Debug, Clone, Default)]
pub struct StaticCapability {
    schemes: Vec<String>,
}

impl StaticCapability {
    pub fn new<I, S>(schemes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            schemes: schemes
                .into_iter()
                .map(|s| s.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Supports nothing; protected content always fails the gate.
    pub fn none() -> Self {
        Self::default()
    }
}

impl PlatformCapability for StaticCapability {
    fn supports_protection_scheme(&self, scheme: &str) -> bool {
        self.schemes.iter().any(|s| s.eq_ignore_ascii_case(scheme))
    }
}

/// A live key session for one protection scheme.
pub trait KeySession: Send + Sync {
    fn scheme(&self) -> &str;

    /// Tears the session down. Called once by the owner.
    fn release(&self);
}

pub trait ProtectionProvider: Send + Sync {
    fn create_session(&self, scheme: &str) -> Result<Box<dyn KeySession>, ProtectionError>;
}

/// Refuses every scheme.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnsupportedProvider;

impl ProtectionProvider for UnsupportedProvider {
    fn create_session(&self, scheme: &str) -> Result<Box<dyn KeySession>, ProtectionError> {
        Err(ProtectionError::UnsupportedScheme(scheme.to_string()))
    }
}

/// Shared handle to a key session.
///
/// The session owner calls [`ProtectionSession::release`]; track sources only
/// keep clones of the handle around.
#[derive(Clone)]
pub struct ProtectionSession {
    inner: Arc<dyn KeySession>,
    released: Arc<AtomicBool>,
}

impl ProtectionSession {
    pub fn new(session: Box<dyn KeySession>) -> Self {
        Self {
            inner: Arc::from(session),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn scheme(&self) -> &str {
        self.inner.scheme()
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Releases the underlying session. Only the first call has any effect.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            tracing::debug!(scheme = self.scheme(), "Releasing protection session");
            self.inner.release();
        }
    }
}

impl fmt::Debug for ProtectionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectionSession")
            .field("scheme", &self.scheme())
            .field("released", &self.is_released())
            .finish()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectionRequirement {
    /// Lowercased scheme URIs declared by the protected sets, in manifest order.
    pub schemes: Vec<String>,
}

impl ProtectionRequirement {
    pub fn is_required(&self) -> bool {
        !self.schemes.is_empty()
    }

    /// DRM systems a session may be opened for, in manifest order.
    ///
    /// Only system-specific `urn:uuid:` schemes count. Content that only
    /// declares the generic `mp4protection` scheme gets Widevine.
    pub fn candidates(&self) -> Vec<&str> {
        if !self.is_required() {
            return vec![];
        }
        let systems: Vec<&str> = self
            .schemes
            .iter()
            .map(String::as_str)
            .filter(|s| s.starts_with("urn:uuid:"))
            .collect();
        if systems.is_empty() {
            vec![WIDEVINE_SCHEME_ID_URI]
        } else {
            systems
        }
    }
}

pub struct ContentProtectionGate {
    capability: Arc<dyn PlatformCapability>,
    provider: Arc<dyn ProtectionProvider>,
}

impl ContentProtectionGate {
    pub fn new(capability: Arc<dyn PlatformCapability>, provider: Arc<dyn ProtectionProvider>) -> Self {
        Self {
            capability,
            provider,
        }
    }

    /// ORs the protection of every adaptation set with a known media type.
    pub fn evaluate(period: &Period) -> ProtectionRequirement {
        let mut schemes: Vec<String> = Vec::new();
        for set in period
            .adaptation_sets
            .iter()
            .filter(|set| set.media_type != MediaType::Unknown)
        {
            for protection in set.content_protection.iter() {
                if !schemes.contains(&protection.scheme_id_uri) {
                    schemes.push(protection.scheme_id_uri.clone());
                }
            }
        }

        ProtectionRequirement { schemes }
    }

    /// Opens a key session when `requirement` asks for one, for the first
    /// candidate scheme the platform supports.
    pub fn build_session(
        &self,
        requirement: &ProtectionRequirement,
    ) -> Result<Option<ProtectionSession>, BuildError> {
        let candidates = requirement.candidates();
        let Some(first) = candidates.first() else {
            return Ok(None);
        };

        let Some(scheme) = candidates
            .iter()
            .copied()
            .find(|scheme| self.capability.supports_protection_scheme(scheme))
        else {
            tracing::error!(schemes = ?candidates, "Platform supports none of the protection schemes");
            return Err(BuildError::PlatformUnsupported(first.to_string()));
        };

        let session = self.provider.create_session(scheme).inspect_err(|e| {
            tracing::error!(scheme, error = %e, "Failed to create protection session");
        })?;
        tracing::info!(scheme, "Protection session created");
        Ok(Some(ProtectionSession::new(session)))
    }
}
