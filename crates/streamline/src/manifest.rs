//! Streaming manifest model and the client that loads it.
//!
//! It keeps only what a session needs to decide how to start playback.
//!
//! ```text
//! Manifest ── dynamic, UtcTiming?
//!   └─ Period*
//!        └─ AdaptationSet+ ── MediaType, ContentProtection*
//!             └─ Representation*
//! ```
//!
//! [`client::ManifestClient`] loads one of these from a URI through a
//! [`client::ManifestTransport`] and a [`parser::ManifestParser`].

pub mod client;
pub mod parser;

use std::{fmt, time::Duration};

use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Video,
    Audio,
    Text,
    Unknown,
}

impl MediaType {
    pub fn from_mime_type(mime_type: Option<&str>) -> Self {
        match mime_type {
            Some(mime) if mime.starts_with("video") => Self::Video,
            Some(mime) if mime.starts_with("audio") => Self::Audio,
            Some(mime) if mime.starts_with("text") || mime == "application/ttml+xml" => Self::Text,
            _ => Self::Unknown,
        }
    }

    pub fn from_content_type(content_type: Option<&str>) -> Self {
        match content_type {
            Some("video") => Self::Video,
            Some("audio") => Self::Audio,
            Some("text") => Self::Text,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Text => "text",
            Self::Unknown => "unknown",
        })
    }
}

/// A clock synchronisation source declared by the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtcTiming {
    pub scheme_id_uri: String,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentProtection {
    pub scheme_id_uri: String,
    pub value: Option<String>,
    pub default_kid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Representation {
    pub id: Option<String>,
    pub bandwidth: Option<u64>,
    pub width: Option<u64>,
    pub height: Option<u64>,
    pub codecs: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptationSet {
    pub id: Option<String>,
    pub media_type: MediaType,
    /// Protection declared on the set itself or on any of its representations.
    pub content_protection: Vec<ContentProtection>,
    pub representations: Vec<Representation>,
}

impl AdaptationSet {
    pub fn has_content_protection(&self) -> bool {
        !self.content_protection.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Period {
    pub id: Option<String>,
    pub start: Option<Duration>,
    pub adaptation_sets: Vec<AdaptationSet>,
}

impl Period {
    /// First adaptation set carrying `media_type`.
    pub fn adaptation_set(&self, media_type: MediaType) -> Option<&AdaptationSet> {
        self.adaptation_sets_of(media_type).next()
    }

    pub fn adaptation_sets_of(
        &self,
        media_type: MediaType,
    ) -> impl Iterator<Item = &AdaptationSet> + '_ {
        self.adaptation_sets
            .iter()
            .filter(move |set| set.media_type == media_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    /// Where the manifest was loaded from.
    pub location: Url,
    /// `true` for live presentations whose manifest changes over time.
    pub dynamic: bool,
    pub utc_timing: Option<UtcTiming>,
    pub minimum_update_period: Option<Duration>,
    pub suggested_presentation_delay: Option<Duration>,
    pub periods: Vec<Period>,
}

impl Manifest {
    pub fn period(&self, index: usize) -> Option<&Period> {
        self.periods.get(index)
    }

    /// Live manifests with a timing source need the remote clock before playback.
    pub fn requires_clock_sync(&self) -> bool {
        self.dynamic && self.utc_timing.is_some()
    }
}
