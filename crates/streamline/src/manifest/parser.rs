use dash_mpd::MPD;
use url::Url;

use super::{AdaptationSet, ContentProtection, Manifest, MediaType, Period, Representation, UtcTiming};
use crate::error::ParseError;

pub trait ManifestParser: Send + Sync {
    fn parse(&self, data: &[u8], location: &Url) -> Result<Manifest, ParseError>;
}

/// Parses MPEG-DASH MPD documents with `dash-mpd`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MpdParser;

impl ManifestParser for MpdParser {
    fn parse(&self, data: &[u8], location: &Url) -> Result<Manifest, ParseError> {
        let text = std::str::from_utf8(data)?;
        let mpd = dash_mpd::parse(text)?;
        Ok(from_mpd(mpd, location))
    }
}

fn from_mpd(mpd: MPD, location: &Url) -> Manifest {
    let dynamic = mpd.mpdtype.as_deref() == Some("dynamic");
    if mpd.UTCTiming.len() > 1 {
        tracing::debug!(
            count = mpd.UTCTiming.len(),
            "Multiple UTCTiming elements declared, using the first one"
        );
    }

    Manifest {
        location: location.clone(),
        dynamic,
        utc_timing: mpd.UTCTiming.into_iter().next().map(|timing| UtcTiming {
            scheme_id_uri: timing.schemeIdUri,
            value: timing.value,
        }),
        minimum_update_period: mpd.minimumUpdatePeriod,
        suggested_presentation_delay: mpd.suggestedPresentationDelay,
        periods: mpd.periods.into_iter().map(from_period).collect(),
    }
}

fn from_period(period: dash_mpd::Period) -> Period {
    Period {
        id: period.id,
        start: period.start,
        adaptation_sets: period
            .adaptations
            .into_iter()
            .map(from_adaptation_set)
            .collect(),
    }
}

fn from_adaptation_set(set: dash_mpd::AdaptationSet) -> AdaptationSet {
    let media_type = match MediaType::from_content_type(set.contentType.as_deref()) {
        MediaType::Unknown => match MediaType::from_mime_type(set.mimeType.as_deref()) {
            MediaType::Unknown => MediaType::from_mime_type(
                set.representations
                    .first()
                    .and_then(|r| r.mimeType.as_deref()),
            ),
            known => known,
        },
        known => known,
    };

    let mut content_protection: Vec<ContentProtection> = set
        .ContentProtection
        .iter()
        .map(from_content_protection)
        .collect();
    // Representation-level protection counts for the whole set.
    for representation in set.representations.iter() {
        for protection in representation.ContentProtection.iter() {
            let protection = from_content_protection(protection);
            if !content_protection.contains(&protection) {
                content_protection.push(protection);
            }
        }
    }

    AdaptationSet {
        id: set.id,
        media_type,
        content_protection,
        representations: set
            .representations
            .into_iter()
            .map(|r| Representation {
                id: r.id,
                bandwidth: r.bandwidth,
                width: r.width,
                height: r.height,
                codecs: r.codecs,
            })
            .collect(),
    }
}

fn from_content_protection(protection: &dash_mpd::ContentProtection) -> ContentProtection {
    ContentProtection {
        scheme_id_uri: protection.schemeIdUri.to_ascii_lowercase(),
        value: protection.value.clone(),
        default_kid: protection.default_KID.clone(),
    }
}
