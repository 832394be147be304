use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::task::JoinHandle;

use crate::{error::ClockError, http::HttpClient, manifest::UtcTiming};

pub const SCHEME_HTTP_XSDATE: &str = "urn:mpeg:dash:utc:http-xsdate:2014";
pub const SCHEME_HTTP_ISO: &str = "urn:mpeg:dash:utc:http-iso:2014";
pub const SCHEME_HTTP_HEAD: &str = "urn:mpeg:dash:utc:http-head:2014";
pub const SCHEME_DIRECT: &str = "urn:mpeg:dash:utc:direct:2014";
pub const SCHEME_HTTP_NTP: &str = "urn:mpeg:dash:utc:http-ntp:2014";
pub const SCHEME_NTP: &str = "urn:mpeg:dash:utc:ntp:2014";

/// Resolves how far the local clock is behind the remote one, in milliseconds.
#[async_trait]
pub trait ClockSource: Send + Sync {
    async fn resolve(
        &self,
        timing: &UtcTiming,
        reference: DateTime<Utc>,
    ) -> Result<i64, ClockError>;
}

/// Runs clock resolution off the caller's task.
#[derive(Clone)]
pub struct ClockResolver {
    source: Arc<dyn ClockSource>,
}

impl ClockResolver {
    pub fn new(source: Arc<dyn ClockSource>) -> Self {
        Self { source }
    }

    pub fn resolve<F>(&self, timing: UtcTiming, reference: DateTime<Utc>, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<i64, ClockError>) + Send + 'static,
    {
        let source = self.source.clone();
        tokio::spawn(async move {
            let result = source.resolve(&timing, reference).await;
            callback(result);
        })
    }
}

/// DASH `UTCTiming` over HTTP.
#[derive(Clone)]
pub struct HttpClockSource {
    client: HttpClient,
}

impl HttpClockSource {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    async fn fetch_iso(&self, url: &str) -> Result<i64, ClockError> {
        let before_request = Utc::now();
        let response = self.client.get(url).send().await?;
        let after_request = Utc::now();
        if !response.status().is_success() {
            tracing::warn!(url, status = %response.status(), "HTTP request for xsdate/iso8601 failed");
            return Err(ClockError::HttpError(response.status()));
        }

        let text = response.text().await?;
        let remote_now = parse_iso8601_response(text.trim())?;
        Ok(offset_millis(remote_now, before_request, after_request))
    }

    async fn fetch_head(&self, url: &str) -> Result<i64, ClockError> {
        let before_request = Utc::now();
        let response = self.client.head(url).send().await?;
        let after_request = Utc::now();
        if !response.status().is_success() {
            tracing::warn!(url, status = %response.status(), "HTTP HEAD request failed");
            return Err(ClockError::HttpError(response.status()));
        }

        let date = response
            .headers()
            .get(reqwest::header::DATE)
            .and_then(|value| value.to_str().ok())
            .ok_or(ClockError::MissingDateHeader)?;
        let remote_now = DateTime::parse_from_rfc2822(date)?.with_timezone(&Utc);
        Ok(offset_millis(remote_now, before_request, after_request))
    }
}

#[async_trait]
impl ClockSource for HttpClockSource {
    async fn resolve(
        &self,
        timing: &UtcTiming,
        reference: DateTime<Utc>,
    ) -> Result<i64, ClockError> {
        let scheme = timing.scheme_id_uri.as_str();
        tracing::debug!(scheme, value = %timing.value.as_deref().unwrap_or(""), "Attempting to sync time with scheme");

        let offset = match scheme {
            SCHEME_HTTP_XSDATE | SCHEME_HTTP_ISO => {
                let url = required_value(timing)?;
                self.fetch_iso(url).await?
            }
            SCHEME_HTTP_HEAD => {
                let url = required_value(timing)?;
                self.fetch_head(url).await?
            }
            SCHEME_DIRECT => {
                let value = required_value(timing)?;
                let remote_now = DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc);
                offset_millis(remote_now, reference, reference)
            }
            SCHEME_HTTP_NTP | SCHEME_NTP => {
                tracing::warn!(scheme, "NTP schemes are not supported");
                return Err(ClockError::UnsupportedScheme(scheme.to_string()));
            }
            others => {
                tracing::warn!(scheme = %others, "Unknown timing scheme");
                return Err(ClockError::UnsupportedScheme(others.to_string()));
            }
        };

        tracing::info!(offset_milliseconds = offset, "Clock offset resolved");
        Ok(offset)
    }
}

fn required_value(timing: &UtcTiming) -> Result<&str, ClockError> {
    timing
        .value
        .as_deref()
        .ok_or_else(|| ClockError::MissingValue(timing.scheme_id_uri.clone()))
}

fn parse_iso8601_response(response_text: &str) -> Result<DateTime<Utc>, ClockError> {
    Ok(DateTime::parse_from_rfc3339(response_text)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // xsdate servers sometimes answer without seconds fraction or offset
            DateTime::parse_from_str(response_text, "%Y-%m-%dT%H:%M:%SZ")
                .map(|dt| dt.with_timezone(&Utc))
        })
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(response_text, "%Y-%m-%dT%H:%M:%SZ")
                .map(|dt| dt.and_utc())
        })?)
}

/// Remote time at the midpoint of the request, compared with local time on response.
fn offset_millis(
    remote_now: DateTime<Utc>,
    before_request: DateTime<Utc>,
    after_request: DateTime<Utc>,
) -> i64 {
    let half_rtt = (after_request - before_request) / 2;
    let server_now = remote_now + half_rtt;
    let offset: TimeDelta = server_now - after_request;
    offset.num_milliseconds()
}
