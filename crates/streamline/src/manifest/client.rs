use std::{
    fmt,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;
use tokio::task::JoinHandle;
use url::Url;

use super::{parser::ManifestParser, Manifest};
use crate::{
    error::{FetchError, TransportError},
    http::HttpClient,
};

const DASH_ACCEPT: &str = "application/dash+xml,video/vnd.mpeg.dash.mpd";

/// Moves manifest bytes from somewhere to here.
#[async_trait]
pub trait ManifestTransport: Send + Sync {
    async fn fetch(&self, uri: &Url) -> Result<Bytes, TransportError>;
}

/// Plain HTTP GET through the shared [`HttpClient`].
#[derive(Clone)]
pub struct HttpManifestTransport {
    client: HttpClient,
}

impl HttpManifestTransport {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ManifestTransport for HttpManifestTransport {
    async fn fetch(&self, uri: &Url) -> Result<Bytes, TransportError> {
        let response = self
            .client
            .get(uri.clone())
            .header(ACCEPT, DASH_ACCEPT)
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            if let Ok(body) = response.text().await {
                tracing::warn!(%uri, "Error body: {body}");
            }
            return Err(TransportError::HttpError(status));
        }

        Ok(response.bytes().await?)
    }
}

/// Outcome of a single manifest load.
#[derive(Debug)]
pub struct ManifestLoad {
    pub result: Result<Manifest, FetchError>,
    /// When the load finished, successful or not.
    pub completed_at: DateTime<Utc>,
}

/// Loads the manifest at one URI. Retrying is the caller's business.
#[derive(Clone)]
pub struct ManifestClient {
    uri: Url,
    transport: Arc<dyn ManifestTransport>,
    parser: Arc<dyn ManifestParser>,
    /// Milliseconds since epoch of the last completed load, `i64::MIN` if none.
    load_complete_timestamp: Arc<AtomicI64>,
}

impl ManifestClient {
    pub fn new(
        uri: Url,
        transport: Arc<dyn ManifestTransport>,
        parser: Arc<dyn ManifestParser>,
    ) -> Self {
        Self {
            uri,
            transport,
            parser,
            load_complete_timestamp: Arc::new(AtomicI64::new(i64::MIN)),
        }
    }

    pub fn uri(&self) -> &Url {
        &self.uri
    }

    /// Fetches and parses the manifest once.
    pub async fn load(&self) -> ManifestLoad {
        tracing::debug!(uri = %self.uri, "Fetching manifest");
        let result = match self.transport.fetch(&self.uri).await {
            Ok(data) => self
                .parser
                .parse(&data, &self.uri)
                .map_err(FetchError::from),
            Err(e) => Err(e.into()),
        };

        let completed_at = Utc::now();
        self.load_complete_timestamp
            .store(completed_at.timestamp_millis(), Ordering::Release);

        ManifestLoad {
            result,
            completed_at,
        }
    }

    /// Starts a load in the background and hands the outcome to `callback`.
    ///
    /// Nothing prevents two loads from overlapping; callers that care must
    /// track the in-flight load themselves.
    pub fn fetch_once<F>(&self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(ManifestLoad) + Send + 'static,
    {
        let client = self.clone();
        tokio::spawn(async move {
            let load = client.load().await;
            callback(load);
        })
    }

    pub fn load_complete_timestamp(&self) -> Option<DateTime<Utc>> {
        match self.load_complete_timestamp.load(Ordering::Acquire) {
            i64::MIN => None,
            millis => DateTime::from_timestamp_millis(millis),
        }
    }
}

impl fmt::Debug for ManifestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManifestClient")
            .field("uri", &self.uri.as_str())
            .finish_non_exhaustive()
    }
}
