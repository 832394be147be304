//! JSON API client with persisted session cookies.

use std::{collections::BTreeSet, sync::Arc, sync::Mutex};

use bytes::Bytes;
use reqwest::{
    header::{HeaderMap, COOKIE, SET_COOKIE},
    Client, Method, RequestBuilder, StatusCode,
};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use url::Url;

pub const LOGIN_PATH: &str = "api/users/login";

#[derive(Error, Debug)]
pub enum RestError {
    #[error(transparent)]
    Request(#[from] reqwest::Error),

    #[error("HTTP error: {0}")]
    Status(StatusCode),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Where session cookies survive between requests, and between runs.
pub trait CookiePersistence: Send + Sync {
    fn load(&self) -> BTreeSet<String>;

    /// Replaces every stored cookie with `cookies`.
    fn store(&self, cookies: BTreeSet<String>);

    fn clear(&self);
}

#[derive(Debug, Default)]
pub struct MemoryCookies(Mutex<BTreeSet<String>>);

impl CookiePersistence for MemoryCookies {
    fn load(&self) -> BTreeSet<String> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn store(&self, cookies: BTreeSet<String>) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = cookies;
    }

    fn clear(&self) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
    login_url: Url,
    cookies: Arc<dyn CookiePersistence>,
}

impl RestClient {
    pub fn new(base_url: &str, cookies: Arc<dyn CookiePersistence>) -> Result<Self, RestError> {
        Self::with_client(Client::builder().build()?, base_url, cookies)
    }

    pub fn with_client(
        client: Client,
        base_url: &str,
        cookies: Arc<dyn CookiePersistence>,
    ) -> Result<Self, RestError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let login_url = Url::parse(&format!("{base_url}/{LOGIN_PATH}"))?;

        Ok(Self {
            client,
            base_url,
            login_url,
            cookies,
        })
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, RestError> {
        Ok(Url::parse(&format!(
            "{}/{}",
            self.base_url,
            path.trim_start_matches('/')
        ))?)
    }

    pub async fn get_json<T>(&self, path: &str) -> Result<T, RestError>
    where
        T: DeserializeOwned,
    {
        let request = self.request(Method::GET, self.endpoint(path)?);
        let body = self.execute(request).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, RestError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(Method::POST, self.endpoint(path)?).json(body);
        let body = self.execute(request).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Attaches the persisted cookies. A login starts from an empty jar.
    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        if method == Method::POST && url == self.login_url {
            tracing::debug!("Login detected, clearing cookies");
            self.cookies.clear();
        }

        tracing::debug!(%method, %url, "Sending request");
        let mut request = self.client.request(method, url);
        let cookies = self.cookies.load();
        if !cookies.is_empty() {
            request = request.header(COOKIE, cookies.into_iter().collect::<Vec<_>>().join("; "));
        }
        request
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Bytes, RestError> {
        let response = request.send().await?;
        self.save_cookies(response.headers());

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            tracing::warn!(%status, body = %String::from_utf8_lossy(&body), "Request failed");
            return Err(RestError::Status(status));
        }
        Ok(body)
    }

    /// Any `Set-Cookie` header replaces the whole stored set, even when none
    /// of its values is usable.
    fn save_cookies(&self, headers: &HeaderMap) {
        let mut values = headers.get_all(SET_COOKIE).iter().peekable();
        if values.peek().is_none() {
            return;
        }

        let cookies: BTreeSet<String> = values
            .filter_map(|value| value.to_str().ok())
            .filter_map(cookie_pair)
            .collect();
        tracing::debug!(?cookies, "Cookies saved");
        self.cookies.store(cookies);
    }
}

/// `name=value` of a `Set-Cookie` header. Values without attributes are
/// not kept.
fn cookie_pair(header: &str) -> Option<String> {
    let (pair, _) = header.split_once(';')?;
    let pair = pair.trim();
    (!pair.is_empty()).then(|| pair.to_string())
}
