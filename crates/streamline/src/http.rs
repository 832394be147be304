use std::{ops::Deref, sync::Arc};

use reqwest::{Client, ClientBuilder};
use reqwest_cookie_store::{CookieStore, CookieStoreMutex};
use url::Url;

/// A cloneable reqwest client whose cookie jar is shared by every clone, so
/// cookies set while fetching a manifest are sent with the timing request.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    cookies_store: Arc<CookieStoreMutex>,
}

impl HttpClient {
    pub fn new(builder: ClientBuilder) -> reqwest::Result<Self> {
        let cookies_store = Arc::new(CookieStoreMutex::new(CookieStore::default()));
        let client = builder.cookie_provider(cookies_store.clone()).build()?;

        Ok(Self {
            client,
            cookies_store,
        })
    }

    pub fn with_defaults() -> reqwest::Result<Self> {
        Self::new(Client::builder())
    }

    /// Seeds the jar with raw `Set-Cookie` style strings scoped to `url`.
    pub fn add_cookies(&self, cookies: Vec<String>, url: &Url) {
        let Ok(mut lock) = self.cookies_store.lock() else {
            tracing::warn!("Cookie store lock poisoned, cookies ignored");
            return;
        };
        for cookie in cookies {
            if let Err(e) = lock.parse(&cookie, url) {
                tracing::warn!(%url, error = %e, "Invalid cookie ignored");
            }
        }
    }

    pub fn cookie_count(&self) -> usize {
        self.cookies_store
            .lock()
            .map(|store| store.iter_unexpired().count())
            .unwrap_or_default()
    }
}

impl Deref for HttpClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}
