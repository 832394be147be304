use std::{path::PathBuf, str::FromStr, time::Duration};

use anyhow::Context;
use fake_user_agent::get_chrome_rua;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue},
    ClientBuilder,
};
use streamline::{HttpClient, SessionConfig};

#[derive(clap::Parser, Debug, Clone)]
#[clap(version, about)]
pub struct ProbeArgs {
    /// Debug output
    #[clap(long, alias = "debug")]
    pub verbose: bool,

    /// Session config file in TOML. Flags below override its values.
    #[clap(short, long, env = "STREAMLINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Manifest retry interval in milliseconds
    #[clap(long, env = "STREAMLINE_RETRY_INTERVAL")]
    pub retry_interval: Option<u64>,

    /// Distance to keep from the live edge in milliseconds
    #[clap(long)]
    pub live_edge_latency: Option<i64>,

    /// Protection schemes the platform supports
    ///
    /// Scheme id URIs, eg. "urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed" for Widevine.
    /// Protected content is refused when none match.
    #[clap(long = "drm")]
    pub drm_schemes: Vec<String>,

    /// Cookies sent with every request
    #[clap(long)]
    pub cookies: Option<String>,

    /// HTTP Header sent with every request
    ///
    /// Custom header. eg. "User-Agent: xxxxx". This option will override --cookies.
    #[clap(short = 'H', long)]
    pub headers: Vec<String>,

    /// HTTP request timeout in seconds
    #[clap(long, default_value = "30")]
    pub timeout: u64,

    /// Give up after this many seconds if the session has not settled
    #[clap(long)]
    pub deadline: Option<u64>,

    /// Manifest URL
    pub url: String,
}

impl ProbeArgs {
    pub fn client(&self) -> anyhow::Result<HttpClient> {
        let mut headers = HeaderMap::new();
        if let Some(cookies) = &self.cookies {
            headers.insert(
                reqwest::header::COOKIE,
                HeaderValue::from_str(cookies).context("Invalid cookie")?,
            );
        }

        for header in &self.headers {
            let (key, value) = header
                .split_once(':')
                .with_context(|| format!("Invalid header: {header}"))?;
            headers.insert(
                HeaderName::from_str(key.trim()).context("Invalid header name")?,
                HeaderValue::from_str(value.trim()).context("Invalid header value")?,
            );
        }

        Ok(HttpClient::new(
            ClientBuilder::new()
                .default_headers(headers)
                .user_agent(get_chrome_rua())
                .timeout(Duration::from_secs(self.timeout)),
        )?)
    }

    pub fn session_config(&self) -> anyhow::Result<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                toml::from_str(&text)
                    .with_context(|| format!("Invalid config {}", path.display()))?
            }
            None => SessionConfig::default(),
        };

        if let Some(retry_interval) = self.retry_interval {
            config.manifest_retry_interval_ms = retry_interval;
        }
        if let Some(latency) = self.live_edge_latency {
            config.live_edge_latency_ms = latency;
        }
        config.validate().context("Invalid session config")?;
        Ok(config)
    }
}
