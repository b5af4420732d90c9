//! The observed service: its capture port, accepted Host values and replay base URL.

use anyhow::{Context, Result, bail};
use std::time::Duration;
use url::Url;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    url: Url,
    /// `host[:port]` exactly as the URL spells it.
    authority: String,
    hostname: String,
    port: u16,
}

impl Target {
    pub fn parse(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).with_context(|| format!("Invalid target URL: {raw}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("Unsupported target scheme {:?}, expected http or https", url.scheme());
        }

        let hostname = url
            .host_str()
            .with_context(|| format!("Target URL has no host: {raw}"))?
            .to_string();
        let port = url
            .port_or_known_default()
            .with_context(|| format!("Target URL has no port: {raw}"))?;
        if url.port().is_none() {
            log::warn!("Target URL has no explicit port, capturing on default port {port}");
        }
        let authority = match url.port() {
            Some(port) => format!("{hostname}:{port}"),
            None => hostname.clone(),
        };

        Ok(Self {
            url,
            authority,
            hostname,
            port,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Whether a request carrying this Host header was meant for the target.
    pub fn matches_host(&self, host: &str) -> bool {
        host == self.authority
            || host == format!("localhost:{}", self.port)
            || host == format!("{}:{}", self.hostname, self.port)
    }

    /// Replay URL for a captured path (and query).
    pub fn tool_url(&self, request_target: &str) -> String {
        format!("{}{}", self.url.as_str().trim_end_matches('/'), request_target)
    }

    /// Fail fast when the target is not answering at all.
    pub async fn probe(&self) -> Result<()> {
        log::info!("Checking target server at {}", self.url);

        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        let response = client
            .head(self.url.clone())
            .send()
            .await
            .with_context(|| format!("Server not reachable: {}", self.url))?;

        log::info!("Target server response: {}", response.status());
        Ok(())
    }
}
