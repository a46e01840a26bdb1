//! Tor SOCKS5h routing
//!
//! Hidden service URLs go through the Tor SOCKS proxy with a long deadline;
//! everything else is fetched directly with a shorter one.

use reqwest::{Client, Proxy};
use std::time::Duration;

use darkwatch_core::is_onion_url;

use crate::FetchError;

/// Environment variable holding the SOCKS proxy address
pub const TOR_PROXY_ENV: &str = "TOR_PROXY";

/// Proxy used when `TOR_PROXY` is unset
pub const DEFAULT_SOCKS_ADDR: &str = "socks5h://127.0.0.1:9050";

/// Fixed user agent presented by every fetch
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/135.0.0.0 Safari/537.36";

/// Tor proxy configuration
#[derive(Debug, Clone)]
pub struct TorConfig {
    /// SOCKS5 proxy address (default: socks5h://127.0.0.1:9050)
    pub socks_addr: String,
    /// Deadline for hidden service fetches in seconds
    pub onion_timeout_secs: u64,
    /// Deadline for clearnet fetches in seconds
    pub clearnet_timeout_secs: u64,
}

impl Default for TorConfig {
    fn default() -> Self {
        Self {
            socks_addr: DEFAULT_SOCKS_ADDR.to_string(),
            onion_timeout_secs: 90,
            clearnet_timeout_secs: 30,
        }
    }
}

impl TorConfig {
    /// Default config with the proxy address taken from `TOR_PROXY` if set
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var(TOR_PROXY_ENV) {
            if !addr.trim().is_empty() {
                config.socks_addr = addr.trim().to_string();
            }
        }
        config
    }

    pub fn with_socks_addr(mut self, addr: &str) -> Self {
        self.socks_addr = addr.to_string();
        self
    }

    pub fn timeout_for(&self, route: Route) -> Duration {
        match route {
            Route::Tor => Duration::from_secs(self.onion_timeout_secs),
            Route::Direct => Duration::from_secs(self.clearnet_timeout_secs),
        }
    }

    /// Proxy address in the form a browser `--proxy-server` flag accepts.
    ///
    /// Chromium resolves hostnames through a SOCKS5 proxy by itself and does
    /// not understand the `socks5h` scheme.
    pub fn browser_proxy(&self) -> String {
        match self.socks_addr.strip_prefix("socks5h://") {
            Some(rest) => format!("socks5://{}", rest),
            None => self.socks_addr.clone(),
        }
    }
}

/// Network path chosen for a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Tor,
    Direct,
}

impl Route {
    pub fn for_url(url: &str) -> Self {
        if is_onion_url(url) {
            Route::Tor
        } else {
            Route::Direct
        }
    }
}

/// Create an HTTP client for `route`
pub fn create_client(config: &TorConfig, route: Route) -> Result<Client, FetchError> {
    let mut builder = Client::builder()
        .timeout(config.timeout_for(route))
        .user_agent(USER_AGENT)
        .danger_accept_invalid_certs(true); // Many .onion sites have self-signed certs

    if route == Route::Tor {
        let proxy = Proxy::all(&config.socks_addr)
            .map_err(|e| FetchError::ClientBuild(e.to_string()))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| FetchError::ClientBuild(e.to_string()))
}

/// Check if Tor proxy is reachable
pub async fn check_tor_connection(config: &TorConfig) -> Result<bool, FetchError> {
    let client = create_client(config, Route::Tor)?;

    // Tor Project's own hidden service
    let result = client
        .get("http://2gzyxa5ihm7nsggfxnu52rck2vv4rvmdlkiu3ber7fzs2xqxczfebsid.onion/")
        .send()
        .await;

    match result {
        Ok(resp) => Ok(resp.status().is_success() || resp.status().is_redirection()),
        Err(_) => Ok(false),
    }
}
