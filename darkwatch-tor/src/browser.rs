//! Headless browser fetcher
//!
//! Each fetch launches a fresh headless Chromium process with a throwaway
//! profile, dumps the rendered DOM and optionally captures a screenshot.
//! The browser runs in its own process group; the whole group is killed and
//! the profile removed on every exit path.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tempfile::TempDir;
use tokio::process::Command;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use crate::{
    extract_title, require_http_url, FetchError, FetchMode, FetchedPage, Fetcher, Route,
    TorConfig, USER_AGENT,
};

/// Browser binary used when none is configured
pub const DEFAULT_BROWSER: &str = "chromium";

const SCREENSHOT_WINDOW: &str = "--window-size=1280,1024";

/// Throwaway browser profile, removed when dropped
fn profile_dir() -> std::io::Result<TempDir> {
    tempfile::Builder::new().prefix("darkwatch-").tempdir()
}

/// SIGKILL every process left in group `pgid`
#[cfg(unix)]
async fn kill_process_group(pgid: u32) {
    let result = Command::new("kill")
        .args(["-s", "KILL", "--", &format!("-{}", pgid)])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;
    if let Err(e) = result {
        warn!("Failed to kill browser process group {}: {}", pgid, e);
    }
}

#[cfg(not(unix))]
async fn kill_process_group(_pgid: u32) {}

/// Fetcher that renders pages in headless Chromium
#[derive(Debug, Clone)]
pub struct BrowserFetcher {
    binary: PathBuf,
    prefix_args: Vec<String>,
    config: TorConfig,
}

impl BrowserFetcher {
    pub fn new(binary: impl Into<PathBuf>, config: TorConfig) -> Self {
        Self {
            binary: binary.into(),
            prefix_args: Vec::new(),
            config,
        }
    }

    /// Arguments placed before the browser flags, for launchers such as
    /// `xvfb-run` or `flatpak run`
    pub fn with_prefix_args(mut self, args: Vec<String>) -> Self {
        self.prefix_args = args;
        self
    }

    fn browser_args(&self, route: Route, profile: &Path) -> Vec<String> {
        let mut args = vec![
            "--headless=new".to_string(),
            "--disable-gpu".to_string(),
            "--ignore-certificate-errors".to_string(),
            "--no-first-run".to_string(),
            "--no-default-browser-check".to_string(),
            "--disable-extensions".to_string(),
            "--disable-background-networking".to_string(),
            format!("--user-agent={}", USER_AGENT),
            format!("--user-data-dir={}", profile.display()),
        ];

        if route == Route::Tor {
            args.push(format!("--proxy-server={}", self.config.browser_proxy()));
            // Keep DNS inside the proxy
            args.push("--host-resolver-rules=MAP * ~NOTFOUND , EXCLUDE 127.0.0.1".to_string());
        }

        args
    }

    /// Run one browser invocation, bounded by `deadline`
    async fn run(
        &self,
        url: &str,
        args: Vec<String>,
        deadline: Instant,
        limit_secs: u64,
    ) -> Result<Output, FetchError> {
        let mut command = Command::new(&self.binary);
        command
            .args(&self.prefix_args)
            .args(&args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn()?;
        let pgid = child.id();
        let remaining = deadline.saturating_duration_since(Instant::now());

        // On timeout the child is dropped with the future and killed; its
        // descendants (launcher children, renderer processes) go with the group.
        let result = timeout(remaining, child.wait_with_output()).await;
        if let Some(pgid) = pgid {
            kill_process_group(pgid).await;
        }

        match result {
            Ok(output) => Ok(output?),
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                secs: limit_secs,
            }),
        }
    }

    async fn capture_screenshot(
        &self,
        url: &str,
        route: Route,
        profile: &Path,
        deadline: Instant,
        limit_secs: u64,
    ) -> Result<Option<Vec<u8>>, FetchError> {
        let shot_path = profile.join("capture.png");
        let mut args = self.browser_args(route, profile);
        args.push(format!("--screenshot={}", shot_path.display()));
        args.push(SCREENSHOT_WINDOW.to_string());
        args.push("--hide-scrollbars".to_string());

        let output = self.run(url, args, deadline, limit_secs).await?;
        if !output.status.success() {
            warn!("Screenshot of {} failed: {}", url, stderr_tail(&output));
            return Ok(None);
        }

        match tokio::fs::read(&shot_path).await {
            Ok(bytes) if !bytes.is_empty() => Ok(Some(bytes)),
            Ok(_) => Ok(None),
            Err(e) => {
                debug!("No screenshot written for {}: {}", url, e);
                Ok(None)
            }
        }
    }
}

impl Default for BrowserFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_BROWSER, TorConfig::from_env())
    }
}

fn stderr_tail(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .map(|l| l.trim().to_string())
        .unwrap_or_else(|| format!("exit status {}", output.status))
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    async fn fetch(&self, url: &str, mode: FetchMode) -> Result<FetchedPage, FetchError> {
        require_http_url(url)?;

        let route = Route::for_url(url);
        let limit = self.config.timeout_for(route);
        let deadline = Instant::now() + limit;
        let profile = profile_dir()?;

        match route {
            Route::Tor => info!("Tor route active for {}", url),
            Route::Direct => info!("Direct route for {}", url),
        }

        let args = {
            let mut args = self.browser_args(route, profile.path());
            args.push("--dump-dom".to_string());
            args
        };
        let output = self.run(url, args, deadline, limit.as_secs()).await?;

        if !output.status.success() {
            return Err(FetchError::Navigation {
                url: url.to_string(),
                reason: stderr_tail(&output),
            });
        }

        let html = String::from_utf8_lossy(&output.stdout).into_owned();
        if html.trim().is_empty() {
            return Err(FetchError::Navigation {
                url: url.to_string(),
                reason: "empty document".to_string(),
            });
        }

        let title = extract_title(&html);
        let screenshot = match mode {
            FetchMode::Full => {
                self.capture_screenshot(url, route, profile.path(), deadline, limit.as_secs())
                    .await?
            }
            FetchMode::ContentOnly => None,
        };

        debug!("Rendered {} bytes from {}", html.len(), url);

        Ok(FetchedPage {
            url: url.to_string(),
            title,
            html,
            screenshot,
        })
    }
}
