//! Headless browser rendering for client-rendered pages
//!
//! Contract: `render(url, user_agent) → Option<String>`. The browser
//! launches headless with an isolated profile directory and images
//! disabled, waits for domcontentloaded plus a short settle period,
//! and returns the rendered DOM. When no browser binary can be found
//! the session reports unavailable and the crawler proceeds without
//! it. The profile directory is deleted on close.

#[cfg(not(feature = "headless"))]
use crate::config::HeadlessConfig;
use std::path::PathBuf;

/// Locate a Chrome/Chromium binary for this platform
pub fn find_browser_binary(configured: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = configured {
        let path = PathBuf::from(path);
        return path.exists().then_some(path);
    }
    if let Ok(path) = std::env::var("DOCDEX_CHROME") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe",
            "C:\\Program Files (x86)\\Google\\Chrome\\Application\\chrome.exe",
        ]
    } else {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ]
    };
    candidates
        .iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

#[cfg(feature = "headless")]
mod session {
    use super::find_browser_binary;
    use crate::config::HeadlessConfig;
    use chromiumoxide::browser::{Browser, BrowserConfig};
    use futures::StreamExt;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Mutex;
    use tracing::{debug, info, warn};

    /// One browser process shared for an ingest session
    pub struct HeadlessSession {
        browser: Mutex<Browser>,
        handler: Mutex<Option<tokio::task::JoinHandle<()>>>,
        /// Removed on drop, taking the profile with it
        _profile: TempDir,
        timeout: Duration,
    }

    impl HeadlessSession {
        /// Launch a browser, or `None` when disabled or not installed
        pub async fn launch(config: &HeadlessConfig) -> Option<Self> {
            if !config.enabled {
                return None;
            }
            let binary = match find_browser_binary(config.chrome_path.as_deref()) {
                Some(binary) => binary,
                None => {
                    info!("no browser binary found, headless rendering disabled");
                    return None;
                }
            };
            let profile = TempDir::new().ok()?;

            let mut builder = BrowserConfig::builder()
                .chrome_executable(&binary)
                .user_data_dir(profile.path())
                .arg("--blink-settings=imagesEnabled=false")
                .arg("--disable-gpu")
                .arg("--disable-dev-shm-usage")
                .arg("--no-first-run")
                .arg("--disable-extensions");
            if let Some(proxy) = &config.proxy {
                builder = builder.arg(format!("--proxy-server={}", proxy));
            }
            let browser_config = builder.build().ok()?;

            let (browser, mut handler) = match Browser::launch(browser_config).await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "headless browser failed to launch");
                    return None;
                }
            };
            let handle = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if event.is_err() {
                        break;
                    }
                }
            });

            Some(Self {
                browser: Mutex::new(browser),
                handler: Mutex::new(Some(handle)),
                _profile: profile,
                timeout: Duration::from_secs(config.timeout),
            })
        }

        /// Render one page, best effort
        pub async fn render(&self, url: &str, user_agent: &str) -> Option<String> {
            let browser = self.browser.lock().await;
            let page = browser.new_page("about:blank").await.ok()?;
            let _ = page.set_user_agent(user_agent).await;

            let navigate = async {
                page.goto(url).await.ok()?;
                // domcontentloaded, then a short settle for hydration
                page.wait_for_navigation().await.ok()?;
                tokio::time::sleep(Duration::from_millis(500)).await;
                page.content().await.ok()
            };
            let html = match tokio::time::timeout(self.timeout, navigate).await {
                Ok(html) => html,
                Err(_) => {
                    debug!(url, "headless render timed out");
                    None
                }
            };
            let _ = page.close().await;
            html
        }

        /// Close the browser process; the profile dir dies with self
        pub async fn close(&self) {
            let mut browser = self.browser.lock().await;
            let _ = browser.close().await;
            if let Some(handle) = self.handler.lock().await.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(feature = "headless")]
pub use session::HeadlessSession;

/// Stub session when the `headless` feature is off: rendering is
/// unavailable and the crawler proceeds without it.
#[cfg(not(feature = "headless"))]
pub struct HeadlessSession;

#[cfg(not(feature = "headless"))]
impl HeadlessSession {
    pub async fn launch(_config: &HeadlessConfig) -> Option<Self> {
        None
    }

    pub async fn render(&self, _url: &str, _user_agent: &str) -> Option<String> {
        None
    }

    pub async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_path_must_exist() {
        assert!(find_browser_binary(Some("/definitely/not/a/browser")).is_none());
    }

    #[test]
    fn test_discovery_does_not_panic() {
        // Whatever the host has installed, discovery returns cleanly
        let _ = find_browser_binary(None);
    }
}
