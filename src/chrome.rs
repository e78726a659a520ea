//! Drives a local Chrome or Chromium over the DevTools protocol.

use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{BoxStream, SplitSink};
use futures::{future, SinkExt, StreamExt};
use serde_json::json;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::browser::{Browser, BrowserEvent};
use crate::error::{AuthError, Result};
use crate::http_client::{create_devtools_client, list_targets, page_websocket};

type DevToolsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

const CHROME_NAMES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
    "chrome.exe",
];

const CHROME_PATHS: &[&str] = &[
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    r"C:\Program Files\Google\Chrome\Application\chrome.exe",
    r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
];

const STARTUP_ATTEMPTS: usize = 40;
const STARTUP_POLL: Duration = Duration::from_millis(250);

// SAML responses with many roles run to tens of kilobytes.
const MAX_POST_DATA: usize = 1024 * 1024;

pub struct ChromeBrowser {
    executable: PathBuf,
}

impl ChromeBrowser {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Use `configured` if given, otherwise look on `PATH` and in the usual
    /// install locations.
    pub fn locate(configured: Option<&Path>) -> Result<Self> {
        if let Some(path) = configured {
            if path.is_file() {
                return Ok(Self::new(path));
            }
            return Err(AuthError::Configuration(format!(
                "chrome_path {} does not exist",
                path.display()
            )));
        }

        let on_path = std::env::var_os("PATH")
            .map(|paths| std::env::split_paths(&paths).collect::<Vec<_>>())
            .unwrap_or_default();

        on_path
            .iter()
            .flat_map(|dir| CHROME_NAMES.iter().map(move |name| dir.join(name)))
            .chain(CHROME_PATHS.iter().map(PathBuf::from))
            .find(|candidate| candidate.is_file())
            .map(Self::new)
            .ok_or_else(|| {
                AuthError::Configuration(
                    "could not find Chrome or Chromium; set chrome_path".to_string(),
                )
            })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }
}

fn chrome_args(port: u16, profile: &Path) -> Vec<String> {
    vec![
        format!("--remote-debugging-port={port}"),
        format!("--user-data-dir={}", profile.display()),
        "--no-first-run".to_string(),
        "--no-default-browser-check".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
        "--window-size=430,680".to_string(),
        "about:blank".to_string(),
    ]
}

fn free_port() -> Result<u16> {
    TcpListener::bind(("127.0.0.1", 0))
        .and_then(|listener| listener.local_addr())
        .map(|addr| addr.port())
        .map_err(|e| AuthError::Browser(format!("no free local port for DevTools: {e}")))
}

fn command(id: u64, method: &str, params: serde_json::Value) -> Message {
    Message::Text(
        json!({ "id": id, "method": method, "params": params })
            .to_string()
            .into(),
    )
}

async fn wait_for_page(port: u16) -> Result<String> {
    let client = create_devtools_client()?;
    let mut last_error = None;

    for _ in 0..STARTUP_ATTEMPTS {
        match list_targets(&client, port).await {
            Ok(targets) => {
                if let Some(ws) = page_websocket(&targets) {
                    return Ok(ws.to_string());
                }
            }
            Err(e) => last_error = Some(e),
        }
        tokio::time::sleep(STARTUP_POLL).await;
    }

    Err(last_error
        .unwrap_or_else(|| AuthError::Browser("browser started without a page".to_string())))
}

/// Keep the browser alive until the login is cancelled or the user closes it.
async fn supervise(mut child: Child, profile: TempDir, sink: DevToolsSink, cancel: CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {
            log::debug!("closing browser");
            if let Err(e) = child.kill().await {
                log::warn!("failed to stop browser: {e}");
            }
        }
        status = child.wait() => {
            log::debug!("browser exited: {status:?}");
            cancel.cancel();
        }
    }
    drop(sink);
    drop(profile);
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn open(
        &self,
        url: &Url,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, BrowserEvent>> {
        let profile = tempfile::Builder::new()
            .prefix("entra-aws-auth-")
            .tempdir()
            .map_err(|e| AuthError::Browser(format!("failed to create browser profile: {e}")))?;
        let port = free_port()?;

        log::debug!("launching {} on DevTools port {port}", self.executable.display());
        let mut child = Command::new(&self.executable)
            .args(chrome_args(port, profile.path()))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AuthError::Browser(format!("failed to launch {}: {e}", self.executable.display()))
            })?;

        let ws_url = match wait_for_page(port).await {
            Ok(ws_url) => ws_url,
            Err(e) => {
                let _ = child.kill().await;
                return Err(e);
            }
        };

        let (ws, _) = connect_async(ws_url.as_str())
            .await
            .map_err(|e| AuthError::Browser(format!("DevTools connection failed: {e}")))?;
        let (mut sink, stream) = ws.split();

        // Network must be enabled before navigating or early requests are missed.
        sink.send(command(1, "Network.enable", json!({ "maxPostDataSize": MAX_POST_DATA })))
            .await
            .map_err(|e| AuthError::Browser(format!("Network.enable failed: {e}")))?;
        sink.send(command(2, "Page.navigate", json!({ "url": url.as_str() })))
            .await
            .map_err(|e| AuthError::Browser(format!("navigation failed: {e}")))?;

        tokio::spawn(supervise(child, profile, sink, cancel.clone()));

        let events = stream
            .take_until(cancel.cancelled_owned())
            .take_while(|message| future::ready(message.is_ok()))
            .filter_map(|message| {
                future::ready(match message {
                    Ok(Message::Text(text)) => Some(BrowserEvent::from_devtools(text.as_str())),
                    _ => None,
                })
            });

        Ok(events.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chrome_args() {
        let args = chrome_args(9333, Path::new("/tmp/profile"));
        assert_eq!(args[0], "--remote-debugging-port=9333");
        assert_eq!(args[1], "--user-data-dir=/tmp/profile");
        assert!(args.contains(&"--disable-blink-features=AutomationControlled".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("about:blank"));
    }

    #[test]
    fn test_locate_configured_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let chrome = ChromeBrowser::locate(Some(file.path())).unwrap();
        assert_eq!(chrome.executable(), file.path());
    }

    #[test]
    fn test_locate_missing_configured_path() {
        let result = ChromeBrowser::locate(Some(Path::new("/nonexistent/chrome")));
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_free_port() {
        assert!(free_port().unwrap() > 0);
    }

    #[test]
    fn test_command_shape() {
        let Message::Text(text) = command(7, "Page.navigate", json!({ "url": "about:blank" })) else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(value["id"], 7);
        assert_eq!(value["method"], "Page.navigate");
        assert_eq!(value["params"]["url"], "about:blank");
    }
}
