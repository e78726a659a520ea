use std::time::Duration;

use serde::Deserialize;

use crate::error::{AuthError, Result};

/// A target listed by the DevTools HTTP endpoint.
#[derive(Deserialize, Debug, Clone)]
pub struct DevToolsTarget {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    #[serde(rename = "webSocketDebuggerUrl")]
    pub web_socket_debugger_url: Option<String>,
}

/// Client for the browser's local DevTools endpoint. It never leaves
/// loopback, so redirects are not followed.
pub fn create_devtools_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(Duration::from_secs(2))
        .build()
        .map_err(|e| AuthError::Browser(format!("failed to build DevTools client: {e}")))
}

pub async fn list_targets(client: &reqwest::Client, port: u16) -> Result<Vec<DevToolsTarget>> {
    let targets = client
        .get(format!("http://127.0.0.1:{port}/json/list"))
        .send()
        .await
        .and_then(|resp| resp.error_for_status())
        .map_err(|e| AuthError::Browser(format!("DevTools endpoint unavailable: {e}")))?
        .json()
        .await
        .map_err(|e| AuthError::Browser(format!("unexpected DevTools target list: {e}")))?;

    Ok(targets)
}

/// Websocket URL of the first page target, if the browser has one yet.
pub fn page_websocket(targets: &[DevToolsTarget]) -> Option<&str> {
    targets
        .iter()
        .filter(|t| t.kind == "page")
        .find_map(|t| t.web_socket_debugger_url.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_websocket() {
        let targets: Vec<DevToolsTarget> = serde_json::from_str(
            r#"[
                {"type": "service_worker", "url": "chrome://x", "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/worker/1"},
                {"type": "page", "url": "about:blank", "webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/page/ABC"}
            ]"#,
        )
        .unwrap();

        assert_eq!(
            page_websocket(&targets),
            Some("ws://127.0.0.1:9222/devtools/page/ABC")
        );
    }

    #[test]
    fn test_page_websocket_missing() {
        let targets: Vec<DevToolsTarget> =
            serde_json::from_str(r#"[{"type": "page", "url": "about:blank"}]"#).unwrap();
        assert_eq!(page_websocket(&targets), None);
    }
}
