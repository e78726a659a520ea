//! What the login flow needs from a browser: open a URL, report outgoing
//! requests, and stop when told to.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Result;

pub const REQUEST_WILL_BE_SENT: &str = "Network.requestWillBeSent";

#[derive(Debug, Clone, PartialEq)]
pub enum BrowserEvent {
    RequestWillBeSent(OutgoingRequest),
    /// Any other notification or command reply, identified by method if it has one.
    Other(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub post_data_entries: Vec<PostDataEntry>,
}

impl OutgoingRequest {
    /// First body entry with content. Chrome reports entries base64-encoded.
    pub fn first_body(&self) -> Option<&str> {
        self.post_data_entries
            .iter()
            .filter_map(|entry| entry.bytes.as_deref())
            .find(|bytes| !bytes.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PostDataEntry {
    #[serde(default)]
    pub bytes: Option<String>,
}

#[derive(Deserialize)]
struct DevToolsMessage {
    method: Option<String>,
    #[serde(default)]
    params: serde_json::Value,
}

#[derive(Deserialize)]
struct RequestWillBeSentParams {
    request: OutgoingRequest,
}

impl BrowserEvent {
    /// Interpret one DevTools protocol message. Anything unexpected becomes
    /// `Other` so a single odd message can't end the login.
    pub fn from_devtools(text: &str) -> Self {
        let message: DevToolsMessage = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(e) => {
                log::debug!("ignoring unparseable DevTools message: {e}");
                return BrowserEvent::Other(None);
            }
        };

        if message.method.as_deref() == Some(REQUEST_WILL_BE_SENT) {
            match serde_json::from_value::<RequestWillBeSentParams>(message.params) {
                Ok(params) => return BrowserEvent::RequestWillBeSent(params.request),
                Err(e) => log::debug!("ignoring malformed {REQUEST_WILL_BE_SENT}: {e}"),
            }
        }
        BrowserEvent::Other(message.method)
    }
}

/// A browser that can be pointed at the IdP.
#[async_trait]
pub trait Browser {
    /// Navigate to `url` and stream the browser's events.
    ///
    /// The stream ends when `cancel` fires or the browser goes away, and the
    /// browser is torn down on cancellation.
    async fn open(
        &self,
        url: &Url,
        cancel: CancellationToken,
    ) -> Result<BoxStream<'static, BrowserEvent>>;
}
