use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub type Result<T, E = AuthError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to encode login request: {0}")]
    Encoding(#[source] std::io::Error),

    #[error("failed to decode captured SAML payload: {0}")]
    Decoding(#[from] DecodeError),

    #[error("SAML response is not a well-formed document: {0}")]
    MalformedDocument(String),

    #[error("credential exchange for {role} failed: {reason}")]
    Exchange { role: String, reason: String },

    #[error("failed to write credentials file {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("browser error: {0}")]
    Browser(String),

    #[error("no SAML response captured within {0:?}")]
    Timeout(Duration),

    #[error("browser closed before a SAML response was captured")]
    BrowserClosed,
}

/// Why a captured request body could not be turned into a SAML document.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("request body is not valid base64: {0}")]
    OuterBase64(#[source] base64::DecodeError),

    #[error("request body is not valid URL-encoded UTF-8")]
    UrlEncoding,

    #[error("request body has no SAMLResponse field")]
    MissingSamlResponse,

    #[error("SAMLResponse value is not valid base64: {0}")]
    InnerBase64(#[source] base64::DecodeError),

    #[error("SAMLResponse document is not valid UTF-8")]
    NotUtf8,
}
