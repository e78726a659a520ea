//! Wire encodings used on both legs of the SAML exchange.
//!
//! Outbound: the login request is raw-deflated (no zlib header or checksum)
//! and base64-encoded, as the HTTP-Redirect binding requires.
//!
//! Inbound: the browser reports the IdP's form POST to the service provider
//! as a base64 blob of the URL-encoded body. The `SAMLResponse` field inside
//! it is itself base64 XML.

use std::io::Write;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use flate2::{write::DeflateEncoder, Compression};
use percent_encoding::percent_decode_str;

use crate::error::{AuthError, DecodeError, Result};

pub const SAML_RESPONSE_KEY: &str = "SAMLResponse=";

/// Raw-deflate `xml` and base64 encode the result.
pub fn deflate_and_encode(xml: &str) -> Result<String> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(xml.as_bytes()).map_err(AuthError::Encoding)?;
    let compressed = encoder.finish().map_err(AuthError::Encoding)?;
    Ok(BASE64.encode(compressed))
}

/// A SAML response recovered from a captured POST body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAssertion {
    /// The response document.
    pub xml: String,
    /// The `SAMLResponse` value exactly as the IdP sent it. STS wants this
    /// form, so it is never re-encoded.
    pub encoded: String,
}

pub fn decode_assertion(captured_body: &str) -> std::result::Result<DecodedAssertion, DecodeError> {
    let body = BASE64
        .decode(strip_line_breaks(captured_body))
        .map_err(DecodeError::OuterBase64)?;
    let form = query_unescape(&body)?;

    let encoded = saml_response_value(&form).ok_or(DecodeError::MissingSamlResponse)?;
    let xml = BASE64
        .decode(strip_line_breaks(encoded))
        .map_err(DecodeError::InnerBase64)?;
    let xml = String::from_utf8(xml).map_err(|_| DecodeError::NotUtf8)?;

    Ok(DecodedAssertion {
        xml,
        encoded: encoded.to_string(),
    })
}

/// Form-style unescape: `+` is a space, `%XX` is a byte.
fn query_unescape(body: &[u8]) -> std::result::Result<String, DecodeError> {
    let body = std::str::from_utf8(body).map_err(|_| DecodeError::UrlEncoding)?;
    let spaced = body.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| DecodeError::UrlEncoding)
}

/// Value of the first `SAMLResponse=` field, cut at the next `&`.
fn saml_response_value(form: &str) -> Option<&str> {
    let (_, rest) = form.split_once(SAML_RESPONSE_KEY)?;
    match rest.find('&') {
        Some(end) => Some(&rest[..end]),
        None => Some(rest),
    }
}

// IdPs that wrap base64 at 76 columns still produce a valid payload.
fn strip_line_breaks(value: &str) -> String {
    value.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}
