use crate::codec::decode_assertion;
use crate::error::{AuthError, Result};

pub const ROLE_ATTRIBUTE: &str = "https://aws.amazon.com/SAML/Attributes/Role";

const ROLE_MARKER: &str = ":role/";

/// A role the assertion lets the user assume, and the SAML provider trusted
/// to vouch for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleGrant {
    pub role_arn: String,
    pub principal_arn: String,
}

impl RoleGrant {
    pub fn new(role_arn: impl Into<String>, principal_arn: impl Into<String>) -> Self {
        Self {
            role_arn: role_arn.into(),
            principal_arn: principal_arn.into(),
        }
    }
}

/// Everything captured from a single login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    pub grants: Vec<RoleGrant>,
    /// Base64 `SAMLResponse` exactly as posted by the IdP.
    pub assertion: String,
}

/// Split a role claim value into a grant.
///
/// IdPs disagree on whether the role or the provider comes first, so the
/// token carrying `:role/` is the role and the other one is the principal.
pub fn classify_pair(first: &str, second: &str) -> RoleGrant {
    let (first, second) = (first.trim(), second.trim());
    if first.contains(ROLE_MARKER) {
        RoleGrant::new(first, second)
    } else {
        RoleGrant::new(second, first)
    }
}

/// Collect every role grant in the response, in document order.
///
/// A document without a role attribute yields an empty list.
pub fn parse_role_grants(xml: &str) -> Result<Vec<RoleGrant>> {
    let doc = roxmltree::Document::parse(xml)
        .map_err(|e| AuthError::MalformedDocument(e.to_string()))?;

    doc.descendants()
        .filter(|n| n.has_tag_name("Attribute") && n.attribute("Name") == Some(ROLE_ATTRIBUTE))
        .flat_map(|attribute| {
            attribute
                .children()
                .filter(|n| n.has_tag_name("AttributeValue"))
        })
        .map(|value| {
            let text = value.text().unwrap_or_default();
            let (first, second) = text.split_once(',').ok_or_else(|| {
                AuthError::MalformedDocument(format!("role claim {:?} is not a pair", text.trim()))
            })?;
            Ok(classify_pair(first, second))
        })
        .collect()
}

/// Decode a captured POST body and pull the role grants out of it.
pub fn extract(captured_body: &str) -> Result<ExtractionResult> {
    let decoded = decode_assertion(captured_body)?;
    let grants = parse_role_grants(&decoded.xml)?;
    log::debug!("found {} role grant(s) in SAML response", grants.len());

    Ok(ExtractionResult {
        grants,
        assertion: decoded.encoded,
    })
}
