use chrono::{DateTime, SecondsFormat, Utc};
use url::Url;
use uuid::Uuid;

use crate::codec::deflate_and_encode;
use crate::error::{AuthError, Result};

pub const DEFAULT_IDP_BASE_URL: &str = "https://login.microsoftonline.com";

/// A SAML `AuthnRequest` for Microsoft Entra ID.
#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub id: String,
    pub issue_instant: DateTime<Utc>,
    pub issuer: String,
    pub assertion_consumer_service_url: String,
}

impl LoginRequest {
    pub fn new(issuer: &str, assertion_consumer_service_url: &str) -> Self {
        Self {
            id: format!("id{}", Uuid::new_v4()),
            issue_instant: Utc::now(),
            issuer: issuer.to_string(),
            assertion_consumer_service_url: assertion_consumer_service_url.to_string(),
        }
    }

    /// Entra validates element order against the schema, so this is a fixed
    /// template rather than a serializer.
    pub fn to_xml(&self) -> String {
        format!(
            r#"<samlp:AuthnRequest xmlns="urn:oasis:names:tc:SAML:2.0:metadata" ID="{}" Version="2.0" IssueInstant="{}" IsPassive="false" AssertionConsumerServiceURL="{}" xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol"><Issuer xmlns="urn:oasis:names:tc:SAML:2.0:assertion">{}</Issuer><samlp:NameIDPolicy Format="urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress"></samlp:NameIDPolicy></samlp:AuthnRequest>"#,
            self.id,
            self.issue_instant.to_rfc3339_opts(SecondsFormat::Secs, true),
            xml_escape(&self.assertion_consumer_service_url),
            xml_escape(&self.issuer),
        )
    }
}

pub struct IdentityProvider<'a> {
    pub base_url: &'a str,
    pub tenant_id: &'a str,
}

impl IdentityProvider<'_> {
    /// `{base_url}/{tenant_id}/saml2?SAMLRequest=...` for a fresh request.
    pub fn login_url(&self, issuer: &str, assertion_consumer_service_url: &str) -> Result<Url> {
        let request = LoginRequest::new(issuer, assertion_consumer_service_url);
        log::debug!("built AuthnRequest {}", request.id);

        let encoded = deflate_and_encode(&request.to_xml())?;
        let escaped: String = url::form_urlencoded::byte_serialize(encoded.as_bytes()).collect();

        let login_url = format!(
            "{}/{}/saml2?SAMLRequest={}",
            self.base_url.trim_end_matches('/'),
            self.tenant_id,
            escaped
        );
        Url::parse(&login_url)
            .map_err(|e| AuthError::Configuration(format!("invalid login URL {login_url}: {e}")))
    }
}

/// Build the Entra ID login URL for an application.
pub fn build_login_url(
    app_id_uri: &str,
    tenant_id: &str,
    assertion_consumer_service_url: &str,
) -> Result<Url> {
    IdentityProvider {
        base_url: DEFAULT_IDP_BASE_URL,
        tenant_id,
    }
    .login_url(app_id_uri, assertion_consumer_service_url)
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use flate2::read::DeflateDecoder;
    use std::io::Read;

    const AWS_SAML: &str = "https://signin.aws.amazon.com/saml";

    fn saml_request_xml(url: &Url) -> String {
        let (_, encoded) = url
            .query_pairs()
            .find(|(key, _)| key == "SAMLRequest")
            .unwrap();
        let compressed = BASE64.decode(encoded.as_bytes()).unwrap();

        let mut xml = String::new();
        DeflateDecoder::new(&compressed[..])
            .read_to_string(&mut xml)
            .unwrap();
        xml
    }

    #[test]
    fn test_login_url_shape() {
        let url = build_login_url(AWS_SAML, "contoso-tenant", AWS_SAML).unwrap();

        assert_eq!(url.host_str(), Some("login.microsoftonline.com"));
        assert_eq!(
            url.path_segments().unwrap().collect::<Vec<_>>(),
            vec!["contoso-tenant", "saml2"]
        );
        let xml = saml_request_xml(&url);
        assert!(xml.contains(r#"AssertionConsumerServiceURL="https://signin.aws.amazon.com/saml""#));
        assert!(xml.contains("<Issuer xmlns=\"urn:oasis:names:tc:SAML:2.0:assertion\">https://signin.aws.amazon.com/saml</Issuer>"));
    }

    #[test]
    fn test_request_is_well_formed() {
        let url = build_login_url(AWS_SAML, "contoso-tenant", AWS_SAML).unwrap();
        let xml = saml_request_xml(&url);

        let doc = roxmltree::Document::parse(&xml).unwrap();
        let root = doc.root_element();
        assert!(root.has_tag_name("AuthnRequest"));
        assert_eq!(root.attribute("Version"), Some("2.0"));
        assert!(root.attribute("ID").unwrap().starts_with("id"));
        let policy = root
            .children()
            .find(|n| n.has_tag_name("NameIDPolicy"))
            .unwrap();
        assert_eq!(
            policy.attribute("Format"),
            Some("urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress")
        );
    }

    #[test]
    fn test_issue_instant_is_utc_seconds() {
        let request = LoginRequest::new(AWS_SAML, AWS_SAML);
        let xml = request.to_xml();

        let doc = roxmltree::Document::parse(&xml).unwrap();
        let instant = doc.root_element().attribute("IssueInstant").unwrap();
        assert!(instant.ends_with('Z'));
        assert!(DateTime::parse_from_rfc3339(instant).is_ok());
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = LoginRequest::new(AWS_SAML, AWS_SAML);
        let b = LoginRequest::new(AWS_SAML, AWS_SAML);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_custom_base_url() {
        let idp = IdentityProvider {
            base_url: "https://login.example.test/",
            tenant_id: "t1",
        };
        let url = idp.login_url(AWS_SAML, AWS_SAML).unwrap();
        assert!(url.as_str().starts_with("https://login.example.test/t1/saml2?SAMLRequest="));
    }
}
