use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sts::error::DisplayErrorContext;

use crate::credentials::CredentialEntry;
use crate::error::{AuthError, Result};
use crate::saml::RoleGrant;

/// Trades a SAML assertion for temporary credentials in one role.
#[async_trait]
pub trait CredentialExchange {
    async fn exchange(&self, grant: &RoleGrant, assertion: &str) -> Result<CredentialEntry>;
}

/// Account ID of a role ARN, the fifth `:`-separated field.
pub fn account_id(role_arn: &str) -> Option<&str> {
    role_arn.split(':').nth(4).filter(|id| !id.is_empty())
}

pub struct StsExchange {
    client: aws_sdk_sts::Client,
    duration_seconds: i32,
}

impl StsExchange {
    /// AssumeRoleWithSAML is unsigned, so no local credentials are loaded.
    pub async fn new(region: &str, duration_seconds: i32) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .no_credentials()
            .load()
            .await;

        Self {
            client: aws_sdk_sts::Client::new(&config),
            duration_seconds,
        }
    }
}

#[async_trait]
impl CredentialExchange for StsExchange {
    async fn exchange(&self, grant: &RoleGrant, assertion: &str) -> Result<CredentialEntry> {
        let failed = |reason: String| AuthError::Exchange {
            role: grant.role_arn.clone(),
            reason,
        };

        log::debug!("assuming {} via {}", grant.role_arn, grant.principal_arn);
        let output = self
            .client
            .assume_role_with_saml()
            .role_arn(&grant.role_arn)
            .principal_arn(&grant.principal_arn)
            .saml_assertion(assertion)
            .duration_seconds(self.duration_seconds)
            .send()
            .await
            .map_err(|e| failed(DisplayErrorContext(&e).to_string()))?;

        let credentials = output
            .credentials()
            .ok_or_else(|| failed("STS returned no credentials".to_string()))?;
        let expiry = credentials.expiration();
        let expiration = chrono::DateTime::from_timestamp(expiry.secs(), expiry.subsec_nanos())
            .ok_or_else(|| failed(format!("STS returned an invalid expiration {expiry:?}")))?;

        Ok(CredentialEntry {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: Some(credentials.session_token().to_string()),
            expiration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_id_from_role_arn() {
        assert_eq!(
            account_id("arn:aws:iam::123456789012:role/Admin"),
            Some("123456789012")
        );
    }

    #[test]
    fn test_account_id_from_nested_role_path() {
        assert_eq!(
            account_id("arn:aws-cn:iam::210987654321:role/team/Dev"),
            Some("210987654321")
        );
    }

    #[test]
    fn test_account_id_missing() {
        assert_eq!(account_id("Admin"), None);
        assert_eq!(account_id("arn:aws:iam:::role/Admin"), None);
    }
}
