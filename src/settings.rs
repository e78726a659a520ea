use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::credentials::CredentialsFile;
use crate::error::{AuthError, Result};
use crate::identity_provider::DEFAULT_IDP_BASE_URL;

pub const CONFIG_FILE_NAME: &str = ".entra-aws-auth.toml";
pub const ENV_PREFIX: &str = "ENTRA_AWS_AUTH";
pub const AWS_SAML_ENDPOINT: &str = "https://signin.aws.amazon.com/saml";

// STS limits for AssumeRoleWithSAML.
const MIN_SESSION_SECS: i32 = 900;
const MAX_SESSION_SECS: i32 = 43_200;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default = "aws_saml_endpoint")]
    pub app_id_uri: String,
    #[serde(default = "idp_base_url")]
    pub idp_base_url: String,
    #[serde(default = "aws_saml_endpoint")]
    pub assertion_consumer_url: String,
    #[serde(default = "region")]
    pub region: String,
    #[serde(default = "session_duration_secs")]
    pub session_duration_secs: i32,
    #[serde(default = "login_timeout_secs")]
    pub login_timeout_secs: u64,
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,
}

fn aws_saml_endpoint() -> String {
    AWS_SAML_ENDPOINT.to_string()
}

fn idp_base_url() -> String {
    DEFAULT_IDP_BASE_URL.to_string()
}

fn region() -> String {
    "us-east-1".to_string()
}

fn session_duration_secs() -> i32 {
    MAX_SESSION_SECS
}

fn login_timeout_secs() -> u64 {
    300
}

impl Settings {
    /// `.entra-aws-auth.toml` from the working or home directory, overridden
    /// by `ENTRA_AWS_AUTH_*` environment variables.
    pub fn load() -> Result<Self> {
        let file = config_file_path();
        Self::from_sources(file.as_deref(), Environment::with_prefix(ENV_PREFIX))
    }

    pub fn from_sources(file: Option<&Path>, env: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = file {
            log::debug!("reading settings from {}", path.display());
            builder = builder.add_source(File::from(path).required(false));
        }

        let settings: Settings = builder
            .add_source(env)
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| AuthError::Configuration(e.to_string()))?;

        settings.validate()
    }

    fn validate(mut self) -> Result<Self> {
        self.tenant_id = self.tenant_id.trim().to_string();
        if self.tenant_id.is_empty() {
            return Err(AuthError::Configuration(format!(
                "missing tenant ID; set {ENV_PREFIX}_TENANT_ID"
            )));
        }
        if !(MIN_SESSION_SECS..=MAX_SESSION_SECS).contains(&self.session_duration_secs) {
            return Err(AuthError::Configuration(format!(
                "session_duration_secs must be between {MIN_SESSION_SECS} and {MAX_SESSION_SECS}"
            )));
        }
        if self.login_timeout_secs == 0 {
            return Err(AuthError::Configuration(
                "login_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(self)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    pub fn credentials_path(&self) -> Result<PathBuf> {
        match &self.credentials_file {
            Some(path) => Ok(path.clone()),
            None => CredentialsFile::default_path(),
        }
    }
}

fn config_file_path() -> Option<PathBuf> {
    let local = Path::new(CONFIG_FILE_NAME).to_path_buf();
    if local.is_file() {
        return Some(local);
    }
    dirs::home_dir()
        .map(|home| home.join(CONFIG_FILE_NAME))
        .filter(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let mut map = config::Map::new();
        for (key, value) in vars {
            map.insert(key.to_string(), value.to_string());
        }
        Environment::with_prefix(ENV_PREFIX).source(Some(map))
    }

    #[test]
    fn test_defaults_with_tenant() {
        let settings =
            Settings::from_sources(None, env(&[("ENTRA_AWS_AUTH_TENANT_ID", "contoso-tenant")]))
                .unwrap();

        assert_eq!(settings.tenant_id, "contoso-tenant");
        assert_eq!(settings.app_id_uri, AWS_SAML_ENDPOINT);
        assert_eq!(settings.assertion_consumer_url, AWS_SAML_ENDPOINT);
        assert_eq!(settings.idp_base_url, "https://login.microsoftonline.com");
        assert_eq!(settings.session_duration_secs, 43_200);
        assert_eq!(settings.login_timeout(), Duration::from_secs(300));
        assert!(settings.chrome_path.is_none());
    }

    #[test]
    fn test_missing_tenant_is_fatal() {
        let result = Settings::from_sources(None, env(&[]));
        assert!(matches!(result, Err(AuthError::Configuration(_))));

        let result = Settings::from_sources(None, env(&[("ENTRA_AWS_AUTH_TENANT_ID", "  ")]));
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_file_then_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "tenant_id = \"from-file\"\nregion = \"eu-west-1\"\nlogin_timeout_secs = 60\n",
        )
        .unwrap();

        let settings = Settings::from_sources(
            Some(&path),
            env(&[("ENTRA_AWS_AUTH_TENANT_ID", "from-env")]),
        )
        .unwrap();

        assert_eq!(settings.tenant_id, "from-env");
        assert_eq!(settings.region, "eu-west-1");
        assert_eq!(settings.login_timeout_secs, 60);
    }

    #[test]
    fn test_rejects_out_of_range_duration() {
        let result = Settings::from_sources(
            None,
            env(&[
                ("ENTRA_AWS_AUTH_TENANT_ID", "t"),
                ("ENTRA_AWS_AUTH_SESSION_DURATION_SECS", "60"),
            ]),
        );
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }

    #[test]
    fn test_explicit_credentials_file() {
        let settings = Settings::from_sources(
            None,
            env(&[
                ("ENTRA_AWS_AUTH_TENANT_ID", "t"),
                ("ENTRA_AWS_AUTH_CREDENTIALS_FILE", "/tmp/creds"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.credentials_path().unwrap(), PathBuf::from("/tmp/creds"));
    }
}
