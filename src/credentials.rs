//! The shared AWS credentials file.
//!
//! Profiles written by this tool are replaced wholesale; everything else in
//! the file is kept as it was, comments included.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use indexmap::IndexMap;

use crate::error::{AuthError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialEntry {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    pub expiration: DateTime<Utc>,
}

impl CredentialEntry {
    fn to_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("aws_access_key_id = {}", self.access_key_id),
            format!("aws_secret_access_key = {}", self.secret_access_key),
        ];
        if let Some(token) = &self.session_token {
            lines.push(format!("aws_session_token = {token}"));
        }
        lines.push(format!(
            "expiration = {}",
            self.expiration.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
        lines
    }
}

/// An INI-style credentials file split into profile sections.
#[derive(Debug, Default, Clone)]
pub struct CredentialsDocument {
    preamble: Vec<String>,
    sections: IndexMap<String, Vec<String>>,
}

impl CredentialsDocument {
    pub fn parse(content: &str) -> Self {
        let mut doc = Self::default();
        let mut current: Option<String> = None;

        for line in content.lines() {
            let trimmed = line.trim();
            if trimmed.starts_with('[') && trimmed.ends_with(']') {
                let name = trimmed[1..trimmed.len() - 1].trim().to_string();
                doc.sections.entry(name.clone()).or_default();
                current = Some(name);
                continue;
            }
            match &current {
                Some(name) => doc.sections.entry(name.clone()).or_default().push(line.to_string()),
                None => doc.preamble.push(line.to_string()),
            }
        }

        doc.trim_blank_tails();
        doc
    }

    fn trim_blank_tails(&mut self) {
        for lines in std::iter::once(&mut self.preamble).chain(self.sections.values_mut()) {
            while lines.last().is_some_and(|l| l.trim().is_empty()) {
                lines.pop();
            }
        }
    }

    pub fn profiles(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Value of `key` in `profile`, if set.
    pub fn get(&self, profile: &str, key: &str) -> Option<&str> {
        self.sections.get(profile)?.iter().find_map(|line| {
            let (k, v) = line.split_once('=')?;
            (k.trim() == key).then(|| v.trim())
        })
    }

    /// Replace `profile` with `entry`, appending it if new.
    pub fn upsert(&mut self, profile: &str, entry: &CredentialEntry) {
        self.sections.insert(profile.to_string(), entry.to_lines());
    }

    pub fn render(&self) -> String {
        let mut blocks = Vec::new();
        if !self.preamble.is_empty() {
            blocks.push(self.preamble.join("\n"));
        }
        for (name, lines) in &self.sections {
            let mut block = format!("[{name}]");
            for line in lines {
                block.push('\n');
                block.push_str(line);
            }
            blocks.push(block);
        }

        let mut out = blocks.join("\n\n");
        out.push('\n');
        out
    }
}

/// Where a finished login's credentials go.
#[async_trait]
pub trait CredentialStore {
    /// Merge `credentials`, keyed by profile, and report where they went.
    async fn save(&self, credentials: &BTreeMap<String, CredentialEntry>) -> Result<PathBuf>;
}

pub struct CredentialsFile {
    path: PathBuf,
}

impl CredentialsFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `AWS_SHARED_CREDENTIALS_FILE`, else `~/.aws/credentials`.
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = std::env::var_os("AWS_SHARED_CREDENTIALS_FILE") {
            return Ok(PathBuf::from(path));
        }
        dirs::home_dir()
            .map(|home| home.join(".aws").join("credentials"))
            .ok_or_else(|| AuthError::Configuration("could not determine home directory".to_string()))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persistence_error(&self, source: std::io::Error) -> AuthError {
        AuthError::Persistence {
            path: self.path.clone(),
            source,
        }
    }

    pub async fn load(&self) -> Result<CredentialsDocument> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(CredentialsDocument::parse(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CredentialsDocument::default()),
            Err(e) => Err(self.persistence_error(e)),
        }
    }

    async fn write(&self, content: &str) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.persistence_error(e))?;
        }

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&self.path).await.map_err(|e| self.persistence_error(e))?;
        tokio::io::AsyncWriteExt::write_all(&mut file, content.as_bytes())
            .await
            .map_err(|e| self.persistence_error(e))?;
        tokio::io::AsyncWriteExt::flush(&mut file)
            .await
            .map_err(|e| self.persistence_error(e))
    }
}

#[async_trait]
impl CredentialStore for CredentialsFile {
    async fn save(&self, credentials: &BTreeMap<String, CredentialEntry>) -> Result<PathBuf> {
        let mut doc = self.load().await?;
        for (profile, entry) in credentials {
            doc.upsert(profile, entry);
        }
        self.write(&doc.render()).await?;

        log::info!(
            "wrote {} profile(s) to {}",
            credentials.len(),
            self.path.display()
        );
        Ok(self.path.clone())
    }
}
