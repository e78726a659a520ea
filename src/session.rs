//! One login, from building the IdP URL to writing credentials.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::aws::{account_id, CredentialExchange};
use crate::browser::Browser;
use crate::credentials::{CredentialEntry, CredentialStore};
use crate::error::{AuthError, Result};
use crate::identity_provider::IdentityProvider;
use crate::interceptor::SamlInterceptor;
use crate::saml::ExtractionResult;
use crate::settings::Settings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    BuildingUrl,
    AwaitingInterception,
    ExchangingCredentials,
    PersistingResult,
    Done,
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::BuildingUrl => "building login URL",
            SessionState::AwaitingInterception => "waiting for SAML response",
            SessionState::ExchangingCredentials => "exchanging credentials",
            SessionState::PersistingResult => "writing credentials",
            SessionState::Done => "done",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRole {
    pub role_arn: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct LoginOutcome {
    /// Credentials by account ID.
    pub credentials: BTreeMap<String, CredentialEntry>,
    pub skipped: Vec<SkippedRole>,
    /// Unset when nothing was written.
    pub saved_to: Option<PathBuf>,
}

pub struct LoginSession<'a, B, X, S> {
    settings: &'a Settings,
    browser: &'a B,
    exchange: &'a X,
    store: &'a S,
    state: Mutex<SessionState>,
}

impl<'a, B, X, S> LoginSession<'a, B, X, S>
where
    B: Browser,
    X: CredentialExchange,
    S: CredentialStore,
{
    pub fn new(settings: &'a Settings, browser: &'a B, exchange: &'a X, store: &'a S) -> Self {
        Self {
            settings,
            browser,
            exchange,
            store,
            state: Mutex::new(SessionState::BuildingUrl),
        }
    }

    pub fn state(&self) -> SessionState {
        match self.state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn enter(&self, next: SessionState) {
        log::debug!("login: {next}");
        match self.state.lock() {
            Ok(mut state) => *state = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    pub async fn run(&self) -> Result<LoginOutcome> {
        let result = self.drive().await;
        match &result {
            Ok(_) => self.enter(SessionState::Done),
            Err(e) => {
                log::debug!("login failed while {}: {e}", self.state());
                self.enter(SessionState::Failed);
            }
        }
        result
    }

    async fn drive(&self) -> Result<LoginOutcome> {
        self.enter(SessionState::BuildingUrl);
        let idp = IdentityProvider {
            base_url: &self.settings.idp_base_url,
            tenant_id: &self.settings.tenant_id,
        };
        let url = idp.login_url(&self.settings.app_id_uri, &self.settings.assertion_consumer_url)?;
        log::debug!("login URL: {url}");

        self.enter(SessionState::AwaitingInterception);
        let extraction = self.intercept(&url).await?;
        if extraction.grants.is_empty() {
            log::warn!("SAML response grants no AWS roles");
        }

        self.enter(SessionState::ExchangingCredentials);
        let mut outcome = self.exchange_all(&extraction).await;

        self.enter(SessionState::PersistingResult);
        if outcome.credentials.is_empty() {
            log::warn!("no credentials obtained; credentials file left untouched");
        } else {
            outcome.saved_to = Some(self.store.save(&outcome.credentials).await?);
        }

        Ok(outcome)
    }

    /// Open the browser and wait for the interceptor's single result.
    async fn intercept(&self, url: &Url) -> Result<ExtractionResult> {
        let cancel = CancellationToken::new();
        let (interceptor, handoff) =
            SamlInterceptor::new(self.settings.assertion_consumer_url.clone(), cancel.clone());

        let events = self.browser.open(url, cancel.clone()).await?;
        let observer = tokio::spawn(interceptor.observe(events));

        let timeout = self.settings.login_timeout();
        let delivered = tokio::time::timeout(timeout, handoff).await;
        cancel.cancel();
        observer.abort();

        match delivered {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AuthError::BrowserClosed),
            Err(_) => Err(AuthError::Timeout(timeout)),
        }
    }

    /// Assume every granted role in order. A failed role is recorded and
    /// skipped; a later role in the same account replaces an earlier one.
    async fn exchange_all(&self, extraction: &ExtractionResult) -> LoginOutcome {
        let mut outcome = LoginOutcome::default();

        for grant in &extraction.grants {
            let Some(account) = account_id(&grant.role_arn) else {
                log::warn!("skipping {}: no account ID in role ARN", grant.role_arn);
                outcome.skipped.push(SkippedRole {
                    role_arn: grant.role_arn.clone(),
                    reason: "no account ID in role ARN".to_string(),
                });
                continue;
            };

            match self.exchange.exchange(grant, &extraction.assertion).await {
                Ok(entry) => {
                    log::info!("obtained credentials for {}", grant.role_arn);
                    if outcome.credentials.insert(account.to_string(), entry).is_some() {
                        log::debug!("replaced earlier credentials for account {account}");
                    }
                }
                Err(e) => {
                    log::warn!("skipping {}: {e}", grant.role_arn);
                    let reason = match e {
                        AuthError::Exchange { reason, .. } => reason,
                        other => other.to_string(),
                    };
                    outcome.skipped.push(SkippedRole {
                        role_arn: grant.role_arn.clone(),
                        reason,
                    });
                }
            }
        }

        outcome
    }
}
