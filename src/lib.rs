//! SAML login to AWS through Microsoft Entra ID.
//!
//! A browser is sent to the Entra ID login page with a SAML `AuthnRequest`.
//! When the IdP posts its response to the AWS sign-in endpoint, the request is
//! intercepted, the role grants are read out of the assertion, and each role
//! is exchanged with STS for temporary credentials that end up in the shared
//! credentials file.

pub mod aws;
pub mod browser;
pub mod chrome;
pub mod codec;
pub mod credentials;
pub mod error;
pub mod http_client;
pub mod identity_provider;
pub mod interceptor;
pub mod saml;
pub mod session;
pub mod settings;
pub mod ui;

pub use error::{AuthError, DecodeError, Result};
