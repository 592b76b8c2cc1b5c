//! Auth gateway client for the Matchdesk backend.
//!
//! The console consumes exactly one gateway operation: credential login.
//! Everything the gateway returns passes through a strict parse step at
//! this boundary, so the rest of the crate only ever sees the typed
//! [`LoginGrant`].

pub mod client;
pub mod error;

pub use client::AuthClient;
pub use error::GatewayError;

use async_trait::async_trait;

use crate::auth::Credential;
use crate::models::Identity;

/// A validated, successful login response: the issued credential and the
/// operator it was issued to.
#[derive(Debug, Clone)]
pub struct LoginGrant {
    pub credential: Credential,
    pub identity: Identity,
}

/// The backend operation that validates operator credentials and issues
/// bearer tokens.
///
/// [`AuthClient`] is the production implementation; tests substitute an
/// in-process stub.
#[async_trait]
pub trait AuthGateway: Send + Sync {
    async fn login(
        &self,
        email_address: &str,
        password: &str,
    ) -> Result<LoginGrant, GatewayError>;
}
