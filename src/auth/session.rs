//! Process-wide session state for the admin console.
//!
//! `SessionManager` is the single owner of login state. Protected views
//! read it through [`SessionManager::current_state`] or subscribe for
//! change notification; the login view drives it through
//! [`SessionManager::login`] and [`SessionManager::logout`].
//!
//! The manager is a two-state machine: logged out (initial) and logged in.
//! Logout, credential expiry, and a gateway rejection all transition back
//! to logged out; a login while already logged in replaces the credential
//! and identity wholesale.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::{AuthGateway, GatewayError};
use crate::models::Identity;

use super::credentials::{CredentialStore, StoreError};

/// Session outcomes and failures surfaced to callers.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Guard outcome for unauthenticated access. The routing layer turns
    /// this into a redirect to the login view; it is never a fault.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The login response arrived after a newer login or a logout and was
    /// discarded.
    #[error("Login superseded by a newer login or logout")]
    Superseded,

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Snapshot of who is signed in.
///
/// `authenticated` is derived from the credential's validity window at the
/// moment it is asked for, so a held snapshot cannot claim a live session
/// after the credential lapses. The fields are private and set together by
/// the manager; a state carrying an identity without a validity window is
/// unrepresentable.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    identity: Option<Identity>,
    expires_at: Option<DateTime<Utc>>,
}

impl SessionState {
    fn logged_in(identity: Identity, expires_at: DateTime<Utc>) -> Self {
        Self {
            identity: Some(identity),
            expires_at: Some(expires_at),
        }
    }

    /// True while a non-expired credential backs this session.
    pub fn authenticated(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => Utc::now() <= expires_at,
            None => false,
        }
    }

    /// The signed-in operator, if any.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }
}

/// Single source of truth for [`SessionState`].
pub struct SessionManager<G> {
    gateway: G,
    store: CredentialStore,
    state: watch::Sender<SessionState>,
    generation: AtomicU64,
}

impl<G: AuthGateway> SessionManager<G> {
    pub fn new(gateway: G, store: CredentialStore) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            gateway,
            store,
            state,
            generation: AtomicU64::new(0),
        }
    }

    /// Restore session state from the credential store. Called once at
    /// startup, before any view consults the manager.
    ///
    /// The locally cached identity is trusted as-is; a token revoked
    /// server-side surfaces as a gateway rejection on the first
    /// authenticated request, which collaborators feed back through
    /// [`SessionManager::invalidate`].
    pub fn initialize(&self) -> SessionState {
        match self.store.load() {
            Some((credential, identity)) => {
                info!(operator = %identity.email_address, "Restored persisted session");
                self.publish(SessionState::logged_in(identity, credential.expires_at))
            }
            None => {
                debug!("No persisted session found");
                self.publish(SessionState::default())
            }
        }
    }

    /// Authenticate against the gateway and persist the issued credential.
    ///
    /// On failure the session state is left as it was, with one exception:
    /// a credential rejection while logged in tears the session down, since
    /// the gateway no longer honors the operator's standing. A response
    /// overtaken by a newer login or a logout is discarded and reported as
    /// [`SessionError::Superseded`].
    pub async fn login(
        &self,
        email_address: &str,
        password: &str,
    ) -> Result<SessionState, SessionError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(operator = %email_address, "Login started");

        let outcome = self.gateway.login(email_address, password).await;

        // A newer login or a logout happened while this call was in
        // flight; its response must not determine the final state.
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(operator = %email_address, "Login response discarded as stale");
            return Err(SessionError::Superseded);
        }

        let grant = match outcome {
            Ok(grant) => grant,
            Err(GatewayError::InvalidCredentials) if self.current_state().authenticated() => {
                warn!("Credential rejected by gateway; tearing session down");
                self.invalidate();
                return Err(GatewayError::InvalidCredentials.into());
            }
            Err(e) => {
                warn!(error = %e, "Login failed");
                return Err(e.into());
            }
        };

        self.store.save(&grant.credential, &grant.identity)?;

        info!(
            operator = %grant.identity.email_address,
            role = grant.identity.role.label(),
            "Login successful"
        );
        Ok(self.publish(SessionState::logged_in(
            grant.identity,
            grant.credential.expires_at,
        )))
    }

    /// End the session. Always succeeds; a storage failure while clearing
    /// is logged and the in-memory state is reset regardless.
    pub fn logout(&self) -> SessionState {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear credential store on logout");
        }
        info!("Logged out");
        self.publish(SessionState::default())
    }

    /// Tear down a session whose credential the gateway no longer accepts.
    ///
    /// Entry point for collaborators that receive an
    /// authentication-rejected response on endpoints outside this crate.
    pub fn invalidate(&self) -> SessionState {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear credential store on invalidation");
        }
        self.publish(SessionState::default())
    }

    /// Synchronous read of the current session state. Never blocks and
    /// never touches storage or the network.
    pub fn current_state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Watch for session state changes. The receiver always holds the
    /// latest state; every transition is published exactly once.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Guard for protected views: the current state when authenticated,
    /// otherwise [`SessionError::NotAuthenticated`] for the routing layer
    /// to turn into a redirect.
    ///
    /// A lapsed credential is detected here and torn down, so subscribers
    /// observe the logged-out transition.
    pub fn require_authenticated(&self) -> Result<SessionState, SessionError> {
        let state = self.current_state();
        if state.authenticated() {
            return Ok(state);
        }

        if state.identity.is_some() {
            debug!("Credential expired; tearing session down");
            self.invalidate();
        }

        Err(SessionError::NotAuthenticated)
    }

    fn publish(&self, state: SessionState) -> SessionState {
        self.state.send_replace(state.clone());
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::LoginGrant;
    use crate::auth::credentials::{use_mock_keyring, Credential};
    use crate::models::Role;
    use async_trait::async_trait;
    use chrono::Duration;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tokio::sync::Notify;

    /// Gateway stub: replays scripted outcomes, optionally holding each
    /// response until the test releases it.
    struct StubGateway {
        outcomes: Mutex<VecDeque<Result<LoginGrant, GatewayError>>>,
        entered: Option<Arc<Notify>>,
        release: Option<Arc<Notify>>,
    }

    impl StubGateway {
        fn with_outcomes(outcomes: Vec<Result<LoginGrant, GatewayError>>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                entered: None,
                release: None,
            }
        }

        fn gated(
            outcome: Result<LoginGrant, GatewayError>,
            entered: Arc<Notify>,
            release: Arc<Notify>,
        ) -> Self {
            Self {
                outcomes: Mutex::new(vec![outcome].into()),
                entered: Some(entered),
                release: Some(release),
            }
        }
    }

    #[async_trait]
    impl AuthGateway for StubGateway {
        async fn login(&self, _email: &str, _password: &str) -> Result<LoginGrant, GatewayError> {
            if let Some(entered) = &self.entered {
                entered.notify_one();
            }
            if let Some(release) = &self.release {
                release.notified().await;
            }
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .expect("unexpected login call")
        }
    }

    fn grant_for(email: &str, role: Role, ttl_minutes: i64) -> LoginGrant {
        let issued_at = Utc::now();
        LoginGrant {
            credential: Credential {
                token: format!("token-{}", email),
                issued_at,
                expires_at: issued_at + Duration::minutes(ttl_minutes),
            },
            identity: Identity {
                id: "1".to_string(),
                display_name: "Admin".to_string(),
                email_address: email.to_string(),
                role,
            },
        }
    }

    fn manager_with(gateway: StubGateway, dir: &TempDir) -> SessionManager<StubGateway> {
        use_mock_keyring();
        let store = CredentialStore::open(dir.path().to_path_buf()).expect("Failed to open store");
        SessionManager::new(gateway, store)
    }

    fn record_path(dir: &TempDir) -> std::path::PathBuf {
        dir.path().join("session.json")
    }

    #[test]
    fn test_initialize_with_empty_store() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(StubGateway::with_outcomes(vec![]), &dir);

        let state = manager.initialize();
        assert!(!state.authenticated());
        assert!(state.identity().is_none());
    }

    #[test]
    fn test_initialize_restores_persisted_session() {
        use_mock_keyring();
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::open(dir.path().to_path_buf()).unwrap();
        let grant = grant_for("admin@example.com", Role::Moderator, 60);
        store.save(&grant.credential, &grant.identity).unwrap();

        let manager = SessionManager::new(StubGateway::with_outcomes(vec![]), store);
        let state = manager.initialize();
        assert!(state.authenticated());
        assert_eq!(state.identity().unwrap().role, Role::Moderator);
    }

    #[tokio::test]
    async fn test_login_success_publishes_identity() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(
            StubGateway::with_outcomes(vec![Ok(grant_for(
                "admin@example.com",
                Role::SuperAdmin,
                60,
            ))]),
            &dir,
        );
        manager.initialize();

        let state = manager.login("admin@example.com", "admin123").await.unwrap();
        assert!(state.authenticated());
        assert_eq!(state.identity().unwrap().role, Role::SuperAdmin);

        let current = manager.current_state();
        assert!(current.authenticated());
        assert_eq!(
            current.identity().unwrap().email_address,
            "admin@example.com"
        );
    }

    #[tokio::test]
    async fn test_login_rejection_leaves_state_logged_out() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(
            StubGateway::with_outcomes(vec![Err(GatewayError::InvalidCredentials)]),
            &dir,
        );
        manager.initialize();

        let err = manager
            .login("admin@example.com", "wrong")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Gateway(GatewayError::InvalidCredentials)
        ));
        assert!(!manager.current_state().authenticated());
        assert!(manager.current_state().identity().is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_state_and_store() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(
            StubGateway::with_outcomes(vec![Ok(grant_for("admin@example.com", Role::Admin, 60))]),
            &dir,
        );
        manager.initialize();
        manager.login("admin@example.com", "admin123").await.unwrap();
        assert!(record_path(&dir).exists());

        let state = manager.logout();
        assert!(!state.authenticated());
        assert!(state.identity().is_none());
        assert!(!record_path(&dir).exists());
    }

    #[tokio::test]
    async fn test_relogin_replaces_identity() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(
            StubGateway::with_outcomes(vec![
                Ok(grant_for("first@example.com", Role::SuperAdmin, 60)),
                Ok(grant_for("second@example.com", Role::Admin, 60)),
            ]),
            &dir,
        );
        manager.initialize();

        manager.login("first@example.com", "pw").await.unwrap();
        manager.login("second@example.com", "pw").await.unwrap();

        let state = manager.current_state();
        assert!(state.authenticated());
        assert_eq!(state.identity().unwrap().email_address, "second@example.com");
        assert_eq!(state.identity().unwrap().role, Role::Admin);
    }

    #[tokio::test]
    async fn test_rejected_relogin_tears_session_down() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(
            StubGateway::with_outcomes(vec![
                Ok(grant_for("admin@example.com", Role::Admin, 60)),
                Err(GatewayError::InvalidCredentials),
            ]),
            &dir,
        );
        manager.initialize();
        manager.login("admin@example.com", "admin123").await.unwrap();

        let err = manager
            .login("admin@example.com", "revoked")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Gateway(GatewayError::InvalidCredentials)
        ));
        assert!(!manager.current_state().authenticated());
        assert!(manager.current_state().identity().is_none());
        assert!(!record_path(&dir).exists());
    }

    #[tokio::test]
    async fn test_stale_login_response_cannot_resurrect_session() {
        let dir = TempDir::new().unwrap();
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let gateway = StubGateway::gated(
            Ok(grant_for("admin@example.com", Role::Admin, 60)),
            Arc::clone(&entered),
            Arc::clone(&release),
        );
        let manager = Arc::new(manager_with(gateway, &dir));
        manager.initialize();

        let in_flight = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.login("admin@example.com", "admin123").await }
        });

        // Let the login reach the gateway, log out underneath it, then
        // deliver the response
        entered.notified().await;
        manager.logout();
        release.notify_one();

        let result = in_flight.await.unwrap();
        assert!(matches!(result, Err(SessionError::Superseded)));
        assert!(!manager.current_state().authenticated());
        assert!(!record_path(&dir).exists());
    }

    #[tokio::test]
    async fn test_failed_persist_fails_login() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(
            StubGateway::with_outcomes(vec![Ok(grant_for("admin@example.com", Role::Admin, 60))]),
            &dir,
        );
        manager.initialize();

        // A directory squatting on the record path makes the save fail
        std::fs::create_dir(record_path(&dir)).unwrap();

        let err = manager
            .login("admin@example.com", "admin123")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Storage(StoreError::WriteFailed(_))
        ));
        assert!(!manager.current_state().authenticated());
    }

    #[tokio::test]
    async fn test_subscriber_observes_transitions() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(
            StubGateway::with_outcomes(vec![Ok(grant_for("admin@example.com", Role::Admin, 60))]),
            &dir,
        );
        manager.initialize();

        let mut rx = manager.subscribe();

        manager.login("admin@example.com", "admin123").await.unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().authenticated());

        manager.logout();
        rx.changed().await.unwrap();
        assert!(!rx.borrow_and_update().authenticated());
    }

    #[test]
    fn test_require_authenticated_when_logged_out() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(StubGateway::with_outcomes(vec![]), &dir);
        manager.initialize();

        assert!(matches!(
            manager.require_authenticated(),
            Err(SessionError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_require_authenticated_returns_live_state() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(
            StubGateway::with_outcomes(vec![Ok(grant_for("admin@example.com", Role::Admin, 60))]),
            &dir,
        );
        manager.initialize();
        manager.login("admin@example.com", "admin123").await.unwrap();

        let state = manager.require_authenticated().unwrap();
        assert_eq!(state.identity().unwrap().email_address, "admin@example.com");
    }

    #[tokio::test]
    async fn test_require_authenticated_tears_down_expired_session() {
        let dir = TempDir::new().unwrap();
        let manager = manager_with(
            StubGateway::with_outcomes(vec![Ok(grant_for("admin@example.com", Role::Admin, -1))]),
            &dir,
        );
        manager.initialize();

        // The grant is already past its window, so the published state is
        // logged-in-but-lapsed
        manager.login("admin@example.com", "admin123").await.unwrap();
        assert!(!manager.current_state().authenticated());
        assert!(manager.current_state().identity().is_some());

        let mut rx = manager.subscribe();
        assert!(matches!(
            manager.require_authenticated(),
            Err(SessionError::NotAuthenticated)
        ));

        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().identity().is_none());
        assert!(manager.current_state().identity().is_none());
        assert!(!record_path(&dir).exists());
    }
}
