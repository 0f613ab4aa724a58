// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Authentication Service
//!
//! Drives the [`AuthFlow`] state machine through a real login:
//!
//! 1. [`AuthenticationService::begin_login`] issues a PKCE challenge and a
//!    `state` nonce and returns the provider's authorization URL (`Pending`).
//! 2. The provider redirects back with `code` + `state`;
//!    [`AuthenticationService::complete_login`] checks the nonce, exchanges the
//!    code, validates the credential and creates the session (`Authenticated`).
//! 3. [`AuthenticationService::logout`] and [`AuthenticationService::revoke_user`]
//!    move flows to `Revoked`; expiry is noticed lazily by
//!    [`AuthenticationService::status`] and by [`AuthenticationService::sweep`].
//!
//! A login begun on behalf of a protocol connection is associated with that
//! connection as soon as it completes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::anyhow;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::application::association_bridge::AssociationBridge;
use crate::domain::association::ConnectionId;
use crate::domain::authentication::{
    AuthFlow, AuthState, IdentityProvider, PendingLogin, ProviderError, Remediation, TokenValidator,
    ValidationFailure,
};
use crate::domain::clock::Clock;
use crate::domain::errors::GatewayError;
use crate::domain::events::AuthenticationEvent;
use crate::domain::gateway_config::IdentityProviderConfig;
use crate::domain::session::{InvalidationReason, SessionId, SessionOptions, SessionToken};
use crate::domain::session_store::SessionStore;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::identity::PkceChallenge;

#[derive(Debug, Clone, Copy)]
pub struct AuthenticationSettings {
    /// Lifetime of an unanswered login.
    pub pending_login_ttl: Duration,
    /// Bound on each provider round trip (code exchange, validation).
    pub provider_timeout: StdDuration,
    /// Unanswered logins kept at once; the oldest is dropped past this.
    pub max_pending_logins: usize,
}

impl Default for AuthenticationSettings {
    fn default() -> Self {
        Self {
            pending_login_ttl: Duration::minutes(10),
            provider_timeout: StdDuration::from_secs(10),
            max_pending_logins: 1024,
        }
    }
}

impl AuthenticationSettings {
    pub fn from_config(config: &IdentityProviderConfig) -> Self {
        Self {
            pending_login_ttl: config.pending_login_ttl(),
            provider_timeout: config.timeout(),
            max_pending_logins: config.max_pending_logins,
        }
    }
}

/// Returned by [`AuthenticationService::begin_login`].
#[derive(Debug, Clone, Serialize)]
pub struct LoginChallenge {
    pub authorization_url: String,
    pub state: String,
    pub expires_at: DateTime<Utc>,
}

/// Returned by [`AuthenticationService::complete_login`].
#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub session_id: SessionId,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
    /// Connection the login was started from, now associated with the session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<ConnectionId>,
    pub instructions: String,
}

pub struct AuthenticationService {
    provider: Arc<dyn IdentityProvider>,
    validator: Arc<dyn TokenValidator>,
    sessions: Arc<dyn SessionStore>,
    bridge: Arc<AssociationBridge>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    settings: AuthenticationSettings,
    // Keyed by the `state` nonce
    pending: Mutex<HashMap<String, PendingLogin>>,
    // Completed flows, keyed by the session they produced
    flows: Mutex<HashMap<SessionId, AuthFlow>>,
}

impl AuthenticationService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        validator: Arc<dyn TokenValidator>,
        sessions: Arc<dyn SessionStore>,
        bridge: Arc<AssociationBridge>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
        settings: AuthenticationSettings,
    ) -> Self {
        Self {
            provider,
            validator,
            sessions,
            bridge,
            clock,
            event_bus,
            settings,
            pending: Mutex::new(HashMap::new()),
            flows: Mutex::new(HashMap::new()),
        }
    }

    /// Start a login: `Unauthenticated → Pending`.
    pub async fn begin_login(&self, connection_id: Option<ConnectionId>) -> Result<LoginChallenge, GatewayError> {
        let now = self.clock.now();
        let expires_at = now + self.settings.pending_login_ttl;
        let pkce = PkceChallenge::generate();

        let authorization_url = self
            .provider
            .authorization_url(&pkce.state, &pkce.code_challenge)
            .map_err(|e| GatewayError::ProviderUnavailable(e.to_string()))?;

        let mut flow = AuthFlow::new(connection_id.clone(), now);
        flow.begin(now, expires_at).map_err(anyhow::Error::from)?;

        let evicted = {
            let mut pending = self.pending.lock();
            pending.insert(
                pkce.state.clone(),
                PendingLogin {
                    state: pkce.state.clone(),
                    code_verifier: pkce.code_verifier,
                    authorization_url: authorization_url.clone(),
                    flow,
                    created_at: now,
                    expires_at,
                },
            );
            evict_oldest(&mut pending, self.settings.max_pending_logins, &pkce.state)
        };
        for state in &evicted {
            warn!(state = %state, "Pending login evicted at capacity");
            self.login_failed(state, "pending login evicted");
        }

        debug!(state = %pkce.state, connection_id = ?connection_id, "Login started");
        self.event_bus
            .publish_authentication_event(AuthenticationEvent::LoginStarted {
                state: pkce.state.clone(),
                connection_id,
                started_at: now,
            });

        Ok(LoginChallenge {
            authorization_url,
            state: pkce.state,
            expires_at,
        })
    }

    /// Remediation for a caller without a session: the connection's newest
    /// unexpired login if it has one, else a fresh login bound to it.
    pub async fn remediation(&self, connection_id: Option<&ConnectionId>) -> Result<Remediation, GatewayError> {
        if let Some(connection_id) = connection_id {
            let now = self.clock.now();
            let reusable = self
                .pending
                .lock()
                .values()
                .filter(|p| p.expires_at > now && p.flow.connection_id() == Some(connection_id))
                .max_by_key(|p| p.created_at)
                .map(|p| p.authorization_url.clone());
            if let Some(url) = reusable {
                return Ok(Remediation::login(url));
            }
        }
        let challenge = self.begin_login(connection_id.cloned()).await?;
        Ok(Remediation::login(challenge.authorization_url))
    }

    /// Finish a login from the provider callback: `Pending → Authenticated`.
    ///
    /// The `state` nonce is single use. A session exists only if every check
    /// passed.
    pub async fn complete_login(&self, state: &str, code: &str) -> Result<LoginResult, GatewayError> {
        let now = self.clock.now();
        let pending = self
            .pending
            .lock()
            .remove(state)
            .ok_or_else(|| GatewayError::InvalidRequest("unknown or already used login state".to_string()))?;

        if pending.expires_at <= now {
            self.login_failed(state, "login expired before callback");
            let remediation = self.remediation(pending.flow.connection_id()).await?;
            return Err(GatewayError::AuthenticationRequired { remediation });
        }

        let timeout = self.settings.provider_timeout;
        let tokens = match tokio::time::timeout(timeout, self.provider.exchange_code(code, &pending.code_verifier)).await
        {
            Err(_) => {
                self.login_failed(state, "code exchange timed out");
                return Err(GatewayError::ProviderUnavailable(format!(
                    "code exchange timed out after {}s",
                    timeout.as_secs()
                )));
            }
            Ok(Err(ProviderError::Rejected { status, message })) => {
                self.login_failed(state, &message);
                return Err(GatewayError::InvalidRequest(format!(
                    "authorization code rejected ({status}): {message}"
                )));
            }
            Ok(Err(e)) => {
                self.login_failed(state, &e.to_string());
                return Err(GatewayError::ProviderUnavailable(e.to_string()));
            }
            Ok(Ok(tokens)) => tokens,
        };

        let validation = match tokio::time::timeout(timeout, self.validator.validate(&tokens.access_token)).await {
            Err(_) => {
                self.login_failed(state, "token validation timed out");
                return Err(GatewayError::ProviderUnavailable("token validation timed out".to_string()));
            }
            Ok(result) => result?,
        };

        if !validation.valid {
            let reason = validation.error.unwrap_or(ValidationFailure::Malformed);
            self.login_failed(state, &reason.to_string());
            warn!(state = %state, reason = %reason, "Provider credential rejected");
            return Err(GatewayError::ValidationError { reason });
        }
        let user_info = validation
            .user_info
            .ok_or_else(|| anyhow!("validator accepted a token without user info"))?;
        let token_expires_at = validation.expires_at.unwrap_or(now);

        let session = self
            .sessions
            .create(
                user_info,
                SessionToken::new(tokens.access_token, token_expires_at),
                SessionOptions::default(),
            )
            .await?;

        let mut flow = pending.flow;
        flow.complete(session.id.clone(), session.expires_at(), self.clock.now())
            .map_err(anyhow::Error::from)?;
        let connection_id = flow.connection_id().cloned();
        self.flows.lock().insert(session.id.clone(), flow);

        let connection_id = match connection_id {
            Some(conn) => {
                let associated = self.bridge.associate(&conn, &session.id).await?;
                associated.then_some(conn)
            }
            None => None,
        };

        info!(session_id = %session.id, user_id = %session.user_id, "Login completed");
        self.event_bus
            .publish_authentication_event(AuthenticationEvent::LoginCompleted {
                session_id: session.id.clone(),
                user_id: session.user_id.clone(),
                completed_at: self.clock.now(),
            });

        Ok(LoginResult {
            instructions: format!(
                "Authenticated. Pass \"session_id\": \"{}\" once in the arguments of your next tool call; the \
                 connection is remembered afterwards.",
                session.id
            ),
            session_id: session.id,
            user_id: session.user_id,
            expires_at: session.metadata.expires_at,
            connection_id,
        })
    }

    /// Invalidate one session. Associations pointing at it are dropped lazily.
    pub async fn logout(&self, session_id: &SessionId) -> anyhow::Result<bool> {
        let removed = self.sessions.invalidate(session_id, InvalidationReason::Logout).await?;
        self.revoke_flow(session_id, InvalidationReason::Logout);

        if removed {
            info!(session_id = %session_id, "Logged out");
            self.event_bus
                .publish_authentication_event(AuthenticationEvent::LoggedOut {
                    session_id: session_id.clone(),
                    logged_out_at: self.clock.now(),
                });
        }
        Ok(removed)
    }

    /// Explicit invalidation of a protocol connection: its association is
    /// closed and the logins it started go back to `Unauthenticated`, so
    /// their callbacks are refused.
    pub async fn close_connection(&self, connection_id: &ConnectionId) -> anyhow::Result<Option<SessionId>> {
        let closed = self.bridge.close(connection_id).await?;

        let now = self.clock.now();
        let cancelled: Vec<PendingLogin> = {
            let mut pending = self.pending.lock();
            let states: Vec<String> = pending
                .values()
                .filter(|p| p.flow.connection_id() == Some(connection_id))
                .map(|p| p.state.clone())
                .collect();
            states.iter().filter_map(|state| pending.remove(state)).collect()
        };
        for mut login in cancelled {
            login.flow.reset(now);
            debug!(state = %login.state, flow = login.flow.state().name(), "Login cancelled with its connection");
            self.login_failed(&login.state, "connection closed");
        }

        Ok(closed)
    }

    /// Provider-side revocation: drop every session of `user_id`.
    pub async fn revoke_user(&self, user_id: &str) -> anyhow::Result<usize> {
        let sessions = self.sessions.sessions_for_user(user_id).await?;
        let count = self
            .sessions
            .invalidate_all_for_user(user_id, InvalidationReason::ProviderRevoked)
            .await?;
        for session in &sessions {
            self.revoke_flow(&session.id, InvalidationReason::ProviderRevoked);
        }
        warn!(user_id = %user_id, count, "Revoked all sessions of user");
        Ok(count)
    }

    /// Authentication state seen by a caller.
    ///
    /// A live session wins; otherwise the last known flow state of that
    /// session, then a pending login started from the connection.
    pub async fn status(
        &self,
        connection_id: Option<&ConnectionId>,
        session_id: Option<&SessionId>,
    ) -> anyhow::Result<AuthState> {
        if let Some(session_id) = session_id {
            if let Some(session) = self.sessions.get(session_id).await? {
                return Ok(AuthState::Authenticated {
                    session_id: session.id.clone(),
                    expires_at: session.expires_at(),
                });
            }
            let now = self.clock.now();
            let mut flows = self.flows.lock();
            if let Some(flow) = flows.get_mut(session_id) {
                if matches!(flow.state(), AuthState::Authenticated { .. }) && flow.expire(now).is_ok() {
                    debug!(session_id = %session_id, "Flow expired with its session");
                }
                return Ok(flow.state().clone());
            }
        }

        if let Some(connection_id) = connection_id {
            let now = self.clock.now();
            let pending = self.pending.lock();
            if let Some(login) = pending
                .values()
                .filter(|p| p.expires_at > now && p.flow.connection_id() == Some(connection_id))
                .max_by_key(|p| p.created_at)
            {
                return Ok(login.flow.state().clone());
            }
        }

        Ok(AuthState::Unauthenticated)
    }

    /// Housekeeping: drop expired pending logins, expire flows whose session
    /// is gone and forget terminal flows older than the pending-login TTL.
    ///
    /// Returns the number of pending logins that expired.
    pub async fn sweep(&self) -> anyhow::Result<usize> {
        let now = self.clock.now();

        let expired: Vec<String> = {
            let mut pending = self.pending.lock();
            let expired = pending
                .values()
                .filter(|p| p.expires_at <= now)
                .map(|p| p.state.clone())
                .collect::<Vec<_>>();
            pending.retain(|_, p| p.expires_at > now);
            expired
        };
        for state in &expired {
            self.login_failed(state, "login expired before callback");
        }

        let authenticated: Vec<SessionId> = self
            .flows
            .lock()
            .iter()
            .filter(|(_, flow)| matches!(flow.state(), AuthState::Authenticated { .. }))
            .map(|(id, _)| id.clone())
            .collect();
        let mut gone = Vec::new();
        for session_id in authenticated {
            if !self.sessions.is_valid(&session_id).await? {
                gone.push(session_id);
            }
        }

        let retention = self.settings.pending_login_ttl;
        let mut flows = self.flows.lock();
        for session_id in &gone {
            if let Some(flow) = flows.get_mut(session_id) {
                // A concurrent logout may already have revoked it.
                let _ = flow.expire(now);
            }
        }
        flows.retain(|_, flow| !(flow.state().is_terminal() && flow.updated_at() + retention <= now));

        Ok(expired.len())
    }

    pub fn pending_logins(&self) -> usize {
        self.pending.lock().len()
    }

    fn revoke_flow(&self, session_id: &SessionId, reason: InvalidationReason) {
        let now = self.clock.now();
        if let Some(flow) = self.flows.lock().get_mut(session_id) {
            if let Err(e) = flow.revoke(reason, now) {
                debug!(session_id = %session_id, error = %e, "Flow not revoked");
            }
        }
    }

    fn login_failed(&self, state: &str, reason: &str) {
        self.event_bus
            .publish_authentication_event(AuthenticationEvent::LoginFailed {
                state: state.to_string(),
                reason: reason.to_string(),
                failed_at: self.clock.now(),
            });
    }
}

/// Drop the oldest entries other than `keep` until at most `limit` remain;
/// returns their states.
fn evict_oldest(pending: &mut HashMap<String, PendingLogin>, limit: usize, keep: &str) -> Vec<String> {
    let excess = pending.len().saturating_sub(limit.max(1));
    if excess == 0 {
        return Vec::new();
    }
    let mut by_age: Vec<(DateTime<Utc>, String)> = pending
        .values()
        .filter(|p| p.state != keep)
        .map(|p| (p.created_at, p.state.clone()))
        .collect();
    by_age.sort();
    by_age
        .into_iter()
        .take(excess)
        .filter_map(|(_, state)| pending.remove(&state).map(|p| p.state))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::Harness;
    use crate::domain::scope::Scope;

    #[tokio::test]
    async fn test_full_login_associates_originating_connection() {
        let h = Harness::new();
        let conn = ConnectionId::from("conn1");

        let challenge = h.auth.begin_login(Some(conn.clone())).await.unwrap();
        assert!(challenge.authorization_url.contains(&challenge.state));
        assert_eq!(h.auth.status(Some(&conn), None).await.unwrap().name(), "pending");

        h.validator.accept("code-ok", "alice", &["read"]);
        let result = h.auth.complete_login(&challenge.state, "code-ok").await.unwrap();

        assert_eq!(result.user_id, "alice");
        assert_eq!(result.connection_id, Some(conn.clone()));
        assert_eq!(h.bridge.resolve(&conn).await.unwrap(), Some(result.session_id.clone()));
        let session = h.sessions.get(&result.session_id).await.unwrap().unwrap();
        assert_eq!(session.scopes(), &[Scope::from("read")]);
        assert_eq!(h.auth.pending_logins(), 0);
    }

    #[tokio::test]
    async fn test_state_is_single_use() {
        let h = Harness::new();
        h.validator.accept("code-ok", "alice", &["read"]);
        let challenge = h.auth.begin_login(None).await.unwrap();

        h.auth.complete_login(&challenge.state, "code-ok").await.unwrap();
        let replay = h.auth.complete_login(&challenge.state, "code-ok").await.unwrap_err();
        assert!(matches!(replay, GatewayError::InvalidRequest(_)));

        let forged = h.auth.complete_login("forged-state", "code-ok").await.unwrap_err();
        assert!(matches!(forged, GatewayError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_expired_pending_login_requires_new_login() {
        let h = Harness::new();
        h.validator.accept("code-ok", "alice", &["read"]);
        let challenge = h.auth.begin_login(None).await.unwrap();

        h.clock.advance(Duration::minutes(11));
        let err = h.auth.complete_login(&challenge.state, "code-ok").await.unwrap_err();
        match err {
            GatewayError::AuthenticationRequired { remediation } => {
                assert!(!remediation.authorization_url.is_empty())
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(h.sessions.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_invalid_credential_creates_no_session() {
        let h = Harness::new();
        h.validator.reject("code-bad", ValidationFailure::WrongAudience);
        let challenge = h.auth.begin_login(None).await.unwrap();

        let err = h.auth.complete_login(&challenge.state, "code-bad").await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::ValidationError {
                reason: ValidationFailure::WrongAudience
            }
        ));
        assert_eq!(h.sessions.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_provider_outage_surfaces_provider_unavailable() {
        let h = Harness::new();
        h.provider.fail_with(ProviderError::Unreachable("connection refused".to_string()));
        let challenge = h.auth.begin_login(None).await.unwrap();

        let err = h.auth.complete_login(&challenge.state, "code").await.unwrap_err();
        assert!(matches!(err, GatewayError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn test_logout_revokes_flow() {
        let h = Harness::new();
        let session_id = h.login("alice", &["read"]).await;

        assert!(h.auth.logout(&session_id).await.unwrap());
        assert!(!h.auth.logout(&session_id).await.unwrap());

        let state = h.auth.status(None, Some(&session_id)).await.unwrap();
        assert_eq!(state.name(), "revoked");
    }

    #[tokio::test]
    async fn test_status_reports_expiry() {
        let h = Harness::new();
        let session_id = h.login("alice", &["read"]).await;
        assert_eq!(h.auth.status(None, Some(&session_id)).await.unwrap().name(), "authenticated");

        h.clock.advance(Duration::hours(2));
        assert_eq!(h.auth.status(None, Some(&session_id)).await.unwrap().name(), "expired");
        assert_eq!(h.auth.status(None, None).await.unwrap(), AuthState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_revoke_user_drops_all_sessions() {
        let h = Harness::with_limit(3);
        let first = h.login("alice", &["read"]).await;
        let second = h.login("alice", &["read"]).await;
        let other = h.login("bob", &["read"]).await;

        assert_eq!(h.auth.revoke_user("alice").await.unwrap(), 2);
        assert!(!h.sessions.is_valid(&first).await.unwrap());
        assert!(!h.sessions.is_valid(&second).await.unwrap());
        assert!(h.sessions.is_valid(&other).await.unwrap());
    }

    #[tokio::test]
    async fn test_sweep_expires_pending_logins() {
        let h = Harness::new();
        h.auth.begin_login(None).await.unwrap();
        h.auth.begin_login(None).await.unwrap();
        assert_eq!(h.auth.sweep().await.unwrap(), 0);

        h.clock.advance(Duration::minutes(10));
        assert_eq!(h.auth.sweep().await.unwrap(), 2);
        assert_eq!(h.auth.pending_logins(), 0);
    }

    #[tokio::test]
    async fn test_remediation_reuses_pending_login_per_connection() {
        let h = Harness::new();
        let conn = ConnectionId::from("conn1");

        let first = h.auth.remediation(Some(&conn)).await.unwrap();
        for _ in 0..20 {
            let again = h.auth.remediation(Some(&conn)).await.unwrap();
            assert_eq!(again.authorization_url, first.authorization_url);
        }
        assert_eq!(h.auth.pending_logins(), 1);

        h.auth.remediation(Some(&ConnectionId::from("conn2"))).await.unwrap();
        assert_eq!(h.auth.pending_logins(), 2);

        h.clock.advance(Duration::minutes(11));
        let fresh = h.auth.remediation(Some(&conn)).await.unwrap();
        assert_ne!(fresh.authorization_url, first.authorization_url);
    }

    #[tokio::test]
    async fn test_pending_logins_are_capped() {
        let h = Harness::with_auth_settings(AuthenticationSettings {
            max_pending_logins: 3,
            ..AuthenticationSettings::default()
        });

        let oldest = h.auth.begin_login(None).await.unwrap();
        h.clock.advance(Duration::seconds(1));
        for _ in 0..5 {
            h.auth.remediation(None).await.unwrap();
        }
        let newest = h.auth.begin_login(None).await.unwrap();
        assert_eq!(h.auth.pending_logins(), 3);

        let err = h.auth.complete_login(&oldest.state, "code").await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)));

        h.validator.accept("newest-code", "alice", &["read"]);
        h.auth.complete_login(&newest.state, "newest-code").await.unwrap();
    }


    #[tokio::test]
    async fn test_closing_connection_cancels_its_logins() {
        let h = Harness::new();
        let conn = ConnectionId::from("conn1");
        let challenge = h.auth.begin_login(Some(conn.clone())).await.unwrap();
        h.auth.begin_login(Some(ConnectionId::from("conn2"))).await.unwrap();
        assert!(matches!(
            h.auth.status(Some(&conn), None).await.unwrap(),
            AuthState::Pending { .. }
        ));

        assert!(h.auth.close_connection(&conn).await.unwrap().is_none());

        assert_eq!(h.auth.status(Some(&conn), None).await.unwrap(), AuthState::Unauthenticated);
        assert_eq!(h.auth.pending_logins(), 1);
        h.validator.accept("late-code", "alice", &["read"]);
        let err = h.auth.complete_login(&challenge.state, "late-code").await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRequest(_)));
    }

}
