// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;

use tracing::debug;

use crate::application::association_bridge::AssociationBridge;
use crate::application::authentication_service::AuthenticationService;
use crate::domain::association::ConnectionId;
use crate::domain::authentication::Remediation;
use crate::domain::errors::GatewayError;
use crate::domain::scope::Scope;
use crate::domain::session::{Session, SessionId};
use crate::domain::session_store::SessionStore;
use crate::infrastructure::audit::AuthorizationAuditLogger;

/// Who is calling: the protocol connection, an explicitly presented
/// `session_id`, or both (the one-time hand-off).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallerIdentity {
    pub connection_id: Option<ConnectionId>,
    pub session_id: Option<SessionId>,
}

impl CallerIdentity {
    pub fn connection(connection_id: impl Into<ConnectionId>) -> Self {
        Self {
            connection_id: Some(connection_id.into()),
            session_id: None,
        }
    }

    pub fn session(session_id: SessionId) -> Self {
        Self {
            connection_id: None,
            session_id: Some(session_id),
        }
    }

    pub fn with_session(mut self, session_id: Option<SessionId>) -> Self {
        self.session_id = session_id;
        self
    }
}

#[derive(Debug, Clone)]
pub enum AuthorizationDecision {
    /// The session has every required scope and has been touched.
    Allow { session: Session },
    DenyNoSession {
        remediation: Remediation,
        /// Explicitly presented session that turned out to be invalid.
        presented: Option<SessionId>,
    },
    DenyInsufficientScope { session_id: SessionId, missing: Vec<Scope> },
}

impl AuthorizationDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    /// Convert a denial into the error reported for `tool`.
    pub fn into_result(self, tool: &str) -> Result<Session, GatewayError> {
        match self {
            Self::Allow { session } => Ok(session),
            Self::DenyNoSession {
                remediation,
                presented: Some(session_id),
            } => Err(GatewayError::SessionExpired {
                session_id: session_id.to_string(),
                remediation,
            }),
            Self::DenyNoSession { remediation, .. } => Err(GatewayError::AuthenticationRequired { remediation }),
            Self::DenyInsufficientScope { missing, .. } => Err(GatewayError::InsufficientScope {
                tool: tool.to_string(),
                missing,
            }),
        }
    }
}

/// Resolves the effective session of a call and checks its scopes.
pub struct AuthorizationGate {
    sessions: Arc<dyn SessionStore>,
    bridge: Arc<AssociationBridge>,
    auth: Arc<AuthenticationService>,
    audit: AuthorizationAuditLogger,
}

impl AuthorizationGate {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        bridge: Arc<AssociationBridge>,
        auth: Arc<AuthenticationService>,
    ) -> Self {
        Self {
            sessions,
            bridge,
            auth,
            audit: AuthorizationAuditLogger::new(),
        }
    }

    /// Session the caller acts as, without checking scopes or touching it.
    ///
    /// Presenting `session_id` together with a connection binds the two.
    pub async fn resolve_session(&self, caller: &CallerIdentity) -> anyhow::Result<Option<SessionId>> {
        match (&caller.session_id, &caller.connection_id) {
            (Some(session_id), Some(connection_id)) => {
                self.bridge.associate(connection_id, session_id).await?;
                Ok(Some(session_id.clone()))
            }
            (Some(session_id), None) => Ok(Some(session_id.clone())),
            (None, Some(connection_id)) => self.bridge.resolve(connection_id).await,
            (None, None) => Ok(None),
        }
    }

    /// `required` must all be granted. Only an `Allow` touches the session.
    pub async fn authorize(
        &self,
        caller: &CallerIdentity,
        tool: &str,
        required: &[Scope],
    ) -> Result<AuthorizationDecision, GatewayError> {
        let session = match self.resolve_session(caller).await? {
            Some(session_id) => self.sessions.get(&session_id).await?,
            None => None,
        };

        let Some(session) = session else {
            return self.deny_no_session(caller, tool).await;
        };

        let missing = session.missing_scopes(required);
        if !missing.is_empty() {
            self.audit
                .log_insufficient_scope(&session.id, &session.user_id, tool, &missing);
            return Ok(AuthorizationDecision::DenyInsufficientScope {
                session_id: session.id,
                missing,
            });
        }

        // Expired between the lookup and now.
        let Some(session) = self.sessions.touch(&session.id).await? else {
            return self.deny_no_session(caller, tool).await;
        };

        self.audit.log_allowed(&session.id, tool);
        debug!(session_id = %session.id, expires_at = %session.expires_at(), "Session touched");
        Ok(AuthorizationDecision::Allow { session })
    }

    async fn deny_no_session(&self, caller: &CallerIdentity, tool: &str) -> Result<AuthorizationDecision, GatewayError> {
        self.audit
            .log_no_session(caller.connection_id.as_ref(), caller.session_id.as_ref(), tool);
        let remediation = self.auth.remediation(caller.connection_id.as_ref()).await?;
        Ok(AuthorizationDecision::DenyNoSession {
            remediation,
            presented: caller.session_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::Harness;
    use chrono::Duration;

    fn gate(h: &Harness) -> AuthorizationGate {
        AuthorizationGate::new(h.sessions.clone(), h.bridge.clone(), h.auth.clone())
    }

    #[tokio::test]
    async fn test_unassociated_connection_is_denied_with_login_url() {
        let h = Harness::new();
        let session_id = h.login("alice", &["read"]).await;
        let before = h.sessions.get(&session_id).await.unwrap().unwrap();

        let decision = gate(&h)
            .authorize(&CallerIdentity::connection("conn-x"), "search-sap-services", &[Scope::from("read")])
            .await
            .unwrap();

        match decision {
            AuthorizationDecision::DenyNoSession { remediation, presented } => {
                assert!(!remediation.authorization_url.is_empty());
                assert!(presented.is_none());
            }
            other => panic!("unexpected decision: {other:?}"),
        }
        let after = h.sessions.get(&session_id).await.unwrap().unwrap();
        assert_eq!(before.metadata.last_accessed_at, after.metadata.last_accessed_at);
    }

    #[tokio::test]
    async fn test_missing_scopes_are_listed_exactly() {
        let h = Harness::new();
        let session_id = h.login("alice", &["read"]).await;
        let before = h.sessions.get(&session_id).await.unwrap().unwrap();
        h.clock.advance(Duration::seconds(30));

        let decision = gate(&h)
            .authorize(
                &CallerIdentity::session(session_id.clone()),
                "execute-entity-operation",
                &[Scope::from("read"), Scope::from("write")],
            )
            .await
            .unwrap();

        match decision {
            AuthorizationDecision::DenyInsufficientScope { missing, .. } => {
                assert_eq!(missing, vec![Scope::from("write")])
            }
            other => panic!("unexpected decision: {other:?}"),
        }
        let after = h.sessions.get(&session_id).await.unwrap().unwrap();
        assert_eq!(before.expires_at(), after.expires_at());
    }

    #[tokio::test]
    async fn test_allow_touches_session() {
        let h = Harness::new();
        let session_id = h.login("alice", &["read"]).await;
        let before = h.sessions.get(&session_id).await.unwrap().unwrap();
        h.clock.advance(Duration::minutes(5));

        let decision = gate(&h)
            .authorize(&CallerIdentity::session(session_id.clone()), "search-sap-services", &[Scope::from("read")])
            .await
            .unwrap();

        assert!(decision.is_allowed());
        let after = h.sessions.get(&session_id).await.unwrap().unwrap();
        assert!(after.expires_at() > before.expires_at());
    }

    #[tokio::test]
    async fn test_hand_off_then_connection_only() {
        let h = Harness::new();
        let session_id = h.login("alice", &["read"]).await;
        let gate = gate(&h);
        let read = [Scope::from("read")];

        let first = CallerIdentity::connection("conn1").with_session(Some(session_id.clone()));
        assert!(gate.authorize(&first, "t", &read).await.unwrap().is_allowed());
        assert!(gate.authorize(&CallerIdentity::connection("conn1"), "t", &read).await.unwrap().is_allowed());
        assert!(!gate.authorize(&CallerIdentity::connection("conn2"), "t", &read).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn test_stale_explicit_session_maps_to_session_expired() {
        let h = Harness::new();
        let session_id = h.login("alice", &["read"]).await;
        h.clock.advance(Duration::hours(2));

        let decision = gate(&h)
            .authorize(&CallerIdentity::session(session_id.clone()), "t", &[Scope::from("read")])
            .await
            .unwrap();
        let err = decision.into_result("t").unwrap_err();
        assert_eq!(err.code(), "session_expired");
    }
}
