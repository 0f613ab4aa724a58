// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Authentication State Machine
//!
//! ```text
//! Unauthenticated ──begin──▶ Pending ──complete──▶ Authenticated ──expire──▶ Expired
//!        ▲                      │                        │
//!        │                      └──expire──▶ Expired      └──revoke──▶ Revoked
//!        └───────────────────── reset (from any state) ──────────────────────┘
//! ```
//!
//! A session is only created on the `Pending → Authenticated` edge, after the
//! provider credential passed signature, expiry, issuer and audience checks and
//! at least one provider scope mapped to an internal scope.
//!
//! Expected validation failures are values ([`TokenValidation`]), not errors.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::association::ConnectionId;
use crate::domain::session::{InvalidationReason, SessionId, UserInfo};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthState {
    Unauthenticated,
    Pending {
        started_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    },
    Authenticated {
        session_id: SessionId,
        expires_at: DateTime<Utc>,
    },
    Expired,
    Revoked {
        reason: InvalidationReason,
    },
}

impl AuthState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Pending { .. } => "pending",
            Self::Authenticated { .. } => "authenticated",
            Self::Expired => "expired",
            Self::Revoked { .. } => "revoked",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Expired | Self::Revoked { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid authentication transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: &'static str,
    pub to: &'static str,
}

/// One login attempt and everything that happens to the session it produced.
#[derive(Debug, Clone)]
pub struct AuthFlow {
    state: AuthState,
    connection_id: Option<ConnectionId>,
    updated_at: DateTime<Utc>,
}

impl AuthFlow {
    pub fn new(connection_id: Option<ConnectionId>, now: DateTime<Utc>) -> Self {
        Self {
            state: AuthState::Unauthenticated,
            connection_id,
            updated_at: now,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn connection_id(&self) -> Option<&ConnectionId> {
        self.connection_id.as_ref()
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        match &self.state {
            AuthState::Authenticated { session_id, .. } => Some(session_id),
            _ => None,
        }
    }

    pub fn begin(&mut self, now: DateTime<Utc>, expires_at: DateTime<Utc>) -> Result<(), InvalidTransition> {
        match self.state {
            AuthState::Unauthenticated | AuthState::Expired | AuthState::Revoked { .. } => {
                self.transition(
                    AuthState::Pending {
                        started_at: now,
                        expires_at,
                    },
                    now,
                );
                Ok(())
            }
            _ => Err(self.invalid("pending")),
        }
    }

    pub fn complete(
        &mut self,
        session_id: SessionId,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(), InvalidTransition> {
        match self.state {
            AuthState::Pending { .. } => {
                self.transition(AuthState::Authenticated { session_id, expires_at }, now);
                Ok(())
            }
            _ => Err(self.invalid("authenticated")),
        }
    }

    pub fn expire(&mut self, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        match self.state {
            AuthState::Pending { .. } | AuthState::Authenticated { .. } => {
                self.transition(AuthState::Expired, now);
                Ok(())
            }
            _ => Err(self.invalid("expired")),
        }
    }

    pub fn revoke(&mut self, reason: InvalidationReason, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        match self.state {
            AuthState::Authenticated { .. } => {
                self.transition(AuthState::Revoked { reason }, now);
                Ok(())
            }
            _ => Err(self.invalid("revoked")),
        }
    }

    /// Explicit invalidation: allowed from every state.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.transition(AuthState::Unauthenticated, now);
    }

    fn transition(&mut self, next: AuthState, now: DateTime<Utc>) {
        self.state = next;
        self.updated_at = now;
    }

    fn invalid(&self, to: &'static str) -> InvalidTransition {
        InvalidTransition {
            from: self.state.name(),
            to,
        }
    }
}

/// A login awaiting its provider callback, keyed by the `state` nonce.
#[derive(Clone)]
pub struct PendingLogin {
    pub state: String,
    pub code_verifier: String,
    pub authorization_url: String,
    pub flow: AuthFlow,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl fmt::Debug for PendingLogin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingLogin")
            .field("state", &self.state)
            .field("code_verifier", &"<redacted>")
            .field("flow", &self.flow)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// What the caller must do to obtain a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Remediation {
    pub authorization_url: String,
    pub instructions: String,
}

impl Remediation {
    pub fn login(authorization_url: impl Into<String>) -> Self {
        Self {
            authorization_url: authorization_url.into(),
            instructions: "Open the authorization URL in a browser and sign in. The callback page returns a \
                           session_id; pass it once as the `session_id` argument of your next tool call and this \
                           connection stays authenticated afterwards."
                .to_string(),
        }
    }
}

/// Reason a provider credential was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationFailure {
    Expired,
    Malformed,
    InvalidSignature,
    WrongIssuer,
    WrongAudience,
    /// Signature and claims are fine but nothing maps to an internal scope.
    NoMappedScopes,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Expired => "token expired",
            Self::Malformed => "token malformed",
            Self::InvalidSignature => "token signature invalid",
            Self::WrongIssuer => "token issuer not trusted",
            Self::WrongAudience => "token audience not accepted",
            Self::NoMappedScopes => "token grants no gateway scopes",
        };
        f.write_str(text)
    }
}

/// Outcome of validating a provider credential.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenValidation {
    pub valid: bool,
    pub user_info: Option<UserInfo>,
    pub expires_at: Option<DateTime<Utc>>,
    pub error: Option<ValidationFailure>,
}

impl TokenValidation {
    pub fn success(user_info: UserInfo, expires_at: DateTime<Utc>) -> Self {
        Self {
            valid: true,
            user_info: Some(user_info),
            expires_at: Some(expires_at),
            error: None,
        }
    }

    pub fn failure(reason: ValidationFailure) -> Self {
        Self {
            valid: false,
            user_info: None,
            expires_at: None,
            error: Some(reason),
        }
    }
}

/// Checks a provider credential and maps its scopes.
///
/// Returns `Err` only for infrastructure faults (e.g. an unusable key).
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, token: &str) -> anyhow::Result<TokenValidation>;
}

/// Tokens returned by the provider's token endpoint.
#[derive(Clone, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("identity provider unreachable: {0}")]
    Unreachable(String),

    #[error("identity provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("identity provider returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// External OAuth2 authorization server.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Browser URL that starts the authorization code flow.
    fn authorization_url(&self, state: &str, code_challenge: &str) -> Result<String, ProviderError>;

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenSet, ProviderError>;
}
