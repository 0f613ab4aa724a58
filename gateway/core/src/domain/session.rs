// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Session Aggregate
//!
//! A [`Session`] is the durable record of one authenticated identity: who the
//! user is, which internal scopes they hold, the provider credential and the
//! sliding expiry window.
//!
//! ## Session Lifecycle
//!
//! ```text
//! AuthenticationService::complete_login()
//!   └─ SessionStore::create(user_info, token, options)
//!         └─ SessionStore::touch(id)        ← every authorized call
//!         └─ SessionStore::extend(id, ttl)  ← explicit extension
//!         └─ SessionStore::invalidate(id)   ← logout / revocation / eviction
//!         └─ SessionStore::cleanup()        ← TTL lapse, background sweep
//! ```
//!
//! ## Invariants
//!
//! - `expires_at` never decreases: [`Session::touch`] and [`Session::extend`]
//!   only move it forward.
//! - `last_accessed_at` never decreases.
//! - A session is expired when `expires_at <= now`.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::scope::{missing_scopes, Scope};

/// Opaque session identifier handed to the caller after login.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    /// Generate a new random session ID.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Identity asserted by the provider, with scopes already mapped to internal names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub scopes: Vec<Scope>,
}

impl UserInfo {
    pub fn new(id: impl Into<String>, scopes: Vec<Scope>) -> Self {
        Self {
            id: id.into(),
            email: None,
            name: None,
            groups: Vec::new(),
            scopes,
        }
    }
}

/// Provider credential held by the session. Never serialized back to callers.
#[derive(Clone, PartialEq)]
pub struct SessionToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl SessionToken {
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Per-call options for [`crate::domain::session_store::SessionStore::create`].
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Use this identifier instead of generating one.
    pub session_id: Option<SessionId>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    /// Overrides the store's default TTL.
    pub ttl: Option<Duration>,
}

/// Why a session left the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum InvalidationReason {
    Logout,
    ProviderRevoked,
    Evicted,
    Expired,
    Other(String),
}

impl fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Logout => f.write_str("logout"),
            Self::ProviderRevoked => f.write_str("revoked by identity provider"),
            Self::Evicted => f.write_str("evicted by per-user session limit"),
            Self::Expired => f.write_str("expired"),
            Self::Other(reason) => f.write_str(reason),
        }
    }
}

/// Aggregate root for an authenticated identity.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub user_id: String,
    pub user_info: UserInfo,
    pub token: SessionToken,
    pub metadata: SessionMetadata,
}

impl Session {
    pub fn new(
        id: SessionId,
        user_info: UserInfo,
        token: SessionToken,
        ip_address: Option<String>,
        user_agent: Option<String>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            id,
            user_id: user_info.id.clone(),
            user_info,
            token,
            metadata: SessionMetadata {
                ip_address,
                user_agent,
                created_at: now,
                last_accessed_at: now,
                expires_at: now + ttl,
            },
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.metadata.expires_at <= now
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.metadata.expires_at
    }

    /// Record an access at `now` and slide the expiry window to `now + ttl`.
    ///
    /// Neither timestamp moves backwards, so an out-of-order touch carrying an
    /// older `now` is a no-op for fields it would otherwise rewind.
    pub fn touch(&mut self, now: DateTime<Utc>, ttl: Duration) {
        if now > self.metadata.last_accessed_at {
            self.metadata.last_accessed_at = now;
        }
        let candidate = now + ttl;
        if candidate > self.metadata.expires_at {
            self.metadata.expires_at = candidate;
        }
    }

    /// Push `expires_at` forward by `additional`. Non-positive durations are ignored.
    pub fn extend(&mut self, additional: Duration) {
        if additional > Duration::zero() {
            self.metadata.expires_at += additional;
        }
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.user_info.scopes
    }

    pub fn missing_scopes(&self, required: &[Scope]) -> Vec<Scope> {
        missing_scopes(&self.user_info.scopes, required)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_at(now: DateTime<Utc>) -> Session {
        Session::new(
            SessionId::from("abc123"),
            UserInfo::new("user-1", vec![Scope::from("read")]),
            SessionToken::new("opaque", now + Duration::hours(1)),
            None,
            None,
            now,
            Duration::hours(1),
        )
    }

    #[test]
    fn test_touch_slides_expiry_forward() {
        let now = Utc::now();
        let mut session = session_at(now);

        session.touch(now + Duration::minutes(30), Duration::hours(1));

        assert_eq!(session.metadata.last_accessed_at, now + Duration::minutes(30));
        assert_eq!(session.expires_at(), now + Duration::minutes(90));
    }

    #[test]
    fn test_touch_never_decreases_expiry() {
        let now = Utc::now();
        let mut session = session_at(now);
        session.extend(Duration::hours(5));
        let extended = session.expires_at();

        session.touch(now + Duration::minutes(1), Duration::hours(1));
        assert_eq!(session.expires_at(), extended);

        // Stale timestamp from a slow caller.
        session.touch(now - Duration::minutes(10), Duration::hours(1));
        assert_eq!(session.expires_at(), extended);
        assert_eq!(session.metadata.last_accessed_at, now);
    }

    #[test]
    fn test_extend_ignores_negative_durations() {
        let now = Utc::now();
        let mut session = session_at(now);
        let before = session.expires_at();

        session.extend(Duration::minutes(-30));

        assert_eq!(session.expires_at(), before);
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let now = Utc::now();
        let session = session_at(now);

        assert!(!session.is_expired_at(now + Duration::minutes(59)));
        assert!(session.is_expired_at(now + Duration::hours(1)));
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = SessionToken::new("super-secret", Utc::now());
        assert!(!format!("{:?}", token).contains("super-secret"));
    }
}
