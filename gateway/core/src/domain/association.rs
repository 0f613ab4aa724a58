// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Connection → Session Association
//!
//! A protocol connection is ephemeral: every new conversation opens a fresh
//! connection identifier. The caller presents a `session_id` once; the gateway
//! records an [`Association`] so that later calls on the same connection find
//! the session without presenting it again.
//!
//! An association holds only the session identifier, never the session itself.
//! Validity is decided lazily when the association is resolved.

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::session::SessionId;

/// Identifier of a protocol connection (the MCP `mcp-session-id` header).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Association {
    pub connection_id: ConnectionId,
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl Association {
    pub fn new(connection_id: ConnectionId, session_id: SessionId, now: DateTime<Utc>) -> Self {
        Self {
            connection_id,
            session_id,
            created_at: now,
            last_used_at: now,
        }
    }

    pub fn mark_used(&mut self, now: DateTime<Utc>) {
        if now > self.last_used_at {
            self.last_used_at = now;
        }
    }
}

/// Storage for associations. Implementations serialise writes per connection.
#[async_trait]
pub trait AssociationRepository: Send + Sync {
    /// Insert or replace the association for `association.connection_id`.
    /// Returns the association it replaced, if any.
    async fn upsert(&self, association: Association) -> Result<Option<Association>>;

    async fn find(&self, connection_id: &ConnectionId) -> Result<Option<Association>>;

    /// Update `last_used_at` and return the association.
    async fn mark_used(&self, connection_id: &ConnectionId, now: DateTime<Utc>) -> Result<Option<Association>>;

    /// Remove the association only if it still points at `session_id`.
    ///
    /// Lazy invalidation races with a fresh `associate` on the same connection;
    /// the compare step keeps the newer association alive.
    async fn remove_if_session(&self, connection_id: &ConnectionId, session_id: &SessionId) -> Result<bool>;

    async fn remove(&self, connection_id: &ConnectionId) -> Result<Option<Association>>;

    async fn list(&self) -> Result<Vec<Association>>;
}
