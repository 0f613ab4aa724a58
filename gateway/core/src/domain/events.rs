// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::association::ConnectionId;
use crate::domain::session::{InvalidationReason, SessionId};

/// Session lifecycle events published by the session store.
///
/// Touches are deliberately not published: they happen on every call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SessionEvent {
    SessionCreated {
        session_id: SessionId,
        user_id: String,
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    },
    SessionEvicted {
        session_id: SessionId,
        user_id: String,
        evicted_at: DateTime<Utc>,
    },
    SessionInvalidated {
        session_id: SessionId,
        user_id: String,
        reason: InvalidationReason,
        invalidated_at: DateTime<Utc>,
    },
    SessionExpired {
        session_id: SessionId,
        user_id: String,
        expired_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AuthenticationEvent {
    LoginStarted {
        state: String,
        connection_id: Option<ConnectionId>,
        started_at: DateTime<Utc>,
    },
    LoginCompleted {
        session_id: SessionId,
        user_id: String,
        completed_at: DateTime<Utc>,
    },
    LoginFailed {
        state: String,
        reason: String,
        failed_at: DateTime<Utc>,
    },
    LoggedOut {
        session_id: SessionId,
        logged_out_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AssociationEvent {
    Associated {
        connection_id: ConnectionId,
        session_id: SessionId,
        associated_at: DateTime<Utc>,
    },
    /// Removed on explicit close or because its session no longer exists.
    Closed {
        connection_id: ConnectionId,
        session_id: SessionId,
        closed_at: DateTime<Utc>,
    },
}
