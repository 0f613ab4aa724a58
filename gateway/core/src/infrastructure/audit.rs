// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Authorization Audit Logger
//!
//! Every denied tool call produces a `warn!` tracing event carrying who asked
//! (connection and session when known), which tool and why it was refused.
//! Successful authorizations are recorded at `debug`.

use tracing::{debug, warn};

use crate::domain::association::ConnectionId;
use crate::domain::scope::Scope;
use crate::domain::session::SessionId;

#[derive(Debug, Default, Clone)]
pub struct AuthorizationAuditLogger;

impl AuthorizationAuditLogger {
    pub fn new() -> Self {
        Self
    }

    pub fn log_no_session(&self, connection_id: Option<&ConnectionId>, presented: Option<&SessionId>, tool: &str) {
        warn!(
            connection_id = connection_id.map(ConnectionId::as_str).unwrap_or("-"),
            presented_session = presented.map(SessionId::as_str).unwrap_or("-"),
            tool = %tool,
            "Authorization denied: no valid session"
        );
    }

    pub fn log_insufficient_scope(&self, session_id: &SessionId, user_id: &str, tool: &str, missing: &[Scope]) {
        let missing: Vec<&str> = missing.iter().map(Scope::as_str).collect();
        warn!(
            session_id = %session_id,
            user_id = %user_id,
            tool = %tool,
            missing = ?missing,
            "Authorization denied: insufficient scope"
        );
    }

    pub fn log_allowed(&self, session_id: &SessionId, tool: &str) {
        debug!(session_id = %session_id, tool = %tool, "Authorization granted");
    }
}
