// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;

use crate::domain::session::{InvalidationReason, Session, SessionId, SessionOptions, SessionToken, UserInfo};

/// Owner of every [`Session`].
///
/// Lookups never fail for "not found" or "expired": they return `None` /
/// `false`. `Err` is reserved for storage faults.
///
/// Implementations must serialise mutations per session so that two concurrent
/// `touch` calls cannot lose an update, and `cleanup` must re-check expiry of
/// each entry at the moment it removes it.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new session, evicting the least-recently-used session of the
    /// same user when the per-user limit is reached.
    async fn create(&self, user_info: UserInfo, token: SessionToken, options: SessionOptions) -> Result<Session>;

    /// Live session by id; expired sessions read as `None`.
    async fn get(&self, id: &SessionId) -> Result<Option<Session>>;

    /// Record an access and slide the expiry window. Returns the updated
    /// session, or `None` when the session is unknown or already expired.
    async fn touch(&self, id: &SessionId) -> Result<Option<Session>>;

    /// Remove a session. Returns whether it existed.
    async fn invalidate(&self, id: &SessionId, reason: InvalidationReason) -> Result<bool>;

    /// Remove every session of `user_id`, returning how many were removed.
    async fn invalidate_all_for_user(&self, user_id: &str, reason: InvalidationReason) -> Result<usize>;

    /// Remove sessions whose `expires_at <= now`, returning how many were removed.
    async fn cleanup(&self) -> Result<usize>;

    async fn is_valid(&self, id: &SessionId) -> Result<bool>;

    /// Push a live session's expiry forward by `additional`.
    async fn extend(&self, id: &SessionId, additional: Duration) -> Result<Option<Session>>;

    /// Live sessions of `user_id`.
    async fn sessions_for_user(&self, user_id: &str) -> Result<Vec<Session>>;

    /// Number of stored sessions, expired-but-unswept included.
    async fn len(&self) -> Result<usize>;
}
