// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::domain::clock::Clock;
use crate::domain::events::SessionEvent;
use crate::domain::session::{InvalidationReason, Session, SessionId, SessionOptions, SessionToken, UserInfo};
use crate::domain::session_store::SessionStore;
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Clone, Copy)]
pub struct SessionStoreSettings {
    pub ttl: Duration,
    pub max_sessions_per_user: usize,
}

impl Default for SessionStoreSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::hours(1),
            max_sessions_per_user: 1,
        }
    }
}

/// Session store backed by a single `RwLock<HashMap>`.
///
/// Every mutation takes the write lock, so touches, evictions and the sweep
/// are totally ordered and no update is lost.
pub struct InMemorySessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, Session>>>,
    settings: SessionStoreSettings,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
}

impl InMemorySessionStore {
    pub fn new(settings: SessionStoreSettings, clock: Arc<dyn Clock>, event_bus: EventBus) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            settings: SessionStoreSettings {
                max_sessions_per_user: settings.max_sessions_per_user.max(1),
                ..settings
            },
            clock,
            event_bus,
        }
    }

    pub fn settings(&self) -> SessionStoreSettings {
        self.settings
    }

    fn publish_all(&self, events: Vec<SessionEvent>) {
        for event in events {
            self.event_bus.publish_session_event(event);
        }
    }
}

/// Least recently used live session of `user_id`, oldest creation and then id
/// breaking exact ties so eviction is deterministic.
fn least_recently_used(
    sessions: &HashMap<SessionId, Session>,
    user_id: &str,
    now: DateTime<Utc>,
) -> Option<SessionId> {
    sessions
        .values()
        .filter(|s| s.user_id == user_id && !s.is_expired_at(now))
        .min_by(|a, b| {
            a.metadata
                .last_accessed_at
                .cmp(&b.metadata.last_accessed_at)
                .then_with(|| a.metadata.created_at.cmp(&b.metadata.created_at))
                .then_with(|| a.id.cmp(&b.id))
        })
        .map(|s| s.id.clone())
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, user_info: UserInfo, token: SessionToken, options: SessionOptions) -> Result<Session> {
        let ttl = options.ttl.unwrap_or(self.settings.ttl);
        let id = options.session_id.unwrap_or_else(SessionId::generate);
        let mut events = Vec::new();

        let session = {
            let mut guard = self.sessions.write().await;
            let now = self.clock.now();
            let user_id = user_info.id.clone();

            // A forced id replaces whatever held it before.
            guard.remove(&id);

            let live = guard
                .values()
                .filter(|s| s.user_id == user_id && !s.is_expired_at(now))
                .count();
            for _ in 0..(live + 1).saturating_sub(self.settings.max_sessions_per_user) {
                let Some(victim) = least_recently_used(&guard, &user_id, now) else {
                    break;
                };
                guard.remove(&victim);
                info!(session_id = %victim, user_id = %user_id, "Evicted least recently used session");
                events.push(SessionEvent::SessionEvicted {
                    session_id: victim,
                    user_id: user_id.clone(),
                    evicted_at: now,
                });
            }

            let session = Session::new(
                id.clone(),
                user_info,
                token,
                options.ip_address,
                options.user_agent,
                now,
                ttl,
            );
            guard.insert(id, session.clone());
            events.push(SessionEvent::SessionCreated {
                session_id: session.id.clone(),
                user_id,
                expires_at: session.expires_at(),
                created_at: now,
            });
            session
        };

        info!(session_id = %session.id, user_id = %session.user_id, "Session created");
        self.publish_all(events);
        Ok(session)
    }

    async fn get(&self, id: &SessionId) -> Result<Option<Session>> {
        let guard = self.sessions.read().await;
        let now = self.clock.now();
        Ok(guard.get(id).filter(|s| !s.is_expired_at(now)).cloned())
    }

    async fn touch(&self, id: &SessionId) -> Result<Option<Session>> {
        let mut guard = self.sessions.write().await;
        let now = self.clock.now();
        match guard.get_mut(id) {
            Some(session) if !session.is_expired_at(now) => {
                session.touch(now, self.settings.ttl);
                debug!(session_id = %id, expires_at = %session.expires_at(), "Session touched");
                Ok(Some(session.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn invalidate(&self, id: &SessionId, reason: InvalidationReason) -> Result<bool> {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(session) => {
                info!(session_id = %id, user_id = %session.user_id, reason = %reason, "Session invalidated");
                self.event_bus.publish_session_event(SessionEvent::SessionInvalidated {
                    session_id: session.id,
                    user_id: session.user_id,
                    reason,
                    invalidated_at: self.clock.now(),
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn invalidate_all_for_user(&self, user_id: &str, reason: InvalidationReason) -> Result<usize> {
        let mut removed = Vec::new();
        {
            let mut guard = self.sessions.write().await;
            guard.retain(|id, session| {
                if session.user_id == user_id {
                    removed.push(id.clone());
                    false
                } else {
                    true
                }
            });
        }

        let now = self.clock.now();
        info!(user_id = %user_id, count = removed.len(), reason = %reason, "Invalidated all sessions for user");
        let count = removed.len();
        self.publish_all(
            removed
                .into_iter()
                .map(|session_id| SessionEvent::SessionInvalidated {
                    session_id,
                    user_id: user_id.to_string(),
                    reason: reason.clone(),
                    invalidated_at: now,
                })
                .collect(),
        );
        Ok(count)
    }

    async fn cleanup(&self) -> Result<usize> {
        let mut expired = Vec::new();
        {
            let mut guard = self.sessions.write().await;
            // Read the clock under the lock: a touch that won the lock first has
            // already moved its session's expiry past this instant.
            let now = self.clock.now();
            guard.retain(|id, session| {
                if session.is_expired_at(now) {
                    expired.push(SessionEvent::SessionExpired {
                        session_id: id.clone(),
                        user_id: session.user_id.clone(),
                        expired_at: session.expires_at(),
                    });
                    false
                } else {
                    true
                }
            });
        }

        let count = expired.len();
        if count > 0 {
            info!(count, "Removed expired sessions");
        }
        self.publish_all(expired);
        Ok(count)
    }

    async fn is_valid(&self, id: &SessionId) -> Result<bool> {
        Ok(self.get(id).await?.is_some())
    }

    async fn extend(&self, id: &SessionId, additional: Duration) -> Result<Option<Session>> {
        let mut guard = self.sessions.write().await;
        let now = self.clock.now();
        match guard.get_mut(id) {
            Some(session) if !session.is_expired_at(now) => {
                session.extend(additional);
                info!(session_id = %id, expires_at = %session.expires_at(), "Session extended");
                Ok(Some(session.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn sessions_for_user(&self, user_id: &str) -> Result<Vec<Session>> {
        let guard = self.sessions.read().await;
        let now = self.clock.now();
        let mut sessions: Vec<Session> = guard
            .values()
            .filter(|s| s.user_id == user_id && !s.is_expired_at(now))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.metadata.created_at.cmp(&b.metadata.created_at));
        Ok(sessions)
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.sessions.read().await.len())
    }
}
