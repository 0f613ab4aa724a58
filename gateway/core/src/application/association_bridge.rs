// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Association Bridge
//!
//! A protocol connection presents its `session_id` once; every later call on
//! the same connection is resolved through the bridge.
//!
//! Validity is checked lazily: an association outlives its session until the
//! next [`AssociationBridge::resolve`] (or the sweeper's
//! [`AssociationBridge::prune`]) notices and drops it.

use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::domain::association::{Association, AssociationRepository, ConnectionId};
use crate::domain::clock::Clock;
use crate::domain::events::AssociationEvent;
use crate::domain::session::SessionId;
use crate::domain::session_store::SessionStore;
use crate::infrastructure::event_bus::EventBus;

pub struct AssociationBridge {
    repository: Arc<dyn AssociationRepository>,
    sessions: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
}

impl AssociationBridge {
    pub fn new(
        repository: Arc<dyn AssociationRepository>,
        sessions: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            repository,
            sessions,
            clock,
            event_bus,
        }
    }

    /// Bind `connection_id` to `session_id`, replacing any previous binding.
    ///
    /// Returns `false` (and binds nothing) when the session is not valid.
    pub async fn associate(&self, connection_id: &ConnectionId, session_id: &SessionId) -> Result<bool> {
        if !self.sessions.is_valid(session_id).await? {
            debug!(connection_id = %connection_id, session_id = %session_id, "Refusing association to invalid session");
            return Ok(false);
        }

        let now = self.clock.now();
        let previous = self
            .repository
            .upsert(Association::new(connection_id.clone(), session_id.clone(), now))
            .await?;

        if let Some(previous) = previous.filter(|p| p.session_id != *session_id) {
            self.event_bus.publish_association_event(AssociationEvent::Closed {
                connection_id: connection_id.clone(),
                session_id: previous.session_id,
                closed_at: now,
            });
        }
        self.event_bus.publish_association_event(AssociationEvent::Associated {
            connection_id: connection_id.clone(),
            session_id: session_id.clone(),
            associated_at: now,
        });
        info!(connection_id = %connection_id, session_id = %session_id, "Connection associated with session");
        Ok(true)
    }

    /// Session bound to `connection_id`, if that session is still valid.
    ///
    /// A stale association is removed on the way out, unless a concurrent
    /// `associate` already replaced it.
    pub async fn resolve(&self, connection_id: &ConnectionId) -> Result<Option<SessionId>> {
        let Some(association) = self.repository.find(connection_id).await? else {
            return Ok(None);
        };

        if self.sessions.is_valid(&association.session_id).await? {
            self.repository.mark_used(connection_id, self.clock.now()).await?;
            return Ok(Some(association.session_id));
        }

        if self
            .repository
            .remove_if_session(connection_id, &association.session_id)
            .await?
        {
            debug!(
                connection_id = %connection_id,
                session_id = %association.session_id,
                "Dropped association to invalid session"
            );
            self.publish_closed(connection_id, association.session_id);
        }
        Ok(None)
    }

    /// Remove the association of a closed protocol connection.
    pub async fn close(&self, connection_id: &ConnectionId) -> Result<Option<SessionId>> {
        let removed = self.repository.remove(connection_id).await?;
        Ok(removed.map(|association| {
            info!(connection_id = %connection_id, session_id = %association.session_id, "Connection closed");
            self.publish_closed(connection_id, association.session_id.clone());
            association.session_id
        }))
    }

    /// Drop every association whose session is no longer valid.
    pub async fn prune(&self) -> Result<usize> {
        let mut removed = 0;
        for association in self.repository.list().await? {
            if self.sessions.is_valid(&association.session_id).await? {
                continue;
            }
            if self
                .repository
                .remove_if_session(&association.connection_id, &association.session_id)
                .await?
            {
                self.publish_closed(&association.connection_id, association.session_id);
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Raw association without a validity check.
    pub async fn peek(&self, connection_id: &ConnectionId) -> Result<Option<Association>> {
        self.repository.find(connection_id).await
    }

    fn publish_closed(&self, connection_id: &ConnectionId, session_id: SessionId) {
        self.event_bus.publish_association_event(AssociationEvent::Closed {
            connection_id: connection_id.clone(),
            session_id,
            closed_at: self.clock.now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::clock::MockClock;
    use crate::domain::scope::Scope;
    use crate::domain::session::{InvalidationReason, SessionOptions, SessionToken, UserInfo};
    use crate::infrastructure::association_repository::InMemoryAssociationRepository;
    use crate::infrastructure::event_bus::DomainEvent;
    use crate::infrastructure::session_store::{InMemorySessionStore, SessionStoreSettings};
    use chrono::Duration;

    struct Fixture {
        clock: Arc<MockClock>,
        sessions: Arc<InMemorySessionStore>,
        bridge: AssociationBridge,
        bus: EventBus,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(MockClock::starting_now());
        let bus = EventBus::new(64);
        let sessions = Arc::new(InMemorySessionStore::new(
            SessionStoreSettings {
                ttl: Duration::minutes(30),
                max_sessions_per_user: 2,
            },
            clock.clone(),
            bus.clone(),
        ));
        let bridge = AssociationBridge::new(
            Arc::new(InMemoryAssociationRepository::new()),
            sessions.clone(),
            clock.clone(),
            bus.clone(),
        );
        Fixture {
            clock,
            sessions,
            bridge,
            bus,
        }
    }

    async fn login(fx: &Fixture, user: &str) -> SessionId {
        let token = SessionToken::new("opaque", fx.clock.now() + Duration::hours(1));
        fx.sessions
            .create(UserInfo::new(user, vec![Scope::from("read")]), token, SessionOptions::default())
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_resolve_after_associate() {
        let fx = fixture();
        let sid = login(&fx, "alice").await;
        let conn = ConnectionId::from("conn1");

        assert!(fx.bridge.associate(&conn, &sid).await.unwrap());
        assert_eq!(fx.bridge.resolve(&conn).await.unwrap(), Some(sid));
        assert_eq!(fx.bridge.resolve(&ConnectionId::from("conn2")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_resolve_after_invalidate_returns_none() {
        let fx = fixture();
        let sid = login(&fx, "alice").await;
        let conn = ConnectionId::from("conn1");
        fx.bridge.associate(&conn, &sid).await.unwrap();

        fx.sessions.invalidate(&sid, InvalidationReason::Logout).await.unwrap();

        assert_eq!(fx.bridge.resolve(&conn).await.unwrap(), None);
        assert!(fx.bridge.peek(&conn).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_after_expiry_returns_none() {
        let fx = fixture();
        let sid = login(&fx, "alice").await;
        let conn = ConnectionId::from("conn1");
        fx.bridge.associate(&conn, &sid).await.unwrap();

        fx.clock.advance(Duration::minutes(31));
        assert_eq!(fx.bridge.resolve(&conn).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_associate_rejects_unknown_session() {
        let fx = fixture();
        let conn = ConnectionId::from("conn1");
        assert!(!fx.bridge.associate(&conn, &SessionId::from("nope")).await.unwrap());
        assert!(fx.bridge.peek(&conn).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_and_prune() {
        let fx = fixture();
        let mut events = fx.bus.subscribe();
        let first = login(&fx, "alice").await;
        let second = login(&fx, "bob").await;
        fx.bridge.associate(&ConnectionId::from("a"), &first).await.unwrap();
        fx.bridge.associate(&ConnectionId::from("b"), &second).await.unwrap();

        assert_eq!(fx.bridge.close(&ConnectionId::from("a")).await.unwrap(), Some(first));
        assert_eq!(fx.bridge.close(&ConnectionId::from("a")).await.unwrap(), None);

        fx.sessions.invalidate(&second, InvalidationReason::Logout).await.unwrap();
        assert_eq!(fx.bridge.prune().await.unwrap(), 1);
        assert_eq!(fx.bridge.prune().await.unwrap(), 0);

        let mut closed = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, DomainEvent::Association(AssociationEvent::Closed { .. })) {
                closed += 1;
            }
        }
        assert_eq!(closed, 2);
    }
}
