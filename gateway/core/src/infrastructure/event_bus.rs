// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

// Event Bus - Pub/Sub for Domain Events
//
// In-memory fan-out of session, authentication and association events over a
// tokio broadcast channel. Events are not persisted; a lagging subscriber
// loses the oldest ones.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::{AssociationEvent, AuthenticationEvent, SessionEvent};
use crate::domain::session::SessionId;

/// Unified domain event type for the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainEvent {
    Session(SessionEvent),
    Authentication(AuthenticationEvent),
    Association(AssociationEvent),
}

impl DomainEvent {
    /// Session the event is about, if any.
    pub fn session_id(&self) -> Option<&SessionId> {
        match self {
            Self::Session(
                SessionEvent::SessionCreated { session_id, .. }
                | SessionEvent::SessionEvicted { session_id, .. }
                | SessionEvent::SessionInvalidated { session_id, .. }
                | SessionEvent::SessionExpired { session_id, .. },
            ) => Some(session_id),
            Self::Authentication(
                AuthenticationEvent::LoginCompleted { session_id, .. } | AuthenticationEvent::LoggedOut { session_id, .. },
            ) => Some(session_id),
            Self::Authentication(_) => None,
            Self::Association(
                AssociationEvent::Associated { session_id, .. } | AssociationEvent::Closed { session_id, .. },
            ) => Some(session_id),
        }
    }
}

/// Event bus for publishing and subscribing to domain events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<DomainEvent>>,
}

impl EventBus {
    /// Capacity is the number of events buffered before the oldest are dropped.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_session_event(&self, event: SessionEvent) {
        self.publish(DomainEvent::Session(event));
    }

    pub fn publish_authentication_event(&self, event: AuthenticationEvent) {
        self.publish(DomainEvent::Authentication(event));
    }

    pub fn publish_association_event(&self, event: AssociationEvent) {
        self.publish(DomainEvent::Association(event));
    }

    /// Never fails the caller: an event without subscribers is simply dropped.
    fn publish(&self, event: DomainEvent) {
        debug!("Publishing event: {:?}", event);

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Receiver for all domain events
pub struct EventReceiver {
    receiver: broadcast::Receiver<DomainEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }

    pub fn try_recv(&mut self) -> Result<DomainEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}
