// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::association::{Association, AssociationRepository, ConnectionId};
use crate::domain::session::SessionId;

#[derive(Default)]
pub struct InMemoryAssociationRepository {
    // Maps ConnectionId -> Association
    associations: Arc<RwLock<HashMap<ConnectionId, Association>>>,
}

impl InMemoryAssociationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssociationRepository for InMemoryAssociationRepository {
    async fn upsert(&self, association: Association) -> Result<Option<Association>> {
        let mut guard = self.associations.write().await;
        Ok(guard.insert(association.connection_id.clone(), association))
    }

    async fn find(&self, connection_id: &ConnectionId) -> Result<Option<Association>> {
        let guard = self.associations.read().await;
        Ok(guard.get(connection_id).cloned())
    }

    async fn mark_used(&self, connection_id: &ConnectionId, now: DateTime<Utc>) -> Result<Option<Association>> {
        let mut guard = self.associations.write().await;
        Ok(guard.get_mut(connection_id).map(|association| {
            association.mark_used(now);
            association.clone()
        }))
    }

    async fn remove_if_session(&self, connection_id: &ConnectionId, session_id: &SessionId) -> Result<bool> {
        let mut guard = self.associations.write().await;
        match guard.get(connection_id) {
            Some(association) if association.session_id == *session_id => {
                guard.remove(connection_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove(&self, connection_id: &ConnectionId) -> Result<Option<Association>> {
        let mut guard = self.associations.write().await;
        Ok(guard.remove(connection_id))
    }

    async fn list(&self) -> Result<Vec<Association>> {
        let guard = self.associations.read().await;
        Ok(guard.values().cloned().collect())
    }
}
