// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Boundary to the SAP back end and to the UI/AI tool implementations.
//!
//! Both sit outside this crate; the gateway only sequences calls to them.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::scope::Scope;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub entity_sets: Vec<String>,
}

impl ServiceInfo {
    /// Case-insensitive match against id, title and entity sets.
    pub fn matches(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.id.to_lowercase().contains(&term)
            || self.title.to_lowercase().contains(&term)
            || self.entity_sets.iter().any(|e| e.to_lowercase().contains(&term))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityOperation {
    Read,
    Query,
    Create,
    Update,
    Delete,
}

impl EntityOperation {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "read" => Some(Self::Read),
            "query" | "list" => Some(Self::Query),
            "create" => Some(Self::Create),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn is_mutation(self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }

    /// `read` for lookups and queries, `write` for anything that changes data.
    pub fn required_scope(self) -> Scope {
        if self.is_mutation() {
            Scope::from("write")
        } else {
            Scope::from("read")
        }
    }
}

/// SAP data access (OData services).
#[async_trait]
pub trait SapDataAccess: Send + Sync {
    /// Services visible to the gateway, with their entity sets.
    async fn discover(&self) -> Result<Vec<ServiceInfo>>;

    /// Entity type metadata (properties, keys, navigation) as returned by the back end.
    async fn get_metadata(&self, service_id: &str, entity: &str) -> Result<Value>;

    /// `params` carries the opaque query options and/or payload.
    async fn execute(&self, operation: EntityOperation, service_id: &str, entity: &str, params: &Value) -> Result<Value>;
}

/// Runs UI-generation and AI-assist tools.
#[async_trait]
pub trait UiToolRunner: Send + Sync {
    async fn run(&self, tool: &str, input: &Value) -> Result<Value>;
}
