// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Collaborators used when no live SAP system is wired in.
//!
//! [`DetachedSapBackend`] answers discovery from a fixed catalog and refuses
//! data access. [`DescriptorUiTools`] returns a rendering descriptor instead
//! of generated UI, leaving rendering to the client.

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::domain::sap::{EntityOperation, SapDataAccess, ServiceInfo, UiToolRunner};

#[derive(Debug, Clone, Default)]
pub struct DetachedSapBackend {
    catalog: Vec<ServiceInfo>,
}

impl DetachedSapBackend {
    pub fn new(catalog: Vec<ServiceInfo>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl SapDataAccess for DetachedSapBackend {
    async fn discover(&self) -> Result<Vec<ServiceInfo>> {
        Ok(self.catalog.clone())
    }

    async fn get_metadata(&self, service_id: &str, entity: &str) -> Result<Value> {
        bail!("no SAP system connected; cannot read metadata for {service_id}/{entity}")
    }

    async fn execute(&self, operation: EntityOperation, service_id: &str, entity: &str, _params: &Value) -> Result<Value> {
        bail!("no SAP system connected; cannot {operation:?} {service_id}/{entity}")
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorUiTools;

#[async_trait]
impl UiToolRunner for DescriptorUiTools {
    async fn run(&self, tool: &str, input: &Value) -> Result<Value> {
        debug!(tool = %tool, "Returning tool descriptor");
        Ok(json!({
            "tool": tool,
            "entity_type": input.get("entity_type"),
            "schema": input.get("schema"),
            "request": input.get("request"),
        }))
    }
}
