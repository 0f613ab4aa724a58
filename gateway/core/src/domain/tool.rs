// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::scope::Scope;

/// Names of the built-in tools.
pub mod names {
    pub const CHECK_AUTHENTICATION: &str = "check-sap-authentication";
    pub const SEARCH_SERVICES: &str = "search-sap-services";
    pub const DISCOVER_ENTITIES: &str = "discover-service-entities";
    pub const ENTITY_SCHEMA: &str = "get-entity-schema";
    pub const EXECUTE_OPERATION: &str = "execute-entity-operation";
    pub const NATURAL_QUERY: &str = "natural-query-builder";
    pub const QUERY_OPTIMIZER: &str = "query-performance-optimizer";
    pub const PROCESS_INSIGHTS: &str = "business-process-insights";
    pub const UI_FORM: &str = "ui-form-generator";
    pub const UI_GRID: &str = "ui-data-grid";
    pub const UI_DASHBOARD: &str = "ui-dashboard-composer";
    pub const UI_WORKFLOW: &str = "ui-workflow-builder";
    pub const UI_REPORT: &str = "ui-report-builder";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    Discovery,
    Execution,
    Ui,
    Ai,
    Realtime,
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Discovery => "discovery",
            Self::Execution => "execution",
            Self::Ui => "ui",
            Self::Ai => "ai",
            Self::Realtime => "realtime",
        };
        f.write_str(name)
    }
}

/// Static description of an invocable tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub category: ToolCategory,
    /// `None` means the tool can be called without a session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_scope: Option<Scope>,
    /// Free-text hints shown to clients; routing uses the intent catalog.
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl ToolDescriptor {
    pub fn new(name: &str, description: &str, category: ToolCategory, required_scope: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            category,
            required_scope: required_scope.map(Scope::from),
            patterns: Vec::new(),
        }
    }

    pub fn with_patterns(mut self, patterns: &[&str]) -> Self {
        self.patterns = patterns.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn requires_auth(&self) -> bool {
        self.required_scope.is_some()
    }
}

/// Read-only catalog of tools, populated at registration.
pub trait ToolRegistry: Send + Sync {
    fn get(&self, name: &str) -> Option<&ToolDescriptor>;

    fn list(&self) -> Vec<&ToolDescriptor>;
}
