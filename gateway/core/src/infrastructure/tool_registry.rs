// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;

use crate::domain::tool::{names, ToolCategory, ToolDescriptor, ToolRegistry};

/// Tool catalog held in registration order.
#[derive(Debug, Clone, Default)]
pub struct InMemoryToolRegistry {
    tools: Vec<ToolDescriptor>,
}

impl InMemoryToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects a second descriptor with the same name.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<()> {
        if self.tools.iter().any(|t| t.name == descriptor.name) {
            anyhow::bail!("tool '{}' is already registered", descriptor.name);
        }
        self.tools.push(descriptor);
        Ok(())
    }

    /// The gateway's built-in SAP tool set.
    pub fn with_sap_catalog() -> Self {
        let tools = vec![
            ToolDescriptor::new(
                names::CHECK_AUTHENTICATION,
                "Report the authentication state of this connection and how to log in",
                ToolCategory::Discovery,
                None,
            )
            .with_patterns(&["login", "auth status", "accedi"]),
            ToolDescriptor::new(
                names::SEARCH_SERVICES,
                "Search the SAP OData services visible to the gateway",
                ToolCategory::Discovery,
                Some("read"),
            )
            .with_patterns(&["services", "servizi"]),
            ToolDescriptor::new(
                names::DISCOVER_ENTITIES,
                "List the entity sets of one SAP service",
                ToolCategory::Discovery,
                Some("read"),
            )
            .with_patterns(&["entities", "entità"]),
            ToolDescriptor::new(
                names::ENTITY_SCHEMA,
                "Fetch the property schema of one entity type",
                ToolCategory::Discovery,
                Some("read"),
            )
            .with_patterns(&["schema", "fields", "metadata"]),
            ToolDescriptor::new(
                names::EXECUTE_OPERATION,
                "Run an operation against an entity set; create, update and delete need `write`",
                ToolCategory::Execution,
                Some("read"),
            )
            .with_patterns(&["EntitySet?$filter=..."]),
            ToolDescriptor::new(
                names::NATURAL_QUERY,
                "Translate a natural-language request into an entity query",
                ToolCategory::Ai,
                Some("read"),
            )
            .with_patterns(&["show customers from the last 3 months", "mostra clienti ultimi 3 mesi"]),
            ToolDescriptor::new(
                names::QUERY_OPTIMIZER,
                "Suggest faster variants of an entity query",
                ToolCategory::Ai,
                Some("read"),
            )
            .with_patterns(&["optimize query", "ottimizza query"]),
            ToolDescriptor::new(
                names::PROCESS_INSIGHTS,
                "Analyse business process data for bottlenecks and trends",
                ToolCategory::Ai,
                Some("read"),
            )
            .with_patterns(&["bottlenecks", "order to cash"]),
            ToolDescriptor::new(names::UI_FORM, "Generate an entity form", ToolCategory::Ui, Some("ui.forms"))
                .with_patterns(&["form", "modulo"]),
            ToolDescriptor::new(names::UI_GRID, "Generate an entity data grid", ToolCategory::Ui, Some("ui.grids"))
                .with_patterns(&["grid", "tabella"]),
            ToolDescriptor::new(
                names::UI_DASHBOARD,
                "Compose a KPI dashboard",
                ToolCategory::Ui,
                Some("ui.dashboards"),
            )
            .with_patterns(&["dashboard", "cruscotto"]),
            ToolDescriptor::new(
                names::UI_WORKFLOW,
                "Build an approval workflow",
                ToolCategory::Ui,
                Some("ui.workflows"),
            )
            .with_patterns(&["workflow", "approvazione"]),
            ToolDescriptor::new(names::UI_REPORT, "Build a report", ToolCategory::Ui, Some("ui.reports"))
                .with_patterns(&["report"]),
        ];
        Self { tools }
    }
}

impl ToolRegistry for InMemoryToolRegistry {
    fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }

    fn list(&self) -> Vec<&ToolDescriptor> {
        self.tools.iter().collect()
    }
}
