// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Intelligent Request Router
//!
//! Turns a caller request into a [`RoutingDecision`]:
//!
//! 1. structured direct queries short-circuit to the execution tool at
//!    confidence `1.0`;
//! 2. everything else is classified by the [`IntentCatalog`] and the winner is
//!    picked by [`select_winner`];
//! 3. the winning category maps to a tool;
//! 4. [`plan_sequence`] prepends the upstream steps the request context does
//!    not already satisfy.
//!
//! Routing is pure: no I/O, no locks, same input gives the same decision.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::errors::GatewayError;
use crate::domain::gateway_config::RoutingConfig;
use crate::domain::routing::{
    select_winner, DirectQuery, DirectQueryParser, IntentCatalog, IntentCategory, IntentMatch, NormalizedText,
    UiPattern, DIRECT_QUERY_CONFIDENCE,
};
use crate::domain::sap::EntityOperation;
use crate::domain::scope::Scope;
use crate::domain::tool::{names, ToolRegistry};
use crate::domain::workflow::{plan_sequence, Blackboard, Slot};

/// Another category the request also matched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteCandidate {
    pub tool: String,
    pub category: IntentCategory,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutingDecision {
    pub selected_tool: String,
    pub category: IntentCategory,
    pub confidence: f64,
    pub reason: String,
    pub suggested_sequence: Vec<String>,
    pub requires_auth: bool,
    /// Union of the scopes of every step in `suggested_sequence`.
    pub required_scopes: Vec<Scope>,
    /// Workflow input: the request context plus anything the router extracted.
    pub arguments: Value,
    pub alternatives: Vec<RouteCandidate>,
}

impl RoutingDecision {
    /// `RoutingAmbiguous` when a recognised intent scored below `threshold`.
    ///
    /// The zero-confidence generic fallback is an explicit answer, not an
    /// ambiguity.
    pub fn ensure_confident(&self, threshold: f64) -> Result<&Self, GatewayError> {
        if self.confidence > 0.0 && self.confidence < threshold {
            let mut candidates = vec![self.selected_tool.clone()];
            for alternative in &self.alternatives {
                if !candidates.contains(&alternative.tool) {
                    candidates.push(alternative.tool.clone());
                }
            }
            return Err(GatewayError::RoutingAmbiguous {
                candidates,
                best_confidence: self.confidence,
            });
        }
        Ok(self)
    }
}

pub struct RequestRouter {
    registry: Arc<dyn ToolRegistry>,
    catalog: IntentCatalog,
    direct_queries: DirectQueryParser,
    config: RoutingConfig,
}

impl RequestRouter {
    pub fn new(registry: Arc<dyn ToolRegistry>, config: RoutingConfig) -> Result<Self, regex::Error> {
        Ok(Self::with_catalog(registry, IntentCatalog::standard()?, DirectQueryParser::new()?, config))
    }

    pub fn with_catalog(
        registry: Arc<dyn ToolRegistry>,
        catalog: IntentCatalog,
        direct_queries: DirectQueryParser,
        config: RoutingConfig,
    ) -> Self {
        Self {
            registry,
            catalog,
            direct_queries,
            config,
        }
    }

    pub fn ambiguity_threshold(&self) -> f64 {
        self.config.ambiguity_threshold
    }

    /// Route `request`; `context` holds arguments the caller already knows
    /// (`service_id`, `entity_type`, ...).
    pub fn route(&self, request: &str, context: &Value) -> RoutingDecision {
        let mut arguments = match context {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        arguments
            .entry("request")
            .or_insert_with(|| Value::String(request.trim().to_string()));

        if let Some(query) = self.direct_queries.parse(request) {
            return self.direct(query, arguments);
        }

        let board = Blackboard::from_arguments(&Value::Object(arguments.clone()));
        let matches = self.catalog.classify(&NormalizedText::new(request));
        let Some(winner) = select_winner(&matches, self.config.tie_epsilon) else {
            return self.decide(
                IntentCategory::Generic,
                tool_for(IntentCategory::Generic, &board),
                0.0,
                "no recognisable intent; falling back to service search".to_string(),
                arguments,
                Vec::new(),
            );
        };

        let alternatives = matches
            .iter()
            .filter(|m| m.category != winner.category)
            .map(|m| RouteCandidate {
                tool: tool_for(m.category, &board).to_string(),
                category: m.category,
                confidence: m.confidence,
            })
            .collect();

        self.decide(
            winner.category,
            tool_for(winner.category, &board),
            winner.confidence,
            describe(winner),
            arguments,
            alternatives,
        )
    }

    fn direct(&self, query: DirectQuery, mut arguments: Map<String, Value>) -> RoutingDecision {
        let operation = if query.key.is_some() { "read" } else { "query" };
        if let Some(service) = query.service_path.as_deref().and_then(|p| p.rsplit('/').next()) {
            arguments.insert("service_id".to_string(), Value::String(service.to_string()));
        }
        arguments.insert("entity_type".to_string(), Value::String(query.entity_set.clone()));
        arguments.insert("operation".to_string(), Value::String(operation.to_string()));
        arguments.insert("query_options".to_string(), Value::String(query.query_options.clone()));
        if let Some(key) = &query.key {
            arguments.insert("key".to_string(), Value::String(key.clone()));
        }

        self.decide(
            IntentCategory::Execution,
            names::EXECUTE_OPERATION,
            DIRECT_QUERY_CONFIDENCE,
            format!("direct query on {}", query.entity_set),
            arguments,
            Vec::new(),
        )
    }

    fn decide(
        &self,
        category: IntentCategory,
        tool: &str,
        confidence: f64,
        reason: String,
        arguments: Map<String, Value>,
        alternatives: Vec<RouteCandidate>,
    ) -> RoutingDecision {
        let board = Blackboard::from_arguments(&Value::Object(arguments.clone()));
        let suggested_sequence = plan_sequence(tool, &board.available_slots());
        let required_scopes = required_scopes(&suggested_sequence, self.registry.as_ref(), &board);
        RoutingDecision {
            selected_tool: tool.to_string(),
            category,
            confidence,
            reason,
            requires_auth: !required_scopes.is_empty(),
            suggested_sequence,
            required_scopes,
            arguments: Value::Object(arguments),
            alternatives,
        }
    }
}

/// Scopes needed to run every step of `sequence`, in first-use order.
///
/// The execution step needs the scope of the requested `operation`, not the
/// registry default.
pub fn required_scopes(sequence: &[String], registry: &dyn ToolRegistry, board: &Blackboard) -> Vec<Scope> {
    let mut scopes: Vec<Scope> = Vec::new();
    for step in sequence {
        let scope = if step == names::EXECUTE_OPERATION {
            Some(operation_scope(board))
        } else {
            registry.get(step).and_then(|d| d.required_scope.clone())
        };
        if let Some(scope) = scope {
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
    }
    scopes
}

/// Unrecognized operations are held to `write`; the executor rejects them anyway.
fn operation_scope(board: &Blackboard) -> Scope {
    match board.get_str("operation") {
        None => EntityOperation::Query.required_scope(),
        Some(raw) => EntityOperation::parse(raw).map_or_else(|| Scope::from("write"), EntityOperation::required_scope),
    }
}

fn tool_for(category: IntentCategory, board: &Blackboard) -> &'static str {
    match category {
        IntentCategory::Authentication => names::CHECK_AUTHENTICATION,
        IntentCategory::Discovery => match (board.has(Slot::ServiceId), board.has(Slot::EntityType)) {
            (true, true) => names::ENTITY_SCHEMA,
            (true, false) => names::DISCOVER_ENTITIES,
            _ => names::SEARCH_SERVICES,
        },
        IntentCategory::Execution => names::NATURAL_QUERY,
        IntentCategory::PerformanceOptimization => names::QUERY_OPTIMIZER,
        IntentCategory::ProcessAnalysis => names::PROCESS_INSIGHTS,
        IntentCategory::Ui(UiPattern::Form) => names::UI_FORM,
        IntentCategory::Ui(UiPattern::Grid) => names::UI_GRID,
        IntentCategory::Ui(UiPattern::Dashboard) => names::UI_DASHBOARD,
        IntentCategory::Ui(UiPattern::Workflow) => names::UI_WORKFLOW,
        IntentCategory::Ui(UiPattern::Report) => names::UI_REPORT,
        IntentCategory::Generic => names::SEARCH_SERVICES,
    }
}

fn describe(winner: &IntentMatch) -> String {
    format!("detected {} intent ({})", winner.category, winner.evidence.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::tool_registry::InMemoryToolRegistry;
    use serde_json::json;

    fn router() -> RequestRouter {
        RequestRouter::new(Arc::new(InMemoryToolRegistry::with_sap_catalog()), RoutingConfig::default()).unwrap()
    }

    #[test]
    fn test_direct_query_short_circuits() {
        let decision = router().route(
            "BusinessPartnerSet?$filter=CreationDate ge datetime'2024-11-01'&$top=10",
            &json!({}),
        );
        assert_eq!(decision.selected_tool, names::EXECUTE_OPERATION);
        assert_eq!(decision.confidence, 1.0);
        assert!(decision.reason.starts_with("direct query"));
        assert_eq!(decision.arguments["entity_type"], "BusinessPartnerSet");
        assert_eq!(
            decision.suggested_sequence,
            vec![names::SEARCH_SERVICES, names::EXECUTE_OPERATION]
        );
    }

    #[test]
    fn test_direct_query_with_service_path_needs_no_search() {
        let decision = router().route(
            "/sap/opu/odata/sap/API_BUSINESS_PARTNER/A_BusinessPartner('1000')?$select=BusinessPartner",
            &json!({}),
        );
        assert_eq!(decision.arguments["service_id"], "API_BUSINESS_PARTNER");
        assert_eq!(decision.arguments["operation"], "read");
        assert_eq!(decision.suggested_sequence, vec![names::EXECUTE_OPERATION]);
    }

    #[test]
    fn test_natural_language_query() {
        let decision = router().route("mostra clienti ultimi 3 mesi", &json!({}));
        assert_eq!(decision.selected_tool, names::NATURAL_QUERY);
        assert!(decision.confidence > 0.7);
        assert!(decision.reason.contains("execution"));
        assert_eq!(
            decision.suggested_sequence,
            vec![
                names::SEARCH_SERVICES,
                names::DISCOVER_ENTITIES,
                names::NATURAL_QUERY,
                names::EXECUTE_OPERATION
            ]
        );
        assert!(decision.requires_auth);
        assert_eq!(decision.required_scopes, vec![Scope::from("read")]);
    }

    #[test]
    fn test_mutating_operation_needs_write() {
        let decision = router().route(
            "show sales orders from the last 3 months",
            &json!({ "service_id": "API_BUSINESS_PARTNER", "entity_type": "A_BusinessPartner", "operation": "delete" }),
        );
        assert!(decision.suggested_sequence.iter().any(|s| s == names::EXECUTE_OPERATION));
        assert_eq!(decision.selected_tool, names::NATURAL_QUERY);
        assert!(decision.required_scopes.contains(&Scope::from("write")));
    }

    #[test]
    fn test_direct_query_stays_read_only() {
        let decision = router().route("A_BusinessPartner('1000')?$select=BusinessPartner", &json!({ "operation": "delete" }));
        assert_eq!(decision.arguments["operation"], "read");
        assert_eq!(decision.required_scopes, vec![Scope::from("read")]);
    }

    #[test]
    fn test_context_shortens_ui_sequence() {
        let decision = router().route(
            "build an input form",
            &json!({ "service_id": "API_BUSINESS_PARTNER", "entity_type": "A_BusinessPartner" }),
        );
        assert_eq!(decision.selected_tool, names::UI_FORM);
        assert_eq!(decision.suggested_sequence, vec![names::ENTITY_SCHEMA, names::UI_FORM]);
        assert_eq!(decision.required_scopes, vec![Scope::from("read"), Scope::from("ui.forms")]);
    }

    #[test]
    fn test_unintelligible_input_falls_back() {
        let decision = router().route("qwzx blorp", &json!({}));
        assert_eq!(decision.category, IntentCategory::Generic);
        assert_eq!(decision.selected_tool, names::SEARCH_SERVICES);
        assert_eq!(decision.confidence, 0.0);
        assert!(decision.reason.contains("no recognisable intent"));
        assert!(decision.ensure_confident(0.3).is_ok());
    }

    #[test]
    fn test_auth_request_needs_no_scope() {
        let decision = router().route("am I authenticated?", &json!({}));
        assert_eq!(decision.selected_tool, names::CHECK_AUTHENTICATION);
        assert!(!decision.requires_auth);
        assert_eq!(decision.suggested_sequence, vec![names::CHECK_AUTHENTICATION]);
    }

    #[test]
    fn test_low_confidence_is_ambiguous() {
        let decision = router().route("trend", &json!({}));
        let err = router().route("trend", &json!({})).ensure_confident(0.5).unwrap_err();
        assert_eq!(decision.selected_tool, names::PROCESS_INSIGHTS);
        match err {
            GatewayError::RoutingAmbiguous { candidates, .. } => {
                assert_eq!(candidates[0], names::PROCESS_INSIGHTS)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
