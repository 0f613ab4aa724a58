// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use crate::application::authentication_service::AuthenticationService;
use crate::application::authorization_gate::{AuthorizationGate, CallerIdentity};
use crate::application::request_router::{required_scopes, RequestRouter, RoutingDecision};
use crate::application::workflow_sequencer::WorkflowSequencer;
use crate::domain::association::ConnectionId;
use crate::domain::authentication::AuthState;
use crate::domain::errors::GatewayError;
use crate::domain::scope::Scope;
use crate::domain::session::SessionId;
use crate::domain::tool::{names, ToolDescriptor, ToolRegistry};
use crate::domain::workflow::{plan_sequence, Blackboard, StepRecord};

/// Argument carrying the one-time session hand-off.
pub const SESSION_ID_ARGUMENT: &str = "session_id";

/// Explicit call of a named tool.
#[derive(Debug, Clone, Default)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
    pub connection_id: Option<ConnectionId>,
}

/// Free-form request to be routed.
#[derive(Debug, Clone, Default)]
pub struct RouteRequest {
    pub request: String,
    pub arguments: Value,
    pub connection_id: Option<ConnectionId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    pub steps: Vec<StepRecord>,
    pub output: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<RoutingDecision>,
}

/// Entry point for every tool call: resolves the caller's session, checks the
/// scopes of the whole sequence, then runs it.
pub struct ToolInvocationService {
    registry: Arc<dyn ToolRegistry>,
    gate: Arc<AuthorizationGate>,
    auth: Arc<AuthenticationService>,
    router: Arc<RequestRouter>,
    sequencer: Arc<WorkflowSequencer>,
}

impl ToolInvocationService {
    pub fn new(
        registry: Arc<dyn ToolRegistry>,
        gate: Arc<AuthorizationGate>,
        auth: Arc<AuthenticationService>,
        router: Arc<RequestRouter>,
        sequencer: Arc<WorkflowSequencer>,
    ) -> Self {
        Self {
            registry,
            gate,
            auth,
            router,
            sequencer,
        }
    }

    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.registry.list().into_iter().cloned().collect()
    }

    /// Route without executing anything.
    pub fn route(&self, request: &str, arguments: &Value) -> RoutingDecision {
        let (arguments, _) = split_session_argument(arguments.clone());
        self.router.route(request, &arguments)
    }

    pub async fn invoke(&self, call: ToolCall) -> Result<ToolResponse, GatewayError> {
        let (arguments, presented) = split_session_argument(call.arguments);
        let caller = CallerIdentity {
            connection_id: call.connection_id,
            session_id: presented,
        };

        let descriptor = self
            .registry
            .get(&call.name)
            .ok_or_else(|| GatewayError::UnknownTool(call.name.clone()))?;
        if descriptor.name == names::CHECK_AUTHENTICATION {
            return self.check_authentication(&caller).await;
        }

        let board = Blackboard::from_arguments(&arguments);
        let sequence = plan_sequence(&descriptor.name, &board.available_slots());
        let required = required_scopes(&sequence, self.registry.as_ref(), &board);
        self.execute(&caller, &call.name, &sequence, &required, &arguments, None)
            .await
    }

    /// Route a free-form request and run the resulting sequence.
    pub async fn route_and_invoke(&self, request: RouteRequest) -> Result<ToolResponse, GatewayError> {
        let (arguments, presented) = split_session_argument(request.arguments);
        let caller = CallerIdentity {
            connection_id: request.connection_id,
            session_id: presented,
        };

        let decision = self.router.route(&request.request, &arguments);
        decision.ensure_confident(self.router.ambiguity_threshold())?;
        info!(
            tool = %decision.selected_tool,
            category = %decision.category,
            confidence = decision.confidence,
            reason = %decision.reason,
            "Request routed"
        );

        if decision.selected_tool == names::CHECK_AUTHENTICATION {
            let mut response = self.check_authentication(&caller).await?;
            response.routing = Some(decision);
            return Ok(response);
        }

        self.execute(
            &caller,
            &decision.selected_tool,
            &decision.suggested_sequence,
            &decision.required_scopes,
            &decision.arguments,
            Some(decision.clone()),
        )
        .await
    }

    async fn execute(
        &self,
        caller: &CallerIdentity,
        tool: &str,
        sequence: &[String],
        required: &[Scope],
        arguments: &Value,
        routing: Option<RoutingDecision>,
    ) -> Result<ToolResponse, GatewayError> {
        let session_id = if required.is_empty() {
            None
        } else {
            let session = self.gate.authorize(caller, tool, required).await?.into_result(tool)?;
            Some(session.id)
        };

        info!(tool = %tool, session_id = ?session_id, steps = sequence.len(), "Invoking tool");
        let outcome = self.sequencer.run(sequence, arguments).await?;
        Ok(ToolResponse {
            tool: tool.to_string(),
            session_id,
            steps: outcome.steps,
            output: outcome.output,
            routing,
        })
    }

    /// Needs no session: reports the state and, when unauthenticated, how to log in.
    async fn check_authentication(&self, caller: &CallerIdentity) -> Result<ToolResponse, GatewayError> {
        let session_id = self.gate.resolve_session(caller).await?;
        let state = self
            .auth
            .status(caller.connection_id.as_ref(), session_id.as_ref())
            .await?;

        let authenticated = matches!(state, AuthState::Authenticated { .. });
        let mut output = json!({
            "authenticated": authenticated,
            "status": state,
        });
        if !authenticated {
            let remediation = self.auth.remediation(caller.connection_id.as_ref()).await?;
            output["authorization_url"] = json!(remediation.authorization_url);
            output["instructions"] = json!(remediation.instructions);
        }

        Ok(ToolResponse {
            tool: names::CHECK_AUTHENTICATION.to_string(),
            session_id: session_id.filter(|_| authenticated),
            steps: Vec::new(),
            output,
            routing: None,
        })
    }
}

/// Remove the hand-off `session_id` from the arguments.
fn split_session_argument(arguments: Value) -> (Value, Option<SessionId>) {
    match arguments {
        Value::Object(mut map) => {
            let session_id = map
                .remove(SESSION_ID_ARGUMENT)
                .and_then(|v| v.as_str().map(str::trim).filter(|s| !s.is_empty()).map(SessionId::from));
            (Value::Object(map), session_id)
        }
        Value::Null => (json!({}), None),
        other => (other, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::Harness;
    use crate::domain::sap::EntityOperation;

    fn call(name: &str, arguments: Value, connection: &str) -> ToolCall {
        ToolCall {
            name: name.to_string(),
            arguments,
            connection_id: Some(ConnectionId::from(connection)),
        }
    }

    #[tokio::test]
    async fn test_hand_off_then_connection_reuse() {
        let h = Harness::new();
        let service = h.invocation_service();
        let session_id = h.login("alice", &["read"]).await;

        let first = service
            .invoke(call(
                names::SEARCH_SERVICES,
                json!({ "session_id": session_id.as_str(), "search": "partner" }),
                "conn1",
            ))
            .await
            .unwrap();
        assert_eq!(first.session_id, Some(session_id.clone()));
        assert_eq!(first.output["service_id"], "API_BUSINESS_PARTNER");

        let second = service
            .invoke(call(names::SEARCH_SERVICES, json!({ "search": "sales" }), "conn1"))
            .await
            .unwrap();
        assert_eq!(second.session_id, Some(session_id));

        let other = service
            .invoke(call(names::SEARCH_SERVICES, json!({}), "conn2"))
            .await
            .unwrap_err();
        assert_eq!(other.code(), "authentication_required");
    }

    #[tokio::test]
    async fn test_sequence_scopes_are_checked_before_any_step() {
        let h = Harness::new();
        let service = h.invocation_service();
        let session_id = h.login("alice", &["read"]).await;

        let err = service
            .invoke(call(
                names::UI_FORM,
                json!({ "session_id": session_id.as_str(), "request": "partner form" }),
                "conn1",
            ))
            .await
            .unwrap_err();

        match err {
            GatewayError::InsufficientScope { tool, missing } => {
                assert_eq!(tool, names::UI_FORM);
                assert_eq!(missing, vec![Scope::from("ui.forms")]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(h.sap.discover_calls(), 0);
    }

    #[tokio::test]
    async fn test_read_only_session_cannot_delete() {
        let h = Harness::new();
        let service = h.invocation_service();
        let session_id = h.login("alice", &["read"]).await;

        let err = service
            .invoke(call(
                names::EXECUTE_OPERATION,
                json!({
                    "session_id": session_id.as_str(),
                    "service_id": "API_BUSINESS_PARTNER",
                    "entity_type": "A_BusinessPartner",
                    "operation": "delete",
                    "key": "'1000'",
                }),
                "conn1",
            ))
            .await
            .unwrap_err();

        match err {
            GatewayError::InsufficientScope { tool, missing } => {
                assert_eq!(tool, names::EXECUTE_OPERATION);
                assert_eq!(missing, vec![Scope::from("write")]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(h.sap.executed().is_empty());
    }

    #[tokio::test]
    async fn test_write_scope_allows_update() {
        let h = Harness::new();
        let service = h.invocation_service();
        let session_id = h.login("alice", &["write"]).await;

        service
            .invoke(call(
                names::EXECUTE_OPERATION,
                json!({
                    "session_id": session_id.as_str(),
                    "service_id": "API_BUSINESS_PARTNER",
                    "entity_type": "A_BusinessPartner",
                    "operation": "update",
                    "key": "'1000'",
                    "payload": { "BusinessPartnerName": "ACME" },
                }),
                "conn1",
            ))
            .await
            .unwrap();

        let executed = h.sap.executed();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].0, EntityOperation::Update);
    }

    #[tokio::test]
    async fn test_repeated_denials_share_one_pending_login() {
        let h = Harness::new();
        let service = h.invocation_service();

        for _ in 0..50 {
            let err = service
                .invoke(call(names::SEARCH_SERVICES, json!({}), "conn1"))
                .await
                .unwrap_err();
            assert_eq!(err.code(), "authentication_required");
        }
        assert_eq!(h.auth.pending_logins(), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let h = Harness::new();
        let err = h
            .invocation_service()
            .invoke(call("drop-database", json!({}), "conn1"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::UnknownTool(_)));
    }

    #[tokio::test]
    async fn test_check_authentication_without_session() {
        let h = Harness::new();
        let response = h
            .invocation_service()
            .invoke(call(names::CHECK_AUTHENTICATION, Value::Null, "conn1"))
            .await
            .unwrap();

        assert_eq!(response.output["authenticated"], false);
        assert_eq!(response.output["status"]["state"], "unauthenticated");
        assert!(response.output["authorization_url"].as_str().is_some_and(|u| !u.is_empty()));
    }

    #[tokio::test]
    async fn test_route_and_invoke_natural_language() {
        let h = Harness::new();
        let service = h.invocation_service();
        let session_id = h.login("alice", &["read"]).await;

        let response = service
            .route_and_invoke(RouteRequest {
                request: "show sales orders from the last 3 months".to_string(),
                arguments: json!({ "session_id": session_id.as_str() }),
                connection_id: Some(ConnectionId::from("conn1")),
            })
            .await
            .unwrap();

        let routing = response.routing.unwrap();
        assert_eq!(routing.selected_tool, names::NATURAL_QUERY);
        let tools: Vec<&str> = response.steps.iter().map(|s| s.tool.as_str()).collect();
        assert_eq!(
            tools,
            vec![
                names::SEARCH_SERVICES,
                names::DISCOVER_ENTITIES,
                names::NATURAL_QUERY,
                names::EXECUTE_OPERATION
            ]
        );
        assert_eq!(h.sap.executed().len(), 1);
    }

    #[tokio::test]
    async fn test_route_and_invoke_rejects_ambiguous_request() {
        let h = Harness::new();
        let service = h.invocation_service_with_threshold(0.5);
        let session_id = h.login("alice", &["read"]).await;

        let err = service
            .route_and_invoke(RouteRequest {
                request: "trend".to_string(),
                arguments: json!({ "session_id": session_id.as_str() }),
                connection_id: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "routing_ambiguous");
    }
}
