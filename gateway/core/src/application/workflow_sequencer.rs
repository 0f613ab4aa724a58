// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::domain::errors::GatewayError;
use crate::domain::sap::{EntityOperation, SapDataAccess, ServiceInfo, UiToolRunner};
use crate::domain::tool::names;
use crate::domain::workflow::{contract_for, Blackboard, StepExecutor, StepRecord, WorkflowOutcome};

/// Executes a tool sequence in order, threading each step's output into the
/// blackboard read by the next one. Stops at the first failing step.
pub struct WorkflowSequencer {
    executor: Arc<dyn StepExecutor>,
    step_timeout: Duration,
}

impl WorkflowSequencer {
    pub fn new(executor: Arc<dyn StepExecutor>, step_timeout: Duration) -> Self {
        Self { executor, step_timeout }
    }

    pub async fn run(&self, sequence: &[String], arguments: &Value) -> Result<WorkflowOutcome, GatewayError> {
        if sequence.is_empty() {
            return Err(GatewayError::InvalidRequest("empty workflow sequence".to_string()));
        }

        let mut board = Blackboard::from_arguments(arguments);
        // Scopes were checked against the caller's operation; steps cannot change it.
        let operation = board.get("operation").cloned();
        let mut completed: Vec<StepRecord> = Vec::with_capacity(sequence.len());

        for (index, tool) in sequence.iter().enumerate() {
            let contract = contract_for(tool);
            if let Some(slot) = contract.consumes.iter().find(|slot| !board.has(**slot)) {
                return Err(step_failed(tool, format!("missing required argument '{slot}'"), completed));
            }

            debug!(step = index, tool = %tool, "Running workflow step");
            let started = Instant::now();
            let output = match tokio::time::timeout(self.step_timeout, self.executor.execute(tool, &board)).await {
                Err(_) => {
                    let message = format!("timed out after {}s", self.step_timeout.as_secs());
                    return Err(step_failed(tool, message, completed));
                }
                Ok(Err(e)) => return Err(step_failed(tool, e.to_string(), completed)),
                Ok(Ok(output)) => output,
            };

            board.absorb(&output);
            board.restore("operation", operation.clone());
            completed.push(StepRecord {
                index,
                tool: tool.clone(),
                output,
                duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            });
        }

        info!(steps = completed.len(), "Workflow completed");
        let output = completed.last().map(|s| s.output.clone()).unwrap_or(Value::Null);
        Ok(WorkflowOutcome {
            steps: completed,
            output,
        })
    }
}

fn step_failed(tool: &str, message: String, completed: Vec<StepRecord>) -> GatewayError {
    warn!(tool = %tool, completed = completed.len(), error = %message, "Workflow step failed");
    GatewayError::WorkflowStepFailed {
        step: tool.to_string(),
        message,
        completed,
    }
}

/// Dispatches each built-in tool to the SAP back end or to the UI/AI runner.
pub struct SapStepExecutor {
    data: Arc<dyn SapDataAccess>,
    tools: Arc<dyn UiToolRunner>,
}

impl SapStepExecutor {
    pub fn new(data: Arc<dyn SapDataAccess>, tools: Arc<dyn UiToolRunner>) -> Self {
        Self { data, tools }
    }

    async fn search_services(&self, input: &Blackboard) -> Result<Value> {
        let services = self.data.discover().await?;
        let terms = search_terms(input);

        let matching: Vec<&ServiceInfo> = if terms.is_empty() {
            services.iter().collect()
        } else {
            services
                .iter()
                .filter(|service| terms.iter().any(|term| service.matches(term)))
                .collect()
        };
        let Some(best) = matching.first() else {
            bail!("no SAP service matches '{}'", terms.join(" "));
        };

        Ok(json!({
            "service_id": best.id,
            "services": matching.iter().map(|s| json!({ "id": s.id, "title": s.title })).collect::<Vec<_>>(),
        }))
    }

    async fn discover_entities(&self, input: &Blackboard) -> Result<Value> {
        let service_id = required(input, "service_id")?;
        let services = self.data.discover().await?;
        let service = services
            .iter()
            .find(|s| s.id == service_id)
            .ok_or_else(|| anyhow!("service '{service_id}' not found"))?;

        let terms = search_terms(input);
        let entity = service
            .entity_sets
            .iter()
            .find(|entity| {
                let entity = entity.to_lowercase();
                terms.iter().any(|term| entity.contains(term.as_str()))
            })
            .or_else(|| service.entity_sets.first())
            .ok_or_else(|| anyhow!("service '{service_id}' exposes no entity sets"))?;

        Ok(json!({
            "entity_type": entity,
            "entity_sets": service.entity_sets,
        }))
    }

    async fn entity_schema(&self, input: &Blackboard) -> Result<Value> {
        let service_id = required(input, "service_id")?;
        let entity = required(input, "entity_type")?;
        let schema = self.data.get_metadata(service_id, entity).await?;
        Ok(json!({ "schema": schema }))
    }

    async fn execute_operation(&self, input: &Blackboard) -> Result<Value> {
        let service_id = required(input, "service_id")?;
        let entity = required(input, "entity_type")?;
        let operation = match input.get_str("operation") {
            Some(raw) => EntityOperation::parse(raw).ok_or_else(|| anyhow!("unknown operation '{raw}'"))?,
            None => EntityOperation::Query,
        };

        let query_options = input
            .get_str("query_options")
            .or_else(|| input.get_str("query"))
            .or_else(|| input.get("query").and_then(|q| q.get("query_options")).and_then(Value::as_str));
        let params = json!({
            "query_options": query_options,
            "key": input.get("key"),
            "payload": input.get("payload"),
        });

        let results = self.data.execute(operation, service_id, entity, &params).await?;
        Ok(json!({ "results": results }))
    }

    /// UI and AI tools: the runner's output is stored under the slot the tool produces.
    async fn run_tool(&self, tool: &str, input: &Blackboard) -> Result<Value> {
        let output = self.tools.run(tool, &input.to_value()).await?;
        let Some(slot) = contract_for(tool).produces.first() else {
            return Ok(output);
        };
        if output.get(slot.key()).is_some() {
            Ok(output)
        } else {
            Ok(json!({ slot.key(): output }))
        }
    }
}

#[async_trait]
impl StepExecutor for SapStepExecutor {
    async fn execute(&self, tool: &str, input: &Blackboard) -> Result<Value> {
        match tool {
            names::SEARCH_SERVICES => self.search_services(input).await,
            names::DISCOVER_ENTITIES => self.discover_entities(input).await,
            names::ENTITY_SCHEMA => self.entity_schema(input).await,
            names::EXECUTE_OPERATION => self.execute_operation(input).await,
            names::NATURAL_QUERY
            | names::QUERY_OPTIMIZER
            | names::PROCESS_INSIGHTS
            | names::UI_FORM
            | names::UI_GRID
            | names::UI_DASHBOARD
            | names::UI_WORKFLOW
            | names::UI_REPORT => self.run_tool(tool, input).await,
            other => bail!("no executor for tool '{other}'"),
        }
    }
}

fn required<'a>(input: &'a Blackboard, key: &str) -> Result<&'a str> {
    input
        .get_str(key)
        .ok_or_else(|| anyhow!("missing required argument '{key}'"))
}

/// Lowercased terms to search for: an explicit `search` argument, else the
/// entity type, else the longer words of the request text.
fn search_terms(input: &Blackboard) -> Vec<String> {
    if let Some(term) = input.get_str("search").or_else(|| input.get_str("entity_type")) {
        return vec![term.to_lowercase()];
    }
    input
        .get_str("request")
        .map(|request| {
            request
                .split(|c: char| !c.is_alphanumeric() && c != '_')
                .filter(|word| word.chars().count() >= 4)
                .map(str::to_lowercase)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::test_support::{FakeSap, FakeUiTools};
    use crate::domain::workflow::plan_sequence;

    fn sequencer(sap: Arc<FakeSap>) -> WorkflowSequencer {
        WorkflowSequencer::new(
            Arc::new(SapStepExecutor::new(sap, Arc::new(FakeUiTools::default()))),
            Duration::from_secs(5),
        )
    }

    fn seq(tools: &[&str]) -> Vec<String> {
        tools.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn test_outputs_thread_into_later_steps() {
        let sap = Arc::new(FakeSap::with_business_partners());
        let outcome = sequencer(sap.clone())
            .run(
                &plan_sequence(names::UI_FORM, &[]),
                &json!({ "request": "form for business partner" }),
            )
            .await
            .unwrap();

        let tools: Vec<&str> = outcome.steps.iter().map(|s| s.tool.as_str()).collect();
        assert_eq!(
            tools,
            vec![
                names::SEARCH_SERVICES,
                names::DISCOVER_ENTITIES,
                names::ENTITY_SCHEMA,
                names::UI_FORM
            ]
        );
        assert_eq!(outcome.steps[0].output["service_id"], "API_BUSINESS_PARTNER");
        assert_eq!(outcome.steps[1].output["entity_type"], "A_BusinessPartner");
        assert_eq!(outcome.output["ui_artifact"]["tool"], names::UI_FORM);
        assert_eq!(outcome.output["ui_artifact"]["entity_type"], "A_BusinessPartner");
    }

    #[tokio::test]
    async fn test_stops_at_first_failure_with_partial_results() {
        let sap = Arc::new(FakeSap::with_business_partners());
        sap.fail_metadata("metadata service down");

        let err = sequencer(sap)
            .run(
                &seq(&[names::ENTITY_SCHEMA, names::UI_GRID]),
                &json!({ "service_id": "API_BUSINESS_PARTNER", "entity_type": "A_BusinessPartner" }),
            )
            .await
            .unwrap_err();

        match err {
            GatewayError::WorkflowStepFailed { step, message, completed } => {
                assert_eq!(step, names::ENTITY_SCHEMA);
                assert!(message.contains("metadata service down"));
                assert!(completed.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_input_fails_before_execution() {
        let sap = Arc::new(FakeSap::with_business_partners());
        let err = sequencer(sap.clone())
            .run(&seq(&[names::SEARCH_SERVICES, names::EXECUTE_OPERATION]), &json!({ "search": "partner" }))
            .await
            .unwrap_err();

        match err {
            GatewayError::WorkflowStepFailed { step, message, completed } => {
                assert_eq!(step, names::EXECUTE_OPERATION);
                assert!(message.contains("entity_type"));
                assert_eq!(completed.len(), 1);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(sap.executed().len(), 0);
    }

    #[tokio::test]
    async fn test_direct_execution_passes_query_options() {
        let sap = Arc::new(FakeSap::with_business_partners());
        sequencer(sap.clone())
            .run(
                &seq(&[names::EXECUTE_OPERATION]),
                &json!({
                    "service_id": "API_BUSINESS_PARTNER",
                    "entity_type": "A_BusinessPartner",
                    "query_options": "$top=10",
                }),
            )
            .await
            .unwrap();

        let executed = sap.executed();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].0, EntityOperation::Query);
        assert_eq!(executed[0].2["query_options"], "$top=10");
    }

    #[tokio::test]
    async fn test_step_timeout() {
        let sap = Arc::new(FakeSap::with_business_partners());
        sap.delay_discovery(Duration::from_millis(200));
        let sequencer = WorkflowSequencer::new(
            Arc::new(SapStepExecutor::new(sap, Arc::new(FakeUiTools::default()))),
            Duration::from_millis(20),
        );

        let err = sequencer
            .run(&seq(&[names::SEARCH_SERVICES]), &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::WorkflowStepFailed { .. }));
    }

    struct MutatingTranslator;

    #[async_trait]
    impl UiToolRunner for MutatingTranslator {
        async fn run(&self, _tool: &str, _input: &Value) -> Result<Value> {
            Ok(json!({ "query": { "query_options": "$top=1" }, "operation": "delete" }))
        }
    }

    #[tokio::test]
    async fn test_steps_cannot_change_the_operation() {
        let sap = Arc::new(FakeSap::with_business_partners());
        let sequencer = WorkflowSequencer::new(
            Arc::new(SapStepExecutor::new(sap.clone(), Arc::new(MutatingTranslator))),
            Duration::from_secs(5),
        );

        sequencer
            .run(
                &seq(&[names::NATURAL_QUERY, names::EXECUTE_OPERATION]),
                &json!({ "service_id": "API_BUSINESS_PARTNER", "entity_type": "A_BusinessPartner" }),
            )
            .await
            .unwrap();

        let executed = sap.executed();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0].0, EntityOperation::Query);
        assert_eq!(executed[0].2["query_options"], "$top=1");
    }

    #[tokio::test]
    async fn test_unknown_search_term_fails() {
        let sap = Arc::new(FakeSap::with_business_partners());
        let err = sequencer(sap)
            .run(&seq(&[names::SEARCH_SERVICES]), &json!({ "search": "payroll" }))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no SAP service matches 'payroll'"));
    }
}
