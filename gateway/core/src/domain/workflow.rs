// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Workflow Sequences
//!
//! A routed request becomes an ordered list of tool invocations. Steps
//! communicate through a shared *blackboard*: each step reads the slots its
//! [`StepContract`] consumes and writes the slots it produces.
//!
//! [`plan_sequence`] expands a target tool into the upstream steps needed to
//! fill its missing input slots. A slot already present in the request context
//! never triggers an upstream step.

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::tool::names;

/// Named value threaded between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    ServiceId,
    EntityType,
    Schema,
    Query,
    Results,
    UiArtifact,
    Analysis,
}

impl Slot {
    /// Blackboard key holding this slot.
    pub fn key(self) -> &'static str {
        match self {
            Self::ServiceId => "service_id",
            Self::EntityType => "entity_type",
            Self::Schema => "schema",
            Self::Query => "query",
            Self::Results => "results",
            Self::UiArtifact => "ui_artifact",
            Self::Analysis => "analysis",
        }
    }

    /// Tool that fills this slot when the caller did not supply it.
    pub fn producer(self) -> Option<&'static str> {
        match self {
            Self::ServiceId => Some(names::SEARCH_SERVICES),
            Self::EntityType => Some(names::DISCOVER_ENTITIES),
            Self::Schema => Some(names::ENTITY_SCHEMA),
            _ => None,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepContract {
    pub consumes: &'static [Slot],
    pub produces: &'static [Slot],
}

const NONE: &[Slot] = &[];

/// Input/output slots of a tool. Unknown tools consume and produce nothing.
pub fn contract_for(tool: &str) -> StepContract {
    let (consumes, produces): (&'static [Slot], &'static [Slot]) = match tool {
        names::SEARCH_SERVICES => (NONE, &[Slot::ServiceId]),
        names::DISCOVER_ENTITIES => (&[Slot::ServiceId], &[Slot::EntityType]),
        names::ENTITY_SCHEMA => (&[Slot::ServiceId, Slot::EntityType], &[Slot::Schema]),
        names::EXECUTE_OPERATION => (&[Slot::ServiceId, Slot::EntityType], &[Slot::Results]),
        names::NATURAL_QUERY => (&[Slot::ServiceId, Slot::EntityType], &[Slot::Query]),
        names::QUERY_OPTIMIZER | names::PROCESS_INSIGHTS => (NONE, &[Slot::Analysis]),
        names::UI_FORM | names::UI_GRID | names::UI_DASHBOARD | names::UI_WORKFLOW | names::UI_REPORT => {
            (&[Slot::ServiceId, Slot::EntityType, Slot::Schema], &[Slot::UiArtifact])
        }
        _ => (NONE, NONE),
    };
    StepContract { consumes, produces }
}

/// Steps that always run after `tool`.
pub fn follow_ups(tool: &str) -> &'static [&'static str] {
    match tool {
        names::NATURAL_QUERY => &[names::EXECUTE_OPERATION],
        _ => &[],
    }
}

/// Expand `target` into a full sequence given the slots already `available`.
///
/// Missing inputs are satisfied depth-first in contract order, each producer at
/// most once; follow-up steps are appended last.
pub fn plan_sequence(target: &str, available: &[Slot]) -> Vec<String> {
    let mut filled: Vec<Slot> = available.to_vec();
    let mut sequence: Vec<String> = Vec::new();
    push_with_dependencies(target, &mut filled, &mut sequence);
    for follow_up in follow_ups(target) {
        push_with_dependencies(follow_up, &mut filled, &mut sequence);
    }
    sequence
}

fn push_with_dependencies(tool: &str, filled: &mut Vec<Slot>, sequence: &mut Vec<String>) {
    let contract = contract_for(tool);
    for slot in contract.consumes {
        if filled.contains(slot) {
            continue;
        }
        if let Some(producer) = slot.producer() {
            if producer != tool && !sequence.iter().any(|s| s == producer) {
                push_with_dependencies(producer, filled, sequence);
            }
        }
    }
    filled.extend(contract.produces.iter().copied());
    sequence.push(tool.to_string());
}

/// Shared state of one workflow run, keyed by slot name plus free-form
/// request arguments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Blackboard(Map<String, Value>);

impl Blackboard {
    pub fn from_arguments(arguments: &Value) -> Self {
        match arguments {
            Value::Object(map) => Self(map.clone()),
            _ => Self::default(),
        }
    }

    pub fn has(&self, slot: Slot) -> bool {
        self.0.get(slot.key()).is_some_and(|v| !v.is_null())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn available_slots(&self) -> Vec<Slot> {
        [
            Slot::ServiceId,
            Slot::EntityType,
            Slot::Schema,
            Slot::Query,
            Slot::Results,
            Slot::UiArtifact,
            Slot::Analysis,
        ]
        .into_iter()
        .filter(|slot| self.has(*slot))
        .collect()
    }

    /// Merge a step's object output; non-object outputs land under `last_output`.
    pub fn absorb(&mut self, output: &Value) {
        match output {
            Value::Object(fields) => {
                for (key, value) in fields {
                    self.0.insert(key.clone(), value.clone());
                }
            }
            other => {
                self.0.insert("last_output".to_string(), other.clone());
            }
        }
    }

    /// Set `key` back to `value`, or drop it when `value` is `None`.
    pub fn restore(&mut self, key: &str, value: Option<Value>) {
        match value {
            Some(value) => {
                self.0.insert(key.to_string(), value);
            }
            None => {
                self.0.remove(key);
            }
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }
}

/// Result of one completed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub index: usize,
    pub tool: String,
    pub output: Value,
    pub duration_ms: u64,
}

/// Outcome of a fully completed sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowOutcome {
    pub steps: Vec<StepRecord>,
    pub output: Value,
}

/// Runs a single tool against the external collaborators.
#[async_trait]
pub trait StepExecutor: Send + Sync {
    async fn execute(&self, tool: &str, input: &Blackboard) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plan_prepends_missing_discovery_steps() {
        assert_eq!(
            plan_sequence(names::UI_FORM, &[]),
            vec![
                names::SEARCH_SERVICES,
                names::DISCOVER_ENTITIES,
                names::ENTITY_SCHEMA,
                names::UI_FORM
            ]
        );
    }

    #[test]
    fn test_plan_skips_slots_from_context() {
        assert_eq!(
            plan_sequence(names::UI_FORM, &[Slot::ServiceId, Slot::EntityType]),
            vec![names::ENTITY_SCHEMA, names::UI_FORM]
        );
        assert_eq!(
            plan_sequence(names::UI_GRID, &[Slot::ServiceId, Slot::EntityType, Slot::Schema]),
            vec![names::UI_GRID]
        );
    }

    #[test]
    fn test_natural_query_is_followed_by_execution() {
        assert_eq!(
            plan_sequence(names::NATURAL_QUERY, &[Slot::ServiceId]),
            vec![names::DISCOVER_ENTITIES, names::NATURAL_QUERY, names::EXECUTE_OPERATION]
        );
    }

    #[test]
    fn test_producer_is_not_its_own_dependency() {
        assert_eq!(plan_sequence(names::SEARCH_SERVICES, &[]), vec![names::SEARCH_SERVICES]);
        assert_eq!(
            plan_sequence(names::DISCOVER_ENTITIES, &[]),
            vec![names::SEARCH_SERVICES, names::DISCOVER_ENTITIES]
        );
    }

    #[test]
    fn test_blackboard_absorbs_object_outputs() {
        let mut board = Blackboard::from_arguments(&json!({ "service_id": "API_BP" }));
        assert!(board.has(Slot::ServiceId));
        assert!(!board.has(Slot::EntityType));

        board.absorb(&json!({ "entity_type": "A_BusinessPartner", "entities": ["A_BusinessPartner"] }));
        board.absorb(&json!("plain"));

        assert_eq!(board.get_str("entity_type"), Some("A_BusinessPartner"));
        assert_eq!(board.get("last_output"), Some(&json!("plain")));
        assert_eq!(board.available_slots(), vec![Slot::ServiceId, Slot::EntityType]);
    }
}
