// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

use serde_json::{json, Value};
use thiserror::Error;

use crate::domain::authentication::{Remediation, ValidationFailure};
use crate::domain::scope::Scope;
use crate::domain::workflow::StepRecord;

/// Every failure a caller of the gateway can observe.
///
/// Each variant carries what the caller needs to fix the problem on its own:
/// a login URL, the exact missing scopes, the candidate tools, or the steps
/// that already completed.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("authentication required: {}", .remediation.instructions)]
    AuthenticationRequired { remediation: Remediation },

    #[error("session {session_id} has expired")]
    SessionExpired { session_id: String, remediation: Remediation },

    #[error("insufficient scope for {tool}: missing {}", join_scopes(.missing))]
    InsufficientScope { tool: String, missing: Vec<Scope> },

    #[error("credential validation failed: {reason}")]
    ValidationError { reason: ValidationFailure },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("request is ambiguous (best confidence {best_confidence:.2}); candidates: {}", .candidates.join(", "))]
    RoutingAmbiguous {
        candidates: Vec<String>,
        best_confidence: f64,
    },

    #[error("workflow step '{step}' failed: {message}")]
    WorkflowStepFailed {
        step: String,
        message: String,
        completed: Vec<StepRecord>,
    },

    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

fn join_scopes(scopes: &[Scope]) -> String {
    scopes.iter().map(Scope::as_str).collect::<Vec<_>>().join(", ")
}

impl GatewayError {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthenticationRequired { .. } => "authentication_required",
            Self::SessionExpired { .. } => "session_expired",
            Self::InsufficientScope { .. } => "insufficient_scope",
            Self::ValidationError { .. } => "validation_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::ProviderUnavailable(_) => "provider_unavailable",
            Self::RoutingAmbiguous { .. } => "routing_ambiguous",
            Self::WorkflowStepFailed { .. } => "workflow_step_failed",
            Self::UnknownTool(_) => "unknown_tool",
            Self::Infrastructure(_) => "internal_error",
        }
    }

    /// Structured remediation details for the response body.
    pub fn details(&self) -> Value {
        match self {
            Self::AuthenticationRequired { remediation } => json!({
                "authorization_url": remediation.authorization_url,
                "instructions": remediation.instructions,
            }),
            Self::SessionExpired {
                session_id,
                remediation,
            } => json!({
                "session_id": session_id,
                "authorization_url": remediation.authorization_url,
                "instructions": remediation.instructions,
            }),
            Self::InsufficientScope { tool, missing } => json!({
                "tool": tool,
                "missing_scopes": missing,
            }),
            Self::ValidationError { reason } => json!({ "reason": reason }),
            Self::RoutingAmbiguous {
                candidates,
                best_confidence,
            } => json!({
                "candidates": candidates,
                "best_confidence": best_confidence,
                "instructions": "Rephrase the request or call one of the candidate tools directly.",
            }),
            Self::WorkflowStepFailed { step, completed, .. } => json!({
                "failed_step": step,
                "completed_steps": completed,
            }),
            // Internal fault details stay in the logs.
            Self::InvalidRequest(_) | Self::ProviderUnavailable(_) | Self::UnknownTool(_) | Self::Infrastructure(_) => {
                Value::Null
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_scope_lists_missing() {
        let err = GatewayError::InsufficientScope {
            tool: "ui-form-generator".to_string(),
            missing: vec![Scope::from("ui.forms"), Scope::from("write")],
        };
        assert_eq!(err.code(), "insufficient_scope");
        assert!(err.to_string().contains("ui.forms, write"));
        assert_eq!(err.details()["missing_scopes"], json!(["ui.forms", "write"]));
    }

    #[test]
    fn test_authentication_required_exposes_url() {
        let err = GatewayError::AuthenticationRequired {
            remediation: Remediation::login("https://idp.example/authorize?x=1"),
        };
        assert_eq!(err.details()["authorization_url"], "https://idp.example/authorize?x=1");
    }

    #[test]
    fn test_infrastructure_details_are_hidden() {
        let err: GatewayError = anyhow::anyhow!("db password wrong").into();
        assert_eq!(err.code(), "internal_error");
        assert!(err.details().is_null());
    }
}
