// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Application Layer (`sap-gateway-core`)
//!
//! Use-case services that wire the domain to the infrastructure adapters.
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`association_bridge`] | protocol connection → session hand-off |
//! | [`authentication_service`] | login, callback, logout, revocation, auth status |
//! | [`authorization_gate`] | session resolution and scope check before a call |
//! | [`request_router`] | free-form request → tool and workflow sequence |
//! | [`workflow_sequencer`] | ordered step execution with data threading |
//! | [`tool_invocation_service`] | façade combining all of the above |
//! | [`session_sweeper`] | background expiry sweep |

pub mod association_bridge;
pub mod authentication_service;
pub mod authorization_gate;
pub mod request_router;
pub mod session_sweeper;
pub mod tool_invocation_service;
pub mod workflow_sequencer;

#[cfg(test)]
pub(crate) mod test_support;

pub use association_bridge::AssociationBridge;
pub use authentication_service::{AuthenticationService, AuthenticationSettings, LoginChallenge, LoginResult};
pub use authorization_gate::{AuthorizationDecision, AuthorizationGate, CallerIdentity};
pub use request_router::{RequestRouter, RouteCandidate, RoutingDecision};
pub use session_sweeper::{SessionSweeper, SweepReport};
pub use tool_invocation_service::{RouteRequest, ToolCall, ToolInvocationService, ToolResponse};
pub use workflow_sequencer::{SapStepExecutor, WorkflowSequencer};
