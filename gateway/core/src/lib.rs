// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0
//! SAP Gateway Core
//!
//! Session-bridged authentication and intent routing for tool calls that reach
//! SAP business data.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain model, use-case services, in-memory infrastructure and
//!   the HTTP surface consumed by the `sapgw` binary.

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
