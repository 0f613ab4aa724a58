// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Domain Layer
//!
//! Aggregates, value objects, repository traits and pure domain services.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Owns every invariant of sessions, associations, routing and
//!   workflow sequencing. Nothing in here performs I/O.

pub mod association;
pub mod authentication;
pub mod clock;
pub mod errors;
pub mod events;
pub mod gateway_config;
pub mod routing;
pub mod sap;
pub mod scope;
pub mod session;
pub mod session_store;
pub mod tool;
pub mod workflow;
