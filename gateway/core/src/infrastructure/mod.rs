// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure Layer
//!
//! In-memory repositories, identity provider integration, the event bus and
//! the built-in tool catalog, plus the detached SAP collaborators used when
//! no back end is wired in.

pub mod association_repository;
pub mod audit;
pub mod event_bus;
pub mod identity;
pub mod sap_backend;
pub mod session_store;
pub mod tool_registry;
