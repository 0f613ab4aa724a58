// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the SAP Gateway CLI

pub mod config;
pub mod route;
pub mod serve;

pub use self::config::ConfigCommand;
pub use self::route::RouteArgs;
