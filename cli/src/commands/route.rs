// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `sapgw route` - print the routing decision for a request as JSON.

use anyhow::{Context, Result};
use clap::Args;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

use sap_gateway_core::application::{RequestRouter, RoutingDecision};
use sap_gateway_core::domain::gateway_config::GatewayConfigManifest;
use sap_gateway_core::infrastructure::tool_registry::InMemoryToolRegistry;

#[derive(Args)]
pub struct RouteArgs {
    /// Free-form request, natural language or a direct OData query
    #[arg(value_name = "REQUEST")]
    pub request: String,

    /// Known SAP service id
    #[arg(long)]
    pub service: Option<String>,

    /// Known entity type
    #[arg(long)]
    pub entity: Option<String>,
}

pub async fn run(args: RouteArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = GatewayConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    let decision = decide(&args, &config)?;
    println!("{}", serde_json::to_string_pretty(&decision)?);
    Ok(())
}

fn decide(args: &RouteArgs, config: &GatewayConfigManifest) -> Result<RoutingDecision> {
    let router = RequestRouter::new(
        Arc::new(InMemoryToolRegistry::with_sap_catalog()),
        config.spec.routing.clone(),
    )
    .context("Failed to compile routing patterns")?;

    let mut context = Map::new();
    if let Some(service) = &args.service {
        context.insert("service_id".to_string(), Value::String(service.clone()));
    }
    if let Some(entity) = &args.entity {
        context.insert("entity_type".to_string(), Value::String(entity.clone()));
    }
    Ok(router.route(&args.request, &Value::Object(context)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(request: &str, service: Option<&str>, entity: Option<&str>) -> RouteArgs {
        RouteArgs {
            request: request.to_string(),
            service: service.map(str::to_string),
            entity: entity.map(str::to_string),
        }
    }

    #[test]
    fn test_context_flags_reach_the_router() {
        let config = GatewayConfigManifest::default();
        let decision = decide(
            &args("which services are available?", Some("API_BUSINESS_PARTNER"), Some("A_BusinessPartner")),
            &config,
        )
        .unwrap();
        assert_eq!(decision.selected_tool, "get-entity-schema");
        assert_eq!(decision.arguments["service_id"], "API_BUSINESS_PARTNER");
    }

    #[test]
    fn test_direct_query() {
        let decision = decide(&args("A_BusinessPartner?$top=5", None, None), &GatewayConfigManifest::default()).unwrap();
        assert_eq!(decision.selected_tool, "execute-entity-operation");
        assert_eq!(decision.confidence, 1.0);
    }
}
