// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

//! `sapgw serve` - wire the gateway services and run the HTTP server
//! until Ctrl+C or SIGTERM.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{debug, error, info, warn};

use sap_gateway_core::{
    application::{
        AssociationBridge, AuthenticationService, AuthenticationSettings, AuthorizationGate, RequestRouter,
        SapStepExecutor, SessionSweeper, ToolInvocationService, WorkflowSequencer,
    },
    domain::{
        clock::{Clock, SystemClock},
        gateway_config::GatewayConfigManifest,
    },
    infrastructure::{
        association_repository::InMemoryAssociationRepository,
        event_bus::{EventBus, EventBusError},
        identity::{oauth_client::HttpIdentityProvider, token_verifier::JwtTokenValidator},
        sap_backend::{DescriptorUiTools, DetachedSapBackend},
        session_store::{InMemorySessionStore, SessionStoreSettings},
        tool_registry::InMemoryToolRegistry,
    },
    presentation::api::{app, AppState},
};

/// Fully wired gateway, ready to serve.
pub struct Gateway {
    pub state: AppState,
    pub sweeper: Arc<SessionSweeper>,
    pub event_bus: EventBus,
}

/// Build every service from a validated configuration.
pub fn build_gateway(config: &GatewayConfigManifest) -> Result<Gateway> {
    let Some(idp) = config.spec.identity_provider.as_ref() else {
        anyhow::bail!("spec.identity_provider must be configured to serve");
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let event_bus = EventBus::with_default_capacity();

    let sessions = Arc::new(InMemorySessionStore::new(
        SessionStoreSettings {
            ttl: config.spec.session.ttl(),
            max_sessions_per_user: config.spec.session.max_sessions_per_user,
        },
        clock.clone(),
        event_bus.clone(),
    ));
    let bridge = Arc::new(AssociationBridge::new(
        Arc::new(InMemoryAssociationRepository::new()),
        sessions.clone(),
        clock.clone(),
        event_bus.clone(),
    ));

    let provider = HttpIdentityProvider::from_config(idp).context("Failed to initialize identity provider client")?;
    let validator = JwtTokenValidator::from_config(idp).context("Failed to initialize token verifier")?;
    let auth = Arc::new(AuthenticationService::new(
        Arc::new(provider),
        Arc::new(validator),
        sessions.clone(),
        bridge.clone(),
        clock,
        event_bus.clone(),
        AuthenticationSettings::from_config(idp),
    ));

    let registry = Arc::new(InMemoryToolRegistry::with_sap_catalog());
    let router = RequestRouter::new(registry.clone(), config.spec.routing.clone())
        .context("Failed to compile routing patterns")?;
    if config.spec.sap.services.is_empty() {
        warn!("No SAP services configured; discovery will return an empty catalog");
    }
    let sequencer = WorkflowSequencer::new(
        Arc::new(SapStepExecutor::new(
            Arc::new(DetachedSapBackend::new(config.spec.sap.services.clone())),
            Arc::new(DescriptorUiTools),
        )),
        config.spec.workflow.step_timeout(),
    );
    let gate = AuthorizationGate::new(sessions.clone(), bridge.clone(), auth.clone());
    let tools = ToolInvocationService::new(registry, Arc::new(gate), auth.clone(), Arc::new(router), Arc::new(sequencer));

    let sweeper = Arc::new(
        SessionSweeper::new(sessions, bridge.clone(), config.spec.session.cleanup_interval())
            .with_authentication(auth.clone()),
    );

    Ok(Gateway {
        state: AppState {
            auth,
            tools: Arc::new(tools),
            bridge,
        },
        sweeper,
        event_bus,
    })
}

pub async fn run(config_path: Option<PathBuf>, port_override: Option<u16>) -> Result<()> {
    let config = GatewayConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;
    info!("Configuration loaded: name={}", config.metadata.name);

    let gateway = build_gateway(&config)?;

    let sweeper_token = gateway.sweeper.shutdown_token();
    let sweeper_handle = gateway.sweeper.clone().start();
    tokio::spawn(log_domain_events(gateway.event_bus.clone()));

    let port = port_override.unwrap_or(config.spec.network.port);
    let addr = format!("{}:{}", config.spec.network.bind_address, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Gateway listening on {}", addr);

    axum::serve(listener, app(gateway.state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Gateway shutting down");
    sweeper_token.cancel();
    if let Err(e) = sweeper_handle.await {
        warn!("Session sweeper task ended abnormally: {}", e);
    }

    Ok(())
}

async fn log_domain_events(event_bus: EventBus) {
    let mut receiver = event_bus.subscribe();
    loop {
        match receiver.recv().await {
            Ok(event) => debug!(session_id = ?event.session_id(), event = ?event, "Domain event"),
            Err(EventBusError::Lagged(missed)) => warn!(missed, "Event log subscriber lagged"),
            Err(_) => break,
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
apiVersion: sap-gateway/v1
kind: GatewayConfig
metadata:
  name: cli-test
spec:
  identity_provider:
    authorization_endpoint: https://idp.example/oauth/authorize
    token_endpoint: https://idp.example/oauth/token
    client_id: sb-sap-gateway!t1
    redirect_uri: http://localhost:8080/auth/callback
    issuer: https://idp.example/oauth/token
    audiences: [sb-sap-gateway!t1]
    verification_key: shared-secret
    algorithm: HS256
    scope_prefix: sap-gateway!t1
  sap:
    services:
      - id: API_BUSINESS_PARTNER
        title: Business Partner
        entity_sets: [A_BusinessPartner]
"#;

    #[tokio::test]
    async fn test_build_gateway_wires_catalog() {
        let config = GatewayConfigManifest::from_yaml_str(CONFIG).unwrap();
        config.validate().unwrap();

        let gateway = build_gateway(&config).unwrap();
        let tools = gateway.state.tools.list_tools();
        assert!(tools.iter().any(|t| t.name == "check-sap-authentication"));

        let challenge = gateway.state.auth.begin_login(None).await.unwrap();
        assert!(challenge.authorization_url.starts_with("https://idp.example/oauth/authorize?"));
    }

    #[test]
    fn test_serve_requires_identity_provider() {
        let err = build_gateway(&GatewayConfigManifest::default()).err().unwrap();
        assert!(err.to_string().contains("identity_provider"));
    }
}
