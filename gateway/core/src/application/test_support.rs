// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

//! In-crate fakes shared by the application unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};

use crate::application::association_bridge::AssociationBridge;
use crate::application::authentication_service::{AuthenticationService, AuthenticationSettings};
use crate::application::authorization_gate::AuthorizationGate;
use crate::application::request_router::RequestRouter;
use crate::application::tool_invocation_service::ToolInvocationService;
use crate::application::workflow_sequencer::{SapStepExecutor, WorkflowSequencer};
use crate::domain::authentication::{
    IdentityProvider, ProviderError, TokenSet, TokenValidation, TokenValidator, ValidationFailure,
};
use crate::domain::clock::MockClock;
use crate::domain::gateway_config::RoutingConfig;
use crate::domain::sap::{EntityOperation, SapDataAccess, ServiceInfo, UiToolRunner};
use crate::domain::scope::Scope;
use crate::domain::session::{SessionId, UserInfo};
use crate::domain::tool::names;
use crate::infrastructure::association_repository::InMemoryAssociationRepository;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::session_store::{InMemorySessionStore, SessionStoreSettings};
use crate::infrastructure::tool_registry::InMemoryToolRegistry;

/// Provider that hands the authorization code back as the access token.
#[derive(Default)]
pub struct FakeProvider {
    failure: Mutex<Option<ProviderError>>,
}

impl FakeProvider {
    pub fn fail_with(&self, error: ProviderError) {
        *self.failure.lock() = Some(error);
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn authorization_url(&self, state: &str, code_challenge: &str) -> Result<String, ProviderError> {
        Ok(format!(
            "https://idp.example/oauth/authorize?state={state}&code_challenge={code_challenge}"
        ))
    }

    async fn exchange_code(&self, code: &str, _code_verifier: &str) -> Result<TokenSet, ProviderError> {
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }
        Ok(TokenSet {
            access_token: code.to_string(),
            id_token: None,
            refresh_token: None,
            expires_in: Some(3600),
            token_type: Some("bearer".to_string()),
        })
    }
}

/// Validator answering from a fixed token table; unknown tokens are malformed.
#[derive(Default)]
pub struct FakeValidator {
    tokens: Mutex<HashMap<String, TokenValidation>>,
}

impl FakeValidator {
    pub fn accept(&self, token: &str, user: &str, scopes: &[&str]) {
        let scopes = scopes.iter().map(|s| Scope::from(*s)).collect();
        self.tokens.lock().insert(
            token.to_string(),
            TokenValidation::success(UserInfo::new(user, scopes), Utc::now() + Duration::hours(1)),
        );
    }

    pub fn reject(&self, token: &str, reason: ValidationFailure) {
        self.tokens
            .lock()
            .insert(token.to_string(), TokenValidation::failure(reason));
    }
}

#[async_trait]
impl TokenValidator for FakeValidator {
    async fn validate(&self, token: &str) -> Result<TokenValidation> {
        Ok(self
            .tokens
            .lock()
            .get(token)
            .cloned()
            .unwrap_or_else(|| TokenValidation::failure(ValidationFailure::Malformed)))
    }
}

/// Two services: business partners and sales orders.
pub struct FakeSap {
    services: Vec<ServiceInfo>,
    metadata_failure: Mutex<Option<String>>,
    discovery_delay: Mutex<Option<StdDuration>>,
    executed: Mutex<Vec<(EntityOperation, String, Value)>>,
    discover_calls: AtomicUsize,
}

impl FakeSap {
    pub fn with_business_partners() -> Self {
        Self {
            services: vec![
                ServiceInfo {
                    id: "API_BUSINESS_PARTNER".to_string(),
                    title: "Business Partner".to_string(),
                    description: None,
                    entity_sets: vec!["A_BusinessPartner".to_string(), "A_BusinessPartnerAddress".to_string()],
                },
                ServiceInfo {
                    id: "API_SALES_ORDER_SRV".to_string(),
                    title: "Sales Order".to_string(),
                    description: None,
                    entity_sets: vec!["A_SalesOrder".to_string(), "A_SalesOrderItem".to_string()],
                },
            ],
            metadata_failure: Mutex::new(None),
            discovery_delay: Mutex::new(None),
            executed: Mutex::new(Vec::new()),
            discover_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_metadata(&self, message: &str) {
        *self.metadata_failure.lock() = Some(message.to_string());
    }

    pub fn delay_discovery(&self, delay: StdDuration) {
        *self.discovery_delay.lock() = Some(delay);
    }

    pub fn executed(&self) -> Vec<(EntityOperation, String, Value)> {
        self.executed.lock().clone()
    }

    pub fn discover_calls(&self) -> usize {
        self.discover_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SapDataAccess for FakeSap {
    async fn discover(&self) -> Result<Vec<ServiceInfo>> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.discovery_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.services.clone())
    }

    async fn get_metadata(&self, service_id: &str, entity: &str) -> Result<Value> {
        if let Some(message) = self.metadata_failure.lock().clone() {
            bail!(message);
        }
        Ok(json!({
            "service": service_id,
            "entity": entity,
            "properties": [{ "name": "BusinessPartner", "type": "Edm.String", "key": true }],
        }))
    }

    async fn execute(&self, operation: EntityOperation, _service_id: &str, entity: &str, params: &Value) -> Result<Value> {
        self.executed
            .lock()
            .push((operation, entity.to_string(), params.clone()));
        Ok(json!([{ "id": "1000" }, { "id": "1001" }]))
    }
}

/// Echoes the tool name and the entity it was asked about.
#[derive(Default)]
pub struct FakeUiTools;

#[async_trait]
impl UiToolRunner for FakeUiTools {
    async fn run(&self, tool: &str, input: &Value) -> Result<Value> {
        if tool == names::NATURAL_QUERY {
            return Ok(json!({ "query_options": "$filter=CreationDate ge datetime'2024-11-01'" }));
        }
        Ok(json!({ "tool": tool, "entity_type": input.get("entity_type") }))
    }
}

pub struct Harness {
    pub clock: Arc<MockClock>,
    pub bus: EventBus,
    pub sessions: Arc<InMemorySessionStore>,
    pub bridge: Arc<AssociationBridge>,
    pub auth: Arc<AuthenticationService>,
    pub provider: Arc<FakeProvider>,
    pub validator: Arc<FakeValidator>,
    pub sap: Arc<FakeSap>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_limit(1)
    }

    pub fn with_limit(max_sessions_per_user: usize) -> Self {
        Self::build(max_sessions_per_user, AuthenticationSettings::default())
    }

    pub fn with_auth_settings(settings: AuthenticationSettings) -> Self {
        Self::build(1, settings)
    }

    fn build(max_sessions_per_user: usize, settings: AuthenticationSettings) -> Self {
        let clock = Arc::new(MockClock::starting_now());
        let bus = EventBus::new(256);
        let sessions = Arc::new(InMemorySessionStore::new(
            SessionStoreSettings {
                ttl: Duration::hours(1),
                max_sessions_per_user,
            },
            clock.clone(),
            bus.clone(),
        ));
        let bridge = Arc::new(AssociationBridge::new(
            Arc::new(InMemoryAssociationRepository::new()),
            sessions.clone(),
            clock.clone(),
            bus.clone(),
        ));
        let provider = Arc::new(FakeProvider::default());
        let validator = Arc::new(FakeValidator::default());
        let auth = Arc::new(AuthenticationService::new(
            provider.clone(),
            validator.clone(),
            sessions.clone(),
            bridge.clone(),
            clock.clone(),
            bus.clone(),
            settings,
        ));
        Self {
            clock,
            bus,
            sessions,
            bridge,
            auth,
            provider,
            validator,
            sap: Arc::new(FakeSap::with_business_partners()),
        }
    }

    /// Complete a login for `user` and return the new session id.
    pub async fn login(&self, user: &str, scopes: &[&str]) -> SessionId {
        let challenge = self.auth.begin_login(None).await.unwrap();
        let code = format!("code-{}", challenge.state);
        self.validator.accept(&code, user, scopes);
        self.auth.complete_login(&challenge.state, &code).await.unwrap().session_id
    }

    pub fn invocation_service(&self) -> ToolInvocationService {
        self.invocation_service_with_threshold(RoutingConfig::default().ambiguity_threshold)
    }

    pub fn invocation_service_with_threshold(&self, ambiguity_threshold: f64) -> ToolInvocationService {
        let registry = Arc::new(InMemoryToolRegistry::with_sap_catalog());
        let router = RequestRouter::new(
            registry.clone(),
            RoutingConfig {
                ambiguity_threshold,
                ..RoutingConfig::default()
            },
        )
        .unwrap();
        let sequencer = WorkflowSequencer::new(
            Arc::new(SapStepExecutor::new(self.sap.clone(), Arc::new(FakeUiTools))),
            StdDuration::from_secs(5),
        );
        let gate = AuthorizationGate::new(self.sessions.clone(), self.bridge.clone(), self.auth.clone());
        ToolInvocationService::new(
            registry,
            Arc::new(gate),
            self.auth.clone(),
            Arc::new(router),
            Arc::new(sequencer),
        )
    }
}
