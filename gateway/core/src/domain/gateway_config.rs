// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

// Gateway Configuration Types
//
// Kubernetes-style manifest (apiVersion/kind/metadata/spec) covering:
// - Session lifetime, per-user limits and sweep interval
// - Identity provider endpoints, trust settings and scope mapping
// - Router thresholds and workflow step timeouts
// - The SAP service catalog advertised when no live back end is wired in
// - Network binding and logging

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::sap::ServiceInfo;

pub const API_VERSION: &str = "sap-gateway/v1";
pub const KIND: &str = "GatewayConfig";

/// Top-level gateway configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfigManifest {
    /// API version (must be "sap-gateway/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "GatewayConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: GatewayConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfigSpec {
    #[serde(default)]
    pub session: SessionConfig,

    /// Required to serve; optional so `config generate` output validates as-is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_provider: Option<IdentityProviderConfig>,

    #[serde(default)]
    pub routing: RoutingConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub sap: SapConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Services answered by discovery when the gateway runs detached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SapConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<ServiceInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Sliding session lifetime
    #[serde(default = "default_session_ttl")]
    pub ttl_seconds: u64,

    /// Live sessions per user; the least recently used one is evicted beyond this
    #[serde(default = "default_max_sessions_per_user")]
    pub max_sessions_per_user: usize,

    /// Background expiry sweep interval
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_seconds: u64,
}

impl SessionConfig {
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_seconds.min(i64::MAX as u64) as i64)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_session_ttl(),
            max_sessions_per_user: default_max_sessions_per_user(),
            cleanup_interval_seconds: default_cleanup_interval(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    /// Shared secret
    HS256,
    /// RSA public key (PEM)
    #[default]
    RS256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityProviderConfig {
    pub authorization_endpoint: String,

    pub token_endpoint: String,

    pub client_id: String,

    /// Client secret (supports "env:VAR_NAME")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    pub redirect_uri: String,

    /// Expected `iss` claim
    pub issuer: String,

    /// Accepted `aud` values; a token must carry at least one
    pub audiences: Vec<String>,

    /// PEM public key (RS256) or shared secret (HS256); supports "env:VAR_NAME"
    pub verification_key: String,

    #[serde(default)]
    pub algorithm: SigningAlgorithm,

    /// Provider scopes look like `<prefix>.<scope>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_prefix: Option<String>,

    /// Explicit provider scope -> internal scope table
    #[serde(default)]
    pub scope_mappings: HashMap<String, String>,

    /// Scopes requested at the authorization endpoint
    #[serde(default = "default_requested_scopes")]
    pub requested_scopes: Vec<String>,

    #[serde(default = "default_provider_timeout")]
    pub timeout_seconds: u64,

    /// Lifetime of an unanswered login
    #[serde(default = "default_pending_login_ttl")]
    pub pending_login_ttl_seconds: u64,

    /// Cap on unanswered logins held at once; the oldest is dropped first
    #[serde(default = "default_max_pending_logins")]
    pub max_pending_logins: usize,
}

impl IdentityProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn pending_login_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.pending_login_ttl_seconds.min(i64::MAX as u64) as i64)
    }

    pub fn resolved_client_secret(&self) -> anyhow::Result<Option<String>> {
        self.client_secret.as_deref().map(resolve_env_reference).transpose()
    }

    pub fn resolved_verification_key(&self) -> anyhow::Result<String> {
        resolve_env_reference(&self.verification_key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Scores this close to the best are tie-broken by category priority
    #[serde(default = "default_tie_epsilon")]
    pub tie_epsilon: f64,

    /// Below this confidence a free-form request asks for clarification
    #[serde(default = "default_ambiguity_threshold")]
    pub ambiguity_threshold: f64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            tie_epsilon: default_tie_epsilon(),
            ambiguity_threshold: default_ambiguity_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_step_timeout")]
    pub step_timeout_seconds: u64,
}

impl WorkflowConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_seconds)
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            step_timeout_seconds: default_step_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: compact, json
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_session_ttl() -> u64 {
    3600
}

fn default_max_sessions_per_user() -> usize {
    1
}

fn default_cleanup_interval() -> u64 {
    300
}

fn default_requested_scopes() -> Vec<String> {
    vec!["openid".to_string()]
}

fn default_provider_timeout() -> u64 {
    10
}

fn default_pending_login_ttl() -> u64 {
    600
}

fn default_max_pending_logins() -> usize {
    1024
}

fn default_tie_epsilon() -> f64 {
    0.05
}

fn default_ambiguity_threshold() -> f64 {
    0.3
}

fn default_step_timeout() -> u64 {
    30
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

/// Resolve `env:VAR_NAME` references; other values are returned unchanged.
pub fn resolve_env_reference(value: &str) -> anyhow::Result<String> {
    match value.strip_prefix("env:") {
        Some(var) => std::env::var(var)
            .map_err(|_| anyhow::anyhow!("Environment variable '{}' referenced by configuration is not set", var)),
        None => Ok(value.to_string()),
    }
}

impl Default for GatewayConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "sap-gateway".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
                labels: None,
            },
            spec: GatewayConfigSpec::default(),
        }
    }
}

impl GatewayConfigManifest {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. SAP_GATEWAY_CONFIG_PATH environment variable
    /// 2. ./sap-gateway.yaml (working directory)
    /// 3. ~/.sap-gateway/config.yaml (user home)
    /// 4. /etc/sap-gateway/config.yaml (system, Unix) or C:\ProgramData\SapGateway\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("SAP_GATEWAY_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./sap-gateway.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".sap-gateway").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/sap-gateway/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\SapGateway\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, falling back to defaults
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // An explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            Self::from_yaml_file(config_path)?
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides (container deployments)
    pub fn apply_env_overrides(&mut self) {
        if let Some(port) = env_parse::<u16>("SAP_GATEWAY_PORT") {
            tracing::info!("Environment override: SAP_GATEWAY_PORT={}", port);
            self.spec.network.port = port;
        }
        if let Some(ttl) = env_parse::<u64>("SAP_GATEWAY_SESSION_TTL") {
            tracing::info!("Environment override: SAP_GATEWAY_SESSION_TTL={}", ttl);
            self.spec.session.ttl_seconds = ttl;
        }
        if let Some(limit) = env_parse::<usize>("SAP_GATEWAY_MAX_SESSIONS_PER_USER") {
            tracing::info!("Environment override: SAP_GATEWAY_MAX_SESSIONS_PER_USER={}", limit);
            self.spec.session.max_sessions_per_user = limit;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Invalid apiVersion: '{}'. Must be '{}'", self.api_version, API_VERSION);
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let session = &self.spec.session;
        if session.ttl_seconds == 0 {
            anyhow::bail!("spec.session.ttl_seconds must be greater than zero");
        }
        if session.max_sessions_per_user == 0 {
            anyhow::bail!("spec.session.max_sessions_per_user must be at least 1");
        }
        if session.cleanup_interval_seconds == 0 {
            anyhow::bail!("spec.session.cleanup_interval_seconds must be greater than zero");
        }

        if let Some(idp) = &self.spec.identity_provider {
            for (field, value) in [
                ("authorization_endpoint", &idp.authorization_endpoint),
                ("token_endpoint", &idp.token_endpoint),
                ("client_id", &idp.client_id),
                ("redirect_uri", &idp.redirect_uri),
                ("issuer", &idp.issuer),
                ("verification_key", &idp.verification_key),
            ] {
                if value.trim().is_empty() {
                    anyhow::bail!("spec.identity_provider.{} cannot be empty", field);
                }
            }
            if idp.audiences.iter().all(|a| a.trim().is_empty()) {
                anyhow::bail!("spec.identity_provider.audiences must list at least one audience");
            }
            if idp.timeout_seconds == 0 {
                anyhow::bail!("spec.identity_provider.timeout_seconds must be greater than zero");
            }
        }

        let routing = &self.spec.routing;
        if !(0.0..=1.0).contains(&routing.tie_epsilon) {
            anyhow::bail!("spec.routing.tie_epsilon must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&routing.ambiguity_threshold) {
            anyhow::bail!("spec.routing.ambiguity_threshold must be within [0, 1]");
        }

        if self.spec.workflow.step_timeout_seconds == 0 {
            anyhow::bail!("spec.workflow.step_timeout_seconds must be greater than zero");
        }

        if let Some(service) = self.spec.sap.services.iter().find(|s| s.id.trim().is_empty()) {
            anyhow::bail!("spec.sap.services entry '{}' has an empty id", service.title);
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Invalid value for {}: '{}'. Ignoring.", name, raw);
            None
        }
    }
}
