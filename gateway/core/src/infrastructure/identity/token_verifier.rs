// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::authentication::{TokenValidation, TokenValidator, ValidationFailure};
use crate::domain::gateway_config::{IdentityProviderConfig, SigningAlgorithm};
use crate::domain::scope::ScopeMapper;
use crate::domain::session::UserInfo;

/// `aud` is either a single string or an array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AudienceClaim {
    Single(String),
    Multiple(Vec<String>),
}

/// `scope` is an array (XSUAA) or a space-delimited string (RFC 8693).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ScopeClaim {
    List(Vec<String>),
    Delimited(String),
}

impl ScopeClaim {
    pub fn values(&self) -> Vec<String> {
        match self {
            Self::List(values) => values.clone(),
            Self::Delimited(raw) => raw.split_whitespace().map(str::to_string).collect(),
        }
    }
}

/// Claims read from a provider access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderClaims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<AudienceClaim>,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<ScopeClaim>,
}

/// Verifies provider-issued JWTs (signature, `exp`, `iss`, `aud`) and maps
/// their scopes to internal names.
pub struct JwtTokenValidator {
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    expected_issuer: String,
    expected_audiences: Vec<String>,
    scope_mapper: ScopeMapper,
}

impl JwtTokenValidator {
    pub fn new(
        algorithm: SigningAlgorithm,
        key: &str,
        expected_issuer: &str,
        expected_audiences: &[String],
        scope_mapper: ScopeMapper,
    ) -> Result<Self> {
        if expected_issuer.is_empty() {
            return Err(anyhow::anyhow!("expected_issuer must not be empty"));
        }
        if expected_audiences.is_empty() {
            return Err(anyhow::anyhow!("expected_audiences must not be empty"));
        }
        let (decoding_key, algorithm) = match algorithm {
            SigningAlgorithm::RS256 => (DecodingKey::from_rsa_pem(key.as_bytes())?, Algorithm::RS256),
            SigningAlgorithm::HS256 => (DecodingKey::from_secret(key.as_bytes()), Algorithm::HS256),
        };
        Ok(Self {
            decoding_key,
            algorithm,
            expected_issuer: expected_issuer.to_string(),
            expected_audiences: expected_audiences.to_vec(),
            scope_mapper,
        })
    }

    pub fn from_config(config: &IdentityProviderConfig) -> Result<Self> {
        let key = config.resolved_verification_key()?;
        Self::new(
            config.algorithm,
            &key,
            &config.issuer,
            &config.audiences,
            ScopeMapper::new(config.scope_prefix.clone(), config.scope_mappings.clone()),
        )
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(self.algorithm);
        validation.set_required_spec_claims(&["exp", "iss", "aud"]);
        validation.set_issuer(&[&self.expected_issuer]);
        validation.set_audience(&self.expected_audiences.iter().map(String::as_str).collect::<Vec<_>>());
        validation
    }
}

/// Expected rejections become [`ValidationFailure`]s; key and crypto-backend
/// problems stay errors.
fn classify(kind: &ErrorKind) -> Option<ValidationFailure> {
    match kind {
        ErrorKind::ExpiredSignature => Some(ValidationFailure::Expired),
        ErrorKind::InvalidIssuer => Some(ValidationFailure::WrongIssuer),
        ErrorKind::InvalidAudience => Some(ValidationFailure::WrongAudience),
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => Some(ValidationFailure::InvalidSignature),
        ErrorKind::InvalidToken
        | ErrorKind::ImmatureSignature
        | ErrorKind::MissingRequiredClaim(_)
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => Some(ValidationFailure::Malformed),
        _ => None,
    }
}

#[async_trait]
impl TokenValidator for JwtTokenValidator {
    async fn validate(&self, token: &str) -> Result<TokenValidation> {
        let data = match decode::<ProviderClaims>(token, &self.decoding_key, &self.validation()) {
            Ok(data) => data,
            Err(err) => {
                return match classify(err.kind()) {
                    Some(failure) => {
                        debug!(reason = %failure, "Provider token rejected");
                        Ok(TokenValidation::failure(failure))
                    }
                    None => Err(anyhow::anyhow!("token verification fault: {}", err)),
                };
            }
        };
        let claims = data.claims;

        let provider_scopes = claims.scope.as_ref().map(ScopeClaim::values).unwrap_or_default();
        let scopes = self.scope_mapper.map(&provider_scopes);
        if scopes.is_empty() {
            debug!(sub = %claims.sub, "Provider token carries no gateway scopes");
            return Ok(TokenValidation::failure(ValidationFailure::NoMappedScopes));
        }

        let Some(expires_at) = DateTime::<Utc>::from_timestamp(claims.exp, 0) else {
            return Ok(TokenValidation::failure(ValidationFailure::Malformed));
        };

        let user_info = UserInfo {
            id: claims.user_id.clone().unwrap_or_else(|| claims.sub.clone()),
            email: claims.email.clone(),
            name: claims.name.clone().or_else(|| claims.user_name.clone()),
            groups: claims.groups.clone(),
            scopes,
        };
        Ok(TokenValidation::success(user_info, expires_at))
    }
}
