// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::domain::authentication::{IdentityProvider, ProviderError, TokenSet};
use crate::domain::gateway_config::IdentityProviderConfig;

/// OAuth 2.0 error body (RFC 6749 §5.2)
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Authorization-code + PKCE client for an OAuth2 authorization server
/// (SAP XSUAA / IAS or any compliant provider).
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    authorization_endpoint: Url,
    token_endpoint: Url,
    client_id: String,
    client_secret: Option<String>,
    redirect_uri: String,
    requested_scopes: Vec<String>,
}

impl HttpIdentityProvider {
    pub fn new(
        authorization_endpoint: &str,
        token_endpoint: &str,
        client_id: &str,
        client_secret: Option<String>,
        redirect_uri: &str,
        requested_scopes: Vec<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            authorization_endpoint: Url::parse(authorization_endpoint)?,
            token_endpoint: Url::parse(token_endpoint)?,
            client_id: client_id.to_string(),
            client_secret,
            redirect_uri: redirect_uri.to_string(),
            requested_scopes,
        })
    }

    pub fn from_config(config: &IdentityProviderConfig) -> Result<Self> {
        Self::new(
            &config.authorization_endpoint,
            &config.token_endpoint,
            &config.client_id,
            config.resolved_client_secret()?,
            &config.redirect_uri,
            config.requested_scopes.clone(),
            config.timeout(),
        )
    }
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Unreachable("request timed out".to_string())
    } else {
        ProviderError::Unreachable(err.to_string())
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    fn authorization_url(&self, state: &str, code_challenge: &str) -> Result<String, ProviderError> {
        let mut url = self.authorization_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("state", state)
                .append_pair("code_challenge", code_challenge)
                .append_pair("code_challenge_method", "S256");
            if !self.requested_scopes.is_empty() {
                query.append_pair("scope", &self.requested_scopes.join(" "));
            }
        }
        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str, code_verifier: &str) -> Result<TokenSet, ProviderError> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("client_id", self.client_id.as_str()),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("code_verifier", code_verifier),
        ];
        if let Some(secret) = &self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        debug!(endpoint = %self.token_endpoint, "Exchanging authorization code");
        let response = self
            .client
            .post(self.token_endpoint.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<OAuthErrorBody>(&body) {
                Ok(parsed) => match parsed.error_description {
                    Some(description) => format!("{}: {}", parsed.error, description),
                    None => parsed.error,
                },
                Err(_) => body.chars().take(200).collect(),
            };
            warn!(status = status.as_u16(), message = %message, "Token endpoint rejected code exchange");
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<TokenSet>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}
