// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Identity provider integration: PKCE material, the OAuth2 code exchange
//! client and JWT verification of the tokens it returns.

pub mod oauth_client;
pub mod pkce;
pub mod token_verifier;

pub use oauth_client::HttpIdentityProvider;
pub use pkce::PkceChallenge;
pub use token_verifier::JwtTokenValidator;
