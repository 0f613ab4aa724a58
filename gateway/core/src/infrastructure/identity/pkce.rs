// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0

//! PKCE (RFC 7636) material and the login `state` nonce.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::Rng;
use sha2::{Digest, Sha256};

/// 32 random bytes, base64url without padding (43 characters).
fn random_token() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// `BASE64URL(SHA256(verifier))`
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Everything one authorization-code login needs on the gateway side.
#[derive(Clone)]
pub struct PkceChallenge {
    /// Kept server-side until the code exchange
    pub code_verifier: String,
    /// Sent with the authorization request
    pub code_challenge: String,
    /// CSRF nonce echoed back on the callback
    pub state: String,
}

impl PkceChallenge {
    pub fn generate() -> Self {
        let code_verifier = random_token();
        let code_challenge = code_challenge(&code_verifier);
        Self {
            code_verifier,
            code_challenge,
            state: random_token(),
        }
    }

    pub fn method(&self) -> &'static str {
        "S256"
    }
}

impl std::fmt::Debug for PkceChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceChallenge")
            .field("code_verifier", &"<redacted>")
            .field("code_challenge", &self.code_challenge)
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7636_appendix_b_vector() {
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_generated_values_are_distinct_and_sized() {
        let a = PkceChallenge::generate();
        let b = PkceChallenge::generate();

        assert_eq!(a.code_verifier.len(), 43);
        assert_eq!(a.state.len(), 43);
        assert_ne!(a.state, b.state);
        assert_ne!(a.code_verifier, a.state);
        assert_eq!(a.code_challenge, code_challenge(&a.code_verifier));
        assert!(!format!("{:?}", a).contains(&a.code_verifier));
    }
}
