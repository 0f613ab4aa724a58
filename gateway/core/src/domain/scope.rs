// Copyright (c) 2026 SAP Gateway Contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Scope Value Object
//!
//! A [`Scope`] is a named permission grant (`read`, `write`, `ui.forms`, ...).
//! Sessions carry the internal scope names produced by [`ScopeMapper`] from the
//! provider-asserted scopes in the identity token; tools declare the scope they
//! need.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Internal permission name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(String);

impl Scope {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Scope {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Required scopes absent from `granted`, in the order they were required.
///
/// Duplicates in `required` are reported once.
pub fn missing_scopes(granted: &[Scope], required: &[Scope]) -> Vec<Scope> {
    let mut missing: Vec<Scope> = Vec::new();
    for scope in required {
        if !granted.contains(scope) && !missing.contains(scope) {
            missing.push(scope.clone());
        }
    }
    missing
}

/// Translates provider-asserted scope strings into internal [`Scope`] names.
///
/// Resolution order per provider scope:
/// 1. an explicit entry in `mappings`
/// 2. `<prefix>.<name>` is stripped to `<name>` when a prefix is configured
/// 3. without a prefix the provider scope is taken verbatim
///
/// Scopes that belong to another application (prefix configured, not matching)
/// are dropped.
#[derive(Debug, Clone, Default)]
pub struct ScopeMapper {
    prefix: Option<String>,
    mappings: HashMap<String, String>,
}

impl ScopeMapper {
    pub fn new(prefix: Option<String>, mappings: HashMap<String, String>) -> Self {
        Self { prefix, mappings }
    }

    pub fn map<S: AsRef<str>>(&self, provider_scopes: &[S]) -> Vec<Scope> {
        let mut mapped: Vec<Scope> = Vec::new();
        for raw in provider_scopes {
            let raw = raw.as_ref().trim();
            if raw.is_empty() {
                continue;
            }
            let internal = if let Some(target) = self.mappings.get(raw) {
                Some(target.clone())
            } else {
                match &self.prefix {
                    Some(prefix) => raw
                        .strip_prefix(prefix.as_str())
                        .and_then(|rest| rest.strip_prefix('.'))
                        .filter(|rest| !rest.is_empty())
                        .map(str::to_string),
                    None => Some(raw.to_string()),
                }
            };
            if let Some(name) = internal {
                let scope = Scope::new(name);
                if !mapped.contains(&scope) {
                    mapped.push(scope);
                }
            }
        }
        mapped
    }
}
