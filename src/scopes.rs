// ABOUTME: Scope Registry mapping scope names to claims, default membership, and child expansion
// ABOUTME: Pure lookup logic; pre-registered with the standard OpenID Connect scopes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Scope Registry
//!
//! The catalog is mutated only while the server is being assembled. After that
//! it is shared read-only behind an `Arc`.

use std::collections::{BTreeMap, HashSet};

use gatekeeper_core::constants::scopes;

/// A named bundle of claims a client may request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeDefinition {
    /// Scope name as it appears in the `scope` parameter
    pub name: String,
    /// Human-readable description shown on the consent page
    pub description: String,
    /// Claims released when this scope is granted
    pub claims: Vec<String>,
    /// Included when a request carries no `scope`
    pub is_default: bool,
    /// Child scopes pulled in when this scope is requested
    pub includes: Vec<String>,
}

impl ScopeDefinition {
    /// Scope releasing `claims`
    #[must_use]
    pub fn new(name: &str, description: &str, claims: &[&str]) -> Self {
        Self {
            name: name.to_owned(),
            description: description.to_owned(),
            claims: claims.iter().map(|c| (*c).to_owned()).collect(),
            is_default: false,
            includes: Vec::new(),
        }
    }

    /// Mark as a default scope
    #[must_use]
    pub const fn default_scope(mut self) -> Self {
        self.is_default = true;
        self
    }

    /// Declare child scopes
    #[must_use]
    pub fn including(mut self, children: &[&str]) -> Self {
        self.includes = children.iter().map(|c| (*c).to_owned()).collect();
        self
    }
}

/// Catalog of known scopes
#[derive(Debug, Clone, Default)]
pub struct ScopeRegistry {
    scopes: BTreeMap<String, ScopeDefinition>,
}

impl ScopeRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `openid`, `profile`, `email`, `phone`, `address`, `offline_access`
    #[must_use]
    pub fn with_standard_scopes() -> Self {
        let mut registry = Self::new();
        registry.register(
            ScopeDefinition::new(scopes::OPENID, "Sign you in", &["sub"]).default_scope(),
        );
        registry.register(ScopeDefinition::new(
            scopes::PROFILE,
            "Your name and profile picture",
            &["name", "given_name", "family_name", "picture", "updated_at"],
        ));
        registry.register(ScopeDefinition::new(
            scopes::EMAIL,
            "Your email address",
            &["email", "email_verified"],
        ));
        registry.register(ScopeDefinition::new(
            scopes::PHONE,
            "Your phone number",
            &["phone_number", "phone_number_verified"],
        ));
        registry.register(ScopeDefinition::new(
            scopes::ADDRESS,
            "Your postal address",
            &["address"],
        ));
        registry.register(ScopeDefinition::new(
            scopes::OFFLINE_ACCESS,
            "Stay connected when you are not using the application",
            &[],
        ));
        registry
    }

    /// Add or replace a scope definition
    pub fn register(&mut self, scope: ScopeDefinition) {
        self.scopes.insert(scope.name.clone(), scope);
    }

    /// Look up a scope by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ScopeDefinition> {
        self.scopes.get(name)
    }

    /// Registered names in sorted order
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.scopes.keys().cloned().collect()
    }

    /// Requested names that are not registered
    #[must_use]
    pub fn unknown_scopes<S: AsRef<str>>(&self, requested: &[S]) -> Vec<String> {
        requested
            .iter()
            .map(AsRef::as_ref)
            .filter(|name| !self.scopes.contains_key(*name))
            .map(str::to_owned)
            .collect()
    }

    /// Requested scopes followed by their transitive children, without duplicates
    #[must_use]
    pub fn expand_scopes<S: AsRef<str>>(&self, requested: &[S]) -> Vec<String> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut expanded = Vec::new();
        let mut pending: Vec<String> = requested
            .iter()
            .rev()
            .map(|s| s.as_ref().to_owned())
            .collect();

        while let Some(name) = pending.pop() {
            if !visited.insert(name.clone()) {
                continue;
            }
            if let Some(definition) = self.scopes.get(&name) {
                pending.extend(definition.includes.iter().rev().cloned());
            }
            expanded.push(name);
        }
        expanded
    }

    /// Claims released by the (expanded) scopes, deduplicated, in first-seen order
    #[must_use]
    pub fn claims_for_scopes<S: AsRef<str>>(&self, requested: &[S]) -> Vec<String> {
        let mut seen = HashSet::new();
        self.expand_scopes(requested)
            .iter()
            .filter_map(|name| self.scopes.get(name))
            .flat_map(|definition| definition.claims.iter())
            .filter(|claim| seen.insert((*claim).clone()))
            .cloned()
            .collect()
    }

    /// Names of scopes marked default
    #[must_use]
    pub fn default_scopes(&self) -> Vec<String> {
        self.scopes
            .values()
            .filter(|s| s.is_default)
            .map(|s| s.name.clone())
            .collect()
    }

    /// Every claim any scope can release
    #[must_use]
    pub fn all_claims(&self) -> Vec<String> {
        let names = self.names();
        self.claims_for_scopes(&names)
    }

    /// Scopes that only make sense with a user subject
    #[must_use]
    pub fn is_identity_scope(&self, name: &str) -> bool {
        name == scopes::OPENID
            || name == scopes::OFFLINE_ACCESS
            || self
                .scopes
                .get(name)
                .is_some_and(|definition| !definition.claims.is_empty())
    }
}

/// Split a space-delimited `scope` parameter, dropping duplicates
#[must_use]
pub fn parse_scope(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.split_whitespace()
        .filter(|s| seen.insert(*s))
        .map(str::to_owned)
        .collect()
}

/// Join scopes into a `scope` parameter value
#[must_use]
pub fn join_scopes<S: AsRef<str>>(scopes: &[S]) -> String {
    scopes
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(" ")
}

/// True when every element of `requested` appears in `granted`
#[must_use]
pub fn is_subset<A: AsRef<str>, B: AsRef<str>>(requested: &[A], granted: &[B]) -> bool {
    requested
        .iter()
        .all(|r| granted.iter().any(|g| g.as_ref() == r.as_ref()))
}
