//! Bearer-token → principal resolution.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::{AuthError, Principal, Role};

/// Resolves an opaque bearer token into a principal.
///
/// Implementations may perform IO (session tables, identity providers).
#[async_trait]
pub trait SessionResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Fixed token table, configured at boot.
///
/// Intended for development, tests, and service-to-service tokens.
#[derive(Debug, Default, Clone)]
pub struct StaticTokenResolver {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.tokens.insert(token.into(), principal);
        self
    }

    /// Parse `token=principal:role|role,token2=principal2`.
    ///
    /// Empty input yields an empty table; roles are optional.
    pub fn parse(spec: &str) -> Result<Self, AuthError> {
        let mut resolver = Self::new();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (token, rest) = entry
                .split_once('=')
                .ok_or_else(|| AuthError::MalformedEntry(entry.to_string()))?;
            let (principal, roles) = match rest.split_once(':') {
                Some((p, r)) => (p, r),
                None => (rest, ""),
            };
            let token = token.trim();
            let principal = principal.trim();
            if token.is_empty() || principal.is_empty() {
                return Err(AuthError::MalformedEntry(entry.to_string()));
            }
            let roles = roles
                .split('|')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(|r| Role::new(r.to_string()))
                .collect();
            resolver
                .tokens
                .insert(token.to_string(), Principal::new(principal, roles));
        }
        Ok(resolver)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl SessionResolver for StaticTokenResolver {
    async fn resolve(&self, token: &str) -> Result<Principal, AuthError> {
        self.tokens.get(token).cloned().ok_or(AuthError::InvalidToken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn parses_tokens_with_and_without_roles() {
        let resolver = StaticTokenResolver::parse("abc=alice:admin|ops, def=bob").unwrap();
        assert_eq!(resolver.len(), 2);

        let alice = resolver.resolve("abc").await.unwrap();
        assert_eq!(alice.id.as_str(), "alice");
        assert!(alice.has_role("ops"));
        assert!(alice.has_role("anything"), "admin implies every role");

        let bob = resolver.resolve("def").await.unwrap();
        assert!(bob.roles.is_empty());
        assert!(!bob.has_role("ops"));
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let resolver = StaticTokenResolver::new().with_token("t", Principal::new("p", vec![]));
        assert_eq!(resolver.resolve("nope").await, Err(AuthError::InvalidToken));
    }

    #[test]
    fn malformed_entries_are_errors() {
        assert!(matches!(
            StaticTokenResolver::parse("justatoken"),
            Err(AuthError::MalformedEntry(_))
        ));
        assert!(matches!(
            StaticTokenResolver::parse("=alice"),
            Err(AuthError::MalformedEntry(_))
        ));
        assert!(StaticTokenResolver::parse("").unwrap().is_empty());
    }
}
