//! # Auth Collaborators
//!
//! The SDK owns its auth provider and auth manager; the queue only borrows them. Both are
//! reached through an [`AuthHandle`], a non-owning handle that stops working once the
//! owner drops the collaborator. Using a dead handle is an
//! [`IllegalStateError`](crate::error::QueueError::IllegalStateError), never a silent no-op.

use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Weak};

use crate::error::{QueueError, Result};
use crate::models::Auth;

/// Source of the identity and token requests are made with
pub trait AuthProvider: Send + Sync {
    fn auth(&self) -> Auth;
}

/// What the auth manager wants done after a rejected token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRefreshDecision {
    /// A new token is (or will shortly be) available; retry the request
    RetryAfterRefresh,
    /// Stop; the request fails without retry
    GiveUp,
}

/// Context handed to the auth manager for a 401/403 response
#[derive(Debug, Clone, PartialEq)]
pub struct AuthFailure {
    pub auth: Auth,
    pub status: u16,
    pub reason: Option<String>,
    pub failed_token: Option<String>,
}

/// Token refresh capability
#[async_trait]
pub trait AuthManager: Send + Sync {
    async fn handle_auth_failure(&self, failure: &AuthFailure) -> AuthRefreshDecision;
}

/// Non-owning handle to a collaborator whose lifetime belongs to the SDK.
///
/// Valid only while the owning `Arc` is alive.
pub struct AuthHandle<T: ?Sized> {
    inner: Weak<T>,
    name: &'static str,
}

impl<T: ?Sized> AuthHandle<T> {
    pub fn new(owner: &Arc<T>, name: &'static str) -> Self {
        Self {
            inner: Arc::downgrade(owner),
            name,
        }
    }

    pub fn upgrade(&self) -> Result<Arc<T>> {
        self.inner.upgrade().ok_or_else(|| {
            QueueError::illegal_state(format!("{} was released by its owner", self.name))
        })
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl<T: ?Sized> Clone for AuthHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            name: self.name,
        }
    }
}

impl<T: ?Sized> fmt::Debug for AuthHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthHandle")
            .field("name", &self.name)
            .field("alive", &self.is_alive())
            .finish()
    }
}

pub type AuthProviderHandle = AuthHandle<dyn AuthProvider>;
pub type AuthManagerHandle = AuthHandle<dyn AuthManager>;

/// Fixed identity, for tests and for hosts with a static user
#[derive(Debug, Clone, Default)]
pub struct StaticAuthProvider {
    auth: Auth,
}

impl StaticAuthProvider {
    pub fn new(auth: Auth) -> Self {
        Self { auth }
    }
}

impl AuthProvider for StaticAuthProvider {
    fn auth(&self) -> Auth {
        self.auth.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_follows_owner_lifetime() {
        let provider: Arc<dyn AuthProvider> =
            Arc::new(StaticAuthProvider::new(Auth::with_email("user@example.com")));
        let handle = AuthHandle::new(&provider, "auth provider");

        assert!(handle.is_alive());
        assert_eq!(
            handle.upgrade().unwrap().auth().email.as_deref(),
            Some("user@example.com")
        );

        drop(provider);
        assert!(!handle.is_alive());
        let Err(error) = handle.upgrade() else {
            panic!("expected released handle");
        };
        assert!(matches!(error, QueueError::IllegalStateError(_)));
        assert_eq!(error.to_string(), "Illegal state: auth provider was released by its owner");
    }
}
