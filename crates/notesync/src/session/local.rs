//! In-process identity provider.

use regex::Regex;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{AuthError, AuthProvider, AuthResult, AuthState, Session, SessionWatcher, SignInRequest};
use crate::config::AuthConfig;
use crate::error::{Error, Result};
use crate::note::OwnerId;

/// Hex digits kept from the account digest.
const UID_LEN: usize = 28;

/// An identity provider that runs inside the client process.
///
/// Accounts are accepted when they match the configured pattern. Each account
/// maps to a stable, opaque session identifier derived from the provider name
/// and the normalized account, so the same account always owns the same
/// notes.
///
/// The provider starts out [`AuthState::Pending`] and stays there until
/// [`resolve`](Self::resolve) reports whether a session was restored.
#[derive(Debug)]
pub struct LocalAuthProvider {
    name: String,
    account_pattern: Regex,
    state: watch::Sender<AuthState>,
}

impl LocalAuthProvider {
    /// Create a provider with the given name and account pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern is not a valid regex.
    pub fn new(name: impl Into<String>, account_pattern: &str) -> Result<Self> {
        let account_pattern = Regex::new(account_pattern).map_err(|e| Error::ConfigValidation {
            message: format!("invalid regex pattern: {e}"),
        })?;
        let (state, _) = watch::channel(AuthState::Pending);
        Ok(Self {
            name: name.into(),
            account_pattern,
            state,
        })
    }

    /// Create a provider from the `[auth]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured pattern is not a valid regex.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        Self::new(config.provider_name.clone(), &config.account_pattern)
    }

    /// Settle the initial state: a restored session, or signed out.
    ///
    /// Has no effect once the state is no longer pending.
    pub fn resolve(&self, restored: Option<Session>) {
        let resolved = self.state.send_if_modified(|state| {
            if !state.is_pending() {
                return false;
            }
            *state = restored.map_or(AuthState::SignedOut, AuthState::SignedIn);
            true
        });
        if resolved {
            let state = self.state.borrow().clone();
            debug!(provider = %self.name, state = %state, "Initial auth state resolved");
        }
    }

    /// The session an account signs in as.
    #[must_use]
    pub fn session_for(&self, account: &str) -> Session {
        let account = normalize_account(account);
        let digest = blake3::hash(format!("{}:{account}", self.name).as_bytes());
        let uid = digest.to_hex().as_str()[..UID_LEN].to_string();
        Session::new(OwnerId::new(uid), Some(account))
    }
}

fn normalize_account(account: &str) -> String {
    account.trim().to_lowercase()
}

#[async_trait::async_trait]
impl AuthProvider for LocalAuthProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn sign_in(&self, request: &SignInRequest) -> AuthResult<Session> {
        let account = normalize_account(&request.account);
        if account.is_empty() {
            debug!(provider = %self.name, "Sign-in dismissed");
            return Err(AuthError::Cancelled);
        }
        if !self.account_pattern.is_match(&account) {
            warn!(provider = %self.name, account = %account, "Sign-in rejected by account policy");
            return Err(AuthError::Rejected {
                reason: format!("account '{account}' is not allowed"),
            });
        }

        let session = self.session_for(&account);
        let changed = self.state.send_if_modified(|state| {
            if state.uid() == Some(&session.uid) {
                return false;
            }
            *state = AuthState::SignedIn(session.clone());
            true
        });
        if changed {
            info!(provider = %self.name, account = %account, "Signed in");
        }
        Ok(session)
    }

    async fn sign_out(&self) -> AuthResult<()> {
        let changed = self.state.send_if_modified(|state| {
            if *state == AuthState::SignedOut {
                return false;
            }
            *state = AuthState::SignedOut;
            true
        });
        if changed {
            info!(provider = %self.name, "Signed out");
        }
        Ok(())
    }

    fn watch(&self) -> SessionWatcher {
        SessionWatcher::new(self.state.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> LocalAuthProvider {
        LocalAuthProvider::from_config(&AuthConfig::default()).unwrap()
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let err = LocalAuthProvider::new("local", "[broken").unwrap_err();
        assert!(err.to_string().contains("invalid regex"));
    }

    #[test]
    fn test_session_for_is_stable_and_opaque() {
        let p = provider();
        let a = p.session_for("alice");
        let b = p.session_for("  Alice ");

        assert_eq!(a, b);
        assert_eq!(a.uid.as_str().len(), UID_LEN);
        assert!(!a.uid.as_str().contains("alice"));
        assert_eq!(a.display_label.as_deref(), Some("alice"));
        assert_ne!(a.uid, p.session_for("bob").uid);
    }

    #[test]
    fn test_session_for_depends_on_provider_name() {
        let other = LocalAuthProvider::new("other", ".*").unwrap();
        assert_ne!(provider().session_for("alice").uid, other.session_for("alice").uid);
    }

    #[tokio::test]
    async fn test_starts_pending_until_resolved() {
        let p = provider();
        let mut watcher = p.watch();
        assert_eq!(watcher.next().await, Some(AuthState::Pending));

        p.resolve(None);
        assert_eq!(watcher.next().await, Some(AuthState::SignedOut));

        // A second resolve is ignored
        p.resolve(Some(p.session_for("alice")));
        assert_eq!(watcher.current(), AuthState::SignedOut);
    }

    #[tokio::test]
    async fn test_resolve_with_restored_session() {
        let p = provider();
        let restored = p.session_for("alice");
        p.resolve(Some(restored.clone()));

        assert_eq!(p.watch().current(), AuthState::SignedIn(restored));
    }

    #[tokio::test]
    async fn test_sign_in_and_out_edges() {
        let p = provider();
        p.resolve(None);
        let mut watcher = p.watch();
        assert_eq!(watcher.next().await, Some(AuthState::SignedOut));

        let session = p.sign_in(&SignInRequest::new("alice")).await.unwrap();
        assert_eq!(watcher.next().await, Some(AuthState::SignedIn(session)));

        p.sign_out().await.unwrap();
        assert_eq!(watcher.next().await, Some(AuthState::SignedOut));
    }

    #[tokio::test]
    async fn test_repeated_sign_in_is_not_an_edge() {
        let p = provider();
        p.resolve(None);
        let mut watcher = p.watch();
        watcher.next().await;

        p.sign_in(&SignInRequest::new("alice")).await.unwrap();
        assert!(watcher.try_next().is_some());

        p.sign_in(&SignInRequest::new("ALICE")).await.unwrap();
        assert!(watcher.try_next().is_none());

        p.sign_out().await.unwrap();
        p.sign_out().await.unwrap();
        assert_eq!(watcher.try_next(), Some(AuthState::SignedOut));
        assert!(watcher.try_next().is_none());
    }

    #[tokio::test]
    async fn test_empty_account_is_cancelled() {
        let p = provider();
        p.resolve(None);
        let err = p.sign_in(&SignInRequest::new("   ")).await.unwrap_err();
        assert!(matches!(err, AuthError::Cancelled));
        assert_eq!(p.watch().current(), AuthState::SignedOut);
    }

    #[tokio::test]
    async fn test_account_outside_pattern_is_rejected() {
        let p = LocalAuthProvider::new("local", r"^[a-z]+@example\.com$").unwrap();
        p.resolve(None);

        let err = p.sign_in(&SignInRequest::new("mallory@evil.test")).await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected { .. }));
        assert_eq!(p.watch().current(), AuthState::SignedOut);

        assert!(p.sign_in(&SignInRequest::new("alice@example.com")).await.is_ok());
    }

    #[test]
    fn test_name() {
        assert_eq!(provider().name(), "local");
    }
}
