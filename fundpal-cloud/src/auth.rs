//! Authentication: session types, the [`AuthBackend`] seam, and the
//! [`AuthService`] facade the application talks to.

use crate::error::{CloudError, CloudResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Token pair returned by a password or refresh-token grant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

/// Outcome of a sign-up. `session` is absent while the address awaits
/// confirmation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AuthData {
    pub user: Option<AuthUser>,
    pub session: Option<AuthSession>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn(AuthSession),
    SignedOut,
    TokenRefreshed(AuthSession),
}

impl AuthEvent {
    /// Session carried by the event, if any.
    pub fn session(&self) -> Option<&AuthSession> {
        match self {
            AuthEvent::SignedIn(s) | AuthEvent::TokenRefreshed(s) => Some(s),
            AuthEvent::SignedOut => None,
        }
    }
}

/// Identity provider operations.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> CloudResult<AuthData>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> CloudResult<AuthSession>;

    async fn sign_out(&self) -> CloudResult<()>;

    /// The signed-in user, or `None` without a session.
    async fn get_user(&self) -> CloudResult<Option<AuthUser>>;

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Handle for an auth state listener. Dropping it stops delivery.
pub struct AuthSubscription {
    task: JoinHandle<()>,
}

impl AuthSubscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for AuthSubscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Thin facade over an [`AuthBackend`].
#[derive(Clone)]
pub struct AuthService {
    backend: Arc<dyn AuthBackend>,
}

impl AuthService {
    pub fn new(backend: Arc<dyn AuthBackend>) -> Self {
        Self { backend }
    }

    pub async fn sign_up(&self, email: &str, password: &str) -> CloudResult<AuthData> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(CloudError::AuthFailed("email and password are required".into()));
        }
        self.backend.sign_up(email.trim(), password).await
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> CloudResult<AuthSession> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(CloudError::AuthFailed("email and password are required".into()));
        }
        self.backend.sign_in_with_password(email.trim(), password).await
    }

    pub async fn sign_out(&self) -> CloudResult<()> {
        self.backend.sign_out().await
    }

    /// The signed-in user. Lookup failures read as signed out.
    pub async fn current_user(&self) -> Option<AuthUser> {
        match self.backend.get_user().await {
            Ok(user) => user,
            Err(e) => {
                warn!("failed to load current user: {e}");
                None
            }
        }
    }

    /// Invokes `callback` for every subsequent auth state change.
    pub fn on_auth_state_change<F>(&self, mut callback: F) -> AuthSubscription
    where
        F: FnMut(AuthEvent) + Send + 'static,
    {
        let mut rx = self.backend.auth_events();
        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => callback(event),
                    Err(RecvError::Lagged(n)) => {
                        debug!("auth listener lagged, skipped {n} events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        AuthSubscription { task }
    }
}
