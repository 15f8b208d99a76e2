//! HTTP adapter for a PostgREST + GoTrue backend.
//!
//! Handles the anon key / session bearer, token refresh on 401, error
//! translation, and all table and auth endpoints. Uses reqwest with JSON
//! serialization.

use crate::auth::{AuthBackend, AuthData, AuthEvent, AuthSession, AuthUser};
use crate::backend::{Backend, ChangeStream};
use crate::change_feed;
use crate::config::BackendConfig;
use crate::error::{CloudError, CloudResult, translate_postgrest_error};
use crate::query::{Filter, Row, Select, Table};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

const PREFER: &str = "Prefer";
const RETURN_REPRESENTATION: &str = "return=representation";
const MERGE_DUPLICATES: &str = "resolution=merge-duplicates,return=representation";
const RETURN_MINIMAL: &str = "return=minimal";
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
const AUTH_EVENT_CAPACITY: usize = 32;

/// Session shared across adapter clones.
struct SessionState {
    session: Option<AuthSession>,
    /// Bumped on every successful refresh so a waiter can tell that a
    /// concurrent refresh already rotated the tokens.
    refresh_generation: u64,
}

/// REST adapter for the hosted backend. Cheap to clone; clones share the
/// session.
#[derive(Clone)]
pub struct RestBackend {
    client: Client,
    config: BackendConfig,
    session: Arc<RwLock<SessionState>>,
    /// Serializes refresh exchanges; the server rotates refresh tokens.
    refresh_lock: Arc<tokio::sync::Mutex<()>>,
    auth_events: broadcast::Sender<AuthEvent>,
}

#[derive(Deserialize, Default)]
struct GoTrueErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

fn auth_error(status: StatusCode, body: &str) -> CloudError {
    let parsed: GoTrueErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .error_description
        .or(parsed.msg)
        .or(parsed.message)
        .or(parsed.error)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    CloudError::AuthFailed(message)
}

async fn check_status(resp: Response) -> CloudResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    debug!("backend responded {status}: {body}");
    Err(translate_postgrest_error(status.as_u16(), &body))
}

async fn read_rows(resp: Response) -> CloudResult<Vec<Row>> {
    let resp = check_status(resp).await?;
    let bytes = resp.bytes().await?;
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_slice(&bytes)?)
}

fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters.iter().map(Filter::to_param).collect()
}

impl RestBackend {
    pub fn new(config: BackendConfig) -> CloudResult<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        let (auth_events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);

        Ok(Self {
            client,
            config,
            session: Arc::new(RwLock::new(SessionState {
                session: None,
                refresh_generation: 0,
            })),
            refresh_lock: Arc::new(tokio::sync::Mutex::new(())),
            auth_events,
        })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Restores a previously persisted session.
    pub async fn set_session(&self, session: AuthSession) {
        self.session.write().await.session = Some(session);
    }

    /// Current session, for persistence.
    pub async fn session(&self) -> Option<AuthSession> {
        self.session.read().await.session.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.read().await.session.is_some()
    }

    async fn clear_session(&self) {
        let had_session = self.session.write().await.session.take().is_some();
        if had_session {
            let _ = self.auth_events.send(AuthEvent::SignedOut);
        }
    }

    async fn store_session(&self, session: AuthSession, event: AuthEvent) {
        self.session.write().await.session = Some(session);
        // No receivers is fine.
        let _ = self.auth_events.send(event);
    }

    /// Session access token, or the anon key when signed out.
    async fn bearer(&self) -> String {
        self.session
            .read()
            .await
            .session
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.config.anon_key.clone())
    }

    fn request(&self, method: Method, url: &str, token: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(token)
    }

    /// Sends the request built by `build`, retrying once with a refreshed
    /// token on 401 when a session exists.
    async fn send<F>(&self, build: F) -> CloudResult<Response>
    where
        F: Fn(&str) -> RequestBuilder + Send + Sync,
    {
        let token = self.bearer().await;
        let resp = build(&token).send().await?;

        if resp.status() == StatusCode::UNAUTHORIZED && self.is_authenticated().await {
            debug!("401 from backend, refreshing session");
            let new_token = self.refresh_session().await?;
            return Ok(build(&new_token).send().await?);
        }

        Ok(resp)
    }

    /// Exchanges the refresh token for a new session.
    pub async fn refresh_session(&self) -> CloudResult<String> {
        let pre_gen = self.session.read().await.refresh_generation;

        let _guard = self.refresh_lock.lock().await;

        // A concurrent refresh may have finished while we waited.
        let refresh_token = {
            let state = self.session.read().await;
            if state.refresh_generation > pre_gen {
                return state
                    .session
                    .as_ref()
                    .map(|s| s.access_token.clone())
                    .ok_or(CloudError::AuthRequired);
            }
            state
                .session
                .as_ref()
                .map(|s| s.refresh_token.clone())
                .ok_or(CloudError::AuthRequired)?
        };

        let resp = self
            .client
            .post(self.config.auth_url("token"))
            .query(&[("grant_type", "refresh_token")])
            .header("apikey", &self.config.anon_key)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            if status.is_client_error() {
                // Refresh token expired or revoked
                warn!("session refresh rejected ({status}), signing out");
                self.clear_session().await;
            }
            return Err(auth_error(status, &body));
        }

        let session: AuthSession = resp.json().await?;
        let access_token = session.access_token.clone();
        {
            let mut state = self.session.write().await;
            state.session = Some(session.clone());
            state.refresh_generation += 1;
        }
        let _ = self.auth_events.send(AuthEvent::TokenRefreshed(session));
        Ok(access_token)
    }

    async fn auth_post(&self, path: &str, grant: Option<&str>, body: &serde_json::Value) -> CloudResult<serde_json::Value> {
        let mut req = self
            .client
            .post(self.config.auth_url(path))
            .header("apikey", &self.config.anon_key)
            .json(body);
        if let Some(grant) = grant {
            req = req.query(&[("grant_type", grant)]);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(auth_error(status, &body));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl Backend for RestBackend {
    async fn select(&self, query: &Select) -> CloudResult<Vec<Row>> {
        let url = self.config.rest_url(query.table.name());
        let params = query.to_params();
        let resp = self
            .send(|token| self.request(Method::GET, &url, token).query(&params))
            .await?;
        read_rows(resp).await
    }

    async fn select_single(&self, query: &Select) -> CloudResult<Row> {
        let url = self.config.rest_url(query.table.name());
        let params = query.to_params();
        let resp = self
            .send(|token| {
                self.request(Method::GET, &url, token)
                    .query(&params)
                    .header(ACCEPT, HeaderValue::from_static(SINGLE_OBJECT))
            })
            .await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    async fn insert(&self, table: Table, rows: Vec<Row>) -> CloudResult<Vec<Row>> {
        let url = self.config.rest_url(table.name());
        let resp = self
            .send(|token| {
                self.request(Method::POST, &url, token)
                    .header(PREFER, RETURN_REPRESENTATION)
                    .json(&rows)
            })
            .await?;
        read_rows(resp).await
    }

    async fn upsert(
        &self,
        table: Table,
        rows: Vec<Row>,
        on_conflict: &[&str],
    ) -> CloudResult<Vec<Row>> {
        let url = self.config.rest_url(table.name());
        let conflict = on_conflict.join(",");
        let resp = self
            .send(|token| {
                self.request(Method::POST, &url, token)
                    .query(&[("on_conflict", conflict.as_str())])
                    .header(PREFER, MERGE_DUPLICATES)
                    .json(&rows)
            })
            .await?;
        read_rows(resp).await
    }

    async fn update(&self, table: Table, filters: &[Filter], patch: Row) -> CloudResult<Vec<Row>> {
        let url = self.config.rest_url(table.name());
        let params = filter_params(filters);
        let resp = self
            .send(|token| {
                self.request(Method::PATCH, &url, token)
                    .query(&params)
                    .header(PREFER, RETURN_REPRESENTATION)
                    .json(&patch)
            })
            .await?;
        read_rows(resp).await
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> CloudResult<()> {
        let url = self.config.rest_url(table.name());
        let params = filter_params(filters);
        let resp = self
            .send(|token| {
                self.request(Method::DELETE, &url, token)
                    .query(&params)
                    .header(PREFER, RETURN_MINIMAL)
            })
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn watch(&self, table: Table, filter: Filter) -> CloudResult<ChangeStream> {
        let interval = Duration::from_millis(self.config.realtime_poll_interval_ms);
        change_feed::open(Arc::new(self.clone()), table, filter, interval).await
    }
}

#[async_trait]
impl AuthBackend for RestBackend {
    async fn sign_up(&self, email: &str, password: &str) -> CloudResult<AuthData> {
        let value = self
            .auth_post(
                "signup",
                None,
                &serde_json::json!({ "email": email, "password": password }),
            )
            .await?;

        // With email confirmation on, only the user comes back.
        if value.get("access_token").is_some() {
            let session: AuthSession = serde_json::from_value(value)?;
            info!("signed up and signed in as {}", session.user.id);
            self.store_session(session.clone(), AuthEvent::SignedIn(session.clone()))
                .await;
            return Ok(AuthData {
                user: Some(session.user.clone()),
                session: Some(session),
            });
        }

        let user: AuthUser = serde_json::from_value(value)?;
        info!("signed up {}, confirmation pending", user.id);
        Ok(AuthData {
            user: Some(user),
            session: None,
        })
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> CloudResult<AuthSession> {
        let value = self
            .auth_post(
                "token",
                Some("password"),
                &serde_json::json!({ "email": email, "password": password }),
            )
            .await?;
        let session: AuthSession = serde_json::from_value(value)?;
        info!("signed in as {}", session.user.id);
        self.store_session(session.clone(), AuthEvent::SignedIn(session.clone()))
            .await;
        Ok(session)
    }

    async fn sign_out(&self) -> CloudResult<()> {
        let Some(session) = self.session().await else {
            return Ok(());
        };

        let resp = self
            .request(Method::POST, &self.config.auth_url("logout"), &session.access_token)
            .send()
            .await;

        // The local session goes regardless of what the server says.
        self.clear_session().await;

        let resp = resp?;
        let status = resp.status();
        if status.is_success() || status == StatusCode::UNAUTHORIZED || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(auth_error(status, &body))
    }

    async fn get_user(&self) -> CloudResult<Option<AuthUser>> {
        if !self.is_authenticated().await {
            return Ok(None);
        }
        let url = self.config.auth_url("user");
        let resp = self
            .send(|token| self.request(Method::GET, &url, token))
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(auth_error(status, &body));
        }
        Ok(Some(resp.json().await?))
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_events.subscribe()
    }
}
