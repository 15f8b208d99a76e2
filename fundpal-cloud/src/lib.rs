//! Remote persistence for fundpal.
//!
//! Provides:
//! - A `Backend` seam with a PostgREST adapter (`RestBackend`) and an
//!   in-process one (`MemoryBackend`)
//! - The record mapper between UI shapes and storage rows
//! - Fund, group and settings services
//! - Realtime change subscriptions
//! - Auth (sign-up, sign-in, sign-out, current user, state listener)
//! - The one-time local-to-remote migration

pub mod auth;
pub mod backend;
mod change_feed;
pub mod config;
pub mod error;
pub mod funds;
pub mod groups;
pub mod mapper;
pub mod memory_backend;
pub mod migration;
pub mod query;
pub mod realtime;
pub mod rest_client;
pub mod settings;

pub use auth::{AuthBackend, AuthData, AuthEvent, AuthService, AuthSession, AuthSubscription, AuthUser};
pub use backend::{Backend, ChangeEvent, ChangeKind, ChangeStream};
pub use config::BackendConfig;
pub use error::{CloudError, CloudResult, translate_postgrest_error};
pub use funds::FundService;
pub use groups::GroupService;
pub use memory_backend::MemoryBackend;
pub use migration::MigrationService;
pub use query::{Filter, Row, Select, Table};
pub use realtime::{RealtimeService, Subscription};
pub use rest_client::RestBackend;
pub use settings::SettingsService;
