//! # Tether Client
//!
//! Collection clients, reactive record stores, and session handling for a
//! hosted record backend.
//!
//! The layering, bottom up:
//!
//! - [`Backend`] — the trait every network operation goes through. The
//!   production implementation is [`HttpBackend`] (REST + server-sent
//!   events); tests inject in-memory doubles.
//! - [`BaseCollection`] / [`AuthCollection`] — typed CRUD, realtime
//!   subscriptions, and (for auth collections) the session operations, all
//!   converting through the model's codec.
//! - [`RecordStore`] — a per-collection cache kept consistent with the
//!   backend through delegated operations and live events, publishing every
//!   mutation to synchronous observers.
//! - [`AuthStore`] — a record store plus the derived authenticated
//!   identity.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tether_client::models::User;
//! use tether_client::{AuthCollection, AuthStore, HttpBackend};
//! use std::sync::Arc;
//!
//! # async fn example() -> tether_client::Result<()> {
//! let backend = Arc::new(
//!     HttpBackend::builder()
//!         .base_url("http://localhost:8090")
//!         .build()?,
//! );
//!
//! let users = AuthStore::new(AuthCollection::<User>::new(backend, User::COLLECTION));
//! users.auth_with_password("alice", "correct horse battery staple").await?;
//! assert!(users.is_authed());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod backend;
pub mod collection;
pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod observe;
pub mod store;

// Re-export main types at crate root
pub use auth::AuthStore;
pub use backend::{
    AuthMethods, AuthProviderInfo, AuthResponse, Backend, EventAction, EventHandler, ExternalAuth,
    ListPage, ListQuery, OAuth2Provider, RecordEvent, Session, SessionListener, Topic,
};
pub use collection::{
    hash_password, AuthCollection, AuthRecordResponse, BaseCollection, CollectionClient,
    PasswordChange, PasswordCreate, RecordChange, RemoveOptions,
};
pub use config::{Config, ConfigError};
pub use error::{Error, Result};
pub use http::{HttpBackend, HttpBackendBuilder};
pub use observe::{Observer, ObserverId, StoreEvent};
pub use store::RecordStore;

// The codec layer is part of the public surface.
pub use tether_codec as codec;
pub use tether_codec::{AuthModel, Model, Payload, RecordId};
