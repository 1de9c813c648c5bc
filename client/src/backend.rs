//! The backend interface consumed by collection clients.
//!
//! Everything network-facing goes through the [`Backend`] trait: CRUD on
//! collections, the realtime subscription channel, and the session/auth
//! subsystem. [`HttpBackend`](crate::http::HttpBackend) is the production
//! implementation; tests inject in-memory doubles.
//!
//! All messages are JSON-encoded and use the backend's camelCase field
//! names.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tether_codec::{Payload, RecordId};

/// Subscription target: one record or the whole collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Topic {
    /// Every record in the collection.
    All,
    /// A single record.
    Record(RecordId),
}

impl Topic {
    /// The wire form of the topic: `*` or the record id.
    pub fn as_wire(&self) -> &str {
        match self {
            Topic::All => "*",
            Topic::Record(id) => id.as_str(),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl From<RecordId> for Topic {
    fn from(id: RecordId) -> Self {
        Topic::Record(id)
    }
}

/// Action attached to a live record event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Create,
    Update,
    Delete,
}

/// A live change event as delivered by the backend, record still in wire
/// shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordEvent {
    pub action: EventAction,
    pub record: Payload,
}

/// Callback invoked for every event on a subscribed topic.
pub type EventHandler = Arc<dyn Fn(RecordEvent) + Send + Sync>;

/// Query options for list reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub filter: Option<String>,
    pub sort: Option<String>,
    pub expand: Option<String>,
}

impl ListQuery {
    /// Restrict results with a backend filter expression.
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Order results by the given sort expression.
    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// Expand the given relation fields.
    pub fn expand(mut self, expand: impl Into<String>) -> Self {
        self.expand = Some(expand.into());
        self
    }
}

/// One page of list results.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPage<T> {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
    pub items: Vec<T>,
}

impl<T> ListPage<T> {
    /// Convert every item, keeping the paging envelope.
    pub fn try_map<U, E>(
        self,
        mut convert: impl FnMut(&T) -> std::result::Result<U, E>,
    ) -> std::result::Result<ListPage<U>, E> {
        let mut items = Vec::with_capacity(self.items.len());
        for item in &self.items {
            items.push(convert(item)?);
        }
        Ok(ListPage {
            page: self.page,
            per_page: self.per_page,
            total_items: self.total_items,
            total_pages: self.total_pages,
            items,
        })
    }
}

/// Snapshot of the backend session state.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// The raw session token, if any.
    pub token: Option<String>,
    /// The wire payload of the session subject, if any.
    pub subject: Option<Payload>,
    /// Whether the backend considers the token currently valid.
    pub valid: bool,
}

/// Callback invoked on every session change.
pub type SessionListener = Arc<dyn Fn(&Session) + Send + Sync>;

/// Response to a successful authentication call.
#[derive(Debug, Clone)]
pub struct AuthResponse {
    pub token: String,
    pub record: Payload,
}

/// Authentication methods a collection offers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthMethods {
    #[serde(default)]
    pub username_password: bool,
    #[serde(default)]
    pub email_password: bool,
    #[serde(default)]
    pub auth_providers: Vec<AuthProviderInfo>,
}

/// One configured OAuth2 provider, as advertised by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthProviderInfo {
    pub name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub code_verifier: String,
    #[serde(default)]
    pub code_challenge: String,
    #[serde(default)]
    pub code_challenge_method: String,
    #[serde(default)]
    pub auth_url: String,
}

/// A linked external auth provider on an auth record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalAuth {
    pub id: String,
    pub provider: String,
    pub provider_id: String,
}

/// OAuth2 providers the backend can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuth2Provider {
    Apple,
    Bitbucket,
    Discord,
    Facebook,
    Gitea,
    Gitee,
    Github,
    Gitlab,
    Google,
    Instagram,
    Kakao,
    Livechat,
    Mailcow,
    Microsoft,
    Oidc,
    Oidc2,
    Oidc3,
    Patreon,
    Planningcenter,
    Spotify,
    Strava,
    Twitch,
    Twitter,
    Vk,
    Yandex,
}

impl OAuth2Provider {
    /// The provider's wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            OAuth2Provider::Apple => "apple",
            OAuth2Provider::Bitbucket => "bitbucket",
            OAuth2Provider::Discord => "discord",
            OAuth2Provider::Facebook => "facebook",
            OAuth2Provider::Gitea => "gitea",
            OAuth2Provider::Gitee => "gitee",
            OAuth2Provider::Github => "github",
            OAuth2Provider::Gitlab => "gitlab",
            OAuth2Provider::Google => "google",
            OAuth2Provider::Instagram => "instagram",
            OAuth2Provider::Kakao => "kakao",
            OAuth2Provider::Livechat => "livechat",
            OAuth2Provider::Mailcow => "mailcow",
            OAuth2Provider::Microsoft => "microsoft",
            OAuth2Provider::Oidc => "oidc",
            OAuth2Provider::Oidc2 => "oidc2",
            OAuth2Provider::Oidc3 => "oidc3",
            OAuth2Provider::Patreon => "patreon",
            OAuth2Provider::Planningcenter => "planningcenter",
            OAuth2Provider::Spotify => "spotify",
            OAuth2Provider::Strava => "strava",
            OAuth2Provider::Twitch => "twitch",
            OAuth2Provider::Twitter => "twitter",
            OAuth2Provider::Vk => "vk",
            OAuth2Provider::Yandex => "yandex",
        }
    }
}

impl fmt::Display for OAuth2Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The record backend, as consumed by collection clients.
///
/// Implementations own all transport concerns (HTTP, the realtime channel,
/// session persistence). The contract on reads: `first` fails with
/// [`Error::NotFound`](crate::Error::NotFound) when nothing matches, so the
/// collection layer can recover it into `None`.
#[async_trait]
pub trait Backend: Send + Sync {
    // Records
    async fn list(&self, collection: &str, page: u32, per_page: u32, query: &ListQuery)
        -> Result<ListPage<Payload>>;
    async fn full_list(&self, collection: &str, query: &ListQuery) -> Result<Vec<Payload>>;
    async fn first(&self, collection: &str, filter: &str) -> Result<Payload>;
    async fn one(&self, collection: &str, id: &RecordId) -> Result<Payload>;
    async fn create(&self, collection: &str, payload: &Payload) -> Result<Payload>;
    async fn update(&self, collection: &str, id: &RecordId, patch: &Payload) -> Result<Payload>;
    async fn delete(&self, collection: &str, id: &RecordId) -> Result<()>;

    // Realtime
    async fn subscribe(&self, collection: &str, topic: Topic, handler: EventHandler) -> Result<()>;
    async fn unsubscribe(&self, collection: &str, topic: Topic) -> Result<()>;
    async fn unsubscribe_all(&self) -> Result<()>;

    // Auth flows
    async fn auth_with_password(
        &self,
        collection: &str,
        identity: &str,
        password_hash: &str,
    ) -> Result<AuthResponse>;
    async fn auth_with_oauth2(
        &self,
        collection: &str,
        provider: OAuth2Provider,
        code: &str,
        code_verifier: &str,
        redirect_url: &str,
        create_data: Option<&Payload>,
    ) -> Result<AuthResponse>;
    async fn auth_refresh(&self, collection: &str) -> Result<AuthResponse>;
    async fn request_verification(&self, collection: &str, email: &str) -> Result<()>;
    async fn confirm_verification(&self, collection: &str, token: &str) -> Result<()>;
    async fn request_password_reset(&self, collection: &str, email: &str) -> Result<()>;
    async fn confirm_password_reset(
        &self,
        collection: &str,
        token: &str,
        password_hash: &str,
    ) -> Result<()>;
    async fn request_email_change(&self, collection: &str, new_email: &str) -> Result<()>;
    async fn confirm_email_change(
        &self,
        collection: &str,
        token: &str,
        password_hash: &str,
    ) -> Result<()>;
    async fn list_auth_methods(&self, collection: &str) -> Result<AuthMethods>;
    async fn list_external_auths(&self, collection: &str, id: &RecordId)
        -> Result<Vec<ExternalAuth>>;
    async fn unlink_external_auth(
        &self,
        collection: &str,
        id: &RecordId,
        provider: OAuth2Provider,
    ) -> Result<()>;

    // Session
    fn session(&self) -> Session;
    fn on_session_change(&self, listener: SessionListener);
    fn clear_session(&self);

    /// Build the URL of a file stored on a record.
    fn file_url(&self, collection: &str, id: &RecordId, filename: &str) -> String;
}
