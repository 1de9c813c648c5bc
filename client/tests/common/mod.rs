//! Shared test fixtures: an in-memory backend double and test models.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tether_client::{
    AuthMethods, AuthResponse, Backend, Error, EventHandler, ExternalAuth, ListPage, ListQuery,
    OAuth2Provider, RecordEvent, Result, Session, SessionListener, Topic,
};
use tether_codec::{AuthModel, FieldConverter, Model, Payload, RecordCodec, RecordId, Select};

/// Install a test subscriber so dropped-event logs show up with
/// `--nocapture`. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------
// Test models
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Open,
    Done,
}

impl Select for TaskStatus {
    fn options() -> &'static [&'static str] {
        &["open", "done"]
    }

    fn from_wire(raw: &str) -> Option<Self> {
        match raw {
            "open" => Some(TaskStatus::Open),
            "done" => Some(TaskStatus::Done),
            _ => None,
        }
    }

    fn as_wire(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::Done => "done",
        }
    }
}

/// Soft-deletable model with a selection field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: RecordId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    pub notes: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskFields {
    pub title: String,
    pub notes: Option<String>,
    pub status: TaskStatus,
}

static TASK_CODEC: std::sync::LazyLock<RecordCodec> = std::sync::LazyLock::new(|| {
    RecordCodec::with_base(vec![
        FieldConverter::passthrough("title", "title"),
        FieldConverter::nullable_string("notes", "notes"),
        FieldConverter::single_select::<TaskStatus>("status", "status"),
        FieldConverter::soft_delete(),
    ])
});

impl Model for Task {
    type Fields = TaskFields;

    fn codec() -> &'static RecordCodec {
        &TASK_CODEC
    }

    fn id(&self) -> &RecordId {
        &self.id
    }
}

impl Task {
    pub fn fields(&self) -> TaskFields {
        TaskFields {
            title: self.title.clone(),
            notes: self.notes.clone(),
            status: self.status,
        }
    }
}

/// Minimal model without soft-delete support.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub id: RecordId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkFields {
    pub url: String,
}

static BOOKMARK_CODEC: std::sync::LazyLock<RecordCodec> = std::sync::LazyLock::new(|| {
    RecordCodec::with_base(vec![FieldConverter::passthrough("url", "url")])
});

impl Model for Bookmark {
    type Fields = BookmarkFields;

    fn codec() -> &'static RecordCodec {
        &BOOKMARK_CODEC
    }

    fn id(&self) -> &RecordId {
        &self.id
    }
}

/// Auth-capable model for auth store tests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: RecordId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub username: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountFields {
    pub username: String,
    pub email: Option<String>,
}

static ACCOUNT_CODEC: std::sync::LazyLock<RecordCodec> = std::sync::LazyLock::new(|| {
    RecordCodec::with_base(vec![
        FieldConverter::passthrough("username", "username"),
        FieldConverter::nullable_string("email", "email"),
    ])
});

impl Model for Account {
    type Fields = AccountFields;

    fn codec() -> &'static RecordCodec {
        &ACCOUNT_CODEC
    }

    fn id(&self) -> &RecordId {
        &self.id
    }
}

impl AuthModel for Account {}

impl Account {
    pub fn fields(&self) -> AccountFields {
        AccountFields {
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Payload builders
// ---------------------------------------------------------------------------

pub const WIRE_NOW: &str = "2024-01-01 00:00:00.000Z";

pub fn as_object(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

pub fn task_payload(id: &str, title: &str) -> Payload {
    as_object(json!({
        "id": id,
        "collectionId": "col0000000tasks",
        "collectionName": "tasks",
        "created": WIRE_NOW,
        "updated": WIRE_NOW,
        "title": title,
        "notes": "",
        "status": "open",
        "deleted": "",
    }))
}

pub fn account_payload(id: &str, username: &str) -> Payload {
    as_object(json!({
        "id": id,
        "collectionId": "col000_accounts",
        "collectionName": "accounts",
        "created": WIRE_NOW,
        "updated": WIRE_NOW,
        "username": username,
        "email": "",
    }))
}

pub fn record_id(raw: &str) -> RecordId {
    RecordId::new(raw).expect("test id should be valid")
}

// ---------------------------------------------------------------------------
// The backend double
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct Calls {
    pub list: AtomicUsize,
    pub one: AtomicUsize,
    pub create: AtomicUsize,
    pub update: AtomicUsize,
    pub delete: AtomicUsize,
    pub subscribe: AtomicUsize,
    pub unsubscribe: AtomicUsize,
    pub unsubscribe_all: AtomicUsize,
    pub auth_refresh: AtomicUsize,
}

#[derive(Default)]
struct SessionSlot {
    token: Option<String>,
    subject: Option<Payload>,
    valid: bool,
}

/// In-memory [`Backend`] double.
///
/// Records live in per-collection vectors of wire payloads. Session state is
/// set directly by tests; realtime events are injected with [`Self::emit`].
#[derive(Default)]
pub struct MockBackend {
    records: Mutex<HashMap<String, Vec<Payload>>>,
    handlers: Mutex<HashMap<String, EventHandler>>,
    session: Mutex<SessionSlot>,
    listeners: Mutex<Vec<SessionListener>>,
    auth_response: Mutex<Option<(String, Payload)>>,
    next_id: AtomicUsize,
    pub calls: Calls,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn seed(&self, collection: &str, payloads: Vec<Payload>) {
        self.records
            .lock()
            .unwrap()
            .insert(collection.to_string(), payloads);
    }

    /// The stored wire payload for a record, if present.
    pub fn stored(&self, collection: &str, id: &str) -> Option<Payload> {
        self.records
            .lock()
            .unwrap()
            .get(collection)?
            .iter()
            .find(|p| p.get("id").and_then(Value::as_str) == Some(id))
            .cloned()
    }

    /// Configure what the auth endpoints hand back.
    pub fn set_auth_response(&self, token: &str, record: Payload) {
        *self.auth_response.lock().unwrap() = Some((token.to_string(), record));
    }

    /// Replace the session and fire change listeners, as the real backend
    /// does on token refresh or sign-out.
    pub fn set_session(&self, token: Option<&str>, subject: Option<Payload>, valid: bool) {
        {
            let mut slot = self.session.lock().unwrap();
            slot.token = token.map(str::to_string);
            slot.subject = subject;
            slot.valid = valid;
        }
        self.notify_listeners();
    }

    /// Deliver a realtime event to the handler subscribed on a topic key.
    pub fn emit(&self, key: &str, event: RecordEvent) {
        let handler = self.handlers.lock().unwrap().get(key).cloned();
        handler.expect("no handler registered for topic")(event);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }

    fn notify_listeners(&self) {
        let snapshot = self.session_snapshot();
        let listeners: Vec<SessionListener> = self.listeners.lock().unwrap().clone();
        for listener in listeners {
            listener(&snapshot);
        }
    }

    fn session_snapshot(&self) -> Session {
        let slot = self.session.lock().unwrap();
        Session {
            token: slot.token.clone(),
            subject: slot.subject.clone(),
            valid: slot.valid,
        }
    }

    fn topic_key(collection: &str, topic: &Topic) -> String {
        match topic {
            Topic::All => collection.to_string(),
            Topic::Record(id) => format!("{collection}/{id}"),
        }
    }

    fn generate_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("mock{n:011}")
    }

    fn collection_records(&self, collection: &str) -> Vec<Payload> {
        self.records
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    fn adopt_auth_session(&self) -> Result<AuthResponse> {
        let (token, record) = self
            .auth_response
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::from_status(400, "no auth response configured"))?;
        {
            let mut slot = self.session.lock().unwrap();
            slot.token = Some(token.clone());
            slot.subject = Some(record.clone());
            slot.valid = true;
        }
        self.notify_listeners();
        Ok(AuthResponse { token, record })
    }
}

/// Strip write-only secret fields, as the real backend does before
/// responding.
fn public_view(payload: &Payload) -> Payload {
    let mut cleaned = payload.clone();
    for secret in ["password", "passwordConfirm", "oldPassword"] {
        cleaned.remove(secret);
    }
    cleaned
}

/// Match the `field='value'` filter shape the tests use; anything else
/// matches every record.
fn filter_matches(payload: &Payload, filter: &str) -> bool {
    let Some((key, value)) = filter.split_once('=') else {
        return true;
    };
    let value = value.trim().trim_matches('\'');
    payload.get(key.trim()).and_then(Value::as_str) == Some(value)
}

#[async_trait]
impl Backend for MockBackend {
    async fn list(
        &self,
        collection: &str,
        page: u32,
        per_page: u32,
        query: &ListQuery,
    ) -> Result<ListPage<Payload>> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);
        let all: Vec<Payload> = self
            .collection_records(collection)
            .into_iter()
            .filter(|p| {
                query
                    .filter
                    .as_deref()
                    .map(|f| filter_matches(p, f))
                    .unwrap_or(true)
            })
            .map(|p| public_view(&p))
            .collect();

        let total_items = all.len() as u64;
        let total_pages = (all.len() as u32).div_ceil(per_page).max(1);
        let start = ((page - 1) * per_page) as usize;
        let items = all
            .into_iter()
            .skip(start)
            .take(per_page as usize)
            .collect();

        Ok(ListPage {
            page,
            per_page,
            total_items,
            total_pages,
            items,
        })
    }

    async fn full_list(&self, collection: &str, query: &ListQuery) -> Result<Vec<Payload>> {
        let page = self.list(collection, 1, u32::MAX, query).await?;
        Ok(page.items)
    }

    async fn first(&self, collection: &str, filter: &str) -> Result<Payload> {
        self.collection_records(collection)
            .into_iter()
            .find(|p| filter_matches(p, filter))
            .map(|p| public_view(&p))
            .ok_or_else(|| Error::from_status(404, "no record matching filter"))
    }

    async fn one(&self, collection: &str, id: &RecordId) -> Result<Payload> {
        self.calls.one.fetch_add(1, Ordering::SeqCst);
        self.stored(collection, id.as_str())
            .map(|p| public_view(&p))
            .ok_or_else(|| Error::from_status(404, "record not found"))
    }

    async fn create(&self, collection: &str, payload: &Payload) -> Result<Payload> {
        self.calls.create.fetch_add(1, Ordering::SeqCst);
        let mut stored = payload.clone();
        stored.insert("id".to_string(), json!(self.generate_id()));
        stored.insert("collectionId".to_string(), json!(format!("col_{collection}")));
        stored.insert("collectionName".to_string(), json!(collection));
        stored.insert("created".to_string(), json!(WIRE_NOW));
        stored.insert("updated".to_string(), json!(WIRE_NOW));

        self.records
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(stored.clone());
        Ok(public_view(&stored))
    }

    async fn update(&self, collection: &str, id: &RecordId, patch: &Payload) -> Result<Payload> {
        self.calls.update.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.lock().unwrap();
        let list = records
            .get_mut(collection)
            .ok_or_else(|| Error::from_status(404, "record not found"))?;
        let stored = list
            .iter_mut()
            .find(|p| p.get("id").and_then(Value::as_str) == Some(id.as_str()))
            .ok_or_else(|| Error::from_status(404, "record not found"))?;
        for (key, value) in patch {
            stored.insert(key.clone(), value.clone());
        }
        stored.insert("updated".to_string(), json!("2024-01-02 00:00:00.000Z"));
        Ok(public_view(stored))
    }

    async fn delete(&self, collection: &str, id: &RecordId) -> Result<()> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.lock().unwrap();
        let list = records
            .get_mut(collection)
            .ok_or_else(|| Error::from_status(404, "record not found"))?;
        let before = list.len();
        list.retain(|p| p.get("id").and_then(Value::as_str) != Some(id.as_str()));
        if list.len() == before {
            return Err(Error::from_status(404, "record not found"));
        }
        Ok(())
    }

    async fn subscribe(&self, collection: &str, topic: Topic, handler: EventHandler) -> Result<()> {
        self.calls.subscribe.fetch_add(1, Ordering::SeqCst);
        self.handlers
            .lock()
            .unwrap()
            .insert(Self::topic_key(collection, &topic), handler);
        Ok(())
    }

    async fn unsubscribe(&self, collection: &str, topic: Topic) -> Result<()> {
        self.calls.unsubscribe.fetch_add(1, Ordering::SeqCst);
        self.handlers
            .lock()
            .unwrap()
            .remove(&Self::topic_key(collection, &topic));
        Ok(())
    }

    async fn unsubscribe_all(&self) -> Result<()> {
        self.calls.unsubscribe_all.fetch_add(1, Ordering::SeqCst);
        self.handlers.lock().unwrap().clear();
        Ok(())
    }

    async fn auth_with_password(
        &self,
        _collection: &str,
        _identity: &str,
        _password_hash: &str,
    ) -> Result<AuthResponse> {
        self.adopt_auth_session()
    }

    async fn auth_with_oauth2(
        &self,
        _collection: &str,
        _provider: OAuth2Provider,
        _code: &str,
        _code_verifier: &str,
        _redirect_url: &str,
        _create_data: Option<&Payload>,
    ) -> Result<AuthResponse> {
        self.adopt_auth_session()
    }

    async fn auth_refresh(&self, _collection: &str) -> Result<AuthResponse> {
        self.calls.auth_refresh.fetch_add(1, Ordering::SeqCst);
        self.adopt_auth_session()
    }

    async fn request_verification(&self, _collection: &str, _email: &str) -> Result<()> {
        Ok(())
    }

    async fn confirm_verification(&self, _collection: &str, _token: &str) -> Result<()> {
        Ok(())
    }

    async fn request_password_reset(&self, _collection: &str, _email: &str) -> Result<()> {
        Ok(())
    }

    async fn confirm_password_reset(
        &self,
        _collection: &str,
        _token: &str,
        _password_hash: &str,
    ) -> Result<()> {
        Ok(())
    }

    async fn request_email_change(&self, _collection: &str, _new_email: &str) -> Result<()> {
        Ok(())
    }

    async fn confirm_email_change(
        &self,
        _collection: &str,
        _token: &str,
        _password_hash: &str,
    ) -> Result<()> {
        Ok(())
    }

    async fn list_auth_methods(&self, _collection: &str) -> Result<AuthMethods> {
        Ok(AuthMethods {
            username_password: true,
            email_password: true,
            auth_providers: Vec::new(),
        })
    }

    async fn list_external_auths(
        &self,
        _collection: &str,
        _id: &RecordId,
    ) -> Result<Vec<ExternalAuth>> {
        Ok(Vec::new())
    }

    async fn unlink_external_auth(
        &self,
        _collection: &str,
        _id: &RecordId,
        _provider: OAuth2Provider,
    ) -> Result<()> {
        Ok(())
    }

    fn session(&self) -> Session {
        self.session_snapshot()
    }

    fn on_session_change(&self, listener: SessionListener) {
        self.listeners.lock().unwrap().push(listener);
    }

    fn clear_session(&self) {
        {
            let mut slot = self.session.lock().unwrap();
            slot.token = None;
            slot.subject = None;
            slot.valid = false;
        }
        self.notify_listeners();
    }

    fn file_url(&self, collection: &str, id: &RecordId, filename: &str) -> String {
        format!("mock://files/{collection}/{id}/{filename}")
    }
}
