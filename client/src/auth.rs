//! The auth store.
//!
//! An [`AuthStore`] layers session awareness over a [`RecordStore`] for an
//! auth-capable collection: it derives the currently authenticated record
//! from the backend session, keeps it current through session-change
//! notifications, and routes the session operations.

use crate::backend::{AuthMethods, ExternalAuth, OAuth2Provider, Session};
use crate::collection::{
    AuthCollection, AuthRecordResponse, CollectionClient, PasswordChange, PasswordCreate,
};
use crate::error::Result;
use crate::store::RecordStore;
use std::sync::{Arc, PoisonError, RwLock};
use tether_codec::{decode_record, AuthModel, Payload, RecordId};

struct AuthState<M> {
    authed: RwLock<Option<M>>,
    token: RwLock<Option<String>>,
}

impl<M> AuthState<M> {
    fn new() -> Self {
        Self {
            authed: RwLock::new(None),
            token: RwLock::new(None),
        }
    }

    fn apply(&self, derived: Option<M>, token: Option<String>) {
        let token = if derived.is_some() { token } else { None };
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = token;
        *self.authed.write().unwrap_or_else(PoisonError::into_inner) = derived;
    }
}

/// Reactive store for an auth-capable collection, plus the derived session.
pub struct AuthStore<M: AuthModel> {
    collection: AuthCollection<M>,
    store: RecordStore<M>,
    auth: Arc<AuthState<M>>,
}

impl<M: AuthModel> Clone for AuthStore<M> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection.clone(),
            store: self.store.clone(),
            auth: Arc::clone(&self.auth),
        }
    }
}

impl<M: AuthModel> AuthStore<M> {
    /// Build the store and wire it to the backend's session notifications.
    ///
    /// The session is derived synchronously now and re-derived on every
    /// change notification.
    pub fn new(collection: AuthCollection<M>) -> Self {
        let store = RecordStore::new(CollectionClient::Auth(collection.clone()));
        let auth = Arc::new(AuthState::new());

        let backend = Arc::clone(collection.base().backend());
        let name = collection.base().name().to_string();

        let session = backend.session();
        auth.apply(derive_session::<M>(&session, &name), session.token.clone());

        let listener_state = Arc::clone(&auth);
        let listener_name = name.clone();
        backend.on_session_change(Arc::new(move |session: &Session| {
            listener_state.apply(
                derive_session::<M>(session, &listener_name),
                session.token.clone(),
            );
        }));

        Self {
            collection,
            store,
            auth,
        }
    }

    /// The underlying record store (cache, reads, subscriptions).
    pub fn store(&self) -> &RecordStore<M> {
        &self.store
    }

    /// The auth collection client.
    pub fn collection(&self) -> &AuthCollection<M> {
        &self.collection
    }

    /// Whether a valid session for this collection exists.
    pub fn is_authed(&self) -> bool {
        self.auth
            .authed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// The currently authenticated record, if any.
    pub fn authed_record(&self) -> Option<M> {
        self.auth
            .authed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The current session token, present only while authenticated.
    pub fn token(&self) -> Option<String> {
        self.auth
            .token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Create an auth record and absorb it into the cache.
    pub async fn add(&self, fields: &M::Fields, password: &PasswordCreate) -> Result<M> {
        let record = self.collection.add(fields, password).await?;
        self.store.upsert(record.clone());
        Ok(record)
    }

    /// Update an auth record and absorb it into the cache.
    ///
    /// Updating the currently authenticated record has session
    /// consequences: a password change invalidates the session server-side,
    /// so the store signs out; any other change refreshes the session so
    /// the subject stays current.
    pub async fn update(
        &self,
        id: &RecordId,
        new_fields: &M::Fields,
        old_fields: Option<&M::Fields>,
        password: Option<&PasswordChange>,
    ) -> Result<M> {
        let record = self
            .collection
            .update(id, new_fields, old_fields, password)
            .await?;
        self.store.upsert(record.clone());

        let is_self = self
            .authed_record()
            .is_some_and(|authed| authed.id() == record.id());
        if is_self {
            if password.is_some() {
                self.sign_out().await?;
            } else {
                self.collection.auth_refresh().await?;
            }
        }
        Ok(record)
    }

    /// Clear the backend session and drop every live channel.
    pub async fn sign_out(&self) -> Result<()> {
        let backend = self.collection.base().backend();
        backend.unsubscribe_all().await?;
        backend.clear_session();
        self.store.clear_topics();
        Ok(())
    }

    pub async fn auth_with_password(
        &self,
        identity: &str,
        password: &str,
    ) -> Result<AuthRecordResponse<M>> {
        self.collection.auth_with_password(identity, password).await
    }

    pub async fn auth_with_oauth2(
        &self,
        provider: OAuth2Provider,
        code: &str,
        code_verifier: &str,
        redirect_url: &str,
        create_data: Option<&Payload>,
    ) -> Result<AuthRecordResponse<M>> {
        self.collection
            .auth_with_oauth2(provider, code, code_verifier, redirect_url, create_data)
            .await
    }

    pub async fn auth_refresh(&self) -> Result<AuthRecordResponse<M>> {
        self.collection.auth_refresh().await
    }

    pub async fn request_verification(&self, email: &str) -> Result<()> {
        self.collection.request_verification(email).await
    }

    pub async fn confirm_verification(&self, token: &str) -> Result<()> {
        self.collection.confirm_verification(token).await
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        self.collection.request_password_reset(email).await
    }

    pub async fn confirm_password_reset(&self, token: &str, password: &str) -> Result<()> {
        self.collection.confirm_password_reset(token, password).await
    }

    pub async fn request_email_change(&self, new_email: &str) -> Result<()> {
        self.collection.request_email_change(new_email).await
    }

    pub async fn confirm_email_change(&self, token: &str, password: &str) -> Result<()> {
        self.collection.confirm_email_change(token, password).await
    }

    pub async fn list_auth_methods(&self) -> Result<AuthMethods> {
        self.collection.list_auth_methods().await
    }

    pub async fn list_external_auths(&self, id: &RecordId) -> Result<Vec<ExternalAuth>> {
        self.collection.list_external_auths(id).await
    }

    pub async fn unlink_external_auth(
        &self,
        id: &RecordId,
        provider: OAuth2Provider,
    ) -> Result<()> {
        self.collection.unlink_external_auth(id, provider).await
    }
}

/// Derive the authenticated record from a session snapshot.
///
/// Requires a non-blank valid token and a subject payload belonging to this
/// collection. A subject that fails decoding is treated as signed out and
/// logged; the change callback has nowhere to propagate an error.
fn derive_session<M: AuthModel>(session: &Session, collection_name: &str) -> Option<M> {
    let token = session.token.as_deref()?;
    if token.trim().is_empty() || !session.valid {
        return None;
    }
    let subject = session.subject.as_ref()?;

    let belongs_here = ["collectionName", "collectionId"].iter().any(|key| {
        subject.get(*key).and_then(serde_json::Value::as_str) == Some(collection_name)
    });
    if !belongs_here {
        return None;
    }

    match decode_record::<M>(subject) {
        Ok(record) => Some(record),
        Err(error) => {
            tracing::error!(collection = %collection_name, %error, "session subject failed decoding");
            None
        }
    }
}
