//! Collection clients.
//!
//! A collection client wraps one backend collection and its record codec:
//! reads and writes travel through the codec, so callers only ever see
//! typed records. [`BaseCollection`] covers plain collections;
//! [`AuthCollection`] adds the session operations of auth-capable
//! collections; [`CollectionClient`] is the tagged sum of the two.

use crate::backend::{
    AuthMethods, Backend, EventAction, ExternalAuth, ListPage, ListQuery, OAuth2Provider,
    RecordEvent, Topic,
};
use crate::error::{Error, Result};
use chrono::Utc;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;
use tether_codec::{decode_record, encode_fields, patch_fields, AuthModel, Model, RecordId};

/// Options for [`BaseCollection::remove_by_id`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveOptions {
    /// Issue a hard delete even when the codec supports soft deletion.
    pub permanently: bool,
}

/// A live change event with the record already decoded.
#[derive(Debug, Clone)]
pub struct RecordChange<M> {
    pub action: EventAction,
    pub record: M,
}

/// A successful authentication, with the subject record decoded.
#[derive(Debug, Clone)]
pub struct AuthRecordResponse<M> {
    pub token: String,
    pub record: M,
}

/// Password pair for creating an auth record.
#[derive(Debug, Clone)]
pub struct PasswordCreate {
    pub password: String,
    pub password_confirm: String,
}

/// Password triple for changing an auth record's password.
#[derive(Debug, Clone)]
pub struct PasswordChange {
    pub old_password: String,
    pub password: String,
    pub password_confirm: String,
}

/// Hash a password for transmission.
///
/// Plaintext never leaves the client; the backend stores a hash of this
/// digest.
pub fn hash_password(raw: &str) -> String {
    blake3::hash(raw.as_bytes()).to_hex().to_string()
}

impl PasswordCreate {
    fn hashed(&self) -> Vec<(String, Value)> {
        vec![
            ("password".to_string(), Value::String(hash_password(&self.password))),
            (
                "passwordConfirm".to_string(),
                Value::String(hash_password(&self.password_confirm)),
            ),
        ]
    }
}

impl PasswordChange {
    fn hashed(&self) -> Vec<(String, Value)> {
        vec![
            (
                "oldPassword".to_string(),
                Value::String(hash_password(&self.old_password)),
            ),
            ("password".to_string(), Value::String(hash_password(&self.password))),
            (
                "passwordConfirm".to_string(),
                Value::String(hash_password(&self.password_confirm)),
            ),
        ]
    }
}

/// Client for one plain backend collection.
pub struct BaseCollection<M: Model> {
    backend: Arc<dyn Backend>,
    name: String,
    _model: PhantomData<fn() -> M>,
}

impl<M: Model> Clone for BaseCollection<M> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            name: self.name.clone(),
            _model: PhantomData,
        }
    }
}

impl<M: Model> BaseCollection<M> {
    pub fn new(backend: Arc<dyn Backend>, name: impl Into<String>) -> Self {
        Self {
            backend,
            name: name.into(),
            _model: PhantomData,
        }
    }

    /// The backend collection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The backend this collection talks to.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Whether this collection's codec supports soft deletion.
    pub fn is_soft_delete_supported(&self) -> bool {
        M::codec().is_soft_delete_supported()
    }

    /// Fetch every record matching the query.
    pub async fn get_all(&self, query: &ListQuery) -> Result<Vec<M>> {
        let payloads = self.backend.full_list(&self.name, query).await?;
        payloads
            .iter()
            .map(|payload| decode_record(payload).map_err(Error::from))
            .collect()
    }

    /// Fetch one page of records.
    pub async fn get_many(
        &self,
        page: u32,
        per_page: u32,
        query: &ListQuery,
    ) -> Result<ListPage<M>> {
        let result = self.backend.list(&self.name, page, per_page, query).await?;
        result.try_map(|payload| decode_record(payload).map_err(Error::from))
    }

    /// Fetch the first record matching a filter, or `None` when the backend
    /// reports nothing matches.
    pub async fn get_first(&self, filter: &str) -> Result<Option<M>> {
        match self.backend.first(&self.name, filter).await {
            Ok(payload) => Ok(Some(decode_record(&payload)?)),
            Err(error) if error.is_not_found() => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Fetch a record by id.
    pub async fn get_by_id(&self, id: &RecordId) -> Result<M> {
        let payload = self.backend.one(&self.name, id).await?;
        Ok(decode_record(&payload)?)
    }

    /// Create a record from its editable fields.
    pub async fn add(&self, fields: &M::Fields) -> Result<M> {
        let payload = encode_fields::<M>(fields)?;
        let created = self.backend.create(&self.name, &payload).await?;
        Ok(decode_record(&created)?)
    }

    /// Update a record, sending only the fields that differ from
    /// `old_fields`.
    ///
    /// When the computed patch is empty no write is issued; the current
    /// record is fetched with a plain read instead, so callers still get a
    /// fresh value.
    pub async fn update(
        &self,
        id: &RecordId,
        new_fields: &M::Fields,
        old_fields: Option<&M::Fields>,
    ) -> Result<M> {
        let patch = patch_fields::<M>(new_fields, old_fields)?;
        if patch.is_empty() {
            return self.get_by_id(id).await;
        }
        let updated = self.backend.update(&self.name, id, &patch).await?;
        Ok(decode_record(&updated)?)
    }

    /// Remove a record.
    ///
    /// With soft-delete support and `permanently: false`, this issues an
    /// update stamping the soft-delete field and returns the updated
    /// record. Otherwise it issues a hard delete and returns `None`; a
    /// backend 404 on the hard-delete path counts as success.
    pub async fn remove_by_id(&self, id: &RecordId, options: RemoveOptions) -> Result<Option<M>> {
        let permanently = if self.is_soft_delete_supported() {
            options.permanently
        } else {
            true
        };

        if permanently {
            return match self.backend.delete(&self.name, id).await {
                Ok(()) => Ok(None),
                Err(error) if error.is_not_found() => Ok(None),
                Err(error) => Err(error),
            };
        }

        let patch = M::codec().soft_delete_patch(Utc::now())?;
        let updated = self.backend.update(&self.name, id, &patch).await?;
        Ok(Some(decode_record(&updated)?))
    }

    /// Register a live-change listener on a topic. Events arrive with the
    /// record already decoded; an event that fails decoding is dropped with
    /// an error log, since callbacks cannot propagate.
    pub async fn subscribe(
        &self,
        topic: Topic,
        callback: impl Fn(RecordChange<M>) + Send + Sync + 'static,
    ) -> Result<()> {
        let collection = self.name.clone();
        let handler = Arc::new(move |event: RecordEvent| {
            match decode_record::<M>(&event.record) {
                Ok(record) => callback(RecordChange {
                    action: event.action,
                    record,
                }),
                Err(error) => {
                    tracing::error!(%collection, %error, "dropping undecodable record event");
                }
            }
        });
        self.backend.subscribe(&self.name, topic, handler).await
    }

    /// Deregister the live-change listener on a topic.
    pub async fn unsubscribe(&self, topic: Topic) -> Result<()> {
        self.backend.unsubscribe(&self.name, topic).await
    }

    /// URL of a file stored in one of the record's file fields.
    pub fn file_url(&self, record: &M, filename: &str) -> String {
        self.backend.file_url(&self.name, record.id(), filename)
    }
}

/// Client for an auth-capable backend collection.
pub struct AuthCollection<M: Model> {
    base: BaseCollection<M>,
}

impl<M: Model> Clone for AuthCollection<M> {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
        }
    }
}

impl<M: Model> AuthCollection<M> {
    pub fn new(backend: Arc<dyn Backend>, name: impl Into<String>) -> Self {
        Self {
            base: BaseCollection::new(backend, name),
        }
    }

    /// The plain collection operations.
    pub fn base(&self) -> &BaseCollection<M> {
        &self.base
    }
}

impl<M: AuthModel> AuthCollection<M> {
    /// Create an auth record; the password pair is hashed before
    /// transmission and merged into the create payload.
    pub async fn add(&self, fields: &M::Fields, password: &PasswordCreate) -> Result<M> {
        let mut payload = encode_fields::<M>(fields)?;
        for (key, value) in password.hashed() {
            payload.insert(key, value);
        }
        let created = self.base.backend.create(&self.base.name, &payload).await?;
        Ok(decode_record(&created)?)
    }

    /// Update an auth record, optionally changing its password. Password
    /// values are hashed and merged into the patch.
    ///
    /// Like [`BaseCollection::update`], an empty patch issues a read
    /// instead of a write.
    pub async fn update(
        &self,
        id: &RecordId,
        new_fields: &M::Fields,
        old_fields: Option<&M::Fields>,
        password: Option<&PasswordChange>,
    ) -> Result<M> {
        let mut patch = patch_fields::<M>(new_fields, old_fields)?;
        if let Some(password) = password {
            for (key, value) in password.hashed() {
                patch.insert(key, value);
            }
        }
        if patch.is_empty() {
            return self.base.get_by_id(id).await;
        }
        let updated = self.base.backend.update(&self.base.name, id, &patch).await?;
        Ok(decode_record(&updated)?)
    }

    /// Authenticate with an identity (username or email) and password.
    pub async fn auth_with_password(
        &self,
        identity: &str,
        password: &str,
    ) -> Result<AuthRecordResponse<M>> {
        let response = self
            .base
            .backend
            .auth_with_password(&self.base.name, identity, &hash_password(password))
            .await?;
        Ok(AuthRecordResponse {
            record: decode_record(&response.record)?,
            token: response.token,
        })
    }

    /// Authenticate with an OAuth2 authorization code.
    pub async fn auth_with_oauth2(
        &self,
        provider: OAuth2Provider,
        code: &str,
        code_verifier: &str,
        redirect_url: &str,
        create_data: Option<&tether_codec::Payload>,
    ) -> Result<AuthRecordResponse<M>> {
        let response = self
            .base
            .backend
            .auth_with_oauth2(
                &self.base.name,
                provider,
                code,
                code_verifier,
                redirect_url,
                create_data,
            )
            .await?;
        Ok(AuthRecordResponse {
            record: decode_record(&response.record)?,
            token: response.token,
        })
    }

    /// Refresh the current session.
    pub async fn auth_refresh(&self) -> Result<AuthRecordResponse<M>> {
        let response = self.base.backend.auth_refresh(&self.base.name).await?;
        Ok(AuthRecordResponse {
            record: decode_record(&response.record)?,
            token: response.token,
        })
    }

    pub async fn request_verification(&self, email: &str) -> Result<()> {
        self.base
            .backend
            .request_verification(&self.base.name, email)
            .await
    }

    /// Confirm a verification token, then refresh the session so the
    /// subject record reflects the new verified state.
    pub async fn confirm_verification(&self, token: &str) -> Result<()> {
        self.base
            .backend
            .confirm_verification(&self.base.name, token)
            .await?;
        self.refresh_if_authed().await
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<()> {
        self.base
            .backend
            .request_password_reset(&self.base.name, email)
            .await
    }

    pub async fn confirm_password_reset(&self, token: &str, password: &str) -> Result<()> {
        self.base
            .backend
            .confirm_password_reset(&self.base.name, token, &hash_password(password))
            .await?;
        self.refresh_if_authed().await
    }

    pub async fn request_email_change(&self, new_email: &str) -> Result<()> {
        self.base
            .backend
            .request_email_change(&self.base.name, new_email)
            .await
    }

    pub async fn confirm_email_change(&self, token: &str, password: &str) -> Result<()> {
        self.base
            .backend
            .confirm_email_change(&self.base.name, token, &hash_password(password))
            .await?;
        self.refresh_if_authed().await
    }

    pub async fn list_auth_methods(&self) -> Result<AuthMethods> {
        self.base.backend.list_auth_methods(&self.base.name).await
    }

    pub async fn list_external_auths(&self, id: &RecordId) -> Result<Vec<ExternalAuth>> {
        self.base
            .backend
            .list_external_auths(&self.base.name, id)
            .await
    }

    pub async fn unlink_external_auth(
        &self,
        id: &RecordId,
        provider: OAuth2Provider,
    ) -> Result<()> {
        self.base
            .backend
            .unlink_external_auth(&self.base.name, id, provider)
            .await
    }

    async fn refresh_if_authed(&self) -> Result<()> {
        if self.base.backend.session().token.is_some() {
            self.auth_refresh().await?;
        }
        Ok(())
    }
}

/// A collection client: plain, or auth-capable.
///
/// The variant is part of the type, so callers match on capability instead
/// of inspecting a runtime flag.
pub enum CollectionClient<M: Model> {
    Base(BaseCollection<M>),
    Auth(AuthCollection<M>),
}

impl<M: Model> Clone for CollectionClient<M> {
    fn clone(&self) -> Self {
        match self {
            CollectionClient::Base(base) => CollectionClient::Base(base.clone()),
            CollectionClient::Auth(auth) => CollectionClient::Auth(auth.clone()),
        }
    }
}

impl<M: Model> CollectionClient<M> {
    /// The plain collection operations, whichever the variant.
    pub fn base(&self) -> &BaseCollection<M> {
        match self {
            CollectionClient::Base(base) => base,
            CollectionClient::Auth(auth) => auth.base(),
        }
    }

    /// Whether this client is auth-capable.
    pub fn is_auth(&self) -> bool {
        matches!(self, CollectionClient::Auth(_))
    }

    /// The auth operations, when the collection is auth-capable.
    pub fn as_auth(&self) -> Option<&AuthCollection<M>> {
        match self {
            CollectionClient::Base(_) => None,
            CollectionClient::Auth(auth) => Some(auth),
        }
    }
}

impl<M: Model> From<BaseCollection<M>> for CollectionClient<M> {
    fn from(base: BaseCollection<M>) -> Self {
        CollectionClient::Base(base)
    }
}

impl<M: Model> From<AuthCollection<M>> for CollectionClient<M> {
    fn from(auth: AuthCollection<M>) -> Self {
        CollectionClient::Auth(auth)
    }
}
