//! The standard auth collection model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tether_codec::{AuthModel, FieldConverter, Model, RecordCodec, RecordId};

/// A record in the backend's standard `users` auth collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: RecordId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub username: String,
    /// Hidden unless the record's email visibility flag is set.
    pub email: Option<String>,
    pub email_visibility: bool,
    pub verified: bool,
    pub name: String,
    /// Stored filename of the avatar image, if one was uploaded.
    pub avatar: Option<String>,
}

/// The editable fields of a [`User`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserFields {
    pub username: String,
    pub email: Option<String>,
    pub email_visibility: bool,
    pub verified: bool,
    pub name: String,
    pub avatar: Option<String>,
}

static USER_CODEC: LazyLock<RecordCodec> = LazyLock::new(|| {
    RecordCodec::with_base(vec![
        FieldConverter::passthrough("username", "username"),
        FieldConverter::nullable_string("email", "email"),
        FieldConverter::passthrough("emailVisibility", "emailVisibility"),
        FieldConverter::passthrough("verified", "verified"),
        FieldConverter::passthrough("name", "name"),
        FieldConverter::nullable_string("avatar", "avatar"),
    ])
});

impl User {
    /// The collection the standard backend stores users in.
    pub const COLLECTION: &'static str = "users";

    /// This user's editable fields, for building updates.
    pub fn fields(&self) -> UserFields {
        UserFields {
            username: self.username.clone(),
            email: self.email.clone(),
            email_visibility: self.email_visibility,
            verified: self.verified,
            name: self.name.clone(),
            avatar: self.avatar.clone(),
        }
    }
}

impl Model for User {
    type Fields = UserFields;

    fn codec() -> &'static RecordCodec {
        &USER_CODEC
    }

    fn id(&self) -> &RecordId {
        &self.id
    }
}

impl AuthModel for User {}
