/// User directory entities
///
/// A user document is created on first sign-in ("ensure" semantics)
/// and never deleted by this layer. The uid is the primary key; email
/// is a secondary lookup key resolved by query, normalized to
/// lowercase by the directory service rather than by store collation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::error::StoreError;
use crate::store::{collections, Record};

/// Collaboration preferences carried on every profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    /// Working-hours hint, e.g. "9-5 EST".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_hours: Option<String>,

    /// Preferred communication style, e.g. "async".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub communication_style: Option<String>,

    /// Self-declared skills.
    #[serde(default)]
    pub skills: Vec<String>,
}

impl Default for UserPreferences {
    /// The placeholder profile written on first sign-in.
    fn default() -> Self {
        UserPreferences {
            work_hours: Some("9-5 EST".to_string()),
            communication_style: Some("async".to_string()),
            skills: Vec::new(),
        }
    }
}

/// A directory profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub uid: String,
    pub display_name: String,
    pub email: String,
    pub avatar_url: Option<String>,
    pub preferences: UserPreferences,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Wire shape of a `users/{uid}` document body.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserDoc {
    display_name: String,
    email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    avatar_url: Option<String>,
    #[serde(default)]
    preferences: UserPreferences,
}

impl User {
    /// Decodes a stored record, converting envelope timestamps and
    /// filling absent preference fields with defaults.
    pub fn from_record(record: &Record) -> Result<Self, StoreError> {
        let doc: UserDoc =
            serde_json::from_value(record.data.clone()).map_err(|e| StoreError::Malformed {
                collection: collections::USERS.to_string(),
                id: record.id.clone(),
                reason: e.to_string(),
            })?;
        Ok(User {
            uid: record.id.clone(),
            display_name: doc.display_name,
            email: doc.email,
            avatar_url: doc.avatar_url,
            preferences: doc.preferences,
            created_at: record.created_at.to_datetime(),
            updated_at: record.updated_at.to_datetime(),
        })
    }
}

/// The opaque identity handed over by the authentication provider on
/// sign-in; the only input to `ensure`.
#[derive(Debug, Clone)]
pub struct AuthIdentity {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

impl AuthIdentity {
    /// Builds the default profile document written when the identity
    /// has no stored record yet.
    pub(crate) fn default_profile_doc(&self) -> JsonValue {
        json!(UserDoc {
            display_name: self
                .display_name
                .clone()
                .unwrap_or_else(|| "User".to_string()),
            email: self.email.clone().unwrap_or_default(),
            avatar_url: self.avatar_url.clone(),
            preferences: UserPreferences::default(),
        })
    }
}
