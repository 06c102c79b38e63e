//! Identity model shared by every flow: roles, account status, and the
//! profile snapshots embedded in access tokens.
//!
//! Identities live in per-role document collections (`users`, `vendors`,
//! `admins`). A snapshot is a typed, role-tagged projection of the
//! profile fields; the tag makes a vendor snapshot on a user token
//! unrepresentable.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::Instrument;

use crate::store::{Document, DocumentStore, doc};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Vendor,
    Admin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Vendor => "vendor",
            Self::Admin => "admin",
        }
    }

    #[must_use]
    pub fn collection(self) -> &'static str {
        match self {
            Self::User => "users",
            Self::Vendor => "vendors",
            Self::Admin => "admins",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Incomplete,
    Pending,
    Active,
    Blocked,
    Rejected,
    PendingDeletion,
}

impl AccountStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Incomplete => "incomplete",
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Blocked => "blocked",
            Self::Rejected => "rejected",
            Self::PendingDeletion => "pending_deletion",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "incomplete" => Some(Self::Incomplete),
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "blocked" => Some(Self::Blocked),
            "rejected" => Some(Self::Rejected),
            "pending_deletion" => Some(Self::PendingDeletion),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub preferred_languages: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorProfile {
    pub business_name: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub location: Option<String>,
    pub address: Option<String>,
    #[serde(default)]
    pub business_category_ids: Vec<String>,
    pub phone: Option<String>,
    pub profile_picture: Option<String>,
    #[serde(default)]
    pub preferred_languages: Vec<String>,
}

/// Role-tagged profile projection carried in access tokens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProfileSnapshot {
    User(UserProfile),
    Vendor(VendorProfile),
}

impl ProfileSnapshot {
    #[must_use]
    pub fn role(&self) -> Role {
        match self {
            Self::User(_) => Role::User,
            Self::Vendor(_) => Role::Vendor,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Identity {
    pub id: String,
    pub role: Role,
    pub status: AccountStatus,
    pub phone: Option<String>,
    pub username: Option<String>,
    pub phone_verified: bool,
    pub account_verified: bool,
    pub password_hash: Option<String>,
    pub preferred_languages: Vec<String>,
    document: Document,
}

impl Identity {
    /// Builds an identity from a stored document.
    ///
    /// # Errors
    ///
    /// Fails when `_id` is missing or the status field does not name a
    /// known account status.
    pub fn from_document(role: Role, document: Document) -> Result<Self> {
        let id = field_str(&document, "_id")
            .context("identity document is missing _id")?
            .to_string();
        let status_raw = field_str(&document, "status").unwrap_or("incomplete");
        let Some(status) = AccountStatus::parse(status_raw) else {
            bail!("unknown account status {status_raw:?} on {id}");
        };
        Ok(Self {
            id,
            role,
            status,
            phone: field_str(&document, "phone").map(ToString::to_string),
            username: field_str(&document, "username").map(ToString::to_string),
            phone_verified: field_bool(&document, "phone_verified"),
            account_verified: field_bool(&document, "account_verified"),
            password_hash: field_str(&document, "password").map(ToString::to_string),
            preferred_languages: field_string_list(&document, "preferred_languages"),
            document,
        })
    }

    /// Typed projection of the profile fields. Admins carry no snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Option<ProfileSnapshot> {
        match self.role {
            Role::User => Some(ProfileSnapshot::User(UserProfile {
                first_name: self.field("first_name"),
                last_name: self.field("last_name"),
                email: self.field("email"),
                phone: self.phone.clone(),
                profile_picture: self.field("profile_picture"),
                preferred_languages: self.preferred_languages.clone(),
            })),
            Role::Vendor => Some(ProfileSnapshot::Vendor(VendorProfile {
                business_name: self.field("business_name"),
                city: self.field("city"),
                province: self.field("province"),
                location: self.field("location"),
                address: self.field("address"),
                business_category_ids: field_string_list(&self.document, "business_category_ids"),
                phone: self.phone.clone(),
                profile_picture: self.field("profile_picture"),
                preferred_languages: self.preferred_languages.clone(),
            })),
            Role::Admin => None,
        }
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<String> {
        field_str(&self.document, name).map(ToString::to_string)
    }

    #[must_use]
    pub fn has_field(&self, name: &str) -> bool {
        match self.document.get(name) {
            Some(Value::String(value)) => !value.trim().is_empty(),
            Some(Value::Null) | None => false,
            Some(_) => true,
        }
    }
}

fn field_str<'a>(document: &'a Document, name: &str) -> Option<&'a str> {
    document.get(name).and_then(Value::as_str)
}

fn field_bool(document: &Document, name: &str) -> bool {
    document
        .get(name)
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn field_string_list(document: &Document, name: &str) -> Vec<String> {
    document
        .get(name)
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(ToString::to_string)
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) async fn find_by_phone(
    docs: &dyn DocumentStore,
    role: Role,
    phone: &str,
) -> Result<Option<Identity>> {
    let span = tracing::info_span!(
        "docs.query",
        collection = role.collection(),
        operation = "find_one"
    );
    let document = docs
        .find_one(role.collection(), &doc(&[("phone", json!(phone))]))
        .instrument(span)
        .await
        .context("failed to look up identity by phone")?;
    document
        .map(|document| Identity::from_document(role, document))
        .transpose()
}

pub(crate) async fn find_by_username(
    docs: &dyn DocumentStore,
    username: &str,
) -> Result<Option<Identity>> {
    let span = tracing::info_span!("docs.query", collection = "admins", operation = "find_one");
    let document = docs
        .find_one("admins", &doc(&[("username", json!(username))]))
        .instrument(span)
        .await
        .context("failed to look up admin by username")?;
    document
        .map(|document| Identity::from_document(Role::Admin, document))
        .transpose()
}

pub(crate) async fn find_by_id(
    docs: &dyn DocumentStore,
    role: Role,
    id: &str,
) -> Result<Option<Identity>> {
    let span = tracing::info_span!(
        "docs.query",
        collection = role.collection(),
        operation = "find_one"
    );
    let document = docs
        .find_one(role.collection(), &doc(&[("_id", json!(id))]))
        .instrument(span)
        .await
        .context("failed to look up identity by id")?;
    document
        .map(|document| Identity::from_document(role, document))
        .transpose()
}

/// First-contact identity created when an unknown phone verifies an OTP.
pub(crate) async fn create_incomplete(
    docs: &dyn DocumentStore,
    role: Role,
    phone: &str,
    language: &str,
) -> Result<Identity> {
    let document = doc(&[
        ("phone", json!(phone)),
        ("role", json!(role.as_str())),
        ("status", json!(AccountStatus::Incomplete.as_str())),
        ("phone_verified", json!(true)),
        ("account_verified", json!(false)),
        ("preferred_languages", json!([language])),
        ("created_at", json!(Utc::now().to_rfc3339())),
    ]);
    let span = tracing::info_span!(
        "docs.query",
        collection = role.collection(),
        operation = "insert_one"
    );
    let id = docs
        .insert_one(role.collection(), document)
        .instrument(span)
        .await
        .context("failed to create identity")?;
    find_by_id(docs, role, &id)
        .await?
        .context("identity vanished right after insert")
}

pub(crate) async fn update_fields(
    docs: &dyn DocumentStore,
    role: Role,
    id: &str,
    mut fields: Document,
) -> Result<()> {
    fields.insert("updated_at".to_string(), json!(Utc::now().to_rfc3339()));
    let span = tracing::info_span!(
        "docs.query",
        collection = role.collection(),
        operation = "update_one"
    );
    let modified = docs
        .update_one(role.collection(), &doc(&[("_id", json!(id))]), &fields)
        .instrument(span)
        .await
        .context("failed to update identity")?;
    if modified == 0 {
        bail!("identity {id} not found during update");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryDocumentStore;

    #[test]
    fn from_document_requires_id() {
        let result = Identity::from_document(Role::User, doc(&[("phone", json!("+1555"))]));
        assert!(result.is_err());
    }

    #[test]
    fn from_document_rejects_unknown_status() {
        let document = doc(&[("_id", json!("u1")), ("status", json!("weird"))]);
        assert!(Identity::from_document(Role::User, document).is_err());
    }

    #[test]
    fn missing_status_defaults_to_incomplete() -> Result<()> {
        let identity = Identity::from_document(Role::User, doc(&[("_id", json!("u1"))]))?;
        assert_eq!(identity.status, AccountStatus::Incomplete);
        Ok(())
    }

    #[test]
    fn snapshot_is_role_tagged() -> Result<()> {
        let vendor = Identity::from_document(
            Role::Vendor,
            doc(&[
                ("_id", json!("v1")),
                ("status", json!("active")),
                ("business_name", json!("Cafe Naderi")),
                ("business_category_ids", json!(["c1", "c2"])),
            ]),
        )?;
        match vendor.snapshot() {
            Some(ProfileSnapshot::Vendor(profile)) => {
                assert_eq!(profile.business_name.as_deref(), Some("Cafe Naderi"));
                assert_eq!(profile.business_category_ids, vec!["c1", "c2"]);
            }
            other => panic!("expected vendor snapshot, got {other:?}"),
        }

        let admin =
            Identity::from_document(Role::Admin, doc(&[("_id", json!("a1")), ("status", json!("active"))]))?;
        assert!(admin.snapshot().is_none());
        Ok(())
    }

    #[test]
    fn has_field_ignores_blank_strings() -> Result<()> {
        let identity = Identity::from_document(
            Role::Vendor,
            doc(&[("_id", json!("v1")), ("city", json!("  "))]),
        )?;
        assert!(!identity.has_field("city"));
        assert!(!identity.has_field("province"));
        Ok(())
    }

    #[tokio::test]
    async fn create_and_find_round_trip() -> Result<()> {
        let docs = MemoryDocumentStore::new();
        let created = create_incomplete(&docs, Role::User, "+989121234567", "fa").await?;
        assert_eq!(created.status, AccountStatus::Incomplete);
        assert!(created.phone_verified);
        assert_eq!(created.preferred_languages, vec!["fa"]);

        let found = find_by_phone(&docs, Role::User, "+989121234567")
            .await?
            .context("identity not found")?;
        assert_eq!(found.id, created.id);

        update_fields(
            &docs,
            Role::User,
            &created.id,
            doc(&[("status", json!("active"))]),
        )
        .await?;
        let found = find_by_id(&docs, Role::User, &created.id)
            .await?
            .context("identity not found")?;
        assert_eq!(found.status, AccountStatus::Active);
        Ok(())
    }
}
