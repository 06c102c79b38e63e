//! Profile completion: the `incomplete -> active | pending` state machine.
//!
//! Users activate themselves once their name fields are in. Vendors
//! accumulate fields across submissions and flip to `pending` only when
//! every required field is present; an admin approval makes them
//! active. Status never moves backwards here: anything but
//! `incomplete`/`pending` is rejected up front.

use anyhow::Context;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::audit::{self, AuditEvent};
use crate::error::AuthError;
use crate::identity::{self, AccountStatus, Identity, Role};
use crate::messages::{get_message, get_message_with};
use crate::notify::{self, Notification};
use crate::scopes::scopes_for;
use crate::session::SessionMetadata;
use crate::state::AuthState;
use crate::store::{Document, doc};
use crate::token::{IssuedTokens, TokenType, temp_link_key};
use uuid::Uuid;

const VENDOR_REQUIRED_FIELDS: [&str; 6] = [
    "business_name",
    "city",
    "province",
    "location",
    "address",
    "business_category_ids",
];

const USER_REQUIRED_FIELDS: [&str; 2] = ["first_name", "last_name"];

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProfileSubmission {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub profile_picture: Option<String>,
    pub business_name: Option<String>,
    pub city: Option<String>,
    pub province: Option<String>,
    pub location: Option<String>,
    pub address: Option<String>,
    pub business_category_ids: Option<Vec<String>>,
}

impl ProfileSubmission {
    fn vendor_only_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.business_name.is_some() {
            fields.push("business_name");
        }
        if self.city.is_some() {
            fields.push("city");
        }
        if self.province.is_some() {
            fields.push("province");
        }
        if self.location.is_some() {
            fields.push("location");
        }
        if self.address.is_some() {
            fields.push("address");
        }
        if self.business_category_ids.is_some() {
            fields.push("business_category_ids");
        }
        fields
    }

    fn field_value(&self, name: &str) -> Option<Value> {
        let text = |value: &Option<String>| value.clone().map(Value::String);
        match name {
            "first_name" => text(&self.first_name),
            "last_name" => text(&self.last_name),
            "email" => text(&self.email),
            "profile_picture" => text(&self.profile_picture),
            "business_name" => text(&self.business_name),
            "city" => text(&self.city),
            "province" => text(&self.province),
            "location" => text(&self.location),
            "address" => text(&self.address),
            "business_category_ids" => self
                .business_category_ids
                .clone()
                .map(|ids| json!(ids)),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum CompletionOutcome {
    /// User profile done; full credentials issued.
    Activated {
        tokens: IssuedTokens,
        message: String,
    },
    /// Vendor profile done and queued for review. Access token only;
    /// refresh and session arrive with approval.
    PendingReview {
        access_token: String,
        expires_in: i64,
        message: String,
    },
    /// Vendor submitted a partial profile; fields were merged and a
    /// fresh temp token issued for the next submission.
    StillIncomplete {
        temp_token: String,
        expires_in: i64,
        missing: Vec<&'static str>,
    },
}

/// Apply a profile submission under a temp token.
#[allow(clippy::too_many_lines)]
pub async fn complete_profile(
    state: &AuthState,
    temp_token: &str,
    submission: &ProfileSubmission,
    client_ip: &str,
    language: &str,
) -> Result<CompletionOutcome, AuthError> {
    let claims = state.tokens().decode(temp_token, TokenType::Temp, language).await?;
    let Some(phone) = claims.phone.clone() else {
        return Err(AuthError::unauthorized("token.invalid", language));
    };
    let role = claims.role;

    let link = state
        .kv()
        .get(&temp_link_key(&claims.jti))
        .await
        .context("temp token linkage lookup failed")?;
    if link.as_deref() != Some(phone.as_str()) {
        return Err(AuthError::unauthorized("token.invalid", language));
    }

    let Some(identity) = identity::find_by_phone(state.docs(), role, &phone).await? else {
        return Err(AuthError::bad_request("profile.not_eligible", language));
    };
    if !matches!(
        identity.status,
        AccountStatus::Incomplete | AccountStatus::Pending
    ) {
        // Monotonic: an active (or blocked) identity never re-enters
        // profile completion.
        return Err(AuthError::bad_request("profile.not_eligible", language));
    }

    match role {
        Role::User => {
            complete_user(state, &claims.jti, &identity, submission, client_ip, language).await
        }
        Role::Vendor => {
            complete_vendor(state, &claims.jti, &identity, submission, client_ip, language).await
        }
        Role::Admin => Err(AuthError::forbidden("admin.forbidden", language)),
    }
}

async fn complete_user(
    state: &AuthState,
    temp_jti: &str,
    identity: &Identity,
    submission: &ProfileSubmission,
    client_ip: &str,
    language: &str,
) -> Result<CompletionOutcome, AuthError> {
    let vendor_fields = submission.vendor_only_fields();
    if !vendor_fields.is_empty() {
        return Err(AuthError::forbidden("profile.forbidden_fields", language));
    }

    let missing: Vec<&str> = USER_REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| submission.field_value(field).is_none() && !identity.has_field(field))
        .collect();
    if !missing.is_empty() {
        return Err(AuthError::BadRequest {
            message: get_message_with(
                "profile.missing_fields",
                language,
                &[("fields", missing.join(", ").as_str())],
            ),
        });
    }

    let mut fields = submitted_fields(submission, &["first_name", "last_name", "email", "profile_picture"]);
    fields.insert("status".to_string(), json!(AccountStatus::Active.as_str()));
    identity::update_fields(state.docs(), Role::User, &identity.id, fields).await?;

    consume_linkage(state, temp_jti).await?;

    let identity = reload(state, Role::User, &identity.id).await?;
    let metadata = SessionMetadata {
        ip: Some(client_ip.to_string()),
        ..SessionMetadata::default()
    };
    let tokens = state.establish_session(&identity, &metadata, language).await?;

    notify::dispatch(
        state.notifier(),
        Notification {
            receiver_id: identity.id.clone(),
            receiver_type: "user".to_string(),
            template_key: "profile_completed".to_string(),
            variables: json!({}),
            reference_type: "profile".to_string(),
            reference_id: identity.id.clone(),
            language: language.to_string(),
        },
    )
    .await;
    notify_admins(state, "user_activated", &identity.id, language).await;

    audit::record(
        state.docs(),
        AuditEvent {
            action: "profile.completed",
            actor_id: &identity.id,
            actor_role: "user",
            target_id: None,
            client_ip: Some(client_ip),
            detail: json!({ "status": "active" }),
        },
    )
    .await;
    info!(user_id = identity.id, "user profile completed and activated");

    Ok(CompletionOutcome::Activated {
        tokens,
        message: get_message("profile.completed", language),
    })
}

#[allow(clippy::too_many_lines)]
async fn complete_vendor(
    state: &AuthState,
    temp_jti: &str,
    identity: &Identity,
    submission: &ProfileSubmission,
    client_ip: &str,
    language: &str,
) -> Result<CompletionOutcome, AuthError> {
    let has_business_name =
        submission.business_name.is_some() || identity.has_field("business_name");
    if !has_business_name {
        return Err(AuthError::bad_request("vendor.not_eligible", language));
    }

    if let Some(category_ids) = &submission.business_category_ids {
        let mut invalid = Vec::new();
        for id in category_ids {
            let found = state
                .docs()
                .find_one("business_categories", &doc(&[("_id", json!(id))]))
                .await
                .context("business category lookup failed")?;
            if found.is_none() {
                invalid.push(id.clone());
            }
        }
        if !invalid.is_empty() {
            // Nothing persisted on category failure.
            return Err(AuthError::BadRequest {
                message: get_message_with(
                    "profile.invalid_categories",
                    language,
                    &[("ids", invalid.join(", ").as_str())],
                ),
            });
        }
    }

    let missing: Vec<&'static str> = VENDOR_REQUIRED_FIELDS
        .iter()
        .copied()
        .filter(|field| submission.field_value(field).is_none() && !identity.has_field(field))
        .collect();

    let mut fields = submitted_fields(
        submission,
        &[
            "business_name",
            "city",
            "province",
            "location",
            "address",
            "business_category_ids",
            "email",
            "profile_picture",
        ],
    );

    let was_incomplete = identity.status == AccountStatus::Incomplete;
    if missing.is_empty() {
        fields.insert("status".to_string(), json!(AccountStatus::Pending.as_str()));
    }
    identity::update_fields(state.docs(), Role::Vendor, &identity.id, fields).await?;
    consume_linkage(state, temp_jti).await?;

    let identity = reload(state, Role::Vendor, &identity.id).await?;

    if missing.is_empty() {
        state.sessions().delete_inactive(&identity.id).await.map_err(AuthError::Internal)?;
        let session_id = Uuid::new_v4().to_string();
        let (access_token, _jti) = state
            .tokens()
            .issue_access(
                &identity.id,
                Role::Vendor,
                identity.status,
                &session_id,
                scopes_for(Role::Vendor, identity.status),
                identity.snapshot(),
                language,
            )
            .await?;

        notify::dispatch(
            state.notifier(),
            Notification {
                receiver_id: identity.id.clone(),
                receiver_type: "vendor".to_string(),
                template_key: "profile_pending_review".to_string(),
                variables: json!({}),
                reference_type: "profile".to_string(),
                reference_id: identity.id.clone(),
                language: language.to_string(),
            },
        )
        .await;
        // Admins hear about a vendor exactly once, on the transition
        // into pending.
        if was_incomplete {
            notify_admins(state, "vendor_pending_review", &identity.id, language).await;
        }

        audit::record(
            state.docs(),
            AuditEvent {
                action: "profile.completed",
                actor_id: &identity.id,
                actor_role: "vendor",
                target_id: None,
                client_ip: Some(client_ip),
                detail: json!({ "status": "pending" }),
            },
        )
        .await;
        info!(vendor_id = identity.id, "vendor profile complete, awaiting review");

        return Ok(CompletionOutcome::PendingReview {
            access_token,
            expires_in: state.config().access_ttl_seconds(),
            message: get_message("profile.pending_review", language),
        });
    }

    // Partial submission: fields merged, a fresh temp token replaces
    // the consumed one.
    let phone = identity
        .phone
        .clone()
        .context("vendor identity has no phone")?;
    let ttl = state.config().profile_temp_ttl_seconds();
    let (temp_token, _jti) = state
        .tokens()
        .issue_temp(&phone, Role::Vendor, identity.status, true, ttl, language)
        .await?;

    audit::record(
        state.docs(),
        AuditEvent {
            action: "profile.updated",
            actor_id: &identity.id,
            actor_role: "vendor",
            target_id: None,
            client_ip: Some(client_ip),
            detail: json!({ "missing": missing }),
        },
    )
    .await;

    Ok(CompletionOutcome::StillIncomplete {
        temp_token,
        expires_in: ttl,
        missing,
    })
}

fn submitted_fields(submission: &ProfileSubmission, allowed: &[&str]) -> Document {
    let mut fields = Document::new();
    for name in allowed {
        if let Some(value) = submission.field_value(name) {
            fields.insert((*name).to_string(), value);
        }
    }
    fields
}

async fn consume_linkage(state: &AuthState, temp_jti: &str) -> Result<(), AuthError> {
    state
        .kv()
        .delete(&temp_link_key(temp_jti))
        .await
        .context("failed to consume temp linkage")?;
    Ok(())
}

async fn reload(state: &AuthState, role: Role, id: &str) -> Result<Identity, AuthError> {
    Ok(identity::find_by_id(state.docs(), role, id)
        .await?
        .context("identity vanished during profile completion")?)
}

async fn notify_admins(state: &AuthState, template_key: &str, reference_id: &str, language: &str) {
    notify::dispatch(
        state.notifier(),
        Notification {
            receiver_id: "admins".to_string(),
            receiver_type: "admin_channel".to_string(),
            template_key: template_key.to_string(),
            variables: json!({}),
            reference_type: "profile".to_string(),
            reference_id: reference_id.to_string(),
            language: language.to_string(),
        },
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::ProfileSubmission;

    #[test]
    fn vendor_only_fields_are_detected() {
        let submission = ProfileSubmission {
            first_name: Some("Sara".to_string()),
            business_name: Some("Cafe".to_string()),
            city: Some("Tehran".to_string()),
            ..ProfileSubmission::default()
        };
        assert_eq!(submission.vendor_only_fields(), vec!["business_name", "city"]);

        let user_only = ProfileSubmission {
            first_name: Some("Sara".to_string()),
            last_name: Some("Ahmadi".to_string()),
            ..ProfileSubmission::default()
        };
        assert!(user_only.vendor_only_fields().is_empty());
    }

    #[test]
    fn field_values_serialize_categories_as_arrays() {
        let submission = ProfileSubmission {
            business_category_ids: Some(vec!["c1".to_string(), "c2".to_string()]),
            ..ProfileSubmission::default()
        };
        let value = submission.field_value("business_category_ids");
        assert_eq!(value, Some(serde_json::json!(["c1", "c2"])));
        assert_eq!(submission.field_value("unknown"), None);
    }
}
