//! Admin review of pending vendors.

use anyhow::Context;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::audit::{self, AuditEvent};
use crate::error::AuthError;
use crate::identity::{self, AccountStatus, Role};
use crate::messages::get_message;
use crate::notify::{self, Notification};
use crate::rate_limit::{self, ADMIN_APPROVAL_TIERS};
use crate::session::SessionMetadata;
use crate::state::AuthState;
use crate::store::doc;
use crate::token::{Claims, IssuedTokens};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApprovalAction {
    Approve,
    Reject,
}

impl ApprovalAction {
    fn as_str(self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

#[derive(Debug)]
pub enum ApprovalOutcome {
    /// Vendor activated; their first full credentials ride along so the
    /// client waiting on approval can start a session immediately.
    Approved {
        tokens: IssuedTokens,
        message: String,
    },
    Rejected { message: String },
}

fn approval_limit_prefix(admin_id: &str) -> String {
    format!("approve_vendor_limit:{admin_id}")
}

/// Approve or reject a pending vendor.
///
/// Only `pending` vendors are reviewable; anything else is reported as
/// not found with nothing mutated. Rejection also purges any temp token
/// linkages still pointing at the vendor's phone, cutting off an
/// in-flight profile completion.
pub async fn review_vendor(
    state: &AuthState,
    admin_claims: &Claims,
    vendor_id: &str,
    action: ApprovalAction,
    client_ip: &str,
    language: &str,
) -> Result<ApprovalOutcome, AuthError> {
    if admin_claims.role != Role::Admin {
        return Err(AuthError::forbidden("admin.forbidden", language));
    }

    rate_limit::check_and_increment(
        state.kv(),
        &approval_limit_prefix(&admin_claims.sub),
        &ADMIN_APPROVAL_TIERS,
        None,
        language,
    )
    .await?;

    if Uuid::parse_str(vendor_id).is_err() {
        return Err(AuthError::bad_request("admin.invalid_vendor_id", language));
    }

    let vendor = identity::find_by_id(state.docs(), Role::Vendor, vendor_id).await?;
    let Some(vendor) = vendor.filter(|vendor| vendor.status == AccountStatus::Pending) else {
        return Err(AuthError::not_found("admin.vendor.not_pending", language));
    };

    let outcome = match action {
        ApprovalAction::Reject => {
            identity::update_fields(
                state.docs(),
                Role::Vendor,
                &vendor.id,
                doc(&[("status", json!(AccountStatus::Rejected.as_str()))]),
            )
            .await?;
            purge_temp_linkages(state, vendor.phone.as_deref()).await?;

            notify::dispatch(
                state.notifier(),
                Notification {
                    receiver_id: vendor.id.clone(),
                    receiver_type: "vendor".to_string(),
                    template_key: "vendor_rejected".to_string(),
                    variables: json!({}),
                    reference_type: "vendor_review".to_string(),
                    reference_id: vendor.id.clone(),
                    language: language.to_string(),
                },
            )
            .await;

            ApprovalOutcome::Rejected {
                message: get_message("admin.vendor.rejected", language),
            }
        }
        ApprovalAction::Approve => {
            identity::update_fields(
                state.docs(),
                Role::Vendor,
                &vendor.id,
                doc(&[
                    ("status", json!(AccountStatus::Active.as_str())),
                    ("account_verified", json!(true)),
                ]),
            )
            .await?;
            let vendor = identity::find_by_id(state.docs(), Role::Vendor, &vendor.id)
                .await?
                .context("vendor vanished during approval")?;

            let tokens = state
                .establish_session(&vendor, &SessionMetadata::default(), language)
                .await?;

            notify::dispatch(
                state.notifier(),
                Notification {
                    receiver_id: vendor.id.clone(),
                    receiver_type: "vendor".to_string(),
                    template_key: "vendor_approved".to_string(),
                    variables: json!({}),
                    reference_type: "vendor_review".to_string(),
                    reference_id: vendor.id.clone(),
                    language: language.to_string(),
                },
            )
            .await;

            ApprovalOutcome::Approved {
                tokens,
                message: get_message("admin.vendor.approved", language),
            }
        }
    };

    let resulting_status = match action {
        ApprovalAction::Approve => "active",
        ApprovalAction::Reject => "rejected",
    };
    audit::record(
        state.docs(),
        AuditEvent {
            action: "vendor.reviewed",
            actor_id: &admin_claims.sub,
            actor_role: "admin",
            target_id: Some(vendor_id),
            client_ip: Some(client_ip),
            detail: json!({
                "action": action.as_str(),
                "resulting_status": resulting_status,
            }),
        },
    )
    .await;
    info!(
        admin_id = admin_claims.sub,
        vendor_id,
        action = action.as_str(),
        "vendor review completed"
    );

    Ok(outcome)
}

/// Delete every `temp_token:{jti}` linkage whose value is the vendor's
/// phone. Runs on rejection so a live temp token cannot finish a
/// profile for a vendor that was just turned down.
async fn purge_temp_linkages(state: &AuthState, phone: Option<&str>) -> Result<(), AuthError> {
    let Some(phone) = phone else {
        return Ok(());
    };
    let keys = state
        .kv()
        .scan_keys("temp_token:*")
        .await
        .context("failed to scan temp token linkages")?;
    for key in keys {
        let value = state
            .kv()
            .get(&key)
            .await
            .context("failed to read temp token linkage")?;
        if value.as_deref() == Some(phone) {
            state
                .kv()
                .delete(&key)
                .await
                .context("failed to purge temp token linkage")?;
        }
    }
    Ok(())
}
