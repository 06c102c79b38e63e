//! Logout family: single session, everything, admin force-logout, and
//! account deletion requests.

use anyhow::Context;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};

use crate::audit::{self, AuditEvent};
use crate::error::AuthError;
use crate::identity::{self, AccountStatus, Role};
use crate::notify::{self, Notification};
use crate::session::{SessionFilter, SessionRecord};
use crate::state::AuthState;
use crate::store::doc;
use crate::token::{Claims, RevocationSummary, TokenType, refresh_marker_key};

/// End the caller's current session. Idempotent: revoking an already
/// revoked credential or deleting a missing session is fine.
pub async fn logout(
    state: &AuthState,
    access_claims: &Claims,
    refresh_token: Option<&str>,
    client_ip: &str,
    language: &str,
) -> Result<(), AuthError> {
    let remaining = access_claims.exp - Utc::now().timestamp();
    state
        .tokens()
        .revoke(&access_claims.jti, remaining)
        .await
        .context("failed to blacklist access token")?;

    if let Some(session_id) = &access_claims.session_id {
        state
            .sessions()
            .delete(&access_claims.sub, session_id)
            .await
            .context("failed to delete session")?;
    }

    // Retire a presented refresh token without reuse side effects; a
    // token that no longer parses is simply ignored.
    if let Some(refresh_token) = refresh_token {
        match state
            .tokens()
            .decode_claims_only(refresh_token, TokenType::Refresh, language)
        {
            Ok(refresh_claims) if refresh_claims.sub == access_claims.sub => {
                let remaining = refresh_claims.exp - Utc::now().timestamp();
                state
                    .tokens()
                    .revoke(&refresh_claims.jti, remaining)
                    .await
                    .context("failed to blacklist refresh token")?;
                state
                    .kv()
                    .delete(&refresh_marker_key(&refresh_claims.sub, &refresh_claims.jti))
                    .await
                    .context("failed to delete refresh marker")?;
            }
            Ok(_) | Err(_) => {
                debug!("ignoring foreign or unparseable refresh token at logout");
            }
        }
    }

    audit::record(
        state.docs(),
        AuditEvent {
            action: "logout",
            actor_id: &access_claims.sub,
            actor_role: access_claims.role.as_str(),
            target_id: None,
            client_ip: Some(client_ip),
            detail: json!({ "session_id": access_claims.session_id }),
        },
    )
    .await;
    info!(user_id = access_claims.sub, "logout completed");
    Ok(())
}

/// End every session and refresh token the caller holds.
pub async fn logout_all(
    state: &AuthState,
    access_claims: &Claims,
    client_ip: &str,
) -> Result<RevocationSummary, AuthError> {
    let summary = state
        .tokens()
        .revoke_all_for_user(&access_claims.sub)
        .await
        .context("failed to revoke all credentials")?;

    audit::record(
        state.docs(),
        AuditEvent {
            action: "logout.all",
            actor_id: &access_claims.sub,
            actor_role: access_claims.role.as_str(),
            target_id: None,
            client_ip: Some(client_ip),
            detail: json!({
                "sessions_revoked": summary.sessions_revoked,
                "refresh_tokens_revoked": summary.refresh_tokens_revoked,
            }),
        },
    )
    .await;
    Ok(summary)
}

/// Admin-only: end every credential a target user holds.
///
/// # Errors
///
/// `Forbidden` for non-admin callers, `NotFound` when the target had
/// nothing to revoke.
pub async fn force_logout(
    state: &AuthState,
    admin_claims: &Claims,
    target_user_id: &str,
    client_ip: &str,
    language: &str,
) -> Result<RevocationSummary, AuthError> {
    if admin_claims.role != Role::Admin {
        return Err(AuthError::forbidden("admin.forbidden", language));
    }

    let summary = state
        .tokens()
        .revoke_all_for_user(target_user_id)
        .await
        .context("failed to revoke target credentials")?;
    if summary.is_empty() {
        return Err(AuthError::not_found("session.none", language));
    }

    audit::record(
        state.docs(),
        AuditEvent {
            action: "logout.forced",
            actor_id: &admin_claims.sub,
            actor_role: "admin",
            target_id: Some(target_user_id),
            client_ip: Some(client_ip),
            detail: json!({
                "sessions_revoked": summary.sessions_revoked,
                "refresh_tokens_revoked": summary.refresh_tokens_revoked,
            }),
        },
    )
    .await;
    info!(
        admin_id = admin_claims.sub,
        target_user_id, "forced logout completed"
    );
    Ok(summary)
}

/// Mark the caller's account for deletion and end all their sessions.
pub async fn request_account_deletion(
    state: &AuthState,
    access_claims: &Claims,
    client_ip: &str,
    language: &str,
) -> Result<(), AuthError> {
    let Some(identity) =
        identity::find_by_id(state.docs(), access_claims.role, &access_claims.sub).await?
    else {
        return Err(AuthError::unauthorized("token.invalid", language));
    };

    identity::update_fields(
        state.docs(),
        identity.role,
        &identity.id,
        doc(&[("status", json!(AccountStatus::PendingDeletion.as_str()))]),
    )
    .await?;
    state
        .tokens()
        .revoke_all_for_user(&identity.id)
        .await
        .context("failed to revoke credentials for deletion request")?;

    notify::dispatch(
        state.notifier(),
        Notification {
            receiver_id: identity.id.clone(),
            receiver_type: identity.role.as_str().to_string(),
            template_key: "account_deletion_requested".to_string(),
            variables: json!({}),
            reference_type: "account".to_string(),
            reference_id: identity.id.clone(),
            language: language.to_string(),
        },
    )
    .await;

    audit::record(
        state.docs(),
        AuditEvent {
            action: "account.deletion_requested",
            actor_id: &identity.id,
            actor_role: identity.role.as_str(),
            target_id: None,
            client_ip: Some(client_ip),
            detail: json!({}),
        },
    )
    .await;
    info!(user_id = identity.id, "account deletion requested");
    Ok(())
}

/// List the caller's sessions. Read-only; does not touch `last_seen_at`.
pub async fn list_sessions(
    state: &AuthState,
    access_claims: &Claims,
    filter: SessionFilter,
) -> Result<Vec<SessionRecord>, AuthError> {
    let records = state
        .sessions()
        .list(&access_claims.sub, filter)
        .await
        .context("failed to list sessions")?;
    Ok(records)
}
