//! Refresh token rotation.
//!
//! Every rotation retires the presented token before its replacement is
//! signed: the marker is deleted and the jti blacklisted first, so a
//! crash between the two steps costs the user a login instead of
//! leaving a live duplicate.

use anyhow::Context;
use chrono::Utc;
use serde_json::json;
use tracing::info;

use crate::audit::{self, AuditEvent};
use crate::error::AuthError;
use crate::identity::{self, AccountStatus};
use crate::scopes::scopes_for;
use crate::state::AuthState;
use crate::token::{IssuedTokens, TokenType, refresh_marker_key};

/// Rotate a refresh token into a fresh access/refresh pair.
///
/// Reuse of an already-rotated token is detected inside decode and ends
/// every session the user holds.
pub async fn rotate(
    state: &AuthState,
    refresh_token: &str,
    client_ip: &str,
    user_agent: Option<&str>,
    language: &str,
) -> Result<IssuedTokens, AuthError> {
    let claims = state
        .tokens()
        .decode(refresh_token, TokenType::Refresh, language)
        .await?;
    let user_id = claims.sub.clone();
    let Some(session_id) = claims.session_id.clone() else {
        return Err(AuthError::unauthorized("token.invalid", language));
    };

    // Retire the old token before anything new exists.
    let remaining = claims.exp - Utc::now().timestamp();
    state
        .tokens()
        .revoke(&claims.jti, remaining)
        .await
        .context("failed to blacklist rotated refresh token")?;
    state
        .kv()
        .delete(&refresh_marker_key(&user_id, &claims.jti))
        .await
        .context("failed to delete rotated refresh marker")?;

    // Fresh snapshot and status; a block since issuance must stick.
    let Some(identity) = identity::find_by_id(state.docs(), claims.role, &user_id).await? else {
        return Err(AuthError::unauthorized("token.invalid", language));
    };
    if identity.status != AccountStatus::Active {
        return Err(AuthError::forbidden("account.not_active", language));
    }

    let (access_token, access_jti) = state
        .tokens()
        .issue_access(
            &identity.id,
            identity.role,
            identity.status,
            &session_id,
            scopes_for(identity.role, identity.status),
            identity.snapshot(),
            language,
        )
        .await?;
    let (new_refresh, _jti) = state
        .tokens()
        .issue_refresh(&identity.id, identity.role, &session_id, language)
        .await?;

    let mut updates: Vec<(&str, String)> = vec![
        ("last_refreshed", Utc::now().to_rfc3339()),
        ("ip", client_ip.to_string()),
        ("jti", access_jti),
    ];
    if let Some(user_agent) = user_agent {
        updates.push(("user_agent", user_agent.to_string()));
    }
    state
        .sessions()
        .touch(&identity.id, &session_id, &updates)
        .await
        .context("failed to touch session during rotation")?;

    audit::record(
        state.docs(),
        AuditEvent {
            action: "token.refreshed",
            actor_id: &identity.id,
            actor_role: identity.role.as_str(),
            target_id: None,
            client_ip: Some(client_ip),
            detail: json!({ "session_id": session_id }),
        },
    )
    .await;
    info!(user_id = identity.id, session_id, "refresh token rotated");

    Ok(IssuedTokens {
        access_token,
        refresh_token: new_refresh,
        token_type: "bearer",
        expires_in: state.config().access_ttl_seconds(),
        role: identity.role,
    })
}
