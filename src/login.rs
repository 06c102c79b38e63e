//! Username/password and phone/password login with brute-force lockout.
//!
//! The lockout counter is keyed by (client ip, identifier) and only
//! moves on failed credential checks; success clears it. Phone
//! identifiers resolve users first, then vendors; usernames are admins.

use anyhow::Context;
use serde_json::json;
use tracing::info;

use crate::audit::{self, AuditEvent};
use crate::error::AuthError;
use crate::identity::{self, AccountStatus, Identity};
use crate::session::SessionMetadata;
use crate::state::AuthState;
use crate::token::IssuedTokens;

/// Exactly one identifier per login attempt, by construction.
#[derive(Clone, Debug)]
pub enum LoginIdentifier {
    Phone(String),
    Username(String),
}

impl LoginIdentifier {
    fn normalized(&self) -> String {
        match self {
            Self::Phone(phone) => phone.trim().to_string(),
            Self::Username(username) => username.trim().to_lowercase(),
        }
    }
}

fn attempt_key(client_ip: &str, identifier: &str) -> String {
    format!("login:attempt:{client_ip}:{identifier}")
}

/// Authenticate with a password and issue full credentials.
///
/// # Errors
///
/// `TooManyRequests` once the lockout is hit, `Unauthorized` for any
/// credential failure (identical for unknown identifier and wrong
/// password), `Forbidden` for non-active accounts.
pub async fn login(
    state: &AuthState,
    identifier: &LoginIdentifier,
    password: &str,
    client_ip: &str,
    user_agent: Option<&str>,
    language: &str,
) -> Result<IssuedTokens, AuthError> {
    let normalized = identifier.normalized();
    let attempt_key = attempt_key(client_ip, &normalized);

    let attempts: i64 = state
        .kv()
        .get(&attempt_key)
        .await
        .context("login attempt lookup failed")?
        .and_then(|value| value.parse().ok())
        .unwrap_or(0);
    if attempts >= state.config().login_max_attempts() {
        return Err(AuthError::too_many_requests(
            "auth.login.too_many_attempts",
            language,
        ));
    }

    let identity = lookup(state, identifier, &normalized).await?;

    let Some(identity) = identity else {
        record_failure(state, &attempt_key).await?;
        return Err(AuthError::unauthorized("auth.login.invalid", language));
    };

    let Some(password_hash) = identity.password_hash.clone() else {
        record_failure(state, &attempt_key).await?;
        return Err(AuthError::unauthorized("auth.login.no_password", language));
    };

    if !state.passwords().verify(password, &password_hash) {
        record_failure(state, &attempt_key).await?;
        return Err(AuthError::unauthorized("auth.login.invalid", language));
    }

    if identity.status != AccountStatus::Active {
        return Err(AuthError::forbidden("auth.login.not_active", language));
    }

    state
        .kv()
        .delete(&attempt_key)
        .await
        .context("failed to clear login attempts")?;

    let metadata = SessionMetadata {
        ip: Some(client_ip.to_string()),
        user_agent: user_agent.map(ToString::to_string),
        ..SessionMetadata::default()
    };
    let tokens = state.establish_session(&identity, &metadata, language).await?;

    audit::record(
        state.docs(),
        AuditEvent {
            action: "login.password",
            actor_id: &identity.id,
            actor_role: identity.role.as_str(),
            target_id: None,
            client_ip: Some(client_ip),
            detail: json!({}),
        },
    )
    .await;
    info!(
        user_id = identity.id,
        role = identity.role.as_str(),
        "password login completed"
    );

    Ok(tokens)
}

async fn lookup(
    state: &AuthState,
    identifier: &LoginIdentifier,
    normalized: &str,
) -> Result<Option<Identity>, AuthError> {
    let identity = match identifier {
        LoginIdentifier::Phone(_) => {
            match identity::find_by_phone(state.docs(), crate::identity::Role::User, normalized)
                .await?
            {
                Some(identity) => Some(identity),
                None => {
                    identity::find_by_phone(
                        state.docs(),
                        crate::identity::Role::Vendor,
                        normalized,
                    )
                    .await?
                }
            }
        }
        LoginIdentifier::Username(_) => {
            identity::find_by_username(state.docs(), normalized).await?
        }
    };
    Ok(identity)
}

async fn record_failure(state: &AuthState, attempt_key: &str) -> Result<(), AuthError> {
    state
        .kv()
        .incr(attempt_key)
        .await
        .context("failed to count login attempt")?;
    state
        .kv()
        .expire(attempt_key, state.config().login_lockout_seconds())
        .await
        .context("failed to set login lockout window")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::LoginIdentifier;

    #[test]
    fn usernames_normalize_to_lowercase() {
        let identifier = LoginIdentifier::Username("  Admin01 ".to_string());
        assert_eq!(identifier.normalized(), "admin01");
    }

    #[test]
    fn phones_only_trim() {
        let identifier = LoginIdentifier::Phone(" +989121234567 ".to_string());
        assert_eq!(identifier.normalized(), "+989121234567");
    }
}
