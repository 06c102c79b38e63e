//! Phone OTP flow: challenge issuance and verification.
//!
//! A challenge stores only the salted SHA-256 of the code, never the
//! code itself, and pairs it with a temp token whose `jti` linkage
//! makes the token single-use. At most one challenge is live per
//! (role, phone); a re-request overwrites the previous hash.
//!
//! Code comparison is plain equality over hex digests. The digest step
//! already decouples timing from the submitted code, and the attempt
//! cap bounds the number of guesses.

use anyhow::Context;
use rand::{Rng, rngs::OsRng};
use regex::Regex;
use serde_json::json;
use sha2::{Digest, Sha256};
use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::audit::{self, AuditEvent};
use crate::config::Environment;
use crate::error::AuthError;
use crate::identity::{self, AccountStatus, Identity, Role};
use crate::messages::{get_message, get_message_with};
use crate::notify::{self, Notification};
use crate::rate_limit::{self, OTP_BLOCK, OTP_TIERS};
use crate::session::SessionMetadata;
use crate::state::AuthState;
use crate::store::Document;
use crate::token::{IssuedTokens, TokenType, temp_link_key};

fn otp_key(role: Role, phone: &str) -> String {
    format!("otp:{}:{phone}", role.as_str())
}

fn limit_prefix(role: Role, phone: &str) -> String {
    format!("otp-limit:{}:{phone}", role.as_str())
}

fn attempts_key(role: Role, phone: &str) -> String {
    format!("otp-attempts:{}:{phone}", role.as_str())
}

fn blocked_key(role: Role, phone: &str) -> String {
    format!("otp-blocked:{}:{phone}", role.as_str())
}

/// E.164 check on an already-trimmed phone number.
fn valid_phone(phone: &str) -> bool {
    Regex::new(r"^\+[1-9]\d{9,14}$").is_ok_and(|regex| regex.is_match(phone))
}

fn hash_code(salt: &str, code: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(code.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug)]
pub struct OtpChallenge {
    pub temp_token: String,
    pub expires_in: i64,
    pub notification_sent: bool,
    pub message: String,
}

/// What a correct code unlocks depends on where the identity stands.
#[derive(Debug)]
pub enum OtpVerification {
    /// Active identity: full credentials and a fresh session.
    Active { tokens: IssuedTokens },
    /// Identity exists but has no completed profile yet.
    ProfileIncomplete {
        temp_token: String,
        expires_in: i64,
        next_action: &'static str,
    },
    /// Vendor profile submitted, still waiting on an admin.
    PendingApproval {
        temp_token: String,
        expires_in: i64,
        next_action: &'static str,
    },
}

/// Issue an OTP challenge for `phone` acting as `role`.
///
/// # Errors
///
/// `BadRequest` for a malformed phone, `Forbidden` for the admin role
/// (admins authenticate with passwords), `TooManyRequests` when a tier
/// or block is hit, `Internal` when the store is unreachable.
pub async fn request(
    state: &AuthState,
    phone: &str,
    role: Role,
    purpose: &str,
    client_ip: &str,
    language: &str,
) -> Result<OtpChallenge, AuthError> {
    if role == Role::Admin {
        return Err(AuthError::forbidden("admin.forbidden", language));
    }
    let phone = phone.trim();
    if !valid_phone(phone) {
        return Err(AuthError::bad_request("phone.invalid", language));
    }

    let blocked = blocked_key(role, phone);
    rate_limit::check_block(state.kv(), &blocked, "otp.blocked", language).await?;
    rate_limit::check_and_increment(
        state.kv(),
        &limit_prefix(role, phone),
        &OTP_TIERS,
        Some((&blocked, OTP_BLOCK)),
        language,
    )
    .await?;

    let digits = u32::try_from(state.config().otp_length()).unwrap_or(6);
    let code: u32 = OsRng.gen_range(0..10u32.pow(digits));
    let code = format!("{code:0width$}", width = state.config().otp_length());
    let code_hash = hash_code(state.config().otp_salt().expose_secret(), &code);

    // Overwrites any live challenge: one OTP per (role, phone).
    state
        .kv()
        .set_ex(&otp_key(role, phone), &code_hash, state.config().otp_ttl_seconds())
        .await
        .context("failed to store otp hash")?;

    let existing = identity::find_by_phone(state.docs(), role, phone).await?;
    let status = existing.map_or(AccountStatus::Incomplete, |identity| identity.status);
    let (temp_token, _jti) = state
        .tokens()
        .issue_temp(
            phone,
            role,
            status,
            false,
            state.config().temp_ttl_seconds(),
            language,
        )
        .await?;

    let notification_sent = notify::dispatch(
        state.notifier(),
        Notification {
            receiver_id: phone.to_string(),
            receiver_type: role.as_str().to_string(),
            template_key: "otp_requested".to_string(),
            variables: json!({
                "code": code,
                "purpose": purpose,
                "ttl_seconds": state.config().otp_ttl_seconds(),
            }),
            reference_type: "otp".to_string(),
            reference_id: phone.to_string(),
            language: language.to_string(),
        },
    )
    .await;

    audit::record(
        state.docs(),
        AuditEvent {
            action: "otp.requested",
            actor_id: phone,
            actor_role: role.as_str(),
            target_id: None,
            client_ip: Some(client_ip),
            detail: json!({
                "purpose": purpose,
                "notification_sent": notification_sent,
            }),
        },
    )
    .await;

    if state.config().environment() == Environment::Development {
        debug!(phone, code, "otp challenge issued (development only)");
    } else {
        info!(phone, role = role.as_str(), "otp challenge issued");
    }

    Ok(OtpChallenge {
        temp_token,
        expires_in: state.config().temp_ttl_seconds(),
        notification_sent,
        message: get_message("otp.sent", language),
    })
}

/// Verify a submitted code against the live challenge.
///
/// A wrong code burns an attempt; the attempt cap deletes the challenge
/// and blocks the (role, phone). A correct code consumes the challenge
/// and the temp token linkage, then routes on account status.
#[allow(clippy::too_many_lines)]
pub async fn verify(
    state: &AuthState,
    temp_token: &str,
    code: &str,
    client_ip: &str,
    user_agent: Option<&str>,
    language: &str,
) -> Result<OtpVerification, AuthError> {
    let claims = state.tokens().decode(temp_token, TokenType::Temp, language).await?;
    let Some(phone) = claims.phone.clone() else {
        return Err(AuthError::unauthorized("token.invalid", language));
    };
    let role = claims.role;

    let blocked = blocked_key(role, &phone);
    rate_limit::check_block(state.kv(), &blocked, "otp.blocked", language).await?;

    // The jti linkage makes temp tokens single-use and phone-bound. A
    // consumed or expired linkage is a stale challenge; a linkage bound
    // to a different phone is a forged or mismatched token.
    let link = state
        .kv()
        .get(&temp_link_key(&claims.jti))
        .await
        .context("temp token linkage lookup failed")?;
    let Some(link) = link else {
        return Err(AuthError::bad_request("otp.expired", language));
    };
    if link != phone {
        return Err(AuthError::unauthorized("token.invalid", language));
    }

    let Some(stored_hash) = state
        .kv()
        .get(&otp_key(role, &phone))
        .await
        .context("otp hash lookup failed")?
    else {
        return Err(AuthError::bad_request("otp.expired", language));
    };

    let submitted = hash_code(state.config().otp_salt().expose_secret(), code.trim());
    if submitted != stored_hash {
        let attempts_key = attempts_key(role, &phone);
        let attempts = state
            .kv()
            .incr(&attempts_key)
            .await
            .context("failed to count otp attempt")?;
        state
            .kv()
            .expire(&attempts_key, state.config().otp_attempt_window_seconds())
            .await
            .context("failed to set otp attempt window")?;

        if attempts >= state.config().otp_max_attempts() {
            state.kv().delete(&otp_key(role, &phone)).await.context("failed to drop otp")?;
            state
                .kv()
                .delete(&temp_link_key(&claims.jti))
                .await
                .context("failed to drop temp linkage")?;
            state
                .kv()
                .set_ex(&blocked, "1", state.config().otp_block_seconds())
                .await
                .context("failed to block after otp attempts")?;
            info!(phone, role = role.as_str(), "otp attempt cap hit, challenge dropped");
            return Err(AuthError::too_many_requests_for(
                "otp.too_many_attempts",
                language,
                u64::try_from(state.config().otp_block_seconds()).unwrap_or(0),
            ));
        }

        let remaining = (state.config().otp_max_attempts() - attempts).to_string();
        return Err(AuthError::Unauthorized {
            message: get_message_with(
                "otp.invalid.with_attempts",
                language,
                &[("remaining", remaining.as_str())],
            ),
        });
    }

    // Consume the challenge and everything tied to it.
    state.kv().delete(&otp_key(role, &phone)).await.context("failed to consume otp")?;
    state
        .kv()
        .delete(&temp_link_key(&claims.jti))
        .await
        .context("failed to consume temp linkage")?;
    state
        .kv()
        .delete(&attempts_key(role, &phone))
        .await
        .context("failed to clear otp attempts")?;

    let identity = match identity::find_by_phone(state.docs(), role, &phone).await? {
        Some(identity) => backfill_verified(state, identity, language).await?,
        None => identity::create_incomplete(state.docs(), role, &phone, language).await?,
    };

    let preferred = identity
        .preferred_languages
        .first()
        .cloned()
        .unwrap_or_else(|| language.to_string());
    notify::dispatch(
        state.notifier(),
        Notification {
            receiver_id: phone.clone(),
            receiver_type: role.as_str().to_string(),
            template_key: "otp_verified".to_string(),
            variables: json!({ "phone": phone, "role": role.as_str() }),
            reference_type: "otp".to_string(),
            reference_id: phone.clone(),
            language: preferred,
        },
    )
    .await;

    audit::record(
        state.docs(),
        AuditEvent {
            action: "otp.verified",
            actor_id: &identity.id,
            actor_role: role.as_str(),
            target_id: None,
            client_ip: Some(client_ip),
            detail: json!({ "status": identity.status.as_str() }),
        },
    )
    .await;

    match identity.status {
        AccountStatus::Blocked | AccountStatus::Rejected | AccountStatus::PendingDeletion => {
            Err(AuthError::forbidden("account.not_active", language))
        }
        AccountStatus::Incomplete | AccountStatus::Pending => {
            let ttl = state.config().profile_temp_ttl_seconds();
            let (temp_token, _jti) = state
                .tokens()
                .issue_temp(&phone, role, identity.status, true, ttl, language)
                .await?;
            if identity.status == AccountStatus::Incomplete {
                Ok(OtpVerification::ProfileIncomplete {
                    temp_token,
                    expires_in: ttl,
                    next_action: "complete_profile",
                })
            } else {
                Ok(OtpVerification::PendingApproval {
                    temp_token,
                    expires_in: ttl,
                    next_action: "await_approval",
                })
            }
        }
        AccountStatus::Active => {
            let metadata = SessionMetadata {
                ip: Some(client_ip.to_string()),
                user_agent: user_agent.map(ToString::to_string),
                ..SessionMetadata::default()
            };
            let tokens = state.establish_session(&identity, &metadata, language).await?;
            info!(user_id = identity.id, role = role.as_str(), "otp login completed");
            Ok(OtpVerification::Active { tokens })
        }
    }
}

/// Identities that predate phone verification are brought up to date on
/// a successful verify.
async fn backfill_verified(
    state: &AuthState,
    identity: Identity,
    language: &str,
) -> Result<Identity, AuthError> {
    let mut fields = Document::new();
    if !identity.phone_verified {
        fields.insert("phone_verified".to_string(), json!(true));
    }
    if identity.preferred_languages.is_empty() {
        fields.insert("preferred_languages".to_string(), json!([language]));
    }
    if fields.is_empty() {
        return Ok(identity);
    }
    identity::update_fields(state.docs(), identity.role, &identity.id, fields).await?;
    Ok(identity::find_by_id(state.docs(), identity.role, &identity.id)
        .await?
        .context("identity vanished during verification")?)
}

#[cfg(test)]
mod tests {
    use super::valid_phone;

    #[test]
    fn e164_phones_are_accepted() {
        assert!(valid_phone("+989121234567"));
        assert!(valid_phone("+14155552671"));
    }

    #[test]
    fn malformed_phones_are_rejected() {
        assert!(!valid_phone("09121234567"));
        assert!(!valid_phone("+0989121234"));
        assert!(!valid_phone("+98912"));
        assert!(!valid_phone("not-a-phone"));
        assert!(!valid_phone(""));
    }
}
