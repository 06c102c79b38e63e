//! JWT lifecycle: temp, access, and refresh tokens.
//!
//! Three token families share one claims shape but differ in audience,
//! signing secret, and lifetime. Temp and access tokens sign with the
//! access secret; refresh tokens have their own. Revocation is a
//! blacklist keyed by `jti`, and every live refresh token has a marker
//! key whose absence on decode means the token was already rotated:
//! that is treated as theft and ends every session the user has.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::identity::{AccountStatus, ProfileSnapshot, Role};
use crate::session;
use crate::store::KeyValueStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Temp,
    Access,
    Refresh,
}

impl TokenType {
    #[must_use]
    pub fn audience(self) -> &'static str {
        match self {
            Self::Temp => "auth-temp",
            Self::Access => "api",
            Self::Refresh => "auth-service",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Temp => "temp",
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    pub jti: String,
    pub role: Role,
    pub token_type: TokenType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AccountStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileSnapshot>,
    pub iat: i64,
    pub exp: i64,
}

/// Credential pair returned by login, verification, and rotation flows.
#[derive(Clone, Debug, Serialize)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub role: Role,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RevocationSummary {
    pub sessions_revoked: usize,
    pub refresh_tokens_revoked: usize,
}

impl RevocationSummary {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions_revoked == 0 && self.refresh_tokens_revoked == 0
    }
}

pub(crate) fn temp_link_key(jti: &str) -> String {
    format!("temp_token:{jti}")
}

pub(crate) fn refresh_marker_key(user_id: &str, jti: &str) -> String {
    format!("refresh_tokens:{user_id}:{jti}")
}

fn refresh_marker_pattern(user_id: &str) -> String {
    format!("refresh_tokens:{user_id}:*")
}

fn blacklist_key(jti: &str) -> String {
    format!("blacklist:{jti}")
}

#[derive(Clone)]
pub struct TokenService {
    config: Arc<AuthConfig>,
    kv: Arc<dyn KeyValueStore>,
}

impl TokenService {
    #[must_use]
    pub fn new(config: Arc<AuthConfig>, kv: Arc<dyn KeyValueStore>) -> Self {
        Self { config, kv }
    }

    fn secret_for(&self, token_type: TokenType) -> &str {
        match token_type {
            TokenType::Temp | TokenType::Access => self.config.access_secret().expose_secret(),
            TokenType::Refresh => self.config.refresh_secret().expose_secret(),
        }
    }

    fn sign(&self, claims: &Claims) -> Result<String> {
        let key = EncodingKey::from_secret(self.secret_for(claims.token_type).as_bytes());
        encode(&Header::new(Algorithm::HS256), claims, &key).context("failed to sign token")
    }

    /// Short-lived token that carries a verified (or to-be-verified)
    /// phone through the OTP and profile-completion steps. Registers
    /// the 1:1 `temp_token:{jti}` linkage; returns (token, jti).
    pub async fn issue_temp(
        &self,
        phone: &str,
        role: Role,
        status: AccountStatus,
        phone_verified: bool,
        ttl_seconds: i64,
        language: &str,
    ) -> Result<(String, String)> {
        let jti = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: self.config.issuer().to_string(),
            aud: TokenType::Temp.audience().to_string(),
            sub: phone.to_string(),
            jti: jti.clone(),
            role,
            token_type: TokenType::Temp,
            session_id: None,
            scopes: None,
            status: Some(status),
            phone: Some(phone.to_string()),
            phone_verified: Some(phone_verified),
            language: Some(language.to_string()),
            profile: None,
            iat: now,
            exp: now + ttl_seconds,
        };
        let token = self.sign(&claims)?;
        self.kv
            .set_ex(&temp_link_key(&jti), phone, ttl_seconds)
            .await
            .context("failed to register temp token linkage")?;
        Ok((token, jti))
    }

    /// Access token with scopes and the role-tagged profile snapshot.
    ///
    /// # Errors
    ///
    /// Fails when the snapshot's role tag contradicts `role`; that is a
    /// caller bug, never user input.
    pub async fn issue_access(
        &self,
        user_id: &str,
        role: Role,
        status: AccountStatus,
        session_id: &str,
        scopes: Vec<String>,
        profile: Option<ProfileSnapshot>,
        language: &str,
    ) -> Result<(String, String)> {
        if let Some(snapshot) = &profile {
            if snapshot.role() != role {
                bail!(
                    "profile snapshot role {:?} does not match token role {:?}",
                    snapshot.role(),
                    role
                );
            }
        }
        let jti = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: self.config.issuer().to_string(),
            aud: TokenType::Access.audience().to_string(),
            sub: user_id.to_string(),
            jti: jti.clone(),
            role,
            token_type: TokenType::Access,
            session_id: Some(session_id.to_string()),
            scopes: Some(scopes),
            status: Some(status),
            phone: None,
            phone_verified: None,
            language: Some(language.to_string()),
            profile,
            iat: now,
            exp: now + self.config.access_ttl_seconds(),
        };
        let token = self.sign(&claims)?;
        Ok((token, jti))
    }

    /// Refresh token plus its live marker. Enforces the per-user cap by
    /// dropping the markers closest to expiry, which are the oldest.
    pub async fn issue_refresh(
        &self,
        user_id: &str,
        role: Role,
        session_id: &str,
        language: &str,
    ) -> Result<(String, String)> {
        let jti = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: self.config.issuer().to_string(),
            aud: TokenType::Refresh.audience().to_string(),
            sub: user_id.to_string(),
            jti: jti.clone(),
            role,
            token_type: TokenType::Refresh,
            session_id: Some(session_id.to_string()),
            scopes: None,
            status: None,
            phone: None,
            phone_verified: None,
            language: Some(language.to_string()),
            profile: None,
            iat: now,
            exp: now + self.config.refresh_ttl_seconds(),
        };
        let token = self.sign(&claims)?;
        self.kv
            .set_ex(
                &refresh_marker_key(user_id, &jti),
                "active",
                self.config.refresh_ttl_seconds(),
            )
            .await
            .context("failed to register refresh token marker")?;
        self.prune_refresh_markers(user_id).await?;
        Ok((token, jti))
    }

    async fn prune_refresh_markers(&self, user_id: &str) -> Result<()> {
        let keys = self
            .kv
            .scan_keys(&refresh_marker_pattern(user_id))
            .await
            .context("failed to scan refresh token markers")?;
        if keys.len() <= self.config.max_refresh_tokens() {
            return Ok(());
        }
        let mut with_ttl = Vec::with_capacity(keys.len());
        for key in keys {
            let ttl = self.kv.ttl(&key).await.context("failed to read marker ttl")?;
            with_ttl.push((ttl, key));
        }
        with_ttl.sort();
        let excess = with_ttl.len() - self.config.max_refresh_tokens();
        for (_, key) in with_ttl.into_iter().take(excess) {
            self.kv
                .delete(&key)
                .await
                .context("failed to prune refresh token marker")?;
            info!(user_id, key, "pruned oldest refresh token marker");
        }
        Ok(())
    }

    /// Verifies signature, issuer, audience, expiry, type, blacklist,
    /// and (for refresh tokens) the live marker. A refresh token whose
    /// marker is gone is treated as reuse: every session and refresh
    /// token the user holds is revoked before the error returns.
    pub async fn decode(
        &self,
        token: &str,
        expected: TokenType,
        language: &str,
    ) -> Result<Claims, AuthError> {
        let claims = self.decode_claims_only(token, expected, language)?;

        let revoked = self
            .kv
            .get(&blacklist_key(&claims.jti))
            .await
            .context("blacklist lookup failed")?;
        if revoked.is_some() {
            return Err(AuthError::unauthorized("token.revoked", language));
        }

        if expected == TokenType::Refresh {
            let marker = self
                .kv
                .get(&refresh_marker_key(&claims.sub, &claims.jti))
                .await
                .context("refresh marker lookup failed")?;
            if marker.is_none() {
                warn!(
                    user_id = claims.sub,
                    jti = claims.jti,
                    "refresh token presented without live marker, revoking all sessions"
                );
                self.revoke_all_for_user(&claims.sub)
                    .await
                    .context("failed to revoke sessions after refresh reuse")?;
                return Err(AuthError::unauthorized("token.reused", language));
            }
        }

        Ok(claims)
    }

    /// Signature, issuer, audience, expiry, and type checks only. No
    /// store lookups and no reuse side effects; used when retiring a
    /// presented token during logout.
    pub(crate) fn decode_claims_only(
        &self,
        token: &str,
        expected: TokenType,
        language: &str,
    ) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_audience(&[expected.audience()]);
        validation.set_issuer(&[self.config.issuer()]);
        let key = DecodingKey::from_secret(self.secret_for(expected).as_bytes());

        let data = decode::<Claims>(token, &key, &validation).map_err(|err| {
            match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::unauthorized("token.expired", language),
                _ => AuthError::unauthorized("token.invalid", language),
            }
        })?;

        let claims = data.claims;
        if claims.token_type != expected || claims.jti.is_empty() {
            return Err(AuthError::unauthorized("token.invalid", language));
        }
        Ok(claims)
    }

    /// Blacklist a `jti`. The entry outlives the longest credential it
    /// could belong to, never less than one access token lifetime.
    pub async fn revoke(&self, jti: &str, remaining_ttl_seconds: i64) -> Result<()> {
        let ttl = remaining_ttl_seconds.max(self.config.access_ttl_seconds());
        self.kv
            .set_ex(&blacklist_key(jti), "revoked", ttl)
            .await
            .context("failed to blacklist token")
    }

    /// Ends everything the user holds: sessions deleted, their access
    /// jtis blacklisted, refresh markers deleted and blacklisted.
    /// Idempotent; a second call finds nothing and reports zero counts.
    pub async fn revoke_all_for_user(&self, user_id: &str) -> Result<RevocationSummary> {
        let mut summary = RevocationSummary::default();

        let session_keys = self
            .kv
            .scan_keys(&session::session_pattern(user_id))
            .await
            .context("failed to scan sessions for revocation")?;
        for key in session_keys {
            let fields = self
                .kv
                .hgetall(&key)
                .await
                .context("failed to read session during revocation")?;
            if let Some(jti) = fields.get("jti") {
                let remaining = self.kv.ttl(&key).await.unwrap_or(0);
                self.revoke(jti, remaining).await?;
            }
            self.kv
                .delete(&key)
                .await
                .context("failed to delete session during revocation")?;
            summary.sessions_revoked += 1;
        }

        let marker_keys = self
            .kv
            .scan_keys(&refresh_marker_pattern(user_id))
            .await
            .context("failed to scan refresh markers for revocation")?;
        for key in marker_keys {
            if let Some(jti) = key.rsplit(':').next() {
                let remaining = self.kv.ttl(&key).await.unwrap_or(0);
                self.revoke(jti, remaining).await?;
            }
            self.kv
                .delete(&key)
                .await
                .context("failed to delete refresh marker during revocation")?;
            summary.refresh_tokens_revoked += 1;
        }

        info!(
            user_id,
            sessions = summary.sessions_revoked,
            refresh_tokens = summary.refresh_tokens_revoked,
            "revoked all credentials for user"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::identity::{UserProfile, VendorProfile};
    use crate::store::memory::MemoryKeyValueStore;

    fn service() -> TokenService {
        let config = AuthConfig::new(
            "access-secret".into(),
            "refresh-secret".into(),
            "otp-salt".into(),
        );
        TokenService::new(Arc::new(config), Arc::new(MemoryKeyValueStore::new()))
    }

    fn service_with(config: AuthConfig) -> TokenService {
        TokenService::new(Arc::new(config), Arc::new(MemoryKeyValueStore::new()))
    }

    #[tokio::test]
    async fn temp_token_round_trip() -> Result<()> {
        let service = service();
        let (token, jti) = service
            .issue_temp(
                "+989121234567",
                Role::User,
                AccountStatus::Incomplete,
                false,
                300,
                "fa",
            )
            .await?;
        let claims = service
            .decode(&token, TokenType::Temp, "en")
            .await
            .map_err(|err| anyhow::anyhow!("{err}"))?;
        assert_eq!(claims.jti, jti);
        assert_eq!(claims.phone.as_deref(), Some("+989121234567"));
        assert_eq!(claims.aud, "auth-temp");
        // Linkage registered for single-use consumption.
        assert_eq!(
            service.kv.get(&temp_link_key(&jti)).await?,
            Some("+989121234567".to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn audiences_do_not_cross() -> Result<()> {
        let service = service();
        let (access, _) = service
            .issue_access(
                "u1",
                Role::User,
                AccountStatus::Active,
                "s1",
                vec!["profile:read".to_string()],
                None,
                "fa",
            )
            .await?;
        let err = service
            .decode(&access, TokenType::Refresh, "en")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
        let err = service
            .decode(&access, TokenType::Temp, "en")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
        Ok(())
    }

    #[tokio::test]
    async fn expired_token_is_rejected() -> Result<()> {
        let config = AuthConfig::new(
            "access-secret".into(),
            "refresh-secret".into(),
            "otp-salt".into(),
        )
        .with_access_ttl_seconds(-10);
        let service = service_with(config);
        let (access, _) = service
            .issue_access(
                "u1",
                Role::User,
                AccountStatus::Active,
                "s1",
                vec![],
                None,
                "fa",
            )
            .await?;
        let err = service
            .decode(&access, TokenType::Access, "en")
            .await
            .unwrap_err();
        assert!(err.to_string().to_lowercase().contains("expired"));
        Ok(())
    }

    #[tokio::test]
    async fn blacklist_beats_valid_signature() -> Result<()> {
        let service = service();
        let (access, jti) = service
            .issue_access(
                "u1",
                Role::User,
                AccountStatus::Active,
                "s1",
                vec![],
                None,
                "fa",
            )
            .await?;
        service.decode(&access, TokenType::Access, "en").await.ok();
        service.revoke(&jti, 0).await?;
        let err = service
            .decode(&access, TokenType::Access, "en")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unauthorized");
        Ok(())
    }

    #[tokio::test]
    async fn snapshot_role_mismatch_is_rejected() -> Result<()> {
        let service = service();
        let vendor_snapshot = ProfileSnapshot::Vendor(VendorProfile::default());
        let result = service
            .issue_access(
                "u1",
                Role::User,
                AccountStatus::Active,
                "s1",
                vec![],
                Some(vendor_snapshot),
                "fa",
            )
            .await;
        assert!(result.is_err());

        let user_snapshot = ProfileSnapshot::User(UserProfile::default());
        let result = service
            .issue_access(
                "u1",
                Role::User,
                AccountStatus::Active,
                "s1",
                vec![],
                Some(user_snapshot),
                "fa",
            )
            .await;
        assert!(result.is_ok());
        Ok(())
    }

    #[tokio::test]
    async fn refresh_reuse_revokes_everything() -> Result<()> {
        let service = service();
        let (refresh, jti) = service
            .issue_refresh("u1", Role::User, "s1", "fa")
            .await?;
        // First decode is fine.
        assert!(service.decode(&refresh, TokenType::Refresh, "en").await.is_ok());

        // Rotation deletes the marker; a second refresh still exists.
        service.kv.delete(&refresh_marker_key("u1", &jti)).await?;
        let (_other, other_jti) = service
            .issue_refresh("u1", Role::User, "s2", "fa")
            .await?;

        let err = service
            .decode(&refresh, TokenType::Refresh, "en")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "unauthorized");

        // The sibling refresh token lost its marker too.
        assert_eq!(
            service
                .kv
                .get(&refresh_marker_key("u1", &other_jti))
                .await?,
            None
        );
        Ok(())
    }

    #[tokio::test]
    async fn refresh_markers_are_capped() -> Result<()> {
        let config = AuthConfig::new(
            "access-secret".into(),
            "refresh-secret".into(),
            "otp-salt".into(),
        )
        .with_max_refresh_tokens(3);
        let service = service_with(config);
        for i in 0..5 {
            service
                .issue_refresh("u1", Role::User, &format!("s{i}"), "fa")
                .await?;
        }
        let markers = service.kv.scan_keys("refresh_tokens:u1:*").await?;
        assert_eq!(markers.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn revoke_all_is_idempotent() -> Result<()> {
        let service = service();
        service.issue_refresh("u1", Role::User, "s1", "fa").await?;
        service
            .kv
            .hset(
                &session::session_key("u1", "s1"),
                &[("jti", "access-jti".to_string())],
            )
            .await?;

        let first = service.revoke_all_for_user("u1").await?;
        assert_eq!(first.sessions_revoked, 1);
        assert_eq!(first.refresh_tokens_revoked, 1);

        let second = service.revoke_all_for_user("u1").await?;
        assert!(second.is_empty());
        Ok(())
    }
}
