//! Shared state handed to every auth flow: configuration plus the
//! collaborator handles. Nothing in the crate reaches for globals.

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::identity::Identity;
use crate::notify::{self, Notification, Notifier};
use crate::password::PasswordVerifier;
use crate::scopes::scopes_for;
use crate::session::{SessionMetadata, SessionStore};
use crate::store::{DocumentStore, KeyValueStore};
use crate::token::{IssuedTokens, TokenService};

pub struct AuthState {
    config: Arc<AuthConfig>,
    kv: Arc<dyn KeyValueStore>,
    docs: Arc<dyn DocumentStore>,
    notifier: Arc<dyn Notifier>,
    passwords: Arc<dyn PasswordVerifier>,
    tokens: TokenService,
    sessions: SessionStore,
}

impl AuthState {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        kv: Arc<dyn KeyValueStore>,
        docs: Arc<dyn DocumentStore>,
        notifier: Arc<dyn Notifier>,
        passwords: Arc<dyn PasswordVerifier>,
    ) -> Self {
        let config = Arc::new(config);
        let tokens = TokenService::new(config.clone(), kv.clone());
        let sessions = SessionStore::new(kv.clone(), config.session_ttl_seconds());
        Self {
            config,
            kv,
            docs,
            notifier,
            passwords,
            tokens,
            sessions,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub(crate) fn kv(&self) -> &dyn KeyValueStore {
        self.kv.as_ref()
    }

    pub(crate) fn docs(&self) -> &dyn DocumentStore {
        self.docs.as_ref()
    }

    pub(crate) fn notifier(&self) -> &dyn Notifier {
        self.notifier.as_ref()
    }

    pub(crate) fn passwords(&self) -> &dyn PasswordVerifier {
        self.passwords.as_ref()
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Mirror an internal failure to the operational notification
    /// channel. Boundary layers call this when mapping
    /// [`AuthError::Internal`] so store outages surface without log
    /// scraping. Anything else is a normal domain error and is ignored.
    pub async fn report_internal(&self, error: &AuthError) {
        let AuthError::Internal(cause) = error else {
            return;
        };
        error!("internal auth failure: {cause:#}");
        notify::dispatch(
            self.notifier.as_ref(),
            Notification {
                receiver_id: "admins".to_string(),
                receiver_type: "admin_channel".to_string(),
                template_key: "internal_error".to_string(),
                variables: json!({ "error": cause.to_string() }),
                reference_type: "system".to_string(),
                reference_id: "auth".to_string(),
                language: self.config.default_language().to_string(),
            },
        )
        .await;
    }

    /// Full credential issuance for an active identity: sweep stale
    /// sessions, mint access + refresh, and record the new session.
    pub(crate) async fn establish_session(
        &self,
        identity: &Identity,
        metadata: &SessionMetadata,
        language: &str,
    ) -> Result<IssuedTokens> {
        self.sessions.delete_inactive(&identity.id).await?;
        let session_id = Uuid::new_v4().to_string();
        let scopes = scopes_for(identity.role, identity.status);
        let (access_token, access_jti) = self
            .tokens
            .issue_access(
                &identity.id,
                identity.role,
                identity.status,
                &session_id,
                scopes,
                identity.snapshot(),
                language,
            )
            .await?;
        let (refresh_token, _refresh_jti) = self
            .tokens
            .issue_refresh(&identity.id, identity.role, &session_id, language)
            .await?;
        self.sessions
            .create(&identity.id, &session_id, &access_jti, metadata)
            .await?;
        Ok(IssuedTokens {
            access_token,
            refresh_token,
            token_type: "bearer",
            expires_in: self.config.access_ttl_seconds(),
            role: identity.role,
        })
    }
}
