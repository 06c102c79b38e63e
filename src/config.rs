//! Auth configuration: TTLs, limits, secrets, and environment.

use secrecy::SecretString;

const DEFAULT_ISSUER: &str = "senama-auth";
const DEFAULT_LANGUAGE: &str = "fa";
const DEFAULT_ACCESS_TTL_SECONDS: i64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
const DEFAULT_TEMP_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_PROFILE_TEMP_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_OTP_TTL_SECONDS: i64 = 5 * 60;
const DEFAULT_OTP_LENGTH: usize = 6;
const DEFAULT_OTP_MAX_ATTEMPTS: i64 = 5;
const DEFAULT_OTP_ATTEMPT_WINDOW_SECONDS: i64 = 10 * 60;
const DEFAULT_OTP_BLOCK_SECONDS: i64 = 10 * 60;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_MAX_REFRESH_TOKENS: usize = 5;
const DEFAULT_LOGIN_MAX_ATTEMPTS: i64 = 5;
const DEFAULT_LOGIN_LOCKOUT_SECONDS: i64 = 10 * 60;

/// Deployment environment. Controls debug-only behavior such as logging
/// raw OTP codes, which never happens outside `Development`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

#[derive(Clone)]
pub struct AuthConfig {
    access_secret: SecretString,
    refresh_secret: SecretString,
    otp_salt: SecretString,
    issuer: String,
    environment: Environment,
    default_language: String,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    temp_ttl_seconds: i64,
    profile_temp_ttl_seconds: i64,
    otp_ttl_seconds: i64,
    otp_length: usize,
    otp_max_attempts: i64,
    otp_attempt_window_seconds: i64,
    otp_block_seconds: i64,
    session_ttl_seconds: i64,
    max_refresh_tokens: usize,
    login_max_attempts: i64,
    login_lockout_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(
        access_secret: SecretString,
        refresh_secret: SecretString,
        otp_salt: SecretString,
    ) -> Self {
        Self {
            access_secret,
            refresh_secret,
            otp_salt,
            issuer: DEFAULT_ISSUER.to_string(),
            environment: Environment::Production,
            default_language: DEFAULT_LANGUAGE.to_string(),
            access_ttl_seconds: DEFAULT_ACCESS_TTL_SECONDS,
            refresh_ttl_seconds: DEFAULT_REFRESH_TTL_SECONDS,
            temp_ttl_seconds: DEFAULT_TEMP_TTL_SECONDS,
            profile_temp_ttl_seconds: DEFAULT_PROFILE_TEMP_TTL_SECONDS,
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            otp_length: DEFAULT_OTP_LENGTH,
            otp_max_attempts: DEFAULT_OTP_MAX_ATTEMPTS,
            otp_attempt_window_seconds: DEFAULT_OTP_ATTEMPT_WINDOW_SECONDS,
            otp_block_seconds: DEFAULT_OTP_BLOCK_SECONDS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            max_refresh_tokens: DEFAULT_MAX_REFRESH_TOKENS,
            login_max_attempts: DEFAULT_LOGIN_MAX_ATTEMPTS,
            login_lockout_seconds: DEFAULT_LOGIN_LOCKOUT_SECONDS,
        }
    }

    #[must_use]
    pub fn with_issuer(mut self, issuer: String) -> Self {
        self.issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    #[must_use]
    pub fn with_default_language(mut self, language: String) -> Self {
        self.default_language = language;
        self
    }

    #[must_use]
    pub fn with_access_ttl_seconds(mut self, seconds: i64) -> Self {
        self.access_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl_seconds(mut self, seconds: i64) -> Self {
        self.refresh_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_temp_ttl_seconds(mut self, seconds: i64) -> Self {
        self.temp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_profile_temp_ttl_seconds(mut self, seconds: i64) -> Self {
        self.profile_temp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: i64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    /// Clamped to 1..=9 digits so codes always fit a `u32` bound.
    #[must_use]
    pub fn with_otp_length(mut self, length: usize) -> Self {
        self.otp_length = length.clamp(1, 9);
        self
    }

    #[must_use]
    pub fn with_otp_max_attempts(mut self, attempts: i64) -> Self {
        self.otp_max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_otp_attempt_window_seconds(mut self, seconds: i64) -> Self {
        self.otp_attempt_window_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_otp_block_seconds(mut self, seconds: i64) -> Self {
        self.otp_block_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_max_refresh_tokens(mut self, max: usize) -> Self {
        self.max_refresh_tokens = max;
        self
    }

    #[must_use]
    pub fn with_login_max_attempts(mut self, attempts: i64) -> Self {
        self.login_max_attempts = attempts;
        self
    }

    #[must_use]
    pub fn with_login_lockout_seconds(mut self, seconds: i64) -> Self {
        self.login_lockout_seconds = seconds;
        self
    }

    pub(crate) fn access_secret(&self) -> &SecretString {
        &self.access_secret
    }

    pub(crate) fn refresh_secret(&self) -> &SecretString {
        &self.refresh_secret
    }

    pub(crate) fn otp_salt(&self) -> &SecretString {
        &self.otp_salt
    }

    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    #[must_use]
    pub fn environment(&self) -> Environment {
        self.environment
    }

    #[must_use]
    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    #[must_use]
    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    #[must_use]
    pub fn refresh_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_seconds
    }

    #[must_use]
    pub fn temp_ttl_seconds(&self) -> i64 {
        self.temp_ttl_seconds
    }

    #[must_use]
    pub fn profile_temp_ttl_seconds(&self) -> i64 {
        self.profile_temp_ttl_seconds
    }

    #[must_use]
    pub fn otp_ttl_seconds(&self) -> i64 {
        self.otp_ttl_seconds
    }

    #[must_use]
    pub fn otp_length(&self) -> usize {
        self.otp_length
    }

    #[must_use]
    pub fn otp_max_attempts(&self) -> i64 {
        self.otp_max_attempts
    }

    #[must_use]
    pub fn otp_attempt_window_seconds(&self) -> i64 {
        self.otp_attempt_window_seconds
    }

    #[must_use]
    pub fn otp_block_seconds(&self) -> i64 {
        self.otp_block_seconds
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn max_refresh_tokens(&self) -> usize {
        self.max_refresh_tokens
    }

    #[must_use]
    pub fn login_max_attempts(&self) -> i64 {
        self.login_max_attempts
    }

    #[must_use]
    pub fn login_lockout_seconds(&self) -> i64 {
        self.login_lockout_seconds
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secrets stay out of Debug output.
        f.debug_struct("AuthConfig")
            .field("issuer", &self.issuer)
            .field("environment", &self.environment)
            .field("default_language", &self.default_language)
            .field("access_ttl_seconds", &self.access_ttl_seconds)
            .field("refresh_ttl_seconds", &self.refresh_ttl_seconds)
            .field("temp_ttl_seconds", &self.temp_ttl_seconds)
            .field("otp_ttl_seconds", &self.otp_ttl_seconds)
            .field("session_ttl_seconds", &self.session_ttl_seconds)
            .field("max_refresh_tokens", &self.max_refresh_tokens)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthConfig, Environment};

    fn config() -> AuthConfig {
        AuthConfig::new(
            "access-secret".into(),
            "refresh-secret".into(),
            "otp-salt".into(),
        )
    }

    #[test]
    fn defaults_match_expected_windows() {
        let config = config();
        assert_eq!(config.issuer(), "senama-auth");
        assert_eq!(config.environment(), Environment::Production);
        assert_eq!(config.default_language(), "fa");
        assert_eq!(config.access_ttl_seconds(), 900);
        assert_eq!(config.refresh_ttl_seconds(), 30 * 24 * 60 * 60);
        assert_eq!(config.temp_ttl_seconds(), 300);
        assert_eq!(config.profile_temp_ttl_seconds(), 86400);
        assert_eq!(config.otp_ttl_seconds(), 300);
        assert_eq!(config.otp_length(), 6);
        assert_eq!(config.otp_max_attempts(), 5);
        assert_eq!(config.otp_attempt_window_seconds(), 600);
        assert_eq!(config.otp_block_seconds(), 600);
        assert_eq!(config.session_ttl_seconds(), 86400);
        assert_eq!(config.max_refresh_tokens(), 5);
        assert_eq!(config.login_max_attempts(), 5);
        assert_eq!(config.login_lockout_seconds(), 600);
    }

    #[test]
    fn builder_overrides_apply() {
        let config = config()
            .with_issuer("test-issuer".to_string())
            .with_environment(Environment::Development)
            .with_access_ttl_seconds(60)
            .with_otp_length(4)
            .with_max_refresh_tokens(2);
        assert_eq!(config.issuer(), "test-issuer");
        assert_eq!(config.environment(), Environment::Development);
        assert_eq!(config.access_ttl_seconds(), 60);
        assert_eq!(config.otp_length(), 4);
        assert_eq!(config.max_refresh_tokens(), 2);
    }

    #[test]
    fn otp_length_is_clamped_to_single_u32_digits() {
        assert_eq!(config().with_otp_length(12).otp_length(), 9);
        assert_eq!(config().with_otp_length(0).otp_length(), 1);
        assert_eq!(config().with_otp_length(4).otp_length(), 4);
    }

    #[test]
    fn debug_output_hides_secrets() {
        let output = format!("{:?}", config());
        assert!(!output.contains("access-secret"));
        assert!(!output.contains("otp-salt"));
    }
}
