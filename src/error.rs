//! Error taxonomy shared by every auth flow.
//!
//! Flows fail with one of a small set of categories so callers can map them
//! to a transport status without inspecting message text. Messages are
//! already localized by the time an error is constructed.

use crate::messages::get_message;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{message}")]
    BadRequest { message: String },

    #[error("{message}")]
    Unauthorized { message: String },

    #[error("{message}")]
    Forbidden { message: String },

    #[error("{message}")]
    NotFound { message: String },

    #[error("{message}")]
    TooManyRequests {
        message: String,
        retry_after_seconds: Option<u64>,
    },

    /// Infrastructure failure. Never carries user-facing detail; flows log
    /// the cause and surface a generic message at the boundary.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    pub(crate) fn bad_request(key: &str, language: &str) -> Self {
        Self::BadRequest {
            message: get_message(key, language),
        }
    }

    pub(crate) fn unauthorized(key: &str, language: &str) -> Self {
        Self::Unauthorized {
            message: get_message(key, language),
        }
    }

    pub(crate) fn forbidden(key: &str, language: &str) -> Self {
        Self::Forbidden {
            message: get_message(key, language),
        }
    }

    pub(crate) fn not_found(key: &str, language: &str) -> Self {
        Self::NotFound {
            message: get_message(key, language),
        }
    }

    pub(crate) fn too_many_requests(key: &str, language: &str) -> Self {
        Self::TooManyRequests {
            message: get_message(key, language),
            retry_after_seconds: None,
        }
    }

    pub(crate) fn too_many_requests_for(
        key: &str,
        language: &str,
        retry_after_seconds: u64,
    ) -> Self {
        Self::TooManyRequests {
            message: get_message(key, language),
            retry_after_seconds: Some(retry_after_seconds),
        }
    }

    /// Stable category name for logs and audit records.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::Unauthorized { .. } => "unauthorized",
            Self::Forbidden { .. } => "forbidden",
            Self::NotFound { .. } => "not_found",
            Self::TooManyRequests { .. } => "too_many_requests",
            Self::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AuthError;

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(AuthError::bad_request("phone.invalid", "en").kind(), "bad_request");
        assert_eq!(AuthError::unauthorized("token.invalid", "en").kind(), "unauthorized");
        assert_eq!(AuthError::forbidden("account.not_active", "en").kind(), "forbidden");
        assert_eq!(
            AuthError::too_many_requests("otp.blocked", "en").kind(),
            "too_many_requests"
        );
        assert_eq!(
            AuthError::Internal(anyhow::anyhow!("boom")).kind(),
            "internal"
        );
    }

    #[test]
    fn retry_after_is_carried() {
        let err = AuthError::too_many_requests_for("otp.blocked", "en", 3600);
        match err {
            AuthError::TooManyRequests {
                retry_after_seconds,
                ..
            } => assert_eq!(retry_after_seconds, Some(3600)),
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn messages_are_localized_at_construction() {
        let en = AuthError::unauthorized("auth.login.invalid", "en");
        let fa = AuthError::unauthorized("auth.login.invalid", "fa");
        assert_ne!(en.to_string(), fa.to_string());
    }
}
