//! # Senama Auth (multi-tenant authentication core)
//!
//! `senama-auth` is the authentication authority for a marketplace with
//! three principal kinds: **users** and **vendors** sign in with phone
//! OTP (plus optional passwords), **admins** with username/password.
//!
//! ## Token model
//!
//! Three JWT families share one claims shape:
//!
//! - **temp** (`aud: auth-temp`) carries a phone through OTP
//!   verification and profile completion; a `temp_token:{jti}` linkage
//!   makes each one single-use.
//! - **access** (`aud: api`) carries role, scopes, status, and a
//!   role-tagged profile snapshot.
//! - **refresh** (`aud: auth-service`) signs with its own secret and is
//!   single-use: rotation deletes its live marker, and presenting a
//!   marker-less refresh token revokes every credential the user holds.
//!
//! Revocation is a `blacklist:{jti}` check on every decode, so a
//! blacklisted token dies before its signature expires.
//!
//! ## Onboarding
//!
//! First OTP contact creates an `incomplete` identity. Users activate
//! by completing name fields; vendors accumulate business fields until
//! complete, enter `pending`, and are activated (or rejected) by an
//! admin. Status never moves backwards through profile completion.
//!
//! ## Storage and collaborators
//!
//! All state lives behind [`store::KeyValueStore`] (volatile: OTP
//! hashes, counters, sessions, markers) and [`store::DocumentStore`]
//! (durable: identities, categories, audit trail). Notification
//! delivery and password hashing are traits too. Handles are injected
//! through [`AuthState`]; a store outage denies the request rather than
//! degrading into process-local state.

pub mod admin;
mod audit;
pub mod config;
pub mod error;
pub mod identity;
pub mod login;
pub mod logout;
pub mod messages;
pub mod notify;
pub mod otp;
pub mod password;
pub mod profile;
pub mod rate_limit;
pub mod refresh;
pub mod scopes;
pub mod session;
mod state;
pub mod store;
pub mod telemetry;
pub mod token;

pub use config::{AuthConfig, Environment};
pub use error::AuthError;
pub use identity::{AccountStatus, Identity, ProfileSnapshot, Role};
pub use session::{SessionFilter, SessionMetadata, SessionRecord};
pub use state::AuthState;
pub use token::{Claims, IssuedTokens, RevocationSummary, TokenService, TokenType};
