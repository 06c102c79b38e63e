//! Tiered counter rate limiting over the key/value store.
//!
//! Each tier is a counter key with its own window; a request must pass
//! every tier before any counter is incremented. Breaching the
//! outermost tier can arm a block key that short-circuits later checks
//! until it expires. Store failures deny the request.

use anyhow::{Context, Result};

use crate::error::AuthError;
use crate::store::KeyValueStore;

#[derive(Clone, Copy, Debug)]
pub struct Tier {
    pub key_suffix: &'static str,
    pub limit: i64,
    pub window_seconds: i64,
    pub message_key: &'static str,
}

#[derive(Clone, Copy, Debug)]
pub struct BlockPolicy {
    pub ttl_seconds: i64,
    pub message_key: &'static str,
}

/// OTP request tiers: 3/minute, 5/10min, 10/hour per (role, phone).
pub(crate) const OTP_TIERS: [Tier; 3] = [
    Tier {
        key_suffix: "",
        limit: 3,
        window_seconds: 60,
        message_key: "otp.rate_limited.minute",
    },
    Tier {
        key_suffix: "-10min",
        limit: 5,
        window_seconds: 600,
        message_key: "otp.rate_limited.ten_minutes",
    },
    Tier {
        key_suffix: "-1h",
        limit: 10,
        window_seconds: 3600,
        message_key: "otp.rate_limited.hour",
    },
];

/// Breaching the hourly OTP tier blocks the (role, phone) for an hour.
pub(crate) const OTP_BLOCK: BlockPolicy = BlockPolicy {
    ttl_seconds: 3600,
    message_key: "otp.blocked",
};

/// Vendor approvals: 10/hour per admin.
pub(crate) const ADMIN_APPROVAL_TIERS: [Tier; 1] = [Tier {
    key_suffix: "",
    limit: 10,
    window_seconds: 3600,
    message_key: "admin.rate_limited",
}];

/// Rejects with `TooManyRequests` while `block_key` is live, carrying
/// the remaining block time.
pub(crate) async fn check_block(
    kv: &dyn KeyValueStore,
    block_key: &str,
    message_key: &str,
    language: &str,
) -> Result<(), AuthError> {
    let blocked = kv
        .get(block_key)
        .await
        .context("rate limit block lookup failed")?;
    if blocked.is_none() {
        return Ok(());
    }
    let remaining = kv
        .ttl(block_key)
        .await
        .context("rate limit block ttl lookup failed")?;
    Err(AuthError::too_many_requests_for(
        message_key,
        language,
        u64::try_from(remaining).unwrap_or(0),
    ))
}

/// Checks every tier, then increments every tier counter.
///
/// Counters only move when the request is admitted, so a limited caller
/// cannot push themselves deeper into the block.
pub(crate) async fn check_and_increment(
    kv: &dyn KeyValueStore,
    key_prefix: &str,
    tiers: &[Tier],
    block: Option<(&str, BlockPolicy)>,
    language: &str,
) -> Result<(), AuthError> {
    if let Some((block_key, policy)) = block {
        check_block(kv, block_key, policy.message_key, language).await?;
    }

    for (index, tier) in tiers.iter().enumerate() {
        let key = format!("{key_prefix}{}", tier.key_suffix);
        let count = current_count(kv, &key).await?;
        if count >= tier.limit {
            let outermost = index == tiers.len() - 1;
            if outermost {
                if let Some((block_key, policy)) = block {
                    kv.set_ex(block_key, "1", policy.ttl_seconds)
                        .await
                        .context("failed to arm rate limit block")?;
                    return Err(AuthError::too_many_requests_for(
                        policy.message_key,
                        language,
                        u64::try_from(policy.ttl_seconds).unwrap_or(0),
                    ));
                }
            }
            return Err(AuthError::too_many_requests(tier.message_key, language));
        }
    }

    for tier in tiers {
        let key = format!("{key_prefix}{}", tier.key_suffix);
        kv.incr(&key)
            .await
            .context("failed to increment rate limit counter")?;
        kv.expire(&key, tier.window_seconds)
            .await
            .context("failed to set rate limit window")?;
    }

    Ok(())
}

async fn current_count(kv: &dyn KeyValueStore, key: &str) -> Result<i64, AuthError> {
    let value = kv
        .get(key)
        .await
        .context("rate limit counter lookup failed")?;
    Ok(value.and_then(|value| value.parse().ok()).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryKeyValueStore;

    const TIGHT_TIERS: [Tier; 2] = [
        Tier {
            key_suffix: "",
            limit: 2,
            window_seconds: 60,
            message_key: "otp.rate_limited.minute",
        },
        Tier {
            key_suffix: "-outer",
            limit: 3,
            window_seconds: 600,
            message_key: "otp.rate_limited.ten_minutes",
        },
    ];

    #[tokio::test]
    async fn admits_until_inner_tier_is_full() {
        let kv = MemoryKeyValueStore::new();
        for _ in 0..2 {
            check_and_increment(&kv, "limit:user:+1555", &TIGHT_TIERS, None, "en")
                .await
                .unwrap();
        }
        let err = check_and_increment(&kv, "limit:user:+1555", &TIGHT_TIERS, None, "en")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "too_many_requests");
    }

    #[tokio::test]
    async fn limited_calls_do_not_increment() {
        let kv = MemoryKeyValueStore::new();
        for _ in 0..2 {
            check_and_increment(&kv, "limit:k", &TIGHT_TIERS, None, "en")
                .await
                .unwrap();
        }
        for _ in 0..5 {
            let _ = check_and_increment(&kv, "limit:k", &TIGHT_TIERS, None, "en").await;
        }
        assert_eq!(kv.get("limit:k").await.unwrap(), Some("2".to_string()));
    }

    #[tokio::test]
    async fn outermost_breach_arms_block() {
        let kv = MemoryKeyValueStore::new();
        // Drain the inner window so only the outer tier can trip.
        for _ in 0..2 {
            check_and_increment(&kv, "limit:b", &TIGHT_TIERS, Some(("blocked:b", OTP_BLOCK)), "en")
                .await
                .unwrap();
        }
        kv.force_expire("limit:b").await;
        check_and_increment(&kv, "limit:b", &TIGHT_TIERS, Some(("blocked:b", OTP_BLOCK)), "en")
            .await
            .unwrap();
        kv.force_expire("limit:b").await;

        let err = check_and_increment(
            &kv,
            "limit:b",
            &TIGHT_TIERS,
            Some(("blocked:b", OTP_BLOCK)),
            "en",
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), "too_many_requests");
        assert_eq!(kv.get("blocked:b").await.unwrap(), Some("1".to_string()));

        // Block now short-circuits even with counters cleared.
        kv.force_expire("limit:b").await;
        kv.force_expire("limit:b-outer").await;
        let err = check_and_increment(
            &kv,
            "limit:b",
            &TIGHT_TIERS,
            Some(("blocked:b", OTP_BLOCK)),
            "en",
        )
        .await
        .unwrap_err();
        match err {
            AuthError::TooManyRequests {
                retry_after_seconds,
                ..
            } => assert!(retry_after_seconds.is_some()),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn inner_breach_without_block_policy_does_not_block() {
        let kv = MemoryKeyValueStore::new();
        for _ in 0..2 {
            check_and_increment(&kv, "limit:n", &TIGHT_TIERS, Some(("blocked:n", OTP_BLOCK)), "en")
                .await
                .unwrap();
        }
        let _ = check_and_increment(
            &kv,
            "limit:n",
            &TIGHT_TIERS,
            Some(("blocked:n", OTP_BLOCK)),
            "en",
        )
        .await;
        assert_eq!(kv.get("blocked:n").await.unwrap(), None);
    }

    #[test]
    fn preset_windows_match_policy() {
        assert_eq!(OTP_TIERS[0].limit, 3);
        assert_eq!(OTP_TIERS[0].window_seconds, 60);
        assert_eq!(OTP_TIERS[1].limit, 5);
        assert_eq!(OTP_TIERS[1].window_seconds, 600);
        assert_eq!(OTP_TIERS[2].limit, 10);
        assert_eq!(OTP_TIERS[2].window_seconds, 3600);
        assert_eq!(OTP_BLOCK.ttl_seconds, 3600);
        assert_eq!(ADMIN_APPROVAL_TIERS[0].limit, 10);
        assert_eq!(ADMIN_APPROVAL_TIERS[0].window_seconds, 3600);
    }
}
