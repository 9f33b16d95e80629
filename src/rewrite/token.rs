//! Confirmation tokens binding a rewrite plan to its execution.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use sha2::{Digest, Sha256};

use crate::config::Config;

pub trait TokenAuthority {
    /// Issue a token for `target_hashes` and return it with its expiry.
    fn issue(&self, target_hashes: &[String], now: DateTime<Utc>) -> (String, DateTime<Utc>);

    /// True when `token` was issued for exactly `target_hashes` and is still valid at `now`.
    fn validate(&self, token: &str, target_hashes: &[String], now: DateTime<Utc>) -> bool;
}

fn sorted_hashes(target_hashes: &[String]) -> Vec<String> {
    let mut sorted = target_hashes.to_vec();
    sorted.sort();
    sorted.dedup();
    sorted
}

struct IssuedToken {
    hashes: Vec<String>,
    expires_at: DateTime<Utc>,
}

/// Random single-use tokens held in memory with an explicit expiry.
pub struct NonceTokenAuthority {
    ttl: TimeDelta,
    issued: Mutex<HashMap<String, IssuedToken>>,
}

impl NonceTokenAuthority {
    pub fn new(ttl: Duration) -> Self {
        NonceTokenAuthority {
            ttl: TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX),
            issued: Mutex::new(HashMap::new()),
        }
    }

    /// The default authority for library callers: expiry follows `token_ttl`.
    pub fn from_config(config: &Config) -> Self {
        NonceTokenAuthority::new(config.token_ttl())
    }
}

impl TokenAuthority for NonceTokenAuthority {
    fn issue(&self, target_hashes: &[String], now: DateTime<Utc>) -> (String, DateTime<Utc>) {
        let token = uuid::Uuid::new_v4().to_string();
        let expires_at = now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut issued = self.issued.lock().unwrap_or_else(|p| p.into_inner());
        issued.retain(|_, t| t.expires_at > now);
        issued.insert(
            token.clone(),
            IssuedToken {
                hashes: sorted_hashes(target_hashes),
                expires_at,
            },
        );
        (token, expires_at)
    }

    fn validate(&self, token: &str, target_hashes: &[String], now: DateTime<Utc>) -> bool {
        let mut issued = self.issued.lock().unwrap_or_else(|p| p.into_inner());
        // Consumed on first presentation, whether or not it matches
        match issued.remove(token) {
            Some(entry) => now < entry.expires_at && entry.hashes == sorted_hashes(target_hashes),
            None => false,
        }
    }
}

/// Deterministic digest of the sorted hashes and the current minute.
///
/// Anyone can compute it, so it only guards against stale plans, not against callers.
#[derive(Debug, Clone, Copy, Default)]
pub struct DigestTokenAuthority;

impl DigestTokenAuthority {
    pub fn digest(target_hashes: &[String], now: DateTime<Utc>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(sorted_hashes(target_hashes).join(","));
        hasher.update(b"@");
        hasher.update(now.format("%Y-%m-%dT%H:%M").to_string());
        let digest = format!("{:x}", hasher.finalize());
        digest[..16].to_string()
    }
}

impl TokenAuthority for DigestTokenAuthority {
    fn issue(&self, target_hashes: &[String], now: DateTime<Utc>) -> (String, DateTime<Utc>) {
        let minute_start = now.duration_trunc(TimeDelta::minutes(1)).unwrap_or(now);
        (
            Self::digest(target_hashes, now),
            minute_start + TimeDelta::minutes(1),
        )
    }

    fn validate(&self, token: &str, target_hashes: &[String], now: DateTime<Utc>) -> bool {
        Self::digest(target_hashes, now) == token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn hashes(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_digest_is_pure_within_a_minute() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap();
        let later_same_minute = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 55).unwrap();
        let authority = DigestTokenAuthority;

        let (token, expires_at) = authority.issue(&hashes(&["bbb", "aaa"]), at);
        assert_eq!(token.len(), 16);
        assert_eq!(expires_at, Utc.with_ymd_and_hms(2024, 5, 1, 12, 31, 0).unwrap());
        assert_eq!(
            token,
            DigestTokenAuthority::digest(&hashes(&["aaa", "bbb"]), later_same_minute)
        );
        assert!(authority.validate(&token, &hashes(&["aaa", "bbb"]), later_same_minute));
    }

    #[test]
    fn test_digest_fails_a_minute_later() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap();
        let authority = DigestTokenAuthority;
        let (token, _) = authority.issue(&hashes(&["aaa"]), at);
        assert!(!authority.validate(&token, &hashes(&["aaa"]), at + TimeDelta::minutes(1)));
        assert!(!authority.validate(&token, &hashes(&["aab"]), at));
    }

    #[test]
    fn test_nonce_is_single_use_and_bound_to_hashes() {
        let authority = NonceTokenAuthority::new(Duration::from_secs(300));
        let now = Utc::now();

        let (token, expires_at) = authority.issue(&hashes(&["b", "a"]), now);
        assert_eq!(expires_at, now + TimeDelta::minutes(5));
        assert!(authority.validate(&token, &hashes(&["a", "b"]), now));
        assert!(!authority.validate(&token, &hashes(&["a", "b"]), now));

        let (other, _) = authority.issue(&hashes(&["a"]), now);
        assert!(!authority.validate(&other, &hashes(&["a", "c"]), now));
    }

    #[test]
    fn test_nonce_expiry_follows_configured_ttl() {
        let config = Config::default().with_token_ttl(Duration::from_secs(90));
        let authority = NonceTokenAuthority::from_config(&config);
        let now = Utc::now();

        let (token, expires_at) = authority.issue(&hashes(&["a"]), now);
        assert_eq!(expires_at, now + TimeDelta::seconds(90));
        assert!(!authority.validate(&token, &hashes(&["a"]), now + TimeDelta::seconds(91)));

        let (token, _) = authority.issue(&hashes(&["a"]), now);
        assert!(authority.validate(&token, &hashes(&["a"]), now + TimeDelta::seconds(89)));
    }

    #[test]
    fn test_nonce_expires() {
        let authority = NonceTokenAuthority::new(Duration::from_secs(60));
        let now = Utc::now();
        let (token, _) = authority.issue(&hashes(&["a"]), now);
        assert!(!authority.validate(&token, &hashes(&["a"]), now + TimeDelta::seconds(61)));
        assert!(!authority.validate("made-up", &hashes(&["a"]), now));
    }
}
