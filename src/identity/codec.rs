//! Access token claim decoding. Signatures are not checked here; the server does that.

use std::time::Duration;

use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::error::{AuthError, AuthResult};

/// Skew applied to every expiry check unless configured otherwise.
pub const DEFAULT_SKEW_SECS: u64 = 60;
/// Configured skews are capped at one day.
pub const MAX_SKEW_SECS: u64 = 24 * 60 * 60;

const NAME_IDENTIFIER_CLAIM: &str = "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub subject_id: String,
    /// `None` when the token carries no `exp`; such tokens count as expired.
    pub expires_at: Option<DateTime<Utc>>,
}

impl Claims {
    pub fn is_expired_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        let Some(exp) = self.expires_at else { return true; };
        // a skew past chrono's range leaves no instant the token could still be valid at
        let Ok(skew) = chrono::Duration::from_std(skew) else { return true; };
        match now.checked_add_signed(skew) {
            Some(limit) => exp <= limit,
            None => true,
        }
    }
}

pub fn decode(token: &str) -> AuthResult<Claims> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_sig)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(AuthError::MalformedToken);
    };
    if parts.next().is_some() { return Err(AuthError::MalformedToken); }
    // Some issuers pad the segments even though the compact form should not.
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|_| AuthError::MalformedToken)?;
    let claims: Value = serde_json::from_slice(&bytes).map_err(|_| AuthError::MalformedToken)?;
    let Value::Object(map) = claims else { return Err(AuthError::MalformedToken); };

    let subject_id = map.get("sub")
        .or_else(|| map.get(NAME_IDENTIFIER_CLAIM))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let expires_at = match map.get("exp") {
        None | Some(Value::Null) => None,
        Some(v) => {
            let secs = v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)).ok_or(AuthError::MalformedToken)?;
            Some(Utc.timestamp_opt(secs, 0).single().ok_or(AuthError::MalformedToken)?)
        }
    };
    Ok(Claims { subject_id, expires_at })
}

/// True when the token expires within `skew` of now. Undecodable tokens count as expired.
pub fn is_expired(token: &str, skew: Duration) -> bool {
    match decode(token) {
        Ok(c) => c.is_expired_at(Utc::now(), skew),
        Err(_) => true,
    }
}

/// Build an unsigned compact token with the given claims. Handy for tests and local tooling.
pub fn encode_unsigned(claims: &Value) -> String {
    let enc = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let header = enc.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = enc.encode(claims.to_string().as_bytes());
    format!("{}.{}.sig", header, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token_expiring_in(secs: i64) -> String {
        encode_unsigned(&json!({"sub": "u-1", "exp": Utc::now().timestamp() + secs}))
    }

    #[test]
    fn decodes_subject_and_expiry() {
        let t = encode_unsigned(&json!({"sub": "42", "exp": 1_900_000_000}));
        let c = decode(&t).unwrap();
        assert_eq!(c.subject_id, "42");
        assert_eq!(c.expires_at.unwrap().timestamp(), 1_900_000_000);
    }

    #[test]
    fn falls_back_to_name_identifier_claim() {
        let mut claims = serde_json::Map::new();
        claims.insert(NAME_IDENTIFIER_CLAIM.into(), json!("abc"));
        claims.insert("exp".into(), json!(1_900_000_000));
        let t = encode_unsigned(&Value::Object(claims));
        assert_eq!(decode(&t).unwrap().subject_id, "abc");
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(decode("not-a-token"), Err(AuthError::MalformedToken));
        assert_eq!(decode("a.!!!.c"), Err(AuthError::MalformedToken));
        assert_eq!(decode("a.b.c.d"), Err(AuthError::MalformedToken));
        let not_object = format!("x.{}.y", base64::engine::general_purpose::URL_SAFE_NO_PAD.encode("[1,2]"));
        assert_eq!(decode(&not_object), Err(AuthError::MalformedToken));
    }

    #[test]
    fn skew_window_counts_as_expired() {
        let skew = Duration::from_secs(DEFAULT_SKEW_SECS);
        // expires in 30s, skew 60s: refresh now
        assert!(is_expired(&token_expiring_in(30), skew));
        assert!(!is_expired(&token_expiring_in(600), skew));
        assert!(is_expired(&token_expiring_in(-5), Duration::ZERO));
    }

    #[test]
    fn oversized_skew_counts_as_expired_without_panicking() {
        let t = token_expiring_in(3600);
        assert!(is_expired(&t, Duration::from_secs(9_000_000_000_000)));
        assert!(is_expired(&t, Duration::MAX));
        let claims = decode(&t).unwrap();
        assert!(claims.is_expired_at(Utc::now(), Duration::from_secs(u64::MAX / 2)));
        assert!(!claims.is_expired_at(Utc::now(), Duration::from_secs(60)));
    }

    #[test]
    fn missing_exp_is_expired() {
        let t = encode_unsigned(&json!({"sub": "1"}));
        assert!(decode(&t).unwrap().expires_at.is_none());
        assert!(is_expired(&t, Duration::ZERO));
        assert!(is_expired("garbage", Duration::ZERO));
    }
}
