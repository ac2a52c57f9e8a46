//! Signed, expiring download tokens (compact HS256 JWTs).

use crate::error::TokenError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Claims {
    file_id: String,
    exp: i64,
    iat: i64,
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct TokenService {
    secret: Vec<u8>,
    default_ttl: i64,
    max_ttl: i64,
}

impl TokenService {
    pub fn new(secret: &str, default_ttl: i64, max_ttl: i64) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            default_ttl,
            max_ttl,
        }
    }

    fn mac(&self, signing_input: &str) -> Result<HmacSha256, TokenError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|_| TokenError::InvalidKey)?;
        mac.update(signing_input.as_bytes());
        Ok(mac)
    }

    /// Lifetime actually granted for a requested one: missing or
    /// non-positive requests get the default, larger ones the maximum.
    pub fn effective_ttl(&self, requested: Option<i64>) -> i64 {
        match requested {
            Some(ttl) if ttl > 0 => ttl.min(self.max_ttl),
            _ => self.default_ttl,
        }
    }

    pub fn issue(&self, file_id: &str, ttl: Option<i64>) -> Result<String, TokenError> {
        self.issue_at(file_id, ttl, now_secs())
    }

    fn issue_at(&self, file_id: &str, ttl: Option<i64>, now: i64) -> Result<String, TokenError> {
        let claims = Claims {
            file_id: file_id.to_string(),
            exp: now + self.effective_ttl(ttl),
            iat: now,
        };
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(HEADER),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?)
        );
        let signature = self.mac(&signing_input)?.finalize().into_bytes();
        debug!(file_id, exp = claims.exp, "token issued");
        Ok(format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature)))
    }

    /// File id carried by a valid, unexpired token.
    pub fn verify(&self, token: &str) -> Result<String, TokenError> {
        self.verify_at(token, now_secs())
    }

    fn verify_at(&self, token: &str, now: i64) -> Result<String, TokenError> {
        let mut parts = token.trim().split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let signature = URL_SAFE_NO_PAD.decode(signature).map_err(|_| TokenError::Malformed)?;
        self.mac(&format!("{header}.{payload}"))?
            .verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let payload = URL_SAFE_NO_PAD.decode(payload).map_err(|_| TokenError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;
        if claims.exp <= now {
            return Err(TokenError::Expired);
        }
        Ok(claims.file_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("dev_secret_key", 300, 3600)
    }

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn hmac_matches_rfc4231_case_2() {
        assert_eq!(
            hex(&TokenService::new("Jefe", 300, 3600)
                .mac("what do ya want for nothing?")
                .unwrap()
                .finalize()
                .into_bytes()),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn ttl_is_clamped() {
        let s = service();
        assert_eq!(s.effective_ttl(None), 300);
        assert_eq!(s.effective_ttl(Some(0)), 300);
        assert_eq!(s.effective_ttl(Some(-5)), 300);
        assert_eq!(s.effective_ttl(Some(60)), 60);
        assert_eq!(s.effective_ttl(Some(99_999)), 3600);
    }

    #[test]
    fn issued_token_verifies_until_expiry() {
        let s = service();
        let token = s.issue_at("abc123", Some(60), 1_000).unwrap();
        assert_eq!(token.split('.').count(), 3);
        assert!(!token.contains('='));
        assert_eq!(s.verify_at(&token, 1_059).unwrap(), "abc123");
        assert!(matches!(s.verify_at(&token, 1_060), Err(TokenError::Expired)));
    }

    #[test]
    fn payload_carries_standard_claims() {
        let token = service().issue_at("f", None, 10).unwrap();
        let payload = token.split('.').nth(1).unwrap();
        let claims: Claims = serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();
        assert_eq!(
            claims,
            Claims {
                file_id: "f".into(),
                exp: 310,
                iat: 10
            }
        );
    }

    #[test]
    fn tampering_and_wrong_keys_are_rejected() {
        let s = service();
        let token = s.issue("abc", None).unwrap();
        let other = TokenService::new("another key", 300, 3600);
        assert!(matches!(other.verify(&token), Err(TokenError::BadSignature)));

        let forged_payload = URL_SAFE_NO_PAD.encode(r#"{"file_id":"evil","exp":9999999999,"iat":0}"#);
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = &forged_payload;
        assert!(matches!(s.verify(&parts.join(".")), Err(TokenError::BadSignature)));

        assert!(matches!(s.verify("not-a-token"), Err(TokenError::Malformed)));
        assert!(matches!(s.verify("a.b.c.d"), Err(TokenError::Malformed)));

        let mut truncated: Vec<&str> = token.split('.').collect();
        let short_sig = URL_SAFE_NO_PAD.encode([0u8; 4]);
        truncated[2] = &short_sig;
        assert!(matches!(s.verify(&truncated.join(".")), Err(TokenError::BadSignature)));
    }
}
