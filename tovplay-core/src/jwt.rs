//! Local bearer-token inspection.
//!
//! Signatures are not checked here; the server does that on every request.
//! The client only needs the expiry claim to decide whether to route the user
//! to a protected view or back to login.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde_json::{Map, Value};
use thiserror::Error;

const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("token has no payload segment")]
    MissingPayload,
    #[error("token payload is not valid base64url")]
    Base64,
    #[error("token payload is not valid UTF-8")]
    Utf8,
    #[error("token payload is not a JSON object")]
    Json,
}

/// Decoded payload claims.
#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    fields: Map<String, Value>,
}

impl Claims {
    /// `exp` in whole seconds since the epoch. A zero or non-numeric claim is
    /// treated as absent.
    pub fn expiry(&self) -> Option<i64> {
        let exp = self.fields.get("exp")?;
        let secs = match exp.as_i64() {
            Some(secs) => secs,
            None => exp.as_f64().filter(|f| f.is_finite())?.trunc() as i64,
        };
        (secs != 0).then_some(secs)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn subject(&self) -> Option<&str> {
        self.fields.get("sub").and_then(Value::as_str)
    }
}

pub fn decode(token: &str) -> Result<Claims, TokenError> {
    let payload = token
        .split('.')
        .nth(1)
        .filter(|segment| !segment.is_empty())
        .ok_or(TokenError::MissingPayload)?;

    let bytes = PAYLOAD_ENGINE
        .decode(payload)
        .map_err(|_| TokenError::Base64)?;
    let text = String::from_utf8(bytes).map_err(|_| TokenError::Utf8)?;

    match serde_json::from_str::<Value>(&text) {
        Ok(Value::Object(fields)) => Ok(Claims { fields }),
        _ => Err(TokenError::Json),
    }
}

pub fn is_valid(token: Option<&str>, now: i64) -> bool {
    let Some(token) = token else {
        return false;
    };

    match decode(token) {
        Ok(claims) => match claims.expiry() {
            Some(exp) => now < exp,
            None => false,
        },
        Err(e) => {
            tracing::debug!("Rejecting malformed token: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn mint(claims: Value) -> String {
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap()
    }

    fn raw(payload: &str) -> String {
        format!(
            "eyJhbGciOiJIUzI1NiJ9.{}.sig",
            base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[test]
    fn decodes_claims_from_signed_token() {
        let token = mint(json!({"sub": "user-7", "exp": 2_000_000_000i64}));
        let claims = decode(&token).unwrap();
        assert_eq!(claims.subject(), Some("user-7"));
        assert_eq!(claims.expiry(), Some(2_000_000_000));
    }

    #[test]
    fn valid_until_expiry_second() {
        let token = mint(json!({"exp": 1_000}));
        assert!(is_valid(Some(&token), 999));
        assert!(!is_valid(Some(&token), 1_000));
        assert!(!is_valid(Some(&token), 1_001));
    }

    #[test]
    fn expired_one_second_ago_is_invalid() {
        let now = 1_700_000_000;
        let token = mint(json!({"exp": now - 1}));
        assert!(!is_valid(Some(&token), now));
    }

    #[test]
    fn absent_token_is_invalid() {
        assert!(!is_valid(None, 0));
    }

    #[test]
    fn missing_or_zero_expiry_is_invalid() {
        assert!(!is_valid(Some(&mint(json!({"sub": "x"}))), 0));
        assert!(!is_valid(Some(&raw(r#"{"exp":0}"#)), -5));
        assert!(!is_valid(Some(&raw(r#"{"exp":"2000000000"}"#)), 0));
    }

    #[test]
    fn fractional_expiry_is_truncated() {
        let token = raw(r#"{"exp":1000.9}"#);
        assert!(is_valid(Some(&token), 999));
        assert!(!is_valid(Some(&token), 1000));
    }

    #[test]
    fn padded_payload_is_accepted() {
        let padded = format!(
            "h.{}.s",
            base64::engine::general_purpose::URL_SAFE.encode(r#"{"exp":10}"#)
        );
        assert!(padded.contains('='));
        assert!(is_valid(Some(&padded), 5));
    }

    #[test]
    fn non_ascii_claims_decode_as_utf8() {
        let token = raw(r#"{"name":"שלום","exp":10}"#);
        let claims = decode(&token).unwrap();
        assert_eq!(claims.get("name"), Some(&json!("שלום")));
    }

    #[test]
    fn malformed_tokens_report_the_failing_step() {
        assert_eq!(decode("no-dots"), Err(TokenError::MissingPayload));
        assert_eq!(decode("a..c"), Err(TokenError::MissingPayload));
        assert_eq!(decode("a.!!!.c"), Err(TokenError::Base64));
        assert_eq!(
            decode(&format!(
                "a.{}.c",
                base64::engine::general_purpose::URL_SAFE_NO_PAD.encode([0xff, 0xfe])
            )),
            Err(TokenError::Utf8)
        );
        assert_eq!(decode(&raw("[1,2]")), Err(TokenError::Json));
        assert_eq!(decode(&raw("not json")), Err(TokenError::Json));
    }
}
