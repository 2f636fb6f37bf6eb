//! Bearer-token claim extraction.
//!
//! Credentials are verified upstream by a gateway;
//! this module only decodes the claims a trusted bearer token carries. When
//! `JWT_VERIFY` is enabled and a shared secret is configured, the signature
//! is checked locally as a defense-in-depth measure. Otherwise the token is
//! treated as already-verified opaque claims and only its payload segment
//! is decoded.

use axum::http::HeaderMap;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::Value;

use govrun_core::config::RuntimeConfig;

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn parse_algorithm(name: &str) -> Algorithm {
    match name.to_uppercase().as_str() {
        "HS384" => Algorithm::HS384,
        "HS512" => Algorithm::HS512,
        "RS256" => Algorithm::RS256,
        _ => Algorithm::HS256,
    }
}

/// Decode the claims of the request's bearer token, if any. Returns `None` when there is no bearer token, or when local
/// verification is enabled and the token fails to verify.
pub fn extract_claims(config: &RuntimeConfig, headers: &HeaderMap) -> Option<Value> {
    let token = bearer_token(headers)?;

    if config.jwt_verify {
        let secret = config.jwt_secret.as_deref()?;
        let mut validation = Validation::new(parse_algorithm(&config.jwt_alg));
        validation.validate_exp = true;
        let key = DecodingKey::from_secret(secret.as_bytes());
        return jsonwebtoken::decode::<Value>(token, &key, &validation)
            .map(|data| data.claims)
            .ok();
    }

    decode_unverified(token)
}

/// Decode a JWT's payload segment without checking its signature. Used when
/// the gateway has already verified the token and only forwards it for
/// claim extraction.
fn decode_unverified(token: &str) -> Option<Value> {
    let payload_segment = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload_segment).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_token(header: &str, payload: &str) -> String {
        let h = URL_SAFE_NO_PAD.encode(header);
        let p = URL_SAFE_NO_PAD.encode(payload);
        format!("{h}.{p}.sig")
    }

    #[test]
    fn decode_unverified_reads_payload_claims() {
        let token = make_token(r#"{"alg":"HS256"}"#, r#"{"sub":"u1","email":"a@b.com"}"#);
        let claims = decode_unverified(&token).unwrap();
        assert_eq!(claims["sub"], "u1");
        assert_eq!(claims["email"], "a@b.com");
    }

    #[test]
    fn extract_claims_returns_none_without_bearer_header() {
        let config = RuntimeConfig {
            db_url: String::new(),
            policy_path: std::path::PathBuf::new(),
            dev_mode: false,
            jwt_secret: None,
            jwt_alg: "HS256".to_string(),
            jwt_verify: false,
            api_host: String::new(),
            api_port: 0,
            idempotency_ttl: std::time::Duration::from_secs(1),
            idempotency_cleanup_interval: std::time::Duration::from_secs(1),
            connector_name: "mock".to_string(),
        };
        let headers = HeaderMap::new();
        assert!(extract_claims(&config, &headers).is_none());
    }

    #[test]
    fn extract_claims_decodes_unverified_when_jwt_verify_disabled() {
        let config = RuntimeConfig {
            db_url: String::new(),
            policy_path: std::path::PathBuf::new(),
            dev_mode: false,
            jwt_secret: None,
            jwt_alg: "HS256".to_string(),
            jwt_verify: false,
            api_host: String::new(),
            api_port: 0,
            idempotency_ttl: std::time::Duration::from_secs(1),
            idempotency_cleanup_interval: std::time::Duration::from_secs(1),
            connector_name: "mock".to_string(),
        };
        let token = make_token(r#"{"alg":"HS256"}"#, r#"{"sub":"u1"}"#);
        let mut headers = HeaderMap::new();
        headers.insert("authorization", format!("Bearer {token}").parse().unwrap());
        let claims = extract_claims(&config, &headers).unwrap();
        assert_eq!(claims["sub"], "u1");
    }
}
