use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Why a token could not be used. Callers on the request path treat all
/// three the same way; the distinction exists for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("signature does not verify")]
    InvalidSignature,
    #[error("token is malformed")]
    Malformed,
    #[error("token has expired")]
    Expired,
}

/// Verified token payload, field names exactly as the issuer wrote them.
#[derive(Debug, Clone)]
pub struct Claim {
    fields: Map<String, Value>,
}

impl Claim {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Payload written by `TokenCodec::issue`. `userId` is the canonical field.
#[derive(Serialize)]
struct IssuedClaims<'a> {
    #[serde(rename = "userId")]
    user_id: &'a str,
    iat: i64,
    exp: i64,
}

/// HS256 signer/verifier for identity tokens. The secret is handed in at
/// construction; nothing here reads the environment.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenCodec {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::new(Algorithm::HS256),
            ttl,
        }
    }

    pub fn issue(&self, user_id: &str) -> anyhow::Result<String> {
        let now = Utc::now();
        let claims = IssuedClaims {
            user_id,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok(token)
    }

    pub fn decode(&self, token: &str) -> Result<Claim, TokenError> {
        decode::<Map<String, Value>>(token, &self.decoding, &self.validation)
            .map(|data| Claim {
                fields: data.claims,
            })
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => TokenError::InvalidSignature,
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Malformed,
            })
    }
}
