use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::token::{Claim, TokenCodec, TokenError};

/// Claim fields that may carry the user identifier, in lookup order.
/// `userId` is what we issue; `id` is accepted from older issuers.
pub const USER_ID_FIELDS: &[&str] = &["userId", "id"];

/// Who is making the request. Built fresh for every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Authenticated(String),
    Guest,
}

impl Identity {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Identity::Authenticated(id) => Some(id.as_str()),
            Identity::Guest => None,
        }
    }
}

/// Whether a route accepts guests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthRequirement {
    Required,
    Optional,
}

/// A credential outcome that ends the request with 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("no credential supplied")]
    NoCredential,
    #[error("invalid credential: {0}")]
    InvalidCredential(TokenError),
    #[error("token verified but carries no user identifier")]
    IncompleteClaim,
}

/// Turn the raw `Authorization` header value into an identity.
///
/// Missing or unusable credentials become `Guest` on optional routes and a
/// rejection on required ones. A verified token without a user identifier is
/// rejected on every route, since it points at a broken issuer.
pub fn resolve(
    codec: &TokenCodec,
    header: Option<&str>,
    requirement: AuthRequirement,
) -> Result<Identity, Rejection> {
    let Some(header) = header else {
        return match requirement {
            AuthRequirement::Required => Err(Rejection::NoCredential),
            AuthRequirement::Optional => Ok(Identity::Guest),
        };
    };

    let decoded = header
        .strip_prefix("Bearer ")
        .ok_or(TokenError::Malformed)
        .and_then(|token| codec.decode(token));

    let claim = match decoded {
        Ok(claim) => claim,
        Err(e) => {
            return match requirement {
                AuthRequirement::Required => Err(Rejection::InvalidCredential(e)),
                AuthRequirement::Optional => {
                    debug!("Unusable credential on optional route ({}), continuing as guest", e);
                    Ok(Identity::Guest)
                }
            };
        }
    };

    canonical_user_id(&claim)
        .map(Identity::Authenticated)
        .ok_or(Rejection::IncompleteClaim)
}

/// First non-empty identifier among `USER_ID_FIELDS`. Numeric ids from
/// older issuers are accepted and rendered as strings.
fn canonical_user_id(claim: &Claim) -> Option<String> {
    USER_ID_FIELDS
        .iter()
        .filter_map(|field| match claim.get(field)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .next()
}
