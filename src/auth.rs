use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use std::{collections::HashSet, convert::Infallible, sync::Arc};
use thiserror::Error;

use crate::{
    config::{AppConfig, TokenVerification},
    models::Claims,
};

/// Maximum accepted token length (8 KiB).
const MAX_TOKEN_SIZE: usize = 8 * 1024;

/// Maximum accepted `Cookie` header length (16 KiB).
const MAX_COOKIE_SIZE: usize = 16 * 1024;

/// DecodeError
///
/// Why a cookie value could not be turned into claims. Callers never
/// distinguish these beyond logging: every variant means "invalid token".
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("token is empty")]
    Empty,

    #[error("token must have three dot-separated segments")]
    Structure,

    #[error("token payload is not base64url: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("token payload is not a claims object: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("token rejected: {0}")]
    Rejected(#[from] jsonwebtoken::errors::Error),
}

/// Credential
///
/// The three token states the decision engine distinguishes.
#[derive(Debug, Clone, PartialEq)]
pub enum Credential {
    /// No cookie, or an empty one.
    Absent,
    /// A cookie was present but did not decode.
    Malformed,
    Valid(Claims),
}

impl Credential {
    pub fn claims(&self) -> Option<&Claims> {
        match self {
            Self::Valid(claims) => Some(claims),
            _ => None,
        }
    }
}

// --- Token Extractor ---

/// extract_token
///
/// Returns the value of the named cookie, looking through every `Cookie`
/// header. Quoted values are unquoted. Empty or oversized values are
/// treated as absent.
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    for cookie_header in headers.get_all(header::COOKIE) {
        if cookie_header.len() > MAX_COOKIE_SIZE {
            continue;
        }
        let Ok(cookies) = cookie_header.to_str() else {
            continue;
        };

        for pair in cookies.split(';') {
            let Some((name, value)) = pair.trim().split_once('=') else {
                continue;
            };
            if name.trim() != cookie_name {
                continue;
            }

            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .unwrap_or(value);

            if value.is_empty() || value.len() > MAX_TOKEN_SIZE {
                return None;
            }
            return Some(value.to_string());
        }
    }
    None
}

// --- Token Decoder ---

/// TokenDecoder
///
/// Turns a raw cookie value into claims. `Unverified` is a structural parse
/// with no signature or expiry check and trusts whoever set the cookie.
/// `Hs256` requires a valid HMAC-SHA256 signature and an unexpired `exp`.
#[derive(Clone)]
pub enum TokenDecoder {
    Unverified,
    Hs256 {
        key: DecodingKey,
        validation: Validation,
    },
}

impl TokenDecoder {
    pub fn hs256(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // exp is checked when present but not demanded.
        validation.required_spec_claims = HashSet::new();
        validation.validate_exp = true;
        validation.validate_aud = false;

        Self::Hs256 {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn from_config(verification: &TokenVerification) -> Self {
        match verification {
            TokenVerification::Unverified => Self::Unverified,
            TokenVerification::Hs256 { secret } => Self::hs256(secret),
        }
    }

    pub fn decode(&self, raw: &str) -> Result<Claims, DecodeError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DecodeError::Empty);
        }

        match self {
            Self::Unverified => decode_unverified(raw),
            Self::Hs256 { key, validation } => {
                Ok(decode::<Claims>(raw, key, validation)?.claims)
            }
        }
    }
}

fn decode_unverified(raw: &str) -> Result<Claims, DecodeError> {
    let mut segments = raw.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(DecodeError::Structure);
    };

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    Ok(serde_json::from_slice(&bytes)?)
}

// --- Credential Resolution ---

/// CredentialReader
///
/// Token Extractor plus Token Decoder, configured once at startup.
#[derive(Clone)]
pub struct CredentialReader {
    cookie_name: String,
    decoder: TokenDecoder,
}

/// CredentialState
///
/// The shared handle stored in the application state.
pub type CredentialState = Arc<CredentialReader>;

impl CredentialReader {
    pub fn new(cookie_name: impl Into<String>, decoder: TokenDecoder) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            decoder,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.cookie_name.clone(),
            TokenDecoder::from_config(&config.token_verification),
        )
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// read
    ///
    /// Resolves the request's credential. Decode failures are folded into
    /// `Credential::Malformed` and logged at debug level without the token.
    pub fn read(&self, headers: &HeaderMap) -> Credential {
        let Some(token) = extract_token(headers, &self.cookie_name) else {
            return Credential::Absent;
        };

        match self.decoder.decode(&token) {
            Ok(claims) => Credential::Valid(claims),
            Err(err) => {
                tracing::debug!(error = %err, "access token did not decode");
                Credential::Malformed
            }
        }
    }
}

/// Credential Extractor Implementation
///
/// Lets handlers take the caller's `Credential` as an argument. Never
/// rejects: an anonymous or broken cookie is a credential state, not an
/// error.
impl<S> FromRequestParts<S> for Credential
where
    S: Send + Sync,
    CredentialState: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let reader = CredentialState::from_ref(state);
        Ok(reader.read(&parts.headers))
    }
}
