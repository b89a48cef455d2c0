// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright 2026 Edgecast Cloud LLC.

//! `X-Auth` bearer token verification
//!
//! The lab platform issues HS256 JWTs out of band; this service only
//! verifies them. The `username` claim selects the caller's vCenter
//! folder, so a forged or expired token must be rejected before any
//! request body is even looked at.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Header carrying the bearer token.
pub const AUTH_HEADER: &str = "X-Auth";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing {AUTH_HEADER} header")]
    MissingHeader,

    #[error("{AUTH_HEADER} header is not valid UTF-8")]
    MalformedHeader,

    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

/// Claims this service cares about. Issuer tokens carry more (client IP,
/// token schema version); unknown claims are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Lab username; names the caller's vCenter folder
    pub username: String,
    /// Expiry, unix seconds
    pub exp: i64,
    /// Issued-at, unix seconds
    pub iat: i64,
}

/// Verify a raw token string and return its claims.
///
/// Validation enforces the HS256 algorithm and the `exp` claim; clock skew
/// tolerance is jsonwebtoken's default.
pub fn verify_token(token: &str, secret: &SecretString) -> Result<Claims, AuthError> {
    let key = DecodingKey::from_secret(secret.expose_secret().as_bytes());
    let data = decode::<Claims>(token, &key, &Validation::new(Algorithm::HS256))?;
    Ok(data.claims)
}

/// Authenticate an incoming request from its headers.
///
/// The token is carried in `X-Auth`, either bare or with a conventional
/// `Bearer ` prefix.
pub fn authenticate(
    headers: &http::HeaderMap,
    secret: &SecretString,
) -> Result<Claims, AuthError> {
    let raw = headers.get(AUTH_HEADER).ok_or(AuthError::MissingHeader)?;
    let raw = raw.to_str().map_err(|_| AuthError::MalformedHeader)?;
    let token = raw.strip_prefix("Bearer ").unwrap_or(raw);
    verify_token(token, secret)
}
