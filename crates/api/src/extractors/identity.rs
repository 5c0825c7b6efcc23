//! Admission-control identity extraction (§4.4, §11).
//!
//! Pulls the raw signals the Admission Controller needs to derive a rate
//! limit identifier: an authenticated user id if present, an API key prefix
//! otherwise, falling back to the client IP. This crate carries no
//! authentication of its own (see `domain::models::user`), so "authenticated
//! user id" here means whatever upstream identity header a deployment
//! chooses to trust — we read `X-User-Id` if set and parses as a UUID.

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::net::SocketAddr;
use uuid::Uuid;

use domain::models::Tier;
use domain::services::admission::derive_identifier;

use crate::error::ApiError;

const USER_ID_HEADER: &str = "x-user-id";
const API_KEY_HEADER: &str = "x-api-key";
const API_KEY_PREFIX_LEN: usize = 8;
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
const USER_TIER_HEADER: &str = "x-user-tier";

/// Resolves the requester's tier (§4.4). Until deployments front this
/// service with real authentication (out of scope, §1), every caller is
/// rated at the `free` tier unless `X-User-Tier` names a higher one
/// explicitly — useful for load testing and staging environments.
pub fn resolve_tier(headers: &HeaderMap) -> Tier {
    headers
        .get(USER_TIER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
        .unwrap_or(Tier::Free)
}

/// The admission identifier for one request, already resolved per the
/// precedence in `derive_identifier`: user id, then API key prefix, then
/// client IP (honouring the first hop of `X-Forwarded-For`).
#[derive(Debug, Clone)]
pub struct AdmissionIdentity {
    pub identifier: String,
    pub user_id: Option<Uuid>,
}

#[async_trait]
impl<S> FromRequestParts<S> for AdmissionIdentity
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok());

        let api_key_prefix = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|key| shared::crypto::extract_key_prefix(key, API_KEY_PREFIX_LEN))
            .map(|s| s.to_string());

        let client_ip = client_ip(parts);

        let identifier = derive_identifier(user_id, api_key_prefix.as_deref(), &client_ip);

        Ok(AdmissionIdentity { identifier, user_id })
    }
}

/// The caller's tenant identity. Ownership-scoped routes (devices,
/// geofences, webhooks) require this; there is no authentication of its own
/// in this crate (see `domain::models::user`), so it trusts `X-User-Id` the
/// same way [`AdmissionIdentity`] does.
#[derive(Debug, Clone, Copy)]
pub struct UserId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(UserId)
            .ok_or_else(|| ApiError::InvalidInput("X-User-Id header must be a valid UUID".into()))
    }
}

/// Client IP per §11: the first hop of `X-Forwarded-For` when present,
/// otherwise the socket's peer address.
fn client_ip(parts: &Parts) -> String {
    if let Some(forwarded) = parts
        .headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }

    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, Request};

    fn parts_with_headers(headers: &[(&str, &str)]) -> Parts {
        let mut req = Request::builder().uri("/devices");
        for (name, value) in headers {
            req = req.header(*name, *value);
        }
        let (parts, _) = req.body(()).unwrap().into_parts();
        parts
    }

    #[test]
    fn client_ip_prefers_forwarded_for_first_hop() {
        let parts = parts_with_headers(&[(FORWARDED_FOR_HEADER, "203.0.113.4, 10.0.0.1")]);
        assert_eq!(client_ip(&parts), "203.0.113.4");
    }

    #[test]
    fn client_ip_falls_back_to_unknown_without_connect_info() {
        let parts = parts_with_headers(&[]);
        assert_eq!(client_ip(&parts), "unknown");
    }

    #[test]
    fn header_values_parse_as_expected() {
        let value = HeaderValue::from_static("abcdefgh12345");
        assert_eq!(value.to_str().unwrap(), "abcdefgh12345");
    }
}
