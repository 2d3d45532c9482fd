//! HTTP Basic authentication gate.

use axum::body::Body as AxumBody;
use axum::extract::Extension;
use axum::http::{HeaderMap, HeaderValue, Request, header};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Basic};
use std::sync::Arc;

use crate::access::{AccessLog, client_ip};
use crate::config::{BASIC_AUTH_REALM, ServerConfig};
use crate::error::ApiError;

const BASIC_PREFIX: &str = "Basic ";

/// Credentials supplied by the client, not yet checked.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Extracts the `user:pass` pair from an `Authorization: Basic` header.
///
/// Returns `None` when the header is missing, uses another scheme, is not
/// valid base64, or has no `:` separator.
pub fn authenticate(headers: &HeaderMap) -> Option<Credentials> {
    let raw = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    if !raw.starts_with(BASIC_PREFIX) {
        return None;
    }
    let basic = headers.typed_get::<Authorization<Basic>>()?;
    Some(Credentials {
        username: basic.username().to_string(),
        password: basic.password().to_string(),
    })
}

/// Rejects requests without the configured credentials when auth is enabled.
pub async fn require_basic_auth(
    Extension(config): Extension<Arc<ServerConfig>>,
    Extension(access): Extension<Arc<AccessLog>>,
    req: Request<AxumBody>,
    next: middleware::Next,
) -> Response {
    if !config.basic_auth_enabled() {
        return next.run(req).await;
    }

    let supplied = authenticate(req.headers());
    if let Some(credentials) = &supplied
        && credentials.username == config.username
        && credentials.password == config.password
    {
        return next.run(req).await;
    }

    let mut headers = HeaderMap::new();
    headers.insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static(BASIC_AUTH_REALM),
    );
    let error = ApiError::Unauthorized(headers);
    if config.verbose {
        let supplied = supplied.unwrap_or_default();
        access.auth_failure(
            error.status(),
            &client_ip(&req),
            req.method().as_str(),
            req.uri().path(),
            &supplied,
        );
    }
    error.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_authorization(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn decodes_basic_credentials() {
        let credentials =
            authenticate(&with_authorization("Basic YWRtaW46czNjcmV0")).expect("credentials");
        assert_eq!(credentials.username, "admin");
        assert_eq!(credentials.password, "s3cret");
    }

    #[test]
    fn password_may_contain_colons() {
        // "user:pa:ss"
        let credentials =
            authenticate(&with_authorization("Basic dXNlcjpwYTpzcw==")).expect("credentials");
        assert_eq!(credentials.username, "user");
        assert_eq!(credentials.password, "pa:ss");
    }

    #[test]
    fn rejects_malformed_headers() {
        assert_eq!(authenticate(&HeaderMap::new()), None);
        assert_eq!(authenticate(&with_authorization("Bearer abc")), None);
        assert_eq!(authenticate(&with_authorization("basic YWRtaW46czNjcmV0")), None);
        assert_eq!(authenticate(&with_authorization("Basic !!!not-base64")), None);
        // "adminsecret" has no separator
        assert_eq!(authenticate(&with_authorization("Basic YWRtaW5zZWNyZXQ=")), None);
    }
}
