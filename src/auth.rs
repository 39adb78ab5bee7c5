//! Shared-credential HTTP Basic authentication.
//!
//! Every route, the WebSocket endpoint included, sits behind
//! [`require_basic_auth`].

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, WWW_AUTHENTICATE},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::config::AuthConfig;

/// Challenge sent with every rejection.
pub const CHALLENGE: &str = r#"Basic realm="restricted""#;

/// Why a request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    /// No `Authorization` header
    Missing,
    /// Header present but not decodable `Basic user:pass`
    Malformed,
    /// Well-formed but wrong username or password
    Mismatch,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let mut response = (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        response
            .headers_mut()
            .insert(WWW_AUTHENTICATE, HeaderValue::from_static(CHALLENGE));
        response
    }
}

/// The single username/password pair accepted by the server.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Checks the `Authorization` header of a request.
    pub fn check(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let header = headers.get(AUTHORIZATION).ok_or(AuthError::Missing)?;
        let header = header.to_str().map_err(|_| AuthError::Malformed)?;

        let encoded = header.strip_prefix("Basic ").unwrap_or(header).trim();
        let decoded = STANDARD
            .decode(encoded)
            .map_err(|_| AuthError::Malformed)?;
        let decoded = String::from_utf8(decoded).map_err(|_| AuthError::Malformed)?;

        let (username, password) = decoded.split_once(':').ok_or(AuthError::Malformed)?;
        if username == self.username && password == self.password {
            Ok(())
        } else {
            Err(AuthError::Mismatch)
        }
    }

    /// Builds the header value a client would send for these credentials.
    pub fn header_value(&self) -> String {
        format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", self.username, self.password))
        )
    }
}

impl From<&AuthConfig> for Credentials {
    fn from(config: &AuthConfig) -> Self {
        Credentials::new(config.username.clone(), config.password.clone())
    }
}

/// Axum middleware that rejects requests without the shared credential.
///
/// Accepted requests pass through unmodified.
pub async fn require_basic_auth(
    State(credentials): State<Arc<Credentials>>,
    request: Request,
    next: Next,
) -> Response {
    match credentials.check(request.headers()) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            tracing::debug!(uri = %request.uri(), reason = ?e, "rejected request");
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn basic(raw: &str) -> HeaderMap {
        headers(&format!("Basic {}", STANDARD.encode(raw)))
    }

    #[test]
    fn test_valid_credentials() {
        let creds = Credentials::new("admin", "secret");
        assert_eq!(creds.check(&basic("admin:secret")), Ok(()));
        assert_eq!(creds.check(&headers(&creds.header_value())), Ok(()));
    }

    #[test]
    fn test_password_may_contain_colon() {
        let creds = Credentials::new("admin", "se:cret");
        assert_eq!(creds.check(&basic("admin:se:cret")), Ok(()));
    }

    #[test]
    fn test_rejections() {
        let creds = Credentials::new("admin", "secret");

        assert_eq!(creds.check(&HeaderMap::new()), Err(AuthError::Missing));
        assert_eq!(creds.check(&headers("Basic !!!")), Err(AuthError::Malformed));
        assert_eq!(creds.check(&basic("adminsecret")), Err(AuthError::Malformed));
        assert_eq!(creds.check(&basic("admin:wrong")), Err(AuthError::Mismatch));
        assert_eq!(creds.check(&basic("root:secret")), Err(AuthError::Mismatch));
    }

    #[test]
    fn test_rejection_response() {
        let response = AuthError::Mismatch.into_response();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            response.headers().get(WWW_AUTHENTICATE).unwrap(),
            CHALLENGE
        );
    }
}
