//! HTTP Basic auth for the single admin account.

use axum::{
    Json,
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;
use zeroize::Zeroizing;

/// Login of the admin account
pub const ADMIN_USER: &str = "admin";

const REALM: &str = "Basic realm=\"Authorization Required\"";

/// The admin account accepted by the API.
pub struct AdminCredentials {
    user: String,
    password: Zeroizing<String>,
}

impl AdminCredentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: Zeroizing::new(password.into()),
        }
    }

    /// The `admin` account with a random password.
    pub fn generate() -> Self {
        Self::new(ADMIN_USER, Uuid::new_v4().to_string())
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Checks a raw `Authorization` header value.
    pub fn verify_header(&self, value: &str) -> bool {
        let Some(encoded) = value.strip_prefix("Basic ") else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let decoded = Zeroizing::new(decoded);
        let Ok(text) = std::str::from_utf8(&decoded) else {
            return false;
        };

        match text.split_once(':') {
            Some((user, password)) => {
                // Both halves are always compared.
                let user_ok = constant_time_eq(user.as_bytes(), self.user.as_bytes());
                let password_ok = constant_time_eq(password.as_bytes(), self.password.as_bytes());
                user_ok & password_ok
            }
            None => false,
        }
    }
}

impl fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("user", &self.user)
            .field("password", &"****")
            .finish()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0_u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Extractor: requires valid admin Basic credentials.
#[derive(Debug)]
pub struct AdminAuth;

impl<S> FromRequestParts<S> for AdminAuth
where
    S: Send + Sync,
    Arc<AdminCredentials>: FromRef<S>,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let credentials = Arc::<AdminCredentials>::from_ref(state);

        let authorized = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .is_some_and(|h| credentials.verify_header(h));

        if authorized {
            Ok(AdminAuth)
        } else {
            tracing::debug!(uri = %parts.uri, "Rejected unauthenticated request");
            Err((
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, REALM)],
                Json(serde_json::json!({ "Error": "Unauthorized" })),
            )
                .into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_for(user: &str, password: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
    }

    #[test]
    fn test_verify_header() {
        let credentials = AdminCredentials::new("admin", "s3cret:with-colon");

        assert!(credentials.verify_header(&header_for("admin", "s3cret:with-colon")));
        assert!(!credentials.verify_header(&header_for("admin", "s3cret")));
        assert!(!credentials.verify_header(&header_for("root", "s3cret:with-colon")));
        assert!(!credentials.verify_header("Bearer abc"));
        assert!(!credentials.verify_header("Basic not-base64!"));
        assert!(!credentials.verify_header(&format!("Basic {}", STANDARD.encode("admin"))));
    }

    #[test]
    fn test_generated_password_is_random() {
        let first = AdminCredentials::generate();
        let second = AdminCredentials::generate();

        assert_eq!(first.user(), ADMIN_USER);
        assert_ne!(first.password(), second.password());
        assert!(Uuid::parse_str(first.password()).is_ok());
    }

    #[test]
    fn test_debug_hides_password() {
        let credentials = AdminCredentials::new("admin", "hunter2");
        let debug = format!("{:?}", credentials);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("****"));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
