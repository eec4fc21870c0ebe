use crate::routes::AppState;
use actix_web::dev::Payload;
use actix_web::http::{header, StatusCode};
use actix_web::{web, FromRequest, HttpRequest, HttpResponse, ResponseError};
use futures::future::{ready, Ready};
use thiserror::Error;

#[derive(Error, Debug)]
#[error("Invalid credentials")]
pub struct Unauthorized;

impl ResponseError for Unauthorized {
    fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::Unauthorized()
            .insert_header((header::WWW_AUTHENTICATE, "Basic"))
            .body("Invalid credentials")
    }
}

/// Extractor guarding every endpoint: the request must carry HTTP Basic
/// credentials matching the configured pair.
pub struct BasicUser;

impl FromRequest for BasicUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(verify(req).map(|_| BasicUser).map_err(Into::into))
    }
}

fn verify(req: &HttpRequest) -> Result<(), Unauthorized> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or(Unauthorized)?;

    let header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(Unauthorized)?;
    let encoded = header.strip_prefix("Basic ").ok_or(Unauthorized)?;
    let decoded = base64::decode(encoded.trim()).map_err(|_| Unauthorized)?;
    let decoded = String::from_utf8(decoded).map_err(|_| Unauthorized)?;
    let (username, password) = decoded.split_once(':').ok_or(Unauthorized)?;

    let username_ok = constant_time_eq(
        username.as_bytes(),
        state.settings.auth_username.as_bytes(),
    );
    let password_ok = constant_time_eq(
        password.as_bytes(),
        state.settings.auth_password.as_bytes(),
    );
    if username_ok && password_ok {
        Ok(())
    } else {
        Err(Unauthorized)
    }
}

// compare without early exit so timing doesn't leak the prefix length
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_compares_bytes() {
        assert!(constant_time_eq(b"secret", b"secret"));
        assert!(!constant_time_eq(b"secret", b"secres"));
        assert!(!constant_time_eq(b"secret", b"secre"));
        assert!(constant_time_eq(b"", b""));
    }
}
