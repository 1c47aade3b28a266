//! Session endpoints: login, refresh, logout, verify, password change, CSRF token.

pub mod csrf_token;
pub mod login;
pub mod logout;
pub mod password;
pub mod refresh;
pub mod types;
pub mod verify;

use axum::http::{HeaderMap, header::SET_COOKIE};

use crate::{api::AuthState, error::AuthError};

/// Fresh CSRF token plus the headers that set its cookie.
fn issue_csrf(state: &AuthState) -> Result<(String, HeaderMap), AuthError> {
    let (token, cookie) = state.csrf().issue()?;
    let mut headers = HeaderMap::new();
    headers.insert(SET_COOKIE, cookie);
    Ok((token, headers))
}
