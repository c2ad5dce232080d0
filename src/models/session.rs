use axum::http::HeaderMap;
use thiserror::Error;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("missing authenticated user")]
pub struct MissingSession;

/// The authenticated buyer, passed explicitly into every checkout and
/// progress call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: String,
    pub email: Option<String>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, email: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email,
        }
    }

    /// Identity is established upstream; we only read what the auth layer
    /// forwarded.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, MissingSession> {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };

        let user_id = header(USER_ID_HEADER).ok_or(MissingSession)?;
        Ok(Self::new(user_id, header(USER_EMAIL_HEADER)))
    }
}
