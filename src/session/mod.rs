//! Session management
//!
//! Resolves a configured [`Identity`] into a [`Session`] by logging in
//! against the API. Whether a failed login aborts the run or only skips the
//! identity is decided by the scenario runner, not here.

use crate::api::{paths, ApiClient, ApiError};
use crate::metrics;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Authentication errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Login rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Login endpoint unreachable: {0}")]
    Transport(#[from] ApiError),

    #[error("Malformed login response: {0}")]
    MalformedResponse(String),
}

/// A test account, as configured
#[derive(Clone, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl Identity {
    pub fn new(
        email: impl Into<String>,
        password: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            name: Some(name.into()),
        }
    }

    /// Display name, falling back to the email handle
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.email)
    }

    /// Display name reduced to `[a-z0-9_]`, for file names
    pub fn slug(&self) -> String {
        self.display_name()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .finish()
    }
}

/// An authenticated identity's credential for the run
#[derive(Clone)]
pub struct Session {
    identity: Identity,
    token: String,
    user_id: Option<String>,
}

impl Session {
    pub fn new(identity: Identity, token: impl Into<String>, user_id: Option<String>) -> Self {
        Self {
            identity,
            token: token.into(),
            user_id,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Bearer token
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Server-side user id, when the login response carried one
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity.email)
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .finish()
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    user: Option<UserRef>,
}

#[derive(Deserialize)]
struct UserRef {
    #[serde(default)]
    id: serde_json::Value,
}

impl UserRef {
    fn id(&self) -> Option<String> {
        match &self.id {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Logs identities in
#[derive(Debug, Clone)]
pub struct SessionManager {
    api: ApiClient,
}

impl SessionManager {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Log `identity` in and return its session.
    ///
    /// Only HTTP 200 with a non-empty `token` counts as success.
    #[tracing::instrument(name = "session.authenticate", skip(self, identity), fields(identity = %identity.email))]
    pub async fn authenticate(&self, identity: &Identity) -> Result<Session, AuthError> {
        let request = LoginRequest {
            email: &identity.email,
            password: &identity.password,
        };

        let response = match self.api.post_json(paths::LOGIN, &request, None).await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_auth_attempt("error");
                return Err(e.into());
            }
        };

        if response.status != StatusCode::OK {
            metrics::record_auth_attempt("rejected");
            return Err(AuthError::Rejected {
                status: response.status.as_u16(),
                body: response.text(),
            });
        }

        let login: LoginResponse = response.json().map_err(|e| {
            metrics::record_auth_attempt("error");
            AuthError::MalformedResponse(e.to_string())
        })?;

        let token = match login.token {
            Some(token) if !token.is_empty() => token,
            _ => {
                metrics::record_auth_attempt("error");
                return Err(AuthError::MalformedResponse(
                    "response carries no token".into(),
                ));
            }
        };
        let user_id = login.user.as_ref().and_then(UserRef::id);

        metrics::record_auth_attempt("success");
        tracing::info!(
            user_id = user_id.as_deref().unwrap_or("unknown"),
            "Logged in"
        );

        Ok(Session::new(identity.clone(), token, user_id))
    }
}
