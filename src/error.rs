use axum::extract::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::env;
use std::fmt::Debug;

// Codes 1..=99 are internal faults and never leak their message to callers;
// codes 100 and up are caller-visible domain errors.
#[derive(Debug)]
pub struct Error {
    pub code: i32,
    pub message: String,
}

impl From<env::VarError> for Error {
    fn from(err: env::VarError) -> Self {
        env_var_error(err)
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        database_error(err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        reqwest_error(err)
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_message) = match self.code {
            1..=99 => (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error"),
            100 => (StatusCode::BAD_REQUEST, self.message.as_str()),
            101 => (StatusCode::CONFLICT, self.message.as_str()),
            102 => (StatusCode::NOT_FOUND, self.message.as_str()),
            _ => (StatusCode::BAD_REQUEST, self.message.as_str()),
        };

        let body = Json(json!({
            "code": self.code,
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// Malformed or disallowed input; the caller's fault, nothing changed.
pub fn validation_error(message: &str) -> Error {
    Error {
        code: 100,
        message: message.into(),
    }
}

/// Valid request, but the aggregate's current state disallows it.
pub fn conflict_error(message: &str) -> Error {
    Error {
        code: 101,
        message: message.into(),
    }
}

pub fn not_found_error() -> Error {
    Error {
        code: 102,
        message: "not found".into(),
    }
}

pub fn env_var_error(_: env::VarError) -> Error {
    Error {
        code: 1,
        message: "environment variable error".into(),
    }
}

pub fn database_error<T: Debug>(_: T) -> Error {
    Error {
        code: 2,
        message: "database error".into(),
    }
}

pub fn reqwest_error(_: reqwest::Error) -> Error {
    Error {
        code: 3,
        message: "reqwest error".into(),
    }
}

pub fn upstream_error() -> Error {
    Error {
        code: 4,
        message: "upstream error".into(),
    }
}

pub fn unexpected_error() -> Error {
    Error {
        code: 5,
        message: "unexpected error".into(),
    }
}

/// An internal invariant no longer holds; logged loudly at the call site.
pub fn integrity_error(message: &str) -> Error {
    Error {
        code: 6,
        message: message.into(),
    }
}
