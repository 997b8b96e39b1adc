//! Request-level error taxonomy.
//!
//! Handlers return [`WikiError`]; the HTTP layer turns it into either a
//! themed error page or a JSON envelope depending on how the request was
//! made. The conversion happens in middleware, so the `IntoResponse` impl
//! here only produces a bare placeholder carrying the classification in
//! response extensions.

use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::application::repos::RepoError;
use crate::infra::error::InfraError;

/// Classification of a failed request, one of a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadRequest,
    Forbidden,
    NotFound,
    Overloaded,
    Internal,
}

impl ErrorKind {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Overloaded => StatusCode::BAD_GATEWAY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Name reported as `error_class` in JSON error envelopes.
    pub fn class_name(self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "BadRequest",
            ErrorKind::Forbidden => "Forbidden",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::Overloaded => "Overloaded",
            ErrorKind::Internal => "InternalError",
        }
    }

    /// Fallback body text when no `wiki:error-<status>` page exists.
    ///
    /// A missing 404 page intentionally yields no text at all.
    pub fn default_public_text(self) -> Option<&'static str> {
        match self {
            ErrorKind::BadRequest => Some("Bad request."),
            ErrorKind::Forbidden => Some("Access denied, try logging in."),
            ErrorKind::NotFound => None,
            ErrorKind::Overloaded => Some("Over capacity. Please try later."),
            ErrorKind::Internal => Some("Something bad happened."),
        }
    }
}

#[derive(Debug, Error)]
pub enum WikiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("over capacity")]
    Overloaded,
    #[error("{message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },
}

impl WikiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        WikiError::BadRequest(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        WikiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        WikiError::NotFound(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        WikiError::Internal {
            message: message.into(),
            source: None,
        }
    }

    pub fn internal_from(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        WikiError::Internal {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            WikiError::BadRequest(_) => ErrorKind::BadRequest,
            WikiError::Forbidden(_) => ErrorKind::Forbidden,
            WikiError::NotFound(_) => ErrorKind::NotFound,
            WikiError::Overloaded => ErrorKind::Overloaded,
            WikiError::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Message safe to show to the visitor.
    pub fn public_message(&self) -> String {
        match self {
            WikiError::Overloaded => "Over capacity. Please try later.".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<RepoError> for WikiError {
    fn from(error: RepoError) -> Self {
        match error {
            RepoError::Unavailable { .. } => WikiError::Overloaded,
            RepoError::Persistence { .. } => WikiError::Internal {
                message: "storage operation failed".to_string(),
                source: Some(Box::new(error)),
            },
        }
    }
}

/// Process-level failures: startup, shutdown and the CLI subcommands.
///
/// Everything reachable from a request stays inside [`WikiError`]; this
/// type covers what happens outside one.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Wiki(#[from] WikiError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

impl From<RepoError> for AppError {
    fn from(error: RepoError) -> Self {
        AppError::Wiki(WikiError::from(error))
    }
}

/// Classification handed to the error-rendering middleware through
/// response extensions.
#[derive(Debug, Clone)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
}

/// Diagnostic trail attached to failed responses for the logging layer.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

impl IntoResponse for WikiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let descriptor = ErrorDescriptor {
            kind,
            message: self.public_message(),
        };
        let report = ErrorReport::from_error("application::error::WikiError", kind.status(), &self);
        let mut response = (kind.status(), descriptor.message.clone()).into_response();
        response.extensions_mut().insert(descriptor);
        report.attach(&mut response);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        assert_eq!(ErrorKind::BadRequest.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorKind::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorKind::Overloaded.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ErrorKind::Internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn missing_page_has_no_default_text() {
        assert_eq!(ErrorKind::NotFound.default_public_text(), None);
        assert_eq!(
            ErrorKind::Internal.default_public_text(),
            Some("Something bad happened.")
        );
    }

    #[test]
    fn report_collects_source_chain() {
        let error = WikiError::internal_from(
            "outer failure",
            std::io::Error::new(std::io::ErrorKind::Other, "inner cause"),
        );
        let report =
            ErrorReport::from_error("test", StatusCode::INTERNAL_SERVER_ERROR, &error);
        assert_eq!(report.messages, vec!["outer failure", "inner cause"]);
    }
}
