/// Error-to-HTTP mapping shared by every handler.
///
/// This module provides:
/// - The JSON error body returned by all endpoints
/// - Status code and severity classification per error type
/// - Logging of failures, with server-side causes kept out of responses
use crate::store::StoreError;
use fairhand_engine::errors::GameError;
use serde::{Deserialize, Serialize};
use std::fmt;
use warp::http::StatusCode;
use warp::reply::{self, Response};
use warp::Reply;

/// Message sent in place of any server-side cause.
pub const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

/// Standard error response format for all API endpoints
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g., "invalid_phase")
    pub error: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details (structured data)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(
        error: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn into_response(self, status: StatusCode) -> Response {
        reply::with_status(reply::json(&self), status).into_response()
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// Error classification for logging levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Client errors (4xx) - expected, normal operation
    Client,
    /// Server errors (5xx) - unexpected, needs investigation
    Server,
    /// Critical errors - a game invariant was broken
    Critical,
}

/// Trait for converting errors to HTTP responses with proper logging
pub trait IntoErrorResponse {
    fn status_code(&self) -> StatusCode;

    /// Machine-readable error code
    fn error_code(&self) -> &'static str;

    /// Message safe to show the caller
    fn error_message(&self) -> String;

    /// Full cause, logged but never sent for server errors
    fn cause(&self) -> String {
        self.error_message()
    }

    fn error_details(&self) -> Option<serde_json::Value> {
        None
    }

    fn severity(&self) -> ErrorSeverity {
        if self.status_code().is_server_error() {
            ErrorSeverity::Server
        } else {
            ErrorSeverity::Client
        }
    }

    fn to_error_response(&self) -> ErrorResponse {
        if let Some(details) = self.error_details() {
            ErrorResponse::with_details(self.error_code(), self.error_message(), details)
        } else {
            ErrorResponse::new(self.error_code(), self.error_message())
        }
    }

    fn into_http_response(self) -> Response
    where
        Self: Sized,
    {
        let status = self.status_code();
        let code = self.error_code();
        match self.severity() {
            ErrorSeverity::Client => {
                tracing::info!(
                    error = code,
                    status = status.as_u16(),
                    message = %self.error_message(),
                    "client error"
                );
            }
            ErrorSeverity::Server => {
                tracing::error!(
                    error = code,
                    status = status.as_u16(),
                    cause = %self.cause(),
                    "server error"
                );
            }
            ErrorSeverity::Critical => {
                tracing::error!(
                    error = code,
                    status = status.as_u16(),
                    cause = %self.cause(),
                    critical = true,
                    "invariant violated"
                );
            }
        }

        self.to_error_response().into_response(status)
    }
}

impl IntoErrorResponse for GameError {
    fn status_code(&self) -> StatusCode {
        match self {
            GameError::InvalidPhase { .. } | GameError::IllegalTransition { .. } => {
                StatusCode::CONFLICT
            }
            GameError::InvalidBet(_) | GameError::InvalidDeckCount(_) => StatusCode::BAD_REQUEST,
            GameError::InvalidRules(_)
            | GameError::ExhaustedShoe { .. }
            | GameError::StatePoisoned => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            GameError::InvalidPhase { .. } => "invalid_phase",
            GameError::IllegalTransition { .. } => "illegal_transition",
            GameError::InvalidBet(_) => "invalid_bet",
            GameError::InvalidDeckCount(_) => "invalid_deck_count",
            GameError::InvalidRules(_) => "invalid_rules",
            GameError::ExhaustedShoe { .. } => "exhausted_shoe",
            GameError::StatePoisoned => "state_poisoned",
        }
    }

    fn error_message(&self) -> String {
        if self.is_client_error() {
            self.to_string()
        } else {
            INTERNAL_ERROR_MESSAGE.to_string()
        }
    }

    fn cause(&self) -> String {
        self.to_string()
    }

    fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            GameError::InvalidPhase {
                phase, expected, ..
            } => Some(serde_json::json!({ "phase": phase, "expected": expected })),
            _ => None,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            GameError::ExhaustedShoe { .. } | GameError::StatePoisoned => ErrorSeverity::Critical,
            _ if self.is_client_error() => ErrorSeverity::Client,
            _ => ErrorSeverity::Server,
        }
    }
}

impl IntoErrorResponse for StoreError {
    fn status_code(&self) -> StatusCode {
        match self {
            StoreError::UnknownHand(_) => StatusCode::NOT_FOUND,
            StoreError::StoragePoisoned | StoreError::Unavailable(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            StoreError::UnknownHand(_) => "hand_not_found",
            StoreError::StoragePoisoned | StoreError::Unavailable(_) => "storage_error",
        }
    }

    fn error_message(&self) -> String {
        match self {
            StoreError::UnknownHand(_) => self.to_string(),
            _ => INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }

    fn cause(&self) -> String {
        self.to_string()
    }

    fn error_details(&self) -> Option<serde_json::Value> {
        match self {
            StoreError::UnknownHand(hand_id) => Some(serde_json::json!({ "hand_id": hand_id })),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fairhand_engine::phase::Phase;
    use serde_json::json;

    #[test]
    fn error_response_serialization() {
        let error = ErrorResponse::new("test_error", "Test error message");
        let json = serde_json::to_value(&error).expect("serialize");

        assert_eq!(json["error"], "test_error");
        assert_eq!(json["message"], "Test error message");
        assert!(json.get("details").is_none());
    }

    #[test]
    fn error_response_with_details() {
        let error = ErrorResponse::with_details(
            "validation_error",
            "Invalid input",
            json!({"field": "bet"}),
        );
        let json = serde_json::to_value(&error).expect("serialize");
        assert_eq!(json["details"]["field"], "bet");
        assert_eq!(error.to_string(), "validation_error: Invalid input");
    }

    #[test]
    fn phase_errors_are_conflicts_with_details() {
        let err = GameError::InvalidPhase {
            operation: "hit",
            phase: Phase::WaitingForDeal,
            expected: "PLAYER_TURN",
        };
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.severity(), ErrorSeverity::Client);
        let body = err.to_error_response();
        assert_eq!(body.error, "invalid_phase");
        assert_eq!(
            body.details,
            Some(json!({"phase": "WAITING_FOR_DEAL", "expected": "PLAYER_TURN"}))
        );
    }

    #[test]
    fn server_errors_hide_their_cause() {
        let err = GameError::ExhaustedShoe {
            dealt: 52,
            total: 52,
        };
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert_eq!(err.to_error_response().message, INTERNAL_ERROR_MESSAGE);
        assert!(err.cause().contains("52 of 52"));
    }

    #[test]
    fn store_errors_map_to_not_found_and_server_error() {
        let missing = StoreError::UnknownHand(9);
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(missing.to_error_response().details, Some(json!({"hand_id": 9})));

        let down = StoreError::Unavailable("connection refused".to_string());
        assert_eq!(down.severity(), ErrorSeverity::Server);
        assert_eq!(down.to_error_response().message, INTERNAL_ERROR_MESSAGE);
        assert!(down.cause().contains("connection refused"));
    }
}
