//! Storage service error codes.

use thiserror::Error;

/// Storage service error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// Malformed or invalid request parameters
    InvalidParameter,
    /// Missing or invalid credentials
    NotAuthenticated,
    /// Caller may not perform the operation
    NotAuthorized,
    /// Bucket, object or upload does not exist
    NotFound,
    /// Operation not allowed on this resource
    MethodNotAllowed,
    /// Resource is in a conflicting state or already exists
    Conflict,
    /// Precondition (etag match) failed
    PreconditionFailed,
    /// Rate limited
    TooManyRequests,
    /// Server side failure
    InternalServerError,
    /// Operation not implemented by the service
    NotImplemented,
    /// Service temporarily unavailable
    ServiceUnavailable,
    /// Unknown error
    Unknown,
}

impl From<&str> for StoreErrorCode {
    fn from(code: &str) -> Self {
        match code {
            "CannotParseRequest" | "InvalidParameter" | "LimitExceeded" | "MissingParameter"
            | "QuotaExceeded" | "RelatedResourceNotAuthorizedOrNotFound" | "NoEtagMatch" => {
                StoreErrorCode::InvalidParameter
            }
            "NotAuthenticated" | "SignUpRequired" => StoreErrorCode::NotAuthenticated,
            "NotAuthorized" => StoreErrorCode::NotAuthorized,
            "NotAuthorizedOrNotFound" | "NotFound" | "BucketNotFound" | "ObjectNotFound"
            | "NoSuchUpload" => StoreErrorCode::NotFound,
            "MethodNotAllowed" => StoreErrorCode::MethodNotAllowed,
            "IncorrectState"
            | "InvalidatedRetryToken"
            | "NotAuthorizedOrResourceAlreadyExists"
            | "BucketAlreadyExists"
            | "BucketNotEmpty" => StoreErrorCode::Conflict,
            "PreconditionFailed" => StoreErrorCode::PreconditionFailed,
            "TooManyRequests" => StoreErrorCode::TooManyRequests,
            "InternalServerError" => StoreErrorCode::InternalServerError,
            "MethodNotImplemented" => StoreErrorCode::NotImplemented,
            "ServiceUnavailable" => StoreErrorCode::ServiceUnavailable,
            _ => StoreErrorCode::Unknown,
        }
    }
}

impl StoreErrorCode {
    /// Map an HTTP status to an error code.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => StoreErrorCode::InvalidParameter,
            401 => StoreErrorCode::NotAuthenticated,
            402 | 403 => StoreErrorCode::NotAuthorized,
            404 => StoreErrorCode::NotFound,
            405 => StoreErrorCode::MethodNotAllowed,
            409 => StoreErrorCode::Conflict,
            412 => StoreErrorCode::PreconditionFailed,
            429 => StoreErrorCode::TooManyRequests,
            500 => StoreErrorCode::InternalServerError,
            501 => StoreErrorCode::NotImplemented,
            503 => StoreErrorCode::ServiceUnavailable,
            _ => StoreErrorCode::Unknown,
        }
    }

    /// Resolve a service code string, falling back to the HTTP status when the code is unknown.
    pub fn resolve(code: &str, status: u16) -> Self {
        match StoreErrorCode::from(code) {
            StoreErrorCode::Unknown => StoreErrorCode::from_status(status),
            known => known,
        }
    }

    /// Get human-readable description of the error.
    pub fn description(&self) -> &'static str {
        match self {
            StoreErrorCode::InvalidParameter => "Invalid parameter",
            StoreErrorCode::NotAuthenticated => "Not authenticated",
            StoreErrorCode::NotAuthorized => "Not authorized",
            StoreErrorCode::NotFound => "Resource does not exist",
            StoreErrorCode::MethodNotAllowed => "Method not allowed",
            StoreErrorCode::Conflict => "Conflicting resource state",
            StoreErrorCode::PreconditionFailed => "Precondition failed",
            StoreErrorCode::TooManyRequests => "Too many requests",
            StoreErrorCode::InternalServerError => "Internal server error",
            StoreErrorCode::NotImplemented => "Not implemented",
            StoreErrorCode::ServiceUnavailable => "Service unavailable",
            StoreErrorCode::Unknown => "Unknown error",
        }
    }
}

/// Error returned by an [`ObjectStore`](super::ObjectStore) or [`MountResolver`](super::MountResolver).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} ({status}): {message}", code.description())]
pub struct StoreError {
    pub code: StoreErrorCode,
    pub status: u16,
    pub message: String,
}

impl StoreError {
    pub fn new(code: StoreErrorCode, status: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            status,
            message: message.into(),
        }
    }

    /// Build from a service error code string and HTTP status.
    pub fn from_service(code: &str, status: u16, message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::resolve(code, status), status, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::NotFound, 404, message)
    }

    pub fn is_not_found(&self) -> bool {
        self.code == StoreErrorCode::NotFound
    }
}
