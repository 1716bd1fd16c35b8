//! Client errors.
use displaydoc::Display;
use serde::Serialize;
use thiserror::Error;

pub use crate::graphql::Error;
use crate::json_ext::Value;

/// Error types for a fetch going through the link pipeline.
///
/// These are transport and protocol failures. GraphQL errors found in the
/// `errors` field of an otherwise valid response are *not* represented here:
/// partial data plus errors is a valid outcome and is returned as a
/// [`crate::graphql::Response`].
#[derive(Error, Display, Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(untagged)]
#[ignore_extra_doc_attributes]
#[non_exhaustive]
pub enum FetchError {
    /// HTTP fetch failed: {reason}
    ///
    /// note that this relates to a transport error and not a GraphQL error
    Network {
        /// The reason the fetch failed.
        reason: String,
    },

    /// HTTP fetch failed with status {status}: {reason}
    HttpStatus {
        /// The HTTP status returned by the API.
        status: u16,

        /// The body (or a summary of it) returned alongside the status.
        reason: String,
    },

    /// response was malformed: {reason}
    MalformedResponse {
        /// The reason the deserialization failed.
        reason: String,
    },

    /// request was malformed: {reason}
    MalformedRequest {
        /// The reason the request could not be encoded.
        reason: String,
    },
}

impl FetchError {
    /// Convert the fetch error to a GraphQL error.
    pub fn to_graphql_error(&self) -> Error {
        let mut error = Error::builder()
            .message(self.to_string())
            .extension_code(self.extension_code())
            .build();
        if let FetchError::HttpStatus { status, .. } = self {
            error
                .extensions
                .insert("http", serde_json_bytes::json!({ "status": status }));
        }
        error
    }

    /// The `code` extension used when this error is rendered as a GraphQL error.
    pub fn extension_code(&self) -> &'static str {
        match self {
            FetchError::Network { .. } => "NETWORK_ERROR",
            FetchError::HttpStatus { .. } => "HTTP_ERROR",
            FetchError::MalformedResponse { .. } => "MALFORMED_RESPONSE",
            FetchError::MalformedRequest { .. } => "MALFORMED_REQUEST",
        }
    }

    /// True for failures that happened before a GraphQL payload was received.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            FetchError::Network { .. } | FetchError::HttpStatus { .. }
        )
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => FetchError::HttpStatus {
                status: status.as_u16(),
                reason: err.to_string(),
            },
            None => FetchError::Network {
                reason: err.to_string(),
            },
        }
    }
}

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// invalid API endpoint '{url}': {reason}
    InvalidEndpoint { url: String, reason: String },
    /// could not read configuration file: {0}
    CannotRead(#[from] std::io::Error),
    /// could not deserialize configuration: {0}
    Deserialize(String),
    /// could not read environment variable {name}: {reason}
    Environment { name: &'static str, reason: String },
    /// invalid introspection result: {0}
    InvalidIntrospection(String),
    /// could not build the HTTP client: {0}
    HttpClient(String),
    /// invalid initial cache state: {0}
    InvalidInitialState(#[from] CacheError),
}

/// Errors raised by the normalized cache.
#[derive(Debug, Error, Display, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CacheError {
    /// cache snapshot must be a JSON object, got {0}
    InvalidSnapshot(String),
    /// the cache was already read or written before being restored
    RestoreAfterAccess,
    /// unknown optimistic layer '{0}'
    UnknownOptimisticLayer(String),
}

impl CacheError {
    pub(crate) fn invalid_snapshot(value: &Value) -> Self {
        let kind = match value {
            Value::Null => "null",
            Value::Bool(_) => "a boolean",
            Value::Number(_) => "a number",
            Value::String(_) => "a string",
            Value::Array(_) => "an array",
            Value::Object(_) => "an object",
        };
        CacheError::InvalidSnapshot(kind.to_string())
    }
}
