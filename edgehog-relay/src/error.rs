//! Transport and configuration errors.
use displaydoc::Display;
use serde::Serialize;
use thiserror::Error;

pub use crate::configuration::ConfigurationError;
use crate::graphql;
use crate::graphql::ErrorExtension;

/// Message shown to users when an operation could not complete at the transport level.
pub const UNREACHABLE_MESSAGE: &str = "Could not reach the server, please try again.";

/// Error types for a GraphQL operation that did not produce a response envelope.
///
/// GraphQL errors reported by the backend are not `FetchError`s: they are
/// returned in [`graphql::Response::errors`].
#[derive(Error, Display, Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(untagged)]
#[ignore_extra_doc_attributes]
#[non_exhaustive]
pub enum FetchError {
    /// could not reach '{url}': {reason}
    ///
    /// note that this relates to a transport error and not a GraphQL error
    Unreachable {
        /// The endpoint that was called.
        url: String,

        /// The reason the request failed.
        reason: String,
    },

    /// response was malformed (HTTP status {status}): {reason}
    MalformedResponse {
        /// The HTTP status of the response.
        status: u16,

        /// The reason the decoding failed.
        reason: String,
    },

    /// request was malformed: {reason}
    MalformedRequest {
        /// The reason the encoding failed.
        reason: String,
    },
}

impl FetchError {
    /// Convert the fetch error to a GraphQL error.
    pub fn to_graphql_error(&self) -> graphql::Error {
        graphql::Error::builder()
            .message(self.to_string())
            .code(self.extension_code())
            .build()
    }

    /// Convert the error to a response carrying it.
    pub fn to_response(&self) -> graphql::Response {
        graphql::Response::builder()
            .errors(vec![self.to_graphql_error()])
            .build()
    }

    /// The generic, user facing message for this error.
    pub fn user_message(&self) -> &'static str {
        UNREACHABLE_MESSAGE
    }
}

impl ErrorExtension for FetchError {
    fn extension_code(&self) -> String {
        match self {
            FetchError::Unreachable { .. } => "UNREACHABLE",
            FetchError::MalformedResponse { .. } => "MALFORMED_RESPONSE",
            FetchError::MalformedRequest { .. } => "MALFORMED_REQUEST",
        }
        .to_string()
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Unreachable {
            url: err
                .url()
                .map(|url| url.to_string())
                .unwrap_or_default(),
            reason: err.to_string(),
        }
    }
}
