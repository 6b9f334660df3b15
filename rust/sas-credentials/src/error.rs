//! Error types for SAS issuance.
//!
//! Each component reports failures through its own error type, and all of
//! them convert into [`SasError`] so that callers issuing a token end-to-end
//! deal with a single type. Issuance is all-or-nothing: when any of these is
//! returned no token has been produced.

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

use crate::delegation::AuthorityError;

/// A credential descriptor (connection string) could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// A segment has no `=` separating key from value.
    #[error("segment '{segment}' is not a Key=Value pair")]
    MissingSeparator {
        /// The offending segment.
        segment: String,
    },
    /// A segment has an empty key, e.g. `=value`.
    #[error("segment '{segment}' has an empty key")]
    EmptyKey {
        /// The offending segment.
        segment: String,
    },
    /// The same key appears more than once.
    #[error("key '{key}' appears more than once")]
    DuplicateKey {
        /// The repeated key.
        key: String,
    },
    /// A key the caller requires is absent.
    #[error("required key '{key}' is missing")]
    MissingKey {
        /// The missing key.
        key: String,
    },
    /// A value could not be interpreted.
    #[error("value of '{key}' is invalid: {reason}")]
    InvalidValue {
        /// The key whose value is invalid.
        key: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// A requested scope violates the rules of its kind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    /// The expiry does not come after the start.
    #[error("expiry {expiry} must be later than start {start}")]
    InvertedWindow {
        /// Requested start.
        start: DateTime<Utc>,
        /// Requested expiry.
        expiry: DateTime<Utc>,
    },
    /// The window is longer than the policy allows.
    #[error("window of {}s exceeds the maximum of {}s", .actual.num_seconds(), .maximum.num_seconds())]
    WindowTooLong {
        /// Requested window length.
        actual: TimeDelta,
        /// Longest window allowed.
        maximum: TimeDelta,
    },
    /// A lifetime that must be positive is zero or negative.
    #[error("lifetime of {}s must be positive", .0.num_seconds())]
    NonPositiveLifetime(TimeDelta),
    /// A letter is outside the alphabet legal for this scope.
    #[error("'{letter}' is not a legal {scope}; expected letters from '{alphabet}'")]
    IllegalPermission {
        /// The offending letter.
        letter: char,
        /// What the letter was meant to be, e.g. "blob permission".
        scope: &'static str,
        /// The letters that are legal here.
        alphabet: &'static str,
    },
    /// A set or name that must be non-empty is empty.
    #[error("{field} must not be empty")]
    Empty {
        /// The empty field.
        field: &'static str,
    },
    /// A resource name cannot be used.
    #[error("invalid {field} '{value}': {reason}")]
    InvalidName {
        /// Which name, e.g. "container".
        field: &'static str,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// A token query string could not be read back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// The same parameter appears more than once.
    #[error("parameter '{name}' appears more than once")]
    DuplicateParameter {
        /// The repeated parameter name.
        name: String,
    },
}

/// A signature could not be computed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningError {
    /// The key material is empty.
    #[error("signing key is empty")]
    EmptyKey,
    /// There is nothing to sign.
    #[error("string-to-sign is empty")]
    EmptyPayload,
    /// The key was rejected by the MAC implementation.
    #[error("invalid signing key: {0}")]
    InvalidKey(String),
    /// The token would outlive (or predate) the delegation key signing it.
    #[error(
        "token window {token_start}..{token_expiry} is not covered by delegation key window {key_start}..{key_expiry}"
    )]
    WindowNotCovered {
        /// Start of the requested token window.
        token_start: DateTime<Utc>,
        /// Expiry of the requested token window.
        token_expiry: DateTime<Utc>,
        /// Start of the delegation key window.
        key_start: DateTime<Utc>,
        /// Expiry of the delegation key window.
        key_expiry: DateTime<Utc>,
    },
}

/// Any failure while issuing a shared access signature.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SasError {
    /// The credential descriptor is malformed. Not retryable.
    #[error("malformed credential descriptor: {0}")]
    MalformedDescriptor(#[from] DescriptorError),
    /// A token query string is malformed. Not retryable.
    #[error("malformed token: {0}")]
    MalformedToken(#[from] TokenError),
    /// The scope is invalid. Not retryable.
    #[error("invalid scope: {0}")]
    InvalidScope(#[from] ScopeError),
    /// The signature could not be produced. Not retryable.
    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),
    /// The delegation authority failed; see [`AuthorityError::is_retryable`].
    #[error(transparent)]
    Authority(#[from] AuthorityError),
    /// An endpoint URL could not be built.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

impl SasError {
    /// Whether retrying the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Authority(error) if error.is_retryable())
    }
}

impl From<url::ParseError> for SasError {
    fn from(error: url::ParseError) -> Self {
        Self::InvalidEndpoint(error.to_string())
    }
}
