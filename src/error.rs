//! Error types for the rsfuzz library.

use thiserror::Error;

/// Top-level error type for rsfuzz operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Invalid key configuration, raised at key registration or index build.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// A single bitap pattern is wider than the bitmask.
    #[error("Pattern length exceeds max of {max}.")]
    PatternTooLong { max: usize },

    /// Malformed boolean-tree query.
    #[error("query error: {0}")]
    Query(#[from] QueryError),
}

/// Errors in the configured search keys.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// A weighted key object without a `name`.
    #[error("Missing name property in key")]
    MissingKeyName,

    /// A key whose path has no segments.
    #[error("key path must not be empty")]
    EmptyKeyPath,

    /// Weight was zero, negative or not a number.
    #[error("Property 'weight' in key '{key}' must be a positive integer")]
    InvalidWeight { key: String, weight: f64 },
}

/// Errors in boolean-tree (`$and` / `$or`) queries.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// The pattern given for a key was not a string.
    #[error("Invalid value for key {0}")]
    InvalidValueForKey(String),

    /// A node that should be an object was something else.
    #[error("expected a query object, got {0}")]
    NotAnObject(String),

    /// An object with no keys.
    #[error("empty query expression")]
    EmptyExpression,
}

pub type Result<T> = std::result::Result<T, Error>;
