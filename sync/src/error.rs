//! Error taxonomy.
//!
//! Only [`SyncError`] aborts an operation. Everything a batch can recover from
//! is reported as an outcome value by the component that hit it.

use reqwest::StatusCode;

/// Errors raised by the catalog and glossary HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport error (connection, DNS, TLS, timeout)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Credential exchange failed or returned no token
    #[error("Login failed: {0}")]
    Login(String),

    /// 404 from the remote service
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-2xx response
    #[error("Request rejected ({status}): {message}")]
    Status { status: u16, message: String },

    /// 2xx response whose body did not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl ClientError {
    /// Login failures are fatal for the operation that needed the token.
    pub fn is_login_failure(&self) -> bool {
        matches!(self, ClientError::Login(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }

    pub(crate) fn from_status(status: StatusCode, message: String) -> Self {
        match status {
            StatusCode::NOT_FOUND => ClientError::NotFound(message),
            s => ClientError::Status {
                status: s.as_u16(),
                message,
            },
        }
    }
}

/// Errors raised while reading the reporting database.
#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Connection error: {0}")]
    Connect(String),
    #[error("Query error: {0}")]
    Query(String),
}

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),
    #[error("{var} is invalid: {message}")]
    Invalid { var: &'static str, message: String },
}

/// Fatal, operation-level failures.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("reporting inventory unavailable: {0}")]
    Inventory(#[from] InventoryError),

    #[error("catalog unavailable: {0}")]
    Catalog(#[from] ClientError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
