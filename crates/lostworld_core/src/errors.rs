use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("no usable credentials")]
    CredentialUnavailable,
    #[error("session is invalid: {0}")]
    SessionInvalid(String),
    #[error("session requires two-factor verification")]
    SecondFactorRequired,
    #[error("resource not found: {url}")]
    NotFound { url: String },
    #[error("unauthorized ({url}): {body}")]
    Unauthorized { url: String, body: String },
    #[error("HTTP request failed with {status}: {url}")]
    Http { status: u16, url: String },
    #[error("network request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("response is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("credential encryption failed: {0}")]
    Crypto(String),
    #[error("file operation failed: {0}")]
    Io(#[from] io::Error),
    #[error("CSV processing failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("encoding conversion failed: {0}")]
    Encoding(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unexpected error: {0}")]
    Other(String),
}

/// Coarse classification of remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Unauthorized,
    Other,
}

impl TrackerError {
    pub fn class(&self) -> ErrorClass {
        match self {
            TrackerError::NotFound { .. } => ErrorClass::NotFound,
            TrackerError::Unauthorized { .. } => ErrorClass::Unauthorized,
            _ => ErrorClass::Other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("login failed: {0}")]
    LoginFailed(String),
    #[error(transparent)]
    Core(#[from] TrackerError),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("favorite export failed: {0}")]
    Core(#[from] TrackerError),
    #[error("pipeline step failed: {0}")]
    Context(String),
}

impl ExportError {
    pub fn context<T: Into<String>>(self, message: T) -> Self {
        let message = message.into();
        match self {
            ExportError::Core(err) => ExportError::Context(format!("{message}: {err}")),
            ExportError::Context(existing) => {
                ExportError::Context(format!("{message}: {existing}"))
            }
        }
    }
}
