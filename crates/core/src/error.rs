use std::fmt::Display;

use miette::Diagnostic;
use thiserror::Error;

/// Crate-wide error type.
///
/// `MissingSchema` and `VersionMismatch` are fatal at startup, `IndexClosed`
/// terminates a run without an alias commit, `TransientSource`/`TransientSink`
/// are retried by their respective components, `FatalSink` is logged but does
/// not block progress, and `Cancelled` propagates up the supervision tree.
/// The remaining variants are ambient plumbing (config, I/O, client errors).
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    #[error("schema_tag is required but was empty or missing")]
    MissingSchema,

    #[error("persisted schema '{persisted}' does not match configured schema_tag '{configured}'")]
    VersionMismatch { persisted: String, configured: String },

    #[error("index '{0}' was closed by the search cluster")]
    IndexClosed(String),

    #[error("transient source error: {0}")]
    TransientSource(String),

    #[error("transient sink error: {0}")]
    TransientSink(String),

    #[error("fatal sink error: {0}")]
    FatalSink(String),

    #[error("cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("client error: {0}")]
    Client(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    Message(String),
}

impl Error {
    pub fn config(text: impl Display) -> Error {
        Error::Config(text.to_string())
    }

    pub fn client(text: impl Display) -> Error {
        Error::Client(text.to_string())
    }

    pub fn storage(text: impl Display) -> Error {
        Error::Storage(text.to_string())
    }

    pub fn parse(text: impl Display) -> Error {
        Error::Parse(text.to_string())
    }

    pub fn message(text: impl Into<String>) -> Error {
        Error::Message(text.into())
    }

    /// True for errors that the caller should retry locally rather than surface.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientSource(_) | Error::TransientSink(_))
    }
}
