// ABOUTME: Errors returned by image engine operations.
// ABOUTME: Validation, transport, local I/O and cancellation, in that policy order.

use crate::runtime::TransportError;
use crate::types::ParseReferenceError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A reference parsed but carries no repository.
    #[error("invalid image name {0:?}")]
    InvalidImageName(String),

    #[error("invalid reference {input:?}: {source}")]
    InvalidReference {
        input: String,
        #[source]
        source: ParseReferenceError,
    },

    /// Surfaced unchanged from the transport.
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0:?} already exists as a regular file")]
    AlreadyExistsAsFile(PathBuf),

    #[error("failed to normalize {what}: {reason}")]
    Projection { what: &'static str, reason: String },

    #[error("operation cancelled")]
    Cancelled,
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorKind {
    /// Bad input, rejected before any side effect.
    Validation,
    /// The service or the connection to it failed.
    Transport,
    /// Opening, creating or unpacking local files failed.
    LocalIo,
    Cancelled,
}

impl EngineError {
    pub fn kind(&self) -> EngineErrorKind {
        match self {
            EngineError::InvalidImageName(_) | EngineError::InvalidReference { .. } => {
                EngineErrorKind::Validation
            }
            EngineError::Transport(_) | EngineError::Projection { .. } => {
                EngineErrorKind::Transport
            }
            EngineError::Io { .. } | EngineError::AlreadyExistsAsFile(_) => {
                EngineErrorKind::LocalIo
            }
            EngineError::Cancelled => EngineErrorKind::Cancelled,
        }
    }

    /// Whether the service reported the image as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::Transport(e) if e.is_not_found())
    }

    pub(crate) fn io(context: impl Into<String>) -> impl FnOnce(std::io::Error) -> Self {
        let context = context.into();
        move |source| EngineError::Io { context, source }
    }
}
