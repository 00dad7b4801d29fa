use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::header::HeaderError;

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error(transparent)]
    MalformedHeader(#[from] HeaderError),

    #[error("Outer gzip stream is invalid: {source}")]
    OuterDecompression {
        #[source]
        source: io::Error,
    },

    #[error("Container truncated: outer stream holds {actual} bytes, header alone needs {expected}")]
    TruncatedContainer { expected: usize, actual: usize },

    #[error("Inner archive error{}: {reason}", .path.as_ref().map(|p| format!(" at {}", p.display())).unwrap_or_default())]
    InnerArchive {
        path:   Option<PathBuf>,
        reason: String,
    },

    #[error("Source directory unavailable: {}: {source}", .path.display())]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl ContainerError {
    pub(crate) fn inner(path: Option<PathBuf>, reason: impl Into<String>) -> Self {
        ContainerError::InnerArchive { path, reason: reason.into() }
    }

    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        ContainerError::Io { context: context.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, ContainerError>;
