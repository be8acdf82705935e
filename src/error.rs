use std::fmt;
use std::io;

/// Error kinds surfaced by backends and the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsErrorKind {
    NotFound,
    Exists,
    NotDirectory,
    PermissionDenied,
    Cancelled,
    NotSupported,
    InvalidArg,
    /// A partially typed path or URI that cannot be resolved yet.
    PartialInput,
    TimedOut,
    HostUnreachable,
    ConnectionClosed,
    Failed,
}

/// What the model does with a node whose backend operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// The path is gone: remove the node and its subtree.
    Kick,
    /// Keep the node, flag it unavailable.
    Retain,
    /// Transport level failure: disconnect the owning device node.
    EscalateToDevice,
    /// Superseded operation, nothing to do.
    Ignore,
}

#[derive(Debug)]
pub struct FsError {
    kind: FsErrorKind,
    message: String,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl FsError {
    pub fn new(kind: FsErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        kind: FsErrorKind,
        message: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn not_found(what: impl fmt::Display) -> Self {
        Self::new(FsErrorKind::NotFound, format!("{} not found", what))
    }

    pub fn cancelled() -> Self {
        Self::new(FsErrorKind::Cancelled, "Operation cancelled")
    }

    pub fn kind(&self) -> FsErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn disposition(&self) -> ErrorDisposition {
        match self.kind {
            FsErrorKind::NotFound => ErrorDisposition::Kick,
            FsErrorKind::Cancelled => ErrorDisposition::Ignore,
            // FAILED stands in for the timeout code older backends reported.
            FsErrorKind::TimedOut
            | FsErrorKind::Failed
            | FsErrorKind::HostUnreachable
            | FsErrorKind::ConnectionClosed => ErrorDisposition::EscalateToDevice,
            _ => ErrorDisposition::Retain,
        }
    }

    /// Copy of the error without its source chain, for storing as node state.
    pub fn detached(&self) -> Self {
        Self::new(self.kind, self.message.clone())
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_deref().map(|e| e as &dyn std::error::Error)
    }
}

impl From<io::Error> for FsError {
    fn from(err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => FsErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => FsErrorKind::PermissionDenied,
            io::ErrorKind::AlreadyExists => FsErrorKind::Exists,
            io::ErrorKind::InvalidInput => FsErrorKind::InvalidArg,
            io::ErrorKind::TimedOut => FsErrorKind::TimedOut,
            io::ErrorKind::Unsupported => FsErrorKind::NotSupported,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe => FsErrorKind::ConnectionClosed,
            _ => FsErrorKind::Failed,
        };

        Self::with_source(kind, err.to_string(), Box::new(err))
    }
}

impl From<notify::Error> for FsError {
    fn from(err: notify::Error) -> Self {
        Self::new(FsErrorKind::Failed, format!("File watcher error: {}", err))
    }
}

pub type FsResult<T> = Result<T, FsError>;
