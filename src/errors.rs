use thiserror::Error;

// typed errors so callers can tell "skip this metric" apart from real failures

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("capability not implemented by this backend: {0}")]
    NotImplemented(&'static str),

    #[error("capability not supported here: {0}")]
    NotSupported(String),

    #[error("access denied to {path}")]
    AccessDenied { path: String },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {field} from {path}: {raw}")]
    Parse {
        path: String,
        field: String,
        raw: String,
    },

    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    #[error("invalid filter argument: {0}")]
    InvalidFilterArgument(String),

    #[error("guest request queue is closed")]
    QueueClosed,
}

impl MetricsError {
    /// Map an I/O failure on `path` onto the taxonomy.
    pub fn from_io(path: impl Into<String>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => MetricsError::NotFound { what: path },
            std::io::ErrorKind::PermissionDenied => MetricsError::AccessDenied { path },
            _ => MetricsError::Io { path, source },
        }
    }

    /// Capability is absent; the metric is skipped without noise.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            MetricsError::NotImplemented(_) | MetricsError::NotSupported(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MetricsError>;
