use thiserror::Error;

/// Result type returned by every fallible filesystem operation.
pub type Outcome<T> = Result<T, VfsError>;

#[derive(Debug, Error)]
pub enum VfsError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Not a directory: {0}")]
    NotADirectory(String),
    #[error("Not a file: {0}")]
    NotAFile(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Directory not empty: {0}")]
    NotEmpty(String),
    #[error("Cannot {0} the root directory")]
    RootOperation(String),
    #[error("Cannot place a directory inside itself or one of its subdirectories: {src} -> {dst}")]
    Cycle { src: String, dst: String },
    #[error("Metadata key not found: {key} on {path}")]
    MetadataKeyNotFound { path: String, key: String },
    #[error("Invalid name: {0}")]
    InvalidName(String),
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VfsError {
    pub fn code(&self) -> &str {
        match self {
            Self::NotFound(_) => "VFS_NOT_FOUND",
            Self::NotADirectory(_) => "VFS_NOT_DIRECTORY",
            Self::NotAFile(_) => "VFS_NOT_FILE",
            Self::AlreadyExists(_) => "VFS_ALREADY_EXISTS",
            Self::NotEmpty(_) => "VFS_NOT_EMPTY",
            Self::RootOperation(_) => "VFS_ROOT_OPERATION",
            Self::Cycle { .. } => "VFS_CYCLE",
            Self::MetadataKeyNotFound { .. } => "VFS_METADATA_KEY_NOT_FOUND",
            Self::InvalidName(_) => "VFS_INVALID_NAME",
            Self::InvalidPattern(_) => "VFS_INVALID_PATTERN",
            Self::LimitExceeded(_) => "VFS_LIMIT_EXCEEDED",
            Self::InvalidSnapshot(_) => "VFS_INVALID_SNAPSHOT",
            Self::Io(_) => "VFS_IO_ERROR",
            Self::Json(_) => "VFS_JSON_ERROR",
        }
    }

    pub fn to_json_rpc_error(&self) -> serde_json::Value {
        serde_json::json!({
            "vfsCode": self.code(),
            "message": self.to_string(),
        })
    }
}
