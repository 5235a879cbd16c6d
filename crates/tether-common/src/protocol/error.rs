use thiserror::Error;

use super::responses::FaultKind;

#[derive(Error, Debug)]
pub enum TetherError {
    #[error("Connection closed in the middle of a frame ({received} of {expected} bytes)")]
    TruncatedFrame { expected: usize, received: usize },

    #[error("Frame too large: {0} bytes (max {max} bytes)", max = crate::transport::MAX_FRAME_SIZE)]
    FrameTooLarge(usize),

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("No connection: the client has not connected to a server")]
    NoConnection,

    #[error("Received a response with no pending request")]
    NoPendingRequest,

    #[error("No implementation found for interface {0}")]
    NoImplementationFound(String),

    #[error("Interface {interface} has {count} implementations: {names:?}")]
    AmbiguousImplementation {
        interface: String,
        count: usize,
        names: Vec<String>,
    },

    #[error("Method not found: {interface}.{method}({param_types:?})")]
    MethodNotFound {
        interface: String,
        method: String,
        param_types: Vec<String>,
    },

    #[error("Duplicate component name: {0}")]
    DuplicateName(String),

    #[error("Component {owner}: no candidate for field '{field}' of type {type_name}")]
    DependencyNotFound {
        owner: String,
        field: String,
        type_name: String,
    },

    #[error("Component {owner}: field '{field}' matches {candidates:?} of type {type_name}")]
    AmbiguousDependency {
        owner: String,
        field: String,
        type_name: String,
        candidates: Vec<String>,
    },

    #[error("Component named {name} is not a {type_name}")]
    NameTypeConflict { name: String, type_name: String },

    #[error("Task dropped after waiting {waited_ms}ms for queue space")]
    QueueOverflowDropped { waited_ms: u64 },

    #[error("Worker pool is shut down")]
    PoolShutdown,

    #[error("Service failure: {0}")]
    ServiceFailure(String),

    #[error("Remote call failed ({kind:?}): {message}")]
    Remote { kind: FaultKind, message: String },

    #[error("Injection slot of type {0} used before wiring")]
    NotWired(String),

    #[error("Container is not initialized")]
    NotInitialized,

    #[error("No participant is marked as the client or server entry point")]
    NoEntryPoint,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Connection closed while awaiting a response")]
    ConnectionClosed,

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    #[error("Document serialization error: {0}")]
    Document(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TetherError {
    /// Shorthand for a [`TetherError::TypeMismatch`].
    pub fn mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        TetherError::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Whether this error is a configuration or wiring failure that must
    /// abort startup.
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            TetherError::DuplicateName(_)
                | TetherError::DependencyNotFound { .. }
                | TetherError::AmbiguousDependency { .. }
                | TetherError::NameTypeConflict { .. }
                | TetherError::NoEntryPoint
                | TetherError::InvalidConfig(_)
        )
    }
}

impl From<std::net::AddrParseError> for TetherError {
    fn from(err: std::net::AddrParseError) -> Self {
        TetherError::InvalidConfig(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TetherError>;
