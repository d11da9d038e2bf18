//! Error types for casefile.

use uuid::Uuid;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),
}

/// Settings and environment resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the hosted relational data store.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Backend rejected request ({status}): {message}")]
    Backend { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },
}

/// Errors from the object storage bucket.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Storage rejected request ({status}): {message}")]
    Backend { status: u16, message: String },

    #[error("Failed to fetch {url}: HTTP {status}")]
    Fetch { url: String, status: u16 },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the auth/session service.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Login failed. Please check your email and password.")]
    InvalidCredentials,

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Auth service rejected request ({status}): {message}")]
    Backend { status: u16, message: String },

    #[error("Invalid auth response: {0}")]
    InvalidResponse(String),
}

/// Input rejected before anything is sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("{field} is required")]
    Required { field: &'static str },

    #[error("At least one participant is required")]
    NoParticipants,

    #[error("A sharing group needs a name and at least one member")]
    IncompleteSharingGroup,

    #[error("Unknown case type '{0}'")]
    UnknownCaseType(String),

    #[error("Role '{role}' is not defined for case type '{case_type}'")]
    UnknownRole { case_type: String, role: String },

    #[error("Subtype '{subtype}' is not defined for case type '{case_type}'")]
    UnknownSubtype { case_type: String, subtype: String },

    #[error("Duplicate participant '{0}'")]
    DuplicateParticipant(String),
}

/// Errors from the record orchestrators.
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("Not signed in")]
    NotSignedIn,

    #[error("Another operation on this {entity} is still in flight")]
    InFlight { entity: &'static str },

    #[error("{entity} {id} is not loaded locally; cannot determine its attachments")]
    NotLoaded { entity: &'static str, id: Uuid },

    #[error("Failed to purge attachments, record kept: {0}")]
    AttachmentPurge(StorageError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

pub type Result<T> = std::result::Result<T, Error>;
