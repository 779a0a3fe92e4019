use thiserror::Error;

/// Every failure surfaced by the data-access layer.
///
/// Categories map to where the problem was detected; all of them abort the
/// current operation. `Sqlite` carries the store's own error unwrapped, which
/// is how writes against an immutable connection are reported.
#[derive(Debug, Error)]
pub enum TabulaError {
    #[error("storage error: {message}")]
    Storage { message: String },
    #[error("schema error: {message}")]
    Schema { message: String },
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("type error: {message}")]
    Type { message: String },
    #[error("shape error: {message}")]
    Shape { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("read-only violation: {message}")]
    ReadOnly { message: String },
    #[error("migration error: {message}")]
    Migration { message: String },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl TabulaError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::Type {
            message: message.into(),
        }
    }

    pub fn shape(message: impl Into<String>) -> Self {
        Self::Shape {
            message: message.into(),
        }
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }

    pub fn read_only(message: impl Into<String>) -> Self {
        Self::ReadOnly {
            message: message.into(),
        }
    }

    pub fn migration(message: impl Into<String>) -> Self {
        Self::Migration {
            message: message.into(),
        }
    }
}

pub type TabulaResult<T> = Result<T, TabulaError>;
