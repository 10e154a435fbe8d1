use bridge_traits::error::BridgeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Migration failed: {0}")]
    Migration(String),
}

pub type Result<T> = std::result::Result<T, LibraryError>;

impl From<LibraryError> for BridgeError {
    fn from(err: LibraryError) -> Self {
        match err {
            LibraryError::Bridge(inner) => inner,
            LibraryError::Database(e) => BridgeError::DatabaseError(e.to_string()),
            LibraryError::NotFound { entity_type, id } => {
                BridgeError::NotFound(format!("{} {}", entity_type, id))
            }
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}
