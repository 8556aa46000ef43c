/// All errors that can be returned by a FlagStorage implementation.
///
/// None of these are business-rule failures: callers abort the whole
/// operation and may retry.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No flag row with the given id.
    #[error("flag not found: {id}")]
    FlagNotFound { id: i64 },

    /// Unique constraint on `flags.name` violated.
    #[error("flag name already taken: {name}")]
    DuplicateName { name: String },

    /// A backend-specific storage error (connection loss, serialization, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}
