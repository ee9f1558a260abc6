//! Error types.

/// Failure to produce a [`crate::structure::DoorStructure`] from a source.
///
/// `Clone` so a single settled load can be handed to every waiting caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoadError {
    /// The document could not be retrieved.
    #[error("fetch of {url} failed: {message}")]
    Fetch { url: String, message: String },

    /// The document was retrieved but is not a door description.
    #[error("document at {url} is not a door structure: {message}")]
    Parse { url: String, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum DoorError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("door has no live structure yet")]
    NotInitialized,

    #[error("door is already initialized")]
    AlreadyInitialized,
}
