use std::fmt::Display;

/// A specialized error type for MMV export operations.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MmvError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A name or entity failed validation; nothing was created.
    #[error("validation failed: {0}")]
    Validation(String),
    /// A configured capacity limit was exceeded.
    #[error("capacity exceeded: {0}")]
    Capacity(String),
    /// The identifier space for an entity kind is exhausted.
    #[error("identifier space exhausted: {0}")]
    Allocation(String),
    /// The backing region could not be created, sized, or mapped.
    #[error("startup failed: {0}")]
    Startup(String),
    /// Lifecycle misuse, such as updating a metric before `start()`.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl MmvError {
    /// Create a validation error from a displayable value.
    pub fn validation<T>(msg: T) -> Self
    where
        T: Display,
    {
        Self::Validation(msg.to_string())
    }

    /// Create a capacity error from a displayable value.
    pub fn capacity<T>(msg: T) -> Self
    where
        T: Display,
    {
        Self::Capacity(msg.to_string())
    }

    /// Create a startup error from a displayable value.
    pub fn startup<T>(msg: T) -> Self
    where
        T: Display,
    {
        Self::Startup(msg.to_string())
    }

    /// Create an invalid-state error from a displayable value.
    pub fn invalid_state<T>(msg: T) -> Self
    where
        T: Display,
    {
        Self::InvalidState(msg.to_string())
    }
}

/// A Result type alias for MMV export operations.
pub type MmvResult<T> = Result<T, MmvError>;
