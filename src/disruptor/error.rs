//! Error types for the ring buffer
//!
//! Only configuration mistakes and the halt signal surface as errors. Running
//! out of capacity is expressed as back-pressure and a wait timeout is a
//! regular return value, so neither has a variant here.

/// Errors that can occur while wiring or running the ring buffer
#[derive(Debug, thiserror::Error)]
pub enum DisruptorError {
    /// The requested capacity is zero or not a power of two
    #[error("Buffer size must be a power of 2, got: {0}")]
    InvalidBufferSize(usize),

    /// A batch claim asked for zero slots or for more slots than the ring holds
    #[error("Batch size must be between 1 and {capacity}, got: {requested}")]
    InvalidBatchSize {
        /// The number of slots asked for
        requested: usize,
        /// The ring capacity
        capacity: usize,
    },

    /// The producer gating set may only be wired once
    #[error("Tracked consumers have already been set")]
    TrackedConsumersAlreadySet,

    /// The barrier was alerted while waiting, normally because of a halt
    #[error("Consumer barrier alerted")]
    Alert,

    /// `run` was called on a consumer whose loop is already active
    #[error("Batch consumer is already running")]
    AlreadyRunning,

    /// A configuration value failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A configuration document could not be parsed
    #[error("Failed to parse configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, DisruptorError>;
