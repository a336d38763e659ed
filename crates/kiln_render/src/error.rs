//! # Engine Error Types
//!
//! Startup and teardown failures. Allocator errors on the frame path never
//! reach this type; they are fatal inside `kiln_core`.

use kiln_core::{LayoutError, MemoryError};
use thiserror::Error;

/// Errors raised while configuring, starting or stopping the engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The configuration file is not valid TOML for [`crate::EngineConfig`].
    #[error("configuration parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// The configuration could not be written back out.
    #[error("configuration encode error: {0}")]
    TomlEncode(#[from] toml::ser::Error),

    /// Reading the configuration file failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The region plan is impossible.
    #[error("layout error: {0}")]
    Layout(#[from] LayoutError),

    /// A region cannot host its allocator.
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    /// The OS refused to start a worker thread.
    #[error("failed to spawn worker {index}: {source}")]
    Spawn {
        /// Thread index.
        index: u32,
        /// OS error.
        source: std::io::Error,
    },

    /// A thread could not build its context.
    #[error("thread {index} failed to initialise: {reason}")]
    WorkerInit {
        /// Thread index.
        index: u32,
        /// What went wrong.
        reason: String,
    },

    /// A worker thread panicked before it could be joined.
    #[error("worker {0} panicked")]
    WorkerPanicked(u32),
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
