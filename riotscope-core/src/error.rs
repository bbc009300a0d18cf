//! Error types for thread awareness.

use thiserror::Error;

/// Error reported by the underlying memory transport (probe, mock, ...).
pub type TransportError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the scheduler reader and register decoder.
#[derive(Debug, Error)]
pub enum RtosError {
    /// Symbols were never loaded, or the resolver produced nothing.
    #[error("no symbols loaded for RIOT thread awareness")]
    NoSymbols,

    /// A symbol the engine cannot work without did not resolve.
    #[error("required symbol `{0}` is missing; RIOT introspection unavailable")]
    MissingRequiredSymbol(&'static str),

    /// The attached core has no matching target profile.
    #[error("unsupported architecture: {0}")]
    UnsupportedArchitecture(String),

    /// A target memory read failed.
    #[error("failed to read {length} bytes at 0x{address:08X}")]
    MemoryReadFailed {
        /// Start of the attempted read.
        address: u32,
        /// Number of bytes requested.
        length: usize,
        /// Transport failure as reported by the backend.
        #[source]
        source: TransportError,
    },

    /// Thread id 0 (undefined PID) or outside the slot table.
    #[error("invalid thread id {0}")]
    InvalidThreadId(u16),

    /// The thread's slot currently holds no control block.
    #[error("thread {0} does not exist")]
    ThreadNotFound(u16),

    /// The thread's control block stores a null stack pointer.
    #[error("thread {0} has a null stack pointer")]
    NullStackPointer(u16),

    /// The engine was used before a target profile was bound.
    #[error("no target profile bound; attach must select an architecture first")]
    UnboundProfile,
}

/// Result alias for thread awareness operations.
pub type Result<T> = std::result::Result<T, RtosError>;
