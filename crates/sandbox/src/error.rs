use thiserror::Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Host-side failures. Protocol outcomes, including guest traps, are
/// reported through [`rumble::ProgramError`] inside a report instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Wasmtime engine error (compilation, linking, instantiation).
    #[error("wasm error: {0}")]
    Wasm(#[source] anyhow::Error),

    /// Filesystem or pipe I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A turn state could not be encoded for the guest.
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("guest does not export `{0}`")]
    MissingExport(&'static str),

    #[error("session has not been initialized")]
    NotInitialized,

    #[error("session is already initialized")]
    AlreadyInitialized,

    /// Init failed; the session accepts no further turns.
    #[error("session faulted during init")]
    Faulted,
}
