//! Session error surface.

use thiserror::Error;

/// Errors a [`crate::Session`] can return to its caller.
///
/// Write failures are deliberately absent: a failed send is reported via
/// `tracing` and abandoned, and a dead connection then shows up as EOF (or
/// an [`Error::Io`]) on the next read.
#[derive(Debug, Error)]
pub enum Error {
    /// The initial dial failed. Fatal; retry policy belongs to the caller.
    #[error("could not connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Reading from the established connection failed.
    #[error("connection i/o: {0}")]
    Io(#[from] std::io::Error),
}
