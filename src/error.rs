//! Error types for nettopo-docker

use thiserror::Error;

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for node operations
///
/// Runtime failures are passed through unmodified; this crate performs no
/// recovery or retry. The owning framework decides how to react to a surfaced
/// error (abort the topology build, clean up partially-created containers).
#[derive(Debug, Error)]
pub enum Error {
    /// Error surfaced by the container runtime client
    #[error(transparent)]
    Runtime(#[from] bollard::errors::Error),

    /// A command executed inside the container exited with a nonzero status
    #[error("command '{command}' in container {container_id} exited with status {exit_code}: {output}")]
    CommandFailed {
        /// The shell command that was executed
        command: String,
        /// Container the command ran in
        container_id: String,
        /// Exit status reported by the runtime
        exit_code: i64,
        /// Collected stdout/stderr of the command
        output: String,
    },

    /// A port label was looked up that was never registered on the node
    #[error("unknown port label: {0}")]
    UnknownPort(String),

    /// The operation needs the container's process id, which is only
    /// recorded after a successful start
    #[error("node '{0}' has no recorded process id (not started)")]
    NotStarted(String),

    /// I/O error (host-side command execution)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
