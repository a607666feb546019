//! Error types for the sort engine.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for sort operations
pub type Result<T> = std::result::Result<T, SortError>;

/// Error type for sort operations
#[derive(Error, Debug)]
pub enum SortError {
    /// A file could not be opened or created
    #[error("Failed to open '{}': {source}", path.display())]
    OpenFailed {
        /// Path of the file
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// A read or write failed mid-stream
    #[error("I/O error on '{}' at byte {position}: {source}", path.display())]
    IoFailed {
        /// Path of the file
        path: PathBuf,
        /// Byte offset at which the operation failed
        position: u64,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// A temporary file could not be removed (non-fatal, reported at warn level)
    #[error("Failed to remove '{}': {source}", path.display())]
    RemoveFailed {
        /// Path of the file
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The final rename of the last intermediate failed
    #[error("Failed to rename '{}' to '{}': {source}", src.display(), dst.display())]
    RenameFailed {
        /// Rename source
        src: PathBuf,
        /// Rename destination
        dst: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// A merge was invoked with no input streams containing any records
    #[error("No input streams to merge")]
    EmptyMerge,

    /// Invalid engine configuration
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Explanation of the problem
        reason: String,
    },

    /// A sort or merge task panicked
    #[error("Task panicked: {message}")]
    TaskPanicked {
        /// Panic payload, when it carried a message
        message: String,
    },
}

impl SortError {
    /// True for errors that abort the sort; `RemoveFailed` is only reported.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SortError::RemoveFailed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_err() -> std::io::Error {
        std::io::Error::new(std::io::ErrorKind::NotFound, "no such file")
    }

    #[test]
    fn test_open_failed_message() {
        let error =
            SortError::OpenFailed { path: PathBuf::from("/data/input.bin"), source: io_err() };
        let msg = format!("{error}");
        assert!(msg.contains("Failed to open '/data/input.bin'"));
        assert!(msg.contains("no such file"));
    }

    #[test]
    fn test_io_failed_position() {
        let error = SortError::IoFailed {
            path: PathBuf::from("run.000"),
            position: 4096,
            source: io_err(),
        };
        assert!(format!("{error}").contains("at byte 4096"));
    }

    #[test]
    fn test_remove_failed_is_not_fatal() {
        let error =
            SortError::RemoveFailed { path: PathBuf::from("tmp.split.001"), source: io_err() };
        assert!(!error.is_fatal());
        assert!(SortError::EmptyMerge.is_fatal());
    }

    #[test]
    fn test_rename_failed_message() {
        let error = SortError::RenameFailed {
            src: PathBuf::from("out.merge.007"),
            dst: PathBuf::from("sorted.bin"),
            source: io_err(),
        };
        let msg = format!("{error}");
        assert!(msg.contains("out.merge.007"));
        assert!(msg.contains("sorted.bin"));
    }
}
