//! Upload acceptance and storage.
//!
//! [`FileValidator`] is pure and shared with the client; [`StorageWriter`]
//! re-validates on the server, hashes, names and persists each file, and
//! records its metadata through a [`FileRepository`].

pub mod repository;
pub mod storage;
pub mod validator;

pub use repository::{FileRepository, InMemoryFileRepository, RepositoryError};
pub use storage::{sanitize_file_name, StorageError, StorageWriter, STREAMING_THRESHOLD};
pub use validator::{
    FileCandidate, FileValidator, ValidationError, ValidationLimits, DEFAULT_MAX_FILES,
    DEFAULT_MAX_FILE_SIZE,
};
