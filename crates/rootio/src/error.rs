//! Error types for ROOT file reading.

use thiserror::Error;

/// Errors produced while reading ROOT files.
#[derive(Error, Debug)]
pub enum RootError {
    /// I/O error from the underlying file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A read reached past the end of the source or buffer.
    #[error("read [{start}, {stop}) out of range (size {size})")]
    OutOfRange {
        /// First requested byte.
        start: u64,
        /// One past the last requested byte.
        stop: u64,
        /// Bytes actually available.
        size: u64,
    },

    /// The file does not start with the `root` magic.
    #[error("not a ROOT file (bad magic)")]
    BadMagic,

    /// Malformed record: bad version header, zero byte count, corrupt layout.
    #[error("format error: {0}")]
    Format(String),

    /// Compressed block uses an algorithm tag this reader cannot decode.
    #[error("unsupported compression algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// A compressed block is corrupt or truncated.
    #[error("decompression failed: {0}")]
    Decompression(String),

    /// No reader is registered for the class.
    #[error("unknown class: {0}")]
    UnknownClass(String),

    /// A class or object reference tag points at nothing recorded so far.
    #[error("invalid reference tag {tag:#010x} at position {position}")]
    InvalidReference {
        /// Raw tag value read from the stream.
        tag: u32,
        /// Cursor position of the tag.
        position: usize,
    },

    /// An object did not consume exactly the bytes its header announced.
    #[error("{class}: byte count mismatch (expected {expected} bytes, consumed {actual})")]
    ByteCountMismatch {
        /// Class being decoded.
        class: String,
        /// Bytes announced by the byte-count header.
        expected: usize,
        /// Bytes actually consumed.
        actual: usize,
    },

    /// A valid but unsupported feature of the format.
    #[error("not implemented: {0}")]
    Unimplemented(String),

    /// Name or cycle lookup miss.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// Branch lookup miss.
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// Requested entry range is not inside `[0, numentries]`.
    #[error("invalid entry range [{start}, {stop}) for {entries} entries")]
    EntryRange {
        /// Requested first entry.
        start: u64,
        /// Requested stop entry.
        stop: u64,
        /// Entries available.
        entries: u64,
    },

    /// No decoding plan could be derived for the branch.
    #[error("branch '{0}' cannot be interpreted")]
    Uninterpretable(String),

    /// A cached array was produced under an interpretation that differs in layout.
    #[error("incompatible interpretation: {0}")]
    IncompatibleInterpretation(String),

    /// HTTP range request failure.
    #[error("HTTP error: {message}")]
    Http {
        /// Response status; `None` when no response arrived.
        status: Option<u16>,
        /// What failed.
        message: String,
    },
}

impl RootError {
    /// Convenience constructor for [`RootError::Http`].
    pub fn http(status: Option<u16>, message: impl Into<String>) -> Self {
        RootError::Http { status, message: message.into() }
    }

    /// Convenience constructor for [`RootError::Format`].
    pub fn format(msg: impl Into<String>) -> Self {
        RootError::Format(msg.into())
    }

    /// Whether the error only concerns one object and sibling keys can still be read.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RootError::UnknownClass(_)
                | RootError::UnsupportedAlgorithm(_)
                | RootError::Decompression(_)
                | RootError::ByteCountMismatch { .. }
                | RootError::InvalidReference { .. }
        )
    }
}

/// Result type alias for ROOT operations.
pub type Result<T> = std::result::Result<T, RootError>;
