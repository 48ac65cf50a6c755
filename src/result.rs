//! Error types and the related `Result<T>`

use thiserror::Error;

pub type ZipResult<T> = Result<T, ZipError>;

#[derive(Debug, Error)]
pub enum ZipError {
    /// An error from underlying I/O (usually the output sink)
    #[error("I/O Error")]
    Io(#[from] std::io::Error),

    /// The buffer can't even hold an End of central directory record.
    #[error("Archive is {0} bytes, too small to hold an End Of Central Directory Record")]
    TooSmall(usize),

    /// No self-consistent End of central directory record was found.
    #[error("Couldn't find End Of Central Directory Record")]
    EocdNotFound,

    /// The End of central directory record points somewhere impossible.
    #[error("Central directory offset {offset:#x} lies past the End Of Central Directory Record at {eocdr_offset:#x}")]
    InvalidCentralDirectoryOffset { offset: usize, eocdr_offset: usize },

    /// No entry in the central directory has the requested name.
    #[error("No file in the archive named {0}")]
    EntryNotFound(String),

    /// A central directory entry doesn't lead to a valid local file header.
    #[error("Entry {name} (central directory offset {entry_offset:#x}): {reason} at {header_offset:#x}")]
    LocalHeaderMismatch {
        name: String,
        entry_offset: usize,
        header_offset: usize,
        reason: &'static str,
    },

    /// Some declared length would take us past the end of the archive.
    #[error("{what} at {offset:#x} runs {length} bytes past the end of the archive ({archive_len} bytes)")]
    PayloadOutOfBounds {
        what: &'static str,
        offset: usize,
        length: usize,
        archive_len: usize,
    },

    /// The entry is compressed with something other than store or deflate.
    #[error("Entry {name} uses unsupported compression method {method:#04x}")]
    UnsupportedCompressionMethod { name: String, method: u16 },

    /// Decryption is unsupported.
    #[error("Can't read encrypted file {0}")]
    EncryptedEntry(String),

    /// The deflate decoder gave up on the entry's payload.
    #[error("Couldn't decompress {name}: {message}")]
    DecompressionError { name: String, message: String },

    /// The decompressed bytes don't hash to the CRC in the central directory.
    #[error("CRC mismatch for {name}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        name: String,
        expected: u32,
        actual: u32,
    },
}
