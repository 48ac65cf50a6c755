//! zipview reads ZIP archives straight out of a byte slice:
//!
//! ```no_run
//! # use std::fs;
//! # use std::io;
//! # use zipview::*;
//! // For smaller files,
//! let bytes = fs::read("foo.zip")?;
//! let archive = ZipArchive::new(&bytes)?;
//!
//! // List everything in the central directory...
//! for entry in archive.entries() {
//!     println!("{}", entry?.name_lossy());
//! }
//!
//! // ...or dump a single file.
//! let stdout = io::stdout();
//! archive.extract_by_name(b"some/specific/file", &mut stdout.lock())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//! works just fine. Memory map larger files!
//! ```no_run
//! # use std::fs::File;
//! # use std::io;
//! # use memmap2::Mmap;
//! # use zipview::*;
//! let zip_file = File::open("foo.zip")?;
//! let mapping = unsafe { Mmap::map(&zip_file)? };
//! let archive = ZipArchive::new(&mapping)?;
//! let entry = archive.find(b"some/specific/file")?;
//! let mut reader = archive.read(&entry)?;
//! io::copy(&mut reader, &mut io::sink())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! A ZIP archive is read from the back:
//! the End of central directory record at the tail says where the
//! central directory starts, each central directory entry says where its
//! file's local header is, and the local header says where the data is.
//! Nothing here copies the archive or builds an index of it;
//! entries are parsed out of the slice as they're walked,
//! so the slice can be shared freely between threads.
//!
//! Only stored and DEFLATEd files are supported.
//! ZIP64, encryption, and multi-disk archives are not.

pub mod listing;
pub mod read;
pub mod result;

pub use read::CompressionMethod;
pub use read::FileMetadata;
pub use read::ZipArchive;
pub use result::{ZipError, ZipResult};

mod crc_reader;
mod spec;
