//! Tools for reading a ZIP archive.
//!
//! To start reading an archive, first create a [`ZipArchive`] from its bytes.
//! Walk its central directory with [`ZipArchive::entries()`],
//! look an entry up by name with [`ZipArchive::find()`],
//! and get its contents with [`ZipArchive::read()`] or [`ZipArchive::extract()`].
//!
//! [`ZipArchive`]: struct.ZipArchive.html
//! [`ZipArchive::entries()`]: struct.ZipArchive.html#method.entries
//! [`ZipArchive::find()`]: struct.ZipArchive.html#method.find
//! [`ZipArchive::read()`]: struct.ZipArchive.html#method.read
//! [`ZipArchive::extract()`]: struct.ZipArchive.html#method.extract

use std::borrow::Cow;
use std::fmt;
use std::io::{self, Read, Write};
use std::iter::FusedIterator;

use chrono::{NaiveDate, NaiveDateTime};
use flate2::read::DeflateDecoder;
use log::*;

use crate::crc_reader::Crc32Reader;
use crate::result::*;
use crate::spec;

/// Names longer than this (minus one) are cut short by [`FileMetadata::display_name()`].
///
/// [`FileMetadata::display_name()`]: struct.FileMetadata.html#method.display_name
pub const NAME_DISPLAY_LIMIT: usize = 4096;

/// How much decompressed data [`ZipArchive::extract()`] moves at a time.
///
/// [`ZipArchive::extract()`]: struct.ZipArchive.html#method.extract
pub const CHUNK_SIZE: usize = 8192;

/// The compression method used to store a file
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompressionMethod {
    /// The file is uncompressed
    Stored,
    /// The file is [DEFLATE](https://en.wikipedia.org/wiki/DEFLATE)d.
    /// This is the most common format used by ZIP archives.
    Deflate,
    /// The file is compressed with a yet-unsupported format.
    /// (The u16 indicates the internal format code.)
    Unsupported(u16),
}

impl CompressionMethod {
    pub fn as_u16(self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unsupported(v) => v,
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionMethod::Stored => f.pad("Stored"),
            CompressionMethod::Deflate => f.pad("Defl:N"),
            CompressionMethod::Unsupported(v) => f.pad(&format!("Unk:{:03}", v)),
        }
    }
}

/// Metadata for a file or directory in the archive,
/// retrieved from its central directory entry.
///
/// This borrows the archive's bytes; nothing is copied out of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata<'a> {
    /// The path of the file, as stored.
    /// No encoding is assumed.
    pub path: &'a [u8],

    /// The file's comment, as stored.
    pub comment: &'a [u8],

    /// Uncompressed size of the file in bytes
    pub size: usize,

    /// Compressed size of the file in bytes
    pub compressed_size: usize,

    /// Compression algorithm the central directory says was used.
    /// (Reading goes by what the local file header says.)
    pub compression_method: CompressionMethod,

    /// The CRC-32 of the decompressed file
    pub crc32: u32,

    /// True if the file is encrypted (decryption is unsupported)
    pub encrypted: bool,

    /// When the file was last modified, if the MS-DOS timestamp makes sense
    pub last_modified: Option<NaiveDateTime>,

    /// The general purpose bit flags from the central directory
    pub(crate) flags: u16,

    /// Where this entry sits in the central directory
    pub(crate) offset: usize,

    /// The offset to the local file header in the archive
    pub(crate) header_offset: usize,
}

impl<'a> FileMetadata<'a> {
    pub(crate) fn from_cde(cde: &spec::CentralDirectoryEntry<'a>) -> Self {
        if cde.disk_number != 0 {
            warn!(
                "{} claims to start on disk {}",
                String::from_utf8_lossy(cde.path),
                cde.disk_number
            );
        }
        Self {
            path: cde.path,
            comment: cde.file_comment,
            size: cde.uncompressed_size as usize,
            compressed_size: cde.compressed_size as usize,
            compression_method: CompressionMethod::from_u16(cde.compression_method),
            crc32: cde.crc32,
            encrypted: is_encrypted(cde.flags),
            last_modified: parse_msdos(cde.last_modified_time, cde.last_modified_date),
            flags: cde.flags,
            offset: cde.offset,
            header_offset: cde.header_offset as usize,
        }
    }

    /// The path, cut to at most `NAME_DISPLAY_LIMIT - 1` bytes.
    ///
    /// This is what gets listed and what [`ZipArchive::find()`] compares against.
    /// It's never used to find anything inside the archive.
    ///
    /// [`ZipArchive::find()`]: struct.ZipArchive.html#method.find
    pub fn display_name(&self) -> &'a [u8] {
        &self.path[..self.path.len().min(NAME_DISPLAY_LIMIT - 1)]
    }

    /// The path as (lossy) UTF-8, for messages.
    pub fn name_lossy(&self) -> Cow<'a, str> {
        String::from_utf8_lossy(self.display_name())
    }

    /// Returns true if the given entry is a directory
    pub fn is_dir(&self) -> bool {
        self.size == 0 && self.path.ends_with(b"/")
    }

    /// The offset of this entry in the central directory
    pub fn central_directory_offset(&self) -> usize {
        self.offset
    }

    /// The offset of this entry's local file header
    pub fn header_offset(&self) -> usize {
        self.header_offset
    }
}

/// Extracts the "is this file encrypted?" bit from the 16-bit flags field.
fn is_encrypted(flags: u16) -> bool {
    // Bit 0: If set, indicates that the file is encrypted
    flags & 1 != 0
}

fn parse_msdos(time: u16, date: u16) -> Option<NaiveDateTime> {
    let seconds = (0b0000_0000_0001_1111 & time) as u32 * 2; // MSDOS uses 2-second precision
    let minutes = (0b0000_0111_1110_0000 & time) as u32 >> 5;
    let hours = (0b1111_1000_0000_0000 & time) as u32 >> 11;

    let days = (0b0000_0000_0001_1111 & date) as u32;
    let months = (0b0000_0001_1110_0000 & date) as u32 >> 5;
    // MSDOS uses years since 1980; Always interpreted as a positive value
    let years = ((0b1111_1110_0000_0000 & date) >> 9) as i32 + 1980;

    NaiveDate::from_ymd_opt(years, months, days)?.and_hms_opt(hours, minutes, seconds)
}

/// Walks the central directory, one entry at a time.
///
/// Each entry is parsed straight out of the archive when we reach it,
/// and the walk ends at the first spot that isn't a central directory entry.
/// An entry that runs off the end of the archive yields an error
/// and ends the walk.
#[derive(Clone)]
pub struct Entries<'a> {
    mapping: &'a [u8],
    position: Option<usize>,
}

impl<'a> Iterator for Entries<'a> {
    type Item = ZipResult<FileMetadata<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        let posit = self.position.take()?;
        let entry = match spec::CentralDirectoryEntry::parse(self.mapping, posit)? {
            Ok(entry) => entry,
            Err(e) => return Some(Err(e)),
        };
        trace!("{:?}", entry);
        // Each entry is at least 46 bytes long, so we always make progress.
        self.position = Some(entry.next_offset);
        Some(Ok(FileMetadata::from_cde(&entry)))
    }
}

impl FusedIterator for Entries<'_> {}

/// A ZIP archive to be read
#[derive(Clone, Copy)]
pub struct ZipArchive<'a> {
    /// The contents of the ZIP archive, as a byte slice.
    mapping: &'a [u8],
    /// Where the central directory starts
    central_directory_offset: usize,
    /// The comment at the very end of the archive
    comment: &'a [u8],
}

impl<'a> ZipArchive<'a> {
    /// Reads a ZIP archive from a byte slice.
    /// Smaller files can be read into a buffer.
    ///
    /// ```no_run
    /// # use std::fs;
    /// # use zipview::*;
    /// let bytes = fs::read("foo.zip")?;
    /// let archive = ZipArchive::new(&bytes)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    ///
    /// For larger ones, memory map!
    /// ```no_run
    /// # use std::fs::File;
    /// # use memmap2::Mmap;
    /// # use zipview::*;
    /// let zip_file = File::open("foo.zip")?;
    /// let mapping = unsafe { Mmap::map(&zip_file)? };
    /// let archive = ZipArchive::new(&mapping)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(mapping: &'a [u8]) -> ZipResult<Self> {
        let (central_directory_offset, eocdr) = spec::find_central_directory(mapping)?;
        debug!(
            "Central directory at {:#x}, {} entries claimed",
            central_directory_offset, eocdr.entries
        );
        Ok(Self {
            mapping,
            central_directory_offset,
            comment: eocdr.file_comment,
        })
    }

    /// Returns the offset of the central directory in the archive.
    pub fn central_directory_offset(&self) -> usize {
        self.central_directory_offset
    }

    /// Returns the archive's comment.
    pub fn comment(&self) -> &'a [u8] {
        self.comment
    }

    /// Returns an iterator over the entries in the central directory,
    /// in the order they're stored.
    ///
    /// No effort is made to deduplicate or otherwise validate these entries.
    /// Each call starts a fresh walk from the top of the central directory.
    pub fn entries(&self) -> Entries<'a> {
        Entries {
            mapping: self.mapping,
            position: Some(self.central_directory_offset),
        }
    }

    /// Finds the first entry (in central directory order)
    /// whose [display name] is exactly `name`.
    ///
    /// [display name]: struct.FileMetadata.html#method.display_name
    pub fn find(&self, name: &[u8]) -> ZipResult<FileMetadata<'a>> {
        for entry in self.entries() {
            let entry = entry?;
            if entry.display_name() == name {
                debug!("Found {} at {:#x}", entry.name_lossy(), entry.offset);
                return Ok(entry);
            }
        }
        Err(ZipError::EntryNotFound(
            String::from_utf8_lossy(name).into_owned(),
        ))
    }

    /// Reads the given file from the ZIP archive.
    ///
    /// Once the returned reader runs dry, it checks the CRC-32 of
    /// everything it produced, and its last read fails
    /// (with a [`ZipError::ChecksumMismatch`] inside the `io::Error`)
    /// if it doesn't match.
    ///
    /// Since each file in a ZIP archive is compressed independently,
    /// multiple files can be read in parallel.
    ///
    /// [`ZipError::ChecksumMismatch`]: ../result/enum.ZipError.html#variant.ChecksumMismatch
    pub fn read(&self, metadata: &FileMetadata) -> ZipResult<Box<dyn Read + Send + 'a>> {
        let name = metadata.name_lossy().into_owned();
        let local_header = spec::LocalFileHeader::parse(self.mapping, metadata.header_offset)
            .map_err(|reason| ZipError::LocalHeaderMismatch {
                name: name.clone(),
                entry_offset: metadata.offset,
                header_offset: metadata.header_offset,
                reason,
            })?;
        trace!("{:?}", local_header);

        // The local header gets the last word on how the data was compressed.
        let compression_method = CompressionMethod::from_u16(local_header.compression_method);
        if compression_method != metadata.compression_method {
            local_mismatch(
                metadata,
                &name,
                "Compression method differs from the central directory's",
            )?;
            warn!(
                "{}: central directory says {}, local file header says {}",
                name, metadata.compression_method, compression_method
            );
        }
        if local_header.flags != metadata.flags {
            local_mismatch(metadata, &name, "Flags differ from the central directory's")?;
            warn!(
                "{}: central directory flags are {:#06x}, local file header flags are {:#06x}",
                name, metadata.flags, local_header.flags
            );
        }

        if metadata.encrypted || is_encrypted(local_header.flags) {
            return Err(ZipError::EncryptedEntry(name));
        }

        let data_start = local_header.data_offset();
        let data_end = spec::checked_end(
            "File data",
            data_start,
            metadata.compressed_size,
            self.mapping.len(),
        )?;
        debug!(
            "Reading {} ({}, {} -> {} bytes) from {:#x}",
            name, compression_method, metadata.compressed_size, metadata.size, data_start
        );

        make_reader(
            compression_method,
            metadata.crc32,
            name,
            &self.mapping[data_start..data_end],
        )
    }

    /// Decompresses the given file into `sink`,
    /// returning the number of bytes written.
    ///
    /// Data is written as it's decompressed, [`CHUNK_SIZE`] bytes at a time,
    /// and the CRC-32 is only checked at the end.
    /// If it doesn't match, everything has already been written;
    /// buffer the output yourself if that matters.
    ///
    /// [`CHUNK_SIZE`]: constant.CHUNK_SIZE.html
    pub fn extract<W: Write + ?Sized>(&self, metadata: &FileMetadata, sink: &mut W) -> ZipResult<u64> {
        let mut reader = self.read(metadata)?;
        let mut buf = [0u8; CHUNK_SIZE];
        let mut written = 0u64;
        loop {
            let count = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(count) => count,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(read_error(e, metadata)),
            };
            sink.write_all(&buf[..count])?;
            written += count as u64;
        }
        debug!("Extracted {} bytes of {}", written, metadata.name_lossy());
        Ok(written)
    }

    /// Finds the named file and decompresses it into `sink`.
    /// Nothing is written if there's no such file.
    pub fn extract_by_name<W: Write + ?Sized>(&self, name: &[u8], sink: &mut W) -> ZipResult<u64> {
        let entry = self.find(name)?;
        self.extract(&entry, sink)
    }

    /// Decompresses each named file into `sink`, one after another,
    /// returning a result per name in the order they were given.
    ///
    /// A file that can't be found or read doesn't stop the ones after it.
    pub fn extract_all<N, W>(&self, names: &[N], sink: &mut W) -> Vec<ZipResult<u64>>
    where
        N: AsRef<[u8]>,
        W: Write + ?Sized,
    {
        names
            .iter()
            .map(|name| {
                let result = self.extract_by_name(name.as_ref(), sink);
                if let Err(e) = &result {
                    debug!("{}: {}", String::from_utf8_lossy(name.as_ref()), e);
                }
                result
            })
            .collect()
    }
}

/// Fails on a local header that disagrees with the central directory
/// when the `check-local-metadata` feature is on. Otherwise we carry on.
fn local_mismatch(metadata: &FileMetadata, name: &str, reason: &'static str) -> ZipResult<()> {
    if cfg!(feature = "check-local-metadata") {
        return Err(ZipError::LocalHeaderMismatch {
            name: name.to_owned(),
            entry_offset: metadata.offset,
            header_offset: metadata.header_offset,
            reason,
        });
    }
    Ok(())
}

/// Returns a boxed read trait for a compressed file,
/// given its compression method and expected CRC.
fn make_reader<'a>(
    compression_method: CompressionMethod,
    crc32: u32,
    name: String,
    data: &'a [u8],
) -> ZipResult<Box<dyn Read + Send + 'a>> {
    match compression_method {
        CompressionMethod::Stored => Ok(Box::new(Crc32Reader::new(data, crc32, name))),
        CompressionMethod::Deflate => {
            let deflate_reader = DeflateDecoder::new(data);
            Ok(Box::new(Crc32Reader::new(deflate_reader, crc32, name)))
        }
        CompressionMethod::Unsupported(method) => {
            Err(ZipError::UnsupportedCompressionMethod { name, method })
        }
    }
}

/// Sorts a read failure into a checksum mismatch (which the `Crc32Reader`
/// smuggles out inside an `io::Error`) or a decompression failure.
fn read_error(e: io::Error, metadata: &FileMetadata) -> ZipError {
    let message = e.to_string();
    match e.into_inner().map(|inner| inner.downcast::<ZipError>()) {
        Some(Ok(zip_error)) => *zip_error,
        _ => ZipError::DecompressionError {
            name: metadata.name_lossy().into_owned(),
            message,
        },
    }
}
