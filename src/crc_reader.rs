//! Helper module to compute a CRC32 checksum
//!
//! Borrowed from zip-rs:
//! <https://github.com/mvdnes/zip-rs/commit/b3c836d9c32efa120cdd5366280f940d3c3b985c>

use std::io;
use std::io::prelude::*;

use crc32fast::Hasher;

use crate::result::ZipError;

/// Reader that validates the CRC32 when it reaches the EOF.
///
/// Everything read before then has already been handed to the caller,
/// so a mismatch only tells them the bytes they got were bad.
pub struct Crc32Reader<R> {
    inner: R,
    hasher: Hasher,
    provided_checksum: u32,
    /// The entry being read, for error messages
    name: String,
}

impl<R> Crc32Reader<R> {
    pub fn new(inner: R, provided_checksum: u32, name: String) -> Crc32Reader<R> {
        Crc32Reader {
            inner,
            hasher: Hasher::new(),
            provided_checksum,
            name,
        }
    }

    /// Returns the checksum of everything read so far
    /// if it doesn't match the one provided by `new()`
    fn mismatch(&self) -> Option<u32> {
        let actual = self.hasher.clone().finalize();
        (actual != self.provided_checksum).then_some(actual)
    }
}

impl<R: Read> Read for Crc32Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let count = self.inner.read(buf)?;
        if count == 0 && !buf.is_empty() {
            if let Some(actual) = self.mismatch() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    ZipError::ChecksumMismatch {
                        name: self.name.clone(),
                        expected: self.provided_checksum,
                        actual,
                    },
                ));
            }
        }
        self.hasher.update(&buf[0..count]);
        Ok(count)
    }
}
