//! Code specific to the ZIP file format specification.
//!
//! We try to keep the nitty gritty here,
//! and higher-level stuff in the [`read`] module.
//!
//! Most comments quote the ZIP spec, [`APPNOTE.TXT`].
//! Nothing here trusts a length field from the archive:
//! every record is checked against the end of the mapping before we read it.
//!
//! [`read`]: ../read/index.html
//! [`APPNOTE.TXT`]: https://pkware.cachefly.net/webdocs/APPNOTE/APPNOTE-6.3.6.TXT

use log::*;
use memchr::memmem;

use crate::read::CompressionMethod;
use crate::result::*;

// Magic numbers denoting various sections of a ZIP archive

/// End of central directory magic number
const EOCDR_MAGIC: [u8; 4] = [b'P', b'K', 5, 6];
/// Central directory magic number
const CENTRAL_DIRECTORY_MAGIC: [u8; 4] = [b'P', b'K', 1, 2];
/// Local file header magic number
const LOCAL_FILE_HEADER_MAGIC: [u8; 4] = [b'P', b'K', 3, 4];

/// Size of the End of central directory record, sans comment
pub const EOCDR_SIZE: usize = 22;
/// Size of a central directory entry, sans path, extra field, and comment
pub const CENTRAL_DIRECTORY_ENTRY_SIZE: usize = 46;
/// Size of a local file header, sans path and extra field
pub const LOCAL_FILE_HEADER_SIZE: usize = 30;

impl CompressionMethod {
    pub(crate) fn from_u16(u: u16) -> Self {
        match u {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            v => CompressionMethod::Unsupported(v),
        }
    }
}

// Straight from the Rust docs:

/// Reads a little-endian u32 from the front of the provided slice, shrinking it.
fn read_u32(input: &mut &[u8]) -> u32 {
    let (int_bytes, rest) = input.split_at(std::mem::size_of::<u32>());
    *input = rest;
    u32::from_le_bytes(int_bytes.try_into().expect("less than four bytes for u32"))
}

/// Reads a little-endian u16 from the front of the provided slice, shrinking it.
fn read_u16(input: &mut &[u8]) -> u16 {
    let (int_bytes, rest) = input.split_at(std::mem::size_of::<u16>());
    *input = rest;
    u16::from_le_bytes(int_bytes.try_into().expect("less than two bytes for u16"))
}

/// Returns `start + length` if that lies within a mapping of `len` bytes,
/// or a `PayloadOutOfBounds` error describing the overrun.
pub fn checked_end(what: &'static str, start: usize, length: usize, len: usize) -> ZipResult<usize> {
    match start.checked_add(length) {
        Some(end) if end <= len => Ok(end),
        end => Err(ZipError::PayloadOutOfBounds {
            what,
            offset: start,
            length: end.map_or(usize::MAX, |e| e - len),
            archive_len: len,
        }),
    }
}

/// Data from the End of central directory record
///
/// Found at the back of the ZIP archive and provides offsets for finding
/// its central directory, along with lots of stuff that stopped being relevant
/// when we stopped breaking ZIP archives onto multiple floppies.
#[derive(Debug)]
pub struct EndOfCentralDirectory<'a> {
    pub disk_number: u16,
    pub disk_with_central_directory: u16,
    pub entries: u16,
    pub central_directory_offset: u32,
    pub file_comment: &'a [u8],
}

impl<'a> EndOfCentralDirectory<'a> {
    /// Parses the record at the front of `eocdr`,
    /// which should run to the end of the archive.
    pub fn parse(mut eocdr: &'a [u8]) -> ZipResult<Self> {
        // 4.3.16  End of central directory record:
        //
        // end of central dir signature    4 bytes  (0x06054b50)
        // number of this disk             2 bytes
        // number of the disk with the
        // start of the central directory  2 bytes
        // total number of entries in
        // the central dir on this disk    2 bytes
        // total number of entries in
        // the central dir                 2 bytes
        // size of the central directory   4 bytes
        // offset of start of central
        // directory with respect to
        // the starting disk number        4 bytes
        // zipfile comment length          2 bytes
        if eocdr.len() < EOCDR_SIZE || eocdr[..4] != EOCDR_MAGIC {
            return Err(ZipError::EocdNotFound);
        }
        eocdr = &eocdr[4..];
        let disk_number = read_u16(&mut eocdr);
        let disk_with_central_directory = read_u16(&mut eocdr);
        let _entries_on_this_disk = read_u16(&mut eocdr);
        let entries = read_u16(&mut eocdr);
        let _central_directory_size = read_u32(&mut eocdr);
        let central_directory_offset = read_u32(&mut eocdr);
        let comment_length = read_u16(&mut eocdr) as usize;
        let file_comment = eocdr.get(..comment_length).ok_or(ZipError::EocdNotFound)?;

        Ok(Self {
            disk_number,
            disk_with_central_directory,
            entries,
            central_directory_offset,
            file_comment,
        })
    }
}

/// Searches backward through `mapping` to find the
/// End of central directory record.
///
/// It should be right at the end of the file,
/// but its variable-length comment means we can't jump to a known offset.
/// The magic alone could just as well show up in the comment or in
/// compressed data, so a hit only counts if its comment length
/// reaches exactly to the end of the mapping.
pub fn find_eocdr(mapping: &[u8]) -> ZipResult<usize> {
    if mapping.len() < EOCDR_SIZE {
        return Err(ZipError::TooSmall(mapping.len()));
    }

    // The latest the record can start is with an empty comment.
    let mut haystack_end = mapping.len() - EOCDR_SIZE + EOCDR_MAGIC.len();
    while let Some(posit) = memmem::rfind(&mapping[..haystack_end], &EOCDR_MAGIC) {
        let mut comment_length = &mapping[posit + 20..posit + EOCDR_SIZE];
        let comment_length = read_u16(&mut comment_length) as usize;

        if comment_length + EOCDR_SIZE == mapping.len() - posit {
            return Ok(posit);
        }
        warn!(
            "Skipping false End Of Central Directory signature at {:#x} (comment length {})",
            posit, comment_length
        );
        // Look again, ending just before this hit.
        haystack_end = posit + EOCDR_MAGIC.len() - 1;
    }
    Err(ZipError::EocdNotFound)
}

/// Finds the End of central directory record and returns it
/// along with the offset of the central directory it points to.
pub fn find_central_directory(mapping: &[u8]) -> ZipResult<(usize, EndOfCentralDirectory<'_>)> {
    let eocdr_posit = find_eocdr(mapping)?;
    let eocdr = EndOfCentralDirectory::parse(&mapping[eocdr_posit..])?;
    trace!("{:?} at {:#x}", eocdr, eocdr_posit);

    if eocdr.disk_number != 0 || eocdr.disk_with_central_directory != 0 {
        warn!(
            "Archive claims to be disk {} of a multi-disk set (central directory on disk {})",
            eocdr.disk_number, eocdr.disk_with_central_directory
        );
    }

    let offset = eocdr.central_directory_offset as usize;
    if offset > eocdr_posit {
        return Err(ZipError::InvalidCentralDirectoryOffset {
            offset,
            eocdr_offset: eocdr_posit,
        });
    }
    Ok((offset, eocdr))
}

/// Data from a central directory entry
///
/// Each of these records contains information about a file or folder
/// stored in the ZIP archive.
#[derive(Debug)]
pub struct CentralDirectoryEntry<'a> {
    pub offset: usize,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified_time: u16,
    pub last_modified_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_number: u16,
    pub header_offset: u32,
    pub path: &'a [u8],
    pub file_comment: &'a [u8],
    /// Where the next entry would start
    pub next_offset: usize,
}

impl<'a> CentralDirectoryEntry<'a> {
    /// Parses the entry at `offset`.
    ///
    /// Returns `None` if there's no room for another entry there
    /// or its magic doesn't match, which is how the central directory ends.
    /// An entry whose variable-length fields spill past the end of the
    /// mapping is an error, not the end of the directory.
    pub fn parse(mapping: &'a [u8], offset: usize) -> Option<ZipResult<Self>> {
        let fixed_end = offset.checked_add(CENTRAL_DIRECTORY_ENTRY_SIZE)?;
        let mut entry = mapping.get(offset..fixed_end)?;

        // 4.3.12  Central directory structure:
        //
        //   central file header signature   4 bytes  (0x02014b50)
        //   version made by                 2 bytes
        //   version needed to extract       2 bytes
        //   general purpose bit flag        2 bytes
        //   compression method              2 bytes
        //   last mod file time              2 bytes
        //   last mod file date              2 bytes
        //   crc-32                          4 bytes
        //   compressed size                 4 bytes
        //   uncompressed size               4 bytes
        //   file name length                2 bytes
        //   extra field length              2 bytes
        //   file comment length             2 bytes
        //   disk number start               2 bytes
        //   internal file attributes        2 bytes
        //   external file attributes        4 bytes
        //   relative offset of local header 4 bytes
        //
        //   file name (variable size)
        //   extra field (variable size)
        //   file comment (variable size)
        if entry[..4] != CENTRAL_DIRECTORY_MAGIC {
            return None;
        }
        entry = &entry[4..];
        let _source_version = read_u16(&mut entry);
        let _minimum_extract_version = read_u16(&mut entry);
        let flags = read_u16(&mut entry);
        let compression_method = read_u16(&mut entry);
        let last_modified_time = read_u16(&mut entry);
        let last_modified_date = read_u16(&mut entry);
        let crc32 = read_u32(&mut entry);
        let compressed_size = read_u32(&mut entry);
        let uncompressed_size = read_u32(&mut entry);
        let path_length = read_u16(&mut entry) as usize;
        let extra_field_length = read_u16(&mut entry) as usize;
        let file_comment_length = read_u16(&mut entry) as usize;
        let disk_number = read_u16(&mut entry);
        let _internal_file_attributes = read_u16(&mut entry);
        let _external_file_attributes = read_u32(&mut entry);
        let header_offset = read_u32(&mut entry);

        let variable_length = path_length + extra_field_length + file_comment_length;
        let next_offset = match checked_end(
            "Central directory entry",
            offset,
            CENTRAL_DIRECTORY_ENTRY_SIZE + variable_length,
            mapping.len(),
        ) {
            Ok(end) => end,
            Err(e) => return Some(Err(e)),
        };

        let path_end = fixed_end + path_length;
        let comment_start = path_end + extra_field_length;
        let path = &mapping[fixed_end..path_end];
        let file_comment = &mapping[comment_start..next_offset];

        Some(Ok(Self {
            offset,
            flags,
            compression_method,
            last_modified_time,
            last_modified_date,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_number,
            header_offset,
            path,
            file_comment,
            next_offset,
        }))
    }
}

/// Data from a local file header
///
/// Each files' actual contents is preceded by this header.
/// It repeats most of what the central directory says,
/// but its path and extra field lengths are its own,
/// and only they tell us where the file's data starts.
#[derive(Debug)]
pub struct LocalFileHeader {
    pub offset: usize,
    pub flags: u16,
    pub compression_method: u16,
    pub path_length: u16,
    pub extra_field_length: u16,
}

impl LocalFileHeader {
    /// Parses the local file header at `offset`,
    /// returning a description of the problem if there isn't one there.
    pub fn parse(mapping: &[u8], offset: usize) -> Result<Self, &'static str> {
        // 4.3.7  Local file header:
        //
        // local file header signature     4 bytes  (0x04034b50)
        // version needed to extract       2 bytes
        // general purpose bit flag        2 bytes
        // compression method              2 bytes
        // last mod file time              2 bytes
        // last mod file date              2 bytes
        // crc-32                          4 bytes
        // compressed size                 4 bytes
        // uncompressed size               4 bytes
        // file name length                2 bytes
        // extra field length              2 bytes
        //
        // file name (variable size)
        // extra field (variable size)
        let magic = offset
            .checked_add(LOCAL_FILE_HEADER_MAGIC.len())
            .and_then(|end| mapping.get(offset..end))
            .ok_or("Local file header offset outside the archive")?;
        if magic != LOCAL_FILE_HEADER_MAGIC {
            return Err("No local file header signature");
        }
        let mut header = mapping
            .get(offset + LOCAL_FILE_HEADER_MAGIC.len()..offset + LOCAL_FILE_HEADER_SIZE)
            .ok_or("Truncated local file header")?;

        let _minimum_extract_version = read_u16(&mut header);
        let flags = read_u16(&mut header);
        let compression_method = read_u16(&mut header);
        let _last_modified_time = read_u16(&mut header);
        let _last_modified_date = read_u16(&mut header);
        // CRC and sizes are zero when bit 3 of the flags is set (they follow the data),
        // so we always go by the central directory's.
        let _crc32 = read_u32(&mut header);
        let _compressed_size = read_u32(&mut header);
        let _uncompressed_size = read_u32(&mut header);
        let path_length = read_u16(&mut header);
        let extra_field_length = read_u16(&mut header);

        Ok(Self {
            offset,
            flags,
            compression_method,
            path_length,
            extra_field_length,
        })
    }

    /// The offset of the file's data, just past the header's path and extra field.
    pub fn data_offset(&self) -> usize {
        self.offset
            + LOCAL_FILE_HEADER_SIZE
            + self.path_length as usize
            + self.extra_field_length as usize
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// An End of central directory record pointing at `cd_offset`
    /// followed by the given comment.
    fn eocdr(cd_offset: u32, comment: &[u8]) -> Vec<u8> {
        let mut record = EOCDR_MAGIC.to_vec();
        record.extend_from_slice(&[0; 12]);
        record.extend_from_slice(&cd_offset.to_le_bytes());
        record.extend_from_slice(&(comment.len() as u16).to_le_bytes());
        record.extend_from_slice(comment);
        record
    }

    #[test]
    fn too_small() {
        for len in 0..EOCDR_SIZE {
            let mapping = vec![0x50; len];
            assert!(matches!(find_eocdr(&mapping), Err(ZipError::TooSmall(l)) if l == len));
        }
    }

    #[test]
    fn lone_eocdr() {
        let mapping = eocdr(0, b"");
        assert_eq!(find_eocdr(&mapping).unwrap(), 0);
        let (offset, record) = find_central_directory(&mapping).unwrap();
        assert_eq!(offset, 0);
        assert_eq!(record.entries, 0);
        assert!(record.file_comment.is_empty());
    }

    #[test]
    fn no_magic() {
        let mapping = vec![0; 100];
        assert!(matches!(find_eocdr(&mapping), Err(ZipError::EocdNotFound)));
    }

    #[test]
    fn magic_in_the_last_bytes_is_ignored() {
        // Too close to the end to be a record.
        let mut mapping = vec![0; 40];
        mapping[30..34].copy_from_slice(&EOCDR_MAGIC);
        assert!(matches!(find_eocdr(&mapping), Err(ZipError::EocdNotFound)));
    }

    #[test]
    fn comment_with_fake_magic() {
        let mut mapping = vec![0xAA; 64];
        let mut comment = b"see ".to_vec();
        // A fake record whose comment length doesn't reach the end
        comment.extend_from_slice(&eocdr(0, b"xyz"));
        comment.extend_from_slice(b" for details");
        mapping.extend_from_slice(&eocdr(64, &comment));

        assert_eq!(find_eocdr(&mapping).unwrap(), 64);
        let (offset, record) = find_central_directory(&mapping).unwrap();
        assert_eq!(offset, 64);
        assert_eq!(record.file_comment, &comment[..]);
    }

    #[test]
    fn comment_length_must_reach_the_end() {
        let mut mapping = eocdr(0, b"abc");
        // Trailing garbage past the comment
        mapping.push(0);
        assert!(matches!(find_eocdr(&mapping), Err(ZipError::EocdNotFound)));
    }

    #[test]
    fn central_directory_past_eocdr() {
        let mut mapping = vec![0; 10];
        mapping.extend_from_slice(&eocdr(11, b""));
        match find_central_directory(&mapping) {
            Err(ZipError::InvalidCentralDirectoryOffset {
                offset,
                eocdr_offset,
            }) => {
                assert_eq!(offset, 11);
                assert_eq!(eocdr_offset, 10);
            }
            other => panic!("Expected an invalid offset, got {:?}", other),
        }
    }

    #[test]
    fn central_directory_entry_ends_the_walk() {
        let mapping = vec![0; 64];
        // No magic
        assert!(CentralDirectoryEntry::parse(&mapping, 0).is_none());
        // No room
        assert!(CentralDirectoryEntry::parse(&mapping, 20).is_none());
        assert!(CentralDirectoryEntry::parse(&mapping, usize::MAX).is_none());
    }

    #[test]
    fn central_directory_entry_overruns() {
        let mut entry = CENTRAL_DIRECTORY_MAGIC.to_vec();
        entry.resize(CENTRAL_DIRECTORY_ENTRY_SIZE, 0);
        // Claim a 0xffff-byte path
        entry[28..30].copy_from_slice(&[0xff, 0xff]);
        entry.extend_from_slice(b"short");
        match CentralDirectoryEntry::parse(&entry, 0) {
            Some(Err(ZipError::PayloadOutOfBounds { offset, length, .. })) => {
                assert_eq!(offset, 0);
                assert_eq!(length, 0xffff - 5);
            }
            other => panic!("Expected an overrun, got {:?}", other),
        }
    }

    #[test]
    fn local_header_problems() {
        let mut header = LOCAL_FILE_HEADER_MAGIC.to_vec();
        assert_eq!(
            LocalFileHeader::parse(&header, 0).unwrap_err(),
            "Truncated local file header"
        );
        assert_eq!(
            LocalFileHeader::parse(&header, 1).unwrap_err(),
            "Local file header offset outside the archive"
        );
        header.resize(LOCAL_FILE_HEADER_SIZE, 0);
        assert_eq!(
            LocalFileHeader::parse(&header, 0).map(|h| h.data_offset()),
            Ok(LOCAL_FILE_HEADER_SIZE)
        );
        header[0] = b'Q';
        assert_eq!(
            LocalFileHeader::parse(&header, 0).unwrap_err(),
            "No local file header signature"
        );
    }
}
