//! Printing an archive's contents

use std::io::Write;

use crate::read::*;
use crate::result::*;

/// Writes each entry's [display name] on its own line,
/// in central directory order, returning how many there were.
///
/// Names are written as the raw bytes found in the archive.
/// If the walk hits a broken entry, the names before it have
/// already been written when the error comes back.
///
/// [display name]: ../read/struct.FileMetadata.html#method.display_name
pub fn write_names<W: Write + ?Sized>(archive: &ZipArchive, out: &mut W) -> ZipResult<usize> {
    let mut count = 0;
    for entry in archive.entries() {
        let entry = entry?;
        out.write_all(entry.display_name())?;
        out.write_all(b"\n")?;
        count += 1;
    }
    Ok(count)
}

/// Writes a table of each entry's size, compressed size, method, CRC-32,
/// and modification time, ala `unzip -v`, returning how many entries there were.
pub fn write_long_listing<W: Write + ?Sized>(
    archive: &ZipArchive,
    out: &mut W,
) -> ZipResult<usize> {
    writeln!(
        out,
        "{:>10}  {:<7} {:>10} {:>4}  {:<16}  {:<8}  Name",
        "Length", "Method", "Size", "Cmpr", "Date Time", "CRC-32"
    )?;
    writeln!(
        out,
        "----------  ------- ---------- ----  ----------------  --------  ----"
    )?;

    let mut count = 0;
    let mut total_size = 0u64;
    let mut total_compressed = 0u64;
    for entry in archive.entries() {
        let entry = entry?;
        let modified = entry
            .last_modified
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| String::from("-"));
        writeln!(
            out,
            "{:>10}  {:<7} {:>10} {:>3}%  {:<16}  {:08x}  {}",
            entry.size,
            entry.compression_method,
            entry.compressed_size,
            savings(entry.size as u64, entry.compressed_size as u64),
            modified,
            entry.crc32,
            entry.name_lossy()
        )?;
        count += 1;
        total_size += entry.size as u64;
        total_compressed += entry.compressed_size as u64;
    }

    writeln!(
        out,
        "----------          ---------- ----                                ----"
    )?;
    writeln!(
        out,
        "{:>10}          {:>10} {:>3}%                                {} file{}",
        total_size,
        total_compressed,
        savings(total_size, total_compressed),
        count,
        if count == 1 { "" } else { "s" }
    )?;
    Ok(count)
}

/// How much smaller compression made something, as a whole percentage.
fn savings(size: u64, compressed: u64) -> i64 {
    if size == 0 {
        return 0;
    }
    100 - (compressed as i128 * 100 / size as i128) as i64
}
