use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::*;
use memmap2::Mmap;
use structopt::*;

use zipview::listing;
use zipview::ZipArchive;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "zipview",
    about = "Lists a .zip file's contents, or writes the named files to stdout"
)]
struct Opt {
    /// Pass multiple times for additional verbosity (info, debug, trace)
    #[structopt(short, long, parse(from_occurrences))]
    verbosity: usize,

    /// List sizes, compression, CRCs, and dates along with names.
    /// Can't be combined with files to extract.
    #[structopt(short, long, conflicts_with("FILE"))]
    long: bool,

    /// Decompress every file and check its CRC instead of printing anything.
    /// Can't be combined with files to extract.
    #[structopt(short, long, conflicts_with_all(&["FILE", "long"]))]
    test: bool,

    #[structopt(name("ZIP file"))]
    zip_path: PathBuf,

    /// Files to extract. Without any, the archive's contents are listed.
    /// Names are matched byte for byte, so they needn't be UTF-8.
    #[structopt(name("FILE"), parse(from_os_str))]
    names: Vec<OsString>,
}

fn main() -> Result<()> {
    let args = Opt::from_args();

    let mut errlog = stderrlog::new();
    errlog.verbosity(args.verbosity + 1);
    errlog.init()?;

    info!("Memory mapping {:#?}", &args.zip_path);
    let zip_file = File::open(&args.zip_path)
        .with_context(|| format!("Couldn't open {}", args.zip_path.display()))?;
    let mapping = unsafe { Mmap::map(&zip_file).context("Couldn't mmap zip file")? };

    let archive = ZipArchive::new(&mapping)
        .with_context(|| format!("Couldn't load archive {}", args.zip_path.display()))?;

    if args.test {
        test_zip(&archive, &args.zip_path)
    } else if args.names.is_empty() {
        list_zip(&archive, &args.zip_path, args.long)
    } else {
        extract_files(&archive, &args.zip_path, &args.names)
    }
}

fn list_zip(archive: &ZipArchive, zip_path: &Path, long: bool) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let count = if long {
        listing::write_long_listing(archive, &mut out)
    } else {
        listing::write_names(archive, &mut out)
    }
    .with_context(|| format!("Couldn't list {}", zip_path.display()))?;
    out.flush()?;
    debug!("Listed {} entries", count);
    Ok(())
}

/// Writes each named file to stdout, in the order given.
/// A file that can't be found or read is reported, and we move on to the next.
fn extract_files(archive: &ZipArchive, zip_path: &Path, names: &[OsString]) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let name_bytes: Vec<Cow<[u8]>> = names.iter().map(|n| os_str_bytes(n)).collect();
    let results = archive.extract_all(&name_bytes, &mut out);
    out.flush()?;

    let mut failures = 0;
    for (name, result) in names.iter().zip(results) {
        match result {
            Ok(written) => debug!("{}: wrote {} bytes", name.to_string_lossy(), written),
            Err(e) => {
                error!("{}: {}: {}", zip_path.display(), name.to_string_lossy(), e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} files couldn't be extracted", failures, names.len());
    }
    Ok(())
}

#[cfg(unix)]
fn os_str_bytes(s: &OsStr) -> Cow<[u8]> {
    use std::os::unix::ffi::OsStrExt;
    Cow::Borrowed(s.as_bytes())
}

#[cfg(not(unix))]
fn os_str_bytes(s: &OsStr) -> Cow<[u8]> {
    match s.to_string_lossy() {
        Cow::Borrowed(s) => Cow::Borrowed(s.as_bytes()),
        Cow::Owned(s) => Cow::Owned(s.into_bytes()),
    }
}

/// Reads every file in the archive into the void, checking CRCs.
fn test_zip(archive: &ZipArchive, zip_path: &Path) -> Result<()> {
    let mut failures = 0;
    let mut count = 0;

    for entry in archive.entries() {
        let entry = entry.with_context(|| format!("Couldn't walk {}", zip_path.display()))?;
        count += 1;
        match archive.extract(&entry, &mut io::sink()) {
            Ok(_) => info!("{}: OK", entry.name_lossy()),
            Err(e) => {
                error!(
                    "{}: {} (local header at {:#x}): {}",
                    zip_path.display(),
                    entry.name_lossy(),
                    entry.header_offset(),
                    e
                );
                failures += 1;
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} files in {} failed", failures, count, zip_path.display());
    }
    eprintln!("No errors detected in {} ({} files)", zip_path.display(), count);
    Ok(())
}
