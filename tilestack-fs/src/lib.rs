//! Capability-based filesystem helpers shared by the tilestack crates.
//!
//! Every helper resolves paths through `cap-std` with ambient authority and
//! speaks `camino` UTF-8 paths so callers never juggle `OsStr`.
#![forbid(unsafe_code)]

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8};
use std::io::{self, Read};

/// Open a UTF-8 file path for reading.
pub fn open_utf8_file(path: &Utf8Path) -> io::Result<fs_utf8::File> {
    fs_utf8::File::open_ambient(path, ambient_authority())
}

/// Open a directory handle for `path`.
pub fn open_dir(path: &Utf8Path) -> io::Result<fs_utf8::Dir> {
    fs_utf8::Dir::open_ambient_dir(path, ambient_authority())
}

/// Read a whole file as UTF-8 text.
pub fn read_to_string(path: &Utf8Path) -> io::Result<String> {
    let mut file = open_utf8_file(path)?;
    let mut text = String::new();
    file.read_to_string(&mut text)?;
    Ok(text)
}

/// Read a whole file as bytes.
pub fn read_bytes(path: &Utf8Path) -> io::Result<Vec<u8>> {
    let mut file = open_utf8_file(path)?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(bytes)
}

/// Return whether `path` exists and is a regular file.
///
/// A missing file or parent directory yields `Ok(false)`; other failures are
/// returned.
pub fn file_is_file(path: &Utf8Path) -> io::Result<bool> {
    entry_matches(path, |meta| meta.is_file())
}

/// Return whether `path` exists and is a directory.
///
/// A missing entry yields `Ok(false)`; other failures are returned.
pub fn dir_exists(path: &Utf8Path) -> io::Result<bool> {
    if path.file_name().is_none() {
        // Roots and `..`-terminated paths have no entry in a parent.
        return open_dir(path).map(|_| true).or_else(not_found_as_false);
    }
    entry_matches(path, |meta| meta.is_dir())
}

fn entry_matches(
    path: &Utf8Path,
    predicate: impl Fn(&cap_std::fs::Metadata) -> bool,
) -> io::Result<bool> {
    let name = path
        .file_name()
        .ok_or_else(|| io::Error::other("path should include a file name"))?;
    let dir = match open_dir(parent_or_current(path)) {
        Ok(dir) => dir,
        Err(err) => return not_found_as_false(err),
    };
    match dir.metadata(name) {
        Ok(meta) => Ok(predicate(&meta)),
        Err(err) => not_found_as_false(err),
    }
}

fn parent_or_current(path: &Utf8Path) -> &Utf8Path {
    match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    }
}

fn not_found_as_false(err: io::Error) -> io::Result<bool> {
    if err.kind() == io::ErrorKind::NotFound {
        Ok(false)
    } else {
        Err(err)
    }
}
