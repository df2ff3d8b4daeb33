//! Shared test utilities for integration tests.
//!
//! Archive fixtures are created and read back with the underlying
//! container crates directly, so the tests exercise the update engine
//! against independently-produced bytes.
//!
//! Note: `#![allow(dead_code)]` is required because each integration
//! test file compiles as a separate crate and may only use a subset of
//! these helpers.

#![allow(dead_code)]

use std::io::{Cursor, Read, Write};
use std::path::Path;

/// Creates a gzip file with a single member.
#[cfg(feature = "gzip")]
pub fn make_gzip(name: Option<&str>, mtime: u32, data: &[u8]) -> Vec<u8> {
    let mut builder = flate2::GzBuilder::new().mtime(mtime);
    if let Some(name) = name {
        builder = builder.filename(name);
    }
    let mut encoder = builder.write(Vec::new(), flate2::Compression::new(6));
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Reads back every member of a (possibly multi-member) gzip file as
/// `(file name, decompressed bytes)` pairs.
#[cfg(feature = "gzip")]
pub fn read_gzip_members(bytes: &[u8]) -> Vec<(Option<String>, Vec<u8>)> {
    let mut members = Vec::new();
    let mut cursor = Cursor::new(bytes);
    while (cursor.position() as usize) < bytes.len() {
        let mut decoder = flate2::bufread::GzDecoder::new(&mut cursor);
        let mut data = Vec::new();
        decoder.read_to_end(&mut data).unwrap();
        let name = decoder
            .header()
            .and_then(|h| h.filename())
            .map(|raw| String::from_utf8_lossy(raw).into_owned());
        members.push((name, data));
    }
    members
}

/// Creates a tar archive from `(name, data)` pairs.
#[cfg(feature = "tar")]
pub fn make_tar(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_mode(0o644);
        header.set_mtime(1_700_000_000);
        header.set_size(data.len() as u64);
        builder
            .append_data(&mut header, Path::new(name), *data)
            .unwrap();
    }
    builder.into_inner().unwrap()
}

/// Reads back every file member of a tar archive as `(name, bytes)`
/// pairs; directory markers are reported with empty bytes.
#[cfg(feature = "tar")]
pub fn read_tar(bytes: &[u8]) -> Vec<(String, Vec<u8>)> {
    let mut archive = tar::Archive::new(Cursor::new(bytes));
    let mut contents = Vec::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry.path().unwrap().to_string_lossy().into_owned();
        let mut data = Vec::new();
        entry.read_to_end(&mut data).unwrap();
        contents.push((name, data));
    }
    contents
}

/// Looks up one member's bytes by name.
#[cfg(feature = "tar")]
pub fn tar_member<'a>(contents: &'a [(String, Vec<u8>)], name: &str) -> Option<&'a [u8]> {
    contents
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, data)| data.as_slice())
}
