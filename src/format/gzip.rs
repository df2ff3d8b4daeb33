//! Gzip (RFC 1952) container support.
//!
//! Gzip is the single-member representative: one compressed member per
//! append step, no directories, member metadata limited to an optional
//! file name and a timestamp. Multi-member files (concatenated members)
//! are fully supported by the rewrite protocol (decompressors treat
//! them as one concatenated stream), but the public multi-entry `append`
//! surface is gated off for this format.
//!
//! Untouched members are carried over by copying their raw bytes, so no
//! recompression happens for pass-through items. A metadata-only change
//! rewrites the member header and copies the compressed body and trailer
//! verbatim; only members with replaced content are re-encoded.

use std::io::{self, Read, Write};
use std::ops::Range;
use std::time::{Duration, SystemTime};

use flate2::{Compression, Crc, GzBuilder};

use crate::engine::{ContainerArchive, ContainerEngine, ItemPlan, ReadSeek, UpdateFeed};
use crate::format::FormatAdapter;
use crate::{Error, Result, UpdateEntry};

/// Short format name used in errors and logs.
const FORMAT: &str = "gzip";

/// Name materialized for members stored without a FNAME field.
const DEFAULT_MEMBER_NAME: &str = "data";

/// Gzip member flag bits.
const FHCRC: u8 = 0x02;
const FEXTRA: u8 = 0x04;
const FNAME: u8 = 0x08;
const FCOMMENT: u8 = 0x10;

/// "Unknown" OS byte for members written from scratch.
const OS_UNKNOWN: u8 = 255;

/// The gzip container format.
///
/// A thin configuration value; construct one per updater.
///
/// # Example
///
/// ```rust,no_run
/// use rearc::{ArchiveUpdater, GzipFormat};
///
/// let mut updater = ArchiveUpdater::new(GzipFormat::default());
/// updater.source_path("data.gz");
/// updater.update(Some)?;
/// # rearc::Result::Ok(())
/// ```
#[derive(Debug, Clone)]
pub struct GzipFormat {
    level: Compression,
}

impl GzipFormat {
    /// Creates the format with the given compression level for
    /// re-encoded members.
    pub fn new(level: Compression) -> Self {
        Self { level }
    }
}

impl Default for GzipFormat {
    fn default() -> Self {
        Self {
            level: Compression::new(6),
        }
    }
}

/// Metadata of one stored gzip member.
#[derive(Debug, Clone)]
pub struct GzipItem {
    /// The FNAME field, when present.
    pub name: Option<String>,
    /// The MTIME field; 0 means "not set".
    pub mtime: u32,
    /// The OS byte of the member header.
    pub os: u8,
    /// Uncompressed size, recovered while scanning the member.
    pub unpacked_size: u64,
}

/// One parsed member: its metadata plus byte ranges into the source.
#[derive(Debug)]
struct Member {
    item: GzipItem,
    /// The whole member, header through trailer.
    raw: Range<usize>,
    /// The deflate body only (header end to trailer start).
    body: Range<usize>,
}

/// An opened gzip file: the raw source bytes and its parsed members.
pub struct GzipArchive {
    buf: Vec<u8>,
    members: Vec<Member>,
    items: Vec<GzipItem>,
    level: Compression,
}

impl ContainerEngine for GzipFormat {
    type Item = GzipItem;
    type Archive = GzipArchive;

    fn kind(&self) -> &'static str {
        FORMAT
    }

    fn multi_item(&self) -> bool {
        false
    }

    fn open(&self, mut input: Box<dyn ReadSeek>) -> Result<Self::Archive> {
        let mut buf = Vec::new();
        input.read_to_end(&mut buf)?;

        let mut members = Vec::new();
        let mut offset = 0usize;
        while offset < buf.len() {
            let member = parse_member(&buf, offset, members.len())?;
            offset = member.raw.end;
            members.push(member);
        }

        let items = members.iter().map(|m| m.item.clone()).collect();
        Ok(GzipArchive {
            buf,
            members,
            items,
            level: self.level,
        })
    }
}

impl ContainerArchive for GzipArchive {
    type Item = GzipItem;

    fn items(&self) -> &[GzipItem] {
        &self.items
    }

    fn update_items(
        &mut self,
        output: &mut dyn Write,
        new_count: usize,
        feed: &mut dyn UpdateFeed<GzipItem>,
    ) -> Result<()> {
        // Metadata phase: one plan per target index, in order.
        let mut plans = Vec::with_capacity(new_count);
        for index in 0..new_count {
            let existing = self.items.get(index);
            plans.push(feed.plan(index, existing)?);
        }

        // Content phase interleaved with writing; content is requested
        // only for indices whose plan flagged new content.
        for (index, plan) in plans.into_iter().enumerate() {
            match plan {
                ItemPlan::Keep { source_index } => {
                    let member = self.members.get(source_index).ok_or_else(|| {
                        Error::corrupt_entry(source_index, "kept index out of range")
                    })?;
                    output.write_all(&self.buf[member.raw.clone()])?;
                }
                ItemPlan::Write {
                    item,
                    properties_changed,
                    content_changed,
                } => {
                    if content_changed {
                        let reader = feed.content(index)?;
                        self.encode_member(output, &item, reader)?;
                    } else if let Some(member) = self.members.get(index) {
                        if properties_changed {
                            // New header over the untouched compressed
                            // body and trailer.
                            write_member_header(output, &item)?;
                            output.write_all(&self.buf[member.body.clone()])?;
                            output.write_all(&self.buf[member.body.end..member.raw.end])?;
                        } else {
                            output.write_all(&self.buf[member.raw.clone()])?;
                        }
                    } else {
                        // Appended entry without content: an empty member.
                        self.encode_member(output, &item, None)?;
                    }
                }
            }
        }

        output.flush()?;
        Ok(())
    }
}

impl GzipArchive {
    /// Encodes a full member from the given content stream (or empty
    /// content when none is supplied).
    fn encode_member(
        &self,
        output: &mut dyn Write,
        item: &GzipItem,
        reader: Option<Box<dyn Read + Send>>,
    ) -> Result<()> {
        let mut builder = GzBuilder::new().mtime(item.mtime);
        if let Some(name) = &item.name {
            builder = builder.filename(name.as_str());
        }
        let mut encoder = builder.write(&mut *output, self.level);
        if let Some(mut reader) = reader {
            io::copy(&mut reader, &mut encoder)?;
        }
        encoder.finish()?;
        Ok(())
    }
}

impl FormatAdapter for GzipFormat {
    type Item = GzipItem;

    fn item_to_entry(&self, item: &GzipItem) -> UpdateEntry {
        let name = item
            .name
            .clone()
            .unwrap_or_else(|| DEFAULT_MEMBER_NAME.to_string());
        let mut entry = UpdateEntry::from_properties(crate::EntryProperties {
            name,
            is_directory: false,
            size: Some(item.unpacked_size),
            modified: None,
            attributes: None,
        });
        if item.mtime != 0 {
            entry = entry
                .with_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(item.mtime.into()));
        }
        entry
    }

    fn entry_to_item(
        &self,
        entry: &UpdateEntry,
        template: Option<&GzipItem>,
    ) -> Result<GzipItem> {
        if entry.is_directory() {
            return Err(Error::invalid_format(
                FORMAT,
                "directory entries cannot be represented",
            ));
        }

        let props = entry.properties();

        // A member stored without FNAME keeps it that way as long as the
        // entry still carries the synthesized name.
        let name = match template {
            Some(t) if t.name.is_none() && props.name == DEFAULT_MEMBER_NAME => None,
            _ => Some(props.name.clone()),
        };

        let mtime = match props.modified {
            Some(modified) => modified
                .duration_since(SystemTime::UNIX_EPOCH)
                .map(|d| d.as_secs() as u32)
                .unwrap_or(0),
            None => template.map(|t| t.mtime).unwrap_or(0),
        };

        Ok(GzipItem {
            name,
            mtime,
            os: template.map(|t| t.os).unwrap_or(OS_UNKNOWN),
            unpacked_size: props
                .size
                .or_else(|| template.map(|t| t.unpacked_size))
                .unwrap_or(0),
        })
    }
}

/// Parses one member starting at `offset`, locating its body and
/// trailer by decoding the deflate stream.
fn parse_member(buf: &[u8], offset: usize, index: usize) -> Result<Member> {
    let (item_header, header_len) = parse_member_header(buf, offset, index)?;
    let body_start = offset + header_len;

    // Walk the deflate stream to find the member boundary, verifying the
    // CRC-32 and ISIZE trailer along the way.
    let mut cursor = io::Cursor::new(&buf[body_start..]);
    let mut decoder = flate2::bufread::DeflateDecoder::new(&mut cursor);
    let mut crc = Crc::new();
    let mut scratch = [0u8; 64 * 1024];
    loop {
        let read = decoder.read(&mut scratch).map_err(|e| {
            Error::corrupt_entry(index, format!("deflate stream failed: {e}"))
        })?;
        if read == 0 {
            break;
        }
        crc.update(&scratch[..read]);
    }
    let consumed = decoder.total_in() as usize;

    let trailer_start = body_start + consumed;
    let trailer = buf
        .get(trailer_start..trailer_start + 8)
        .ok_or_else(|| Error::corrupt_entry(index, "truncated member trailer"))?;
    let stored_crc = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let stored_isize = u32::from_le_bytes([trailer[4], trailer[5], trailer[6], trailer[7]]);

    if stored_crc != crc.sum() {
        return Err(Error::corrupt_entry(
            index,
            format!(
                "CRC mismatch: expected {:#x}, got {:#x}",
                stored_crc,
                crc.sum()
            ),
        ));
    }
    let unpacked_size = crc.amount() as u64;
    if stored_isize != unpacked_size as u32 {
        return Err(Error::corrupt_entry(index, "ISIZE mismatch"));
    }

    Ok(Member {
        item: GzipItem {
            unpacked_size,
            ..item_header
        },
        raw: offset..trailer_start + 8,
        body: body_start..trailer_start,
    })
}

/// Parses a member header, returning its fields and encoded length.
fn parse_member_header(buf: &[u8], offset: usize, index: usize) -> Result<(GzipItem, usize)> {
    let header = &buf[offset..];
    if header.len() < 10 {
        return Err(Error::corrupt_entry(index, "truncated member header"));
    }
    if header[0] != 0x1f || header[1] != 0x8b {
        if index == 0 {
            return Err(Error::invalid_format(FORMAT, "bad magic bytes"));
        }
        return Err(Error::corrupt_entry(index, "garbage between members"));
    }
    if header[2] != 8 {
        return Err(Error::invalid_format(
            FORMAT,
            format!("unsupported compression method {}", header[2]),
        ));
    }

    let flg = header[3];
    let mtime = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    let os = header[9];
    let mut pos = 10usize;

    if flg & FEXTRA != 0 {
        let xlen = header
            .get(pos..pos + 2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]) as usize)
            .ok_or_else(|| Error::corrupt_entry(index, "truncated FEXTRA field"))?;
        pos += 2 + xlen;
    }

    let mut name = None;
    if flg & FNAME != 0 {
        let terminator = header[pos..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::corrupt_entry(index, "unterminated FNAME field"))?;
        name = Some(String::from_utf8_lossy(&header[pos..pos + terminator]).into_owned());
        pos += terminator + 1;
    }

    if flg & FCOMMENT != 0 {
        let terminator = header[pos..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::corrupt_entry(index, "unterminated FCOMMENT field"))?;
        pos += terminator + 1;
    }

    if flg & FHCRC != 0 {
        pos += 2;
    }

    if pos > header.len() {
        return Err(Error::corrupt_entry(index, "truncated member header"));
    }

    Ok((
        GzipItem {
            name,
            mtime,
            os,
            unpacked_size: 0,
        },
        pos,
    ))
}

/// Writes a fresh member header for a metadata-only rewrite.
///
/// FEXTRA/FCOMMENT/FHCRC fields of the original header are not carried
/// over; the deflate body and trailer that follow stay untouched.
fn write_member_header(output: &mut dyn Write, item: &GzipItem) -> Result<()> {
    let mut flg = 0u8;
    if item.name.is_some() {
        flg |= FNAME;
    }
    output.write_all(&[0x1f, 0x8b, 8, flg])?;
    output.write_all(&item.mtime.to_le_bytes())?;
    output.write_all(&[0, item.os])?;
    if let Some(name) = &item.name {
        output.write_all(name.as_bytes())?;
        output.write_all(&[0])?;
    }
    Ok(())
}
