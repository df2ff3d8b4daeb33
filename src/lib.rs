//! # rearc
//!
//! A format-agnostic archive update engine.
//!
//! Given an existing archive and a sequence of logical edits (append
//! entries, remove entries, replace entry content or metadata), `rearc`
//! produces a new, valid archive reflecting those edits. Items the edits
//! don't touch are carried over byte-for-byte: no recompression, no
//! manual decompress-then-recompress cycle.
//!
//! The crate is built around one coordinator, [`ArchiveUpdater`], talking
//! to container formats through a narrow capability interface
//! ([`ContainerEngine`] + [`FormatAdapter`]). Formats are plain values;
//! gzip and tar engines ship behind default-on features.
//!
//! ## Quick Start
//!
//! ### Appending to an archive
//!
//! ```rust,no_run
//! use rearc::{ArchiveUpdater, TarFormat, UpdateEntry, Result};
//!
//! fn main() -> Result<()> {
//!     let mut updater = ArchiveUpdater::new(TarFormat::default());
//!     updater.source_path("bundle.tar"); // in-place by default
//!
//!     let entry = UpdateEntry::file("docs/notes.txt")?
//!         .with_source_bytes(b"remember the milk".to_vec());
//!     let summary = updater.append_one(entry)?;
//!     println!("{} entries now", summary.total_entries);
//!     Ok(())
//! }
//! ```
//!
//! ### Removing entries
//!
//! ```rust,no_run
//! use rearc::{ArchiveUpdater, TarFormat, Result};
//!
//! fn main() -> Result<()> {
//!     let mut updater = ArchiveUpdater::new(TarFormat::default());
//!     updater.source_path("bundle.tar").destination_path("trimmed.tar");
//!
//!     let summary = updater.remove_where(|entry| entry.name().ends_with(".log"))?;
//!     println!("removed {} entries", summary.entries_removed);
//!     Ok(())
//! }
//! ```
//!
//! ### Replacing one entry's content
//!
//! ```rust,no_run
//! use rearc::{ArchiveUpdater, GzipFormat, Result};
//!
//! fn main() -> Result<()> {
//!     let mut updater = ArchiveUpdater::new(GzipFormat::default());
//!     updater.source_path("data.gz");
//!
//!     updater.update(|entry| {
//!         if entry.name() == "data" {
//!             Some(entry.with_source_bytes(b"fresh bytes".to_vec()))
//!         } else {
//!             Some(entry)
//!         }
//!     })?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `gzip` | Yes | Gzip (RFC 1952) single-member container via `flate2` |
//! | `tar` | Yes | Tar (ustar) multi-member container via `tar` |
//!
//! Disable default features to bring your own [`ContainerEngine`] /
//! [`FormatAdapter`] implementation:
//!
//! ```toml
//! [dependencies]
//! rearc = { version = "0.4", default-features = false }
//! ```
//!
//! ## Resource Ownership
//!
//! The coordinator owns, and closes before an operation returns, every
//! stream it opens itself: path-typed sources and destinations, and the
//! per-entry content sources it opens during a rewrite. It never closes
//! a caller-supplied stream: a reader source is drained through a
//! borrow, and a writer destination is only flushed. This asymmetry is
//! part of the contract.
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`], an alias for
//! `std::result::Result<T, Error>`. Configuration errors surface before
//! any I/O; engine errors propagate after the transaction's cleanup has
//! run, and the destination of a failed operation must be discarded.
//! See the [`error`] module for the full taxonomy.
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod binding;
pub mod engine;
pub mod entry;
pub mod error;
pub mod format;
pub mod password;
pub mod update;

pub use binding::{Destination, SharedBuffer, SharedBytes, Source};
pub use engine::{ContainerArchive, ContainerEngine, ItemPlan, ReadSeek, UpdateFeed};
pub use entry::{ContentSource, EntryProperties, UpdateEntry};
pub use error::{Error, Result};
pub use format::FormatAdapter;
pub use password::Password;
pub use update::{ArchiveUpdater, UpdateSummary};

#[cfg(feature = "gzip")]
pub use format::gzip::GzipFormat;

#[cfg(feature = "tar")]
pub use format::tar::TarFormat;
