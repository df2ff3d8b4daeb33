//! Error types for archive update operations.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes when rewriting archives, along with a convenient
//! [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! All fallible operations in this crate return `Result<T, Error>`. You can
//! handle errors using pattern matching or the `?` operator:
//!
//! ```rust,no_run
//! use rearc::{ArchiveUpdater, GzipFormat, Result};
//!
//! fn touch_archive(path: &str) -> Result<()> {
//!     let mut updater = ArchiveUpdater::new(GzipFormat::default());
//!     updater.source_path(path);
//!     updater.update(Some)?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! Errors fall into three categories, mirrored by the classification
//! helpers on [`Error`]:
//!
//! | Category | Variants | Typical cause |
//! |----------|----------|---------------|
//! | Configuration | [`SourceNotSet`][Error::SourceNotSet], [`DestinationNotSet`][Error::DestinationNotSet] | Operation started before the coordinator was configured |
//! | Invariant | [`TransformReturnedNone`][Error::TransformReturnedNone], [`SingleItemFormat`][Error::SingleItemFormat], [`InvalidEntryName`][Error::InvalidEntryName], [`EntryNotFound`][Error::EntryNotFound] | Caller violated an operation contract |
//! | Engine | [`Io`][Error::Io], [`InvalidFormat`][Error::InvalidFormat], [`CorruptEntry`][Error::CorruptEntry] | Underlying container/codec failure |
//!
//! Configuration errors are synchronous and surface before any I/O happens.
//! Engine errors surface after the transaction's cleanup sequence has run;
//! the destination of a failed operation must be treated as corrupt.

use std::io;

/// The main error type for archive update operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred while reading the source or writing the
    /// destination.
    ///
    /// This wraps [`std::io::Error`] and is returned when stream operations
    /// fail: file not found, permission denied, disk full, truncated input.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No source archive was configured before an operation started.
    ///
    /// Call [`source_path`] or [`source_reader`] first.
    ///
    /// [`source_path`]: crate::ArchiveUpdater::source_path
    /// [`source_reader`]: crate::ArchiveUpdater::source_reader
    #[error("no source archive configured")]
    SourceNotSet,

    /// No destination was configured for a stream-sourced operation.
    ///
    /// A path source defaults its destination to the same path (in-place
    /// update); a reader source has no path to default to, so a
    /// destination must be set explicitly.
    #[error("no destination configured for a stream-sourced update")]
    DestinationNotSet,

    /// The transform passed to `update` produced no entry.
    ///
    /// The rewrite in progress is aborted; the destination must be
    /// discarded. `update` transforms entries, it never drops them; use
    /// `remove`/`remove_where` to change the item count.
    #[error("transform produced no entry for item {index}")]
    TransformReturnedNone {
        /// The item index for which the transform returned nothing.
        index: usize,
    },

    /// A multi-entry append was attempted on a single-member container.
    ///
    /// Raw compressors such as gzip hold one member per append step; add
    /// entries one at a time with `append_one`.
    #[error("container format '{format}' accepts a single appended entry at a time")]
    SingleItemFormat {
        /// The short name of the rejecting format.
        format: &'static str,
    },

    /// An entry name failed validation.
    ///
    /// Entry names must be non-empty, free of NUL bytes, relative, and use
    /// forward slashes without a trailing separator.
    #[error("invalid entry name: {0}")]
    InvalidEntryName(String),

    /// No archive item matched the entry given to `remove`.
    ///
    /// Matching is structural over entry properties; the content source
    /// never participates.
    #[error("entry not found: {name}")]
    EntryNotFound {
        /// The name of the entry that matched nothing.
        name: String,
    },

    /// The source stream is not a valid archive of the configured format.
    #[error("invalid {format} data: {reason}")]
    InvalidFormat {
        /// The short name of the format that rejected the stream.
        format: &'static str,
        /// A description of what was expected vs. found.
        reason: String,
    },

    /// An item inside the archive is damaged or truncated.
    #[error("corrupt entry {index}: {reason}")]
    CorruptEntry {
        /// The index of the damaged item.
        index: usize,
        /// A description of the damage.
        reason: String,
    },
}

impl Error {
    /// Returns `true` if this error indicates missing configuration.
    ///
    /// Configuration errors surface synchronously, before any stream is
    /// opened, and are never retried internally.
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::SourceNotSet | Error::DestinationNotSet)
    }

    /// Returns `true` if this error indicates a violated operation
    /// contract (caller-side misuse rather than bad archive data).
    pub fn is_invariant_violation(&self) -> bool {
        matches!(
            self,
            Error::TransformReturnedNone { .. }
                | Error::SingleItemFormat { .. }
                | Error::InvalidEntryName(_)
                | Error::EntryNotFound { .. }
        )
    }

    /// Returns `true` if this error originated below the update protocol:
    /// stream I/O or the container codec itself.
    ///
    /// Engine errors propagate to the caller after the transaction's
    /// cleanup sequence has run; the destination written by the failed
    /// operation is not guaranteed to be a valid archive.
    pub fn is_engine_error(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::InvalidFormat { .. } | Error::CorruptEntry { .. }
        )
    }

    /// Returns the item index associated with this error, if any.
    pub fn entry_index(&self) -> Option<usize> {
        match self {
            Error::TransformReturnedNone { index } => Some(*index),
            Error::CorruptEntry { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Creates an [`Error::InvalidFormat`] with the given context.
    pub fn invalid_format(format: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidFormat {
            format,
            reason: reason.into(),
        }
    }

    /// Creates an [`Error::CorruptEntry`] with the given context.
    pub fn corrupt_entry(index: usize, reason: impl Into<String>) -> Self {
        Error::CorruptEntry {
            index,
            reason: reason.into(),
        }
    }
}

/// A specialized Result type for archive update operations.
///
/// This is defined as `std::result::Result<T, Error>` for convenience.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_from() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("I/O error"));
        assert!(err.is_engine_error());
    }

    #[test]
    fn test_config_errors() {
        assert!(Error::SourceNotSet.is_config_error());
        assert!(Error::DestinationNotSet.is_config_error());
        assert!(!Error::SourceNotSet.is_engine_error());
        assert!(
            Error::DestinationNotSet
                .to_string()
                .contains("stream-sourced")
        );
    }

    #[test]
    fn test_transform_returned_none() {
        let err = Error::TransformReturnedNone { index: 3 };
        assert!(err.is_invariant_violation());
        assert_eq!(err.entry_index(), Some(3));
        assert!(err.to_string().contains("item 3"));
    }

    #[test]
    fn test_single_item_format() {
        let err = Error::SingleItemFormat { format: "gzip" };
        assert!(err.is_invariant_violation());
        assert!(err.to_string().contains("gzip"));
    }

    #[test]
    fn test_entry_not_found() {
        let err = Error::EntryNotFound {
            name: "missing.txt".into(),
        };
        assert_eq!(err.to_string(), "entry not found: missing.txt");
        assert!(err.is_invariant_violation());
    }

    #[test]
    fn test_invalid_format() {
        let err = Error::invalid_format("gzip", "bad magic bytes");
        assert!(err.is_engine_error());
        assert!(err.to_string().contains("gzip"));
        assert!(err.to_string().contains("bad magic bytes"));
    }

    #[test]
    fn test_corrupt_entry() {
        let err = Error::corrupt_entry(5, "truncated member");
        assert!(err.is_engine_error());
        assert_eq!(err.entry_index(), Some(5));
        assert!(err.to_string().contains("entry 5"));
    }

    #[test]
    fn test_categories_are_disjoint() {
        let samples = [
            Error::SourceNotSet,
            Error::TransformReturnedNone { index: 0 },
            Error::invalid_format("tar", "x"),
        ];
        for err in &samples {
            let hits = [
                err.is_config_error(),
                err.is_invariant_violation(),
                err.is_engine_error(),
            ]
            .iter()
            .filter(|b| **b)
            .count();
            assert_eq!(hits, 1, "{err} should fall in exactly one category");
        }
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
