//! Capability traits connecting the update coordinator to container
//! engines.
//!
//! The coordinator never parses or writes a container format itself. It
//! talks to an engine through three narrow traits:
//!
//! - [`ContainerEngine`] opens a seekable source stream and enumerates
//!   the stored items;
//! - [`ContainerArchive`] rewrites the container into a destination
//!   stream, pulling per-item decisions from a callback;
//! - [`UpdateFeed`] is that callback, implemented by the coordinator.
//!
//! # Rewrite protocol
//!
//! `update_items` drives a strict two-phase protocol:
//!
//! 1. **Metadata phase**: [`UpdateFeed::plan`] is invoked exactly once
//!    for every target index `0..new_count`, in ascending order. Each
//!    call yields an [`ItemPlan`]: either carry a stored item over
//!    verbatim, or write an item record with change flags.
//! 2. **Content phase**: [`UpdateFeed::content`] is invoked only for
//!    indices whose plan set `content_changed`, only after the metadata
//!    phase has completed, and in whatever order suits the engine. The
//!    invoked set is sparse; engines must not assume contiguous or
//!    complete invocation, and feeds must answer "no stream" for any
//!    other index.
//!
//! Every reader obtained from `content` is owned by the engine from that
//! point on and must be dropped before `update_items` returns.

use std::io::{Read, Seek, Write};

use crate::{Password, Result};

/// Combined `Read + Seek` bound for container input streams.
///
/// Container engines need sized, seekable input; plain streams are
/// buffered by [`Source::from_reader`](crate::Source::from_reader) before
/// they get here.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// One per-index decision produced during the metadata phase.
#[derive(Debug)]
pub enum ItemPlan<I> {
    /// Carry the stored item at `source_index` into the output verbatim:
    /// same metadata, same bytes, no recompression.
    Keep {
        /// Index of the item in the *source* archive.
        source_index: usize,
    },
    /// Write an item record at this index.
    Write {
        /// The format-specific item record to write.
        item: I,
        /// Whether the record's comparable properties differ from the
        /// stored item at the same index (always `true` for appended
        /// items).
        properties_changed: bool,
        /// Whether new content will be supplied for this index during
        /// the content phase.
        content_changed: bool,
    },
}

/// The per-item callback a rewrite pulls from, implemented by the update
/// coordinator.
pub trait UpdateFeed<I> {
    /// Metadata phase: decides what lands at target index `index`.
    ///
    /// `existing` is the stored item at the same index when one exists
    /// (`index < original_count`); appended indices see `None`. Feeds
    /// that remap indices (removal) ignore it and name their own source
    /// index in the returned plan.
    fn plan(&mut self, index: usize, existing: Option<&I>) -> Result<ItemPlan<I>>;

    /// Content phase: opens the pending content for `index`.
    ///
    /// Returns `Ok(None)` when the index has no payload (carried-over
    /// items, directory markers, entries appended without a source).
    fn content(&mut self, index: usize) -> Result<Option<Box<dyn Read + Send>>>;

    /// The password for engines that encrypt or decrypt.
    ///
    /// The default implementation supplies none.
    fn password(&self) -> Option<&Password> {
        None
    }
}

/// A container format engine: opens archives and connects them to a
/// writable rewrite.
pub trait ContainerEngine {
    /// The format-specific item record.
    type Item;
    /// The opened archive handle, bound to its source stream.
    type Archive: ContainerArchive<Item = Self::Item>;

    /// Short format name used in errors and logs.
    fn kind(&self) -> &'static str;

    /// Whether the container can hold more than one item.
    ///
    /// Single-member formats still implement the full rewrite protocol;
    /// this flag only gates the public multi-entry `append` surface.
    fn multi_item(&self) -> bool;

    /// Opens `input` and enumerates its items.
    ///
    /// The archive handle owns the input stream; dropping the handle
    /// closes it along with any connected write state.
    fn open(&self, input: Box<dyn ReadSeek>) -> Result<Self::Archive>;
}

/// An opened container archive: an immutable item list plus the
/// connected rewrite operation.
pub trait ContainerArchive {
    /// The format-specific item record.
    type Item;

    /// The stored items, in archive order.
    fn items(&self) -> &[Self::Item];

    /// The number of stored items.
    fn item_count(&self) -> usize {
        self.items().len()
    }

    /// Rewrites the container into `output` with `new_count` items
    /// supplied by `feed`, following the two-phase protocol described in
    /// the [module docs](self).
    fn update_items(
        &mut self,
        output: &mut dyn Write,
        new_count: usize,
        feed: &mut dyn UpdateFeed<Self::Item>,
    ) -> Result<()>;
}
