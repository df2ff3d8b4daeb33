//! The update coordinator: one transaction per operation, lazy content
//! supply, fixed-order resource cleanup.
//!
//! # Example
//!
//! ```rust,no_run
//! use rearc::{ArchiveUpdater, TarFormat, UpdateEntry};
//!
//! let mut updater = ArchiveUpdater::new(TarFormat::default());
//! updater.source_path("bundle.tar");
//!
//! // Append a file, then drop every log from the archive.
//! let entry = UpdateEntry::file("notes.txt")?.with_source_bytes(b"hi".to_vec());
//! updater.append_one(entry)?;
//! let summary = updater.remove_where(|e| e.name().ends_with(".log"))?;
//! println!("{} entries left", summary.total_entries);
//! # rearc::Result::Ok(())
//! ```

mod coordinator;
mod feed;
mod summary;

pub use coordinator::ArchiveUpdater;
pub use summary::UpdateSummary;
