//! Result record for update operations.

/// Result of one update operation.
#[must_use = "update result should be checked to verify the operation completed as expected"]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Number of items carried over unchanged.
    pub entries_kept: usize,
    /// Number of new entries appended.
    pub entries_added: usize,
    /// Number of items removed.
    pub entries_removed: usize,
    /// Number of items rewritten with changed metadata or content.
    pub entries_updated: usize,
    /// Total number of items in the produced archive.
    pub total_entries: usize,
}

impl UpdateSummary {
    /// Returns `true` if the operation changed nothing: no additions,
    /// removals, or rewrites.
    pub fn is_noop(&self) -> bool {
        self.entries_added == 0 && self.entries_removed == 0 && self.entries_updated == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_noop() {
        let summary = UpdateSummary::default();
        assert!(summary.is_noop());
        assert_eq!(summary.total_entries, 0);
    }

    #[test]
    fn test_noop_detection() {
        let summary = UpdateSummary {
            entries_kept: 4,
            total_entries: 4,
            ..Default::default()
        };
        assert!(summary.is_noop());

        let summary = UpdateSummary {
            entries_kept: 3,
            entries_updated: 1,
            total_entries: 4,
            ..Default::default()
        };
        assert!(!summary.is_noop());
    }
}
