//! Version-gated field tables.
//!
//! Each table lists the optional members of a record and the first class
//! version that streams them. Readers consult the table through [`Gates`]
//! instead of comparing version numbers inline, so the compatibility matrix
//! can be audited and tested on its own.

use std::ops::RangeInclusive;

/// `(member, first version that streams it)`.
pub type FieldTable = &'static [(&'static str, u16)];

/// `TTree` versions this reader decodes.
pub const TTREE_VERSIONS: RangeInclusive<u16> = 16..=20;
/// `TBranch` versions this reader decodes.
pub const TBRANCH_VERSIONS: RangeInclusive<u16> = 10..=13;
/// `TBranchElement` versions this reader decodes.
pub const TBRANCH_ELEMENT_VERSIONS: RangeInclusive<u16> = 8..=10;

/// Optional `TTree` members.
pub const TTREE_FIELDS: FieldTable = &[
    ("fFlushedBytes", 18),
    ("fDefaultEntryOffsetLen", 18),
    ("fAutoFlush", 18),
    ("fNClusterRange", 19),
    ("fClusterRangeEnd", 19),
    ("fClusterSize", 19),
    ("fIOFeatures", 20),
];

/// Optional `TBranch` members.
pub const TBRANCH_FIELDS: FieldTable = &[("fFirstEntry", 11), ("fIOFeatures", 13)];

/// `TBranchElement` members whose encoding depends on the version.
///
/// `fClassVersion` is a short from v10 and an int before.
pub const TBRANCH_ELEMENT_FIELDS: FieldTable = &[("fClassVersion:short", 10)];

/// Presence queries for one record at one version.
#[derive(Debug, Clone, Copy)]
pub struct Gates {
    table: FieldTable,
    version: u16,
}

impl Gates {
    /// Gates of `table` at `version`.
    pub fn new(table: FieldTable, version: u16) -> Self {
        Self { table, version }
    }

    /// Version these gates were built for.
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Whether `field` is streamed at this version.
    pub fn has(&self, field: &str) -> bool {
        match self.table.iter().find(|(name, _)| *name == field) {
            Some(&(_, since)) => self.version >= since,
            None => {
                debug_assert!(false, "{field} is not a gated member");
                false
            }
        }
    }

    /// Every gated member present at this version, in table order.
    pub fn present(&self) -> Vec<&'static str> {
        self.table.iter().filter(|(_, since)| self.version >= *since).map(|(n, _)| *n).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttree_matrix() {
        assert!(Gates::new(TTREE_FIELDS, 17).present().is_empty());
        assert_eq!(
            Gates::new(TTREE_FIELDS, 18).present(),
            vec!["fFlushedBytes", "fDefaultEntryOffsetLen", "fAutoFlush"]
        );
        let v19 = Gates::new(TTREE_FIELDS, 19);
        assert!(v19.has("fClusterSize"));
        assert!(!v19.has("fIOFeatures"));
        assert_eq!(Gates::new(TTREE_FIELDS, 20).present().len(), TTREE_FIELDS.len());
    }

    #[test]
    fn tbranch_matrix() {
        assert!(!Gates::new(TBRANCH_FIELDS, 10).has("fFirstEntry"));
        assert!(Gates::new(TBRANCH_FIELDS, 12).has("fFirstEntry"));
        assert!(!Gates::new(TBRANCH_FIELDS, 12).has("fIOFeatures"));
        assert!(Gates::new(TBRANCH_FIELDS, 13).has("fIOFeatures"));
    }

    #[test]
    fn tbranch_element_short_class_version() {
        assert!(!Gates::new(TBRANCH_ELEMENT_FIELDS, 9).has("fClassVersion:short"));
        assert!(Gates::new(TBRANCH_ELEMENT_FIELDS, 10).has("fClassVersion:short"));
    }

    #[test]
    fn version_ranges() {
        assert!(TTREE_VERSIONS.contains(&16) && !TTREE_VERSIONS.contains(&15));
        assert!(TBRANCH_VERSIONS.contains(&13) && !TBRANCH_VERSIONS.contains(&9));
        assert!(TBRANCH_ELEMENT_VERSIONS.contains(&8));
    }
}
