//! Public types for TTree metadata: trees, branches, leaves and basket indices.

use std::ops::Range;
use std::sync::Arc;

use crate::compression::Compression;
use crate::error::{Result, RootError};
use crate::interpretation::Dtype;
use crate::objects::Object;

/// Leaf class, as it matters for decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    /// `TLeafO`.
    Bool,
    /// `TLeafB`.
    I8,
    /// `TLeafS`.
    I16,
    /// `TLeafI`.
    I32,
    /// `TLeafL`.
    I64,
    /// `TLeafF`.
    F32,
    /// `TLeafD`.
    F64,
    /// `TLeafC`: a string per entry.
    Char,
    /// `TLeafElement`: typed by a streamer element.
    Element {
        /// `fID`: index into the parent class's streamer elements.
        id: i32,
        /// `fType`: streamer type code.
        type_code: i32,
    },
    /// Plain `TLeaf` or an unknown subclass.
    Plain,
}

/// A `TLeaf` descriptor.
#[derive(Debug, Clone)]
pub struct Leaf {
    /// Class name as streamed.
    pub class: String,
    /// `fName`.
    pub name: String,
    /// `fTitle`, e.g. `x[n][3]/F`.
    pub title: String,
    /// `fLen`: fixed number of values per entry (product of the static dims).
    pub len: i32,
    /// `fLenType`: bytes per value.
    pub len_type: i32,
    /// `fOffset`.
    pub offset: i32,
    /// `fIsRange`.
    pub is_range: bool,
    /// `fIsUnsigned`.
    pub is_unsigned: bool,
    /// `fLeafCount`: the counter leaf of a variable-length leaf.
    pub leaf_count: Option<Arc<Leaf>>,
    /// Decoding-relevant class.
    pub kind: LeafKind,
    /// `fMinimum`.
    pub minimum: f64,
    /// `fMaximum`.
    pub maximum: f64,
}

impl Leaf {
    /// Element type, if the leaf holds fixed-width values.
    pub fn dtype(&self) -> Option<Dtype> {
        let signed = |s: Dtype, u: Dtype| if self.is_unsigned { u } else { s };
        match self.kind {
            LeafKind::Bool => Some(Dtype::Bool),
            LeafKind::I8 => Some(signed(Dtype::I8, Dtype::U8)),
            LeafKind::I16 => Some(signed(Dtype::I16, Dtype::U16)),
            LeafKind::I32 => Some(signed(Dtype::I32, Dtype::U32)),
            LeafKind::I64 => Some(signed(Dtype::I64, Dtype::U64)),
            LeafKind::F32 => Some(Dtype::F32),
            LeafKind::F64 => Some(Dtype::F64),
            LeafKind::Element { type_code, .. } => Dtype::from_type_code(type_code),
            LeafKind::Char | LeafKind::Plain => None,
        }
    }

    /// Static dimensions declared in the title, e.g. `[3]` for `x[n][3]/F`.
    ///
    /// A dimension naming the counter leaf is not included.
    pub fn fixed_dims(&self) -> Vec<usize> {
        let spec = self.title.split('/').next().unwrap_or("");
        let mut dims = Vec::new();
        let mut rest = spec;
        while let Some(open) = rest.find('[') {
            let Some(close) = rest[open..].find(']') else { break };
            if let Ok(n) = rest[open + 1..open + close].trim().parse::<usize>() {
                dims.push(n);
            }
            rest = &rest[open + close + 1..];
        }
        dims
    }
}

/// Extra metadata carried by `TBranchElement` / `TBranchObject`.
#[derive(Debug, Clone, Default)]
pub struct BranchElement {
    /// `fClassName`.
    pub class_name: String,
    /// `fParentName`.
    pub parent_name: String,
    /// `fClonesName`.
    pub clones_name: String,
    /// `fCheckSum`.
    pub checksum: u32,
    /// `fClassVersion`.
    pub class_version: i32,
    /// `fID`: index of this member in the parent's streamer info, `-1` for the whole object.
    pub id: i32,
    /// `fType`.
    pub type_code: i32,
    /// `fStreamerType`.
    pub streamer_type: i32,
    /// `fMaximum`.
    pub maximum: i32,
    /// `fBranchCount`, when it resolved to an already decoded branch.
    pub count_branch: Option<String>,
    /// `fBranchCount2`.
    pub count_branch2: Option<String>,
}

/// A `TBranch`, `TBranchElement` or `TBranchObject`.
#[derive(Debug, Clone)]
pub struct Branch {
    /// Class name as streamed.
    pub class: String,
    /// `fName`.
    pub name: String,
    /// `fTitle`.
    pub title: String,
    /// `fCompress`.
    pub fcompress: i32,
    /// `fBasketSize`.
    pub basket_size: i32,
    /// `fEntryOffsetLen`: non-zero when baskets carry an entry-offset trailer.
    pub entry_offset_len: i32,
    /// `fWriteBasket`: number of baskets written.
    pub write_basket: i32,
    /// `fEntryNumber`.
    pub entry_number: i64,
    /// `fIOFeatures` (v13+).
    pub io_features: Option<u8>,
    /// `fOffset`.
    pub offset: i32,
    /// `fMaxBaskets`: allocated size of the basket arrays.
    pub max_baskets: i32,
    /// `fSplitLevel`.
    pub split_level: i32,
    /// `fEntries`.
    pub entries: u64,
    /// `fFirstEntry` (v11+).
    pub first_entry: i64,
    /// `fTotBytes`.
    pub tot_bytes: i64,
    /// `fZipBytes`.
    pub zip_bytes: i64,
    /// Sub-branches.
    pub branches: Vec<Arc<Branch>>,
    /// Leaves.
    pub leaves: Vec<Arc<Leaf>>,
    /// `fBasketBytes`, truncated to `fWriteBasket`.
    pub basket_bytes: Vec<i32>,
    /// `fBasketEntry`, truncated to `fWriteBasket`.
    pub basket_entry: Vec<i64>,
    /// `fBasketSeek`, truncated to `fWriteBasket`.
    pub basket_seek: Vec<i64>,
    /// `fFileName`.
    pub file_name: String,
    /// First entry of a basket that was never written as its own key
    /// (`fBasketEntry[fWriteBasket] < fEntries`).
    pub unwritten_from: Option<u64>,
    /// `TBranchElement` / `TBranchObject` metadata.
    pub element: Option<BranchElement>,
}

impl Branch {
    /// Number of entries.
    pub fn numentries(&self) -> u64 {
        self.entries
    }

    /// Number of baskets written to disk.
    pub fn numbaskets(&self) -> usize {
        self.basket_seek.len()
    }

    /// Compression setting recorded for this branch.
    pub fn compression(&self) -> Compression {
        Compression::from_fcompress(self.fcompress)
    }

    fn check_basket(&self, i: usize) -> Result<()> {
        if i >= self.numbaskets() {
            return Err(RootError::format(format!(
                "branch '{}' has {} baskets, no basket {i}",
                self.name,
                self.numbaskets()
            )));
        }
        Ok(())
    }

    /// First entry of basket `i`.
    pub fn basket_entrystart(&self, i: usize) -> Result<u64> {
        self.check_basket(i)?;
        Ok(self.basket_entry[i].max(0) as u64)
    }

    /// One past the last entry of basket `i`.
    pub fn basket_entrystop(&self, i: usize) -> Result<u64> {
        self.check_basket(i)?;
        Ok(match self.basket_entry.get(i + 1) {
            Some(&next) => next.max(0) as u64,
            None => self.written_entries(),
        })
    }

    /// Entries held by baskets written to disk.
    pub fn written_entries(&self) -> u64 {
        self.unwritten_from.unwrap_or(self.entries)
    }

    /// Fail when `[entrystart, entrystop)` reaches into a basket that was
    /// never written to disk.
    pub fn check_written(&self, entrystart: u64, entrystop: u64) -> Result<()> {
        match self.unwritten_from {
            Some(from) if entrystop > from && entrystop > entrystart => Err(RootError::format(format!(
                "branch '{}': entries {from}..{} are in a basket not written to disk",
                self.name, self.entries
            ))),
            _ => Ok(()),
        }
    }

    /// Entries in basket `i`.
    pub fn basket_numentries(&self, i: usize) -> Result<u64> {
        Ok(self.basket_entrystop(i)? - self.basket_entrystart(i)?)
    }

    /// Compressed bytes of basket `i`, key included.
    pub fn basket_compressedbytes(&self, i: usize) -> Result<u64> {
        self.check_basket(i)?;
        Ok(self.basket_bytes[i].max(0) as u64)
    }

    /// File offset of basket `i`'s key.
    pub fn basket_seek(&self, i: usize) -> Result<u64> {
        self.check_basket(i)?;
        Ok(self.basket_seek[i].max(0) as u64)
    }

    /// Baskets covering `[entrystart, entrystop)`; empty for an empty range.
    pub fn basket_range(&self, entrystart: u64, entrystop: u64) -> Range<usize> {
        if entrystart >= entrystop || self.numbaskets() == 0 {
            return 0..0;
        }
        let starts = &self.basket_entry;
        let first = starts.partition_point(|&s| (s as u64) <= entrystart).saturating_sub(1);
        let last = starts.partition_point(|&s| (s as u64) < entrystop);
        first..last.max(first)
    }

    /// Verify the basket index: entry starts strictly increase from zero and
    /// the last basket ends at `numentries`.
    pub fn validate_basket_index(&self) -> Result<()> {
        let n = self.numbaskets();
        if self.basket_entry.len() != n || self.basket_bytes.len() != n {
            return Err(RootError::format(format!(
                "branch '{}': basket index arrays differ in length",
                self.name
            )));
        }
        if n == 0 {
            return Ok(());
        }
        if self.basket_entry[0] != 0 {
            return Err(RootError::format(format!(
                "branch '{}': first basket starts at entry {}",
                self.name, self.basket_entry[0]
            )));
        }
        if self.basket_entry.windows(2).any(|w| w[1] <= w[0]) {
            return Err(RootError::format(format!(
                "branch '{}': basket entry starts are not strictly increasing",
                self.name
            )));
        }
        if (self.basket_entry[n - 1] as u64) >= self.written_entries() && self.entries > 0 {
            return Err(RootError::format(format!(
                "branch '{}': last basket starts at {} of {} entries",
                self.name,
                self.basket_entry[n - 1],
                self.entries
            )));
        }
        Ok(())
    }

    /// Counter leaf of this branch's first leaf, if it is variable-length.
    pub fn counter_leaf(&self) -> Option<&Arc<Leaf>> {
        self.leaves.first().and_then(|l| l.leaf_count.as_ref())
    }

    /// Depth-first iterator over this branch's descendants.
    pub fn descendants(&self) -> Vec<&Arc<Branch>> {
        let mut out = Vec::new();
        for b in &self.branches {
            out.push(b);
            out.extend(b.descendants());
        }
        out
    }
}

/// A parsed `TTree`.
#[derive(Debug, Clone)]
pub struct Tree {
    /// Class version of the streamed tree.
    pub version: u16,
    /// `fName`.
    pub name: String,
    /// `fTitle`.
    pub title: String,
    /// `fEntries`.
    pub entries: u64,
    /// `fTotBytes`.
    pub tot_bytes: i64,
    /// `fZipBytes`.
    pub zip_bytes: i64,
    /// `fSavedBytes`.
    pub saved_bytes: i64,
    /// `fFlushedBytes` (v18+).
    pub flushed_bytes: Option<i64>,
    /// `fWeight`.
    pub weight: f64,
    /// `fTimerInterval`.
    pub timer_interval: i32,
    /// `fScanField`.
    pub scan_field: i32,
    /// `fUpdate`.
    pub update: i32,
    /// `fDefaultEntryOffsetLen` (v18+).
    pub default_entry_offset_len: Option<i32>,
    /// `fMaxEntries`.
    pub max_entries: i64,
    /// `fMaxEntryLoop`.
    pub max_entry_loop: i64,
    /// `fMaxVirtualSize`.
    pub max_virtual_size: i64,
    /// `fAutoSave`.
    pub auto_save: i64,
    /// `fAutoFlush` (v18+).
    pub auto_flush: Option<i64>,
    /// `fEstimate`.
    pub estimate: i64,
    /// `fClusterRangeEnd` (v19+).
    pub cluster_range_end: Vec<i64>,
    /// `fClusterSize` (v19+).
    pub cluster_size: Vec<i64>,
    /// `fIOFeatures` (v20+).
    pub io_features: Option<u8>,
    /// Top-level branches.
    pub branches: Vec<Arc<Branch>>,
    /// All leaves.
    pub leaves: Vec<Arc<Leaf>>,
    /// `fAliases`.
    pub aliases: Option<Arc<Object>>,
    /// `fIndexValues`.
    pub index_values: Vec<f64>,
    /// `fIndex`.
    pub index: Vec<i32>,
    /// `fFriends`.
    pub friends: Option<Arc<Object>>,
    /// `fUserInfo`.
    pub user_info: Option<Arc<Object>>,
}

impl Tree {
    /// Number of entries.
    pub fn numentries(&self) -> u64 {
        self.entries
    }

    /// Every branch, depth-first.
    pub fn all_branches(&self) -> Vec<&Arc<Branch>> {
        let mut out = Vec::new();
        for b in &self.branches {
            out.push(b);
            out.extend(b.descendants());
        }
        out
    }

    /// Names of every branch, depth-first.
    pub fn branch_names(&self) -> Vec<&str> {
        self.all_branches().into_iter().map(|b| b.name.as_str()).collect()
    }

    /// Find a branch by name at any depth.
    pub fn find_branch(&self, name: &str) -> Option<&Arc<Branch>> {
        self.all_branches().into_iter().find(|b| b.name == name)
    }

    /// Find a branch or fail with [`RootError::BranchNotFound`].
    pub fn branch(&self, name: &str) -> Result<&Arc<Branch>> {
        self.find_branch(name).ok_or_else(|| RootError::BranchNotFound(name.to_string()))
    }

    /// Branch holding the counter leaf `leaf`.
    pub fn branch_of_leaf(&self, leaf: &Leaf) -> Option<&Arc<Branch>> {
        self.all_branches()
            .into_iter()
            .find(|b| b.leaves.iter().any(|l| l.name == leaf.name))
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// Branch with the given basket entry starts and no leaves.
    pub fn branch(name: &str, starts: &[i64], entries: u64) -> Branch {
        Branch {
            class: "TBranch".into(),
            name: name.into(),
            title: name.into(),
            fcompress: 0,
            basket_size: 32000,
            entry_offset_len: 0,
            write_basket: starts.len() as i32,
            entry_number: entries as i64,
            io_features: None,
            offset: 0,
            max_baskets: starts.len() as i32 + 1,
            split_level: 0,
            entries,
            first_entry: 0,
            tot_bytes: 0,
            zip_bytes: 0,
            branches: Vec::new(),
            leaves: Vec::new(),
            basket_bytes: vec![100; starts.len()],
            basket_entry: starts.to_vec(),
            basket_seek: (0..starts.len() as i64).map(|i| 1000 + 100 * i).collect(),
            file_name: String::new(),
            unwritten_from: None,
            element: None,
        }
    }

    /// Tree over `branches`; leaves are collected from them.
    pub fn tree(name: &str, entries: u64, branches: Vec<Arc<Branch>>) -> Tree {
        let leaves = branches.iter().flat_map(|b| b.leaves.iter().cloned()).collect();
        Tree {
            version: 20,
            name: name.into(),
            title: String::new(),
            entries,
            tot_bytes: 0,
            zip_bytes: 0,
            saved_bytes: 0,
            flushed_bytes: None,
            weight: 1.0,
            timer_interval: 0,
            scan_field: 25,
            update: 0,
            default_entry_offset_len: None,
            max_entries: 0,
            max_entry_loop: 0,
            max_virtual_size: 0,
            auto_save: 0,
            auto_flush: None,
            estimate: 0,
            cluster_range_end: Vec::new(),
            cluster_size: Vec::new(),
            io_features: None,
            branches,
            leaves,
            aliases: None,
            index_values: Vec::new(),
            index: Vec::new(),
            friends: None,
            user_info: None,
        }
    }

    /// Leaf of `kind` with `len` values per entry.
    pub fn leaf(name: &str, title: &str, kind: LeafKind, len: i32, count: Option<Arc<Leaf>>) -> Arc<Leaf> {
        Arc::new(Leaf {
            class: "TLeaf".into(),
            name: name.into(),
            title: title.into(),
            len,
            len_type: 0,
            offset: 0,
            is_range: false,
            is_unsigned: false,
            leaf_count: count,
            kind,
            minimum: 0.0,
            maximum: 0.0,
        })
    }
}
