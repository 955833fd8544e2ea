//! Column-oriented data extraction from TTree branches.
//!
//! A read resolves the baskets covering the requested entries, fetches each
//! one through the key and basket caches, decodes it with the branch's
//! [`Interpretation`], and copies the pieces into one destination in basket
//! order. Finished arrays go into the array cache.

use std::ops::Range;
use std::sync::Arc;

use rayon::prelude::*;

use crate::array::Array;
use crate::basket::BasketHeader;
use crate::cache::Caches;
use crate::error::{Result, RootError};
use crate::file::FileContext;
use crate::interpretation::{interpret, Interpretation, STL_VECTOR_SKIP};
use crate::lazy::Lazy;
use crate::tree::{Branch, Tree};

/// Options of one read.
#[derive(Clone, Default)]
pub struct ReadOptions {
    /// Array, basket and key caches to consult and populate.
    pub caches: Caches,
    /// Worker pool for fetching and decoding baskets; sequential when `None`.
    pub pool: Option<Arc<rayon::ThreadPool>>,
}

impl std::fmt::Debug for ReadOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadOptions")
            .field("caches", &self.caches)
            .field("pool", &self.pool.as_ref().map(|p| p.current_num_threads()))
            .finish()
    }
}

/// A branch to read, optionally with an explicit interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRequest {
    /// Branch name, at any depth of the tree.
    pub name: String,
    /// Decoding plan; derived from the branch when `None`.
    pub interpretation: Option<Interpretation>,
}

impl BranchRequest {
    /// Read `name` as `interpretation`.
    pub fn with(name: impl Into<String>, interpretation: Interpretation) -> Self {
        Self { name: name.into(), interpretation: Some(interpretation) }
    }
}

impl From<&str> for BranchRequest {
    fn from(name: &str) -> Self {
        Self { name: name.to_string(), interpretation: None }
    }
}

/// Reader for extracting column data from a TTree branch.
#[derive(Debug, Clone)]
pub struct BranchReader {
    ctx: Arc<FileContext>,
    tree: Arc<Tree>,
    branch: Arc<Branch>,
    interpretation: Interpretation,
}

impl BranchReader {
    /// Reader for `name`, interpreted as given or derived from its metadata.
    pub fn new(
        ctx: Arc<FileContext>,
        tree: Arc<Tree>,
        name: &str,
        interpretation: Option<Interpretation>,
    ) -> Result<Self> {
        let branch = Arc::clone(tree.branch(name)?);
        branch.validate_basket_index()?;
        let interpretation = match interpretation {
            Some(i) => i,
            None => derive(&ctx, &branch)?,
        };
        log::debug!("branch '{name}' read as {interpretation}");
        Ok(Self { ctx, tree, branch, interpretation })
    }

    /// The branch being read.
    pub fn branch(&self) -> &Branch {
        &self.branch
    }

    /// The decoding plan.
    pub fn interpretation(&self) -> &Interpretation {
        &self.interpretation
    }

    /// Entries in the branch.
    pub fn numentries(&self) -> u64 {
        self.branch.numentries()
    }

    /// Materialize entries `[entries.start, entries.end)`.
    pub fn array(&self, entries: Range<u64>, options: &ReadOptions) -> Result<Arc<Array>> {
        let total = self.numentries();
        if entries.start > entries.end || entries.end > total {
            return Err(RootError::EntryRange { start: entries.start, stop: entries.end, entries: total });
        }

        self.branch.check_written(entries.start, entries.end)?;

        let cache_key = format!(
            "{}:{}:{}:{}:{}-{}",
            self.ctx.uuid(),
            self.storage_id(),
            self.branch.name,
            self.interpretation.identifier(),
            entries.start,
            entries.end
        );
        if let Some(cache) = &options.caches.arrays {
            if let Some(hit) = cache.get(&cache_key) {
                if self.interpretation.accepts(&hit) {
                    return Ok(hit);
                }
                log::debug!("array cache entry {cache_key} has another layout; recomputing");
            }
        }

        let array = Arc::new(self.read(entries, options)?);
        if let Some(cache) = &options.caches.arrays {
            cache.put(cache_key, Arc::clone(&array));
        }
        Ok(array)
    }

    /// Identifies where the branch's data lives in the file. Trees sharing a
    /// name (other directories, other cycles) never share basket seeks.
    fn storage_id(&self) -> String {
        match self.branch.basket_seek.first() {
            Some(seek) => format!("@{seek}"),
            None => format!("{}@-", self.tree.name),
        }
    }

    /// Materialize every entry.
    pub fn array_all(&self, options: &ReadOptions) -> Result<Arc<Array>> {
        self.array(0..self.numentries(), options)
    }

    /// View of the branch whose baskets are decoded on first access.
    pub fn lazy(&self, options: &ReadOptions) -> LazyArray {
        let reader = Arc::new(self.clone());
        let chunks = (0..self.branch.numbaskets())
            .map(|i| {
                let reader = Arc::clone(&reader);
                let options = options.clone();
                Lazy::new(move || {
                    let start = reader.branch.basket_entrystart(i)?;
                    let stop = reader.branch.basket_entrystop(i)?;
                    reader.decode_basket(i, &(start..stop), &options)
                })
            })
            .collect();
        LazyArray { reader, chunks }
    }

    fn read(&self, entries: Range<u64>, options: &ReadOptions) -> Result<Array> {
        let interp = &self.interpretation;
        let numentries = (entries.end - entries.start) as usize;
        if numentries == 0 {
            return interp.finalize(interp.destination(0, 0));
        }

        let baskets = self.branch.basket_range(entries.start, entries.end);
        let decode = |i: usize| self.decode_basket(i, &entries, options);
        let decoded: Vec<Result<Array>> = match &options.pool {
            Some(pool) => pool.install(|| baskets.clone().into_par_iter().map(decode).collect()),
            None => baskets.clone().map(decode).collect(),
        };
        let decoded = decoded.into_iter().collect::<Result<Vec<_>>>()?;

        let numitems = decoded.iter().map(|a| interp.source_numitems(a)).sum();
        let mut destination = interp.destination(numitems, numentries);
        let (mut item, mut entry) = (0, 0);
        for piece in decoded {
            let (items, rows) = (interp.source_numitems(&piece), piece.len());
            interp.fill(piece, &mut destination, item..item + items, entry..entry + rows)?;
            item += items;
            entry += rows;
        }
        if entry != numentries {
            return Err(RootError::format(format!(
                "branch '{}': baskets {baskets:?} hold {entry} of {numentries} requested entries",
                self.branch.name
            )));
        }
        interp.finalize(destination)
    }

    /// Decode the part of basket `i` that falls inside `entries`.
    fn decode_basket(&self, i: usize, entries: &Range<u64>, options: &ReadOptions) -> Result<Array> {
        let start = self.branch.basket_entrystart(i)?;
        let stop = self.branch.basket_entrystop(i)?;
        let (header, payload) = self.fetch(i, &options.caches)?;
        if header.numentries() as u64 != stop - start {
            log::warn!(
                "branch '{}' basket {i}: fNevBuf={} but the index says {}",
                self.branch.name,
                header.nev_buf,
                stop - start
            );
        }

        let (data, offsets) = header.split(&payload)?;
        let offsets = match offsets {
            Some(o) => Some(o),
            None => self.generated_offsets(start..stop, options)?,
        };
        let lstart = (entries.start.max(start) - start) as usize;
        let lstop = (entries.end.min(stop) - start) as usize;
        self.interpretation.fromroot(data, offsets.as_deref(), lstart, lstop)
    }

    /// Header and payload of basket `i`: key cache, then basket cache, then the source.
    fn fetch(&self, i: usize, caches: &Caches) -> Result<(BasketHeader, Arc<[u8]>)> {
        let seek = self.branch.basket_seek(i)?;
        let key = format!("{}:{seek}", self.ctx.uuid());
        let source = self.ctx.source();

        let header = match &caches.keys {
            Some(cache) => cache.get_or_insert_with(&key, &mut || BasketHeader::read_at(source, seek))?,
            None => BasketHeader::read_at(source, seek)?,
        };
        let payload = match &caches.baskets {
            Some(cache) => cache.get_or_insert_with(&key, &mut || header.read_payload(source))?,
            None => header.read_payload(source)?,
        };
        Ok((header, payload))
    }

    /// Entry offsets for a jagged basket written without them, rebuilt from the counter branch.
    fn generated_offsets(&self, entries: Range<u64>, options: &ReadOptions) -> Result<Option<Vec<i32>>> {
        let Interpretation::Jagged { skip_bytes, .. } = &self.interpretation else {
            return Ok(None);
        };
        if *skip_bytes == STL_VECTOR_SKIP {
            return Ok(None);
        }
        let Some(counter) = self.counter_branch() else {
            return Ok(None);
        };

        let reader = BranchReader::new(Arc::clone(&self.ctx), Arc::clone(&self.tree), &counter.name, None)?;
        let counts = reader.array(entries, options)?;
        let counts: Vec<i64> = match counts.as_numeric() {
            Some(a) => a.to_f64_vec().into_iter().map(|x| x as i64).collect(),
            None => {
                return Err(RootError::format(format!(
                    "counter branch '{}' of '{}' is not numeric",
                    counter.name, self.branch.name
                )))
            }
        };
        log::debug!("branch '{}': offsets rebuilt from '{}'", self.branch.name, counter.name);
        Ok(self.interpretation.offsets_from_counts(&counts))
    }

    fn counter_branch(&self) -> Option<&Arc<Branch>> {
        if let Some(found) = self.branch.counter_leaf().and_then(|leaf| self.tree.branch_of_leaf(leaf)) {
            return Some(found);
        }
        let name = self.branch.element.as_ref()?.count_branch.as_deref()?;
        self.tree.find_branch(name)
    }
}

fn derive(ctx: &FileContext, branch: &Branch) -> Result<Interpretation> {
    let needs_infos = branch.element.as_ref().map_or(false, |e| e.id >= 0);
    let infos = if needs_infos {
        match ctx.streamer_infos() {
            Ok(infos) => Some(infos),
            Err(e) => {
                log::warn!("streamer infos unavailable for branch '{}': {e}", branch.name);
                None
            }
        }
    } else {
        None
    };
    interpret(branch, infos.as_deref()).ok_or_else(|| RootError::Uninterpretable(branch.name.clone()))
}

/// A branch read one basket at a time, on demand.
#[derive(Debug)]
pub struct LazyArray {
    reader: Arc<BranchReader>,
    chunks: Vec<Lazy<Array>>,
}

impl LazyArray {
    /// Entries in the branch.
    pub fn len(&self) -> u64 {
        self.reader.numentries()
    }

    /// Whether the branch has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of baskets.
    pub fn numbaskets(&self) -> usize {
        self.chunks.len()
    }

    /// Baskets decoded so far.
    pub fn loaded(&self) -> usize {
        self.chunks.iter().filter(|c| c.is_evaluated()).count()
    }

    /// The decoded basket `i`.
    pub fn basket(&self, i: usize) -> Result<Arc<Array>> {
        let chunk = self.chunks.get(i).ok_or_else(|| {
            RootError::format(format!("basket {i} of {}", self.chunks.len()))
        })?;
        chunk.get()
    }

    /// Entries `[entries.start, entries.end)`, decoding only the baskets they touch.
    pub fn range(&self, entries: Range<u64>) -> Result<Array> {
        let total = self.len();
        if entries.start > entries.end || entries.end > total {
            return Err(RootError::EntryRange { start: entries.start, stop: entries.end, entries: total });
        }
        let branch = &self.reader.branch;
        branch.check_written(entries.start, entries.end)?;
        let mut parts = Vec::new();
        for i in branch.basket_range(entries.start, entries.end) {
            let start = branch.basket_entrystart(i)?;
            let stop = branch.basket_entrystop(i)?;
            let chunk = self.basket(i)?;
            let lstart = (entries.start.max(start) - start) as usize;
            let lstop = (entries.end.min(stop) - start) as usize;
            parts.push(chunk.slice(lstart..lstop));
        }
        if parts.is_empty() {
            let interp = &self.reader.interpretation;
            return interp.finalize(interp.destination(0, 0));
        }
        Array::concat(&parts)
    }

    /// Entry `i` as a one-entry array.
    pub fn get(&self, i: u64) -> Result<Array> {
        self.range(i..i + 1)
    }
}

fn resolve(ctx: &Arc<FileContext>, tree: &Arc<Tree>, requests: &[BranchRequest]) -> Vec<Result<BranchReader>> {
    requests
        .iter()
        .enumerate()
        .map(|(n, request)| {
            let conflict = requests[..n].iter().find(|earlier| {
                earlier.name == request.name
                    && matches!((&earlier.interpretation, &request.interpretation),
                        (Some(a), Some(b)) if !a.compatible(b))
            });
            if let Some(earlier) = conflict {
                return Err(RootError::IncompatibleInterpretation(format!(
                    "branch '{}' requested as both {} and {}",
                    request.name,
                    earlier.interpretation.as_ref().map(|i| i.to_string()).unwrap_or_default(),
                    request.interpretation.as_ref().map(|i| i.to_string()).unwrap_or_default(),
                )));
            }
            BranchReader::new(Arc::clone(ctx), Arc::clone(tree), &request.name, request.interpretation.clone())
        })
        .collect()
}

/// Resolve every request, then read them in order; the first failure aborts.
pub(crate) fn read_arrays(
    ctx: &Arc<FileContext>,
    tree: &Arc<Tree>,
    requests: &[BranchRequest],
    entries: Range<u64>,
    options: &ReadOptions,
) -> Result<Vec<(String, Arc<Array>)>> {
    let readers = resolve(ctx, tree, requests).into_iter().collect::<Result<Vec<_>>>()?;
    readers
        .iter()
        .map(|r| Ok((r.branch.name.clone(), r.array(entries.clone(), options)?)))
        .collect()
}

/// Read every request independently.
pub(crate) fn try_read_arrays(
    ctx: &Arc<FileContext>,
    tree: &Arc<Tree>,
    requests: &[BranchRequest],
    entries: Range<u64>,
    options: &ReadOptions,
) -> Vec<(String, Result<Arc<Array>>)> {
    requests
        .iter()
        .zip(resolve(ctx, tree, requests))
        .map(|(request, reader)| {
            let result = reader.and_then(|r| r.array(entries.clone(), options));
            if let Err(e) = &result {
                log::debug!("branch '{}' failed: {e}", request.name);
            }
            (request.name.clone(), result)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basket::testutil::basket_bytes;
    use crate::cache::CacheConfig;
    use crate::file::FileHeader;
    use crate::interpretation::{Dtype, NumericArray};
    use crate::registry::ClassRegistry;
    use crate::source::MemorySource;
    use crate::tree::testutil::{branch, leaf, tree};
    use crate::tree::LeafKind;

    fn context(bytes: Vec<u8>) -> Arc<FileContext> {
        let header = FileHeader {
            version: 62206,
            begin: 100,
            end: bytes.len() as u64,
            seek_free: 0,
            nbytes_free: 0,
            nfree: 0,
            nbytes_name: 0,
            units: 4,
            fcompress: 0,
            seek_info: 0,
            nbytes_info: 0,
            uuid_version: 1,
            uuid: [7; 16],
        };
        Arc::new(FileContext::new(
            Arc::new(MemorySource::from(bytes)),
            header,
            Arc::new(ClassRegistry::builtin()),
        ))
    }

    fn push_basket(file: &mut Vec<u8>, data: &[u8], n: i32, offsets: Option<&[i32]>) -> i64 {
        let seek = file.len();
        file.extend(basket_bytes(seek as u32, data, n, offsets));
        seek as i64
    }

    fn i32_bytes(values: &[i32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    /// `n/I` over two baskets [0, 4) and [4, 10), values `10 * entry`;
    /// `x[n]/F` holding `n` copies of the entry number, written without offsets.
    fn fixture() -> (Arc<FileContext>, Arc<Tree>) {
        let counts = [0, 1, 2, 3, 0, 1, 2, 3, 0, 1];
        let mut file = vec![0u8; 16];

        let n_seeks = vec![
            push_basket(&mut file, &i32_bytes(&counts[..4]), 4, None),
            push_basket(&mut file, &i32_bytes(&counts[4..]), 6, None),
        ];
        let mut x_data = [Vec::new(), Vec::new()];
        for (entry, &c) in counts.iter().enumerate() {
            for _ in 0..c {
                x_data[usize::from(entry >= 4)].extend((entry as f32).to_be_bytes());
            }
        }
        let x_seeks = vec![
            push_basket(&mut file, &x_data[0], 4, None),
            push_basket(&mut file, &x_data[1], 6, None),
        ];
        let v: Vec<i32> = (0..10).map(|e| e * 10).collect();
        let v_seeks = vec![
            push_basket(&mut file, &i32_bytes(&v[..4]), 4, None),
            push_basket(&mut file, &i32_bytes(&v[4..]), 6, None),
        ];

        let n_leaf = leaf("n", "n/I", LeafKind::I32, 1, None);
        let mut n = branch("n", &[0, 4], 10);
        n.leaves = vec![Arc::clone(&n_leaf)];
        n.basket_seek = n_seeks;
        let mut x = branch("x", &[0, 4], 10);
        x.leaves = vec![leaf("x", "x[n]/F", LeafKind::F32, 1, Some(n_leaf))];
        x.basket_seek = x_seeks;
        let mut val = branch("v", &[0, 4], 10);
        val.leaves = vec![leaf("v", "v/I", LeafKind::I32, 1, None)];
        val.basket_seek = v_seeks;

        let t = tree("t", 10, vec![Arc::new(n), Arc::new(x), Arc::new(val)]);
        (context(file), Arc::new(t))
    }

    fn ints(array: &Array) -> Vec<i32> {
        array.as_numeric().and_then(NumericArray::as_i32).unwrap().to_vec()
    }

    #[test]
    fn primitive_range_is_clipped_across_baskets() {
        let (ctx, t) = fixture();
        let r = BranchReader::new(ctx, t, "v", None).unwrap();
        assert_eq!(r.interpretation(), &Interpretation::Primitive(Dtype::I32));
        let opts = ReadOptions::default();
        assert_eq!(ints(&r.array(2..7, &opts).unwrap()), vec![20, 30, 40, 50, 60]);
        assert_eq!(ints(&r.array(3..5, &opts).unwrap()), vec![30, 40]);
        assert_eq!(ints(&r.array_all(&opts).unwrap()).len(), 10);
    }

    #[test]
    fn empty_and_invalid_ranges() {
        let (ctx, t) = fixture();
        let r = BranchReader::new(ctx, t, "v", None).unwrap();
        let opts = ReadOptions::default();
        let empty = r.array(5..5, &opts).unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.dtype(), Some(Dtype::I32));
        assert!(matches!(r.array(4..11, &opts), Err(RootError::EntryRange { .. })));
        assert!(matches!(r.array(6..5, &opts), Err(RootError::EntryRange { .. })));
    }

    #[test]
    fn jagged_offsets_come_from_the_counter_branch() {
        let (ctx, t) = fixture();
        let r = BranchReader::new(ctx, t, "x", None).unwrap();
        let array = r.array(2..9, &ReadOptions::default()).unwrap();
        let jagged = array.as_jagged().unwrap();
        assert_eq!(jagged.counts(), vec![2, 3, 0, 1, 2, 3, 0]);
        let row = jagged.row(1).unwrap();
        let values = row.as_numeric().and_then(NumericArray::as_f32).unwrap().to_vec();
        assert_eq!(values, vec![3.0, 3.0, 3.0]);
    }

    #[test]
    fn cached_reads_match_uncached_and_are_reused() {
        let (ctx, t) = fixture();
        let r = BranchReader::new(ctx, t, "x", None).unwrap();
        let plain = r.array(1..10, &ReadOptions::default()).unwrap();
        let cached = ReadOptions { caches: Caches::lru(CacheConfig::default()), pool: None };
        let first = r.array(1..10, &cached).unwrap();
        let second = r.array(1..10, &cached).unwrap();
        assert_eq!(*first, *plain);
        assert!(Arc::ptr_eq(&first, &second));

        let baskets_only = ReadOptions {
            caches: Caches { arrays: None, ..Caches::lru(CacheConfig::default()) },
            pool: None,
        };
        assert_eq!(*r.array(1..10, &baskets_only).unwrap(), *plain);
        assert_eq!(*r.array(1..10, &baskets_only).unwrap(), *plain);
    }

    #[test]
    fn pool_matches_sequential() {
        let (ctx, t) = fixture();
        let r = BranchReader::new(ctx, t, "v", None).unwrap();
        let pool = Arc::new(rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap());
        let par = r.array(0..10, &ReadOptions { caches: Caches::none(), pool: Some(pool) }).unwrap();
        assert_eq!(*par, *r.array(0..10, &ReadOptions::default()).unwrap());
    }

    #[test]
    fn lazy_array_loads_touched_baskets_only() {
        let (ctx, t) = fixture();
        let lazy = BranchReader::new(ctx, t, "v", None).unwrap().lazy(&ReadOptions::default());
        assert_eq!(lazy.numbaskets(), 2);
        assert_eq!(ints(&lazy.range(1..3).unwrap()), vec![10, 20]);
        assert_eq!(lazy.loaded(), 1);
        assert_eq!(ints(&lazy.get(9).unwrap()), vec![90]);
        assert_eq!(lazy.loaded(), 2);
        assert!(lazy.range(0..0).unwrap().is_empty());
    }

    #[test]
    fn requests_resolve_before_reading() {
        let (ctx, t) = fixture();
        let opts = ReadOptions::default();
        let missing = read_arrays(&ctx, &t, &["v".into(), "nope".into()], 0..10, &opts);
        assert!(matches!(missing, Err(RootError::BranchNotFound(_))));

        let conflicting = [
            BranchRequest::with("v", Interpretation::Primitive(Dtype::I32)),
            BranchRequest::with("v", Interpretation::Primitive(Dtype::F32)),
        ];
        let err = read_arrays(&ctx, &t, &conflicting, 0..10, &opts).unwrap_err();
        assert!(matches!(err, RootError::IncompatibleInterpretation(_)));

        let results = try_read_arrays(&ctx, &t, &["nope".into(), "v".into()], 0..2, &opts);
        assert!(results[0].1.is_err());
        assert_eq!(ints(results[1].1.as_ref().unwrap()), vec![0, 10]);
    }
}
