//! Decoding plans that map basket bytes to typed arrays.
//!
//! [`interpret`] picks an [`Interpretation`] once per branch from its leaves
//! and streamer metadata. The read pipeline then drives it per basket:
//!
//! 1. [`Interpretation::fromroot`] decodes the entries of one basket,
//! 2. [`Interpretation::destination`] allocates for the total item count,
//! 3. [`Interpretation::fill`] copies each basket's result in basket order,
//! 4. [`Interpretation::finalize`] turns per-entry counts into global offsets.

mod numeric;
mod objects;
mod strings;

pub use numeric::{Dtype, NumericArray};
pub use objects::ObjectLayout;
pub use strings::StringLayout;

use std::fmt;
use std::ops::Range;

use crate::array::{Array, JaggedArray, Value};
use crate::cursor::Cursor;
use crate::error::{Result, RootError};
use crate::objects::StreamerInfos;
use crate::streamer::{StlType, StreamerKind};
use crate::tree::{Branch, LeafKind};

/// Bytes before the items of an entry of a top-level `std::vector`:
/// byte count (4), version (2) and size (4).
pub const STL_VECTOR_SKIP: usize = 10;

/// A decoding plan for one branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Interpretation {
    /// One fixed-width value per entry.
    Primitive(Dtype),
    /// A fixed-shape block of values per entry.
    FixedArray {
        /// Element type.
        dtype: Dtype,
        /// Shape of one entry.
        dims: Vec<usize>,
    },
    /// A variable number of `inner` items per entry.
    Jagged {
        /// Item layout; `Primitive` or `FixedArray`.
        inner: Box<Interpretation>,
        /// Bytes to skip at the start of each entry.
        skip_bytes: usize,
    },
    /// One string per entry.
    Strings(StringLayout),
    /// One generically decoded STL value per entry.
    ObjectArray(ObjectLayout),
    /// A leaflist: one record of named scalars per entry.
    Table(Vec<(String, Dtype)>),
}

/// Buffer an interpretation fills basket by basket.
#[derive(Debug)]
pub enum Destination {
    /// Preallocated values.
    Numeric(NumericArray),
    /// Preallocated values of fixed-shape entries.
    Fixed {
        /// Flat values.
        data: NumericArray,
        /// Shape of one entry.
        dims: Vec<usize>,
    },
    /// Per-basket contents and per-entry counts, joined by `finalize`.
    Jagged {
        /// Content of each filled basket, in basket order.
        content: Vec<Array>,
        /// Item count of every entry so far.
        counts: Vec<i64>,
    },
    /// Preallocated strings.
    Strings(Vec<String>),
    /// Preallocated objects.
    Objects(Vec<Value>),
    /// Preallocated fields.
    Table(Vec<(String, NumericArray)>),
}

impl Interpretation {
    /// Bytes per item.
    fn item_bytes(&self) -> usize {
        match self {
            Interpretation::Primitive(d) => d.itemsize(),
            Interpretation::FixedArray { dtype, dims } => dtype.itemsize() * dims.iter().product::<usize>(),
            Interpretation::Jagged { inner, .. } => inner.item_bytes(),
            Interpretation::Table(fields) => fields.iter().map(|(_, d)| d.itemsize()).sum(),
            Interpretation::Strings(_) | Interpretation::ObjectArray(_) => 1,
        }
    }

    /// Estimated number of items in `numbytes` of basket data holding `numentries` entries.
    ///
    /// Items are values for numeric layouts and entries for everything else.
    pub fn numitems(&self, numbytes: usize, numentries: usize) -> usize {
        match self {
            Interpretation::Primitive(d) => numbytes / d.itemsize(),
            Interpretation::FixedArray { dtype, .. } => numbytes / dtype.itemsize(),
            Interpretation::Jagged { inner, skip_bytes } => {
                let payload = numbytes.saturating_sub(skip_bytes * numentries);
                match inner.as_ref() {
                    Interpretation::FixedArray { dtype, .. } | Interpretation::Primitive(dtype) => {
                        payload / dtype.itemsize()
                    }
                    other => other.numitems(payload, numentries),
                }
            }
            Interpretation::Strings(_) | Interpretation::ObjectArray(_) | Interpretation::Table(_) => numentries,
        }
    }

    /// Items held by a decoded basket, in the same unit as [`Interpretation::numitems`].
    pub fn source_numitems(&self, source: &Array) -> usize {
        match source {
            Array::Numeric(a) | Array::Fixed { data: a, .. } => a.len(),
            Array::Jagged(j) => match j.content.as_ref() {
                Array::Numeric(a) | Array::Fixed { data: a, .. } => a.len(),
                other => other.len(),
            },
            other => other.len(),
        }
    }

    /// Decode entries `lstart..lstop` of one basket.
    ///
    /// `data` is the basket payload before the offsets trailer. `byteoffsets`
    /// holds `numentries + 1` entry boundaries into `data`, when known.
    pub fn fromroot(
        &self,
        data: &[u8],
        byteoffsets: Option<&[i32]>,
        lstart: usize,
        lstop: usize,
    ) -> Result<Array> {
        if lstart > lstop {
            return Err(RootError::format(format!("basket entry range {lstart}..{lstop}")));
        }
        match self {
            Interpretation::Primitive(dtype) => {
                let bytes = fixed_entries(data, dtype.itemsize(), lstart, lstop)?;
                Ok(Array::Numeric(NumericArray::from_be_bytes(*dtype, bytes)?))
            }
            Interpretation::FixedArray { dtype, dims } => {
                let bytes = fixed_entries(data, self.item_bytes(), lstart, lstop)?;
                Ok(Array::Fixed { data: NumericArray::from_be_bytes(*dtype, bytes)?, dims: dims.clone() })
            }
            Interpretation::Jagged { inner, skip_bytes } => {
                self.jagged_fromroot(inner, *skip_bytes, data, byteoffsets, lstart, lstop)
            }
            Interpretation::Strings(layout) => {
                let strings = per_entry(
                    data,
                    byteoffsets,
                    lstart,
                    lstop,
                    |bytes| layout.decode_entry(bytes),
                    |c| layout.read_next(c),
                )?;
                Ok(Array::Strings(strings))
            }
            Interpretation::ObjectArray(layout) => {
                let values = per_entry(
                    data,
                    byteoffsets,
                    lstart,
                    lstop,
                    |bytes| layout.decode_entry(bytes),
                    |c| layout.read_next(c),
                )?;
                Ok(Array::Objects(values))
            }
            Interpretation::Table(fields) => {
                let width = self.item_bytes();
                let bytes = fixed_entries(data, width, lstart, lstop)?;
                let n = lstop - lstart;
                let mut out = Vec::with_capacity(fields.len());
                let mut at = 0;
                for (name, dtype) in fields {
                    let size = dtype.itemsize();
                    let mut column = Vec::with_capacity(n * size);
                    for entry in bytes.chunks_exact(width) {
                        column.extend_from_slice(&entry[at..at + size]);
                    }
                    out.push((name.clone(), NumericArray::from_be_bytes(*dtype, &column)?));
                    at += size;
                }
                Ok(Array::Table(out))
            }
        }
    }

    fn jagged_fromroot(
        &self,
        inner: &Interpretation,
        skip_bytes: usize,
        data: &[u8],
        byteoffsets: Option<&[i32]>,
        lstart: usize,
        lstop: usize,
    ) -> Result<Array> {
        let width = inner.item_bytes();
        if width == 0 {
            return Err(RootError::format("jagged items of zero width"));
        }
        let mut content = Vec::new();
        let mut counts = Vec::with_capacity(lstop - lstart);
        match byteoffsets {
            Some(offsets) => {
                for span in entry_spans(data, offsets, lstart, lstop)? {
                    let items = if span.is_empty() && skip_bytes > 0 {
                        &[][..]
                    } else {
                        span.get(skip_bytes..).ok_or_else(|| {
                            RootError::format(format!("entry of {} bytes, {skip_bytes} to skip", span.len()))
                        })?
                    };
                    if items.len() % width != 0 {
                        return Err(RootError::format(format!(
                            "entry of {} bytes is not a whole number of {width}-byte items",
                            items.len()
                        )));
                    }
                    let n = items.len() / width;
                    if skip_bytes == STL_VECTOR_SKIP && !span.is_empty() {
                        let declared = i32::from_be_bytes([span[6], span[7], span[8], span[9]]);
                        if declared as usize != n {
                            return Err(RootError::format(format!(
                                "vector declares {declared} items, entry holds {n}"
                            )));
                        }
                    }
                    counts.push(n as i64);
                    content.extend_from_slice(items);
                }
            }
            None if skip_bytes == STL_VECTOR_SKIP => {
                let mut c = Cursor::new(data, 0);
                for i in 0..lstop {
                    c.read_version()?;
                    let n = c.i32()?;
                    if n < 0 {
                        return Err(RootError::format(format!("negative vector size {n}")));
                    }
                    let items = c.bytes(n as usize * width)?;
                    if i >= lstart {
                        counts.push(i64::from(n));
                        content.extend_from_slice(items);
                    }
                }
            }
            None => {
                return Err(RootError::format(
                    "jagged basket has no entry offsets and no counter to rebuild them",
                ));
            }
        }
        let flat = inner.fromroot(&content, None, 0, content.len() / width)?;
        Ok(Array::Jagged(JaggedArray::from_counts(flat, &counts)?))
    }

    /// Entry offsets of a jagged basket rebuilt from its per-entry item counts.
    ///
    /// Baskets of counted branches may be written without offsets; each
    /// entry is then `skip_bytes` followed by `count` items.
    pub fn offsets_from_counts(&self, counts: &[i64]) -> Option<Vec<i32>> {
        let Interpretation::Jagged { inner, skip_bytes } = self else { return None };
        let width = inner.item_bytes() as i64;
        let mut offsets = Vec::with_capacity(counts.len() + 1);
        let mut at = 0i64;
        offsets.push(0);
        for &n in counts {
            at += *skip_bytes as i64 + n.max(0) * width;
            offsets.push(i32::try_from(at).ok()?);
        }
        Some(offsets)
    }

    /// Allocate a destination for `numitems` items over `numentries` entries.
    pub fn destination(&self, numitems: usize, numentries: usize) -> Destination {
        match self {
            Interpretation::Primitive(dtype) => Destination::Numeric(NumericArray::zeros(*dtype, numitems)),
            Interpretation::FixedArray { dtype, dims } => {
                Destination::Fixed { data: NumericArray::zeros(*dtype, numitems), dims: dims.clone() }
            }
            Interpretation::Jagged { .. } => {
                Destination::Jagged { content: Vec::new(), counts: Vec::with_capacity(numentries) }
            }
            Interpretation::Strings(_) => Destination::Strings(vec![String::new(); numentries]),
            Interpretation::ObjectArray(_) => Destination::Objects(vec![Value::List(Vec::new()); numentries]),
            Interpretation::Table(fields) => Destination::Table(
                fields.iter().map(|(n, d)| (n.clone(), NumericArray::zeros(*d, numentries))).collect(),
            ),
        }
    }

    /// Copy one decoded basket into `destination` at `items` / `entries`.
    ///
    /// Baskets must be filled in basket order.
    pub fn fill(
        &self,
        source: Array,
        destination: &mut Destination,
        items: Range<usize>,
        entries: Range<usize>,
    ) -> Result<()> {
        if source.len() != entries.len() {
            return Err(RootError::format(format!(
                "basket decoded {} entries, expected {}",
                source.len(),
                entries.len()
            )));
        }
        if self.source_numitems(&source) != items.len() {
            return Err(RootError::format(format!(
                "basket decoded {} items, expected {}",
                self.source_numitems(&source),
                items.len()
            )));
        }
        match (destination, source) {
            (Destination::Numeric(dst), Array::Numeric(src)) => dst.copy_into(items.start, &src),
            (Destination::Fixed { data, .. }, Array::Fixed { data: src, .. }) => data.copy_into(items.start, &src),
            (Destination::Jagged { content, counts }, Array::Jagged(j)) => {
                if counts.len() != entries.start {
                    return Err(RootError::format("jagged baskets filled out of order"));
                }
                let j = if j.is_contiguous() { j } else { j.compact()? };
                counts.extend(j.counts());
                content.push(*j.content);
                Ok(())
            }
            (Destination::Strings(dst), Array::Strings(src)) => {
                check_slots(dst.len(), &entries)?;
                for (slot, s) in dst[entries].iter_mut().zip(src) {
                    *slot = s;
                }
                Ok(())
            }
            (Destination::Objects(dst), Array::Objects(src)) => {
                check_slots(dst.len(), &entries)?;
                for (slot, v) in dst[entries].iter_mut().zip(src) {
                    *slot = v;
                }
                Ok(())
            }
            (Destination::Table(dst), Array::Table(src)) => {
                for ((_, d), (_, s)) in dst.iter_mut().zip(&src) {
                    d.copy_into(entries.start, s)?;
                }
                Ok(())
            }
            (_, source) => Err(RootError::IncompatibleInterpretation(format!(
                "{} basket for {self} destination",
                source.kind()
            ))),
        }
    }

    /// Produce the final array once every basket has been filled.
    pub fn finalize(&self, destination: Destination) -> Result<Array> {
        Ok(match destination {
            Destination::Numeric(a) => Array::Numeric(a),
            Destination::Fixed { data, dims } => Array::Fixed { data, dims },
            Destination::Jagged { content, counts } => {
                let content = if content.is_empty() { self.empty_content()? } else { Array::concat(&content)? };
                Array::Jagged(JaggedArray::from_counts(content, &counts)?)
            }
            Destination::Strings(v) => Array::Strings(v),
            Destination::Objects(v) => Array::Objects(v),
            Destination::Table(fields) => Array::Table(fields),
        })
    }

    fn empty_content(&self) -> Result<Array> {
        match self {
            Interpretation::Jagged { inner, .. } => inner.fromroot(&[], None, 0, 0),
            _ => Err(RootError::format("not a jagged interpretation")),
        }
    }

    /// Whether arrays produced by `self` and `other` have the same layout.
    pub fn compatible(&self, other: &Interpretation) -> bool {
        match (self, other) {
            (Interpretation::Jagged { inner: a, .. }, Interpretation::Jagged { inner: b, .. }) => a.compatible(b),
            (Interpretation::Strings(_), Interpretation::Strings(_)) => true,
            (Interpretation::ObjectArray(a), Interpretation::ObjectArray(b)) => a.element == b.element,
            (a, b) => a == b,
        }
    }

    /// Whether `array` has the layout this interpretation produces.
    pub fn accepts(&self, array: &Array) -> bool {
        match (self, array) {
            (Interpretation::Primitive(d), Array::Numeric(a)) => a.dtype() == *d,
            (Interpretation::FixedArray { dtype, dims }, Array::Fixed { data, dims: got }) => {
                data.dtype() == *dtype && dims == got
            }
            (Interpretation::Jagged { inner, .. }, Array::Jagged(j)) => inner.accepts(&j.content),
            (Interpretation::Strings(_), Array::Strings(_)) => true,
            (Interpretation::ObjectArray(_), Array::Objects(_)) => true,
            (Interpretation::Table(fields), Array::Table(got)) => {
                fields.len() == got.len()
                    && fields.iter().zip(got).all(|((n, d), (gn, ga))| n == gn && ga.dtype() == *d)
            }
            _ => false,
        }
    }

    /// Short stable name, used in cache keys.
    pub fn identifier(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Interpretation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interpretation::Primitive(d) => write!(f, "{d}"),
            Interpretation::FixedArray { dtype, dims } => {
                write!(f, "{dtype}")?;
                dims.iter().try_for_each(|d| write!(f, "[{d}]"))
            }
            Interpretation::Jagged { inner, skip_bytes } => write!(f, "jagged({inner}, skip={skip_bytes})"),
            Interpretation::Strings(layout) => write!(f, "strings({layout:?})"),
            Interpretation::ObjectArray(layout) => write!(f, "objects({})", layout.element),
            Interpretation::Table(fields) => {
                f.write_str("table(")?;
                for (i, (name, dtype)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {dtype}")?;
                }
                f.write_str(")")
            }
        }
    }
}

fn check_slots(len: usize, entries: &Range<usize>) -> Result<()> {
    if entries.end > len {
        return Err(RootError::format(format!(
            "fill of entries {entries:?} overruns destination of {len}"
        )));
    }
    Ok(())
}

/// Bytes of entries `lstart..lstop` when every entry is `width` bytes.
fn fixed_entries(data: &[u8], width: usize, lstart: usize, lstop: usize) -> Result<&[u8]> {
    let (start, stop) = (lstart * width, lstop * width);
    data.get(start..stop).ok_or_else(|| {
        RootError::format(format!(
            "basket of {} bytes cannot hold entries {lstart}..{lstop} of {width} bytes",
            data.len()
        ))
    })
}

/// Byte span of each entry in `lstart..lstop`.
fn entry_spans<'d>(data: &'d [u8], offsets: &[i32], lstart: usize, lstop: usize) -> Result<Vec<&'d [u8]>> {
    if offsets.len() <= lstop {
        return Err(RootError::format(format!(
            "{} entry offsets cannot bound entry {lstop}",
            offsets.len()
        )));
    }
    (lstart..lstop)
        .map(|i| {
            let (a, b) = (offsets[i], offsets[i + 1]);
            if a < 0 || b < a || b as usize > data.len() {
                return Err(RootError::format(format!(
                    "entry {i} spans {a}..{b} of a {}-byte basket",
                    data.len()
                )));
            }
            Ok(&data[a as usize..b as usize])
        })
        .collect()
}

/// Decode variable-size entries, by offsets when present or sequentially otherwise.
fn per_entry<T>(
    data: &[u8],
    byteoffsets: Option<&[i32]>,
    lstart: usize,
    lstop: usize,
    by_span: impl Fn(&[u8]) -> Result<T>,
    by_cursor: impl Fn(&mut Cursor<'_>) -> Result<T>,
) -> Result<Vec<T>> {
    match byteoffsets {
        Some(offsets) => entry_spans(data, offsets, lstart, lstop)?.into_iter().map(by_span).collect(),
        None => {
            let mut c = Cursor::new(data, 0);
            let mut out = Vec::with_capacity(lstop - lstart);
            for i in 0..lstop {
                let value = by_cursor(&mut c)?;
                if i >= lstart {
                    out.push(value);
                }
            }
            Ok(out)
        }
    }
}

/// Choose a decoding plan for `branch`, or `None` if its layout is not supported.
pub fn interpret(branch: &Branch, infos: Option<&StreamerInfos>) -> Option<Interpretation> {
    let kind = StreamerKind::for_branch(branch, infos);

    let leaf = branch.leaves.first();
    let pointer = matches!(kind, Some(StreamerKind::BasicPointer { .. }));
    let counted = pointer || leaf.map_or(false, |l| l.leaf_count.is_some());
    // Split `T* x //[n]` members carry a one-byte flag before each entry.
    let pointer_skip = usize::from(pointer);

    // (a) streamer-declared fixed-size array
    if let Some(StreamerKind::FixedArray { dtype, dims }) = &kind {
        let fixed = Interpretation::FixedArray { dtype: *dtype, dims: dims.clone() };
        if counted {
            return Some(Interpretation::Jagged { inner: Box::new(fixed), skip_bytes: 0 });
        }
        return Some(fixed);
    }

    if branch.leaves.len() == 1 {
        let leaf = &branch.leaves[0];
        let dtype = match &kind {
            None => leaf.dtype(),
            Some(StreamerKind::Basic(d)) | Some(StreamerKind::BasicPointer { dtype: d, .. }) => {
                leaf.dtype().or(Some(*d))
            }
            Some(_) => None,
        };
        if let Some(dtype) = dtype {
            let dims = leaf.fixed_dims();
            let inner = if dims.is_empty() {
                Interpretation::Primitive(dtype)
            } else {
                Interpretation::FixedArray { dtype, dims }
            };
            // (b) primitive or leaf-declared fixed array, (c) counted jagged
            return Some(if counted {
                Interpretation::Jagged { inner: Box::new(inner), skip_bytes: pointer_skip }
            } else if leaf.len > 1 && matches!(inner, Interpretation::Primitive(_)) {
                Interpretation::FixedArray { dtype, dims: vec![leaf.len as usize] }
            } else {
                inner
            });
        }
        // (d) strings
        if leaf.kind == LeafKind::Char {
            return Some(Interpretation::Strings(StringLayout::Leaf));
        }
    }

    let by_kind = match kind {
        Some(StreamerKind::String) => Some(Interpretation::Strings(StringLayout::Leaf)),
        Some(StreamerKind::StlString) => Some(Interpretation::Strings(StringLayout::StdString)),
        Some(StreamerKind::CharStar) => Some(Interpretation::Strings(StringLayout::CharStar)),
        // (e) vector of primitives
        Some(StreamerKind::StlVector(StlType::Basic(dtype))) => Some(Interpretation::Jagged {
            inner: Box::new(Interpretation::Primitive(dtype)),
            skip_bytes: STL_VECTOR_SKIP,
        }),
        // (f) nested vectors and vectors of strings
        Some(StreamerKind::StlVector(inner)) if inner.is_decodable() => {
            Some(Interpretation::ObjectArray(ObjectLayout::stl(StlType::Vector(Box::new(inner)))))
        }
        _ => None,
    };
    by_kind.or_else(|| table(branch))
}

/// A leaflist of scalar leaves.
fn table(branch: &Branch) -> Option<Interpretation> {
    if branch.leaves.len() < 2 {
        return None;
    }
    let fields = branch
        .leaves
        .iter()
        .map(|l| match (l.dtype(), &l.leaf_count, l.len) {
            (Some(d), None, 0 | 1) => Some((l.name.clone(), d)),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    Some(Interpretation::Table(fields))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::testutil::{branch, leaf};
    use crate::tree::{BranchElement, Leaf};
    use std::sync::Arc;

    fn with_leaves(leaves: Vec<Arc<Leaf>>) -> Branch {
        let mut b = branch("b", &[0], 30);
        b.leaves = leaves;
        b
    }

    fn stl_branch(class_name: &str) -> Branch {
        let mut b = with_leaves(vec![leaf("b", "b", LeafKind::Element { id: -1, type_code: -1 }, 0, None)]);
        b.element = Some(BranchElement { class_name: class_name.into(), id: -1, ..Default::default() });
        b
    }

    #[test]
    fn picks_plans_in_priority_order() {
        let n = leaf("n", "n/I", LeafKind::I32, 1, None);
        assert_eq!(
            interpret(&with_leaves(vec![leaf("i8", "i8/B", LeafKind::I8, 1, None)]), None),
            Some(Interpretation::Primitive(Dtype::I8))
        );
        assert_eq!(
            interpret(&with_leaves(vec![leaf("a", "a[3]/F", LeafKind::F32, 3, None)]), None),
            Some(Interpretation::FixedArray { dtype: Dtype::F32, dims: vec![3] })
        );
        assert_eq!(
            interpret(&with_leaves(vec![leaf("Ai8", "Ai8[n]/B", LeafKind::I8, 1, Some(n.clone()))]), None),
            Some(Interpretation::Jagged { inner: Box::new(Interpretation::Primitive(Dtype::I8)), skip_bytes: 0 })
        );
        assert_eq!(
            interpret(&with_leaves(vec![leaf("s", "s/C", LeafKind::Char, 1, None)]), None),
            Some(Interpretation::Strings(StringLayout::Leaf))
        );
        assert_eq!(
            interpret(&stl_branch("vector<double>"), None),
            Some(Interpretation::Jagged { inner: Box::new(Interpretation::Primitive(Dtype::F64)), skip_bytes: 10 })
        );
        assert_eq!(interpret(&stl_branch("string"), None), Some(Interpretation::Strings(StringLayout::StdString)));
        assert!(matches!(
            interpret(&stl_branch("vector<vector<int> >"), None),
            Some(Interpretation::ObjectArray(_))
        ));
        assert_eq!(interpret(&stl_branch("vector<TLorentzVector>"), None), None);
        assert_eq!(interpret(&stl_branch("TLorentzVector"), None), None);
    }

    #[test]
    fn leaflist_becomes_table() {
        let b = with_leaves(vec![
            leaf("x", "x/F", LeafKind::F32, 1, None),
            leaf("n", "n/I", LeafKind::I32, 1, None),
        ]);
        let interp = interpret(&b, None).unwrap();
        assert_eq!(interp.to_string(), "table(x: f32, n: i32)");
        let mut data = 1.5f32.to_be_bytes().to_vec();
        data.extend_from_slice(&7i32.to_be_bytes());
        data.extend_from_slice(&2.5f32.to_be_bytes());
        data.extend_from_slice(&8i32.to_be_bytes());
        let Array::Table(fields) = interp.fromroot(&data, None, 1, 2).unwrap() else { panic!() };
        assert_eq!(fields[0].1.as_f32().unwrap(), &[2.5]);
        assert_eq!(fields[1].1.as_i32().unwrap(), &[8]);
    }

    #[test]
    fn primitive_fill_clips_baskets() {
        let interp = Interpretation::Primitive(Dtype::I8);
        let basket1: Vec<u8> = (0..10i8).map(|x| x as u8).collect();
        let basket2: Vec<u8> = (10..20i8).map(|x| x as u8).collect();
        let a = interp.fromroot(&basket1, None, 6, 10).unwrap();
        let b = interp.fromroot(&basket2, None, 0, 3).unwrap();
        let mut dest = interp.destination(7, 7);
        interp.fill(a, &mut dest, 0..4, 0..4).unwrap();
        interp.fill(b, &mut dest, 4..7, 4..7).unwrap();
        let out = interp.finalize(dest).unwrap();
        assert_eq!(out.as_numeric().unwrap().as_i8().unwrap(), &[6, 7, 8, 9, 10, 11, 12]);
        assert_eq!(interp.numitems(10, 10), 10);
    }

    #[test]
    fn jagged_offsets_become_global() {
        let interp = Interpretation::Jagged { inner: Box::new(Interpretation::Primitive(Dtype::I16)), skip_bytes: 0 };
        // Entries of 0, 1 and 2 items.
        let data = [0, 1, 0, 2, 0, 3];
        let offsets = [0, 0, 2, 6];
        let first = interp.fromroot(&data, Some(&offsets[..]), 0, 3).unwrap();
        let second = interp.fromroot(&data, Some(&offsets[..]), 1, 3).unwrap();
        assert_eq!(second.as_jagged().unwrap().counts(), vec![1, 2]);
        let mut dest = interp.destination(6, 5);
        interp.fill(first, &mut dest, 0..3, 0..3).unwrap();
        let skipped = interp.fromroot(&data, Some(&offsets[..]), 1, 3).unwrap();
        assert!(interp.fill(skipped, &mut dest, 3..6, 4..6).is_err());
        interp.fill(second, &mut dest, 3..6, 3..5).unwrap();
        assert_eq!(interp.offsets_from_counts(&[0, 1, 2]).unwrap(), offsets.to_vec());
        let out = interp.finalize(dest).unwrap();
        let j = out.as_jagged().unwrap();
        assert_eq!(j.starts, vec![0, 0, 1, 3, 4]);
        assert_eq!(j.stops, vec![0, 1, 3, 4, 6]);
        assert_eq!(j.content.as_numeric().unwrap().as_i16().unwrap(), &[1, 2, 3, 1, 2, 3]);
    }

    fn vector_entry(values: &[f64]) -> Vec<u8> {
        let mut out = ((6 + 8 * values.len()) as u32 | 0x4000_0000).to_be_bytes().to_vec();
        out.extend_from_slice(&9u16.to_be_bytes());
        out.extend_from_slice(&(values.len() as i32).to_be_bytes());
        for v in values {
            out.extend_from_slice(&v.to_be_bytes());
        }
        out
    }

    #[test]
    fn stl_vectors_with_and_without_offsets() {
        let interp = Interpretation::Jagged { inner: Box::new(Interpretation::Primitive(Dtype::F64)), skip_bytes: 10 };
        let mut data = Vec::new();
        let mut offsets = vec![0];
        for row in [&[1.0][..], &[][..], &[2.0, 3.0][..]] {
            data.extend(vector_entry(row));
            offsets.push(data.len() as i32);
        }
        let with = interp.fromroot(&data, Some(&offsets[..]), 0, 3).unwrap();
        let without = interp.fromroot(&data, None, 0, 3).unwrap();
        assert_eq!(with, without);
        assert_eq!(with.as_jagged().unwrap().counts(), vec![1, 0, 2]);
        let tail = interp.fromroot(&data, None, 2, 3).unwrap();
        assert_eq!(tail.as_jagged().unwrap().content.as_numeric().unwrap().as_f64().unwrap(), &[2.0, 3.0]);

        // Declared size disagrees with the entry's bytes.
        let mut bad = vector_entry(&[1.0, 2.0]);
        bad[9] = 3;
        let end = bad.len() as i32;
        assert!(interp.fromroot(&bad, Some(&[0, end][..]), 0, 1).is_err());
    }

    #[test]
    fn strings_fill_by_entry() {
        let interp = Interpretation::Strings(StringLayout::Leaf);
        let data = b"\x02ab\x00\x03cde";
        let a = interp.fromroot(data, Some(&[0, 3, 4, 8][..]), 0, 3).unwrap();
        let b = interp.fromroot(data, None, 2, 3).unwrap();
        assert_eq!(b.as_strings().unwrap(), &["cde".to_string()]);
        let mut dest = interp.destination(4, 4);
        interp.fill(a, &mut dest, 0..3, 0..3).unwrap();
        interp.fill(b, &mut dest, 3..4, 3..4).unwrap();
        let out = interp.finalize(dest).unwrap();
        assert_eq!(out.as_strings().unwrap(), &["ab", "", "cde", "cde"]);
    }

    #[test]
    fn compatibility_and_acceptance() {
        let v10 = Interpretation::Jagged { inner: Box::new(Interpretation::Primitive(Dtype::F32)), skip_bytes: 10 };
        let v0 = Interpretation::Jagged { inner: Box::new(Interpretation::Primitive(Dtype::F32)), skip_bytes: 0 };
        assert!(v10.compatible(&v0));
        assert!(!v10.compatible(&Interpretation::Primitive(Dtype::F32)));
        assert!(Interpretation::Strings(StringLayout::Leaf).compatible(&Interpretation::Strings(StringLayout::CharStar)));
        let numeric = Array::Numeric(NumericArray::F32(vec![1.0]));
        assert!(Interpretation::Primitive(Dtype::F32).accepts(&numeric));
        assert!(!Interpretation::Primitive(Dtype::F64).accepts(&numeric));
        assert_eq!(v10.identifier(), "jagged(f32, skip=10)");
    }
}
