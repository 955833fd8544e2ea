//! Materialized branch data.

use std::ops::Range;

use crate::error::{Result, RootError};
use crate::interpretation::{Dtype, NumericArray};

/// A dynamically typed value decoded from an object branch.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Floating point.
    Float(f64),
    /// String.
    Str(String),
    /// Sequence, e.g. one `std::vector`.
    List(Vec<Value>),
}

impl Value {
    /// Length of a list value.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::List(v) => Some(v.len()),
            _ => None,
        }
    }

    /// Whether this is an empty list.
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }

    /// Numeric value as `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(i as f64),
            Value::UInt(u) => Some(u as f64),
            Value::Float(f) => Some(f),
            _ => None,
        }
    }

    fn nbytes(&self) -> usize {
        match self {
            Value::Str(s) => s.len() + std::mem::size_of::<Value>(),
            Value::List(v) => v.iter().map(Value::nbytes).sum::<usize>() + std::mem::size_of::<Value>(),
            _ => std::mem::size_of::<Value>(),
        }
    }
}

/// Variable-length rows over a flat content array.
///
/// Row `i` is `content[starts[i]..stops[i]]`.
#[derive(Debug, Clone, PartialEq)]
pub struct JaggedArray {
    /// Flat values of all rows.
    pub content: Box<Array>,
    /// First content index of each row.
    pub starts: Vec<i64>,
    /// One past the last content index of each row.
    pub stops: Vec<i64>,
}

impl JaggedArray {
    /// Build from per-row counts, with contiguous rows starting at 0.
    pub fn from_counts(content: Array, counts: &[i64]) -> Result<Self> {
        let mut starts = Vec::with_capacity(counts.len());
        let mut stops = Vec::with_capacity(counts.len());
        let mut at = 0i64;
        for &n in counts {
            if n < 0 {
                return Err(RootError::format(format!("negative row length {n}")));
            }
            starts.push(at);
            at += n;
            stops.push(at);
        }
        if at as usize != content.len() {
            return Err(RootError::format(format!(
                "row lengths sum to {at} but content has {} items",
                content.len()
            )));
        }
        Ok(Self { content: Box::new(content), starts, stops })
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// Length of each row.
    pub fn counts(&self) -> Vec<i64> {
        self.starts.iter().zip(&self.stops).map(|(a, b)| b - a).collect()
    }

    /// Content of row `i`.
    pub fn row(&self, i: usize) -> Option<Array> {
        let (start, stop) = (*self.starts.get(i)?, *self.stops.get(i)?);
        Some(self.content.slice(start as usize..stop as usize))
    }

    /// Whether every row starts where the previous one stopped.
    pub fn is_contiguous(&self) -> bool {
        self.starts.first().map_or(true, |&s| s == 0)
            && self.starts.iter().skip(1).zip(&self.stops).all(|(s, p)| s == p)
    }

    /// Same rows over content trimmed to exactly what they reference.
    pub fn compact(&self) -> Result<JaggedArray> {
        let mut parts = Vec::with_capacity(self.len());
        for i in 0..self.len() {
            parts.extend(self.row(i));
        }
        let content = if parts.is_empty() { self.content.empty_like() } else { Array::concat(&parts)? };
        JaggedArray::from_counts(content, &self.counts())
    }
}

/// Decoded data of one branch over an entry range.
#[derive(Debug, Clone, PartialEq)]
pub enum Array {
    /// One value per entry.
    Numeric(NumericArray),
    /// A fixed-shape block per entry; `data` is row-major.
    Fixed {
        /// Flat values.
        data: NumericArray,
        /// Shape of one entry.
        dims: Vec<usize>,
    },
    /// A variable-length row per entry.
    Jagged(JaggedArray),
    /// One string per entry.
    Strings(Vec<String>),
    /// One decoded object per entry.
    Objects(Vec<Value>),
    /// One record per entry with named numeric fields.
    Table(Vec<(String, NumericArray)>),
}

fn shape_len(dims: &[usize]) -> usize {
    dims.iter().product::<usize>().max(1)
}

impl Array {
    /// Empty array with the layout of `self`.
    fn empty_like(&self) -> Array {
        match self {
            Array::Jagged(j) => Array::Jagged(JaggedArray {
                content: Box::new(j.content.empty_like()),
                starts: Vec::new(),
                stops: Vec::new(),
            }),
            _ => self.slice(0..0),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        match self {
            Array::Numeric(a) => a.len(),
            Array::Fixed { data, dims } => data.len() / shape_len(dims),
            Array::Jagged(j) => j.len(),
            Array::Strings(v) => v.len(),
            Array::Objects(v) => v.len(),
            Array::Table(fields) => fields.first().map_or(0, |(_, a)| a.len()),
        }
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate memory footprint.
    pub fn nbytes(&self) -> usize {
        match self {
            Array::Numeric(a) | Array::Fixed { data: a, .. } => a.nbytes(),
            Array::Jagged(j) => j.content.nbytes() + 16 * j.len(),
            Array::Strings(v) => v.iter().map(|s| s.len() + 24).sum(),
            Array::Objects(v) => v.iter().map(Value::nbytes).sum(),
            Array::Table(fields) => fields.iter().map(|(n, a)| n.len() + a.nbytes()).sum(),
        }
    }

    /// Entries in `range`.
    pub fn slice(&self, range: Range<usize>) -> Array {
        match self {
            Array::Numeric(a) => Array::Numeric(a.slice(range)),
            Array::Fixed { data, dims } => {
                let w = shape_len(dims);
                Array::Fixed { data: data.slice(range.start * w..range.end * w), dims: dims.clone() }
            }
            Array::Jagged(j) => Array::Jagged(JaggedArray {
                content: j.content.clone(),
                starts: j.starts[range.clone()].to_vec(),
                stops: j.stops[range].to_vec(),
            }),
            Array::Strings(v) => Array::Strings(v[range].to_vec()),
            Array::Objects(v) => Array::Objects(v[range].to_vec()),
            Array::Table(fields) => {
                Array::Table(fields.iter().map(|(n, a)| (n.clone(), a.slice(range.clone()))).collect())
            }
        }
    }

    /// Concatenate arrays of the same layout.
    pub fn concat(parts: &[Array]) -> Result<Array> {
        let Some(first) = parts.first() else {
            return Err(RootError::format("cannot concatenate zero arrays"));
        };
        let mut out = first.empty_like();
        for part in parts {
            out.append(part)?;
        }
        Ok(out)
    }

    fn append(&mut self, other: &Array) -> Result<()> {
        match (self, other) {
            (Array::Numeric(a), Array::Numeric(b)) => a.extend_from(b),
            (Array::Fixed { data: a, dims: da }, Array::Fixed { data: b, dims: db }) if da == db => {
                a.extend_from(b)
            }
            (Array::Jagged(a), Array::Jagged(b)) => {
                let b = if b.is_contiguous() { b.clone() } else { b.compact()? };
                let shift = a.content.len() as i64;
                a.content.append(&b.content)?;
                a.starts.extend(b.starts.iter().map(|s| s + shift));
                a.stops.extend(b.stops.iter().map(|s| s + shift));
                Ok(())
            }
            (Array::Strings(a), Array::Strings(b)) => {
                a.extend_from_slice(b);
                Ok(())
            }
            (Array::Objects(a), Array::Objects(b)) => {
                a.extend_from_slice(b);
                Ok(())
            }
            (Array::Table(a), Array::Table(b)) if a.len() == b.len() => {
                for ((na, fa), (nb, fb)) in a.iter_mut().zip(b) {
                    if na != nb {
                        return Err(RootError::IncompatibleInterpretation(format!(
                            "table field {na} vs {nb}"
                        )));
                    }
                    fa.extend_from(fb)?;
                }
                Ok(())
            }
            (a, b) => Err(RootError::IncompatibleInterpretation(format!(
                "cannot concatenate {} and {}",
                a.kind(),
                b.kind()
            ))),
        }
    }

    /// Short layout name, for messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Array::Numeric(_) => "numeric",
            Array::Fixed { .. } => "fixed",
            Array::Jagged(_) => "jagged",
            Array::Strings(_) => "strings",
            Array::Objects(_) => "objects",
            Array::Table(_) => "table",
        }
    }

    /// Element type of numeric, fixed or jagged-numeric data.
    pub fn dtype(&self) -> Option<Dtype> {
        match self {
            Array::Numeric(a) | Array::Fixed { data: a, .. } => Some(a.dtype()),
            Array::Jagged(j) => j.content.dtype(),
            _ => None,
        }
    }

    /// The flat numeric values, if this is a one-value-per-entry array.
    pub fn as_numeric(&self) -> Option<&NumericArray> {
        match self {
            Array::Numeric(a) => Some(a),
            _ => None,
        }
    }

    /// The jagged rows, if this is a jagged array.
    pub fn as_jagged(&self) -> Option<&JaggedArray> {
        match self {
            Array::Jagged(j) => Some(j),
            _ => None,
        }
    }

    /// The strings, if this is a string array.
    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            Array::Strings(v) => Some(v),
            _ => None,
        }
    }

    /// The objects, if this is an object array.
    pub fn as_objects(&self) -> Option<&[Value]> {
        match self {
            Array::Objects(v) => Some(v),
            _ => None,
        }
    }
}
