//! Containers: `TList`, `THashList`, `TObjArray` and the `TArray` family.

use std::sync::Arc;

use super::Object;
use crate::cursor::Cursor;
use crate::error::Result;
use crate::registry::ClassRegistry;

/// `TList` / `THashList`.
#[derive(Debug, Clone, Default)]
pub struct TList {
    /// `fName`.
    pub name: String,
    /// Items; `None` for null entries.
    pub items: Vec<Option<Arc<Object>>>,
    /// Per-item option strings.
    pub options: Vec<String>,
}

impl TList {
    /// Non-null items.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Object>> {
        self.items.iter().flatten()
    }

    /// Number of entries, nulls included.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// `TObjArray`.
#[derive(Debug, Clone, Default)]
pub struct TObjArray {
    /// `fName`.
    pub name: String,
    /// `fLowerBound`.
    pub lower_bound: i32,
    /// Items; `None` for null slots.
    pub items: Vec<Option<Arc<Object>>>,
}

impl TObjArray {
    /// Non-null items.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Object>> {
        self.items.iter().flatten()
    }
}

/// `TArrayC/S/I/L/F/D`.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum TArray {
    C(Vec<i8>),
    S(Vec<i16>),
    I(Vec<i32>),
    L(Vec<i64>),
    F(Vec<f32>),
    D(Vec<f64>),
}

/// Read a `TList` body.
pub fn read_tlist(c: &mut Cursor<'_>, registry: &ClassRegistry) -> Result<TList> {
    let v = c.read_version()?;
    c.skip_tobject()?;
    let name = c.string()?;
    let size = c.i32()?.max(0) as usize;
    let mut items = Vec::with_capacity(size.min(c.remaining()));
    let mut options = Vec::with_capacity(size.min(c.remaining()));
    for _ in 0..size {
        items.push(registry.read_object_any(c)?);
        let n = c.u8()? as usize;
        options.push(String::from_utf8_lossy(c.bytes(n)?).into_owned());
    }
    v.check(c, "TList")?;
    Ok(TList { name, items, options })
}

/// Read a `TObjArray` body.
pub fn read_tobjarray(c: &mut Cursor<'_>, registry: &ClassRegistry) -> Result<TObjArray> {
    let v = c.read_version()?;
    if v.version > 2 {
        c.skip_tobject()?;
    }
    let name = if v.version > 1 { c.string()? } else { String::new() };
    let size = c.i32()?.max(0) as usize;
    let lower_bound = c.i32()?;
    let mut items = Vec::with_capacity(size.min(c.remaining()));
    for _ in 0..size {
        items.push(registry.read_object_any(c)?);
    }
    v.check(c, "TObjArray")?;
    Ok(TObjArray { name, lower_bound, items })
}

macro_rules! tarray_reader {
    ($fn_name:ident, $object_fn:ident, $variant:ident, $t:ty) => {
        /// Read an unversioned `TArray`: count then values.
        pub fn $fn_name(c: &mut Cursor<'_>) -> Result<Vec<$t>> {
            let n = c.i32()?.max(0) as usize;
            c.array::<$t>(n)
        }

        pub(crate) fn $object_fn(c: &mut Cursor<'_>, _: &ClassRegistry) -> Result<Object> {
            Ok(Object::Array(TArray::$variant($fn_name(c)?)))
        }
    };
}

tarray_reader!(read_tarray_c, read_tarray_c_object, C, i8);
tarray_reader!(read_tarray_s, read_tarray_s_object, S, i16);
tarray_reader!(read_tarray_i, read_tarray_i_object, I, i32);
tarray_reader!(read_tarray_l, read_tarray_l_object, L, i64);
tarray_reader!(read_tarray_f, read_tarray_f_object, F, f32);
tarray_reader!(read_tarray_d, read_tarray_d_object, D, f64);

pub(crate) fn read_tlist_object(c: &mut Cursor<'_>, registry: &ClassRegistry) -> Result<Object> {
    Ok(Object::List(read_tlist(c, registry)?))
}

pub(crate) fn read_tobjarray_object(c: &mut Cursor<'_>, registry: &ClassRegistry) -> Result<Object> {
    Ok(Object::ObjArray(read_tobjarray(c, registry)?))
}
