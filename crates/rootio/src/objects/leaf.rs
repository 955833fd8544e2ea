//! `TLeaf` and its typed subclasses.

use std::sync::Arc;

use super::{read_tnamed, Object};
use crate::cursor::Cursor;
use crate::error::Result;
use crate::registry::ClassRegistry;
use crate::tree::{Leaf, LeafKind};

/// Read the `TLeaf` base: TNamed, shape, flags and the counter leaf reference.
pub fn read_tleaf(c: &mut Cursor<'_>, registry: &ClassRegistry, class: &str) -> Result<Leaf> {
    let v = c.read_version()?;
    let named = read_tnamed(c)?;
    let len = c.i32()?;
    let len_type = c.i32()?;
    let offset = c.i32()?;
    let is_range = c.u8()? != 0;
    let is_unsigned = c.u8()? != 0;
    let leaf_count = registry
        .read_object_any(c)?
        .and_then(|o| o.as_leaf().cloned());
    v.check(c, "TLeaf")?;
    Ok(Leaf {
        class: class.to_string(),
        name: named.name,
        title: named.title,
        len,
        len_type,
        offset,
        is_range,
        is_unsigned,
        leaf_count,
        kind: LeafKind::Plain,
        minimum: 0.0,
        maximum: 0.0,
    })
}

fn read_typed(
    c: &mut Cursor<'_>,
    registry: &ClassRegistry,
    class: &str,
    kind: LeafKind,
) -> Result<Object> {
    let v = c.read_version()?;
    let mut leaf = read_tleaf(c, registry, class)?;
    let (minimum, maximum) = match kind {
        LeafKind::Bool | LeafKind::I8 => (c.i8()? as f64, c.i8()? as f64),
        LeafKind::I16 => (c.i16()? as f64, c.i16()? as f64),
        LeafKind::I32 | LeafKind::Char => (c.i32()? as f64, c.i32()? as f64),
        LeafKind::I64 => (c.i64()? as f64, c.i64()? as f64),
        LeafKind::F32 => (c.f32()? as f64, c.f32()? as f64),
        LeafKind::F64 => (c.f64()?, c.f64()?),
        LeafKind::Element { .. } | LeafKind::Plain => (0.0, 0.0),
    };
    v.check(c, class)?;
    leaf.kind = kind;
    leaf.minimum = minimum;
    leaf.maximum = maximum;
    Ok(Object::Leaf(Arc::new(leaf)))
}

macro_rules! leaf_reader {
    ($fn_name:ident, $class:literal, $kind:expr) => {
        pub(crate) fn $fn_name(c: &mut Cursor<'_>, registry: &ClassRegistry) -> Result<Object> {
            read_typed(c, registry, $class, $kind)
        }
    };
}

leaf_reader!(read_tleafo, "TLeafO", LeafKind::Bool);
leaf_reader!(read_tleafb, "TLeafB", LeafKind::I8);
leaf_reader!(read_tleafs, "TLeafS", LeafKind::I16);
leaf_reader!(read_tleafi, "TLeafI", LeafKind::I32);
leaf_reader!(read_tleafl, "TLeafL", LeafKind::I64);
leaf_reader!(read_tleaff, "TLeafF", LeafKind::F32);
leaf_reader!(read_tleafd, "TLeafD", LeafKind::F64);
leaf_reader!(read_tleafc, "TLeafC", LeafKind::Char);

pub(crate) fn read_tleaf_object(c: &mut Cursor<'_>, registry: &ClassRegistry) -> Result<Object> {
    Ok(Object::Leaf(Arc::new(read_tleaf(c, registry, "TLeaf")?)))
}

pub(crate) fn read_tleafelement(c: &mut Cursor<'_>, registry: &ClassRegistry) -> Result<Object> {
    let v = c.read_version()?;
    let mut leaf = read_tleaf(c, registry, "TLeafElement")?;
    let id = c.i32()?;
    let type_code = c.i32()?;
    v.check(c, "TLeafElement")?;
    leaf.kind = LeafKind::Element { id, type_code };
    Ok(Object::Leaf(Arc::new(leaf)))
}
