//! `TStreamerInfo` and the `TStreamer*` element family.

use std::collections::HashMap;
use std::sync::Arc;

use super::{read_tnamed, Object, TList};
use crate::cursor::Cursor;
use crate::error::Result;
use crate::registry::ClassRegistry;
use crate::streamer::codes::{K_BOOL, K_OFFSET_L, K_OFFSET_P, K_UCHAR};

/// Subclass-specific members of a streamer element.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ElementExtra {
    /// No extra members.
    #[default]
    None,
    /// `TStreamerBase`.
    Base {
        /// `fBaseVersion`.
        base_version: i32,
    },
    /// `TStreamerBasicPointer` / `TStreamerLoop`.
    Counted {
        /// `fCountVersion`.
        count_version: i32,
        /// `fCountName`: the member holding the element count.
        count_name: String,
        /// `fCountClass`.
        count_class: String,
    },
    /// `TStreamerSTL` / `TStreamerSTLstring`.
    Stl {
        /// `fSTLtype`.
        stl_type: i32,
        /// `fCtype`: element type code.
        ctype: i32,
    },
}

/// One member of a class layout.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamerElement {
    /// Element class, e.g. `TStreamerBasicType`.
    pub class: String,
    /// `fName`.
    pub name: String,
    /// `fTitle`.
    pub title: String,
    /// `fType`, with the fixed-array offset removed for basic types.
    pub type_code: i32,
    /// `fSize`.
    pub size: i32,
    /// `fArrayLength`: total element count of a fixed array, `0` otherwise.
    pub array_length: i32,
    /// `fArrayDim`.
    pub array_dim: i32,
    /// `fMaxIndex`: per-dimension sizes.
    pub max_index: Vec<i32>,
    /// `fTypeName`.
    pub type_name: String,
    /// Subclass members.
    pub extra: ElementExtra,
}

impl StreamerElement {
    /// Declared dimensions of a fixed-size array member.
    pub fn dims(&self) -> Vec<usize> {
        let n = self.array_dim.max(0) as usize;
        self.max_index.iter().take(n).map(|&d| d.max(0) as usize).collect()
    }
}

/// Layout of one class version.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamerInfo {
    /// Class name.
    pub name: String,
    /// `fTitle`.
    pub title: String,
    /// `fCheckSum`.
    pub checksum: u32,
    /// `fClassVersion`.
    pub class_version: i32,
    /// `fElements`, in streaming order.
    pub elements: Vec<Arc<StreamerElement>>,
}

impl StreamerInfo {
    /// Element by member name.
    pub fn element(&self, name: &str) -> Option<&Arc<StreamerElement>> {
        self.elements.iter().find(|e| e.name == name)
    }
}

/// Class name → layout, built from a file's `StreamerInfo` list.
#[derive(Debug, Clone, Default)]
pub struct StreamerInfos {
    by_name: HashMap<String, Arc<StreamerInfo>>,
}

impl StreamerInfos {
    /// Collect the `TStreamerInfo` entries of `list`; later entries win.
    pub fn from_list(list: &TList) -> Self {
        let mut by_name = HashMap::new();
        for item in list.iter() {
            if let Object::StreamerInfo(info) = &**item {
                by_name.insert(info.name.clone(), Arc::clone(info));
            }
        }
        Self { by_name }
    }

    /// Layout of `class`.
    pub fn get(&self, class: &str) -> Option<&Arc<StreamerInfo>> {
        self.by_name.get(class)
    }

    /// Number of classes described.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Whether no class is described.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Described class names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Read the `TStreamerElement` base.
pub fn read_element(c: &mut Cursor<'_>, class: &str) -> Result<StreamerElement> {
    let v = c.read_version()?;
    let named = read_tnamed(c)?;
    let mut type_code = c.i32()?;
    let size = c.i32()?;
    let array_length = c.i32()?;
    let array_dim = c.i32()?;
    let max_index = if v.version == 1 {
        let n = c.i32()?.max(0) as usize;
        c.array::<i32>(n)?
    } else {
        c.array::<i32>(5)?
    };
    let type_name = c.string()?;
    if type_code == K_UCHAR && (type_name == "Bool_t" || type_name == "bool") {
        type_code = K_BOOL;
    }
    if v.version == 3 {
        // fXmin, fXmax, fFactor
        c.skip(24)?;
    }
    v.check(c, "TStreamerElement")?;
    Ok(StreamerElement {
        class: class.to_string(),
        name: named.name,
        title: named.title,
        type_code,
        size,
        array_length,
        array_dim,
        max_index,
        type_name,
        extra: ElementExtra::None,
    })
}

fn element_object(e: StreamerElement) -> Object {
    Object::StreamerElement(Arc::new(e))
}

fn read_wrapped(
    c: &mut Cursor<'_>,
    class: &str,
    extra: impl FnOnce(&mut Cursor<'_>, &mut StreamerElement, u16) -> Result<()>,
) -> Result<Object> {
    let v = c.read_version()?;
    let mut e = read_element(c, class)?;
    extra(c, &mut e, v.version)?;
    v.check(c, class)?;
    Ok(element_object(e))
}

fn read_counted_extra(c: &mut Cursor<'_>, e: &mut StreamerElement) -> Result<()> {
    let count_version = c.i32()?;
    let count_name = c.string()?;
    let count_class = c.string()?;
    e.extra = ElementExtra::Counted { count_version, count_name, count_class };
    Ok(())
}

fn read_stl_extra(c: &mut Cursor<'_>, e: &mut StreamerElement) -> Result<()> {
    let stl_type = c.i32()?;
    let ctype = c.i32()?;
    e.extra = ElementExtra::Stl { stl_type, ctype };
    Ok(())
}

pub(crate) fn read_tstreamerelement(c: &mut Cursor<'_>, _: &ClassRegistry) -> Result<Object> {
    Ok(element_object(read_element(c, "TStreamerElement")?))
}

pub(crate) fn read_tstreamerbase(c: &mut Cursor<'_>, _: &ClassRegistry) -> Result<Object> {
    read_wrapped(c, "TStreamerBase", |c, e, version| {
        if version > 2 {
            e.extra = ElementExtra::Base { base_version: c.i32()? };
        }
        Ok(())
    })
}

pub(crate) fn read_tstreamerbasictype(c: &mut Cursor<'_>, _: &ClassRegistry) -> Result<Object> {
    read_wrapped(c, "TStreamerBasicType", |_, e, _| {
        if K_OFFSET_L < e.type_code && e.type_code < K_OFFSET_P {
            e.type_code -= K_OFFSET_L;
        }
        Ok(())
    })
}

pub(crate) fn read_tstreamerbasicpointer(c: &mut Cursor<'_>, _: &ClassRegistry) -> Result<Object> {
    read_wrapped(c, "TStreamerBasicPointer", |c, e, _| read_counted_extra(c, e))
}

pub(crate) fn read_tstreamerloop(c: &mut Cursor<'_>, _: &ClassRegistry) -> Result<Object> {
    read_wrapped(c, "TStreamerLoop", |c, e, _| read_counted_extra(c, e))
}

pub(crate) fn read_tstreamerstl(c: &mut Cursor<'_>, _: &ClassRegistry) -> Result<Object> {
    read_wrapped(c, "TStreamerSTL", |c, e, _| read_stl_extra(c, e))
}

pub(crate) fn read_tstreamerstlstring(c: &mut Cursor<'_>, _: &ClassRegistry) -> Result<Object> {
    let v = c.read_version()?;
    let inner = c.read_version()?;
    let mut e = read_element(c, "TStreamerSTLstring")?;
    read_stl_extra(c, &mut e)?;
    inner.check(c, "TStreamerSTL")?;
    v.check(c, "TStreamerSTLstring")?;
    Ok(element_object(e))
}

macro_rules! plain_element_reader {
    ($($fn_name:ident => $class:literal),* $(,)?) => {$(
        pub(crate) fn $fn_name(c: &mut Cursor<'_>, _: &ClassRegistry) -> Result<Object> {
            read_wrapped(c, $class, |_, _, _| Ok(()))
        }
    )*};
}

plain_element_reader! {
    read_tstreamerobject => "TStreamerObject",
    read_tstreamerobjectpointer => "TStreamerObjectPointer",
    read_tstreamerobjectany => "TStreamerObjectAny",
    read_tstreamerobjectanypointer => "TStreamerObjectAnyPointer",
    read_tstreamerstring => "TStreamerString",
    read_tstreamerartificial => "TStreamerArtificial",
}

/// Read a `TStreamerInfo` record.
pub fn read_tstreamerinfo(c: &mut Cursor<'_>, registry: &ClassRegistry) -> Result<StreamerInfo> {
    let v = c.read_version()?;
    let named = read_tnamed(c)?;
    let checksum = c.u32()?;
    let class_version = c.i32()?;
    let elements = match registry.read_object_any(c)? {
        Some(obj) => match &*obj {
            Object::ObjArray(arr) => arr
                .iter()
                .filter_map(|o| match &**o {
                    Object::StreamerElement(e) => Some(Arc::clone(e)),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        },
        None => Vec::new(),
    };
    v.check(c, "TStreamerInfo")?;
    Ok(StreamerInfo { name: named.name, title: named.title, checksum, class_version, elements })
}

pub(crate) fn read_tstreamerinfo_object(
    c: &mut Cursor<'_>,
    registry: &ClassRegistry,
) -> Result<Object> {
    Ok(Object::StreamerInfo(Arc::new(read_tstreamerinfo(c, registry)?)))
}
