//! Typed ROOT records produced by the object graph reader.
//!
//! Every reader here consumes exactly one streamed record (version header,
//! base classes, members) and checks its byte count; the
//! [`ClassRegistry`](crate::registry::ClassRegistry) maps class names to them.

pub mod collections;
pub mod leaf;
pub mod streamer_info;
pub mod ttree;

use std::sync::Arc;

use crate::cursor::Cursor;
use crate::error::Result;
use crate::registry::ClassRegistry;
use crate::tree::{Branch, Leaf, Tree};

pub use collections::{TArray, TList, TObjArray};
pub use streamer_info::{ElementExtra, StreamerElement, StreamerInfo, StreamerInfos};

/// `TNamed`: a name and a title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TNamed {
    /// `fName`.
    pub name: String,
    /// `fTitle`.
    pub title: String,
}

/// A decoded object.
#[derive(Debug, Clone)]
pub enum Object {
    /// Bare `TObject`.
    Object,
    /// `TNamed`.
    Named(TNamed),
    /// `TObjString`.
    ObjString(String),
    /// `TList` / `THashList`.
    List(TList),
    /// `TObjArray`.
    ObjArray(TObjArray),
    /// `TArrayC/S/I/L/F/D`.
    Array(TArray),
    /// `ROOT::TIOFeatures` bits.
    IOFeatures(u8),
    /// `TTree`.
    Tree(Arc<Tree>),
    /// `TBranch` and subclasses.
    Branch(Arc<Branch>),
    /// `TLeaf` and subclasses.
    Leaf(Arc<Leaf>),
    /// `TStreamerInfo`.
    StreamerInfo(Arc<StreamerInfo>),
    /// `TStreamer*` element.
    StreamerElement(Arc<StreamerElement>),
    /// An unregistered class skipped by byte count.
    Opaque {
        /// Class name as streamed.
        class: String,
        /// Bytes skipped, header included.
        bytes: usize,
    },
}

impl Object {
    /// Short label of the decoded variant, or the class name for opaque objects.
    pub fn kind(&self) -> &str {
        match self {
            Object::Object => "TObject",
            Object::Named(_) => "TNamed",
            Object::ObjString(_) => "TObjString",
            Object::List(_) => "TList",
            Object::ObjArray(_) => "TObjArray",
            Object::Array(_) => "TArray",
            Object::IOFeatures(_) => "TIOFeatures",
            Object::Tree(_) => "TTree",
            Object::Branch(_) => "TBranch",
            Object::Leaf(_) => "TLeaf",
            Object::StreamerInfo(_) => "TStreamerInfo",
            Object::StreamerElement(_) => "TStreamerElement",
            Object::Opaque { class, .. } => class,
        }
    }

    /// Name of the object, if the class has one.
    pub fn name(&self) -> Option<&str> {
        match self {
            Object::Named(n) => Some(&n.name),
            Object::ObjString(s) => Some(s),
            Object::List(l) => Some(&l.name),
            Object::ObjArray(a) => Some(&a.name),
            Object::Tree(t) => Some(&t.name),
            Object::Branch(b) => Some(&b.name),
            Object::Leaf(l) => Some(&l.name),
            Object::StreamerInfo(s) => Some(&s.name),
            Object::StreamerElement(e) => Some(&e.name),
            _ => None,
        }
    }

    /// The branch, if this is one.
    pub fn as_branch(&self) -> Option<&Arc<Branch>> {
        match self {
            Object::Branch(b) => Some(b),
            _ => None,
        }
    }

    /// The leaf, if this is one.
    pub fn as_leaf(&self) -> Option<&Arc<Leaf>> {
        match self {
            Object::Leaf(l) => Some(l),
            _ => None,
        }
    }

    /// The tree, if this is one.
    pub fn as_tree(&self) -> Option<&Arc<Tree>> {
        match self {
            Object::Tree(t) => Some(t),
            _ => None,
        }
    }

    /// The list, if this is one.
    pub fn as_list(&self) -> Option<&TList> {
        match self {
            Object::List(l) => Some(l),
            _ => None,
        }
    }
}

/// Read a versioned `TNamed` (TObject + name + title).
pub fn read_tnamed(c: &mut Cursor<'_>) -> Result<TNamed> {
    let v = c.read_version()?;
    c.skip_tobject()?;
    let name = c.string()?;
    let title = c.string()?;
    v.check(c, "TNamed")?;
    Ok(TNamed { name, title })
}

/// Skip a `TAttLine`, `TAttFill` or `TAttMarker` base.
///
/// Without a byte count the documented v2 layout is consumed.
pub(crate) fn skip_attributes(c: &mut Cursor<'_>, class: &str) -> Result<()> {
    let v = c.read_version()?;
    if v.byte_count.is_some() {
        return v.skip_to_end(c);
    }
    match class {
        "TAttLine" => c.skip(6),
        "TAttFill" => c.skip(4),
        "TAttMarker" => c.skip(8),
        _ => Ok(()),
    }
}

pub(crate) fn read_tobject_object(c: &mut Cursor<'_>, _: &ClassRegistry) -> Result<Object> {
    c.skip_tobject()?;
    Ok(Object::Object)
}

pub(crate) fn read_tnamed_object(c: &mut Cursor<'_>, _: &ClassRegistry) -> Result<Object> {
    Ok(Object::Named(read_tnamed(c)?))
}

pub(crate) fn read_tobjstring(c: &mut Cursor<'_>, _: &ClassRegistry) -> Result<Object> {
    let v = c.read_version()?;
    c.skip_tobject()?;
    let s = c.string()?;
    v.check(c, "TObjString")?;
    Ok(Object::ObjString(s))
}

pub(crate) fn read_tiofeatures(c: &mut Cursor<'_>) -> Result<u8> {
    let v = c.read_version()?;
    let bits = c.u8()?;
    v.check(c, "ROOT::TIOFeatures")?;
    Ok(bits)
}

pub(crate) fn read_tiofeatures_object(c: &mut Cursor<'_>, _: &ClassRegistry) -> Result<Object> {
    Ok(Object::IOFeatures(read_tiofeatures(c)?))
}
