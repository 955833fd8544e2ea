//! Class registry and the object graph reader.
//!
//! Nested objects are streamed behind a 4-byte tag that says whether the
//! object is null, a back-reference to an object already read, a new object
//! of a class already seen, or a new class followed by a new object. Classes
//! and objects are recorded in the cursor's reference table keyed by their
//! stream offset plus [`K_MAP_OFFSET`].

use std::collections::HashMap;
use std::sync::Arc;

use crate::cursor::{Cursor, K_BYTE_COUNT_MASK};
use crate::error::{Result, RootError};
use crate::objects::{self, collections, leaf, streamer_info, ttree, Object};

/// Tag announcing a class name followed by a new object.
pub const K_NEW_CLASS_TAG: u32 = 0xFFFF_FFFF;
/// Tag bit marking a reference to an already recorded class.
pub const K_CLASS_MASK: u32 = 0x8000_0000;
/// Offset added to stream positions when forming reference keys.
pub const K_MAP_OFFSET: i64 = 2;

/// An entry of the per-decode reference table.
#[derive(Debug, Clone)]
pub enum RefEntry {
    /// A class name seen in a new-class tag.
    Class(String),
    /// A fully decoded object.
    Object(Arc<Object>),
}

/// Reader for one class body, starting at its version header.
pub type ReadFn = fn(&mut Cursor<'_>, &ClassRegistry) -> Result<Object>;

static BUILTIN: &[(&str, ReadFn)] = &[
    ("TObject", objects::read_tobject_object),
    ("TNamed", objects::read_tnamed_object),
    ("TObjString", objects::read_tobjstring),
    ("ROOT::TIOFeatures", objects::read_tiofeatures_object),
    ("TList", collections::read_tlist_object),
    ("THashList", collections::read_tlist_object),
    ("TObjArray", collections::read_tobjarray_object),
    ("TArrayC", collections::read_tarray_c_object),
    ("TArrayS", collections::read_tarray_s_object),
    ("TArrayI", collections::read_tarray_i_object),
    ("TArrayL", collections::read_tarray_l_object),
    ("TArrayF", collections::read_tarray_f_object),
    ("TArrayD", collections::read_tarray_d_object),
    ("TTree", ttree::read_ttree_object),
    ("TBranch", ttree::read_tbranch_object),
    ("TBranchElement", ttree::read_tbranchelement_object),
    ("TBranchObject", ttree::read_tbranchobject_object),
    ("TLeaf", leaf::read_tleaf_object),
    ("TLeafO", leaf::read_tleafo),
    ("TLeafB", leaf::read_tleafb),
    ("TLeafS", leaf::read_tleafs),
    ("TLeafI", leaf::read_tleafi),
    ("TLeafL", leaf::read_tleafl),
    ("TLeafF", leaf::read_tleaff),
    ("TLeafD", leaf::read_tleafd),
    ("TLeafC", leaf::read_tleafc),
    ("TLeafElement", leaf::read_tleafelement),
    ("TStreamerInfo", streamer_info::read_tstreamerinfo_object),
    ("TStreamerElement", streamer_info::read_tstreamerelement),
    ("TStreamerBase", streamer_info::read_tstreamerbase),
    ("TStreamerBasicType", streamer_info::read_tstreamerbasictype),
    ("TStreamerBasicPointer", streamer_info::read_tstreamerbasicpointer),
    ("TStreamerLoop", streamer_info::read_tstreamerloop),
    ("TStreamerObject", streamer_info::read_tstreamerobject),
    ("TStreamerObjectPointer", streamer_info::read_tstreamerobjectpointer),
    ("TStreamerObjectAny", streamer_info::read_tstreamerobjectany),
    ("TStreamerObjectAnyPointer", streamer_info::read_tstreamerobjectanypointer),
    ("TStreamerString", streamer_info::read_tstreamerstring),
    ("TStreamerSTL", streamer_info::read_tstreamerstl),
    ("TStreamerSTLstring", streamer_info::read_tstreamerstlstring),
    ("TStreamerArtificial", streamer_info::read_tstreamerartificial),
];

/// Class name → reader table, built once and passed explicitly.
#[derive(Clone)]
pub struct ClassRegistry {
    readers: HashMap<String, ReadFn>,
}

impl std::fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.readers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ClassRegistry").field("classes", &names).finish()
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ClassRegistry {
    /// Registry with every built-in ROOT I/O class.
    pub fn builtin() -> Self {
        let readers = BUILTIN.iter().map(|&(name, f)| (name.to_string(), f)).collect();
        Self { readers }
    }

    /// Registry with no classes.
    pub fn empty() -> Self {
        Self { readers: HashMap::new() }
    }

    /// Add or replace the reader for `class`.
    pub fn register(&mut self, class: impl Into<String>, reader: ReadFn) {
        self.readers.insert(class.into(), reader);
    }

    /// Whether `class` has a reader.
    pub fn contains(&self, class: &str) -> bool {
        self.readers.contains_key(class)
    }

    /// Registered class names, sorted.
    pub fn classes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.readers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Read one `class` body at the cursor.
    pub fn read(&self, class: &str, c: &mut Cursor<'_>) -> Result<Object> {
        let reader =
            self.readers.get(class).ok_or_else(|| RootError::UnknownClass(class.to_string()))?;
        reader(c, self)
    }

    /// Read a tagged, possibly shared, nested object.
    ///
    /// Returns `None` for a null pointer and for a back-reference to an
    /// object that is not recorded yet (typically a parent still being
    /// decoded); in the latter case the cursor skips the tagged record.
    pub fn read_object_any(&self, c: &mut Cursor<'_>) -> Result<Option<Arc<Object>>> {
        let beg = c.ref_position();
        let beg_pos = c.pos();
        let bcnt = c.u32()?;

        let (byte_count, start, tag) = if bcnt & K_BYTE_COUNT_MASK == 0 || bcnt == K_NEW_CLASS_TAG {
            (None, 0, bcnt)
        } else {
            let start = c.ref_position();
            let tag = c.u32()?;
            (Some((bcnt & !K_BYTE_COUNT_MASK) as usize), start, tag)
        };
        let end = byte_count.map(|n| beg_pos + n + 4);

        if tag & K_CLASS_MASK == 0 {
            return match tag {
                0 => Ok(None),
                1 => Err(RootError::Unimplemented(format!(
                    "self-reference tag at position {beg_pos}"
                ))),
                _ => {
                    let entry = c.refs().borrow().get(&i64::from(tag)).cloned();
                    match entry {
                        Some(RefEntry::Object(obj)) => Ok(Some(obj)),
                        Some(RefEntry::Class(_)) => {
                            Err(RootError::InvalidReference { tag, position: beg_pos })
                        }
                        None => {
                            log::debug!("unresolved object reference {tag} at {beg_pos}; skipped");
                            if let Some(end) = end {
                                c.set_pos(end)?;
                            }
                            Ok(None)
                        }
                    }
                }
            };
        }

        let class = if tag == K_NEW_CLASS_TAG {
            let class = c.cstring()?;
            let key = match byte_count {
                Some(_) => start + K_MAP_OFFSET,
                None => c.refs().borrow().len() as i64 + 1,
            };
            c.refs().borrow_mut().insert(key, RefEntry::Class(class.clone()));
            class
        } else {
            let key = i64::from(tag & !K_CLASS_MASK);
            let entry = c.refs().borrow().get(&key).cloned();
            match entry {
                Some(RefEntry::Class(class)) => class,
                _ => return Err(RootError::InvalidReference { tag, position: beg_pos }),
            }
        };

        let obj = if self.contains(&class) {
            let obj = self.read(&class, c)?;
            if let Some(end) = end {
                if c.pos() != end {
                    return Err(RootError::ByteCountMismatch {
                        class,
                        expected: end - beg_pos,
                        actual: c.pos().saturating_sub(beg_pos),
                    });
                }
            }
            obj
        } else {
            let Some(end) = end else {
                return Err(RootError::UnknownClass(class));
            };
            log::debug!("skipping {} bytes of unregistered class {class}", end - beg_pos);
            c.set_pos(end)?;
            Object::Opaque { class, bytes: end - beg_pos }
        };

        let obj = Arc::new(obj);
        let key = match byte_count {
            Some(_) => beg + K_MAP_OFFSET,
            None => c.refs().borrow().len() as i64 + 1,
        };
        c.refs().borrow_mut().insert(key, RefEntry::Object(Arc::clone(&obj)));
        Ok(Some(obj))
    }
}
