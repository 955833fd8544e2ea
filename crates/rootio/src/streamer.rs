//! Streamer type codes and the closed set of on-disk member shapes.
//!
//! A branch's [`StreamerKind`] is decided once, from its streamer element or
//! class name, and drives interpretation from then on.

use crate::interpretation::Dtype;
use crate::objects::{ElementExtra, StreamerElement, StreamerInfos};
use crate::tree::Branch;

/// `TStreamerElement::fType` codes.
pub mod codes {
    #![allow(missing_docs)]

    pub const K_BASE: i32 = 0;
    pub const K_CHAR: i32 = 1;
    pub const K_SHORT: i32 = 2;
    pub const K_INT: i32 = 3;
    pub const K_LONG: i32 = 4;
    pub const K_FLOAT: i32 = 5;
    pub const K_COUNTER: i32 = 6;
    pub const K_CHARSTAR: i32 = 7;
    pub const K_DOUBLE: i32 = 8;
    pub const K_DOUBLE32: i32 = 9;
    pub const K_LEGACY_CHAR: i32 = 10;
    pub const K_UCHAR: i32 = 11;
    pub const K_USHORT: i32 = 12;
    pub const K_UINT: i32 = 13;
    pub const K_ULONG: i32 = 14;
    pub const K_BITS: i32 = 15;
    pub const K_LONG64: i32 = 16;
    pub const K_ULONG64: i32 = 17;
    pub const K_BOOL: i32 = 18;
    pub const K_FLOAT16: i32 = 19;

    /// Fixed-size array of a basic type: `K_OFFSET_L + code`.
    pub const K_OFFSET_L: i32 = 20;
    /// Pointer to a counted array of a basic type: `K_OFFSET_P + code`.
    pub const K_OFFSET_P: i32 = 40;

    pub const K_OBJECT: i32 = 61;
    pub const K_ANY: i32 = 62;
    pub const K_OBJECTP: i32 = 63;
    pub const K_OBJECT_P: i32 = 64;
    pub const K_TSTRING: i32 = 65;
    pub const K_TOBJECT: i32 = 66;
    pub const K_TNAMED: i32 = 67;

    pub const K_STL: i32 = 300;
    pub const K_STLSTRING: i32 = 365;

    /// `fSTLtype` of `std::vector`.
    pub const K_STL_VECTOR: i32 = 1;
}

use codes::*;

/// Element type of an STL container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StlType {
    /// Fixed-width value.
    Basic(Dtype),
    /// `std::string`.
    String,
    /// Nested `std::vector`.
    Vector(Box<StlType>),
    /// Any other class.
    Object(String),
}

fn strip_std(name: &str) -> &str {
    let name = name.trim();
    let name = name.strip_prefix("const ").unwrap_or(name).trim();
    name.strip_prefix("std::").unwrap_or(name)
}

impl StlType {
    /// Parse a C++ type name such as `vector<vector<float> >`.
    pub fn parse(type_name: &str) -> StlType {
        let name = strip_std(type_name);
        if let Some(inner) = vector_inner(name) {
            return StlType::Vector(Box::new(StlType::parse(inner)));
        }
        if name == "string" {
            return StlType::String;
        }
        match Dtype::from_type_name(name) {
            Some(dtype) => StlType::Basic(dtype),
            None => StlType::Object(name.to_string()),
        }
    }

    /// Whether values of this type can be decoded.
    pub fn is_decodable(&self) -> bool {
        match self {
            StlType::Basic(_) | StlType::String => true,
            StlType::Vector(inner) => inner.is_decodable(),
            StlType::Object(_) => false,
        }
    }
}

impl std::fmt::Display for StlType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StlType::Basic(d) => write!(f, "{d}"),
            StlType::String => f.write_str("string"),
            StlType::Vector(inner) => write!(f, "vector<{inner}>"),
            StlType::Object(name) => f.write_str(name),
        }
    }
}

/// Contents of `vector<...>`, if `name` is a vector type.
fn vector_inner(name: &str) -> Option<&str> {
    let rest = strip_std(name).strip_prefix("vector<")?;
    let inner = rest.trim_end().strip_suffix('>')?;
    // Drop an explicit allocator argument at nesting depth 0.
    let mut depth = 0usize;
    for (i, ch) in inner.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return Some(inner[..i].trim()),
            _ => {}
        }
    }
    Some(inner.trim())
}

/// On-disk shape of a branch's member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamerKind {
    /// One fixed-width value.
    Basic(Dtype),
    /// `T x[d0][d1]...`.
    FixedArray {
        /// Element type.
        dtype: Dtype,
        /// Dimensions.
        dims: Vec<usize>,
    },
    /// `T* x //[n]`: counted by another member.
    BasicPointer {
        /// Element type.
        dtype: Dtype,
        /// Counter member name.
        count: String,
    },
    /// `TString`.
    String,
    /// `std::string`.
    StlString,
    /// `char*`.
    CharStar,
    /// `std::vector<T>`.
    StlVector(StlType),
    /// Any other STL container, by type name.
    Stl(String),
    /// Embedded object, by class name.
    Object(String),
    /// Pointer to an object, by class name.
    ObjectPointer(String),
    /// An unclassified type code.
    Other(i32),
}

impl StreamerKind {
    /// Classify one streamer element.
    pub fn from_element(e: &StreamerElement) -> StreamerKind {
        match e.class.as_str() {
            "TStreamerBasicType" => {
                if e.type_code == K_CHARSTAR {
                    return StreamerKind::CharStar;
                }
                match Dtype::from_type_code(e.type_code) {
                    Some(dtype) if e.array_length > 0 => {
                        let mut dims = e.dims();
                        if dims.is_empty() {
                            dims.push(e.array_length as usize);
                        }
                        StreamerKind::FixedArray { dtype, dims }
                    }
                    Some(dtype) => StreamerKind::Basic(dtype),
                    None => StreamerKind::Other(e.type_code),
                }
            }
            "TStreamerBasicPointer" => {
                let count = match &e.extra {
                    ElementExtra::Counted { count_name, .. } => count_name.clone(),
                    _ => String::new(),
                };
                match Dtype::from_type_code(e.type_code - K_OFFSET_P) {
                    Some(dtype) => StreamerKind::BasicPointer { dtype, count },
                    None => StreamerKind::Other(e.type_code),
                }
            }
            "TStreamerString" => StreamerKind::String,
            "TStreamerSTLstring" => StreamerKind::StlString,
            "TStreamerSTL" => {
                let stl_type = match e.extra {
                    ElementExtra::Stl { stl_type, .. } => stl_type,
                    _ => 0,
                };
                if e.type_code == K_STLSTRING || strip_std(&e.type_name) == "string" {
                    StreamerKind::StlString
                } else if stl_type == K_STL_VECTOR || vector_inner(&e.type_name).is_some() {
                    Self::from_class_name(&e.type_name)
                } else {
                    StreamerKind::Stl(e.type_name.clone())
                }
            }
            "TStreamerObject" | "TStreamerObjectAny" | "TStreamerBase" => {
                StreamerKind::Object(e.type_name.clone())
            }
            "TStreamerObjectPointer" | "TStreamerObjectAnyPointer" => {
                StreamerKind::ObjectPointer(e.type_name.trim_end_matches('*').to_string())
            }
            _ => StreamerKind::Other(e.type_code),
        }
    }

    /// Classify a whole-object branch by its class name.
    pub fn from_class_name(class_name: &str) -> StreamerKind {
        let name = strip_std(class_name);
        if vector_inner(name).is_some() {
            if let StlType::Vector(inner) = StlType::parse(name) {
                return StreamerKind::StlVector(*inner);
            }
        }
        match name {
            "string" => StreamerKind::StlString,
            "TString" => StreamerKind::String,
            _ => StreamerKind::Object(name.to_string()),
        }
    }

    /// Shape of `branch`'s data, when it is an element or object branch.
    ///
    /// Split members (`fID >= 0`) are looked up as element `fID` of their
    /// parent class's streamer info; whole objects (`fID == -1`) are
    /// classified by class name.
    pub fn for_branch(branch: &Branch, infos: Option<&StreamerInfos>) -> Option<StreamerKind> {
        let element = branch.element.as_ref()?;
        if element.id < 0 {
            if element.class_name.is_empty() {
                return None;
            }
            return Some(Self::from_class_name(&element.class_name));
        }
        let info = infos?.get(&element.class_name)?;
        let member = info.elements.get(element.id as usize)?;
        Some(Self::from_element(member))
    }
}
