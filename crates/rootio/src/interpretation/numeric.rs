//! Element types and flat numeric arrays.

use std::fmt;
use std::ops::Range;

use crate::cursor::FromBigEndian;
use crate::error::{Result, RootError};

/// Fixed-width element type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dtype {
    /// 1-byte boolean.
    Bool,
    /// Signed 8-bit integer.
    I8,
    /// Unsigned 8-bit integer.
    U8,
    /// Signed 16-bit integer.
    I16,
    /// Unsigned 16-bit integer.
    U16,
    /// Signed 32-bit integer.
    I32,
    /// Unsigned 32-bit integer.
    U32,
    /// Signed 64-bit integer.
    I64,
    /// Unsigned 64-bit integer.
    U64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
}

impl Dtype {
    /// Encoded width in bytes.
    pub fn itemsize(self) -> usize {
        match self {
            Dtype::Bool | Dtype::I8 | Dtype::U8 => 1,
            Dtype::I16 | Dtype::U16 => 2,
            Dtype::I32 | Dtype::U32 | Dtype::F32 => 4,
            Dtype::I64 | Dtype::U64 | Dtype::F64 => 8,
        }
    }

    /// Type for a basic streamer type code (`kChar` .. `kBool`).
    ///
    /// `kDouble32`, `kFloat16` and `kCharStar` have no fixed-width
    /// representation and return `None`.
    pub fn from_type_code(code: i32) -> Option<Dtype> {
        use crate::streamer::codes::*;
        match code {
            K_CHAR => Some(Dtype::I8),
            K_SHORT => Some(Dtype::I16),
            K_INT | K_COUNTER => Some(Dtype::I32),
            K_LONG | K_LONG64 => Some(Dtype::I64),
            K_FLOAT => Some(Dtype::F32),
            K_DOUBLE => Some(Dtype::F64),
            K_UCHAR => Some(Dtype::U8),
            K_USHORT => Some(Dtype::U16),
            K_UINT | K_BITS => Some(Dtype::U32),
            K_ULONG | K_ULONG64 => Some(Dtype::U64),
            K_BOOL => Some(Dtype::Bool),
            _ => None,
        }
    }

    /// Type for a C++/ROOT type name such as `float`, `Int_t` or `unsigned int`.
    pub fn from_type_name(name: &str) -> Option<Dtype> {
        let dtype = match name.trim() {
            "bool" | "Bool_t" => Dtype::Bool,
            "char" | "Char_t" | "signed char" | "int8_t" => Dtype::I8,
            "unsigned char" | "UChar_t" | "uint8_t" | "Byte_t" => Dtype::U8,
            "short" | "Short_t" | "int16_t" => Dtype::I16,
            "unsigned short" | "UShort_t" | "uint16_t" => Dtype::U16,
            "int" | "Int_t" | "int32_t" => Dtype::I32,
            "unsigned int" | "UInt_t" | "uint32_t" => Dtype::U32,
            "long" | "Long_t" | "long long" | "Long64_t" | "int64_t" => Dtype::I64,
            "unsigned long" | "ULong_t" | "unsigned long long" | "ULong64_t" | "uint64_t" => {
                Dtype::U64
            }
            "float" | "Float_t" => Dtype::F32,
            "double" | "Double_t" => Dtype::F64,
            _ => return None,
        };
        Some(dtype)
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Dtype::Bool => "bool",
            Dtype::I8 => "i8",
            Dtype::U8 => "u8",
            Dtype::I16 => "i16",
            Dtype::U16 => "u16",
            Dtype::I32 => "i32",
            Dtype::U32 => "u32",
            Dtype::I64 => "i64",
            Dtype::U64 => "u64",
            Dtype::F32 => "f32",
            Dtype::F64 => "f64",
        };
        f.write_str(s)
    }
}

/// Flat, native-endian numeric column.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum NumericArray {
    Bool(Vec<bool>),
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    I64(Vec<i64>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! each_variant {
    ($value:expr, $v:ident => $body:expr) => {
        match $value {
            NumericArray::Bool($v) => $body,
            NumericArray::I8($v) => $body,
            NumericArray::U8($v) => $body,
            NumericArray::I16($v) => $body,
            NumericArray::U16($v) => $body,
            NumericArray::I32($v) => $body,
            NumericArray::U32($v) => $body,
            NumericArray::I64($v) => $body,
            NumericArray::U64($v) => $body,
            NumericArray::F32($v) => $body,
            NumericArray::F64($v) => $body,
        }
    };
}

macro_rules! each_variant_map {
    ($value:expr, $v:ident => $body:expr) => {
        match $value {
            NumericArray::Bool($v) => NumericArray::Bool($body),
            NumericArray::I8($v) => NumericArray::I8($body),
            NumericArray::U8($v) => NumericArray::U8($body),
            NumericArray::I16($v) => NumericArray::I16($body),
            NumericArray::U16($v) => NumericArray::U16($body),
            NumericArray::I32($v) => NumericArray::I32($body),
            NumericArray::U32($v) => NumericArray::U32($body),
            NumericArray::I64($v) => NumericArray::I64($body),
            NumericArray::U64($v) => NumericArray::U64($body),
            NumericArray::F32($v) => NumericArray::F32($body),
            NumericArray::F64($v) => NumericArray::F64($body),
        }
    };
}

macro_rules! pairwise {
    ($a:expr, $b:expr, ($x:ident, $y:ident) => $body:expr, _ => $fallback:expr) => {
        match ($a, $b) {
            (NumericArray::Bool($x), NumericArray::Bool($y)) => $body,
            (NumericArray::I8($x), NumericArray::I8($y)) => $body,
            (NumericArray::U8($x), NumericArray::U8($y)) => $body,
            (NumericArray::I16($x), NumericArray::I16($y)) => $body,
            (NumericArray::U16($x), NumericArray::U16($y)) => $body,
            (NumericArray::I32($x), NumericArray::I32($y)) => $body,
            (NumericArray::U32($x), NumericArray::U32($y)) => $body,
            (NumericArray::I64($x), NumericArray::I64($y)) => $body,
            (NumericArray::U64($x), NumericArray::U64($y)) => $body,
            (NumericArray::F32($x), NumericArray::F32($y)) => $body,
            (NumericArray::F64($x), NumericArray::F64($y)) => $body,
            _ => $fallback,
        }
    };
}

macro_rules! accessor {
    ($name:ident, $variant:ident, $t:ty) => {
        #[doc = concat!("Values as `&[", stringify!($t), "]` if the dtype matches.")]
        pub fn $name(&self) -> Option<&[$t]> {
            match self {
                NumericArray::$variant(v) => Some(v),
                _ => None,
            }
        }
    };
}

fn decode<T: FromBigEndian>(bytes: &[u8]) -> Vec<T> {
    bytes.chunks_exact(T::SIZE).map(T::from_be_slice).collect()
}

impl NumericArray {
    /// `n` zero values.
    pub fn zeros(dtype: Dtype, n: usize) -> Self {
        match dtype {
            Dtype::Bool => NumericArray::Bool(vec![false; n]),
            Dtype::I8 => NumericArray::I8(vec![0; n]),
            Dtype::U8 => NumericArray::U8(vec![0; n]),
            Dtype::I16 => NumericArray::I16(vec![0; n]),
            Dtype::U16 => NumericArray::U16(vec![0; n]),
            Dtype::I32 => NumericArray::I32(vec![0; n]),
            Dtype::U32 => NumericArray::U32(vec![0; n]),
            Dtype::I64 => NumericArray::I64(vec![0; n]),
            Dtype::U64 => NumericArray::U64(vec![0; n]),
            Dtype::F32 => NumericArray::F32(vec![0.0; n]),
            Dtype::F64 => NumericArray::F64(vec![0.0; n]),
        }
    }

    /// Decode big-endian on-disk bytes; the length must be a multiple of the item size.
    pub fn from_be_bytes(dtype: Dtype, bytes: &[u8]) -> Result<Self> {
        if bytes.len() % dtype.itemsize() != 0 {
            return Err(RootError::format(format!(
                "{} bytes is not a whole number of {dtype} items",
                bytes.len()
            )));
        }
        Ok(match dtype {
            Dtype::Bool => NumericArray::Bool(bytes.iter().map(|&b| b != 0).collect()),
            Dtype::I8 => NumericArray::I8(decode(bytes)),
            Dtype::U8 => NumericArray::U8(bytes.to_vec()),
            Dtype::I16 => NumericArray::I16(decode(bytes)),
            Dtype::U16 => NumericArray::U16(decode(bytes)),
            Dtype::I32 => NumericArray::I32(decode(bytes)),
            Dtype::U32 => NumericArray::U32(decode(bytes)),
            Dtype::I64 => NumericArray::I64(decode(bytes)),
            Dtype::U64 => NumericArray::U64(decode(bytes)),
            Dtype::F32 => NumericArray::F32(decode(bytes)),
            Dtype::F64 => NumericArray::F64(decode(bytes)),
        })
    }

    /// Element type.
    pub fn dtype(&self) -> Dtype {
        match self {
            NumericArray::Bool(_) => Dtype::Bool,
            NumericArray::I8(_) => Dtype::I8,
            NumericArray::U8(_) => Dtype::U8,
            NumericArray::I16(_) => Dtype::I16,
            NumericArray::U16(_) => Dtype::U16,
            NumericArray::I32(_) => Dtype::I32,
            NumericArray::U32(_) => Dtype::U32,
            NumericArray::I64(_) => Dtype::I64,
            NumericArray::U64(_) => Dtype::U64,
            NumericArray::F32(_) => Dtype::F32,
            NumericArray::F64(_) => Dtype::F64,
        }
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        each_variant!(self, v => v.len())
    }

    /// Whether there are no items.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// In-memory size of the values.
    pub fn nbytes(&self) -> usize {
        self.len() * self.dtype().itemsize()
    }

    /// Copy of the items in `range`.
    pub fn slice(&self, range: Range<usize>) -> NumericArray {
        each_variant_map!(self, v => v[range].to_vec())
    }

    /// Write `src` over `self[at..at + src.len()]`.
    pub fn copy_into(&mut self, at: usize, src: &NumericArray) -> Result<()> {
        let (dst_len, n) = (self.len(), src.len());
        if at + n > dst_len {
            return Err(RootError::format(format!(
                "fill of {n} items at {at} overruns destination of {dst_len}"
            )));
        }
        let (dst_dtype, src_dtype) = (self.dtype(), src.dtype());
        pairwise!(self, src, (d, s) => {
            d[at..at + n].copy_from_slice(s);
            Ok(())
        }, _ => Err(RootError::IncompatibleInterpretation(format!(
            "cannot fill {dst_dtype} destination from {src_dtype} source"
        ))))
    }

    /// Append all items of `other`.
    pub fn extend_from(&mut self, other: &NumericArray) -> Result<()> {
        let (a, b) = (self.dtype(), other.dtype());
        pairwise!(self, other, (d, s) => {
            d.extend_from_slice(s);
            Ok(())
        }, _ => Err(RootError::IncompatibleInterpretation(format!("cannot append {b} to {a}"))))
    }

    /// Item `i` converted to `f64`.
    pub fn get_f64(&self, i: usize) -> Option<f64> {
        match self {
            NumericArray::Bool(v) => v.get(i).map(|&b| if b { 1.0 } else { 0.0 }),
            NumericArray::I8(v) => v.get(i).map(|&x| x as f64),
            NumericArray::U8(v) => v.get(i).map(|&x| x as f64),
            NumericArray::I16(v) => v.get(i).map(|&x| x as f64),
            NumericArray::U16(v) => v.get(i).map(|&x| x as f64),
            NumericArray::I32(v) => v.get(i).map(|&x| x as f64),
            NumericArray::U32(v) => v.get(i).map(|&x| x as f64),
            NumericArray::I64(v) => v.get(i).map(|&x| x as f64),
            NumericArray::U64(v) => v.get(i).map(|&x| x as f64),
            NumericArray::F32(v) => v.get(i).map(|&x| x as f64),
            NumericArray::F64(v) => v.get(i).copied(),
        }
    }

    /// All items converted to `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        (0..self.len()).filter_map(|i| self.get_f64(i)).collect()
    }

    accessor!(as_bool, Bool, bool);
    accessor!(as_i8, I8, i8);
    accessor!(as_u8, U8, u8);
    accessor!(as_i16, I16, i16);
    accessor!(as_u16, U16, u16);
    accessor!(as_i32, I32, i32);
    accessor!(as_u32, U32, u32);
    accessor!(as_i64, I64, i64);
    accessor!(as_u64, U64, u64);
    accessor!(as_f32, F32, f32);
    accessor!(as_f64, F64, f64);
}
