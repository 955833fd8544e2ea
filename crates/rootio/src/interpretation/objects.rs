//! Generic decoding of STL containers into [`Value`]s.
//!
//! Used for layouts that do not flatten into one numeric column, such as
//! `vector<vector<float>>` and `vector<string>`. Only the outermost container
//! carries a byte-count/version header; nested members are streamed bare.

use crate::array::Value;
use crate::cursor::Cursor;
use crate::error::{Result, RootError};
use crate::interpretation::Dtype;
use crate::streamer::StlType;

/// Per-entry layout of an object branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectLayout {
    /// Type of one entry.
    pub element: StlType,
    /// Header bytes before each entry (6 for a byte count + version).
    pub header_bytes: usize,
}

impl ObjectLayout {
    /// Layout of a top-level STL container branch.
    pub fn stl(element: StlType) -> Self {
        Self { element, header_bytes: 6 }
    }

    /// Decode one entry given exactly its bytes.
    pub(crate) fn decode_entry(&self, bytes: &[u8]) -> Result<Value> {
        let mut c = Cursor::new(bytes, 0);
        c.skip(self.header_bytes)?;
        read_value(&mut c, &self.element)
    }

    /// Decode the entry at the cursor when no offsets are available.
    pub(crate) fn read_next(&self, c: &mut Cursor<'_>) -> Result<Value> {
        if self.header_bytes > 0 {
            c.read_version()?;
        }
        read_value(c, &self.element)
    }
}

fn read_scalar(c: &mut Cursor<'_>, dtype: Dtype) -> Result<Value> {
    Ok(match dtype {
        Dtype::Bool => Value::Bool(c.u8()? != 0),
        Dtype::I8 => Value::Int(i64::from(c.i8()?)),
        Dtype::U8 => Value::UInt(u64::from(c.u8()?)),
        Dtype::I16 => Value::Int(i64::from(c.i16()?)),
        Dtype::U16 => Value::UInt(u64::from(c.u16()?)),
        Dtype::I32 => Value::Int(i64::from(c.i32()?)),
        Dtype::U32 => Value::UInt(u64::from(c.u32()?)),
        Dtype::I64 => Value::Int(c.i64()?),
        Dtype::U64 => Value::UInt(c.u64()?),
        Dtype::F32 => Value::Float(f64::from(c.f32()?)),
        Dtype::F64 => Value::Float(c.f64()?),
    })
}

/// Read one value of type `ty`.
pub(crate) fn read_value(c: &mut Cursor<'_>, ty: &StlType) -> Result<Value> {
    match ty {
        StlType::Basic(dtype) => read_scalar(c, *dtype),
        StlType::String => Ok(Value::Str(c.string()?)),
        StlType::Vector(inner) => {
            let n = c.i32()?;
            if n < 0 {
                return Err(RootError::format(format!("negative vector size {n} at {}", c.pos())));
            }
            let mut items = Vec::with_capacity((n as usize).min(c.remaining()));
            for _ in 0..n {
                items.push(read_value(c, inner)?);
            }
            Ok(Value::List(items))
        }
        StlType::Object(name) => Err(RootError::Unimplemented(format!("STL element of class {name}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested_entry(rows: &[&[f32]]) -> Vec<u8> {
        let mut body = 9u16.to_be_bytes().to_vec();
        body.extend_from_slice(&(rows.len() as i32).to_be_bytes());
        for row in rows {
            body.extend_from_slice(&(row.len() as i32).to_be_bytes());
            for x in *row {
                body.extend_from_slice(&x.to_be_bytes());
            }
        }
        let mut out = ((body.len() as u32) | 0x4000_0000).to_be_bytes().to_vec();
        out.extend(body);
        out
    }

    #[test]
    fn vector_of_vectors() {
        let layout = ObjectLayout::stl(StlType::parse("vector<vector<float> >"));
        let entry = nested_entry(&[&[1.0, 2.0], &[], &[3.5]]);
        let value = layout.decode_entry(&entry).unwrap();
        assert_eq!(
            value,
            Value::List(vec![
                Value::List(vec![Value::Float(1.0), Value::Float(2.0)]),
                Value::List(vec![]),
                Value::List(vec![Value::Float(3.5)]),
            ])
        );
        let mut c = Cursor::new(&entry, 0);
        assert_eq!(layout.read_next(&mut c).unwrap(), value);
        assert_eq!(c.remaining(), 0);
    }

    #[test]
    fn vector_of_strings() {
        let layout = ObjectLayout::stl(StlType::parse("vector<string>"));
        let mut entry = vec![0x40, 0, 0, 13, 0, 6, 0, 0, 0, 2, 2, b'a', b'b', 3];
        entry.extend_from_slice(b"cde");
        let value = layout.decode_entry(&entry).unwrap();
        assert_eq!(value, Value::List(vec![Value::Str("ab".into()), Value::Str("cde".into())]));
    }

    #[test]
    fn class_elements_are_unimplemented() {
        let layout = ObjectLayout::stl(StlType::parse("vector<TVector3>"));
        let entry = [0x40, 0, 0, 6, 0, 6, 0, 0, 0, 1];
        assert!(matches!(layout.decode_entry(&entry), Err(RootError::Unimplemented(_))));
    }
}
