//! String-per-entry layouts.

use crate::cursor::Cursor;
use crate::error::{Result, RootError};

/// How one string entry is laid out in a basket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StringLayout {
    /// `TLeafC` and `TString`: a ROOT string (1-byte length, or `255` + 4-byte length).
    Leaf,
    /// `std::string`: a 6-byte byte-count/version header, then a ROOT string.
    StdString,
    /// `char*`: a 4-byte length, then the characters.
    CharStar,
}

impl StringLayout {
    /// Bytes before the text of a short string.
    pub fn skip_bytes(self) -> usize {
        match self {
            StringLayout::Leaf => 1,
            StringLayout::StdString => 7,
            StringLayout::CharStar => 4,
        }
    }

    /// Decode one entry given exactly its bytes.
    pub(crate) fn decode_entry(self, bytes: &[u8]) -> Result<String> {
        if bytes.is_empty() {
            return Ok(String::new());
        }
        match self {
            StringLayout::Leaf => Cursor::new(bytes, 0).string(),
            StringLayout::StdString => {
                let mut c = Cursor::new(bytes, 0);
                c.skip(6)?;
                c.string()
            }
            StringLayout::CharStar => {
                let text = bytes.get(4..).ok_or_else(|| {
                    RootError::format(format!("char* entry of {} bytes", bytes.len()))
                })?;
                Ok(text_of(text))
            }
        }
    }

    /// Decode the entry at the cursor when no offsets are available.
    pub(crate) fn read_next(self, c: &mut Cursor<'_>) -> Result<String> {
        match self {
            StringLayout::Leaf => c.string(),
            StringLayout::StdString => {
                c.read_version()?;
                c.string()
            }
            StringLayout::CharStar => {
                let n = c.i32()?;
                if n < 0 {
                    return Err(RootError::format(format!("negative char* length {n}")));
                }
                Ok(text_of(c.bytes(n as usize)?))
            }
        }
    }
}

fn text_of(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}
