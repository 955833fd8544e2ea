//! Basket (compressed data block) reading for TTree branches.

use std::sync::Arc;

use crate::cache::Weigh;
use crate::cursor::Cursor;
use crate::error::{Result, RootError};
use crate::key::Key;
use crate::source::ByteSource;

/// Bytes needed to reach `fKeylen`.
const KEYLEN_PREFIX: u64 = 16;

/// The key header of a basket: a TKey followed by the TBasket fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasketHeader {
    /// The TKey part.
    pub key: Key,
    /// `TBasket::fVersion`.
    pub version: u16,
    /// `fBufferSize`.
    pub buffer_size: i32,
    /// `fNevBufSize`: entry-offset slots, or the fixed entry size.
    pub nev_buf_size: i32,
    /// `fNevBuf`: entries in this basket.
    pub nev_buf: i32,
    /// `fLast`: end of the data, measured from the start of the key.
    pub last: i32,
    /// `fFlag`.
    pub flag: u8,
}

impl BasketHeader {
    /// Read the header at the cursor.
    pub fn read(c: &mut Cursor<'_>) -> Result<Self> {
        let key = Key::read(c)?;
        let version = c.u16()?;
        let buffer_size = c.i32()?;
        let nev_buf_size = c.i32()?;
        let nev_buf = c.i32()?;
        let last = c.i32()?;
        let flag = c.u8()?;
        if nev_buf < 0 || last < i32::from(key.key_len) {
            return Err(RootError::format(format!(
                "basket at {}: fNevBuf={nev_buf}, fLast={last}, fKeylen={}",
                key.seek_key, key.key_len
            )));
        }
        Ok(Self { key, version, buffer_size, nev_buf_size, nev_buf, last, flag })
    }

    /// Read the basket header stored at `seek`.
    pub fn read_at(source: &dyn ByteSource, seek: u64) -> Result<Self> {
        let prefix = source.read(seek, seek + KEYLEN_PREFIX)?;
        let key_len = u64::from(u16::from_be_bytes([prefix[14], prefix[15]]));
        if key_len < KEYLEN_PREFIX {
            return Err(RootError::format(format!("basket at {seek}: fKeylen={key_len}")));
        }
        let header = source.read(seek, seek + key_len)?;
        Self::read(&mut Cursor::new(&header, 0))
    }

    /// Length of the entry data in the payload; the offsets trailer follows it.
    pub fn border(&self) -> usize {
        (self.last - i32::from(self.key.key_len)) as usize
    }

    /// Entries stored in the basket.
    pub fn numentries(&self) -> usize {
        self.nev_buf as usize
    }

    /// Read the payload, decompressing it if needed.
    pub fn read_payload(&self, source: &dyn ByteSource) -> Result<Arc<[u8]>> {
        Ok(Arc::from(self.key.payload(source)?.into_owned()))
    }

    /// Split a payload into entry data and the entry offsets, if it carries any.
    ///
    /// The trailer at `border` is a 4-byte count, `fNevBuf` offsets measured
    /// from the start of the key, and a 4-byte sentinel. The returned offsets
    /// are relative to the payload and end with `border`.
    pub fn split<'p>(&self, payload: &'p [u8]) -> Result<(&'p [u8], Option<Vec<i32>>)> {
        let border = self.border();
        let data = payload.get(..border).ok_or_else(|| {
            RootError::format(format!("basket fLast={} past a {}-byte payload", self.last, payload.len()))
        })?;
        if payload.len() <= border {
            return Ok((data, None));
        }

        let mut c = Cursor::new(&payload[border..], 0);
        let _count = c.i32()?;
        let key_len = i32::from(self.key.key_len);
        let mut offsets = Vec::with_capacity(self.numentries() + 1);
        for _ in 0..self.numentries() {
            offsets.push(c.i32()? - key_len);
        }
        offsets.push(self.last - key_len);

        let bad = offsets.windows(2).any(|w| w[1] < w[0])
            || offsets.first().map_or(false, |&o| o < 0);
        if bad {
            return Err(RootError::format(format!(
                "basket at {}: entry offsets are not monotonic",
                self.key.seek_key
            )));
        }
        Ok((data, Some(offsets)))
    }
}

impl Weigh for BasketHeader {
    fn weight(&self) -> usize {
        std::mem::size_of::<Self>() + self.key.class_name.len() + self.key.name.len() + self.key.title.len()
    }
}
