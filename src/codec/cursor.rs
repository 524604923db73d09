use thiserror::Error;

use super::LengthPrefix;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("expected {needed} more bytes at {position}/{len}")]
    UnexpectedEof {
        needed: usize,
        position: usize,
        len: usize,
    },
    #[error("malformed VLQ at {position}")]
    MalformedVarint { position: usize },
}

/// Sequential reader over a borrowed buffer.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn require(&self, needed: usize) -> Result<(), CursorError> {
        if needed > self.remaining() {
            return Err(CursorError::UnexpectedEof {
                needed,
                position: self.pos,
                len: self.data.len(),
            });
        }
        Ok(())
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], CursorError> {
        self.require(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[self.pos..self.pos + N]);
        self.pos += N;
        Ok(out)
    }

    pub fn peek_u8(&self) -> Result<u8, CursorError> {
        self.require(1)?;
        Ok(self.data[self.pos])
    }

    pub fn u8(&mut self) -> Result<u8, CursorError> {
        Ok(self.take::<1>()?[0])
    }

    pub fn i8(&mut self) -> Result<i8, CursorError> {
        Ok(i8::from_be_bytes(self.take()?))
    }

    pub fn u16be(&mut self) -> Result<u16, CursorError> {
        Ok(u16::from_be_bytes(self.take()?))
    }

    pub fn i16be(&mut self) -> Result<i16, CursorError> {
        Ok(i16::from_be_bytes(self.take()?))
    }

    pub fn u32be(&mut self) -> Result<u32, CursorError> {
        Ok(u32::from_be_bytes(self.take()?))
    }

    pub fn i32be(&mut self) -> Result<i32, CursorError> {
        Ok(i32::from_be_bytes(self.take()?))
    }

    pub fn u16le(&mut self) -> Result<u16, CursorError> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    pub fn i16le(&mut self) -> Result<i16, CursorError> {
        Ok(i16::from_le_bytes(self.take()?))
    }

    pub fn u32le(&mut self) -> Result<u32, CursorError> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    pub fn i32le(&mut self) -> Result<i32, CursorError> {
        Ok(i32::from_le_bytes(self.take()?))
    }

    /// Reads a MIDI variable-length quantity.
    ///
    /// On a malformed value the cursor is left where the VLQ started.
    pub fn vlq(&mut self) -> Result<u32, CursorError> {
        let start = self.pos;
        let mut value: u32 = 0;
        for _ in 0..4 {
            let byte = match self.u8() {
                Ok(byte) => byte,
                Err(e) => {
                    self.pos = start;
                    return Err(e);
                }
            };
            value = (value << 7) | (byte & 0x7f) as u32;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        self.pos = start;
        Err(CursorError::MalformedVarint { position: start })
    }

    /// Zero-copy view of the next `len` bytes.
    pub fn slice(&mut self, len: usize) -> Result<&'a [u8], CursorError> {
        self.require(len)?;
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    /// Owned copy of the next `len` bytes.
    pub fn bytes(&mut self, len: usize) -> Result<Vec<u8>, CursorError> {
        self.slice(len).map(<[u8]>::to_vec)
    }

    pub fn length_prefixed(&mut self, prefix: LengthPrefix) -> Result<&'a [u8], CursorError> {
        let start = self.pos;
        let len = match prefix {
            LengthPrefix::U8 => self.u8()? as usize,
            LengthPrefix::U16Be => self.u16be()? as usize,
            LengthPrefix::U32Be => self.u32be()? as usize,
            LengthPrefix::U16Le => self.u16le()? as usize,
            LengthPrefix::U32Le => self.u32le()? as usize,
            LengthPrefix::Vlq => self.vlq()? as usize,
        };
        if len > self.remaining() {
            let needed = len;
            let position = self.pos;
            self.pos = start;
            return Err(CursorError::UnexpectedEof {
                needed,
                position,
                len: self.data.len(),
            });
        }
        self.slice(len)
    }
}
