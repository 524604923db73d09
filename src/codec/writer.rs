use thiserror::Error;

use super::{LengthPrefix, VLQ_MAX};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WriterError {
    #[error("value {0} does not fit in a VLQ")]
    VlqOverflow(u64),
    #[error("length {len} exceeds the field maximum {max}")]
    LengthOverflow { len: usize, max: u64 },
}

/// Fixed-width length fields that can be reserved and patched later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWidth {
    U8,
    U16Be,
    U32Be,
    U16Le,
    U32Le,
}

impl FieldWidth {
    fn size(self) -> usize {
        match self {
            FieldWidth::U8 => 1,
            FieldWidth::U16Be | FieldWidth::U16Le => 2,
            FieldWidth::U32Be | FieldWidth::U32Le => 4,
        }
    }

    fn max(self) -> u64 {
        match self {
            FieldWidth::U8 => u8::MAX as u64,
            FieldWidth::U16Be | FieldWidth::U16Le => u16::MAX as u64,
            FieldWidth::U32Be | FieldWidth::U32Le => u32::MAX as u64,
        }
    }

    fn encode(self, len: usize, out: &mut [u8]) -> Result<(), WriterError> {
        let max = self.max();
        if len as u64 > max {
            return Err(WriterError::LengthOverflow { len, max });
        }
        match self {
            FieldWidth::U8 => out[0] = len as u8,
            FieldWidth::U16Be => out.copy_from_slice(&(len as u16).to_be_bytes()),
            FieldWidth::U16Le => out.copy_from_slice(&(len as u16).to_le_bytes()),
            FieldWidth::U32Be => out.copy_from_slice(&(len as u32).to_be_bytes()),
            FieldWidth::U32Le => out.copy_from_slice(&(len as u32).to_le_bytes()),
        }
        Ok(())
    }
}

/// Placeholder for a length field written before its body.
///
/// `position` is the first byte after the placeholder, ie where the measured
/// extent starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthToken {
    pub position: usize,
    width: FieldWidth,
}

#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(256),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn u16be(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn u32be(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn u16le(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u32le(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn vlq(&mut self, v: u32) -> Result<(), WriterError> {
        if v > VLQ_MAX {
            return Err(WriterError::VlqOverflow(v as u64));
        }
        let mut groups = [0u8; 4];
        let mut n = 0;
        let mut rest = v;
        loop {
            groups[n] = (rest & 0x7f) as u8;
            n += 1;
            rest >>= 7;
            if rest == 0 {
                break;
            }
        }
        for i in (0..n).rev() {
            let continuation = if i > 0 { 0x80 } else { 0x00 };
            self.buf.push(groups[i] | continuation);
        }
        Ok(())
    }

    /// Writes `bytes` preceded by its length.
    pub fn length_prefixed(&mut self, prefix: LengthPrefix, bytes: &[u8]) -> Result<(), WriterError> {
        let width = match prefix {
            LengthPrefix::U8 => FieldWidth::U8,
            LengthPrefix::U16Be => FieldWidth::U16Be,
            LengthPrefix::U32Be => FieldWidth::U32Be,
            LengthPrefix::U16Le => FieldWidth::U16Le,
            LengthPrefix::U32Le => FieldWidth::U32Le,
            LengthPrefix::Vlq => {
                let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
                self.vlq(len).map_err(|_| WriterError::LengthOverflow {
                    len: bytes.len(),
                    max: VLQ_MAX as u64,
                })?;
                self.raw(bytes);
                return Ok(());
            }
        };
        let mut field = [0u8; 4];
        width.encode(bytes.len(), &mut field[..width.size()])?;
        self.raw(&field[..width.size()]);
        self.raw(bytes);
        Ok(())
    }

    /// Writes a zeroed length field to be filled by [`ByteWriter::commit_length`].
    pub fn reserve_length(&mut self, width: FieldWidth) -> LengthToken {
        self.buf.resize(self.buf.len() + width.size(), 0);
        LengthToken {
            position: self.buf.len(),
            width,
        }
    }

    /// Stores `len() - token.position` in the reserved field.
    pub fn commit_length(&mut self, token: LengthToken) -> Result<(), WriterError> {
        let len = self.buf.len() - token.position;
        let field = token.position - token.width.size()..token.position;
        token.width.encode(len, &mut self.buf[field])
    }
}
