//! Byte-level reading and writing for the SMF container.
//!
//! [`ByteCursor`] reads big/little-endian integers, MIDI variable-length
//! quantities and length-prefixed slices without ever panicking.
//! [`ByteWriter`] mirrors it and adds back-patched length fields, which is how
//! chunk headers get their sizes once the body is known.

mod cursor;
mod writer;

pub use cursor::{ByteCursor, CursorError};
pub use writer::{ByteWriter, FieldWidth, LengthToken, WriterError};

/// Length field formats shared by the cursor and the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthPrefix {
    U8,
    U16Be,
    U32Be,
    U16Le,
    U32Le,
    Vlq,
}

/// Largest value a four-group VLQ can carry.
pub const VLQ_MAX: u32 = 0x0fff_ffff;
