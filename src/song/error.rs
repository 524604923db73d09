use thiserror::Error;

use crate::codec::WriterError;

/// Conditions that leave no usable song.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("no MThd chunk")]
    MissingHeader,
    #[error("multiple MThd chunks")]
    DuplicateHeader,
    #[error("MThd body is {0} bytes, expected at least 6")]
    ShortHeader(usize),
    #[error("illegal division zero")]
    ZeroDivision,
    #[error("SMPTE division {0:#06x} is not supported")]
    SmpteDivision(u16),
}

/// A problem that ended one track early. The rest of the song is intact.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackDecodeError {
    #[error("track {track} at {offset}: malformed delay")]
    MalformedDelay { track: u16, offset: usize },
    #[error("track {track} at {offset}: missing status byte")]
    MissingStatus { track: u16, offset: usize },
    #[error("track {track} at {offset}: missing data bytes")]
    MissingData { track: u16, offset: usize },
    #[error("track {track} at {offset}: missing meta type")]
    MissingMetaType { track: u16, offset: usize },
    #[error("track {track} at {offset}: truncated meta or sysex payload")]
    TruncatedPayload { track: u16, offset: usize },
    #[error("track {track} at {offset}: unsupported status {status:#04x}")]
    UnsupportedStatus {
        track: u16,
        offset: usize,
        status: u8,
    },
}

impl TrackDecodeError {
    pub fn track(&self) -> u16 {
        match self {
            TrackDecodeError::MalformedDelay { track, .. }
            | TrackDecodeError::MissingStatus { track, .. }
            | TrackDecodeError::MissingData { track, .. }
            | TrackDecodeError::MissingMetaType { track, .. }
            | TrackDecodeError::TruncatedPayload { track, .. }
            | TrackDecodeError::UnsupportedStatus { track, .. } => *track,
        }
    }
}

/// The in-memory song holds something that can't be serialized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("event {id} has a channel opcode but no valid channel")]
    MissingChannel { id: u64 },
    #[error("event {id} has a data byte above 0x7f")]
    DataOutOfRange { id: u64 },
    #[error("event {id} is earlier than the event before it on its track")]
    Unsorted { id: u64 },
    #[error(transparent)]
    Writer(#[from] WriterError),
}
