use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::events::ShortMessage;

pub const META_END_OF_TRACK: u8 = 0x2f;
pub const META_SET_TEMPO: u8 = 0x51;

pub const DEFAULT_OFF_VELOCITY: u8 = 0x40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(pub u64);

/// Hands out event ids. Clones share the counter, so a Song and its copies
/// never reuse an id.
#[derive(Debug, Clone)]
pub struct EventIds {
    next: Arc<AtomicU64>,
}

impl EventIds {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: Arc::new(AtomicU64::new(first)),
        }
    }

    pub fn next(&self) -> EventId {
        EventId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for EventIds {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    NoteOff,
    NoteOn,
    NotePressure,
    ControlChange,
    ProgramChange,
    ChannelPressure,
    PitchWheel,
    SysexStart,
    SysexEnd,
    Meta,
}

impl Opcode {
    /// Maps a status byte to its opcode, ignoring channel bits.
    /// System common and realtime statuses other than sysex/meta have no opcode.
    pub fn from_status(status: u8) -> Option<Self> {
        match status & 0xf0 {
            0x80 => Some(Opcode::NoteOff),
            0x90 => Some(Opcode::NoteOn),
            0xa0 => Some(Opcode::NotePressure),
            0xb0 => Some(Opcode::ControlChange),
            0xc0 => Some(Opcode::ProgramChange),
            0xd0 => Some(Opcode::ChannelPressure),
            0xe0 => Some(Opcode::PitchWheel),
            _ => match status {
                0xf0 => Some(Opcode::SysexStart),
                0xf7 => Some(Opcode::SysexEnd),
                0xff => Some(Opcode::Meta),
                _ => None,
            },
        }
    }

    /// Status byte with the channel bits cleared.
    pub fn status(self) -> u8 {
        match self {
            Opcode::NoteOff => 0x80,
            Opcode::NoteOn => 0x90,
            Opcode::NotePressure => 0xa0,
            Opcode::ControlChange => 0xb0,
            Opcode::ProgramChange => 0xc0,
            Opcode::ChannelPressure => 0xd0,
            Opcode::PitchWheel => 0xe0,
            Opcode::SysexStart => 0xf0,
            Opcode::SysexEnd => 0xf7,
            Opcode::Meta => 0xff,
        }
    }

    pub fn is_channel(self) -> bool {
        !matches!(self, Opcode::SysexStart | Opcode::SysexEnd | Opcode::Meta)
    }

    pub fn is_note(self) -> bool {
        matches!(self, Opcode::NoteOn | Opcode::NoteOff)
    }

    /// Number of data bytes following the status of a channel message.
    pub fn data_len(self) -> usize {
        match self {
            Opcode::ProgramChange | Opcode::ChannelPressure => 1,
            Opcode::SysexStart | Opcode::SysexEnd | Opcode::Meta => 0,
            _ => 2,
        }
    }
}

/// Present on note-ons while the Song is combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteRelease {
    pub duration: u64,
    pub off_velocity: u8,
}

impl Default for NoteRelease {
    fn default() -> Self {
        Self {
            duration: 0,
            off_velocity: DEFAULT_OFF_VELOCITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongEvent {
    pub id: EventId,
    /// Absolute ticks from the start of the song.
    pub time: u64,
    pub track: u16,
    pub channel: Option<u8>,
    pub opcode: Opcode,
    /// First data byte, or the meta type.
    pub a: u8,
    pub b: u8,
    pub payload: Option<Vec<u8>>,
    pub release: Option<NoteRelease>,
}

impl SongEvent {
    pub fn new(id: EventId, time: u64, opcode: Opcode) -> Self {
        Self {
            id,
            time,
            track: 0,
            channel: opcode.is_channel().then_some(0),
            opcode,
            a: 0,
            b: 0,
            payload: None,
            release: None,
        }
    }

    pub fn meta(id: EventId, time: u64, track: u16, kind: u8, payload: Vec<u8>) -> Self {
        Self {
            track,
            a: kind,
            payload: Some(payload),
            ..Self::new(id, time, Opcode::Meta)
        }
    }

    pub fn is_meta(&self, kind: u8) -> bool {
        self.opcode == Opcode::Meta && self.a == kind
    }

    pub fn is_end_of_track(&self) -> bool {
        self.is_meta(META_END_OF_TRACK)
    }

    pub fn duration(&self) -> u64 {
        self.release.map_or(0, |r| r.duration)
    }

    pub fn set_time(&mut self, time: i64) {
        self.time = time.max(0) as u64;
    }

    pub fn set_a(&mut self, value: i32) {
        self.a = value.clamp(0, 0x7f) as u8;
    }

    pub fn set_b(&mut self, value: i32) {
        self.b = value.clamp(0, 0x7f) as u8;
    }

    /// No effect on channel-less events.
    pub fn set_channel(&mut self, channel: i32) {
        if self.channel.is_some() {
            self.channel = Some(channel.clamp(0, 0x0f) as u8);
        }
    }

    /// No effect unless the event carries combined note fields.
    pub fn set_duration(&mut self, duration: i64) {
        if let Some(release) = self.release.as_mut() {
            release.duration = duration.max(0) as u64;
        }
    }

    pub fn set_off_velocity(&mut self, velocity: i32) {
        if let Some(release) = self.release.as_mut() {
            release.off_velocity = velocity.clamp(0, 0x7f) as u8;
        }
    }

    /// Wire form for live output. Meta and sysex events never travel the bus.
    pub fn playback_message(&self) -> Option<ShortMessage> {
        if !self.opcode.is_channel() {
            return None;
        }
        let status = self.opcode.status() | (self.channel.unwrap_or(0) & 0x0f);
        match self.opcode.data_len() {
            1 => Some(ShortMessage::two(status, self.a)),
            _ => Some(ShortMessage::three(status, self.a, self.b)),
        }
    }
}
