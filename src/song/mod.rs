//! # Song
//!
//! Live representation of one Standard MIDI File: a flat list of events in
//! global time order, plus the header fields needed to write it back out.
//!
//! ## Representations
//! After [`Song::decode`] the song is *uncombined*: note-on and note-off are
//! separate events. [`Song::combine`] folds every note-off into its note-on as a
//! [`NoteRelease`], which is what editors and the scheduler prefer.
//! [`Song::encode`] always uncombines first.
//!
//! ## Ordering
//! Events are sorted by `time`. Ties keep insertion order, and the
//! [`TieBreak`] passed to insertions decides where a new event lands among
//! events at the same tick. Editing an event's `time` through
//! [`Song::events_mut`] or [`Song::event_mut`] breaks the order until
//! [`Song::sort_events`] is called.

mod combine;
mod decode;
mod encode;
mod error;
mod event;
pub mod names;
mod undo;

pub use error::{DecodeError, EncodeError, TrackDecodeError};
pub use event::{
    DEFAULT_OFF_VELOCITY, EventId, EventIds, META_END_OF_TRACK, META_SET_TEMPO, NoteRelease,
    Opcode, SongEvent,
};
pub use undo::UndoBuffer;

pub const DEFAULT_TEMPO: u32 = 500_000;
pub const MAX_TEMPO: u32 = 0x00ff_ffff;
pub const MAX_DIVISION: u32 = 0x7fff;

/// Which index to return for an exact time match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TieBreak {
    /// Before every event at that time.
    First,
    /// After every event at that time.
    Last,
    /// Anywhere within the run of equal times.
    Any,
}

#[derive(Debug, Clone)]
pub struct Song {
    pub format: u16,
    /// From MThd. Rewritten from the highest track in use when encoding.
    pub declared_track_count: u16,
    division: u16,
    combined: bool,
    events: Vec<SongEvent>,
    warnings: Vec<TrackDecodeError>,
    ids: EventIds,
}

impl Default for Song {
    fn default() -> Self {
        Self::new()
    }
}

impl Song {
    /// An empty timeline with no division. Not encodable until one is set.
    pub fn new() -> Self {
        Self::with_ids(EventIds::new())
    }

    pub fn with_ids(ids: EventIds) -> Self {
        Self {
            format: 0,
            declared_track_count: 0,
            division: 0,
            combined: false,
            events: Vec::new(),
            warnings: Vec::new(),
            ids,
        }
    }

    /// Format 0, one track holding only its terminator, 24 ticks per quarter.
    pub fn blank() -> Self {
        let mut song = Self::new();
        song.declared_track_count = 1;
        song.division = 24;
        let id = song.ids.next();
        song.events
            .push(SongEvent::meta(id, 0, 0, META_END_OF_TRACK, Vec::new()));
        song
    }

    /// Deep copy sharing nothing mutable except the id allocator.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    pub fn ids(&self) -> &EventIds {
        &self.ids
    }

    pub fn division(&self) -> u16 {
        self.division
    }

    pub fn is_combined(&self) -> bool {
        self.combined
    }

    pub fn events(&self) -> &[SongEvent] {
        &self.events
    }

    /// Field access for editors. Call [`Song::sort_events`] after changing times.
    pub fn events_mut(&mut self) -> &mut [SongEvent] {
        &mut self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Per-track problems found while decoding.
    pub fn warnings(&self) -> &[TrackDecodeError] {
        &self.warnings
    }

    pub fn event(&self, id: EventId) -> Option<&SongEvent> {
        self.events.iter().find(|e| e.id == id)
    }

    pub fn event_mut(&mut self, id: EventId) -> Option<&mut SongEvent> {
        self.events.iter_mut().find(|e| e.id == id)
    }

    pub fn position_of(&self, id: EventId) -> Option<usize> {
        self.events.iter().position(|e| e.id == id)
    }

    pub fn duration_ticks(&self) -> u64 {
        // The last event should be an End of Track after the final release.
        self.events
            .last()
            .map_or(0, |e| e.time + e.duration())
    }

    pub fn duration_qnotes(&self) -> f64 {
        if self.division == 0 {
            return 0.0;
        }
        self.duration_ticks() as f64 / self.division as f64
    }

    /// Highest track index in use, plus one.
    pub fn track_count(&self) -> usize {
        self.events
            .iter()
            .map(|e| e.track as usize + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn first_note_time(&self) -> u64 {
        self.events
            .iter()
            .find(|e| e.opcode == Opcode::NoteOn)
            .map_or(0, |e| e.time)
    }

    /// Stable sort by time.
    pub fn sort_events(&mut self) {
        self.events.sort_by_key(|e| e.time);
    }

    /// Always returns a valid insertion point.
    pub fn search_by_time(&self, time: u64, tie: TieBreak) -> usize {
        match tie {
            TieBreak::First => self.events.partition_point(|e| e.time < time),
            TieBreak::Last => self.events.partition_point(|e| e.time <= time),
            TieBreak::Any => match self.events.binary_search_by_key(&time, |e| e.time) {
                Ok(p) | Err(p) => p,
            },
        }
    }

    /// Inserts a default note-on (channel 0, track 0, note and velocity 0x40)
    /// and returns it for editing. It carries a zero-length release when the
    /// song is combined.
    pub fn create_event(&mut self, time: u64, tie: TieBreak) -> &mut SongEvent {
        let mut event = SongEvent::new(self.ids.next(), time, Opcode::NoteOn);
        event.a = 0x40;
        event.b = 0x40;
        if self.combined {
            event.release = Some(NoteRelease::default());
        }
        let p = self.search_by_time(time, tie);
        self.events.insert(p, event);
        &mut self.events[p]
    }

    /// Inserts `event` and returns its index. Combined fields are adjusted to
    /// the song's mode; a note-off is refused while combined.
    pub fn insert_event(&mut self, mut event: SongEvent, tie: TieBreak) -> Option<usize> {
        if self.combined {
            match event.opcode {
                Opcode::NoteOff => return None,
                Opcode::NoteOn => {
                    event.release.get_or_insert_with(NoteRelease::default);
                }
                _ => event.release = None,
            }
        } else {
            event.release = None;
        }
        let p = self.search_by_time(event.time, tie);
        self.events.insert(p, event);
        Some(p)
    }

    pub fn delete_event_by_id(&mut self, id: EventId) -> bool {
        match self.position_of(id) {
            Some(p) => {
                self.events.remove(p);
                true
            }
            None => false,
        }
    }

    /// Appends a live channel message at `time`, returning its index.
    ///
    /// `channel` overrides the channel bits of the status byte when in range.
    /// System messages, bare data bytes, and note-offs on a combined song are
    /// refused.
    pub fn add_encoded_event_at_time(
        &mut self,
        time: u64,
        message: &[u8],
        track: Option<u16>,
        channel: Option<u8>,
    ) -> Option<usize> {
        let &status = message.first()?;
        if status < 0x80 || status >= 0xf0 {
            return None;
        }
        let opcode = Opcode::from_status(status)?;
        if self.combined && opcode == Opcode::NoteOff {
            return None;
        }
        let mut event = SongEvent::new(self.ids.next(), time, opcode);
        event.track = track.unwrap_or(0);
        event.channel = Some(match channel {
            Some(c) if c < 0x10 => c,
            _ => status & 0x0f,
        });
        event.a = message.get(1).copied().unwrap_or(0) & 0x7f;
        event.b = message.get(2).copied().unwrap_or(0) & 0x7f;
        self.insert_event(event, TieBreak::Last)
    }

    /// Rescales every time and duration to a new division.
    ///
    /// Returns false, changing nothing, for an unloaded song, the current
    /// division, or anything outside `1..=0x7fff`.
    pub fn change_division(&mut self, division: u32) -> bool {
        if self.division == 0 || division < 1 || division > MAX_DIVISION {
            return false;
        }
        if division == self.division as u32 {
            return false;
        }
        let adjust = division as f64 / self.division as f64;
        for event in &mut self.events {
            event.time = (event.time as f64 * adjust).round() as u64;
            if let Some(release) = event.release.as_mut() {
                release.duration = (release.duration as f64 * adjust).round() as u64;
            }
        }
        self.sort_events();
        self.division = division as u16;
        true
    }

    /// Sets the division of a song that has none yet.
    pub fn set_initial_division(&mut self, division: u16) -> bool {
        if self.division != 0 || division == 0 || division as u32 > MAX_DIVISION {
            return false;
        }
        self.division = division;
        true
    }

    /// Microseconds per quarter note from the first usable Set Tempo event, or
    /// 500000. Short or zero payloads are skipped.
    ///
    /// With `full_search`, a second tempo event anywhere in the song makes the
    /// result negative: the song is not single-tempo and the absolute value
    /// is only the first tempo found.
    pub fn tempo(&self, full_search: bool) -> i32 {
        let mut tempos = self
            .events
            .iter()
            .filter(|e| e.is_meta(META_SET_TEMPO))
            .filter_map(|e| match e.payload.as_deref() {
                Some([a, b, c, ..]) => Some(((*a as i32) << 16) | ((*b as i32) << 8) | *c as i32),
                _ => None,
            })
            .filter(|&tempo| tempo > 0);
        let Some(first) = tempos.next() else {
            return DEFAULT_TEMPO as i32;
        };
        if full_search && tempos.next().is_some() {
            return -first;
        }
        first
    }

    /// Rewrites the first Set Tempo event, or adds one at time zero.
    /// Values outside `1..=0xffffff` are ignored.
    pub fn set_tempo(&mut self, tempo: u32) {
        if tempo < 1 || tempo > MAX_TEMPO {
            return;
        }
        let payload = tempo.to_be_bytes()[1..].to_vec();
        if let Some(event) = self.events.iter_mut().find(|e| e.is_meta(META_SET_TEMPO)) {
            event.payload = Some(payload);
            return;
        }
        let event = SongEvent::meta(self.ids.next(), 0, 0, META_SET_TEMPO, payload);
        self.insert_event(event, TieBreak::First);
    }

    /// Real time for a tick count, assuming the single tempo.
    pub fn seconds_from_ticks(&self, ticks: f64) -> f64 {
        if self.division == 0 {
            return 0.0;
        }
        let us_per_qnote = self.tempo(false) as f64;
        (ticks * us_per_qnote) / (self.division as f64 * 1_000_000.0)
    }

    pub fn ticks_from_seconds(&self, seconds: f64) -> f64 {
        let us_per_qnote = self.tempo(false) as f64;
        (seconds * self.division as f64 * 1_000_000.0) / us_per_qnote
    }

    /// Moves every event by `delta` ticks, clamping at zero.
    pub fn shift_times(&mut self, delta: i64) {
        for event in &mut self.events {
            event.time = (event.time as i64).saturating_add(delta).max(0) as u64;
        }
    }

    /// Snaps times, and optionally durations, to the nearest multiple of
    /// `interval`.
    pub fn quantize(&mut self, interval: u64, include_durations: bool) {
        if interval < 1 {
            return;
        }
        let snap = |v: u64| ((v as f64 / interval as f64).round() as u64) * interval;
        for event in &mut self.events {
            event.time = snap(event.time);
            if include_durations {
                if let Some(release) = event.release.as_mut() {
                    release.duration = snap(release.duration);
                }
            }
        }
        self.sort_events();
    }
}
