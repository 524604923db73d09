use tracing::{trace, warn};

use super::{DecodeError, EventIds, Opcode, Song, SongEvent, TrackDecodeError};
use crate::codec::{ByteCursor, LengthPrefix};

const CHUNK_MTHD: &[u8] = b"MThd";
const CHUNK_MTRK: &[u8] = b"MTrk";

struct Header {
    format: u16,
    track_count: u16,
    division: u16,
}

/// Read state for one MTrk while tracks are merged.
struct TrackReader<'a> {
    index: u16,
    src: ByteCursor<'a>,
    /// Ticks until this track's next event; `None` until the delay is read.
    delay: Option<u32>,
    terminated: bool,
    running_status: u8,
}

impl<'a> TrackReader<'a> {
    fn new(index: u16, body: &'a [u8]) -> Self {
        Self {
            index,
            src: ByteCursor::new(body),
            delay: None,
            terminated: false,
            running_status: 0,
        }
    }

    fn abandon(&mut self, error: TrackDecodeError, warnings: &mut Vec<TrackDecodeError>) {
        warn!("{error}, aborting track early");
        warnings.push(error);
        self.terminated = true;
    }

    /// Pending delay, reading it if necessary. `None` once the track ends.
    fn pending_delay(&mut self, warnings: &mut Vec<TrackDecodeError>) -> Option<u32> {
        if self.terminated {
            return None;
        }
        if let Some(delay) = self.delay {
            return Some(delay);
        }
        if self.src.is_empty() {
            self.terminated = true;
            return None;
        }
        let offset = self.src.position();
        match self.src.vlq() {
            Ok(delay) => {
                self.delay = Some(delay);
                Some(delay)
            }
            Err(_) => {
                let track = self.index;
                self.abandon(TrackDecodeError::MalformedDelay { track, offset }, warnings);
                None
            }
        }
    }

    fn read_data(&mut self, pending: &mut Option<u8>) -> Option<u8> {
        if let Some(byte) = pending.take() {
            return Some(byte);
        }
        match self.src.u8() {
            Ok(byte) if byte & 0x80 == 0 => Some(byte),
            _ => None,
        }
    }

    fn read_event(
        &mut self,
        time: u64,
        ids: &EventIds,
        warnings: &mut Vec<TrackDecodeError>,
    ) -> Option<SongEvent> {
        self.delay = None;
        let track = self.index;
        let offset = self.src.position();
        let Ok(lead) = self.src.u8() else {
            self.terminated = true;
            return None;
        };

        let mut pending_data = None;
        let status = if lead & 0x80 != 0 {
            self.running_status = lead;
            lead
        } else if self.running_status != 0 {
            pending_data = Some(lead);
            self.running_status
        } else {
            self.abandon(TrackDecodeError::MissingStatus { track, offset }, warnings);
            return None;
        };

        let Some(opcode) = Opcode::from_status(status) else {
            self.abandon(
                TrackDecodeError::UnsupportedStatus {
                    track,
                    offset,
                    status,
                },
                warnings,
            );
            return None;
        };

        let mut a = 0;
        let mut b = 0;
        let mut payload = None;
        match opcode {
            Opcode::Meta | Opcode::SysexStart | Opcode::SysexEnd => {
                self.running_status = 0;
                if opcode == Opcode::Meta {
                    let Ok(kind) = self.src.u8() else {
                        self.abandon(TrackDecodeError::MissingMetaType { track, offset }, warnings);
                        return None;
                    };
                    a = kind;
                }
                let Ok(body) = self.src.length_prefixed(LengthPrefix::Vlq) else {
                    self.abandon(TrackDecodeError::TruncatedPayload { track, offset }, warnings);
                    return None;
                };
                payload = Some(body.to_vec());
            }
            _ => {
                let Some(first) = self.read_data(&mut pending_data) else {
                    self.abandon(TrackDecodeError::MissingData { track, offset }, warnings);
                    return None;
                };
                a = first;
                if opcode.data_len() == 2 {
                    let Some(second) = self.read_data(&mut pending_data) else {
                        self.abandon(TrackDecodeError::MissingData { track, offset }, warnings);
                        return None;
                    };
                    b = second;
                }
            }
        }

        let mut event = SongEvent::new(ids.next(), time, opcode);
        event.track = track;
        event.channel = opcode.is_channel().then_some(status & 0x0f);
        event.a = a;
        event.b = b;
        event.payload = payload;
        if event.opcode == Opcode::NoteOn && event.b == 0 {
            event.opcode = Opcode::NoteOff;
            event.b = 0x40;
        }
        Some(event)
    }
}

impl Song {
    /// Decodes an SMF file. The result is uncombined.
    ///
    /// Fails only when there is no usable header. A damaged track stops
    /// early and is reported through [`Song::warnings`].
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        Self::decode_with_ids(bytes, EventIds::new())
    }

    pub fn decode_with_ids(bytes: &[u8], ids: EventIds) -> Result<Self, DecodeError> {
        let mut src = ByteCursor::new(bytes);
        let mut header = None;
        let mut tracks = Vec::new();

        while src.remaining() >= 8 {
            let (Ok(chunk_id), Ok(len)) = (src.slice(4), src.u32be()) else {
                break;
            };
            let len = (len as usize).min(src.remaining());
            let Ok(body) = src.slice(len) else {
                break;
            };
            match chunk_id {
                CHUNK_MTHD => {
                    if header.is_some() {
                        return Err(DecodeError::DuplicateHeader);
                    }
                    header = Some(decode_header(body)?);
                }
                CHUNK_MTRK => match u16::try_from(tracks.len()) {
                    Ok(index) => tracks.push(TrackReader::new(index, body)),
                    Err(_) => warn!("ignoring MTrk chunk past track {}", u16::MAX),
                },
                other => trace!("skipping unknown chunk {:02x?}", other),
            }
        }

        let header = header.ok_or(DecodeError::MissingHeader)?;
        let mut song = Song::with_ids(ids);
        song.format = header.format;
        song.declared_track_count = header.track_count;
        song.division = header.division;
        song.merge_tracks(tracks);
        Ok(song)
    }

    /// Runs every track to completion, interleaving their events on one clock.
    /// At equal times, events keep the order of their tracks.
    fn merge_tracks(&mut self, mut tracks: Vec<TrackReader<'_>>) {
        let mut clock: u64 = 0;
        loop {
            let mut step: Option<u32> = None;
            for track in tracks.iter_mut() {
                while let Some(delay) = track.pending_delay(&mut self.warnings) {
                    if delay > 0 {
                        step = Some(step.map_or(delay, |s| s.min(delay)));
                        break;
                    }
                    if let Some(event) = track.read_event(clock, &self.ids, &mut self.warnings) {
                        self.events.push(event);
                    }
                }
            }

            let Some(step) = step else {
                break;
            };
            clock += step as u64;
            for track in tracks.iter_mut().filter(|t| !t.terminated) {
                if let Some(delay) = track.delay.as_mut() {
                    *delay -= step;
                }
            }
        }
    }
}

fn decode_header(body: &[u8]) -> Result<Header, DecodeError> {
    let mut src = ByteCursor::new(body);
    let (Ok(format), Ok(track_count), Ok(division)) = (src.u16be(), src.u16be(), src.u16be())
    else {
        return Err(DecodeError::ShortHeader(body.len()));
    };
    if division == 0 {
        return Err(DecodeError::ZeroDivision);
    }
    if division & 0x8000 != 0 {
        return Err(DecodeError::SmpteDivision(division));
    }
    Ok(Header {
        format,
        track_count,
        division,
    })
}
