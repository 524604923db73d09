use std::collections::BTreeMap;

use tracing::warn;

use super::{EncodeError, META_END_OF_TRACK, Opcode, Song, SongEvent, TieBreak};
use crate::codec::{ByteWriter, FieldWidth, LengthPrefix, VLQ_MAX, WriterError};

/// Position of an event in the time-zero setup order for its channel.
fn time_zero_rank(event: &SongEvent) -> u8 {
    match event.opcode {
        Opcode::ControlChange if event.a == 0x00 || event.a == 0x20 => 1,
        Opcode::ProgramChange => 2,
        Opcode::ControlChange => 3,
        _ => 4,
    }
}

impl Song {
    /// Serializes to SMF bytes.
    ///
    /// Uncombines and repairs the song in place first, so the Song is left
    /// uncombined with well-formed terminators.
    pub fn encode(&mut self) -> Result<Vec<u8>, EncodeError> {
        self.uncombine();
        self.sanitize_terminators();
        self.sanitize_time_zero();

        let mut out = ByteWriter::new();
        out.raw(b"MThd");
        let header = out.reserve_length(FieldWidth::U32Be);
        out.u16be(self.format);
        out.u16be(self.declared_track_count);
        out.u16be(self.division);
        out.commit_length(header)?;

        for track in 0..=u16::MAX {
            if !self.encode_track(&mut out, track)? {
                break;
            }
        }
        Ok(out.finish())
    }

    /// Returns false if the track has no events.
    fn encode_track(&self, out: &mut ByteWriter, track: u16) -> Result<bool, EncodeError> {
        let mut body = None;
        let mut time = 0;
        for event in self.events.iter().filter(|e| e.track == track) {
            if body.is_none() {
                out.raw(b"MTrk");
                body = Some(out.reserve_length(FieldWidth::U32Be));
            }
            let delta = event
                .time
                .checked_sub(time)
                .ok_or(EncodeError::Unsorted { id: event.id.0 })?;
            if delta > VLQ_MAX as u64 {
                return Err(WriterError::VlqOverflow(delta).into());
            }
            out.vlq(delta as u32)?;
            encode_event(out, event)?;
            time = event.time;
        }
        match body {
            Some(token) => {
                out.commit_length(token)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Keeps exactly one End of Track per track, after its last real event,
    /// and recounts the tracks.
    pub fn sanitize_terminators(&mut self) {
        #[derive(Default)]
        struct TrackEnd {
            last_real: Option<u64>,
            terminator: Option<usize>,
            duplicates: Vec<usize>,
        }

        let mut tracks: BTreeMap<u16, TrackEnd> = BTreeMap::new();
        for (i, event) in self.events.iter().enumerate() {
            let end = tracks.entry(event.track).or_default();
            if event.is_end_of_track() {
                match end.terminator {
                    Some(_) => end.duplicates.push(i),
                    None => end.terminator = Some(i),
                }
            } else {
                end.last_real = Some(end.last_real.map_or(event.time, |t| t.max(event.time)));
            }
        }

        let mut doomed: Vec<usize> = tracks.values().flat_map(|t| t.duplicates.iter().copied()).collect();
        if !doomed.is_empty() {
            warn!("deleting {} redundant End of Track events", doomed.len());
        }

        let mut additions = Vec::new();
        for (&track, end) in &tracks {
            let Some(last_real) = end.last_real else {
                continue;
            };
            match end.terminator {
                None => {
                    warn!("adding End of Track to track {track}");
                    additions.push((track, last_real + 1));
                }
                Some(i) if self.events[i].time < last_real => {
                    warn!(
                        "moving End of Track on track {track} from {} to {}",
                        self.events[i].time,
                        last_real + 1
                    );
                    doomed.push(i);
                    additions.push((track, last_real + 1));
                }
                Some(i) => {
                    let time = self.events[i].time;
                    let shadowed = self.events[i + 1..]
                        .iter()
                        .any(|e| e.track == track && e.time == time);
                    if shadowed {
                        warn!("moving End of Track on track {track} after its last event");
                        doomed.push(i);
                        additions.push((track, time));
                    }
                }
            }
        }

        doomed.sort_unstable();
        for i in doomed.into_iter().rev() {
            self.events.remove(i);
        }
        for (track, time) in additions {
            let event = SongEvent::meta(self.ids.next(), time, track, META_END_OF_TRACK, Vec::new());
            self.insert_event(event, TieBreak::Last);
        }

        let count = u16::try_from(self.track_count()).unwrap_or(u16::MAX);
        if count != self.declared_track_count {
            warn!(
                "updating MThd track count from {} to {count}",
                self.declared_track_count
            );
            self.declared_track_count = count;
        }
    }

    /// At time zero, orders each channel's setup as bank select, program
    /// change, other controllers, then everything else. Only events sharing a
    /// track and channel are reordered.
    pub fn sanitize_time_zero(&mut self) {
        let zero_run = self.events.partition_point(|e| e.time == 0);
        for ai in 1..zero_run {
            let a = &self.events[ai];
            let rank = time_zero_rank(a);
            let target = self.events[..ai].iter().position(|b| {
                b.track == a.track && b.channel == a.channel && time_zero_rank(b) > rank
            });
            if let Some(bi) = target {
                warn!("time zero sequence correction {ai} => {bi}");
                let event = self.events.remove(ai);
                self.events.insert(bi, event);
            }
        }
    }
}

fn encode_event(out: &mut ByteWriter, event: &SongEvent) -> Result<(), EncodeError> {
    let id = event.id.0;
    if event.a > 0x7f || event.b > 0x7f {
        return Err(EncodeError::DataOutOfRange { id });
    }
    match event.opcode {
        Opcode::SysexStart | Opcode::SysexEnd => {
            out.u8(event.opcode.status());
            out.length_prefixed(LengthPrefix::Vlq, event.payload.as_deref().unwrap_or_default())?;
        }
        Opcode::Meta => {
            out.u8(event.opcode.status());
            out.u8(event.a);
            out.length_prefixed(LengthPrefix::Vlq, event.payload.as_deref().unwrap_or_default())?;
        }
        opcode => {
            let channel = match event.channel {
                Some(c) if c < 0x10 => c,
                _ => return Err(EncodeError::MissingChannel { id }),
            };
            out.u8(opcode.status() | channel);
            out.u8(event.a);
            if opcode.data_len() == 2 {
                out.u8(event.b);
            }
        }
    }
    Ok(())
}
