use super::{DEFAULT_OFF_VELOCITY, NoteRelease, Opcode, Song, SongEvent};

impl Song {
    /// Folds each note-off into the nearest preceding matching note-on.
    /// Unmatched note-ons get a zero-length release.
    pub fn combine(&mut self) {
        if self.combined {
            return;
        }
        let releases: Vec<Option<NoteRelease>> = self
            .events
            .iter()
            .enumerate()
            .map(|(i, event)| match event.opcode {
                Opcode::NoteOn => Some(self.find_release(i, event)),
                _ => None,
            })
            .collect();
        for (event, release) in self.events.iter_mut().zip(releases) {
            event.release = release;
        }
        self.events.retain(|e| e.opcode != Opcode::NoteOff);
        self.combined = true;
    }

    fn find_release(&self, from: usize, on: &SongEvent) -> NoteRelease {
        self.events[from..]
            .iter()
            .find(|e| {
                e.opcode == Opcode::NoteOff
                    && e.track == on.track
                    && e.channel == on.channel
                    && e.a == on.a
            })
            .map_or_else(NoteRelease::default, |off| NoteRelease {
                duration: off.time.saturating_sub(on.time),
                off_velocity: off.b,
            })
    }

    /// Splits every combined note-on back into a note-on and a note-off.
    /// Each note-off lands after any events already at its time.
    pub fn uncombine(&mut self) {
        if !self.combined {
            return;
        }
        let mut offs: Vec<SongEvent> = Vec::new();
        for on in self.events.iter_mut() {
            let Some(release) = on.release.take() else {
                continue;
            };
            if on.opcode != Opcode::NoteOn {
                continue;
            }
            let mut off = SongEvent::new(self.ids.next(), on.time + release.duration, Opcode::NoteOff);
            off.track = on.track;
            off.channel = on.channel;
            off.a = on.a;
            off.b = match release.off_velocity {
                0 => DEFAULT_OFF_VELOCITY,
                v => v,
            };
            offs.push(off);
        }
        offs.sort_by_key(|e| e.time);

        let existing = std::mem::take(&mut self.events);
        let mut merged = Vec::with_capacity(existing.len() + offs.len());
        let mut offs = offs.into_iter().peekable();
        for event in existing {
            while let Some(off) = offs.next_if(|off| off.time < event.time) {
                merged.push(off);
            }
            merged.push(event);
        }
        merged.extend(offs);
        self.events = merged;
        self.combined = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::song::TieBreak;

    fn note(song: &mut Song, time: u64, opcode: Opcode, track: u16, channel: u8, key: u8, vel: u8) {
        let mut event = SongEvent::new(song.ids().next(), time, opcode);
        event.track = track;
        event.channel = Some(channel);
        event.a = key;
        event.b = vel;
        song.insert_event(event, TieBreak::Last);
    }

    fn uncombined() -> Song {
        let mut song = Song::new();
        song.set_initial_division(96);
        note(&mut song, 0, Opcode::NoteOn, 0, 0, 60, 100);
        note(&mut song, 0, Opcode::NoteOn, 1, 0, 60, 90);
        note(&mut song, 10, Opcode::NoteOff, 1, 0, 60, 20);
        note(&mut song, 24, Opcode::NoteOff, 0, 0, 60, 30);
        note(&mut song, 30, Opcode::NoteOn, 0, 2, 64, 80);
        song
    }

    #[test]
    fn combine_matches_track_channel_and_note() {
        let mut song = uncombined();
        song.combine();
        assert!(song.is_combined());
        let notes: Vec<(u64, u16, Option<NoteRelease>)> = song
            .events()
            .iter()
            .map(|e| (e.time, e.track, e.release))
            .collect();
        assert_eq!(
            notes,
            vec![
                (0, 0, Some(NoteRelease { duration: 24, off_velocity: 30 })),
                (0, 1, Some(NoteRelease { duration: 10, off_velocity: 20 })),
                (30, 0, Some(NoteRelease::default())),
            ]
        );
    }

    #[test]
    fn uncombine_restores_note_offs() {
        let mut song = uncombined();
        song.combine();
        song.combine();
        song.uncombine();
        song.uncombine();
        assert!(!song.is_combined());
        let shape: Vec<(u64, Opcode, u16)> = song
            .events()
            .iter()
            .map(|e| (e.time, e.opcode, e.track))
            .collect();
        assert_eq!(
            shape,
            vec![
                (0, Opcode::NoteOn, 0),
                (0, Opcode::NoteOn, 1),
                (10, Opcode::NoteOff, 1),
                (24, Opcode::NoteOff, 0),
                (30, Opcode::NoteOn, 0),
                (30, Opcode::NoteOff, 0),
            ]
        );
        assert!(song.events().iter().all(|e| e.release.is_none()));
        assert_eq!(song.events()[3].b, 30);
    }

    #[test]
    fn note_offs_follow_events_at_the_same_time() {
        let mut song = Song::new();
        song.set_initial_division(96);
        song.combine();
        let on = song.create_event(0, TieBreak::Last).id;
        song.event_mut(on).unwrap().set_duration(12);
        song.event_mut(on).unwrap().set_off_velocity(0);
        note(&mut song, 12, Opcode::ControlChange, 0, 0, 7, 100);
        song.uncombine();
        assert_eq!(song.events()[1].opcode, Opcode::ControlChange);
        assert_eq!(song.events()[2].opcode, Opcode::NoteOff);
        assert_eq!(song.events()[2].b, DEFAULT_OFF_VELOCITY);
    }
}
