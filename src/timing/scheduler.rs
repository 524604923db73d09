use crossbeam::channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Timestamp;
use crate::events::{PlayState, PlaybackUpdate};
use crate::song::{DEFAULT_OFF_VELOCITY, EventId, Opcode, Song};
use crate::transport::MidiSink;

const CONTROL_ALL_SOUND_OFF: u8 = 0x78;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeConfig {
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
    /// Quarter notes between clicks. Zero disables the metronome.
    pub rate: f64,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        Self {
            channel: 9,
            note: 56,
            velocity: 0x7f,
            rate: 0.0,
        }
    }
}

/// A sounding note whose note-off the scheduler owes the sink.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeldNote {
    pub channel: u8,
    pub note: u8,
    pub velocity: u8,
    pub release_at: Timestamp,
}

/// A recorded note-on still waiting for its note-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturedNote {
    pub channel: u8,
    pub note: u8,
    pub id: EventId,
}

/// Ends a recorded note at `playhead` with the default off velocity. An
/// uncombined song gets a note-off event on the note's track.
fn close_capture(song: &mut Song, capture: CapturedNote, playhead: f64) {
    if song.is_combined() {
        if let Some(event) = song.event_mut(capture.id)
            && (event.time as f64) < playhead
        {
            event.set_duration((playhead - event.time as f64).floor() as i64);
            event.set_off_velocity(DEFAULT_OFF_VELOCITY as i32);
        }
        return;
    }
    let Some(event) = song.event(capture.id) else {
        return;
    };
    let time = event.time.max(playhead.max(0.0).floor() as u64);
    let track = event.track;
    song.add_encoded_event_at_time(
        time,
        &[0x80 | capture.channel, capture.note, DEFAULT_OFF_VELOCITY],
        Some(track),
        None,
    );
}

fn off_velocity(velocity: u8) -> u8 {
    match velocity {
        0 => DEFAULT_OFF_VELOCITY,
        v => v,
    }
}

/// Drives playback and recording of one Song against a [`MidiSink`].
///
/// Nothing happens on its own: the host calls [`PlaybackScheduler::tick`]
/// often, and everything due by then is sent. Song time maps to wall time
/// through a single tempo captured whenever the clock is anchored.
pub struct PlaybackScheduler<S> {
    sink: S,
    song: Option<Song>,
    state: PlayState,
    playhead: f64,
    loop_start: u64,
    loop_end: u64,
    /// Index of the next event to dispatch.
    cursor: usize,
    /// Wall time of tick zero, in microseconds.
    wall_at_zero: f64,
    us_per_tick: f64,
    held: Vec<HeldNote>,
    captured: Vec<CapturedNote>,
    metronome: MetronomeConfig,
    next_click: Option<f64>,
    subscribers: Vec<Sender<PlaybackUpdate>>,
}

impl<S: MidiSink> PlaybackScheduler<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            song: None,
            state: PlayState::Empty,
            playhead: 0.0,
            loop_start: 0,
            loop_end: 0,
            cursor: 0,
            wall_at_zero: 0.0,
            us_per_tick: 1.0,
            held: Vec::new(),
            captured: Vec::new(),
            metronome: MetronomeConfig::default(),
            next_click: None,
            subscribers: Vec::new(),
        }
    }

    pub fn with_metronome(mut self, metronome: MetronomeConfig) -> Self {
        self.metronome = metronome;
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn playhead(&self) -> f64 {
        self.playhead
    }

    /// `(0, 0)` when no loop is set.
    pub fn loop_range(&self) -> (u64, u64) {
        (self.loop_start, self.loop_end)
    }

    fn loop_active(&self) -> bool {
        self.loop_end > self.loop_start
    }

    pub fn held_notes(&self) -> &[HeldNote] {
        &self.held
    }

    pub fn captured_notes(&self) -> &[CapturedNote] {
        &self.captured
    }

    pub fn metronome(&self) -> &MetronomeConfig {
        &self.metronome
    }

    pub fn song(&self) -> Option<&Song> {
        self.song.as_ref()
    }

    /// Editing while running is allowed, but inserting or removing events
    /// before the playhead may replay or skip events until the next scrub.
    pub fn song_mut(&mut self) -> Option<&mut Song> {
        self.song.as_mut()
    }

    pub fn subscribe(&mut self) -> Receiver<PlaybackUpdate> {
        let (tx, rx) = crossbeam::channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    fn publish(&mut self, update: PlaybackUpdate) {
        self.subscribers.retain(|tx| tx.send(update.clone()).is_ok());
    }

    /// Replaces the song, stopping playback and clearing playhead and loop.
    /// Returns the previous song.
    pub fn set_song(&mut self, song: Option<Song>) -> Option<Song> {
        if self.state.is_running() {
            self.release_all();
        }
        let previous = std::mem::replace(&mut self.song, song);
        self.publish(PlaybackUpdate::SongReplaced);
        if self.playhead != 0.0 {
            self.playhead = 0.0;
            self.publish(PlaybackUpdate::PlayheadMoved(0.0));
        }
        if self.loop_start != 0 || self.loop_end != 0 {
            self.loop_start = 0;
            self.loop_end = 0;
            self.publish(PlaybackUpdate::LoopChanged { start: 0, end: 0 });
        }
        self.cursor = 0;
        self.next_click = None;
        let next = if self.song.is_some() {
            PlayState::Ready
        } else {
            PlayState::Empty
        };
        self.change_state(next);
        previous
    }

    pub fn take_song(&mut self) -> Option<Song> {
        self.set_song(None)
    }

    /// Toggles playback. Recording stops to ready.
    pub fn play(&mut self, now: Timestamp) {
        match self.state {
            PlayState::Empty => {}
            PlayState::Ready => self.run(PlayState::Playing, now),
            PlayState::Playing | PlayState::Recording => self.halt(PlayState::Ready),
        }
    }

    /// Toggles recording. Starting from playback keeps the clock running.
    pub fn record(&mut self, now: Timestamp) {
        match self.state {
            PlayState::Empty => {}
            PlayState::Ready | PlayState::Playing => self.run(PlayState::Recording, now),
            PlayState::Recording => self.halt(PlayState::Ready),
        }
    }

    pub fn stop(&mut self) {
        if self.state.is_running() {
            self.halt(PlayState::Ready);
        }
    }

    fn run(&mut self, next: PlayState, now: Timestamp) {
        if self.song.is_none() {
            return;
        }
        if !self.state.is_running() {
            self.anchor(now);
            self.prerun();
        }
        self.change_state(next);
    }

    fn halt(&mut self, next: PlayState) {
        if self.state.is_running() {
            self.release_all();
        }
        self.change_state(next);
    }

    fn change_state(&mut self, next: PlayState) {
        if self.state == next {
            return;
        }
        debug!("play state {:?} -> {:?}", self.state, next);
        self.state = next;
        self.publish(PlaybackUpdate::StateChanged(next));
    }

    /// Maps the current playhead to `now` and finds the next event.
    fn anchor(&mut self, now: Timestamp) {
        let Some(song) = &self.song else {
            return;
        };
        let tempo = song.tempo(false).unsigned_abs() as f64;
        self.us_per_tick = tempo / song.division().max(1) as f64;
        self.wall_at_zero = now.as_micros() - self.playhead * self.us_per_tick;
        let playhead = self.playhead;
        self.cursor = song
            .events()
            .partition_point(|e| (e.time as f64) < playhead);
        self.schedule_click();
    }

    /// Sends channel setup from before the playhead. Notes, meta and sysex
    /// are skipped.
    fn prerun(&mut self) {
        let Some(song) = &self.song else {
            return;
        };
        for event in song.events() {
            if event.time as f64 >= self.playhead {
                break;
            }
            if event.opcode.is_note() {
                continue;
            }
            if let Some(message) = event.playback_message() {
                self.sink.send(message.as_slice());
            }
        }
    }

    fn click_interval_ticks(&self) -> Option<f64> {
        let division = self.song.as_ref()?.division();
        (self.metronome.rate > 0.0 && division > 0).then(|| self.metronome.rate * division as f64)
    }

    /// Wall time of the first beat at or after the playhead, or strictly
    /// after it when `on_beat` is false.
    fn beat_after_playhead(&self, on_beat: bool) -> Option<f64> {
        let interval = self.click_interval_ticks()?;
        let beats = self.playhead / interval;
        let beat = if on_beat { beats.ceil() } else { beats.floor() + 1.0 };
        Some(self.wall_at_zero + beat * interval * self.us_per_tick)
    }

    fn schedule_click(&mut self) {
        self.next_click = self.beat_after_playhead(true);
    }

    /// Silences held notes and every channel, then closes open captures at
    /// the playhead.
    fn release_all(&mut self) {
        for note in self.held.drain(..) {
            self.sink.send(&[0x80 | note.channel, note.note, note.velocity]);
        }
        for channel in 0..16u8 {
            self.sink.send(&[0xb0 | channel, CONTROL_ALL_SOUND_OFF, 0]);
        }
        let playhead = self.playhead;
        if let Some(song) = self.song.as_mut() {
            for capture in self.captured.drain(..) {
                close_capture(song, capture, playhead);
            }
        }
        self.captured.clear();
    }

    /// Moves the playhead, silencing everything first. While running, the
    /// channel setup is replayed and the clock re-anchored at `now`.
    pub fn set_playhead(&mut self, ticks: f64, now: Timestamp) {
        if self.song.is_none() {
            return;
        }
        let ticks = ticks.max(0.0);
        if ticks == self.playhead {
            return;
        }
        self.release_all();
        self.playhead = ticks;
        self.publish(PlaybackUpdate::PlayheadMoved(ticks));
        if self.state.is_running() {
            self.prerun();
            self.anchor(now);
        }
    }

    /// To the loop start, or to zero if there is no loop or we're already there.
    pub fn skip_backward(&mut self, now: Timestamp) {
        if self.song.is_none() {
            return;
        }
        let target = if self.loop_active() && self.playhead != self.loop_start as f64 {
            self.loop_start
        } else {
            0
        };
        self.set_playhead(target as f64, now);
    }

    /// To the loop end, or to the last event if there is no loop or we're
    /// already there.
    pub fn skip_forward(&mut self, now: Timestamp) {
        let Some(song) = &self.song else {
            return;
        };
        let target = if self.loop_active() && self.playhead != self.loop_end as f64 {
            self.loop_end
        } else {
            song.events().last().map_or(0, |e| e.time)
        };
        self.set_playhead(target as f64, now);
    }

    /// `start >= end` clears the loop.
    pub fn set_loop(&mut self, start: u64, end: u64) {
        let (start, end) = if start >= end { (0, 0) } else { (start, end) };
        if (start, end) == (self.loop_start, self.loop_end) {
            return;
        }
        self.loop_start = start;
        self.loop_end = end;
        self.publish(PlaybackUpdate::LoopChanged { start, end });
    }

    /// Quarter notes between clicks; zero or less disables.
    pub fn set_metronome(&mut self, rate: f64) {
        self.metronome.rate = if rate > 0.0 { rate } else { 0.0 };
        if self.state.is_running() {
            self.schedule_click();
        } else {
            self.next_click = None;
        }
    }

    /// Sends everything due by `now` and advances the playhead.
    pub fn tick(&mut self, now: Timestamp) {
        if !self.state.is_running() {
            return;
        }
        let now_us = now.as_micros();
        self.release_due(now_us);
        self.dispatch_due(now_us);

        self.playhead = (now_us - self.wall_at_zero) / self.us_per_tick;
        if self.loop_active() && self.playhead >= self.loop_end as f64 {
            self.set_playhead(self.loop_start as f64, now);
        } else {
            self.publish(PlaybackUpdate::PlayheadMoved(self.playhead));
        }

        if let Some(due) = self.next_click
            && now_us >= due
        {
            self.click();
            // Beats missed during a stall collapse into this one click.
            let following = self.click_interval_ticks().map(|i| due + i * self.us_per_tick);
            self.next_click = match (following, self.beat_after_playhead(false)) {
                (Some(following), Some(beat)) => Some(following.max(beat)),
                _ => None,
            };
        }
    }

    fn release_due(&mut self, now_us: f64) {
        let sink = &mut self.sink;
        self.held.retain(|note| {
            if note.release_at.as_micros() > now_us {
                return true;
            }
            sink.send(&[0x80 | note.channel, note.note, note.velocity]);
            false
        });
    }

    fn dispatch_due(&mut self, now_us: f64) {
        let Some(song) = &self.song else {
            return;
        };
        while let Some(event) = song.events().get(self.cursor) {
            let wall = self.wall_at_zero + event.time as f64 * self.us_per_tick;
            if wall > now_us {
                break;
            }
            self.cursor += 1;
            let Some(message) = event.playback_message() else {
                continue;
            };
            self.sink.send(message.as_slice());

            // Uncombined note-ons have their own note-off events.
            let (Opcode::NoteOn, Some(release)) = (event.opcode, event.release) else {
                continue;
            };
            let channel = event.channel.unwrap_or(0);
            let velocity = off_velocity(release.off_velocity);
            if release.duration > 0 {
                self.held.push(HeldNote {
                    channel,
                    note: event.a,
                    velocity,
                    release_at: Timestamp::from_micros(
                        wall + release.duration as f64 * self.us_per_tick,
                    ),
                });
            } else {
                self.sink.send(&[0x80 | channel, event.a, velocity]);
            }
        }
    }

    fn click(&mut self) {
        let channel = self.metronome.channel & 0x0f;
        let note = self.metronome.note & 0x7f;
        let velocity = self.metronome.velocity & 0x7f;
        self.sink.send(&[0x90 | channel, note, velocity]);
        self.sink.send(&[0x80 | channel, note, DEFAULT_OFF_VELOCITY]);
        self.publish(PlaybackUpdate::MetronomeClick);
    }

    /// Live input. Only acts while recording.
    pub fn on_input(&mut self, message: &[u8]) {
        if self.state != PlayState::Recording {
            return;
        }
        let Some(&status) = message.first() else {
            return;
        };
        match status & 0xf0 {
            0x80 => self.record_note_off(message),
            0x90 if message.get(2) == Some(&0) => self.record_note_off(message),
            0x90 => self.record_note_on(message),
            0xa0..=0xe0 => {
                self.insert_live(message);
            }
            _ => {}
        }
    }

    /// Adds `message` at the playhead, keeping the dispatch cursor on the
    /// same upcoming event so the insert is not echoed.
    fn insert_live(&mut self, message: &[u8]) -> Option<usize> {
        let time = self.playhead.max(0.0).floor() as u64;
        let p = self
            .song
            .as_mut()?
            .add_encoded_event_at_time(time, message, None, None)?;
        if p <= self.cursor {
            self.cursor += 1;
        }
        Some(p)
    }

    fn record_note_on(&mut self, message: &[u8]) {
        let Some(p) = self.insert_live(message) else {
            return;
        };
        let Some(song) = &self.song else {
            return;
        };
        let event = &song.events()[p];
        self.captured.push(CapturedNote {
            channel: event.channel.unwrap_or(0),
            note: event.a,
            id: event.id,
        });
    }

    fn record_note_off(&mut self, message: &[u8]) {
        let (Some(&status), Some(&note)) = (message.first(), message.get(1)) else {
            return;
        };
        let channel = status & 0x0f;
        let velocity = message.get(2).copied().unwrap_or(0);
        let Some(combined) = self.song.as_ref().map(Song::is_combined) else {
            return;
        };

        let open = self
            .captured
            .iter()
            .position(|c| c.channel == channel && c.note == note)
            .map(|i| self.captured.remove(i));

        if !combined {
            if status & 0xf0 == 0x90 {
                self.insert_live(&[0x80 | channel, note, DEFAULT_OFF_VELOCITY]);
            } else {
                self.insert_live(message);
            }
            return;
        }

        let Some(capture) = open else {
            return;
        };
        let playhead = self.playhead;
        if let Some(event) = self.song.as_mut().and_then(|s| s.event_mut(capture.id)) {
            event.set_duration((playhead - event.time as f64).floor().max(0.0) as i64);
            event.set_off_velocity(off_velocity(velocity) as i32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ShortMessage;
    use crate::song::{META_SET_TEMPO, NoteRelease, SongEvent, TieBreak};

    /// 1000 microseconds per tick at the default tempo.
    const DIVISION: u16 = 500;

    fn at_tick(tick: f64) -> Timestamp {
        Timestamp::from_micros(tick * 1000.0)
    }

    fn empty_song(division: u16, combined: bool) -> Song {
        let mut song = Song::new();
        song.set_initial_division(division);
        if combined {
            song.combine();
        }
        song
    }

    fn add(song: &mut Song, time: u64, bytes: &[u8], duration: u64) -> EventId {
        let p = song.add_encoded_event_at_time(time, bytes, None, None).unwrap();
        let event = &mut song.events_mut()[p];
        event.set_duration(duration as i64);
        event.id
    }

    fn player(song: Song) -> PlaybackScheduler<Vec<ShortMessage>> {
        let mut player = PlaybackScheduler::new(Vec::new());
        player.set_song(Some(song));
        player
    }

    fn sent(player: &PlaybackScheduler<Vec<ShortMessage>>) -> Vec<Vec<u8>> {
        player.sink().iter().map(|m| m.as_slice().to_vec()).collect()
    }

    fn all_sound_off() -> Vec<Vec<u8>> {
        (0..16u8).map(|c| vec![0xb0 | c, 0x78, 0]).collect()
    }

    #[test]
    fn dispatches_note_and_holds_release() {
        let mut song = empty_song(480, true);
        add(&mut song, 1, &[0x90, 60, 100], 10);
        let mut player = player(song);
        player.play(Timestamp::ZERO);

        let us_per_tick = 500_000.0 / 480.0;
        player.tick(Timestamp::from_micros(us_per_tick));
        assert_eq!(sent(&player), vec![vec![0x90, 60, 100]]);
        let held = player.held_notes();
        assert_eq!(held.len(), 1);
        assert_eq!((held[0].channel, held[0].note, held[0].velocity), (0, 60, 0x40));
        let expected = us_per_tick + 10.0 * us_per_tick;
        assert!((held[0].release_at.as_micros() - expected).abs() < 1e-6);

        player.tick(Timestamp::from_micros(expected));
        assert!(player.held_notes().is_empty());
        assert_eq!(sent(&player)[1], vec![0x80, 60, 0x40]);
    }

    #[test]
    fn zero_duration_releases_immediately() {
        let mut song = empty_song(DIVISION, true);
        let id = add(&mut song, 0, &[0x93, 64, 90], 0);
        song.event_mut(id).unwrap().set_off_velocity(12);
        let mut player = player(song);
        player.play(Timestamp::ZERO);
        player.tick(Timestamp::ZERO);
        assert_eq!(sent(&player), vec![vec![0x93, 64, 90], vec![0x83, 64, 12]]);
        assert!(player.held_notes().is_empty());
    }

    #[test]
    fn uncombined_notes_use_their_own_offs() {
        let mut song = empty_song(DIVISION, false);
        add(&mut song, 0, &[0x90, 60, 100], 0);
        add(&mut song, 5, &[0x80, 60, 64], 0);
        let mut player = player(song);
        player.play(Timestamp::ZERO);
        player.tick(at_tick(2.0));
        assert_eq!(sent(&player), vec![vec![0x90, 60, 100]]);
        player.tick(at_tick(6.0));
        assert_eq!(sent(&player)[1], vec![0x80, 60, 64]);
    }

    #[test]
    fn prerun_sends_setup_before_playhead() {
        let mut song = empty_song(DIVISION, true);
        add(&mut song, 0, &[0xc0, 5], 0);
        add(&mut song, 0, &[0x90, 60, 100], 5);
        song.set_tempo(500_000);
        add(&mut song, 10, &[0xb0, 7, 90], 0);
        add(&mut song, 20, &[0x90, 62, 100], 5);
        let mut player = player(song);
        player.set_playhead(15.0, Timestamp::ZERO);
        player.sink_mut().clear();

        player.play(Timestamp::ZERO);
        assert_eq!(sent(&player), vec![vec![0xc0, 5], vec![0xb0, 7, 90]]);
        player.tick(at_tick(4.0));
        assert_eq!(sent(&player).len(), 2);
        player.tick(at_tick(5.0));
        assert_eq!(sent(&player)[2], vec![0x90, 62, 100]);
    }

    #[test]
    fn scrub_silences_everything() {
        let mut song = empty_song(DIVISION, true);
        add(&mut song, 0, &[0x91, 60, 100], 50);
        let mut player = player(song);
        player.play(Timestamp::ZERO);
        player.tick(at_tick(1.0));
        assert_eq!(player.held_notes().len(), 1);
        player.sink_mut().clear();

        player.set_playhead(30.0, at_tick(1.0));
        assert!(player.held_notes().is_empty());
        let mut expected = vec![vec![0x81, 60, 0x40]];
        expected.extend(all_sound_off());
        assert_eq!(sent(&player), expected);
        assert_eq!(player.playhead(), 30.0);

        // Re-anchored: tick 31 is one tick of wall time later.
        player.tick(at_tick(2.0));
        assert!((player.playhead() - 31.0).abs() < 1e-9);
    }

    #[test]
    fn scrub_to_same_position_sends_nothing() {
        let mut player = player(empty_song(DIVISION, true));
        player.set_playhead(12.0, Timestamp::ZERO);
        player.sink_mut().clear();
        player.set_playhead(12.0, Timestamp::ZERO);
        assert!(sent(&player).is_empty());
        player.set_playhead(13.0, Timestamp::ZERO);
        assert_eq!(sent(&player), all_sound_off());
    }

    #[test]
    fn zero_tempo_event_falls_back_to_default() {
        let mut song = empty_song(DIVISION, true);
        let tempo = SongEvent::meta(song.ids().next(), 0, 0, META_SET_TEMPO, vec![0, 0, 0]);
        song.insert_event(tempo, TieBreak::First);
        add(&mut song, 1000, &[0x90, 60, 100], 0);
        let mut player = player(song);
        player.play(Timestamp::ZERO);
        player.tick(Timestamp::ZERO);
        assert_eq!(player.playhead(), 0.0);
        assert!(sent(&player).is_empty());
        player.tick(at_tick(1000.0));
        assert_eq!(sent(&player)[0], vec![0x90, 60, 100]);
    }

    #[test]
    fn loop_wraps_to_start() {
        let mut song = empty_song(DIVISION, true);
        add(&mut song, 12, &[0xc0, 1], 0);
        let mut player = player(song);
        let updates = player.subscribe();
        player.set_loop(10, 20);
        player.play(Timestamp::ZERO);
        player.tick(at_tick(25.0));
        assert_eq!(player.playhead(), 10.0);
        player.tick(at_tick(27.0));
        assert!((player.playhead() - 12.0).abs() < 1e-9);
        let all: Vec<PlaybackUpdate> = updates.try_iter().collect();
        assert!(all.contains(&PlaybackUpdate::LoopChanged { start: 10, end: 20 }));
        assert!(all.contains(&PlaybackUpdate::PlayheadMoved(10.0)));
        // The program change at 12 plays on the first pass, then again after the wrap.
        let programs = sent(&player).iter().filter(|m| m[0] == 0xc0).count();
        assert_eq!(programs, 2);
    }

    #[test]
    fn loop_parameters_normalize() {
        let mut player = player(empty_song(DIVISION, true));
        player.set_loop(20, 10);
        assert_eq!(player.loop_range(), (0, 0));
        player.set_loop(3, 9);
        assert_eq!(player.loop_range(), (3, 9));
    }

    #[test]
    fn metronome_skips_missed_beats() {
        let mut player = player(empty_song(DIVISION, true));
        let updates = player.subscribe();
        player.set_metronome(1.0);
        player.play(Timestamp::ZERO);
        player.tick(Timestamp::ZERO);
        assert_eq!(sent(&player), vec![vec![0x99, 56, 0x7f], vec![0x89, 56, 0x40]]);

        player.tick(at_tick(100.0));
        player.tick(at_tick(1200.0));
        player.tick(at_tick(1200.5));
        player.tick(at_tick(1300.0));
        player.tick(at_tick(2600.0));
        for tick in 2601..=2605 {
            player.tick(at_tick(tick as f64));
        }
        let clicks = updates
            .try_iter()
            .filter(|u| *u == PlaybackUpdate::MetronomeClick)
            .count();
        assert_eq!(clicks, 3);
        player.tick(at_tick(3000.0));
        assert_eq!(sent(&player).len(), 8);
    }

    #[test]
    fn metronome_resumes_on_the_next_beat() {
        let mut player = player(empty_song(DIVISION, true));
        player.set_metronome(2.0);
        player.set_playhead(10.0, Timestamp::ZERO);
        player.sink_mut().clear();
        player.play(Timestamp::ZERO);
        player.tick(at_tick(989.0));
        assert!(sent(&player).is_empty());
        player.tick(at_tick(990.0));
        assert_eq!(sent(&player).len(), 2);
    }

    #[test]
    fn records_combined_notes_without_echo() {
        let mut player = player(empty_song(DIVISION, true));
        player.record(Timestamp::ZERO);
        player.tick(at_tick(10.0));
        player.on_input(&[0x91, 64, 90]);
        assert_eq!(player.captured_notes().len(), 1);

        player.tick(at_tick(30.4));
        assert!(sent(&player).is_empty());
        player.on_input(&[0x81, 64, 0]);
        assert!(player.captured_notes().is_empty());

        let song = player.song().unwrap();
        assert_eq!(song.len(), 1);
        let event = &song.events()[0];
        assert_eq!((event.time, event.channel, event.a, event.b), (10, Some(1), 64, 90));
        assert_eq!(
            event.release,
            Some(NoteRelease {
                duration: 20,
                off_velocity: 0x40
            })
        );
    }

    #[test]
    fn recording_velocity_zero_closes_capture() {
        let mut player = player(empty_song(DIVISION, true));
        player.record(Timestamp::ZERO);
        player.tick(at_tick(4.0));
        player.on_input(&[0x90, 60, 100]);
        player.on_input(&[0xb0, 64, 127]);
        player.tick(at_tick(9.0));
        player.on_input(&[0x90, 60, 0]);
        player.on_input(&[0xf8]);

        let song = player.song().unwrap();
        assert_eq!(song.len(), 2);
        assert_eq!(song.events()[0].duration(), 5);
        assert_eq!(song.events()[1].opcode, Opcode::ControlChange);
    }

    #[test]
    fn records_uncombined_offs_verbatim() {
        let mut player = player(empty_song(DIVISION, false));
        player.record(Timestamp::ZERO);
        player.tick(at_tick(2.0));
        player.on_input(&[0x90, 60, 100]);
        player.tick(at_tick(7.0));
        player.on_input(&[0x80, 60, 33]);
        player.on_input(&[0x90, 62, 100]);
        player.on_input(&[0x90, 62, 0]);
        assert!(player.captured_notes().is_empty());

        let shape: Vec<(u64, Opcode, u8)> = player
            .song()
            .unwrap()
            .events()
            .iter()
            .map(|e| (e.time, e.opcode, e.b))
            .collect();
        assert_eq!(
            shape,
            vec![
                (2, Opcode::NoteOn, 100),
                (7, Opcode::NoteOff, 33),
                (7, Opcode::NoteOn, 100),
                (7, Opcode::NoteOff, 0x40),
            ]
        );
        assert!(sent(&player).is_empty());
    }

    #[test]
    fn stopping_record_closes_uncombined_notes() {
        let mut player = player(empty_song(DIVISION, false));
        player.record(Timestamp::ZERO);
        player.tick(at_tick(10.0));
        player.on_input(&[0x92, 60, 100]);
        assert_eq!(player.captured_notes().len(), 1);
        player.tick(at_tick(30.0));
        player.stop();

        assert!(player.captured_notes().is_empty());
        let shape: Vec<(u64, Opcode, Option<u8>, u8, u8)> = player
            .song()
            .unwrap()
            .events()
            .iter()
            .map(|e| (e.time, e.opcode, e.channel, e.a, e.b))
            .collect();
        assert_eq!(
            shape,
            vec![
                (10, Opcode::NoteOn, Some(2), 60, 100),
                (30, Opcode::NoteOff, Some(2), 60, 0x40),
            ]
        );
    }

    #[test]
    fn stopping_record_closes_open_notes() {
        let mut player = player(empty_song(DIVISION, true));
        player.record(Timestamp::ZERO);
        player.tick(at_tick(10.0));
        player.on_input(&[0x90, 60, 100]);
        player.tick(at_tick(25.7));
        player.record(at_tick(25.7));

        assert_eq!(player.state(), PlayState::Ready);
        assert!(player.captured_notes().is_empty());
        assert_eq!(player.song().unwrap().events()[0].duration(), 15);
        assert_eq!(sent(&player), all_sound_off());
    }

    #[test]
    fn input_ignored_unless_recording() {
        let mut player = player(empty_song(DIVISION, true));
        player.on_input(&[0x90, 60, 100]);
        player.play(Timestamp::ZERO);
        player.on_input(&[0x90, 60, 100]);
        assert!(player.song().unwrap().is_empty());
    }

    #[test]
    fn state_transitions_publish_updates() {
        let mut player = PlaybackScheduler::new(Vec::new());
        let updates = player.subscribe();
        player.play(Timestamp::ZERO);
        assert_eq!(player.state(), PlayState::Empty);

        player.set_song(Some(empty_song(DIVISION, true)));
        player.play(Timestamp::ZERO);
        player.record(Timestamp::ZERO);
        player.play(Timestamp::ZERO);
        player.record(Timestamp::ZERO);
        player.record(Timestamp::ZERO);
        assert!(player.take_song().is_some());

        let all: Vec<PlaybackUpdate> = updates.try_iter().collect();
        assert_eq!(
            all,
            vec![
                PlaybackUpdate::SongReplaced,
                PlaybackUpdate::StateChanged(PlayState::Ready),
                PlaybackUpdate::StateChanged(PlayState::Playing),
                PlaybackUpdate::StateChanged(PlayState::Recording),
                PlaybackUpdate::StateChanged(PlayState::Ready),
                PlaybackUpdate::StateChanged(PlayState::Recording),
                PlaybackUpdate::StateChanged(PlayState::Ready),
                PlaybackUpdate::SongReplaced,
                PlaybackUpdate::StateChanged(PlayState::Empty),
            ]
        );
    }

    #[test]
    fn playing_into_recording_keeps_the_clock() {
        let mut song = empty_song(DIVISION, true);
        add(&mut song, 5, &[0xc0, 1], 0);
        let mut player = player(song);
        player.play(Timestamp::ZERO);
        player.tick(at_tick(6.0));
        player.record(at_tick(50.0));
        player.tick(at_tick(8.0));
        assert!((player.playhead() - 8.0).abs() < 1e-9);
        assert_eq!(sent(&player), vec![vec![0xc0, 1]]);
    }

    #[test]
    fn skips_between_loop_and_ends() {
        let mut song = empty_song(DIVISION, true);
        add(&mut song, 0, &[0xc0, 1], 0);
        add(&mut song, 40, &[0xc0, 2], 0);
        let mut player = player(song);
        let now = Timestamp::ZERO;

        player.skip_forward(now);
        assert_eq!(player.playhead(), 40.0);
        player.skip_backward(now);
        assert_eq!(player.playhead(), 0.0);

        player.set_loop(10, 20);
        player.skip_forward(now);
        assert_eq!(player.playhead(), 20.0);
        player.skip_forward(now);
        assert_eq!(player.playhead(), 40.0);
        player.skip_backward(now);
        assert_eq!(player.playhead(), 10.0);
        player.skip_backward(now);
        assert_eq!(player.playhead(), 0.0);
    }

    #[test]
    fn replacing_the_song_resets_position() {
        let mut player = player(empty_song(DIVISION, true));
        let updates = player.subscribe();
        player.set_loop(1, 2);
        player.set_playhead(7.0, Timestamp::ZERO);
        player.set_song(Some(Song::blank()));
        assert_eq!(player.playhead(), 0.0);
        assert_eq!(player.loop_range(), (0, 0));
        let all: Vec<PlaybackUpdate> = updates.try_iter().collect();
        assert_eq!(
            &all[all.len() - 3..],
            &[
                PlaybackUpdate::SongReplaced,
                PlaybackUpdate::PlayheadMoved(0.0),
                PlaybackUpdate::LoopChanged { start: 0, end: 0 },
            ]
        );
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let mut player = PlaybackScheduler::new(Vec::<ShortMessage>::new());
        let kept = player.subscribe();
        drop(player.subscribe());
        player.set_song(Some(Song::blank()));
        assert_eq!(player.subscribers.len(), 1);
        assert_eq!(kept.try_iter().count(), 2);
    }
}
