use smf_song::song::{
    DecodeError, NoteRelease, Opcode, Song, SongEvent, TieBreak, TrackDecodeError, UndoBuffer,
};

fn chunk(tag: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut out = tag.to_vec();
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(body);
    out
}

fn file(format: u16, division: u16, tracks: &[&[u8]]) -> Vec<u8> {
    let mut header = format.to_be_bytes().to_vec();
    header.extend_from_slice(&(tracks.len() as u16).to_be_bytes());
    header.extend_from_slice(&division.to_be_bytes());
    let mut out = chunk(b"MThd", &header);
    for track in tracks {
        out.extend(chunk(b"MTrk", track));
    }
    out
}

/// Note on at 0 and note off at 480 on track 0, volume change at 240 on track 1.
fn two_tracks() -> Vec<u8> {
    file(
        1,
        480,
        &[
            &[0x00, 0x90, 0x3c, 0x64, 0x83, 0x60, 0x80, 0x3c, 0x40, 0x00, 0xff, 0x2f, 0x00],
            &[0x81, 0x70, 0xb0, 0x07, 0x64, 0x00, 0xff, 0x2f, 0x00],
        ],
    )
}

type Shape = (u64, u16, Option<u8>, Opcode, u8, u8, Option<Vec<u8>>, Option<NoteRelease>);

fn shape(song: &Song) -> Vec<Shape> {
    song.events()
        .iter()
        .map(|e| {
            (
                e.time,
                e.track,
                e.channel,
                e.opcode,
                e.a,
                e.b,
                e.payload.clone(),
                e.release,
            )
        })
        .collect()
}

#[test]
fn tracks_merge_into_global_time_order() {
    let song = Song::decode(&two_tracks()).unwrap();
    assert_eq!(song.format, 1);
    assert_eq!(song.division(), 480);
    assert!(song.warnings().is_empty());

    let channel: Vec<(Opcode, u64, u16)> = song
        .events()
        .iter()
        .filter(|e| e.opcode != Opcode::Meta)
        .map(|e| (e.opcode, e.time, e.track))
        .collect();
    assert_eq!(
        channel,
        vec![
            (Opcode::NoteOn, 0, 0),
            (Opcode::ControlChange, 240, 1),
            (Opcode::NoteOff, 480, 0),
        ]
    );
}

#[test]
fn encode_then_decode_keeps_combined_content() {
    let mut song = Song::decode(&two_tracks()).unwrap();
    song.combine();
    let tempo_event = SongEvent::meta(song.ids().next(), 0, 0, 0x51, vec![0x07, 0xa1, 0x20]);
    song.insert_event(tempo_event, TieBreak::First).unwrap();
    let note = song.create_event(100, TieBreak::Last);
    note.track = 1;
    note.set_channel(3);
    note.set_duration(50);
    note.set_off_velocity(0);

    let before = shape(&song);
    let bytes = song.copy().encode().unwrap();
    let mut decoded = Song::decode(&bytes).unwrap();
    decoded.combine();

    // A zero off velocity is written as the default 0x40.
    let expected: Vec<Shape> = before
        .into_iter()
        .map(|mut e| {
            if let Some(release) = e.7.as_mut().filter(|r| r.off_velocity == 0) {
                release.off_velocity = 0x40;
            }
            e
        })
        .collect();
    assert_eq!(shape(&decoded), expected);
    assert_eq!(decoded.tempo(true), 500_000);
}

#[test]
fn normalize_is_stable() {
    let mut first = Song::decode(&two_tracks()).unwrap();
    let once = first.encode().unwrap();
    let mut second = Song::decode(&once).unwrap();
    assert_eq!(second.encode().unwrap(), once);
}

#[test]
fn truncated_event_keeps_earlier_events_and_other_tracks() {
    let bytes = file(
        1,
        96,
        &[
            &[0x00, 0x90, 0x3c, 0x64, 0x60, 0x80, 0x3c, 0x40, 0x00, 0xff, 0x2f, 0x00],
            &[0x00, 0xb0, 0x07, 0x64, 0x00, 0xc0, 0x05, 0x00, 0x90, 0x3c],
        ],
    );
    let song = Song::decode(&bytes).unwrap();

    assert!(matches!(
        song.warnings(),
        [TrackDecodeError::MissingData { track: 1, .. }]
    ));
    let second: Vec<Opcode> = song
        .events()
        .iter()
        .filter(|e| e.track == 1)
        .map(|e| e.opcode)
        .collect();
    assert_eq!(second, vec![Opcode::ControlChange, Opcode::ProgramChange]);
    assert_eq!(song.events().iter().filter(|e| e.track == 0).count(), 3);
}

#[test]
fn fatal_header_problems() {
    assert_eq!(Song::decode(&[]).unwrap_err(), DecodeError::MissingHeader);
    assert_eq!(
        Song::decode(&file(0, 0, &[])).unwrap_err(),
        DecodeError::ZeroDivision
    );
    let mut doubled = file(0, 96, &[]);
    doubled.extend(file(0, 96, &[]));
    assert_eq!(
        Song::decode(&doubled).unwrap_err(),
        DecodeError::DuplicateHeader
    );
}

#[test]
fn division_round_trip_stays_within_a_tick() {
    let mut song = Song::decode(&two_tracks()).unwrap();
    song.combine();
    let before = shape(&song);
    assert!(song.change_division(96));
    assert!(song.change_division(480));
    for (a, b) in shape(&song).iter().zip(&before) {
        assert!(a.0.abs_diff(b.0) <= 1);
        let (da, db) = (a.7.map_or(0, |r| r.duration), b.7.map_or(0, |r| r.duration));
        assert!(da.abs_diff(db) <= 1);
    }
}

#[test]
fn undo_restores_an_edit() {
    let mut song = Song::decode(&two_tracks()).unwrap();
    song.combine();
    let mut undo = UndoBuffer::new();

    undo.push(&song);
    let id = song.events()[0].id;
    song.event_mut(id).unwrap().set_a(72);
    song.shift_times(10);

    let restored = undo.pop(Some(&song)).unwrap();
    assert_eq!(restored.event(id).unwrap().a, 0x3c);
    assert_eq!(restored.events()[0].time, 0);

    let redone = undo.pop(Some(&restored)).unwrap();
    assert_eq!(redone.event(id).unwrap().a, 72);
    assert_eq!(shape(&redone), shape(&song));
}
