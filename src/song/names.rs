//! Display names for notes, opcodes, controllers, meta types and GM programs.

use super::Opcode;

const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// `C-1` for note 0 through `G9` for note 127.
pub fn note_name(note: u8) -> Option<String> {
    if note > 0x7f {
        return None;
    }
    let octave = (note / 12) as i32 - 1;
    Some(format!("{}{}", PITCH_CLASSES[(note % 12) as usize], octave))
}

pub fn opcode_name(opcode: Opcode) -> &'static str {
    match opcode {
        Opcode::NoteOff => "Note Off",
        Opcode::NoteOn => "Note On",
        Opcode::NotePressure => "Note Adjust",
        Opcode::ControlChange => "Control Change",
        Opcode::ProgramChange => "Program Change",
        Opcode::ChannelPressure => "Channel Pressure",
        Opcode::PitchWheel => "Pitch Wheel",
        Opcode::SysexStart => "Sysex (unterminated)",
        Opcode::SysexEnd => "Sysex (terminated)",
        Opcode::Meta => "Meta",
    }
}

pub fn control_name(key: u8) -> Option<&'static str> {
    let name = match key {
        0x00 => "Bank MSB",
        0x01 => "Mod MSB",
        0x02 => "Breath MSB",
        0x04 => "Foot MSB",
        0x05 => "Porta Time MSB",
        0x06 => "Data Entry MSB",
        0x07 => "Volume MSB",
        0x08 => "Balance MSB",
        0x0a => "Pan MSB",
        0x0b => "Expression MSB",
        0x0c => "Effect 1 MSB",
        0x0d => "Effect 2 MSB",
        0x0e => "Effect 3 MSB",
        0x0f => "Effect 4 MSB",
        0x10 => "GP 1 MSB",
        0x11 => "GP 2 MSB",
        0x12 => "GP 3 MSB",
        0x13 => "GP 4 MSB",
        0x20 => "Bank LSB",
        0x21 => "Mod LSB",
        0x22 => "Breath LSB",
        0x24 => "Foot LSB",
        0x25 => "Porta Time LSB",
        0x26 => "Data Entry LSB",
        0x27 => "Volume LSB",
        0x28 => "Balance LSB",
        0x2a => "Pan LSB",
        0x2b => "Expression LSB",
        0x2c => "Effect 1 LSB",
        0x2d => "Effect 2 LSB",
        0x2e => "Effect 3 LSB",
        0x2f => "Effect 4 LSB",
        0x30 => "GP 1 LSB",
        0x31 => "GP 2 LSB",
        0x32 => "GP 3 LSB",
        0x33 => "GP 4 LSB",
        0x40 => "Sustain Switch",
        0x41 => "Porta Switch",
        0x42 => "Sostenuto Switch",
        0x43 => "Soft Switch",
        0x44 => "Legato Switch",
        0x45 => "Hold 2 Switch",
        0x46 => "C1 Sound Variation",
        0x47 => "C2 Timbre",
        0x48 => "C3 Release Time",
        0x49 => "C4 Attack Time",
        0x4a => "C5 Brightness",
        0x4b => "C6",
        0x4c => "C7",
        0x4d => "C8",
        0x4e => "C9",
        0x4f => "C10",
        0x50 => "GP 5",
        0x51 => "GP 6",
        0x52 => "GP 7",
        0x53 => "GP 8",
        0x54 => "Porta Control",
        0x5b => "Effect 1 Depth",
        0x5c => "Effect 2 Depth",
        0x5d => "Effect 3 Depth",
        0x5e => "Effect 4 Depth",
        0x5f => "Effect 5 Depth",
        0x78 => "All Sound Off",
        0x79 => "Reset Controllers",
        0x7a => "Local Controller Switch",
        0x7b => "All Notes Off",
        0x7c => "Omni Off",
        0x7d => "Omni On",
        0x7e => "Poly Switch",
        0x7f => "Poly On",
        _ => return None,
    };
    Some(name)
}

/// Well-known meta types only.
pub fn meta_name(kind: u8) -> Option<&'static str> {
    let name = match kind {
        0x01 => "Text",
        0x02 => "Copyright",
        0x03 => "Track Name",
        0x04 => "Instrument Name",
        0x05 => "Lyrics",
        0x06 => "Marker",
        0x07 => "Cue Point",
        0x20 => "Channel Prefix",
        0x2f => "End of Track",
        0x51 => "Set Tempo",
        0x54 => "SMPTE Offset",
        0x58 => "Time Signature",
        0x59 => "Key Signature",
        _ => return None,
    };
    Some(name)
}

const GM_PROGRAMS: [&str; 128] = [
    "Acoustic Grand Piano",
    "Bright Acoustic Piano",
    "Electric Grand Piano",
    "Honky-Tonk Piano",
    "Electric Piano 1 (Rhodes Piano)",
    "Electric Piano 2 (Chorused Piano)",
    "Harpsichord",
    "Clavinet",
    "Celesta",
    "Glockenspiel",
    "Music Box",
    "Vibraphone",
    "Marimba",
    "Xylophone",
    "Tubular Bells",
    "Dulcimer (Santur)",
    "Drawbar Organ (Hammond)",
    "Percussive Organ",
    "Rock Organ",
    "Church Organ",
    "Reed Organ",
    "Accordion (French)",
    "Harmonica",
    "Tango Accordion (Band neon)",
    "Acoustic Guitar (nylon)",
    "Acoustic Guitar (steel)",
    "Electric Guitar (jazz)",
    "Electric Guitar (clean)",
    "Electric Guitar (muted)",
    "Overdriven Guitar",
    "Distortion Guitar",
    "Guitar harmonics",
    "Acoustic Bass",
    "Electric Bass (fingered)",
    "Electric Bass (picked)",
    "Fretless Bass",
    "Slap Bass 1",
    "Slap Bass 2",
    "Synth Bass 1",
    "Synth Bass 2",
    "Violin",
    "Viola",
    "Cello",
    "Contrabass",
    "Tremolo Strings",
    "Pizzicato Strings",
    "Orchestral Harp",
    "Timpani",
    "String Ensemble 1 (strings)",
    "String Ensemble 2 (slow strings)",
    "SynthStrings 1",
    "SynthStrings 2",
    "Choir Aahs",
    "Voice Oohs",
    "Synth Voice",
    "Orchestra Hit",
    "Trumpet",
    "Trombone",
    "Tuba",
    "Muted Trumpet",
    "French Horn",
    "Brass Section",
    "SynthBrass 1",
    "SynthBrass 2",
    "Soprano Sax",
    "Alto Sax",
    "Tenor Sax",
    "Baritone Sax",
    "Oboe",
    "English Horn",
    "Bassoon",
    "Clarinet",
    "Piccolo",
    "Flute",
    "Recorder",
    "Pan Flute",
    "Blown Bottle",
    "Shakuhachi",
    "Whistle",
    "Ocarina",
    "Lead 1 (square wave)",
    "Lead 2 (sawtooth wave)",
    "Lead 3 (calliope)",
    "Lead 4 (chiffer)",
    "Lead 5 (charang)",
    "Lead 6 (voice solo)",
    "Lead 7 (fifths)",
    "Lead 8 (bass + lead)",
    "Pad 1 (new age Fantasia)",
    "Pad 2 (warm)",
    "Pad 3 (polysynth)",
    "Pad 4 (choir space voice)",
    "Pad 5 (bowed glass)",
    "Pad 6 (metallic pro)",
    "Pad 7 (halo)",
    "Pad 8 (sweep)",
    "FX 1 (rain)",
    "FX 2 (soundtrack)",
    "FX 3 (crystal)",
    "FX 4 (atmosphere)",
    "FX 5 (brightness)",
    "FX 6 (goblins)",
    "FX 7 (echoes, drops)",
    "FX 8 (sci-fi, star theme)",
    "Sitar",
    "Banjo",
    "Shamisen",
    "Koto",
    "Kalimba",
    "Bag pipe",
    "Fiddle",
    "Shanai",
    "Tinkle Bell",
    "Agogo",
    "Steel Drums",
    "Woodblock",
    "Taiko Drum",
    "Melodic Tom",
    "Synth Drum",
    "Reverse Cymbal",
    "Guitar Fret Noise",
    "Breath Noise",
    "Seashore",
    "Bird Tweet",
    "Telephone Ring",
    "Helicopter",
    "Applause",
    "Gunshot",
];

/// GM name for a fully-qualified program id: bank in bits 7..21, program in
/// the low 7 bits. A non-zero bank is appended in parentheses.
pub fn program_name(fqpid: u32) -> String {
    let bank = (fqpid >> 7) & 0x3fff;
    let name = GM_PROGRAMS[(fqpid & 0x7f) as usize];
    if bank != 0 {
        format!("{name} ({bank})")
    } else {
        name.to_string()
    }
}
