/// A channel message of at most three bytes, small enough to cross the
/// input ring buffer by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortMessage {
    bytes: [u8; 3],
    len: u8,
}

impl ShortMessage {
    pub fn two(status: u8, a: u8) -> Self {
        Self {
            bytes: [status, a, 0],
            len: 2,
        }
    }

    pub fn three(status: u8, a: u8, b: u8) -> Self {
        Self {
            bytes: [status, a, b],
            len: 3,
        }
    }

    /// Keeps at most the first three bytes. Empty input has no message.
    pub fn from_slice(message: &[u8]) -> Option<Self> {
        if message.is_empty() {
            return None;
        }
        let len = message.len().min(3);
        let mut bytes = [0u8; 3];
        bytes[..len].copy_from_slice(&message[..len]);
        Some(Self {
            bytes,
            len: len as u8,
        })
    }

    pub fn status(&self) -> u8 {
        self.bytes[0]
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    /// No song loaded.
    Empty,
    Ready,
    Playing,
    Recording,
}

impl PlayState {
    pub fn is_running(self) -> bool {
        matches!(self, PlayState::Playing | PlayState::Recording)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackUpdate {
    SongReplaced,
    StateChanged(PlayState),
    /// Playhead in ticks, fractional while running.
    PlayheadMoved(f64),
    LoopChanged { start: u64, end: u64 },
    MetronomeClick,
}
