use super::Song;

/// Single-level undo holding an owned snapshot.
#[derive(Debug, Default)]
pub struct UndoBuffer {
    snapshot: Option<Song>,
}

impl UndoBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.is_none()
    }

    /// Replaces the snapshot with a copy of `song`.
    pub fn push(&mut self, song: &Song) {
        self.snapshot = Some(song.copy());
    }

    /// Takes the snapshot. Passing the current song stores a copy of it in its
    /// place, so a second pop toggles back.
    pub fn pop(&mut self, current: Option<&Song>) -> Option<Song> {
        std::mem::replace(&mut self.snapshot, current.map(Song::copy))
    }
}
