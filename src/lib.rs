pub mod codec;
pub mod config;
pub mod engine;
pub mod events;
pub mod song;
pub mod timing;
pub mod transport;

pub use config::{ConfigError, PlayerConfig};
pub use engine::{EngineCommand, EngineHandle, EngineUpdate, spawn_engine};
pub use events::{PlayState, PlaybackUpdate, ShortMessage};
pub use song::{Song, SongEvent};
pub use timing::{PlaybackScheduler, Timestamp};
pub use transport::{MidiSink, MidiSource, MidirSink, MidirSource, TransportError};
