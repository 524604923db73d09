use crossbeam::channel::{Receiver, Sender};
use midir::{MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use ringbuf::{
    HeapCons, HeapRb,
    traits::{Consumer, Producer, Split},
};
use thiserror::Error;
use tracing::{info, warn};

use crate::events::ShortMessage;

const CLIENT_NAME: &str = "smf-song";

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no MIDI {0} ports available")]
    NoPorts(&'static str),
    #[error("failed to initialize MIDI: {0}")]
    Init(#[from] midir::InitError),
    #[error("failed to connect to {port}: {reason}")]
    Connect { port: String, reason: String },
    #[error("failed to read port info: {0}")]
    PortInfo(#[from] midir::PortInfoError),
}

/// Where the scheduler sends outgoing channel messages.
pub trait MidiSink {
    /// Never fails; implementations log delivery problems.
    fn send(&mut self, message: &[u8]);
}

impl<S: MidiSink + ?Sized> MidiSink for &mut S {
    fn send(&mut self, message: &[u8]) {
        (**self).send(message);
    }
}

impl MidiSink for Vec<ShortMessage> {
    fn send(&mut self, message: &[u8]) {
        if let Some(message) = ShortMessage::from_slice(message) {
            self.push(message);
        }
    }
}

impl MidiSink for Sender<ShortMessage> {
    fn send(&mut self, message: &[u8]) {
        if let Some(message) = ShortMessage::from_slice(message) {
            // A dropped receiver means nobody is listening anymore.
            let _ = Sender::send(self, message);
        }
    }
}

/// Incoming live messages, polled by the host between ticks.
pub trait MidiSource {
    fn try_recv(&mut self) -> Option<ShortMessage>;
}

impl MidiSource for HeapCons<ShortMessage> {
    fn try_recv(&mut self) -> Option<ShortMessage> {
        self.try_pop()
    }
}

impl MidiSource for Receiver<ShortMessage> {
    fn try_recv(&mut self) -> Option<ShortMessage> {
        Receiver::try_recv(self).ok()
    }
}

/// Output port connection.
pub struct MidirSink {
    connection: MidiOutputConnection,
    port_name: String,
}

impl MidirSink {
    /// Connects to the first output whose name contains `port_hint`, falling
    /// back to the first output.
    pub fn connect(port_hint: Option<&str>) -> Result<Self, TransportError> {
        let midi_out = MidiOutput::new(CLIENT_NAME)?;
        let ports = midi_out.ports();
        let port = ports
            .iter()
            .find(|p| {
                port_hint.is_some_and(|hint| midi_out.port_name(p).unwrap_or_default().contains(hint))
            })
            .or_else(|| ports.first())
            .ok_or(TransportError::NoPorts("output"))?;
        let port_name = midi_out.port_name(port)?;
        info!("MIDI out: {port_name}");

        let connection = midi_out
            .connect(port, "smf-song-output")
            .map_err(|e| TransportError::Connect {
                port: port_name.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            connection,
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl MidiSink for MidirSink {
    fn send(&mut self, message: &[u8]) {
        if let Err(e) = self.connection.send(message) {
            warn!("send to {} failed: {e}", self.port_name);
        }
    }
}

/// Input port connection. The driver callback pushes into a ring buffer
/// drained by [`MidiSource::try_recv`].
pub struct MidirSource {
    _connection: MidiInputConnection<()>,
    consumer: HeapCons<ShortMessage>,
    port_name: String,
}

impl MidirSource {
    pub fn connect(port_hint: Option<&str>, capacity: usize) -> Result<Self, TransportError> {
        let midi_in = MidiInput::new(CLIENT_NAME)?;
        let ports = midi_in.ports();
        let port = ports
            .iter()
            .find(|p| {
                port_hint.is_some_and(|hint| midi_in.port_name(p).unwrap_or_default().contains(hint))
            })
            .or_else(|| ports.first())
            .ok_or(TransportError::NoPorts("input"))?;
        let port_name = midi_in.port_name(port)?;
        info!("MIDI in: {port_name}");

        let (mut producer, consumer) = HeapRb::<ShortMessage>::new(capacity.max(1)).split();
        let connection = midi_in
            .connect(
                port,
                "smf-song-input",
                move |_, message, _| {
                    let Some(message) = ShortMessage::from_slice(message) else {
                        return;
                    };
                    if producer.try_push(message).is_err() {
                        warn!("input queue full, dropping {:02x?}", message.as_slice());
                    }
                },
                (),
            )
            .map_err(|e| TransportError::Connect {
                port: port_name.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            _connection: connection,
            consumer,
            port_name,
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl MidiSource for MidirSource {
    fn try_recv(&mut self) -> Option<ShortMessage> {
        self.consumer.try_pop()
    }
}
