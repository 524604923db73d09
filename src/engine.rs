use crate::config::PlayerConfig;
use crate::events::PlaybackUpdate;
use crate::song::Song;
use crate::timing::{PlaybackScheduler, Timestamp};
use crate::transport::{MidiSink, MidiSource};
use crossbeam::channel::{Receiver, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub enum EngineCommand {
    Load(Song),
    Play,
    Record,
    Stop,
    Seek(f64),
    SkipBackward,
    SkipForward,
    SetLoop { start: u64, end: u64 },
    SetMetronome(f64),
    /// Stops and hands the song back as [`EngineUpdate::Song`].
    TakeSong,
    Shutdown,
}

#[derive(Debug, Clone)]
pub enum EngineUpdate {
    Playback(PlaybackUpdate),
    Song(Song),
    Stopped,
}

pub struct EngineHandle {
    pub command_tx: Sender<EngineCommand>,
    pub update_rx: Receiver<EngineUpdate>,
    pub thread: JoinHandle<()>,
}

/// Starts the engine thread. It owns the scheduler, the sink and the source
/// until [`EngineCommand::Shutdown`] or until every command sender is gone.
pub fn spawn_engine<S, I>(config: &PlayerConfig, sink: S, source: Option<I>) -> EngineHandle
where
    S: MidiSink + Send + 'static,
    I: MidiSource + Send + 'static,
{
    let (command_tx, command_rx) = crossbeam::channel::unbounded();
    let (update_tx, update_rx) = crossbeam::channel::unbounded();

    let scheduler = PlaybackScheduler::new(sink).with_metronome(config.metronome.clone());
    let tick_interval = Duration::from_millis(config.tick_interval_ms.max(1));

    let thread = std::thread::spawn(move || {
        engine_thread(scheduler, source, tick_interval, command_rx, update_tx);
    });

    EngineHandle {
        command_tx,
        update_rx,
        thread,
    }
}

struct EngineState<S, I> {
    scheduler: PlaybackScheduler<S>,
    playback_rx: Receiver<PlaybackUpdate>,
    source: Option<I>,
    started: Instant,
}

impl<S: MidiSink, I: MidiSource> EngineState<S, I> {
    fn now(&self) -> Timestamp {
        Timestamp::from(self.started.elapsed())
    }

    /// Returns false when the engine should exit.
    fn handle(&mut self, command: EngineCommand, update_tx: &Sender<EngineUpdate>) -> bool {
        let now = self.now();
        match command {
            EngineCommand::Load(song) => {
                info!("loading song with {} events", song.len());
                self.scheduler.set_song(Some(song));
            }
            EngineCommand::Play => self.scheduler.play(now),
            EngineCommand::Record => self.scheduler.record(now),
            EngineCommand::Stop => self.scheduler.stop(),
            EngineCommand::Seek(ticks) => self.scheduler.set_playhead(ticks, now),
            EngineCommand::SkipBackward => self.scheduler.skip_backward(now),
            EngineCommand::SkipForward => self.scheduler.skip_forward(now),
            EngineCommand::SetLoop { start, end } => self.scheduler.set_loop(start, end),
            EngineCommand::SetMetronome(rate) => self.scheduler.set_metronome(rate),
            EngineCommand::TakeSong => {
                self.scheduler.stop();
                self.forward(update_tx);
                if let Some(song) = self.scheduler.take_song() {
                    let _ = update_tx.send(EngineUpdate::Song(song));
                }
            }
            EngineCommand::Shutdown => {
                self.scheduler.stop();
                return false;
            }
        }
        true
    }

    fn poll_input(&mut self) {
        let Some(source) = self.source.as_mut() else {
            return;
        };
        while let Some(message) = source.try_recv() {
            self.scheduler.on_input(message.as_slice());
        }
    }

    fn forward(&self, update_tx: &Sender<EngineUpdate>) {
        for update in self.playback_rx.try_iter() {
            let _ = update_tx.send(EngineUpdate::Playback(update));
        }
    }
}

fn engine_thread<S: MidiSink, I: MidiSource>(
    mut scheduler: PlaybackScheduler<S>,
    source: Option<I>,
    tick_interval: Duration,
    command_rx: Receiver<EngineCommand>,
    update_tx: Sender<EngineUpdate>,
) {
    let playback_rx = scheduler.subscribe();
    let mut state = EngineState {
        scheduler,
        playback_rx,
        source,
        started: Instant::now(),
    };

    'running: loop {
        loop {
            match command_rx.try_recv() {
                Ok(command) => {
                    if !state.handle(command, &update_tx) {
                        break 'running;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    state.scheduler.stop();
                    break 'running;
                }
            }
        }

        state.poll_input();
        let now = state.now();
        state.scheduler.tick(now);
        state.forward(&update_tx);

        std::thread::sleep(tick_interval);
    }

    state.forward(&update_tx);
    let _ = update_tx.send(EngineUpdate::Stopped);
    debug!("engine stopped");
}
