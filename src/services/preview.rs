use anyhow::{anyhow, Result};
use log::warn;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

/// What a preview gesture points at. Voice previews and avatar previews
/// share one playback slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewId {
    Voice(u32),
    Avatar(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreviewState {
    #[default]
    Idle,
    Playing(PreviewId),
}

/// Media playback backend. `play` replaces whatever was playing before.
pub trait PreviewSink: Send {
    fn play(&mut self, data: Vec<u8>) -> Result<()>;
    fn stop(&mut self);
    fn is_finished(&self) -> bool;
}

/// Enforces the preview contract: at most one preview playing at a time,
/// re-activating the playing entry stops it, playback end returns to idle.
/// Selection is a separate gesture and never passes through here.
pub struct PreviewController {
    sink: Box<dyn PreviewSink>,
    state: PreviewState,
}

impl PreviewController {
    pub fn new(sink: Box<dyn PreviewSink>) -> Self {
        Self {
            sink,
            state: PreviewState::Idle,
        }
    }

    pub fn state(&self) -> PreviewState {
        self.state
    }

    /// Start, switch, or stop playback depending on the current state.
    /// `data` is the media payload for `id`.
    pub fn toggle(&mut self, id: PreviewId, data: Vec<u8>) -> Result<PreviewState> {
        match self.state {
            PreviewState::Playing(current) if current == id => {
                self.sink.stop();
                self.state = PreviewState::Idle;
            }
            _ => {
                self.sink.stop();
                self.sink.play(data)?;
                self.state = PreviewState::Playing(id);
            }
        }
        Ok(self.state)
    }

    pub fn stop(&mut self) {
        self.sink.stop();
        self.state = PreviewState::Idle;
    }

    /// Folds a finished sink back into the idle state. Call before rendering
    /// the step menu.
    pub fn refresh(&mut self) {
        if matches!(self.state, PreviewState::Playing(_)) && self.sink.is_finished() {
            self.state = PreviewState::Idle;
        }
    }
}

enum SinkCommand {
    Play(Vec<u8>),
    Stop,
}

/// rodio-backed sink. The output stream handle is not `Send`, so a dedicated
/// thread owns it and takes commands over a channel.
pub struct AudioPreviewSink {
    tx: mpsc::Sender<SinkCommand>,
    finished: Arc<AtomicBool>,
}

impl AudioPreviewSink {
    pub fn spawn() -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let finished = Arc::new(AtomicBool::new(true));
        let finished_flag = finished.clone();
        let (ready_tx, ready_rx) = mpsc::channel();

        std::thread::Builder::new()
            .name("preview-audio".to_string())
            .spawn(move || {
                let (_stream, handle) = match rodio::OutputStream::try_default() {
                    Ok(pair) => {
                        let _ = ready_tx.send(Ok(()));
                        pair
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(anyhow!("No audio output device: {}", e)));
                        return;
                    }
                };
                let mut sink: Option<rodio::Sink> = None;

                loop {
                    match rx.recv_timeout(Duration::from_millis(100)) {
                        Ok(SinkCommand::Play(data)) => {
                            if let Some(old) = sink.take() {
                                old.stop();
                            }
                            match start_playback(&handle, data) {
                                Ok(new_sink) => {
                                    finished_flag.store(false, Ordering::SeqCst);
                                    sink = Some(new_sink);
                                }
                                Err(e) => {
                                    warn!("Preview playback failed: {:#}", e);
                                    finished_flag.store(true, Ordering::SeqCst);
                                }
                            }
                        }
                        Ok(SinkCommand::Stop) => {
                            if let Some(old) = sink.take() {
                                old.stop();
                            }
                            finished_flag.store(true, Ordering::SeqCst);
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            // Natural end of playback
                            if let Some(current) = &sink {
                                if current.empty() {
                                    finished_flag.store(true, Ordering::SeqCst);
                                    sink = None;
                                }
                            }
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;

        // Surface a missing audio device at construction, not at first play
        ready_rx.recv()??;
        Ok(Self { tx, finished })
    }
}

fn start_playback(handle: &rodio::OutputStreamHandle, data: Vec<u8>) -> Result<rodio::Sink> {
    let sink = rodio::Sink::try_new(handle)?;
    let source = rodio::Decoder::new(Cursor::new(data))?;
    sink.append(source);
    Ok(sink)
}

impl PreviewSink for AudioPreviewSink {
    fn play(&mut self, data: Vec<u8>) -> Result<()> {
        self.finished.store(false, Ordering::SeqCst);
        self.tx
            .send(SinkCommand::Play(data))
            .map_err(|_| anyhow!("Preview playback thread is gone"))
    }

    fn stop(&mut self) {
        let _ = self.tx.send(SinkCommand::Stop);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Used when audio output is disabled or unavailable; previews become
/// no-ops that end immediately.
pub struct NullPreviewSink;

impl PreviewSink for NullPreviewSink {
    fn play(&mut self, _data: Vec<u8>) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) {}

    fn is_finished(&self) -> bool {
        true
    }
}
