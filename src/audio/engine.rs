use std::sync::Arc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{debug, error, info, warn};

use super::types::{AudioData, OutputCommand, OutputEvent, SessionId};
use crate::error::DeviceError;

/// The device side of the playback graph: one persistent gain stage feeding the
/// output, with at most one sound source attached at a time.
pub trait OutputBackend {
    /// Whether the device is paused and needs `resume` before it is audible.
    fn is_suspended(&self) -> bool;
    fn resume(&mut self) -> Result<(), DeviceError>;
    /// Attach a new source for `buffer` and start it immediately.
    fn start(&mut self, session: SessionId, buffer: Arc<AudioData>) -> Result<(), DeviceError>;
    /// Detach the source for `session`. Never reports `SessionEnded`.
    fn stop(&mut self, session: SessionId);
    fn set_gain(&mut self, gain: f32);
    fn poll_event(&mut self) -> Option<OutputEvent>;
    fn close(&mut self);
}

enum DeviceControl {
    Resume(Sender<Result<(), DeviceError>>),
    Close,
}

struct ActiveSession {
    id: SessionId,
    audio: Arc<AudioData>,
    /// Fractional read position in source frames.
    position: f64,
    /// Source frames consumed per output frame.
    step: f64,
}

struct EngineState {
    session: Option<ActiveSession>,
    gain: f32,
    output_sample_rate: u32,
}

impl EngineState {
    fn new(output_sample_rate: u32) -> Self {
        Self {
            session: None,
            gain: 1.0,
            output_sample_rate,
        }
    }

    fn handle_command(&mut self, cmd: OutputCommand) {
        match cmd {
            OutputCommand::Start(id, audio) => {
                let step = audio.sample_rate as f64 / self.output_sample_rate.max(1) as f64;
                self.session = Some(ActiveSession {
                    id,
                    audio,
                    position: 0.0,
                    step,
                });
            }
            OutputCommand::Stop(id) => {
                if self.session.as_ref().is_some_and(|s| s.id == id) {
                    self.session = None;
                }
            }
            OutputCommand::SetGain(gain) => {
                self.gain = gain.clamp(0.0, 1.0);
            }
        }
    }

    /// Next mono sample, linearly resampled to the device rate.
    fn next_sample(&mut self, event_tx: &Sender<OutputEvent>) -> f32 {
        let Some(session) = &mut self.session else {
            return 0.0;
        };

        let idx = session.position as usize;
        let samples = &session.audio.samples;
        if idx >= samples.len() {
            let _ = event_tx.try_send(OutputEvent::SessionEnded(session.id));
            self.session = None;
            return 0.0;
        }

        let frac = (session.position - idx as f64) as f32;
        let current = samples[idx];
        let next = samples.get(idx + 1).copied().unwrap_or(current);
        session.position += session.step;
        current + (next - current) * frac
    }

    /// Fill the output buffer, writing the mono signal to every channel.
    fn fill_buffer<T>(&mut self, output: &mut [T], channels: u16, event_tx: &Sender<OutputEvent>)
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let channels = channels.max(1) as usize;
        for frame in output.chunks_mut(channels) {
            let value = self.next_sample(event_tx) * self.gain;
            for sample in frame.iter_mut() {
                *sample = T::from_sample(value);
            }
        }
    }
}

/// Default output device driven through cpal.
///
/// The stream lives on its own `audio-device` thread; the realtime callback is fed
/// through a bounded command channel and reports back on an event channel.
pub struct CpalOutput {
    cmd_tx: Sender<OutputCommand>,
    event_rx: Receiver<OutputEvent>,
    control_tx: Sender<DeviceControl>,
    device_thread: Option<JoinHandle<()>>,
    suspended: bool,
}

impl CpalOutput {
    /// Open the default output device. The stream starts suspended.
    pub fn open() -> Result<Self, DeviceError> {
        let (cmd_tx, cmd_rx) = crossbeam_channel::bounded::<OutputCommand>(64);
        let (event_tx, event_rx) = crossbeam_channel::bounded::<OutputEvent>(256);
        let (control_tx, control_rx) = crossbeam_channel::unbounded::<DeviceControl>();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<u32, DeviceError>>(1);

        let handle = std::thread::Builder::new()
            .name("audio-device".into())
            .spawn(move || run_device(cmd_rx, event_tx, control_rx, ready_tx))
            .map_err(|e| DeviceError::Stream(format!("failed to spawn device thread: {e}")))?;

        match ready_rx.recv() {
            Ok(Ok(sample_rate)) => {
                info!(sample_rate, "audio output opened");
                Ok(Self {
                    cmd_tx,
                    event_rx,
                    control_tx,
                    device_thread: Some(handle),
                    suspended: true,
                })
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(DeviceError::Closed)
            }
        }
    }

    fn send(&self, cmd: OutputCommand) -> Result<(), DeviceError> {
        self.cmd_tx.try_send(cmd).map_err(|e| match e {
            TrySendError::Full(_) => DeviceError::Stream("command queue is full".to_string()),
            TrySendError::Disconnected(_) => DeviceError::Closed,
        })
    }
}

impl OutputBackend for CpalOutput {
    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn resume(&mut self) -> Result<(), DeviceError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.control_tx
            .send(DeviceControl::Resume(reply_tx))
            .map_err(|_| DeviceError::Closed)?;
        reply_rx.recv().map_err(|_| DeviceError::Closed)??;
        self.suspended = false;
        debug!("audio output resumed");
        Ok(())
    }

    fn start(&mut self, session: SessionId, buffer: Arc<AudioData>) -> Result<(), DeviceError> {
        self.send(OutputCommand::Start(session, buffer))
    }

    fn stop(&mut self, session: SessionId) {
        if let Err(e) = self.send(OutputCommand::Stop(session)) {
            warn!(session = session.0, "failed to stop session: {e}");
        }
    }

    fn set_gain(&mut self, gain: f32) {
        if let Err(e) = self.send(OutputCommand::SetGain(gain)) {
            warn!("failed to set gain: {e}");
        }
    }

    fn poll_event(&mut self) -> Option<OutputEvent> {
        self.event_rx.try_recv().ok()
    }

    fn close(&mut self) {
        if let Some(handle) = self.device_thread.take() {
            let _ = self.control_tx.send(DeviceControl::Close);
            if handle.join().is_err() {
                error!("audio device thread panicked");
            }
            info!("audio output closed");
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}

/// Body of the `audio-device` thread: owns the stream until told to close.
fn run_device(
    cmd_rx: Receiver<OutputCommand>,
    event_tx: Sender<OutputEvent>,
    control_rx: Receiver<DeviceControl>,
    ready_tx: Sender<Result<u32, DeviceError>>,
) {
    let (stream, sample_rate) = match build_stream(cmd_rx, event_tx) {
        Ok(built) => built,
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    // Suspended until the first play.
    if let Err(e) = stream.pause() {
        debug!("could not pause new stream: {e}");
    }
    let _ = ready_tx.send(Ok(sample_rate));

    for control in control_rx.iter() {
        match control {
            DeviceControl::Resume(reply) => {
                let result = stream
                    .play()
                    .map_err(|e| DeviceError::Resume(e.to_string()));
                let _ = reply.send(result);
            }
            DeviceControl::Close => break,
        }
    }
}

fn build_stream(
    cmd_rx: Receiver<OutputCommand>,
    event_tx: Sender<OutputEvent>,
) -> Result<(cpal::Stream, u32), DeviceError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(DeviceError::NoDevice)?;

    let config = device
        .default_output_config()
        .map_err(|e| DeviceError::Config(e.to_string()))?;

    let sample_rate = config.sample_rate();
    let sample_format = config.sample_format();

    let stream = match sample_format {
        cpal::SampleFormat::F32 => {
            build_typed_stream::<f32>(&device, &config.into(), sample_rate, cmd_rx, event_tx)?
        }
        cpal::SampleFormat::I16 => {
            build_typed_stream::<i16>(&device, &config.into(), sample_rate, cmd_rx, event_tx)?
        }
        cpal::SampleFormat::U16 => {
            build_typed_stream::<u16>(&device, &config.into(), sample_rate, cmd_rx, event_tx)?
        }
        format => {
            return Err(DeviceError::Config(format!(
                "unsupported sample format: {format:?}"
            )))
        }
    };

    Ok((stream, sample_rate))
}

fn build_typed_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_rate: u32,
    cmd_rx: Receiver<OutputCommand>,
    event_tx: Sender<OutputEvent>,
) -> Result<cpal::Stream, DeviceError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels;
    let mut state = EngineState::new(sample_rate);
    let error_tx = event_tx.clone();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                while let Ok(cmd) = cmd_rx.try_recv() {
                    state.handle_command(cmd);
                }
                state.fill_buffer(data, channels, &event_tx);
            },
            move |err| {
                error!("audio stream error: {err}");
                let _ = error_tx.try_send(OutputEvent::StreamError(err.to_string()));
            },
            None,
        )
        .map_err(|e| DeviceError::Stream(format!("failed to build output stream: {e}")))
}
