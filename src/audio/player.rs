use std::sync::Arc;

use tracing::{debug, info, warn};

use super::decoder;
use super::engine::OutputBackend;
use super::types::{
    AudioData, EncodedAudio, OutputEvent, PlaybackState, PollOutcome, SessionId,
};
use crate::error::{DeviceError, FormatError, PlayError};

type Opener<B> = Box<dyn FnMut() -> Result<B, DeviceError>>;

/// Plays one decoded buffer through a lazily opened output pipeline.
///
/// At most one session is attached at any time; the gain outlives sessions.
pub struct PlaybackController<B: OutputBackend> {
    opener: Opener<B>,
    output: Option<B>,
    buffer: Option<Arc<AudioData>>,
    state: PlaybackState,
    gain: f32,
    next_session: u64,
}

impl<B: OutputBackend> PlaybackController<B> {
    pub fn new(opener: impl FnMut() -> Result<B, DeviceError> + 'static) -> Self {
        Self {
            opener: Box::new(opener),
            output: None,
            buffer: None,
            state: PlaybackState::Uninitialized,
            gain: 1.0,
            next_session: 1,
        }
    }

    /// Open the output pipeline once. Later calls are no-ops.
    pub fn initialize(&mut self) -> Result<(), DeviceError> {
        if self.output.is_some() {
            return Ok(());
        }
        let mut output = (self.opener)()?;
        output.set_gain(self.gain);
        self.output = Some(output);
        info!("playback pipeline initialized");
        Ok(())
    }

    /// Decode `payload` and make it the current buffer. Returns its duration in seconds.
    #[allow(dead_code)]
    pub fn load(
        &mut self,
        payload: &EncodedAudio,
        sample_rate: u32,
    ) -> Result<f64, FormatError> {
        self.unload();
        let data = decoder::decode_payload(payload, sample_rate)?;
        Ok(self.install(Arc::new(data)))
    }

    /// Replace the current buffer with an already decoded one.
    pub fn install(&mut self, buffer: Arc<AudioData>) -> f64 {
        self.release_session();
        let duration = buffer.duration;
        self.buffer = Some(buffer);
        self.state = PlaybackState::Ready;
        debug!(duration, "buffer installed");
        duration
    }

    /// Drop the current buffer; the controller is not ready until the next install.
    pub fn unload(&mut self) {
        self.release_session();
        self.buffer = None;
        self.state = PlaybackState::Uninitialized;
    }

    /// Start a fresh session from the beginning of the buffer, replacing any active one.
    pub fn play(&mut self) -> Result<SessionId, PlayError> {
        let buffer = match (&self.state, &self.buffer) {
            (PlaybackState::Uninitialized, _) | (_, None) => return Err(PlayError::NotReady),
            (_, Some(buffer)) => buffer.clone(),
        };

        self.initialize()?;
        self.release_session();

        let output = self.output.as_mut().ok_or(DeviceError::Closed)?;
        if output.is_suspended() {
            debug!("resuming suspended output");
            output.resume()?;
        }

        let id = SessionId(self.next_session);
        self.next_session += 1;
        output.start(id, buffer)?;
        self.state = PlaybackState::Playing(id);
        debug!(session = id.0, "session started");
        Ok(id)
    }

    /// Stop the active session. No-op when nothing is playing.
    pub fn stop(&mut self) {
        self.release_session();
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.gain = if muted { 0.0 } else { 1.0 };
        if let Some(output) = self.output.as_mut() {
            output.set_gain(self.gain);
        }
    }

    /// Drain output events.
    ///
    /// Completions of sessions that were already stopped or superseded are ignored.
    /// A stream error stops the session and releases the pipeline; the buffer stays
    /// installed and the next play reopens the device.
    pub fn poll(&mut self) -> PollOutcome {
        let Some(output) = self.output.as_mut() else {
            return PollOutcome::Idle;
        };

        let mut outcome = PollOutcome::Idle;
        let mut failure = None;
        while let Some(event) = output.poll_event() {
            match event {
                OutputEvent::SessionEnded(id) if self.state == PlaybackState::Playing(id) => {
                    self.state = PlaybackState::Ready;
                    outcome = PollOutcome::Finished;
                    info!(session = id.0, "playback finished");
                }
                OutputEvent::SessionEnded(id) => {
                    debug!(session = id.0, "ignoring completion of an inactive session");
                }
                OutputEvent::StreamError(e) => {
                    warn!("output stream reported an error: {e}");
                    failure = Some(DeviceError::Stream(e));
                }
            }
        }

        if let Some(e) = failure {
            self.close();
            return PollOutcome::Failed(e);
        }
        outcome
    }

    /// Stop any session and release the output pipeline.
    pub fn close(&mut self) {
        self.release_session();
        if let Some(mut output) = self.output.take() {
            output.close();
            info!("playback pipeline released");
        }
    }

    fn release_session(&mut self) {
        if let PlaybackState::Playing(id) = self.state {
            if let Some(output) = self.output.as_mut() {
                output.stop(id);
            }
            self.state = PlaybackState::Ready;
            debug!(session = id.0, "session stopped");
        }
    }

    #[allow(dead_code)]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state != PlaybackState::Uninitialized
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, PlaybackState::Playing(_))
    }

    #[allow(dead_code)]
    pub fn is_muted(&self) -> bool {
        self.gain == 0.0
    }

    #[allow(dead_code)]
    pub fn gain(&self) -> f32 {
        self.gain
    }

    #[allow(dead_code)]
    pub fn duration(&self) -> Option<f64> {
        self.buffer.as_ref().map(|b| b.duration)
    }
}

impl<B: OutputBackend> Drop for PlaybackController<B> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::mock::{MockOutput, SharedLog};

    fn ready_controller() -> (PlaybackController<MockOutput>, SharedLog) {
        let (opener, log) = MockOutput::opener();
        let mut controller = PlaybackController::new(opener);
        controller.install(Arc::new(AudioData::new(vec![0.1; 2400], 24_000)));
        (controller, log)
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let (opener, log) = MockOutput::opener();
        let mut controller = PlaybackController::new(opener);
        controller.initialize().unwrap();
        controller.initialize().unwrap();
        assert_eq!(log.borrow().opened, 1);
        assert_eq!(log.borrow().gains, vec![1.0]);
    }

    #[test]
    fn test_play_requires_buffer() {
        let (opener, log) = MockOutput::opener();
        let mut controller = PlaybackController::new(opener);
        assert_eq!(controller.play(), Err(PlayError::NotReady));
        assert_eq!(log.borrow().opened, 0);
    }

    #[test]
    fn test_load_decodes_and_reports_duration() {
        let (opener, _log) = MockOutput::opener();
        let mut controller = PlaybackController::new(opener);
        // 4 zero bytes: two samples.
        let duration = controller.load(&EncodedAudio::new("AAAAAA=="), 2).unwrap();
        assert!((duration - 1.0).abs() < 1e-12);
        assert_eq!(controller.state(), PlaybackState::Ready);
    }

    #[test]
    fn test_failed_load_leaves_controller_not_ready() {
        let (mut controller, log) = ready_controller();
        controller.play().unwrap();

        let err = controller.load(&EncodedAudio::new("AQID"), 24_000).unwrap_err();
        assert_eq!(err, FormatError::OddLength(3));
        assert!(!controller.is_ready());
        assert_eq!(controller.duration(), None);
        assert_eq!(log.borrow().active, None);
    }

    #[test]
    fn test_play_resumes_suspended_output() {
        let (mut controller, log) = ready_controller();
        controller.play().unwrap();
        assert_eq!(log.borrow().resumed, 1);
        assert!(!log.borrow().suspended);

        controller.stop();
        controller.play().unwrap();
        assert_eq!(log.borrow().resumed, 1);
    }

    #[test]
    fn test_second_play_supersedes_first() {
        let (mut controller, log) = ready_controller();
        let first = controller.play().unwrap();
        let second = controller.play().unwrap();

        assert_ne!(first, second);
        let log = log.borrow();
        assert_eq!(log.overlaps, 0);
        assert_eq!(log.stopped, vec![first]);
        assert_eq!(log.active, Some(second));
        assert_eq!(controller.state(), PlaybackState::Playing(second));
    }

    #[test]
    fn test_stop_when_idle_is_noop() {
        let (mut controller, log) = ready_controller();
        controller.stop();
        controller.stop();
        assert!(log.borrow().stopped.is_empty());
        assert_eq!(controller.state(), PlaybackState::Ready);
    }

    #[test]
    fn test_mute_survives_sessions() {
        let (mut controller, log) = ready_controller();
        controller.set_muted(true);
        for _ in 0..3 {
            controller.play().unwrap();
            controller.stop();
        }
        assert!(controller.is_muted());
        assert_eq!(log.borrow().current_gain(), Some(0.0));

        controller.set_muted(false);
        assert_eq!(controller.gain(), 1.0);
        assert_eq!(log.borrow().current_gain(), Some(1.0));
        assert!(!controller.is_playing());
    }

    #[test]
    fn test_natural_end_returns_to_ready() {
        let (mut controller, log) = ready_controller();
        controller.play().unwrap();
        log.borrow_mut().finish_active();

        assert_eq!(controller.poll(), PollOutcome::Finished);
        assert_eq!(controller.state(), PlaybackState::Ready);
        assert_eq!(controller.poll(), PollOutcome::Idle);
    }

    #[test]
    fn test_completion_after_stop_is_ignored() {
        let (mut controller, log) = ready_controller();
        let id = controller.play().unwrap();
        controller.stop();
        log.borrow_mut()
            .events
            .push_back(OutputEvent::SessionEnded(id));

        assert_eq!(controller.poll(), PollOutcome::Idle);
        controller.stop();
        assert_eq!(controller.state(), PlaybackState::Ready);
    }

    #[test]
    fn test_completion_of_superseded_session_is_ignored() {
        let (mut controller, log) = ready_controller();
        let first = controller.play().unwrap();
        let second = controller.play().unwrap();
        log.borrow_mut()
            .events
            .push_back(OutputEvent::SessionEnded(first));

        assert_eq!(controller.poll(), PollOutcome::Idle);
        assert_eq!(controller.state(), PlaybackState::Playing(second));
    }

    #[test]
    fn test_device_failure_is_surfaced() {
        let (mut controller, log) = ready_controller();
        log.borrow_mut().fail_open = true;
        assert_eq!(
            controller.play(),
            Err(PlayError::Device(DeviceError::NoDevice))
        );
        assert_eq!(controller.state(), PlaybackState::Ready);
    }

    #[test]
    fn test_stream_error_ends_session_and_reopens_on_play() {
        let (mut controller, log) = ready_controller();
        let first = controller.play().unwrap();
        log.borrow_mut()
            .events
            .push_back(OutputEvent::StreamError("device lost".to_string()));

        assert_eq!(
            controller.poll(),
            PollOutcome::Failed(DeviceError::Stream("device lost".to_string()))
        );
        assert_eq!(controller.state(), PlaybackState::Ready);
        assert!(log.borrow().closed);
        assert_eq!(log.borrow().stopped, vec![first]);

        controller.play().unwrap();
        assert_eq!(log.borrow().opened, 2);
        assert!(controller.is_playing());
    }

    #[test]
    fn test_drop_releases_pipeline() {
        let (mut controller, log) = ready_controller();
        controller.play().unwrap();
        drop(controller);
        let log = log.borrow();
        assert!(log.closed);
        assert_eq!(log.active, None);
        assert_eq!(log.stopped.len(), 1);
    }
}
