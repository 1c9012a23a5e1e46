use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use base64::Engine as _;
use tracing::{info, warn};

use crate::audio::decoder;
use crate::audio::engine::OutputBackend;
use crate::audio::player::PlaybackController;
use crate::audio::types::{AudioData, EncodedAudio, PollOutcome};
use crate::error::FormatError;
use crate::generation::orchestrator::ReelArtifacts;

/// Zoom reached at the end of the pan.
const END_SCALE: f32 = 1.2;
/// Pan distance reached at the end, as a fraction of the view size.
const END_OFFSET: f32 = 0.05;

/// Decode generations are unique across previews so a late result never lands on
/// a newer reel.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Pan/zoom transform for one instant of the animation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KenBurnsFrame {
    pub scale: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl KenBurnsFrame {
    pub const START: KenBurnsFrame = KenBurnsFrame {
        scale: 1.0,
        offset_x: 0.0,
        offset_y: 0.0,
    };
}

/// Slow zoom and pan whose length matches the narration.
#[derive(Debug, Clone, Default)]
pub struct KenBurns {
    duration: f64,
    started_at: Option<Instant>,
}

impl KenBurns {
    pub fn set_duration(&mut self, seconds: f64) {
        self.duration = seconds.max(0.0);
    }

    /// Reset to the start position and begin running from `now`.
    pub fn restart(&mut self, now: Instant) {
        self.halt();
        self.started_at = Some(now);
    }

    pub fn halt(&mut self) {
        self.started_at = None;
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Fraction of the animation elapsed, in [0, 1].
    pub fn progress(&self, now: Instant) -> f32 {
        let Some(started) = self.started_at else {
            return 0.0;
        };
        if self.duration <= 0.0 {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(started).as_secs_f64();
        (elapsed / self.duration).clamp(0.0, 1.0) as f32
    }

    pub fn frame(&self, now: Instant) -> KenBurnsFrame {
        let t = self.progress(now);
        // ease-in-out
        let eased = t * t * (3.0 - 2.0 * t);
        KenBurnsFrame {
            scale: 1.0 + (END_SCALE - 1.0) * eased,
            offset_x: -END_OFFSET * eased,
            offset_y: -END_OFFSET * eased,
        }
    }
}

/// Audio decode work handed to a background task.
#[derive(Debug, Clone)]
pub struct DecodeJob {
    pub generation: u64,
    pub payload: EncodedAudio,
    pub sample_rate: u32,
}

impl DecodeJob {
    pub fn run(self) -> (u64, Result<AudioData, FormatError>) {
        (
            self.generation,
            decoder::decode_payload(&self.payload, self.sample_rate),
        )
    }
}

/// Bytes behind a `data:<mime>;base64,<data>` URL.
pub fn decode_data_url(url: &str) -> Option<Vec<u8>> {
    let rest = url.strip_prefix("data:")?;
    let (meta, data) = rest.split_once(',')?;
    if !meta.ends_with(";base64") {
        return None;
    }
    base64::engine::general_purpose::STANDARD.decode(data.trim()).ok()
}

/// A finished reel: still image, narration, play/mute intents and the animation clock.
pub struct ReelPreview<B: OutputBackend> {
    artifacts: ReelArtifacts,
    controller: PlaybackController<B>,
    sample_rate: u32,
    generation: u64,
    loading: bool,
    playing: bool,
    muted: bool,
    animation: KenBurns,
    error: Option<String>,
}

impl<B: OutputBackend> ReelPreview<B> {
    /// Build a preview and the decode job that will make it ready.
    pub fn new(
        artifacts: ReelArtifacts,
        controller: PlaybackController<B>,
        sample_rate: u32,
    ) -> (Self, DecodeJob) {
        let mut preview = Self {
            artifacts: artifacts.clone(),
            controller,
            sample_rate,
            generation: 0,
            loading: false,
            playing: false,
            muted: false,
            animation: KenBurns::default(),
            error: None,
        };
        let job = preview.replace(artifacts);
        (preview, job)
    }

    /// Swap in new artifacts. Playback stops and the preview shows as loading.
    pub fn replace(&mut self, artifacts: ReelArtifacts) -> DecodeJob {
        self.controller.unload();
        self.generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        self.loading = true;
        self.playing = false;
        self.animation.halt();
        self.animation.set_duration(0.0);
        self.error = None;
        self.artifacts = artifacts;

        DecodeJob {
            generation: self.generation,
            payload: self.artifacts.audio.clone(),
            sample_rate: self.sample_rate,
        }
    }

    /// Accept the result of a decode job. Results for superseded jobs are dropped.
    pub fn finish_loading(&mut self, generation: u64, result: Result<AudioData, FormatError>) {
        if generation != self.generation {
            return;
        }
        self.loading = false;
        match result {
            Ok(data) => {
                let duration = self.controller.install(Arc::new(data));
                self.animation.set_duration(duration);
                info!(duration, "reel audio ready");
            }
            Err(e) => {
                warn!("failed to decode reel audio: {e}");
                self.error = Some(format!("Audio could not be prepared: {e}"));
            }
        }
    }

    /// Play from the start, or stop if already playing.
    pub fn toggle_play(&mut self, now: Instant) {
        if self.playing {
            self.controller.stop();
            self.playing = false;
            self.animation.halt();
            return;
        }
        if !self.is_ready() {
            return;
        }
        match self.controller.play() {
            Ok(_) => {
                self.playing = true;
                self.animation.restart(now);
            }
            Err(e) => {
                warn!("playback failed: {e}");
                self.error = Some(format!("Playback failed: {e}"));
            }
        }
    }

    pub fn toggle_mute(&mut self) {
        self.muted = !self.muted;
        self.controller.set_muted(self.muted);
    }

    /// Poll the player; returns true when the narration just ended on its own.
    ///
    /// A device failure stops playback and is kept as the preview's error.
    pub fn tick(&mut self) -> bool {
        match self.controller.poll() {
            PollOutcome::Finished if self.playing => {
                self.playing = false;
                self.animation.halt();
                true
            }
            PollOutcome::Failed(e) => {
                warn!("playback interrupted: {e}");
                self.error = Some(format!("Playback stopped: {e}"));
                self.playing = false;
                self.animation.halt();
                false
            }
            _ => false,
        }
    }

    pub fn ken_burns(&self, now: Instant) -> KenBurnsFrame {
        if self.animation.is_running() {
            self.animation.frame(now)
        } else {
            KenBurnsFrame::START
        }
    }

    pub fn is_ready(&self) -> bool {
        !self.loading && self.controller.is_ready()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn duration(&self) -> f64 {
        self.animation.duration()
    }

    /// Seconds of narration played so far.
    pub fn position(&self, now: Instant) -> f64 {
        if self.playing {
            self.animation.progress(now) as f64 * self.animation.duration()
        } else {
            0.0
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn artifacts(&self) -> &ReelArtifacts {
        &self.artifacts
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::audio::mock::{MockOutput, SharedLog};
    use crate::audio::types::OutputEvent;

    fn artifacts(audio: &str) -> ReelArtifacts {
        ReelArtifacts {
            script: "S".to_string(),
            image_prompt: "P".to_string(),
            image_url: "data:image/jpeg;base64,/9j/".to_string(),
            audio: EncodedAudio::new(audio),
        }
    }

    /// One second of silence at 4 Hz: 8 bytes.
    const ONE_SECOND: &str = "AAAAAAAAAAA=";

    fn ready_preview() -> (ReelPreview<MockOutput>, SharedLog) {
        let (opener, log) = MockOutput::opener();
        let (mut preview, job) =
            ReelPreview::new(artifacts(ONE_SECOND), PlaybackController::new(opener), 4);
        assert!(preview.is_loading());
        assert!(!preview.is_ready());
        let (generation, result) = job.run();
        preview.finish_loading(generation, result);
        (preview, log)
    }

    #[test]
    fn test_loading_then_ready() {
        let (preview, _log) = ready_preview();
        assert!(preview.is_ready());
        assert!(!preview.is_loading());
        assert!((preview.duration() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_toggle_starts_and_stops() {
        let (mut preview, log) = ready_preview();
        let now = Instant::now();

        preview.toggle_play(now);
        assert!(preview.is_playing());
        assert!(log.borrow().active.is_some());

        preview.toggle_play(now);
        assert!(!preview.is_playing());
        assert_eq!(log.borrow().active, None);
        assert_eq!(preview.ken_burns(now), KenBurnsFrame::START);
    }

    #[test]
    fn test_animation_restarts_at_start() {
        let (mut preview, _log) = ready_preview();
        let start = Instant::now();

        preview.toggle_play(start);
        let later = start + Duration::from_millis(500);
        assert!(preview.ken_burns(later).scale > 1.0);
        preview.toggle_play(later);

        preview.toggle_play(later);
        assert_eq!(preview.ken_burns(later), KenBurnsFrame::START);
        let end = later + Duration::from_secs(1);
        let frame = preview.ken_burns(end);
        assert!((frame.scale - END_SCALE).abs() < 1e-6);
        assert!((frame.offset_x + END_OFFSET).abs() < 1e-6);
    }

    #[test]
    fn test_natural_end_clears_play_intent() {
        let (mut preview, log) = ready_preview();
        let now = Instant::now();
        preview.toggle_play(now);

        assert!(!preview.tick());
        assert!(preview.is_playing());

        log.borrow_mut().finish_active();
        assert!(preview.tick());
        assert!(!preview.is_playing());
        assert_eq!(preview.ken_burns(now), KenBurnsFrame::START);

        preview.toggle_play(now);
        assert!(preview.is_playing());
        assert_eq!(log.borrow().started.len(), 2);
    }

    #[test]
    fn test_mute_is_independent_of_playback() {
        let (mut preview, log) = ready_preview();
        let now = Instant::now();
        preview.toggle_mute();
        preview.toggle_play(now);
        assert!(preview.is_muted());
        assert!(preview.is_playing());
        assert_eq!(log.borrow().current_gain(), Some(0.0));

        preview.toggle_mute();
        assert!(preview.is_playing());
        assert_eq!(log.borrow().current_gain(), Some(1.0));
    }

    #[test]
    fn test_decode_failure_stays_not_ready() {
        let (opener, log) = MockOutput::opener();
        let (mut preview, job) =
            ReelPreview::new(artifacts("AQID"), PlaybackController::new(opener), 4);
        let (generation, result) = job.run();
        preview.finish_loading(generation, result);

        assert!(!preview.is_ready());
        assert!(!preview.is_loading());
        assert!(preview.error().is_some());

        preview.toggle_play(Instant::now());
        assert!(!preview.is_playing());
        assert_eq!(log.borrow().opened, 0);
    }

    #[test]
    fn test_replace_stops_playback_and_drops_stale_decode() {
        let (mut preview, log) = ready_preview();
        let now = Instant::now();
        preview.toggle_play(now);

        let stale = preview.replace(artifacts(ONE_SECOND));
        assert!(!preview.is_playing());
        assert!(preview.is_loading());
        assert_eq!(log.borrow().active, None);

        let fresh = preview.replace(artifacts("AAAAAAAAAAAAAAAAAAAAAA=="));
        let (generation, result) = stale.run();
        preview.finish_loading(generation, result);
        assert!(preview.is_loading());

        let (generation, result) = fresh.run();
        preview.finish_loading(generation, result);
        assert!(preview.is_ready());
        assert!((preview.duration() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_stream_error_stops_playback_with_error() {
        let (mut preview, log) = ready_preview();
        let now = Instant::now();
        preview.toggle_play(now);
        log.borrow_mut()
            .events
            .push_back(OutputEvent::StreamError("device lost".to_string()));

        assert!(!preview.tick());
        assert!(!preview.is_playing());
        assert!(preview.error().is_some_and(|e| e.contains("device lost")));
        assert_eq!(preview.ken_burns(now), KenBurnsFrame::START);
        assert!(preview.is_ready());
    }

    #[test]
    fn test_decode_from_an_earlier_preview_is_ignored() {
        let (opener, _log) = MockOutput::opener();
        let (_old, old_job) =
            ReelPreview::new(artifacts(ONE_SECOND), PlaybackController::new(opener), 4);
        let (opener, _log) = MockOutput::opener();
        let (mut preview, job) = ReelPreview::new(
            artifacts("AAAAAAAAAAAAAAAAAAAAAA=="),
            PlaybackController::new(opener),
            4,
        );
        assert_ne!(old_job.generation, job.generation);

        let (generation, result) = old_job.run();
        preview.finish_loading(generation, result);
        assert!(preview.is_loading());

        let (generation, result) = job.run();
        preview.finish_loading(generation, result);
        assert!((preview.duration() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_drop_releases_output() {
        let (mut preview, log) = ready_preview();
        preview.toggle_play(Instant::now());
        drop(preview);
        assert!(log.borrow().closed);
        assert_eq!(log.borrow().active, None);
    }

    #[test]
    fn test_decode_data_url() {
        assert_eq!(
            decode_data_url("data:image/jpeg;base64,AQID"),
            Some(vec![1, 2, 3])
        );
        assert_eq!(decode_data_url("https://example.com/a.jpg"), None);
        assert_eq!(decode_data_url("data:text/plain,hello"), None);
    }
}
