use std::fmt;

use thiserror::Error;
use tracing::{error, info, warn};

use super::service::{ContentService, ScriptDraft};
use crate::audio::types::EncodedAudio;
use crate::error::GenerationError;

/// The three generation stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Script,
    Image,
    Audio,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Script, Stage::Image, Stage::Audio];

    fn index(self) -> usize {
        match self {
            Stage::Script => 0,
            Stage::Image => 1,
            Stage::Audio => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Stage::Script => "Writing script and image prompt",
            Stage::Image => "Generating image",
            Stage::Audio => "Recording voiceover",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Script => "script",
            Stage::Image => "image",
            Stage::Audio => "audio",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Running,
    Complete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressStep {
    pub stage: Stage,
    pub label: &'static str,
    pub status: StepStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStatus {
    Idle,
    Generating,
    Complete,
    Error,
}

/// Artifacts gathered so far in a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialArtifacts {
    pub script: Option<String>,
    pub image_prompt: Option<String>,
    pub image_url: Option<String>,
    pub audio: Option<EncodedAudio>,
}

/// Everything a reel preview needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReelArtifacts {
    pub script: String,
    pub image_prompt: String,
    /// `data:image/jpeg;base64,...`
    pub image_url: String,
    pub audio: EncodedAudio,
}

impl PartialArtifacts {
    pub fn complete(&self) -> Option<ReelArtifacts> {
        Some(ReelArtifacts {
            script: self.script.clone()?,
            image_prompt: self.image_prompt.clone()?,
            image_url: self.image_url.clone()?,
            audio: self.audio.clone()?,
        })
    }
}

/// The remote call a stage needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageRequest {
    Script { topic: String },
    Image { prompt: String },
    Audio { script: String },
}

impl StageRequest {
    pub fn stage(&self) -> Stage {
        match self {
            StageRequest::Script { .. } => Stage::Script,
            StageRequest::Image { .. } => Stage::Image,
            StageRequest::Audio { .. } => Stage::Audio,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutput {
    Script(ScriptDraft),
    Image { image_url: String },
    Audio(EncodedAudio),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub stage: Stage,
    pub result: Result<StageOutput, GenerationError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BeginError {
    #[error("topic is empty")]
    EmptyTopic,
    #[error("a reel is already being generated")]
    AlreadyGenerating,
}

/// Turn base64 JPEG bytes into a displayable URL.
pub fn image_data_url(image_b64: &str) -> String {
    format!("data:image/jpeg;base64,{image_b64}")
}

/// Perform the remote call for one stage.
pub async fn execute(service: &dyn ContentService, request: StageRequest) -> StageOutcome {
    let stage = request.stage();
    let result = match request {
        StageRequest::Script { topic } => service
            .generate_script_and_image_prompt(&topic)
            .await
            .map(StageOutput::Script),
        StageRequest::Image { prompt } => service
            .generate_image(&prompt)
            .await
            .map(|b64| StageOutput::Image {
                image_url: image_data_url(&b64),
            }),
        StageRequest::Audio { script } => service
            .generate_audio(&script)
            .await
            .map(StageOutput::Audio),
    };
    StageOutcome { stage, result }
}

fn initial_steps() -> [ProgressStep; 3] {
    Stage::ALL.map(|stage| ProgressStep {
        stage,
        label: stage.label(),
        status: StepStatus::Pending,
    })
}

/// Sequential state machine over the script, image and audio stages.
///
/// Each transition has one entry point: `begin` starts a run, `advance` issues the
/// next stage, `apply` records its outcome.
#[derive(Debug)]
pub struct Orchestrator {
    topic: String,
    status: GenerationStatus,
    steps: [ProgressStep; 3],
    artifacts: PartialArtifacts,
    error: Option<String>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            topic: String::new(),
            status: GenerationStatus::Idle,
            steps: initial_steps(),
            artifacts: PartialArtifacts::default(),
            error: None,
        }
    }

    pub fn begin(&mut self, topic: &str) -> Result<(), BeginError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(BeginError::EmptyTopic);
        }
        if self.status == GenerationStatus::Generating {
            return Err(BeginError::AlreadyGenerating);
        }

        self.topic = topic.to_string();
        self.steps = initial_steps();
        self.artifacts = PartialArtifacts::default();
        self.error = None;
        self.status = GenerationStatus::Generating;
        info!(topic = %self.topic, "generation started");
        Ok(())
    }

    /// Mark the next pending stage running and return its request.
    ///
    /// Returns `None` when not generating or while a stage is still in flight.
    pub fn advance(&mut self) -> Option<StageRequest> {
        if self.status != GenerationStatus::Generating {
            return None;
        }
        if self.steps.iter().any(|s| s.status == StepStatus::Running) {
            return None;
        }

        let Some(stage) = self
            .steps
            .iter()
            .find(|s| s.status == StepStatus::Pending)
            .map(|s| s.stage)
        else {
            self.status = GenerationStatus::Complete;
            return None;
        };

        let request = match stage {
            Stage::Script => Some(StageRequest::Script {
                topic: self.topic.clone(),
            }),
            Stage::Image => self
                .artifacts
                .image_prompt
                .clone()
                .map(|prompt| StageRequest::Image { prompt }),
            Stage::Audio => self
                .artifacts
                .script
                .clone()
                .map(|script| StageRequest::Audio { script }),
        };

        self.steps[stage.index()].status = StepStatus::Running;
        match request {
            Some(request) => {
                info!(%stage, "stage running");
                Some(request)
            }
            None => {
                let field = if stage == Stage::Image {
                    "imagePrompt"
                } else {
                    "script"
                };
                self.fail(stage, &GenerationError::MissingField(field));
                None
            }
        }
    }

    /// Record the outcome of the running stage.
    pub fn apply(&mut self, outcome: StageOutcome) {
        let stage = outcome.stage;
        if self.status != GenerationStatus::Generating
            || self.steps[stage.index()].status != StepStatus::Running
        {
            warn!(%stage, "ignoring outcome for a stage that is not running");
            return;
        }

        match outcome.result {
            Ok(output) => {
                self.merge(output);
                self.steps[stage.index()].status = StepStatus::Complete;
                info!(%stage, "stage complete");
                if self.steps.iter().all(|s| s.status == StepStatus::Complete) {
                    self.status = GenerationStatus::Complete;
                    info!("generation complete");
                }
            }
            Err(e) => self.fail(stage, &e),
        }
    }

    /// Drive the remaining stages to completion or the first failure.
    #[allow(dead_code)]
    pub async fn run(&mut self, service: &dyn ContentService) {
        while let Some(request) = self.advance() {
            let outcome = execute(service, request).await;
            self.apply(outcome);
        }
    }

    fn merge(&mut self, output: StageOutput) {
        match output {
            StageOutput::Script(draft) => {
                self.artifacts.script = Some(draft.script);
                self.artifacts.image_prompt = Some(draft.image_prompt);
            }
            StageOutput::Image { image_url } => self.artifacts.image_url = Some(image_url),
            StageOutput::Audio(audio) => self.artifacts.audio = Some(audio),
        }
    }

    fn fail(&mut self, stage: Stage, e: &GenerationError) {
        self.steps[stage.index()].status = StepStatus::Error;
        let message = format!("Generation failed at the {stage} step: {e}");
        error!("{message}");
        self.error = Some(message);
        self.status = GenerationStatus::Error;
    }

    pub fn status(&self) -> GenerationStatus {
        self.status
    }

    pub fn is_generating(&self) -> bool {
        self.status == GenerationStatus::Generating
    }

    pub fn steps(&self) -> &[ProgressStep; 3] {
        &self.steps
    }

    #[allow(dead_code)]
    pub fn step(&self, stage: Stage) -> StepStatus {
        self.steps[stage.index()].status
    }

    pub fn artifacts(&self) -> &PartialArtifacts {
        &self.artifacts
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}
