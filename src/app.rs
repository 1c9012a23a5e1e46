use std::sync::Arc;
use std::time::{Duration, Instant};

use iced::widget::image::Handle;
use iced::widget::{button, canvas, column, container, row, scrollable, text, text_input};
use iced::{Color, Element, Length, Subscription, Task, Theme};
use tracing::{debug, info, warn};

use crate::audio::engine::CpalOutput;
use crate::audio::player::PlaybackController;
use crate::audio::types::AudioData;
use crate::config::Config;
use crate::error::FormatError;
use crate::generation::orchestrator::{self, GenerationStatus, Orchestrator, StageOutcome};
use crate::generation::service::ContentService;
use crate::preview::{self, ReelPreview};
use crate::ui::controls::{self, ControlMessage};
use crate::ui::progress;
use crate::ui::reel_canvas::ReelCanvas;

pub struct App {
    config: Config,
    service: Arc<dyn ContentService>,

    // Generation
    topic: String,
    orchestrator: Orchestrator,

    // Preview
    preview: Option<ReelPreview<CpalOutput>>,
    image: Option<Handle>,
    now: Instant,
}

#[derive(Debug, Clone)]
pub enum Message {
    TopicChanged(String),
    Generate,
    StageFinished(StageOutcome),
    AudioDecoded(u64, Result<AudioData, FormatError>),
    Control(ControlMessage),
    Tick(Instant),
}

fn boot(config: Config, service: Arc<dyn ContentService>) -> (App, Task<Message>) {
    let app = App {
        config,
        service,
        topic: String::new(),
        orchestrator: Orchestrator::new(),
        preview: None,
        image: None,
        now: Instant::now(),
    };
    (app, Task::none())
}

fn title(app: &App) -> String {
    match app.orchestrator.topic() {
        "" => "Reelsmith".to_string(),
        topic => format!("Reelsmith - {topic}"),
    }
}

/// Issue the next stage's remote call, or wrap up the run.
fn next_stage(app: &mut App) -> Task<Message> {
    match app.orchestrator.advance() {
        Some(request) => {
            let service = app.service.clone();
            Task::perform(
                async move { orchestrator::execute(service.as_ref(), request).await },
                Message::StageFinished,
            )
        }
        None => finish_run(app),
    }
}

fn finish_run(app: &mut App) -> Task<Message> {
    if app.orchestrator.status() != GenerationStatus::Complete {
        return Task::none();
    }
    let Some(artifacts) = app.orchestrator.artifacts().complete() else {
        warn!("run completed without a full set of artifacts");
        return Task::none();
    };

    app.image = preview::decode_data_url(&artifacts.image_url).map(Handle::from_bytes);
    if app.image.is_none() {
        warn!("generated image could not be decoded");
    }

    let controller = PlaybackController::new(CpalOutput::open);
    let (reel, job) = ReelPreview::new(artifacts, controller, app.config.sample_rate);
    app.preview = Some(reel);
    info!("reel assembled; decoding audio");

    let generation = job.generation;
    Task::perform(
        async move {
            match tokio::task::spawn_blocking(move || job.run()).await {
                Ok(decoded) => decoded,
                Err(e) => (
                    generation,
                    Err(FormatError::Container(format!("decode task failed: {e}"))),
                ),
            }
        },
        |(generation, result)| Message::AudioDecoded(generation, result),
    )
}

fn update(app: &mut App, message: Message) -> Task<Message> {
    match message {
        Message::TopicChanged(topic) => {
            app.topic = topic;
            Task::none()
        }
        Message::Generate => match app.orchestrator.begin(&app.topic) {
            Ok(()) => {
                // Tear down the previous reel before the new run.
                app.preview = None;
                app.image = None;
                next_stage(app)
            }
            Err(e) => {
                debug!("generate ignored: {e}");
                Task::none()
            }
        },
        Message::StageFinished(outcome) => {
            app.orchestrator.apply(outcome);
            next_stage(app)
        }
        Message::AudioDecoded(generation, result) => {
            if let Some(reel) = &mut app.preview {
                reel.finish_loading(generation, result);
            }
            Task::none()
        }
        Message::Control(ctrl) => {
            let now = Instant::now();
            app.now = now;
            if let Some(reel) = &mut app.preview {
                match ctrl {
                    ControlMessage::PlayPause => reel.toggle_play(now),
                    ControlMessage::ToggleMute => reel.toggle_mute(),
                }
            }
            Task::none()
        }
        Message::Tick(now) => {
            app.now = now;
            if let Some(reel) = &mut app.preview {
                if reel.tick() {
                    debug!("narration finished");
                }
            }
            Task::none()
        }
    }
}

const TAGLINE: &str =
    "Enter a topic and get a script, a unique image and a voiceover assembled into a short reel.";

fn view_header<'a>() -> Element<'a, Message> {
    column![
        text("Reelsmith").size(32),
        text(TAGLINE).size(14)
            .color(Color::from_rgb(0.6, 0.65, 0.7)),
    ]
    .spacing(4)
    .into()
}

fn view_input(app: &App) -> Element<'_, Message> {
    let generating = app.orchestrator.is_generating();

    let mut input = text_input("e.g. Why is the sky blue?", &app.topic).padding(10);
    if !generating {
        input = input
            .on_input(Message::TopicChanged)
            .on_submit(Message::Generate);
    }

    let label = if generating { "Generating..." } else { "Generate reel" };
    let can_generate = !generating && !app.topic.trim().is_empty();
    let generate_btn = button(text(label))
        .padding(10)
        .on_press_maybe(can_generate.then_some(Message::Generate));

    row![input, generate_btn].spacing(10).into()
}

fn view_reel<'a>(app: &'a App, reel: &'a ReelPreview<CpalOutput>) -> Element<'a, Message> {
    let reel_canvas: Element<ControlMessage> = canvas::Canvas::new(ReelCanvas {
        image: app.image.clone(),
        frame: reel.ken_burns(app.now),
        loading: reel.is_loading(),
    })
    .width(Length::Fixed(270.0))
    .height(Length::Fixed(480.0))
    .into();

    let controls = controls::view_controls(
        reel.is_ready(),
        reel.is_playing(),
        reel.is_muted(),
        reel.position(app.now),
        reel.duration(),
    );

    let mut player = column![reel_canvas, controls].spacing(5);
    if let Some(err) = reel.error() {
        player = player.push(text(err.to_string()).color(Color::from_rgb(1.0, 0.3, 0.3)));
    }

    let artifacts = reel.artifacts();
    let details = column![
        text("Image prompt").size(18).color(Color::from_rgb(0.3, 0.8, 0.9)),
        text(format!("\"{}\"", artifacts.image_prompt)).size(14),
        text("Script").size(18).color(Color::from_rgb(0.3, 0.8, 0.9)),
        text(artifacts.script.as_str()).size(15),
    ]
    .spacing(8)
    .width(Length::Fill);

    column![
        text("Your reel is ready!").size(24),
        row![Element::from(player).map(Message::Control), details].spacing(20),
    ]
    .spacing(10)
    .into()
}

fn view(app: &App) -> Element<'_, Message> {
    let mut content = column![view_header(), view_input(app)].spacing(20);

    if app.orchestrator.status() != GenerationStatus::Idle {
        content = content.push(progress::view_progress(app.orchestrator.steps()));
    }

    if let Some(err) = app.orchestrator.error() {
        content = content.push(
            container(
                column![
                    text("Generation failed").size(16),
                    text(err.to_string()).size(14),
                ]
                .spacing(4),
            )
            .padding(10)
            .style(|_theme: &Theme| container::Style {
                text_color: Some(Color::from_rgb(1.0, 0.6, 0.6)),
                background: Some(Color::from_rgba(0.5, 0.1, 0.1, 0.5).into()),
                ..container::Style::default()
            }),
        );
    }

    if let Some(reel) = &app.preview {
        content = content.push(view_reel(app, reel));
    }

    scrollable(container(content).padding(20).width(Length::Fill)).into()
}

fn subscription(app: &App) -> Subscription<Message> {
    match &app.preview {
        Some(reel) if reel.is_playing() => {
            iced::time::every(Duration::from_millis(16)).map(Message::Tick)
        }
        _ => Subscription::none(),
    }
}

fn theme(_app: &App) -> Theme {
    Theme::Dark
}

pub fn run(config: Config, service: Arc<dyn ContentService>) -> iced::Result {
    iced::application(
        move || boot(config.clone(), service.clone()),
        update,
        view,
    )
    .title(title)
    .subscription(subscription)
    .theme(theme)
    .window_size((1000.0, 760.0))
    .run()
}
