use iced::widget::{button, container, text, Row};
use iced::{Alignment, Element};

#[derive(Debug, Clone)]
pub enum ControlMessage {
    PlayPause,
    ToggleMute,
}

/// Format seconds as M:SS.
fn format_time(seconds: f64) -> String {
    let total_secs = seconds.max(0.0) as u64;
    let mins = total_secs / 60;
    let secs = total_secs % 60;
    format!("{mins}:{secs:02}")
}

/// Build the play/pause and mute controls under the reel.
pub fn view_controls<'a>(
    ready: bool,
    playing: bool,
    muted: bool,
    position: f64,
    duration: f64,
) -> Element<'a, ControlMessage> {
    let play_label = if playing { "Pause" } else { "Play" };
    let mute_label = if muted { "Unmute" } else { "Mute" };

    let play_btn = button(text(play_label))
        .on_press_maybe((ready || playing).then_some(ControlMessage::PlayPause));
    let mute_btn = button(text(mute_label)).on_press(ControlMessage::ToggleMute);

    let status: Element<'a, ControlMessage> = if ready || playing {
        text(format!(
            "{} / {}",
            format_time(position),
            format_time(duration)
        ))
        .size(16)
        .into()
    } else {
        text("Preparing audio...").size(16).into()
    };

    let controls_row = Row::new()
        .spacing(10)
        .align_y(Alignment::Center)
        .push(play_btn)
        .push(mute_btn)
        .push(status);

    container(controls_row).padding(10).into()
}
