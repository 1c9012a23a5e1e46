use iced::widget::{column, container, row, text, Column};
use iced::{Color, Element};

use crate::generation::orchestrator::{ProgressStep, StepStatus};

fn marker(status: StepStatus) -> (&'static str, Color) {
    match status {
        StepStatus::Pending => ("o", Color::from_rgb(0.5, 0.55, 0.6)),
        StepStatus::Running => ("~", Color::from_rgb(0.3, 0.7, 1.0)),
        StepStatus::Complete => ("+", Color::from_rgb(0.3, 0.85, 0.5)),
        StepStatus::Error => ("x", Color::from_rgb(1.0, 0.3, 0.3)),
    }
}

/// One line per generation step.
pub fn view_progress<'a, M: 'a>(steps: &[ProgressStep]) -> Element<'a, M> {
    let rows = steps.iter().map(|step| -> Element<'a, M> {
        let (symbol, color) = marker(step.status);
        row![
            text(symbol).color(color).size(16),
            text(step.label).size(16),
        ]
        .spacing(10)
        .into()
    });

    container(column![text("Progress").size(18), Column::with_children(rows).spacing(6)].spacing(8))
        .padding(10)
        .into()
}
