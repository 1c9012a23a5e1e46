use iced::mouse;
use iced::widget::canvas::{self, Action, Event, Frame, Geometry};
use iced::widget::image::Handle;
use iced::{Color, Pixels, Point, Rectangle, Renderer, Size, Theme};

use crate::preview::KenBurnsFrame;
use crate::ui::controls::ControlMessage;

/// The reel's still image under the current pan/zoom, plus a loading veil.
pub struct ReelCanvas {
    pub image: Option<Handle>,
    pub frame: KenBurnsFrame,
    pub loading: bool,
}

/// Where the image lands for a canvas of `size` at the given animation frame.
pub fn image_bounds(size: Size, frame: KenBurnsFrame) -> Rectangle {
    let width = size.width * frame.scale;
    let height = size.height * frame.scale;
    Rectangle {
        x: (size.width - width) / 2.0 + frame.offset_x * size.width,
        y: (size.height - height) / 2.0 + frame.offset_y * size.height,
        width,
        height,
    }
}

impl canvas::Program<ControlMessage> for ReelCanvas {
    type State = ();

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let size = bounds.size();
        let mut frame = Frame::new(renderer, size);

        frame.with_clip(Rectangle::with_size(size), |frame| {
            frame.fill_rectangle(Point::ORIGIN, size, Color::BLACK);

            if let Some(handle) = &self.image {
                frame.draw_image(
                    image_bounds(size, self.frame),
                    canvas::Image::new(handle.clone()),
                );
            }

            // Bottom shade
            let shade_height = size.height / 3.0;
            frame.fill_rectangle(
                Point::new(0.0, size.height - shade_height),
                Size::new(size.width, shade_height),
                Color::from_rgba(0.0, 0.0, 0.0, 0.35),
            );

            if self.loading {
                frame.fill_rectangle(Point::ORIGIN, size, Color::from_rgba(0.0, 0.0, 0.0, 0.5));
                frame.fill_text(canvas::Text {
                    content: "Preparing audio...".to_string(),
                    position: Point::new(size.width / 2.0 - 70.0, size.height / 2.0 - 8.0),
                    color: Color::WHITE,
                    size: Pixels(16.0),
                    ..canvas::Text::default()
                });
            }
        });

        vec![frame.into_geometry()]
    }

    fn update(
        &self,
        _state: &mut Self::State,
        event: &Event,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> Option<Action<ControlMessage>> {
        cursor.position_in(bounds)?;

        match event {
            Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) if !self.loading => {
                Some(Action::publish(ControlMessage::PlayPause).and_capture())
            }
            _ => None,
        }
    }
}
