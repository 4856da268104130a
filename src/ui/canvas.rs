use iced::keyboard;
use iced::mouse::{self, Cursor};
use iced::widget::canvas::{self, Path, Program, Stroke};
use iced::widget::image::Handle;
use iced::{Color, Rectangle, Renderer, Size, Theme};

use crate::editor::Editor;
use crate::geometry::{Point, Viewport};
use crate::Message;

/// Pointer/keyboard events translated into image pixel space
#[derive(Debug, Clone, Copy)]
pub enum CanvasMessage {
    Pressed(Point),
    Moved(Point),
    Released(Point),
    DeletePressed,
}

/// Stroke colors: the active selection is highlighted distinctly from
/// every other rectangle
const STROKE_NORMAL: Color = Color {
    r: 1.0,
    g: 0.0,
    b: 0.0,
    a: 1.0,
};
const STROKE_SELECTED: Color = Color {
    r: 1.0,
    g: 1.0,
    b: 0.0,
    a: 1.0,
};
const STROKE_WIDTH: f32 = 2.0;

/// The annotation surface: draws the background image at fit-to-view
/// scale plus every rectangle in the store, and adapts raw events into
/// image-space editor messages. All interaction state lives in the
/// editor, not the widget.
pub struct AnnotationCanvas<'a> {
    pub editor: &'a Editor,
    /// Background image handle, if the file loaded
    pub background: Option<&'a Handle>,
    /// Native pixel dimensions of the loaded image
    pub image_size: (f64, f64),
}

impl AnnotationCanvas<'_> {
    fn viewport(&self, bounds: Rectangle) -> Viewport {
        Viewport::new(
            self.image_size.0,
            self.image_size.1,
            bounds.width as f64,
            bounds.height as f64,
        )
    }

    /// Cursor position relative to the canvas, even while the pointer is
    /// outside it mid-drag. The viewport clamps to image extents.
    fn cursor_in_image(&self, bounds: Rectangle, cursor: Cursor) -> Option<Point> {
        cursor.position().map(|p| {
            self.viewport(bounds).to_image(Point::new(
                (p.x - bounds.x) as f64,
                (p.y - bounds.y) as f64,
            ))
        })
    }
}

impl Program<Message> for AnnotationCanvas<'_> {
    type State = ();

    fn update(
        &self,
        _state: &mut Self::State,
        event: canvas::Event,
        bounds: Rectangle,
        cursor: Cursor,
    ) -> (canvas::event::Status, Option<Message>) {
        match event {
            canvas::Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => {
                if cursor.position_in(bounds).is_some() {
                    if let Some(p) = self.cursor_in_image(bounds, cursor) {
                        return (
                            canvas::event::Status::Captured,
                            Some(Message::Canvas(CanvasMessage::Pressed(p))),
                        );
                    }
                }
            }

            canvas::Event::Mouse(mouse::Event::CursorMoved { .. }) => {
                if let Some(p) = self.cursor_in_image(bounds, cursor) {
                    return (
                        canvas::event::Status::Captured,
                        Some(Message::Canvas(CanvasMessage::Moved(p))),
                    );
                }
            }

            canvas::Event::Mouse(mouse::Event::ButtonReleased(mouse::Button::Left)) => {
                if let Some(p) = self.cursor_in_image(bounds, cursor) {
                    return (
                        canvas::event::Status::Captured,
                        Some(Message::Canvas(CanvasMessage::Released(p))),
                    );
                }
            }

            canvas::Event::Keyboard(keyboard::Event::KeyPressed {
                key: keyboard::Key::Named(keyboard::key::Named::Delete),
                ..
            }) => {
                return (
                    canvas::event::Status::Captured,
                    Some(Message::Canvas(CanvasMessage::DeletePressed)),
                );
            }

            _ => {}
        }

        (canvas::event::Status::Ignored, None)
    }

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        _theme: &Theme,
        bounds: Rectangle,
        _cursor: Cursor,
    ) -> Vec<canvas::Geometry> {
        let mut frame = canvas::Frame::new(renderer, bounds.size());
        let viewport = self.viewport(bounds);

        // Background image, scaled uniformly and centered
        if let Some(handle) = self.background {
            let scale = viewport.scale();
            let (ox, oy) = viewport.offset();
            frame.draw_image(
                Rectangle::new(
                    iced::Point::new(ox as f32, oy as f32),
                    Size::new(
                        (self.image_size.0 * scale) as f32,
                        (self.image_size.1 * scale) as f32,
                    ),
                ),
                canvas::Image::new(handle.clone()),
            );
        }

        // Full redraw of the annotation set on every frame
        let selection = self.editor.selection();
        for annotation in self.editor.store().all() {
            let display = viewport.rect_to_display(&annotation.rect());
            let color = if selection == Some(annotation.id) {
                STROKE_SELECTED
            } else {
                STROKE_NORMAL
            };
            frame.stroke(
                &Path::rectangle(
                    iced::Point::new(display.x as f32, display.y as f32),
                    Size::new(display.width as f32, display.height as f32),
                ),
                Stroke::default().with_color(color).with_width(STROKE_WIDTH),
            );
        }

        // The in-progress rectangle during a draw gesture
        if let Some(provisional) = self.editor.provisional() {
            let display = viewport.rect_to_display(&provisional);
            frame.stroke(
                &Path::rectangle(
                    iced::Point::new(display.x as f32, display.y as f32),
                    Size::new(display.width as f32, display.height as f32),
                ),
                Stroke::default()
                    .with_color(STROKE_NORMAL)
                    .with_width(STROKE_WIDTH),
            );
        }

        vec![frame.into_geometry()]
    }

    fn mouse_interaction(
        &self,
        _state: &Self::State,
        bounds: Rectangle,
        cursor: Cursor,
    ) -> mouse::Interaction {
        if cursor.is_over(bounds) && self.editor.is_tool_armed() {
            mouse::Interaction::Crosshair
        } else {
            mouse::Interaction::default()
        }
    }
}
