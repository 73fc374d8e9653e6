/// Map surface
///
/// Draws the scene under the current rotation and turns mouse/touch input
/// into viewport events. The layer (graticule and markers) is rotated by the
/// drawn bearing; each marker and the popup are rotated back by their own
/// counter-rotation so they stay upright.
use cgmath::Vector2;
use iced::alignment;
use iced::mouse::{self, Cursor};
use iced::touch;
use iced::widget::canvas::{self, Frame, Path, Program, Stroke};
use iced::{Color, Pixels, Point, Rectangle, Renderer, Size, Theme, Vector};

use crate::map::engine::{Popup, Scene};
use crate::map::gesture::PointerTracker;
use crate::map::markers::{Glyph, Marker, Tone};
use crate::map::viewport::{project, Affordance, ViewportEvent, TILE_SIZE};
use crate::state::data::LocationType;
use crate::Message;

pub struct MapCanvas<'a> {
    pub scene: &'a Scene<Message>,
}

/// Pointer state kept by the canvas between events
#[derive(Debug, Default)]
pub struct PointerState {
    tracker: PointerTracker,
    /// Last size reported to the viewport
    size: Option<Size>,
}

fn to_vector(point: Point) -> Vector2<f64> {
    Vector2::new(point.x as f64, point.y as f64)
}

impl MapCanvas<'_> {
    /// Feed one event through the pointer tracker
    fn input(
        &self,
        state: &mut PointerState,
        event: canvas::Event,
        bounds: Rectangle,
        cursor: Cursor,
    ) -> (canvas::event::Status, Option<ViewportEvent>) {
        let bearing = self.scene.viewport().bearing();
        let event = match event {
            canvas::Event::Mouse(mouse::Event::WheelScrolled { delta }) => {
                if !cursor.is_over(bounds) {
                    return (canvas::event::Status::Ignored, None);
                }
                let zoom = match delta {
                    mouse::ScrollDelta::Lines { y, .. } => y as f64 * 0.5,
                    mouse::ScrollDelta::Pixels { y, .. } => y as f64 / 100.0,
                };
                Some(ViewportEvent::Zoom(zoom))
            }
            canvas::Event::Mouse(mouse::Event::ButtonPressed(mouse::Button::Left)) => {
                let Some(at) = cursor.position_in(bounds) else {
                    return (canvas::event::Status::Ignored, None);
                };
                state.tracker.pointer_pressed(to_vector(at));
                return (canvas::event::Status::Captured, None);
            }
            canvas::Event::Mouse(mouse::Event::ButtonReleased(mouse::Button::Left)) => {
                match cursor.position_in(bounds) {
                    Some(at) => state.tracker.pointer_released(to_vector(at)),
                    None => {
                        state.tracker.pointer_cancelled();
                        None
                    }
                }
            }
            canvas::Event::Mouse(mouse::Event::CursorMoved { .. }) => cursor
                .position_in(bounds)
                .and_then(|at| state.tracker.pointer_moved(to_vector(at))),
            canvas::Event::Touch(touch::Event::FingerPressed { id, position }) => {
                if !bounds.contains(position) {
                    return (canvas::event::Status::Ignored, None);
                }
                let at = to_vector(position) - to_vector(bounds.position());
                state.tracker.finger_pressed(id.0, at, bearing);
                return (canvas::event::Status::Captured, None);
            }
            canvas::Event::Touch(touch::Event::FingerMoved { id, position }) => {
                let at = to_vector(position) - to_vector(bounds.position());
                state.tracker.finger_moved(id.0, at)
            }
            canvas::Event::Touch(touch::Event::FingerLifted { id, position }) => {
                let at = to_vector(position) - to_vector(bounds.position());
                state.tracker.finger_lifted(id.0, at, bearing)
            }
            canvas::Event::Touch(touch::Event::FingerLost { id, .. }) => {
                state.tracker.finger_lost(id.0);
                None
            }
            _ => None,
        };

        match event {
            Some(event) => (canvas::event::Status::Captured, Some(event)),
            None => (canvas::event::Status::Ignored, None),
        }
    }
}

impl<'a> Program<Message> for MapCanvas<'a> {
    type State = PointerState;

    fn update(
        &self,
        state: &mut Self::State,
        event: canvas::Event,
        bounds: Rectangle,
        cursor: Cursor,
    ) -> (canvas::event::Status, Option<Message>) {
        let resized = (state.size != Some(bounds.size())).then(|| {
            state.size = Some(bounds.size());
            Vector2::new(bounds.width as f64, bounds.height as f64)
        });

        // the event that revealed the new size still reaches the tracker
        let (status, event) = self.input(state, event, bounds, cursor);

        match (resized, event) {
            (Some(size), event) => (status, Some(Message::SurfaceResized(size, event))),
            (None, Some(event)) => (
                canvas::event::Status::Captured,
                Some(Message::Viewport(event)),
            ),
            (None, None) => (status, None),
        }
    }

    fn draw(
        &self,
        _state: &Self::State,
        renderer: &Renderer,
        theme: &Theme,
        bounds: Rectangle,
        _cursor: Cursor,
    ) -> Vec<canvas::Geometry> {
        let mut frame = Frame::new(renderer, bounds.size());
        let palette = theme.extended_palette();
        frame.fill_rectangle(Point::ORIGIN, bounds.size(), palette.background.weak.color);

        let viewport = self.scene.viewport();
        let Some(size) = viewport.size() else {
            return vec![frame.into_geometry()];
        };
        let half = Vector::new(size.x as f32 / 2.0, size.y as f32 / 2.0);

        frame.with_save(|frame| {
            frame.translate(half);
            frame.rotate(self.scene.layer_bearing().to_radians() as f32);
            frame.translate(Vector::new(-half.x, -half.y));

            draw_graticule(frame, self.scene, size, palette.background.strong.color);

            for marker in self.scene.markers() {
                let Some(at) = viewport.layer_point(marker.position) else {
                    continue;
                };
                frame.with_save(|frame| {
                    frame.translate(Vector::new(at.x as f32, at.y as f32));
                    frame.rotate(marker.counter_rotation.to_radians() as f32);
                    draw_glyph(frame, marker);
                });
            }

            if let Some(popup) = self.scene.popup() {
                if let Some(at) = viewport.layer_point(popup.anchor) {
                    frame.with_save(|frame| {
                        frame.translate(Vector::new(at.x as f32, at.y as f32));
                        frame.rotate(popup.counter_rotation.to_radians() as f32);
                        draw_popup(frame, popup);
                    });
                }
            }
        });

        vec![frame.into_geometry()]
    }

    fn mouse_interaction(
        &self,
        state: &Self::State,
        bounds: Rectangle,
        cursor: Cursor,
    ) -> mouse::Interaction {
        if !cursor.is_over(bounds) {
            return mouse::Interaction::default();
        }
        match self.scene.viewport().affordance() {
            Affordance::Crosshair => mouse::Interaction::Crosshair,
            Affordance::Default if state.tracker.is_dragging() || state.tracker.is_gesturing() => {
                mouse::Interaction::Grabbing
            }
            Affordance::Default => mouse::Interaction::Grab,
        }
    }
}

/// Tile-sized grid lines in the unrotated layer, padded so rotation never
/// shows a bare corner
fn draw_graticule(frame: &mut Frame, scene: &Scene<Message>, size: Vector2<f64>, color: Color) {
    let viewport = scene.viewport();
    let half = size / 2.0;
    let pad = (size.x * size.x + size.y * size.y).sqrt() / 2.0;
    let origin = project(viewport.center(), viewport.zoom()) - half;

    let mut builder = canvas::path::Builder::new();
    let first_x = ((origin.x - pad) / TILE_SIZE).floor() * TILE_SIZE;
    let mut x = first_x;
    while x <= origin.x + size.x + pad {
        let sx = (x - origin.x) as f32;
        builder.move_to(Point::new(sx, -pad as f32));
        builder.line_to(Point::new(sx, (size.y + pad) as f32));
        x += TILE_SIZE;
    }
    let first_y = ((origin.y - pad) / TILE_SIZE).floor() * TILE_SIZE;
    let mut y = first_y;
    while y <= origin.y + size.y + pad {
        let sy = (y - origin.y) as f32;
        builder.move_to(Point::new(-pad as f32, sy));
        builder.line_to(Point::new((size.x + pad) as f32, sy));
        y += TILE_SIZE;
    }
    frame.stroke(
        &builder.build(),
        Stroke::default().with_color(color).with_width(1.0),
    );
}

fn tone_color(tone: Tone) -> Color {
    match tone {
        Tone::User => Color::from_rgb8(0x25, 0x63, 0xeb),
        Tone::Spot(LocationType::Tag) => Color::from_rgb8(0x3b, 0x82, 0xf6),
        Tone::Spot(LocationType::Throw) => Color::from_rgb8(0x10, 0xb9, 0x81),
        Tone::Spot(LocationType::Burner) => Color::from_rgb8(0xa8, 0x55, 0xf7),
        Tone::Spot(LocationType::Roller) => Color::from_rgb8(0x06, 0xb6, 0xd4),
        Tone::Warning => Color::from_rgb8(0xf5, 0x9e, 0x0b),
        Tone::Unsaved => Color::from_rgb8(0xef, 0x44, 0x44),
    }
}

fn outline() -> Stroke<'static> {
    Stroke::default().with_color(Color::WHITE).with_width(2.0)
}

/// Draw one glyph centred on the current origin
fn draw_glyph(frame: &mut Frame, marker: &Marker) {
    let color = tone_color(marker.glyph.tone());
    match marker.glyph {
        Glyph::UserArrow => {
            let halo = Color { a: 0.2, ..color };
            frame.fill(&Path::circle(Point::ORIGIN, 15.0), halo);
            frame.with_save(|frame| {
                frame.rotate(marker.rotation.to_radians() as f32);
                let arrow = Path::new(|b| {
                    b.move_to(Point::new(0.0, -26.0));
                    b.line_to(Point::new(6.0, -6.0));
                    b.line_to(Point::new(-6.0, -6.0));
                    b.close();
                });
                frame.fill(&arrow, color);
            });
            let dot = Path::circle(Point::ORIGIN, 6.0);
            frame.fill(&dot, color);
            frame.stroke(&dot, outline());
        }
        Glyph::Spot(kind) => {
            let shape = match kind {
                LocationType::Tag => Path::circle(Point::ORIGIN, 9.0),
                LocationType::Throw => Path::new(|b| {
                    b.move_to(Point::new(0.0, -11.0));
                    b.line_to(Point::new(11.0, 0.0));
                    b.line_to(Point::new(0.0, 11.0));
                    b.line_to(Point::new(-11.0, 0.0));
                    b.close();
                }),
                LocationType::Burner => Path::new(|b| {
                    b.move_to(Point::new(0.0, -11.0));
                    b.line_to(Point::new(10.0, 8.0));
                    b.line_to(Point::new(-10.0, 8.0));
                    b.close();
                }),
                LocationType::Roller => Path::rectangle(Point::new(-8.0, -8.0), Size::new(16.0, 16.0)),
            };
            frame.fill(&shape, color);
            frame.stroke(&shape, outline());
        }
        Glyph::ProspectCross => {
            let cross = Path::new(|b| {
                b.move_to(Point::new(-8.0, -8.0));
                b.line_to(Point::new(8.0, 8.0));
                b.move_to(Point::new(8.0, -8.0));
                b.line_to(Point::new(-8.0, 8.0));
            });
            frame.stroke(&cross, Stroke::default().with_color(Color::WHITE).with_width(7.0));
            frame.stroke(&cross, Stroke::default().with_color(color).with_width(4.0));
        }
        Glyph::PendingPin(_) => {
            let pin = Path::new(|b| {
                b.move_to(Point::ORIGIN);
                b.line_to(Point::new(7.0, -16.0));
                b.line_to(Point::new(-7.0, -16.0));
                b.close();
            });
            frame.fill(&pin, color);
            let head = Path::circle(Point::new(0.0, -20.0), 9.0);
            frame.fill(&head, color);
            frame.stroke(&head, outline());
            frame.fill(&Path::circle(Point::new(0.0, -20.0), 3.0), Color::WHITE);
        }
    }
}

const POPUP_WIDTH: f32 = 200.0;
const LINE_HEIGHT: f32 = 18.0;

/// Card above the anchor point
fn draw_popup(frame: &mut Frame, popup: &Popup) {
    let rows = 1 + popup.content.lines.len();
    let height = rows as f32 * LINE_HEIGHT + 12.0;
    let top_left = Point::new(-POPUP_WIDTH / 2.0, -height - 30.0);

    let card = Path::rectangle(top_left, Size::new(POPUP_WIDTH, height));
    frame.fill(&card, Color::WHITE);
    frame.stroke(
        &card,
        Stroke::default().with_color(Color::from_rgba(0.0, 0.0, 0.0, 0.2)).with_width(1.0),
    );

    let mut y = top_left.y + 6.0;
    let rows = std::iter::once((popup.content.title.as_str(), 14.0, Color::BLACK)).chain(
        popup
            .content
            .lines
            .iter()
            .map(|line| (line.as_str(), 12.0, Color::from_rgb8(0x66, 0x66, 0x66))),
    );
    for (content, size, color) in rows {
        frame.fill_text(canvas::Text {
            content: content.to_string(),
            position: Point::new(0.0, y),
            color,
            size: Pixels(size),
            horizontal_alignment: alignment::Horizontal::Center,
            vertical_alignment: alignment::Vertical::Top,
            ..canvas::Text::default()
        });
        y += LINE_HEIGHT;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::GeoPoint;

    #[test]
    fn test_every_tone_has_its_own_colour() {
        let tones = [
            Tone::User,
            Tone::Spot(LocationType::Tag),
            Tone::Spot(LocationType::Throw),
            Tone::Spot(LocationType::Burner),
            Tone::Spot(LocationType::Roller),
            Tone::Warning,
            Tone::Unsaved,
        ];
        for (i, a) in tones.iter().enumerate() {
            for b in &tones[i + 1..] {
                assert_ne!(tone_color(*a), tone_color(*b), "{a:?} vs {b:?}");
            }
        }
    }

    fn finger(kind: fn(touch::Finger, Point) -> touch::Event, id: u64, x: f32, y: f32) -> canvas::Event {
        canvas::Event::Touch(kind(touch::Finger(id), Point::new(x, y)))
    }

    fn pressed(id: touch::Finger, position: Point) -> touch::Event {
        touch::Event::FingerPressed { id, position }
    }

    fn lifted(id: touch::Finger, position: Point) -> touch::Event {
        touch::Event::FingerLifted { id, position }
    }

    #[test]
    fn test_lift_during_resize_still_reaches_the_tracker() {
        let scene = Scene::new(GeoPoint::new(40.0, -74.0).unwrap(), 15.0);
        let map = MapCanvas { scene: &scene };
        let mut state = PointerState::default();
        let tall = Rectangle::new(Point::ORIGIN, Size::new(400.0, 800.0));
        let wide = Rectangle::new(Point::ORIGIN, Size::new(800.0, 400.0));

        let (_, message) = map.update(&mut state, finger(pressed, 1, 10.0, 10.0), tall, Cursor::Unavailable);
        assert!(matches!(message, Some(Message::SurfaceResized(size, None)) if size == Vector2::new(400.0, 800.0)));

        // the lift arrives with the new bounds and carries the tap along
        let (_, message) = map.update(&mut state, finger(lifted, 1, 10.0, 10.0), wide, Cursor::Unavailable);
        assert!(matches!(
            message,
            Some(Message::SurfaceResized(_, Some(ViewportEvent::Tap(_))))
        ));

        // a later single touch is still a tap, not half of a gesture
        map.update(&mut state, finger(pressed, 2, 20.0, 20.0), wide, Cursor::Unavailable);
        let (_, message) = map.update(&mut state, finger(lifted, 2, 20.0, 20.0), wide, Cursor::Unavailable);
        assert!(matches!(
            message,
            Some(Message::Viewport(ViewportEvent::Tap(at))) if at == Vector2::new(20.0, 20.0)
        ));
    }

    #[test]
    fn test_point_conversion() {
        assert_eq!(to_vector(Point::new(3.5, -2.0)), Vector2::new(3.5, -2.0));
    }
}
