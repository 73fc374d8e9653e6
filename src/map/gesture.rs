/// Pointer and touch gestures on the map surface
///
/// One pointer drags or taps. Exactly two fingers rotate and pinch at the
/// same time. Everything is reported as `ViewportEvent`s in screen space.

use cgmath::{InnerSpace, Vector2};

use super::viewport::ViewportEvent;
use crate::state::data::normalize_degrees;

/// Movement (px) below which a press/release still counts as a tap
pub const DRAG_THRESHOLD: f64 = 3.0;
/// Relative change in finger distance needed before a pinch zooms
pub const PINCH_THRESHOLD: f64 = 0.1;

/// Angle of the line from `a` to `b`, in degrees
fn angle(a: Vector2<f64>, b: Vector2<f64>) -> f64 {
    let d = b - a;
    d.y.atan2(d.x).to_degrees()
}

/// Two-finger rotate + pinch, evaluated together on every move
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TwoFingerGesture {
    start_angle: f64,
    start_bearing: f64,
    last_distance: f64,
}

impl TwoFingerGesture {
    pub fn begin(a: Vector2<f64>, b: Vector2<f64>, bearing: f64) -> Self {
        Self {
            start_angle: angle(a, b),
            start_bearing: bearing,
            last_distance: (b - a).magnitude(),
        }
    }

    /// New absolute bearing and zoom change for the fingers' current positions
    pub fn update(&mut self, a: Vector2<f64>, b: Vector2<f64>) -> (f64, f64) {
        let bearing = normalize_degrees(self.start_bearing + angle(a, b) - self.start_angle);

        let distance = (b - a).magnitude();
        let mut zoom_delta = 0.0;
        if self.last_distance > 0.0 {
            let ratio = distance / self.last_distance;
            if ratio > 1.0 + PINCH_THRESHOLD || ratio < 1.0 - PINCH_THRESHOLD {
                zoom_delta = ratio.log2();
                self.last_distance = distance;
            }
        } else if distance > 0.0 {
            self.last_distance = distance;
        }

        (bearing, zoom_delta)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Press {
    origin: Vector2<f64>,
    last: Vector2<f64>,
    dragging: bool,
}

/// Per-surface pointer state
#[derive(Debug, Clone, Default)]
pub struct PointerTracker {
    /// Active touches, oldest first
    fingers: Vec<(u64, Vector2<f64>)>,
    press: Option<Press>,
    gesture: Option<TwoFingerGesture>,
}

impl PointerTracker {
    pub fn is_dragging(&self) -> bool {
        self.press.is_some_and(|p| p.dragging)
    }

    pub fn is_gesturing(&self) -> bool {
        self.gesture.is_some()
    }

    pub fn pointer_pressed(&mut self, at: Vector2<f64>) {
        self.press = Some(Press {
            origin: at,
            last: at,
            dragging: false,
        });
    }

    pub fn pointer_moved(&mut self, at: Vector2<f64>) -> Option<ViewportEvent> {
        let press = self.press.as_mut()?;
        if !press.dragging && (at - press.origin).magnitude() < DRAG_THRESHOLD {
            return None;
        }
        press.dragging = true;
        let delta = at - press.last;
        press.last = at;
        Some(ViewportEvent::Pan(delta))
    }

    pub fn pointer_released(&mut self, at: Vector2<f64>) -> Option<ViewportEvent> {
        let press = self.press.take()?;
        (!press.dragging).then_some(ViewportEvent::Tap(at))
    }

    /// The button came up outside the surface
    pub fn pointer_cancelled(&mut self) {
        self.press = None;
    }

    pub fn finger_pressed(&mut self, id: u64, at: Vector2<f64>, bearing: f64) {
        self.fingers.retain(|(f, _)| *f != id);
        self.fingers.push((id, at));

        match self.fingers.as_slice() {
            [_] => self.pointer_pressed(at),
            [(_, a), (_, b)] => {
                // a second finger turns the touch into a gesture, never a tap
                self.press = None;
                self.gesture = Some(TwoFingerGesture::begin(*a, *b, bearing));
            }
            _ => {
                self.press = None;
                self.gesture = None;
            }
        }
    }

    pub fn finger_moved(&mut self, id: u64, at: Vector2<f64>) -> Option<ViewportEvent> {
        let finger = self.fingers.iter_mut().find(|(f, _)| *f == id)?;
        finger.1 = at;

        let Some(gesture) = self.gesture.as_mut() else {
            return if self.fingers.len() == 1 {
                self.pointer_moved(at)
            } else {
                None
            };
        };
        match self.fingers.as_slice() {
            [(_, a), (_, b)] => {
                let (bearing, zoom_delta) = gesture.update(*a, *b);
                Some(ViewportEvent::Gesture { bearing, zoom_delta })
            }
            _ => None,
        }
    }

    pub fn finger_lifted(&mut self, id: u64, at: Vector2<f64>, bearing: f64) -> Option<ViewportEvent> {
        let was_single = self.fingers.len() == 1;
        let before = self.fingers.len();
        self.fingers.retain(|(f, _)| *f != id);
        match self.fingers.as_slice() {
            // back down from three or more: the remaining pair takes over
            [(_, a), (_, b)] if before > 2 => {
                self.gesture = Some(TwoFingerGesture::begin(*a, *b, bearing));
            }
            [_, _] => {}
            _ => self.gesture = None,
        }
        if was_single && self.fingers.is_empty() {
            return self.pointer_released(at);
        }
        // fingers left over from a gesture do not start a drag
        self.press = None;
        None
    }

    /// The platform lost track of a finger (e.g. the window lost focus)
    pub fn finger_lost(&mut self, id: u64) {
        self.fingers.retain(|(f, _)| *f != id);
        self.gesture = None;
        self.press = None;
    }
}
