/// Map viewport controller
///
/// Owns centre, zoom and bearing. Rotation is applied to the drawn layer only:
/// the Web Mercator projection below is never rotated, so screen points are
/// turned back into layer points before they are inverse-projected.

use cgmath::Vector2;
use std::f64::consts::PI;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::state::data::{normalize_degrees, GeoPoint};

/// Pixel size of one map tile
pub const TILE_SIZE: f64 = 256.0;
pub const MIN_ZOOM: f64 = 2.0;
pub const MAX_ZOOM: f64 = 19.0;
/// Zoom used when focusing on a single point
pub const FOCUS_ZOOM: f64 = 17.0;
/// Time the "reset north" animation takes on screen
pub const RESET_DURATION: Duration = Duration::from_millis(300);

/// Web Mercator stops here
const MAX_LATITUDE: f64 = 85.051_128_78;

/// World pixel coordinates of a point at the given zoom
pub fn project(point: GeoPoint, zoom: f64) -> Vector2<f64> {
    let world = TILE_SIZE * 2f64.powf(zoom);
    let lat = point.latitude.clamp(-MAX_LATITUDE, MAX_LATITUDE).to_radians();
    let x = (point.longitude + 180.0) / 360.0 * world;
    let y = (1.0 - (lat.tan() + 1.0 / lat.cos()).ln() / PI) / 2.0 * world;
    Vector2::new(x, y)
}

/// Inverse of [`project`]; longitude wraps, latitude is clamped
pub fn unproject(world_px: Vector2<f64>, zoom: f64) -> GeoPoint {
    let world = TILE_SIZE * 2f64.powf(zoom);
    let longitude = (world_px.x / world * 360.0).rem_euclid(360.0) - 180.0;
    let n = PI * (1.0 - 2.0 * world_px.y / world);
    let latitude = n.sinh().atan().to_degrees().clamp(-MAX_LATITUDE, MAX_LATITUDE);
    GeoPoint {
        latitude,
        longitude,
    }
}

/// Rotate `v` by `degrees` clockwise on a y-down screen
pub fn rotate(v: Vector2<f64>, degrees: f64) -> Vector2<f64> {
    let (sin, cos) = degrees.to_radians().sin_cos();
    Vector2::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos)
}

/// Pointer affordance over the map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affordance {
    Default,
    /// The next tap places something
    Crosshair,
}

/// Visual easing of a bearing snap; the model value changes immediately
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BearingTransition {
    pub from: f64,
    pub to: f64,
    pub started: Instant,
}

impl BearingTransition {
    /// Bearing to draw at `now`, or `None` once the animation is over
    pub fn angle_at(&self, now: Instant) -> Option<f64> {
        let elapsed = now.checked_duration_since(self.started).unwrap_or_default();
        if elapsed >= RESET_DURATION {
            return None;
        }
        let t = elapsed.as_secs_f64() / RESET_DURATION.as_secs_f64();
        // ease-out along the shorter arc
        let eased = 1.0 - (1.0 - t).powi(3);
        let mut delta = self.to - self.from;
        if delta > 180.0 {
            delta -= 360.0;
        } else if delta < -180.0 {
            delta += 360.0;
        }
        Some(normalize_degrees(self.from + delta * eased))
    }
}

/// Input the map surface turns raw pointer events into
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewportEvent {
    /// The surface got (or changed) its size
    Resized(Vector2<f64>),
    /// Drag by a screen-space delta
    Pan(Vector2<f64>),
    /// Zoom in (positive) or out by whole or fractional levels
    Zoom(f64),
    /// Absolute bearing from a rotate control
    Rotate(f64),
    /// Two-finger rotate and pinch in one step
    Gesture { bearing: f64, zoom_delta: f64 },
    /// A single tap at a screen point relative to the surface's top-left
    Tap(Vector2<f64>),
}

#[derive(Debug, Clone)]
pub struct Viewport {
    center: GeoPoint,
    zoom: f64,
    bearing: f64,
    size: Option<Vector2<f64>>,
    armed: bool,
    transition: Option<BearingTransition>,
}

impl Viewport {
    pub fn new(center: GeoPoint, zoom: f64) -> Self {
        Self {
            center,
            zoom: zoom.clamp(MIN_ZOOM, MAX_ZOOM),
            bearing: 0.0,
            size: None,
            armed: false,
            transition: None,
        }
    }

    pub fn center(&self) -> GeoPoint {
        self.center
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Current bearing in [0, 360)
    pub fn bearing(&self) -> f64 {
        self.bearing
    }

    /// Set the bearing directly; any real value is accepted and wrapped
    pub fn set_bearing(&mut self, degrees: f64) {
        if !degrees.is_finite() {
            return;
        }
        self.bearing = normalize_degrees(degrees);
        self.transition = None;
    }

    /// Snap to north. The model is at 0 immediately; the returned transition
    /// lets the surface ease into it.
    pub fn reset_bearing(&mut self) -> Option<BearingTransition> {
        let from = self.bearing;
        self.bearing = 0.0;
        self.transition = (from != 0.0).then(|| BearingTransition {
            from,
            to: 0.0,
            started: Instant::now(),
        });
        debug!(from, "bearing reset");
        self.transition
    }

    pub fn transition(&self) -> Option<&BearingTransition> {
        self.transition.as_ref()
    }

    /// Bearing to draw at `now`, following any running transition
    pub fn displayed_bearing(&self, now: Instant) -> f64 {
        self.transition
            .and_then(|t| t.angle_at(now))
            .unwrap_or(self.bearing)
    }

    /// Drop a finished transition; returns true while one is still running
    pub fn tick(&mut self, now: Instant) -> bool {
        if let Some(transition) = self.transition {
            if transition.angle_at(now).is_none() {
                self.transition = None;
            }
        }
        self.transition.is_some()
    }

    pub fn set_view(&mut self, center: GeoPoint, zoom: f64) {
        self.center = center;
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
    }

    pub fn zoom_by(&mut self, delta: f64) {
        if delta.is_finite() {
            self.zoom = (self.zoom + delta).clamp(MIN_ZOOM, MAX_ZOOM);
        }
    }

    pub fn mount(&mut self, size: Vector2<f64>) {
        if size.x <= 0.0 || size.y <= 0.0 {
            return;
        }
        if self.size.is_none() {
            debug!(width = size.x, height = size.y, "map surface mounted");
        }
        self.size = Some(size);
    }

    pub fn is_mounted(&self) -> bool {
        self.size.is_some()
    }

    pub fn size(&self) -> Option<Vector2<f64>> {
        self.size
    }

    pub fn set_armed(&mut self, armed: bool) {
        self.armed = armed;
    }

    pub fn affordance(&self) -> Affordance {
        if self.armed {
            Affordance::Crosshair
        } else {
            Affordance::Default
        }
    }

    /// Screen point (top-left origin) to the unrotated layer point under it
    pub fn screen_to_layer(&self, screen: Vector2<f64>) -> Option<Vector2<f64>> {
        let half = self.size? / 2.0;
        Some(half + rotate(screen - half, -self.bearing))
    }

    /// Geographic coordinate under a layer point; `None` until mounted
    pub fn geo_at_layer(&self, layer: Vector2<f64>) -> Option<GeoPoint> {
        let half = self.size? / 2.0;
        let world = project(self.center, self.zoom) + (layer - half);
        Some(unproject(world, self.zoom))
    }

    /// Geographic coordinate under a screen point
    pub fn geo_at(&self, screen: Vector2<f64>) -> Option<GeoPoint> {
        self.geo_at_layer(self.screen_to_layer(screen)?)
    }

    /// Layer point of a coordinate; `None` until mounted
    pub fn layer_point(&self, point: GeoPoint) -> Option<Vector2<f64>> {
        let half = self.size? / 2.0;
        Some(project(point, self.zoom) - project(self.center, self.zoom) + half)
    }

    /// Move the view so content follows a screen-space drag
    pub fn pan_by(&mut self, screen_delta: Vector2<f64>) {
        let layer_delta = rotate(screen_delta, -self.bearing);
        let world = project(self.center, self.zoom) - layer_delta;
        self.center = unproject(world, self.zoom);
    }

    /// Apply one surface event. A tap on a mounted surface yields the
    /// coordinate under it; everything else yields `None`.
    pub fn apply(&mut self, event: ViewportEvent) -> Option<GeoPoint> {
        match event {
            ViewportEvent::Resized(size) => self.mount(size),
            ViewportEvent::Pan(delta) if self.is_mounted() => self.pan_by(delta),
            ViewportEvent::Zoom(delta) => self.zoom_by(delta),
            ViewportEvent::Rotate(bearing) => self.set_bearing(bearing),
            ViewportEvent::Gesture { bearing, zoom_delta } => {
                self.set_bearing(bearing);
                self.zoom_by(zoom_delta);
            }
            ViewportEvent::Tap(screen) => return self.geo_at(screen),
            ViewportEvent::Pan(_) => {}
        }
        None
    }
}
