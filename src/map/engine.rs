/// Map engine seam
///
/// The workflow and sensor code never touch the drawing surface directly.
/// They go through `MapEngine`, which `Scene` implements for the canvas.

use cgmath::{InnerSpace, Vector2};
use std::time::Instant;
use tracing::debug;

use super::markers::{Marker, MarkerTarget};
use super::popup::PopupContent;
use super::viewport::{rotate, Affordance, Viewport, ViewportEvent};
use crate::state::data::GeoPoint;

pub type MarkerId = u64;

/// Screen distance (px) within which a tap activates a marker
pub const HIT_RADIUS: f64 = 18.0;

pub trait MapEngine<M> {
    /// The surface has a size; until then everything below is a no-op
    fn mount(&mut self, size: Vector2<f64>);

    fn set_view(&mut self, center: GeoPoint, zoom: f64);

    /// Message to produce for a tap on the map (not on a marker)
    fn on_click(&mut self, handler: Box<dyn Fn(GeoPoint) -> M>);

    fn add_marker(&mut self, marker: Marker) -> MarkerId;

    fn remove_marker(&mut self, id: MarkerId) -> bool;

    /// Apply the map's visual rotation and counter-rotate every marker and
    /// the open popup by the opposite angle
    fn apply_viewport_transform(&mut self, bearing: f64);
}

/// An open marker popup
#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    pub anchor: GeoPoint,
    pub target: MarkerTarget,
    pub content: PopupContent,
    pub counter_rotation: f64,
}

/// The canvas-backed engine: viewport, drawn markers and the open popup
pub struct Scene<M> {
    viewport: Viewport,
    markers: Vec<(MarkerId, Marker)>,
    next_id: MarkerId,
    popup: Option<Popup>,
    /// Rotation the layer is currently drawn with
    layer_bearing: f64,
    on_click: Option<Box<dyn Fn(GeoPoint) -> M>>,
    on_marker: Option<Box<dyn Fn(MarkerTarget) -> M>>,
}

impl<M> Scene<M> {
    pub fn new(center: GeoPoint, zoom: f64) -> Self {
        Self {
            viewport: Viewport::new(center, zoom),
            markers: Vec::new(),
            next_id: 0,
            popup: None,
            layer_bearing: 0.0,
            on_click: None,
            on_marker: None,
        }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Message to produce when a marker is tapped
    pub fn on_marker(&mut self, handler: Box<dyn Fn(MarkerTarget) -> M>) {
        self.on_marker = Some(handler);
    }

    /// Drawn markers, bottom to top
    pub fn markers(&self) -> impl Iterator<Item = &Marker> {
        self.markers.iter().map(|(_, marker)| marker)
    }

    pub fn popup(&self) -> Option<&Popup> {
        self.popup.as_ref()
    }

    pub fn layer_bearing(&self) -> f64 {
        self.layer_bearing
    }

    pub fn set_armed(&mut self, armed: bool) {
        self.viewport.set_armed(armed);
    }

    /// Feed a surface event. Bearing changes re-apply the counter-rotation;
    /// a tap is resolved to a marker or map message.
    pub fn handle(&mut self, event: ViewportEvent) -> Option<M> {
        if let ViewportEvent::Tap(screen) = event {
            return self.tap(screen);
        }
        let before = self.viewport.bearing();
        self.viewport.apply(event);
        if self.viewport.bearing() != before {
            self.apply_viewport_transform(self.viewport.bearing());
        }
        None
    }

    pub fn set_bearing(&mut self, degrees: f64) {
        self.viewport.set_bearing(degrees);
        self.apply_viewport_transform(self.viewport.bearing());
    }

    pub fn reset_bearing(&mut self) {
        if self.viewport.reset_bearing().is_none() {
            self.apply_viewport_transform(0.0);
        }
    }

    /// Advance a running bearing animation; true while more frames are needed
    pub fn tick(&mut self, now: Instant) -> bool {
        let shown = self.viewport.displayed_bearing(now);
        let running = self.viewport.tick(now);
        self.apply_viewport_transform(if running { shown } else { self.viewport.bearing() });
        running
    }

    pub fn zoom_by(&mut self, delta: f64) {
        self.viewport.zoom_by(delta);
    }

    /// Screen point to unrotated layer point, using the drawn rotation
    fn screen_to_layer(&self, screen: Vector2<f64>) -> Option<Vector2<f64>> {
        let half = self.viewport.size()? / 2.0;
        Some(half + rotate(screen - half, -self.layer_bearing))
    }

    /// Where a coordinate is drawn on screen
    pub fn screen_point(&self, point: GeoPoint) -> Option<Vector2<f64>> {
        let half = self.viewport.size()? / 2.0;
        let layer = self.viewport.layer_point(point)?;
        Some(half + rotate(layer - half, self.layer_bearing))
    }

    /// Topmost marker under a screen point
    pub fn hit_test(&self, screen: Vector2<f64>) -> Option<&Marker> {
        self.markers
            .iter()
            .rev()
            .map(|(_, marker)| marker)
            .find(|marker| {
                self.screen_point(marker.position)
                    .is_some_and(|p| (p - screen).magnitude() <= HIT_RADIUS)
            })
    }

    /// Resolve a tap. While armed every tap goes to the map handler so a spot
    /// can be placed right next to an existing marker.
    pub fn tap(&self, screen: Vector2<f64>) -> Option<M> {
        let layer = self.screen_to_layer(screen)?;
        let armed = self.viewport.affordance() == Affordance::Crosshair;

        if !armed {
            if let (Some(marker), Some(handler)) = (self.hit_test(screen), &self.on_marker) {
                return Some(handler(marker.target.clone()));
            }
        }
        let geo = self.viewport.geo_at_layer(layer)?;
        self.on_click.as_ref().map(|handler| handler(geo))
    }

    /// Open the popup of the marker for `target`, if one is drawn
    pub fn open_popup(&mut self, target: &MarkerTarget) -> bool {
        let popup = self
            .markers()
            .find(|m| &m.target == target)
            .map(|marker| Popup {
                anchor: marker.position,
                target: marker.target.clone(),
                content: marker.popup.clone(),
                counter_rotation: -self.layer_bearing,
            });
        let found = popup.is_some();
        if found {
            self.popup = popup;
        }
        found
    }

    pub fn close_popup(&mut self) {
        self.popup = None;
    }

    /// After a redraw, follow the popup's marker or close it if it is gone
    fn refresh_popup(&mut self) {
        let Some(target) = self.popup.as_ref().map(|p| p.target.clone()) else {
            return;
        };
        if !self.open_popup(&target) {
            debug!(?target, "popup closed, marker removed");
            self.popup = None;
        }
    }
}

impl<M> MapEngine<M> for Scene<M> {
    fn mount(&mut self, size: Vector2<f64>) {
        self.viewport.mount(size);
    }

    fn set_view(&mut self, center: GeoPoint, zoom: f64) {
        self.viewport.set_view(center, zoom);
    }

    fn on_click(&mut self, handler: Box<dyn Fn(GeoPoint) -> M>) {
        self.on_click = Some(handler);
    }

    fn add_marker(&mut self, marker: Marker) -> MarkerId {
        let id = self.next_id;
        self.next_id += 1;
        // keep bottom-to-top order; equal z keeps insertion order
        let at = self
            .markers
            .partition_point(|(_, m)| m.z_index() <= marker.z_index());
        self.markers.insert(at, (id, marker));
        id
    }

    fn remove_marker(&mut self, id: MarkerId) -> bool {
        let before = self.markers.len();
        self.markers.retain(|(marker_id, _)| *marker_id != id);
        self.markers.len() != before
    }

    fn apply_viewport_transform(&mut self, bearing: f64) {
        self.layer_bearing = bearing;
        for (_, marker) in &mut self.markers {
            marker.counter_rotation = -bearing;
        }
        self.refresh_popup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::markers::{build_markers, Glyph, MarkerInput, MarkerLayer};
    use crate::map::viewport::RESET_DURATION;
    use crate::state::data::{EntityId, Location, LocationType};
    use chrono::Utc;

    #[derive(Debug, Clone, PartialEq)]
    enum Msg {
        Map(GeoPoint),
        Marker(MarkerTarget),
    }

    fn scene() -> Scene<Msg> {
        let mut scene = Scene::new(GeoPoint::new(40.0, -74.0).unwrap(), 15.0);
        scene.on_click(Box::new(Msg::Map));
        scene.on_marker(Box::new(Msg::Marker));
        scene
    }

    fn location(id: &str, lat: f64, lon: f64) -> Location {
        Location {
            id: EntityId(id.into()),
            owner_id: None,
            position: GeoPoint::new(lat, lon).unwrap(),
            title: id.into(),
            kind: LocationType::Tag,
            city: None,
            address: None,
            description: None,
            tags: vec![],
            photos: vec![],
            photo_headings: None,
            created_at: Utc::now(),
        }
    }

    fn draw(scene: &mut Scene<Msg>, locations: &[Location]) -> MarkerLayer {
        let map_bearing = scene.viewport().bearing();
        let mut layer = MarkerLayer::new();
        layer.render(
            scene,
            &MarkerInput {
                locations,
                prospects: &[],
                pending: None,
                user_position: None,
                heading: 0.0,
                map_bearing,
            },
        );
        layer
    }

    #[test]
    fn test_unmounted_scene_ignores_taps() {
        let scene = scene();
        assert_eq!(scene.tap(Vector2::new(10.0, 10.0)), None);
        assert_eq!(scene.screen_point(GeoPoint::new(40.0, -74.0).unwrap()), None);
    }

    #[test]
    fn test_tap_on_marker_and_on_map() {
        let mut scene = scene();
        scene.mount(Vector2::new(400.0, 400.0));
        draw(&mut scene, &[location("a", 40.0, -74.0)]);

        let centre = Vector2::new(200.0, 200.0);
        assert_eq!(
            scene.tap(centre),
            Some(Msg::Marker(MarkerTarget::Location(EntityId("a".into()))))
        );
        assert!(matches!(scene.tap(Vector2::new(10.0, 10.0)), Some(Msg::Map(_))));

        scene.set_armed(true);
        assert!(matches!(scene.tap(centre), Some(Msg::Map(_))));
    }

    #[test]
    fn test_counter_rotation_follows_every_bearing_change() {
        let mut scene = scene();
        scene.mount(Vector2::new(400.0, 400.0));
        draw(&mut scene, &[location("a", 40.0, -74.0)]);
        assert!(scene.open_popup(&MarkerTarget::Location(EntityId("a".into()))));

        scene.handle(ViewportEvent::Gesture { bearing: 45.0, zoom_delta: 0.0 });
        assert!(scene.markers().all(|m| m.counter_rotation == -45.0));
        assert_eq!(scene.popup().unwrap().counter_rotation, -45.0);

        scene.set_bearing(-90.0);
        assert!(scene.markers().all(|m| m.counter_rotation == -270.0));
        assert_eq!(scene.popup().unwrap().counter_rotation, -270.0);
    }

    #[test]
    fn test_reset_eases_then_settles() {
        let mut scene = scene();
        scene.mount(Vector2::new(400.0, 400.0));
        scene.set_bearing(90.0);
        scene.reset_bearing();
        assert_eq!(scene.viewport().bearing(), 0.0);

        let started = scene.viewport().transition().unwrap().started;
        assert!(scene.tick(started));
        assert_eq!(scene.layer_bearing(), 90.0);

        assert!(!scene.tick(started + RESET_DURATION));
        assert_eq!(scene.layer_bearing(), 0.0);
    }

    #[test]
    fn test_tap_maps_through_rotation() {
        let mut scene = scene();
        scene.mount(Vector2::new(400.0, 400.0));
        let spot = GeoPoint::new(40.001, -73.999).unwrap();
        scene.set_bearing(60.0);

        let drawn_at = scene.screen_point(spot).unwrap();
        let Some(Msg::Map(geo)) = scene.tap(drawn_at) else {
            panic!("expected a map tap");
        };
        assert!((geo.latitude - spot.latitude).abs() < 1e-9);
        assert!((geo.longitude - spot.longitude).abs() < 1e-9);
    }

    #[test]
    fn test_popup_closes_when_marker_goes_away() {
        let mut scene = scene();
        scene.mount(Vector2::new(400.0, 400.0));
        let mut layer = draw(&mut scene, &[location("a", 40.0, -74.0)]);
        scene.open_popup(&MarkerTarget::Location(EntityId("a".into())));

        layer.render(
            &mut scene,
            &MarkerInput {
                locations: &[],
                prospects: &[],
                pending: None,
                user_position: None,
                heading: 0.0,
                map_bearing: 0.0,
            },
        );
        assert!(scene.popup().is_none());
    }

    #[test]
    fn test_markers_kept_in_z_order() {
        let mut scene = scene();
        let markers = build_markers(&MarkerInput {
            locations: &[location("a", 40.0, -74.0)],
            prospects: &[],
            pending: None,
            user_position: Some(GeoPoint::new(40.0, -74.0).unwrap()),
            heading: 0.0,
            map_bearing: 0.0,
        });
        // add the user arrow first; it must still end up on top
        for marker in markers.into_iter().rev() {
            scene.add_marker(marker);
        }
        assert_eq!(scene.markers().last().unwrap().glyph, Glyph::UserArrow);
    }
}
