/// Marker rendering
///
/// Turns the current entities, pending placement and user position into the
/// full marker set. The set is rebuilt from scratch on every change; the
/// `MarkerLayer` remembers what it drew so it can clear it first.

use super::engine::{MapEngine, MarkerId};
use super::popup::PopupContent;
use crate::state::data::{EntityId, GeoPoint, Location, LocationType, Prospect};
use crate::state::placement::{PendingPlacement, PlacementMode};

/// Visual vocabulary. Spots and prospects never share a glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glyph {
    /// Direction arrow at the user's position
    UserArrow,
    Spot(LocationType),
    /// The "X" of an unconfirmed lead
    ProspectCross,
    /// Not yet saved
    PendingPin(PlacementMode),
}

/// Colour role of a glyph; the surface decides the actual colours
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    User,
    Spot(LocationType),
    Warning,
    Unsaved,
}

impl Glyph {
    pub fn tone(&self) -> Tone {
        match self {
            Glyph::UserArrow => Tone::User,
            Glyph::Spot(kind) => Tone::Spot(*kind),
            Glyph::ProspectCross => Tone::Warning,
            Glyph::PendingPin(_) => Tone::Unsaved,
        }
    }

    /// Stacking order; higher is drawn later
    pub fn z_index(&self) -> u8 {
        match self {
            Glyph::Spot(_) => 0,
            Glyph::ProspectCross => 1,
            Glyph::PendingPin(_) => 2,
            Glyph::UserArrow => 3,
        }
    }
}

/// What activating a marker refers to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerTarget {
    Location(EntityId),
    Prospect(EntityId),
    Pending,
    User,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub position: GeoPoint,
    pub glyph: Glyph,
    /// Own rotation in degrees (only the user arrow turns)
    pub rotation: f64,
    /// Undoes the map's visual rotation so the glyph stays upright
    pub counter_rotation: f64,
    pub popup: PopupContent,
    pub target: MarkerTarget,
}

impl Marker {
    fn new(position: GeoPoint, glyph: Glyph, popup: PopupContent, target: MarkerTarget) -> Self {
        Self {
            position,
            glyph,
            rotation: 0.0,
            counter_rotation: 0.0,
            popup,
            target,
        }
    }

    pub fn z_index(&self) -> u8 {
        self.glyph.z_index()
    }
}

/// Everything the marker set depends on
#[derive(Debug, Clone, Copy)]
pub struct MarkerInput<'a> {
    pub locations: &'a [Location],
    pub prospects: &'a [Prospect],
    pub pending: Option<&'a PendingPlacement>,
    /// Absent until the first position fix
    pub user_position: Option<GeoPoint>,
    /// Fused device bearing
    pub heading: f64,
    /// The map's own bearing
    pub map_bearing: f64,
}

/// The exact marker set for `input`, bottom to top
pub fn build_markers(input: &MarkerInput<'_>) -> Vec<Marker> {
    let mut markers = Vec::with_capacity(input.locations.len() + input.prospects.len() + 2);

    markers.extend(input.locations.iter().map(|location| {
        Marker::new(
            location.position,
            Glyph::Spot(location.kind),
            PopupContent::location(location),
            MarkerTarget::Location(location.id.clone()),
        )
    }));

    markers.extend(input.prospects.iter().map(|prospect| {
        Marker::new(
            prospect.position,
            Glyph::ProspectCross,
            PopupContent::prospect(prospect),
            MarkerTarget::Prospect(prospect.id.clone()),
        )
    }));

    if let Some(pending) = input.pending {
        markers.push(Marker::new(
            pending.position,
            Glyph::PendingPin(pending.mode),
            PopupContent::pending(pending.mode),
            MarkerTarget::Pending,
        ));
    }

    if let Some(position) = input.user_position {
        let mut user = Marker::new(position, Glyph::UserArrow, PopupContent::user(), MarkerTarget::User);
        user.rotation = input.heading;
        markers.push(user);
    }

    markers.sort_by_key(Marker::z_index);
    markers
}

/// The markers this layer currently has on the engine
#[derive(Debug, Default)]
pub struct MarkerLayer {
    drawn: Vec<MarkerId>,
}

impl MarkerLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Markers currently on the surface
    pub fn drawn_count(&self) -> usize {
        self.drawn.len()
    }

    /// Replace everything previously drawn with the set for `input`
    pub fn render<M, E: MapEngine<M>>(&mut self, engine: &mut E, input: &MarkerInput<'_>) {
        for id in self.drawn.drain(..) {
            engine.remove_marker(id);
        }
        for marker in build_markers(input) {
            self.drawn.push(engine.add_marker(marker));
        }
        engine.apply_viewport_transform(input.map_bearing);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::engine::Scene;
    use chrono::Utc;
    use uuid::Uuid;

    fn location(id: &str, kind: LocationType) -> Location {
        Location {
            id: EntityId(id.into()),
            owner_id: None,
            position: GeoPoint::new(40.0, -74.0).unwrap(),
            title: id.into(),
            kind,
            city: None,
            address: None,
            description: None,
            tags: vec![],
            photos: vec![],
            photo_headings: None,
            created_at: Utc::now(),
        }
    }

    fn prospect(id: &str) -> Prospect {
        Prospect {
            id: EntityId(id.into()),
            owner_id: None,
            position: GeoPoint::new(40.1, -74.1).unwrap(),
            notes: None,
            city: None,
            address: None,
            created_at: Utc::now(),
        }
    }

    fn input<'a>(locations: &'a [Location], prospects: &'a [Prospect]) -> MarkerInput<'a> {
        MarkerInput {
            locations,
            prospects,
            pending: None,
            user_position: None,
            heading: 0.0,
            map_bearing: 0.0,
        }
    }

    #[test]
    fn test_glyphs_follow_entity_kind() {
        let locations = [location("a", LocationType::Tag), location("b", LocationType::Roller)];
        let prospects = [prospect("p")];
        let markers = build_markers(&input(&locations, &prospects));

        assert_eq!(markers.len(), 3);
        assert_eq!(markers[0].glyph, Glyph::Spot(LocationType::Tag));
        assert_eq!(markers[1].glyph, Glyph::Spot(LocationType::Roller));
        assert_eq!(markers[2].glyph, Glyph::ProspectCross);
        assert_eq!(markers[2].glyph.tone(), Tone::Warning);
    }

    #[test]
    fn test_user_marker_only_after_fix_and_on_top() {
        let locations = [location("a", LocationType::Tag)];
        let mut input = input(&locations, &[]);
        assert!(build_markers(&input).iter().all(|m| m.glyph != Glyph::UserArrow));

        input.user_position = Some(GeoPoint::new(40.0, -74.0).unwrap());
        input.heading = 135.0;
        let markers = build_markers(&input);
        let top = markers.last().unwrap();
        assert_eq!(top.glyph, Glyph::UserArrow);
        assert_eq!(top.rotation, 135.0);
    }

    #[test]
    fn test_pending_marker_is_distinct() {
        let pending = PendingPlacement {
            position: GeoPoint::new(40.0, -74.0).unwrap(),
            mode: PlacementMode::Location,
            token: Uuid::new_v4(),
        };
        let mut input = input(&[], &[]);
        input.pending = Some(&pending);
        let markers = build_markers(&input);
        assert_eq!(markers.len(), 1);
        let tone = markers[0].glyph.tone();
        assert_ne!(tone, Tone::Warning);
        assert_ne!(tone, Tone::Spot(LocationType::Tag));
        assert_eq!(markers[0].popup.title, "New graffiti spot - tap Save to confirm");
    }

    #[test]
    fn test_render_replaces_previous_set() {
        let mut scene: Scene<()> = Scene::new(GeoPoint::new(40.0, -74.0).unwrap(), 15.0);
        let mut layer = MarkerLayer::new();

        let locations = [location("a", LocationType::Tag), location("b", LocationType::Throw)];
        layer.render(&mut scene, &input(&locations, &[]));
        assert_eq!(scene.markers().count(), 2);

        layer.render(&mut scene, &input(&locations[..1], &[]));
        assert_eq!(scene.markers().count(), 1);
        assert_eq!(layer.drawn_count(), 1);
    }

    #[test]
    fn test_render_counter_rotates_markers() {
        let mut scene: Scene<()> = Scene::new(GeoPoint::new(40.0, -74.0).unwrap(), 15.0);
        let mut layer = MarkerLayer::new();
        let locations = [location("a", LocationType::Tag)];
        let mut input = input(&locations, &[]);
        input.map_bearing = 30.0;
        layer.render(&mut scene, &input);
        assert!(scene.markers().all(|m| m.counter_rotation == -30.0));
    }
}
