/// Client-side query cache
///
/// Holds the last fetched Location and Prospect lists. Every successful
/// mutation invalidates the affected list; a fetch that was started before the
/// latest invalidation is discarded when it lands, so the map never regresses
/// to data older than the user's own last write.

use tracing::debug;

use super::data::{EntityId, Location, Prospect};
use super::store::EntityKind;

/// One cached list
#[derive(Debug, Clone)]
pub struct Query<T> {
    items: Vec<T>,
    loaded: bool,
    stale: bool,
    generation: u64,
    in_flight: Option<u64>,
}

impl<T> Default for Query<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            loaded: false,
            stale: true,
            generation: 0,
            in_flight: None,
        }
    }
}

impl<T> Query<T> {
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Start a fetch if one is needed; returns the generation to stamp it with
    pub fn begin_fetch(&mut self) -> Option<u64> {
        if !self.stale || self.in_flight == Some(self.generation) {
            return None;
        }
        self.in_flight = Some(self.generation);
        Some(self.generation)
    }

    /// Accept fetch results unless they predate the latest invalidation
    pub fn complete_fetch(&mut self, generation: u64, items: Vec<T>) -> bool {
        if self.in_flight == Some(generation) {
            self.in_flight = None;
        }
        if generation != self.generation {
            debug!(generation, current = self.generation, "dropping outdated fetch");
            return false;
        }
        self.items = items;
        self.loaded = true;
        self.stale = false;
        true
    }

    /// A fetch failed; keep what we have and allow a retry
    pub fn fail_fetch(&mut self, generation: u64) {
        if self.in_flight == Some(generation) {
            self.in_flight = None;
        }
    }

    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.stale = true;
    }

    fn insert_front(&mut self, item: T) {
        self.items.insert(0, item);
    }

    fn retain(&mut self, keep: impl FnMut(&T) -> bool) {
        self.items.retain(keep);
    }

    /// Replace the first matching item in place; false when none matched
    fn replace(&mut self, item: T, matches: impl Fn(&T) -> bool) -> bool {
        match self.items.iter_mut().find(|existing| matches(existing)) {
            Some(existing) => {
                *existing = item;
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct EntityCache {
    pub locations: Query<Location>,
    pub prospects: Query<Prospect>,
}

impl EntityCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate(&mut self, kind: EntityKind) {
        match kind {
            EntityKind::Location => self.locations.invalidate(),
            EntityKind::Prospect => self.prospects.invalidate(),
        }
    }

    /// Show a freshly created Location right away, then refetch
    pub fn location_created(&mut self, location: Location) {
        self.locations.retain(|l| l.id != location.id);
        self.locations.insert_front(location);
        self.locations.invalidate();
    }

    pub fn prospect_created(&mut self, prospect: Prospect) {
        self.prospects.retain(|p| p.id != prospect.id);
        self.prospects.insert_front(prospect);
        self.prospects.invalidate();
    }

    /// A single record was re-read; the list stays fresh
    pub fn location_fetched(&mut self, location: Location) {
        let id = location.id.clone();
        if !self.locations.replace(location, |l| l.id == id) {
            debug!(%id, "fetched location is not in the cached list");
        }
    }

    /// Show an edit right away, then refetch
    pub fn location_updated(&mut self, location: Location) {
        let id = location.id.clone();
        if !self.locations.replace(location.clone(), |l| l.id == id) {
            self.locations.insert_front(location);
        }
        self.locations.invalidate();
    }

    /// Drop a removed entity locally (also used for "already removed")
    pub fn removed(&mut self, kind: EntityKind, id: &EntityId) {
        match kind {
            EntityKind::Location => self.locations.retain(|l| &l.id != id),
            EntityKind::Prospect => self.prospects.retain(|p| &p.id != id),
        }
        self.invalidate(kind);
    }

    pub fn location(&self, id: &EntityId) -> Option<&Location> {
        self.locations.items().iter().find(|l| &l.id == id)
    }

    pub fn prospect(&self, id: &EntityId) -> Option<&Prospect> {
        self.prospects.items().iter().find(|p| &p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::{GeoPoint, LocationType};
    use chrono::Utc;

    fn location(id: &str) -> Location {
        Location {
            id: EntityId(id.into()),
            owner_id: None,
            position: GeoPoint::new(1.0, 1.0).unwrap(),
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

    #[test]
    fn test_fetch_once_until_invalidated() {
        let mut query: Query<u32> = Query::default();
        let generation = query.begin_fetch().unwrap();
        assert_eq!(query.begin_fetch(), None);

        assert!(query.complete_fetch(generation, vec![1, 2]));
        assert!(!query.is_stale());
        assert_eq!(query.begin_fetch(), None);

        query.invalidate();
        assert!(query.begin_fetch().is_some());
    }

    #[test]
    fn test_fetch_started_before_write_is_discarded() {
        let mut query: Query<u32> = Query::default();
        let early = query.begin_fetch().unwrap();
        query.invalidate();
        let late = query.begin_fetch().unwrap();

        assert!(!query.complete_fetch(early, vec![1]));
        assert!(query.items().is_empty());
        assert!(query.complete_fetch(late, vec![1, 2]));
        assert_eq!(query.items(), &[1, 2]);
    }

    #[test]
    fn test_failed_fetch_can_retry() {
        let mut query: Query<u32> = Query::default();
        let generation = query.begin_fetch().unwrap();
        query.fail_fetch(generation);
        assert_eq!(query.begin_fetch(), Some(generation));
    }

    #[test]
    fn test_created_location_is_visible_before_refetch() {
        let mut cache = EntityCache::new();
        let generation = cache.locations.begin_fetch().unwrap();
        cache.locations.complete_fetch(generation, vec![location("old")]);

        cache.location_created(location("new"));
        assert_eq!(cache.locations.items()[0].title, "new");
        assert_eq!(cache.locations.items().len(), 2);
        assert!(cache.locations.is_stale());
    }

    #[test]
    fn test_updated_location_replaces_in_place() {
        let mut cache = EntityCache::new();
        let generation = cache.locations.begin_fetch().unwrap();
        cache
            .locations
            .complete_fetch(generation, vec![location("a"), location("b")]);

        let mut edited = location("b");
        edited.title = "renamed".into();
        cache.location_updated(edited);
        assert_eq!(cache.locations.items()[1].title, "renamed");
        assert_eq!(cache.locations.items().len(), 2);
        assert!(cache.locations.is_stale());
    }

    #[test]
    fn test_fetched_location_keeps_list_fresh() {
        let mut cache = EntityCache::new();
        assert!(!cache.locations.is_loaded());
        let generation = cache.locations.begin_fetch().unwrap();
        cache.locations.complete_fetch(generation, vec![location("a")]);
        assert!(cache.locations.is_loaded());

        let mut fresh = location("a");
        fresh.city = Some("Bronx".into());
        cache.location_fetched(fresh);
        cache.location_fetched(location("unknown"));
        assert_eq!(cache.locations.items().len(), 1);
        assert_eq!(cache.locations.items()[0].city.as_deref(), Some("Bronx"));
        assert!(!cache.locations.is_stale());
    }

    #[test]
    fn test_removed_drops_entity() {
        let mut cache = EntityCache::new();
        let generation = cache.locations.begin_fetch().unwrap();
        cache
            .locations
            .complete_fetch(generation, vec![location("a"), location("b")]);

        cache.removed(EntityKind::Location, &EntityId("a".into()));
        assert!(cache.location(&EntityId("a".into())).is_none());
        assert!(cache.location(&EntityId("b".into())).is_some());
    }
}
