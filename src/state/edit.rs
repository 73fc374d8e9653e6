/// Form drafts for the creation panels
///
/// A draft holds what the user has typed so far for a pending placement.
/// It is turned into a store payload only on submit, after validation.

use serde::{Deserialize, Serialize};

use super::data::{
    non_empty, normalize_tags, EntityId, GeoPoint, Location, LocationPatch, LocationType,
    NewLocation, NewProspect, OwnerId, ValidationError, MAX_PHOTOS,
};

/// Quick-pick tags offered by the Location form
pub const PREDEFINED_TAGS: [&str; 8] = [
    "Mural", "Tag", "Piece", "Throw-up", "Stencil", "Paste-up", "Character", "Abstract",
];

/// An uploaded photo together with the bearing it was taken at
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AttachedPhoto {
    pub uri: String,
    pub heading: f64,
}

/// Everything the Location form can edit
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct LocationDraft {
    pub title: String,
    pub kind: LocationType,
    pub city: String,
    pub description: String,
    pub tags: Vec<String>,
    /// Text box for a custom tag, not yet committed
    pub tag_input: String,
    /// Photo and heading live together so the two lists can never drift apart
    pub photos: Vec<AttachedPhoto>,
}

impl LocationDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or remove a tag
    pub fn toggle_tag(&mut self, tag: &str) {
        match self.tags.iter().position(|t| t == tag) {
            Some(index) => {
                self.tags.remove(index);
            }
            None => self.tags.push(tag.to_string()),
        }
    }

    /// Commit the custom tag box
    pub fn commit_tag_input(&mut self) {
        let tag = self.tag_input.trim().to_string();
        if !tag.is_empty() && !self.tags.contains(&tag) {
            self.tags.push(tag);
        }
        self.tag_input.clear();
    }

    pub fn can_attach_photo(&self) -> bool {
        self.photos.len() < MAX_PHOTOS
    }

    pub fn attach_photo(&mut self, photo: AttachedPhoto) -> Result<(), ValidationError> {
        if !self.can_attach_photo() {
            return Err(ValidationError::TooManyPhotos { max: MAX_PHOTOS });
        }
        self.photos.push(photo);
        Ok(())
    }

    pub fn remove_photo(&mut self, index: usize) {
        if index < self.photos.len() {
            self.photos.remove(index);
        }
    }

    /// Pre-filled from a saved record
    pub fn from_location(location: &Location) -> Self {
        let headings = location.photo_headings.as_deref().unwrap_or_default();
        Self {
            title: location.title.clone(),
            kind: location.kind,
            city: location.city.clone().unwrap_or_default(),
            description: location.description.clone().unwrap_or_default(),
            tags: location.tags.clone(),
            tag_input: String::new(),
            photos: location
                .photos
                .iter()
                .enumerate()
                .map(|(i, uri)| AttachedPhoto {
                    uri: uri.clone(),
                    heading: headings.get(i).copied().unwrap_or(0.0),
                })
                .collect(),
        }
    }

    /// Build the create payload for the captured coordinate
    pub fn to_payload(
        &self,
        position: GeoPoint,
        owner_id: Option<OwnerId>,
    ) -> Result<NewLocation, ValidationError> {
        let (photos, headings): (Vec<String>, Vec<f64>) = self
            .photos
            .iter()
            .map(|photo| (photo.uri.clone(), photo.heading))
            .unzip();

        let payload = NewLocation {
            owner_id,
            position,
            title: self.title.trim().to_string(),
            kind: self.kind,
            city: non_empty(&self.city),
            address: None,
            description: non_empty(&self.description),
            tags: normalize_tags(self.tags.clone()),
            photo_headings: (!headings.is_empty()).then_some(headings),
            photos,
        };
        payload.validate()?;
        Ok(payload)
    }
}

/// Everything the Prospect form can edit
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ProspectDraft {
    pub notes: String,
    pub city: String,
}

impl ProspectDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to_payload(
        &self,
        position: GeoPoint,
        owner_id: Option<OwnerId>,
    ) -> Result<NewProspect, ValidationError> {
        let payload = NewProspect {
            owner_id,
            position,
            notes: non_empty(&self.notes),
            city: non_empty(&self.city),
            address: None,
        };
        payload.validate()?;
        Ok(payload)
    }
}

/// An open edit of a saved Location
#[derive(Debug, Clone)]
pub struct LocationEdit {
    pub id: EntityId,
    pub draft: LocationDraft,
    original: LocationDraft,
    pub saving: bool,
    pub error: Option<String>,
}

impl LocationEdit {
    pub fn new(location: &Location) -> Self {
        let draft = LocationDraft::from_location(location);
        Self {
            id: location.id.clone(),
            original: draft.clone(),
            draft,
            saving: false,
            error: None,
        }
    }

    pub fn is_modified(&self) -> bool {
        self.draft != self.original
    }

    /// Only the fields that differ from the saved record
    pub fn to_patch(&self) -> Result<LocationPatch, ValidationError> {
        let (draft, original) = (&self.draft, &self.original);
        let title = draft.title.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }

        let changed = |a: &str, b: &str| (a.trim() != b.trim()).then(|| a.trim().to_string());
        let photos = (draft.photos != original.photos).then(|| {
            let (uris, headings): (Vec<String>, Vec<f64>) = draft
                .photos
                .iter()
                .map(|photo| (photo.uri.clone(), photo.heading))
                .unzip();
            (uris, (!headings.is_empty()).then_some(headings))
        });

        Ok(LocationPatch {
            title: changed(&draft.title, &original.title),
            kind: (draft.kind != original.kind).then_some(draft.kind),
            city: changed(&draft.city, &original.city),
            description: changed(&draft.description, &original.description),
            tags: (draft.tags != original.tags).then(|| normalize_tags(draft.tags.clone())),
            photos,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn here() -> GeoPoint {
        GeoPoint::new(40.0, -74.0).unwrap()
    }

    #[test]
    fn test_location_payload_trims_and_drops_empty_fields() {
        let mut draft = LocationDraft::new();
        draft.title = "  Test Tag ".into();
        draft.city = "   ".into();
        draft.description = "north wall".into();

        let payload = draft.to_payload(here(), None).unwrap();
        assert_eq!(payload.title, "Test Tag");
        assert_eq!(payload.kind, LocationType::Tag);
        assert!(payload.city.is_none());
        assert_eq!(payload.description.as_deref(), Some("north wall"));
        assert!(payload.photo_headings.is_none());
    }

    #[test]
    fn test_location_payload_requires_title() {
        let draft = LocationDraft::new();
        assert_eq!(
            draft.to_payload(here(), None),
            Err(ValidationError::EmptyTitle)
        );
    }

    #[test]
    fn test_photos_and_headings_stay_parallel() {
        let mut draft = LocationDraft::new();
        draft.title = "Wall".into();
        for (i, heading) in [10.0, 20.0, 30.0].into_iter().enumerate() {
            draft
                .attach_photo(AttachedPhoto {
                    uri: format!("https://cdn/{i}.jpg"),
                    heading,
                })
                .unwrap();
        }
        draft.remove_photo(1);

        let payload = draft.to_payload(here(), None).unwrap();
        assert_eq!(payload.photos, vec!["https://cdn/0.jpg", "https://cdn/2.jpg"]);
        assert_eq!(payload.photo_headings, Some(vec![10.0, 30.0]));
    }

    #[test]
    fn test_photo_limit() {
        let mut draft = LocationDraft::new();
        for i in 0..MAX_PHOTOS {
            draft
                .attach_photo(AttachedPhoto { uri: format!("p{i}"), heading: 0.0 })
                .unwrap();
        }
        assert!(!draft.can_attach_photo());
        assert!(draft
            .attach_photo(AttachedPhoto { uri: "extra".into(), heading: 0.0 })
            .is_err());
    }

    #[test]
    fn test_tags_toggle_and_custom() {
        let mut draft = LocationDraft::new();
        draft.toggle_tag("Mural");
        draft.toggle_tag("Stencil");
        draft.toggle_tag("Mural");
        draft.tag_input = " rooftop ".into();
        draft.commit_tag_input();
        draft.tag_input = "Stencil".into();
        draft.commit_tag_input();

        assert_eq!(draft.tags, vec!["Stencil".to_string(), "rooftop".to_string()]);
        assert!(draft.tag_input.is_empty());
    }

    #[test]
    fn test_prospect_notes_optional() {
        let draft = ProspectDraft::new();
        let payload = draft
            .to_payload(GeoPoint::new(40.1, -74.1).unwrap(), None)
            .unwrap();
        assert!(payload.notes.is_none());
        assert!(payload.city.is_none());
    }

    fn saved() -> Location {
        Location {
            id: EntityId("l1".into()),
            owner_id: None,
            position: here(),
            title: "North wall".into(),
            kind: LocationType::Throw,
            city: Some("Queens".into()),
            address: None,
            description: None,
            tags: vec!["Mural".into()],
            photos: vec!["file:///a.jpg".into(), "file:///b.jpg".into()],
            photo_headings: Some(vec![90.0, 180.0]),
            created_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_edit_starts_from_the_saved_record() {
        let edit = LocationEdit::new(&saved());
        assert_eq!(edit.draft.city, "Queens");
        assert_eq!(edit.draft.photos[1].heading, 180.0);
        assert!(!edit.is_modified());
        assert_eq!(edit.to_patch().unwrap(), LocationPatch::default());
    }

    #[test]
    fn test_patch_carries_only_changes() {
        let mut edit = LocationEdit::new(&saved());
        edit.draft.title = " South wall ".into();
        edit.draft.city = String::new();
        edit.draft.remove_photo(0);
        assert!(edit.is_modified());

        let patch = edit.to_patch().unwrap();
        assert_eq!(patch.title.as_deref(), Some("South wall"));
        assert_eq!(patch.city.as_deref(), Some(""));
        assert_eq!(patch.kind, None);
        assert_eq!(patch.tags, None);
        assert_eq!(
            patch.photos,
            Some((vec!["file:///b.jpg".to_string()], Some(vec![180.0])))
        );

        let updated = patch.apply(saved()).unwrap();
        assert_eq!(updated.title, "South wall");
        assert_eq!(updated.city, None);
        assert_eq!(updated.photo_headings, Some(vec![180.0]));
    }

    #[test]
    fn test_edit_needs_a_title() {
        let mut edit = LocationEdit::new(&saved());
        edit.draft.title = "  ".into();
        assert!(matches!(edit.to_patch(), Err(ValidationError::EmptyTitle)));
    }
}
