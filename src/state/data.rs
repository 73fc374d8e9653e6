/// Shared data structures for the application state
///
/// These structs represent the data model that flows between
/// the entity store, the query cache and the map.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Most photos a single Location may carry
pub const MAX_PHOTOS: usize = 5;

/// Reasons a payload is rejected before it reaches the store
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("a title is required")]
    EmptyTitle,
    #[error("latitude {0} is outside -90..=90")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} is outside -180..=180")]
    LongitudeOutOfRange(f64),
    #[error("{photos} photos but {headings} photo headings")]
    PhotoHeadingsMismatch { photos: usize, headings: usize },
    #[error("photo heading {0} is outside 0..360")]
    HeadingOutOfRange(f64),
    #[error("at most {max} photos are allowed")]
    TooManyPhotos { max: usize },
}

/// A WGS84 coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Build a point, rejecting anything outside the valid lat/lon ranges
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        let point = Self { latitude, longitude };
        point.validate()?;
        Ok(point)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        // NaN fails both range checks
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ValidationError::LatitudeOutOfRange(self.latitude));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ValidationError::LongitudeOutOfRange(self.longitude));
        }
        Ok(())
    }
}

/// Opaque identifier of a persisted entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Fresh client-side identifier (used by the local store)
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier handed out by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub String);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of piece at a confirmed spot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationType {
    #[default]
    Tag,
    Throw,
    Burner,
    Roller,
}

impl LocationType {
    pub const ALL: [LocationType; 4] = [
        LocationType::Tag,
        LocationType::Throw,
        LocationType::Burner,
        LocationType::Roller,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LocationType::Tag => "tag",
            LocationType::Throw => "throw",
            LocationType::Burner => "burner",
            LocationType::Roller => "roller",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == value)
    }
}

impl fmt::Display for LocationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LocationType::Tag => "Tag",
            LocationType::Throw => "Throw",
            LocationType::Burner => "Burner",
            LocationType::Roller => "Roller",
        };
        f.write_str(label)
    }
}

/// A confirmed graffiti spot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub id: EntityId,
    #[serde(default)]
    pub owner_id: Option<OwnerId>,
    #[serde(flatten)]
    pub position: GeoPoint,
    pub title: String,
    #[serde(default, rename = "type")]
    pub kind: LocationType,
    #[serde(default, deserialize_with = "optional_text")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub address: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub photos: Vec<String>,
    /// Bearing per photo, parallel to `photos`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_headings: Option<Vec<f64>>,
    pub created_at: DateTime<Utc>,
}

impl Location {
    /// Heading of the first photo, if headings were recorded
    pub fn primary_heading(&self) -> Option<f64> {
        self.photo_headings.as_ref()?.first().copied()
    }
}

/// An unconfirmed lead
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prospect {
    pub id: EntityId,
    #[serde(default)]
    pub owner_id: Option<OwnerId>,
    #[serde(flatten)]
    pub position: GeoPoint,
    #[serde(default, deserialize_with = "optional_text")]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub city: Option<String>,
    #[serde(default, deserialize_with = "optional_text")]
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Create request for a Location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLocation {
    #[serde(default)]
    pub owner_id: Option<OwnerId>,
    #[serde(flatten)]
    pub position: GeoPoint,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: LocationType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_headings: Option<Vec<f64>>,
}

impl NewLocation {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        self.position.validate()?;
        if self.photos.len() > MAX_PHOTOS {
            return Err(ValidationError::TooManyPhotos { max: MAX_PHOTOS });
        }
        validate_headings(self.photos.len(), self.photo_headings.as_deref())
    }

    /// Materialize the persisted record
    pub fn into_location(self, id: EntityId, created_at: DateTime<Utc>) -> Location {
        Location {
            id,
            owner_id: self.owner_id,
            position: self.position,
            title: self.title.trim().to_string(),
            kind: self.kind,
            city: self.city,
            address: self.address,
            description: self.description,
            tags: self.tags,
            photos: self.photos,
            photo_headings: self.photo_headings,
            created_at,
        }
    }
}

/// Create request for a Prospect; only the coordinate is required
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProspect {
    #[serde(default)]
    pub owner_id: Option<OwnerId>,
    #[serde(flatten)]
    pub position: GeoPoint,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl NewProspect {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.position.validate()
    }

    pub fn into_prospect(self, id: EntityId, created_at: DateTime<Utc>) -> Prospect {
        Prospect {
            id,
            owner_id: self.owner_id,
            position: self.position,
            notes: self.notes,
            city: self.city,
            address: self.address,
            created_at,
        }
    }
}

/// Partial update of a Location; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<LocationType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    /// Photos and their headings are replaced together
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photos: Option<(Vec<String>, Option<Vec<f64>>)>,
}

impl LocationPatch {
    /// Apply onto an existing record, validating the result
    pub fn apply(self, mut location: Location) -> Result<Location, ValidationError> {
        if let Some(title) = self.title {
            if title.trim().is_empty() {
                return Err(ValidationError::EmptyTitle);
            }
            location.title = title.trim().to_string();
        }
        if let Some(kind) = self.kind {
            location.kind = kind;
        }
        if let Some(city) = self.city {
            location.city = non_empty(&city);
        }
        if let Some(description) = self.description {
            location.description = non_empty(&description);
        }
        if let Some(tags) = self.tags {
            location.tags = normalize_tags(tags);
        }
        if let Some((photos, headings)) = self.photos {
            if photos.len() > MAX_PHOTOS {
                return Err(ValidationError::TooManyPhotos { max: MAX_PHOTOS });
            }
            validate_headings(photos.len(), headings.as_deref())?;
            location.photos = photos;
            location.photo_headings = headings;
        }
        Ok(location)
    }
}

fn validate_headings(photos: usize, headings: Option<&[f64]>) -> Result<(), ValidationError> {
    let Some(headings) = headings else {
        return Ok(());
    };
    if headings.len() != photos {
        return Err(ValidationError::PhotoHeadingsMismatch {
            photos,
            headings: headings.len(),
        });
    }
    match headings.iter().find(|h| !(0.0..360.0).contains(*h)) {
        Some(bad) => Err(ValidationError::HeadingOutOfRange(*bad)),
        None => Ok(()),
    }
}

/// Wrap any angle into [0, 360)
pub fn normalize_degrees(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid rounds up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Trimmed text, or `None` when nothing is left
pub fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Blank strings from the backend decode as absent
fn optional_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?
        .as_deref()
        .and_then(non_empty))
}

/// Trim tags, drop blanks and duplicates, keep first-seen order
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim();
        if !tag.is_empty() && !seen.iter().any(|t| t == tag) {
            seen.push(tag.to_string());
        }
    }
    seen
}
