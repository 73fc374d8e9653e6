/// Marker popups and the location details model
///
/// Everything here is display-only: coordinates are rounded for reading, never
/// for storage. Optional fields that are missing produce no line at all.

use chrono::{DateTime, Local, Utc};

use crate::state::data::{GeoPoint, Location, Prospect};
use crate::state::placement::PlacementMode;

/// How many decimals a coordinate is shown with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// 4 decimals, about 11 m
    Compact,
    /// 6 decimals, about 0.1 m
    Full,
}

pub fn format_coordinate(value: f64, precision: Precision) -> String {
    match precision {
        Precision::Compact => format!("{value:.4}"),
        Precision::Full => format!("{value:.6}"),
    }
}

pub fn format_position(point: GeoPoint, precision: Precision) -> String {
    format!(
        "{}, {}",
        format_coordinate(point.latitude, precision),
        format_coordinate(point.longitude, precision)
    )
}

/// "45° NE"
pub fn format_heading(degrees: f64) -> String {
    const POINTS: [&str; 8] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];
    // 359.6 shows as "0° N", never "360°"
    let shown = degrees.rem_euclid(360.0).round() % 360.0;
    let index = ((shown + 22.5) / 45.0) as usize % 8;
    format!("{shown:.0}° {}", POINTS[index])
}

/// "Just now", "3 hours ago", "1 day ago", or the calendar date after a week
pub fn relative_time(created: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let hours = (now - created).num_hours();
    let days = hours / 24;
    match (hours, days) {
        (h, _) if h < 1 => "Just now".to_string(),
        (1, _) => "1 hour ago".to_string(),
        (h, _) if h < 24 => format!("{h} hours ago"),
        (_, 1) => "1 day ago".to_string(),
        (_, d) if d < 7 => format!("{d} days ago"),
        _ => created.with_timezone(&Local).format("%x").to_string(),
    }
}

/// Summary shown next to a marker
#[derive(Debug, Clone, PartialEq)]
pub struct PopupContent {
    pub title: String,
    pub lines: Vec<String>,
}

impl PopupContent {
    pub fn location(location: &Location) -> Self {
        let title = if location.title.trim().is_empty() {
            "Graffiti Spot".to_string()
        } else {
            location.title.clone()
        };

        let mut lines = vec![location.kind.to_string()];
        if let Some(city) = &location.city {
            lines.push(city.clone());
        }
        lines.push(format_position(location.position, Precision::Compact));
        if let Some(heading) = location.primary_heading() {
            lines.push(format!("Facing {}", format_heading(heading)));
        }
        Self { title, lines }
    }

    pub fn prospect(prospect: &Prospect) -> Self {
        let mut lines = Vec::new();
        if let Some(city) = &prospect.city {
            lines.push(city.clone());
        }
        if let Some(notes) = &prospect.notes {
            lines.push(notes.clone());
        }
        lines.push(format_position(prospect.position, Precision::Compact));
        Self {
            title: "Prospect".to_string(),
            lines,
        }
    }

    pub fn pending(mode: PlacementMode) -> Self {
        let title = match mode {
            PlacementMode::Location => "New graffiti spot - tap Save to confirm",
            PlacementMode::Prospect => "New prospect - tap Save to confirm",
        };
        Self {
            title: title.to_string(),
            lines: Vec::new(),
        }
    }

    pub fn user() -> Self {
        Self {
            title: "Your Location".to_string(),
            lines: Vec::new(),
        }
    }
}

/// One entry of the photo gallery
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryPhoto {
    pub uri: String,
    pub heading: Option<String>,
}

/// What the details panel shows for a Location
#[derive(Debug, Clone, PartialEq)]
pub struct LocationDetails {
    pub title: String,
    pub kind: String,
    pub created: String,
    /// Address when known, else compact coordinates
    pub place: String,
    pub coordinates: String,
    pub city: Option<String>,
    pub description: Option<String>,
    /// `None` when there are no tags
    pub tags: Option<Vec<String>>,
    /// `None` when there are no photos
    pub gallery: Option<Vec<GalleryPhoto>>,
}

impl LocationDetails {
    pub fn new(location: &Location, now: DateTime<Utc>) -> Self {
        let headings = location.photo_headings.as_deref().unwrap_or_default();
        let gallery: Vec<GalleryPhoto> = location
            .photos
            .iter()
            .enumerate()
            .map(|(i, uri)| GalleryPhoto {
                uri: uri.clone(),
                heading: headings.get(i).map(|h| format_heading(*h)),
            })
            .collect();

        Self {
            title: PopupContent::location(location).title,
            kind: location.kind.to_string(),
            created: relative_time(location.created_at, now),
            place: location
                .address
                .clone()
                .unwrap_or_else(|| format_position(location.position, Precision::Compact)),
            coordinates: format_position(location.position, Precision::Full),
            city: location.city.clone(),
            description: location.description.clone(),
            tags: (!location.tags.is_empty()).then(|| location.tags.clone()),
            gallery: (!gallery.is_empty()).then_some(gallery),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::{EntityId, LocationType};
    use chrono::Duration;

    fn location() -> Location {
        Location {
            id: EntityId("l1".into()),
            owner_id: None,
            position: GeoPoint::new(40.123456789, -74.987654321).unwrap(),
            title: "Test Tag".into(),
            kind: LocationType::Throw,
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
    fn test_coordinate_precision() {
        let point = GeoPoint::new(40.0, -74.0).unwrap();
        assert_eq!(format_position(point, Precision::Compact), "40.0000, -74.0000");
        assert_eq!(format_position(point, Precision::Full), "40.000000, -74.000000");
        assert_eq!(format_coordinate(40.123456789, Precision::Compact), "40.1235");
    }

    #[test]
    fn test_popup_skips_missing_fields() {
        let popup = PopupContent::location(&location());
        assert_eq!(popup.title, "Test Tag");
        assert_eq!(popup.lines, vec!["Throw".to_string(), "40.1235, -74.9877".to_string()]);
    }

    #[test]
    fn test_popup_shows_city_and_heading() {
        let mut location = location();
        location.city = Some("Brooklyn".into());
        location.photos = vec!["a".into()];
        location.photo_headings = Some(vec![90.0]);
        let popup = PopupContent::location(&location);
        assert_eq!(popup.lines[1], "Brooklyn");
        assert_eq!(popup.lines[3], "Facing 90° E");
    }

    #[test]
    fn test_blank_title_falls_back() {
        let mut location = location();
        location.title = String::new();
        assert_eq!(PopupContent::location(&location).title, "Graffiti Spot");
    }

    #[test]
    fn test_details_without_photos_has_no_gallery() {
        let details = LocationDetails::new(&location(), Utc::now());
        assert_eq!(details.gallery, None);
        assert_eq!(details.tags, None);
        assert_eq!(details.place, "40.1235, -74.9877");
        assert_eq!(details.coordinates, "40.123457, -74.987654");
    }

    #[test]
    fn test_details_with_photos_but_no_headings() {
        let mut location = location();
        location.photos = vec!["a".into(), "b".into()];
        let details = LocationDetails::new(&location, Utc::now());
        let gallery = details.gallery.unwrap();
        assert_eq!(gallery.len(), 2);
        assert!(gallery.iter().all(|p| p.heading.is_none()));
    }

    #[test]
    fn test_relative_time() {
        let now = Utc::now();
        assert_eq!(relative_time(now - Duration::minutes(30), now), "Just now");
        assert_eq!(relative_time(now - Duration::minutes(90), now), "1 hour ago");
        assert_eq!(relative_time(now - Duration::hours(5), now), "5 hours ago");
        assert_eq!(relative_time(now - Duration::hours(30), now), "1 day ago");
        assert_eq!(relative_time(now - Duration::days(3), now), "3 days ago");
        assert!(!relative_time(now - Duration::days(30), now).contains("ago"));
    }

    #[test]
    fn test_heading_labels() {
        assert_eq!(format_heading(0.0), "0° N");
        assert_eq!(format_heading(44.0), "44° NE");
        assert_eq!(format_heading(350.0), "350° N");
        assert_eq!(format_heading(225.0), "225° SW");
        assert_eq!(format_heading(359.9), "0° N");
        assert_eq!(format_heading(-0.2), "0° N");
    }
}
