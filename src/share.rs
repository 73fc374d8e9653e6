/// Sharing and export of a single Location

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::state::data::{GeoPoint, Location};

/// Public link for a Location: `<base>/shared/<id>`
pub fn share_url(base: &str, location: &Location) -> String {
    format!("{}/shared/{}", base.trim_end_matches('/'), location.id)
}

pub fn share_text(location: &Location) -> String {
    let city = location.city.as_deref().unwrap_or("the city");
    format!("Check out this graffiti spot: {} in {}", location.title, city)
}

/// Turn-by-turn directions to a point in Google Maps
pub fn directions_url(point: GeoPoint) -> String {
    format!(
        "https://www.google.com/maps/dir/?api=1&destination={},{}",
        point.latitude, point.longitude
    )
}

pub fn export_file_name(location: &Location) -> String {
    format!("graffiti-location-{}.json", location.id)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Export<'a> {
    #[serde(flatten)]
    location: &'a Location,
    exported_at: String,
}

/// Pretty-printed JSON of the Location plus an `exportedAt` stamp
pub fn export_json(location: &Location, now: DateTime<Utc>) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&Export {
        location,
        exported_at: now.to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

pub async fn write_export(path: &Path, json: String) -> std::io::Result<()> {
    tokio::fs::write(path, json).await?;
    info!(path = %path.display(), "location exported");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::{EntityId, LocationType};
    use chrono::TimeZone;

    fn location() -> Location {
        Location {
            id: EntityId("abc123".into()),
            owner_id: None,
            position: GeoPoint::new(40.7128, -74.006).unwrap(),
            title: "Bridge Piece".into(),
            kind: LocationType::Burner,
            city: None,
            address: None,
            description: None,
            tags: vec!["Piece".into()],
            photos: vec![],
            photo_headings: None,
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_share_link_and_text() {
        let mut location = location();
        assert_eq!(share_url("https://spotmap.app/", &location), "https://spotmap.app/shared/abc123");
        assert_eq!(
            share_text(&location),
            "Check out this graffiti spot: Bridge Piece in the city"
        );
        location.city = Some("New York".into());
        assert_eq!(
            share_text(&location),
            "Check out this graffiti spot: Bridge Piece in New York"
        );
    }

    #[test]
    fn test_directions_use_full_precision() {
        assert_eq!(
            directions_url(GeoPoint::new(40.7128, -74.006).unwrap()),
            "https://www.google.com/maps/dir/?api=1&destination=40.7128,-74.006"
        );
    }

    #[test]
    fn test_export_contains_location_and_stamp() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let json = export_json(&location(), now).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["id"], "abc123");
        assert_eq!(value["type"], "burner");
        assert_eq!(value["latitude"], 40.7128);
        assert_eq!(value["exportedAt"], "2024-06-01T12:00:00.000Z");
        assert_eq!(export_file_name(&location()), "graffiti-location-abc123.json");
    }

    #[tokio::test]
    async fn test_write_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_export(&path, "{}".into()).await.unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "{}");
    }
}
