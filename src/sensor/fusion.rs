/// Heading fusion
///
/// Collapses compass, orientation and GPS course readings into the one bearing
/// shown on the user marker. The most recent accepted sample wins outright;
/// nothing is averaged.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::state::data::{normalize_degrees, GeoPoint};

/// One device-orientation reading as the platform reports it
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrientationSample {
    /// Direct compass heading, clockwise from north
    #[serde(default)]
    pub compass_heading: Option<f64>,
    /// Rotation about the vertical axis, counter-clockwise
    #[serde(default)]
    pub alpha: Option<f64>,
    /// Whether `alpha` is earth-referenced
    #[serde(default)]
    pub absolute: bool,
}

impl OrientationSample {
    pub fn compass(heading: f64) -> Self {
        Self {
            compass_heading: Some(heading),
            ..Default::default()
        }
    }

    pub fn absolute(alpha: f64) -> Self {
        Self {
            alpha: Some(alpha),
            absolute: true,
            ..Default::default()
        }
    }

    pub fn relative(alpha: f64) -> Self {
        Self {
            alpha: Some(alpha),
            ..Default::default()
        }
    }
}

/// A position report, optionally with course over ground
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionFix {
    #[serde(flatten)]
    pub position: GeoPoint,
    #[serde(default)]
    pub heading: Option<f64>,
    /// Metres per second
    #[serde(default)]
    pub speed: Option<f64>,
}

impl PositionFix {
    pub fn at(position: GeoPoint) -> Self {
        Self {
            position,
            heading: None,
            speed: None,
        }
    }

    /// Course over ground, when the platform considers it meaningful
    fn course(&self) -> Option<f64> {
        let heading = self.heading.filter(|h| h.is_finite())?;
        match self.speed {
            Some(speed) if speed <= 0.0 => None,
            _ => Some(heading),
        }
    }
}

/// Where the current bearing came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadingSource {
    Compass,
    AbsoluteOrientation,
    RelativeOrientation,
    GpsCourse,
}

/// Motion-sensor permission for this session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    #[default]
    Unknown,
    Granted,
    Denied,
    /// The platform has no orientation sensor at all
    Unavailable,
}

#[derive(Debug, Clone, Default)]
pub struct HeadingFusion {
    bearing: Option<f64>,
    source: Option<HeadingSource>,
    /// Once an earth-referenced reading has been seen, relative ones are noise
    earth_referenced: bool,
    permission: PermissionState,
    position: Option<PositionFix>,
}

impl HeadingFusion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current bearing in [0, 360); 0 until something has been heard
    pub fn bearing(&self) -> f64 {
        self.bearing.unwrap_or(0.0)
    }

    /// Bearing only if a sensor actually produced one
    pub fn known_bearing(&self) -> Option<f64> {
        self.bearing
    }

    pub fn source(&self) -> Option<HeadingSource> {
        self.source
    }

    pub fn permission(&self) -> PermissionState {
        self.permission
    }

    pub fn position(&self) -> Option<GeoPoint> {
        self.position.map(|fix| fix.position)
    }

    pub fn has_fix(&self) -> bool {
        self.position.is_some()
    }

    /// Orientation readings are only accepted while permission is not denied
    pub fn orientation_allowed(&self) -> bool {
        matches!(self.permission, PermissionState::Unknown | PermissionState::Granted)
    }

    /// Record the outcome of the permission prompt. Denial is final for the
    /// session: later grants are ignored and the bearing stays where it is.
    pub fn set_permission(&mut self, permission: PermissionState) {
        if self.permission == PermissionState::Denied {
            return;
        }
        info!(?permission, "orientation permission");
        self.permission = permission;
    }

    /// Feed one orientation reading; returns the new bearing if it was accepted
    pub fn on_orientation(&mut self, sample: OrientationSample) -> Option<f64> {
        if !self.orientation_allowed() {
            return None;
        }
        let (bearing, source) = self.resolve(&sample)?;
        self.accept(bearing, source);
        Some(self.bearing())
    }

    /// Feed one position report. Course over ground, when present, overrides
    /// the compass bearing.
    pub fn on_position(&mut self, fix: PositionFix) -> Option<f64> {
        if self.position.is_none() {
            info!(
                lat = fix.position.latitude,
                lon = fix.position.longitude,
                "first position fix"
            );
        }
        self.position = Some(fix);
        let course = fix.course()?;
        self.accept(course, HeadingSource::GpsCourse);
        Some(self.bearing())
    }

    fn resolve(&mut self, sample: &OrientationSample) -> Option<(f64, HeadingSource)> {
        if let Some(heading) = sample.compass_heading.filter(|h| h.is_finite()) {
            self.earth_referenced = true;
            return Some((heading, HeadingSource::Compass));
        }
        let alpha = sample.alpha.filter(|a| a.is_finite())?;
        if sample.absolute {
            self.earth_referenced = true;
            Some((360.0 - alpha, HeadingSource::AbsoluteOrientation))
        } else if self.earth_referenced {
            None
        } else {
            Some((alpha, HeadingSource::RelativeOrientation))
        }
    }

    fn accept(&mut self, degrees: f64, source: HeadingSource) {
        let bearing = normalize_degrees(degrees);
        if self.source != Some(source) {
            debug!(?source, bearing, "heading source changed");
        }
        self.bearing = Some(bearing);
        self.source = Some(source);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(heading: Option<f64>, speed: Option<f64>) -> PositionFix {
        PositionFix {
            position: GeoPoint::new(40.0, -74.0).unwrap(),
            heading,
            speed,
        }
    }

    #[test]
    fn test_bearing_is_zero_before_any_sample() {
        let fusion = HeadingFusion::new();
        assert_eq!(fusion.bearing(), 0.0);
        assert_eq!(fusion.known_bearing(), None);
        assert!(!fusion.has_fix());
    }

    #[test]
    fn test_compass_then_absolute_last_write_wins() {
        let mut fusion = HeadingFusion::new();
        assert_eq!(fusion.on_orientation(OrientationSample::compass(45.0)), Some(45.0));
        assert_eq!(fusion.source(), Some(HeadingSource::Compass));

        assert_eq!(fusion.on_orientation(OrientationSample::absolute(100.0)), Some(260.0));
        assert_eq!(fusion.source(), Some(HeadingSource::AbsoluteOrientation));
    }

    #[test]
    fn test_compass_field_beats_alpha_in_same_sample() {
        let mut fusion = HeadingFusion::new();
        let sample = OrientationSample {
            compass_heading: Some(10.0),
            alpha: Some(100.0),
            absolute: true,
        };
        assert_eq!(fusion.on_orientation(sample), Some(10.0));
    }

    #[test]
    fn test_absolute_zero_maps_to_north() {
        let mut fusion = HeadingFusion::new();
        assert_eq!(fusion.on_orientation(OrientationSample::absolute(0.0)), Some(0.0));
    }

    #[test]
    fn test_relative_only_until_earth_referenced() {
        let mut fusion = HeadingFusion::new();
        assert_eq!(fusion.on_orientation(OrientationSample::relative(30.0)), Some(30.0));
        assert_eq!(fusion.source(), Some(HeadingSource::RelativeOrientation));

        fusion.on_orientation(OrientationSample::compass(90.0));
        assert_eq!(fusion.on_orientation(OrientationSample::relative(30.0)), None);
        assert_eq!(fusion.bearing(), 90.0);
    }

    #[test]
    fn test_gps_course_overrides_compass() {
        let mut fusion = HeadingFusion::new();
        fusion.on_orientation(OrientationSample::compass(45.0));
        assert_eq!(fusion.on_position(fix(Some(180.0), Some(3.0))), Some(180.0));
        assert_eq!(fusion.source(), Some(HeadingSource::GpsCourse));

        // and the compass takes it back on the next reading
        assert_eq!(fusion.on_orientation(OrientationSample::compass(50.0)), Some(50.0));
    }

    #[test]
    fn test_position_without_course_keeps_bearing() {
        let mut fusion = HeadingFusion::new();
        fusion.on_orientation(OrientationSample::compass(45.0));
        assert_eq!(fusion.on_position(fix(None, None)), None);
        assert_eq!(fusion.on_position(fix(Some(f64::NAN), None)), None);
        assert_eq!(fusion.on_position(fix(Some(90.0), Some(0.0))), None);
        assert_eq!(fusion.bearing(), 45.0);
        assert!(fusion.has_fix());
    }

    #[test]
    fn test_denied_permission_is_terminal() {
        let mut fusion = HeadingFusion::new();
        fusion.set_permission(PermissionState::Denied);
        assert_eq!(fusion.on_orientation(OrientationSample::compass(45.0)), None);
        assert_eq!(fusion.bearing(), 0.0);

        fusion.set_permission(PermissionState::Granted);
        assert_eq!(fusion.permission(), PermissionState::Denied);
        assert!(!fusion.orientation_allowed());
    }

    #[test]
    fn test_non_finite_samples_are_dropped() {
        let mut fusion = HeadingFusion::new();
        assert_eq!(fusion.on_orientation(OrientationSample::compass(f64::NAN)), None);
        assert_eq!(fusion.on_orientation(OrientationSample::default()), None);
        assert_eq!(fusion.known_bearing(), None);
    }

    #[test]
    fn test_bearing_is_wrapped() {
        let mut fusion = HeadingFusion::new();
        assert_eq!(fusion.on_orientation(OrientationSample::compass(-90.0)), Some(270.0));
        assert_eq!(fusion.on_orientation(OrientationSample::absolute(-10.0)), Some(10.0));
    }

    #[test]
    fn test_sample_wire_format() {
        let sample: OrientationSample =
            serde_json::from_str(r#"{"alpha": 100.0, "absolute": true}"#).unwrap();
        assert_eq!(sample, OrientationSample::absolute(100.0));

        let fix: PositionFix =
            serde_json::from_str(r#"{"latitude": 40.0, "longitude": -74.0, "heading": 12.5}"#).unwrap();
        assert_eq!(fix.heading, Some(12.5));
        assert_eq!(fix.speed, None);
    }
}
