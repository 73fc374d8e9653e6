/// Sensor platform capabilities
///
/// What the map needs from the device: a one-shot position, a position watch,
/// an orientation watch and the permission gate in front of it. A platform
/// that lacks any of these reports `SensorError::Unavailable` and the map
/// carries on with defaults.

use async_trait::async_trait;
use futures::stream::{self, Stream};
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::fusion::{OrientationSample, PermissionState, PositionFix};

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("sensor not available on this device")]
    Unavailable,
    #[error("sensor access was denied")]
    PermissionDenied,
    #[error("could not read sensor recording: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad sensor recording at line {line}: {source}")]
    Recording {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// A reading delivered by a watch
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorEvent {
    Position(PositionFix),
    Orientation(OrientationSample),
}

/// What the sensor session reports to the app
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorUpdate {
    Permission(PermissionState),
    Position(PositionFix),
    Orientation(OrientationSample),
}

impl From<SensorEvent> for SensorUpdate {
    fn from(event: SensorEvent) -> Self {
        match event {
            SensorEvent::Position(fix) => SensorUpdate::Position(fix),
            SensorEvent::Orientation(sample) => SensorUpdate::Orientation(sample),
        }
    }
}

pub type EventSink = mpsc::UnboundedSender<SensorEvent>;

/// Live subscription; dropping it stops the underlying watch
#[derive(Debug)]
pub struct Watch {
    task: Option<JoinHandle<()>>,
}

impl Watch {
    pub fn spawn<F>(future: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        Self {
            task: Some(tokio::spawn(future)),
        }
    }

    /// A watch with nothing behind it
    pub fn idle() -> Self {
        Self { task: None }
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[async_trait]
pub trait SensorPlatform: Send + Sync {
    async fn current_position(&self) -> Result<PositionFix, SensorError>;

    fn watch_position(&self, sink: EventSink) -> Result<Watch, SensorError>;

    fn watch_orientation(&self, sink: EventSink) -> Result<Watch, SensorError>;

    /// Ask for motion-sensor access; platforms without a gate answer Granted
    async fn request_orientation_permission(&self) -> PermissionState;
}

/// Desktop default: no sensors at all
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSensors;

#[async_trait]
impl SensorPlatform for NoSensors {
    async fn current_position(&self) -> Result<PositionFix, SensorError> {
        Err(SensorError::Unavailable)
    }

    fn watch_position(&self, _sink: EventSink) -> Result<Watch, SensorError> {
        Err(SensorError::Unavailable)
    }

    fn watch_orientation(&self, _sink: EventSink) -> Result<Watch, SensorError> {
        Err(SensorError::Unavailable)
    }

    async fn request_orientation_permission(&self) -> PermissionState {
        PermissionState::Unavailable
    }
}

/// One line of a sensor recording
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordedLine {
    /// Delay since the previous line
    #[serde(default)]
    delay_ms: u64,
    #[serde(default)]
    position: Option<PositionFix>,
    #[serde(default)]
    orientation: Option<OrientationSample>,
    #[serde(default)]
    permission: Option<PermissionState>,
}

#[derive(Debug, Clone, Copy)]
struct Recorded {
    at: Duration,
    event: SensorEvent,
}

/// Plays back a JSON-lines recording of sensor readings.
///
/// Each line holds an optional `delayMs` and one of `position`,
/// `orientation` or `permission`:
///
/// ```text
/// {"permission": "granted"}
/// {"delayMs": 0, "position": {"latitude": 40.71, "longitude": -74.0}}
/// {"delayMs": 250, "orientation": {"alpha": 100.0, "absolute": true}}
/// ```
#[derive(Debug, Clone)]
pub struct ReplayPlatform {
    events: Arc<Vec<Recorded>>,
    permission: PermissionState,
}

impl ReplayPlatform {
    pub fn from_events(events: Vec<(Duration, SensorEvent)>, permission: PermissionState) -> Self {
        let events = events
            .into_iter()
            .map(|(at, event)| Recorded { at, event })
            .collect();
        Self {
            events: Arc::new(events),
            permission,
        }
    }

    pub fn parse(recording: &str) -> Result<Self, SensorError> {
        let mut events = Vec::new();
        let mut permission = PermissionState::Granted;
        let mut at = Duration::ZERO;

        for (index, line) in recording.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let record: RecordedLine = serde_json::from_str(line)
                .map_err(|source| SensorError::Recording { line: index + 1, source })?;
            at += Duration::from_millis(record.delay_ms);

            if let Some(state) = record.permission {
                permission = state;
            }
            if let Some(fix) = record.position {
                events.push(Recorded { at, event: SensorEvent::Position(fix) });
            }
            if let Some(sample) = record.orientation {
                events.push(Recorded { at, event: SensorEvent::Orientation(sample) });
            }
        }

        debug!(events = events.len(), ?permission, "sensor recording parsed");
        Ok(Self {
            events: Arc::new(events),
            permission,
        })
    }

    pub fn load(path: &Path) -> Result<Self, SensorError> {
        let recording = std::fs::read_to_string(path)?;
        let platform = Self::parse(&recording)?;
        info!(path = %path.display(), "replaying sensor recording");
        Ok(platform)
    }

    fn play(&self, sink: EventSink, keep: fn(&SensorEvent) -> bool) -> Watch {
        let events = self.events.clone();
        Watch::spawn(async move {
            let start = Instant::now();
            for recorded in events.iter().filter(|r| keep(&r.event)) {
                tokio::time::sleep_until(start + recorded.at).await;
                if sink.send(recorded.event).is_err() {
                    break;
                }
            }
        })
    }
}

#[async_trait]
impl SensorPlatform for ReplayPlatform {
    async fn current_position(&self) -> Result<PositionFix, SensorError> {
        self.events
            .iter()
            .find_map(|r| match r.event {
                SensorEvent::Position(fix) => Some(fix),
                SensorEvent::Orientation(_) => None,
            })
            .ok_or(SensorError::Unavailable)
    }

    fn watch_position(&self, sink: EventSink) -> Result<Watch, SensorError> {
        Ok(self.play(sink, |e| matches!(e, SensorEvent::Position(_))))
    }

    fn watch_orientation(&self, sink: EventSink) -> Result<Watch, SensorError> {
        if self.permission == PermissionState::Denied {
            return Err(SensorError::PermissionDenied);
        }
        Ok(self.play(sink, |e| matches!(e, SensorEvent::Orientation(_))))
    }

    async fn request_orientation_permission(&self) -> PermissionState {
        self.permission
    }
}

/// Sensor subscription state; the watches live exactly as long as the stream
struct Session {
    platform: Arc<dyn SensorPlatform>,
    started: bool,
    queue: VecDeque<SensorUpdate>,
    events: Option<mpsc::UnboundedReceiver<SensorEvent>>,
    _watches: Vec<Watch>,
}

impl Session {
    async fn start(&mut self) {
        self.started = true;
        let (sink, events) = mpsc::unbounded_channel();

        match self.platform.current_position().await {
            Ok(fix) => self.queue.push_back(SensorUpdate::Position(fix)),
            Err(e) => debug!(error = %e, "no initial position"),
        }

        match self.platform.watch_position(sink.clone()) {
            Ok(watch) => self._watches.push(watch),
            Err(e) => warn!(error = %e, "position watch unavailable"),
        }

        let permission = self.platform.request_orientation_permission().await;
        self.queue.push_back(SensorUpdate::Permission(permission));
        if permission == PermissionState::Granted {
            match self.platform.watch_orientation(sink) {
                Ok(watch) => self._watches.push(watch),
                Err(e) => warn!(error = %e, "orientation watch unavailable"),
            }
        }

        self.events = Some(events);
    }
}

/// Start every available watch and merge them into one stream of updates.
///
/// The stream ends once all watches have finished; dropping it tears the
/// watches down.
pub fn session(platform: Arc<dyn SensorPlatform>) -> impl Stream<Item = SensorUpdate> + Send {
    let session = Session {
        platform,
        started: false,
        queue: VecDeque::new(),
        events: None,
        _watches: Vec::new(),
    };

    stream::unfold(session, |mut session| async move {
        if !session.started {
            session.start().await;
        }
        if let Some(update) = session.queue.pop_front() {
            return Some((update, session));
        }
        let event = session.events.as_mut()?.recv().await?;
        Some((event.into(), session))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::fusion::HeadingFusion;
    use crate::state::data::GeoPoint;
    use futures::StreamExt;

    const RECORDING: &str = r#"
# walk north then turn
{"permission": "granted"}
{"position": {"latitude": 40.7, "longitude": -74.0}}
{"delayMs": 5, "orientation": {"compassHeading": 45.0}}
{"delayMs": 5, "orientation": {"alpha": 100.0, "absolute": true}}
"#;

    #[test]
    fn test_parse_recording() {
        let platform = ReplayPlatform::parse(RECORDING).unwrap();
        assert_eq!(platform.events.len(), 3);
        assert_eq!(platform.permission, PermissionState::Granted);
        assert_eq!(platform.events[2].at, Duration::from_millis(10));
    }

    #[test]
    fn test_parse_reports_line() {
        let err = ReplayPlatform::parse("{}\n{not json").unwrap_err();
        assert!(matches!(err, SensorError::Recording { line: 2, .. }));
    }

    #[tokio::test]
    async fn test_no_sensors_session_only_reports_permission() {
        let updates: Vec<_> = session(Arc::new(NoSensors)).collect().await;
        assert_eq!(
            updates,
            vec![SensorUpdate::Permission(PermissionState::Unavailable)]
        );
    }

    #[tokio::test]
    async fn test_replay_session_feeds_fusion() {
        let platform = Arc::new(ReplayPlatform::parse(RECORDING).unwrap());
        let updates: Vec<_> = session(platform).collect().await;

        let mut fusion = HeadingFusion::new();
        for update in &updates {
            match *update {
                SensorUpdate::Permission(state) => fusion.set_permission(state),
                SensorUpdate::Position(fix) => {
                    fusion.on_position(fix);
                }
                SensorUpdate::Orientation(sample) => {
                    fusion.on_orientation(sample);
                }
            }
        }

        assert_eq!(fusion.position(), Some(GeoPoint::new(40.7, -74.0).unwrap()));
        assert_eq!(fusion.bearing(), 260.0);
        // initial fix + permission + watched position + two orientation samples
        assert_eq!(updates.len(), 5);
    }

    #[tokio::test]
    async fn test_denied_permission_skips_orientation_watch() {
        let platform = ReplayPlatform::from_events(
            vec![(
                Duration::ZERO,
                SensorEvent::Orientation(OrientationSample::compass(45.0)),
            )],
            PermissionState::Denied,
        );
        let updates: Vec<_> = session(Arc::new(platform)).collect().await;
        assert_eq!(updates, vec![SensorUpdate::Permission(PermissionState::Denied)]);
    }

    #[tokio::test]
    async fn test_dropping_watch_stops_delivery() {
        let platform = ReplayPlatform::from_events(
            vec![(
                Duration::from_secs(60),
                SensorEvent::Orientation(OrientationSample::compass(1.0)),
            )],
            PermissionState::Granted,
        );
        let (sink, mut events) = mpsc::unbounded_channel();
        let watch = platform.watch_orientation(sink).unwrap();
        drop(watch);
        assert!(events.recv().await.is_none());
    }
}
