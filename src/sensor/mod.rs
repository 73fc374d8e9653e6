/// Device sensors: the platform seam and heading fusion

pub mod fusion;
pub mod platform;

pub use fusion::{HeadingFusion, OrientationSample, PermissionState, PositionFix};
pub use platform::{session, NoSensors, ReplayPlatform, SensorPlatform, SensorUpdate};
