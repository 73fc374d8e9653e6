/// App-level failures and the notices they turn into

use crate::photo::upload::UploadError;
use crate::sensor::platform::SensorError;
use crate::state::placement::PlacementError;
use crate::state::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("sensor access was denied")]
    PermissionDenied,
    #[error("{0}")]
    Validation(String),
    #[error("network error: {0}")]
    Network(String),
    /// The entity was removed elsewhere
    #[error("already removed")]
    NotFound,
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Sensor(SensorError),
}

impl AppError {
    /// Short, user-facing text
    pub fn notice(&self) -> String {
        match self {
            AppError::PermissionDenied => {
                "Motion sensors are blocked, heading stays at north".to_string()
            }
            AppError::Validation(message) => message.clone(),
            AppError::Network(_) => "Network problem, try again".to_string(),
            AppError::NotFound => "Already removed".to_string(),
            AppError::Upload(UploadError::TooLarge { .. }) => {
                "Photo is too large (10 MB max)".to_string()
            }
            AppError::Upload(UploadError::NotAnImage) => "That file is not an image".to_string(),
            AppError::Upload(_) => "Upload failed, retry".to_string(),
            AppError::Store(e) => format!("Could not save: {e}"),
            AppError::Sensor(e) => e.to_string(),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { .. } => AppError::NotFound,
            StoreError::Validation(e) => AppError::Validation(e.to_string()),
            StoreError::Rejected(message) => AppError::Validation(message),
            StoreError::Network(message) => AppError::Network(message),
            other => AppError::Store(other),
        }
    }
}

impl From<SensorError> for AppError {
    fn from(error: SensorError) -> Self {
        match error {
            SensorError::PermissionDenied => AppError::PermissionDenied,
            other => AppError::Sensor(other),
        }
    }
}

impl From<PlacementError> for AppError {
    fn from(error: PlacementError) -> Self {
        AppError::Validation(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::data::{EntityId, ValidationError};
    use crate::state::store::EntityKind;

    #[test]
    fn test_store_errors_map_to_notices() {
        let gone = AppError::from(StoreError::NotFound {
            kind: EntityKind::Location,
            id: EntityId("x".into()),
        });
        assert_eq!(gone.notice(), "Already removed");

        let invalid = AppError::from(StoreError::Validation(ValidationError::EmptyTitle));
        assert_eq!(invalid.notice(), "a title is required");

        let rejected = AppError::from(StoreError::Rejected("title too long".into()));
        assert_eq!(rejected.notice(), "title too long");

        let offline = AppError::from(StoreError::Network("timed out".into()));
        assert_eq!(offline.notice(), "Network problem, try again");
    }

    #[test]
    fn test_upload_failures_offer_retry() {
        let failed = AppError::from(UploadError::Failed("503".into()));
        assert_eq!(failed.notice(), "Upload failed, retry");
        let big = AppError::from(UploadError::TooLarge { size: 11, max: 10 });
        assert!(big.notice().contains("too large"));
    }

    #[test]
    fn test_sensor_denial() {
        assert!(matches!(
            AppError::from(SensorError::PermissionDenied),
            AppError::PermissionDenied
        ));
    }
}
