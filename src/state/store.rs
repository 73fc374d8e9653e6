/// Entity store seam
///
/// The map only ever talks to `EntityStore`. `Library` (local SQLite) and
/// `RemoteStore` (REST backend) implement it.

use async_trait::async_trait;
use uuid::Uuid;

use super::data::{
    EntityId, Location, LocationPatch, NewLocation, NewProspect, OwnerId, Prospect,
    ValidationError,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: EntityKind, id: EntityId },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The backend refused the payload (HTTP 400)
    #[error("rejected by the server: {0}")]
    Rejected(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("could not decode stored data: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Location,
    Prospect,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Location => f.write_str("location"),
            EntityKind::Prospect => f.write_str("prospect"),
        }
    }
}

/// CRUD over Locations and Prospects.
///
/// Lists are newest first. `token` makes creates idempotent: repeating a
/// create with the same token yields the record created the first time.
#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn list_locations(&self, owner: Option<&OwnerId>) -> Result<Vec<Location>, StoreError>;

    async fn get_location(&self, id: &EntityId) -> Result<Location, StoreError>;

    async fn create_location(&self, payload: NewLocation, token: Uuid) -> Result<Location, StoreError>;

    async fn update_location(&self, id: &EntityId, patch: LocationPatch) -> Result<Location, StoreError>;

    async fn delete_location(&self, id: &EntityId) -> Result<(), StoreError>;

    async fn list_prospects(&self, owner: Option<&OwnerId>) -> Result<Vec<Prospect>, StoreError>;

    async fn create_prospect(&self, payload: NewProspect, token: Uuid) -> Result<Prospect, StoreError>;

    async fn delete_prospect(&self, id: &EntityId) -> Result<(), StoreError>;
}
