use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use super::data::{
    EntityId, GeoPoint, Location, LocationPatch, LocationType, NewLocation, NewProspect, OwnerId,
    Prospect,
};
use super::store::{EntityKind, EntityStore, StoreError};

/// The Library is the local SQLite catalog of spots and prospects.
/// It is used whenever no remote backend is configured.
#[derive(Clone)]
pub struct Library {
    conn: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
}

const LOCATION_COLUMNS: &str = "id, owner_id, latitude, longitude, title, kind, city, address, \
     description, tags_json, photos_json, headings_json, created_at";

const PROSPECT_COLUMNS: &str = "id, owner_id, latitude, longitude, notes, city, address, created_at";

impl Library {
    /// Open (or create) the catalog at `db_path` and initialize the schema.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        info!(path = %db_path.display(), "catalog opened");

        let library = Library {
            conn: Arc::new(Mutex::new(conn)),
            db_path: Some(db_path.to_path_buf()),
        };
        library.init_schema()?;
        Ok(library)
    }

    /// Catalog that lives only as long as this value (tests, demo mode)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let library = Library {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
            db_path: None,
        };
        library.init_schema()?;
        Ok(library)
    }

    /// Get the path to the database file
    pub fn path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    /// Creates all tables and indexes if they don't exist.
    fn init_schema(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS locations (
                    id              TEXT PRIMARY KEY,
                    owner_id        TEXT,
                    latitude        REAL NOT NULL,
                    longitude       REAL NOT NULL,
                    title           TEXT NOT NULL,
                    kind            TEXT NOT NULL DEFAULT 'tag',
                    city            TEXT,
                    address         TEXT,
                    description     TEXT,
                    tags_json       TEXT NOT NULL DEFAULT '[]',
                    photos_json     TEXT NOT NULL DEFAULT '[]',
                    headings_json   TEXT,
                    created_at      TEXT NOT NULL,
                    create_token    TEXT UNIQUE
                );
                CREATE TABLE IF NOT EXISTS prospects (
                    id              TEXT PRIMARY KEY,
                    owner_id        TEXT,
                    latitude        REAL NOT NULL,
                    longitude       REAL NOT NULL,
                    notes           TEXT,
                    city            TEXT,
                    address         TEXT,
                    created_at      TEXT NOT NULL,
                    create_token    TEXT UNIQUE
                );
                CREATE INDEX IF NOT EXISTS idx_locations_owner
                    ON locations(owner_id, created_at DESC);
                CREATE INDEX IF NOT EXISTS idx_prospects_owner
                    ON prospects(owner_id, created_at DESC);",
            )?;
            Ok(())
        })?;
        debug!("catalog schema initialized");
        Ok(())
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        // A poisoned lock only means another call panicked mid-statement;
        // SQLite itself is still consistent.
        let conn = self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&conn)
    }

    /// Run a catalog operation off the UI thread
    async fn blocking<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Library) -> Result<T, StoreError> + Send + 'static,
    {
        let library = self.clone();
        tokio::task::spawn_blocking(move || f(&library)).await?
    }

    fn query_locations(&self, owner: Option<&OwnerId>) -> Result<Vec<Location>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {LOCATION_COLUMNS} FROM locations
                 WHERE owner_id IS ?1
                 ORDER BY created_at DESC"
            ))?;
            let rows = stmt.query_map([owner.map(|o| o.0.as_str())], LocationRow::read)?;

            let mut locations = Vec::new();
            for row in rows {
                locations.push(row?.into_location()?);
            }
            Ok(locations)
        })
    }

    fn find_location(conn: &Connection, id: &str) -> Result<Option<Location>, StoreError> {
        let row = conn
            .query_row(
                &format!("SELECT {LOCATION_COLUMNS} FROM locations WHERE id = ?1"),
                [id],
                LocationRow::read,
            )
            .optional()?;
        row.map(LocationRow::into_location).transpose()
    }

    fn insert_location(&self, payload: NewLocation, token: Uuid) -> Result<Location, StoreError> {
        payload.validate()?;
        self.with_conn(|conn| {
            let token = token.to_string();
            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM locations WHERE create_token = ?1",
                    [&token],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(id) = existing {
                debug!(%id, "repeated create token, returning existing location");
                if let Some(location) = Self::find_location(conn, &id)? {
                    return Ok(location);
                }
            }

            let location = payload.into_location(EntityId::generate(), Utc::now());
            conn.execute(
                "INSERT INTO locations (id, owner_id, latitude, longitude, title, kind, city,
                    address, description, tags_json, photos_json, headings_json, created_at,
                    create_token)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    location.id.0,
                    location.owner_id.as_ref().map(|o| o.0.as_str()),
                    location.position.latitude,
                    location.position.longitude,
                    location.title,
                    location.kind.as_str(),
                    location.city,
                    location.address,
                    location.description,
                    serde_json::to_string(&location.tags)?,
                    serde_json::to_string(&location.photos)?,
                    location
                        .photo_headings
                        .as_ref()
                        .map(serde_json::to_string)
                        .transpose()?,
                    stored_timestamp(&location.created_at),
                    token,
                ],
            )?;
            info!(id = %location.id, title = %location.title, "location created");
            Ok(location)
        })
    }

    fn write_location(&self, location: &Location) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE locations SET title = ?1, kind = ?2, city = ?3, description = ?4,
                    tags_json = ?5, photos_json = ?6, headings_json = ?7
                 WHERE id = ?8",
                params![
                    location.title,
                    location.kind.as_str(),
                    location.city,
                    location.description,
                    serde_json::to_string(&location.tags)?,
                    serde_json::to_string(&location.photos)?,
                    location
                        .photo_headings
                        .as_ref()
                        .map(serde_json::to_string)
                        .transpose()?,
                    location.id.0,
                ],
            )?;
            Ok(())
        })
    }

    fn query_prospects(&self, owner: Option<&OwnerId>) -> Result<Vec<Prospect>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROSPECT_COLUMNS} FROM prospects
                 WHERE owner_id IS ?1
                 ORDER BY created_at DESC"
            ))?;
            let rows = stmt.query_map([owner.map(|o| o.0.as_str())], read_prospect)?;

            let mut prospects = Vec::new();
            for row in rows {
                prospects.push(row?);
            }
            Ok(prospects)
        })
    }

    fn insert_prospect(&self, payload: NewProspect, token: Uuid) -> Result<Prospect, StoreError> {
        payload.validate()?;
        self.with_conn(|conn| {
            let token = token.to_string();
            let existing = conn
                .query_row(
                    &format!("SELECT {PROSPECT_COLUMNS} FROM prospects WHERE create_token = ?1"),
                    [&token],
                    read_prospect,
                )
                .optional()?;
            if let Some(prospect) = existing {
                debug!(id = %prospect.id, "repeated create token, returning existing prospect");
                return Ok(prospect);
            }

            let prospect = payload.into_prospect(EntityId::generate(), Utc::now());
            conn.execute(
                "INSERT INTO prospects (id, owner_id, latitude, longitude, notes, city, address,
                    created_at, create_token)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    prospect.id.0,
                    prospect.owner_id.as_ref().map(|o| o.0.as_str()),
                    prospect.position.latitude,
                    prospect.position.longitude,
                    prospect.notes,
                    prospect.city,
                    prospect.address,
                    stored_timestamp(&prospect.created_at),
                    token,
                ],
            )?;
            info!(id = %prospect.id, "prospect created");
            Ok(prospect)
        })
    }

    fn delete_row(&self, kind: EntityKind, id: &EntityId) -> Result<(), StoreError> {
        let table = match kind {
            EntityKind::Location => "locations",
            EntityKind::Prospect => "prospects",
        };
        let deleted = self.with_conn(|conn| {
            Ok(conn.execute(&format!("DELETE FROM {table} WHERE id = ?1"), [&id.0])?)
        })?;
        if deleted == 0 {
            return Err(StoreError::NotFound { kind, id: id.clone() });
        }
        info!(%kind, %id, "deleted");
        Ok(())
    }
}

/// Raw location columns, decoded in a second step so JSON errors keep their type
struct LocationRow {
    id: String,
    owner_id: Option<String>,
    latitude: f64,
    longitude: f64,
    title: String,
    kind: String,
    city: Option<String>,
    address: Option<String>,
    description: Option<String>,
    tags_json: String,
    photos_json: String,
    headings_json: Option<String>,
    created_at: DateTime<Utc>,
}

impl LocationRow {
    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(LocationRow {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            latitude: row.get(2)?,
            longitude: row.get(3)?,
            title: row.get(4)?,
            kind: row.get(5)?,
            city: row.get(6)?,
            address: row.get(7)?,
            description: row.get(8)?,
            tags_json: row.get(9)?,
            photos_json: row.get(10)?,
            headings_json: row.get(11)?,
            created_at: read_timestamp(row, 12)?,
        })
    }

    fn into_location(self) -> Result<Location, StoreError> {
        Ok(Location {
            id: EntityId(self.id),
            owner_id: self.owner_id.map(OwnerId),
            position: GeoPoint {
                latitude: self.latitude,
                longitude: self.longitude,
            },
            title: self.title,
            kind: LocationType::parse(&self.kind).unwrap_or_default(),
            city: self.city,
            address: self.address,
            description: self.description,
            tags: serde_json::from_str(&self.tags_json)?,
            photos: serde_json::from_str(&self.photos_json)?,
            photo_headings: self
                .headings_json
                .as_deref()
                .map(serde_json::from_str)
                .transpose()?,
            created_at: self.created_at,
        })
    }
}

fn read_prospect(row: &Row<'_>) -> rusqlite::Result<Prospect> {
    Ok(Prospect {
        id: EntityId(row.get(0)?),
        owner_id: row.get::<_, Option<String>>(1)?.map(OwnerId),
        position: GeoPoint {
            latitude: row.get(2)?,
            longitude: row.get(3)?,
        },
        notes: row.get(4)?,
        city: row.get(5)?,
        address: row.get(6)?,
        created_at: read_timestamp(row, 7)?,
    })
}

/// Fixed-width RFC 3339 so text ordering matches time ordering
fn stored_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn read_timestamp(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(index)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(e))
        })
}

#[async_trait]
impl EntityStore for Library {
    async fn list_locations(&self, owner: Option<&OwnerId>) -> Result<Vec<Location>, StoreError> {
        let owner = owner.cloned();
        self.blocking(move |lib| lib.query_locations(owner.as_ref())).await
    }

    async fn get_location(&self, id: &EntityId) -> Result<Location, StoreError> {
        let id = id.clone();
        self.blocking(move |lib| {
            lib.with_conn(|conn| Self::find_location(conn, &id.0))?
                .ok_or(StoreError::NotFound { kind: EntityKind::Location, id })
        })
        .await
    }

    async fn create_location(&self, payload: NewLocation, token: Uuid) -> Result<Location, StoreError> {
        self.blocking(move |lib| lib.insert_location(payload, token)).await
    }

    async fn update_location(&self, id: &EntityId, patch: LocationPatch) -> Result<Location, StoreError> {
        let id = id.clone();
        self.blocking(move |lib| {
            let current = lib
                .with_conn(|conn| Self::find_location(conn, &id.0))?
                .ok_or_else(|| StoreError::NotFound { kind: EntityKind::Location, id: id.clone() })?;
            let updated = patch.apply(current)?;
            lib.write_location(&updated)?;
            info!(%id, "location updated");
            Ok(updated)
        })
        .await
    }

    async fn delete_location(&self, id: &EntityId) -> Result<(), StoreError> {
        let id = id.clone();
        self.blocking(move |lib| lib.delete_row(EntityKind::Location, &id)).await
    }

    async fn list_prospects(&self, owner: Option<&OwnerId>) -> Result<Vec<Prospect>, StoreError> {
        let owner = owner.cloned();
        self.blocking(move |lib| lib.query_prospects(owner.as_ref())).await
    }

    async fn create_prospect(&self, payload: NewProspect, token: Uuid) -> Result<Prospect, StoreError> {
        self.blocking(move |lib| lib.insert_prospect(payload, token)).await
    }

    async fn delete_prospect(&self, id: &EntityId) -> Result<(), StoreError> {
        let id = id.clone();
        self.blocking(move |lib| lib.delete_row(EntityKind::Prospect, &id)).await
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("db_path", &self.db_path)
            .finish()
    }
}
