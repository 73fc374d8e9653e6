use chrono::Utc;
use cgmath::Vector2;
use futures::{stream, StreamExt};
use iced::widget::{canvas, column, container, row, Column};
use iced::{Element, Length, Subscription, Task, Theme};
use rfd::FileDialog;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod config;
mod error;
mod map;
mod photo;
mod sensor;
mod share;
mod state;
mod ui;

use config::AppConfig;
use error::AppError;
use map::viewport::FOCUS_ZOOM;
use map::{MapEngine, MarkerInput, MarkerLayer, MarkerTarget, Scene, ViewportEvent};
use photo::upload::{LocalPhotoStorage, PhotoStorage, SignedUrlStorage};
use sensor::{HeadingFusion, NoSensors, PermissionState, ReplayPlatform, SensorPlatform, SensorUpdate};
use state::cache::EntityCache;
use state::data::{EntityId, GeoPoint, Location, Prospect};
use state::edit::{AttachedPhoto, LocationEdit};
use state::library::Library;
use state::placement::{Created, PlacementMode, PlacementWorkflow, TapOutcome, Toggle};
use state::remote::RemoteStore;
use state::store::{EntityKind, EntityStore, StoreError};

/// Shown when the map is tapped with nothing armed
const IDLE_HINT: &str = "Tap + then tap on the map to add a graffiti location";
/// How long a notice stays up
const NOTICE_TIMEOUT: Duration = Duration::from_secs(5);

/// Failures travel inside messages, which must be `Clone`
pub type Failure = Arc<AppError>;

fn fail(error: impl Into<AppError>) -> Failure {
    Arc::new(error.into())
}

/// Application messages (events)
#[derive(Debug, Clone)]
pub enum Message {
    /// Input from the map surface
    Viewport(ViewportEvent),
    /// The surface changed size, along with any input that came with it
    SurfaceResized(Vector2<f64>, Option<ViewportEvent>),
    /// Tap on the map away from any marker (or anywhere while armed)
    MapTapped(GeoPoint),
    MarkerTapped(MarkerTarget),
    /// Animation frame while the bearing eases back to north
    Frame(Instant),
    ResetNorth,
    CenterOnMe,
    EnableCompass,
    Sensor(SensorUpdate),

    ToggleAdd(PlacementMode),
    SelectMode(PlacementMode),
    Form(ui::panel::FormEdit),
    PickPhoto,
    PhotoAttached(Result<AttachedPhoto, Failure>),
    Submit,
    Submitted(Uuid, Result<Created, Failure>),
    Cancel,

    LocationsLoaded(u64, Result<Vec<Location>, Failure>),
    ProspectsLoaded(u64, Result<Vec<Prospect>, Failure>),

    CloseDetails,
    /// Latest copy of the Location whose details are open
    LocationFetched(EntityId, Result<Location, Failure>),
    EditLocation(EntityId),
    SaveEdit,
    EditSaved(EntityId, Result<Location, Failure>),
    CancelEdit,
    Delete(EntityKind, EntityId),
    Deleted(EntityKind, EntityId, Result<(), Failure>),
    Copy { contents: String, notice: String },
    Export(EntityId),
    Exported(Result<PathBuf, Failure>),
    DismissNotice,
    /// The timer for the notice with this generation ran out
    NoticeExpired(u64),
}

/// Everything the app wires together at start-up
struct Services {
    store: Arc<dyn EntityStore>,
    photos: Arc<dyn PhotoStorage>,
    sensors: Arc<dyn SensorPlatform>,
}

impl Services {
    /// Remote backend when an API URL is configured, the local catalog otherwise
    fn open(config: &AppConfig) -> Result<Self, AppError> {
        let (store, photos): (Arc<dyn EntityStore>, Arc<dyn PhotoStorage>) = match &config.api_url {
            Some(url) => {
                info!(%url, "using remote store");
                (
                    Arc::new(RemoteStore::new(url)?),
                    Arc::new(SignedUrlStorage::new(url)?),
                )
            }
            None => {
                let library = match config.database_path() {
                    Some(path) => Library::open(&path)?,
                    None => {
                        warn!("no data directory, catalog kept in memory");
                        Library::open_in_memory()?
                    }
                };
                let photo_dir = LocalPhotoStorage::default_dir()
                    .unwrap_or_else(|| std::env::temp_dir().join("spotmap-photos"));
                (Arc::new(library), Arc::new(LocalPhotoStorage::new(photo_dir)))
            }
        };

        let sensors: Arc<dyn SensorPlatform> = match &config.sensor_replay {
            Some(path) => match ReplayPlatform::load(path) {
                Ok(replay) => {
                    info!(path = %path.display(), "replaying sensor recording");
                    Arc::new(replay)
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "sensor recording unusable");
                    Arc::new(NoSensors)
                }
            },
            None => Arc::new(NoSensors),
        };

        Ok(Self {
            store,
            photos,
            sensors,
        })
    }
}

/// Main application state
struct Spotmap {
    config: AppConfig,
    services: Services,
    /// Bumped to restart the sensor session
    sensor_generation: u64,
    fusion: HeadingFusion,
    scene: Scene<Message>,
    layer: MarkerLayer,
    cache: EntityCache,
    placement: PlacementWorkflow,
    /// Entity whose details panel is open
    selected: Option<MarkerTarget>,
    /// Open edit of the selected Location
    editing: Option<LocationEdit>,
    /// Inline validation message for the open form
    form_error: Option<String>,
    attaching: bool,
    notice: ui::Notice,
}

impl Spotmap {
    fn new(config: AppConfig, services: Services) -> (Self, Task<Message>) {
        let mut scene = Scene::new(config.default_center, config.default_zoom);
        scene.on_click(Box::new(Message::MapTapped));
        scene.on_marker(Box::new(Message::MarkerTapped));

        let mut app = Spotmap {
            config,
            services,
            sensor_generation: 0,
            fusion: HeadingFusion::new(),
            scene,
            layer: MarkerLayer::new(),
            cache: EntityCache::new(),
            placement: PlacementWorkflow::new(),
            selected: None,
            editing: None,
            form_error: None,
            attaching: false,
            notice: ui::Notice::default(),
        };
        let task = app.refresh();
        (app, task)
    }

    /// Fetch whichever lists are stale
    fn refresh(&mut self) -> Task<Message> {
        let mut tasks = Vec::new();

        if let Some(generation) = self.cache.locations.begin_fetch() {
            let store = self.services.store.clone();
            let owner = self.config.owner_id.clone();
            tasks.push(Task::perform(
                async move { store.list_locations(owner.as_ref()).await.map_err(fail) },
                move |result| Message::LocationsLoaded(generation, result),
            ));
        }
        if let Some(generation) = self.cache.prospects.begin_fetch() {
            let store = self.services.store.clone();
            let owner = self.config.owner_id.clone();
            tasks.push(Task::perform(
                async move { store.list_prospects(owner.as_ref()).await.map_err(fail) },
                move |result| Message::ProspectsLoaded(generation, result),
            ));
        }

        Task::batch(tasks)
    }

    /// Rebuild the marker set from the current state
    fn redraw(&mut self) {
        self.scene.set_armed(self.placement.is_armed());
        let map_bearing = self.scene.layer_bearing();
        self.layer.render(
            &mut self.scene,
            &MarkerInput {
                locations: self.cache.locations.items(),
                prospects: self.cache.prospects.items(),
                pending: self.placement.pending(),
                user_position: self.fusion.position(),
                heading: self.fusion.bearing(),
                map_bearing,
            },
        );
        debug!(markers = self.layer.drawn_count(), "markers redrawn");
    }

    fn show_notice(&mut self, notice: String) {
        self.notice.show(notice);
    }

    fn close_details(&mut self) {
        self.selected = None;
        self.editing = None;
        self.scene.close_popup();
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::Viewport(event) => {
                if let Some(tapped) = self.scene.handle(event) {
                    return self.update(tapped);
                }
            }
            Message::SurfaceResized(size, event) => {
                self.scene.handle(ViewportEvent::Resized(size));
                if let Some(event) = event {
                    return self.update(Message::Viewport(event));
                }
            }
            Message::MapTapped(position) => match self.placement.tap(position) {
                TapOutcome::Captured(pending) => {
                    self.close_details();
                    self.form_error = None;
                    self.scene.set_view(pending.position, FOCUS_ZOOM);
                    self.redraw();
                    self.scene.open_popup(&MarkerTarget::Pending);
                }
                TapOutcome::Informational => {
                    self.scene.close_popup();
                    self.show_notice(IDLE_HINT.to_string());
                }
                TapOutcome::Ignored => {}
            },
            Message::MarkerTapped(target) => {
                self.scene.open_popup(&target);
                if matches!(target, MarkerTarget::Location(_) | MarkerTarget::Prospect(_)) {
                    self.editing = None;
                    self.selected = Some(target.clone());
                }
                if let MarkerTarget::Location(id) = target {
                    return self.fetch_location(id);
                }
            }
            Message::Frame(now) => {
                self.scene.tick(now);
            }
            Message::ResetNorth => self.scene.reset_bearing(),
            Message::CenterOnMe => match self.fusion.position() {
                Some(position) => self.scene.set_view(position, FOCUS_ZOOM),
                None => self.show_notice("Waiting for a position fix".to_string()),
            },
            Message::EnableCompass => {
                if self.fusion.permission() == PermissionState::Denied {
                    self.show_notice(AppError::PermissionDenied.notice());
                } else {
                    self.sensor_generation += 1;
                    debug!(generation = self.sensor_generation, "sensor session restarted");
                }
            }
            Message::Sensor(update) => self.on_sensor(update),

            Message::ToggleAdd(mode) => {
                if let Toggle::Armed(_) = self.placement.toggle_add(mode) {
                    self.close_details();
                    self.notice.dismiss();
                }
                self.form_error = None;
                self.redraw();
            }
            Message::SelectMode(mode) => {
                self.placement.select_mode(mode);
            }
            Message::Form(edit) => match self.editing.as_mut() {
                Some(editing) if !editing.saving => {
                    edit.apply_to_location(&mut editing.draft);
                    editing.error = None;
                }
                Some(_) => {}
                None => {
                    if edit.apply(&mut self.placement) {
                        self.form_error = None;
                    }
                }
            },
            Message::PickPhoto => return self.pick_photo(),
            Message::PhotoAttached(result) => {
                self.attaching = false;
                match result {
                    Ok(photo) => match self
                        .editing
                        .as_mut()
                        .map(|editing| &mut editing.draft)
                        .or(self.placement.location_form_mut())
                    {
                        Some(draft) => {
                            if let Err(e) = draft.attach_photo(photo) {
                                self.form_error = Some(e.to_string());
                            }
                        }
                        None => debug!("photo arrived after the form closed"),
                    },
                    Err(e) => self.show_notice(e.notice()),
                }
            }
            Message::Submit => return self.submit(),
            Message::Submitted(token, result) => return self.submitted(token, result),
            Message::Cancel => {
                self.placement.cancel();
                self.form_error = None;
                self.scene.close_popup();
                self.redraw();
            }

            Message::LocationsLoaded(generation, result) => match result {
                Ok(locations) => {
                    info!(count = locations.len(), "locations loaded");
                    if self.cache.locations.complete_fetch(generation, locations) {
                        self.redraw();
                    }
                    return self.refresh();
                }
                Err(e) => {
                    self.cache.locations.fail_fetch(generation);
                    self.show_notice(e.notice());
                }
            },
            Message::ProspectsLoaded(generation, result) => match result {
                Ok(prospects) => {
                    info!(count = prospects.len(), "prospects loaded");
                    if self.cache.prospects.complete_fetch(generation, prospects) {
                        self.redraw();
                    }
                    return self.refresh();
                }
                Err(e) => {
                    self.cache.prospects.fail_fetch(generation);
                    self.show_notice(e.notice());
                }
            },

            Message::CloseDetails => self.close_details(),
            Message::LocationFetched(id, result) => match result {
                Ok(location) => {
                    self.cache.location_fetched(location);
                    self.redraw();
                }
                Err(e) if matches!(e.as_ref(), AppError::NotFound) => return self.gone(EntityKind::Location, id),
                Err(e) => debug!(%id, error = %e, "keeping cached details"),
            },
            Message::EditLocation(id) => match self.cache.location(&id) {
                Some(location) => self.editing = Some(LocationEdit::new(location)),
                None => self.show_notice(AppError::NotFound.notice()),
            },
            Message::SaveEdit => return self.save_edit(),
            Message::EditSaved(id, result) => match result {
                Ok(location) => {
                    info!(%id, "location updated");
                    self.editing = None;
                    self.cache.location_updated(location);
                    self.show_notice("Saved".to_string());
                    self.redraw();
                    return self.refresh();
                }
                Err(e) if matches!(e.as_ref(), AppError::NotFound) => return self.gone(EntityKind::Location, id),
                Err(e) => {
                    if let Some(editing) = self.editing.as_mut().filter(|editing| editing.id == id) {
                        editing.saving = false;
                        editing.error = Some(e.notice());
                    }
                }
            },
            Message::CancelEdit => self.editing = None,
            Message::Delete(kind, id) => {
                let store = self.services.store.clone();
                let target = id.clone();
                return Task::perform(
                    async move {
                        match kind {
                            EntityKind::Location => store.delete_location(&target).await,
                            EntityKind::Prospect => store.delete_prospect(&target).await,
                        }
                        .map_err(fail)
                    },
                    move |result| Message::Deleted(kind, id.clone(), result),
                );
            }
            Message::Deleted(kind, id, result) => {
                match result {
                    Ok(()) => {
                        info!(%kind, %id, "deleted");
                        self.show_notice(match kind {
                            EntityKind::Location => "Location removed".to_string(),
                            EntityKind::Prospect => "Prospect removed".to_string(),
                        });
                    }
                    Err(e) if matches!(e.as_ref(), AppError::NotFound) => {
                        info!(%kind, %id, "already removed elsewhere");
                        self.show_notice(e.notice());
                    }
                    Err(e) => {
                        self.show_notice(e.notice());
                        return Task::none();
                    }
                }
                self.cache.removed(kind, &id);
                self.close_details();
                self.redraw();
                return self.refresh();
            }
            Message::Copy { contents, notice } => {
                self.show_notice(notice);
                return iced::clipboard::write(contents);
            }
            Message::Export(id) => return self.export(&id),
            Message::Exported(result) => {
                self.show_notice(match result {
                    Ok(path) => format!("Exported to {}", path.display()),
                    Err(e) => e.notice(),
                });
            }
            Message::DismissNotice => self.notice.dismiss(),
            Message::NoticeExpired(generation) => self.notice.expire(generation),
        }

        Task::none()
    }

    fn on_sensor(&mut self, update: SensorUpdate) {
        match update {
            SensorUpdate::Permission(permission) => {
                self.fusion.set_permission(permission);
                if permission == PermissionState::Denied {
                    self.show_notice(AppError::PermissionDenied.notice());
                }
            }
            SensorUpdate::Position(fix) => {
                let first = !self.fusion.has_fix();
                self.fusion.on_position(fix);
                if first {
                    self.scene.set_view(fix.position, self.scene.viewport().zoom());
                }
                self.redraw();
            }
            SensorUpdate::Orientation(sample) => {
                if self.fusion.on_orientation(sample).is_some() {
                    self.redraw();
                }
            }
        }
    }

    fn pick_photo(&mut self) -> Task<Message> {
        if self.attaching {
            return Task::none();
        }
        let Some(path) = FileDialog::new()
            .set_title("Attach a photo")
            .add_filter("Images", &["jpg", "jpeg", "png", "webp", "gif", "bmp"])
            .pick_file()
        else {
            return Task::none();
        };

        self.attaching = true;
        let storage = self.services.photos.clone();
        let fallback = self.fusion.known_bearing();
        Task::perform(
            async move { photo::upload::attach(storage, path, fallback).await.map_err(fail) },
            Message::PhotoAttached,
        )
    }

    fn submit(&mut self) -> Task<Message> {
        match self.placement.submit(self.config.owner_id.clone()) {
            Ok(submission) => {
                self.form_error = None;
                let store = self.services.store.clone();
                Task::perform(
                    async move {
                        let (token, result) = submission.send(store).await;
                        (token, result.map_err(fail))
                    },
                    |(token, result)| Message::Submitted(token, result),
                )
            }
            Err(e) => {
                self.form_error = Some(AppError::from(e).notice());
                Task::none()
            }
        }
    }

    fn submitted(&mut self, token: Uuid, result: Result<Created, Failure>) -> Task<Message> {
        match result {
            Ok(created) => {
                // the record exists even if the placement was cancelled meanwhile
                match created {
                    Created::Location(location) => self.cache.location_created(location),
                    Created::Prospect(prospect) => self.cache.prospect_created(prospect),
                }
                if self.placement.submit_succeeded(token) {
                    self.scene.close_popup();
                    self.show_notice("Saved".to_string());
                }
                self.redraw();
                self.refresh()
            }
            Err(e) => {
                self.placement.submit_failed(token, e.notice());
                Task::none()
            }
        }
    }

    fn fetch_location(&self, id: EntityId) -> Task<Message> {
        let store = self.services.store.clone();
        let target = id.clone();
        Task::perform(
            async move { store.get_location(&target).await.map_err(fail) },
            move |result| Message::LocationFetched(id.clone(), result),
        )
    }

    fn save_edit(&mut self) -> Task<Message> {
        let Some(editing) = self.editing.as_mut().filter(|editing| !editing.saving) else {
            return Task::none();
        };
        let patch = match editing.to_patch() {
            Ok(patch) => patch,
            Err(e) => {
                editing.error = Some(AppError::Validation(e.to_string()).notice());
                return Task::none();
            }
        };
        editing.saving = true;
        editing.error = None;

        let store = self.services.store.clone();
        let id = editing.id.clone();
        let target = id.clone();
        Task::perform(
            async move { store.update_location(&target, patch).await.map_err(fail) },
            move |result| Message::EditSaved(id.clone(), result),
        )
    }

    /// Someone else removed it first
    fn gone(&mut self, kind: EntityKind, id: EntityId) -> Task<Message> {
        info!(%kind, %id, "already removed elsewhere");
        self.show_notice(AppError::NotFound.notice());
        self.cache.removed(kind, &id);
        self.close_details();
        self.redraw();
        self.refresh()
    }

    fn export(&mut self, id: &EntityId) -> Task<Message> {
        let Some(location) = self.cache.location(id) else {
            self.show_notice(AppError::NotFound.notice());
            return Task::none();
        };
        let json = match share::export_json(location, Utc::now()) {
            Ok(json) => json,
            Err(e) => {
                self.show_notice(AppError::from(StoreError::Decode(e)).notice());
                return Task::none();
            }
        };
        let Some(path) = FileDialog::new()
            .set_title("Export location")
            .set_file_name(share::export_file_name(location))
            .add_filter("JSON", &["json"])
            .save_file()
        else {
            return Task::none();
        };

        Task::perform(
            async move {
                share::write_export(&path, json)
                    .await
                    .map(|()| path)
                    .map_err(|e| fail(StoreError::Io(e)))
            },
            Message::Exported,
        )
    }

    fn subscription(&self) -> Subscription<Message> {
        let sensors = Subscription::run_with_id(
            ("sensors", self.sensor_generation),
            sensor::session(self.services.sensors.clone()).map(Message::Sensor),
        );
        let mut subscriptions = vec![sensors];

        if self.scene.viewport().transition().is_some() {
            subscriptions.push(iced::window::frames().map(Message::Frame));
        }
        if let Some((_, generation)) = self.notice.current() {
            subscriptions.push(Subscription::run_with_id(
                ("notice", generation),
                stream::once(tokio::time::sleep(NOTICE_TIMEOUT))
                    .map(move |()| Message::NoticeExpired(generation)),
            ));
        }
        Subscription::batch(subscriptions)
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        let toolbar = ui::toolbar(ui::ToolbarState {
            placement: self.placement.mode(),
            armed: self.placement.is_armed(),
            map_bearing: self.scene.viewport().bearing(),
            heading: self.fusion.known_bearing(),
            permission: self.fusion.permission(),
            has_fix: self.fusion.has_fix(),
            sync: self.sync_status(),
        });

        let map = canvas(ui::canvas::MapCanvas { scene: &self.scene })
            .width(Length::Fill)
            .height(Length::Fill);

        let side: Option<Element<Message>> = match (self.placement.pending_state(), &self.selected) {
            (Some(pending), _) => Some(ui::panel::view(
                pending,
                self.form_error.as_deref(),
                self.attaching,
            )),
            (None, _) if self.editing.is_some() => self
                .editing
                .as_ref()
                .map(|editing| ui::panel::edit_view(editing, self.attaching)),
            (None, Some(MarkerTarget::Location(id))) => self
                .cache
                .location(id)
                .map(|location| ui::details::location(location, &self.config.share_url)),
            (None, Some(MarkerTarget::Prospect(id))) => {
                self.cache.prospect(id).map(ui::details::prospect)
            }
            _ => None,
        };

        let body = match side {
            Some(side) => row![map, container(side).height(Length::Fill)],
            None => row![map],
        };

        let mut content: Column<Message> = column![toolbar, body.height(Length::Fill)];
        if let Some((notice, _)) = self.notice.current() {
            content = content.push(ui::notice(notice));
        }
        container(content)
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    fn sync_status(&self) -> Option<&'static str> {
        let (locations, prospects) = (&self.cache.locations, &self.cache.prospects);
        if !locations.is_loaded() || !prospects.is_loaded() {
            Some("Loading...")
        } else if locations.is_stale() || prospects.is_stale() {
            Some("Syncing...")
        } else {
            None
        }
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SPOTMAP_LOG").unwrap_or_else(|_| EnvFilter::new("spotmap=info")),
        )
        .init();

    let config = AppConfig::load().unwrap_or_else(|e| {
        warn!(error = %e, "config unusable, using defaults");
        AppConfig::default()
    });
    let services = Services::open(&config)?;
    info!(remote = config.api_url.is_some(), "spotmap starting");

    iced::application("Spotmap", Spotmap::update, Spotmap::view)
        .subscription(Spotmap::subscription)
        .theme(Spotmap::theme)
        .centered()
        .run_with(move || Spotmap::new(config, services))?;
    Ok(())
}
