/// Placement workflow
///
/// Drives "add" → map tap → form → submit/cancel. Exactly one placement can be
/// in flight; re-invoking "add" while one is in progress cancels it.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::data::{GeoPoint, Location, NewLocation, NewProspect, OwnerId, Prospect, ValidationError};
use super::edit::{LocationDraft, ProspectDraft};
use super::store::{EntityStore, StoreError};

/// What the next map tap will create
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlacementMode {
    #[default]
    Location,
    Prospect,
}

/// Transient, client-only candidate entity
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPlacement {
    pub position: GeoPoint,
    pub mode: PlacementMode,
    /// Sent with the create call so a retried submit cannot duplicate the record
    pub token: Uuid,
}

/// The form bound to a pending placement; its variant is fixed at tap time
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementForm {
    Location(LocationDraft),
    Prospect(ProspectDraft),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pending {
    pub placement: PendingPlacement,
    pub form: PlacementForm,
    pub submitting: bool,
    /// Last failure notice, kept so the form can show it next to the retry button
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum PlacementState {
    #[default]
    Idle,
    Armed { mode: PlacementMode },
    Pending(Pending),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlacementError {
    #[error("no placement is waiting to be saved")]
    NothingPending,
    #[error("this placement is already being saved")]
    AlreadySubmitting,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Result of invoking "add"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    Armed(PlacementMode),
    Cancelled,
}

/// Result of a map tap
#[derive(Debug, Clone, PartialEq)]
pub enum TapOutcome {
    /// The tap produced a pending placement and its form should open
    Captured(PendingPlacement),
    /// Not armed: the tap only merits a hint
    Informational,
    /// A form is already open
    Ignored,
}

/// Validated create request for the entity store
#[derive(Debug, Clone, PartialEq)]
pub enum CreateRequest {
    Location(NewLocation),
    Prospect(NewProspect),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub token: Uuid,
    pub request: CreateRequest,
}

/// Entity returned by a successful create
#[derive(Debug, Clone, PartialEq)]
pub enum Created {
    Location(Location),
    Prospect(Prospect),
}

impl Submission {
    /// Send to the store; the token travels back so a late answer can be matched
    pub async fn send(self, store: Arc<dyn EntityStore>) -> (Uuid, Result<Created, StoreError>) {
        let token = self.token;
        let result = match self.request {
            CreateRequest::Location(payload) => store
                .create_location(payload, token)
                .await
                .map(Created::Location),
            CreateRequest::Prospect(payload) => store
                .create_prospect(payload, token)
                .await
                .map(Created::Prospect),
        };
        (token, result)
    }
}

#[derive(Debug, Default)]
pub struct PlacementWorkflow {
    state: PlacementState,
}

impl PlacementWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &PlacementState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, PlacementState::Idle)
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, PlacementState::Armed { .. })
    }

    pub fn pending(&self) -> Option<&PendingPlacement> {
        match &self.state {
            PlacementState::Pending(pending) => Some(&pending.placement),
            _ => None,
        }
    }

    pub fn pending_state(&self) -> Option<&Pending> {
        match &self.state {
            PlacementState::Pending(pending) => Some(pending),
            _ => None,
        }
    }

    /// Mode that is armed or bound to the open form
    pub fn mode(&self) -> Option<PlacementMode> {
        match &self.state {
            PlacementState::Idle => None,
            PlacementState::Armed { mode } => Some(*mode),
            PlacementState::Pending(pending) => Some(pending.placement.mode),
        }
    }

    /// "Add" button: arms from Idle, cancels anything in progress
    pub fn toggle_add(&mut self, mode: PlacementMode) -> Toggle {
        if self.is_idle() {
            info!(?mode, "placement armed");
            self.state = PlacementState::Armed { mode };
            Toggle::Armed(mode)
        } else {
            self.cancel();
            Toggle::Cancelled
        }
    }

    /// Switch between Location and Prospect; only honoured before the tap
    pub fn select_mode(&mut self, mode: PlacementMode) -> bool {
        match &mut self.state {
            PlacementState::Armed { mode: current } => {
                *current = mode;
                debug!(?mode, "placement mode switched");
                true
            }
            _ => false,
        }
    }

    pub fn tap(&mut self, position: GeoPoint) -> TapOutcome {
        match &self.state {
            PlacementState::Idle => TapOutcome::Informational,
            PlacementState::Pending(_) => TapOutcome::Ignored,
            PlacementState::Armed { mode } => {
                let placement = PendingPlacement {
                    position,
                    mode: *mode,
                    token: Uuid::new_v4(),
                };
                let form = match mode {
                    PlacementMode::Location => PlacementForm::Location(LocationDraft::new()),
                    PlacementMode::Prospect => PlacementForm::Prospect(ProspectDraft::new()),
                };
                info!(
                    lat = position.latitude,
                    lon = position.longitude,
                    mode = ?placement.mode,
                    "placement captured"
                );
                self.state = PlacementState::Pending(Pending {
                    placement: placement.clone(),
                    form,
                    submitting: false,
                    last_error: None,
                });
                TapOutcome::Captured(placement)
            }
        }
    }

    pub fn location_form_mut(&mut self) -> Option<&mut LocationDraft> {
        match &mut self.state {
            PlacementState::Pending(Pending {
                form: PlacementForm::Location(draft),
                submitting: false,
                ..
            }) => Some(draft),
            _ => None,
        }
    }

    pub fn prospect_form_mut(&mut self) -> Option<&mut ProspectDraft> {
        match &mut self.state {
            PlacementState::Pending(Pending {
                form: PlacementForm::Prospect(draft),
                submitting: false,
                ..
            }) => Some(draft),
            _ => None,
        }
    }

    /// Validate the form and hand back the create request.
    ///
    /// Validation failures leave the form open and untouched.
    pub fn submit(&mut self, owner_id: Option<OwnerId>) -> Result<Submission, PlacementError> {
        let PlacementState::Pending(pending) = &mut self.state else {
            return Err(PlacementError::NothingPending);
        };
        if pending.submitting {
            return Err(PlacementError::AlreadySubmitting);
        }

        let position = pending.placement.position;
        let request = match &pending.form {
            PlacementForm::Location(draft) => {
                CreateRequest::Location(draft.to_payload(position, owner_id)?)
            }
            PlacementForm::Prospect(draft) => {
                CreateRequest::Prospect(draft.to_payload(position, owner_id)?)
            }
        };

        pending.submitting = true;
        pending.last_error = None;
        Ok(Submission {
            token: pending.placement.token,
            request,
        })
    }

    /// The store accepted the create. Returns false when the answer belongs to a
    /// placement that was cancelled meanwhile.
    pub fn submit_succeeded(&mut self, token: Uuid) -> bool {
        if !self.owns(token) {
            debug!(%token, "create finished for a placement that is gone");
            return false;
        }
        info!(%token, "placement saved");
        self.state = PlacementState::Idle;
        true
    }

    /// The store call failed; stay in Pending so the user can retry
    pub fn submit_failed(&mut self, token: Uuid, notice: impl Into<String>) -> bool {
        if !self.owns(token) {
            return false;
        }
        if let PlacementState::Pending(pending) = &mut self.state {
            let notice = notice.into();
            warn!(%token, %notice, "placement save failed");
            pending.submitting = false;
            pending.last_error = Some(notice);
        }
        true
    }

    /// Drop whatever is in progress. Always available, even mid-submit.
    pub fn cancel(&mut self) -> bool {
        if self.is_idle() {
            return false;
        }
        info!("placement cancelled");
        self.state = PlacementState::Idle;
        true
    }

    fn owns(&self, token: Uuid) -> bool {
        self.pending().is_some_and(|p| p.token == token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::library::Library;
    use crate::state::store::EntityStore;

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    #[test]
    fn test_add_twice_returns_to_idle() {
        let mut workflow = PlacementWorkflow::new();
        assert_eq!(workflow.toggle_add(PlacementMode::Location), Toggle::Armed(PlacementMode::Location));
        assert_eq!(workflow.toggle_add(PlacementMode::Location), Toggle::Cancelled);
        assert!(workflow.is_idle());
        assert!(workflow.pending().is_none());
    }

    #[test]
    fn test_add_while_pending_cancels() {
        let mut workflow = PlacementWorkflow::new();
        workflow.toggle_add(PlacementMode::Location);
        workflow.tap(point(1.0, 1.0));
        assert!(workflow.pending().is_some());

        assert_eq!(workflow.toggle_add(PlacementMode::Prospect), Toggle::Cancelled);
        assert!(workflow.is_idle());
    }

    #[test]
    fn test_tap_while_idle_is_informational() {
        let mut workflow = PlacementWorkflow::new();
        assert_eq!(workflow.tap(point(1.0, 1.0)), TapOutcome::Informational);
        assert!(workflow.is_idle());
    }

    #[test]
    fn test_second_tap_does_not_replace_pending() {
        let mut workflow = PlacementWorkflow::new();
        workflow.toggle_add(PlacementMode::Location);
        workflow.tap(point(1.0, 1.0));
        assert_eq!(workflow.tap(point(2.0, 2.0)), TapOutcome::Ignored);
        assert_eq!(workflow.pending().unwrap().position, point(1.0, 1.0));
    }

    #[test]
    fn test_mode_switch_only_while_armed() {
        let mut workflow = PlacementWorkflow::new();
        assert!(!workflow.select_mode(PlacementMode::Prospect));

        workflow.toggle_add(PlacementMode::Location);
        assert!(workflow.select_mode(PlacementMode::Prospect));
        workflow.tap(point(1.0, 1.0));
        assert_eq!(workflow.mode(), Some(PlacementMode::Prospect));

        assert!(!workflow.select_mode(PlacementMode::Location));
        assert_eq!(workflow.mode(), Some(PlacementMode::Prospect));
        assert!(workflow.prospect_form_mut().is_some());
        assert!(workflow.location_form_mut().is_none());
    }

    #[test]
    fn test_validation_error_keeps_form_open() {
        let mut workflow = PlacementWorkflow::new();
        workflow.toggle_add(PlacementMode::Location);
        workflow.tap(point(40.0, -74.0));

        assert_eq!(
            workflow.submit(None),
            Err(PlacementError::Invalid(ValidationError::EmptyTitle))
        );
        let pending = workflow.pending_state().unwrap();
        assert!(!pending.submitting);
    }

    #[test]
    fn test_failure_keeps_pending_and_token_for_retry() {
        let mut workflow = PlacementWorkflow::new();
        workflow.toggle_add(PlacementMode::Prospect);
        workflow.tap(point(40.1, -74.1));

        let first = workflow.submit(None).unwrap();
        assert_eq!(workflow.submit(None), Err(PlacementError::AlreadySubmitting));
        assert!(workflow.submit_failed(first.token, "network down"));

        let pending = workflow.pending_state().unwrap();
        assert_eq!(pending.last_error.as_deref(), Some("network down"));

        let retry = workflow.submit(None).unwrap();
        assert_eq!(retry.token, first.token);
    }

    #[test]
    fn test_cancel_mid_submit_ignores_late_answer() {
        let mut workflow = PlacementWorkflow::new();
        workflow.toggle_add(PlacementMode::Prospect);
        workflow.tap(point(40.1, -74.1));
        let submission = workflow.submit(None).unwrap();

        assert!(workflow.cancel());
        assert!(!workflow.submit_succeeded(submission.token));
        assert!(workflow.is_idle());
    }

    #[tokio::test]
    async fn test_location_scenario_end_to_end() {
        let store: Arc<dyn EntityStore> = Arc::new(Library::open_in_memory().unwrap());
        let mut workflow = PlacementWorkflow::new();

        workflow.toggle_add(PlacementMode::Location);
        workflow.tap(point(40.0, -74.0));
        workflow.location_form_mut().unwrap().title = "Test Tag".into();

        let submission = workflow.submit(None).unwrap();
        match &submission.request {
            CreateRequest::Location(payload) => {
                assert_eq!(payload.position, point(40.0, -74.0));
                assert_eq!(payload.title, "Test Tag");
            }
            other => panic!("unexpected request {other:?}"),
        }

        let (token, result) = submission.send(store.clone()).await;
        let Created::Location(created) = result.unwrap() else {
            panic!("expected a location");
        };
        assert!(workflow.submit_succeeded(token));
        assert!(workflow.is_idle());

        let listed = store.list_locations(None).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
        assert_eq!(listed[0].kind, crate::state::data::LocationType::Tag);
    }

    #[tokio::test]
    async fn test_prospect_scenario_with_empty_notes() {
        let store: Arc<dyn EntityStore> = Arc::new(Library::open_in_memory().unwrap());
        let mut workflow = PlacementWorkflow::new();

        workflow.toggle_add(PlacementMode::Prospect);
        workflow.tap(point(40.1, -74.1));
        let submission = workflow.submit(None).unwrap();

        let (token, result) = submission.send(store.clone()).await;
        assert!(matches!(result, Ok(Created::Prospect(_))));
        assert!(workflow.submit_succeeded(token));
        assert_eq!(store.list_prospects(None).await.unwrap().len(), 1);
    }
}
