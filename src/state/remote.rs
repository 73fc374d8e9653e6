/// REST entity store
///
/// Talks to the backend's `/api/locations` and `/api/prospects` routes.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::data::{EntityId, Location, LocationPatch, NewLocation, NewProspect, OwnerId, Prospect};
use super::store::{EntityKind, EntityStore, StoreError};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct RemoteStore {
    client: Client,
    base: Url,
}

/// Base URLs always end in `/`, so joined routes keep the base's last path segment
pub fn with_trailing_slash(base_url: &str) -> Cow<'_, str> {
    if base_url.ends_with('/') {
        Cow::Borrowed(base_url)
    } else {
        Cow::Owned(format!("{base_url}/"))
    }
}

impl RemoteStore {
    pub fn new(base_url: &str) -> Result<Self, StoreError> {
        let base = Url::parse(&with_trailing_slash(base_url))
            .map_err(|e| StoreError::Network(format!("invalid backend url {base_url}: {e}")))?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(network)?;
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn url(&self, path: &str) -> Result<Url, StoreError> {
        self.base
            .join(path)
            .map_err(|e| StoreError::Network(format!("bad route {path}: {e}")))
    }

    fn collection(&self, kind: EntityKind) -> &'static str {
        match kind {
            EntityKind::Location => "api/locations",
            EntityKind::Prospect => "api/prospects",
        }
    }

    fn item_url(&self, kind: EntityKind, id: &EntityId) -> Result<Url, StoreError> {
        self.url(&format!("{}/{}", self.collection(kind), id))
    }

    fn list_url(&self, kind: EntityKind, owner: Option<&OwnerId>) -> Result<Url, StoreError> {
        let mut url = self.url(self.collection(kind))?;
        if let Some(owner) = owner {
            url.query_pairs_mut().append_pair("ownerId", &owner.0);
        }
        Ok(url)
    }

    async fn send(
        &self,
        request: RequestBuilder,
        kind: EntityKind,
        id: Option<&EntityId>,
    ) -> Result<Response, StoreError> {
        let response = request.send().await.map_err(network)?;
        let status = response.status();
        debug!(%status, url = %response.url(), "backend response");

        if status.is_success() {
            return Ok(response);
        }
        match (status, id) {
            (StatusCode::NOT_FOUND, Some(id)) => Err(StoreError::NotFound {
                kind,
                id: id.clone(),
            }),
            (StatusCode::BAD_REQUEST, _) => {
                let body = response.text().await.unwrap_or_default();
                warn!(%status, %body, "backend rejected payload");
                Err(StoreError::Rejected(rejection_message(&body)))
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                warn!(%status, %body, "backend request failed");
                Err(StoreError::Network(format!("backend answered {status}")))
            }
        }
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
        let bytes = response.bytes().await.map_err(network)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Prefer the backend's `{"message": ..}` over the raw body
fn rejection_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

fn network(err: reqwest::Error) -> StoreError {
    if err.is_timeout() {
        StoreError::Network("request timed out".into())
    } else {
        StoreError::Network(err.to_string())
    }
}

#[async_trait]
impl EntityStore for RemoteStore {
    async fn list_locations(&self, owner: Option<&OwnerId>) -> Result<Vec<Location>, StoreError> {
        let url = self.list_url(EntityKind::Location, owner)?;
        let response = self.send(self.client.get(url), EntityKind::Location, None).await?;
        Self::json(response).await
    }

    async fn get_location(&self, id: &EntityId) -> Result<Location, StoreError> {
        let url = self.item_url(EntityKind::Location, id)?;
        let response = self
            .send(self.client.get(url), EntityKind::Location, Some(id))
            .await?;
        Self::json(response).await
    }

    async fn create_location(&self, payload: NewLocation, token: Uuid) -> Result<Location, StoreError> {
        payload.validate()?;
        let url = self.url(self.collection(EntityKind::Location))?;
        let request = self
            .client
            .post(url)
            .header("Idempotency-Key", token.to_string())
            .json(&payload);
        let response = self.send(request, EntityKind::Location, None).await?;
        Self::json(response).await
    }

    async fn update_location(&self, id: &EntityId, patch: LocationPatch) -> Result<Location, StoreError> {
        let url = self.item_url(EntityKind::Location, id)?;
        let response = self
            .send(self.client.put(url).json(&patch), EntityKind::Location, Some(id))
            .await?;
        Self::json(response).await
    }

    async fn delete_location(&self, id: &EntityId) -> Result<(), StoreError> {
        let url = self.item_url(EntityKind::Location, id)?;
        self.send(self.client.delete(url), EntityKind::Location, Some(id))
            .await?;
        Ok(())
    }

    async fn list_prospects(&self, owner: Option<&OwnerId>) -> Result<Vec<Prospect>, StoreError> {
        let url = self.list_url(EntityKind::Prospect, owner)?;
        let response = self.send(self.client.get(url), EntityKind::Prospect, None).await?;
        Self::json(response).await
    }

    async fn create_prospect(&self, payload: NewProspect, token: Uuid) -> Result<Prospect, StoreError> {
        payload.validate()?;
        let url = self.url(self.collection(EntityKind::Prospect))?;
        let request = self
            .client
            .post(url)
            .header("Idempotency-Key", token.to_string())
            .json(&payload);
        let response = self.send(request, EntityKind::Prospect, None).await?;
        Self::json(response).await
    }

    async fn delete_prospect(&self, id: &EntityId) -> Result<(), StoreError> {
        let url = self.item_url(EntityKind::Prospect, id)?;
        self.send(self.client.delete(url), EntityKind::Prospect, Some(id))
            .await?;
        Ok(())
    }
}
