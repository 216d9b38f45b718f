//! REST client for the hunt authority HTTP endpoints, using [`reqwest`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    hunt::{HuntDraft, HuntPatch, HuntRecord},
    types::{HuntId, TimestampMs},
};

use super::{RemoteAuthority, RemoteError, RemoteResult};

/// HTTP client for a hunt authority instance.
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
}

/// Hunt record as it appears on the wire. Ids are numeric there; the tagged
/// [`HuntId`] form exists only on this side of the boundary.
#[derive(Debug, Serialize, Deserialize)]
struct WireHunt {
    id: u64,
    pokemon_name: String,
    game: String,
    sprite_url: String,
    #[serde(default)]
    types: Vec<String>,
    #[serde(default)]
    hunt_count: u64,
    #[serde(default)]
    target_count: Option<u64>,
    date_started: TimestampMs,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    completed_at: Option<TimestampMs>,
}

impl From<WireHunt> for HuntRecord {
    fn from(wire: WireHunt) -> Self {
        Self {
            id: HuntId::Server(wire.id),
            species_name: wire.pokemon_name,
            game: wire.game,
            sprite_url: wire.sprite_url,
            types: wire.types,
            encounter_count: wire.hunt_count,
            target_count: wire.target_count,
            completed: wire.completed,
            completed_at: wire.completed_at,
            started_at: wire.date_started,
        }
    }
}

impl HttpRemote {
    /// Creates a new client for the authority at `base_url`, e.g.
    /// `https://hunts.example/api`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Creates a client reusing an existing [`reqwest::Client`] (useful for
    /// connection pooling with the species client).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }

    // ---- private helpers ----

    /// Ensure the response has a success status. Returns the response
    /// unchanged on success, or [`RemoteError::Status`] with the status and
    /// body text on failure.
    async fn ensure_success(response: reqwest::Response) -> RemoteResult<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> RemoteResult<T> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status, discarding the body.
    async fn check_status(response: reqwest::Response) -> RemoteResult<()> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

fn create_body(draft: &HuntDraft) -> serde_json::Value {
    serde_json::json!({
        "pokemon_name": draft.species_name,
        "game": draft.game,
        "sprite_url": draft.sprite_url,
        "types": draft.types,
        "target_count": draft.target_count,
    })
}

fn patch_body(patch: &HuntPatch) -> serde_json::Value {
    let mut body = serde_json::Map::new();
    if let Some(count) = patch.encounter_count {
        body.insert("hunt_count".to_string(), count.into());
    }
    if let Some(completion) = &patch.completion {
        body.insert("completed".to_string(), completion.completed.into());
        body.insert(
            "completed_at".to_string(),
            serde_json::json!(completion.completed_at),
        );
    }
    serde_json::Value::Object(body)
}

#[async_trait]
impl RemoteAuthority for HttpRemote {
    async fn list_hunts(&self) -> RemoteResult<Vec<HuntRecord>> {
        let response = self.client.get(self.url("/hunts")).send().await?;
        let hunts: Vec<WireHunt> = Self::parse_response(response).await?;
        Ok(hunts.into_iter().map(HuntRecord::from).collect())
    }

    async fn create_hunt(&self, draft: &HuntDraft) -> RemoteResult<HuntRecord> {
        let response = self
            .client
            .post(self.url("/hunts"))
            .json(&create_body(draft))
            .send()
            .await?;
        let hunt: WireHunt = Self::parse_response(response).await?;
        Ok(hunt.into())
    }

    async fn update_hunt(&self, id: HuntId, patch: &HuntPatch) -> RemoteResult<()> {
        let response = self
            .client
            .put(self.url(&format!("/hunts/{id}")))
            .json(&patch_body(patch))
            .send()
            .await?;
        // The authority echoes the updated record; deliberately dropped.
        Self::check_status(response).await
    }

    async fn delete_hunt(&self, id: HuntId) -> RemoteResult<()> {
        let response = self
            .client
            .delete(self.url(&format!("/hunts/{id}")))
            .send()
            .await?;
        Self::check_status(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hunt::Completion;

    #[test]
    fn patch_body_carries_completion_pair_together() {
        let patch = HuntPatch::completion(Completion::cleared());
        let body = patch_body(&patch);
        assert_eq!(body["completed"], serde_json::json!(false));
        assert!(body["completed_at"].is_null());
        assert!(body.get("hunt_count").is_none());
    }

    #[test]
    fn wire_hunt_maps_to_server_backed_record() {
        let wire: WireHunt = serde_json::from_value(serde_json::json!({
            "id": 7,
            "pokemon_name": "pikachu",
            "game": "Yellow",
            "sprite_url": "https://sprites.example/25.png",
            "date_started": 1700000000000u64,
        }))
        .expect("decode");
        let rec = HuntRecord::from(wire);
        assert_eq!(rec.id, HuntId::Server(7));
        assert_eq!(rec.encounter_count, 0);
        assert!(!rec.completed);
    }
}
