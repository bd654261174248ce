//! # Plant Source
//!
//! The one downstream dependency a simulation tick has: the plant service, which
//! owns the records describing which plants exist for a user. The core only needs
//! the entity ids to simulate, so the seam is narrow: list the plants for a user,
//! success or failure as a `Result`, never a crash. The HTTP client lives behind a
//! trait so the scheduler and its tests never touch the network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::core::PlantId;

/// Failure modes of a plant lookup. All of them are transient from the simulation
/// loop's point of view: the tick is skipped and retried next period.
#[derive(Debug, Error)]
pub enum PlantSourceError {
    #[error("plant service transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("plant service returned status {0}")]
    Status(u16),

    #[error("malformed plant payload: {0}")]
    Decode(#[from] serde_json::Error),
}

/// # Plant Source
///
/// Supplies the set of plant entities to simulate for a user.
#[async_trait]
pub trait PlantSource: Send + Sync {
    /// Lists the plant ids currently registered for `user_id`.
    async fn list_plants(&self, user_id: &str) -> Result<Vec<PlantId>, PlantSourceError>;
}

/// One plant record as served by the plant service. Only `id` matters to the
/// simulation; the rest is decoded to validate the schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlantRecord {
    pub id: PlantId,
    pub name: String,
    pub plant_type: String,
    #[serde(default)]
    pub health_data: String,
}

/// # Plant Service Client
///
/// `reqwest`-backed `PlantSource` talking to the plant microservice. The client is
/// built once with a request timeout so a hung plant service cannot stall a tick
/// indefinitely, and reused across all polls to leverage connection pooling.
pub struct PlantServiceClient {
    base_url: String,
    client: reqwest::Client,
}

impl PlantServiceClient {
    pub fn new(base_url: &str) -> Result<Self, PlantSourceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("greenhouse-sim/1.0")
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl PlantSource for PlantServiceClient {
    async fn list_plants(&self, user_id: &str) -> Result<Vec<PlantId>, PlantSourceError> {
        let url = format!("{}/plants/{}", self.base_url, user_id);
        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            log::error!(
                "Failed to fetch plants for user {}. Status code: {}",
                user_id,
                status
            );
            return Err(PlantSourceError::Status(status.as_u16()));
        }

        // Validate the payload against the record schema before handing ids out.
        let body = response.text().await?;
        let records: Vec<PlantRecord> = serde_json::from_str(&body)?;
        log::debug!("Fetched {} plants for user {}", records.len(), user_id);
        Ok(records.into_iter().map(|r| r.id).collect())
    }
}
