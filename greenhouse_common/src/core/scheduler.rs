//! # Simulation Scheduler
//!
//! The orchestrator: maps user identifiers to their active `SimulationTask` and
//! serializes every lifecycle request against that map. The map is the single
//! source of truth for "which users are being simulated right now"; no ambient
//! globals anywhere.
//!
//! ## Core Guarantees:
//!
//! 1.  **At most one live task per user**. A start request for a user with a live
//!     task cancels it and *blocks until its loop has fully exited* before the
//!     replacement is registered. Two generation loops for the same user can never
//!     run concurrently, even during a rapid double-start.
//!
//! 2.  **Serialized mutations**. All map mutations go through one async mutex, so
//!     concurrent start/stop calls for the same user queue up rather than race.
//!     The drain itself happens under the lock; at the scale of this service
//!     (one map touch per user churn event) that contention is acceptable, and
//!     per-user ticks run in their own spawned tasks regardless.
//!
//! 3.  **Synchronous outcome**. Callers get success or failure when the call
//!     returns: an invalid start is rejected before any state is created, and a
//!     successful start means the old task is gone and the new one is running.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::json;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::core::observer::{
    METRIC_ERRORS, METRIC_SIMULATIONS_ACTIVE, METRIC_SIMULATIONS_STARTED,
};
use crate::core::sim_task::{SimContext, SimulationTask};
use crate::core::UserId;

/// Synchronous rejections a caller of `start` can see. Internal tick retries are
/// never surfaced here.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("invalid user_id: must be present and non-blank")]
    MissingUserId,
}

/// # Simulation Scheduler
///
/// Owns the user → task map and the generation counter distinguishing successive
/// task instances for the same user across restarts.
pub struct SimulationScheduler {
    ctx: Arc<SimContext>,
    tasks: Mutex<HashMap<UserId, SimulationTask>>,
    next_generation: AtomicU64,
}

impl SimulationScheduler {
    pub fn new(ctx: Arc<SimContext>) -> Self {
        Self {
            ctx,
            tasks: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Starts (or restarts) the simulation for `user_id`.
    ///
    /// Idempotent in effect (repeated starts always leave exactly one active
    /// task) but not side-effect-free: each call drains any prior task and
    /// restarts the loop from tick zero under a fresh generation number.
    pub async fn start(&self, user_id: &str) -> Result<(), SchedulerError> {
        if user_id.trim().is_empty() {
            self.ctx.observer.increment_counter(
                METRIC_ERRORS,
                json!({ "error_type": "invalid_user_id", "operation": "start_simulation" }),
                1,
            );
            log::error!("Start simulation failed: invalid user_id provided");
            return Err(SchedulerError::MissingUserId);
        }

        self.ctx
            .observer
            .increment_counter(METRIC_SIMULATIONS_STARTED, json!({ "user_id": user_id }), 1);

        let mut tasks = self.tasks.lock().await;

        // Full drain of any previous generation before the replacement exists.
        if let Some(previous) = tasks.remove(user_id) {
            let old_generation = previous.generation();
            previous.drain().await;
            self.ctx.observer.increment_counter(
                METRIC_SIMULATIONS_ACTIVE,
                json!({ "user_id": user_id }),
                -1,
            );
            log::info!(
                "Drained previous simulation (generation {}) for user {}",
                old_generation,
                user_id
            );
        }

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let task = SimulationTask::spawn(user_id.to_string(), generation, Arc::clone(&self.ctx));
        tasks.insert(user_id.to_string(), task);
        self.ctx.observer.increment_counter(
            METRIC_SIMULATIONS_ACTIVE,
            json!({ "user_id": user_id }),
            1,
        );
        log::info!("Simulation started for user {} (generation {})", user_id, generation);
        Ok(())
    }

    /// Signals cancel and drains the user's task if one exists; no-op otherwise.
    /// Used on last-session-disconnect.
    pub async fn stop_if_present(&self, user_id: &str) {
        let mut tasks = self.tasks.lock().await;
        if let Some(task) = tasks.remove(user_id) {
            task.drain().await;
            self.ctx.observer.increment_counter(
                METRIC_SIMULATIONS_ACTIVE,
                json!({ "user_id": user_id }),
                -1,
            );
            log::info!("Simulation stopped for user {}", user_id);
        }
    }

    /// Whether a live task currently exists for `user_id`.
    pub async fn is_active(&self, user_id: &str) -> bool {
        self.tasks.lock().await.contains_key(user_id)
    }

    /// Number of users with an active simulation.
    pub async fn active_count(&self) -> usize {
        self.tasks.lock().await.len()
    }
}
