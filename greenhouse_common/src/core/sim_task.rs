//! # Simulation Task
//!
//! One cancellable unit of repeating work bound to a single user. The task owns
//! its cancellation token and its completion handle; the scheduler signals the
//! former and awaits the latter, which is the whole drain contract.
//!
//! ## Lifecycle
//!
//! `Created -> Running -> Stopped`. The loop waits out the tick period (observing
//! cancellation *during* the wait, so an idle task stops promptly), re-checks the
//! token at the top of the tick, and otherwise performs one fetch-generate-deliver
//! pass. The loop only exits through cancellation, so completion-handle resolution
//! and the `Stopped` state coincide.
//!
//! ## Tick rules
//!
//! - A failed plant fetch is recorded and the tick is skipped; the task survives
//!   and retries next period.
//! - An armed fault flag is consumed per plant and suppresses only that plant's
//!   emission for that tick.
//! - Any other tick failure is recorded at the tick boundary and the loop
//!   continues; nothing short of process death terminates the worker.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::delivery::Delivery;
use crate::core::fault::FaultInjector;
use crate::core::generator;
use crate::core::observer::{Observer, METRIC_DATA_EMITTED, METRIC_ERRORS};
use crate::core::plants::PlantSource;
use crate::core::session_registry::SessionRegistry;
use crate::core::UserId;

/// Shared collaborators a simulation task works against. Built once at startup
/// and handed to every task by `Arc`.
pub struct SimContext {
    pub plants: Arc<dyn PlantSource>,
    pub delivery: Arc<dyn Delivery>,
    pub sessions: Arc<SessionRegistry>,
    pub fault: Arc<FaultInjector>,
    pub observer: Arc<dyn Observer>,
    /// Wait between ticks. 2 seconds in production, shortened by tests.
    pub tick_period: Duration,
}

/// # Simulation Task
///
/// Handle to one live per-user generation loop: owner id, generation counter,
/// cancellation signal and completion handle.
pub struct SimulationTask {
    user_id: UserId,
    generation: u64,
    started_at: DateTime<Utc>,
    token: CancellationToken,
    completion: JoinHandle<()>,
}

impl SimulationTask {
    /// Registers and launches the periodic loop for `user_id`.
    pub fn spawn(user_id: UserId, generation: u64, ctx: Arc<SimContext>) -> Self {
        let token = CancellationToken::new();
        let loop_token = token.clone();
        let loop_user = user_id.clone();

        ctx.observer.record_event(
            "simulation.task.started",
            json!({ "user_id": user_id, "generation": generation }),
        );

        let completion = tokio::spawn(async move {
            run_loop(loop_user, generation, loop_token, ctx).await;
        });

        Self {
            user_id,
            generation,
            started_at: Utc::now(),
            token,
            completion,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Signals cancellation and blocks until the loop has fully exited. After
    /// this returns, no further tick for this task can ever run.
    pub async fn drain(self) {
        self.token.cancel();
        if let Err(err) = self.completion.await {
            // A panicked worker is already dead; draining it is still complete.
            log::error!(
                "Simulation task for user {} terminated abnormally: {}",
                self.user_id,
                err
            );
        }
    }
}

/// The periodic loop. Strictly sequential per task: tick N+1 never starts before
/// tick N (including its cancellation check) has completed.
async fn run_loop(user_id: UserId, generation: u64, token: CancellationToken, ctx: Arc<SimContext>) {
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(ctx.tick_period) => {}
        }
        // The token may have been raised while the tick slept out its period.
        if token.is_cancelled() {
            break;
        }

        if let Err(err) = run_tick(&user_id, generation, &ctx).await {
            ctx.observer.increment_counter(
                METRIC_ERRORS,
                json!({ "error_type": "tick_failed", "operation": "simulate_data" }),
                1,
            );
            log::error!("Error in simulation tick for user {}: {}", user_id, err);
        }
    }

    ctx.observer.record_event(
        "simulation.task.stopped",
        json!({ "user_id": user_id, "generation": generation }),
    );
    log::info!("Simulation loop for user {} (generation {}) stopped", user_id, generation);
}

/// One fetch-generate-deliver pass for every plant the user owns.
async fn run_tick(user_id: &str, generation: u64, ctx: &SimContext) -> anyhow::Result<()> {
    let plants = match ctx.plants.list_plants(user_id).await {
        Ok(plants) => plants,
        Err(err) => {
            // Transient downstream failure: skip this tick, retry next period.
            ctx.observer.increment_counter(
                METRIC_ERRORS,
                json!({ "error_type": "fetch_plants_failed", "operation": "simulate_data" }),
                1,
            );
            log::error!("Failed to fetch plants for user {}: {}", user_id, err);
            return Ok(());
        }
    };

    for plant_id in plants {
        if ctx.fault.consume() {
            ctx.observer.increment_counter(
                METRIC_ERRORS,
                json!({ "error_type": "bug_triggered", "operation": "simulate_data" }),
                1,
            );
            log::error!(
                "What a nasty bug! It flew into the simulation service and stopped producing sensor readings."
            );
            continue;
        }

        let reading = generator::generate(plant_id);
        let room = ctx.sessions.members_of(user_id);
        if room.is_empty() {
            // Nobody subscribed; nothing to deliver for this plant.
            continue;
        }

        ctx.delivery.publish(
            user_id,
            "update_plant",
            json!({ "plant_id": plant_id, "data": reading }),
        );
        ctx.observer.increment_counter(
            METRIC_DATA_EMITTED,
            json!({ "user_id": user_id, "plant_id": plant_id, "generation": generation }),
            1,
        );
        log::debug!("Simulated data for plant {} sent to user {}", plant_id, user_id);
    }

    Ok(())
}
