//! # Core Simulation Engine Module
//!
//! This module forms the heart of the greenhouse simulation service. It aggregates
//! the components required for running one background data-generation task per user,
//! keeping that task's lifecycle in sync with transient session connect/disconnect
//! events, and streaming generated readings to exactly the sessions currently
//! subscribed for that user.
//!
//! ## Core Components:
//!
//! - **`scheduler`**: The orchestrator. Maps user identifiers to their active
//!   `SimulationTask`, serializes start/restart/stop requests per user, and fully
//!   drains an old task before replacing it.
//!
//! - **`sim_task`**: One cancellable unit of repeating work bound to a single user.
//!   Owns its own cancellation token and completion handle and runs the periodic
//!   fetch-generate-deliver loop.
//!
//! - **`session_registry`**: Room membership. Tracks which session identifiers are
//!   currently subscribed to which user's updates and reports when the last session
//!   for a user leaves.
//!
//! - **`delivery`**: The outbound channel abstraction plus `RoomDispatcher`, a
//!   room-keyed zero-copy fan-out over per-session channels.
//!
//! - **`generator`**: Pure synthetic sensor readings.
//!
//! - **`plants`**: The upstream plant-service client, the only downstream call a
//!   tick makes.
//!
//! - **`fault`**: The single-shot fault-injection flag consulted before each unit
//!   of work.
//!
//! - **`observer`**: The telemetry seam. The core emits structured events and
//!   counters through it; the concrete exporter lives outside this crate.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// The outbound delivery abstraction and the room-keyed fan-out dispatcher.
pub mod delivery;
/// The single-shot fault-injection flag.
pub mod fault;
/// Pure synthetic sensor reading generation.
pub mod generator;
/// The telemetry sink seam used by the whole core.
pub mod observer;
/// The upstream plant-service interface and HTTP client.
pub mod plants;
/// Per-user session room membership.
pub mod session_registry;
/// The cancellable per-user periodic simulation task.
pub mod sim_task;
/// The per-user task orchestrator.
pub mod scheduler;

#[cfg(test)]
pub mod testkit;

/// Opaque user identifier, the primary key for both task and session state.
pub type UserId = String;
/// Identifier of one connected session (e.g. a WebSocket connection).
pub type SessionId = String;
/// Identifier of one simulated plant entity.
pub type PlantId = i64;

// --- Public API Re-exports ---
pub use delivery::{Delivery, RoomDispatcher, UpdateFrame};
pub use fault::FaultInjector;
pub use generator::{generate, Reading};
pub use observer::{LogObserver, Observer};
pub use plants::{PlantRecord, PlantServiceClient, PlantSource, PlantSourceError};
pub use scheduler::{SchedulerError, SimulationScheduler};
pub use session_registry::{LeaveOutcome, SessionRegistry};
pub use sim_task::{SimContext, SimulationTask};
