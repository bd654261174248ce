//! Test-only scripted collaborators for exercising the scheduler and task loop
//! without a network or a real exporter.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::delivery::Delivery;
use crate::core::fault::FaultInjector;
use crate::core::observer::{Observer, METRIC_DATA_EMITTED, METRIC_ERRORS};
use crate::core::plants::{PlantSource, PlantSourceError};
use crate::core::session_registry::SessionRegistry;
use crate::core::sim_task::SimContext;
use crate::core::PlantId;

/// Observer that records everything for assertions.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<(String, Value)>>,
    counters: Mutex<Vec<(String, Value, i64)>>,
}

impl RecordingObserver {
    /// Sum of all deltas recorded under `name`.
    pub fn counter_sum(&self, name: &str) -> i64 {
        self.counters
            .lock()
            .expect("RecordingObserver lock poisoned")
            .iter()
            .filter(|(n, _, _)| n == name)
            .map(|(_, _, delta)| delta)
            .sum()
    }

    /// Number of error-counter bumps tagged with the given `error_type`.
    pub fn error_count(&self, error_type: &str) -> usize {
        self.counters
            .lock()
            .expect("RecordingObserver lock poisoned")
            .iter()
            .filter(|(n, attrs, _)| n == METRIC_ERRORS && attrs["error_type"] == error_type)
            .count()
    }

    /// Attribute payloads of every recorded event named `name`, in order.
    pub fn events_named(&self, name: &str) -> Vec<Value> {
        self.events
            .lock()
            .expect("RecordingObserver lock poisoned")
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, attrs)| attrs.clone())
            .collect()
    }

    /// Generation tags of every emission counter bump, in recording order.
    pub fn emitted_generations(&self) -> Vec<u64> {
        self.counters
            .lock()
            .expect("RecordingObserver lock poisoned")
            .iter()
            .filter(|(n, _, _)| n == METRIC_DATA_EMITTED)
            .filter_map(|(_, attrs, _)| attrs["generation"].as_u64())
            .collect()
    }
}

impl Observer for RecordingObserver {
    fn record_event(&self, name: &str, attributes: Value) {
        self.events
            .lock()
            .expect("RecordingObserver lock poisoned")
            .push((name.to_string(), attributes));
    }

    fn increment_counter(&self, name: &str, attributes: Value, delta: i64) {
        self.counters
            .lock()
            .expect("RecordingObserver lock poisoned")
            .push((name.to_string(), attributes, delta));
    }
}

/// Plant source with an optional queue of scripted responses in front of a
/// steady-state plant list.
pub struct ScriptedPlantSource {
    fallback: Vec<PlantId>,
    queue: Mutex<VecDeque<Result<Vec<PlantId>, PlantSourceError>>>,
}

impl ScriptedPlantSource {
    pub fn new(fallback: Vec<PlantId>) -> Self {
        Self {
            fallback,
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Queues one response consumed before the fallback list kicks back in.
    pub fn push_response(&self, response: Result<Vec<PlantId>, PlantSourceError>) {
        self.queue
            .lock()
            .expect("ScriptedPlantSource lock poisoned")
            .push_back(response);
    }
}

#[async_trait]
impl PlantSource for ScriptedPlantSource {
    async fn list_plants(&self, _user_id: &str) -> Result<Vec<PlantId>, PlantSourceError> {
        let scripted = self
            .queue
            .lock()
            .expect("ScriptedPlantSource lock poisoned")
            .pop_front();
        match scripted {
            Some(response) => response,
            None => Ok(self.fallback.clone()),
        }
    }
}

/// Delivery that captures every publish instead of fanning out.
#[derive(Default)]
pub struct CapturingDelivery {
    published: Mutex<Vec<(String, String, Value)>>,
}

impl CapturingDelivery {
    pub fn published(&self) -> Vec<(String, String, Value)> {
        self.published
            .lock()
            .expect("CapturingDelivery lock poisoned")
            .clone()
    }
}

impl Delivery for CapturingDelivery {
    fn publish(&self, room: &str, event: &str, payload: Value) {
        self.published
            .lock()
            .expect("CapturingDelivery lock poisoned")
            .push((room.to_string(), event.to_string(), payload));
    }
}

/// Fully wired test context plus handles to its scripted collaborators.
pub struct TestHarness {
    pub ctx: Arc<SimContext>,
    pub observer: Arc<RecordingObserver>,
    pub delivery: Arc<CapturingDelivery>,
    pub plants: Arc<ScriptedPlantSource>,
}

/// Builds a `SimContext` over scripted collaborators, with the production tick
/// period (tests run under paused virtual time).
pub fn test_context(plants: Vec<PlantId>) -> TestHarness {
    let observer = Arc::new(RecordingObserver::default());
    let delivery = Arc::new(CapturingDelivery::default());
    let plants = Arc::new(ScriptedPlantSource::new(plants));
    let ctx = Arc::new(SimContext {
        plants: plants.clone(),
        delivery: delivery.clone(),
        sessions: Arc::new(SessionRegistry::new(observer.clone())),
        fault: Arc::new(FaultInjector::new()),
        observer: observer.clone(),
        tick_period: Duration::from_secs(2),
    });
    TestHarness {
        ctx,
        observer,
        delivery,
        plants,
    }
}
