//! # Synthetic Sensor Data Generator
//!
//! Pure, stateless generation of one fake reading set per plant per tick. All four
//! fields are sampled independently and uniformly within fixed ranges; no
//! correlation across fields or across ticks is required or implemented.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::PlantId;

/// # Reading
///
/// One synthetic sensor reading set for a single plant. Field names match the wire
/// payload the websocket clients expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// The plant this reading belongs to.
    pub plant_id: PlantId,
    /// Degrees Celsius, uniform in [20.0, 30.0], rounded to 2 decimals.
    pub temperature: f64,
    /// Relative humidity percent, uniform in [40.0, 60.0], rounded to 2 decimals.
    pub humidity: f64,
    /// Tank level, uniform integer in [1, 10].
    pub water_level: u8,
    /// Visible insects, uniform integer in [0, 10].
    pub number_of_insects: u8,
}

/// Rounds to two decimal places, matching the precision the dashboard renders.
fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Produces one reading for the given plant. No failure modes, no state.
pub fn generate(plant_id: PlantId) -> Reading {
    let mut rng = rand::rng();
    Reading {
        plant_id,
        temperature: round2(rng.random_range(20.0..=30.0)),
        humidity: round2(rng.random_range(40.0..=60.0)),
        water_level: rng.random_range(1..=10),
        number_of_insects: rng.random_range(0..=10),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readings_stay_within_bounds() {
        for _ in 0..10_000 {
            let r = generate(42);
            assert_eq!(r.plant_id, 42);
            assert!((20.0..=30.0).contains(&r.temperature), "temperature {}", r.temperature);
            assert!((40.0..=60.0).contains(&r.humidity), "humidity {}", r.humidity);
            assert!((1..=10).contains(&r.water_level), "water_level {}", r.water_level);
            assert!(
                r.number_of_insects <= 10,
                "number_of_insects {}",
                r.number_of_insects
            );
        }
    }

    #[test]
    fn readings_serialize_with_expected_field_names() {
        let json = serde_json::to_value(generate(7)).expect("serialize reading");
        for key in ["plant_id", "temperature", "humidity", "water_level", "number_of_insects"] {
            assert!(json.get(key).is_some(), "missing field {key}");
        }
    }
}
