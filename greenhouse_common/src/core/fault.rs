//! # Single-Shot Fault Injection Flag
//!
//! This module provides a lock-free, process-wide fault toggle used to demonstrate
//! observability behavior. External callers (the `/trigger_bug` endpoint) arm the
//! flag; the simulation loop consults it once per plant per tick and, if armed,
//! suppresses exactly one emission before the flag resets itself.
//!
//! ## Core Functionality:
//!
//! - **Atomic State**: An `AtomicBool` carries the armed/disarmed state. Arming and
//!   consuming are single atomic operations, so concurrent simulation tasks never
//!   need a mutex around the flag.
//!
//! - **Single-Shot Semantics**: `consume` swaps the flag back to `false` in the same
//!   atomic step that observes it. Triggering the fault therefore blocks exactly one
//!   subsequent emission, never an unbounded number.
//!
//! The flag is deliberately shared across all users' tasks: under concurrent
//! simulations the "victim" of the suppressed emission is whichever task consumes
//! the flag first.

use std::sync::atomic::{AtomicBool, Ordering};

/// # Fault Injector
///
/// Explicit, shareable state replacing the module-level boolean of the original
/// service. One instance is created at startup and handed by `Arc` to the scheduler
/// and the control surface.
#[derive(Debug, Default)]
pub struct FaultInjector {
    armed: AtomicBool,
}

impl FaultInjector {
    /// Creates a disarmed fault injector.
    pub fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
        }
    }

    /// Arms the flag. The next `consume` call anywhere in the process observes it.
    pub fn trigger(&self) {
        self.armed.store(true, Ordering::SeqCst);
        log::error!("Fault flag armed: next emission will be suppressed");
    }

    /// Observes and resets the flag in one atomic step.
    ///
    /// Returns `true` at most once per `trigger` call.
    pub fn consume(&self) -> bool {
        self.armed.swap(false, Ordering::SeqCst)
    }

    /// Non-destructive read, used by status reporting and tests.
    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consume_is_single_shot() {
        let fault = FaultInjector::new();
        assert!(!fault.consume());

        fault.trigger();
        assert!(fault.is_armed());
        assert!(fault.consume());
        // The first consume reset the flag.
        assert!(!fault.is_armed());
        assert!(!fault.consume());
    }

    #[test]
    fn retrigger_after_consume_arms_again() {
        let fault = FaultInjector::new();
        fault.trigger();
        assert!(fault.consume());
        fault.trigger();
        assert!(fault.consume());
    }
}
