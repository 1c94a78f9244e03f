//! The process-wide vehicle record, guarded for concurrent access.

use std::sync::{Mutex, MutexGuard, PoisonError};

use telemetry_core::{CommandOutcome, DriftStep, VehicleSnapshot, VehicleState};

/// [`VehicleState`] behind a mutex.
///
/// Every method takes the lock, does its work, and releases it before
/// returning; a snapshot handed out is a copy and never pins the lock.
#[derive(Debug, Default)]
pub struct SharedVehicle {
    state: Mutex<VehicleState>,
}

impl SharedVehicle {
    pub fn new(initial: VehicleState) -> Self {
        Self {
            state: Mutex::new(initial),
        }
    }

    pub fn snapshot(&self) -> VehicleSnapshot {
        self.lock().snapshot()
    }

    /// Applies a drift step and returns the resulting snapshot, taken under
    /// the same lock so the broadcast reflects exactly this step.
    pub fn apply_drift(&self, step: DriftStep) -> VehicleSnapshot {
        let mut state = self.lock();
        state.apply_drift(step);
        state.snapshot()
    }

    pub fn apply_command(&self, token: &str) -> CommandOutcome {
        self.lock().apply_command_token(token)
    }

    fn lock(&self) -> MutexGuard<'_, VehicleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
