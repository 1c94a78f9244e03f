//! Randomized drift: the per-tick perturbation that simulates natural
//! variation of the vehicle between operator commands.
//!
//! The randomness is kept out of [`crate::VehicleState`] behind the
//! [`DriftSource`] trait.  The state only knows how to *apply* a
//! [`DriftStep`]; where the step comes from is the caller's business.
//! Production code uses [`RandomDrift`]; tests inject fixed steps.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const SPEED_STEP_KMH: f64 = 0.5;
const SPEED_STEPS_MAX: i32 = 5;
const BATTERY_DRAIN_PCT: f64 = 0.2;
const TEMP_STEP_C: f64 = 0.2;
const TEMP_STEPS_MAX: i32 = 3;
const HEADING_JITTER_DEG: i32 = 10;

/// One drift step, expressed as deltas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftStep {
    /// Added to speed (km/h).
    pub speed_delta: f64,
    /// Subtracted from battery (%).  Negative values are ignored.
    pub battery_drain: f64,
    /// Added to temperature (°C) on top of the relaxation toward target.
    pub temp_noise: f64,
    /// Added to heading (degrees) before wrapping.
    pub heading_delta: f64,
}

/// Produces drift steps, one per telemetry tick.
#[cfg_attr(test, mockall::automock)]
pub trait DriftSource: Send {
    fn next_step(&mut self) -> DriftStep;
}

/// Uniform random drift.
///
/// | Field    | Distribution                           |
/// |----------|----------------------------------------|
/// | speed    | `k * 0.5`, `k` uniform in `-5..=5`     |
/// | battery  | constant drain of `0.2`                |
/// | temp     | `j * 0.2`, `j` uniform in `-3..=3`     |
/// | heading  | uniform integer degrees in `-10..=10`  |
pub struct RandomDrift<R = StdRng> {
    rng: R,
}

impl RandomDrift<StdRng> {
    /// Seeds from OS entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible drift for tests and demos.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng + Send> RandomDrift<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng + Send> DriftSource for RandomDrift<R> {
    fn next_step(&mut self) -> DriftStep {
        let speed_steps = self.rng.gen_range(-SPEED_STEPS_MAX..=SPEED_STEPS_MAX);
        let temp_steps = self.rng.gen_range(-TEMP_STEPS_MAX..=TEMP_STEPS_MAX);
        let heading = self.rng.gen_range(-HEADING_JITTER_DEG..=HEADING_JITTER_DEG);

        DriftStep {
            speed_delta: f64::from(speed_steps) * SPEED_STEP_KMH,
            battery_drain: BATTERY_DRAIN_PCT,
            temp_noise: f64::from(temp_steps) * TEMP_STEP_C,
            heading_delta: f64::from(heading),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
