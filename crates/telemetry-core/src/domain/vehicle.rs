//! The vehicle telemetry record and its update rules.
//!
//! # Invariants
//!
//! After every mutation (operator command or drift step) the record satisfies:
//!
//! | Field        | Rule                          |
//! |--------------|-------------------------------|
//! | speed        | clamped to `0..=120` km/h     |
//! | battery      | clamped to `0..=100` %        |
//! | temperature  | clamped to `20..=60` °C       |
//! | heading      | wrapped into `0..360` degrees |
//!
//! Out-of-range values are never rejected by the normalisation step: they are
//! clamped (or wrapped, for heading).  Operator commands are different: a
//! command that *would* cross a speed bound is rejected up front and leaves
//! the state untouched, so the operator gets a `NACK` instead of a silent
//! clamp.

use crate::domain::drift::DriftStep;

/// Upper speed bound in km/h.
pub const MAX_SPEED_KMH: f64 = 120.0;
/// Lower speed bound in km/h.
pub const MIN_SPEED_KMH: f64 = 0.0;
/// Upper battery bound in percent.
pub const MAX_BATTERY_PCT: f64 = 100.0;
/// Lower temperature bound in °C.
pub const MIN_TEMP_C: f64 = 20.0;
/// Upper temperature bound in °C.
pub const MAX_TEMP_C: f64 = 60.0;
/// Speed-changing commands are refused below this battery level.
pub const LOW_BATTERY_PCT: f64 = 10.0;

const SPEED_STEP_KMH: f64 = 5.0;
const TURN_STEP_DEG: f64 = 15.0;
const FULL_CIRCLE_DEG: f64 = 360.0;

/// Temperature the engine relaxes toward on every drift step.
pub const TEMP_TARGET_C: f64 = 35.0;
/// Fraction of the gap to [`TEMP_TARGET_C`] closed per drift step.
pub const TEMP_RELAX_RATE: f64 = 0.1;

/// A copy of the vehicle fields taken at one instant.
///
/// Snapshots are plain values: holding one never keeps a lock alive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VehicleSnapshot {
    pub speed_kmh: f64,
    pub battery_pct: f64,
    pub temp_c: f64,
    pub heading_deg: f64,
}

/// A discrete operator command (`CMD <subcommand>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleCommand {
    SpeedUp,
    SlowDown,
    TurnLeft,
    TurnRight,
}

impl VehicleCommand {
    /// Parses a subcommand token, ignoring case and surrounding whitespace.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_uppercase().as_str() {
            "SPEED_UP" => Some(Self::SpeedUp),
            "SLOW_DOWN" => Some(Self::SlowDown),
            "TURN_LEFT" => Some(Self::TurnLeft),
            "TURN_RIGHT" => Some(Self::TurnRight),
            _ => None,
        }
    }

    /// The canonical wire spelling, as echoed in `ACK <cmd> accepted`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SpeedUp => "SPEED_UP",
            Self::SlowDown => "SLOW_DOWN",
            Self::TurnLeft => "TURN_LEFT",
            Self::TurnRight => "TURN_RIGHT",
        }
    }

    fn changes_speed(self) -> bool {
        matches!(self, Self::SpeedUp | Self::SlowDown)
    }
}

/// Result of applying an operator command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Accepted,
    /// Battery below [`LOW_BATTERY_PCT`].
    RejectedLowBattery,
    /// The command would push speed above [`MAX_SPEED_KMH`].
    RejectedSpeedLimit,
    /// The command would push speed below [`MIN_SPEED_KMH`].
    RejectedMinSpeed,
    UnknownCommand,
}

impl CommandOutcome {
    /// The `NACK` reason token, or `None` for [`CommandOutcome::Accepted`].
    pub fn nack_reason(self) -> Option<&'static str> {
        match self {
            Self::Accepted => None,
            Self::RejectedLowBattery => Some("low_battery"),
            Self::RejectedSpeedLimit => Some("speed_limit"),
            Self::RejectedMinSpeed => Some("min_speed"),
            Self::UnknownCommand => Some("unknown_cmd"),
        }
    }
}

/// The single simulated vehicle.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleState {
    speed_kmh: f64,
    battery_pct: f64,
    temp_c: f64,
    heading_deg: f64,
}

impl Default for VehicleState {
    /// Startup values: 50 km/h, full battery, 35 °C, heading 90° (east).
    fn default() -> Self {
        Self {
            speed_kmh: 50.0,
            battery_pct: 100.0,
            temp_c: 35.0,
            heading_deg: 90.0,
        }
    }
}

impl VehicleState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a state from arbitrary values, normalising them first.
    ///
    /// Mostly useful for tests and for seeding a scenario (e.g. a nearly
    /// flat battery).
    pub fn from_snapshot(snapshot: VehicleSnapshot) -> Self {
        let mut state = Self {
            speed_kmh: snapshot.speed_kmh,
            battery_pct: snapshot.battery_pct,
            temp_c: snapshot.temp_c,
            heading_deg: snapshot.heading_deg,
        };
        state.normalize();
        state
    }

    pub fn snapshot(&self) -> VehicleSnapshot {
        VehicleSnapshot {
            speed_kmh: self.speed_kmh,
            battery_pct: self.battery_pct,
            temp_c: self.temp_c,
            heading_deg: self.heading_deg,
        }
    }

    /// Applies one operator command.
    ///
    /// Rejections leave every field unchanged.  Turns are never gated on
    /// battery or speed.
    pub fn apply_command(&mut self, command: VehicleCommand) -> CommandOutcome {
        if command.changes_speed() && self.battery_pct < LOW_BATTERY_PCT {
            return CommandOutcome::RejectedLowBattery;
        }

        match command {
            VehicleCommand::SpeedUp => {
                if self.speed_kmh + SPEED_STEP_KMH > MAX_SPEED_KMH {
                    return CommandOutcome::RejectedSpeedLimit;
                }
                self.speed_kmh += SPEED_STEP_KMH;
            }
            VehicleCommand::SlowDown => {
                if self.speed_kmh - SPEED_STEP_KMH < MIN_SPEED_KMH {
                    return CommandOutcome::RejectedMinSpeed;
                }
                self.speed_kmh -= SPEED_STEP_KMH;
            }
            VehicleCommand::TurnLeft => self.heading_deg -= TURN_STEP_DEG,
            VehicleCommand::TurnRight => self.heading_deg += TURN_STEP_DEG,
        }

        self.normalize();
        CommandOutcome::Accepted
    }

    /// Parses `token` and applies it; unrecognised tokens yield
    /// [`CommandOutcome::UnknownCommand`] without touching the state.
    pub fn apply_command_token(&mut self, token: &str) -> CommandOutcome {
        match VehicleCommand::parse(token) {
            Some(command) => self.apply_command(command),
            None => CommandOutcome::UnknownCommand,
        }
    }

    /// Applies one drift step.
    ///
    /// Battery never increases here: a negative drain is treated as zero.
    pub fn apply_drift(&mut self, step: DriftStep) {
        self.speed_kmh += step.speed_delta;
        self.battery_pct -= step.battery_drain.max(0.0);
        self.temp_c += (TEMP_TARGET_C - self.temp_c) * TEMP_RELAX_RATE + step.temp_noise;
        self.heading_deg += step.heading_delta;
        self.normalize();
    }

    fn normalize(&mut self) {
        self.speed_kmh = self.speed_kmh.clamp(MIN_SPEED_KMH, MAX_SPEED_KMH);
        self.battery_pct = self.battery_pct.clamp(0.0, MAX_BATTERY_PCT);
        self.temp_c = self.temp_c.clamp(MIN_TEMP_C, MAX_TEMP_C);
        self.heading_deg = wrap_heading(self.heading_deg);
    }
}

/// Wraps any finite angle into `[0, 360)`.
///
/// `rem_euclid` can round a tiny negative input up to exactly 360.0, which
/// would break the half-open range, so that case folds back to zero.
pub fn wrap_heading(deg: f64) -> f64 {
    let wrapped = deg.rem_euclid(FULL_CIRCLE_DEG);
    if wrapped >= FULL_CIRCLE_DEG {
        0.0
    } else {
        wrapped
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
