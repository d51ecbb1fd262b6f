//! Telemetry policy engine.
//!
//! Pure functions from `(family, current state, mode)` to the next state and
//! the telemetry payload to publish. Randomness comes in through the caller's
//! [`Rng`] so seeded runs are reproducible.

use rand::Rng;
use serde_json::{Value, json};
use strum::{Display, EnumString};

use crate::model::{DeviceState, TypeTag};

const STATUS: &str = "status";
const TEMPERATURE: &str = "temperature";
const HUMIDITY: &str = "humidity";

const DEFAULT_TEMPERATURE: f64 = 25.0;
const DEFAULT_HUMIDITY: f64 = 50.0;

const TEMPERATURE_RANGE: std::ops::RangeInclusive<f64> = 16.0..=28.0;
const HUMIDITY_RANGE: std::ops::RangeInclusive<f64> = 50.0..=80.0;

const TEMPERATURE_DRIFT: f64 = 0.5;
const AIR_HUMIDITY_DRIFT: f64 = 1.0;
const SOIL_HUMIDITY_DRIFT: f64 = 2.0;

// ── Families ─────────────────────────────────────────────────────────

/// Behavior class of a device type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum Family {
    Light,
    Pump,
    Valve,
    Pool,
    Irrigation,
    Temperature,
    SoilHumidity,
    AirConditioner,
}

/// Shape of a family's telemetry object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// `{status}`
    Binary,
    /// Float readings only.
    Continuous,
    /// `{status, temperature, humidity}`
    Composite,
}

impl Family {
    /// Map a type tag to its family. `None` for types the simulator only echoes.
    pub fn from_tag(tag: &TypeTag) -> Option<Self> {
        let family = match tag.as_str() {
            "led" | "lightbulb" => Self::Light,
            "pump" => Self::Pump,
            "valve" => Self::Valve,
            "pool" => Self::Pool,
            "irrigation" | "garden" => Self::Irrigation,
            "temperature sensor" | "dht22" => Self::Temperature,
            "soilhumidity sensor" | "soil humidity sensor" => Self::SoilHumidity,
            "airconditioner" | "air conditioner" => Self::AirConditioner,
            _ => return None,
        };
        Some(family)
    }

    pub fn kind(self) -> Kind {
        match self {
            Self::Light | Self::Pump | Self::Valve | Self::Pool | Self::Irrigation => Kind::Binary,
            Self::Temperature | Self::SoilHumidity => Kind::Continuous,
            Self::AirConditioner => Kind::Composite,
        }
    }

    /// Fields making up this family's telemetry object.
    pub fn fields(self) -> &'static [&'static str] {
        match self.kind() {
            Kind::Binary => &[STATUS],
            Kind::Composite => &[STATUS, TEMPERATURE, HUMIDITY],
            Kind::Continuous if self == Self::SoilHumidity => &[HUMIDITY],
            Kind::Continuous => &[TEMPERATURE, HUMIDITY],
        }
    }

    fn humidity_drift(self) -> f64 {
        if self == Self::SoilHumidity {
            SOIL_HUMIDITY_DRIFT
        } else {
            AIR_HUMIDITY_DRIFT
        }
    }
}

// ── Modes ────────────────────────────────────────────────────────────

/// How the next reading is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PolicyMode {
    /// Fresh random values every time.
    Randomize,
    /// Republish what is stored.
    Steady,
    /// Small random walk from the stored values (RPC reads).
    Drift,
}

/// Result of one policy step.
#[derive(Debug, Clone, PartialEq)]
pub struct Telemetry {
    /// Current state with the payload merged over it.
    pub next_state: DeviceState,
    /// What goes on the telemetry topic.
    pub payload: DeviceState,
}

/// Produce the next reading for a device.
///
/// Unknown families echo `current` verbatim in every mode.
pub fn generate<R: Rng + ?Sized>(
    family: Option<Family>,
    current: &DeviceState,
    mode: PolicyMode,
    rng: &mut R,
) -> Telemetry {
    let Some(family) = family else {
        return echo(current);
    };

    let payload = match (family.kind(), mode) {
        (Kind::Binary, PolicyMode::Randomize) => object([(STATUS, json!(rng.gen_bool(0.5)))]),
        (Kind::Binary, PolicyMode::Steady | PolicyMode::Drift) => {
            object([(STATUS, json!(stored_status(current)))])
        }
        (_, PolicyMode::Steady) => return echo(current),
        (_, PolicyMode::Randomize) => randomized(family, rng),
        (_, PolicyMode::Drift) => drifted(family, current, rng),
    };

    Telemetry {
        next_state: merge(current, &payload),
        payload,
    }
}

fn echo(current: &DeviceState) -> Telemetry {
    Telemetry {
        next_state: current.clone(),
        payload: current.clone(),
    }
}

fn randomized<R: Rng + ?Sized>(family: Family, rng: &mut R) -> DeviceState {
    family
        .fields()
        .iter()
        .map(|&field| {
            let value = match field {
                STATUS => json!(rng.gen_bool(0.5)),
                TEMPERATURE => json!(round2(rng.gen_range(TEMPERATURE_RANGE))),
                _ => json!(round2(rng.gen_range(HUMIDITY_RANGE))),
            };
            (field.to_owned(), value)
        })
        .collect()
}

fn drifted<R: Rng + ?Sized>(family: Family, current: &DeviceState, rng: &mut R) -> DeviceState {
    family
        .fields()
        .iter()
        .map(|&field| {
            let value = match field {
                STATUS => json!(stored_status(current)),
                TEMPERATURE => {
                    let base = stored_f64(current, TEMPERATURE, DEFAULT_TEMPERATURE);
                    json!(walk(rng, base, TEMPERATURE_DRIFT).max(0.0))
                }
                _ => {
                    let base = stored_f64(current, HUMIDITY, DEFAULT_HUMIDITY);
                    json!(walk(rng, base, family.humidity_drift()).clamp(0.0, 100.0))
                }
            };
            (field.to_owned(), value)
        })
        .collect()
}

fn walk<R: Rng + ?Sized>(rng: &mut R, base: f64, spread: f64) -> f64 {
    base + rng.gen_range(-spread..=spread)
}

fn stored_status(state: &DeviceState) -> bool {
    state.get(STATUS).and_then(Value::as_bool).unwrap_or(false)
}

fn stored_f64(state: &DeviceState, key: &str, default: f64) -> f64 {
    state
        .get(key)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .unwrap_or(default)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn object<const N: usize>(pairs: [(&str, Value); N]) -> DeviceState {
    pairs.into_iter().map(|(k, v)| (k.to_owned(), v)).collect()
}

/// `base` with every key of `overlay` written over it.
pub fn merge(base: &DeviceState, overlay: &DeviceState) -> DeviceState {
    let mut merged = base.clone();
    for (key, value) in overlay {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
