pub mod collector;
pub mod event_detector;
pub mod position_normalizer;
pub mod producer;

use std::{
    collections::HashMap,
    time::{SystemTime, UNIX_EPOCH},
};

pub use collector::collect_telemetry;
pub use event_detector::{
    DEFAULT_FLAG_STATE, EventDetectorState, EventKind, EventPayload, TelemetryEvent, process,
};
pub use position_normalizer::{CarLocation, RelativeCar, Spotting, normalize};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-car arrays for one session sample, indexed by car slot.
///
/// Arrays may be ragged: any slot beyond an array's length reads as lap 0,
/// fraction 0.0 and speed 0.0.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCarFrame {
    /// Completed laps per car
    pub lap: Vec<i32>,
    /// Fractional progress around the current lap, in [0,1)
    pub lap_fraction: Vec<f32>,
    /// Car speed in m/s
    pub speed: Vec<f32>,
    pub driver_name: HashMap<usize, String>,
    /// Track length in meters, constant for a session
    pub track_length: Option<f32>,
    /// Index of the reference car
    pub player_index: Option<usize>,
    /// Reference car speed reported separately from the per-car array
    pub player_speed: Option<f32>,
}

impl RawCarFrame {
    pub fn car_count(&self) -> usize {
        self.lap
            .len()
            .max(self.lap_fraction.len())
            .max(self.speed.len())
    }

    pub fn lap_at(&self, idx: usize) -> i32 {
        self.lap.get(idx).copied().unwrap_or(0)
    }

    pub fn lap_fraction_at(&self, idx: usize) -> f32 {
        self.lap_fraction.get(idx).copied().unwrap_or(0.)
    }

    pub fn speed_at(&self, idx: usize) -> f32 {
        self.speed.get(idx).copied().unwrap_or(0.)
    }

    /// Builds a car frame from an iRacing style sample. Missing or
    /// wrong-typed keys are left empty.
    pub fn from_value(value: &Value) -> Self {
        let mut driver_name = HashMap::new();
        if let Some(drivers) = value
            .get("DriverInfo")
            .and_then(|info| info.get("Drivers"))
            .and_then(Value::as_array)
        {
            for driver in drivers {
                let Some(car_idx) = driver.get("CarIdx").and_then(as_index) else {
                    continue;
                };
                if let Some(name) = driver.get("UserName").and_then(Value::as_str) {
                    driver_name.insert(car_idx, name.to_string());
                }
            }
        }

        Self {
            lap: int_array(value.get("CarIdxLap")),
            lap_fraction: float_array(value.get("CarIdxLapDistPct")),
            speed: float_array(value.get("CarIdxSpeed")),
            driver_name,
            track_length: value.get("TrackLength").and_then(as_track_length),
            player_index: value
                .get("PlayerCarIdx")
                .and_then(as_index)
                .or_else(|| {
                    value
                        .get("DriverInfo")
                        .and_then(|info| info.get("DriverCarIdx"))
                        .and_then(as_index)
                }),
            player_speed: value.get("Speed").and_then(as_float),
        }
    }
}

/// The fields of a sample the event detector looks at. Every field is
/// optional; an absent field skips its check for that sample.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub flag_state: Option<String>,
    pub is_on_track: Option<bool>,
    /// 1-based race position
    pub position: Option<i32>,
    pub lap: Option<i32>,
    /// Lap time in seconds
    pub lap_time: Option<f32>,
    /// Sample time in milliseconds since the unix epoch
    pub timestamp_ms: Option<u128>,
}

impl TelemetrySnapshot {
    pub fn from_value(value: &Value) -> Self {
        Self {
            flag_state: value
                .get("flag_state")
                .and_then(Value::as_str)
                .map(str::to_string),
            is_on_track: value.get("is_on_track").and_then(Value::as_bool),
            position: value.get("position").and_then(as_int),
            lap: value.get("lap").and_then(as_int),
            lap_time: value.get("lap_time").and_then(as_float),
            timestamp_ms: value.get("timestamp").and_then(as_timestamp_ms),
        }
    }
}

/// A single raw sample as read from a producer: the car arrays used for
/// spotting together with the fields used for event detection.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub struct TelemetryFrame {
    pub cars: RawCarFrame,
    pub snapshot: TelemetrySnapshot,
}

impl From<Value> for TelemetryFrame {
    fn from(value: Value) -> Self {
        Self::from(&value)
    }
}

impl From<&Value> for TelemetryFrame {
    fn from(value: &Value) -> Self {
        Self {
            cars: RawCarFrame::from_value(value),
            snapshot: TelemetrySnapshot::from_value(value),
        }
    }
}

pub(crate) fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

fn as_int(value: &Value) -> Option<i32> {
    let Value::Number(n) = value else {
        return None;
    };
    let int = match n.as_i64() {
        Some(int) => int,
        None => {
            // integral floats such as 7.0 are accepted
            let float = n.as_f64().filter(|f| f.is_finite() && f.fract() == 0.)?;
            float as i64
        }
    };
    i32::try_from(int).ok()
}

fn as_index(value: &Value) -> Option<usize> {
    as_int(value).and_then(|i| usize::try_from(i).ok())
}

fn as_float(value: &Value) -> Option<f32> {
    value
        .as_f64()
        .filter(|f| f.is_finite())
        .map(|f| f as f32)
}

/// Accepts meters as a number or the "3.60 km" string used in iRacing
/// session info.
fn as_track_length(value: &Value) -> Option<f32> {
    match value {
        Value::Number(_) => as_float(value),
        Value::String(s) => {
            let s = s.trim();
            if let Some(km) = s.strip_suffix("km") {
                km.trim().parse::<f32>().ok().map(|km| km * 1000.)
            } else {
                s.strip_suffix('m').unwrap_or(s).trim().parse::<f32>().ok()
            }
        }
        _ => None,
    }
}

/// Seconds since the epoch, as produced by the recorder, to milliseconds.
fn as_timestamp_ms(value: &Value) -> Option<u128> {
    value
        .as_f64()
        .filter(|f| f.is_finite() && *f >= 0.)
        .map(|secs| (secs * 1000.).round() as u128)
}

fn int_array(value: Option<&Value>) -> Vec<i32> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().map(|v| as_int(v).unwrap_or(0)).collect())
        .unwrap_or_default()
}

fn float_array(value: Option<&Value>) -> Vec<f32> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().map(|v| as_float(v).unwrap_or(0.)).collect())
        .unwrap_or_default()
}
