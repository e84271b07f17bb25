use std::fmt;

use log::trace;
use serde::{Deserialize, Serialize};

use super::{TelemetrySnapshot, now_ms};

/// Flag state assumed before the first sample is seen.
pub const DEFAULT_FLAG_STATE: &str = "Green";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    FlagChange,
    OffTrack,
    PositionGain,
    PositionLoss,
    LapComplete,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FlagChange => "flag_change",
            Self::OffTrack => "off_track",
            Self::PositionGain => "position_gain",
            Self::PositionLoss => "position_loss",
            Self::LapComplete => "lap_complete",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventPayload {
    FlagChange {
        from: String,
        to: String,
    },
    OffTrack {},
    PositionGain {
        from: i32,
        to: i32,
        lap: Option<i32>,
    },
    PositionLoss {
        from: i32,
        to: i32,
        lap: Option<i32>,
    },
    LapComplete {
        completed_lap: i32,
        next_lap: i32,
        lap_time: Option<f32>,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::FlagChange { .. } => EventKind::FlagChange,
            Self::OffTrack {} => EventKind::OffTrack,
            Self::PositionGain { .. } => EventKind::PositionGain,
            Self::PositionLoss { .. } => EventKind::PositionLoss,
            Self::LapComplete { .. } => EventKind::LapComplete,
        }
    }
}

/// A discrete event derived from consecutive samples. Serializes as
/// `{"type": .., "payload": {..}, "timestamp_ms": ..}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    #[serde(flatten)]
    pub payload: EventPayload,
    pub timestamp_ms: u128,
}

impl TelemetryEvent {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// What the detector remembers between samples of one session.
///
/// Samples must be fed strictly in arrival order and never concurrently.
/// Start a new session with [`EventDetectorState::reset`] or a fresh value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventDetectorState {
    pub last_flag_state: String,
    pub last_position: Option<i32>,
    pub last_lap: Option<i32>,
}

impl Default for EventDetectorState {
    fn default() -> Self {
        Self {
            last_flag_state: DEFAULT_FLAG_STATE.to_string(),
            last_position: None,
            last_lap: None,
        }
    }
}

impl EventDetectorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn process(&mut self, snapshot: &TelemetrySnapshot) -> Vec<TelemetryEvent> {
        process(self, snapshot)
    }
}

/// Compares a sample with the remembered state and returns the events it
/// triggers, always ordered flag, off-track, position, lap.
///
/// Flag, position and lap events fire on transitions only. Off-track fires
/// on every sample where the car is off track.
pub fn process(state: &mut EventDetectorState, snapshot: &TelemetrySnapshot) -> Vec<TelemetryEvent> {
    let timestamp_ms = snapshot.timestamp_ms.unwrap_or_else(now_ms);

    let payloads = [
        detect_flag_change(state, snapshot),
        detect_off_track(snapshot),
        detect_position_change(state, snapshot),
        detect_lap_complete(state, snapshot),
    ];

    payloads
        .into_iter()
        .flatten()
        .inspect(|payload| trace!("Detected {}: {:?}", payload.kind(), payload))
        .map(|payload| TelemetryEvent {
            payload,
            timestamp_ms,
        })
        .collect()
}

fn detect_flag_change(
    state: &mut EventDetectorState,
    snapshot: &TelemetrySnapshot,
) -> Option<EventPayload> {
    let flag_state = snapshot.flag_state.as_ref()?;
    if *flag_state == state.last_flag_state {
        return None;
    }
    let from = std::mem::replace(&mut state.last_flag_state, flag_state.clone());
    Some(EventPayload::FlagChange {
        from,
        to: flag_state.clone(),
    })
}

fn detect_off_track(snapshot: &TelemetrySnapshot) -> Option<EventPayload> {
    match snapshot.is_on_track {
        Some(false) => Some(EventPayload::OffTrack {}),
        _ => None,
    }
}

fn detect_position_change(
    state: &mut EventDetectorState,
    snapshot: &TelemetrySnapshot,
) -> Option<EventPayload> {
    let position = snapshot.position?;
    let previous = state.last_position.replace(position)?;
    let lap = snapshot.lap;

    if position < previous {
        Some(EventPayload::PositionGain {
            from: previous,
            to: position,
            lap,
        })
    } else if position > previous {
        Some(EventPayload::PositionLoss {
            from: previous,
            to: position,
            lap,
        })
    } else {
        None
    }
}

// Decreases (session restarts) still move `last_lap` so a reset does not
// produce repeated completions once the count climbs back.
fn detect_lap_complete(
    state: &mut EventDetectorState,
    snapshot: &TelemetrySnapshot,
) -> Option<EventPayload> {
    let lap = snapshot.lap?;
    let previous = state.last_lap.replace(lap)?;

    (lap > previous).then(|| EventPayload::LapComplete {
        completed_lap: previous,
        next_lap: lap,
        lap_time: snapshot.lap_time,
    })
}
