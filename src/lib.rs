// Library interface for race-spotter
// This allows integration tests to access internal modules

pub mod config;
pub mod errors;
pub mod publisher;
pub mod telemetry;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::SpotterError;
pub use publisher::EventSink;
pub use telemetry::{
    CarLocation, EventDetectorState, EventKind, EventPayload, RawCarFrame, RelativeCar, Spotting,
    TelemetryEvent, TelemetryFrame, TelemetrySnapshot, normalize, process,
};
