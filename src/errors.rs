// Error types for race-spotter

use crate::telemetry::Spotting;
use snafu::Snafu;
use std::{io, sync::mpsc::SendError};

#[derive(Debug, Snafu)]
pub enum SpotterError {
    // Errors for the replay producer
    #[snafu(display("Unable to open telemetry recording"))]
    NoTelemetryFile { source: io::Error },
    #[snafu(display("Invalid telemetry line {line_no}: {reason}"))]
    InvalidTelemetryLine { line_no: usize, reason: String },
    #[snafu(display("Telemetry producer not started, call start() first"))]
    ProducerNotStarted,
    #[snafu(display("Telemetry producer has no more frames"))]
    ProducerExhausted,

    // Errors while publishing events and spotting data
    #[snafu(display("Error broadcasting spotting snapshot"))]
    SpottingBroadcastError { source: Box<SendError<Spotting>> },
    #[snafu(display("Event sink closed, could not publish {kind}"))]
    EventSinkClosed { kind: String },

    // Errors for the event writer
    #[snafu(display("Error writing event file"))]
    WriterError { source: io::Error },

    // Config management errors
    #[snafu(display("Could not find application data directory to save config file"))]
    NoConfigDir,
    #[snafu(display("Error writing config file"))]
    ConfigIOError { source: io::Error },
    #[snafu(display("Error serializing config file"))]
    ConfigSerializeError { source: serde_json::Error },
}

impl SpotterError {
    /// True when the producer simply ran out of frames, which ends a replay
    /// normally rather than signalling a failure.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, SpotterError::ProducerExhausted)
    }
}

impl From<SendError<Spotting>> for SpotterError {
    fn from(value: SendError<Spotting>) -> Self {
        SpotterError::SpottingBroadcastError {
            source: Box::new(value),
        }
    }
}
