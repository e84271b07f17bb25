use std::{collections::HashMap, fs::File, io::BufReader, path::Path};

use log::{debug, error, info};
use serde_jsonlines::JsonLinesReader;

use crate::SpotterError;

use super::TelemetryFrame;

/// A source of raw telemetry frames.
///
/// Implementations wrap whatever transport supplies samples: simulator
/// shared memory, a network feed or a recording. Frames must be returned in
/// the order they were produced since event detection depends on it.
///
/// # Lifecycle
///
/// 1. Call `start()` to connect to the data source
/// 2. Call `next_frame()` repeatedly until it returns an error
pub trait TelemetryProducer {
    /// Initialize the producer and establish the connection to the data source.
    ///
    /// # Errors
    ///
    /// Returns an error if the data source cannot be reached.
    fn start(&mut self) -> Result<(), SpotterError>;

    /// Get the next raw frame.
    ///
    /// # Errors
    ///
    /// Returns [`SpotterError::ProducerNotStarted`] before `start()` and
    /// [`SpotterError::ProducerExhausted`] once a finite source runs out.
    fn next_frame(&mut self) -> Result<TelemetryFrame, SpotterError>;
}

/// Replays frames recorded earlier, from memory or a JSON Lines file.
#[derive(Default)]
pub struct ReplayTelemetryProducer {
    cur_tick: usize,
    started: bool,
    frames: Vec<TelemetryFrame>,
}

impl ReplayTelemetryProducer {
    /// Frames without driver names reuse the last names seen, since
    /// recordings usually carry `DriverInfo` only when session info changes.
    pub fn from_frames(mut frames: Vec<TelemetryFrame>) -> Self {
        let mut last_names = HashMap::new();
        for frame in frames.iter_mut() {
            if frame.cars.driver_name.is_empty() {
                frame.cars.driver_name.clone_from(&last_names);
            } else {
                last_names.clone_from(&frame.cars.driver_name);
            }
        }

        Self {
            cur_tick: 0,
            started: false,
            frames,
        }
    }

    /// Load frames from a JSON Lines file with one raw sample object per line.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or a line is not valid
    /// JSON. Unknown or wrong-typed keys inside a valid line are not errors.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SpotterError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| SpotterError::NoTelemetryFile { source: e })?;
        let mut reader = JsonLinesReader::new(BufReader::new(file));

        let mut frames = Vec::new();
        loop {
            let line_no = frames.len() + 1;
            match reader.read::<TelemetryFrame>() {
                Ok(Some(frame)) => frames.push(frame),
                Ok(None) => break,
                Err(e) => {
                    error!("Could not parse telemetry line {}: {}", line_no, e);
                    return Err(SpotterError::InvalidTelemetryLine {
                        line_no,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!("Loaded {} frames from {}", frames.len(), path.display());
        Ok(Self::from_frames(frames))
    }

    /// Fills in the track length and reference car for frames that lack them,
    /// e.g. recordings where both came from session info rather than samples.
    pub fn with_reference_defaults(
        mut self,
        track_length: Option<f32>,
        player_index: Option<usize>,
    ) -> Self {
        for frame in self.frames.iter_mut() {
            frame.cars.track_length = frame.cars.track_length.or(track_length);
            frame.cars.player_index = frame.cars.player_index.or(player_index);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl TelemetryProducer for ReplayTelemetryProducer {
    fn start(&mut self) -> Result<(), SpotterError> {
        debug!("Replaying {} frames", self.frames.len());
        self.started = true;
        self.cur_tick = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<TelemetryFrame, SpotterError> {
        if !self.started {
            return Err(SpotterError::ProducerNotStarted);
        }
        let frame = self
            .frames
            .get(self.cur_tick)
            .cloned()
            .ok_or(SpotterError::ProducerExhausted)?;
        self.cur_tick += 1;
        Ok(frame)
    }
}
