use std::{sync::mpsc::Sender, thread, time::Duration};

use itertools::Itertools;
use log::{debug, error, info};

use crate::{SpotterError, publisher::EventSink};

use super::{
    EventDetectorState, Spotting, TelemetryFrame, now_ms, position_normalizer::normalize,
    producer::TelemetryProducer,
};

pub const REFRESH_RATE_MS: u64 = 100;

/// Runs one frame through detection and normalization.
///
/// Events go to `sink` before the spotting snapshot is returned. A failed
/// publish is logged and does not stop the frame from being processed.
pub fn process_frame(
    frame: &TelemetryFrame,
    state: &mut EventDetectorState,
    sink: &mut impl EventSink,
) -> Spotting {
    let events = state.process(&frame.snapshot);
    if !events.is_empty() {
        debug!("Events: {}", events.iter().map(|e| e.kind()).join(", "));
    }
    for event in &events {
        if let Err(e) = sink.publish(event) {
            error!("Could not publish {} event: {}", event.kind(), e);
        }
    }

    Spotting {
        timestamp_ms: frame.snapshot.timestamp_ms.unwrap_or_else(now_ms),
        cars: normalize(&frame.cars),
    }
}

/// Pulls frames from `producer` in order until it is exhausted, publishing
/// detected events and forwarding spotting snapshots.
///
/// Returns the number of frames processed.
pub fn collect_telemetry(
    mut producer: impl TelemetryProducer,
    state: &mut EventDetectorState,
    sink: &mut impl EventSink,
    spotting_sender: Option<Sender<Spotting>>,
    refresh_rate: Duration,
) -> Result<usize, SpotterError> {
    producer.start()?;

    let mut frames = 0;
    loop {
        let frame = match producer.next_frame() {
            Ok(frame) => frame,
            Err(e) if e.is_exhausted() => {
                info!("Telemetry source exhausted after {} frames", frames);
                return Ok(frames);
            }
            Err(e) => return Err(e),
        };
        frames += 1;

        let spotting = process_frame(&frame, state, sink);
        if let Some(ref sender) = spotting_sender {
            sender.send(spotting).map_err(|e| {
                error!("Could not send spotting snapshot: {}", e);
                SpotterError::from(e)
            })?;
        }

        if !refresh_rate.is_zero() {
            thread::sleep(refresh_rate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{
        EventKind, RawCarFrame, TelemetryEvent, TelemetrySnapshot,
        producer::ReplayTelemetryProducer,
    };
    use std::sync::mpsc;

    fn frame(position: i32, rival_pct: f32) -> TelemetryFrame {
        TelemetryFrame {
            cars: RawCarFrame {
                lap: vec![1, 1],
                lap_fraction: vec![0.5, rival_pct],
                speed: vec![50., 55.],
                track_length: Some(2000.),
                player_index: Some(0),
                ..Default::default()
            },
            snapshot: TelemetrySnapshot {
                position: Some(position),
                lap: Some(1),
                timestamp_ms: Some(position as u128),
                ..Default::default()
            },
        }
    }

    struct FailingSink;

    impl EventSink for FailingSink {
        fn publish(&mut self, event: &TelemetryEvent) -> Result<(), SpotterError> {
            Err(SpotterError::EventSinkClosed {
                kind: event.kind().to_string(),
            })
        }
    }

    #[test]
    fn test_collect_until_exhausted() {
        let producer =
            ReplayTelemetryProducer::from_frames(vec![frame(4, 0.51), frame(3, 0.49)]);
        let mut state = EventDetectorState::new();
        let mut events: Vec<TelemetryEvent> = Vec::new();
        let (tx, rx) = mpsc::channel();

        let frames =
            collect_telemetry(producer, &mut state, &mut events, Some(tx), Duration::ZERO)
                .unwrap();

        assert_eq!(frames, 2);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), EventKind::PositionGain);

        let spottings: Vec<Spotting> = rx.iter().collect();
        assert_eq!(spottings.len(), 2);
        assert!(spottings[0].cars[0].distance > 0.);
        assert!(spottings[1].cars[0].distance < 0.);
    }

    #[test]
    fn test_publish_failure_does_not_stop_processing() {
        let mut state = EventDetectorState::new();
        process_frame(&frame(5, 0.6), &mut state, &mut FailingSink);
        let spotting = process_frame(&frame(6, 0.6), &mut state, &mut FailingSink);

        assert_eq!(state.last_position, Some(6));
        assert_eq!(spotting.cars.len(), 1);
        assert_eq!(spotting.timestamp_ms, 6);
    }

    #[test]
    fn test_closed_spotting_channel_is_an_error() {
        let producer = ReplayTelemetryProducer::from_frames(vec![frame(1, 0.5)]);
        let (tx, rx) = mpsc::channel();
        drop(rx);

        let result = collect_telemetry(
            producer,
            &mut EventDetectorState::new(),
            &mut Vec::<TelemetryEvent>::new(),
            Some(tx),
            Duration::ZERO,
        );
        assert!(matches!(
            result,
            Err(SpotterError::SpottingBroadcastError { .. })
        ));
    }
}
