// Event sinks: where detected events are handed off for delivery

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
    sync::mpsc::{self, Sender, SyncSender, TrySendError},
    thread::{self, JoinHandle},
};

use log::{error, info, warn};
use serde_jsonlines::JsonLinesWriter;

use crate::{SpotterError, telemetry::TelemetryEvent};

pub const DEFAULT_EVENT_QUEUE_SIZE: usize = 256;

/// The publish capability events are delivered through.
///
/// The event kind is available from [`TelemetryEvent::kind`]. Sinks own
/// delivery; the detector never learns whether a publish succeeded.
pub trait EventSink {
    fn publish(&mut self, event: &TelemetryEvent) -> Result<(), SpotterError>;
}

impl EventSink for Vec<TelemetryEvent> {
    fn publish(&mut self, event: &TelemetryEvent) -> Result<(), SpotterError> {
        self.push(event.clone());
        Ok(())
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn publish(&mut self, event: &TelemetryEvent) -> Result<(), SpotterError> {
        (**self).publish(event)
    }
}

/// Logs every event at info level.
#[derive(Default)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn publish(&mut self, event: &TelemetryEvent) -> Result<(), SpotterError> {
        info!("[{}] {}: {:?}", event.timestamp_ms, event.kind(), event.payload);
        Ok(())
    }
}

/// Forwards events to an unbounded channel.
pub struct ChannelEventSink {
    sender: Sender<TelemetryEvent>,
}

impl ChannelEventSink {
    pub fn new(sender: Sender<TelemetryEvent>) -> Self {
        Self { sender }
    }
}

impl EventSink for ChannelEventSink {
    fn publish(&mut self, event: &TelemetryEvent) -> Result<(), SpotterError> {
        self.sender
            .send(event.clone())
            .map_err(|_| SpotterError::EventSinkClosed {
                kind: event.kind().to_string(),
            })
    }
}

/// Bounded FIFO in front of a slower sink, drained by a worker thread.
///
/// Publishing never blocks: when the queue is full the new event is dropped
/// with a warning.
pub struct QueuedEventSink {
    sender: SyncSender<TelemetryEvent>,
}

impl QueuedEventSink {
    /// Starts the worker thread. Dropping the returned sink closes the queue;
    /// join the handle to wait for the remaining events to be delivered.
    pub fn spawn<S>(capacity: usize, mut inner: S) -> (Self, JoinHandle<()>)
    where
        S: EventSink + Send + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel::<TelemetryEvent>(capacity);
        let worker = thread::spawn(move || {
            for event in receiver {
                if let Err(e) = inner.publish(&event) {
                    error!("Failed to deliver {} event: {}", event.kind(), e);
                }
            }
        });
        (Self { sender }, worker)
    }
}

impl EventSink for QueuedEventSink {
    fn publish(&mut self, event: &TelemetryEvent) -> Result<(), SpotterError> {
        match self.sender.try_send(event.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                warn!("Event queue full, dropping event: {}", event.kind());
                Ok(())
            }
            Err(TrySendError::Disconnected(event)) => Err(SpotterError::EventSinkClosed {
                kind: event.kind().to_string(),
            }),
        }
    }
}

/// Writes one event envelope per line.
pub struct JsonLinesEventWriter<W: Write> {
    writer: JsonLinesWriter<W>,
}

impl JsonLinesEventWriter<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SpotterError> {
        let file = File::create(path).map_err(|e| SpotterError::WriterError { source: e })?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> JsonLinesEventWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: JsonLinesWriter::new(writer),
        }
    }
}

impl<W: Write> EventSink for JsonLinesEventWriter<W> {
    fn publish(&mut self, event: &TelemetryEvent) -> Result<(), SpotterError> {
        self.writer
            .write(event)
            .and_then(|_| self.writer.flush())
            .map_err(|e| SpotterError::WriterError { source: e })
    }
}
