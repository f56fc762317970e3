//! Publish/subscribe boundary.
//!
//! The driver publishes telemetry through the [`Bus`] trait and never learns
//! how messages travel. Three implementations are provided:
//!
//! - [`ChannelBus`]: in-process fan-out over a tokio broadcast channel.
//! - [`JsonLinesBus`]: one JSON object per line on any async writer (stdout in
//!   the CLI), written by a separate task so a slow reader never stalls the
//!   publisher.
//! - [`RecordingBus`]: keeps every event in memory for tests and benchmarks.
//!
//! Inbound force messages arrive as JSON lines through
//! [`pump_force_commands`], which hands each one to a [`ForceInbox`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use falcon_core::constants::{TOPIC_BUTTONS, TOPIC_FORCE, TOPIC_POSITION};
use falcon_core::{FourButtonState, Position3};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::force_gate::ForceInbox;

/// Log every this many dropped JSON-lines events.
const DROP_WARN_INTERVAL: u64 = 1000;

/// Position telemetry stamped with wall-clock time and a reference frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionStamped {
    pub frame: String,
    pub stamp: DateTime<Utc>,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl PositionStamped {
    pub fn new(frame: impl Into<String>, stamp: DateTime<Utc>, position: Position3) -> Self {
        Self {
            frame: frame.into(),
            stamp,
            x: position.x,
            y: position.y,
            z: position.z,
        }
    }

    pub fn position(&self) -> Position3 {
        Position3::new(self.x, self.y, self.z)
    }
}

/// Button state emitted whenever the grip mask changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FourButtonDown {
    pub plus: bool,
    pub forward: bool,
    pub center: bool,
    pub minus: bool,
}

impl From<FourButtonState> for FourButtonDown {
    fn from(state: FourButtonState) -> Self {
        Self {
            plus: state.plus,
            forward: state.forward,
            center: state.center,
            minus: state.minus,
        }
    }
}

/// Inbound force command.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ForceMessage {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Outbound event, tagged with its topic when serialized.
///
/// ```
/// use falcon_driver::bus::{BusEvent, FourButtonDown};
///
/// let event = BusEvent::Buttons(FourButtonDown { plus: true, ..Default::default() });
/// let json = serde_json::to_string(&event).unwrap();
/// assert!(json.starts_with(r#"{"topic":"falcon_button","msg":{"plus":true"#));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "msg")]
pub enum BusEvent {
    #[serde(rename = "falconPos")]
    Position(PositionStamped),
    #[serde(rename = "falcon_button")]
    Buttons(FourButtonDown),
}

impl BusEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Position(_) => TOPIC_POSITION,
            Self::Buttons(_) => TOPIC_BUTTONS,
        }
    }
}

/// Fire-and-forget publisher.
///
/// Implementations must not block the caller for long; the control loop
/// publishes from its hot path.
pub trait Bus: Send + Sync {
    fn publish(&self, event: BusEvent);
}

impl<B: Bus + ?Sized> Bus for &B {
    fn publish(&self, event: BusEvent) {
        (**self).publish(event);
    }
}

impl<B: Bus + ?Sized> Bus for Arc<B> {
    fn publish(&self, event: BusEvent) {
        (**self).publish(event);
    }
}

/// In-process bus backed by a broadcast channel.
///
/// Slow subscribers lag and lose the oldest events rather than stalling the
/// publisher.
#[derive(Debug, Clone)]
pub struct ChannelBus {
    tx: broadcast::Sender<BusEvent>,
}

impl ChannelBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Bus for ChannelBus {
    fn publish(&self, event: BusEvent) {
        // No subscribers is not an error for a fire-and-forget bus.
        let _ = self.tx.send(event);
    }
}

/// Publishes events as JSON lines without ever blocking the publisher.
///
/// Events go into a bounded queue drained by a [`JsonLinesWriter`]. When the
/// writer falls behind and the queue is full, new events are dropped and
/// counted.
#[derive(Debug, Clone)]
pub struct JsonLinesBus {
    tx: mpsc::Sender<BusEvent>,
    dropped: Arc<AtomicU64>,
}

/// Draining side of a [`JsonLinesBus`].
#[derive(Debug)]
pub struct JsonLinesWriter {
    rx: mpsc::Receiver<BusEvent>,
}

impl JsonLinesBus {
    /// Create a bus holding at most `capacity` unwritten events.
    pub fn channel(capacity: usize) -> (Self, JsonLinesWriter) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let bus = Self {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (bus, JsonLinesWriter { rx })
    }

    /// Events discarded because the writer could not keep up.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Bus for JsonLinesBus {
    fn publish(&self, event: BusEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed);
                if dropped % DROP_WARN_INTERVAL == 0 {
                    warn!(
                        topic = event.topic(),
                        dropped = dropped + 1,
                        "Output is not keeping up, dropping events"
                    );
                }
            }
            Err(TrySendError::Closed(event)) => {
                debug!(topic = event.topic(), "Output writer gone, event discarded");
            }
        }
    }
}

impl JsonLinesWriter {
    /// Write queued events to `writer`, one JSON object per line, until every
    /// [`JsonLinesBus`] handle has been dropped.
    ///
    /// Output is flushed whenever the queue runs empty. Returns the number of
    /// lines written.
    ///
    /// # Errors
    ///
    /// Returns the first write or flush error.
    pub async fn run<W>(mut self, writer: &mut W) -> std::io::Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let mut written = 0;
        let mut line = Vec::with_capacity(256);

        while let Some(event) = self.rx.recv().await {
            line.clear();
            serde_json::to_writer(&mut line, &event)?;
            line.push(b'\n');
            writer.write_all(&line).await?;
            written += 1;

            if self.rx.is_empty() {
                writer.flush().await?;
            }
        }

        writer.flush().await?;
        Ok(written)
    }
}

/// Keeps every published event in memory.
#[derive(Debug, Default)]
pub struct RecordingBus {
    events: Mutex<Vec<BusEvent>>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<BusEvent> {
        self.events.lock().clone()
    }

    pub fn positions(&self) -> Vec<PositionStamped> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                BusEvent::Position(position) => Some(position.clone()),
                BusEvent::Buttons(_) => None,
            })
            .collect()
    }

    pub fn button_events(&self) -> Vec<FourButtonDown> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                BusEvent::Buttons(buttons) => Some(*buttons),
                BusEvent::Position(_) => None,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Bus for RecordingBus {
    fn publish(&self, event: BusEvent) {
        self.events.lock().push(event);
    }
}

/// Feed [`ForceMessage`] JSON lines from `reader` into `inbox` until EOF.
///
/// Blank lines are ignored. Lines that do not parse, or carry non-finite
/// components, are logged and skipped. Returns the number of commands
/// delivered.
///
/// # Errors
///
/// Returns an I/O error if reading fails.
pub async fn pump_force_commands<R>(reader: R, inbox: &ForceInbox) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut delivered = 0;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let message: ForceMessage = match serde_json::from_str(line) {
            Ok(message) => message,
            Err(e) => {
                warn!(topic = TOPIC_FORCE, error = %e, "Ignoring malformed force message");
                continue;
            }
        };
        match inbox.on_force_command(message.x, message.y, message.z) {
            Ok(()) => delivered += 1,
            Err(e) => warn!(topic = TOPIC_FORCE, error = %e, "Ignoring invalid force message"),
        }
    }

    debug!(delivered, "Force command stream ended");
    Ok(delivered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::force_gate::force_channel;
    use falcon_core::ButtonMask;

    fn position_event() -> BusEvent {
        BusEvent::Position(PositionStamped::new(
            "map",
            DateTime::<Utc>::UNIX_EPOCH,
            Position3::new(0.1, -0.2, 0.3),
        ))
    }

    #[test]
    fn test_topics() {
        assert_eq!(position_event().topic(), "falconPos");
        assert_eq!(
            BusEvent::Buttons(FourButtonDown::default()).topic(),
            "falcon_button"
        );
    }

    #[test]
    fn test_button_message_from_mask() {
        let down = FourButtonDown::from(ButtonMask::from_bits(0b1010).decode());
        assert_eq!(
            down,
            FourButtonDown {
                plus: false,
                forward: true,
                center: false,
                minus: true,
            }
        );
    }

    #[tokio::test]
    async fn test_json_lines_bus_writes_tagged_lines() {
        let (bus, writer) = JsonLinesBus::channel(16);
        bus.publish(position_event());
        bus.publish(BusEvent::Buttons(FourButtonDown {
            center: true,
            ..Default::default()
        }));
        drop(bus);

        let mut out = Vec::new();
        assert_eq!(writer.run(&mut out).await.unwrap(), 2);
        let output = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["topic"], "falconPos");
        assert_eq!(first["msg"]["frame"], "map");
        assert_eq!(first["msg"]["y"], -0.2);

        let second: BusEvent = serde_json::from_str(lines[1]).unwrap();
        assert!(matches!(second, BusEvent::Buttons(b) if b.center && !b.plus));
    }

    #[tokio::test]
    async fn test_json_lines_bus_drops_when_writer_stalls() {
        let (bus, writer) = JsonLinesBus::channel(4);
        for _ in 0..10 {
            bus.publish(position_event());
        }
        assert_eq!(bus.dropped(), 6);

        // Nobody reads the far end, so the writer blocks after 16 bytes.
        let (mut near, _far) = tokio::io::duplex(16);
        let task = tokio::spawn(async move { writer.run(&mut near).await });
        tokio::task::yield_now().await;

        bus.publish(position_event());
        assert!(!task.is_finished());
        task.abort();
    }

    #[tokio::test]
    async fn test_json_lines_bus_survives_closed_writer() {
        let (bus, writer) = JsonLinesBus::channel(4);
        drop(writer);
        bus.publish(position_event());
        assert_eq!(bus.dropped(), 0);
    }

    #[tokio::test]
    async fn test_channel_bus_fan_out() {
        let bus = ChannelBus::new(16);
        bus.publish(position_event());

        let mut rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        bus.publish(BusEvent::Buttons(FourButtonDown::default()));
        assert_eq!(
            rx.recv().await.unwrap(),
            BusEvent::Buttons(FourButtonDown::default())
        );
    }

    #[test]
    fn test_recording_bus_filters() {
        let bus = Arc::new(RecordingBus::new());
        let shared = Arc::clone(&bus);
        shared.publish(position_event());
        (&*bus).publish(BusEvent::Buttons(FourButtonDown::default()));

        assert_eq!(bus.len(), 2);
        assert_eq!(bus.positions().len(), 1);
        assert_eq!(bus.button_events(), vec![FourButtonDown::default()]);
        bus.clear();
        assert!(bus.is_empty());
    }

    #[tokio::test]
    async fn test_pump_skips_bad_lines() {
        let (inbox, _gate) = force_channel(None);
        let input: &[u8] = b"{\"x\":1.0,\"y\":0.0,\"z\":0.0}\n\nnot json\n{\"x\":0.0,\"y\":1.0,\"z\":0.5}\n";

        let delivered = pump_force_commands(input, &inbox).await.unwrap();
        assert_eq!(delivered, 2);
        assert_eq!(
            inbox.latest().map(|cmd| cmd.force),
            Some(falcon_core::Force3::new(0.0, 1.0, 0.5))
        );
    }
}
