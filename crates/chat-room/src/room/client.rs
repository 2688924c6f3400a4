//! Per-connection client state and I/O pumps.
//!
//! Each connection gets two independently scheduled tasks sharing the
//! client's bounded outbound queue and the transport:
//!
//! - [`inbound_pump`] reads frames, enforces the frame size limit and
//!   the read deadline, and forwards application frames to the room's
//!   inbound mailbox. On any exit it posts an unregister for its
//!   connection.
//! - [`outbound_pump`] drains the outbound queue into the transport,
//!   coalescing already-queued messages into one flush batch, and emits
//!   heartbeat probes. When the room closes the queue it sends a close
//!   frame and terminates.
//!
//! The pumps are generic over `Stream`/`Sink` of [`Frame`] so tests can
//! drive them with in-memory channels instead of a WebSocket.

use std::time::Duration;

use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::errors::{ChatError, TransportError};
use crate::participant::Participant;

use super::handle::RoomHandle;

/// A transport-neutral frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// One serialized wire envelope.
    Message(Bytes),
    /// Heartbeat probe (server to client).
    Ping,
    /// Heartbeat response (client to server); refreshes the read deadline.
    Pong,
    /// Connection close signal.
    Close,
}

/// Tunables shared by both pumps.
#[derive(Debug, Clone, Copy)]
pub struct PumpConfig {
    /// Maximum inbound frame size in bytes.
    pub max_frame_bytes: usize,
    /// Read deadline window, refreshed on each pong.
    pub pong_timeout: Duration,
    /// Heartbeat period, 0.9x the read deadline.
    pub ping_period: Duration,
    /// Outbound queue capacity per client.
    pub outbound_capacity: usize,
}

impl PumpConfig {
    #[must_use]
    pub fn new(max_frame_bytes: usize, pong_timeout: Duration, outbound_capacity: usize) -> Self {
        Self {
            max_frame_bytes,
            pong_timeout,
            ping_period: pong_timeout * 9 / 10,
            outbound_capacity,
        }
    }
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self::new(512, Duration::from_secs(60), 256)
    }
}

impl From<&Config> for PumpConfig {
    fn from(config: &Config) -> Self {
        Self::new(
            config.max_frame_bytes,
            Duration::from_secs(config.pong_timeout_seconds),
            config.outbound_queue_capacity,
        )
    }
}

/// Room-side record for one connection.
///
/// Owned by the room loop for the lifetime of the connection. Dropping
/// it drops the outbound sender, which closes the queue and lets the
/// outbound pump terminate.
#[derive(Debug)]
pub struct Client {
    id: Uuid,
    participant: Participant,
    outbound: mpsc::Sender<Bytes>,
}

impl Client {
    /// Create a client record and the receiving end of its outbound
    /// queue, which the outbound pump consumes.
    pub fn new(participant: Participant, outbound_capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (outbound, outbound_rx) = mpsc::channel(outbound_capacity);
        (
            Self {
                id: Uuid::new_v4(),
                participant,
                outbound,
            },
            outbound_rx,
        )
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    pub(crate) fn set_participant(&mut self, participant: Participant) {
        self.participant = participant;
    }

    /// Non-blocking enqueue onto the outbound queue. A full queue means
    /// the consumer cannot keep up; the caller evicts rather than waits.
    pub(crate) fn enqueue(&self, frame: Bytes) -> Result<(), ChatError> {
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ChatError::CapacityExceeded(self.id),
            mpsc::error::TrySendError::Closed(_) => {
                TransportError("outbound queue closed".to_string()).into()
            }
        })
    }
}

/// Read side of a connection.
///
/// Forwards application frames to the room; pongs refresh the read
/// deadline. On read error, oversize frame, deadline expiry, or stream
/// end, posts an unregister for this connection and returns, releasing
/// the transport.
pub async fn inbound_pump<S>(mut frames: S, client_id: Uuid, room: RoomHandle, config: PumpConfig)
where
    S: Stream<Item = Result<Frame, TransportError>> + Unpin,
{
    let mut deadline = Instant::now() + config.pong_timeout;

    loop {
        match timeout_at(deadline, frames.next()).await {
            Err(_) => {
                warn!(target: "chat.client", client_id = %client_id, "read deadline expired");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                debug!(target: "chat.client", client_id = %client_id, error = %e, "read failed");
                break;
            }
            Ok(Some(Ok(Frame::Pong))) => {
                deadline = Instant::now() + config.pong_timeout;
            }
            Ok(Some(Ok(Frame::Ping))) => {
                // The transport layer answers pings for us.
            }
            Ok(Some(Ok(Frame::Close))) => break,
            Ok(Some(Ok(Frame::Message(raw)))) => {
                if raw.len() > config.max_frame_bytes {
                    warn!(
                        target: "chat.client",
                        client_id = %client_id,
                        size = raw.len(),
                        limit = config.max_frame_bytes,
                        "oversize frame"
                    );
                    break;
                }
                if room.forward_inbound(client_id, raw).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = room.unregister(client_id).await;
}

/// Write side of a connection.
///
/// Waits on the outbound queue and the heartbeat timer. Dequeued
/// messages are batched with whatever else is already queued into one
/// flush, FIFO order preserved. A closed-and-drained queue means the
/// room removed this client: send a close frame and stop. Any write
/// error terminates the pump. The sink is closed on every exit path.
pub async fn outbound_pump<S>(mut sink: S, mut outbound: mpsc::Receiver<Bytes>, config: PumpConfig)
where
    S: Sink<Frame, Error = TransportError> + Unpin,
{
    let mut heartbeat = interval_at(Instant::now() + config.ping_period, config.ping_period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Skip);

    'run: loop {
        tokio::select! {
            maybe = outbound.recv() => match maybe {
                Some(first) => {
                    if sink.feed(Frame::Message(first)).await.is_err() {
                        break 'run;
                    }
                    while let Ok(next) = outbound.try_recv() {
                        if sink.feed(Frame::Message(next)).await.is_err() {
                            break 'run;
                        }
                    }
                    if sink.flush().await.is_err() {
                        break 'run;
                    }
                }
                None => {
                    // The room closed the queue.
                    let _ = sink.send(Frame::Close).await;
                    break 'run;
                }
            },
            _ = heartbeat.tick() => {
                if sink.send(Frame::Ping).await.is_err() {
                    break 'run;
                }
            }
        }
    }

    let _ = sink.close().await;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::identity::{AccountKind, User};

    fn participant() -> Participant {
        Participant::common(User::new("u-1", "alice", AccountKind::Member), "")
    }

    fn test_sink() -> (
        impl Sink<Frame, Error = TransportError> + Unpin,
        futures::channel::mpsc::UnboundedReceiver<Frame>,
    ) {
        let (tx, rx) = futures::channel::mpsc::unbounded();
        (tx.sink_map_err(|e| TransportError(e.to_string())), rx)
    }

    #[test]
    fn test_pump_config_derives_ping_period() {
        let config = PumpConfig::new(512, Duration::from_secs(60), 256);
        assert_eq!(config.ping_period, Duration::from_secs(54));
    }

    #[test]
    fn test_enqueue_full_queue_is_capacity_exceeded() {
        let (client, _outbound_rx) = Client::new(participant(), 1);
        client.enqueue(Bytes::from_static(b"one")).unwrap();

        let err = client.enqueue(Bytes::from_static(b"two")).unwrap_err();
        assert!(matches!(err, ChatError::CapacityExceeded(id) if id == client.id()));
    }

    #[test]
    fn test_enqueue_closed_queue_is_transport_error() {
        let (client, outbound_rx) = Client::new(participant(), 1);
        drop(outbound_rx);

        let err = client.enqueue(Bytes::from_static(b"one")).unwrap_err();
        assert!(matches!(err, ChatError::Transport(_)));
    }

    #[tokio::test]
    async fn test_outbound_pump_preserves_fifo_and_closes() {
        let (sink, mut transport_rx) = test_sink();
        let (queue_tx, queue_rx) = mpsc::channel(8);

        // Queue several messages before the pump starts so the drain
        // path coalesces them into one batch.
        for text in ["one", "two", "three"] {
            queue_tx.send(Bytes::from(text)).await.unwrap();
        }
        drop(queue_tx);

        outbound_pump(sink, queue_rx, PumpConfig::default()).await;

        assert_eq!(
            transport_rx.next().await,
            Some(Frame::Message(Bytes::from_static(b"one")))
        );
        assert_eq!(
            transport_rx.next().await,
            Some(Frame::Message(Bytes::from_static(b"two")))
        );
        assert_eq!(
            transport_rx.next().await,
            Some(Frame::Message(Bytes::from_static(b"three")))
        );
        assert_eq!(transport_rx.next().await, Some(Frame::Close));
        assert_eq!(transport_rx.next().await, None);
    }

    #[tokio::test]
    async fn test_outbound_pump_close_signal_on_empty_closed_queue() {
        let (sink, mut transport_rx) = test_sink();
        let (queue_tx, queue_rx) = mpsc::channel::<Bytes>(8);
        drop(queue_tx);

        outbound_pump(sink, queue_rx, PumpConfig::default()).await;

        assert_eq!(transport_rx.next().await, Some(Frame::Close));
        assert_eq!(transport_rx.next().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_outbound_pump_emits_heartbeat_probes() {
        let (sink, mut transport_rx) = test_sink();
        let (_queue_tx, queue_rx) = mpsc::channel::<Bytes>(8);
        let config = PumpConfig::default();

        let pump = tokio::spawn(outbound_pump(sink, queue_rx, config));

        tokio::time::advance(config.ping_period).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(transport_rx.next().await, Some(Frame::Ping));

        tokio::time::advance(config.ping_period).await;
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(transport_rx.next().await, Some(Frame::Ping));

        pump.abort();
    }

    #[tokio::test]
    async fn test_outbound_pump_terminates_on_write_error() {
        let (sink, transport_rx) = test_sink();
        drop(transport_rx);

        let (queue_tx, queue_rx) = mpsc::channel(8);
        queue_tx.send(Bytes::from_static(b"doomed")).await.unwrap();

        // Must return rather than hang once the transport is gone.
        tokio::time::timeout(
            Duration::from_secs(1),
            outbound_pump(sink, queue_rx, PumpConfig::default()),
        )
        .await
        .expect("pump should terminate on write error");
    }
}
