//! WebSocket transport to the live endpoint
//!
//! The connection is split into two tasks. The writer sends the handshake,
//! then holds queued media until the reader sees the acknowledgement, then
//! drains the outbound queue in order. The reader parses every inbound
//! payload and forwards the resulting events onto the session queue. Neither
//! task touches session state directly.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::SplitStream;
use futures::{Sink, SinkExt, StreamExt};
use secrecy::ExposeSecret as _;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use crate::audio::EncodedBlob;
use crate::config::LiveConfig;
use crate::live::events::{InboundEvent, SessionEvent};
use crate::live::wire::{ClientMessage, RealtimeInput, ServerMessage, Setup};
use crate::{Error, Result};

/// Sender half of the session's ordered event queue
pub type EventSender = mpsc::UnboundedSender<SessionEvent>;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long teardown waits for the writer to flush the close frame
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Outbound half of an open live connection
#[async_trait]
pub trait Transport: Send {
    /// Queues one encoded capture frame for delivery. Never blocks; frames
    /// queued before the handshake completes are flushed in order afterward.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] if the connection is already gone.
    fn send_audio(&self, blob: EncodedBlob) -> Result<()>;

    /// Marks the outbound audio stream as finished. Best effort.
    fn finish_audio(&self);

    /// Closes the connection without waiting for the remote to acknowledge.
    async fn close(&mut self);
}

/// Dials a live endpoint and produces a transport
#[async_trait]
pub trait Connector: Send + Sync {
    /// Establishes a connection and spawns its pump tasks. Remote events
    /// arrive on `events` from here on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the endpoint or key is unusable and
    /// [`Error::Transport`] if the connection cannot be established.
    async fn connect(&self, config: &LiveConfig, events: EventSender)
    -> Result<Box<dyn Transport>>;
}

/// Connects to the configured endpoint over `wss`
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        config: &LiveConfig,
        events: EventSender,
    ) -> Result<Box<dyn Transport>> {
        let api_key = config
            .api_key
            .as_ref()
            .ok_or_else(|| Error::Config("api key is not set".to_string()))?;

        let url = Url::parse_with_params(&config.endpoint, &[("key", api_key.expose_secret())])
            .map_err(|e| Error::Config(format!("invalid endpoint: {e}")))?;

        tracing::debug!(endpoint = %config.endpoint, "dialing live endpoint");
        let (ws, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::Transport(format!("connect failed: {e}")))?;
        tracing::debug!("websocket established, awaiting handshake acknowledgement");

        Ok(Box::new(WsTransport::spawn(
            ws,
            Setup::for_session(config),
            events,
        )))
    }
}

enum OutboundItem {
    Media(EncodedBlob),
    StreamEnd,
    Shutdown,
}

/// Live WebSocket connection pumped by a writer task and a reader task
pub struct WsTransport {
    outbound: mpsc::UnboundedSender<OutboundItem>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

impl WsTransport {
    fn spawn(ws: WsStream, setup: Setup, events: EventSender) -> Self {
        let (ws_tx, ws_rx) = ws.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (opened_tx, opened_rx) = oneshot::channel();

        let writer = tokio::spawn(write_loop(
            ws_tx,
            setup,
            opened_rx,
            outbound_rx,
            events.clone(),
        ));
        let reader = tokio::spawn(read_loop(ws_rx, opened_tx, events));

        Self {
            outbound: outbound_tx,
            writer: Some(writer),
            reader: Some(reader),
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    fn send_audio(&self, blob: EncodedBlob) -> Result<()> {
        self.outbound
            .send(OutboundItem::Media(blob))
            .map_err(|_| Error::Transport("outbound queue closed".to_string()))
    }

    fn finish_audio(&self) {
        let _ = self.outbound.send(OutboundItem::StreamEnd);
    }

    async fn close(&mut self) {
        let _ = self.outbound.send(OutboundItem::Shutdown);

        // Aborting the reader first drops the handshake signal, which
        // unblocks a writer still waiting on it
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(mut writer) = self.writer.take() {
            if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
                writer.abort();
                tracing::warn!("writer task aborted after close grace period");
            }
        }
        tracing::debug!("transport closed");
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}

/// Sends the handshake, waits for its acknowledgement, then drains the
/// outbound queue in FIFO order until shutdown.
async fn write_loop<S>(
    mut ws_tx: S,
    setup: Setup,
    opened_rx: oneshot::Receiver<()>,
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundItem>,
    events: EventSender,
) where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let setup_json = match serde_json::to_string(&ClientMessage::Setup(setup)) {
        Ok(json) => json,
        Err(e) => {
            let _ = events.send(SessionEvent::Inbound(InboundEvent::Error(format!(
                "setup serialization failed: {e}"
            ))));
            return;
        }
    };
    if let Err(e) = ws_tx.send(Message::Text(setup_json.into())).await {
        let _ = events.send(SessionEvent::Inbound(InboundEvent::Error(format!(
            "setup send failed: {e}"
        ))));
        return;
    }

    // Media queued during the handshake accumulates in the channel. A dropped
    // sender means the handshake never completed; the queue is then drained
    // for its shutdown item only.
    let opened = opened_rx.await.is_ok();
    if !opened {
        tracing::debug!("handshake never acknowledged, writer draining for shutdown");
    }

    while let Some(item) = outbound_rx.recv().await {
        let message = match item {
            OutboundItem::Media(blob) if opened => {
                ClientMessage::RealtimeInput(RealtimeInput::media(blob))
            }
            OutboundItem::StreamEnd if opened => {
                ClientMessage::RealtimeInput(RealtimeInput::stream_end())
            }
            OutboundItem::Media(_) | OutboundItem::StreamEnd => continue,
            OutboundItem::Shutdown => break,
        };

        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "dropping unserializable outbound message");
                continue;
            }
        };
        if let Err(e) = ws_tx.send(Message::Text(json.into())).await {
            let _ = events.send(SessionEvent::Inbound(InboundEvent::Error(format!(
                "send failed: {e}"
            ))));
            return;
        }
    }

    let _ = ws_tx.send(Message::Close(None)).await;
    tracing::debug!("writer task finished");
}

/// Parses inbound frames and forwards their events to the session queue
async fn read_loop(mut ws_rx: SplitStream<WsStream>, opened_tx: oneshot::Sender<()>, events: EventSender) {
    let mut opened_tx = Some(opened_tx);
    let mut ended = false;

    while let Some(message) = ws_rx.next().await {
        match message {
            Ok(Message::Text(text)) => {
                if !dispatch_payload(text.as_str(), &mut opened_tx, &events) {
                    return;
                }
            }
            // Some endpoints deliver JSON in binary frames
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => {
                    if !dispatch_payload(text, &mut opened_tx, &events) {
                        return;
                    }
                }
                Err(_) => {
                    tracing::warn!(len = bytes.len(), "ignoring non-UTF-8 binary frame");
                }
            },
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|f| f.reason.to_string())
                    .filter(|r| !r.is_empty());
                let _ = events.send(SessionEvent::Inbound(InboundEvent::Closed { reason }));
                ended = true;
                break;
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
            Err(e) => {
                let _ = events.send(SessionEvent::Inbound(InboundEvent::Error(format!(
                    "receive failed: {e}"
                ))));
                ended = true;
                break;
            }
        }
    }

    if !ended {
        // stream ran out without a close frame
        let _ = events.send(SessionEvent::Inbound(InboundEvent::Closed { reason: None }));
    }
    tracing::debug!("reader task finished");
}

/// Parses one JSON payload and forwards its events. Unparseable payloads are
/// logged and skipped. Returns `false` once the session side has gone away.
fn dispatch_payload(
    text: &str,
    opened_tx: &mut Option<oneshot::Sender<()>>,
    events: &EventSender,
) -> bool {
    let message: ServerMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!(error = %e, "ignoring unparseable server message");
            return true;
        }
    };

    for event in message.into_events() {
        if matches!(event, InboundEvent::Opened) {
            if let Some(tx) = opened_tx.take() {
                let _ = tx.send(());
            }
        }
        if events.send(SessionEvent::Inbound(event)).is_err() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;
    use std::pin::Pin;
    use std::sync::{Arc, Mutex};
    use std::task::{Context, Poll};

    use super::*;

    /// Sink recording every frame the writer pushes toward the wire
    #[derive(Clone, Default)]
    struct RecordingSink {
        sent: Arc<Mutex<Vec<Message>>>,
    }

    impl Sink<Message> for RecordingSink {
        type Error = Infallible;

        fn poll_ready(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<std::result::Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: Message) -> std::result::Result<(), Infallible> {
            self.sent.lock().unwrap().push(item);
            Ok(())
        }

        fn poll_flush(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<std::result::Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
        ) -> Poll<std::result::Result<(), Infallible>> {
            Poll::Ready(Ok(()))
        }
    }

    fn media(data: &str) -> OutboundItem {
        OutboundItem::Media(EncodedBlob {
            data: data.to_string(),
            mime_type: "audio/pcm;rate=16000".to_string(),
        })
    }

    fn sent_json(sent: &[Message], index: usize) -> serde_json::Value {
        match &sent[index] {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected a text frame at {index}, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn writer_holds_media_until_handshake_then_flushes_in_order() {
        let sink = RecordingSink::default();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let (opened_tx, opened_rx) = oneshot::channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        // media and the stream-end marker pile up while the handshake is
        // still pending, then the acknowledgement lands
        outbound_tx.send(media("first")).unwrap();
        outbound_tx.send(media("second")).unwrap();
        opened_tx.send(()).unwrap();
        outbound_tx.send(OutboundItem::StreamEnd).unwrap();
        outbound_tx.send(OutboundItem::Shutdown).unwrap();

        write_loop(
            sink.clone(),
            Setup::for_session(&LiveConfig::default()),
            opened_rx,
            outbound_rx,
            events_tx,
        )
        .await;

        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 5);
        assert!(sent_json(&sent, 0).get("setup").is_some());
        assert_eq!(
            sent_json(&sent, 1)["realtimeInput"]["mediaChunks"][0]["data"],
            "first"
        );
        assert_eq!(
            sent_json(&sent, 2)["realtimeInput"]["mediaChunks"][0]["data"],
            "second"
        );
        assert_eq!(sent_json(&sent, 3)["realtimeInput"]["audioStreamEnd"], true);
        assert!(matches!(sent[4], Message::Close(None)));
    }

    #[tokio::test]
    async fn writer_abandons_media_when_handshake_never_completes() {
        let sink = RecordingSink::default();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let (opened_tx, opened_rx) = oneshot::channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        outbound_tx.send(media("undeliverable")).unwrap();
        outbound_tx.send(OutboundItem::StreamEnd).unwrap();
        drop(opened_tx);
        outbound_tx.send(OutboundItem::Shutdown).unwrap();

        write_loop(
            sink.clone(),
            Setup::for_session(&LiveConfig::default()),
            opened_rx,
            outbound_rx,
            events_tx,
        )
        .await;

        // only the handshake and the close frame ever reach the wire
        let sent = sink.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent_json(&sent, 0).get("setup").is_some());
        assert!(matches!(sent[1], Message::Close(None)));
    }

    #[test]
    fn dispatch_fires_handshake_signal_once() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (opened_tx, mut opened_rx) = oneshot::channel();
        let mut opened = Some(opened_tx);

        assert!(dispatch_payload(r#"{"setupComplete":{}}"#, &mut opened, &events_tx));
        assert!(opened.is_none());
        assert!(opened_rx.try_recv().is_ok());
        assert!(matches!(
            events_rx.try_recv(),
            Ok(SessionEvent::Inbound(InboundEvent::Opened))
        ));

        // a duplicate acknowledgement still forwards the event
        assert!(dispatch_payload(r#"{"setupComplete":{}}"#, &mut opened, &events_tx));
        assert!(matches!(
            events_rx.try_recv(),
            Ok(SessionEvent::Inbound(InboundEvent::Opened))
        ));
    }

    #[test]
    fn dispatch_skips_unparseable_payloads() {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (opened_tx, _opened_rx) = oneshot::channel();
        let mut opened = Some(opened_tx);

        assert!(dispatch_payload("not json at all", &mut opened, &events_tx));
        assert!(events_rx.try_recv().is_err());
        assert!(opened.is_some());
    }

    #[test]
    fn dispatch_reports_session_gone() {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        drop(events_rx);
        let (opened_tx, _opened_rx) = oneshot::channel();
        let mut opened = Some(opened_tx);

        assert!(!dispatch_payload(
            r#"{"serverContent":{"interrupted":true}}"#,
            &mut opened,
            &events_tx
        ));
    }
}
