//! The Push Verification Probe.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use mailprobe_common::{Mailbox, config::PushConfig, wire};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::{
    net::TcpStream,
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, timeout, timeout_at},
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Message, protocol::CloseFrame},
};
use url::Url;

use crate::{PushError, PushEvent, Result, packet::Packet};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long [`PushSession::collect`] waits for the reader to close cleanly.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Socket.IO endpoint for a push origin: `http(s)` becomes `ws(s)` and the
/// Engine.IO path and query are set.
///
/// # Errors
///
/// Returns [`PushError::InvalidUrl`] for unparseable URLs and unsupported
/// schemes.
pub fn socket_url(base: &str) -> Result<Url> {
    let invalid = |reason: String| PushError::InvalidUrl {
        url: base.to_string(),
        reason,
    };

    let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(invalid(format!("unsupported scheme '{other}'"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| invalid(format!("cannot use scheme '{scheme}'")))?;

    url.set_path("/socket.io/");
    url.set_query(Some("EIO=4&transport=websocket"));
    Ok(url)
}

/// What the push channel showed for one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PushOutcome {
    /// The namespace `connect` arrived.
    pub connected: bool,
    /// `connectionEstablished` arrived.
    pub confirmed: bool,
    /// Number of `newMail` events.
    pub notifications: usize,
    /// Failure signals, in arrival order.
    pub failures: Vec<String>,
    /// Whether a failure signal arrived before the first `newMail`.
    pub failed_before_mail: bool,
    /// Every event, in arrival order.
    pub events: Vec<PushEvent>,
}

impl PushOutcome {
    /// At least one `newMail` and no failure before it.
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.notifications >= 1 && !self.failed_before_mail
    }
}

pub struct PushProbe {
    config: PushConfig,
}

impl PushProbe {
    #[must_use]
    pub const fn new(config: PushConfig) -> Self {
        Self { config }
    }

    /// Connects, joins the default namespace and subscribes to `mailbox`.
    ///
    /// Never fails: a connection that cannot be established is recorded as a
    /// `connect_error` in the returned session, which then collects nothing.
    pub async fn subscribe(&self, mailbox: &Mailbox) -> PushSession {
        let mut session = PushSession::default();

        if let Err(e) = self.open(mailbox, &mut session).await {
            tracing::warn!(error = %e, "Push subscription failed");
            if !matches!(e, PushError::ConnectRefused(_) | PushError::Closed(_)) {
                session.record(PushEvent::ConnectError(e.to_string()));
            }
        }

        session
    }

    async fn open(&self, mailbox: &Mailbox, session: &mut PushSession) -> Result<()> {
        let url = socket_url(&self.config.url)?;
        tracing::debug!(%url, "Connecting to push channel");

        let (socket, _) = timeout(self.config.connect_timeout(), connect_async(url.as_str()))
            .await
            .map_err(|_| PushError::Timeout("WebSocket handshake"))??;

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming) = mpsc::unbounded_channel();

        session.reader = Some(tokio::spawn(pump(socket, outgoing_rx, incoming_tx)));
        session.outgoing = Some(outgoing);
        session.incoming = Some(incoming);

        session
            .wait_for(self.config.connect_timeout(), "namespace connect", |e| {
                matches!(e, PushEvent::Connect)
            })
            .await?;

        tracing::info!("Push channel connected");

        session.send(&Packet::event(
            "subscribe",
            json!({ "mailboxId": mailbox.id.as_str(), "token": mailbox.token }),
        ))?;

        tracing::debug!(id = %mailbox.id, token = %mailbox.masked_token(), "Subscribe sent");

        if !session.is_confirmed() {
            match session
                .wait_for(self.config.confirm_timeout(), "connectionEstablished", |e| {
                    matches!(e, PushEvent::ConnectionEstablished(_))
                })
                .await
            {
                Ok(()) => {}
                Err(PushError::Timeout(what)) => {
                    tracing::warn!("No {what} within {:?}", self.config.confirm_timeout());
                }
                Err(e) => return Err(e),
            }
        }

        if session.is_confirmed() {
            tracing::info!(id = %mailbox.id, "Push subscription confirmed");
        }

        Ok(())
    }
}

/// A live subscription. The socket is serviced in the background until
/// [`PushSession::collect`] is called or the session is dropped.
#[derive(Default)]
pub struct PushSession {
    outcome: PushOutcome,
    outgoing: Option<mpsc::UnboundedSender<String>>,
    incoming: Option<mpsc::UnboundedReceiver<PushEvent>>,
    reader: Option<JoinHandle<()>>,
}

impl PushSession {
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.outcome.connected
    }

    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        self.outcome.confirmed
    }

    /// Events received so far.
    #[must_use]
    pub fn events(&self) -> &[PushEvent] {
        &self.outcome.events
    }

    /// Waits for up to `expected` `newMail` events, a terminal event or
    /// `event_timeout`, whichever comes first, then closes the socket.
    pub async fn collect(mut self, expected: usize, event_timeout: Duration) -> PushOutcome {
        if self.incoming.is_some() {
            let deadline = Instant::now() + event_timeout;

            while self.outcome.notifications < expected {
                let Some(incoming) = self.incoming.as_mut() else {
                    break;
                };

                match timeout_at(deadline, incoming.recv()).await {
                    Ok(Some(event)) => {
                        let terminal = event.is_terminal();
                        self.record(event);
                        if terminal {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(_) => {
                        tracing::debug!(
                            received = self.outcome.notifications,
                            expected,
                            "Push collection timed out"
                        );
                        break;
                    }
                }
            }
        }

        self.close().await;
        std::mem::take(&mut self.outcome)
    }

    fn record(&mut self, event: PushEvent) {
        tracing::debug!(event = %event, "Push event");

        match &event {
            PushEvent::Connect => self.outcome.connected = true,
            PushEvent::ConnectionEstablished(_) => self.outcome.confirmed = true,
            PushEvent::NewMail(_) => self.outcome.notifications += 1,
            _ => {}
        }

        if event.is_failure() {
            tracing::warn!(event = %event, "Push channel failure signal");
            if self.outcome.notifications == 0 {
                self.outcome.failed_before_mail = true;
            }
            self.outcome.failures.push(event.to_string());
        }

        self.outcome.events.push(event);
    }

    fn send(&self, packet: &Packet) -> Result<()> {
        self.outgoing
            .as_ref()
            .ok_or_else(|| PushError::Closed("not connected".to_string()))?
            .send(packet.encode())
            .map_err(|_| PushError::Closed("socket reader stopped".to_string()))
    }

    /// Records incoming events until one satisfies `wanted`.
    async fn wait_for(
        &mut self,
        budget: Duration,
        what: &'static str,
        wanted: impl Fn(&PushEvent) -> bool,
    ) -> Result<()> {
        let deadline = Instant::now() + budget;

        loop {
            let incoming = self
                .incoming
                .as_mut()
                .ok_or_else(|| PushError::Closed("not connected".to_string()))?;

            let event = match timeout_at(deadline, incoming.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => return Err(PushError::Closed("socket reader stopped".to_string())),
                Err(_) => return Err(PushError::Timeout(what)),
            };

            let found = wanted(&event);
            let refused = match &event {
                PushEvent::ConnectError(reason) => Some(PushError::ConnectRefused(reason.clone())),
                PushEvent::Disconnect(reason) => Some(PushError::Closed(reason.clone())),
                _ => None,
            };

            self.record(event);

            if found {
                return Ok(());
            }
            if let Some(err) = refused {
                return Err(err);
            }
        }
    }

    async fn close(&mut self) {
        // Dropping the sender makes the reader say goodbye and exit.
        self.outgoing = None;
        self.incoming = None;

        if let Some(mut reader) = self.reader.take()
            && timeout(CLOSE_GRACE, &mut reader).await.is_err()
        {
            reader.abort();
        }
    }
}

impl Drop for PushSession {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Services the socket: answers pings, forwards events, writes queued
/// frames. Ends on a terminal signal or when the session hangs up.
async fn pump(
    socket: Socket,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    incoming: mpsc::UnboundedSender<PushEvent>,
) {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            frame = stream.next() => {
                let event = match frame {
                    Some(Ok(Message::Text(text))) => {
                        wire!("S: {}", text.as_str());
                        match Packet::decode(text.as_str()) {
                            Ok(Packet::Open(_)) => {
                                let connect = Packet::Connect(None).encode();
                                wire!("C: {connect}");
                                if let Err(e) = sink.send(Message::text(connect)).await {
                                    Some(PushEvent::Disconnect(format!("transport error: {e}")))
                                } else {
                                    None
                                }
                            }
                            Ok(Packet::Ping) => {
                                if let Err(e) = sink.send(Message::text(Packet::Pong.encode())).await {
                                    Some(PushEvent::Disconnect(format!("transport error: {e}")))
                                } else {
                                    None
                                }
                            }
                            Ok(Packet::Connect(_)) => Some(PushEvent::Connect),
                            Ok(Packet::ConnectError(data)) => Some(PushEvent::ConnectError(reason(&data))),
                            Ok(Packet::Event { name, data }) => Some(PushEvent::from_event(name, data)),
                            Ok(Packet::Disconnect) => {
                                Some(PushEvent::Disconnect("io server disconnect".to_string()))
                            }
                            Ok(Packet::Close) => Some(PushEvent::Disconnect("transport close".to_string())),
                            Ok(Packet::Pong | Packet::Noop | Packet::Ignored(_)) => None,
                            Err(e) => {
                                tracing::warn!(error = %e, "Ignoring undecodable push frame");
                                None
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => Some(PushEvent::Disconnect(close_reason(frame))),
                    Some(Ok(_)) => None,
                    Some(Err(e)) => Some(PushEvent::Disconnect(format!("transport error: {e}"))),
                    None => Some(PushEvent::Disconnect("transport close".to_string())),
                };

                if let Some(event) = event {
                    let terminal = event.is_terminal();
                    if incoming.send(event).is_err() || terminal {
                        break;
                    }
                }
            }

            frame = outgoing.recv() => {
                if let Some(frame) = frame {
                    wire!("C: {frame}");
                    if let Err(e) = sink.send(Message::text(frame)).await {
                        let _ = incoming.send(PushEvent::Disconnect(format!("transport error: {e}")));
                        break;
                    }
                } else {
                    let _ = sink.send(Message::text(Packet::Disconnect.encode())).await;
                    let _ = sink.close().await;
                    break;
                }
            }
        }
    }
}

fn reason(data: &Value) -> String {
    data.get("message")
        .and_then(Value::as_str)
        .map_or_else(|| data.to_string(), ToString::to_string)
}

fn close_reason(frame: Option<CloseFrame>) -> String {
    frame.map_or_else(
        || "transport close".to_string(),
        |frame| format!(
            "transport close ({}): {}",
            u16::from(frame.code),
            frame.reason.as_str()
        ),
    )
}
