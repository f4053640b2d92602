//! In-process Socket.IO endpoint speaking just enough Engine.IO v4 to stand
//! in for the push channel.
#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::{
    net::TcpListener,
    sync::{Mutex, broadcast},
    task::JoinHandle,
};
use tokio_tungstenite::{accept_async, tungstenite::Message};

const OPEN: &str = r#"0{"sid":"mock-sid","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;

#[derive(Clone, Default)]
struct Behaviour {
    refuse: Option<String>,
    skip_confirmation: bool,
    disconnect_after_subscribe: bool,
}

pub struct MockPushServer {
    addr: SocketAddr,
    subscriptions: Arc<Mutex<Vec<Value>>>,
    pongs: Arc<AtomicUsize>,
    goodbyes: Arc<AtomicUsize>,
    mail: broadcast::Sender<Value>,
    handle: JoinHandle<()>,
}

impl MockPushServer {
    #[must_use]
    pub fn builder() -> MockPushServerBuilder {
        MockPushServerBuilder::default()
    }

    pub async fn start() -> Self {
        Self::builder().build().await
    }

    /// Origin to hand to the probe.
    #[must_use]
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Sends `newMail` to every subscribed client.
    pub fn publish(&self, payload: Value) {
        let _ = self.mail.send(payload);
    }

    pub async fn subscriptions(&self) -> Vec<Value> {
        self.subscriptions.lock().await.clone()
    }

    pub fn pongs(&self) -> usize {
        self.pongs.load(Ordering::SeqCst)
    }

    /// Number of `41` packets received from clients.
    pub fn goodbyes(&self) -> usize {
        self.goodbyes.load(Ordering::SeqCst)
    }

    /// Waits up to a second for `check` to hold.
    pub async fn eventually(&self, check: impl Fn(&Self) -> bool) -> bool {
        for _ in 0..50 {
            if check(self) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        check(self)
    }
}

impl Drop for MockPushServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[derive(Default)]
pub struct MockPushServerBuilder {
    behaviour: Behaviour,
}

impl MockPushServerBuilder {
    /// Answer the namespace connect with `44` and this message.
    #[must_use]
    pub fn refuse(mut self, message: &str) -> Self {
        self.behaviour.refuse = Some(message.to_string());
        self
    }

    /// Never emit `connectionEstablished`.
    #[must_use]
    pub fn skip_confirmation(mut self) -> Self {
        self.behaviour.skip_confirmation = true;
        self
    }

    /// Send a namespace disconnect right after confirming a subscription.
    #[must_use]
    pub fn disconnect_after_subscribe(mut self) -> Self {
        self.behaviour.disconnect_after_subscribe = true;
        self
    }

    pub async fn build(self) -> MockPushServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let subscriptions = Arc::new(Mutex::new(Vec::new()));
        let pongs = Arc::new(AtomicUsize::new(0));
        let goodbyes = Arc::new(AtomicUsize::new(0));
        let (mail, _) = broadcast::channel(64);

        let handle = {
            let subscriptions = Arc::clone(&subscriptions);
            let pongs = Arc::clone(&pongs);
            let goodbyes = Arc::clone(&goodbyes);
            let mail = mail.clone();
            let behaviour = self.behaviour;

            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let client = Client {
                        behaviour: behaviour.clone(),
                        subscriptions: Arc::clone(&subscriptions),
                        pongs: Arc::clone(&pongs),
                        goodbyes: Arc::clone(&goodbyes),
                        mail: mail.subscribe(),
                    };
                    tokio::spawn(client.serve(stream));
                }
            })
        };

        MockPushServer {
            addr,
            subscriptions,
            pongs,
            goodbyes,
            mail,
            handle,
        }
    }
}

struct Client {
    behaviour: Behaviour,
    subscriptions: Arc<Mutex<Vec<Value>>>,
    pongs: Arc<AtomicUsize>,
    goodbyes: Arc<AtomicUsize>,
    mail: broadcast::Receiver<Value>,
}

impl Client {
    async fn serve(self, stream: tokio::net::TcpStream) {
        let Self {
            behaviour,
            subscriptions,
            pongs,
            goodbyes,
            mut mail,
        } = self;

        let Ok(socket) = accept_async(stream).await else {
            return;
        };
        let (mut sink, mut stream) = socket.split();

        if sink.send(Message::text(OPEN)).await.is_err() {
            return;
        }

        let mut subscribed = false;

        loop {
            tokio::select! {
                frame = stream.next() => {
                    let text = match frame {
                        Some(Ok(Message::Text(text))) => text.as_str().to_string(),
                        Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                        Some(Ok(_)) => continue,
                    };

                    let mut replies = Vec::new();
                    let mut hang_up = false;

                    match text.as_str() {
                        "40" => {
                            if let Some(message) = &behaviour.refuse {
                                replies.push(format!("44{}", json!({ "message": message })));
                                hang_up = true;
                            } else {
                                replies.push(r#"40{"sid":"mock-socket"}"#.to_string());
                                replies.push("2".to_string());
                            }
                        }
                        "3" => {
                            pongs.fetch_add(1, Ordering::SeqCst);
                        }
                        "41" => {
                            goodbyes.fetch_add(1, Ordering::SeqCst);
                            hang_up = true;
                        }
                        event if event.starts_with("42") => {
                            let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&event[2..]) else {
                                continue;
                            };
                            if items.first().and_then(Value::as_str) == Some("subscribe") {
                                let data = items.get(1).cloned().unwrap_or(Value::Null);
                                subscriptions.lock().await.push(data.clone());
                                subscribed = true;

                                if !behaviour.skip_confirmation {
                                    replies.push(format!(
                                        "42{}",
                                        json!(["connectionEstablished", { "mailboxId": data["mailboxId"] }])
                                    ));
                                }
                                if behaviour.disconnect_after_subscribe {
                                    replies.push("41".to_string());
                                    hang_up = true;
                                }
                            }
                        }
                        _ => {}
                    }

                    for reply in replies {
                        if sink.send(Message::text(reply)).await.is_err() {
                            return;
                        }
                    }
                    if hang_up {
                        let _ = sink.close().await;
                        break;
                    }
                }

                Ok(payload) = mail.recv(), if subscribed => {
                    let frame = format!("42{}", json!(["newMail", payload]));
                    if sink.send(Message::text(frame)).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}
