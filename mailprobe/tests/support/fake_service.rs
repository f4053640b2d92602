//! A self-contained stand-in for the disposable-mailbox service.
//!
//! Three listeners share one store so that the harness sees a consistent
//! system:
//! - an SMTP sink that stores every accepted message
//! - the issuance/retrieval/health API, served by wiremock
//! - a Socket.IO endpoint that announces stored mail to subscribers
#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use futures_util::{SinkExt, StreamExt};
use mailprobe_common::{HarnessConfig, config::SmtpEndpoint};
use serde_json::{Value, json};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    sync::broadcast,
    task::JoinHandle,
};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use wiremock::{
    Mock, MockServer, Request, Respond, ResponseTemplate,
    matchers::{method, path, path_regex},
};

const OPEN: &str = r#"0{"sid":"fake-sid","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#;

#[derive(Debug, Clone)]
pub struct Issued {
    pub id: String,
    pub address: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct Stored {
    pub recipient: String,
    pub sender: String,
    pub subject: String,
}

#[derive(Default)]
struct Store {
    issued: Vec<Issued>,
    stored: Vec<Stored>,
}

type Shared = Arc<Mutex<Store>>;

pub struct FakeService {
    store: Shared,
    api: MockServer,
    smtp_addr: SocketAddr,
    push_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl FakeService {
    /// Healthy service with every endpoint answering.
    pub async fn start() -> Self {
        Self::builder().build().await
    }

    pub fn builder() -> FakeServiceBuilder {
        FakeServiceBuilder::default()
    }

    /// Harness configuration pointing at this service, with short timings.
    pub fn config(&self) -> HarnessConfig {
        let mut config = HarnessConfig::default();
        config.ingestion.backend = SmtpEndpoint::new("127.0.0.1", self.smtp_addr.port());
        config.ingestion.timeouts.connect_secs = 2;
        config.ingestion.timeouts.command_secs = 2;
        config.ingestion.timeouts.data_secs = 2;
        config.ingestion.timeouts.quit_secs = 1;
        config.api.base_url = self.api.uri();
        config.api.request_timeout_secs = 2;
        config.push.url = format!("http://{}", self.push_addr);
        config.push.connect_timeout_secs = 2;
        config.push.confirm_timeout_secs = 2;
        config.push.event_timeout_secs = 5;
        config.frontend_url = Some("http://localhost:3000".to_string());
        config
    }

    pub fn issued(&self) -> Vec<Issued> {
        self.store.lock().unwrap().issued.clone()
    }

    pub fn stored(&self) -> Vec<Stored> {
        self.store.lock().unwrap().stored.clone()
    }
}

impl Drop for FakeService {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[derive(Default)]
pub struct FakeServiceBuilder {
    provisioning_status: Option<u16>,
    integration_status: Option<u16>,
    smtp_down: bool,
    foreign_record: bool,
    short_ids: bool,
}

impl FakeServiceBuilder {
    /// Answer `POST /api/mailbox/generate` with this status and no mailbox.
    pub fn provisioning_fails(mut self, status: u16) -> Self {
        self.provisioning_status = Some(status);
        self
    }

    pub fn integration_status(mut self, status: u16) -> Self {
        self.integration_status = Some(status);
        self
    }

    /// Nothing listens on the ingestion port.
    pub fn smtp_down(mut self) -> Self {
        self.smtp_down = true;
        self
    }

    /// Every retrieval also returns one record owned by another mailbox.
    pub fn leak_foreign_record(mut self) -> Self {
        self.foreign_record = true;
        self
    }

    /// Issue identifiers that are not 24 hex characters.
    pub fn short_ids(mut self) -> Self {
        self.short_ids = true;
        self
    }

    pub async fn build(self) -> FakeService {
        let store = Shared::default();
        let (mail, _) = broadcast::channel::<Stored>(64);
        let mut tasks = Vec::new();

        let smtp = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let smtp_addr = smtp.local_addr().unwrap();
        if self.smtp_down {
            drop(smtp);
        } else {
            let store = Arc::clone(&store);
            let mail = mail.clone();
            tasks.push(tokio::spawn(async move {
                while let Ok((stream, _)) = smtp.accept().await {
                    tokio::spawn(smtp_session(stream, Arc::clone(&store), mail.clone()));
                }
            }));
        }

        let push = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let push_addr = push.local_addr().unwrap();
        {
            let store = Arc::clone(&store);
            let mail = mail.clone();
            tasks.push(tokio::spawn(async move {
                while let Ok((stream, _)) = push.accept().await {
                    tokio::spawn(push_session(stream, Arc::clone(&store), mail.subscribe()));
                }
            }));
        }

        let api = MockServer::start().await;

        match self.provisioning_status {
            Some(status) => {
                Mock::given(method("POST"))
                    .and(path("/api/mailbox/generate"))
                    .respond_with(
                        ResponseTemplate::new(status)
                            .set_body_json(json!({"success": false, "error": "unavailable"})),
                    )
                    .mount(&api)
                    .await;
            }
            None => {
                Mock::given(method("POST"))
                    .and(path("/api/mailbox/generate"))
                    .respond_with(Issuer {
                        store: Arc::clone(&store),
                        short_ids: self.short_ids,
                    })
                    .mount(&api)
                    .await;
            }
        }

        Mock::given(method("GET"))
            .and(path_regex(r"^/api/mail/[^/]+$"))
            .respond_with(Retriever {
                store: Arc::clone(&store),
                foreign_record: self.foreign_record,
            })
            .mount(&api)
            .await;

        mount_health(&api, smtp_addr.port(), self.integration_status).await;

        FakeService {
            store,
            api,
            smtp_addr,
            push_addr,
            tasks,
        }
    }
}

async fn mount_health(api: &MockServer, smtp_port: u16, integration_status: Option<u16>) {
    let bodies = [
        ("/health", 200, json!({"status": "ok"})),
        (
            "/health/mail",
            200,
            json!({"mailService": {"isRunning": true, "port": smtp_port}}),
        ),
        (
            "/health/websocket",
            200,
            json!({"websocket": {"connectedClients": 0, "totalSubscriptions": 0}}),
        ),
        (
            "/health/integration",
            integration_status.unwrap_or(200),
            json!({"integration": {
                "isHealthy": true,
                "totalMails": 0,
                "successfulBroadcasts": 0,
                "failedBroadcasts": 0,
                "successRate": "100%"
            }}),
        ),
    ];

    for (route, status, body) in bodies {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(api)
            .await;
    }
}

struct Issuer {
    store: Shared,
    short_ids: bool,
}

impl Respond for Issuer {
    fn respond(&self, _: &Request) -> ResponseTemplate {
        let mut store = self.store.lock().unwrap();
        let n = store.issued.len();

        let id = if self.short_ids {
            format!("mbx{n}q")
        } else {
            format!("6566f0c2a1b2c3d4e5f6{n:04x}")
        };
        let issued = Issued {
            id,
            address: format!("box{n}@fake.test"),
            token: format!("eyJhbGciOiJIUzI1NiJ9.fake-token-{n}"),
        };
        store.issued.push(issued.clone());

        ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"id": issued.id, "address": issued.address, "token": issued.token}
        }))
    }
}

struct Retriever {
    store: Shared,
    foreign_record: bool,
}

impl Respond for Retriever {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let store = self.store.lock().unwrap();
        let id = request.url.path().trim_start_matches("/api/mail/");

        let Some(mailbox) = store.issued.iter().find(|m| m.id == id) else {
            return ResponseTemplate::new(404)
                .set_body_json(json!({"success": false, "error": "Mailbox not found"}));
        };

        let authorized = request
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == format!("Bearer {}", mailbox.token));
        if !authorized {
            return ResponseTemplate::new(401)
                .set_body_json(json!({"success": false, "error": "Unauthorized"}));
        }

        let mut data: Vec<Value> = store
            .stored
            .iter()
            .filter(|m| m.recipient == mailbox.address)
            .map(|m| json!({"subject": m.subject, "from": m.sender, "mailboxId": mailbox.id}))
            .collect();

        if self.foreign_record {
            data.push(json!({
                "subject": "not yours",
                "from": "someone@else.test",
                "mailboxId": "ffffffffffffffffffffffff"
            }));
        }

        ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": data}))
    }
}

async fn smtp_session(stream: TcpStream, store: Shared, mail: broadcast::Sender<Stored>) {
    let _ = serve_smtp(stream, store, mail).await;
}

async fn serve_smtp(
    stream: TcpStream,
    store: Shared,
    mail: broadcast::Sender<Stored>,
) -> std::io::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    let mut sender = String::new();
    let mut recipients = Vec::new();

    writer.write_all(b"220 fake.ingest ESMTP\r\n").await?;

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }

        let command = line.trim_end();
        let (verb, argument) = command.split_once(' ').unwrap_or((command, ""));

        let reply = match verb.to_ascii_uppercase().as_str() {
            "EHLO" | "HELO" => "250-fake.ingest\r\n250 8BITMIME\r\n",
            "MAIL" => {
                sender = address_of(argument);
                recipients.clear();
                "250 OK\r\n"
            }
            "RCPT" => {
                recipients.push(address_of(argument));
                "250 OK\r\n"
            }
            "DATA" => {
                writer.write_all(b"354 Go ahead\r\n").await?;
                let subject = read_subject(&mut reader).await?;

                for recipient in &recipients {
                    let stored = Stored {
                        recipient: recipient.clone(),
                        sender: sender.clone(),
                        subject: subject.clone(),
                    };
                    store.lock().unwrap().stored.push(stored.clone());
                    let _ = mail.send(stored);
                }
                "250 OK stored\r\n"
            }
            "QUIT" => {
                writer.write_all(b"221 Bye\r\n").await?;
                return Ok(());
            }
            _ => "502 Not implemented\r\n",
        };

        writer.write_all(reply.as_bytes()).await?;
    }
}

fn address_of(argument: &str) -> String {
    argument
        .split_once(':')
        .map_or(argument, |(_, rest)| rest)
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .to_string()
}

/// Consumes the DATA payload and returns its `Subject` header.
async fn read_subject<R: tokio::io::AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<String> {
    let mut subject = String::new();
    let mut in_headers = true;
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 || line == ".\r\n" {
            return Ok(subject);
        }
        if line == "\r\n" {
            in_headers = false;
        }
        if in_headers && let Some(value) = line.strip_prefix("Subject: ") {
            subject = value.trim_end().to_string();
        }
    }
}

async fn push_session(stream: TcpStream, store: Shared, mut mail: broadcast::Receiver<Stored>) {
    let Ok(socket) = accept_async(stream).await else {
        return;
    };
    let (mut sink, mut stream) = socket.split();

    if sink.send(Message::text(OPEN)).await.is_err() {
        return;
    }

    let mut watching: Option<(String, String)> = None;

    loop {
        tokio::select! {
            frame = stream.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text.as_str().to_string(),
                    Some(Ok(Message::Close(_)) | Err(_)) | None => return,
                    Some(Ok(_)) => continue,
                };

                let reply = if text == "40" {
                    Some(r#"40{"sid":"fake-socket"}"#.to_string())
                } else if text == "41" {
                    return;
                } else if let Some(payload) = text.strip_prefix("42") {
                    let event: Value = serde_json::from_str(payload).unwrap_or(Value::Null);
                    let id = event[1]["mailboxId"].as_str().unwrap_or_default().to_string();
                    let token = event[1]["token"].as_str().unwrap_or_default();

                    let owner = store
                        .lock()
                        .unwrap()
                        .issued
                        .iter()
                        .find(|m| m.id == id && m.token == token)
                        .map(|m| m.address.clone());

                    match owner {
                        Some(address) if event[0] == "subscribe" => {
                            watching = Some((id.clone(), address));
                            Some(format!("42{}", json!(["connectionEstablished", {"mailboxId": id}])))
                        }
                        _ => Some(format!("42{}", json!(["error", {"message": "Invalid subscription"}]))),
                    }
                } else {
                    None
                };

                if let Some(reply) = reply
                    && sink.send(Message::text(reply)).await.is_err()
                {
                    return;
                }
            }

            Ok(stored) = mail.recv() => {
                let Some((id, address)) = &watching else {
                    continue;
                };
                if &stored.recipient != address {
                    continue;
                }

                let frame = format!(
                    "42{}",
                    json!(["newMail", {"mailboxId": id, "subject": stored.subject, "from": stored.sender}])
                );
                if sink.send(Message::text(frame)).await.is_err() {
                    return;
                }
            }
        }
    }
}
